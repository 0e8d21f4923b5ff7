use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelStoreError {
    #[error("failed to create model directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model {name} not found in {searched:?} and no download URL given")]
    NotFound { name: String, searched: Vec<PathBuf> },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Finds classifier model files on disk, fetching them into the cache
/// directory when a URL is supplied.
///
/// Lookup order: cache directory, then each extra search directory in
/// the order they were added.
pub struct ModelStore {
    cache_dir: PathBuf,
    search_dirs: Vec<PathBuf>,
}

impl ModelStore {
    /// Store rooted at the platform cache directory (`<cache>/facecam/models`).
    pub fn user_cache() -> Result<Self, ModelStoreError> {
        let cache_dir = dirs::cache_dir()
            .map(|d| d.join("facecam").join("models"))
            .ok_or(ModelStoreError::NoCacheDir)?;
        Ok(Self::at(cache_dir))
    }

    pub fn at(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            search_dirs: Vec::new(),
        }
    }

    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the first existing file called `name`.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        self.candidate_dirs()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Like [`ModelStore::locate`], downloading into the cache on a miss
    /// when `url` is given.
    pub fn resolve(&self, name: &str, url: Option<&str>) -> Result<PathBuf, ModelStoreError> {
        if let Some(path) = self.locate(name) {
            return Ok(path);
        }
        let Some(url) = url else {
            return Err(ModelStoreError::NotFound {
                name: name.to_string(),
                searched: self.candidate_dirs().map(Path::to_path_buf).collect(),
            });
        };

        fs::create_dir_all(&self.cache_dir).map_err(|source| ModelStoreError::CacheDir {
            path: self.cache_dir.clone(),
            source,
        })?;
        let dest = self.cache_dir.join(name);
        log::info!("Downloading {name} from {url}");
        fetch(url, &dest)?;
        Ok(dest)
    }

    fn candidate_dirs(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.cache_dir.as_path()).chain(self.search_dirs.iter().map(PathBuf::as_path))
    }
}

/// Downloads to `<dest>.part` and renames on success, so a partial file
/// is never mistaken for a model.
fn fetch(url: &str, dest: &Path) -> Result<(), ModelStoreError> {
    let partial = dest.with_extension("part");
    let result = fetch_to(url, &partial).and_then(|()| {
        fs::rename(&partial, dest).map_err(|source| ModelStoreError::Write {
            path: dest.to_path_buf(),
            source,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

fn fetch_to(url: &str, path: &Path) -> Result<(), ModelStoreError> {
    let download_err = |source| ModelStoreError::Download {
        url: url.to_string(),
        source,
    };
    let bytes = reqwest::blocking::get(url)
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .map_err(download_err)?;

    let write_err = |source| ModelStoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = fs::File::create(path).map_err(write_err)?;
    file.write_all(&bytes).map_err(write_err)?;
    file.sync_all().map_err(write_err)
}
