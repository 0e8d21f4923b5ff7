use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-way stop signal shared between the controller and the capture
/// thread. Only the controller raises it; the capture loop polls it once
/// per iteration.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
