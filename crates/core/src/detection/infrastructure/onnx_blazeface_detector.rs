//! BlazeFace (short-range, 128x128) face classifier via ONNX Runtime.
use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

const INPUT_SIZE: usize = 128;

/// 16x16 grid with 2 anchors per cell plus 8x8 grid with 6 per cell.
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output: box (4) + 6 keypoints (12).
const REGRESSOR_STRIDE: usize = 16;

/// Fixed classifier thresholds. Chosen once at construction; the
/// pipeline never tunes them while running.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassifierParams {
    /// Minimum sigmoid score for an anchor to count as a face.
    pub min_confidence: f32,
    /// IoU above which a lower-scored box is suppressed.
    pub overlap_threshold: f64,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            overlap_threshold: 0.3,
        }
    }
}

pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    params: ClassifierParams,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    pub fn new(model_path: &Path, params: ClassifierParams) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_execution_providers(accelerators())?
            .commit_from_file(model_path)?;
        log::info!("Loaded face classifier from {}", model_path.display());
        Ok(Self {
            session,
            params,
            anchors: anchor_centers(),
        })
    }
}

/// Platform GPU/NPU provider, if any. ONNX Runtime falls back to CPU
/// when a provider is unavailable.
fn accelerators() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    let providers = vec![ort::execution_providers::CoreMLExecutionProvider::default().build()];
    #[cfg(target_os = "windows")]
    let providers = vec![ort::execution_providers::DirectMLExecutionProvider::default().build()];
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let providers = Vec::new();
    providers
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        let input = ort::value::Tensor::from_array(to_input_tensor(frame))?;
        let outputs = self.session.run(ort::inputs![input])?;
        if outputs.len() < 2 {
            return Err(format!("face classifier returned {} outputs, expected 2", outputs.len()).into());
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let boxes = regressors.as_slice().ok_or("regressor output is not contiguous")?;
        let logits = scores.as_slice().ok_or("score output is not contiguous")?;

        let candidates = decode(
            boxes,
            logits,
            &self.anchors,
            self.params.min_confidence,
            frame.width(),
            frame.height(),
        );
        Ok(suppress_overlaps(candidates, self.params.overlap_threshold))
    }
}

/// Nearest-neighbour resize to the model input, scaled to [0, 1], NCHW.
fn to_input_tensor(frame: &Frame) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let (src_h, src_w) = (frame.height() as usize, frame.width() as usize);

    ndarray::Array4::from_shape_fn((1, 3, INPUT_SIZE, INPUT_SIZE), |(_, c, y, x)| {
        let sy = ((y * 2 + 1) * src_h / (INPUT_SIZE * 2)).min(src_h - 1);
        let sx = ((x * 2 + 1) * src_w / (INPUT_SIZE * 2)).min(src_w - 1);
        src[[sy, sx, c]] as f32 / 255.0
    })
}

/// Normalized anchor centers for the short-range model.
fn anchor_centers() -> Vec<[f32; 2]> {
    let layers = [(8usize, 2usize), (16, 6)];
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (stride, per_cell) in layers {
        let cells = INPUT_SIZE / stride;
        for row in 0..cells {
            for col in 0..cells {
                let center = [
                    (col as f32 + 0.5) / cells as f32,
                    (row as f32 + 0.5) / cells as f32,
                ];
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }
    anchors
}

/// Turns raw model output into frame-space regions above `min_confidence`.
fn decode(
    boxes: &[f32],
    logits: &[f32],
    anchors: &[[f32; 2]],
    min_confidence: f32,
    frame_w: u32,
    frame_h: u32,
) -> Vec<Region> {
    let scale = INPUT_SIZE as f32;
    let (fw, fh) = (frame_w as f32, frame_h as f32);

    anchors
        .iter()
        .zip(logits)
        .enumerate()
        .filter_map(|(i, (anchor, &logit))| {
            let score = sigmoid(logit);
            let offset = i * REGRESSOR_STRIDE;
            if score < min_confidence || offset + 4 > boxes.len() {
                return None;
            }
            let cx = anchor[0] + boxes[offset] / scale;
            let cy = anchor[1] + boxes[offset + 1] / scale;
            let w = boxes[offset + 2] / scale;
            let h = boxes[offset + 3] / scale;

            let x1 = ((cx - w / 2.0) * fw).max(0.0);
            let y1 = ((cy - h / 2.0) * fh).max(0.0);
            let x2 = ((cx + w / 2.0) * fw).min(fw);
            let y2 = ((cy + h / 2.0) * fh).min(fh);
            if x2 <= x1 || y2 <= y1 {
                return None;
            }

            Some(
                Region::new(x1 as i32, y1 as i32, (x2 - x1) as i32, (y2 - y1) as i32)
                    .with_confidence(score as f64),
            )
        })
        .collect()
}

/// Greedy non-maximum suppression; output is ordered by descending score.
fn suppress_overlaps(mut candidates: Vec<Region>, overlap_threshold: f64) -> Vec<Region> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Region> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= overlap_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::frame::ColorSpace;
    use approx::assert_relative_eq;

    fn anchor_logits(hit: usize, logit: f32) -> Vec<f32> {
        let mut logits = vec![-10.0; NUM_ANCHORS];
        logits[hit] = logit;
        logits
    }

    #[test]
    fn test_input_tensor_shape_and_range() {
        let frame = Frame::new(vec![255u8; 40 * 20 * 3], 40, 20, ColorSpace::Rgb, 0);
        let tensor = to_input_tensor(&frame);
        assert_eq!(tensor.shape(), &[1, 3, INPUT_SIZE, INPUT_SIZE]);
        assert_relative_eq!(tensor[[0, 2, 127, 127]], 1.0);
    }

    #[test]
    fn test_anchor_count_and_range() {
        let anchors = anchor_centers();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert!(anchors
            .iter()
            .all(|a| a[0] > 0.0 && a[0] < 1.0 && a[1] > 0.0 && a[1] < 1.0));
    }

    #[test]
    fn test_decode_skips_low_scores() {
        let anchors = anchor_centers();
        let boxes = vec![0.0; NUM_ANCHORS * REGRESSOR_STRIDE];
        let regions = decode(&boxes, &vec![-10.0; NUM_ANCHORS], &anchors, 0.5, 100, 100);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_decode_maps_box_to_frame_space() {
        let anchors = anchor_centers();
        let hit = 0; // first anchor, center (1/32, 1/32)
        let mut boxes = vec![0.0; NUM_ANCHORS * REGRESSOR_STRIDE];
        // Shift center to (0.5, 0.5) and make the box half the input wide.
        boxes[0] = (0.5 - anchors[hit][0]) * INPUT_SIZE as f32;
        boxes[1] = (0.5 - anchors[hit][1]) * INPUT_SIZE as f32;
        boxes[2] = 64.0;
        boxes[3] = 64.0;

        let regions = decode(&boxes, &anchor_logits(hit, 5.0), &anchors, 0.5, 200, 100);

        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!((r.x, r.y, r.width, r.height), (50, 25, 100, 50));
        assert!(r.confidence.unwrap() > 0.99);
    }

    #[test]
    fn test_suppression_keeps_best_of_overlapping() {
        let candidates = vec![
            Region::new(5, 5, 100, 100).with_confidence(0.7),
            Region::new(0, 0, 100, 100).with_confidence(0.9),
        ];
        let kept = suppress_overlaps(candidates, 0.3);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, Some(0.9));
    }

    #[test]
    fn test_suppression_orders_separate_faces_by_score() {
        let candidates = vec![
            Region::new(0, 0, 50, 50).with_confidence(0.6),
            Region::new(200, 200, 50, 50).with_confidence(0.8),
        ];
        let kept = suppress_overlaps(candidates, 0.3);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].x, 200);
    }

    #[test]
    fn test_sigmoid() {
        assert_relative_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_default_params() {
        let params = ClassifierParams::default();
        assert_relative_eq!(params.min_confidence, 0.5);
        assert_relative_eq!(params.overlap_threshold, 0.3);
    }
}
