pub mod model_store;
pub mod onnx_blazeface_detector;
