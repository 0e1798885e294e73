pub mod backend;
pub mod http;
pub mod memory;
pub mod onnx;
pub mod render;
pub mod video;
