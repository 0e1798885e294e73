//! Web demo around a YOLO ONNX model: upload an image or a video, get the
//! annotated result with basic statistics, optionally forward a fault record
//! to the fault backend.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
