pub mod detection;
pub mod errors;
pub mod fault;
pub mod model;
pub mod session;
