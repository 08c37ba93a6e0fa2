//! The process supervisor: owns every local backend's child process group
//! end-to-end.

mod log_ring;
mod running_model;

pub use log_ring::LogRing;
pub use running_model::RunningModel;
