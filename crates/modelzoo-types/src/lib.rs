//! Shared data model for the ModelZoo control plane.
//!
//! Pure data definitions plus the small amount of pure logic that operates
//! purely on them (`EnvironmentSet` combination). No I/O, no async runtime:
//! everything that touches a process, a socket, or a filesystem lives in
//! the `modelzoo` crate.

mod available;
mod environment;
mod listener;
mod model;
mod parameter;
mod zoo;

pub use available::{ModelLaunchInfo, ModelStatus, PeerSnapshot, RunningModelsResponse, AvailableModel};
pub use environment::{Environment, EnvironmentSet, CUDA_DEVICE_ORDER_KEY, CUDA_DEVICE_ORDER_VALUE};
pub use listener::Listener;
pub use model::{Model, ModelFormat};
pub use parameter::{
    param_bool, param_f64, param_i64, param_str, ParamList, ParamType, ParamValue,
    RuntimeParameter,
};
pub use zoo::ZooHandle;
