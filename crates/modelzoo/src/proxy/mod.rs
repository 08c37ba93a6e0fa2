//! Multi-protocol proxy: the public HTTP surface and its routing algorithm.

pub mod connections;
mod routes;

pub use connections::ConnectionCounter;
pub use routes::{router, AppState};
