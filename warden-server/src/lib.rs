//! Warden service: configuration, store wiring and the HTTP task ingress
//! in front of `warden-core`.

pub mod config;
pub mod routes;
pub mod wiring;

pub use routes::router;
pub use wiring::{Runtime, StoreMode};
