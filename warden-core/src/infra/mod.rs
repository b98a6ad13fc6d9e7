//! Port implementations.

pub mod fs_storage;
pub mod http_sink;
pub mod log_sink;
pub mod memory;

#[cfg(feature = "database")]
pub mod postgres;
#[cfg(feature = "database")]
pub mod redis;

pub use fs_storage::FsRemoteStorage;
pub use http_sink::HttpResultSink;
pub use log_sink::LogResultSink;

#[cfg(feature = "database")]
pub use self::postgres::PostgresStore;
#[cfg(feature = "database")]
pub use self::redis::{RedisBroker, RedisGroupStore};
