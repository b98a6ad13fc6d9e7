//! Service configuration: TOML file, `.env` and environment overrides.

pub mod loader;
pub mod models;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, EnvOverrides};
pub use models::{
    DatabaseConfig, MemoryConfig, RedisConfig, ResultSinkConfig, ServerConfig, StorageConfig, TenantConfig,
    WardenConfig,
};
