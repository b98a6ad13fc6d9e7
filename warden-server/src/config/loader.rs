use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use thiserror::Error;

use super::models::WardenConfig;

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["warden.toml", "config/warden.toml"];

/// Environment variables that win over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub config_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub bind: Option<String>,
    pub result_sink_url: Option<String>,
    pub storage_root: Option<PathBuf>,
}

impl EnvOverrides {
    pub fn gather() -> Self {
        Self {
            config_path: var("WARDEN_CONFIG").map(PathBuf::from),
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            bind: var("WARDEN_BIND"),
            result_sink_url: var("WARDEN_RESULT_SINK_URL"),
            storage_root: var("WARDEN_STORAGE_ROOT").map(PathBuf::from),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: WardenConfig,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
    skip_env_file: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Do not read a `.env` file.
    pub fn without_env_file(mut self) -> Self {
        self.skip_env_file = true;
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let mut load = self.load_with(EnvOverrides::gather())?;
        load.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Resolves the file and applies `env` on top of it.
    pub fn load_with(&self, env: EnvOverrides) -> Result<ConfigLoad, ConfigLoadError> {
        let (mut config, source) = match self.resolve_path(&env)? {
            Some(path) => (read_file(&path)?, Some(path)),
            None => (WardenConfig::default(), None),
        };

        apply_overrides(&mut config, env)?;
        config
            .orchestrator
            .validate()
            .map_err(|err| ConfigLoadError::Invalid(err.to_string()))?;

        Ok(ConfigLoad {
            config,
            source,
            env_file_loaded: false,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        if self.skip_env_file {
            return Ok(false);
        }
        let loaded = match &self.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(ConfigLoadError::EnvFile(err)),
        }
    }

    fn resolve_path(&self, env: &EnvOverrides) -> Result<Option<PathBuf>, ConfigLoadError> {
        // An explicitly named file must exist; defaults are optional.
        if let Some(path) = self.config_path.as_ref().or(env.config_path.as_ref()) {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path: path.clone() });
            }
            return Ok(Some(path.clone()));
        }

        Ok(DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists()))
    }
}

fn read_file(path: &Path) -> Result<WardenConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_overrides(config: &mut WardenConfig, env: EnvOverrides) -> Result<(), ConfigLoadError> {
    if let Some(bind) = env.bind {
        config.server.bind = parse_bind(&bind)?;
    }
    if let Some(url) = env.database_url {
        config.database.url = Some(url);
    }
    if let Some(url) = env.redis_url {
        config.redis.url = Some(url);
    }
    if let Some(url) = env.result_sink_url {
        config.result_sink.url = Some(url);
    }
    if let Some(root) = env.storage_root {
        config.storage.root = root;
    }
    Ok(())
}

pub fn parse_bind(value: &str) -> Result<SocketAddr, ConfigLoadError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigLoadError::InvalidBind {
            value: value.to_string(),
        })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid bind address '{value}'")]
    InvalidBind { value: String },
    #[error("{0}")]
    Invalid(String),
    #[error("failed to load .env file")]
    EnvFile(#[source] dotenvy::Error),
}
