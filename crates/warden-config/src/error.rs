use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to determine a default configuration directory; set WARDEN_DIR")]
    NoDefaultDir,

    #[error("failed to read identity file at {path}: {source}")]
    IdentityRead { path: PathBuf, source: std::io::Error },

    #[error("failed to parse identity file at {path}: {source}")]
    IdentityParse { path: PathBuf, source: serde_yaml::Error },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
