use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Yaml { path: String, source: serde_yaml::Error },

    #[error("invalid tier {name}: {reason}")]
    InvalidTier { name: String, reason: String },

    #[error("duplicate tier name: {name}")]
    DuplicateTier { name: String },
}
