use thiserror::Error;

#[derive(Error, Debug)]
pub enum HelpdeskError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(String),
}
