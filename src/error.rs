use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Z-Wave transport error: {0}")]
    Transport(String),

    #[error("Z-Wave transport timed out after {0} ms")]
    TransportTimeout(u64),

    #[error("Configuration parameter {index} could not be read after {attempts} attempts")]
    ConfigurationGetFailed { index: u16, attempts: u32 },

    #[error("Command class {command_class} is not supported on {endpoint}")]
    MissingCommandClass {
        command_class: String,
        endpoint: String,
    },

    #[error("Cannot migrate setting {key}: unexpected legacy value {value}")]
    MigrationDecode { key: String, value: String },

    #[error("{0}")]
    InvalidSetting(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("Device storage error: {0}")]
    Storage(String),

    #[error("No input is registered on endpoint {0}")]
    UnknownInputEndpoint(u8),

    #[error("Unknown device profile: {0}")]
    UnknownProfile(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
