use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid accessory key in identity store: {0}")]
    InvalidStoreKey(String),

    #[error("Field '{0}' cannot be set through the generic item accessor")]
    ReservedField(String),

    #[error("Malformed identity store {path}: {source}")]
    StoreFormat {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Identity store {path} assigns aid {aid} to both {first} and {second}")]
    DuplicateAid {
        path: String,
        aid: u64,
        first: String,
        second: String,
    },

    #[error("Invalid value for characteristic {characteristic}: {value}")]
    InvalidValue {
        characteristic: String,
        value: String,
    },

    #[error(transparent)]
    InstanceLock(#[from] crate::instance_lock::InstanceLockError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
