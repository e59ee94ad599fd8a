use crate::error::*;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    /// True for failures of an external collaborator that may succeed on a
    /// later scan without any user intervention.
    fn is_transient(&self) -> bool;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Classifier(e) => {
                error!("Classifier error details: {:?}", e);
            }
            CoreError::Storage(e) => {
                error!("Storage error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_transient(&self) -> bool {
        match self {
            CoreError::Classifier(e) => e.is_transient(),
            CoreError::Storage(e) => e.is_transient(),
            CoreError::Network(_) => true,
            CoreError::Io(_) => true,
            _ => false,
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Classifier(e) => e.error_code(),
            CoreError::Storage(e) => e.error_code(),
            CoreError::Config(e) => e.error_code(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for ClassifierError {
    fn log_error(&self) -> &Self {
        error!("ClassifierError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ClassifierError (warning): {}", self);
        self
    }

    fn is_transient(&self) -> bool {
        // Every classifier failure leaves the post unmarked for the next scan.
        true
    }

    fn error_code(&self) -> String {
        match self {
            ClassifierError::HttpStatus { .. } => "CLASSIFIER_HTTP_STATUS".to_string(),
            ClassifierError::MalformedResponse { .. } => "CLASSIFIER_MALFORMED".to_string(),
            ClassifierError::RequestTimeout { .. } => "CLASSIFIER_TIMEOUT".to_string(),
            ClassifierError::ServiceUnavailable { .. } => "CLASSIFIER_UNAVAILABLE".to_string(),
        }
    }
}

impl ErrorExt for StorageError {
    fn log_error(&self) -> &Self {
        error!("StorageError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("StorageError (warning): {}", self);
        self
    }

    fn is_transient(&self) -> bool {
        match self {
            StorageError::ConnectionFailed { .. } => true,
            StorageError::QueryFailed { .. } => true,
            StorageError::Unavailable { .. } => true,
            StorageError::Sql(_) => true,
            StorageError::MigrationFailed { .. } => false,
            StorageError::Encoding { .. } => false,
        }
    }

    fn error_code(&self) -> String {
        match self {
            StorageError::ConnectionFailed { .. } => "STORAGE_CONNECTION_FAILED".to_string(),
            StorageError::MigrationFailed { .. } => "STORAGE_MIGRATION_FAILED".to_string(),
            StorageError::QueryFailed { .. } => "STORAGE_QUERY_FAILED".to_string(),
            StorageError::Encoding { .. } => "STORAGE_ENCODING".to_string(),
            StorageError::Unavailable { .. } => "STORAGE_UNAVAILABLE".to_string(),
            StorageError::Sql(_) => "STORAGE_SQL".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_transient(&self) -> bool {
        false
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}
