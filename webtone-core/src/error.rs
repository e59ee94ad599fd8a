use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum ClassifierError {
    #[error("Endpoint {endpoint} returned {status_code}: {body}")]
    HttpStatus {
        endpoint: String,
        status_code: u16,
        body: String,
    },

    #[error("Unexpected response from {endpoint}: {details}")]
    MalformedResponse { endpoint: String, details: String },

    #[error("Request to {endpoint} timed out")]
    RequestTimeout { endpoint: String },

    #[error("Endpoint unavailable: {endpoint}")]
    ServiceUnavailable { endpoint: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Stored value for {key} could not be encoded: {reason}")]
    Encoding { key: String, reason: String },

    #[error("Storage service unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
