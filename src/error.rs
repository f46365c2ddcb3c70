use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Domain invariant violations. Raised immediately, never silently
/// corrected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid trading pair: {reason}")]
    InvalidPair { reason: String },

    #[error("invalid opportunity: {reason}")]
    InvalidOpportunity { reason: String },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Venue connectivity and subscription errors.
#[derive(Error, Debug)]
pub enum VenueError {
    #[error("no adapter registered for venue '{venue}'")]
    UnknownVenue { venue: String },

    #[error("connection to {venue} failed: {reason}")]
    Connection { venue: String, reason: String },

    #[error("authentication with {venue} failed: {reason}")]
    Authentication { venue: String, reason: String },

    #[error("venue {venue} is in public mode, private endpoints unavailable")]
    NotAuthenticated { venue: String },

    #[error("subscription to {pair} on {venue} failed: {reason}")]
    Subscription {
        venue: String,
        pair: String,
        reason: String,
    },

    #[error("malformed message from {venue}: {reason}")]
    Protocol { venue: String, reason: String },

    #[error("venue {venue} has no endpoint for {capability}")]
    Unsupported {
        venue: String,
        capability: &'static str,
    },
}

/// Order placement and simulated-execution errors. Terminal for the leg
/// they occur on.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("order rejected by {venue}: {reason}")]
    OrderRejected { venue: String, reason: String },

    #[error("order on {venue} filled zero quantity")]
    ZeroFill { venue: String },

    #[error("insufficient {currency} balance on {venue}: need {needed}, have {available}")]
    InsufficientBalance {
        venue: String,
        currency: String,
        needed: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(Box::new(err))
    }
}
