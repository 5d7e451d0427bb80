use thiserror::Error;

/// Errors that abort a run or reject configuration.
#[derive(Debug, Error)]
pub enum DedupeError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid vendor pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unknown region code: {0}")]
    UnknownRegion(String),

    /// A contact landed in two clusters, or a retired id survived the
    /// merge. Output produced past this point cannot be trusted.
    #[error("Cluster integrity violation: {0}")]
    ClusterIntegrity(String),

    #[error("Merge state {state} does not allow {action}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type DedupeResult<T> = Result<T, DedupeError>;

/// A property that could not be interpreted. Absorbed by the normalizer
/// into the audit list; never escapes it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed {property}: {reason}")]
pub struct MalformedProperty {
    pub property: String,
    pub reason: String,
}

impl MalformedProperty {
    pub fn new(property: &str, reason: impl Into<String>) -> Self {
        Self {
            property: property.to_string(),
            reason: reason.into(),
        }
    }
}

/// A phone number that no available region could parse. Absorbed by the
/// canonicalizer into an invalid `NormalizedValue`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot parse phone number '{raw}' (tried regions: {tried})")]
pub struct PhoneParseError {
    pub raw: String,
    pub tried: String,
}
