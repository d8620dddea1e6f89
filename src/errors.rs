use thiserror::Error;

#[derive(Debug, Error)]
pub enum VirtuosError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Decision oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Agent error: {0}")]
    Agent(String),
}

impl serde::Serialize for VirtuosError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type VirtuosResult<T> = Result<T, VirtuosError>;

/// Frame capture failed. Always fatal to a run.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture command failed: {0}")]
    Command(String),

    #[error("could not read frame {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("captured frame is empty")]
    Empty,
}

/// Decision oracle failures. Only `Unavailable` aborts a run; the rest are
/// recorded and retried after a backoff.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("request failed: {0}")]
    Request(String),

    /// The decision channel cannot work at all (no key, rejected credentials).
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

impl OracleError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, OracleError::RateLimited(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, OracleError::Unavailable(_))
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::Request(e.to_string())
    }
}

/// An action failed shape checks before any device I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("action must be a JSON object")]
    NotAnObject,

    #[error("action must have a type")]
    MissingTag,

    #[error("Unknown action type: {0}")]
    UnknownTag(String),

    #[error("{tag} has missing or invalid field(s): {}", fields.join(", "))]
    InvalidFields {
        tag: String,
        fields: Vec<&'static str>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to launch input command: {0}")]
    Spawn(String),
}
