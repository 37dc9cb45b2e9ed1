use std::path::PathBuf;

/// Problems detected while resolving settings, before any request is sent.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no tracker credential found (set {})", .vars.join(" or "))]
    MissingCredential { vars: Vec<&'static str> },

    #[error("tracker credential from {var} is not usable as an HTTP header value")]
    InvalidCredential { var: &'static str },

    #[error("no tracker API URL configured (set TICKETMAP_API_URL or [tracker].api_url)")]
    MissingApiUrl,

    #[error("invalid tracker API URL {value}: {reason}")]
    InvalidApiUrl { value: String, reason: String },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to build tracker HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// A page request that did not produce a usable page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed event on ticket {ticket}: {detail}")]
    MalformedEvent { ticket: String, detail: String },

    #[error("pagination of {resource} did not advance past cursor {cursor}")]
    StalledCursor { resource: String, cursor: String },
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("failed to serialize comment map: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Output(#[from] OutputError),
}
