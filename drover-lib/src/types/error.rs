use thiserror::Error;

/// Possible errors when configuring or running a batch dispatch
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The estimated cost of a job exceeds the configured token budget, so
    /// no amount of waiting could ever admit it. Raised at submission time,
    /// before any worker starts.
    #[error(
        "estimated cost of {estimated} token units can never be admitted under a budget of {limit} token units per window"
    )]
    CapacityExceeded {
        /// Estimated unit cost of the offending job
        estimated: u64,
        /// Configured limit of the token window
        limit: u64,
    },
    /// The limiter configuration is not usable
    #[error("invalid limiter configuration: {0}")]
    InvalidLimiterConfig(String),
    /// A worker task panicked or was cancelled before reporting back
    #[error("worker task failed to complete")]
    WorkerPanic(#[from] tokio::task::JoinError),
    /// Reqwest network error while talking to the remote endpoint
    #[error("network error while trying to connect to the endpoint via reqwest")]
    NetworkRequest(#[from] reqwest::Error),
    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("header could not be parsed")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),
    /// The given string can not be parsed into a valid endpoint URL
    #[error("cannot parse {0} as endpoint URL: {1}")]
    InvalidEndpoint(String, url::ParseError),
    /// No endpoint was configured for the remote executor
    #[error("no endpoint configured; set one before building the client")]
    MissingEndpoint,
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::CapacityExceeded {
                    estimated: e1,
                    limit: l1,
                },
                Self::CapacityExceeded {
                    estimated: e2,
                    limit: l2,
                },
            ) => e1 == e2 && l1 == l2,
            (Self::InvalidLimiterConfig(m1), Self::InvalidLimiterConfig(m2)) => m1 == m2,
            (Self::NetworkRequest(e1), Self::NetworkRequest(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::InvalidEndpoint(s1, e1), Self::InvalidEndpoint(s2, e2)) => s1 == s2 && e1 == e2,
            (Self::InvalidHeader(_), Self::InvalidHeader(_))
            | (Self::MissingEndpoint, Self::MissingEndpoint) => true,
            _ => false,
        }
    }
}
