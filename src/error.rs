use thiserror::Error;

/// Error taxonomy for the call bridge, per the agent-facing API contract.
///
/// `UpstreamError` from STT is special-cased by the Call Manager: it is
/// downgraded to the sentinel reply text rather than propagated, everywhere
/// else these variants abort the in-flight turn.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("telephony provider rejected the call: {0}")]
    ProviderError(String),

    #[error("no media stream bound within the bind timeout")]
    BindTimeout,

    #[error("upstream speech service failed: {0}")]
    UpstreamError(String),

    #[error("no end-of-utterance detected within the response timeout")]
    ListenTimeout,

    #[error("no call with this identifier is registered")]
    UnknownCall,

    #[error("operation not permitted in the call's current state")]
    InvalidState,

    #[error("the media stream peer closed the connection unexpectedly")]
    PeerClosed,
}

/// Startup configuration failure. Fatal: the process exits before serving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required configuration value: {0}")]
    MissingValue(&'static str),
}
