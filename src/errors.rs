use thiserror::Error;

pub type StyxResult<T, E = StyxError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum StyxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("malformed rule entry: {0}")]
    MalformedRule(String),

    #[error("other: {0}")]
    Other(String),
}
