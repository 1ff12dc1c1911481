use thiserror::Error;

/// Errors raised while building a work list. Probing never starts when one of
/// these is returned; per-probe socket failures are outcomes, not errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid subnet format `{input}`: {reason}")]
    InvalidSubnetFormat { input: String, reason: String },

    #[error("invalid port range {start}-{end}")]
    InvalidPortRange { start: u32, end: u32 },

    #[error("invalid port `{0}`")]
    InvalidPort(String),

    #[error("could not resolve host `{0}`")]
    UnresolvableHost(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;
