//! Error types for nodeconf
//!
//! Every failure is a structured [`Error`] carrying the key path that was being
//! looked up (when there is one), the underlying cause, and an actionable help
//! message.

use std::fmt;

/// Result type alias for nodeconf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for nodeconf operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Key path being resolved when the error occurred (e.g., "node.fqdn")
    pub path: Option<String>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A lookup was attempted with a zero-length key path
    EmptyKeyPath,
    /// Tokens were left over after reaching a node that cannot be descended
    KeyTokensRemaining { remaining: Vec<String> },
    /// A value has a type the lookup layer does not model
    UnknownValueType { type_name: String },
    /// A macro query found nothing (nodegroup absent, node id not indexed)
    NotFound { what: String },
    /// No fqdn mapping yields a node id for the given fqdn
    NodeNotFound { fqdn: String },
    /// The required metadata source could not be read or parsed
    ConfigLoad { file: String },
    /// Indirection chain is longer than the configured limit
    IndirectionDepthExceeded { limit: usize },
    /// Progress description is longer than the agent accepts
    DescriptionTooLong { len: usize },
    /// Progress percentage is outside 0..=100
    PercentageOutOfRange { percent: u32 },
    /// Timed out waiting on a remote token or service
    WaitTimeout { token: String },
    /// The external agent could not be invoked
    Agent { program: String },
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            help: None,
            cause: None,
        }
    }

    /// Create an empty key path error
    pub fn empty_key_path() -> Self {
        Self::new(ErrorKind::EmptyKeyPath)
            .with_help("Provide at least one key token, e.g. 'node.fqdn'")
    }

    /// Create a remaining-tokens error for `path` with the unconsumed `remaining` tokens
    pub fn key_tokens_remaining(path: impl Into<String>, remaining: Vec<String>) -> Self {
        Self {
            kind: ErrorKind::KeyTokensRemaining { remaining },
            path: Some(path.into()),
            help: Some(
                "The key continues past a value that has no sub-keys; drop the trailing tokens"
                    .into(),
            ),
            cause: None,
        }
    }

    /// Create an unknown value type error
    pub fn unknown_value_type(
        path: impl Into<String>,
        type_name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            kind: ErrorKind::UnknownValueType {
                type_name: type_name.into(),
            },
            path: Some(path.into()),
            help: None,
            cause: Some(format!("Value: {}", value.into())),
        }
    }

    /// Create a not found error for a macro query
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound { what: what.into() })
    }

    /// Create a node not found error for an unmapped fqdn
    pub fn node_not_found(fqdn: impl Into<String>) -> Self {
        let fqdn = fqdn.into();
        Self {
            help: Some(format!(
                "Check that '{}' appears under a nodegroup's fqdn_mappings",
                fqdn
            )),
            ..Self::new(ErrorKind::NodeNotFound { fqdn })
        }
    }

    /// Create a metadata load error
    pub fn config_load(file: impl Into<String>, cause: impl Into<String>) -> Self {
        let file = file.into();
        Self {
            help: Some(format!(
                "Check that '{}' exists, is readable, and contains a JSON object",
                file
            )),
            cause: Some(cause.into()),
            ..Self::new(ErrorKind::ConfigLoad { file })
        }
    }

    /// Create an indirection depth error
    pub fn indirection_depth_exceeded(path: impl Into<String>, limit: usize) -> Self {
        Self {
            kind: ErrorKind::IndirectionDepthExceeded { limit },
            path: Some(path.into()),
            help: Some("The metadata likely contains an indirection cycle".into()),
            cause: None,
        }
    }

    /// Create a description too long error
    pub fn description_too_long(len: usize, max: usize) -> Self {
        Self::new(ErrorKind::DescriptionTooLong { len })
            .with_help(format!("Shorten the description to at most {} characters", max))
    }

    /// Create a percentage out of range error
    pub fn percentage_out_of_range(percent: u32) -> Self {
        Self::new(ErrorKind::PercentageOutOfRange { percent })
            .with_help("Progress must be between 0 and 100 (inclusive)")
    }

    /// Create a wait timeout error
    pub fn wait_timeout(token: impl Into<String>, waited_ms: u128) -> Self {
        Self {
            cause: Some(format!("Waited {} ms", waited_ms)),
            ..Self::new(ErrorKind::WaitTimeout {
                token: token.into(),
            })
        }
    }

    /// Create an agent invocation error
    pub fn agent(program: impl Into<String>, cause: impl Into<String>) -> Self {
        let program = program.into();
        Self {
            help: Some(format!("Check that '{}' is installed and executable", program)),
            cause: Some(cause.into()),
            ..Self::new(ErrorKind::Agent { program })
        }
    }

    /// Add path context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Check whether this is a remaining-tokens error
    pub fn is_key_tokens_remaining(&self) -> bool {
        matches!(self.kind, ErrorKind::KeyTokensRemaining { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::EmptyKeyPath => write!(f, "Empty key path")?,
            ErrorKind::KeyTokensRemaining { remaining } => {
                write!(f, "Key tokens remaining: {}", remaining.join("."))?
            }
            ErrorKind::UnknownValueType { type_name } => {
                write!(f, "Unknown value type: {}", type_name)?
            }
            ErrorKind::NotFound { what } => write!(f, "Not found: {}", what)?,
            ErrorKind::NodeNotFound { fqdn } => {
                write!(f, "Failed to get node id for fqdn: {}", fqdn)?
            }
            ErrorKind::ConfigLoad { file } => {
                write!(f, "Failed to load metadata file: {}", file)?
            }
            ErrorKind::IndirectionDepthExceeded { limit } => {
                write!(f, "Indirection depth exceeded (limit {})", limit)?
            }
            ErrorKind::DescriptionTooLong { len } => {
                write!(f, "Description too long ({} characters)", len)?
            }
            ErrorKind::PercentageOutOfRange { percent } => {
                write!(f, "Percentage out of range: {}", percent)?
            }
            ErrorKind::WaitTimeout { token } => write!(f, "Timed out waiting for: {}", token)?,
            ErrorKind::Agent { program } => write!(f, "Failed to invoke agent: {}", program)?,
        }

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
