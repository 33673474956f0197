//! Configuration error types with actionable messages.

use std::fmt;

/// Configuration errors, each carrying enough context to fix the setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A value outside its accepted range or format.
    Invalid {
        /// Dotted path of the offending setting.
        setting: String,
        /// What is wrong.
        message: String,
        /// How to fix it.
        fix_hint: String,
    },
    /// The same name configured twice where names must be unique.
    Duplicate {
        /// What kind of entry is duplicated.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },
    /// Multiple errors occurred.
    Multiple(Vec<ConfigurationError>),
}

impl std::error::Error for ConfigurationError {}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid {
                setting,
                message,
                fix_hint,
            } => {
                write!(
                    f,
                    "Invalid configuration for {setting}: {message}\n\nHow to fix: {fix_hint}"
                )
            }
            Self::Duplicate { kind, name } => {
                write!(f, "Duplicate {kind} in bootstrap configuration: {name}")
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple configuration errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "\n{}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl ConfigurationError {
    #[must_use]
    pub fn invalid(
        setting: impl Into<String>,
        message: impl Into<String>,
        fix_hint: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            setting: setting.into(),
            message: message.into(),
            fix_hint: fix_hint.into(),
        }
    }

    #[must_use]
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind,
            name: name.into(),
        }
    }

    /// Collapse a list of errors: `Ok` when empty, the error itself when
    /// alone, `Multiple` otherwise.
    pub fn collect(mut errors: Vec<ConfigurationError>) -> ConfigResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigurationError>;
