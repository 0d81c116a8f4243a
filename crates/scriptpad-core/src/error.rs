//! Error types for scriptpad-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for scriptpad-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised outside script execution.
///
/// Script failures are not errors at this level: they are reported on the
/// session's output sink (see [`crate::execute::Failure`]).
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a configuration or script file.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for [`crate::EngineConfig`].
    #[error("invalid configuration in {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_read_error_names_the_path() {
        let err = Error::Read {
            path: PathBuf::from("/scripts/missing.csx"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.to_string(), "failed to read /scripts/missing.csx: not found");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_config_error_keeps_json_cause() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = Error::Config {
            path: PathBuf::from("config.json"),
            source,
        };
        assert!(err.to_string().starts_with("invalid configuration in config.json: "));
        assert!(err.source().is_some());
    }
}
