use std::path::PathBuf;
use std::process::ExitCode;

/// Errors that cause concierge to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("session logged out; pair the bridge again before restarting")]
    LoggedOut,

    #[error("bridge failed: {0}")]
    Bridge(String),

    #[error("state error: {0}")]
    State(#[from] StoreError),

    #[error("{0}")]
    Other(String),
}

impl ExitError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ExitError::Config(_) => ExitCode::from(2),
            ExitError::LoggedOut => ExitCode::from(3),
            ExitError::Bridge(_) => ExitCode::from(4),
            ExitError::State(_) => ExitCode::from(5),
            ExitError::Other(_) => ExitCode::from(1),
        }
    }
}

/// Failures reading or writing the on-disk state collections.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file exists but does not hold the expected JSON shape. Never recovered.
    #[error("malformed state in {path}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("encoding {path}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_state_names_the_file() {
        let source = serde_json::from_str::<Vec<String>>("{not json").unwrap_err();
        let err = StoreError::Malformed {
            path: PathBuf::from("/tmp/state/blocklist.json"),
            source,
        };
        assert!(err.to_string().contains("blocklist.json"));
        let exit: ExitError = err.into();
        assert!(exit.to_string().starts_with("state error: malformed state"));
    }
}
