use thiserror::Error;

/// Errors surfaced by the fallible parts of the companion.
///
/// The estimation and alarm paths never produce these; they degrade to the
/// last known good state instead.
#[derive(Error, Debug)]
pub enum CompanionError {
    #[error("Session already tracking")]
    AlreadyTracking,

    #[error("Session not tracking")]
    NotTracking,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CompanionResult<T> = Result<T, CompanionError>;

/// Route fetch failures from a directions backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("No route found")]
    NoRoute,

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Failure of a single alarm side effect (audio, haptics, notification)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    #[error("{0} blocked: {1}")]
    Blocked(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors: Vec<CompanionError> = vec![
            CompanionError::AlreadyTracking,
            CompanionError::NotTracking,
            CompanionError::Config("bad".to_string()),
            CompanionError::Settings("bad".to_string()),
            RouteError::Http(503).into(),
            std::io::Error::new(std::io::ErrorKind::Other, "disk").into(),
        ];

        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_output_error_names_capability() {
        let err = OutputError::Blocked("audio", "no user gesture".to_string());
        assert_eq!(err.to_string(), "audio blocked: no user gesture");
    }
}
