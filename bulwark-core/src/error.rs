// Error types for the Bulwark request pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too Many Requests: {0}")]
    TooManyRequests(String),

    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(String),
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Deserialization(_) | Error::BadRequest(_) => 400,
            Error::Forbidden(_) => 403,
            Error::TooManyRequests(_) => 429,
            Error::ServiceUnavailable(_) => 503,

            // Default to 500 for unmapped errors
            _ => 500,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::BadRequest("x".into()).status_code(), 400);
        assert_eq!(Error::TooManyRequests("x".into()).status_code(), 429);
        assert_eq!(Error::ServiceUnavailable("x".into()).status_code(), 503);
        assert_eq!(Error::Internal("x".into()).status_code(), 500);
        assert_eq!(Error::Http("x".into()).status_code(), 500);
    }

    #[test]
    fn test_error_classes() {
        assert!(Error::TooManyRequests("slow down".into()).is_client_error());
        assert!(!Error::TooManyRequests("slow down".into()).is_server_error());
        assert!(Error::Internal("boom".into()).is_server_error());
    }
}
