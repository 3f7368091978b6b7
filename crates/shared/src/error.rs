use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} rejected credentials ({status}): {body}")]
    Auth {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} rate limit exceeded: {body}")]
    RateLimited { service: &'static str, body: String },

    #[error("{service} server error ({status}): {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned error ({status}): {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {service}: {detail}")]
    MalformedResponse {
        service: &'static str,
        detail: String,
    },

    #[error("{service} returned an empty response")]
    EmptyResponse { service: &'static str },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transport(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Error::Transport { service, source }
    }

    pub fn malformed(service: &'static str, detail: impl ToString) -> Self {
        Error::MalformedResponse {
            service,
            detail: detail.to_string(),
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(service: &'static str, status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => Error::Auth {
                service,
                status: status.as_u16(),
                body,
            },
            429 => Error::RateLimited { service, body },
            s if status.is_server_error() => Error::Upstream {
                service,
                status: s,
                body,
            },
            s => Error::Api {
                service,
                status: s,
                body,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. }
                | Error::RateLimited { .. }
                | Error::Upstream { .. }
                | Error::EmptyResponse { .. }
        )
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }
}

/// Turn a non-success response into a classified error, reading the body for context.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("unknown error"));
    Err(Error::from_status(service, status, body))
}
