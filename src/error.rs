/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum WallarmError {
    /// Request body could not be encoded to JSON.
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
    /// Network or request execution error from `reqwest`, after all retries.
    #[error("transport error: {method} {path} failed after {attempts} attempt(s): {source}")]
    Transport {
        method: String,
        path: String,
        /// Number of physical round-trips performed.
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    /// Response body could not be read after a terminal status.
    #[error("could not read response body for {method} {path}: {source}")]
    Read {
        method: String,
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unauthorized: HTTP Status: {status}, Body: {body}")]
    Unauthorized { status: u16, body: String },
    #[error("forbidden: HTTP Status: {status}, Body: {body}")]
    Forbidden { status: u16, body: String },
    /// Rate limiting or an unavailable upstream (502/503/504/522/523/524).
    #[error("upstream unavailable: HTTP Status: {status}, Body: {body}")]
    Upstream { status: u16, body: String },
    /// The resource was already created earlier, outside of this client.
    #[error("this resource has already been created earlier: HTTP Status: {status}, Body: {body}")]
    ExistingResource { status: u16, body: String },
    /// Non-success HTTP status code with raw response body.
    #[error("HTTP Status: {status}, Body: {body}")]
    Http { status: u16, body: String },
    /// The caller's cancellation token fired before the call completed.
    #[error("request cancelled")]
    Cancelled,
    /// HTTP request could not be constructed.
    #[error("HTTP request creation failed: {0}")]
    Request(#[source] reqwest::Error),
    /// Base URL and path do not form a valid URL.
    #[error("invalid request URL {0}")]
    InvalidUrl(String),
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
    /// Success body did not match the expected response shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl WallarmError {
    /// Returns `true` for the "already exists" condition that idempotent
    /// provisioning code is expected to skip.
    pub fn is_existing_resource(&self) -> bool {
        matches!(self, Self::ExistingResource { .. })
    }

    /// HTTP status attached to this error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status, .. }
            | Self::Forbidden { status, .. }
            | Self::Upstream { status, .. }
            | Self::ExistingResource { status, .. }
            | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body attached to this error, if a response was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { body, .. }
            | Self::Forbidden { body, .. }
            | Self::Upstream { body, .. }
            | Self::ExistingResource { body, .. }
            | Self::Http { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WallarmError;

    #[test]
    fn existing_resource_is_distinguished() {
        let err = WallarmError::ExistingResource {
            status: 409,
            body: "conflict".to_owned(),
        };
        assert!(err.is_existing_resource());
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.body(), Some("conflict"));

        let generic = WallarmError::Http {
            status: 409,
            body: "conflict".to_owned(),
        };
        assert!(!generic.is_existing_resource());
    }

    #[test]
    fn non_http_errors_have_no_status() {
        assert_eq!(WallarmError::Cancelled.status(), None);
        assert_eq!(WallarmError::Config("x".to_owned()).body(), None);
    }

    #[test]
    fn http_error_display_carries_status_and_body() {
        let err = WallarmError::Http {
            status: 418,
            body: "teapot".to_owned(),
        };
        assert_eq!(err.to_string(), "HTTP Status: 418, Body: teapot");
    }
}
