use slide_limit::WindowError;

/// Errors produced by the Tower Slide middleware.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LimitError {
    /// The client has used its allowance for the current window.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("Rate limit exceeded; retry after {retry_after:?}")]
    RateLimited {
        /// The duration to wait before retrying.
        retry_after: std::time::Duration,
    },

    /// The limiter configuration is unusable.
    #[error("Invalid rate limit configuration: {0}")]
    Config(String),

    /// No counter could be built for the matched rule.
    ///
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Rate limit counter unavailable: {0}")]
    Window(#[from] WindowError),
}

impl LimitError {
    /// Whole seconds to advertise in a `Retry-After` header, rounded up and
    /// never less than one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
            Self::Config(_) | Self::Window(_) => None,
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for LimitError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, msg, headers) = match self {
            Self::RateLimited { .. } => {
                let secs = self.retry_after_secs().unwrap_or(1);
                let val = axum::http::HeaderValue::from(secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too many requests.".to_string(),
                    Some((axum::http::header::RETRY_AFTER, val)),
                )
            }
            Self::Config(_) | Self::Window(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), None)
            }
        };

        let mut response = (status, msg).into_response();
        if let Some((name, value)) = headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}
