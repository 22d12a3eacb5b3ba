use std::net::SocketAddr;

/// What the middleware needs to know about a request.
pub trait RoutedRequest {
    /// The request path, used for route matching and per-route keys.
    fn path(&self) -> &str;

    /// An identifier for the calling client, if one can be derived.
    fn client_key(&self) -> Option<String>;
}

impl<B> RoutedRequest for http::Request<B> {
    fn path(&self) -> &str {
        self.uri().path()
    }

    /// The peer IP if a `SocketAddr` was stored in the request extensions,
    /// otherwise the first `X-Forwarded-For` entry.
    fn client_key(&self) -> Option<String> {
        if let Some(addr) = self.extensions().get::<SocketAddr>() {
            return Some(addr.ip().to_string());
        }

        #[cfg(feature = "axum")]
        if let Some(axum::extract::ConnectInfo(addr)) = self
            .extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
        {
            return Some(addr.ip().to_string());
        }

        self.headers()
            .get("x-forwarded-for")
            .and_then(|xff| xff.to_str().ok())
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_owned)
    }
}

/// Strips a single trailing `/`.
pub fn sanitize_path(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}
