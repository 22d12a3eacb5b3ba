//! # Tower Slide
//!
//! `tower-slide` applies per-client sliding window limits to requests in the
//! [Tower](https://github.com/tower-rs/tower) ecosystem, using the counters from
//! [`slide_limit`].
//!
//! ## How a request is judged
//!
//! 1. **Rule Selection**: The first [`LimitRule`] in the [`RuleSet`] that matches the
//!    request wins; otherwise the global rule applies.
//! 2. **Keying**: Requests are counted per client (peer IP, then the first
//!    `X-Forwarded-For` entry). Route rules also count each path separately.
//! 3. **Admission**: Requests within the limit are forwarded. Others resolve
//!    immediately to the rule's error, [`LimitError::RateLimited`] by default,
//!    without reaching the inner service.
//!
//! Idle counters expire after a full window; [`spawn_sweeper`] reclaims them in
//! the background.
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`LimitError`] (429 with `Retry-After`, or
//!   500) and reads the client address from `ConnectInfo`.

mod config;
mod error;
mod layer;
mod request;
mod rule;
mod service;
mod sweeper;


pub use config::LimiterConfig;
pub use config::RouteRuleConfig;
pub use error::LimitError;
pub use layer::RateLimitLayer;
pub use request::RoutedRequest;
pub use request::sanitize_path;
pub use rule::GLOBAL_RULE;
pub use rule::KEY_PREFIX;
pub use rule::LimitRule;
pub use rule::RuleSet;
pub use rule::UNKNOWN_CLIENT;
pub use service::RateLimitService;
pub use service::ResponseFuture;
pub use sweeper::SweeperHandle;
pub use sweeper::spawn_sweeper;
