pub mod http;
pub mod types;

use crate::timeline::Timeline;
use std::fmt;
use std::future::Future;

pub use http::HttpBackend;
pub use types::{DemosOut, MapOut, ProgressOut, StartParseIn, StartParseOut};

/// Opaque job identifier issued by the parse service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("server error: {0}")]
    Server(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl BackendError {
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }
}

/// The remote parse service. All calls are independent reads or a single
/// submission; none of them retry internally.
pub trait Backend: Clone + Send + Sync + 'static {
    fn list_demos(&self) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send;

    fn start_parse(
        &self,
        req: &StartParseIn,
    ) -> impl Future<Output = Result<JobId, BackendError>> + Send;

    fn progress(&self, job: &JobId)
    -> impl Future<Output = Result<ProgressOut, BackendError>> + Send;

    fn result(&self, job: &JobId) -> impl Future<Output = Result<Timeline, BackendError>> + Send;

    /// Authoritative image URL for a (sanitized) map name; `None` when the
    /// server does not know the map.
    fn map_url(&self, name: &str)
    -> impl Future<Output = Result<Option<String>, BackendError>> + Send;

    /// Raw bytes of an asset, addressed by absolute URL or server-relative path.
    fn fetch_asset(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, BackendError>> + Send;
}
