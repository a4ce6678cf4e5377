//! Remote build service boundary
//!
//! Types and the consumed-capability trait for the service that issues
//! short-lived delivery credentials, accepts new-content notifications, and
//! reports build job status.

mod http;

pub use http::HttpBuildService;

use serde::{Deserialize, Serialize};

/// Short-lived credentials for the delivery object store.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub key_prefix: String,
}

/// Remote build job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Building,
    Ready,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Ready | JobStatus::Failed)
    }
}

/// Snapshot of a remote build job, as returned by notify and poll.
///
/// The job itself lives remotely; the client only tracks it by identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub release_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

/// Errors from the build service boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid API token")]
    InvalidToken,

    #[error("response missing preview URL")]
    MissingPreviewUrl,
}

/// Consumed capability: the remote build service.
pub trait BuildService: Send + Sync {
    /// Fetch delivery credentials for the object store.
    fn retrieve_delivery_credentials(&self) -> Result<DeliveryCredentials, ApiError>;

    /// Announce that new content is available at `delivery_key`.
    ///
    /// Single-file content builds synchronously on the remote side, so the
    /// returned snapshot may already be terminal.
    fn notify_new_content(&self, delivery_key: &str, is_directory: bool)
        -> Result<BuildJob, ApiError>;

    /// Query the job's current status by identifier.
    fn poll_job(&self, release_id: &str) -> Result<BuildJob, ApiError>;
}
