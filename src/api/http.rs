//! HTTP implementation of the build service boundary.
//!
//! Blocking `reqwest` client with Bearer token authentication; the pipeline
//! is synchronous end to end, so no async runtime is involved.

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;

use super::{ApiError, BuildJob, BuildService, DeliveryCredentials};

pub struct HttpBuildService {
    http: Client,
    base_url: String,
}

impl HttpBuildService {
    /// Creates a client authenticated with the given API token.
    pub fn new(base_url: impl Into<String>, api_token: &str) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_token}"))
                .map_err(|_| ApiError::InvalidToken)?,
        );

        let http = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn check(resp: Response) -> Result<Response, ApiError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

impl BuildService for HttpBuildService {
    fn retrieve_delivery_credentials(&self) -> Result<DeliveryCredentials, ApiError> {
        let resp = self
            .http
            .get(format!("{}/delivery/credentials", self.base_url))
            .send()?;
        Ok(Self::check(resp)?.json()?)
    }

    fn notify_new_content(
        &self,
        delivery_key: &str,
        is_directory: bool,
    ) -> Result<BuildJob, ApiError> {
        let resp = self
            .http
            .post(format!("{}/releases", self.base_url))
            .json(&json!({
                "delivery_key": delivery_key,
                "is_directory": is_directory,
            }))
            .send()?;
        Ok(Self::check(resp)?.json()?)
    }

    fn poll_job(&self, release_id: &str) -> Result<BuildJob, ApiError> {
        let resp = self
            .http
            .get(format!("{}/releases/{}", self.base_url, release_id))
            .send()?;
        Ok(Self::check(resp)?.json()?)
    }
}
