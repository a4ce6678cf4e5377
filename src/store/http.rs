//! HTTP implementation of the multipart object store protocol.
//!
//! S3-style REST shape: initiate with `?uploads`, parts with
//! `?uploadId=&partNumber=`, then complete (POST) or abort (DELETE).
//! Delivery credentials are passed per request.

use reqwest::blocking::{Client, Response};
use serde_json::Value;

use super::{ObjectStore, StoreError};
use crate::api::DeliveryCredentials;

pub struct HttpObjectStore {
    http: Client,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            http: Client::builder().build()?,
            endpoint: endpoint.into(),
        })
    }

    fn object_url(&self, creds: &DeliveryCredentials, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, creds.bucket, key)
    }

    fn check(resp: Response, context: &str) -> Result<Response, StoreError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Transfer(format!(
                "{context} failed with status {status}"
            )));
        }
        Ok(resp)
    }
}

impl ObjectStore for HttpObjectStore {
    fn begin(&self, creds: &DeliveryCredentials, key: &str) -> Result<String, StoreError> {
        let resp = self
            .http
            .post(format!("{}?uploads", self.object_url(creds, key)))
            .basic_auth(&creds.access_key_id, Some(&creds.secret_access_key))
            .send()?;

        let body: Value = Self::check(resp, "initiate")?.json()?;
        body.get("upload_id")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| StoreError::Transfer("initiate response missing upload_id".to_string()))
    }

    fn upload_part(
        &self,
        creds: &DeliveryCredentials,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let resp = self
            .http
            .put(format!(
                "{}?uploadId={}&partNumber={}",
                self.object_url(creds, key),
                upload_id,
                part_number
            ))
            .basic_auth(&creds.access_key_id, Some(&creds.secret_access_key))
            .body(data.to_vec())
            .send()?;

        Self::check(resp, "part upload")?;
        Ok(())
    }

    fn complete(
        &self,
        creds: &DeliveryCredentials,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        let resp = self
            .http
            .post(format!(
                "{}?uploadId={}",
                self.object_url(creds, key),
                upload_id
            ))
            .basic_auth(&creds.access_key_id, Some(&creds.secret_access_key))
            .send()?;

        Self::check(resp, "complete")?;
        Ok(())
    }

    fn abort(
        &self,
        creds: &DeliveryCredentials,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        let resp = self
            .http
            .delete(format!(
                "{}?uploadId={}",
                self.object_url(creds, key),
                upload_id
            ))
            .basic_auth(&creds.access_key_id, Some(&creds.secret_access_key))
            .send()?;

        Self::check(resp, "abort")?;
        Ok(())
    }
}
