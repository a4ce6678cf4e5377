//! In-process mock collaborators
//!
//! Mirrors of the remote boundaries with scripted responses, call counting,
//! and per-operation failure injection, for unit and integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::api::{ApiError, BuildJob, BuildService, DeliveryCredentials, JobStatus};
use crate::store::{ObjectStore, StoreError};

/// Scriptable build service.
///
/// Defaults: credentials succeed, notify returns a pending job for
/// directories and a ready job (with a preview URL) for single files, and
/// polling repeats the last scripted status forever — `Pending` when no
/// script is set, which is the stub the exhaustion tests need.
pub struct MockBuildService {
    state: Mutex<ServiceState>,
}

struct ServiceState {
    preview_url: String,
    poll_script: Vec<JobStatus>,
    poll_calls: u32,
    notify_calls: u32,
    credential_calls: u32,
    fail_credentials: bool,
    fail_notify: bool,
    fail_poll: bool,
}

impl MockBuildService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState {
                preview_url: "https://previews.example.com/rel-1".to_string(),
                poll_script: Vec::new(),
                poll_calls: 0,
                notify_calls: 0,
                credential_calls: 0,
                fail_credentials: false,
                fail_notify: false,
                fail_poll: false,
            }),
        }
    }

    /// Statuses returned by successive poll calls; the last one repeats.
    pub fn script_poll(&self, statuses: Vec<JobStatus>) {
        self.state.lock().unwrap().poll_script = statuses;
    }

    pub fn fail_credentials(&self) {
        self.state.lock().unwrap().fail_credentials = true;
    }

    pub fn fail_notify(&self) {
        self.state.lock().unwrap().fail_notify = true;
    }

    pub fn fail_poll(&self) {
        self.state.lock().unwrap().fail_poll = true;
    }

    pub fn poll_calls(&self) -> u32 {
        self.state.lock().unwrap().poll_calls
    }

    pub fn notify_calls(&self) -> u32 {
        self.state.lock().unwrap().notify_calls
    }

    pub fn credential_calls(&self) -> u32 {
        self.state.lock().unwrap().credential_calls
    }
}

impl Default for MockBuildService {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildService for MockBuildService {
    fn retrieve_delivery_credentials(&self) -> Result<DeliveryCredentials, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.credential_calls += 1;
        if state.fail_credentials {
            return Err(ApiError::Api {
                status: 401,
                body: "invalid token".to_string(),
            });
        }
        Ok(DeliveryCredentials {
            access_key_id: "AKTEST".to_string(),
            secret_access_key: "secret".to_string(),
            bucket: "preview-uploads".to_string(),
            key_prefix: "tenants/acme".to_string(),
        })
    }

    fn notify_new_content(
        &self,
        _delivery_key: &str,
        is_directory: bool,
    ) -> Result<BuildJob, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.notify_calls += 1;
        if state.fail_notify {
            return Err(ApiError::Api {
                status: 500,
                body: "notify rejected".to_string(),
            });
        }

        if is_directory {
            Ok(BuildJob {
                release_id: "rel-1".to_string(),
                status: JobStatus::Pending,
                preview_url: None,
            })
        } else {
            Ok(BuildJob {
                release_id: "rel-1".to_string(),
                status: JobStatus::Ready,
                preview_url: Some(state.preview_url.clone()),
            })
        }
    }

    fn poll_job(&self, release_id: &str) -> Result<BuildJob, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.poll_calls += 1;
        if state.fail_poll {
            return Err(ApiError::Api {
                status: 502,
                body: "poll failed".to_string(),
            });
        }

        let idx = (state.poll_calls as usize - 1).min(state.poll_script.len().saturating_sub(1));
        let status = state.poll_script.get(idx).copied().unwrap_or(JobStatus::Pending);

        Ok(BuildJob {
            release_id: release_id.to_string(),
            status,
            preview_url: (status == JobStatus::Ready).then(|| state.preview_url.clone()),
        })
    }
}

/// Recording object store with per-operation failure injection.
pub struct MockObjectStore {
    state: Mutex<StoreState>,
}

struct StoreState {
    next_upload: u32,
    keys: HashMap<String, String>,
    parts: HashMap<String, Vec<(u32, Vec<u8>)>>,
    completed: Vec<String>,
    aborted: Vec<String>,
    fail_begin: bool,
    fail_part_at: Option<u32>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState {
                next_upload: 1,
                keys: HashMap::new(),
                parts: HashMap::new(),
                completed: Vec::new(),
                aborted: Vec::new(),
                fail_begin: false,
                fail_part_at: None,
            }),
        }
    }

    pub fn fail_begin(&self) {
        self.state.lock().unwrap().fail_begin = true;
    }

    /// Make the upload of the given part number fail.
    pub fn fail_part(&self, part_number: u32) {
        self.state.lock().unwrap().fail_part_at = Some(part_number);
    }

    /// The key a transfer was begun under.
    pub fn key_for(&self, upload_id: &str) -> Option<String> {
        self.state.lock().unwrap().keys.get(upload_id).cloned()
    }

    pub fn part_count(&self, upload_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .parts
            .get(upload_id)
            .map_or(0, Vec::len)
    }

    /// Parts concatenated in part-number order.
    pub fn assembled(&self, upload_id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let mut parts = state.parts.get(upload_id)?.clone();
        parts.sort_by_key(|(n, _)| *n);
        Some(parts.into_iter().flat_map(|(_, data)| data).collect())
    }

    pub fn completed(&self) -> Vec<String> {
        self.state.lock().unwrap().completed.clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.state.lock().unwrap().aborted.clone()
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MockObjectStore {
    fn begin(&self, _creds: &DeliveryCredentials, key: &str) -> Result<String, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_begin {
            return Err(StoreError::Transfer("initiate rejected".to_string()));
        }
        let upload_id = format!("up-{}", state.next_upload);
        state.next_upload += 1;
        state.keys.insert(upload_id.clone(), key.to_string());
        state.parts.insert(upload_id.clone(), Vec::new());
        Ok(upload_id)
    }

    fn upload_part(
        &self,
        _creds: &DeliveryCredentials,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_part_at == Some(part_number) {
            return Err(StoreError::Transfer(format!(
                "part {part_number} rejected"
            )));
        }
        state
            .parts
            .get_mut(upload_id)
            .ok_or_else(|| StoreError::Transfer(format!("unknown upload {upload_id}")))?
            .push((part_number, data.to_vec()));
        Ok(())
    }

    fn complete(
        &self,
        _creds: &DeliveryCredentials,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.completed.push(upload_id.to_string());
        Ok(())
    }

    fn abort(
        &self,
        _creds: &DeliveryCredentials,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.parts.remove(upload_id);
        state.aborted.push(upload_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_script_repeats_last_status() {
        let service = MockBuildService::new();
        service.script_poll(vec![JobStatus::Pending, JobStatus::Building]);

        assert_eq!(service.poll_job("rel-1").unwrap().status, JobStatus::Pending);
        assert_eq!(service.poll_job("rel-1").unwrap().status, JobStatus::Building);
        assert_eq!(service.poll_job("rel-1").unwrap().status, JobStatus::Building);
        assert_eq!(service.poll_calls(), 3);
    }

    #[test]
    fn test_unscripted_poll_never_terminates() {
        let service = MockBuildService::new();
        for _ in 0..5 {
            assert_eq!(service.poll_job("rel-1").unwrap().status, JobStatus::Pending);
        }
    }

    #[test]
    fn test_ready_poll_carries_preview_url() {
        let service = MockBuildService::new();
        service.script_poll(vec![JobStatus::Ready]);

        let job = service.poll_job("rel-1").unwrap();
        assert_eq!(job.status, JobStatus::Ready);
        assert!(job.preview_url.is_some());
    }

    #[test]
    fn test_store_records_key_and_parts() {
        let store = MockObjectStore::new();
        let creds = DeliveryCredentials {
            access_key_id: "a".to_string(),
            secret_access_key: "s".to_string(),
            bucket: "b".to_string(),
            key_prefix: "p".to_string(),
        };

        let id = store.begin(&creds, "p/abc-x.tgz").unwrap();
        store.upload_part(&creds, "p/abc-x.tgz", &id, 1, b"hello ").unwrap();
        store.upload_part(&creds, "p/abc-x.tgz", &id, 2, b"world").unwrap();
        store.complete(&creds, "p/abc-x.tgz", &id).unwrap();

        assert_eq!(store.key_for(&id).unwrap(), "p/abc-x.tgz");
        assert_eq!(store.assembled(&id).unwrap(), b"hello world");
        assert_eq!(store.completed(), vec![id]);
    }
}
