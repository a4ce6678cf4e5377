//! End-to-end preview pipeline
//!
//! One synchronous run: archive the source, digest the archive, fetch
//! delivery credentials, upload in parts, notify the build service, then
//! poll directory builds to a terminal status. The temporary archive is
//! owned by a drop guard for the whole run, so every exit path, success,
//! failure, or cancellation, removes it.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::api::{ApiError, BuildService, JobStatus};
use crate::archive::{ArchiveError, ArchiveSummary, Archiver, TempArchive};
use crate::cancel::CancelToken;
use crate::digest::{ContentDigest, DigestError};
use crate::progress::ProgressSink;
use crate::store::{ObjectStore, StoreError, Uploader, MIN_PART_SIZE};

/// Archive file name used when the config does not override it.
pub const DEFAULT_ARCHIVE_NAME: &str = "preview-content.tgz";

/// Errors for a pipeline run, tagged by the stage that failed.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("archive failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("digest failed: {0}")]
    Digest(#[from] DigestError),

    #[error("could not retrieve delivery credentials ({source}); check api_token in {}", path.display())]
    Auth {
        #[source]
        source: ApiError,
        path: PathBuf,
    },

    #[error("upload failed: {0}")]
    Upload(#[from] StoreError),

    #[error("content notification failed: {0}")]
    Notify(#[source] ApiError),

    #[error("status poll failed: {0}")]
    Poll(#[source] ApiError),

    #[error("remote build failed")]
    BuildFailed,

    #[error("build not ready after {attempts} status checks")]
    PollExhausted { attempts: u32 },

    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Archive(_) | PipelineError::Io(_) => 10,
            PipelineError::Digest(_) => 11,
            PipelineError::Auth { .. } => 20,
            PipelineError::Upload(_) => 30,
            PipelineError::Notify(_) => 40,
            PipelineError::Poll(_) => 41,
            PipelineError::BuildFailed => 50,
            PipelineError::PollExhausted { .. } => 51,
            PipelineError::Cancelled => 80,
        }
    }
}

/// Tunables for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Where the temporary archive is written.
    pub archive_path: PathBuf,
    /// Upload part size in bytes; clamped up to the 5 MiB protocol floor.
    pub part_size: usize,
    /// Fixed status-check budget for directory builds.
    pub poll_attempts: u32,
    /// Delay between status checks.
    pub poll_interval: Duration,
    /// Settings file named in credential-failure guidance.
    pub config_path: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_path: PathBuf::from(DEFAULT_ARCHIVE_NAME),
            part_size: MIN_PART_SIZE,
            poll_attempts: 20,
            poll_interval: Duration::from_secs(1),
            config_path: crate::config::default_path(),
        }
    }
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub preview_url: String,
    pub release_id: String,
    pub delivery_key: String,
    pub archive: ArchiveSummary,
}

enum PollOutcome {
    Ready(String),
    Failed,
    Exhausted,
}

/// Drives one source path through archive, upload, notify, and poll.
pub struct Pipeline<'a> {
    config: PipelineConfig,
    service: &'a dyn BuildService,
    store: &'a dyn ObjectStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: PipelineConfig,
        service: &'a dyn BuildService,
        store: &'a dyn ObjectStore,
    ) -> Self {
        Self {
            config,
            service,
            store,
        }
    }

    /// Run the pipeline for `source`.
    ///
    /// Directory sources are polled to a terminal status; single files use
    /// the notify response directly. Cancellation is checked between stages
    /// and between poll attempts, never mid-part.
    pub fn run(
        &self,
        source: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<PipelineReport, PipelineError> {
        let meta = fs::metadata(source)
            .map_err(|_| ArchiveError::SourceMissing(source.to_path_buf()))?;
        let is_directory = meta.is_dir();
        self.check_cancel(cancel)?;

        // Guard taken before any bytes land on disk; a partial archive from
        // a failed create is removed the same as a finished one.
        let guard = TempArchive::new(&self.config.archive_path);
        let summary = Archiver::new(source).create(guard.path())?;
        self.check_cancel(cancel)?;

        let mut archive = File::open(guard.path())?;
        let digest = ContentDigest::from_reader(&mut archive)?;
        self.check_cancel(cancel)?;

        let creds = self
            .service
            .retrieve_delivery_credentials()
            .map_err(|source| PipelineError::Auth {
                source,
                path: self.config.config_path.clone(),
            })?;
        self.check_cancel(cancel)?;

        let archive_name = guard
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string());

        let key = Uploader::new(self.config.part_size).upload(
            self.store,
            &creds,
            &digest,
            &archive_name,
            archive,
            sink,
        )?;
        self.check_cancel(cancel)?;

        let job = self
            .service
            .notify_new_content(key.as_str(), is_directory)
            .map_err(PipelineError::Notify)?;

        let preview_url = if is_directory {
            match self.poll_until_terminal(&job.release_id, cancel)? {
                PollOutcome::Ready(url) => url,
                PollOutcome::Failed => return Err(PipelineError::BuildFailed),
                PollOutcome::Exhausted => {
                    return Err(PipelineError::PollExhausted {
                        attempts: self.config.poll_attempts,
                    })
                }
            }
        } else {
            // Single files build synchronously remotely; the notify snapshot
            // is already terminal.
            match job.status {
                JobStatus::Failed => return Err(PipelineError::BuildFailed),
                _ => job
                    .preview_url
                    .ok_or(PipelineError::Notify(ApiError::MissingPreviewUrl))?,
            }
        };

        Ok(PipelineReport {
            preview_url,
            release_id: job.release_id,
            delivery_key: key.as_str().to_string(),
            archive: summary,
        })
    }

    /// Query status up to the configured budget; the budget never grows,
    /// even when every response is still in flight.
    fn poll_until_terminal(
        &self,
        release_id: &str,
        cancel: &CancelToken,
    ) -> Result<PollOutcome, PipelineError> {
        for attempt in 1..=self.config.poll_attempts {
            self.check_cancel(cancel)?;

            let job = self
                .service
                .poll_job(release_id)
                .map_err(PipelineError::Poll)?;

            if job.status.is_terminal() {
                if job.status == JobStatus::Failed {
                    return Ok(PollOutcome::Failed);
                }
                let url = job
                    .preview_url
                    .ok_or(PipelineError::Poll(ApiError::MissingPreviewUrl))?;
                return Ok(PollOutcome::Ready(url));
            }

            if attempt < self.config.poll_attempts {
                thread::sleep(self.config.poll_interval);
            }
        }
        Ok(PollOutcome::Exhausted)
    }

    fn check_cancel(&self, cancel: &CancelToken) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBuildService, MockObjectStore};
    use crate::progress::CountingSink;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> PipelineConfig {
        PipelineConfig {
            archive_path: dir.path().join(DEFAULT_ARCHIVE_NAME),
            poll_interval: Duration::from_millis(0),
            ..PipelineConfig::default()
        }
    }

    fn write_source_dir(dir: &TempDir) -> PathBuf {
        let source = dir.path().join("site");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("index.md"), "# hello").unwrap();
        fs::write(source.join("notes.md"), "notes").unwrap();
        source
    }

    #[test]
    fn test_directory_run_polls_to_ready() {
        let dir = TempDir::new().unwrap();
        let source = write_source_dir(&dir);
        let service = MockBuildService::new();
        service.script_poll(vec![
            JobStatus::Pending,
            JobStatus::Building,
            JobStatus::Ready,
        ]);
        let store = MockObjectStore::new();
        let sink = CountingSink::new();

        let config = test_config(&dir);
        let archive_path = config.archive_path.clone();
        let pipeline = Pipeline::new(config, &service, &store);
        let report = pipeline.run(&source, &sink, &CancelToken::new()).unwrap();

        assert_eq!(report.preview_url, "https://previews.example.com/rel-1");
        assert_eq!(service.notify_calls(), 1);
        assert_eq!(service.poll_calls(), 3);
        assert_eq!(store.completed().len(), 1);
        assert!(sink.total() > 0);
        assert!(!archive_path.exists());
    }

    #[test]
    fn test_single_file_skips_polling() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("page.md");
        fs::write(&source, "# page").unwrap();
        let service = MockBuildService::new();
        let store = MockObjectStore::new();

        let pipeline = Pipeline::new(test_config(&dir), &service, &store);
        let report = pipeline
            .run(&source, &CountingSink::new(), &CancelToken::new())
            .unwrap();

        assert_eq!(report.preview_url, "https://previews.example.com/rel-1");
        assert_eq!(service.poll_calls(), 0);
    }

    #[test]
    fn test_poll_budget_is_fixed() {
        let dir = TempDir::new().unwrap();
        let source = write_source_dir(&dir);
        // Unscripted mock never leaves Pending.
        let service = MockBuildService::new();
        let store = MockObjectStore::new();

        let pipeline = Pipeline::new(test_config(&dir), &service, &store);
        let err = pipeline
            .run(&source, &CountingSink::new(), &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, PipelineError::PollExhausted { attempts: 20 }));
        assert_eq!(service.poll_calls(), 20);
    }

    #[test]
    fn test_failed_build_is_surfaced() {
        let dir = TempDir::new().unwrap();
        let source = write_source_dir(&dir);
        let service = MockBuildService::new();
        service.script_poll(vec![JobStatus::Building, JobStatus::Failed]);
        let store = MockObjectStore::new();

        let pipeline = Pipeline::new(test_config(&dir), &service, &store);
        let err = pipeline
            .run(&source, &CountingSink::new(), &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, PipelineError::BuildFailed));
        assert_eq!(err.exit_code(), 50);
    }

    #[test]
    fn test_missing_source_fails_before_any_remote_call() {
        let dir = TempDir::new().unwrap();
        let service = MockBuildService::new();
        let store = MockObjectStore::new();

        let pipeline = Pipeline::new(test_config(&dir), &service, &store);
        let err = pipeline
            .run(
                &dir.path().join("absent"),
                &CountingSink::new(),
                &CancelToken::new(),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Archive(ArchiveError::SourceMissing(_))
        ));
        assert_eq!(service.credential_calls(), 0);
        assert_eq!(service.notify_calls(), 0);
    }

    #[test]
    fn test_archive_removed_after_credential_failure() {
        let dir = TempDir::new().unwrap();
        let source = write_source_dir(&dir);
        let service = MockBuildService::new();
        service.fail_credentials();
        let store = MockObjectStore::new();

        let config = test_config(&dir);
        let archive_path = config.archive_path.clone();
        let pipeline = Pipeline::new(config, &service, &store);
        let err = pipeline
            .run(&source, &CountingSink::new(), &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, PipelineError::Auth { .. }));
        assert_eq!(err.exit_code(), 20);
        assert!(!archive_path.exists());
    }

    #[test]
    fn test_credential_failure_names_config_file() {
        let dir = TempDir::new().unwrap();
        let source = write_source_dir(&dir);
        let service = MockBuildService::new();
        service.fail_credentials();
        let store = MockObjectStore::new();

        let config = PipelineConfig {
            config_path: PathBuf::from("/home/tester/.config/preview-lane/config.toml"),
            ..test_config(&dir)
        };
        let pipeline = Pipeline::new(config, &service, &store);
        let err = pipeline
            .run(&source, &CountingSink::new(), &CancelToken::new())
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("check api_token in /home/tester/.config/preview-lane/config.toml"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let source = write_source_dir(&dir);
        let service = MockBuildService::new();
        let store = MockObjectStore::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let config = test_config(&dir);
        let archive_path = config.archive_path.clone();
        let pipeline = Pipeline::new(config, &service, &store);
        let err = pipeline
            .run(&source, &CountingSink::new(), &cancel)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(err.exit_code(), 80);
        assert_eq!(service.credential_calls(), 0);
        assert!(!archive_path.exists());
    }
}
