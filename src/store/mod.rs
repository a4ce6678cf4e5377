//! Object store boundary and the chunked uploader
//!
//! The store is a consumed capability speaking a multipart protocol:
//! begin, upload parts, then complete or abort. The uploader streams the
//! archive through a progress-observing reader in fixed-size parts and
//! never leaves an aborted transfer's parts behind remotely.

mod http;

pub use http::HttpObjectStore;

use std::io::{self, Read};

use crate::api::DeliveryCredentials;
use crate::digest::{ContentDigest, DeliveryKey};
use crate::progress::{ProgressReader, ProgressSink};

/// Protocol floor for multipart part size (5 MiB).
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Errors from the object store boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Consumed capability: a remote object store with multipart transfer.
///
/// Aborting an incomplete transfer must discard its parts remotely; the
/// uploader relies on that to avoid billable orphans after a failure.
pub trait ObjectStore: Send + Sync {
    /// Start a multipart transfer for `key`; returns the transfer id.
    fn begin(&self, creds: &DeliveryCredentials, key: &str) -> Result<String, StoreError>;

    fn upload_part(
        &self,
        creds: &DeliveryCredentials,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
    ) -> Result<(), StoreError>;

    fn complete(
        &self,
        creds: &DeliveryCredentials,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError>;

    fn abort(
        &self,
        creds: &DeliveryCredentials,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StoreError>;
}

/// Streams archive bytes to the object store in fixed-size parts.
pub struct Uploader {
    part_size: usize,
}

impl Uploader {
    /// `part_size` is clamped up to the store's 5 MiB protocol floor.
    pub fn new(part_size: usize) -> Self {
        Self {
            part_size: part_size.max(MIN_PART_SIZE),
        }
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Uploads `source` under `{key_prefix}/{digest}-{archive_name}` and
    /// returns the delivery key.
    ///
    /// Reads happen through a [`ProgressReader`] so the caller sees progress
    /// as bytes are read, not as parts complete. On any part failure the
    /// transfer is aborted remotely (best-effort) before the original error
    /// is surfaced. There is no whole-object retry here.
    pub fn upload<R: Read>(
        &self,
        store: &dyn ObjectStore,
        creds: &DeliveryCredentials,
        digest: &ContentDigest,
        archive_name: &str,
        source: R,
        sink: &dyn ProgressSink,
    ) -> Result<DeliveryKey, StoreError> {
        let key = DeliveryKey::derive(&creds.key_prefix, digest, archive_name);
        let mut reader = ProgressReader::new(source, sink);
        let upload_id = store.begin(creds, key.as_str())?;

        let mut buf = vec![0u8; self.part_size];
        let mut part_number = 1u32;
        let result = loop {
            match read_full(&mut reader, &mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    if let Err(e) =
                        store.upload_part(creds, key.as_str(), &upload_id, part_number, &buf[..n])
                    {
                        break Err(e);
                    }
                    part_number += 1;
                    if n < buf.len() {
                        break Ok(());
                    }
                }
                Err(e) => break Err(StoreError::Io(e)),
            }
        };

        match result {
            Ok(()) => match store.complete(creds, key.as_str(), &upload_id) {
                Ok(()) => Ok(key),
                Err(e) => {
                    let _ = store.abort(creds, key.as_str(), &upload_id);
                    Err(e)
                }
            },
            Err(e) => {
                // Do not mask the part failure with an abort failure.
                let _ = store.abort(creds, key.as_str(), &upload_id);
                Err(e)
            }
        }
    }
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
