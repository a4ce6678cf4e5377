//! Content addressing for archive bytes
//!
//! The digest is SHA-256 over the compressed archive stream, encoded with
//! the URL-safe base64 alphabet so it can embed directly in a key path
//! segment. Digest equality therefore implies byte-identical archives.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use sha2::{Digest as _, Sha256};

/// Errors for digest computation
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("read failed while hashing: {0}")]
    Read(#[source] io::Error),

    /// The source could not be repositioned to the start; it cannot be
    /// safely re-read without reopening.
    #[error("could not rewind source after hashing: {0}")]
    Rewind(#[source] io::Error),
}

/// URL-safe-encoded SHA-256 over the archive byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Hashes `source` to EOF exactly once, then seeks it back to the start
    /// so the next stage can re-read it.
    pub fn from_reader<R: Read + Seek>(source: &mut R) -> Result<Self, DigestError> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buf).map_err(DigestError::Read)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        source
            .seek(SeekFrom::Start(0))
            .map_err(DigestError::Rewind)?;

        Ok(Self(URL_SAFE.encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full addressing string for the archive at the remote object store.
///
/// Derived as `{prefix}/{digest}-{archive_name}`; identical content always
/// lands on the same key, which is what deduplicates storage remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryKey(String);

impl DeliveryKey {
    pub fn derive(prefix: &str, digest: &ContentDigest, archive_name: &str) -> Self {
        Self(format!("{}/{}-{}", prefix, digest.as_str(), archive_name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_digest_is_deterministic() {
        let mut a = Cursor::new(b"the same bytes".to_vec());
        let mut b = Cursor::new(b"the same bytes".to_vec());

        let da = ContentDigest::from_reader(&mut a).unwrap();
        let db = ContentDigest::from_reader(&mut b).unwrap();
        assert_eq!(da, db);
    }

    #[test]
    fn test_digest_changes_with_content() {
        let mut a = Cursor::new(b"payload one".to_vec());
        let mut b = Cursor::new(b"payload two".to_vec());

        let da = ContentDigest::from_reader(&mut a).unwrap();
        let db = ContentDigest::from_reader(&mut b).unwrap();
        assert_ne!(da, db);
    }

    #[test]
    fn test_source_is_rewound() {
        let mut source = Cursor::new(b"abcdef".to_vec());
        ContentDigest::from_reader(&mut source).unwrap();
        assert_eq!(source.position(), 0);

        let mut replay = Vec::new();
        source.read_to_end(&mut replay).unwrap();
        assert_eq!(replay, b"abcdef");
    }

    #[test]
    fn test_encoding_is_key_safe() {
        // URL-safe base64 never emits '/' or '+', which would break the
        // `{prefix}/{digest}-{name}` key format.
        let mut source = Cursor::new(vec![0xffu8; 512]);
        let digest = ContentDigest::from_reader(&mut source).unwrap();
        assert!(!digest.as_str().contains('/'));
        assert!(!digest.as_str().contains('+'));
    }

    #[test]
    fn test_delivery_key_format() {
        let mut source = Cursor::new(b"key material".to_vec());
        let digest = ContentDigest::from_reader(&mut source).unwrap();

        let key = DeliveryKey::derive("tenants/acme", &digest, "preview-content.tgz");
        assert_eq!(
            key.as_str(),
            format!("tenants/acme/{}-preview-content.tgz", digest)
        );
    }
}
