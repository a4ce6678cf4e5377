//! Preview Lane - content-addressed preview delivery
//!
//! This crate packages a file or directory into a canonical gzip-compressed
//! tar archive, addresses it by a digest of its bytes, uploads it to a
//! remote object store in parts, and walks the remote build service to a
//! ready preview URL.

pub mod api;
pub mod archive;
pub mod cancel;
pub mod config;
pub mod digest;
pub mod mock;
pub mod pipeline;
pub mod progress;
pub mod store;

pub use digest::{ContentDigest, DeliveryKey};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, PipelineReport};
