//! Decoded PCM clips and the name-keyed clip cache.
//!
//! The engine never decodes containers itself; a [`ClipProducer`] collaborator
//! turns a locator (file path or URL) into a stream of raw PCM chunks, and the
//! cache assembles those into immutable, shareable [`Clip`]s.

pub mod cache;
pub mod clip;
pub mod format;
pub mod producer;

pub use cache::{ClipCache, ClipUsage};
pub use clip::Clip;
pub use format::ClipFormat;
pub use producer::{ClipProducer, MemoryProducer, PcmRead, PcmStream};

use thiserror::Error;

/// Sanity cap on a single decoded clip, independent of any configured trim.
pub const MAX_DECODED_BYTES: usize = 1 << 30;

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid clip format: {0}")]
    Format(String),
    #[error("clip not found: {0}")]
    NotFound(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("resource limits exceeded: {0}")]
    ResourceLimit(String),
}
