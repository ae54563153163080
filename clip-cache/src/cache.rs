use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{Clip, ClipError, ClipProducer, MAX_DECODED_BYTES};

/// How a clip is about to be consumed. One-shot loads respect the configured
/// trim cap; streaming loads never trim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipUsage {
    OneShot,
    Streaming,
}

/// Name-keyed store of decoded clips. Entries live until [`ClipCache::unload`]
/// removes them; sources holding an `Arc<Clip>` keep their payload alive past
/// that point.
pub struct ClipCache {
    producer: Arc<dyn ClipProducer>,
    clips: Mutex<HashMap<String, Arc<Clip>>>,
    oneshot_cap: Mutex<Option<usize>>,
    chunk_bytes: usize,
}

impl ClipCache {
    pub fn new(producer: Arc<dyn ClipProducer>, chunk_bytes: usize) -> Self {
        Self {
            producer,
            clips: Mutex::new(HashMap::new()),
            oneshot_cap: Mutex::new(None),
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    /// Cap applied to one-shot loads, or `None` for no trimming. Set when the
    /// selected backend has a clip-size limit.
    pub fn set_oneshot_cap(&self, cap: Option<usize>) {
        *self.oneshot_cap.lock() = cap;
    }

    pub fn get(&self, name: &str) -> Option<Arc<Clip>> {
        self.clips.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.clips.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.clips.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.lock().is_empty()
    }

    /// Drop the cache entry. Idempotent; outstanding references stay valid.
    pub fn unload(&self, name: &str) -> bool {
        let removed = self.clips.lock().remove(name).is_some();
        if removed {
            debug!(name, "unloaded clip");
        }
        removed
    }

    /// Return the cached clip, decoding through the producer on a miss.
    /// A failed decode leaves the cache unchanged.
    pub fn get_or_load(&self, name: &str, usage: ClipUsage) -> Result<Arc<Clip>, ClipError> {
        if let Some(clip) = self.clips.lock().get(name) {
            return Ok(clip.clone());
        }

        let clip = self.decode(name)?;
        let clip = match (usage, *self.oneshot_cap.lock()) {
            (ClipUsage::OneShot, Some(cap)) if clip.len() > cap => {
                warn!(name, len = clip.len(), cap, "trimming one-shot clip");
                clip.trimmed(cap)
            }
            _ => clip,
        };
        let clip = Arc::new(clip);
        // Decode raced nothing: only the dispatcher loads. Last insert wins
        // regardless.
        self.clips.lock().insert(name.to_string(), clip.clone());
        debug!(name, len = clip.len(), "loaded clip");
        Ok(clip)
    }

    fn decode(&self, name: &str) -> Result<Clip, ClipError> {
        let mut stream = self.producer.open(name)?;
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.reader.next_chunk(self.chunk_bytes)? {
            if bytes.len() + chunk.len() > MAX_DECODED_BYTES {
                return Err(ClipError::ResourceLimit(format!(
                    "clip `{name}` exceeds {MAX_DECODED_BYTES} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        Clip::new(stream.format, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClipFormat, MemoryProducer};

    fn cache_with(name: &str, bytes: Vec<u8>) -> ClipCache {
        let producer = MemoryProducer::new();
        producer.insert(name, ClipFormat::new(8000, 1, 16).unwrap(), bytes);
        ClipCache::new(Arc::new(producer), 4)
    }

    #[test]
    fn load_is_idempotent_and_shared() {
        let cache = cache_with("a", vec![0; 32]);
        let first = cache.get_or_load("a", ClipUsage::OneShot).unwrap();
        let second = cache.get_or_load("a", ClipUsage::OneShot).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn miss_decodes_in_producer_chunks() {
        let cache = cache_with("a", (0u8..32).collect());
        let clip = cache.get_or_load("a", ClipUsage::Streaming).unwrap();
        assert_eq!(clip.bytes(), (0u8..32).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn failed_decode_leaves_cache_unchanged() {
        let cache = cache_with("a", vec![0; 8]);
        assert!(cache.get_or_load("missing", ClipUsage::OneShot).is_err());
        assert!(!cache.contains("missing"));
    }

    #[test]
    fn unload_keeps_outstanding_refs_valid() {
        let cache = cache_with("a", vec![7; 16]);
        let clip = cache.get_or_load("a", ClipUsage::OneShot).unwrap();
        assert!(cache.unload("a"));
        assert!(!cache.unload("a"));
        assert_eq!(clip.len(), 16);
    }

    #[test]
    fn oneshot_cap_trims_but_streaming_does_not() {
        let cache = cache_with("a", vec![0; 64]);
        cache.set_oneshot_cap(Some(10));
        let clip = cache.get_or_load("a", ClipUsage::OneShot).unwrap();
        assert_eq!(clip.len(), 10);

        let cache = cache_with("b", vec![0; 64]);
        cache.set_oneshot_cap(Some(10));
        let clip = cache.get_or_load("b", ClipUsage::Streaming).unwrap();
        assert_eq!(clip.len(), 64);
    }
}
