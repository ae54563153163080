use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{ClipError, ClipFormat};

/// Chunked reader over one decoded PCM stream. `None` signals end of stream.
pub trait PcmRead: Send {
    fn next_chunk(&mut self, max_bytes: usize) -> Result<Option<Vec<u8>>, ClipError>;
}

/// An opened decode session: the stream's format plus its chunk reader.
pub struct PcmStream {
    pub format: ClipFormat,
    pub reader: Box<dyn PcmRead>,
}

/// The decoder collaborator. Implementations map a locator (file path, URL,
/// asset name) onto raw little-endian signed PCM; container parsing is
/// entirely their business.
pub trait ClipProducer: Send + Sync {
    fn open(&self, locator: &str) -> Result<PcmStream, ClipError>;
}

/// In-memory producer: a registry of pre-decoded buffers keyed by name.
/// The stand-in decoder for tests and for embedders that decode up front.
#[derive(Default)]
pub struct MemoryProducer {
    entries: RwLock<HashMap<String, (ClipFormat, Arc<Vec<u8>>)>>,
}

impl MemoryProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>, format: ClipFormat, bytes: Vec<u8>) {
        self.entries
            .write()
            .insert(name.into(), (format, Arc::new(bytes)));
    }

    pub fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }
}

impl ClipProducer for MemoryProducer {
    fn open(&self, locator: &str) -> Result<PcmStream, ClipError> {
        let entries = self.entries.read();
        let (format, bytes) = entries
            .get(locator)
            .ok_or_else(|| ClipError::NotFound(locator.to_string()))?;
        Ok(PcmStream {
            format: *format,
            reader: Box::new(MemoryRead {
                bytes: bytes.clone(),
                offset: 0,
            }),
        })
    }
}

struct MemoryRead {
    bytes: Arc<Vec<u8>>,
    offset: usize,
}

impl PcmRead for MemoryRead {
    fn next_chunk(&mut self, max_bytes: usize) -> Result<Option<Vec<u8>>, ClipError> {
        if self.offset >= self.bytes.len() || max_bytes == 0 {
            return Ok(None);
        }
        let end = (self.offset + max_bytes).min(self.bytes.len());
        let chunk = self.bytes[self.offset..end].to_vec();
        self.offset = end;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_producer_round_trip() {
        let producer = MemoryProducer::new();
        let format = ClipFormat::new(8000, 1, 8).unwrap();
        producer.insert("beep", format, vec![1, 2, 3, 4, 5]);

        let mut stream = producer.open("beep").unwrap();
        assert_eq!(stream.format, format);
        assert_eq!(stream.reader.next_chunk(3).unwrap().unwrap(), vec![1, 2, 3]);
        assert_eq!(stream.reader.next_chunk(3).unwrap().unwrap(), vec![4, 5]);
        assert!(stream.reader.next_chunk(3).unwrap().is_none());
    }

    #[test]
    fn unknown_locator_is_not_found() {
        let producer = MemoryProducer::new();
        assert!(matches!(
            producer.open("missing"),
            Err(ClipError::NotFound(_))
        ));
    }
}
