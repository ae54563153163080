use std::time::Duration;

use crate::{ClipError, ClipFormat};

/// An immutable decoded PCM payload. Shared between the cache and any playing
/// source as `Arc<Clip>`; the payload lives as long as the longest holder.
#[derive(Debug, Clone)]
pub struct Clip {
    format: ClipFormat,
    bytes: Vec<u8>,
}

impl Clip {
    /// Wrap decoded bytes, dropping any trailing partial frame.
    pub fn new(format: ClipFormat, mut bytes: Vec<u8>) -> Result<Self, ClipError> {
        format.validate()?;
        bytes.truncate(format.align_down(bytes.len()));
        Ok(Self { format, bytes })
    }

    pub fn format(&self) -> ClipFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.bytes.len())
    }

    /// Byte window starting at `offset`, at most `max_len` long. Used by the
    /// streaming pump to cut chunks out of the payload.
    pub fn window(&self, offset: u64, max_len: usize) -> &[u8] {
        let start = (offset as usize).min(self.bytes.len());
        let end = start.saturating_add(max_len).min(self.bytes.len());
        &self.bytes[start..end]
    }

    /// A frame-aligned prefix copy no longer than `max_bytes`.
    pub fn trimmed(&self, max_bytes: usize) -> Clip {
        if self.bytes.len() <= max_bytes {
            return self.clone();
        }
        let keep = self.format.align_down(max_bytes);
        Clip {
            format: self.format,
            bytes: self.bytes[..keep].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono8(bytes: Vec<u8>) -> Clip {
        Clip::new(ClipFormat::new(8000, 1, 8).unwrap(), bytes).unwrap()
    }

    #[test]
    fn drops_partial_trailing_frame() {
        let f = ClipFormat::new(8000, 2, 16).unwrap();
        let clip = Clip::new(f, vec![0; 10]).unwrap();
        assert_eq!(clip.len(), 8);
    }

    #[test]
    fn window_is_clamped() {
        let clip = mono8(vec![1, 2, 3, 4]);
        assert_eq!(clip.window(1, 2), &[2, 3]);
        assert_eq!(clip.window(3, 10), &[4]);
        assert!(clip.window(9, 4).is_empty());
    }

    #[test]
    fn trim_keeps_whole_frames() {
        let f = ClipFormat::new(8000, 2, 16).unwrap();
        let clip = Clip::new(f, vec![0; 64]).unwrap();
        let trimmed = clip.trimmed(7);
        assert_eq!(trimmed.len(), 4);
        let untouched = clip.trimmed(64);
        assert_eq!(untouched.len(), 64);
    }
}
