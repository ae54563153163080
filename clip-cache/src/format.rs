use std::time::Duration;

use crate::ClipError;

/// Shape of raw PCM audio held in memory: signed little-endian samples,
/// interleaved L/R when stereo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl ClipFormat {
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Result<Self, ClipError> {
        let format = Self {
            sample_rate,
            channels,
            bits_per_sample,
        };
        format.validate()?;
        Ok(format)
    }

    pub fn validate(&self) -> Result<(), ClipError> {
        if self.sample_rate == 0 {
            return Err(ClipError::Format("sample rate must be positive".into()));
        }
        if self.channels != 1 && self.channels != 2 {
            return Err(ClipError::Format(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }
        if self.bits_per_sample != 8 && self.bits_per_sample != 16 {
            return Err(ClipError::Format(format!(
                "unsupported sample width {} bits",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Bytes consumed per second of playback.
    pub fn byte_rate(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }

    /// Round `len` down to a whole number of frames.
    pub fn align_down(&self, len: usize) -> usize {
        let frame = self.bytes_per_frame();
        len - (len % frame)
    }

    pub fn duration_of(&self, len_bytes: usize) -> Duration {
        let rate = self.byte_rate();
        if rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(len_bytes as f64 / rate as f64)
    }
}
