use serde::{Deserialize, Serialize};

use crate::math::Attenuation;

/// Static engine configuration, fixed at construction. The only runtime
/// tunable is the master volume, which lives on the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of the one-shot voice pool.
    pub num_normal_voices: usize,
    /// Size of the streaming voice pool.
    pub num_streaming_voices: usize,
    /// Initial master volume, `0..=1`.
    pub master_gain: f32,
    /// Attenuation model applied when a source does not name one.
    pub default_attenuation: Attenuation,
    /// Rolloff factor used with [`Attenuation::InverseRolloff`].
    pub default_rolloff: f32,
    /// Fade distance used with [`Attenuation::Linear`].
    pub default_fade_distance: f32,
    /// Bytes per streaming chunk.
    pub stream_buffer_bytes: usize,
    /// Chunks preloaded ahead of a streaming voice.
    pub num_stream_buffers: usize,
    /// One-shot clip trim cap for backends with clip-size limits.
    pub max_clip_bytes: usize,
    /// Read granularity handed to the decoder collaborator.
    pub file_chunk_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_normal_voices: 28,
            num_streaming_voices: 4,
            master_gain: 1.0,
            default_attenuation: Attenuation::InverseRolloff,
            default_rolloff: 0.03,
            default_fade_distance: 1000.0,
            stream_buffer_bytes: 131_072,
            num_stream_buffers: 2,
            max_clip_bytes: 268_435_456,
            file_chunk_bytes: 1_048_576,
        }
    }
}

impl EngineConfig {
    /// Clamp out-of-range values to something workable.
    pub fn sanitized(mut self) -> Self {
        self.master_gain = self.master_gain.clamp(0.0, 1.0);
        self.stream_buffer_bytes = self.stream_buffer_bytes.max(1024);
        self.num_stream_buffers = self.num_stream_buffers.max(1);
        self.file_chunk_bytes = self.file_chunk_bytes.max(1024);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.num_normal_voices, 28);
        assert_eq!(cfg.num_streaming_voices, 4);
        assert_eq!(cfg.stream_buffer_bytes, 131_072);
        assert_eq!(cfg.num_stream_buffers, 2);
        assert_eq!(cfg.default_rolloff, 0.03);
    }

    #[test]
    fn sanitize_clamps_extremes() {
        let cfg = EngineConfig {
            master_gain: 3.0,
            num_stream_buffers: 0,
            stream_buffer_bytes: 0,
            ..EngineConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.master_gain, 1.0);
        assert_eq!(cfg.num_stream_buffers, 1);
        assert_eq!(cfg.stream_buffer_bytes, 1024);
    }
}
