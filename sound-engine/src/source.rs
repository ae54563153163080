//! Caller-visible sources and their mutable state.

use std::sync::Arc;
use std::time::Instant;

use audio_backend::{VoiceHandle, VoiceKind};
use clip_cache::Clip;
use parking_lot::{Mutex, MutexGuard};

use crate::math::{attenuation_base, pan_for, Attenuation, Listener, Vec3};

/// Playback lifecycle of a source. `Culled` is the reversible suspension
/// state: the source keeps its attributes but holds no voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Culled,
}

/// A voice binding: the pool slot plus the backend handle it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceRef {
    pub kind: VoiceKind,
    pub index: usize,
    pub handle: VoiceHandle,
}

/// Construction parameters for a source. `attenuation` and
/// `distance_or_rolloff` fall back to the engine configuration when unset.
#[derive(Debug, Clone)]
pub struct SourceDesc {
    pub name: String,
    pub file: String,
    pub priority: bool,
    pub streaming: bool,
    pub looping: bool,
    pub position: Vec3,
    pub attenuation: Option<Attenuation>,
    pub distance_or_rolloff: Option<f32>,
}

impl SourceDesc {
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            priority: false,
            streaming: false,
            looping: false,
            position: Vec3::ZERO,
            attenuation: None,
            distance_or_rolloff: None,
        }
    }

    pub fn priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn attenuation(mut self, model: Attenuation) -> Self {
        self.attenuation = Some(model);
        self
    }

    pub fn distance_or_rolloff(mut self, value: f32) -> Self {
        self.distance_or_rolloff = Some(value);
        self
    }
}

/// Mutable body of a source, guarded by the per-source mutex. The dispatcher
/// worker owns general mutation; the streaming pump touches only
/// `stream_cursor`, `pending_preload` and `pending_play`.
#[derive(Debug)]
pub struct SourceBody {
    pub priority: bool,
    pub streaming: bool,
    pub looping: bool,
    pub temporary: bool,
    pub position: Vec3,
    pub attenuation: Attenuation,
    pub distance_or_rolloff: f32,
    pub source_volume: f32,
    pub pitch: f32,
    /// Gain excluding master volume; what gets pushed to the voice.
    pub base_gain: f32,
    /// Full derived gain including master volume.
    pub computed_gain: f32,
    pub pan: f32,
    pub distance_from_listener: f32,
    pub clip: Option<Arc<Clip>>,
    pub voice: Option<VoiceRef>,
    pub stream_cursor: u64,
    pub pending_preload: bool,
    pub pending_play: bool,
    pub state: PlaybackState,
    /// Set on every play; gives the backend a moment to spin up before
    /// natural stop detection trusts `is_playing`.
    pub started_at: Option<Instant>,
}

pub struct Source {
    name: String,
    file: String,
    body: Mutex<SourceBody>,
}

impl Source {
    pub fn new(desc: SourceDesc, attenuation: Attenuation, distance_or_rolloff: f32) -> Self {
        let body = SourceBody {
            priority: desc.priority,
            streaming: desc.streaming,
            looping: desc.looping,
            temporary: false,
            position: desc.position,
            attenuation,
            distance_or_rolloff,
            source_volume: 1.0,
            pitch: 1.0,
            base_gain: 1.0,
            computed_gain: 1.0,
            pan: 0.0,
            distance_from_listener: 0.0,
            clip: None,
            voice: None,
            stream_cursor: 0,
            pending_preload: false,
            pending_play: false,
            state: PlaybackState::Stopped,
            started_at: None,
        };
        Self {
            name: desc.name,
            file: desc.file,
            body: Mutex::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn lock(&self) -> MutexGuard<'_, SourceBody> {
        self.body.lock()
    }
}

impl SourceBody {
    /// Refresh the derived gain/pan/distance fields against the listener.
    pub fn recompute(&mut self, listener: &Listener, master_gain: f32) {
        let distance = (self.position - listener.position()).length();
        self.distance_from_listener = distance;
        let base = attenuation_base(self.attenuation, distance, self.distance_or_rolloff);
        self.base_gain = (base * self.source_volume).clamp(0.0, 1.0);
        self.computed_gain = (self.base_gain * master_gain).clamp(0.0, 1.0);
        self.pan = pan_for(listener, self.position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(desc: SourceDesc) -> Source {
        Source::new(desc, Attenuation::InverseRolloff, 0.03)
    }

    #[test]
    fn recompute_clamps_gain() {
        let s = source(SourceDesc::new("a", "a.wav"));
        let listener = Listener::new();
        let mut body = s.lock();
        body.source_volume = 1.0;
        body.recompute(&listener, 1.0);
        assert!((0.0..=1.0).contains(&body.computed_gain));
        assert_eq!(body.computed_gain, 1.0);

        body.recompute(&listener, 0.0);
        assert_eq!(body.computed_gain, 0.0);
        assert_eq!(body.base_gain, 1.0);
    }

    #[test]
    fn linear_gain_zeroes_at_fade_distance() {
        let s = Source::new(
            SourceDesc::new("a", "a.wav").position(Vec3::new(1000.0, 0.0, 0.0)),
            Attenuation::Linear,
            500.0,
        );
        let mut body = s.lock();
        body.recompute(&Listener::new(), 1.0);
        assert_eq!(body.computed_gain, 0.0);
        assert_eq!(body.distance_from_listener, 1000.0);
    }

    #[test]
    fn zero_distance_gain_is_volume_times_master() {
        let s = source(SourceDesc::new("a", "a.wav"));
        let mut body = s.lock();
        body.source_volume = 0.6;
        body.recompute(&Listener::new(), 0.5);
        assert!((body.computed_gain - 0.3).abs() < 1e-6);
    }
}
