//! Pluggable audio output layer.
//!
//! The engine core talks to a [`Backend`] capability object and never to a
//! concrete audio API. A backend owns a fixed set of voices, each able to play
//! one source at a time: either a whole clip attached up front, or a queue of
//! PCM chunks fed by the engine's streaming pump. Three production backends
//! ship here (null, software mixer, spatial mixer) plus a deterministic mock
//! for tests behind the `mock-audio` feature.

use std::sync::Arc;

use clip_cache::{Clip, ClipFormat};
use glam::Vec3;
use thiserror::Error;
use tracing::{debug, info, warn};

mod db;
mod mix;
mod null;
mod output;
mod software;
mod spatial;

#[cfg(feature = "mock-audio")]
pub mod mock;

pub use null::NullBackend;
pub use software::SoftwareMixerBackend;
pub use spatial::SpatialMixerBackend;

/// Which pool a voice belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceKind {
    OneShot,
    Streaming,
}

/// Opaque per-backend voice identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(pub u32);

/// Identifiers for the concrete backends, used in init priority lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendId {
    /// Silent sink; always available.
    Null,
    /// Engine-side 3D: the core computes gain and pan, the backend mixes.
    SoftwareMixer,
    /// Backend-side 3D: the backend receives positions and does its own math.
    SpatialMixer,
    /// Test double; never constructed by [`select_backend`].
    Mock,
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("operation not supported by this backend")]
    Unsupported,
    #[error("voice line is busy")]
    LineBusy,
    #[error("format rejected: {0}")]
    Format(String),
    #[error("unknown voice {0:?}")]
    UnknownVoice(VoiceHandle),
    #[error("audio device error: {0}")]
    Io(String),
}

/// Result of a preload: whether anything was buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadOutcome {
    Buffered,
    EndOfStream,
}

/// The backend capability contract.
///
/// All operations are non-blocking except `attach_oneshot` and `preload`,
/// which may perform one audio-driver call. Unknown voices are ignored by the
/// infallible operations and reported by the fallible ones.
pub trait Backend: Send {
    fn id(&self) -> BackendId;

    /// Whether this backend could work in the current environment. Checked
    /// before `open` during priority-list selection.
    fn is_available(&self) -> bool;

    fn open(&mut self) -> Result<(), BackendError>;
    fn close(&mut self);

    /// Returns `None` when the backend has no voice slots left; the scheduler
    /// tolerates pools smaller than requested.
    fn create_voice(&mut self, kind: VoiceKind) -> Option<VoiceHandle>;

    fn attach_oneshot(&mut self, voice: VoiceHandle, clip: &Arc<Clip>) -> Result<(), BackendError>;
    fn reset_stream(&mut self, voice: VoiceHandle, format: ClipFormat) -> Result<(), BackendError>;
    fn preload(
        &mut self,
        voice: VoiceHandle,
        chunks: &[Vec<u8>],
    ) -> Result<PreloadOutcome, BackendError>;
    fn queue(&mut self, voice: VoiceHandle, chunk: &[u8]) -> Result<(), BackendError>;

    /// Number of queued chunks fully consumed since the last call.
    fn buffers_processed(&mut self, voice: VoiceHandle) -> usize;

    fn play(&mut self, voice: VoiceHandle);
    fn pause(&mut self, voice: VoiceHandle);
    /// Stop playback and rewind to the start.
    fn stop(&mut self, voice: VoiceHandle);
    fn rewind(&mut self, voice: VoiceHandle);
    /// Drop any queued, unplayed data.
    fn flush(&mut self, voice: VoiceHandle);
    /// Stop, flush and detach; the voice slot itself stays usable.
    fn close_voice(&mut self, voice: VoiceHandle);

    fn is_playing(&self, voice: VoiceHandle) -> bool;

    fn set_gain(&mut self, voice: VoiceHandle, gain: f32);
    fn set_pan(&mut self, voice: VoiceHandle, pan: f32);
    fn set_pitch(&mut self, voice: VoiceHandle, pitch: f32);
    fn set_looping(&mut self, voice: VoiceHandle, looping: bool);

    /// Push raw 3D attributes; no-op for backends without native 3D.
    fn set_3d(&mut self, voice: VoiceHandle, position: Vec3, rolloff: f32, looping: bool);
    /// Push the listener pose; no-op where not applicable.
    fn set_listener(&mut self, position: Vec3, look: Vec3, up: Vec3);

    fn set_master_gain(&mut self, gain: f32);

    /// Whether the backend does its own distance/pan math from positions.
    fn native_3d(&self) -> bool {
        false
    }

    /// Whether one-shot clips should be trimmed to the configured cap before
    /// being attached (platform clip-size limits).
    fn trims_oneshot_clips(&self) -> bool {
        false
    }
}

/// Walk the priority list and return the first backend that is available and
/// opens cleanly; fall back to the null backend.
pub fn select_backend(priority: &[BackendId]) -> Box<dyn Backend> {
    for id in priority {
        let mut candidate: Box<dyn Backend> = match id {
            BackendId::Null => Box::new(NullBackend::new()),
            BackendId::SoftwareMixer => Box::new(SoftwareMixerBackend::new()),
            BackendId::SpatialMixer => Box::new(SpatialMixerBackend::new()),
            BackendId::Mock => {
                warn!("mock backend cannot be selected by id; skipping");
                continue;
            }
        };
        if !candidate.is_available() {
            debug!(?id, "backend not available");
            continue;
        }
        match candidate.open() {
            Ok(()) => {
                info!(?id, "selected audio backend");
                return candidate;
            }
            Err(err) => warn!(?id, %err, "backend failed to open"),
        }
    }
    info!("falling back to null backend");
    let mut null = NullBackend::new();
    // Opening the null backend cannot fail.
    let _ = null.open();
    Box::new(null)
}
