//! Deterministic, deviceless backend for tests.
//!
//! One-shot voices "play" for the real-time duration of the attached clip;
//! streaming voices consume their whole chunk queue on every
//! `buffers_processed` poll. A [`MockHandle`] shares the state so tests can
//! inspect the op log, count streamed bytes, and cap voice creation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clip_cache::{Clip, ClipFormat};
use glam::Vec3;
use parking_lot::Mutex;

use crate::{Backend, BackendError, BackendId, PreloadOutcome, VoiceHandle, VoiceKind};

/// How long a drained stream still counts as running, covering the window
/// between the pump draining the queue and refilling it.
const DRAIN_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum MockOp {
    CreateVoice(VoiceKind),
    AttachOneShot { voice: VoiceHandle, len: usize },
    ResetStream { voice: VoiceHandle },
    Preload { voice: VoiceHandle, chunks: usize },
    Queue { voice: VoiceHandle, len: usize },
    Play(VoiceHandle),
    Pause(VoiceHandle),
    Stop(VoiceHandle),
    Rewind(VoiceHandle),
    Flush(VoiceHandle),
    CloseVoice(VoiceHandle),
    SetGain { voice: VoiceHandle, gain: f32 },
    SetPan { voice: VoiceHandle, pan: f32 },
    SetPitch { voice: VoiceHandle, pitch: f32 },
    SetLooping { voice: VoiceHandle, looping: bool },
    Set3d { voice: VoiceHandle, position: Vec3, rolloff: f32, looping: bool },
    SetListener { position: Vec3 },
    SetMasterGain(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Stopped,
    Playing,
    Paused,
}

struct MockVoice {
    kind: VoiceKind,
    transport: Transport,
    looping: bool,
    // One-shot simulation.
    clip_duration: Option<Duration>,
    started: Option<Instant>,
    // Stream simulation.
    queue: VecDeque<usize>,
    streamed_bytes: u64,
    last_consumed: Option<Instant>,
}

impl MockVoice {
    fn new(kind: VoiceKind) -> Self {
        Self {
            kind,
            transport: Transport::Stopped,
            looping: false,
            clip_duration: None,
            started: None,
            queue: VecDeque::new(),
            streamed_bytes: 0,
            last_consumed: None,
        }
    }

    fn is_playing(&self) -> bool {
        if self.transport != Transport::Playing {
            return false;
        }
        match self.kind {
            VoiceKind::OneShot => {
                if self.looping {
                    return true;
                }
                match (self.clip_duration, self.started) {
                    (Some(duration), Some(started)) => started.elapsed() < duration,
                    _ => false,
                }
            }
            VoiceKind::Streaming => {
                !self.queue.is_empty()
                    || self
                        .last_consumed
                        .is_some_and(|t| t.elapsed() < DRAIN_GRACE)
            }
        }
    }
}

#[derive(Default)]
struct MockState {
    voices: Vec<MockVoice>,
    ops: Vec<MockOp>,
    oneshot_limit: Option<usize>,
    streaming_limit: Option<usize>,
    master_gain: f32,
}

impl MockState {
    fn voice_mut(&mut self, handle: VoiceHandle) -> Option<&mut MockVoice> {
        self.voices.get_mut(handle.0 as usize)
    }
}

pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn pair() -> (MockBackend, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            master_gain: 1.0,
            ..MockState::default()
        }));
        (
            MockBackend {
                state: state.clone(),
            },
            MockHandle { state },
        )
    }
}

impl MockHandle {
    /// Cap how many voices `create_voice` will hand out per kind.
    pub fn set_voice_limit(&self, kind: VoiceKind, limit: usize) {
        let mut state = self.state.lock();
        match kind {
            VoiceKind::OneShot => state.oneshot_limit = Some(limit),
            VoiceKind::Streaming => state.streaming_limit = Some(limit),
        }
    }

    pub fn ops(&self) -> Vec<MockOp> {
        self.state.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    /// Total bytes consumed off a streaming voice's queue.
    pub fn streamed_bytes(&self, voice: VoiceHandle) -> u64 {
        self.state
            .lock()
            .voices
            .get(voice.0 as usize)
            .map(|v| v.streamed_bytes)
            .unwrap_or(0)
    }

    pub fn voices_created(&self, kind: VoiceKind) -> usize {
        self.state
            .lock()
            .voices
            .iter()
            .filter(|v| v.kind == kind)
            .count()
    }

    pub fn master_gain(&self) -> f32 {
        self.state.lock().master_gain
    }
}

impl Backend for MockBackend {
    fn id(&self) -> BackendId {
        BackendId::Mock
    }

    fn is_available(&self) -> bool {
        true
    }

    fn open(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        for voice in &mut state.voices {
            voice.transport = Transport::Stopped;
        }
    }

    fn create_voice(&mut self, kind: VoiceKind) -> Option<VoiceHandle> {
        let mut state = self.state.lock();
        let existing = state.voices.iter().filter(|v| v.kind == kind).count();
        let limit = match kind {
            VoiceKind::OneShot => state.oneshot_limit,
            VoiceKind::Streaming => state.streaming_limit,
        };
        if let Some(limit) = limit {
            if existing >= limit {
                return None;
            }
        }
        state.voices.push(MockVoice::new(kind));
        state.ops.push(MockOp::CreateVoice(kind));
        Some(VoiceHandle(state.voices.len() as u32 - 1))
    }

    fn attach_oneshot(&mut self, voice: VoiceHandle, clip: &Arc<Clip>) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        let duration = clip.duration();
        let len = clip.len();
        let v = state
            .voice_mut(voice)
            .ok_or(BackendError::UnknownVoice(voice))?;
        if v.kind != VoiceKind::OneShot {
            return Err(BackendError::Unsupported);
        }
        v.clip_duration = Some(duration);
        v.started = None;
        v.transport = Transport::Stopped;
        state.ops.push(MockOp::AttachOneShot { voice, len });
        Ok(())
    }

    fn reset_stream(&mut self, voice: VoiceHandle, format: ClipFormat) -> Result<(), BackendError> {
        format
            .validate()
            .map_err(|e| BackendError::Format(e.to_string()))?;
        let mut state = self.state.lock();
        let v = state
            .voice_mut(voice)
            .ok_or(BackendError::UnknownVoice(voice))?;
        if v.kind != VoiceKind::Streaming {
            return Err(BackendError::Unsupported);
        }
        v.transport = Transport::Stopped;
        v.queue.clear();
        v.streamed_bytes = 0;
        v.last_consumed = None;
        state.ops.push(MockOp::ResetStream { voice });
        Ok(())
    }

    fn preload(
        &mut self,
        voice: VoiceHandle,
        chunks: &[Vec<u8>],
    ) -> Result<PreloadOutcome, BackendError> {
        if chunks.iter().all(|c| c.is_empty()) {
            return Ok(PreloadOutcome::EndOfStream);
        }
        {
            let mut state = self.state.lock();
            let count = chunks.len();
            state.ops.push(MockOp::Preload { voice, chunks: count });
        }
        for chunk in chunks {
            self.queue(voice, chunk)?;
        }
        Ok(PreloadOutcome::Buffered)
    }

    fn queue(&mut self, voice: VoiceHandle, chunk: &[u8]) -> Result<(), BackendError> {
        if chunk.is_empty() {
            return Ok(());
        }
        let mut state = self.state.lock();
        let len = chunk.len();
        let v = state
            .voice_mut(voice)
            .ok_or(BackendError::UnknownVoice(voice))?;
        match v.kind {
            VoiceKind::Streaming => {
                v.queue.push_back(len);
                state.ops.push(MockOp::Queue { voice, len });
                Ok(())
            }
            VoiceKind::OneShot => Err(BackendError::Unsupported),
        }
    }

    fn buffers_processed(&mut self, voice: VoiceHandle) -> usize {
        let mut state = self.state.lock();
        let Some(v) = state.voice_mut(voice) else {
            return 0;
        };
        if v.transport != Transport::Playing {
            return 0;
        }
        let consumed = v.queue.len();
        let bytes: u64 = v.queue.drain(..).map(|len| len as u64).sum();
        v.streamed_bytes += bytes;
        if consumed > 0 {
            v.last_consumed = Some(Instant::now());
        }
        consumed
    }

    fn play(&mut self, voice: VoiceHandle) {
        let mut state = self.state.lock();
        if let Some(v) = state.voice_mut(voice) {
            if v.transport != Transport::Paused {
                v.started = Some(Instant::now());
            }
            v.transport = Transport::Playing;
        }
        state.ops.push(MockOp::Play(voice));
    }

    fn pause(&mut self, voice: VoiceHandle) {
        let mut state = self.state.lock();
        if let Some(v) = state.voice_mut(voice) {
            if v.transport == Transport::Playing {
                v.transport = Transport::Paused;
            }
        }
        state.ops.push(MockOp::Pause(voice));
    }

    fn stop(&mut self, voice: VoiceHandle) {
        let mut state = self.state.lock();
        if let Some(v) = state.voice_mut(voice) {
            v.transport = Transport::Stopped;
            v.started = None;
        }
        state.ops.push(MockOp::Stop(voice));
    }

    fn rewind(&mut self, voice: VoiceHandle) {
        let mut state = self.state.lock();
        if let Some(v) = state.voice_mut(voice) {
            if v.transport == Transport::Playing {
                v.started = Some(Instant::now());
            }
        }
        state.ops.push(MockOp::Rewind(voice));
    }

    fn flush(&mut self, voice: VoiceHandle) {
        let mut state = self.state.lock();
        if let Some(v) = state.voice_mut(voice) {
            v.queue.clear();
        }
        state.ops.push(MockOp::Flush(voice));
    }

    fn close_voice(&mut self, voice: VoiceHandle) {
        let mut state = self.state.lock();
        if let Some(v) = state.voice_mut(voice) {
            v.transport = Transport::Stopped;
            v.queue.clear();
            v.clip_duration = None;
            v.started = None;
        }
        state.ops.push(MockOp::CloseVoice(voice));
    }

    fn is_playing(&self, voice: VoiceHandle) -> bool {
        self.state
            .lock()
            .voices
            .get(voice.0 as usize)
            .is_some_and(|v| v.is_playing())
    }

    fn set_gain(&mut self, voice: VoiceHandle, gain: f32) {
        self.state.lock().ops.push(MockOp::SetGain { voice, gain });
    }

    fn set_pan(&mut self, voice: VoiceHandle, pan: f32) {
        self.state.lock().ops.push(MockOp::SetPan { voice, pan });
    }

    fn set_pitch(&mut self, voice: VoiceHandle, pitch: f32) {
        self.state.lock().ops.push(MockOp::SetPitch { voice, pitch });
    }

    fn set_looping(&mut self, voice: VoiceHandle, looping: bool) {
        let mut state = self.state.lock();
        if let Some(v) = state.voice_mut(voice) {
            v.looping = looping;
        }
        state.ops.push(MockOp::SetLooping { voice, looping });
    }

    fn set_3d(&mut self, voice: VoiceHandle, position: Vec3, rolloff: f32, looping: bool) {
        let mut state = self.state.lock();
        if let Some(v) = state.voice_mut(voice) {
            v.looping = looping;
        }
        state.ops.push(MockOp::Set3d {
            voice,
            position,
            rolloff,
            looping,
        });
    }

    fn set_listener(&mut self, position: Vec3, _look: Vec3, _up: Vec3) {
        self.state.lock().ops.push(MockOp::SetListener { position });
    }

    fn set_master_gain(&mut self, gain: f32) {
        let mut state = self.state.lock();
        state.master_gain = gain;
        state.ops.push(MockOp::SetMasterGain(gain));
    }

    fn native_3d(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip_ms(ms: u64) -> Arc<Clip> {
        // 8 kHz mono 16-bit: 16 bytes per millisecond.
        let format = ClipFormat::new(8000, 1, 16).unwrap();
        Arc::new(Clip::new(format, vec![0; (ms * 16) as usize]).unwrap())
    }

    #[test]
    fn oneshot_plays_for_the_clip_duration() {
        let (mut backend, _handle) = MockBackend::pair();
        let voice = backend.create_voice(VoiceKind::OneShot).unwrap();
        backend.attach_oneshot(voice, &clip_ms(40)).unwrap();
        assert!(!backend.is_playing(voice));

        backend.play(voice);
        assert!(backend.is_playing(voice));
        std::thread::sleep(Duration::from_millis(60));
        assert!(!backend.is_playing(voice));
    }

    #[test]
    fn looping_oneshot_keeps_playing() {
        let (mut backend, _handle) = MockBackend::pair();
        let voice = backend.create_voice(VoiceKind::OneShot).unwrap();
        backend.attach_oneshot(voice, &clip_ms(1)).unwrap();
        backend.set_looping(voice, true);
        backend.play(voice);
        std::thread::sleep(Duration::from_millis(10));
        assert!(backend.is_playing(voice));
        backend.stop(voice);
        assert!(!backend.is_playing(voice));
    }

    #[test]
    fn stream_consumes_queue_per_poll() {
        let (mut backend, handle) = MockBackend::pair();
        let voice = backend.create_voice(VoiceKind::Streaming).unwrap();
        let format = ClipFormat::new(8000, 1, 16).unwrap();
        backend.reset_stream(voice, format).unwrap();
        backend
            .preload(voice, &[vec![0; 100], vec![0; 50]])
            .unwrap();
        backend.play(voice);
        assert!(backend.is_playing(voice));

        assert_eq!(backend.buffers_processed(voice), 2);
        assert_eq!(handle.streamed_bytes(voice), 150);
        // Drained but inside the consumption grace window.
        assert!(backend.is_playing(voice));
    }

    #[test]
    fn voice_limit_is_enforced() {
        let (mut backend, handle) = MockBackend::pair();
        handle.set_voice_limit(VoiceKind::OneShot, 1);
        assert!(backend.create_voice(VoiceKind::OneShot).is_some());
        assert!(backend.create_voice(VoiceKind::OneShot).is_none());
        assert!(backend.create_voice(VoiceKind::Streaming).is_some());
        assert_eq!(handle.voices_created(VoiceKind::OneShot), 1);
    }

    #[test]
    fn paused_stream_does_not_consume() {
        let (mut backend, _handle) = MockBackend::pair();
        let voice = backend.create_voice(VoiceKind::Streaming).unwrap();
        let format = ClipFormat::new(8000, 1, 16).unwrap();
        backend.reset_stream(voice, format).unwrap();
        backend.preload(voice, &[vec![0; 10]]).unwrap();
        backend.play(voice);
        backend.pause(voice);
        assert_eq!(backend.buffers_processed(voice), 0);
    }
}
