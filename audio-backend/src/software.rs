//! Software mixer backend: no native 3D. The engine computes gain and pan per
//! source and pushes them down; gain goes through the dB-domain line control
//! mapping before it reaches the mixer.

use std::sync::Arc;

use clip_cache::{Clip, ClipFormat};
use glam::Vec3;

use crate::mix::MixerStack;
use crate::{db, output, Backend, BackendError, BackendId, PreloadOutcome, VoiceHandle, VoiceKind};

const MIN_GAIN_DB: f32 = -80.0;
const MAX_GAIN_DB: f32 = 0.0;

pub struct SoftwareMixerBackend {
    stack: MixerStack,
}

impl SoftwareMixerBackend {
    pub fn new() -> Self {
        Self {
            stack: MixerStack::new(),
        }
    }
}

impl Default for SoftwareMixerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SoftwareMixerBackend {
    fn id(&self) -> BackendId {
        BackendId::SoftwareMixer
    }

    fn is_available(&self) -> bool {
        output::device_available()
    }

    fn open(&mut self) -> Result<(), BackendError> {
        self.stack.open()
    }

    fn close(&mut self) {
        self.stack.close();
    }

    fn create_voice(&mut self, kind: VoiceKind) -> Option<VoiceHandle> {
        self.stack.create_voice(kind)
    }

    fn attach_oneshot(&mut self, voice: VoiceHandle, clip: &Arc<Clip>) -> Result<(), BackendError> {
        self.stack.attach_oneshot(voice, clip)
    }

    fn reset_stream(&mut self, voice: VoiceHandle, format: ClipFormat) -> Result<(), BackendError> {
        self.stack.reset_stream(voice, format)
    }

    fn preload(
        &mut self,
        voice: VoiceHandle,
        chunks: &[Vec<u8>],
    ) -> Result<PreloadOutcome, BackendError> {
        self.stack.preload(voice, chunks)
    }

    fn queue(&mut self, voice: VoiceHandle, chunk: &[u8]) -> Result<(), BackendError> {
        self.stack.queue(voice, chunk)
    }

    fn buffers_processed(&mut self, voice: VoiceHandle) -> usize {
        self.stack.buffers_processed(voice)
    }

    fn play(&mut self, voice: VoiceHandle) {
        self.stack.play(voice);
    }

    fn pause(&mut self, voice: VoiceHandle) {
        self.stack.pause(voice);
    }

    fn stop(&mut self, voice: VoiceHandle) {
        self.stack.stop(voice);
    }

    fn rewind(&mut self, voice: VoiceHandle) {
        self.stack.rewind(voice);
    }

    fn flush(&mut self, voice: VoiceHandle) {
        self.stack.flush(voice);
    }

    fn close_voice(&mut self, voice: VoiceHandle) {
        self.stack.close_voice(voice);
    }

    fn is_playing(&self, voice: VoiceHandle) -> bool {
        self.stack.is_playing(voice)
    }

    fn set_gain(&mut self, voice: VoiceHandle, gain: f32) {
        let value_db = db::linear_to_db(gain, MIN_GAIN_DB, MAX_GAIN_DB);
        let amplitude = db::db_to_amplitude(value_db);
        if let Some(v) = self.stack.core.lock().voice_mut(voice) {
            v.gain = amplitude;
        }
    }

    fn set_pan(&mut self, voice: VoiceHandle, pan: f32) {
        if let Some(v) = self.stack.core.lock().voice_mut(voice) {
            v.pan = pan.clamp(-1.0, 1.0);
        }
    }

    fn set_pitch(&mut self, voice: VoiceHandle, pitch: f32) {
        self.stack.set_pitch(voice, pitch);
    }

    fn set_looping(&mut self, voice: VoiceHandle, looping: bool) {
        self.stack.set_looping(voice, looping);
    }

    fn set_3d(&mut self, _voice: VoiceHandle, _position: Vec3, _rolloff: f32, _looping: bool) {}

    fn set_listener(&mut self, _position: Vec3, _look: Vec3, _up: Vec3) {}

    fn set_master_gain(&mut self, gain: f32) {
        self.stack.set_master_gain(gain);
    }

    fn trims_oneshot_clips(&self) -> bool {
        true
    }
}
