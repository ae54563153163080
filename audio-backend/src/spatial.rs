//! Spatial mixer backend: the "native 3D" path. The engine hands over raw
//! source positions and the listener pose; distance attenuation and pan are
//! computed here, per voice, before mixing.

use std::sync::Arc;

use clip_cache::{Clip, ClipFormat};
use glam::Vec3;

use crate::mix::MixerStack;
use crate::{output, Backend, BackendError, BackendId, PreloadOutcome, VoiceHandle, VoiceKind};

/// Distance-squared scale of the inverse rolloff curve.
const DISTANCE_SCALE: f32 = 0.0005;

#[derive(Debug, Clone, Copy)]
struct SpatialParams {
    position: Vec3,
    rolloff: f32,
    volume: f32,
}

impl Default for SpatialParams {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rolloff: 0.0,
            volume: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ListenerPose {
    position: Vec3,
    look: Vec3,
    up: Vec3,
}

impl Default for ListenerPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            look: Vec3::NEG_Z,
            up: Vec3::Y,
        }
    }
}

pub struct SpatialMixerBackend {
    stack: MixerStack,
    listener: ListenerPose,
    params: Vec<SpatialParams>,
}

impl SpatialMixerBackend {
    pub fn new() -> Self {
        Self {
            stack: MixerStack::new(),
            listener: ListenerPose::default(),
            params: Vec::new(),
        }
    }

    fn refresh_voice(&mut self, voice: VoiceHandle) {
        let Some(params) = self.params.get(voice.0 as usize).copied() else {
            return;
        };
        let offset = params.position - self.listener.position;
        let distance = offset.length();

        let gain = if distance <= 0.0 {
            params.volume
        } else {
            let att = (params.rolloff * distance * distance * DISTANCE_SCALE).max(0.0);
            (params.volume / (1.0 + att)).clamp(0.0, 1.0)
        };

        let side = self.listener.up.cross(self.listener.look).normalize_or_zero();
        let x = offset.dot(side);
        let z = offset.dot(self.listener.look);
        let pan = if x == 0.0 && z == 0.0 {
            0.0
        } else {
            (-x.atan2(z).sin()).clamp(-1.0, 1.0)
        };

        let mut core = self.stack.core.lock();
        if let Some(v) = core.voice_mut(voice) {
            v.gain = gain;
            v.pan = pan;
        }
    }

    fn refresh_all(&mut self) {
        for idx in 0..self.params.len() {
            self.refresh_voice(VoiceHandle(idx as u32));
        }
    }
}

impl Default for SpatialMixerBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SpatialMixerBackend {
    fn id(&self) -> BackendId {
        BackendId::SpatialMixer
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
        let handle = self.stack.create_voice(kind)?;
        if self.params.len() <= handle.0 as usize {
            self.params.resize_with(handle.0 as usize + 1, SpatialParams::default);
        }
        Some(handle)
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
        if let Some(p) = self.params.get_mut(voice.0 as usize) {
            *p = SpatialParams::default();
        }
    }

    fn is_playing(&self, voice: VoiceHandle) -> bool {
        self.stack.is_playing(voice)
    }

    /// Source volume only; distance attenuation is applied on top of it here.
    fn set_gain(&mut self, voice: VoiceHandle, gain: f32) {
        if let Some(p) = self.params.get_mut(voice.0 as usize) {
            p.volume = gain.clamp(0.0, 1.0);
        }
        self.refresh_voice(voice);
    }

    fn set_pan(&mut self, _voice: VoiceHandle, _pan: f32) {
        // Pan is derived from positions; explicit pan is meaningless here.
    }

    fn set_pitch(&mut self, voice: VoiceHandle, pitch: f32) {
        self.stack.set_pitch(voice, pitch);
    }

    fn set_looping(&mut self, voice: VoiceHandle, looping: bool) {
        self.stack.set_looping(voice, looping);
    }

    fn set_3d(&mut self, voice: VoiceHandle, position: Vec3, rolloff: f32, looping: bool) {
        if let Some(p) = self.params.get_mut(voice.0 as usize) {
            p.position = position;
            p.rolloff = rolloff.max(0.0);
        }
        self.stack.set_looping(voice, looping);
        self.refresh_voice(voice);
    }

    fn set_listener(&mut self, position: Vec3, look: Vec3, up: Vec3) {
        self.listener = ListenerPose {
            position,
            look: look.normalize_or_zero(),
            up: up.normalize_or_zero(),
        };
        self.refresh_all();
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.stack.set_master_gain(gain);
    }

    fn native_3d(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice_gain_pan(backend: &SpatialMixerBackend, voice: VoiceHandle) -> (f32, f32) {
        let core = backend.stack.core.lock();
        let v = core.voice(voice).unwrap();
        (v.gain, v.pan)
    }

    #[test]
    fn distance_attenuates_gain() {
        let mut backend = SpatialMixerBackend::new();
        let voice = backend.create_voice(VoiceKind::OneShot).unwrap();
        backend.set_3d(voice, Vec3::ZERO, 1.0, false);
        let (near, _) = voice_gain_pan(&backend, voice);
        backend.set_3d(voice, Vec3::new(200.0, 0.0, 0.0), 1.0, false);
        let (far, _) = voice_gain_pan(&backend, voice);
        assert!((near - 1.0).abs() < 1e-6);
        assert!(far < near);
    }

    #[test]
    fn source_to_the_right_pans_right() {
        let mut backend = SpatialMixerBackend::new();
        let voice = backend.create_voice(VoiceKind::OneShot).unwrap();
        backend.set_3d(voice, Vec3::new(5.0, 0.0, 0.0), 0.0, false);
        let (_, pan) = voice_gain_pan(&backend, voice);
        assert!(pan > 0.9, "pan was {pan}");

        backend.set_3d(voice, Vec3::new(-5.0, 0.0, 0.0), 0.0, false);
        let (_, pan) = voice_gain_pan(&backend, voice);
        assert!(pan < -0.9, "pan was {pan}");
    }

    #[test]
    fn listener_turn_moves_the_image() {
        let mut backend = SpatialMixerBackend::new();
        let voice = backend.create_voice(VoiceKind::OneShot).unwrap();
        backend.set_3d(voice, Vec3::new(0.0, 0.0, -5.0), 0.0, false);
        let (_, ahead) = voice_gain_pan(&backend, voice);
        assert!(ahead.abs() < 1e-6);

        // Face +X; the source ends up on the listener's left.
        backend.set_listener(Vec3::ZERO, Vec3::X, Vec3::Y);
        let (_, pan) = voice_gain_pan(&backend, voice);
        assert!(pan < -0.9, "pan was {pan}");
    }

    #[test]
    fn zero_rolloff_keeps_full_volume_at_range() {
        let mut backend = SpatialMixerBackend::new();
        let voice = backend.create_voice(VoiceKind::OneShot).unwrap();
        backend.set_gain(voice, 0.8);
        backend.set_3d(voice, Vec3::new(0.0, 0.0, -1000.0), 0.0, false);
        let (gain, _) = voice_gain_pan(&backend, voice);
        assert!((gain - 0.8).abs() < 1e-6);
    }
}
