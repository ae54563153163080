//! Silent fallback backend: accepts everything, plays nothing.

use std::sync::Arc;

use clip_cache::{Clip, ClipFormat};
use glam::Vec3;

use crate::{Backend, BackendError, BackendId, PreloadOutcome, VoiceHandle, VoiceKind};

#[derive(Default)]
pub struct NullBackend {
    voices: u32,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for NullBackend {
    fn id(&self) -> BackendId {
        BackendId::Null
    }

    fn is_available(&self) -> bool {
        true
    }

    fn open(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    fn close(&mut self) {}

    fn create_voice(&mut self, _kind: VoiceKind) -> Option<VoiceHandle> {
        let handle = VoiceHandle(self.voices);
        self.voices += 1;
        Some(handle)
    }

    fn attach_oneshot(&mut self, _voice: VoiceHandle, _clip: &Arc<Clip>) -> Result<(), BackendError> {
        Ok(())
    }

    fn reset_stream(&mut self, _voice: VoiceHandle, _format: ClipFormat) -> Result<(), BackendError> {
        Ok(())
    }

    fn preload(
        &mut self,
        _voice: VoiceHandle,
        chunks: &[Vec<u8>],
    ) -> Result<PreloadOutcome, BackendError> {
        if chunks.iter().all(|c| c.is_empty()) {
            Ok(PreloadOutcome::EndOfStream)
        } else {
            Ok(PreloadOutcome::Buffered)
        }
    }

    fn queue(&mut self, _voice: VoiceHandle, _chunk: &[u8]) -> Result<(), BackendError> {
        Ok(())
    }

    fn buffers_processed(&mut self, _voice: VoiceHandle) -> usize {
        0
    }

    fn play(&mut self, _voice: VoiceHandle) {}
    fn pause(&mut self, _voice: VoiceHandle) {}
    fn stop(&mut self, _voice: VoiceHandle) {}
    fn rewind(&mut self, _voice: VoiceHandle) {}
    fn flush(&mut self, _voice: VoiceHandle) {}
    fn close_voice(&mut self, _voice: VoiceHandle) {}

    fn is_playing(&self, _voice: VoiceHandle) -> bool {
        false
    }

    fn set_gain(&mut self, _voice: VoiceHandle, _gain: f32) {}
    fn set_pan(&mut self, _voice: VoiceHandle, _pan: f32) {}
    fn set_pitch(&mut self, _voice: VoiceHandle, _pitch: f32) {}
    fn set_looping(&mut self, _voice: VoiceHandle, _looping: bool) {}
    fn set_3d(&mut self, _voice: VoiceHandle, _position: Vec3, _rolloff: f32, _looping: bool) {}
    fn set_listener(&mut self, _position: Vec3, _look: Vec3, _up: Vec3) {}
    fn set_master_gain(&mut self, _gain: f32) {}
}
