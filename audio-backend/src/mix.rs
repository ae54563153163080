//! Shared mixing core for the software and spatial mixer backends.
//!
//! `MixerCore` holds the per-voice state the real-time callback reads; the
//! backend mutates it from the engine side under the same lock, mirroring the
//! locked render slot of a worker-owned output stream.

use std::collections::VecDeque;
use std::sync::Arc;

use clip_cache::{Clip, ClipFormat};
use parking_lot::Mutex;

use crate::output::OutputDriver;
use crate::{BackendError, PreloadOutcome, VoiceHandle, VoiceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transport {
    Stopped,
    Playing,
    Paused,
}

pub(crate) enum VoiceContent {
    Empty,
    OneShot {
        clip: Arc<Clip>,
        /// Fractional frame cursor; the pitch step advances it.
        cursor: f64,
    },
    Stream {
        format: ClipFormat,
        queue: VecDeque<Vec<u8>>,
        /// Fractional frame cursor into the head chunk.
        head_frame: f64,
    },
}

pub(crate) struct MixerVoice {
    pub kind: VoiceKind,
    pub transport: Transport,
    pub gain: f32,
    pub pan: f32,
    pub pitch: f32,
    pub looping: bool,
    pub content: VoiceContent,
    /// Chunks fully consumed since the last `buffers_processed` query.
    pub retired: usize,
}

impl MixerVoice {
    fn new(kind: VoiceKind) -> Self {
        Self {
            kind,
            transport: Transport::Stopped,
            gain: 1.0,
            pan: 0.0,
            pitch: 1.0,
            looping: false,
            content: VoiceContent::Empty,
            retired: 0,
        }
    }
}

pub(crate) struct MixerCore {
    pub out_rate: u32,
    pub master_gain: f32,
    pub voices: Vec<MixerVoice>,
}

impl MixerCore {
    pub fn new() -> Self {
        Self {
            out_rate: 44100,
            master_gain: 1.0,
            voices: Vec::new(),
        }
    }

    pub fn add_voice(&mut self, kind: VoiceKind) -> VoiceHandle {
        self.voices.push(MixerVoice::new(kind));
        VoiceHandle(self.voices.len() as u32 - 1)
    }

    pub fn voice_mut(&mut self, handle: VoiceHandle) -> Option<&mut MixerVoice> {
        self.voices.get_mut(handle.0 as usize)
    }

    pub fn voice(&self, handle: VoiceHandle) -> Option<&MixerVoice> {
        self.voices.get(handle.0 as usize)
    }

    pub fn is_playing(&self, handle: VoiceHandle) -> bool {
        match self.voice(handle) {
            Some(v) => match (&v.transport, &v.content) {
                (Transport::Playing, VoiceContent::OneShot { .. }) => true,
                // A drained line stops running; the pump restarts it by
                // queueing more data.
                (Transport::Playing, VoiceContent::Stream { queue, .. }) => !queue.is_empty(),
                _ => false,
            },
            None => false,
        }
    }

    /// Mix all playing voices into `out` (interleaved, `channels` wide).
    /// The caller zeroes the buffer first.
    pub fn mix(&mut self, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = out.len() / channels;
        let master = self.master_gain;
        let out_rate = self.out_rate.max(1);
        for voice in &mut self.voices {
            if voice.transport != Transport::Playing {
                continue;
            }
            match &mut voice.content {
                VoiceContent::Empty => {}
                VoiceContent::OneShot { clip, cursor } => {
                    let format = clip.format();
                    let total = (clip.len() / format.bytes_per_frame()) as f64;
                    let step = format.sample_rate as f64 / out_rate as f64 * voice.pitch as f64;
                    let (lg, rg) = pan_gains(voice.pan, format.channels == 2);
                    let amp = voice.gain * master;
                    let mut stopped = false;
                    for frame in 0..frames {
                        if *cursor >= total {
                            if voice.looping && total > 0.0 {
                                *cursor %= total;
                            } else {
                                stopped = true;
                                break;
                            }
                        }
                        let (l, r) = frame_lr(clip.bytes(), format, *cursor as usize);
                        write_frame(out, channels, frame, l * lg * amp, r * rg * amp);
                        *cursor += step;
                    }
                    if stopped {
                        voice.transport = Transport::Stopped;
                    }
                }
                VoiceContent::Stream {
                    format,
                    queue,
                    head_frame,
                } => {
                    let step = format.sample_rate as f64 / out_rate as f64 * voice.pitch as f64;
                    let (lg, rg) = pan_gains(voice.pan, format.channels == 2);
                    let amp = voice.gain * master;
                    let bpf = format.bytes_per_frame();
                    for frame in 0..frames {
                        // Retire exhausted head chunks before sampling.
                        loop {
                            let head_frames = match queue.front() {
                                Some(chunk) => (chunk.len() / bpf) as f64,
                                None => break,
                            };
                            if *head_frame < head_frames {
                                break;
                            }
                            *head_frame -= head_frames;
                            queue.pop_front();
                            voice.retired += 1;
                        }
                        let Some(chunk) = queue.front() else { break };
                        let (l, r) = frame_lr(chunk, *format, *head_frame as usize);
                        write_frame(out, channels, frame, l * lg * amp, r * rg * amp);
                        *head_frame += step;
                    }
                }
            }
        }
    }
}

fn write_frame(out: &mut [f32], channels: usize, frame: usize, l: f32, r: f32) {
    let base = frame * channels;
    if channels == 1 {
        out[base] += (l + r) * 0.5;
    } else {
        out[base] += l;
        out[base + 1] += r;
    }
}

/// Decode one frame into left/right samples in `[-1, 1]`.
fn frame_lr(bytes: &[u8], format: ClipFormat, frame: usize) -> (f32, f32) {
    let off = frame * format.bytes_per_frame();
    match (format.bits_per_sample, format.channels) {
        (8, 1) => {
            let s = bytes[off] as i8 as f32 / 128.0;
            (s, s)
        }
        (8, 2) => (
            bytes[off] as i8 as f32 / 128.0,
            bytes[off + 1] as i8 as f32 / 128.0,
        ),
        (16, 1) => {
            let s = i16::from_le_bytes([bytes[off], bytes[off + 1]]) as f32 / 32768.0;
            (s, s)
        }
        (16, 2) => (
            i16::from_le_bytes([bytes[off], bytes[off + 1]]) as f32 / 32768.0,
            i16::from_le_bytes([bytes[off + 2], bytes[off + 3]]) as f32 / 32768.0,
        ),
        _ => (0.0, 0.0),
    }
}

/// Linear pan law. Mono sources are spread across both channels; stereo
/// sources are balanced.
fn pan_gains(pan: f32, stereo: bool) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    if stereo {
        ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
    } else {
        ((1.0 - pan) * 0.5, (1.0 + pan) * 0.5)
    }
}

/// Mixer state plus the output driver: everything the concrete mixer backends
/// share. The backends differ only in how gain and pan are derived.
pub(crate) struct MixerStack {
    pub core: Arc<Mutex<MixerCore>>,
    driver: Option<OutputDriver>,
}

impl MixerStack {
    pub fn new() -> Self {
        Self {
            core: Arc::new(Mutex::new(MixerCore::new())),
            driver: None,
        }
    }

    pub fn open(&mut self) -> Result<(), BackendError> {
        if self.driver.is_some() {
            return Ok(());
        }
        let driver = OutputDriver::open(self.core.clone())?;
        self.core.lock().out_rate = driver.sample_rate();
        self.driver = Some(driver);
        Ok(())
    }

    pub fn close(&mut self) {
        self.driver = None;
        let mut core = self.core.lock();
        for voice in &mut core.voices {
            voice.transport = Transport::Stopped;
            voice.content = VoiceContent::Empty;
        }
    }

    pub fn create_voice(&mut self, kind: VoiceKind) -> Option<VoiceHandle> {
        Some(self.core.lock().add_voice(kind))
    }

    pub fn attach_oneshot(
        &mut self,
        voice: VoiceHandle,
        clip: &Arc<Clip>,
    ) -> Result<(), BackendError> {
        let mut core = self.core.lock();
        let v = core
            .voice_mut(voice)
            .ok_or(BackendError::UnknownVoice(voice))?;
        if v.kind != VoiceKind::OneShot {
            return Err(BackendError::Unsupported);
        }
        v.transport = Transport::Stopped;
        v.content = VoiceContent::OneShot {
            clip: clip.clone(),
            cursor: 0.0,
        };
        Ok(())
    }

    pub fn reset_stream(
        &mut self,
        voice: VoiceHandle,
        format: ClipFormat,
    ) -> Result<(), BackendError> {
        format
            .validate()
            .map_err(|e| BackendError::Format(e.to_string()))?;
        let mut core = self.core.lock();
        let v = core
            .voice_mut(voice)
            .ok_or(BackendError::UnknownVoice(voice))?;
        if v.kind != VoiceKind::Streaming {
            return Err(BackendError::Unsupported);
        }
        v.transport = Transport::Stopped;
        v.retired = 0;
        v.content = VoiceContent::Stream {
            format,
            queue: VecDeque::new(),
            head_frame: 0.0,
        };
        Ok(())
    }

    pub fn preload(
        &mut self,
        voice: VoiceHandle,
        chunks: &[Vec<u8>],
    ) -> Result<PreloadOutcome, BackendError> {
        if chunks.iter().all(|c| c.is_empty()) {
            return Ok(PreloadOutcome::EndOfStream);
        }
        for chunk in chunks {
            self.queue(voice, chunk)?;
        }
        Ok(PreloadOutcome::Buffered)
    }

    pub fn queue(&mut self, voice: VoiceHandle, chunk: &[u8]) -> Result<(), BackendError> {
        if chunk.is_empty() {
            return Ok(());
        }
        let mut core = self.core.lock();
        let v = core
            .voice_mut(voice)
            .ok_or(BackendError::UnknownVoice(voice))?;
        match &mut v.content {
            VoiceContent::Stream { queue, .. } => {
                queue.push_back(chunk.to_vec());
                Ok(())
            }
            _ => Err(BackendError::Unsupported),
        }
    }

    pub fn buffers_processed(&mut self, voice: VoiceHandle) -> usize {
        let mut core = self.core.lock();
        match core.voice_mut(voice) {
            Some(v) => std::mem::take(&mut v.retired),
            None => 0,
        }
    }

    pub fn play(&mut self, voice: VoiceHandle) {
        if let Some(v) = self.core.lock().voice_mut(voice) {
            v.transport = Transport::Playing;
        }
    }

    pub fn pause(&mut self, voice: VoiceHandle) {
        if let Some(v) = self.core.lock().voice_mut(voice) {
            if v.transport == Transport::Playing {
                v.transport = Transport::Paused;
            }
        }
    }

    pub fn stop(&mut self, voice: VoiceHandle) {
        if let Some(v) = self.core.lock().voice_mut(voice) {
            v.transport = Transport::Stopped;
            rewind_content(&mut v.content);
        }
    }

    pub fn rewind(&mut self, voice: VoiceHandle) {
        if let Some(v) = self.core.lock().voice_mut(voice) {
            rewind_content(&mut v.content);
        }
    }

    pub fn flush(&mut self, voice: VoiceHandle) {
        if let Some(v) = self.core.lock().voice_mut(voice) {
            if let VoiceContent::Stream {
                queue, head_frame, ..
            } = &mut v.content
            {
                queue.clear();
                *head_frame = 0.0;
            }
        }
    }

    pub fn close_voice(&mut self, voice: VoiceHandle) {
        if let Some(v) = self.core.lock().voice_mut(voice) {
            v.transport = Transport::Stopped;
            v.content = VoiceContent::Empty;
            v.retired = 0;
        }
    }

    pub fn is_playing(&self, voice: VoiceHandle) -> bool {
        self.core.lock().is_playing(voice)
    }

    pub fn set_pitch(&mut self, voice: VoiceHandle, pitch: f32) {
        if let Some(v) = self.core.lock().voice_mut(voice) {
            v.pitch = pitch.clamp(0.5, 2.0);
        }
    }

    pub fn set_looping(&mut self, voice: VoiceHandle, looping: bool) {
        if let Some(v) = self.core.lock().voice_mut(voice) {
            v.looping = looping;
        }
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.core.lock().master_gain = gain.clamp(0.0, 1.0);
    }
}

fn rewind_content(content: &mut VoiceContent) {
    match content {
        VoiceContent::Empty => {}
        VoiceContent::OneShot { cursor, .. } => *cursor = 0.0,
        VoiceContent::Stream { head_frame, .. } => *head_frame = 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono16(samples: &[i16]) -> Arc<Clip> {
        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Arc::new(Clip::new(ClipFormat::new(44100, 1, 16).unwrap(), bytes).unwrap())
    }

    fn playing_oneshot(core: &mut MixerCore, clip: Arc<Clip>) -> VoiceHandle {
        let handle = core.add_voice(VoiceKind::OneShot);
        let v = core.voice_mut(handle).unwrap();
        v.content = VoiceContent::OneShot { clip, cursor: 0.0 };
        v.transport = Transport::Playing;
        handle
    }

    #[test]
    fn oneshot_mixes_and_stops_at_end() {
        let mut core = MixerCore::new();
        let handle = playing_oneshot(&mut core, mono16(&[i16::MAX; 8]));

        let mut out = vec![0.0f32; 16];
        core.mix(&mut out, 2);
        assert!(out[0] > 0.4 && out[1] > 0.4);
        assert!(core.is_playing(handle));

        // Second block runs past the end of the 8-frame clip.
        core.mix(&mut out, 2);
        assert!(!core.is_playing(handle));
    }

    #[test]
    fn looping_oneshot_wraps_instead_of_stopping() {
        let mut core = MixerCore::new();
        let handle = playing_oneshot(&mut core, mono16(&[1000; 4]));
        core.voice_mut(handle).unwrap().looping = true;

        let mut out = vec![0.0f32; 64];
        core.mix(&mut out, 2);
        core.mix(&mut out, 2);
        assert!(core.is_playing(handle));
    }

    #[test]
    fn pan_hard_left_silences_right() {
        let mut core = MixerCore::new();
        let handle = playing_oneshot(&mut core, mono16(&[i16::MAX; 8]));
        core.voice_mut(handle).unwrap().pan = -1.0;

        let mut out = vec![0.0f32; 8];
        core.mix(&mut out, 2);
        assert!(out[0] > 0.5);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn stream_retires_chunks_and_drains() {
        let mut core = MixerCore::new();
        let handle = core.add_voice(VoiceKind::Streaming);
        let format = ClipFormat::new(44100, 1, 16).unwrap();
        let v = core.voice_mut(handle).unwrap();
        v.content = VoiceContent::Stream {
            format,
            queue: VecDeque::from(vec![vec![0u8; 8], vec![0u8; 8]]),
            head_frame: 0.0,
        };
        v.transport = Transport::Playing;
        assert!(core.is_playing(handle));

        // 4 frames per chunk; 16 output frames drains both.
        let mut out = vec![0.0f32; 32];
        core.mix(&mut out, 2);
        let v = core.voice_mut(handle).unwrap();
        assert_eq!(std::mem::take(&mut v.retired), 2);
        assert!(!core.is_playing(handle));
    }

    #[test]
    fn pitch_doubles_consumption() {
        let mut core = MixerCore::new();
        let handle = playing_oneshot(&mut core, mono16(&[1000; 8]));
        core.voice_mut(handle).unwrap().pitch = 2.0;

        // 8 frames of clip at double speed end within 8 output frames (the
        // cursor lands exactly on the end) plus one block to notice.
        let mut out = vec![0.0f32; 16];
        core.mix(&mut out, 2);
        core.mix(&mut out, 2);
        assert!(!core.is_playing(handle));
    }

    #[test]
    fn master_gain_scales_output() {
        let mut core = MixerCore::new();
        let _ = playing_oneshot(&mut core, mono16(&[i16::MAX; 4]));
        core.master_gain = 0.0;
        let mut out = vec![0.0f32; 8];
        core.mix(&mut out, 2);
        assert!(out.iter().all(|s| *s == 0.0));
    }
}
