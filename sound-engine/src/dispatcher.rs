//! The command worker: drains the serialized queue, mutates the registry,
//! issues backend calls, and runs the temporary-source reaper.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use audio_backend::{select_backend, Backend, NullBackend};
use clip_cache::ClipUsage;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use crate::command::Command;
use crate::engine::EngineShared;
use crate::error::EngineError;
use crate::math::{Attenuation, Listener, Vec3};
use crate::pump::{preload_stream, PumpShared};
use crate::source::{PlaybackState, Source, SourceDesc, VoiceRef};
use crate::voices::VoicePool;

/// Temporary sources are swept this often.
pub(crate) const REAP_INTERVAL: Duration = Duration::from_secs(10);
/// Backends may report `is_playing == false` briefly right after a play; the
/// natural-stop check ignores them for this long.
pub(crate) const PLAY_GRACE: Duration = Duration::from_millis(100);
/// Wake cadence while anything is playing, so natural stops are noticed.
const MAINTENANCE_TICK: Duration = Duration::from_millis(250);
/// Wake cadence otherwise; bounds the reaper interval.
const IDLE_WAIT: Duration = Duration::from_secs(10);

pub(crate) fn run(engine: Arc<EngineShared>, pump: Arc<PumpShared>, rx: Receiver<Command>) {
    debug!("dispatcher up");
    let mut worker = Worker {
        engine,
        pump,
        pool: VoicePool::empty(),
        initialized: false,
        any_playing: false,
        last_reap: Instant::now(),
    };
    let mut timeout = IDLE_WAIT;
    'outer: loop {
        match rx.recv_timeout(timeout) {
            Ok(cmd) => {
                if worker.handle(cmd).is_break() {
                    break;
                }
                while let Ok(cmd) = rx.try_recv() {
                    if worker.handle(cmd).is_break() {
                        break 'outer;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if worker.engine.is_dying() {
            break;
        }
        worker.maintenance();
        if worker.last_reap.elapsed() >= REAP_INTERVAL {
            worker.reap();
            worker.last_reap = Instant::now();
        }
        timeout = if worker.any_playing {
            MAINTENANCE_TICK
        } else {
            IDLE_WAIT
        };
    }
    debug!("dispatcher down");
}

struct Worker {
    engine: Arc<EngineShared>,
    pump: Arc<PumpShared>,
    pool: VoicePool,
    initialized: bool,
    any_playing: bool,
    last_reap: Instant,
}

impl Worker {
    /// Apply one command. Failures are logged and absorbed; the worker never
    /// dies on a command error.
    fn handle(&mut self, cmd: Command) -> ControlFlow<()> {
        let tag = cmd.tag();
        let result = match cmd {
            Command::Shutdown => return ControlFlow::Break(()),
            Command::Init { priority } => {
                self.install_backend(select_backend(&priority));
                Ok(())
            }
            Command::InitWith { mut backend } => {
                if let Err(err) = backend.open() {
                    error!(%err, "injected backend failed to open; using null");
                    backend = Box::new(NullBackend::new());
                    let _ = backend.open();
                }
                self.install_backend(backend);
                Ok(())
            }
            Command::LoadSound { name } => self.load_sound(&name),
            Command::UnloadSound { name } => {
                self.engine.cache.unload(&name);
                Ok(())
            }
            Command::NewSource { desc } => self.new_source(desc),
            Command::QuickPlay { desc, temporary } => self.quick_play(desc, temporary),
            Command::SetPosition { name, position } => self.set_position(&name, position),
            Command::SetVolume { name, volume } => self.set_volume(&name, volume),
            Command::SetPriority { name, priority } => self.with_body(&name, |b| {
                b.priority = priority;
            }),
            Command::SetLooping { name, looping } => {
                let result = self.with_body(&name, |b| {
                    b.looping = looping;
                });
                if result.is_ok() {
                    self.push_attributes_of(&name);
                }
                result
            }
            Command::SetAttenuation { name, model } => {
                let result = self.with_body_recompute(&name, |b| {
                    b.attenuation = model;
                });
                if result.is_ok() {
                    self.push_attributes_of(&name);
                }
                result
            }
            Command::SetDistOrRoll { name, value } => {
                let result = self.with_body_recompute(&name, |b| {
                    b.distance_or_rolloff = value;
                });
                if result.is_ok() {
                    self.push_attributes_of(&name);
                }
                result
            }
            Command::SetPitch { name, pitch } => {
                let result = self.with_body(&name, |b| {
                    b.pitch = pitch.clamp(0.5, 2.0);
                });
                if result.is_ok() {
                    self.push_attributes_of(&name);
                }
                result
            }
            Command::SetTemporary { name, temporary } => self.with_body(&name, |b| {
                b.temporary = temporary;
            }),
            Command::Play { name } => self.play(&name),
            Command::Pause { name } => self.pause(&name),
            Command::Stop { name } => self.stop(&name),
            Command::Rewind { name } => self.rewind(&name),
            Command::Cull { name } => self.cull(&name),
            Command::Activate { name } => self.activate(&name),
            Command::RemoveSource { name } => self.remove_source(&name),
            Command::MoveListener { delta } => {
                self.update_listener(|l| l.translate(delta));
                Ok(())
            }
            Command::SetListenerPosition { position } => {
                self.update_listener(|l| l.set_position(position));
                Ok(())
            }
            Command::TurnListener { radians } => {
                self.update_listener(|l| l.turn(radians));
                Ok(())
            }
            Command::SetListenerAngle { radians } => {
                self.update_listener(|l| l.set_angle(radians));
                Ok(())
            }
            Command::SetListenerOrientation { look, up } => {
                self.update_listener(|l| l.set_orientation(look, up));
                Ok(())
            }
            Command::SetMasterVolume { volume } => {
                self.set_master_volume(volume);
                Ok(())
            }
        };
        if let Err(err) = result {
            error!(command = tag, %err, "command failed");
        }
        ControlFlow::Continue(())
    }

    fn install_backend(&mut self, mut backend: Box<dyn Backend>) {
        // Disconnect every source from the old backend's voices.
        self.pool.clear_bindings();
        for source in self.engine.registry.snapshot() {
            let mut body = source.lock();
            body.voice = None;
            if matches!(body.state, PlaybackState::Playing | PlaybackState::Paused) {
                body.state = PlaybackState::Stopped;
                body.started_at = None;
            }
        }

        backend.set_master_gain(self.engine.master());
        let listener = *self.engine.listener.read();
        if backend.native_3d() {
            backend.set_listener(listener.position(), listener.look(), listener.up());
        }
        self.pool = VoicePool::build(
            &mut *backend,
            self.engine.config.num_normal_voices,
            self.engine.config.num_streaming_voices,
        );
        let cap = backend
            .trims_oneshot_clips()
            .then_some(self.engine.config.max_clip_bytes);
        self.engine.cache.set_oneshot_cap(cap);

        info!(
            id = ?backend.id(),
            normal = self.pool.normal_len(),
            streaming = self.pool.streaming_len(),
            "backend installed"
        );
        let mut old = {
            let mut guard = self.engine.backend.lock();
            std::mem::replace(&mut *guard, backend)
        };
        old.close();
        self.initialized = true;
        self.engine.set_initialized(true);
    }

    fn load_sound(&mut self, name: &str) -> Result<(), EngineError> {
        self.engine
            .cache
            .get_or_load(name, ClipUsage::OneShot)
            .map(|_| ())
            .map_err(Into::into)
    }

    fn new_source(&mut self, desc: SourceDesc) -> Result<(), EngineError> {
        if desc.name.is_empty() {
            return Err(EngineError::InvalidArgument("empty source name".into()));
        }
        if let Some(old) = self.engine.registry.get(&desc.name) {
            warn!(name = desc.name.as_str(), "source replaced");
            self.discard_source(&old);
        }

        let config = &self.engine.config;
        let attenuation = desc.attenuation.unwrap_or(config.default_attenuation);
        let distance_or_rolloff = desc.distance_or_rolloff.unwrap_or(match attenuation {
            Attenuation::Linear => config.default_fade_distance,
            _ => config.default_rolloff,
        });
        let streaming = desc.streaming;
        let file = desc.file.clone();
        let source = Arc::new(Source::new(desc, attenuation, distance_or_rolloff));

        // Decode up front so play is cheap; a failure here is retried on play.
        let usage = if streaming {
            ClipUsage::Streaming
        } else {
            ClipUsage::OneShot
        };
        match self.engine.cache.get_or_load(&file, usage) {
            Ok(clip) => source.lock().clip = Some(clip),
            Err(err) => warn!(file = file.as_str(), %err, "clip not decodable yet"),
        }

        let listener = *self.engine.listener.read();
        source.lock().recompute(&listener, self.engine.master());
        self.engine.registry.insert(source);
        Ok(())
    }

    fn quick_play(&mut self, desc: SourceDesc, temporary: bool) -> Result<(), EngineError> {
        let name = desc.name.clone();
        self.new_source(desc)?;
        if let Some(source) = self.engine.registry.get(&name) {
            source.lock().temporary = temporary;
        }
        self.play(&name)
    }

    fn play(&mut self, name: &str) -> Result<(), EngineError> {
        if !self.initialized {
            return Err(EngineError::BackendUnsupported);
        }
        let source = self.source(name)?;
        let state = source.lock().state;
        match state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                let voice = source.lock().voice;
                if let Some(voice) = voice {
                    self.engine.backend.lock().play(voice.handle);
                }
                let mut body = source.lock();
                body.state = PlaybackState::Playing;
                body.started_at = Some(Instant::now());
                Ok(())
            }
            PlaybackState::Culled => {
                // Deferred: reinstated on activate.
                let mut body = source.lock();
                if body.looping {
                    body.pending_play = true;
                }
                Ok(())
            }
            PlaybackState::Stopped => self.start_playback(&source),
        }
    }

    fn start_playback(&mut self, source: &Arc<Source>) -> Result<(), EngineError> {
        let (streaming, has_clip) = {
            let body = source.lock();
            (body.streaming, body.clip.is_some())
        };
        if !has_clip {
            let usage = if streaming {
                ClipUsage::Streaming
            } else {
                ClipUsage::OneShot
            };
            let clip = self.engine.cache.get_or_load(source.file(), usage)?;
            source.lock().clip = Some(clip);
        }
        let clip = source
            .lock()
            .clip
            .clone()
            .ok_or_else(|| EngineError::NotFound(source.file().to_string()))?;

        let Some((voice, eviction)) = self.pool.allocate(source, &self.engine.registry) else {
            warn!(source = source.name(), "no allocatable voice; play dropped");
            return Ok(());
        };
        if let Some(eviction) = eviction {
            debug!(
                evicted = eviction.evicted.name(),
                winner = source.name(),
                "voice evicted"
            );
            self.engine.backend.lock().close_voice(eviction.handle);
        }

        self.push_attributes(source);
        let started = if streaming {
            self.start_stream(source, voice, &clip)
        } else {
            self.start_oneshot(source, voice, &clip)
        };
        if let Err(err) = started {
            // Backend refused the voice: unbind and stay stopped.
            self.pool.unbind(voice);
            {
                let mut body = source.lock();
                body.voice = None;
                body.state = PlaybackState::Stopped;
                body.started_at = None;
            }
            self.engine.backend.lock().close_voice(voice.handle);
            return Err(err);
        }
        Ok(())
    }

    fn start_oneshot(
        &mut self,
        source: &Arc<Source>,
        voice: VoiceRef,
        clip: &Arc<clip_cache::Clip>,
    ) -> Result<(), EngineError> {
        {
            let mut backend = self.engine.backend.lock();
            backend.attach_oneshot(voice.handle, clip)?;
            backend.play(voice.handle);
        }
        let mut body = source.lock();
        body.state = PlaybackState::Playing;
        body.started_at = Some(Instant::now());
        Ok(())
    }

    fn start_stream(
        &mut self,
        source: &Arc<Source>,
        voice: VoiceRef,
        clip: &Arc<clip_cache::Clip>,
    ) -> Result<(), EngineError> {
        self.engine
            .backend
            .lock()
            .reset_stream(voice.handle, clip.format())?;
        preload_stream(&self.engine, source, voice.handle, clip)?;
        self.engine.backend.lock().play(voice.handle);
        {
            let mut body = source.lock();
            body.state = PlaybackState::Playing;
            body.started_at = Some(Instant::now());
        }
        self.pump.watch_source(source);
        Ok(())
    }

    fn pause(&mut self, name: &str) -> Result<(), EngineError> {
        let source = self.source(name)?;
        let (state, voice) = {
            let body = source.lock();
            (body.state, body.voice)
        };
        if state == PlaybackState::Playing {
            if let Some(voice) = voice {
                self.engine.backend.lock().pause(voice.handle);
            }
            source.lock().state = PlaybackState::Paused;
        }
        Ok(())
    }

    fn stop(&mut self, name: &str) -> Result<(), EngineError> {
        let source = self.source(name)?;
        let (state, voice) = {
            let body = source.lock();
            (body.state, body.voice)
        };
        if matches!(state, PlaybackState::Playing | PlaybackState::Paused) {
            if let Some(voice) = voice {
                self.engine.backend.lock().stop(voice.handle);
            }
            let mut body = source.lock();
            body.state = PlaybackState::Stopped;
            body.started_at = None;
            body.pending_play = false;
            body.pending_preload = false;
            body.stream_cursor = 0;
        }
        Ok(())
    }

    fn rewind(&mut self, name: &str) -> Result<(), EngineError> {
        let source = self.source(name)?;
        let (state, streaming, voice) = {
            let body = source.lock();
            (body.state, body.streaming, body.voice)
        };
        match state {
            PlaybackState::Playing if streaming => {
                // Stop, then replay from the top.
                if let Some(voice) = voice {
                    self.engine.backend.lock().stop(voice.handle);
                }
                {
                    let mut body = source.lock();
                    body.state = PlaybackState::Stopped;
                    body.stream_cursor = 0;
                    body.pending_preload = false;
                    body.started_at = None;
                }
                self.start_playback(&source)
            }
            PlaybackState::Playing => {
                if let Some(voice) = voice {
                    self.engine.backend.lock().rewind(voice.handle);
                }
                source.lock().started_at = Some(Instant::now());
                Ok(())
            }
            PlaybackState::Paused => {
                if let Some(voice) = voice {
                    self.engine.backend.lock().stop(voice.handle);
                }
                let mut body = source.lock();
                body.state = PlaybackState::Stopped;
                body.stream_cursor = 0;
                body.started_at = None;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn cull(&mut self, name: &str) -> Result<(), EngineError> {
        let source = self.source(name)?;
        let voice = {
            let mut body = source.lock();
            if body.state == PlaybackState::Culled {
                return Ok(());
            }
            if body.state == PlaybackState::Playing && body.looping {
                body.pending_play = true;
            }
            body.state = PlaybackState::Culled;
            body.started_at = None;
            body.voice.take()
        };
        if let Some(voice) = voice {
            self.pool.unbind(voice);
            self.engine.backend.lock().close_voice(voice.handle);
        }
        Ok(())
    }

    fn activate(&mut self, name: &str) -> Result<(), EngineError> {
        let source = self.source(name)?;
        let pending = {
            let mut body = source.lock();
            if body.state != PlaybackState::Culled {
                return Ok(());
            }
            body.state = PlaybackState::Stopped;
            std::mem::take(&mut body.pending_play)
        };
        if pending {
            self.start_playback(&source)
        } else {
            Ok(())
        }
    }

    fn remove_source(&mut self, name: &str) -> Result<(), EngineError> {
        let source = self.source(name)?;
        self.discard_source(&source);
        Ok(())
    }

    /// Unbind, close the voice, and drop the source from the registry.
    fn discard_source(&mut self, source: &Arc<Source>) {
        let voice = {
            let mut body = source.lock();
            body.state = PlaybackState::Stopped;
            body.started_at = None;
            body.pending_play = false;
            body.voice.take()
        };
        if let Some(voice) = voice {
            self.pool.unbind(voice);
            self.engine.backend.lock().close_voice(voice.handle);
        }
        self.engine.registry.remove(source.name());
    }

    fn set_position(&mut self, name: &str, position: Vec3) -> Result<(), EngineError> {
        let result = self.with_body_recompute(name, |b| {
            b.position = position;
        });
        if result.is_ok() {
            self.push_attributes_of(name);
        }
        result
    }

    fn set_volume(&mut self, name: &str, volume: f32) -> Result<(), EngineError> {
        let result = self.with_body_recompute(name, |b| {
            b.source_volume = volume.clamp(0.0, 1.0);
        });
        if result.is_ok() {
            self.push_attributes_of(name);
        }
        result
    }

    fn set_master_volume(&mut self, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        self.engine.set_master(volume);
        self.engine.backend.lock().set_master_gain(volume);
        let listener = *self.engine.listener.read();
        self.engine.registry.notify_listener_moved(&listener, volume);
    }

    fn update_listener(&mut self, apply: impl FnOnce(&mut Listener)) {
        {
            let mut listener = self.engine.listener.write();
            apply(&mut listener);
        }
        let listener = *self.engine.listener.read();
        self.engine
            .registry
            .notify_listener_moved(&listener, self.engine.master());
        {
            let mut backend = self.engine.backend.lock();
            if backend.native_3d() {
                backend.set_listener(listener.position(), listener.look(), listener.up());
            }
        }
        // Distance-derived gains changed for every bound voice.
        for source in self.engine.registry.snapshot() {
            if source.lock().voice.is_some() {
                self.push_attributes(&source);
            }
        }
    }

    /// Push the source's current attributes to its bound voice, translated
    /// for the backend flavor.
    fn push_attributes(&mut self, source: &Arc<Source>) {
        let snapshot = {
            let body = source.lock();
            body.voice.map(|voice| {
                (
                    voice,
                    body.position,
                    body.attenuation,
                    body.distance_or_rolloff,
                    body.base_gain,
                    body.source_volume,
                    body.pan,
                    body.pitch,
                    body.looping,
                )
            })
        };
        let Some((voice, position, attenuation, dr, base_gain, source_volume, pan, pitch, looping)) =
            snapshot
        else {
            return;
        };
        let mut backend = self.engine.backend.lock();
        if backend.native_3d() {
            // With native rolloff the backend attenuates by distance itself;
            // for the other models we hand over the precomputed gain.
            let (rolloff, gain) = match attenuation {
                Attenuation::InverseRolloff => (dr, source_volume),
                _ => (0.0, base_gain),
            };
            backend.set_3d(voice.handle, position, rolloff, looping);
            backend.set_gain(voice.handle, gain.clamp(0.0, 1.0));
        } else {
            backend.set_gain(voice.handle, base_gain);
            backend.set_pan(voice.handle, pan);
            backend.set_looping(voice.handle, looping);
        }
        backend.set_pitch(voice.handle, pitch);
    }

    fn push_attributes_of(&mut self, name: &str) {
        if let Some(source) = self.engine.registry.get(name) {
            if source.lock().voice.is_some() {
                self.push_attributes(&source);
            }
        }
    }

    /// Sync Playing sources against the backend to observe natural stops.
    fn maintenance(&mut self) {
        let mut any_playing = false;
        for source in self.engine.registry.snapshot() {
            let probe = {
                let body = source.lock();
                if body.state != PlaybackState::Playing {
                    continue;
                }
                any_playing = true;
                // Looping streams cycle through drained states between loop
                // wraps; their lifecycle belongs to the pump.
                if body.streaming && (body.looping || body.pending_preload) {
                    continue;
                }
                let in_grace = body
                    .started_at
                    .is_some_and(|t| t.elapsed() < PLAY_GRACE)
                    && body.clip.as_ref().is_some_and(|c| !c.is_empty());
                if in_grace {
                    continue;
                }
                body.voice
            };
            let still_playing = match probe {
                Some(voice) => self.engine.backend.lock().is_playing(voice.handle),
                None => false,
            };
            if !still_playing {
                let mut body = source.lock();
                if body.state == PlaybackState::Playing {
                    debug!(source = source.name(), "natural stop");
                    body.state = PlaybackState::Stopped;
                    body.started_at = None;
                }
            }
        }
        self.any_playing = any_playing;
    }

    /// Remove temporary sources that came to rest. Sources still wanting to
    /// play (deferred loops) are skipped.
    fn reap(&mut self) {
        for source in self.engine.registry.snapshot() {
            let reapable = {
                let body = source.lock();
                body.temporary
                    && !matches!(body.state, PlaybackState::Playing | PlaybackState::Paused)
                    && !body.pending_play
            };
            if reapable {
                debug!(source = source.name(), "reaping temporary source");
                self.discard_source(&source);
            }
        }
    }

    fn source(&self, name: &str) -> Result<Arc<Source>, EngineError> {
        self.engine
            .registry
            .get(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    fn with_body(
        &mut self,
        name: &str,
        apply: impl FnOnce(&mut crate::source::SourceBody),
    ) -> Result<(), EngineError> {
        let source = self.source(name)?;
        apply(&mut source.lock());
        Ok(())
    }

    fn with_body_recompute(
        &mut self,
        name: &str,
        apply: impl FnOnce(&mut crate::source::SourceBody),
    ) -> Result<(), EngineError> {
        let source = self.source(name)?;
        let listener = *self.engine.listener.read();
        let master = self.engine.master();
        let mut body = source.lock();
        apply(&mut body);
        body.recompute(&listener, master);
        Ok(())
    }
}
