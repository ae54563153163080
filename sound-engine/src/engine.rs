//! The public facade. Every command returns after enqueueing; queries read
//! shared state under short locks and never wait on the worker.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use audio_backend::{Backend, BackendId, NullBackend};
use clip_cache::{ClipCache, ClipProducer};
use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::command::Command;
use crate::config::EngineConfig;
use crate::dispatcher::{self, PLAY_GRACE};
use crate::error::EngineError;
use crate::math::{Listener, Vec3};
use crate::pump::{self, PumpShared};
use crate::registry::SourceRegistry;
use crate::source::{PlaybackState, SourceDesc};

/// How long `shutdown` waits for each worker thread.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

/// State shared by the facade, the dispatcher worker and the streaming pump.
pub(crate) struct EngineShared {
    pub config: EngineConfig,
    pub registry: SourceRegistry,
    pub listener: RwLock<Listener>,
    pub cache: ClipCache,
    pub backend: Mutex<Box<dyn Backend>>,
    master_gain: AtomicU32,
    dying: AtomicBool,
    initialized: AtomicBool,
}

impl EngineShared {
    pub fn master(&self) -> f32 {
        f32::from_bits(self.master_gain.load(Ordering::Relaxed))
    }

    pub fn set_master(&self, gain: f32) {
        self.master_gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn is_dying(&self) -> bool {
        self.dying.load(Ordering::Relaxed)
    }

    pub fn set_initialized(&self, value: bool) {
        self.initialized.store(value, Ordering::Relaxed);
    }
}

/// Thread-safe handle to the engine. Cheap to share behind an `Arc`; dropping
/// the last handle shuts the worker threads down.
pub struct SoundEngine {
    shared: Arc<EngineShared>,
    pump_shared: Arc<PumpShared>,
    tx: Sender<Command>,
    worker: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
    quickplay_seq: AtomicU64,
}

impl SoundEngine {
    /// Build the engine and spawn its worker threads. No backend is selected
    /// until [`SoundEngine::init`] runs; commands before that are applied to
    /// the registry but cannot start playback.
    pub fn new(config: EngineConfig, producer: Arc<dyn ClipProducer>) -> Self {
        let config = config.sanitized();
        let cache = ClipCache::new(producer, config.file_chunk_bytes);
        let master = config.master_gain;
        let shared = Arc::new(EngineShared {
            config,
            registry: SourceRegistry::new(),
            listener: RwLock::new(Listener::new()),
            cache,
            backend: Mutex::new(Box::new(NullBackend::new())),
            master_gain: AtomicU32::new(master.to_bits()),
            dying: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        });
        let pump_shared = Arc::new(PumpShared::new());

        let (tx, rx) = unbounded();
        let worker = {
            let shared = shared.clone();
            let pump_shared = pump_shared.clone();
            thread::Builder::new()
                .name("snd-dispatch".into())
                .spawn(move || dispatcher::run(shared, pump_shared, rx))
                .expect("spawning dispatcher thread")
        };
        let pump = {
            let shared = shared.clone();
            let pump_shared = pump_shared.clone();
            thread::Builder::new()
                .name("snd-pump".into())
                .spawn(move || pump::run(shared, pump_shared))
                .expect("spawning pump thread")
        };

        Self {
            shared,
            pump_shared,
            tx,
            worker: Some(worker),
            pump: Some(pump),
            quickplay_seq: AtomicU64::new(0),
        }
    }

    fn send(&self, command: Command) {
        // The worker outlives every facade call except post-shutdown ones,
        // which are deliberately ignored.
        let _ = self.tx.send(command);
    }

    fn named(&self, name: &str, command: Command) -> Result<(), EngineError> {
        if name.is_empty() {
            return Err(EngineError::InvalidArgument("empty source name".into()));
        }
        self.send(command);
        Ok(())
    }

    // Lifecycle -------------------------------------------------------------

    /// Select a backend by priority list and build the voice pools.
    pub fn init(&self, priority: &[BackendId]) {
        self.send(Command::Init {
            priority: priority.to_vec(),
        });
    }

    /// Install a caller-supplied backend instead of running selection.
    pub fn init_with(&self, backend: Box<dyn Backend>) {
        self.send(Command::InitWith { backend });
    }

    pub fn initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Relaxed)
    }

    // Clip cache ------------------------------------------------------------

    pub fn load_sound(&self, name: &str) -> Result<(), EngineError> {
        self.named(
            name,
            Command::LoadSound {
                name: name.to_string(),
            },
        )
    }

    pub fn unload_sound(&self, name: &str) -> Result<(), EngineError> {
        self.named(
            name,
            Command::UnloadSound {
                name: name.to_string(),
            },
        )
    }

    // Source management -----------------------------------------------------

    pub fn new_source(&self, desc: SourceDesc) -> Result<(), EngineError> {
        if desc.name.is_empty() {
            return Err(EngineError::InvalidArgument("empty source name".into()));
        }
        self.send(Command::NewSource { desc });
        Ok(())
    }

    /// Create a source and immediately play it. An empty name gets a unique
    /// generated one; the name used is returned.
    pub fn quick_play(&self, mut desc: SourceDesc, temporary: bool) -> Result<String, EngineError> {
        if desc.name.is_empty() {
            let seq = self.quickplay_seq.fetch_add(1, Ordering::Relaxed);
            desc.name = format!("fastplay_{seq}");
        }
        let name = desc.name.clone();
        self.send(Command::QuickPlay { desc, temporary });
        Ok(name)
    }

    pub fn remove_source(&self, name: &str) -> Result<(), EngineError> {
        self.named(
            name,
            Command::RemoveSource {
                name: name.to_string(),
            },
        )
    }

    pub fn set_temporary(&self, name: &str, temporary: bool) -> Result<(), EngineError> {
        self.named(
            name,
            Command::SetTemporary {
                name: name.to_string(),
                temporary,
            },
        )
    }

    // Attributes ------------------------------------------------------------

    pub fn set_position(&self, name: &str, position: Vec3) -> Result<(), EngineError> {
        self.named(
            name,
            Command::SetPosition {
                name: name.to_string(),
                position,
            },
        )
    }

    pub fn set_volume(&self, name: &str, volume: f32) -> Result<(), EngineError> {
        self.named(
            name,
            Command::SetVolume {
                name: name.to_string(),
                volume,
            },
        )
    }

    /// Alias of [`SoundEngine::set_volume`].
    pub fn set_gain(&self, name: &str, gain: f32) -> Result<(), EngineError> {
        self.set_volume(name, gain)
    }

    pub fn set_priority(&self, name: &str, priority: bool) -> Result<(), EngineError> {
        self.named(
            name,
            Command::SetPriority {
                name: name.to_string(),
                priority,
            },
        )
    }

    pub fn set_looping(&self, name: &str, looping: bool) -> Result<(), EngineError> {
        self.named(
            name,
            Command::SetLooping {
                name: name.to_string(),
                looping,
            },
        )
    }

    pub fn set_attenuation(
        &self,
        name: &str,
        model: crate::math::Attenuation,
    ) -> Result<(), EngineError> {
        self.named(
            name,
            Command::SetAttenuation {
                name: name.to_string(),
                model,
            },
        )
    }

    pub fn set_distance_or_rolloff(&self, name: &str, value: f32) -> Result<(), EngineError> {
        self.named(
            name,
            Command::SetDistOrRoll {
                name: name.to_string(),
                value,
            },
        )
    }

    pub fn set_pitch(&self, name: &str, pitch: f32) -> Result<(), EngineError> {
        if !(0.5..=2.0).contains(&pitch) {
            return Err(EngineError::InvalidArgument(format!(
                "pitch {pitch} outside 0.5..=2.0"
            )));
        }
        self.named(
            name,
            Command::SetPitch {
                name: name.to_string(),
                pitch,
            },
        )
    }

    // Playback --------------------------------------------------------------

    pub fn play(&self, name: &str) -> Result<(), EngineError> {
        self.named(
            name,
            Command::Play {
                name: name.to_string(),
            },
        )
    }

    pub fn pause(&self, name: &str) -> Result<(), EngineError> {
        self.named(
            name,
            Command::Pause {
                name: name.to_string(),
            },
        )
    }

    pub fn stop(&self, name: &str) -> Result<(), EngineError> {
        self.named(
            name,
            Command::Stop {
                name: name.to_string(),
            },
        )
    }

    pub fn rewind(&self, name: &str) -> Result<(), EngineError> {
        self.named(
            name,
            Command::Rewind {
                name: name.to_string(),
            },
        )
    }

    pub fn cull(&self, name: &str) -> Result<(), EngineError> {
        self.named(
            name,
            Command::Cull {
                name: name.to_string(),
            },
        )
    }

    pub fn activate(&self, name: &str) -> Result<(), EngineError> {
        self.named(
            name,
            Command::Activate {
                name: name.to_string(),
            },
        )
    }

    // Listener --------------------------------------------------------------

    pub fn move_listener(&self, delta: Vec3) {
        self.send(Command::MoveListener { delta });
    }

    pub fn set_listener_position(&self, position: Vec3) {
        self.send(Command::SetListenerPosition { position });
    }

    pub fn turn_listener(&self, radians: f32) {
        self.send(Command::TurnListener { radians });
    }

    pub fn set_listener_angle(&self, radians: f32) {
        self.send(Command::SetListenerAngle { radians });
    }

    pub fn set_listener_orientation(&self, look: Vec3, up: Vec3) {
        self.send(Command::SetListenerOrientation { look, up });
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.send(Command::SetMasterVolume { volume });
    }

    // Queries ---------------------------------------------------------------

    /// Whether the named source is audibly playing. Combines the source's
    /// state with the backend's view of its voice; a just-started voice gets
    /// a short grace period while the backend spins up.
    pub fn playing(&self, name: &str) -> bool {
        let Some(source) = self.shared.registry.get(name) else {
            return false;
        };
        let (state, voice, in_grace) = {
            let body = source.lock();
            let in_grace = body.started_at.is_some_and(|t| t.elapsed() < PLAY_GRACE)
                && body.clip.as_ref().is_some_and(|c| !c.is_empty());
            (body.state, body.voice, in_grace)
        };
        if state != PlaybackState::Playing {
            return false;
        }
        match voice {
            None => false,
            Some(voice) => in_grace || self.shared.backend.lock().is_playing(voice.handle),
        }
    }

    /// Whether anything at all is playing.
    pub fn playing_any(&self) -> bool {
        self.shared
            .registry
            .names()
            .iter()
            .any(|name| self.playing(name))
    }

    pub fn get_volume(&self, name: &str) -> Result<f32, EngineError> {
        self.query(name, |b| b.source_volume)
    }

    pub fn get_pitch(&self, name: &str) -> Result<f32, EngineError> {
        self.query(name, |b| b.pitch)
    }

    pub fn get_position(&self, name: &str) -> Result<Vec3, EngineError> {
        self.query(name, |b| b.position)
    }

    /// Derived gain including attenuation and master volume.
    pub fn computed_gain(&self, name: &str) -> Result<f32, EngineError> {
        self.query(name, |b| b.computed_gain)
    }

    pub fn list_sources(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    pub fn listener(&self) -> Listener {
        *self.shared.listener.read()
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.master()
    }

    fn query<T>(
        &self,
        name: &str,
        read: impl FnOnce(&crate::source::SourceBody) -> T,
    ) -> Result<T, EngineError> {
        let source = self
            .shared
            .registry
            .get(name)
            .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
        let body = source.lock();
        Ok(read(&body))
    }

    // Shutdown --------------------------------------------------------------

    /// Stop both worker threads, waiting up to five seconds each, then close
    /// the backend. A thread that refuses to exit is logged and abandoned.
    pub fn shutdown(&mut self) {
        if self.worker.is_none() && self.pump.is_none() {
            return;
        }
        self.shared.dying.store(true, Ordering::Relaxed);
        let _ = self.tx.send(Command::Shutdown);
        self.pump_shared.wake();

        for (name, handle) in [
            ("dispatcher", self.worker.take()),
            ("pump", self.pump.take()),
        ] {
            let Some(handle) = handle else { continue };
            let deadline = Instant::now() + SHUTDOWN_WAIT;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(thread = name, "did not exit in time; abandoning");
            }
        }

        self.shared.backend.lock().close();
        self.shared.set_initialized(false);
    }
}

impl Drop for SoundEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
