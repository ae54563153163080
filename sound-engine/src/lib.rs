//! 3D positional sound engine.
//!
//! Callers place named sources in space, move a listener, and issue play
//! commands; the engine renders an attenuated, panned, multi-voice mix through
//! a pluggable [`audio_backend::Backend`]. All public commands are enqueued
//! onto a serialized queue and applied by a worker thread, which makes the API
//! thread-safe and keeps command ordering deterministic; a second worker pumps
//! PCM chunks to streaming voices.
//!
//! ```no_run
//! use std::sync::Arc;
//! use audio_backend::BackendId;
//! use clip_cache::{ClipFormat, MemoryProducer};
//! use sound_engine::{EngineConfig, SoundEngine, SourceDesc};
//!
//! let producer = Arc::new(MemoryProducer::new());
//! producer.insert("beep", ClipFormat::new(22050, 1, 16).unwrap(), vec![0; 44100]);
//!
//! let engine = SoundEngine::new(EngineConfig::default(), producer);
//! engine.init(&[BackendId::SpatialMixer, BackendId::SoftwareMixer]);
//! engine.new_source(SourceDesc::new("chime", "beep")).unwrap();
//! engine.play("chime").unwrap();
//! ```

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod math;
pub mod registry;
pub mod source;
pub mod voices;

mod dispatcher;
mod pump;

pub use audio_backend::BackendId;
pub use command::Command;
pub use config::EngineConfig;
pub use engine::SoundEngine;
pub use error::EngineError;
pub use math::{Attenuation, Listener, Vec3};
pub use source::{PlaybackState, SourceDesc};
