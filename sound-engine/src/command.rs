//! The serialized command set drained by the dispatcher worker.

use audio_backend::{Backend, BackendId};

use crate::math::{Attenuation, Vec3};
use crate::source::SourceDesc;

/// One queued request. The facade enqueues; only the worker applies.
pub enum Command {
    /// Select the first workable backend from a priority list and build the
    /// voice pools.
    Init { priority: Vec<BackendId> },
    /// Install a caller-supplied backend (tests, embedders).
    InitWith { backend: Box<dyn Backend> },
    LoadSound { name: String },
    UnloadSound { name: String },
    NewSource { desc: SourceDesc },
    QuickPlay { desc: SourceDesc, temporary: bool },
    SetPosition { name: String, position: Vec3 },
    SetVolume { name: String, volume: f32 },
    SetPriority { name: String, priority: bool },
    SetLooping { name: String, looping: bool },
    SetAttenuation { name: String, model: Attenuation },
    SetDistOrRoll { name: String, value: f32 },
    SetPitch { name: String, pitch: f32 },
    Play { name: String },
    Pause { name: String },
    Stop { name: String },
    Rewind { name: String },
    Cull { name: String },
    Activate { name: String },
    SetTemporary { name: String, temporary: bool },
    RemoveSource { name: String },
    MoveListener { delta: Vec3 },
    SetListenerPosition { position: Vec3 },
    TurnListener { radians: f32 },
    SetListenerAngle { radians: f32 },
    SetListenerOrientation { look: Vec3, up: Vec3 },
    SetMasterVolume { volume: f32 },
    Shutdown,
}

impl Command {
    /// Short tag for log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Command::Init { .. } => "Init",
            Command::InitWith { .. } => "InitWith",
            Command::LoadSound { .. } => "LoadSound",
            Command::UnloadSound { .. } => "UnloadSound",
            Command::NewSource { .. } => "NewSource",
            Command::QuickPlay { .. } => "QuickPlay",
            Command::SetPosition { .. } => "SetPosition",
            Command::SetVolume { .. } => "SetVolume",
            Command::SetPriority { .. } => "SetPriority",
            Command::SetLooping { .. } => "SetLooping",
            Command::SetAttenuation { .. } => "SetAttenuation",
            Command::SetDistOrRoll { .. } => "SetDistOrRoll",
            Command::SetPitch { .. } => "SetPitch",
            Command::Play { .. } => "Play",
            Command::Pause { .. } => "Pause",
            Command::Stop { .. } => "Stop",
            Command::Rewind { .. } => "Rewind",
            Command::Cull { .. } => "Cull",
            Command::Activate { .. } => "Activate",
            Command::SetTemporary { .. } => "SetTemporary",
            Command::RemoveSource { .. } => "RemoveSource",
            Command::MoveListener { .. } => "MoveListener",
            Command::SetListenerPosition { .. } => "SetListenerPosition",
            Command::TurnListener { .. } => "TurnListener",
            Command::SetListenerAngle { .. } => "SetListenerAngle",
            Command::SetListenerOrientation { .. } => "SetListenerOrientation",
            Command::SetMasterVolume { .. } => "SetMasterVolume",
            Command::Shutdown => "Shutdown",
        }
    }
}
