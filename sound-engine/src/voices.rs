//! The fixed voice pools and the allocation policy.

use std::sync::Arc;

use audio_backend::{Backend, VoiceHandle, VoiceKind};
use tracing::warn;

use crate::registry::SourceRegistry;
use crate::source::{PlaybackState, Source, VoiceRef};

/// One pool slot: the backend handle plus the name of the last source that
/// used it. Voices are created at init and live until shutdown.
#[derive(Debug)]
pub struct VoiceSlot {
    pub handle: VoiceHandle,
    pub last_source: Option<String>,
}

/// An eviction decided by the allocator. The caller closes the backend voice
/// after the pool bookkeeping is done; the evicted source is disconnected but
/// not destroyed.
pub struct Eviction {
    pub handle: VoiceHandle,
    pub evicted: Arc<Source>,
}

/// Two ordered voice arrays with round-robin cursors.
pub struct VoicePool {
    normal: Vec<VoiceSlot>,
    streaming: Vec<VoiceSlot>,
    normal_cursor: usize,
    streaming_cursor: usize,
}

impl VoicePool {
    pub fn empty() -> Self {
        Self {
            normal: Vec::new(),
            streaming: Vec::new(),
            normal_cursor: 0,
            streaming_cursor: 0,
        }
    }

    /// Ask the backend for the configured voice counts, tolerating hardware
    /// that runs out early.
    pub fn build(backend: &mut dyn Backend, normal: usize, streaming: usize) -> Self {
        let mut pool = Self::empty();
        for n in 0..normal {
            match backend.create_voice(VoiceKind::OneShot) {
                Some(handle) => pool.normal.push(VoiceSlot {
                    handle,
                    last_source: None,
                }),
                None => {
                    warn!(requested = normal, created = n, "one-shot voice pool came up short");
                    break;
                }
            }
        }
        for n in 0..streaming {
            match backend.create_voice(VoiceKind::Streaming) {
                Some(handle) => pool.streaming.push(VoiceSlot {
                    handle,
                    last_source: None,
                }),
                None => {
                    warn!(requested = streaming, created = n, "streaming voice pool came up short");
                    break;
                }
            }
        }
        pool
    }

    pub fn normal_len(&self) -> usize {
        self.normal.len()
    }

    pub fn streaming_len(&self) -> usize {
        self.streaming.len()
    }

    fn slots_mut(&mut self, kind: VoiceKind) -> (&mut Vec<VoiceSlot>, &mut usize) {
        match kind {
            VoiceKind::OneShot => (&mut self.normal, &mut self.normal_cursor),
            VoiceKind::Streaming => (&mut self.streaming, &mut self.streaming_cursor),
        }
    }

    /// Clear a binding without touching the source side.
    pub fn unbind(&mut self, voice: VoiceRef) {
        let (slots, _) = self.slots_mut(voice.kind);
        if let Some(slot) = slots.get_mut(voice.index) {
            slot.last_source = None;
        }
    }

    pub fn clear_bindings(&mut self) {
        for slot in self.normal.iter_mut().chain(self.streaming.iter_mut()) {
            slot.last_source = None;
        }
    }

    /// Three-pass allocation over the pool matching the source's kind:
    /// re-bind a voice the source already holds, then take a free or idle
    /// voice, then evict a non-priority (or idle) source. Returns `None` when
    /// every voice is held by a playing priority source.
    ///
    /// The caller must not hold the source's body lock.
    pub fn allocate(
        &mut self,
        source: &Arc<Source>,
        registry: &SourceRegistry,
    ) -> Option<(VoiceRef, Option<Eviction>)> {
        let kind = if source.lock().streaming {
            VoiceKind::Streaming
        } else {
            VoiceKind::OneShot
        };
        let name = source.name().to_string();
        let (slots, cursor) = self.slots_mut(kind);
        let len = slots.len();
        if len == 0 {
            return None;
        }

        // Pass 1: the source still owns a voice from last time.
        for (index, slot) in slots.iter().enumerate() {
            if slot.last_source.as_deref() == Some(name.as_str()) {
                let voice = VoiceRef {
                    kind,
                    index,
                    handle: slot.handle,
                };
                source.lock().voice = Some(voice);
                return Some((voice, None));
            }
        }

        // Pass 2: a free slot, or one whose source is gone or not playing.
        for i in 0..len {
            let index = (*cursor + i) % len;
            let previous = match &slots[index].last_source {
                None => None,
                Some(prev_name) => match registry.get(prev_name) {
                    None => None,
                    Some(prev) => {
                        if prev.lock().state == PlaybackState::Playing {
                            continue;
                        }
                        Some(prev)
                    }
                },
            };
            if let Some(prev) = previous {
                let mut body = prev.lock();
                if body
                    .voice
                    .is_some_and(|v| v.kind == kind && v.index == index)
                {
                    body.voice = None;
                    // A paused source that lost its line cannot resume.
                    if body.state == PlaybackState::Paused {
                        body.state = PlaybackState::Stopped;
                    }
                }
            }
            let voice = VoiceRef {
                kind,
                index,
                handle: slots[index].handle,
            };
            slots[index].last_source = Some(name.clone());
            *cursor = (index + 1) % len;
            source.lock().voice = Some(voice);
            return Some((voice, None));
        }

        // Pass 3: evict the first non-priority or idle holder.
        for i in 0..len {
            let index = (*cursor + i) % len;
            let Some(prev_name) = slots[index].last_source.clone() else {
                continue;
            };
            let Some(prev) = registry.get(&prev_name) else {
                continue;
            };
            let evictable = {
                let body = prev.lock();
                !body.priority || body.state != PlaybackState::Playing
            };
            if !evictable {
                continue;
            }
            {
                let mut body = prev.lock();
                body.voice = None;
                body.state = PlaybackState::Stopped;
                body.started_at = None;
            }
            let handle = slots[index].handle;
            let voice = VoiceRef {
                kind,
                index,
                handle,
            };
            slots[index].last_source = Some(name.clone());
            source.lock().voice = Some(voice);
            return Some((
                voice,
                Some(Eviction {
                    handle,
                    evicted: prev,
                }),
            ));
        }

        None
    }
}
