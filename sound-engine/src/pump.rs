//! The streaming pump: keeps the backend queues of streaming voices fed.

use std::sync::Arc;
use std::time::Duration;

use audio_backend::{BackendError, PreloadOutcome, VoiceHandle};
use clip_cache::Clip;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, trace};

use crate::engine::EngineShared;
use crate::source::{PlaybackState, Source};

/// Refill cadence while anything is being watched.
const TICK: Duration = Duration::from_millis(20);
/// Wait cap while the watch list is empty; a watch() call wakes us earlier.
const IDLE_WAIT: Duration = Duration::from_secs(60);

/// State shared between the pump thread and the dispatcher.
pub(crate) struct PumpShared {
    watch: Mutex<Vec<Arc<Source>>>,
    cv: Condvar,
}

impl PumpShared {
    pub fn new() -> Self {
        Self {
            watch: Mutex::new(Vec::new()),
            cv: Condvar::new(),
        }
    }

    /// Wake the pump thread. The lock round-trip pairs with the dying-flag
    /// check the pump makes under the same lock, so a shutdown wake cannot
    /// slip between that check and the wait.
    pub fn wake(&self) {
        let _watch = self.watch.lock();
        self.cv.notify_all();
    }

    /// Start watching a streaming source. Any other watched source bound to
    /// the same voice is stopped first; it lost the line.
    pub fn watch_source(&self, source: &Arc<Source>) {
        let target = source.lock().voice.map(|v| v.handle);
        let mut watch = self.watch.lock();
        watch.retain(|other| {
            if Arc::ptr_eq(other, source) {
                return false;
            }
            let mut body = other.lock();
            if target.is_some() && body.voice.map(|v| v.handle) == target {
                body.state = PlaybackState::Stopped;
                body.started_at = None;
                false
            } else {
                true
            }
        });
        watch.push(source.clone());
        drop(watch);
        self.cv.notify_all();
    }

}

/// Rewind the stream and push the initial ring of chunks. Used both at play
/// time (dispatcher) and on loop wrap (pump).
pub(crate) fn preload_stream(
    engine: &EngineShared,
    source: &Arc<Source>,
    handle: VoiceHandle,
    clip: &Arc<Clip>,
) -> Result<PreloadOutcome, BackendError> {
    let chunk_bytes = engine.config.stream_buffer_bytes;
    let mut chunks = Vec::with_capacity(engine.config.num_stream_buffers);
    let mut cursor = 0u64;
    for _ in 0..engine.config.num_stream_buffers {
        let window = clip.window(cursor, chunk_bytes);
        if window.is_empty() {
            break;
        }
        cursor += window.len() as u64;
        chunks.push(window.to_vec());
    }
    source.lock().stream_cursor = 0;
    let outcome = engine.backend.lock().preload(handle, &chunks)?;
    let mut body = source.lock();
    body.stream_cursor = cursor;
    body.pending_preload = false;
    Ok(outcome)
}

enum Verdict {
    Keep,
    Drop,
}

pub(crate) fn run(engine: Arc<EngineShared>, shared: Arc<PumpShared>) {
    debug!("streaming pump up");
    loop {
        {
            let mut watch = shared.watch.lock();
            if engine.is_dying() {
                break;
            }
            let timeout = if watch.is_empty() { IDLE_WAIT } else { TICK };
            let _ = shared.cv.wait_for(&mut watch, timeout);
        }
        if engine.is_dying() {
            break;
        }

        // Work on a snapshot so no backend call happens under the list lock.
        let sources: Vec<Arc<Source>> = shared.watch.lock().clone();
        let mut dropped: Vec<*const Source> = Vec::new();
        for source in &sources {
            if let Verdict::Drop = service(&engine, source) {
                trace!(source = %source.name(), "dropping from watch list");
                dropped.push(Arc::as_ptr(source));
            }
        }
        if !dropped.is_empty() {
            shared
                .watch
                .lock()
                .retain(|s| !dropped.contains(&Arc::as_ptr(s)));
        }
    }
    debug!("streaming pump down");
}

fn service(engine: &EngineShared, source: &Arc<Source>) -> Verdict {
    let (voice, clip, pending_preload) = {
        let mut body = source.lock();
        match body.state {
            PlaybackState::Stopped => return Verdict::Drop,
            PlaybackState::Culled => {
                // A culled looping source still wants to play once activated.
                if body.looping {
                    body.pending_play = true;
                }
                return Verdict::Drop;
            }
            PlaybackState::Paused => return Verdict::Keep,
            PlaybackState::Playing => {}
        }
        let Some(voice) = body.voice else {
            return Verdict::Drop;
        };
        let Some(clip) = body.clip.clone() else {
            return Verdict::Drop;
        };
        (voice, clip, body.pending_preload)
    };

    if pending_preload {
        return match preload_stream(engine, source, voice.handle, &clip) {
            Ok(_) => Verdict::Keep,
            Err(err) => {
                error!(source = %source.name(), %err, "loop preload failed; stopping source");
                stop_on_failure(engine, source, voice.handle);
                Verdict::Drop
            }
        };
    }

    let processed = engine.backend.lock().buffers_processed(voice.handle);
    for _ in 0..processed {
        let cursor = source.lock().stream_cursor;
        let remaining = clip.len() as u64 - cursor;
        if remaining == 0 {
            if source.lock().looping {
                source.lock().pending_preload = true;
                break;
            }
            // Out of data: wait for the backend to drain, then let go.
            if !engine.backend.lock().is_playing(voice.handle) {
                return Verdict::Drop;
            }
            break;
        }
        let chunk = clip.window(cursor, engine.config.stream_buffer_bytes).to_vec();
        let len = chunk.len() as u64;
        match engine.backend.lock().queue(voice.handle, &chunk) {
            Ok(()) => source.lock().stream_cursor = cursor + len,
            Err(err) => {
                error!(source = %source.name(), %err, "queue failed; stopping source");
                stop_on_failure(engine, source, voice.handle);
                return Verdict::Drop;
            }
        }
    }
    Verdict::Keep
}

fn stop_on_failure(engine: &EngineShared, source: &Arc<Source>, handle: VoiceHandle) {
    engine.backend.lock().stop(handle);
    let mut body = source.lock();
    body.state = PlaybackState::Stopped;
    body.started_at = None;
}
