//! Shared helpers for the end-to-end engine tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use audio_backend::mock::{MockBackend, MockHandle};
use clip_cache::{ClipFormat, MemoryProducer};
use sound_engine::{EngineConfig, SoundEngine};

/// 8 kHz mono 16-bit: 16 bytes of PCM per millisecond.
pub const TEST_FORMAT_BYTES_PER_MS: usize = 16;

pub fn test_format() -> ClipFormat {
    ClipFormat::new(8000, 1, 16).expect("valid test format")
}

/// Silent little-endian PCM lasting `ms` milliseconds in the test format.
pub fn pcm_ms(ms: u64) -> Vec<u8> {
    vec![0; ms as usize * TEST_FORMAT_BYTES_PER_MS]
}

/// Install an env-filtered subscriber once so failing runs can be rerun with
/// `RUST_LOG=sound_engine=trace`.
pub fn init_logs() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine wired to the deterministic mock backend, with the producer exposed
/// for clip registration and the mock handle for backend inspection.
pub fn engine_with_mock(config: EngineConfig) -> (SoundEngine, Arc<MemoryProducer>, MockHandle) {
    init_logs();
    let producer = Arc::new(MemoryProducer::new());
    let engine = SoundEngine::new(config, producer.clone());
    let (backend, handle) = MockBackend::pair();
    engine.init_with(Box::new(backend));
    assert!(wait_until(Duration::from_secs(2), || engine.initialized()));
    (engine, producer, handle)
}

/// Poll `probe` until it holds or the deadline passes; returns whether it
/// ever held.
pub fn wait_until(timeout: Duration, mut probe: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if probe() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Sample `probe` every few milliseconds for `window`, reporting whether it
/// held at any sample.
pub fn observed_during(window: Duration, mut probe: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + window;
    let mut seen = false;
    while Instant::now() < deadline {
        seen |= probe();
        std::thread::sleep(Duration::from_millis(2));
    }
    seen
}
