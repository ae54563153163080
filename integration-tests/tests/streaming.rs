//! Streaming pump behavior: chunk accounting, loop wraparound, culling.

use std::time::Duration;

use anyhow::Result;
use audio_backend::mock::{MockHandle, MockOp};
use audio_backend::VoiceHandle;
use integration_tests::*;
use sound_engine::{EngineConfig, SourceDesc};

fn stream_config() -> EngineConfig {
    EngineConfig {
        num_streaming_voices: 1,
        stream_buffer_bytes: 65_536,
        ..EngineConfig::default()
    }
}

/// The voice the first stream was bound to, from the op log.
fn stream_voice(handle: &MockHandle) -> Option<VoiceHandle> {
    handle.ops().iter().find_map(|op| match op {
        MockOp::ResetStream { voice } => Some(*voice),
        _ => None,
    })
}

#[test]
fn full_play_queues_exactly_the_clip() -> Result<()> {
    let (engine, producer, handle) = engine_with_mock(stream_config());
    let clip_len = 200 * 1024;
    producer.insert("music.ogg", test_format(), vec![0; clip_len]);

    engine.new_source(SourceDesc::new("M", "music.ogg").streaming(true))?;
    engine.play("M")?;

    assert!(wait_until(Duration::from_millis(500), || engine.playing("M")));
    assert!(wait_until(Duration::from_secs(5), || !engine.playing("M")));

    let voice = stream_voice(&handle).expect("stream voice in op log");
    assert_eq!(handle.streamed_bytes(voice), clip_len as u64);
    Ok(())
}

#[test]
fn looping_stream_wraps_and_keeps_playing() -> Result<()> {
    let (engine, producer, handle) = engine_with_mock(stream_config());
    let clip_len = 200 * 1024;
    producer.insert("music.ogg", test_format(), vec![0; clip_len]);

    engine.new_source(SourceDesc::new("L", "music.ogg").streaming(true).looping(true))?;
    engine.play("L")?;

    std::thread::sleep(Duration::from_millis(500));
    assert!(engine.playing("L"));

    // The cursor wrapped at least once: more bytes went through the voice
    // than the clip holds.
    let voice = stream_voice(&handle).expect("stream voice in op log");
    assert!(
        handle.streamed_bytes(voice) > clip_len as u64,
        "streamed {} of a {} byte clip",
        handle.streamed_bytes(voice),
        clip_len
    );

    engine.stop("L")?;
    assert!(wait_until(Duration::from_millis(500), || !engine.playing("L")));
    Ok(())
}

#[test]
fn culled_stream_releases_its_voice_and_resumes_on_activate() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(stream_config());
    producer.insert("music.ogg", test_format(), vec![0; 128 * 1024]);

    engine.new_source(SourceDesc::new("L", "music.ogg").streaming(true).looping(true))?;
    engine.play("L")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("L")));

    engine.cull("L")?;
    assert!(wait_until(Duration::from_millis(500), || !engine.playing("L")));

    // Activate reinstates the deferred play of a looping source.
    engine.activate("L")?;
    assert!(wait_until(Duration::from_secs(1), || engine.playing("L")));
    Ok(())
}

#[test]
fn paused_stream_holds_its_cursor() -> Result<()> {
    let (engine, producer, handle) = engine_with_mock(stream_config());
    producer.insert("music.ogg", test_format(), vec![0; 512 * 1024]);

    engine.new_source(SourceDesc::new("M", "music.ogg").streaming(true))?;
    engine.play("M")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("M")));

    engine.pause("M")?;
    assert!(wait_until(Duration::from_millis(500), || !engine.playing("M")));
    let voice = stream_voice(&handle).expect("stream voice in op log");
    let at_pause = handle.streamed_bytes(voice);

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(handle.streamed_bytes(voice), at_pause);

    engine.play("M")?;
    assert!(wait_until(Duration::from_secs(1), || {
        handle.streamed_bytes(voice) > at_pause
    }));
    Ok(())
}

#[test]
fn second_stream_on_the_only_voice_stops_the_first() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(stream_config());
    producer.insert("music.ogg", test_format(), vec![0; 512 * 1024]);

    engine.new_source(SourceDesc::new("one", "music.ogg").streaming(true).looping(true))?;
    engine.new_source(SourceDesc::new("two", "music.ogg").streaming(true).looping(true))?;

    engine.play("one")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("one")));

    engine.play("two")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("two")));
    assert!(wait_until(Duration::from_millis(500), || !engine.playing("one")));
    Ok(())
}
