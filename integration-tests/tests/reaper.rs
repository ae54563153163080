//! Temporary sources and the reaper sweep.

use std::time::Duration;

use anyhow::Result;
use integration_tests::*;
use sound_engine::{EngineConfig, SourceDesc};

#[test]
fn quick_play_temporary_is_reaped_after_it_stops() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(EngineConfig::default());
    producer.insert("blip.wav", test_format(), pcm_ms(100));

    let name = engine.quick_play(SourceDesc::new("T", "blip.wav"), true)?;
    assert_eq!(name, "T");

    assert!(observed_during(Duration::from_millis(100), || engine.playing("T")));
    assert!(wait_until(Duration::from_millis(300), || !engine.playing("T")));

    // Gone after at most one reaper cycle.
    assert!(wait_until(Duration::from_secs(12), || {
        !engine.list_sources().contains(&"T".to_string())
    }));
    Ok(())
}

#[test]
fn quick_play_generates_unique_names() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(EngineConfig::default());
    producer.insert("blip.wav", test_format(), pcm_ms(50));

    let a = engine.quick_play(SourceDesc::new("", "blip.wav"), true)?;
    let b = engine.quick_play(SourceDesc::new("", "blip.wav"), true)?;
    assert_ne!(a, b);
    assert!(a.starts_with("fastplay_"));

    assert!(wait_until(Duration::from_secs(1), || {
        let sources = engine.list_sources();
        sources.contains(&a) && sources.contains(&b)
    }));
    Ok(())
}

#[test]
fn non_temporary_source_survives_the_reaper() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(EngineConfig::default());
    producer.insert("blip.wav", test_format(), pcm_ms(50));

    engine.new_source(SourceDesc::new("keep", "blip.wav"))?;
    engine.play("keep")?;
    assert!(wait_until(Duration::from_secs(1), || !engine.playing("keep")));

    std::thread::sleep(Duration::from_secs(11));
    assert!(engine.list_sources().contains(&"keep".to_string()));
    Ok(())
}

#[test]
fn remove_source_takes_effect_without_the_reaper() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(EngineConfig::default());
    producer.insert("blip.wav", test_format(), pcm_ms(5_000));

    engine.new_source(SourceDesc::new("gone", "blip.wav"))?;
    engine.play("gone")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("gone")));

    engine.remove_source("gone")?;
    assert!(wait_until(Duration::from_secs(1), || {
        engine.list_sources().is_empty() && !engine.playing("gone")
    }));
    Ok(())
}
