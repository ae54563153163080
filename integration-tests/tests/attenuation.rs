//! Gain model behavior observed through the facade queries.

use std::time::Duration;

use anyhow::Result;
use integration_tests::*;
use sound_engine::{Attenuation, EngineConfig, SourceDesc, Vec3};

fn gain_settles_to(
    engine: &sound_engine::SoundEngine,
    name: &str,
    expected: f32,
) -> bool {
    wait_until(Duration::from_secs(1), || {
        engine
            .computed_gain(name)
            .map(|g| (g - expected).abs() < 1e-5)
            .unwrap_or(false)
    })
}

#[test]
fn linear_gain_is_zero_at_the_fade_limit() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(EngineConfig::default());
    producer.insert("s.wav", test_format(), pcm_ms(100));

    engine.set_listener_position(Vec3::ZERO);
    engine.new_source(
        SourceDesc::new("S", "s.wav")
            .position(Vec3::new(1000.0, 0.0, 0.0))
            .attenuation(Attenuation::Linear)
            .distance_or_rolloff(500.0),
    )?;

    assert!(gain_settles_to(&engine, "S", 0.0));
    Ok(())
}

#[test]
fn gain_at_zero_distance_is_volume_times_master() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(EngineConfig::default());
    producer.insert("s.wav", test_format(), pcm_ms(100));

    engine.new_source(
        SourceDesc::new("S", "s.wav")
            .position(Vec3::ZERO)
            .attenuation(Attenuation::InverseRolloff)
            .distance_or_rolloff(0.03),
    )?;
    engine.set_volume("S", 0.6)?;
    engine.set_master_volume(0.5);

    assert!(gain_settles_to(&engine, "S", 0.3));
    Ok(())
}

#[test]
fn master_volume_zero_silences_every_source() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(EngineConfig::default());
    producer.insert("s.wav", test_format(), pcm_ms(100));

    for name in ["a", "b", "c"] {
        engine.new_source(
            SourceDesc::new(name, "s.wav").position(Vec3::new(5.0, 0.0, -2.0)),
        )?;
    }
    engine.set_master_volume(0.0);

    assert!(wait_until(Duration::from_secs(1), || {
        ["a", "b", "c"]
            .iter()
            .all(|n| engine.computed_gain(n).map(|g| g == 0.0).unwrap_or(false))
    }));
    Ok(())
}

#[test]
fn moving_the_listener_recomputes_gain() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(EngineConfig::default());
    producer.insert("s.wav", test_format(), pcm_ms(100));

    engine.new_source(
        SourceDesc::new("S", "s.wav")
            .position(Vec3::new(400.0, 0.0, 0.0))
            .attenuation(Attenuation::Linear)
            .distance_or_rolloff(500.0),
    )?;
    assert!(gain_settles_to(&engine, "S", 1.0 - 400.0 / 500.0));

    engine.set_listener_position(Vec3::new(400.0, 0.0, 0.0));
    assert!(gain_settles_to(&engine, "S", 1.0));
    Ok(())
}

#[test]
fn last_position_write_wins() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(EngineConfig::default());
    producer.insert("s.wav", test_format(), pcm_ms(100));

    engine.new_source(
        SourceDesc::new("S", "s.wav")
            .attenuation(Attenuation::Linear)
            .distance_or_rolloff(100.0),
    )?;
    for step in 0..=10 {
        engine.set_position("S", Vec3::new(step as f32 * 10.0, 0.0, 0.0))?;
    }
    // Final write puts the source at the fade limit.
    assert!(gain_settles_to(&engine, "S", 0.0));
    assert!(wait_until(Duration::from_secs(1), || {
        engine
            .get_position("S")
            .map(|p| p == Vec3::new(100.0, 0.0, 0.0))
            .unwrap_or(false)
    }));
    Ok(())
}
