//! Voice scheduling: eviction and the priority shield.

use std::time::Duration;

use anyhow::Result;
use integration_tests::*;
use sound_engine::{EngineConfig, SourceDesc};

fn one_voice_config() -> EngineConfig {
    EngineConfig {
        num_normal_voices: 1,
        ..EngineConfig::default()
    }
}

#[test]
fn newcomer_evicts_non_priority_source() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(one_voice_config());
    producer.insert("long.wav", test_format(), pcm_ms(10_000));

    engine.new_source(SourceDesc::new("A", "long.wav"))?;
    engine.new_source(SourceDesc::new("B", "long.wav"))?;

    engine.play("A")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("A")));

    engine.play("B")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("B")));
    assert!(wait_until(Duration::from_millis(500), || !engine.playing("A")));
    Ok(())
}

#[test]
fn playing_priority_source_blocks_the_newcomer() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(one_voice_config());
    producer.insert("long.wav", test_format(), pcm_ms(10_000));

    engine.new_source(SourceDesc::new("A", "long.wav").priority(true))?;
    engine.new_source(SourceDesc::new("B", "long.wav"))?;

    engine.play("A")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("A")));

    engine.play("B")?;
    // Give the worker ample time to process the doomed play.
    std::thread::sleep(Duration::from_millis(300));
    assert!(engine.playing("A"));
    assert!(!engine.playing("B"));
    Ok(())
}

#[test]
fn stopped_priority_source_is_fair_game() -> Result<()> {
    let (engine, producer, _handle) = engine_with_mock(one_voice_config());
    producer.insert("long.wav", test_format(), pcm_ms(10_000));

    engine.new_source(SourceDesc::new("A", "long.wav").priority(true))?;
    engine.new_source(SourceDesc::new("B", "long.wav"))?;

    engine.play("A")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("A")));
    engine.stop("A")?;
    assert!(wait_until(Duration::from_millis(500), || !engine.playing("A")));

    engine.play("B")?;
    assert!(wait_until(Duration::from_millis(500), || engine.playing("B")));
    Ok(())
}

#[test]
fn replay_reuses_the_same_voice() -> Result<()> {
    let (engine, producer, handle) = engine_with_mock(one_voice_config());
    producer.insert("short.wav", test_format(), pcm_ms(50));

    use audio_backend::mock::MockOp;
    let plays = |h: &audio_backend::mock::MockHandle| {
        h.ops()
            .iter()
            .filter_map(|op| match op {
                MockOp::Play(voice) => Some(*voice),
                _ => None,
            })
            .collect::<Vec<_>>()
    };

    engine.new_source(SourceDesc::new("A", "short.wav"))?;
    engine.play("A")?;
    assert!(wait_until(Duration::from_secs(1), || !engine.playing("A")));
    // Let the worker's maintenance pass observe the natural stop.
    std::thread::sleep(Duration::from_millis(600));

    engine.play("A")?;
    assert!(wait_until(Duration::from_secs(1), || plays(&handle).len() == 2));
    let plays = plays(&handle);
    assert_eq!(plays[0], plays[1]);
    Ok(())
}
