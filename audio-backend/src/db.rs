//! Decibel-domain gain control for the software mixer.

/// Map a linear gain in `[0, 1]` onto a line-level control range
/// `[min_db, max_db]` (with `max_db <= 0`). The curve matches the line
/// control's exponential response: `g = 0` lands on `min_db` and `g = 1` on
/// `max_db`.
pub fn linear_to_db(gain: f32, min_db: f32, max_db: f32) -> f32 {
    let g = gain.clamp(0.0, 1.0);
    let amp_gain_db = 0.5 * max_db - min_db;
    let c = std::f32::consts::LN_10 / 20.0;
    min_db + (1.0 / c) * (1.0 + ((c * amp_gain_db).exp() - 1.0) * g).ln()
}

pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN_DB: f32 = -80.0;
    const MAX_DB: f32 = 0.0;

    #[test]
    fn endpoints_hit_the_control_range() {
        assert!((linear_to_db(0.0, MIN_DB, MAX_DB) - MIN_DB).abs() < 1e-3);
        assert!((linear_to_db(1.0, MIN_DB, MAX_DB) - MAX_DB).abs() < 1e-3);
    }

    #[test]
    fn curve_is_monotonic() {
        let mut last = f32::MIN;
        for i in 0..=100 {
            let db = linear_to_db(i as f32 / 100.0, MIN_DB, MAX_DB);
            assert!(db >= last);
            last = db;
        }
    }

    #[test]
    fn amplitude_endpoints() {
        assert!((db_to_amplitude(0.0) - 1.0).abs() < 1e-6);
        assert!(db_to_amplitude(-80.0) < 1e-3);
    }

    #[test]
    fn out_of_range_gain_is_clamped() {
        assert_eq!(
            linear_to_db(-1.0, MIN_DB, MAX_DB),
            linear_to_db(0.0, MIN_DB, MAX_DB)
        );
        assert_eq!(
            linear_to_db(2.0, MIN_DB, MAX_DB),
            linear_to_db(1.0, MIN_DB, MAX_DB)
        );
    }
}
