//! Listener pose and the distance/pan math behind per-source gains.

use serde::{Deserialize, Serialize};

pub use glam::Vec3;

/// Distance-squared scale of the inverse rolloff curve.
pub const ROLLOFF_SCALE: f32 = 0.0005;

/// Maps distance-from-listener onto a `0..=1` gain multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attenuation {
    None,
    InverseRolloff,
    Linear,
}

/// Distance-only part of the gain computation.
pub fn attenuation_base(model: Attenuation, distance: f32, distance_or_rolloff: f32) -> f32 {
    match model {
        Attenuation::None => 1.0,
        Attenuation::Linear => {
            if distance <= 0.0 {
                1.0
            } else if distance >= distance_or_rolloff {
                0.0
            } else {
                1.0 - distance / distance_or_rolloff
            }
        }
        Attenuation::InverseRolloff => {
            if distance <= 0.0 {
                1.0
            } else {
                let att = (distance_or_rolloff * distance * distance * ROLLOFF_SCALE).max(0.0);
                1.0 / (1.0 + att)
            }
        }
    }
}

/// The virtual ear: position plus an orthonormal-ish look/up frame. The yaw
/// angle tracks rotation about +Y, counterclockwise seen from above, with
/// `yaw = 0` facing `-Z`.
#[derive(Debug, Clone, Copy)]
pub struct Listener {
    position: Vec3,
    look: Vec3,
    up: Vec3,
    yaw: f32,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            look: Vec3::NEG_Z,
            up: Vec3::Y,
            yaw: 0.0,
        }
    }
}

impl Listener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn look(&self) -> Vec3 {
        self.look
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    /// Face the absolute yaw angle, levelling the look vector.
    pub fn set_angle(&mut self, yaw: f32) {
        self.yaw = yaw;
        self.look = Vec3::new(-yaw.sin(), 0.0, -yaw.cos());
        self.up = Vec3::Y;
    }

    /// Rotate the current frame about +Y.
    pub fn turn(&mut self, delta: f32) {
        self.yaw += delta;
        self.look = rotate_y(self.look, delta);
        self.up = rotate_y(self.up, delta);
    }

    /// Set the frame directly. Vectors are normalized; a degenerate or
    /// colinear pair keeps the previous up vector.
    pub fn set_orientation(&mut self, look: Vec3, up: Vec3) {
        let look = look.normalize_or_zero();
        if look == Vec3::ZERO {
            return;
        }
        self.look = look;
        let up = up.normalize_or_zero();
        if up != Vec3::ZERO && look.cross(up).length_squared() > 1e-6 {
            self.up = up;
        }
        self.yaw = (-look.x).atan2(-look.z);
    }
}

fn rotate_y(v: Vec3, angle: f32) -> Vec3 {
    let (sin, cos) = angle.sin_cos();
    Vec3::new(v.x * cos + v.z * sin, v.y, -v.x * sin + v.z * cos)
}

/// Stereo pan of a source as heard by the listener: `-1` hard left, `+1`
/// hard right.
pub fn pan_for(listener: &Listener, position: Vec3) -> f32 {
    let offset = position - listener.position();
    let side = listener.up().cross(listener.look()).normalize_or_zero();
    let x = offset.dot(side);
    let z = offset.dot(listener.look());
    if x == 0.0 && z == 0.0 {
        0.0
    } else {
        (-x.atan2(z).sin()).clamp(-1.0, 1.0)
    }
}
