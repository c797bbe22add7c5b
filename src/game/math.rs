//! Vector and rotation math for aim, traces and projectile launch
//!
//! Rotations follow the usual shooter convention: degrees, X forward, Z up,
//! yaw around Z and pitch around the right axis.

use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// 3D vector in world units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const X: Vec3 = Vec3::new(1.0, 0.0, 0.0);
    pub const Y: Vec3 = Vec3::new(0.0, 1.0, 0.0);
    pub const Z: Vec3 = Vec3::new(0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, `None` for (near) zero vectors
    pub fn normalized(self) -> Option<Vec3> {
        let len = self.length();
        if len <= 1e-6 || !len.is_finite() {
            None
        } else {
            Some(self * (1.0 / len))
        }
    }

    /// Unit vector or zero, never NaN
    pub fn safe_normal(self) -> Vec3 {
        self.normalized().unwrap_or(Vec3::ZERO)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Pitch is clamped to this range so the view never flips over the pole
pub const MAX_PITCH: f32 = 89.0;

/// Orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotator {
    pub const fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    /// Yaw wrapped to [0, 360), pitch clamped to the look limits
    pub fn normalized(self) -> Rotator {
        Rotator {
            pitch: self.pitch.clamp(-MAX_PITCH, MAX_PITCH),
            yaw: self.yaw.rem_euclid(360.0),
            roll: self.roll.rem_euclid(360.0),
        }
    }

    pub fn add_yaw(&mut self, delta: f32) {
        *self = Rotator::new(self.pitch, self.yaw + delta, self.roll).normalized();
    }

    pub fn add_pitch(&mut self, delta: f32) {
        *self = Rotator::new(self.pitch + delta, self.yaw, self.roll).normalized();
    }

    /// Same heading with pitch and roll removed
    pub fn yaw_only(self) -> Rotator {
        Rotator::new(0.0, self.yaw, 0.0)
    }

    /// Unit direction this rotation faces
    pub fn to_vector(self) -> Vec3 {
        let (sp, cp) = self.pitch.to_radians().sin_cos();
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        Vec3::new(cp * cy, cp * sy, sp)
    }

    /// Right-hand axis of the yaw frame
    pub fn right_vector(self) -> Vec3 {
        let (sy, cy) = self.yaw.to_radians().sin_cos();
        Vec3::new(-sy, cy, 0.0)
    }

    /// Orientation facing along `direction` (roll is always zero)
    pub fn from_direction(direction: Vec3) -> Rotator {
        let yaw = direction.y.atan2(direction.x).to_degrees();
        let horizontal = (direction.x * direction.x + direction.y * direction.y).sqrt();
        let pitch = direction.z.atan2(horizontal).to_degrees();
        Rotator::new(pitch, yaw, 0.0)
    }

    /// Rotate a vector expressed in this rotator's yaw frame into world space
    pub fn rotate_yaw(self, local: Vec3) -> Vec3 {
        let forward = self.yaw_only().to_vector();
        let right = self.right_vector();
        forward * local.x + right * local.y + Vec3::Z * local.z
    }

    pub fn is_finite(self) -> bool {
        self.pitch.is_finite() && self.yaw.is_finite() && self.roll.is_finite()
    }
}

/// Random unit vector inside a cone around `direction`.
///
/// `half_angle_deg <= 0` returns `direction` unchanged, so a zero spread
/// never perturbs the shot. Directions are sampled uniformly over the
/// spherical cap.
pub fn random_unit_vector_in_cone<R: Rng + ?Sized>(
    direction: Vec3,
    half_angle_deg: f32,
    rng: &mut R,
) -> Vec3 {
    let Some(axis) = direction.normalized() else {
        return direction;
    };
    if !(half_angle_deg > 0.0) {
        return axis;
    }

    let half_angle = half_angle_deg.min(180.0).to_radians();
    let cos_max = half_angle.cos();
    let cos_theta: f32 = rng.gen_range(cos_max..=1.0);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi: f32 = rng.gen_range(0.0..std::f32::consts::TAU);

    // Any vector not parallel to the axis seeds the orthonormal basis
    let seed = if axis.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let u = axis.cross(seed).safe_normal();
    let v = axis.cross(u);

    (axis * cos_theta + u * (sin_theta * phi.cos()) + v * (sin_theta * phi.sin())).safe_normal()
}
