use std::ops::{Add, AddAssign, Mul, Sub};

/// World-space point or velocity, in arena units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.x.hypot(self.y)
    }

    #[inline]
    pub fn distance_to(&self, other: Vec2) -> f32 {
        (*self - other).length()
    }

    /// Heading in radians, as sent in the `rotation` field
    pub fn angle(&self) -> f32 {
        self.y.atan2(self.x)
    }

    /// False for NaN/Infinity from a corrupt frame
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_zone_center() {
        let center = Vec2::new(10.0, 10.0);
        assert_eq!(Vec2::new(13.0, 14.0).distance_to(center), 5.0);
        assert_eq!(center.distance_to(center), 0.0);
    }

    #[test]
    fn test_heading() {
        assert_eq!(Vec2::new(1.0, 0.0).angle(), 0.0);
        assert!((Vec2::new(0.0, 2.0).angle() - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(Vec2::new(1.0, 2.0).is_finite());
        assert!(!Vec2::new(f32::NAN, 2.0).is_finite());
        assert!(!Vec2::new(1.0, f32::INFINITY).is_finite());
    }

    #[test]
    fn test_integrate_velocity() {
        let mut position = Vec2::new(1.0, 1.0);
        position += Vec2::new(20.0, -10.0) * 0.05;
        assert_eq!(position, Vec2::new(2.0, 0.5));
        assert_eq!(position - Vec2::new(2.0, 0.5), Vec2::ZERO);
    }
}
