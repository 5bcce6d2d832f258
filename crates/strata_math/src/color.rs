//! RGBA color

use core::ops::{Add, Mul};

use crate::vector::Vec4;

/// Linear RGBA color with `f32` channels
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct ColorRgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl ColorRgba {
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const DARK_GRAY: Self = Self::new(0.2, 0.2, 0.2, 1.0);
    pub const GRAY: Self = Self::new(0.5, 0.5, 0.5, 1.0);
    pub const LIGHT_GRAY: Self = Self::new(0.8, 0.8, 0.8, 1.0);
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Self = Self::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);
    pub const YELLOW: Self = Self::new(1.0, 1.0, 0.0, 1.0);
    pub const MAGENTA: Self = Self::new(1.0, 0.0, 1.0, 1.0);
    pub const CYAN: Self = Self::new(0.0, 1.0, 1.0, 1.0);
    pub const BLACK_NO_ALPHA: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Clamp every channel into `[0, 1]`
    pub fn clamp(self) -> Self {
        Self::new(
            self.r.clamp(0.0, 1.0),
            self.g.clamp(0.0, 1.0),
            self.b.clamp(0.0, 1.0),
            self.a.clamp(0.0, 1.0),
        )
    }

    /// Linear blend from `self` toward `other`
    pub fn interpolate(self, other: Self, t: f32) -> Self {
        Self::new(
            self.r + (other.r - self.r) * t,
            self.g + (other.g - self.g) * t,
            self.b + (other.b - self.b) * t,
            self.a + (other.a - self.a) * t,
        )
    }

    /// Pack as `0xRRGGBBAA`
    pub fn as_int_rgba(self) -> u32 {
        let c = self.clamp();
        let byte = |v: f32| (v * 255.0).round() as u32;
        byte(c.r) << 24 | byte(c.g) << 16 | byte(c.b) << 8 | byte(c.a)
    }

    /// Unpack from `0xRRGGBBAA`
    pub fn from_int_rgba(color: u32) -> Self {
        let channel = |shift: u32| ((color >> shift) & 0xFF) as f32 / 255.0;
        Self::new(channel(24), channel(16), channel(8), channel(0))
    }

    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    #[inline]
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }
}

impl Default for ColorRgba {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Add for ColorRgba {
    type Output = Self;
    #[inline] fn add(self, rhs: Self) -> Self { Self::new(self.r + rhs.r, self.g + rhs.g, self.b + rhs.b, self.a + rhs.a) }
}

impl Mul<f32> for ColorRgba {
    type Output = Self;
    #[inline] fn mul(self, rhs: f32) -> Self { Self::new(self.r * rhs, self.g * rhs, self.b * rhs, self.a * rhs) }
}

impl Mul for ColorRgba {
    type Output = Self;
    #[inline] fn mul(self, rhs: Self) -> Self { Self::new(self.r * rhs.r, self.g * rhs.g, self.b * rhs.b, self.a * rhs.a) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_round_trip() {
        let packed = ColorRgba::new(1.0, 0.5, 0.0, 1.0).as_int_rgba();
        assert_eq!(packed, 0xFF80_00FF);
        let back = ColorRgba::from_int_rgba(packed);
        assert!((back.g - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_clamp_and_interpolate() {
        let c = ColorRgba::new(2.0, -1.0, 0.5, 1.0).clamp();
        assert_eq!(c, ColorRgba::new(1.0, 0.0, 0.5, 1.0));
        let mid = ColorRgba::BLACK.interpolate(ColorRgba::WHITE, 0.5);
        assert_eq!(mid, ColorRgba::new(0.5, 0.5, 0.5, 1.0));
    }
}
