//! C¹ cubic blends between two closed-form regimes.
//!
//! A [`BlendedCurve`] evaluates a low regime below `x1`, a high regime above
//! `x2`, and in between a cubic that matches the value and slope of the low
//! regime at `x1` and of the high regime at `x2`. The cubic is fitted once
//! when the curve is built.
//!
//! Points are assigned to exactly one region: `x <= x1` is low,
//! `x1 < x <= x2` is the blend, `x > x2` is high.
//!
//! # Examples
//!
//! ```
//! use aerosize::blend::{BlendedCurve, Regime};
//!
//! struct Ramp;
//! impl Regime for Ramp {
//!     fn value(&self, x: f64) -> f64 { x }
//!     fn slope(&self, _x: f64) -> f64 { 1.0 }
//! }
//!
//! struct Flat;
//! impl Regime for Flat {
//!     fn value(&self, _x: f64) -> f64 { 1.0 }
//!     fn slope(&self, _x: f64) -> f64 { 0.0 }
//! }
//!
//! let curve = BlendedCurve::new(Ramp, Flat, 0.5, 1.5).unwrap();
//! assert!((curve.value(0.5) - 0.5).abs() < 1e-15);
//! assert!(curve.slope(1.5).abs() < 1e-15);
//! ```

use nalgebra::{Matrix4, Vector4};

use crate::config::ConfigError;
use crate::Array;

/// A closed-form function with its derivative.
pub trait Regime {
    fn value(&self, x: f64) -> f64;
    fn slope(&self, x: f64) -> f64;
}

/// Region of a point relative to a blend interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Low,
    Blend,
    High,
}

/// Cubic matching value and slope at both ends of `[x1, x2]`.
///
/// The polynomial is stored in the local coordinate `t = (x - x1) / (x2 - x1)`
/// so the fit stays well conditioned far from the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBlend {
    x1: f64,
    x2: f64,
    /// `[a, b, c, d]` of `a t^3 + b t^2 + c t + d`
    coeffs: [f64; 4],
}

impl CubicBlend {
    /// Solves the 4x4 end-condition system.
    pub fn fit(
        x1: f64,
        x2: f64,
        low_value: f64,
        low_slope: f64,
        high_value: f64,
        high_slope: f64,
    ) -> Result<Self, ConfigError> {
        let degenerate = ConfigError::DegenerateBlend { x1, x2 };
        let inputs = [x1, x2, low_value, low_slope, high_value, high_slope];
        if !(x2 > x1) || inputs.iter().any(|v| !v.is_finite()) {
            return Err(degenerate);
        }
        let width = x2 - x1;

        #[rustfmt::skip]
        let system = Matrix4::new(
            0.0, 0.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            1.0, 1.0, 1.0, 1.0,
            3.0, 2.0, 1.0, 0.0,
        );
        let rhs = Vector4::new(low_value, low_slope * width, high_value, high_slope * width);
        let solution = system.lu().solve(&rhs).ok_or(degenerate)?;

        Ok(CubicBlend { x1, x2, coeffs: [solution[0], solution[1], solution[2], solution[3]] })
    }

    pub fn lower(&self) -> f64 {
        self.x1
    }

    pub fn upper(&self) -> f64 {
        self.x2
    }

    /// Coefficients in the local coordinate, highest power first.
    pub fn coefficients(&self) -> [f64; 4] {
        self.coeffs
    }

    fn local(&self, x: f64) -> f64 {
        (x - self.x1) / (self.x2 - self.x1)
    }

    pub fn value(&self, x: f64) -> f64 {
        let [a, b, c, d] = self.coeffs;
        let t = self.local(x);
        ((a * t + b) * t + c) * t + d
    }

    pub fn slope(&self, x: f64) -> f64 {
        let [a, b, c, _] = self.coeffs;
        let t = self.local(x);
        ((3.0 * a * t + 2.0 * b) * t + c) / (self.x2 - self.x1)
    }
}

/// Two regimes joined by a [`CubicBlend`].
#[derive(Debug, Clone)]
pub struct BlendedCurve<L, H> {
    low: L,
    high: H,
    blend: CubicBlend,
}

impl<L: Regime, H: Regime> BlendedCurve<L, H> {
    pub fn new(low: L, high: H, x1: f64, x2: f64) -> Result<Self, ConfigError> {
        let blend = CubicBlend::fit(x1, x2, low.value(x1), low.slope(x1), high.value(x2), high.slope(x2))?;
        Ok(BlendedCurve { low, high, blend })
    }

    pub fn blend(&self) -> &CubicBlend {
        &self.blend
    }

    pub fn region(&self, x: f64) -> Region {
        if x <= self.blend.x1 {
            Region::Low
        } else if x <= self.blend.x2 {
            Region::Blend
        } else {
            Region::High
        }
    }

    pub fn value(&self, x: f64) -> f64 {
        match self.region(x) {
            Region::Low => self.low.value(x),
            Region::Blend => self.blend.value(x),
            Region::High => self.high.value(x),
        }
    }

    pub fn slope(&self, x: f64) -> f64 {
        match self.region(x) {
            Region::Low => self.low.slope(x),
            Region::Blend => self.blend.slope(x),
            Region::High => self.high.slope(x),
        }
    }

    /// Elementwise values over an array.
    pub fn values(&self, x: &Array) -> Array {
        x.mapv(|x| self.value(x))
    }

    /// Elementwise slopes over an array.
    pub fn slopes(&self, x: &Array) -> Array {
        x.mapv(|x| self.slope(x))
    }
}
