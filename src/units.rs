//! Unit conversion for configuration values.
//!
//! Models compute in SI throughout. Options that are conventionally quoted
//! in other units (battery energy density in Wh/kg, field lengths in feet,
//! wing loadings in lbf/ft^2) are converted once when the configuration is
//! read. Conversions go through `uom` quantities; only the sizing constants
//! live here.
//!
//! # Examples
//!
//! ```
//! use aerosize::units;
//!
//! assert!((units::joules_per_kilogram(1.0) - 3600.0).abs() < 1e-9);
//! assert!((units::meters_from_feet(1.0) - 0.3048).abs() < 1e-15);
//! assert!((units::pascals_from_psf(1.0) * units::psf_from_pascals(1.0) - 1.0).abs() < 1e-15);
//! ```

use uom::si::energy::{joule, watt_hour};
use uom::si::f64::{Energy, Force, Length, Mass, Power, Pressure};
use uom::si::force::{newton, pound_force};
use uom::si::length::{foot, meter};
use uom::si::mass::{kilogram, pound};
use uom::si::power::{horsepower, watt};
use uom::si::pressure::{pascal, pound_force_per_square_foot};

/// Standard gravity used by every sizing relation, m/s^2.
pub const GRAVITY: f64 = 9.81;

/// Sea-level standard density, kg/m^3.
pub const SEA_LEVEL_DENSITY: f64 = 1.225;

/// Pressure in Pa from lbf/ft^2.
pub fn pascals_from_psf(value: f64) -> f64 {
    Pressure::new::<pound_force_per_square_foot>(value).get::<pascal>()
}

/// Pressure in lbf/ft^2 from Pa.
pub fn psf_from_pascals(value: f64) -> f64 {
    Pressure::new::<pascal>(value).get::<pound_force_per_square_foot>()
}

pub fn meters_from_feet(value: f64) -> f64 {
    Length::new::<foot>(value).get::<meter>()
}

/// Specific energy in J/kg from Wh/kg.
pub fn joules_per_kilogram(watt_hours_per_kilogram: f64) -> f64 {
    Energy::new::<watt_hour>(watt_hours_per_kilogram).get::<joule>()
}

/// Mechanical horsepower per watt.
pub fn horsepower_per_watt() -> f64 {
    Power::new::<watt>(1.0).get::<horsepower>()
}

pub fn newtons_per_pound_force() -> f64 {
    Force::new::<pound_force>(1.0).get::<newton>()
}

/// Pounds of mass per newton of weight, the scale factor of the empty-weight
/// regressions (which are fitted in pounds).
pub fn pounds_per_newton() -> f64 {
    Mass::new::<kilogram>(1.0).get::<pound>() / GRAVITY
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pressure_round_trip() {
        assert_relative_eq!(psf_from_pascals(pascals_from_psf(52.0)), 52.0, max_relative = 1e-14);
        assert_eq!(pascals_from_psf(0.0), 0.0);
    }

    #[test]
    fn test_known_factors() {
        assert_relative_eq!(pascals_from_psf(1.0), 47.880258980, epsilon = 1e-8);
        assert_relative_eq!(meters_from_feet(1.0), 0.3048, epsilon = 1e-15);
        assert_relative_eq!(joules_per_kilogram(150.0), 540_000.0, max_relative = 1e-14);
        assert_relative_eq!(1.0 / horsepower_per_watt(), 745.69987158227, epsilon = 1e-8);
        assert_relative_eq!(newtons_per_pound_force(), 4.4482216152605, epsilon = 1e-12);
    }

    #[test]
    fn test_pounds_per_newton() {
        assert_relative_eq!(pounds_per_newton(), 2.2046226218 / 9.81, epsilon = 1e-10);
    }
}
