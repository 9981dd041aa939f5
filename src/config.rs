//! Typed aircraft configuration.
//!
//! An [`AircraftConfig`] is built once, validated as a whole, and then only
//! read while the model tree is assembled. Options quoted in imperial or
//! non-SI units are stored as given and converted by accessor methods.
//!
//! # Examples
//!
//! ```
//! use aerosize::{AircraftConfig, AircraftType, EnergySource};
//!
//! let config = AircraftConfig::new(AircraftType::Transport)
//!     .with_energy_source(EnergySource::FuelBurning)
//!     .with_tsfc(1.0e-4);
//! assert!(config.validate().is_ok());
//!
//! let parsed = AircraftConfig::from_json(r#"{ "aircraft_type": "ga_single", "variable_sweep": true }"#).unwrap();
//! assert_eq!(parsed.empty_weight_parameters().k_vs, 1.04);
//!
//! assert!(AircraftConfig::from_json(r#"{ "aircraft_type": "airship" }"#).is_err());
//! assert!(AircraftConfig::from_json(r#"{ "aircraft_type": "transport", "tscf": 1e-4 }"#).is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::solvers::RootFinder;
use crate::units::{self, pounds_per_newton};

/// Errors in configuration values and unit handling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Malformed document, unknown key or wrongly typed value
    #[error("invalid configuration: {0}")]
    Parse(String),

    /// String value outside its allow-list
    #[error("unknown {kind} `{value}`; expected one of: {allowed}")]
    UnknownValue { kind: &'static str, value: String, allowed: String },

    /// Numeric option outside its valid range
    #[error("option `{option}` = {value} is invalid: {reason}")]
    OutOfRange { option: &'static str, value: f64, reason: &'static str },

    /// Gross-weight root lies above the configured ceiling
    #[error("gross weight exceeds the ceiling of {weight_max} N (residual at ceiling {residual:.6e} N)")]
    WeightCeilingExceeded { weight_max: f64, residual: f64 },

    /// Blend interval or end conditions give a singular fit
    #[error("blend on [{x1}, {x2}] cannot be fitted")]
    DegenerateBlend { x1: f64, x2: f64 },
}

macro_rules! option_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every allowed value.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Name used in configuration documents.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ConfigError::UnknownValue {
                        kind: $kind,
                        value: s.to_string(),
                        allowed: [$($text),+].join(", "),
                    }),
                }
            }
        }
    };
}

/// Aircraft class selecting the empty-weight regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AircraftType {
    GaSingle,
    GaTwin,
    Transport,
}

option_enum!(AircraftType, "aircraft type", {
    GaSingle => "ga_single",
    GaTwin => "ga_twin",
    Transport => "transport",
});

impl AircraftType {
    /// Empty-weight fraction regression `(a, c)` in `a W^c` with `W` in pounds.
    pub fn empty_weight_regression(&self) -> (f64, f64) {
        match self {
            AircraftType::GaSingle => (2.36, -0.18),
            AircraftType::GaTwin => (1.51, -0.10),
            AircraftType::Transport => (1.02, -0.06),
        }
    }

    /// Approach distance over the obstacle, ft.
    pub fn approach_distance_ft(&self) -> f64 {
        match self {
            AircraftType::Transport => 1000.0,
            AircraftType::GaSingle | AircraftType::GaTwin => 600.0,
        }
    }
}

/// What the propulsion system consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergySource {
    Electric,
    FuelBurning,
}

option_enum!(EnergySource, "energy source", {
    Electric => "electric",
    FuelBurning => "fuel_burning",
});

/// How thrust is produced; selects the takeoff wing-loading relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrustSource {
    Propeller,
    Jet,
}

option_enum!(ThrustSource, "thrust source", {
    Propeller => "propeller",
    Jet => "jet",
});

/// Cruise regime; selects the roughness cutoff Reynolds number regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightRegime {
    Subsonic,
    Transonic,
    Supersonic,
}

option_enum!(FlightRegime, "flight regime", {
    Subsonic => "subsonic",
    Transonic => "transonic",
    Supersonic => "supersonic",
});

/// Root finder used by the gross-weight component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrossWeightSolver {
    Bisection,
    Newton,
}

option_enum!(GrossWeightSolver, "gross weight solver", {
    Bisection => "bisection",
    Newton => "newton",
});

/// Empty-weight fraction parameters `E/W = a λ^c W^c k_vs`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmptyWeightParameters {
    pub a: f64,
    pub c: f64,
    /// Variable-sweep penalty factor
    pub k_vs: f64,
    /// Pounds per newton, converts `W` to the units of the regression
    pub lambda: f64,
}

/// Aircraft options for a sizing model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AircraftConfig {
    pub aircraft_type: AircraftType,
    #[serde(default)]
    pub variable_sweep: bool,
    /// Overrides the type's `(a, c)` regression.
    #[serde(default)]
    pub empty_weight_regression: Option<(f64, f64)>,
    #[serde(default = "default_energy_source")]
    pub energy_source_type: EnergySource,
    #[serde(default = "default_thrust_source")]
    pub thrust_source_type: ThrustSource,
    #[serde(default = "default_regime")]
    pub regime: FlightRegime,

    // Propulsion
    #[serde(default = "default_battery_energy_density")]
    pub battery_energy_density_wh_kg: f64,
    #[serde(default = "default_propulsive_efficiency")]
    pub propulsive_efficiency: f64,
    /// Thrust-specific fuel consumption, 1/s
    #[serde(default = "default_tsfc")]
    pub tsfc: f64,

    // Constraint analysis
    #[serde(default = "default_cl_max")]
    pub cl_max: f64,
    #[serde(default = "default_cl_max")]
    pub cl_takeoff: f64,
    #[serde(default = "default_climb_gradient")]
    pub climb_gradient: f64,
    #[serde(default = "default_turn_load_factor")]
    pub turn_load_factor: f64,
    /// Takeoff parameter, lbf/ft^2
    #[serde(default = "default_takeoff_parameter")]
    pub takeoff_parameter: f64,
    #[serde(default = "default_takeoff_density")]
    pub takeoff_density: f64,
    #[serde(default = "default_stall_speed")]
    pub stall_speed: f64,
    #[serde(default = "default_climb_speed")]
    pub climb_speed: f64,
    #[serde(default = "default_turn_speed")]
    pub turn_speed: f64,
    #[serde(default = "default_landing_distance_ft")]
    pub landing_distance_ft: f64,
    #[serde(default = "default_ref_wing_loading_lbf_ft2")]
    pub ref_wing_loading_lbf_ft2: f64,
    #[serde(default = "default_ref_thrust_to_weight")]
    pub ref_thrust_to_weight: f64,
    /// Initial wing-loading design value, N/m^2
    #[serde(default = "default_wing_loading")]
    pub wing_loading: f64,
    #[serde(default = "default_thrust_to_weight")]
    pub thrust_to_weight: f64,

    // Aerodynamic placeholders for the maneuver constraints
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: f64,
    #[serde(default = "default_oswald_efficiency")]
    pub oswald_efficiency: f64,
    #[serde(default = "default_cd0")]
    pub cd0: f64,

    // Gross-weight solve
    #[serde(default = "default_weight_max")]
    pub weight_max: f64,
    #[serde(default = "default_bisection_iterations")]
    pub bisection_iterations: usize,
    /// Largest accepted |R(W)| at the converged gross weight, N
    #[serde(default = "default_residual_tolerance")]
    pub residual_tolerance: f64,
    #[serde(default = "default_gross_weight_solver")]
    pub gross_weight_solver: GrossWeightSolver,
}

fn default_energy_source() -> EnergySource {
    EnergySource::Electric
}
fn default_thrust_source() -> ThrustSource {
    ThrustSource::Jet
}
fn default_regime() -> FlightRegime {
    FlightRegime::Subsonic
}
fn default_battery_energy_density() -> f64 {
    150.0
}
fn default_propulsive_efficiency() -> f64 {
    0.85
}
fn default_tsfc() -> f64 {
    1.0e-4
}
fn default_cl_max() -> f64 {
    1.5
}
fn default_climb_gradient() -> f64 {
    0.05
}
fn default_turn_load_factor() -> f64 {
    2.5
}
fn default_takeoff_parameter() -> f64 {
    400.0
}
fn default_takeoff_density() -> f64 {
    units::SEA_LEVEL_DENSITY
}
fn default_stall_speed() -> f64 {
    35.0
}
fn default_climb_speed() -> f64 {
    70.0
}
fn default_turn_speed() -> f64 {
    90.0
}
fn default_landing_distance_ft() -> f64 {
    6000.0
}
fn default_ref_wing_loading_lbf_ft2() -> f64 {
    100.0
}
fn default_ref_thrust_to_weight() -> f64 {
    0.5
}
fn default_wing_loading() -> f64 {
    3000.0
}
fn default_thrust_to_weight() -> f64 {
    0.3
}
fn default_aspect_ratio() -> f64 {
    8.0
}
fn default_oswald_efficiency() -> f64 {
    0.8
}
fn default_cd0() -> f64 {
    0.02
}
fn default_weight_max() -> f64 {
    1.0e8
}
fn default_bisection_iterations() -> usize {
    100
}
fn default_residual_tolerance() -> f64 {
    1.0e-3
}
fn default_gross_weight_solver() -> GrossWeightSolver {
    GrossWeightSolver::Bisection
}

impl AircraftConfig {
    /// Default options for an aircraft type.
    pub fn new(aircraft_type: AircraftType) -> Self {
        AircraftConfig {
            aircraft_type,
            variable_sweep: false,
            empty_weight_regression: None,
            energy_source_type: default_energy_source(),
            thrust_source_type: default_thrust_source(),
            regime: default_regime(),
            battery_energy_density_wh_kg: default_battery_energy_density(),
            propulsive_efficiency: default_propulsive_efficiency(),
            tsfc: default_tsfc(),
            cl_max: default_cl_max(),
            cl_takeoff: default_cl_max(),
            climb_gradient: default_climb_gradient(),
            turn_load_factor: default_turn_load_factor(),
            takeoff_parameter: default_takeoff_parameter(),
            takeoff_density: default_takeoff_density(),
            stall_speed: default_stall_speed(),
            climb_speed: default_climb_speed(),
            turn_speed: default_turn_speed(),
            landing_distance_ft: default_landing_distance_ft(),
            ref_wing_loading_lbf_ft2: default_ref_wing_loading_lbf_ft2(),
            ref_thrust_to_weight: default_ref_thrust_to_weight(),
            wing_loading: default_wing_loading(),
            thrust_to_weight: default_thrust_to_weight(),
            aspect_ratio: default_aspect_ratio(),
            oswald_efficiency: default_oswald_efficiency(),
            cd0: default_cd0(),
            weight_max: default_weight_max(),
            bisection_iterations: default_bisection_iterations(),
            residual_tolerance: default_residual_tolerance(),
            gross_weight_solver: default_gross_weight_solver(),
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: AircraftConfig = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_variable_sweep(mut self, variable_sweep: bool) -> Self {
        self.variable_sweep = variable_sweep;
        self
    }

    pub fn with_empty_weight_regression(mut self, a: f64, c: f64) -> Self {
        self.empty_weight_regression = Some((a, c));
        self
    }

    pub fn with_energy_source(mut self, source: EnergySource) -> Self {
        self.energy_source_type = source;
        self
    }

    pub fn with_thrust_source(mut self, source: ThrustSource) -> Self {
        self.thrust_source_type = source;
        self
    }

    pub fn with_regime(mut self, regime: FlightRegime) -> Self {
        self.regime = regime;
        self
    }

    pub fn with_tsfc(mut self, tsfc: f64) -> Self {
        self.tsfc = tsfc;
        self
    }

    pub fn with_propulsive_efficiency(mut self, efficiency: f64) -> Self {
        self.propulsive_efficiency = efficiency;
        self
    }

    pub fn with_battery_energy_density_wh_kg(mut self, density: f64) -> Self {
        self.battery_energy_density_wh_kg = density;
        self
    }

    pub fn with_weight_max(mut self, weight_max: f64) -> Self {
        self.weight_max = weight_max;
        self
    }

    pub fn with_bisection_iterations(mut self, iterations: usize) -> Self {
        self.bisection_iterations = iterations;
        self
    }

    pub fn with_residual_tolerance(mut self, tolerance: f64) -> Self {
        self.residual_tolerance = tolerance;
        self
    }

    pub fn with_gross_weight_solver(mut self, solver: GrossWeightSolver) -> Self {
        self.gross_weight_solver = solver;
        self
    }

    /// Checks every option. Called by every model builder before assembly.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("battery_energy_density_wh_kg", self.battery_energy_density_wh_kg),
            ("tsfc", self.tsfc),
            ("cl_max", self.cl_max),
            ("cl_takeoff", self.cl_takeoff),
            ("turn_load_factor", self.turn_load_factor),
            ("takeoff_parameter", self.takeoff_parameter),
            ("takeoff_density", self.takeoff_density),
            ("stall_speed", self.stall_speed),
            ("climb_speed", self.climb_speed),
            ("turn_speed", self.turn_speed),
            ("landing_distance_ft", self.landing_distance_ft),
            ("ref_wing_loading_lbf_ft2", self.ref_wing_loading_lbf_ft2),
            ("ref_thrust_to_weight", self.ref_thrust_to_weight),
            ("wing_loading", self.wing_loading),
            ("thrust_to_weight", self.thrust_to_weight),
            ("aspect_ratio", self.aspect_ratio),
            ("oswald_efficiency", self.oswald_efficiency),
            ("cd0", self.cd0),
            ("weight_max", self.weight_max),
            ("residual_tolerance", self.residual_tolerance),
        ];
        for (option, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::OutOfRange { option, value, reason: "must be positive and finite" });
            }
        }
        if !(self.climb_gradient.is_finite() && self.climb_gradient >= 0.0) {
            return Err(ConfigError::OutOfRange {
                option: "climb_gradient",
                value: self.climb_gradient,
                reason: "must be non-negative",
            });
        }
        if self.propulsive_efficiency > 1.0 || !(self.propulsive_efficiency > 0.0) {
            return Err(ConfigError::OutOfRange {
                option: "propulsive_efficiency",
                value: self.propulsive_efficiency,
                reason: "must lie in (0, 1]",
            });
        }
        if self.bisection_iterations == 0 {
            return Err(ConfigError::OutOfRange {
                option: "bisection_iterations",
                value: 0.0,
                reason: "at least one iteration is required",
            });
        }
        if self.landing_distance_ft <= self.aircraft_type.approach_distance_ft() {
            return Err(ConfigError::OutOfRange {
                option: "landing_distance_ft",
                value: self.landing_distance_ft,
                reason: "must exceed the approach distance",
            });
        }

        let (a, c) = self.regression();
        if !(a.is_finite() && a > 0.0) {
            return Err(ConfigError::OutOfRange { option: "empty_weight_regression.a", value: a, reason: "must be positive" });
        }
        // R(W) is strictly concave with R(0) > 0 for -1 < c < 0, so the positive root is unique.
        if !(c > -1.0 && c < 0.0) {
            return Err(ConfigError::OutOfRange {
                option: "empty_weight_regression.c",
                value: c,
                reason: "exponent must lie in (-1, 0)",
            });
        }

        let resolution = self.weight_max / 2f64.powi(self.bisection_iterations.min(1074) as i32);
        if self.gross_weight_solver == GrossWeightSolver::Bisection && resolution > self.residual_tolerance {
            log::warn!(
                "bisection resolution {:.3e} N ({} iterations over {:.3e} N) is coarser than the residual tolerance {:.3e} N",
                resolution,
                self.bisection_iterations,
                self.weight_max,
                self.residual_tolerance
            );
        }
        Ok(())
    }

    fn regression(&self) -> (f64, f64) {
        self.empty_weight_regression.unwrap_or_else(|| self.aircraft_type.empty_weight_regression())
    }

    pub fn empty_weight_parameters(&self) -> EmptyWeightParameters {
        let (a, c) = self.regression();
        let k_vs = if self.variable_sweep { 1.04 } else { 1.0 };
        EmptyWeightParameters { a, c, k_vs, lambda: pounds_per_newton() }
    }

    /// Battery specific energy, J/kg.
    pub fn battery_energy_density(&self) -> f64 {
        units::joules_per_kilogram(self.battery_energy_density_wh_kg)
    }

    /// Approach distance, m.
    pub fn approach_distance(&self) -> f64 {
        units::meters_from_feet(self.aircraft_type.approach_distance_ft())
    }

    /// Landing field length, m.
    pub fn landing_distance(&self) -> f64 {
        units::meters_from_feet(self.landing_distance_ft)
    }

    /// Reference wing loading, N/m^2.
    pub fn ref_wing_loading(&self) -> f64 {
        units::pascals_from_psf(self.ref_wing_loading_lbf_ft2)
    }

    pub fn root_finder(&self) -> RootFinder {
        match self.gross_weight_solver {
            GrossWeightSolver::Bisection => RootFinder::Bisection { iterations: self.bisection_iterations },
            GrossWeightSolver::Newton => RootFinder::Newton { max_iterations: self.bisection_iterations },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_valid() {
        for &aircraft_type in AircraftType::ALL {
            assert!(AircraftConfig::new(aircraft_type).validate().is_ok());
        }
    }

    #[test]
    fn test_regression_table_and_sweep() {
        let config = AircraftConfig::new(AircraftType::GaTwin);
        let params = config.empty_weight_parameters();
        assert_eq!((params.a, params.c, params.k_vs), (1.51, -0.10, 1.0));

        let swept = AircraftConfig::new(AircraftType::Transport).with_variable_sweep(true);
        let params = swept.empty_weight_parameters();
        assert_eq!((params.a, params.c, params.k_vs), (1.02, -0.06, 1.04));
        assert_relative_eq!(params.lambda, 2.2046226218 / 9.81, epsilon = 1e-9);
    }

    #[test]
    fn test_unit_conversions() {
        let config = AircraftConfig::new(AircraftType::Transport);
        assert_relative_eq!(config.battery_energy_density(), 540_000.0, max_relative = 1e-14);
        assert_relative_eq!(config.approach_distance(), 304.8, epsilon = 1e-9);
        assert_relative_eq!(config.landing_distance(), 1828.8, epsilon = 1e-9);
        assert_relative_eq!(config.ref_wing_loading(), 4788.0258980, epsilon = 1e-6);

        let ga = AircraftConfig::new(AircraftType::GaSingle);
        assert_relative_eq!(ga.approach_distance(), 182.88, epsilon = 1e-9);
    }

    #[test]
    fn test_out_of_range_values() {
        let config = AircraftConfig::new(AircraftType::Transport).with_tsfc(-1.0);
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { option: "tsfc", .. })));

        let config = AircraftConfig::new(AircraftType::Transport).with_propulsive_efficiency(1.2);
        assert!(config.validate().is_err());

        let config = AircraftConfig::new(AircraftType::Transport).with_bisection_iterations(0);
        assert!(config.validate().is_err());

        let config = AircraftConfig::new(AircraftType::Transport).with_empty_weight_regression(1.0, 0.2);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { option: "empty_weight_regression.c", .. })
        ));
    }

    #[test]
    fn test_json_round_trip_and_rejections() {
        let config = AircraftConfig::from_json(
            r#"{
                "aircraft_type": "transport",
                "energy_source_type": "fuel_burning",
                "thrust_source_type": "propeller",
                "gross_weight_solver": "newton",
                "tsfc": 1.5e-4
            }"#,
        )
        .unwrap();
        assert_eq!(config.energy_source_type, EnergySource::FuelBurning);
        assert_eq!(config.thrust_source_type, ThrustSource::Propeller);
        assert_eq!(config.root_finder(), RootFinder::Newton { max_iterations: 100 });
        assert_eq!(config.tsfc, 1.5e-4);

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(AircraftConfig::from_json(&json).unwrap(), config);

        assert!(matches!(AircraftConfig::from_json(r#"{ "aircraft_type": "blimp" }"#), Err(ConfigError::Parse(_))));
        assert!(matches!(
            AircraftConfig::from_json(r#"{ "aircraft_type": "transport", "wingspan": 30.0 }"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            AircraftConfig::from_json(r#"{ "aircraft_type": "transport", "tsfc": 0.0 }"#),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_string_enums() {
        assert_eq!("ga_twin".parse::<AircraftType>().unwrap(), AircraftType::GaTwin);
        assert_eq!(EnergySource::FuelBurning.to_string(), "fuel_burning");
        match "rocket".parse::<ThrustSource>() {
            Err(ConfigError::UnknownValue { allowed, .. }) => assert_eq!(allowed, "propeller, jet"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(FlightRegime::ALL.len(), 3);
    }
}
