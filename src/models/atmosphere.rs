//! Standard atmosphere with a smoothed tropopause.
//!
//! Temperature and pressure follow the troposphere relations below 11 km and
//! the isothermal stratosphere above, joined by cubic blends over
//! `11 km ± 500 m` so that both are C¹ in altitude. Density, sonic speed and
//! Sutherland viscosity are derived from temperature and pressure.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use aerosize::models::atmosphere::{atmosphere_group, AtmosphereModel};
//! use aerosize::models::IndepVarComp;
//! use aerosize::{Group, Model, Promotes, Shape};
//!
//! let shape = Shape::new(&[2]);
//! let mut inputs = IndepVarComp::new(&shape);
//! inputs.add_output("altitude", 0.0).add_output("speed", 100.0);
//!
//! let mut root = Group::new();
//! root.add_independent("inputs_comp", inputs, Promotes::All)
//!     .add_group("atmosphere", atmosphere_group(&shape, Arc::new(AtmosphereModel::new().unwrap())), Promotes::All);
//!
//! let mut model = Model::setup(root, &shape).unwrap();
//! model.run_model().unwrap();
//! assert!((model.get("density").unwrap()[[0]] - 1.225).abs() < 1e-3);
//! ```

use std::sync::Arc;

use ndarray::Zip;

use crate::blend::{BlendedCurve, Regime};
use crate::component::{ensure_positive, ExplicitComponent, Interface, Partials, Vector};
use crate::config::ConfigError;
use crate::group::{Group, Promotes};
use crate::models::{LinearCombinationComp, PowerCombinationComp};
use crate::units::GRAVITY;
use crate::{ModelResult, Shape};

/// Tropopause altitude, m.
pub const TROPOPAUSE_ALTITUDE: f64 = 11_000.0;
/// Half-width of the tropopause blend, m.
pub const TROPOPAUSE_HALF_WIDTH: f64 = 500.0;
/// Sea-level temperature, K.
pub const SEA_LEVEL_TEMPERATURE: f64 = 288.16;
/// Stratosphere temperature, K.
pub const STRATOSPHERE_TEMPERATURE: f64 = 216.65;
/// Troposphere lapse rate, K/m.
pub const LAPSE_RATE: f64 = 6.5e-3;
/// Specific gas constant of air, J/(kg K).
pub const GAS_CONSTANT: f64 = 287.058;
/// Sea-level pressure, Pa.
pub const SEA_LEVEL_PRESSURE: f64 = 101_325.0;
/// Pressure at the tropopause, Pa.
pub const TROPOPAUSE_PRESSURE: f64 = 22_632.0;
/// Ratio of specific heats of air.
pub const HEAT_CAPACITY_RATIO: f64 = 1.4;

// Sutherland's law
const SUTHERLAND_REFERENCE_VISCOSITY: f64 = 1.716e-5;
const SUTHERLAND_REFERENCE_TEMPERATURE: f64 = 273.15;
const SUTHERLAND_TEMPERATURE: f64 = 110.4;

const METERS_PER_KM: f64 = 1.0e3;

#[derive(Debug, Clone, Copy)]
struct TroposphereTemperature;

impl Regime for TroposphereTemperature {
    fn value(&self, h: f64) -> f64 {
        SEA_LEVEL_TEMPERATURE - LAPSE_RATE * h
    }

    fn slope(&self, _h: f64) -> f64 {
        -LAPSE_RATE
    }
}

#[derive(Debug, Clone, Copy)]
struct StratosphereTemperature;

impl Regime for StratosphereTemperature {
    fn value(&self, _h: f64) -> f64 {
        STRATOSPHERE_TEMPERATURE
    }

    fn slope(&self, _h: f64) -> f64 {
        0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct TropospherePressure;

impl TropospherePressure {
    const EXPONENT: f64 = GRAVITY / (LAPSE_RATE * GAS_CONSTANT);

    fn base(h: f64) -> f64 {
        1.0 - LAPSE_RATE * h / SEA_LEVEL_TEMPERATURE
    }
}

impl Regime for TropospherePressure {
    fn value(&self, h: f64) -> f64 {
        SEA_LEVEL_PRESSURE * Self::base(h).powf(Self::EXPONENT)
    }

    fn slope(&self, h: f64) -> f64 {
        SEA_LEVEL_PRESSURE * Self::EXPONENT * Self::base(h).powf(Self::EXPONENT - 1.0) * (-LAPSE_RATE / SEA_LEVEL_TEMPERATURE)
    }
}

#[derive(Debug, Clone, Copy)]
struct StratospherePressure;

impl StratospherePressure {
    const DECAY: f64 = GRAVITY / (GAS_CONSTANT * STRATOSPHERE_TEMPERATURE);
}

impl Regime for StratospherePressure {
    fn value(&self, h: f64) -> f64 {
        TROPOPAUSE_PRESSURE * (-Self::DECAY * (h - TROPOPAUSE_ALTITUDE)).exp()
    }

    fn slope(&self, h: f64) -> f64 {
        -Self::DECAY * self.value(h)
    }
}

/// Blended temperature and pressure profiles, fitted once.
#[derive(Debug, Clone)]
pub struct AtmosphereModel {
    temperature: BlendedCurve<TroposphereTemperature, StratosphereTemperature>,
    pressure: BlendedCurve<TropospherePressure, StratospherePressure>,
}

impl AtmosphereModel {
    pub fn new() -> Result<Self, ConfigError> {
        let x1 = TROPOPAUSE_ALTITUDE - TROPOPAUSE_HALF_WIDTH;
        let x2 = TROPOPAUSE_ALTITUDE + TROPOPAUSE_HALF_WIDTH;
        Ok(AtmosphereModel {
            temperature: BlendedCurve::new(TroposphereTemperature, StratosphereTemperature, x1, x2)?,
            pressure: BlendedCurve::new(TropospherePressure, StratospherePressure, x1, x2)?,
        })
    }

    /// Temperature (K) at altitude `h` (m).
    pub fn temperature(&self, h: f64) -> f64 {
        self.temperature.value(h)
    }

    /// dT/dh, K/m.
    pub fn temperature_slope(&self, h: f64) -> f64 {
        self.temperature.slope(h)
    }

    /// Pressure (Pa) at altitude `h` (m).
    pub fn pressure(&self, h: f64) -> f64 {
        self.pressure.value(h)
    }

    /// dp/dh, Pa/m.
    pub fn pressure_slope(&self, h: f64) -> f64 {
        self.pressure.slope(h)
    }
}

/// `temperature` (K) from `altitude_km`.
#[derive(Debug, Clone)]
pub struct TemperatureComp {
    shape: Shape,
    model: Arc<AtmosphereModel>,
}

impl TemperatureComp {
    pub fn new(shape: &Shape, model: Arc<AtmosphereModel>) -> Self {
        TemperatureComp { shape: shape.clone(), model }
    }
}

impl ExplicitComponent for TemperatureComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("altitude_km")
            .add_output_with_value("temperature", SEA_LEVEL_TEMPERATURE)
            .declare_partials("temperature", "altitude_km");
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let h = inputs.get("altitude_km")? * METERS_PER_KM;
        outputs.set("temperature", self.model.temperature.values(&h))
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let h = inputs.get("altitude_km")? * METERS_PER_KM;
        partials.set("temperature", "altitude_km", self.model.temperature.slopes(&h) * METERS_PER_KM)
    }
}

/// `pressure` (Pa) from `altitude_km`.
#[derive(Debug, Clone)]
pub struct PressureComp {
    shape: Shape,
    model: Arc<AtmosphereModel>,
}

impl PressureComp {
    pub fn new(shape: &Shape, model: Arc<AtmosphereModel>) -> Self {
        PressureComp { shape: shape.clone(), model }
    }
}

impl ExplicitComponent for PressureComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("altitude_km")
            .add_output_with_value("pressure", SEA_LEVEL_PRESSURE)
            .declare_partials("pressure", "altitude_km");
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let h = inputs.get("altitude_km")? * METERS_PER_KM;
        outputs.set("pressure", self.model.pressure.values(&h))
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let h = inputs.get("altitude_km")? * METERS_PER_KM;
        partials.set("pressure", "altitude_km", self.model.pressure.slopes(&h) * METERS_PER_KM)
    }
}

/// Ideal-gas `density = pressure / (R temperature)`.
#[derive(Debug, Clone)]
pub struct DensityComp {
    shape: Shape,
}

impl DensityComp {
    pub fn new(shape: &Shape) -> Self {
        DensityComp { shape: shape.clone() }
    }
}

impl ExplicitComponent for DensityComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("pressure")
            .add_input("temperature")
            .add_output("density")
            .declare_partials("density", "pressure")
            .declare_partials("density", "temperature");
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let p = inputs.get("pressure")?;
        let t = inputs.get("temperature")?;
        ensure_positive("temperature", t)?;

        let mut density = self.shape.zeros();
        Zip::from(&mut density).and(p).and(t).for_each(|rho, &p, &t| *rho = p / (GAS_CONSTANT * t));
        outputs.set("density", density)
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let p = inputs.get("pressure")?;
        let t = inputs.get("temperature")?;

        let d_dp = t.mapv(|t| 1.0 / (GAS_CONSTANT * t));
        let mut d_dt = self.shape.zeros();
        Zip::from(&mut d_dt).and(p).and(t).for_each(|d, &p, &t| *d = -p / (GAS_CONSTANT * t * t));

        partials.set("density", "pressure", d_dp)?;
        partials.set("density", "temperature", d_dt)
    }
}

/// `sonic_speed = sqrt(γ R temperature)`.
#[derive(Debug, Clone)]
pub struct SonicSpeedComp {
    shape: Shape,
}

impl SonicSpeedComp {
    pub fn new(shape: &Shape) -> Self {
        SonicSpeedComp { shape: shape.clone() }
    }
}

impl ExplicitComponent for SonicSpeedComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("temperature")
            .add_output_with_value("sonic_speed", 340.0)
            .declare_partials("sonic_speed", "temperature");
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let t = inputs.get("temperature")?;
        ensure_positive("temperature", t)?;
        outputs.set("sonic_speed", t.mapv(|t| (HEAT_CAPACITY_RATIO * GAS_CONSTANT * t).sqrt()))
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let t = inputs.get("temperature")?;
        let d = t.mapv(|t| 0.5 * (HEAT_CAPACITY_RATIO * GAS_CONSTANT / t).sqrt());
        partials.set("sonic_speed", "temperature", d)
    }
}

/// Sutherland's law `dynamic_viscosity = μ2 (T/T2)^1.5 (T2 + Ts) / (T + Ts)`.
#[derive(Debug, Clone)]
pub struct ViscosityComp {
    shape: Shape,
}

impl ViscosityComp {
    pub fn new(shape: &Shape) -> Self {
        ViscosityComp { shape: shape.clone() }
    }

    fn viscosity(t: f64) -> f64 {
        SUTHERLAND_REFERENCE_VISCOSITY
            * (t / SUTHERLAND_REFERENCE_TEMPERATURE).powf(1.5)
            * (SUTHERLAND_REFERENCE_TEMPERATURE + SUTHERLAND_TEMPERATURE)
            / (t + SUTHERLAND_TEMPERATURE)
    }

    fn viscosity_slope(t: f64) -> f64 {
        let scale = SUTHERLAND_REFERENCE_VISCOSITY * (SUTHERLAND_REFERENCE_TEMPERATURE + SUTHERLAND_TEMPERATURE)
            / SUTHERLAND_REFERENCE_TEMPERATURE.powf(1.5);
        let denom = t + SUTHERLAND_TEMPERATURE;
        scale * (1.5 * t.sqrt() / denom - t.powf(1.5) / (denom * denom))
    }
}

impl ExplicitComponent for ViscosityComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("temperature")
            .add_output_with_value("dynamic_viscosity", SUTHERLAND_REFERENCE_VISCOSITY)
            .declare_partials("dynamic_viscosity", "temperature");
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let t = inputs.get("temperature")?;
        ensure_positive("temperature", t)?;
        outputs.set("dynamic_viscosity", t.mapv(Self::viscosity))
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let t = inputs.get("temperature")?;
        partials.set("dynamic_viscosity", "temperature", t.mapv(Self::viscosity_slope))
    }
}

/// Atmosphere and flight condition from `altitude` (m) and `speed` (m/s).
///
/// Outputs `altitude_km`, `temperature`, `pressure`, `density`,
/// `sonic_speed`, `dynamic_viscosity`, `mach_number` and `dynamic_pressure`.
pub fn atmosphere_group(shape: &Shape, model: Arc<AtmosphereModel>) -> Group {
    let mut group = Group::new();
    group
        .add_component(
            "altitude_km_comp",
            LinearCombinationComp::new(shape, "altitude_km").with_term("altitude", 1.0 / METERS_PER_KM),
            Promotes::All,
        )
        .add_component("temperature_comp", TemperatureComp::new(shape, Arc::clone(&model)), Promotes::All)
        .add_component("pressure_comp", PressureComp::new(shape, model), Promotes::All)
        .add_component("density_comp", DensityComp::new(shape), Promotes::All)
        .add_component("sonic_speed_comp", SonicSpeedComp::new(shape), Promotes::All)
        .add_component("viscosity_comp", ViscosityComp::new(shape), Promotes::All)
        .add_component(
            "mach_number_comp",
            PowerCombinationComp::new(shape, "mach_number").with_power("speed", 1.0).with_power("sonic_speed", -1.0),
            Promotes::All,
        )
        .add_component(
            "dynamic_pressure_comp",
            PowerCombinationComp::new(shape, "dynamic_pressure")
                .with_coeff(0.5)
                .with_power("density", 1.0)
                .with_power("speed", 2.0),
            Promotes::All,
        );
    group
}
