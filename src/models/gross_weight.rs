//! Gross-weight sizing.
//!
//! The empty-weight fraction regression `E/W = a (λW)^c k_vs` makes the
//! weight balance
//!
//! ```text
//! R(W) = W_fixed + a λ^c k_vs W^(c+1) + (f_prop - 1) W = 0
//! ```
//!
//! implicit in the gross weight `W`. [`GrossWeightComp`] solves it at every
//! sweep point with a bracketed root finder on `[0, W_max]` and reports
//! partials of `R` so that totals follow from the implicit-function theorem.
//!
//! For `-1 < c < 0` the residual is strictly concave with `R(0) = W_fixed`,
//! so a positive fixed weight and `R(W_max) < 0` guarantee exactly one root
//! in the bracket. Both conditions are checked before solving.

use log::debug;
use num_dual::*;

use crate::component::{ensure_nonzero, ensure_positive, ExplicitComponent, ImplicitComponent, Interface, Partials, Vector};
use crate::config::{AircraftConfig, ConfigError, EmptyWeightParameters, EnergySource};
use crate::group::{Group, Promotes};
use crate::models::{IndepVarComp, LinearCombinationComp, PowerCombinationComp};
use crate::solvers::{RootFinder, RootSolution, ScalarResidual, SolverError};
use crate::units::GRAVITY;
use crate::{Array, ModelError, ModelResult, Shape};

/// Weight balance at one sweep point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrossWeightResidual {
    fixed_weight: f64,
    propellant_weight_fraction: f64,
    /// `a λ^c k_vs`
    scale: f64,
    c: f64,
}

impl GrossWeightResidual {
    pub fn new(params: &EmptyWeightParameters, fixed_weight: f64, propellant_weight_fraction: f64) -> Self {
        GrossWeightResidual {
            fixed_weight,
            propellant_weight_fraction,
            scale: empty_weight_scale(params),
            c: params.c,
        }
    }

    /// `dR/dW`.
    pub fn slope(&self, gross_weight: f64) -> f64 {
        self.scale * (self.c + 1.0) * gross_weight.powf(self.c) + self.propellant_weight_fraction - 1.0
    }
}

impl ScalarResidual for GrossWeightResidual {
    fn eval(&self, w: Dual64) -> Dual64 {
        w.powf(self.c + 1.0) * self.scale + w * (self.propellant_weight_fraction - 1.0) + self.fixed_weight
    }

    // Plain floats keep `R(0) = W_fixed` exact at the bracket end.
    fn value(&self, w: f64) -> f64 {
        self.fixed_weight + self.scale * w.powf(self.c + 1.0) + (self.propellant_weight_fraction - 1.0) * w
    }
}

fn empty_weight_scale(params: &EmptyWeightParameters) -> f64 {
    params.a * params.lambda.powf(params.c) * params.k_vs
}

/// Implicit `gross_weight` from `fixed_weight` and `propellant_weight_fraction`.
///
/// # Examples
///
/// ```
/// use aerosize::config::EmptyWeightParameters;
/// use aerosize::models::GrossWeightComp;
/// use aerosize::units::pounds_per_newton;
/// use aerosize::{ImplicitComponent, Shape, Vector};
///
/// let shape = Shape::scalar();
/// let params = EmptyWeightParameters { a: 2.36, c: -0.18, k_vs: 1.0, lambda: pounds_per_newton() };
/// let comp = GrossWeightComp::new(&shape, params);
///
/// let mut inputs = Vector::new();
/// inputs.insert("fixed_weight", shape.full(5000.0));
/// inputs.insert("propellant_weight_fraction", shape.full(0.25));
/// let mut outputs = Vector::new();
/// outputs.insert("gross_weight", shape.full(1.0));
///
/// comp.solve_nonlinear(&inputs, &mut outputs).unwrap();
/// let mut residuals = outputs.clone();
/// comp.apply_nonlinear(&inputs, &outputs, &mut residuals).unwrap();
/// assert!(residuals["gross_weight"][[0]].abs() < 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct GrossWeightComp {
    shape: Shape,
    params: EmptyWeightParameters,
    weight_max: f64,
    tolerance: f64,
    finder: RootFinder,
}

impl GrossWeightComp {
    pub const DEFAULT_WEIGHT_MAX: f64 = 1.0e8;
    pub const DEFAULT_TOLERANCE: f64 = 1.0e-3;

    pub fn new(shape: &Shape, params: EmptyWeightParameters) -> Self {
        GrossWeightComp {
            shape: shape.clone(),
            params,
            weight_max: Self::DEFAULT_WEIGHT_MAX,
            tolerance: Self::DEFAULT_TOLERANCE,
            finder: RootFinder::default(),
        }
    }

    /// Regression, ceiling, tolerance and root finder from a configuration.
    pub fn from_config(shape: &Shape, config: &AircraftConfig) -> Self {
        GrossWeightComp::new(shape, config.empty_weight_parameters())
            .with_weight_max(config.weight_max)
            .with_tolerance(config.residual_tolerance)
            .with_root_finder(config.root_finder())
    }

    pub fn with_weight_max(mut self, weight_max: f64) -> Self {
        self.weight_max = weight_max;
        self
    }

    /// Largest accepted `|R|` at the returned gross weight, N.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_root_finder(mut self, finder: RootFinder) -> Self {
        self.finder = finder;
        self
    }

    pub fn params(&self) -> &EmptyWeightParameters {
        &self.params
    }

    /// Solves one sweep point.
    pub fn solve_point(&self, fixed_weight: f64, propellant_weight_fraction: f64) -> ModelResult<RootSolution> {
        if !(propellant_weight_fraction < 1.0) {
            return Err(ModelError::Domain {
                variable: "propellant_weight_fraction".to_string(),
                value: propellant_weight_fraction,
                reason: "must be less than 1",
            });
        }
        let residual = GrossWeightResidual::new(&self.params, fixed_weight, propellant_weight_fraction);

        let at_zero = residual.value(0.0);
        let at_ceiling = residual.value(self.weight_max);
        if !(at_zero > 0.0) {
            return Err(SolverError::NoSignChange {
                lower: 0.0,
                upper: self.weight_max,
                lower_residual: at_zero,
                upper_residual: at_ceiling,
            }
            .into());
        }
        if !(at_ceiling < 0.0) {
            return Err(ConfigError::WeightCeilingExceeded { weight_max: self.weight_max, residual: at_ceiling }.into());
        }

        Ok(self.finder.solve(&residual, 0.0, self.weight_max, self.tolerance)?)
    }

    fn residuals(&self, inputs: &Vector, gross_weight: &Array) -> ModelResult<Array> {
        let fixed = inputs.get("fixed_weight")?;
        let fraction = inputs.get("propellant_weight_fraction")?;
        let scale = empty_weight_scale(&self.params);
        let c = self.params.c;

        let mut r = gross_weight.mapv(|w| scale * w.powf(c + 1.0));
        r += fixed;
        ndarray::Zip::from(&mut r).and(fraction).and(gross_weight).for_each(|r, &f, &w| *r += (f - 1.0) * w);
        Ok(r)
    }
}

impl ImplicitComponent for GrossWeightComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("fixed_weight")
            .add_input("propellant_weight_fraction")
            .add_output_with_value("gross_weight", 1.0e4)
            .declare_partials("gross_weight", "fixed_weight")
            .declare_partials("gross_weight", "propellant_weight_fraction")
            .declare_partials("gross_weight", "gross_weight");
        io
    }

    fn apply_nonlinear(&self, inputs: &Vector, outputs: &Vector, residuals: &mut Vector) -> ModelResult<()> {
        let w = outputs.get("gross_weight")?;
        ensure_positive("gross_weight", w)?;
        let r = self.residuals(inputs, w)?;
        residuals.set("gross_weight", r)
    }

    fn solve_nonlinear(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let fixed = inputs.get("fixed_weight")?;
        let fraction = inputs.get("propellant_weight_fraction")?;

        let mut weights = Vec::with_capacity(self.shape.size());
        let mut worst = 0.0f64;
        let mut evals = 0;
        for (&fixed_weight, &propellant_weight_fraction) in fixed.iter().zip(fraction.iter()) {
            let solution = self.solve_point(fixed_weight, propellant_weight_fraction)?;
            worst = worst.max(solution.residual.abs());
            evals += solution.function_evals;
            weights.push(solution.root);
        }
        debug!(
            "gross weight solved at {} points: max |R| = {:.3e} N, {} residual evaluations",
            weights.len(),
            worst,
            evals
        );
        outputs.set("gross_weight", self.shape.array_from_vec(weights)?)
    }

    fn linearize(&self, inputs: &Vector, outputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let w = outputs.get("gross_weight")?;
        ensure_positive("gross_weight", w)?;
        let fraction = inputs.get("propellant_weight_fraction")?;
        let scale = empty_weight_scale(&self.params);
        let c = self.params.c;

        let mut d_dw = w.mapv(|w| scale * (c + 1.0) * w.powf(c));
        d_dw.zip_mut_with(fraction, |d, &f| *d += f - 1.0);

        partials.set_constant("gross_weight", "fixed_weight", 1.0)?;
        partials.set("gross_weight", "propellant_weight_fraction", w.clone())?;
        partials.set("gross_weight", "gross_weight", d_dw)
    }
}

/// `empty_weight_fraction = a (λ gross_weight)^c k_vs`.
#[derive(Debug, Clone)]
pub struct EmptyWeightFractionComp {
    shape: Shape,
    params: EmptyWeightParameters,
}

impl EmptyWeightFractionComp {
    pub fn new(shape: &Shape, params: EmptyWeightParameters) -> Self {
        EmptyWeightFractionComp { shape: shape.clone(), params }
    }
}

impl ExplicitComponent for EmptyWeightFractionComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("gross_weight")
            .add_output_with_value("empty_weight_fraction", 0.5)
            .declare_partials("empty_weight_fraction", "gross_weight");
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let w = inputs.get("gross_weight")?;
        ensure_positive("gross_weight", w)?;
        let scale = empty_weight_scale(&self.params);
        let c = self.params.c;
        outputs.set("empty_weight_fraction", w.mapv(|w| scale * w.powf(c)))
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let w = inputs.get("gross_weight")?;
        let scale = empty_weight_scale(&self.params);
        let c = self.params.c;
        partials.set("empty_weight_fraction", "gross_weight", w.mapv(|w| scale * c * w.powf(c - 1.0)))
    }
}

/// Breguet fuel fraction `1 - exp(-range tsfc / (cruise_speed L/D))`.
///
/// `range` in m, `tsfc` in 1/s.
#[derive(Debug, Clone)]
pub struct BreguetPropellantWeightFractionComp {
    shape: Shape,
}

impl BreguetPropellantWeightFractionComp {
    pub fn new(shape: &Shape) -> Self {
        BreguetPropellantWeightFractionComp { shape: shape.clone() }
    }
}

/// Elementwise `(range, tsfc, cruise_speed, lift_to_drag_ratio)` tuples.
fn breguet_inputs(inputs: &Vector) -> ModelResult<Vec<[f64; 4]>> {
    let range = inputs.get("range")?;
    let tsfc = inputs.get("tsfc")?;
    let speed = inputs.get("cruise_speed")?;
    let ld = inputs.get("lift_to_drag_ratio")?;
    ensure_nonzero("cruise_speed", speed)?;
    ensure_nonzero("lift_to_drag_ratio", ld)?;
    Ok(range
        .iter()
        .zip(tsfc.iter())
        .zip(speed.iter().zip(ld.iter()))
        .map(|((&r, &t), (&v, &l))| [r, t, v, l])
        .collect())
}

impl ExplicitComponent for BreguetPropellantWeightFractionComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("lift_to_drag_ratio")
            .add_input("range")
            .add_input("cruise_speed")
            .add_input("tsfc")
            .add_output_with_value("propellant_weight_fraction", 0.2);
        for wrt in ["lift_to_drag_ratio", "range", "cruise_speed", "tsfc"] {
            io.declare_partials("propellant_weight_fraction", wrt);
        }
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let values = breguet_inputs(inputs)?
            .into_iter()
            .map(|[r, t, v, l]| 1.0 - (-r * t / (v * l)).exp())
            .collect();
        outputs.set("propellant_weight_fraction", self.shape.array_from_vec(values)?)
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let points = breguet_inputs(inputs)?;
        // df/dx = exp(-e) de/dx with e = r t / (v l)
        let column = |d: fn(f64, f64, f64, f64) -> f64| -> Vec<f64> {
            points.iter().map(|&[r, t, v, l]| (-r * t / (v * l)).exp() * d(r, t, v, l)).collect()
        };
        let of = "propellant_weight_fraction";
        partials.set(of, "range", self.shape.array_from_vec(column(|_, t, v, l| t / (v * l)))?)?;
        partials.set(of, "tsfc", self.shape.array_from_vec(column(|r, _, v, l| r / (v * l)))?)?;
        partials.set(of, "cruise_speed", self.shape.array_from_vec(column(|r, t, v, l| -r * t / (v * v * l)))?)?;
        partials.set(of, "lift_to_drag_ratio", self.shape.array_from_vec(column(|r, t, v, l| -r * t / (v * l * l)))?)
    }
}

/// Breguet range `range_km = -(cruise_speed / tsfc) L/D ln(1 - f) / 1000`.
#[derive(Debug, Clone)]
pub struct BreguetRangeComp {
    shape: Shape,
}

impl BreguetRangeComp {
    pub fn new(shape: &Shape) -> Self {
        BreguetRangeComp { shape: shape.clone() }
    }
}

impl ExplicitComponent for BreguetRangeComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("lift_to_drag_ratio")
            .add_input("propellant_weight_fraction")
            .add_input("cruise_speed")
            .add_input("tsfc")
            .add_output_with_value("range_km", 1000.0);
        for wrt in ["lift_to_drag_ratio", "propellant_weight_fraction", "cruise_speed", "tsfc"] {
            io.declare_partials("range_km", wrt);
        }
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let ld = inputs.get("lift_to_drag_ratio")?;
        let f = inputs.get("propellant_weight_fraction")?;
        let v = inputs.get("cruise_speed")?;
        let tsfc = inputs.get("tsfc")?;
        ensure_nonzero("tsfc", tsfc)?;
        let remaining = f.mapv(|f| 1.0 - f);
        ensure_positive("1 - propellant_weight_fraction", &remaining)?;

        let range_km = -(v / tsfc) * ld * remaining.mapv(f64::ln) / 1.0e3;
        outputs.set("range_km", range_km)
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let ld = inputs.get("lift_to_drag_ratio")?;
        let f = inputs.get("propellant_weight_fraction")?;
        let v = inputs.get("cruise_speed")?;
        let tsfc = inputs.get("tsfc")?;
        let log_remaining = f.mapv(|f| (1.0 - f).ln());

        partials.set("range_km", "cruise_speed", -(ld / tsfc) * &log_remaining / 1.0e3)?;
        partials.set("range_km", "tsfc", (v / &tsfc.mapv(|t| t * t)) * ld * &log_remaining / 1.0e3)?;
        partials.set("range_km", "lift_to_drag_ratio", -(v / tsfc) * &log_remaining / 1.0e3)?;
        partials.set("range_km", "propellant_weight_fraction", (v / tsfc) * ld / &f.mapv(|f| 1.0 - f) / 1.0e3)
    }
}

/// Weights sizing for a configuration.
///
/// Reads `range` (m), `lift_to_drag_ratio`, `payload_weight` and
/// `crew_weight`, plus `cruise_speed` for fuel-burning aircraft. Owns the
/// propulsion inputs `battery_energy_density`, `propulsive_efficiency` and
/// `tsfc`. Outputs `propellant_weight_fraction`, `fixed_weight`,
/// `gross_weight`, `empty_weight_fraction`, `empty_weight` and
/// `propellant_weight`.
pub fn sizing_gross_weight_group(shape: &Shape, config: &AircraftConfig) -> ModelResult<Group> {
    config.validate()?;
    let params = config.empty_weight_parameters();

    let mut inputs = IndepVarComp::new(shape);
    inputs
        .add_output("battery_energy_density", config.battery_energy_density())
        .add_output("propulsive_efficiency", config.propulsive_efficiency)
        .add_output("tsfc", config.tsfc);

    let mut group = Group::new();
    group.add_independent("inputs_comp", inputs, Promotes::All);

    match config.energy_source_type {
        EnergySource::Electric => group.add_component(
            "propellant_weight_fraction_comp",
            PowerCombinationComp::new(shape, "propellant_weight_fraction")
                .with_coeff(GRAVITY)
                .with_power("range", 1.0)
                .with_power("battery_energy_density", -1.0)
                .with_power("propulsive_efficiency", -1.0)
                .with_power("lift_to_drag_ratio", -1.0),
            Promotes::All,
        ),
        EnergySource::FuelBurning => group.add_component(
            "propellant_weight_fraction_comp",
            BreguetPropellantWeightFractionComp::new(shape),
            Promotes::All,
        ),
    };

    group
        .add_component(
            "fixed_weight_comp",
            LinearCombinationComp::new(shape, "fixed_weight").with_term("payload_weight", 1.0).with_term("crew_weight", 1.0),
            Promotes::All,
        )
        .add_implicit("gross_weight_comp", GrossWeightComp::from_config(shape, config), Promotes::All)
        .add_component("empty_weight_fraction_comp", EmptyWeightFractionComp::new(shape, params), Promotes::All)
        .add_component(
            "empty_weight_comp",
            PowerCombinationComp::new(shape, "empty_weight")
                .with_power("empty_weight_fraction", 1.0)
                .with_power("gross_weight", 1.0),
            Promotes::All,
        )
        .add_component(
            "propellant_weight_comp",
            PowerCombinationComp::new(shape, "propellant_weight")
                .with_power("propellant_weight_fraction", 1.0)
                .with_power("gross_weight", 1.0),
            Promotes::All,
        );
    Ok(group)
}
