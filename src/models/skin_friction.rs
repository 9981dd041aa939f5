//! Flat-plate skin friction.
//!
//! Two routes are provided:
//!
//! - [`SkinFrictionCoeffComp`]: a single coefficient from the Reynolds
//!   number, laminar below transition and turbulent above, joined by a cubic
//!   blend over `Re = 5e5 ± 5e4`.
//! - [`skin_friction_group`]: the part-level build-up used in drag
//!   estimation. The turbulent Reynolds number is capped by the surface
//!   roughness cutoff through a KS soft minimum, and the coefficient mixes
//!   laminar and compressible turbulent values by the part's laminar
//!   percentage.

use std::sync::Arc;

use crate::blend::{BlendedCurve, Regime};
use crate::component::{ensure_positive, ExplicitComponent, Interface, Partials, Vector};
use crate::config::{ConfigError, FlightRegime};
use crate::group::{Group, Promotes};
use crate::models::{ElementwiseMinComp, LinearCombinationComp, PowerCombinationComp};
use crate::{Array, ModelError, ModelResult, Shape};

/// Laminar-turbulent transition Reynolds number.
pub const TRANSITION_REYNOLDS: f64 = 5.0e5;
/// Half-width of the transition blend.
pub const TRANSITION_HALF_WIDTH: f64 = 5.0e4;
/// Mach number at which the blended turbulent branch is evaluated.
const BLEND_MACH: f64 = 0.2;

/// Blasius laminar flat plate, `1.328 / sqrt(Re)`.
#[derive(Debug, Clone, Copy)]
struct Laminar;

impl Regime for Laminar {
    fn value(&self, re: f64) -> f64 {
        1.328 / re.sqrt()
    }

    fn slope(&self, re: f64) -> f64 {
        -0.664 * re.powf(-1.5)
    }
}

/// Schlichting turbulent flat plate with compressibility correction,
/// `0.455 / (log10 Re)^2.58 / (1 + 0.144 M^2)^0.65`.
#[derive(Debug, Clone, Copy)]
struct Turbulent {
    mach: f64,
}

impl Turbulent {
    fn compressibility(mach: f64) -> f64 {
        1.0 + 0.144 * mach * mach
    }

    fn coefficient(re: f64, mach: f64) -> f64 {
        0.455 / re.log10().powf(2.58) / Self::compressibility(mach).powf(0.65)
    }

    fn d_reynolds(re: f64, mach: f64) -> f64 {
        -2.58 * 0.455 / re.log10().powf(3.58) / (re * std::f64::consts::LN_10) / Self::compressibility(mach).powf(0.65)
    }

    fn d_mach(re: f64, mach: f64) -> f64 {
        0.455 / re.log10().powf(2.58) * -0.65 / Self::compressibility(mach).powf(1.65) * 2.0 * 0.144 * mach
    }
}

impl Regime for Turbulent {
    fn value(&self, re: f64) -> f64 {
        Self::coefficient(re, self.mach)
    }

    fn slope(&self, re: f64) -> f64 {
        Self::d_reynolds(re, self.mach)
    }
}

/// Fails with a domain error unless every Reynolds number exceeds 1, where
/// `log10 Re` is positive.
fn ensure_turbulent_domain(name: &str, re: &Array) -> ModelResult<()> {
    match re.iter().find(|v| !(**v > 1.0)) {
        Some(&value) => Err(ModelError::Domain { variable: name.to_string(), value, reason: "must exceed 1" }),
        None => Ok(()),
    }
}

/// Laminar/turbulent transition curve, fitted once.
#[derive(Debug, Clone)]
pub struct SkinFrictionModel {
    curve: BlendedCurve<Laminar, Turbulent>,
}

impl SkinFrictionModel {
    pub fn new() -> Result<Self, ConfigError> {
        let curve = BlendedCurve::new(
            Laminar,
            Turbulent { mach: BLEND_MACH },
            TRANSITION_REYNOLDS - TRANSITION_HALF_WIDTH,
            TRANSITION_REYNOLDS + TRANSITION_HALF_WIDTH,
        )?;
        Ok(SkinFrictionModel { curve })
    }

    pub fn coefficient(&self, re: f64) -> f64 {
        self.curve.value(re)
    }

    pub fn slope(&self, re: f64) -> f64 {
        self.curve.slope(re)
    }
}

/// `skin_friction_coeff` from `reynolds_number` through the transition blend.
#[derive(Debug, Clone)]
pub struct SkinFrictionCoeffComp {
    shape: Shape,
    model: Arc<SkinFrictionModel>,
}

impl SkinFrictionCoeffComp {
    pub fn new(shape: &Shape, model: Arc<SkinFrictionModel>) -> Self {
        SkinFrictionCoeffComp { shape: shape.clone(), model }
    }
}

impl ExplicitComponent for SkinFrictionCoeffComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("reynolds_number")
            .add_output_with_value("skin_friction_coeff", 3.0e-3)
            .declare_partials("skin_friction_coeff", "reynolds_number");
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let re = inputs.get("reynolds_number")?;
        ensure_positive("reynolds_number", re)?;
        outputs.set("skin_friction_coeff", self.model.curve.values(re))
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let re = inputs.get("reynolds_number")?;
        partials.set("skin_friction_coeff", "reynolds_number", self.model.curve.slopes(re))
    }
}

/// Compressible turbulent coefficient from the capped Reynolds number and
/// the local Mach number.
#[derive(Debug, Clone)]
pub struct TurbulentSkinFrictionComp {
    shape: Shape,
}

impl TurbulentSkinFrictionComp {
    pub fn new(shape: &Shape) -> Self {
        TurbulentSkinFrictionComp { shape: shape.clone() }
    }

    fn elementwise(re: &Array, mach: &Array, f: fn(f64, f64) -> f64) -> Array {
        let mut out = re.clone();
        out.zip_mut_with(mach, |r, &m| *r = f(*r, m));
        out
    }
}

impl ExplicitComponent for TurbulentSkinFrictionComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        io.add_input("reynolds_turbulent_min")
            .add_input("mach_number")
            .add_output_with_value("skin_friction_coeff_turbulent", 3.0e-3)
            .declare_partials("skin_friction_coeff_turbulent", "reynolds_turbulent_min")
            .declare_partials("skin_friction_coeff_turbulent", "mach_number");
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let re = inputs.get("reynolds_turbulent_min")?;
        let mach = inputs.get("mach_number")?;
        ensure_turbulent_domain("reynolds_turbulent_min", re)?;
        outputs.set("skin_friction_coeff_turbulent", Self::elementwise(re, mach, Turbulent::coefficient))
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let re = inputs.get("reynolds_turbulent_min")?;
        let mach = inputs.get("mach_number")?;
        partials.set(
            "skin_friction_coeff_turbulent",
            "reynolds_turbulent_min",
            Self::elementwise(re, mach, Turbulent::d_reynolds),
        )?;
        partials.set("skin_friction_coeff_turbulent", "mach_number", Self::elementwise(re, mach, Turbulent::d_mach))
    }
}

/// Surface properties of one aircraft part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinFrictionPart {
    /// Equivalent sand-grain roughness, m
    pub roughness: f64,
    /// Share of the wetted length with laminar flow, percent
    pub laminar_pctg: f64,
    /// Sharpness of the roughness-cutoff soft minimum
    pub rho: f64,
}

impl Default for SkinFrictionPart {
    fn default() -> Self {
        SkinFrictionPart { roughness: 0.4e-5, laminar_pctg: 5.0, rho: ElementwiseMinComp::DEFAULT_RHO }
    }
}

impl SkinFrictionPart {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.roughness.is_finite() && self.roughness > 0.0) {
            return Err(ConfigError::OutOfRange { option: "roughness", value: self.roughness, reason: "must be positive" });
        }
        if !(0.0..=100.0).contains(&self.laminar_pctg) {
            return Err(ConfigError::OutOfRange {
                option: "laminar_pctg",
                value: self.laminar_pctg,
                reason: "must lie in [0, 100]",
            });
        }
        if !(self.rho.is_finite() && self.rho > 0.0) {
            return Err(ConfigError::OutOfRange { option: "rho", value: self.rho, reason: "must be positive" });
        }
        Ok(())
    }
}

/// Part skin friction from `density`, `speed`, `characteristic_length`,
/// `dynamic_viscosity` and `mach_number`.
///
/// Outputs `reynolds_number`, `reynolds_cutoff`, `reynolds_turbulent_min`,
/// the laminar and turbulent coefficients and their mix
/// `skin_friction_coeff`.
pub fn skin_friction_group(shape: &Shape, regime: FlightRegime, part: &SkinFrictionPart) -> ModelResult<Group> {
    part.validate()?;
    let laminar_share = part.laminar_pctg / 100.0;

    let cutoff = match regime {
        FlightRegime::Subsonic => PowerCombinationComp::new(shape, "reynolds_cutoff")
            .with_coeff(38.21 * part.roughness.powf(-1.053))
            .with_power("characteristic_length", 1.053),
        FlightRegime::Transonic | FlightRegime::Supersonic => PowerCombinationComp::new(shape, "reynolds_cutoff")
            .with_coeff(44.62 * part.roughness.powf(-1.053))
            .with_power("characteristic_length", 1.053)
            .with_power("mach_number", 1.16),
    };

    let mut group = Group::new();
    group
        .add_component(
            "reynolds_number_comp",
            PowerCombinationComp::new(shape, "reynolds_number")
                .with_power("density", 1.0)
                .with_power("speed", 1.0)
                .with_power("characteristic_length", 1.0)
                .with_power("dynamic_viscosity", -1.0),
            Promotes::All,
        )
        .add_component("reynolds_cutoff_comp", cutoff, Promotes::All)
        .add_component(
            "reynolds_turbulent_min_comp",
            ElementwiseMinComp::new(shape, "reynolds_turbulent_min", &["reynolds_number", "reynolds_cutoff"])
                .with_rho(part.rho),
            Promotes::All,
        )
        .add_component(
            "skin_friction_coeff_laminar_comp",
            PowerCombinationComp::new(shape, "skin_friction_coeff_laminar")
                .with_coeff(1.328)
                .with_power("reynolds_number", -0.5),
            Promotes::All,
        )
        .add_component("skin_friction_coeff_turbulent_comp", TurbulentSkinFrictionComp::new(shape), Promotes::All)
        .add_component(
            "skin_friction_coeff_comp",
            LinearCombinationComp::new(shape, "skin_friction_coeff")
                .with_term("skin_friction_coeff_laminar", laminar_share)
                .with_term("skin_friction_coeff_turbulent", 1.0 - laminar_share),
            Promotes::All,
        );
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::check_partials;
    use crate::models::IndepVarComp;
    use crate::Model;
    use approx::assert_relative_eq;

    #[test]
    fn test_transition_blend_is_c1() {
        let model = SkinFrictionModel::new().unwrap();
        for boundary in [TRANSITION_REYNOLDS - TRANSITION_HALF_WIDTH, TRANSITION_REYNOLDS + TRANSITION_HALF_WIDTH] {
            let below = boundary * (1.0 - 1e-12);
            let above = boundary * (1.0 + 1e-12);
            assert_relative_eq!(model.coefficient(below), model.coefficient(above), max_relative = 1e-8);
            assert_relative_eq!(model.slope(below), model.slope(above), max_relative = 1e-8);
        }
        assert_relative_eq!(model.coefficient(1.0e5), 1.328 / 1.0e5f64.sqrt());
        assert_relative_eq!(model.coefficient(1.0e7), Turbulent::coefficient(1.0e7, 0.2));
    }

    #[test]
    fn test_coeff_comp_partials() {
        let shape = Shape::new(&[5]);
        let mut inputs = Vector::new();
        inputs.insert("reynolds_number", shape.array_from_vec(vec![1.0e4, 4.0e5, 5.0e5, 5.3e5, 3.0e7]).unwrap());
        let comp = SkinFrictionCoeffComp::new(&shape, Arc::new(SkinFrictionModel::new().unwrap()));
        let report = check_partials(&comp, &inputs, 1e-6).unwrap();
        assert!(report.is_accurate(1e-5, 1e-14), "{:?}", report.failures(1e-5, 1e-14));
    }

    #[test]
    fn test_turbulent_partials() {
        let shape = Shape::new(&[3]);
        let mut inputs = Vector::new();
        inputs.insert("reynolds_turbulent_min", shape.array_from_vec(vec![1.0e6, 2.5e7, 8.0e7]).unwrap());
        inputs.insert("mach_number", shape.array_from_vec(vec![0.2, 0.78, 1.4]).unwrap());
        let report = check_partials(&TurbulentSkinFrictionComp::new(&shape), &inputs, 1e-6).unwrap();
        assert!(report.is_accurate(1e-5, 1e-14), "{:?}", report.failures(1e-5, 1e-14));
    }

    #[test]
    fn test_turbulent_domain() {
        let shape = Shape::scalar();
        let mut inputs = Vector::new();
        inputs.insert("reynolds_turbulent_min", shape.full(1.0));
        inputs.insert("mach_number", shape.full(0.5));
        let mut outputs = Vector::new();
        outputs.insert("skin_friction_coeff_turbulent", shape.zeros());
        let result = TurbulentSkinFrictionComp::new(&shape).compute(&inputs, &mut outputs);
        assert!(matches!(result, Err(ModelError::Domain { reason: "must exceed 1", .. })));
    }

    #[test]
    fn test_part_validation() {
        assert!(SkinFrictionPart::default().validate().is_ok());
        let part = SkinFrictionPart { laminar_pctg: 120.0, ..SkinFrictionPart::default() };
        assert!(matches!(
            skin_friction_group(&Shape::scalar(), FlightRegime::Subsonic, &part),
            Err(ModelError::Config(ConfigError::OutOfRange { option: "laminar_pctg", .. }))
        ));
    }

    fn run_group(regime: FlightRegime, length: f64) -> Model {
        let shape = Shape::new(&[2]);
        let mut inputs = IndepVarComp::new(&shape);
        inputs
            .add_output("density", 0.38)
            .add_output("speed", 230.0)
            .add_output("dynamic_viscosity", 1.42e-5)
            .add_output("mach_number", 0.78)
            .add_output_array("characteristic_length", shape.array_from_vec(vec![length, 0.5 * length]).unwrap());

        let mut root = Group::new();
        root.add_independent("inputs_comp", inputs, Promotes::All).add_group(
            "skin_friction",
            skin_friction_group(&shape, regime, &SkinFrictionPart::default()).unwrap(),
            Promotes::All,
        );
        let mut model = Model::setup(root, &shape).unwrap();
        model.run_model().unwrap();
        model
    }

    #[test]
    fn test_group_mixes_laminar_and_turbulent() {
        let model = run_group(FlightRegime::Transonic, 4.0);
        let re = model.get("reynolds_number").unwrap()[[0]];
        assert_relative_eq!(re, 0.38 * 230.0 * 4.0 / 1.42e-5, max_relative = 1e-12);

        let laminar = model.get("skin_friction_coeff_laminar").unwrap()[[0]];
        let turbulent = model.get("skin_friction_coeff_turbulent").unwrap()[[0]];
        let cf = model.get("skin_friction_coeff").unwrap()[[0]];
        assert_relative_eq!(cf, 0.05 * laminar + 0.95 * turbulent, max_relative = 1e-12);
        assert!(turbulent > laminar);

        // Smooth cutoff never exceeds the smaller of the two Reynolds numbers
        let capped = model.get("reynolds_turbulent_min").unwrap()[[0]];
        let cutoff = model.get("reynolds_cutoff").unwrap()[[0]];
        assert!(capped <= re.min(cutoff));
    }

    #[test]
    fn test_group_totals_match_finite_difference() {
        let mut model = run_group(FlightRegime::Subsonic, 4.0);
        let totals = model.compute_totals(&["skin_friction_coeff"], &["characteristic_length"]).unwrap();
        let analytic = totals.get("skin_friction_coeff", "characteristic_length").unwrap().clone();

        let step = 1e-6;
        let shape = model.shape().clone();
        let base = model.get("characteristic_length").unwrap().clone();
        let perturbations = steps_of(&base, step);
        model.set_array("characteristic_length", &base + &perturbations).unwrap();
        model.run_model().unwrap();
        let plus = model.get("skin_friction_coeff").unwrap().clone();
        model.set_array("characteristic_length", &base - &perturbations).unwrap();
        model.run_model().unwrap();
        let minus = model.get("skin_friction_coeff").unwrap().clone();

        for k in 0..shape.size() {
            let fd = (plus[[k]] - minus[[k]]) / (2.0 * perturbations[[k]]);
            assert_relative_eq!(analytic[[k]], fd, max_relative = 1e-5);
        }
    }

    fn steps_of(x: &Array, rel: f64) -> Array {
        x.mapv(|v| v * rel)
    }
}
