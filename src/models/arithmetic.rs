//! Generic algebraic components.
//!
//! Most sizing relations are sums of products of powers of named inputs. The
//! components here cover those shapes so physics groups can be assembled
//! from configuration rather than written out by hand:
//!
//! - [`LinearCombinationComp`]: `y = k + Σ cᵢ xᵢ`
//! - [`PowerCombinationComp`]: `y = c Π xᵢ^pᵢ`
//! - [`LinearPowerCombinationComp`]: `y = k + Σₜ cₜ Π xᵢ^pₜᵢ`
//! - [`ElementwiseMinComp`]: smooth (KS) minimum over several inputs

use crate::component::{ensure_nonzero, ensure_positive, ExplicitComponent, Interface, Partials, Vector};
use crate::config::ConfigError;
use crate::{Array, ModelError, ModelResult, Shape};

/// `x^p`, using integer powers where `p` is integral so negative bases stay valid.
fn power(x: f64, p: f64) -> f64 {
    if p.fract() == 0.0 && p.abs() < f64::from(i32::MAX) {
        x.powi(p as i32)
    } else {
        x.powf(p)
    }
}

/// Checks that `x^p` and its derivative are defined for every element.
fn check_power_domain(name: &str, x: &Array, p: f64) -> ModelResult<()> {
    if p.fract() != 0.0 {
        ensure_positive(name, x)
    } else if p < 1.0 && p != 0.0 {
        ensure_nonzero(name, x)
    } else {
        Ok(())
    }
}

/// One product `c Π xᵢ^pᵢ`.
#[derive(Debug, Clone, PartialEq)]
struct PowerTerm {
    coeff: f64,
    powers: Vec<(String, f64)>,
}

impl PowerTerm {
    fn set_power(&mut self, name: &str, p: f64) {
        match self.powers.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = p,
            None => self.powers.push((name.to_string(), p)),
        }
    }

    fn power_of(&self, name: &str) -> Option<f64> {
        self.powers.iter().find(|(n, _)| n == name).map(|(_, p)| *p)
    }

    fn value(&self, shape: &Shape, inputs: &Vector) -> ModelResult<Array> {
        let mut result = shape.full(self.coeff);
        for (name, p) in &self.powers {
            let x = inputs.get(name)?;
            check_power_domain(name, x, *p)?;
            result *= &x.mapv(|v| power(v, *p));
        }
        Ok(result)
    }

    fn partial(&self, shape: &Shape, inputs: &Vector, wrt: &str) -> ModelResult<Array> {
        let Some(p) = self.power_of(wrt) else {
            return Ok(shape.zeros());
        };
        // x^0 is constant, including at x = 0 where p x^(p-1) would be 0 * inf
        if p == 0.0 {
            return Ok(shape.zeros());
        }
        let mut result = shape.full(self.coeff * p);
        for (name, q) in &self.powers {
            let x = inputs.get(name)?;
            if name == wrt {
                result *= &x.mapv(|v| power(v, p - 1.0));
            } else {
                result *= &x.mapv(|v| power(v, *q));
            }
        }
        Ok(result)
    }
}

/// `y = constant + Σ cᵢ xᵢ`.
#[derive(Debug, Clone)]
pub struct LinearCombinationComp {
    shape: Shape,
    out_name: String,
    constant: f64,
    coeffs: Vec<(String, f64)>,
}

impl LinearCombinationComp {
    pub fn new(shape: &Shape, out_name: &str) -> Self {
        LinearCombinationComp { shape: shape.clone(), out_name: out_name.to_string(), constant: 0.0, coeffs: Vec::new() }
    }

    pub fn with_constant(mut self, constant: f64) -> Self {
        self.constant = constant;
        self
    }

    pub fn with_term(mut self, name: &str, coeff: f64) -> Self {
        match self.coeffs.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = coeff,
            None => self.coeffs.push((name.to_string(), coeff)),
        }
        self
    }
}

impl ExplicitComponent for LinearCombinationComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        for (name, _) in &self.coeffs {
            io.add_input(name);
        }
        io.add_output(&self.out_name);
        for (name, _) in &self.coeffs {
            io.declare_partials(&self.out_name, name);
        }
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let mut y = self.shape.full(self.constant);
        for (name, coeff) in &self.coeffs {
            y.scaled_add(*coeff, inputs.get(name)?);
        }
        outputs.set(&self.out_name, y)
    }

    fn compute_partials(&self, _inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        for (name, coeff) in &self.coeffs {
            partials.set_constant(&self.out_name, name, *coeff)?;
        }
        Ok(())
    }
}

/// `y = coeff Π xᵢ^pᵢ`.
///
/// Inputs with fractional powers must be positive; inputs with negative
/// integer powers must be nonzero.
#[derive(Debug, Clone)]
pub struct PowerCombinationComp {
    shape: Shape,
    out_name: String,
    term: PowerTerm,
}

impl PowerCombinationComp {
    pub fn new(shape: &Shape, out_name: &str) -> Self {
        PowerCombinationComp {
            shape: shape.clone(),
            out_name: out_name.to_string(),
            term: PowerTerm { coeff: 1.0, powers: Vec::new() },
        }
    }

    pub fn with_coeff(mut self, coeff: f64) -> Self {
        self.term.coeff = coeff;
        self
    }

    pub fn with_power(mut self, name: &str, power: f64) -> Self {
        self.term.set_power(name, power);
        self
    }
}

impl ExplicitComponent for PowerCombinationComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        for (name, _) in &self.term.powers {
            io.add_input(name);
        }
        io.add_output(&self.out_name);
        for (name, _) in &self.term.powers {
            io.declare_partials(&self.out_name, name);
        }
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let y = self.term.value(&self.shape, inputs)?;
        outputs.set(&self.out_name, y)
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        for (name, _) in &self.term.powers {
            let d = self.term.partial(&self.shape, inputs, name)?;
            partials.set(&self.out_name, name, d)?;
        }
        Ok(())
    }
}

/// `y = constant + Σₜ cₜ Π xᵢ^pₜᵢ`.
///
/// # Example
///
/// ```
/// use aerosize::models::LinearPowerCombinationComp;
/// use aerosize::Shape;
///
/// // Climb thrust-to-weight: G + W/S / (0.5 π e AR ρ V²) + 0.5 CD0 ρ V² / (W/S)
/// let comp = LinearPowerCombinationComp::new(&Shape::scalar(), "climb_thrust_to_weight")
///     .with_term(1.0, &[("climb_gradient", 1.0)])
///     .with_term(
///         1.0 / (0.5 * std::f64::consts::PI),
///         &[("wing_loading", 1.0), ("oswald_efficiency", -1.0), ("aspect_ratio", -1.0), ("density", -1.0), ("climb_speed", -2.0)],
///     )
///     .with_term(0.5, &[("cd0", 1.0), ("density", 1.0), ("climb_speed", 2.0), ("wing_loading", -1.0)]);
/// ```
#[derive(Debug, Clone)]
pub struct LinearPowerCombinationComp {
    shape: Shape,
    out_name: String,
    constant: f64,
    terms: Vec<PowerTerm>,
}

impl LinearPowerCombinationComp {
    pub fn new(shape: &Shape, out_name: &str) -> Self {
        LinearPowerCombinationComp { shape: shape.clone(), out_name: out_name.to_string(), constant: 0.0, terms: Vec::new() }
    }

    pub fn with_constant(mut self, constant: f64) -> Self {
        self.constant = constant;
        self
    }

    pub fn with_term(mut self, coeff: f64, powers: &[(&str, f64)]) -> Self {
        let mut term = PowerTerm { coeff, powers: Vec::new() };
        for (name, p) in powers {
            term.set_power(name, *p);
        }
        self.terms.push(term);
        self
    }

    fn input_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for term in &self.terms {
            for (name, _) in &term.powers {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }
}

impl ExplicitComponent for LinearPowerCombinationComp {
    fn declare_io(&self) -> Interface {
        let names = self.input_names();
        let mut io = Interface::new(&self.shape);
        for name in &names {
            io.add_input(name);
        }
        io.add_output(&self.out_name);
        for name in &names {
            io.declare_partials(&self.out_name, name);
        }
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let mut y = self.shape.full(self.constant);
        for term in &self.terms {
            y += &term.value(&self.shape, inputs)?;
        }
        outputs.set(&self.out_name, y)
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        for name in self.input_names() {
            let mut d = self.shape.zeros();
            for term in self.terms.iter().filter(|t| t.power_of(name).is_some()) {
                d += &term.partial(&self.shape, inputs, name)?;
            }
            partials.set(&self.out_name, name, d)?;
        }
        Ok(())
    }
}

/// Smooth elementwise minimum by Kreisselmeier-Steinhauser aggregation.
///
/// `y = m - ln(Σ exp(-ρ (xᵢ - m))) / ρ` with `m = min xᵢ`. The result lies
/// within `ln(n) / ρ` below the true minimum; larger `ρ` is sharper.
#[derive(Debug, Clone)]
pub struct ElementwiseMinComp {
    shape: Shape,
    out_name: String,
    in_names: Vec<String>,
    rho: f64,
}

impl ElementwiseMinComp {
    pub const DEFAULT_RHO: f64 = 1.0e-3;

    pub fn new(shape: &Shape, out_name: &str, in_names: &[&str]) -> Self {
        ElementwiseMinComp {
            shape: shape.clone(),
            out_name: out_name.to_string(),
            in_names: in_names.iter().map(|n| n.to_string()).collect(),
            rho: Self::DEFAULT_RHO,
        }
    }

    /// Sets the aggregation sharpness, in inverse units of the inputs.
    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Per-input weights `exp(-ρ (xᵢ - m))`, their sum and the hard minimum.
    fn weights(&self, inputs: &Vector) -> ModelResult<(Vec<Array>, Array, Array)> {
        if !(self.rho > 0.0 && self.rho.is_finite()) {
            return Err(ModelError::Config(ConfigError::OutOfRange {
                option: "rho",
                value: self.rho,
                reason: "must be positive and finite",
            }));
        }
        let values = self.in_names.iter().map(|n| inputs.get(n)).collect::<ModelResult<Vec<_>>>()?;
        let mut minimum = self.shape.full(f64::INFINITY);
        for x in &values {
            minimum.zip_mut_with(*x, |m, &v| *m = m.min(v));
        }
        let rho = self.rho;
        let weights: Vec<Array> = values
            .iter()
            .map(|x| {
                let mut w = (*x).clone();
                w.zip_mut_with(&minimum, |v, &m| *v = (-rho * (*v - m)).exp());
                w
            })
            .collect();
        let mut total = self.shape.zeros();
        for w in &weights {
            total += w;
        }
        Ok((weights, total, minimum))
    }
}

impl ExplicitComponent for ElementwiseMinComp {
    fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        for name in &self.in_names {
            io.add_input(name);
        }
        io.add_output(&self.out_name);
        for name in &self.in_names {
            io.declare_partials(&self.out_name, name);
        }
        io
    }

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()> {
        let (_, total, minimum) = self.weights(inputs)?;
        let rho = self.rho;
        let y = minimum - total.mapv(|s| s.ln() / rho);
        outputs.set(&self.out_name, y)
    }

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()> {
        let (weights, total, _) = self.weights(inputs)?;
        for (name, w) in self.in_names.iter().zip(weights) {
            partials.set(&self.out_name, name, w / &total)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::check_partials;
    use approx::assert_relative_eq;

    fn vector(shape: &Shape, values: &[(&str, Vec<f64>)]) -> Vector {
        let mut v = Vector::new();
        for (name, data) in values {
            v.insert(name, shape.array_from_vec(data.clone()).unwrap());
        }
        v
    }

    fn run<C: ExplicitComponent>(comp: &C, inputs: &Vector) -> ModelResult<Vector> {
        let io = comp.declare_io();
        let mut outputs = Vector::new();
        for decl in io.outputs() {
            outputs.insert(&decl.name, io.shape().full(decl.value));
        }
        comp.compute(inputs, &mut outputs)?;
        Ok(outputs)
    }

    #[test]
    fn test_linear_combination() {
        let shape = Shape::new(&[2]);
        let comp = LinearCombinationComp::new(&shape, "fixed_weight")
            .with_constant(10.0)
            .with_term("payload_weight", 1.0)
            .with_term("crew_weight", 2.0);
        let inputs = vector(&shape, &[("payload_weight", vec![100.0, 200.0]), ("crew_weight", vec![5.0, 6.0])]);

        let outputs = run(&comp, &inputs).unwrap();
        assert_eq!(outputs["fixed_weight"][[0]], 120.0);
        assert_eq!(outputs["fixed_weight"][[1]], 222.0);
        assert!(check_partials(&comp, &inputs, 1e-6).unwrap().is_accurate(1e-5, 1e-8));
    }

    #[test]
    fn test_power_combination() {
        let shape = Shape::new(&[3]);
        let comp = PowerCombinationComp::new(&shape, "dynamic_pressure")
            .with_coeff(0.5)
            .with_power("density", 1.0)
            .with_power("speed", 2.0);
        let inputs = vector(&shape, &[("density", vec![1.225, 0.9, 0.4]), ("speed", vec![50.0, 100.0, 230.0])]);

        let outputs = run(&comp, &inputs).unwrap();
        assert_relative_eq!(outputs["dynamic_pressure"][[0]], 1531.25);
        assert_relative_eq!(outputs["dynamic_pressure"][[2]], 0.5 * 0.4 * 230.0 * 230.0);
        assert!(check_partials(&comp, &inputs, 1e-6).unwrap().is_accurate(1e-5, 1e-8));
    }

    #[test]
    fn test_power_combination_domain() {
        let shape = Shape::new(&[2]);
        let root = PowerCombinationComp::new(&shape, "y").with_power("x", 0.5);
        let inputs = vector(&shape, &[("x", vec![4.0, -1.0])]);
        match run(&root, &inputs) {
            Err(ModelError::Domain { variable, value, .. }) => {
                assert_eq!(variable, "x");
                assert_eq!(value, -1.0);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Negative base with an integer power is fine
        let square = PowerCombinationComp::new(&shape, "y").with_power("x", 2.0);
        assert_eq!(run(&square, &inputs).unwrap()["y"][[1]], 1.0);
    }

    #[test]
    fn test_zero_power_has_zero_partial_at_zero_base() {
        let shape = Shape::new(&[2]);
        let comp = PowerCombinationComp::new(&shape, "y").with_coeff(3.0).with_power("x", 0.0).with_power("z", 2.0);
        let inputs = vector(&shape, &[("x", vec![0.0, 2.0]), ("z", vec![1.5, -2.0])]);

        let outputs = run(&comp, &inputs).unwrap();
        assert_eq!(outputs["y"][[0]], 3.0 * 2.25);

        let mut partials = Partials::new(&comp.declare_io());
        comp.compute_partials(&inputs, &mut partials).unwrap();
        let dy_dx = partials.get("y", "x").unwrap();
        assert_eq!(dy_dx[[0]], 0.0);
        assert_eq!(dy_dx[[1]], 0.0);
        assert_eq!(partials.get("y", "z").unwrap()[[1]], 3.0 * 2.0 * -2.0);
    }

    #[test]
    fn test_linear_power_combination() {
        let shape = Shape::new(&[2]);
        // y = 1 + 2 a b^2 - a / b
        let comp = LinearPowerCombinationComp::new(&shape, "y")
            .with_constant(1.0)
            .with_term(2.0, &[("a", 1.0), ("b", 2.0)])
            .with_term(-1.0, &[("a", 1.0), ("b", -1.0)]);
        let inputs = vector(&shape, &[("a", vec![3.0, 0.5]), ("b", vec![2.0, 4.0])]);

        let outputs = run(&comp, &inputs).unwrap();
        assert_relative_eq!(outputs["y"][[0]], 1.0 + 24.0 - 1.5);
        assert_eq!(comp.declare_io().inputs().len(), 2);
        assert!(check_partials(&comp, &inputs, 1e-6).unwrap().is_accurate(1e-5, 1e-8));
    }

    #[test]
    fn test_elementwise_min() {
        let shape = Shape::new(&[3]);
        let comp = ElementwiseMinComp::new(&shape, "re_turbulent_min", &["re", "re_cutoff"]);
        let inputs = vector(
            &shape,
            &[("re", vec![1.0e6, 5.0e7, 3.0e5]), ("re_cutoff", vec![3.0e7, 1.0e7, 3.0e5 + 500.0])],
        );

        let outputs = run(&comp, &inputs).unwrap();
        let y = &outputs["re_turbulent_min"];
        assert_relative_eq!(y[[0]], 1.0e6, max_relative = 1e-12);
        assert_relative_eq!(y[[1]], 1.0e7, max_relative = 1e-12);
        // Close inputs are smoothed below the hard minimum
        assert!(y[[2]] < 3.0e5);
        assert!(y[[2]] > 3.0e5 - 2f64.ln() / comp.rho());
        assert!(check_partials(&comp, &inputs, 1e-6).unwrap().is_accurate(1e-5, 1e-8));
    }

    #[test]
    fn test_elementwise_min_rejects_bad_rho() {
        let shape = Shape::scalar();
        let comp = ElementwiseMinComp::new(&shape, "y", &["a", "b"]).with_rho(0.0);
        let inputs = vector(&shape, &[("a", vec![1.0]), ("b", vec![2.0])]);
        assert!(matches!(run(&comp, &inputs), Err(ModelError::Config(_))));
    }
}
