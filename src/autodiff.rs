//! Derivative verification.
//!
//! Components hand-code their partials, so a missing or wrong entry silently
//! corrupts every total derivative downstream. The checks here compare the
//! analytic partials against central differences of `compute` (or
//! `apply_nonlinear` for implicit components) for every output and every
//! input, declared or not, so an undeclared dependency shows up as a
//! mismatch against a zero block.
//!
//! Because partials are elementwise, a whole input array is perturbed at
//! once: output element `k` only sees the step on input element `k`.
//!
//! # Example
//!
//! ```
//! use aerosize::autodiff::check_partials;
//! use aerosize::models::PowerCombinationComp;
//! use aerosize::{Shape, Vector};
//!
//! let shape = Shape::new(&[2]);
//! let comp = PowerCombinationComp::new(&shape, "wing_area")
//!     .with_power("gross_weight", 1.0)
//!     .with_power("wing_loading", -1.0);
//!
//! let mut inputs = Vector::new();
//! inputs.insert("gross_weight", shape.full(5.0e5));
//! inputs.insert("wing_loading", shape.full(4.0e3));
//!
//! let report = check_partials(&comp, &inputs, 1e-6).unwrap();
//! assert!(report.is_accurate(1e-5, 1e-8));
//! ```
//!
//! Scalar relations can also be differentiated exactly with dual numbers via
//! [`dual_jacobian`].

use nalgebra::DMatrix;
use num_dual::*;

use crate::component::{ExplicitComponent, ImplicitComponent, Interface, Partials, Vector};
use crate::{Array, ModelResult};

/// Analytic and finite-difference values of one partial block.
#[derive(Debug, Clone)]
pub struct PartialCheck {
    pub of: String,
    pub wrt: String,
    pub declared: bool,
    pub analytic: Array,
    pub finite_difference: Array,
}

impl PartialCheck {
    /// Largest `|analytic - fd| / max(|analytic|, |fd|)` over the sweep,
    /// ignoring points where both are below `abs_tol`.
    pub fn relative_error(&self, abs_tol: f64) -> f64 {
        self.analytic
            .iter()
            .zip(self.finite_difference.iter())
            .filter(|(a, f)| a.abs().max(f.abs()) > abs_tol)
            .map(|(a, f)| (a - f).abs() / a.abs().max(f.abs()))
            .fold(0.0, f64::max)
    }

    pub fn is_accurate(&self, rel_tol: f64, abs_tol: f64) -> bool {
        self.analytic
            .iter()
            .zip(self.finite_difference.iter())
            .all(|(a, f)| (a - f).abs() <= abs_tol + rel_tol * a.abs().max(f.abs()))
    }
}

/// Outcome of a partials check over every `(of, wrt)` pair.
#[derive(Debug, Clone, Default)]
pub struct PartialsReport {
    pub entries: Vec<PartialCheck>,
}

impl PartialsReport {
    pub fn get(&self, of: &str, wrt: &str) -> Option<&PartialCheck> {
        self.entries.iter().find(|e| e.of == of && e.wrt == wrt)
    }

    /// True if every pair agrees within `abs_tol + rel_tol * max(|a|, |fd|)`.
    pub fn is_accurate(&self, rel_tol: f64, abs_tol: f64) -> bool {
        self.entries.iter().all(|e| e.is_accurate(rel_tol, abs_tol))
    }

    /// Pairs that fail the tolerance.
    pub fn failures(&self, rel_tol: f64, abs_tol: f64) -> Vec<&PartialCheck> {
        self.entries.iter().filter(|e| !e.is_accurate(rel_tol, abs_tol)).collect()
    }

    /// Undeclared pairs with a nonzero finite-difference derivative.
    pub fn undeclared_dependencies(&self, abs_tol: f64) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter(|e| !e.declared && e.finite_difference.iter().any(|v| v.abs() > abs_tol))
            .map(|e| (e.of.as_str(), e.wrt.as_str()))
            .collect()
    }
}

/// Step per element: `rel_step * |x|`, or `rel_step` at zero.
fn steps(x: &Array, rel_step: f64) -> Array {
    x.mapv(|v| if v == 0.0 { rel_step } else { rel_step * v.abs() })
}

fn perturbed(vector: &Vector, name: &str, step: &Array, sign: f64) -> Vector {
    let mut shifted = vector.clone();
    let value = &vector[name] + &(step * sign);
    shifted.insert(name, value);
    shifted
}

fn central_difference(plus: &Array, minus: &Array, step: &Array) -> Array {
    (plus - minus) / &(step * 2.0)
}

fn blank_outputs(interface: &Interface) -> Vector {
    let mut outputs = Vector::new();
    for decl in interface.outputs() {
        outputs.insert(&decl.name, interface.shape().full(decl.value));
    }
    outputs
}

fn analytic_block(interface: &Interface, partials: &Partials, of: &str, wrt: &str) -> Array {
    partials.get(of, wrt).cloned().unwrap_or_else(|| interface.shape().zeros())
}

/// Compares the partials of an explicit component with central differences.
///
/// `inputs` must hold every declared input. Steps are `rel_step * |x|`.
pub fn check_partials<C>(component: &C, inputs: &Vector, rel_step: f64) -> ModelResult<PartialsReport>
where
    C: ExplicitComponent + ?Sized,
{
    let interface = component.declare_io();
    let evaluate = |inputs: &Vector| -> ModelResult<Vector> {
        let mut outputs = blank_outputs(&interface);
        component.compute(inputs, &mut outputs)?;
        Ok(outputs)
    };
    // Partials are only requested after a compute at the same point.
    evaluate(inputs)?;
    let mut partials = Partials::new(&interface);
    component.compute_partials(inputs, &mut partials)?;

    let mut report = PartialsReport::default();
    for input in interface.inputs() {
        let step = steps(inputs.get(&input.name)?, rel_step);
        let plus = evaluate(&perturbed(inputs, &input.name, &step, 1.0))?;
        let minus = evaluate(&perturbed(inputs, &input.name, &step, -1.0))?;
        for output in interface.outputs() {
            report.entries.push(PartialCheck {
                of: output.name.clone(),
                wrt: input.name.clone(),
                declared: interface.is_declared(&output.name, &input.name),
                analytic: analytic_block(&interface, &partials, &output.name, &input.name),
                finite_difference: central_difference(plus.get(&output.name)?, minus.get(&output.name)?, &step),
            });
        }
    }
    Ok(report)
}

/// Compares residual partials of an implicit component with central
/// differences of `apply_nonlinear`, with respect to inputs and states.
pub fn check_implicit_partials<C>(
    component: &C,
    inputs: &Vector,
    outputs: &Vector,
    rel_step: f64,
) -> ModelResult<PartialsReport>
where
    C: ImplicitComponent + ?Sized,
{
    let interface = component.declare_io();
    let residuals = |inputs: &Vector, outputs: &Vector| -> ModelResult<Vector> {
        let mut residuals = blank_outputs(&interface);
        component.apply_nonlinear(inputs, outputs, &mut residuals)?;
        Ok(residuals)
    };
    let mut partials = Partials::new(&interface);
    component.linearize(inputs, outputs, &mut partials)?;

    let mut report = PartialsReport::default();
    let wrt_names = interface
        .inputs()
        .iter()
        .map(|d| (d.name.as_str(), true))
        .chain(interface.outputs().iter().map(|d| (d.name.as_str(), false)));
    for (wrt, is_input) in wrt_names {
        let (plus, minus, step) = if is_input {
            let step = steps(inputs.get(wrt)?, rel_step);
            let plus = residuals(&perturbed(inputs, wrt, &step, 1.0), outputs)?;
            let minus = residuals(&perturbed(inputs, wrt, &step, -1.0), outputs)?;
            (plus, minus, step)
        } else {
            let step = steps(outputs.get(wrt)?, rel_step);
            let plus = residuals(inputs, &perturbed(outputs, wrt, &step, 1.0))?;
            let minus = residuals(inputs, &perturbed(outputs, wrt, &step, -1.0))?;
            (plus, minus, step)
        };
        for state in interface.outputs() {
            report.entries.push(PartialCheck {
                of: state.name.clone(),
                wrt: wrt.to_string(),
                declared: interface.is_declared(&state.name, wrt),
                analytic: analytic_block(&interface, &partials, &state.name, wrt),
                finite_difference: central_difference(plus.get(&state.name)?, minus.get(&state.name)?, &step),
            });
        }
    }
    Ok(report)
}

/// Exact Jacobian of `f` at `x` by forward-mode dual numbers, one column per
/// variable.
///
/// ```
/// use aerosize::autodiff::dual_jacobian;
///
/// // f(x, y) = [x^2, xy]
/// let jac = dual_jacobian(|v| vec![v[0] * v[0], v[0] * v[1]], &[2.0, 3.0]);
/// assert_eq!(jac[(0, 0)], 4.0);
/// assert_eq!(jac[(1, 1)], 2.0);
/// ```
pub fn dual_jacobian<F>(f: F, x: &[f64]) -> DMatrix<f64>
where
    F: Fn(&[Dual64]) -> Vec<Dual64>,
{
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(x.len());
    for j in 0..x.len() {
        let mut x_dual: Vec<Dual64> = x.iter().map(|&v| Dual64::from(v)).collect();
        x_dual[j] = Dual64::from(x[j]).derivative();
        columns.push(f(&x_dual).iter().map(|r| r.eps).collect());
    }
    let rows = columns.first().map_or(0, Vec::len);
    DMatrix::from_fn(rows, x.len(), |i, j| columns[j][i])
}
