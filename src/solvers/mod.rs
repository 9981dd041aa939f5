//! Scalar root finding for implicit sizing equations.
//!
//! Implicit components in a sizing model reduce to one scalar equation
//! `R(x) = 0` per sweep point, solved on a bracket `[lower, upper]` whose
//! endpoints have residuals of opposite sign.
//!
//! # Methods
//!
//! - [`RootFinder::Bisection`]: a fixed number of interval halvings. Robust,
//!   needs no slope, and converges for any continuous residual with a sign
//!   change on the bracket.
//! - [`RootFinder::Newton`]: Newton steps using the slope from dual-number
//!   evaluation, falling back to bisection whenever a step leaves the current
//!   bracket.
//!
//! Residuals implement [`ScalarResidual`], evaluated on [`Dual64`] so that one
//! implementation provides both the value and the exact slope.
//!
//! ```
//! use aerosize::solvers::RootFinder;
//! use num_dual::Dual64;
//!
//! // R(x) = 2 - x^2, decreasing on [0, 2]
//! let residual = |x: Dual64| Dual64::from(2.0) - x * x;
//! let solution = RootFinder::Bisection { iterations: 60 }.solve(&residual, 0.0, 2.0, 1e-9).unwrap();
//! assert!((solution.root - 2f64.sqrt()).abs() < 1e-9);
//! ```

use num_dual::*;

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Errors that can occur during solving.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    /// Residual has the same sign at both bracket ends
    #[error("no sign change on [{lower}, {upper}]: R(lower) = {lower_residual:.6e}, R(upper) = {upper_residual:.6e}")]
    NoSignChange { lower: f64, upper: f64, lower_residual: f64, upper_residual: f64 },
    /// Iterations finished but the residual is still above tolerance
    #[error("residual {residual:.6e} at x = {root} exceeds tolerance {tolerance:.3e} after {iterations} iterations")]
    ResidualTooLarge { root: f64, residual: f64, tolerance: f64, iterations: usize },
    /// Maximum iterations exceeded without convergence
    #[error("maximum iterations ({0}) exceeded")]
    MaxIterationsExceeded(usize),
    /// Residual evaluated to NaN or infinity
    #[error("residual is not finite at x = {0}")]
    NonFiniteResidual(f64),
    /// Invalid solver setting
    #[error("invalid solver setting: {0}")]
    InvalidSetting(&'static str),
}

/// A scalar residual function `R(x)`.
pub trait ScalarResidual {
    /// Evaluates the residual on a dual number.
    fn eval(&self, x: Dual64) -> Dual64;

    /// Residual value only.
    fn value(&self, x: f64) -> f64 {
        self.eval(Dual64::from(x)).re
    }

    /// Residual value and slope `dR/dx`.
    fn value_and_slope(&self, x: f64) -> (f64, f64) {
        let r = self.eval(Dual64::from(x).derivative());
        (r.re, r.eps)
    }
}

impl<F> ScalarResidual for F
where
    F: Fn(Dual64) -> Dual64,
{
    fn eval(&self, x: Dual64) -> Dual64 {
        self(x)
    }
}

/// Converged root with solver statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootSolution {
    pub root: f64,
    /// Residual at `root`
    pub residual: f64,
    pub iterations: usize,
    pub function_evals: usize,
}

/// Root-finding method for scalar residuals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RootFinder {
    /// Halve the bracket a fixed number of times.
    Bisection { iterations: usize },
    /// Bracketed Newton iteration until `|R| <= tolerance`.
    Newton { max_iterations: usize },
}

impl Default for RootFinder {
    fn default() -> Self {
        RootFinder::Bisection { iterations: 100 }
    }
}

impl RootFinder {
    /// Finds `x` in `[lower, upper]` with `R(x) = 0`.
    ///
    /// The residual must change sign over the bracket. After the method
    /// finishes the residual at the returned root is checked against
    /// `tolerance`.
    pub fn solve<R>(&self, residual: &R, lower: f64, upper: f64, tolerance: f64) -> SolverResult<RootSolution>
    where
        R: ScalarResidual + ?Sized,
    {
        if !(lower < upper) {
            return Err(SolverError::InvalidSetting("bracket must satisfy lower < upper"));
        }
        let lower_residual = finite(residual.value(lower), lower)?;
        let upper_residual = finite(residual.value(upper), upper)?;
        if lower_residual.signum() == upper_residual.signum() && lower_residual != 0.0 && upper_residual != 0.0 {
            return Err(SolverError::NoSignChange { lower, upper, lower_residual, upper_residual });
        }

        let bracket = Bracket::new(lower, upper, lower_residual);
        let solution = match *self {
            RootFinder::Bisection { iterations } => bisect(residual, bracket, iterations)?,
            RootFinder::Newton { max_iterations } => newton(residual, bracket, max_iterations, tolerance)?,
        };

        if !(solution.residual.abs() <= tolerance) {
            return Err(SolverError::ResidualTooLarge {
                root: solution.root,
                residual: solution.residual,
                tolerance,
                iterations: solution.iterations,
            });
        }
        Ok(solution)
    }
}

/// Bracket oriented so that `positive` holds the end with `R >= 0`.
#[derive(Debug, Clone, Copy)]
struct Bracket {
    positive: f64,
    negative: f64,
}

impl Bracket {
    fn new(lower: f64, upper: f64, lower_residual: f64) -> Self {
        if lower_residual >= 0.0 {
            Bracket { positive: lower, negative: upper }
        } else {
            Bracket { positive: upper, negative: lower }
        }
    }

    fn midpoint(&self) -> f64 {
        0.5 * (self.positive + self.negative)
    }

    fn contains(&self, x: f64) -> bool {
        x > self.positive.min(self.negative) && x < self.positive.max(self.negative)
    }

    fn update(&mut self, x: f64, r: f64) {
        if r >= 0.0 {
            self.positive = x;
        } else {
            self.negative = x;
        }
    }
}

fn finite(r: f64, x: f64) -> SolverResult<f64> {
    if r.is_finite() { Ok(r) } else { Err(SolverError::NonFiniteResidual(x)) }
}

fn bisect<R>(residual: &R, mut bracket: Bracket, iterations: usize) -> SolverResult<RootSolution>
where
    R: ScalarResidual + ?Sized,
{
    if iterations == 0 {
        return Err(SolverError::InvalidSetting("bisection needs at least one iteration"));
    }
    let mut x = bracket.midpoint();
    let mut r = 0.0;
    for iteration in 0..iterations {
        x = bracket.midpoint();
        r = finite(residual.value(x), x)?;
        log::trace!("bisection iteration {}: x = {:.9e}, |R| = {:.6e}", iteration, x, r.abs());
        bracket.update(x, r);
    }
    Ok(RootSolution { root: x, residual: r, iterations, function_evals: iterations + 2 })
}

fn newton<R>(residual: &R, mut bracket: Bracket, max_iterations: usize, tolerance: f64) -> SolverResult<RootSolution>
where
    R: ScalarResidual + ?Sized,
{
    let mut x = bracket.midpoint();
    for iteration in 0..max_iterations {
        let (r, slope) = residual.value_and_slope(x);
        let r = finite(r, x)?;
        log::trace!("newton iteration {}: x = {:.9e}, |R| = {:.6e}", iteration, x, r.abs());
        if r.abs() <= tolerance {
            return Ok(RootSolution { root: x, residual: r, iterations: iteration, function_evals: iteration + 3 });
        }
        bracket.update(x, r);

        let step = x - r / slope;
        x = if slope != 0.0 && step.is_finite() && bracket.contains(step) { step } else { bracket.midpoint() };
    }
    Err(SolverError::MaxIterationsExceeded(max_iterations))
}
