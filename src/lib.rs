//! # Aerosize: Differentiable Aircraft Sizing Models
//!
//! A composition engine for aircraft conceptual-design models. Physics lives in
//! small *components* (pure functions with hand-derived analytic partials) that
//! are nested inside *groups*, wired together by promotion or explicit
//! connection, and assembled into a single computational graph that can be
//! evaluated and differentiated by a gradient-based driver.
//!
//! ## Example
//!
//! ```
//! use aerosize::{Group, Model, Promotes, Shape};
//! use aerosize::models::{IndepVarComp, PowerCombinationComp};
//!
//! let shape = Shape::new(&[2]);
//!
//! let mut inputs = IndepVarComp::new(&shape);
//! inputs.add_output("density", 1.225);
//! inputs.add_output("speed", 50.0);
//!
//! let q = PowerCombinationComp::new(&shape, "dynamic_pressure")
//!     .with_coeff(0.5)
//!     .with_power("density", 1.0)
//!     .with_power("speed", 2.0);
//!
//! let mut root = Group::new();
//! root.add_independent("inputs_comp", inputs, Promotes::All);
//! root.add_component("dynamic_pressure_comp", q, Promotes::All);
//!
//! let mut model = Model::setup(root, &shape).unwrap();
//! model.run_model().unwrap();
//!
//! let q = model.get("dynamic_pressure").unwrap();
//! assert!((q[[0]] - 1531.25).abs() < 1e-9);
//! ```
//!
//! ## Layers
//!
//! - **Variable layer** ([`Shape`], [`VariableRegistry`]): every quantity is an
//!   array of the model's sweep shape, stored once and addressed by [`VarId`].
//! - **Component layer** ([`component`]): the explicit and implicit component
//!   contracts with elementwise (diagonal) partial derivatives.
//! - **Graph layer** ([`group`], [`model`]): hierarchical composition, the
//!   promotion/connection resolution pass, evaluation order and total
//!   derivatives.
//! - **Physics layer** ([`models`]): atmosphere, skin friction, gross-weight
//!   sizing and constraint analysis built on the layers above.

use std::fmt;

use ndarray::{ArrayD, IxDyn};

pub mod autodiff;
pub mod blend;
pub mod component;
pub mod config;
pub mod group;
pub mod model;
pub mod models;
pub mod solvers;
pub mod units;

pub use component::{ExplicitComponent, ImplicitComponent, Interface, Partials, VarDecl, Vector};
pub use config::{AircraftConfig, AircraftType, ConfigError, EnergySource, FlightRegime, ThrustSource};
pub use group::{Connection, Group, Promotes, Subsystem, System};
pub use model::{Model, Totals};
pub use solvers::{RootFinder, SolverError};

/// Array value of a variable. Every variable in a model shares one shape.
pub type Array = ArrayD<f64>;

/// Result type for model assembly and evaluation.
pub type ModelResult<T> = Result<T, ModelError>;

// Variable Layer

/// Shape of the evaluation sweep.
///
/// The same graph is evaluated independently at every index of the shape, so a
/// shape of `(2, 3)` runs six design points through one pass.
///
/// # Examples
///
/// ```
/// use aerosize::Shape;
///
/// let shape = Shape::new(&[2, 3]);
/// assert_eq!(shape.size(), 6);
/// assert_eq!(shape.to_string(), "(2, 3)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Creates a shape from its dimension lengths.
    pub fn new(dims: &[usize]) -> Self {
        Shape(dims.to_vec())
    }

    /// A single design point.
    pub fn scalar() -> Self {
        Shape(vec![1])
    }

    /// Dimension lengths.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of sweep points.
    pub fn size(&self) -> usize {
        self.0.iter().product()
    }

    /// The `ndarray` dimension for this shape.
    pub fn ix(&self) -> IxDyn {
        IxDyn(&self.0)
    }

    /// An array of this shape filled with `value`.
    pub fn full(&self, value: f64) -> Array {
        Array::from_elem(self.ix(), value)
    }

    /// An array of this shape filled with zeros.
    pub fn zeros(&self) -> Array {
        Array::zeros(self.ix())
    }

    /// Returns true if `array` has exactly this shape.
    pub fn matches(&self, array: &Array) -> bool {
        array.shape() == self.0.as_slice()
    }

    /// Builds an array of this shape from values in logical (row-major) order.
    pub fn array_from_vec(&self, values: Vec<f64>) -> ModelResult<Array> {
        let found = values.len();
        Array::from_shape_vec(self.ix(), values).map_err(|_| ModelError::ShapeMismatch {
            variable: "<values>".to_string(),
            expected: self.clone(),
            found: Shape(vec![found]),
        })
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "({})", dims.join(", "))
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

/// Unique identifier for a variable slot in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

impl VarId {
    /// Gets the index value.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Central storage for all variable values of an assembled model.
///
/// Each variable is stored exactly once: an output owns its slot and every
/// input connected to it reads the same slot.
///
/// # Examples
///
/// ```
/// use aerosize::{Shape, VariableRegistry};
///
/// let shape = Shape::new(&[3]);
/// let mut registry = VariableRegistry::new();
/// let altitude = registry.register("altitude", shape.full(1000.0));
///
/// registry.set(altitude, shape.full(2000.0));
/// assert_eq!(registry.get(altitude)[[1]], 2000.0);
/// assert_eq!(registry.name(altitude), "altitude");
/// ```
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    values: Vec<Array>,
    names: Vec<String>,
}

impl VariableRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        VariableRegistry { values: Vec::new(), names: Vec::new() }
    }

    /// Registers a new variable and returns its ID.
    pub fn register(&mut self, name: &str, initial: Array) -> VarId {
        let id = VarId(self.values.len());
        self.values.push(initial);
        self.names.push(name.to_string());
        id
    }

    /// Gets the current value of a variable.
    pub fn get(&self, id: VarId) -> &Array {
        &self.values[id.0]
    }

    /// Sets the value of a variable.
    pub fn set(&mut self, id: VarId, value: Array) {
        self.values[id.0] = value;
    }

    /// Gets the name a variable was registered under.
    pub fn name(&self, id: VarId) -> &str {
        &self.names[id.0]
    }

    /// Returns the total number of variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// Error Layer

/// Errors raised while assembling or evaluating a model.
///
/// Assembly errors (everything up to [`ModelError::AlgebraicLoop`]) are
/// surfaced by [`Model::setup`] before any evaluation happens. Domain,
/// non-finite and solver errors are raised during evaluation and always halt
/// the current pass.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// Invalid option or parameter value
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Two children of one group share a name
    #[error("group `{group}` already has a subsystem named `{name}`")]
    DuplicateSubsystem { group: String, name: String },

    /// Subsystem or variable name is empty or contains a `.`
    #[error("invalid name `{name}`: names must be non-empty and must not contain '.'")]
    InvalidName { name: String },

    /// Variable declared twice on one component
    #[error("`{component}` declares `{name}` more than once")]
    DuplicateVariable { component: String, name: String },

    /// Array shape differs from the model's evaluation shape
    #[error("`{variable}` has shape {found}, expected {expected}")]
    ShapeMismatch { variable: String, expected: Shape, found: Shape },

    /// Two outputs promoted to the same name
    #[error("`{name}` is written by both `{first}` and `{second}`")]
    MultipleWriters { name: String, first: String, second: String },

    /// A promotes list names a variable the child does not have
    #[error("`{subsystem}` cannot promote `{name}`: no such variable")]
    UnknownPromotion { subsystem: String, name: String },

    /// An explicit connection endpoint cannot be resolved
    #[error("cannot connect `{source_name}` to `{target}`: {reason}")]
    UnresolvedConnection { source_name: String, target: String, reason: &'static str },

    /// An input is fed by more than one source
    #[error("input `{input}` is connected to both `{first}` and `{second}`")]
    MultipleSources { input: String, first: String, second: String },

    /// A required input has no connection and no promotion path
    #[error("input `{input}` is not connected and declares no default")]
    UnconnectedInput { input: String },

    /// Cycle between components not absorbed by an implicit component
    #[error("algebraic loop between components: {}", components.join(" -> "))]
    AlgebraicLoop { components: Vec<String> },

    /// Declared partial refers to a variable the component does not declare
    #[error("`{component}` declares partial d{of}/d{wrt} on an unknown variable")]
    InvalidPartialDeclaration { component: String, of: String, wrt: String },

    /// Variable name does not exist
    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String },

    /// Variable is computed by the model and cannot be set by the driver
    #[error("`{name}` is computed by the model and cannot be set")]
    NotSettable { name: String },

    /// A component wrote a partial it never declared
    #[error("`{component}` sets undeclared partial d{of}/d{wrt}")]
    UndeclaredPartial { component: String, of: String, wrt: String },

    /// Input value outside the valid domain of a formula
    #[error("numerical domain error: `{variable}` = {value} ({reason})")]
    Domain { variable: String, value: f64, reason: &'static str },

    /// A component produced NaN or infinity
    #[error("`{component}` produced non-finite `{variable}` = {value}")]
    NonFinite { component: String, variable: String, value: f64 },

    /// State Jacobian of an implicit component is singular at some point
    #[error("singular state Jacobian in `{component}` at sweep index {index}")]
    SingularJacobian { component: String, index: usize },

    /// Convergence failure inside an implicit component
    #[error("convergence error: {0}")]
    Solver(#[from] SolverError),
}

impl ModelError {
    /// Prefixes the variable of a domain error with the component path.
    pub(crate) fn in_component(self, path: &str) -> Self {
        match self {
            ModelError::Domain { variable, value, reason } => {
                ModelError::Domain { variable: format!("{}.{}", path, variable), value, reason }
            }
            ModelError::UndeclaredPartial { component, of, wrt } if component.is_empty() => {
                ModelError::UndeclaredPartial { component: path.to_string(), of, wrt }
            }
            other => other,
        }
    }
}

/// Checks that `name` can be used as a subsystem or variable name.
pub(crate) fn validate_name(name: &str) -> ModelResult<()> {
    if name.is_empty() || name.contains('.') {
        return Err(ModelError::InvalidName { name: name.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_size_and_display() {
        let shape = Shape::new(&[2, 3]);
        assert_eq!(shape.size(), 6);
        assert_eq!(shape.dims(), &[2, 3]);
        assert_eq!(format!("{}", shape), "(2, 3)");
        assert_eq!(Shape::scalar().size(), 1);
    }

    #[test]
    fn test_shape_arrays() {
        let shape = Shape::new(&[2, 2]);
        let ones = shape.full(1.0);
        assert!(shape.matches(&ones));
        assert_eq!(ones.sum(), 4.0);
        assert!(!Shape::new(&[4]).matches(&ones));

        let from_vec = shape.array_from_vec(vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(from_vec[[1, 0]], 3.0);
        assert!(shape.array_from_vec(vec![1.0]).is_err());
    }

    #[test]
    fn test_variable_registry_creation() {
        let registry = VariableRegistry::new();
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_variable_registry_shared_slot() {
        let shape = Shape::scalar();
        let mut registry = VariableRegistry::new();
        let density = registry.register("density", shape.full(1.225));
        let speed = registry.register("speed", shape.full(50.0));

        registry.set(density, shape.full(0.9));

        assert_eq!(registry.get(density)[[0]], 0.9);
        assert_eq!(registry.get(speed)[[0]], 50.0);
        assert_eq!(registry.len(), 2);
        assert_eq!(speed.index(), 1);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("gross_weight").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("wing.area").is_err());
    }

    #[test]
    fn test_domain_error_is_qualified_with_component() {
        let err = ModelError::Domain { variable: "temperature".into(), value: -1.0, reason: "must be positive" };
        match err.in_component("atmosphere.density_comp") {
            ModelError::Domain { variable, .. } => {
                assert_eq!(variable, "atmosphere.density_comp.temperature")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
