//! Component contracts.
//!
//! Components are the leaves of a model. An [`ExplicitComponent`] maps inputs
//! to outputs and supplies analytic partials; an [`ImplicitComponent`] owns
//! state outputs defined by residual equations. All partials are elementwise:
//! output index `k` depends only on input index `k`, so a partial is stored as
//! an array of the sweep shape holding the diagonal.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Index;

use crate::{validate_name, Array, ModelError, ModelResult, Shape};

/// A declared input or output.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    /// Initial value for outputs, fallback value for optional inputs.
    pub value: f64,
    /// Optional inputs may be left unconnected and then read `value`.
    pub optional: bool,
}

/// Variables and partial pairs declared by a component.
///
/// # Examples
///
/// ```
/// use aerosize::{Interface, Shape};
///
/// let mut io = Interface::new(&Shape::scalar());
/// io.add_input("temperature")
///     .add_input("pressure")
///     .add_output("density")
///     .declare_partials("density", "temperature")
///     .declare_partials("density", "pressure");
///
/// assert!(io.is_declared("density", "pressure"));
/// assert!(!io.is_declared("pressure", "density"));
/// ```
#[derive(Debug, Clone)]
pub struct Interface {
    shape: Shape,
    inputs: Vec<VarDecl>,
    outputs: Vec<VarDecl>,
    partials: Vec<(String, String)>,
}

impl Interface {
    pub fn new(shape: &Shape) -> Self {
        Interface { shape: shape.clone(), inputs: Vec::new(), outputs: Vec::new(), partials: Vec::new() }
    }

    /// Declares a required input.
    pub fn add_input(&mut self, name: &str) -> &mut Self {
        self.inputs.push(VarDecl { name: name.to_string(), value: 1.0, optional: false });
        self
    }

    /// Declares an input that reads `value` when nothing feeds it.
    pub fn add_input_with_default(&mut self, name: &str, value: f64) -> &mut Self {
        self.inputs.push(VarDecl { name: name.to_string(), value, optional: true });
        self
    }

    /// Declares an output initialised to 1.
    pub fn add_output(&mut self, name: &str) -> &mut Self {
        self.add_output_with_value(name, 1.0)
    }

    /// Declares an output with an explicit initial value.
    ///
    /// For implicit components the initial value seeds the nonlinear solve.
    pub fn add_output_with_value(&mut self, name: &str, value: f64) -> &mut Self {
        self.outputs.push(VarDecl { name: name.to_string(), value, optional: false });
        self
    }

    /// Declares that `of` depends on `wrt` elementwise.
    pub fn declare_partials(&mut self, of: &str, wrt: &str) -> &mut Self {
        self.partials.push((of.to_string(), wrt.to_string()));
        self
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn inputs(&self) -> &[VarDecl] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[VarDecl] {
        &self.outputs
    }

    pub fn partials(&self) -> &[(String, String)] {
        &self.partials
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|v| v.name == name)
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|v| v.name == name)
    }

    pub fn is_declared(&self, of: &str, wrt: &str) -> bool {
        self.partials.iter().any(|(o, w)| o == of && w == wrt)
    }

    /// Checks names and partial declarations of a component at `path`.
    ///
    /// `states_as_wrt` allows outputs as the `wrt` side of a partial, which
    /// implicit components need for residual-state derivatives.
    pub(crate) fn validate(&self, path: &str, states_as_wrt: bool) -> ModelResult<()> {
        let mut seen = BTreeSet::new();
        for decl in self.inputs.iter().chain(self.outputs.iter()) {
            validate_name(&decl.name)?;
            if !seen.insert(decl.name.as_str()) {
                return Err(ModelError::DuplicateVariable { component: path.to_string(), name: decl.name.clone() });
            }
        }
        for (of, wrt) in &self.partials {
            let wrt_ok = self.has_input(wrt) || (states_as_wrt && self.has_output(wrt));
            if !self.has_output(of) || !wrt_ok {
                return Err(ModelError::InvalidPartialDeclaration {
                    component: path.to_string(),
                    of: of.clone(),
                    wrt: wrt.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Named arrays passed into and out of a component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vector {
    values: BTreeMap<String, Array>,
}

impl Vector {
    pub fn new() -> Self {
        Vector { values: BTreeMap::new() }
    }

    /// Adds or replaces a named array without any checks.
    pub fn insert(&mut self, name: &str, value: Array) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> ModelResult<&Array> {
        self.values.get(name).ok_or_else(|| ModelError::UnknownVariable { name: name.to_string() })
    }

    /// Overwrites an existing entry, keeping its shape.
    pub fn set(&mut self, name: &str, value: Array) -> ModelResult<()> {
        let slot =
            self.values.get_mut(name).ok_or_else(|| ModelError::UnknownVariable { name: name.to_string() })?;
        if slot.shape() != value.shape() {
            return Err(ModelError::ShapeMismatch {
                variable: name.to_string(),
                expected: Shape::new(slot.shape()),
                found: Shape::new(value.shape()),
            });
        }
        *slot = value;
        Ok(())
    }

    pub(crate) fn take(&mut self, name: &str) -> ModelResult<Array> {
        self.values.remove(name).ok_or_else(|| ModelError::UnknownVariable { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Array)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Shorthand for [`Vector::get`] in tests and examples.
///
/// # Panics
///
/// Panics if no variable named `name` is stored; use [`Vector::get`] for a
/// fallible lookup.
impl Index<&str> for Vector {
    type Output = Array;

    fn index(&self, name: &str) -> &Array {
        match self.values.get(name) {
            Some(value) => value,
            None => panic!("no variable named `{}`", name),
        }
    }
}

/// Diagonal partial derivatives written by a component.
///
/// Only pairs declared in the component's [`Interface`] may be set. Undeclared
/// pairs are structurally zero.
#[derive(Debug, Clone)]
pub struct Partials {
    owner: String,
    shape: Shape,
    declared: BTreeSet<(String, String)>,
    values: BTreeMap<(String, String), Array>,
}

impl Partials {
    pub fn new(interface: &Interface) -> Self {
        Partials {
            owner: String::new(),
            shape: interface.shape().clone(),
            declared: interface.partials().iter().cloned().collect(),
            values: BTreeMap::new(),
        }
    }

    pub(crate) fn with_owner(mut self, owner: &str) -> Self {
        self.owner = owner.to_string();
        self
    }

    /// Sets the diagonal of d`of`/d`wrt`.
    pub fn set(&mut self, of: &str, wrt: &str, value: Array) -> ModelResult<()> {
        let key = (of.to_string(), wrt.to_string());
        if !self.declared.contains(&key) {
            return Err(ModelError::UndeclaredPartial {
                component: self.owner.clone(),
                of: key.0,
                wrt: key.1,
            });
        }
        if !self.shape.matches(&value) {
            return Err(ModelError::ShapeMismatch {
                variable: format!("d{}/d{}", of, wrt),
                expected: self.shape.clone(),
                found: Shape::new(value.shape()),
            });
        }
        self.values.insert(key, value);
        Ok(())
    }

    /// Sets a partial that is the same constant at every sweep point.
    pub fn set_constant(&mut self, of: &str, wrt: &str, value: f64) -> ModelResult<()> {
        let full = self.shape.full(value);
        self.set(of, wrt, full)
    }

    pub fn get(&self, of: &str, wrt: &str) -> Option<&Array> {
        self.values.get(&(of.to_string(), wrt.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &Array)> {
        self.values.iter().map(|((of, wrt), v)| (of.as_str(), wrt.as_str(), v))
    }
}

/// A component whose outputs are explicit functions of its inputs.
///
/// `compute` fills every declared output; `compute_partials` fills every
/// declared partial. Both must be pure: identical inputs give bit-identical
/// results.
pub trait ExplicitComponent {
    fn declare_io(&self) -> Interface;

    fn compute(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()>;

    fn compute_partials(&self, inputs: &Vector, partials: &mut Partials) -> ModelResult<()>;
}

/// A component whose outputs (states) are defined by residual equations
/// `R(inputs, states) = 0`.
///
/// `linearize` supplies partials of each residual (named like its state) with
/// respect to inputs and states.
pub trait ImplicitComponent {
    fn declare_io(&self) -> Interface;

    fn apply_nonlinear(&self, inputs: &Vector, outputs: &Vector, residuals: &mut Vector) -> ModelResult<()>;

    /// Drives the residuals to zero, overwriting `outputs` with the states.
    fn solve_nonlinear(&self, inputs: &Vector, outputs: &mut Vector) -> ModelResult<()>;

    fn linearize(&self, inputs: &Vector, outputs: &Vector, partials: &mut Partials) -> ModelResult<()>;
}

/// Fails with a domain error if any element of `values` is not strictly positive.
pub fn ensure_positive(name: &str, values: &Array) -> ModelResult<()> {
    match values.iter().find(|v| !(**v > 0.0)) {
        Some(&value) => Err(ModelError::Domain { variable: name.to_string(), value, reason: "must be positive" }),
        None => Ok(()),
    }
}

/// Fails with a domain error if any element of `values` is zero.
pub fn ensure_nonzero(name: &str, values: &Array) -> ModelResult<()> {
    match values.iter().find(|v| **v == 0.0) {
        Some(&value) => Err(ModelError::Domain { variable: name.to_string(), value, reason: "must be nonzero" }),
        None => Ok(()),
    }
}

/// Fails if any element of an output is NaN or infinite.
pub(crate) fn ensure_finite(component: &str, name: &str, values: &Array) -> ModelResult<()> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(&value) => Err(ModelError::NonFinite {
            component: component.to_string(),
            variable: name.to_string(),
            value,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drag_interface() -> Interface {
        let mut io = Interface::new(&Shape::new(&[2]));
        io.add_input("dynamic_pressure")
            .add_input_with_default("wing_area", 20.0)
            .add_output("drag")
            .declare_partials("drag", "dynamic_pressure")
            .declare_partials("drag", "wing_area");
        io
    }

    #[test]
    fn test_interface_declarations() {
        let io = drag_interface();
        assert_eq!(io.inputs().len(), 2);
        assert!(io.inputs()[1].optional);
        assert_eq!(io.inputs()[1].value, 20.0);
        assert!(io.has_output("drag"));
        assert!(io.validate("drag_comp", false).is_ok());
    }

    #[test]
    fn test_interface_rejects_duplicate_and_dotted_names() {
        let mut io = Interface::new(&Shape::scalar());
        io.add_input("x").add_output("x");
        assert!(matches!(io.validate("comp", false), Err(ModelError::DuplicateVariable { .. })));

        let mut io = Interface::new(&Shape::scalar());
        io.add_input("wing.area");
        assert!(matches!(io.validate("comp", false), Err(ModelError::InvalidName { .. })));
    }

    #[test]
    fn test_interface_rejects_partial_on_unknown_variable() {
        let mut io = Interface::new(&Shape::scalar());
        io.add_input("x").add_output("y").declare_partials("y", "z");
        assert!(matches!(io.validate("comp", false), Err(ModelError::InvalidPartialDeclaration { .. })));

        let mut io = Interface::new(&Shape::scalar());
        io.add_input("x").add_output("y").declare_partials("y", "y");
        assert!(io.validate("comp", false).is_err());
        assert!(io.validate("comp", true).is_ok());
    }

    #[test]
    fn test_vector_set_checks_shape() {
        let shape = Shape::new(&[2]);
        let mut v = Vector::new();
        v.insert("lift", shape.full(1.0));

        assert!(v.set("lift", shape.full(3.0)).is_ok());
        assert_eq!(v["lift"][[1]], 3.0);
        assert!(matches!(v.set("lift", Shape::new(&[3]).full(1.0)), Err(ModelError::ShapeMismatch { .. })));
        assert!(matches!(v.set("drag", shape.full(1.0)), Err(ModelError::UnknownVariable { .. })));
    }

    #[test]
    #[should_panic(expected = "no variable named `lift`")]
    fn test_index_panics_on_missing_name() {
        let mut v = Vector::new();
        v.insert("drag", Shape::new(&[2]).full(1.0));
        assert_eq!(v["drag"][[1]], 1.0);
        let _ = &v["lift"];
    }

    #[test]
    fn test_partials_only_accept_declared_pairs() {
        let io = drag_interface();
        let mut partials = Partials::new(&io).with_owner("drag_comp");

        assert!(partials.set_constant("drag", "wing_area", 2.0).is_ok());
        assert_eq!(partials.get("drag", "wing_area").unwrap()[[0]], 2.0);

        match partials.set_constant("drag", "lift", 1.0) {
            Err(ModelError::UndeclaredPartial { component, .. }) => assert_eq!(component, "drag_comp"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(partials.get("drag", "dynamic_pressure").is_none());
    }

    #[test]
    fn test_domain_guards() {
        let shape = Shape::new(&[3]);
        let mut values = shape.full(1.0);
        assert!(ensure_positive("x", &values).is_ok());
        values[[2]] = 0.0;
        assert!(matches!(ensure_positive("x", &values), Err(ModelError::Domain { value, .. }) if value == 0.0));
        assert!(ensure_nonzero("x", &values).is_err());
        values[[2]] = f64::NAN;
        assert!(ensure_positive("x", &values).is_err());
        assert!(ensure_finite("comp", "x", &values).is_err());
    }
}
