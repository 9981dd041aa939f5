//! Independent variables.
//!
//! # Example
//!
//! ```
//! use aerosize::models::IndepVarComp;
//! use aerosize::Shape;
//!
//! let mut comp = IndepVarComp::new(&Shape::new(&[2]));
//! comp.add_output("payload_weight", 300_000.0).add_output("crew_weight", 20_000.0);
//! assert_eq!(comp.value("crew_weight").unwrap()[[1]], 20_000.0);
//! ```

use crate::component::Interface;
use crate::{Array, Shape};

/// Outputs whose values are set by the driver rather than computed.
///
/// An `IndepVarComp` is never evaluated; its outputs keep the values given
/// here until the driver overwrites them with [`Model::set`](crate::Model::set).
#[derive(Debug, Clone)]
pub struct IndepVarComp {
    shape: Shape,
    outputs: Vec<(String, Array)>,
}

impl IndepVarComp {
    pub fn new(shape: &Shape) -> Self {
        IndepVarComp { shape: shape.clone(), outputs: Vec::new() }
    }

    /// Adds an output holding `value` at every sweep point.
    pub fn add_output(&mut self, name: &str, value: f64) -> &mut Self {
        let full = self.shape.full(value);
        self.add_output_array(name, full)
    }

    /// Adds an output with per-point values.
    pub fn add_output_array(&mut self, name: &str, value: Array) -> &mut Self {
        self.outputs.push((name.to_string(), value));
        self
    }

    pub fn value(&self, name: &str) -> Option<&Array> {
        self.outputs.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|(n, _)| n.as_str())
    }

    pub fn declare_io(&self) -> Interface {
        let mut io = Interface::new(&self.shape);
        for (name, value) in &self.outputs {
            io.add_output_with_value(name, value.iter().next().copied().unwrap_or(0.0));
        }
        io
    }
}
