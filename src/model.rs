//! Model assembly, evaluation and total derivatives.
//!
//! [`Model::setup`] flattens a [`Group`] tree into a list of components,
//! resolves every promoted name and connection to a single registry slot,
//! and orders the components so that every producer runs before its
//! consumers. Any structural problem is reported here, before evaluation.
//!
//! [`Model::compute_totals`] chains the elementwise partials of every
//! component along the evaluation order (forward mode). Implicit components
//! contribute through the implicit-function theorem:
//! `ds/dx = -(dR/ds)^-1 dR/dx`.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use log::{debug, trace, warn};
use nalgebra::{DMatrix, DVector};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::component::{ensure_finite, ExplicitComponent, ImplicitComponent, Interface, Partials, Vector};
use crate::group::{Connection, Group, Promotes, System};
use crate::models::IndepVarComp;
use crate::{validate_name, Array, ModelError, ModelResult, Shape, VarId, VariableRegistry};

enum Kind {
    Explicit(Box<dyn ExplicitComponent>),
    Implicit(Box<dyn ImplicitComponent>),
    Independent(IndepVarComp),
}

/// A flattened component bound to its registry slots.
struct Node {
    path: String,
    kind: Kind,
    interface: Interface,
    inputs: Vec<(String, VarId)>,
    outputs: Vec<(String, VarId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Io {
    Input,
    Output,
}

/// A component variable together with its name in the current scope.
#[derive(Debug, Clone)]
struct ScopedVar {
    node: usize,
    local: String,
    io: Io,
    name: String,
}

/// An assembled, evaluable model.
///
/// # Examples
///
/// ```
/// use aerosize::{Group, Model, Promotes, Shape};
/// use aerosize::models::{IndepVarComp, PowerCombinationComp};
///
/// let shape = Shape::scalar();
/// let mut inputs = IndepVarComp::new(&shape);
/// inputs.add_output("gross_weight", 50000.0);
/// inputs.add_output("wing_loading", 2500.0);
///
/// let area = PowerCombinationComp::new(&shape, "wing_area")
///     .with_power("gross_weight", 1.0)
///     .with_power("wing_loading", -1.0);
///
/// let mut root = Group::new();
/// root.add_independent("inputs_comp", inputs, Promotes::All);
/// root.add_component("wing_area_comp", area, Promotes::All);
///
/// let mut model = Model::setup(root, &shape).unwrap();
/// model.run_model().unwrap();
/// assert!((model.get("wing_area").unwrap()[[0]] - 20.0).abs() < 1e-12);
///
/// let totals = model.compute_totals(&["wing_area"], &["wing_loading"]).unwrap();
/// let d = totals.get("wing_area", "wing_loading").unwrap()[[0]];
/// assert!((d + 20.0 / 2500.0).abs() < 1e-12);
/// ```
pub struct Model {
    shape: Shape,
    nodes: Vec<Node>,
    order: Vec<usize>,
    registry: VariableRegistry,
    names: BTreeMap<String, VarId>,
    settable: BTreeSet<String>,
    outputs: Vec<String>,
}

impl Model {
    /// Flattens, resolves and orders a group tree for evaluation at `shape`.
    pub fn setup(root: Group, shape: &Shape) -> ModelResult<Model> {
        let mut pending = Vec::new();
        let (vars, connections) = flatten(root, "", shape, &mut pending)?;

        let mut registry = VariableRegistry::new();
        let mut names = BTreeMap::new();
        let mut settable = BTreeSet::new();
        let mut outputs = Vec::new();
        let mut owners: Vec<Option<usize>> = Vec::new();
        let mut writers: HashMap<String, String> = HashMap::new();
        let mut node_inputs: Vec<Vec<(String, VarId)>> = vec![Vec::new(); pending.len()];
        let mut node_outputs: Vec<Vec<(String, VarId)>> = vec![Vec::new(); pending.len()];

        // Outputs own their slots.
        for var in vars.iter().filter(|v| v.io == Io::Output) {
            let (path, kind, interface) = &pending[var.node];
            let absolute = format!("{}.{}", path, var.local);
            if let Some(first) = writers.get(&var.name) {
                return Err(ModelError::MultipleWriters {
                    name: var.name.clone(),
                    first: first.clone(),
                    second: absolute,
                });
            }
            let initial = match kind {
                Kind::Independent(comp) => comp.value(&var.local).cloned(),
                _ => None,
            };
            if let Some(value) = initial.as_ref().filter(|v| !shape.matches(v)) {
                return Err(ModelError::ShapeMismatch {
                    variable: absolute,
                    expected: shape.clone(),
                    found: Shape::new(value.shape()),
                });
            }
            let initial = initial.unwrap_or_else(|| {
                let value = interface.outputs().iter().find(|d| d.name == var.local).map_or(1.0, |d| d.value);
                shape.full(value)
            });
            let id = registry.register(&var.name, initial);
            owners.push(Some(var.node));
            writers.insert(var.name.clone(), absolute);
            names.insert(var.name.clone(), id);
            node_outputs[var.node].push((var.local.clone(), id));
            if matches!(kind, Kind::Independent(_)) {
                settable.insert(var.name.clone());
            }
            outputs.push(var.name.clone());
        }

        // Inputs grouped by promoted name, in declaration order.
        let mut input_order: Vec<String> = Vec::new();
        let mut input_members: HashMap<String, Vec<&ScopedVar>> = HashMap::new();
        for var in vars.iter().filter(|v| v.io == Io::Input) {
            let members = input_members.entry(var.name.clone()).or_default();
            if members.is_empty() {
                input_order.push(var.name.clone());
            }
            members.push(var);
        }

        let sources = resolve_connections(&connections, &writers, &input_members)?;

        for name in &input_order {
            let members = &input_members[name];
            let id = if let Some(source) = sources.get(name) {
                names[source]
            } else if let Some(&id) = names.get(name) {
                id
            } else {
                let mut value = None;
                for member in members {
                    let (path, _, interface) = &pending[member.node];
                    let decl = interface.inputs().iter().find(|d| d.name == member.local);
                    match decl {
                        Some(d) if d.optional => {
                            if let Some(v) = value {
                                if v != d.value {
                                    warn!("inputs promoted to `{}` declare different defaults; using {}", name, v);
                                }
                            } else {
                                value = Some(d.value);
                            }
                        }
                        _ => {
                            return Err(ModelError::UnconnectedInput {
                                input: format!("{}.{}", path, member.local),
                            })
                        }
                    }
                }
                let id = registry.register(name, shape.full(value.unwrap_or(1.0)));
                owners.push(None);
                settable.insert(name.clone());
                id
            };
            names.insert(name.clone(), id);
            for member in members {
                node_inputs[member.node].push((member.local.clone(), id));
            }
        }

        let order = evaluation_order(&pending, &node_inputs, &owners)?;

        let nodes: Vec<Node> = pending
            .into_iter()
            .zip(node_inputs.into_iter().zip(node_outputs))
            .map(|((path, kind, interface), (inputs, outputs))| Node { path, kind, interface, inputs, outputs })
            .collect();

        debug!(
            "assembled model: {} components, {} variables, {} settable, shape {}",
            nodes.len(),
            registry.len(),
            settable.len(),
            shape
        );

        Ok(Model { shape: shape.clone(), nodes, order, registry, names, settable, outputs })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Sets a driver-settable variable to `value` at every sweep point.
    pub fn set(&mut self, name: &str, value: f64) -> ModelResult<()> {
        let full = self.shape.full(value);
        self.set_array(name, full)
    }

    /// Sets a driver-settable variable from an array of the model shape.
    pub fn set_array(&mut self, name: &str, value: Array) -> ModelResult<()> {
        let id = self.lookup(name)?;
        if !self.settable.contains(name) {
            return Err(ModelError::NotSettable { name: name.to_string() });
        }
        if !self.shape.matches(&value) {
            return Err(ModelError::ShapeMismatch {
                variable: name.to_string(),
                expected: self.shape.clone(),
                found: Shape::new(value.shape()),
            });
        }
        self.registry.set(id, value);
        Ok(())
    }

    /// Current value of any promoted input or output name.
    pub fn get(&self, name: &str) -> ModelResult<&Array> {
        Ok(self.registry.get(self.lookup(name)?))
    }

    /// Names the driver may set: independent outputs and unconnected inputs.
    pub fn settable_names(&self) -> Vec<&str> {
        self.settable.iter().map(String::as_str).collect()
    }

    /// Every output name, in assembly order.
    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(String::as_str).collect()
    }

    /// Component paths in evaluation order.
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].path.as_str()).collect()
    }

    fn lookup(&self, name: &str) -> ModelResult<VarId> {
        self.names.get(name).copied().ok_or_else(|| ModelError::UnknownVariable { name: name.to_string() })
    }

    /// Evaluates every component once in dependency order.
    ///
    /// Implicit components converge their own states. The pass stops at the
    /// first error; values written before the error are kept.
    pub fn run_model(&mut self) -> ModelResult<()> {
        debug!("running {} components over shape {}", self.order.len(), self.shape);
        for &index in &self.order {
            let node = &self.nodes[index];
            let inputs = gather(&self.registry, &node.inputs);
            let mut outputs = gather(&self.registry, &node.outputs);
            let result = match &node.kind {
                Kind::Independent(_) => continue,
                Kind::Explicit(component) => component.compute(&inputs, &mut outputs),
                Kind::Implicit(component) => component.solve_nonlinear(&inputs, &mut outputs),
            };
            result.map_err(|e| e.in_component(&node.path))?;

            for (local, id) in &node.outputs {
                let value = outputs.take(local)?;
                if !self.shape.matches(&value) {
                    return Err(ModelError::ShapeMismatch {
                        variable: format!("{}.{}", node.path, local),
                        expected: self.shape.clone(),
                        found: Shape::new(value.shape()),
                    });
                }
                ensure_finite(&node.path, local, &value)?;
                self.registry.set(*id, value);
            }
            trace!("evaluated {}", node.path);
        }
        Ok(())
    }

    /// Collects the partials of every evaluated component at the current point.
    fn linearize(&self) -> ModelResult<Vec<Option<Partials>>> {
        self.nodes
            .iter()
            .map(|node| -> ModelResult<Option<Partials>> {
                let mut partials = Partials::new(&node.interface).with_owner(&node.path);
                let inputs = gather(&self.registry, &node.inputs);
                let result = match &node.kind {
                    Kind::Independent(_) => return Ok(None),
                    Kind::Explicit(component) => component.compute_partials(&inputs, &mut partials),
                    Kind::Implicit(component) => {
                        let outputs = gather(&self.registry, &node.outputs);
                        component.linearize(&inputs, &outputs, &mut partials)
                    }
                };
                result.map_err(|e| e.in_component(&node.path))?;
                Ok(Some(partials))
            })
            .collect()
    }

    /// Total derivatives of `of` with respect to settable variables `wrt`.
    ///
    /// Evaluated at the current values, so [`Model::run_model`] should have
    /// been called since the last [`Model::set`]. Each block is the diagonal
    /// of an elementwise Jacobian.
    pub fn compute_totals(&self, of: &[&str], wrt: &[&str]) -> ModelResult<Totals> {
        let of_ids = of.iter().map(|name| self.lookup(name).map(|id| (*name, id))).collect::<ModelResult<Vec<_>>>()?;
        let partials = self.linearize()?;

        let mut totals = Totals::new(&self.shape);
        for &seed_name in wrt {
            let seed = self.lookup(seed_name)?;
            if !self.settable.contains(seed_name) {
                return Err(ModelError::NotSettable { name: seed_name.to_string() });
            }
            let tangents = self.propagate(seed, &partials)?;
            for &(name, id) in &of_ids {
                let block = tangents[id.0].clone().unwrap_or_else(|| self.shape.zeros());
                totals.blocks.insert((name.to_string(), seed_name.to_string()), block);
            }
        }
        Ok(totals)
    }

    /// Forward-mode tangent of every slot for a unit seed on `seed`.
    fn propagate(&self, seed: VarId, partials: &[Option<Partials>]) -> ModelResult<Vec<Option<Array>>> {
        let mut tangents: Vec<Option<Array>> = vec![None; self.registry.len()];
        tangents[seed.0] = Some(self.shape.full(1.0));

        for &index in &self.order {
            let node = &self.nodes[index];
            let Some(node_partials) = &partials[index] else { continue };
            match &node.kind {
                Kind::Independent(_) => {}
                Kind::Explicit(_) => {
                    for (of, out_id) in &node.outputs {
                        let mut total: Option<Array> = None;
                        for (wrt, in_id) in &node.inputs {
                            if let (Some(tangent), Some(d)) = (&tangents[in_id.0], node_partials.get(of, wrt)) {
                                let term = d * tangent;
                                total = Some(match total {
                                    Some(acc) => acc + term,
                                    None => term,
                                });
                            }
                        }
                        tangents[out_id.0] = total;
                    }
                }
                Kind::Implicit(_) => {
                    let states = self.state_tangents(node, node_partials, &tangents)?;
                    for ((_, id), tangent) in node.outputs.iter().zip(states) {
                        tangents[id.0] = tangent;
                    }
                }
            }
        }
        Ok(tangents)
    }

    /// Solves `dR/ds ds = -dR/dx dx` pointwise for an implicit component.
    fn state_tangents(&self, node: &Node, partials: &Partials, tangents: &[Option<Array>]) -> ModelResult<Vec<Option<Array>>> {
        let m = node.outputs.len();
        let size = self.shape.size();

        let mut rhs: Vec<Option<Array>> = vec![None; m];
        for (i, (residual, _)) in node.outputs.iter().enumerate() {
            for (wrt, in_id) in &node.inputs {
                if let (Some(tangent), Some(d)) = (&tangents[in_id.0], partials.get(residual, wrt)) {
                    let term = -(d * tangent);
                    rhs[i] = Some(match rhs[i].take() {
                        Some(acc) => acc + term,
                        None => term,
                    });
                }
            }
        }
        if rhs.iter().all(Option::is_none) {
            return Ok(vec![None; m]);
        }

        let flat = |a: Option<&Array>| a.map(|a| a.iter().copied().collect::<Vec<f64>>());
        let rhs: Vec<Vec<f64>> = rhs.iter().map(|r| flat(r.as_ref()).unwrap_or_else(|| vec![0.0; size])).collect();
        let jacobian: Vec<Vec<Option<Vec<f64>>>> = node
            .outputs
            .iter()
            .map(|(residual, _)| node.outputs.iter().map(|(state, _)| flat(partials.get(residual, state))).collect())
            .collect();

        let mut solved = vec![vec![0.0; size]; m];
        for k in 0..size {
            let a = DMatrix::from_fn(m, m, |i, j| jacobian[i][j].as_ref().map_or(0.0, |v| v[k]));
            let b = DVector::from_fn(m, |i, _| rhs[i][k]);
            let ds = a
                .lu()
                .solve(&b)
                .filter(|ds| ds.iter().all(|v| v.is_finite()))
                .ok_or_else(|| ModelError::SingularJacobian { component: node.path.clone(), index: k })?;
            for (i, value) in ds.iter().enumerate() {
                solved[i][k] = *value;
            }
        }

        solved.into_iter().map(|values| self.shape.array_from_vec(values).map(Some)).collect()
    }
}

/// Diagonal blocks of a total-derivative Jacobian, keyed by `(of, wrt)`.
#[derive(Debug, Clone)]
pub struct Totals {
    shape: Shape,
    blocks: BTreeMap<(String, String), Array>,
}

impl Totals {
    fn new(shape: &Shape) -> Self {
        Totals { shape: shape.clone(), blocks: BTreeMap::new() }
    }

    pub fn get(&self, of: &str, wrt: &str) -> Option<&Array> {
        self.blocks.get(&(of.to_string(), wrt.to_string()))
    }

    /// Assembles the full Jacobian, one `n x n` diagonal block per pair.
    ///
    /// Rows run over `of` then sweep index; columns over `wrt` then sweep index.
    pub fn to_dense(&self, of: &[&str], wrt: &[&str]) -> DMatrix<f64> {
        let n = self.shape.size();
        let mut dense = DMatrix::zeros(of.len() * n, wrt.len() * n);
        for (i, of_name) in of.iter().enumerate() {
            for (j, wrt_name) in wrt.iter().enumerate() {
                if let Some(block) = self.get(of_name, wrt_name) {
                    for (k, value) in block.iter().enumerate() {
                        dense[(i * n + k, j * n + k)] = *value;
                    }
                }
            }
        }
        dense
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn gather(registry: &VariableRegistry, bindings: &[(String, VarId)]) -> Vector {
    let mut vector = Vector::new();
    for (local, id) in bindings {
        vector.insert(local, registry.get(*id).clone());
    }
    vector
}

type Pending = (String, Kind, Interface);

/// Flattens `group` into `pending`, returning its variables and connections
/// with names in the group's own namespace.
fn flatten(
    group: Group,
    path: &str,
    shape: &Shape,
    pending: &mut Vec<Pending>,
) -> ModelResult<(Vec<ScopedVar>, Vec<Connection>)> {
    let (subsystems, own_connections) = group.into_parts();
    let mut vars = Vec::new();
    let mut connections = Vec::new();
    let mut seen = BTreeSet::new();

    for subsystem in subsystems {
        validate_name(&subsystem.name)?;
        if !seen.insert(subsystem.name.clone()) {
            return Err(ModelError::DuplicateSubsystem {
                group: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
                name: subsystem.name,
            });
        }
        let child_path = if path.is_empty() { subsystem.name.clone() } else { format!("{}.{}", path, subsystem.name) };

        let (child_vars, child_connections) = match subsystem.system {
            System::Group(inner) => flatten(inner, &child_path, shape, pending)?,
            System::Explicit(component) => {
                let interface = component.declare_io();
                interface.validate(&child_path, false)?;
                leaf(child_path.clone(), Kind::Explicit(component), interface, shape, pending)?
            }
            System::Implicit(component) => {
                let interface = component.declare_io();
                interface.validate(&child_path, true)?;
                leaf(child_path.clone(), Kind::Implicit(component), interface, shape, pending)?
            }
            System::Independent(component) => {
                let interface = component.declare_io();
                interface.validate(&child_path, false)?;
                leaf(child_path.clone(), Kind::Independent(component), interface, shape, pending)?
            }
        };

        if let Promotes::Names(listed) = &subsystem.promotes {
            for name in listed {
                if !child_vars.iter().any(|v| &v.name == name) {
                    return Err(ModelError::UnknownPromotion { subsystem: child_path, name: name.clone() });
                }
            }
        }

        let lift = |name: &str| {
            if subsystem.promotes.matches(name) {
                name.to_string()
            } else {
                format!("{}.{}", subsystem.name, name)
            }
        };
        vars.extend(child_vars.into_iter().map(|v| ScopedVar { name: lift(&v.name), ..v }));
        connections.extend(
            child_connections.into_iter().map(|c| Connection { source: lift(&c.source), target: lift(&c.target) }),
        );
    }

    connections.extend(own_connections);
    Ok((vars, connections))
}

fn leaf(
    path: String,
    kind: Kind,
    interface: Interface,
    shape: &Shape,
    pending: &mut Vec<Pending>,
) -> ModelResult<(Vec<ScopedVar>, Vec<Connection>)> {
    if interface.shape() != shape {
        return Err(ModelError::ShapeMismatch { variable: path, expected: shape.clone(), found: interface.shape().clone() });
    }
    let node = pending.len();
    let scoped = |decl: &crate::VarDecl, io| ScopedVar { node, local: decl.name.clone(), io, name: decl.name.clone() };
    let mut vars: Vec<ScopedVar> = interface.inputs().iter().map(|d| scoped(d, Io::Input)).collect();
    vars.extend(interface.outputs().iter().map(|d| scoped(d, Io::Output)));
    pending.push((path, kind, interface));
    Ok((vars, Vec::new()))
}

/// Maps each explicitly connected input name to its source output name.
fn resolve_connections(
    connections: &[Connection],
    writers: &HashMap<String, String>,
    inputs: &HashMap<String, Vec<&ScopedVar>>,
) -> ModelResult<HashMap<String, String>> {
    let mut sources: HashMap<String, String> = HashMap::new();
    for connection in connections {
        let unresolved = |reason| ModelError::UnresolvedConnection {
            source_name: connection.source.clone(),
            target: connection.target.clone(),
            reason,
        };
        if !writers.contains_key(&connection.source) {
            return Err(unresolved("source is not an output"));
        }
        if !inputs.contains_key(&connection.target) {
            let reason = if writers.contains_key(&connection.target) { "target is an output" } else { "target is not an input" };
            return Err(unresolved(reason));
        }
        if let Some(writer) = writers.get(&connection.target) {
            return Err(ModelError::MultipleSources {
                input: connection.target.clone(),
                first: writer.clone(),
                second: connection.source.clone(),
            });
        }
        if let Some(previous) = sources.insert(connection.target.clone(), connection.source.clone()) {
            return Err(ModelError::MultipleSources {
                input: connection.target.clone(),
                first: previous,
                second: connection.source.clone(),
            });
        }
    }
    Ok(sources)
}

/// Orders components so producers precede consumers (Kahn's algorithm).
fn evaluation_order(pending: &[Pending], node_inputs: &[Vec<(String, VarId)>], owners: &[Option<usize>]) -> ModelResult<Vec<usize>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let indices: Vec<NodeIndex> = (0..pending.len()).map(|i| graph.add_node(i)).collect();

    for (consumer, inputs) in node_inputs.iter().enumerate() {
        for (_, id) in inputs {
            let Some(producer) = owners[id.0] else { continue };
            if producer == consumer {
                if matches!(pending[consumer].1, Kind::Implicit(_)) {
                    continue;
                }
                return Err(ModelError::AlgebraicLoop { components: vec![pending[consumer].0.clone()] });
            }
            graph.update_edge(indices[producer], indices[consumer], ());
        }
    }

    let mut in_degree: Vec<usize> =
        graph.node_indices().map(|n| graph.neighbors_directed(n, Direction::Incoming).count()).collect();
    let mut queue: VecDeque<NodeIndex> = graph.node_indices().filter(|n| in_degree[n.index()] == 0).collect();
    let mut order = Vec::with_capacity(pending.len());

    while let Some(node) = queue.pop_front() {
        order.push(graph[node]);
        let mut successors: Vec<NodeIndex> = graph.neighbors_directed(node, Direction::Outgoing).collect();
        successors.sort();
        for successor in successors {
            in_degree[successor.index()] -= 1;
            if in_degree[successor.index()] == 0 {
                queue.push_back(successor);
            }
        }
    }

    if order.len() < pending.len() {
        let mut components: Vec<String> = tarjan_scc(&graph)
            .into_iter()
            .find(|scc| scc.len() > 1)
            .map(|scc| {
                let mut members: Vec<usize> = scc.iter().map(|n| graph[*n]).collect();
                members.sort_unstable();
                members.into_iter().map(|i| pending[i].0.clone()).collect()
            })
            .unwrap_or_default();
        if components.is_empty() {
            components.push("<unknown>".to_string());
        }
        return Err(ModelError::AlgebraicLoop { components });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndepVarComp, LinearCombinationComp, PowerCombinationComp};

    fn scalar_inputs(values: &[(&str, f64)]) -> IndepVarComp {
        let mut comp = IndepVarComp::new(&Shape::scalar());
        for (name, value) in values {
            comp.add_output(name, *value);
        }
        comp
    }

    fn sum(out: &str, terms: &[&str]) -> LinearCombinationComp {
        terms.iter().fold(LinearCombinationComp::new(&Shape::scalar(), out), |c, t| c.with_term(t, 1.0))
    }

    #[test]
    fn test_promoted_names_share_a_slot() {
        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("a", 2.0), ("b", 3.0)]), Promotes::All)
            .add_component("sum_comp", sum("c", &["a", "b"]), Promotes::All)
            .add_component("double_comp", sum("d", &["c", "c2"]), Promotes::names(["d"]))
            .connect("c", "double_comp.c")
            .connect("c", "double_comp.c2");

        let mut model = Model::setup(root, &Shape::scalar()).unwrap();
        model.run_model().unwrap();

        assert_eq!(model.get("c").unwrap()[[0]], 5.0);
        assert_eq!(model.get("double_comp.c").unwrap()[[0]], 5.0);
        assert_eq!(model.get("d").unwrap()[[0]], 10.0);
        assert_eq!(model.evaluation_order(), vec!["inputs_comp", "sum_comp", "double_comp"]);
    }

    #[test]
    fn test_order_follows_data_not_insertion() {
        let mut root = Group::new();
        root.add_component("second", sum("y", &["x"]), Promotes::All)
            .add_component("first", sum("x", &["w"]), Promotes::All)
            .add_independent("inputs_comp", scalar_inputs(&[("w", 4.0)]), Promotes::All);

        let mut model = Model::setup(root, &Shape::scalar()).unwrap();
        model.run_model().unwrap();
        assert_eq!(model.get("y").unwrap()[[0]], 4.0);
        assert_eq!(model.evaluation_order(), vec!["inputs_comp", "first", "second"]);
    }

    #[test]
    fn test_nested_group_qualification() {
        let mut inner = Group::new();
        inner.add_component("sum_comp", sum("total", &["a"]), Promotes::All);

        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("a", 7.0)]), Promotes::All)
            .add_group("weights", inner, Promotes::None)
            .connect("a", "weights.a");

        let mut model = Model::setup(root, &Shape::scalar()).unwrap();
        model.run_model().unwrap();
        assert_eq!(model.get("weights.total").unwrap()[[0]], 7.0);
        assert!(model.get("total").is_err());
    }

    #[test]
    fn test_multiple_writers_rejected() {
        let mut root = Group::new();
        root.add_independent("a_comp", scalar_inputs(&[("x", 1.0)]), Promotes::All)
            .add_independent("b_comp", scalar_inputs(&[("x", 2.0)]), Promotes::All);
        assert!(matches!(Model::setup(root, &Shape::scalar()), Err(ModelError::MultipleWriters { .. })));
    }

    #[test]
    fn test_unconnected_input_rejected() {
        let mut root = Group::new();
        root.add_component("sum_comp", sum("y", &["x"]), Promotes::All);
        match Model::setup(root, &Shape::scalar()) {
            Err(ModelError::UnconnectedInput { input }) => assert_eq!(input, "sum_comp.x"),
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_promotion_and_connection_conflict() {
        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("x", 1.0), ("z", 2.0)]), Promotes::All)
            .add_component("sum_comp", sum("y", &["x"]), Promotes::All)
            .connect("z", "x");
        assert!(matches!(Model::setup(root, &Shape::scalar()), Err(ModelError::MultipleSources { .. })));
    }

    #[test]
    fn test_bad_connections() {
        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("x", 1.0)]), Promotes::All)
            .add_component("sum_comp", sum("y", &["x"]), Promotes::All)
            .connect("missing", "x");
        assert!(matches!(Model::setup(root, &Shape::scalar()), Err(ModelError::UnresolvedConnection { .. })));

        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("x", 1.0)]), Promotes::All)
            .add_component("sum_comp", sum("y", &["x"]), Promotes::All)
            .connect("x", "y");
        assert!(matches!(
            Model::setup(root, &Shape::scalar()),
            Err(ModelError::UnresolvedConnection { reason: "target is an output", .. })
        ));
    }

    #[test]
    fn test_unknown_promotion_and_duplicates() {
        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("x", 1.0)]), Promotes::names(["y"]));
        assert!(matches!(Model::setup(root, &Shape::scalar()), Err(ModelError::UnknownPromotion { .. })));

        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("x", 1.0)]), Promotes::None)
            .add_independent("inputs_comp", scalar_inputs(&[("y", 1.0)]), Promotes::None);
        assert!(matches!(Model::setup(root, &Shape::scalar()), Err(ModelError::DuplicateSubsystem { .. })));
    }

    #[test]
    fn test_algebraic_loop_names_members() {
        let mut root = Group::new();
        root.add_component("a_comp", sum("a", &["b"]), Promotes::All)
            .add_component("b_comp", sum("b", &["a"]), Promotes::All);
        match Model::setup(root, &Shape::scalar()) {
            Err(ModelError::AlgebraicLoop { components }) => assert_eq!(components, vec!["a_comp", "b_comp"]),
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("x", 1.0)]), Promotes::All);
        assert!(matches!(Model::setup(root, &Shape::new(&[3])), Err(ModelError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_set_only_settable() {
        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("x", 1.0)]), Promotes::All)
            .add_component("sum_comp", sum("y", &["x"]), Promotes::All);
        let mut model = Model::setup(root, &Shape::scalar()).unwrap();

        assert!(model.set("x", 3.0).is_ok());
        assert!(matches!(model.set("y", 3.0), Err(ModelError::NotSettable { .. })));
        assert!(matches!(model.set("nope", 3.0), Err(ModelError::UnknownVariable { .. })));
        assert!(matches!(model.set_array("x", Shape::new(&[2]).full(1.0)), Err(ModelError::ShapeMismatch { .. })));
        assert_eq!(model.settable_names(), vec!["x"]);
        assert_eq!(model.output_names(), vec!["x", "y"]);
    }

    #[test]
    fn test_chain_rule_totals() {
        // z = (x + y)^2, dz/dx = 2 (x + y)
        let shape = Shape::new(&[2]);
        let mut inputs = IndepVarComp::new(&shape);
        inputs.add_output_array("x", shape.array_from_vec(vec![1.0, 2.0]).unwrap());
        inputs.add_output("y", 3.0);

        let mut root = Group::new();
        root.add_independent("inputs_comp", inputs, Promotes::All)
            .add_component(
                "s_comp",
                LinearCombinationComp::new(&shape, "s").with_term("x", 1.0).with_term("y", 1.0),
                Promotes::All,
            )
            .add_component("z_comp", PowerCombinationComp::new(&shape, "z").with_power("s", 2.0), Promotes::All);

        let mut model = Model::setup(root, &shape).unwrap();
        model.run_model().unwrap();
        let totals = model.compute_totals(&["z", "s"], &["x", "y"]).unwrap();

        let dz_dx = totals.get("z", "x").unwrap();
        assert!((dz_dx[[0]] - 8.0).abs() < 1e-12);
        assert!((dz_dx[[1]] - 10.0).abs() < 1e-12);

        let dense = totals.to_dense(&["z", "s"], &["x", "y"]);
        assert_eq!(dense.shape(), (4, 4));
        assert!((dense[(1, 1)] - 10.0).abs() < 1e-12);
        assert_eq!(dense[(0, 1)], 0.0);
        assert_eq!(dense[(2, 2)], 1.0);

        assert!(matches!(model.compute_totals(&["z"], &["s"]), Err(ModelError::NotSettable { .. })));
    }

    #[test]
    fn test_domain_error_names_component() {
        let mut root = Group::new();
        root.add_independent("inputs_comp", scalar_inputs(&[("x", 0.0)]), Promotes::All)
            .add_component("inverse_comp", PowerCombinationComp::new(&Shape::scalar(), "y").with_power("x", -1.0), Promotes::All);
        let mut model = Model::setup(root, &Shape::scalar()).unwrap();
        match model.run_model() {
            Err(ModelError::Domain { variable, .. }) => assert_eq!(variable, "inverse_comp.x"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
