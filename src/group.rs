//! Hierarchical composition of components.
//!
//! A [`Group`] holds named subsystems, each added with a [`Promotes`] policy
//! that decides which of its variable names are visible unqualified in the
//! parent's namespace. Variables that meet under the same promoted name are
//! implicitly connected; [`Group::connect`] wires names explicitly.
//!
//! Groups are plain descriptions. Nothing is resolved until
//! [`Model::setup`](crate::Model::setup) flattens the tree.

use crate::component::{ExplicitComponent, ImplicitComponent};
use crate::models::IndepVarComp;

/// Which variable names of a subsystem are lifted into the parent namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Promotes {
    /// Every variable keeps its bare name in the parent.
    All,
    /// Only the listed names are lifted.
    Names(Vec<String>),
    /// Every variable is qualified as `child.name`.
    #[default]
    None,
}

impl Promotes {
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Promotes::Names(names.into_iter().map(Into::into).collect())
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        match self {
            Promotes::All => true,
            Promotes::Names(names) => names.iter().any(|n| n == name),
            Promotes::None => false,
        }
    }
}

/// A node of the model tree.
pub enum System {
    Explicit(Box<dyn ExplicitComponent>),
    Implicit(Box<dyn ImplicitComponent>),
    /// Driver-settable values; never evaluated.
    Independent(IndepVarComp),
    Group(Group),
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            System::Explicit(_) => write!(f, "Explicit(..)"),
            System::Implicit(_) => write!(f, "Implicit(..)"),
            System::Independent(c) => f.debug_tuple("Independent").field(c).finish(),
            System::Group(g) => f.debug_tuple("Group").field(g).finish(),
        }
    }
}

/// A named child of a group.
#[derive(Debug)]
pub struct Subsystem {
    pub name: String,
    pub system: System,
    pub promotes: Promotes,
}

/// Explicit data edge between two names in a group's namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub source: String,
    pub target: String,
}

/// An ordered collection of subsystems and the connections between them.
///
/// # Examples
///
/// ```
/// use aerosize::{Group, Promotes, Shape};
/// use aerosize::models::{IndepVarComp, LinearCombinationComp};
///
/// let shape = Shape::scalar();
/// let mut inputs = IndepVarComp::new(&shape);
/// inputs.add_output("payload_weight", 4000.0);
/// inputs.add_output("crew_weight", 1000.0);
///
/// let fixed = LinearCombinationComp::new(&shape, "fixed_weight")
///     .with_term("payload_weight", 1.0)
///     .with_term("crew_weight", 1.0);
///
/// let mut group = Group::new();
/// group
///     .add_independent("inputs_comp", inputs, Promotes::All)
///     .add_component("fixed_weight_comp", fixed, Promotes::All);
/// assert_eq!(group.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct Group {
    subsystems: Vec<Subsystem>,
    connections: Vec<Connection>,
}

impl Group {
    pub fn new() -> Self {
        Group { subsystems: Vec::new(), connections: Vec::new() }
    }

    pub fn add_component<C>(&mut self, name: &str, component: C, promotes: Promotes) -> &mut Self
    where
        C: ExplicitComponent + 'static,
    {
        self.add_system(name, System::Explicit(Box::new(component)), promotes)
    }

    pub fn add_implicit<C>(&mut self, name: &str, component: C, promotes: Promotes) -> &mut Self
    where
        C: ImplicitComponent + 'static,
    {
        self.add_system(name, System::Implicit(Box::new(component)), promotes)
    }

    pub fn add_independent(&mut self, name: &str, component: IndepVarComp, promotes: Promotes) -> &mut Self {
        self.add_system(name, System::Independent(component), promotes)
    }

    pub fn add_group(&mut self, name: &str, group: Group, promotes: Promotes) -> &mut Self {
        self.add_system(name, System::Group(group), promotes)
    }

    pub fn add_system(&mut self, name: &str, system: System, promotes: Promotes) -> &mut Self {
        self.subsystems.push(Subsystem { name: name.to_string(), system, promotes });
        self
    }

    /// Connects an output name to an input name, both in this group's namespace.
    pub fn connect(&mut self, source: &str, target: &str) -> &mut Self {
        self.connections.push(Connection { source: source.to_string(), target: target.to_string() });
        self
    }

    pub fn subsystems(&self) -> &[Subsystem] {
        &self.subsystems
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub(crate) fn into_parts(self) -> (Vec<Subsystem>, Vec<Connection>) {
        (self.subsystems, self.connections)
    }

    pub fn len(&self) -> usize {
        self.subsystems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subsystems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    #[test]
    fn test_promotes_matching() {
        assert!(Promotes::All.matches("altitude"));
        assert!(!Promotes::None.matches("altitude"));

        let some = Promotes::names(["altitude", "speed"]);
        assert!(some.matches("speed"));
        assert!(!some.matches("density"));
        assert_eq!(Promotes::default(), Promotes::None);
    }

    #[test]
    fn test_group_builder() {
        let shape = Shape::scalar();
        let mut inputs = IndepVarComp::new(&shape);
        inputs.add_output("altitude", 1000.0);

        let mut inner = Group::new();
        inner.add_independent("inputs_comp", inputs, Promotes::All);

        let mut outer = Group::new();
        outer.add_group("atmosphere", inner, Promotes::None).connect("atmosphere.altitude", "h");

        assert_eq!(outer.len(), 1);
        assert_eq!(outer.connections()[0].source, "atmosphere.altitude");
        assert!(matches!(outer.subsystems()[0].system, System::Group(_)));
        assert!(!outer.is_empty());
    }
}
