//! Whole-program containers: entities, signatures and their graphs.

use cranelift_entity::{entity_impl, packed_option::PackedOption, PrimaryMap};
use smol_str::SmolStr;

use crate::graph::Graph;
use crate::node::Mode;
use crate::props::Props;

/// An opaque reference to a defined procedure graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FuncRef(u32);
entity_impl!(FuncRef, "func");

/// An opaque reference to a callable entity. Every procedure, defined or
/// external, is an entity; only defined ones also own a [`Graph`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u32);
entity_impl!(Entity, "ent");

/// Parameter and result types, reduced to what the analyses distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Flt,
    Ptr,
    /// A compound value, passed around as a pointer into memory.
    Aggregate,
}

impl Type {
    pub fn is_aggregate(self) -> bool {
        self == Type::Aggregate
    }

    pub fn mode(self) -> Mode {
        match self {
            Type::Int => Mode::Int,
            Type::Flt => Mode::Flt,
            Type::Ptr | Type::Aggregate => Mode::Ptr,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
}

impl Signature {
    pub fn new(params: &[Type], results: &[Type]) -> Self {
        Self {
            params: params.to_vec(),
            results: results.to_vec(),
        }
    }
}

bitflags::bitflags! {
    /// How a callee treats a pointer parameter, as far as argument analysis
    /// could tell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParamAccess: u8 {
        const READ = 1 << 0;
        /// The parameter may be stored somewhere that outlives the call.
        const STORE = 1 << 1;
    }
}

impl Default for ParamAccess {
    /// Without analysis results everything must be assumed.
    fn default() -> Self {
        ParamAccess::all()
    }
}

#[derive(Debug, Clone)]
pub struct EntityData {
    pub name: SmolStr,
    pub sig: Signature,
    /// The graph implementing this entity, absent for external declarations.
    pub graph: PackedOption<FuncRef>,
    /// Property word; authoritative for external entities. For defined
    /// entities the graph's word is consulted instead.
    pub props: Props,
    /// Per-parameter access summary, one entry per parameter.
    pub param_access: Vec<ParamAccess>,
}

/// A program: all entities and the graphs of the defined ones.
#[derive(Default)]
pub struct Module {
    pub entities: PrimaryMap<Entity, EntityData>,
    pub graphs: PrimaryMap<FuncRef, Graph>,
    /// Whether the program is known in its entirety; enables indirect-call
    /// reasoning over consistent callee information.
    pub closed_world: bool,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an external entity with the given authoritative properties.
    pub fn declare_function(&mut self, name: &str, sig: Signature, props: Props) -> Entity {
        let param_access = vec![ParamAccess::default(); sig.params.len()];
        self.entities.push(EntityData {
            name: name.into(),
            sig,
            graph: None.into(),
            props,
            param_access,
        })
    }

    /// Define a procedure: creates the entity and an empty graph for it.
    pub fn define_function(&mut self, name: &str, sig: Signature) -> (Entity, FuncRef) {
        let param_access = vec![ParamAccess::default(); sig.params.len()];
        let entity = self.entities.push(EntityData {
            name: name.into(),
            sig: sig.clone(),
            graph: None.into(),
            props: Props::empty(),
            param_access,
        });
        let func = self.graphs.push(Graph::new(entity, &sig));
        self.entities[entity].graph = func.into();
        (entity, func)
    }

    pub fn funcs(&self) -> Vec<FuncRef> {
        self.graphs.keys().collect()
    }

    /// The property word of an entity: the graph's word when the entity is
    /// defined, the declared word otherwise.
    pub fn entity_props(&self, entity: Entity) -> Props {
        match self.entities[entity].graph.expand() {
            Some(func) => self.graphs[func].props(),
            None => self.entities[entity].props,
        }
    }

    pub fn graph_props(&self, func: FuncRef) -> Props {
        self.graphs[func].props()
    }

    /// Add properties to a graph. Commits are add-only; repeated analyses can
    /// only ever grow the recognized set.
    pub fn add_graph_props(&mut self, func: FuncRef, props: Props) {
        self.graphs[func].add_props(props);
    }

    pub fn set_param_access(&mut self, entity: Entity, access: &[ParamAccess]) {
        assert_eq!(access.len(), self.entities[entity].sig.params.len());
        self.entities[entity].param_access = access.to_vec();
    }
}
