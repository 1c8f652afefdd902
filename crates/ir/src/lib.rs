//! Sea-of-nodes intermediate representation for the petrel backend.

pub mod builder;
pub mod graph;
pub mod module;
pub mod node;
pub mod props;

pub use graph::{CalleeTarget, Graph, GraphState, ScratchTable, VisitedMap};
pub use module::{Entity, EntityData, FuncRef, Module, ParamAccess, Signature, Type};
pub use node::{AllocKind, Mode, Node, NodeData, NodeFlags, NodeKind, PinState, ProjKind};
pub use props::Props;
