//! Node vocabulary of the sea-of-nodes IR.
//!
//! Every node is an opaque [`Node`] key into its graph's node store. The
//! payload carries the opcode, the mode of the produced value, the ordered
//! input list and the owning block. Control flow is ordinary data flow here:
//! blocks are nodes whose inputs are the control-flow jumps entering them.

use cranelift_entity::{entity_impl, packed_option::PackedOption};
use smallvec::SmallVec;

use crate::module::Entity;

/// An opaque reference to a node of a [`Graph`](crate::Graph).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Node(u32);
entity_impl!(Node, "n");

/// The mode of the value a node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Memory state.
    M,
    /// Control flow.
    X,
    /// A tuple; concrete values are extracted with `Proj`.
    T,
    /// No meaningful value (Bad, End).
    Any,
    /// An integer value.
    Int,
    /// A floating point value.
    Flt,
    /// A pointer value.
    Ptr,
}

impl Mode {
    /// Whether values of this mode occupy a register.
    pub fn is_data(self) -> bool {
        matches!(self, Mode::Int | Mode::Flt | Mode::Ptr)
    }

    pub fn is_mem(self) -> bool {
        self == Mode::M
    }
}

/// Selects one component out of a tuple-producing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjKind {
    /// The memory result.
    Mem,
    /// Control flow taken on normal completion of a Call.
    XRegular,
    /// Control flow taken when a Call raises an exception.
    XExcept,
    /// The n-th ordinary result.
    Res(u32),
}

/// Where an Alloc takes its storage from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocKind {
    Heap,
    Stack,
}

/// Whether a node may be moved to another block by code motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Pinned,
    Floats,
}

bitflags::bitflags! {
    /// Backend-facing node annotations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// The node does not contribute to register pressure (ABI helpers,
        /// pre-colored values).
        const IGNORE = 1 << 0;
    }
}

/// The closed opcode set.
///
/// Input conventions:
/// * `Block`: the control-flow jumps entering the block
/// * `Return`: `[mem, res...]`
/// * `Load`: `[mem, ptr]`, `Store`: `[mem, ptr, value]`
/// * `Call`: `[mem, callee, args...]`
/// * `Alloc`: `[mem, size]`
/// * `Phi`: one value per block predecessor, `Sync`: `[mem...]`
/// * `Proj`, `Cast`, `Confirm`, `Sel`: `[pred]`
/// * `Cmp`, `Add`, `Mul`: `[left, right]`
/// * `End`: the keep-alive nodes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Block,
    Jmp,
    Bad,
    Start,
    End,
    NoMem,
    Return,
    Phi,
    Sync,
    Load { volatile: bool },
    Store,
    Call,
    Alloc { kind: AllocKind },
    SymConst { entity: Entity },
    Sel,
    Cast,
    Confirm,
    Cmp,
    Const { value: i64 },
    Add,
    Mul,
    Proj { kind: ProjKind },
}

/// The stored payload of a node.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    pub mode: Mode,
    pub ins: SmallVec<[Node; 4]>,
    /// The owning block; `None` for Block nodes themselves.
    pub block: PackedOption<Node>,
    pub pinned: PinState,
    pub flags: NodeFlags,
}
