//! Typed node constructors.
//!
//! Frontends and tests build graphs through these; the analyses only consume
//! the accessor surface. Constructors wire the out-edge index but do no
//! verification beyond input arity.

use crate::graph::Graph;
use crate::module::Entity;
use crate::node::{AllocKind, Mode, Node, NodeKind, ProjKind};

impl Graph {
    pub fn new_block(&mut self) -> Node {
        self.new_node(NodeKind::Block, Mode::X, None, &[])
    }

    /// Append a control-flow predecessor to a block.
    pub fn add_block_pred(&mut self, block: Node, pred: Node) {
        debug_assert!(self.is_block(block));
        self.append_input(block, pred);
    }

    /// Append a control-flow predecessor to the end block.
    pub fn add_end_block_pred(&mut self, pred: Node) {
        let end_block = self.end_block();
        self.append_input(end_block, pred);
    }

    /// Keep a node alive past dead-code elimination.
    pub fn add_keepalive(&mut self, node: Node) {
        let end = self.end();
        self.append_input(end, node);
    }

    pub fn new_jmp(&mut self, block: Node) -> Node {
        self.new_node(NodeKind::Jmp, Mode::X, Some(block), &[])
    }

    pub fn new_bad(&mut self, mode: Mode) -> Node {
        let entry = self.entry_block();
        self.new_node(NodeKind::Bad, mode, Some(entry), &[])
    }

    pub fn new_const(&mut self, block: Node, value: i64) -> Node {
        self.new_node(NodeKind::Const { value }, Mode::Int, Some(block), &[])
    }

    pub fn new_add(&mut self, block: Node, left: Node, right: Node) -> Node {
        self.new_node(NodeKind::Add, Mode::Int, Some(block), &[left, right])
    }

    pub fn new_mul(&mut self, block: Node, left: Node, right: Node) -> Node {
        self.new_node(NodeKind::Mul, Mode::Int, Some(block), &[left, right])
    }

    pub fn new_cmp(&mut self, block: Node, left: Node, right: Node) -> Node {
        self.new_node(NodeKind::Cmp, Mode::Int, Some(block), &[left, right])
    }

    pub fn new_cast(&mut self, block: Node, value: Node, mode: Mode) -> Node {
        self.new_node(NodeKind::Cast, mode, Some(block), &[value])
    }

    pub fn new_confirm(&mut self, block: Node, value: Node) -> Node {
        let mode = self.mode(value);
        self.new_node(NodeKind::Confirm, mode, Some(block), &[value])
    }

    pub fn new_sel(&mut self, block: Node, ptr: Node) -> Node {
        self.new_node(NodeKind::Sel, Mode::Ptr, Some(block), &[ptr])
    }

    pub fn new_symconst(&mut self, entity: Entity) -> Node {
        let entry = self.entry_block();
        self.new_node(NodeKind::SymConst { entity }, Mode::Ptr, Some(entry), &[])
    }

    /// A Load produces a tuple; extract results with [`Graph::new_proj`].
    pub fn new_load(&mut self, block: Node, mem: Node, ptr: Node, volatile: bool) -> Node {
        self.new_node(NodeKind::Load { volatile }, Mode::T, Some(block), &[mem, ptr])
    }

    pub fn new_store(&mut self, block: Node, mem: Node, ptr: Node, value: Node) -> Node {
        self.new_node(NodeKind::Store, Mode::T, Some(block), &[mem, ptr, value])
    }

    pub fn new_alloc(&mut self, block: Node, mem: Node, size: Node, kind: AllocKind) -> Node {
        self.new_node(NodeKind::Alloc { kind }, Mode::T, Some(block), &[mem, size])
    }

    pub fn new_call(&mut self, block: Node, mem: Node, callee: Node, args: &[Node]) -> Node {
        let mut ins = Vec::with_capacity(args.len() + 2);
        ins.push(mem);
        ins.push(callee);
        ins.extend_from_slice(args);
        self.new_node(NodeKind::Call, Mode::T, Some(block), &ins)
    }

    pub fn new_proj(&mut self, pred: Node, kind: ProjKind, mode: Mode) -> Node {
        let block = self.block_of(pred);
        self.new_node(NodeKind::Proj { kind }, mode, Some(block), &[pred])
    }

    pub fn new_phi(&mut self, block: Node, ins: &[Node], mode: Mode) -> Node {
        self.new_node(NodeKind::Phi, mode, Some(block), ins)
    }

    pub fn new_sync(&mut self, block: Node, mems: &[Node]) -> Node {
        self.new_node(NodeKind::Sync, Mode::M, Some(block), mems)
    }

    pub fn new_return(&mut self, block: Node, mem: Node, res: &[Node]) -> Node {
        let mut ins = Vec::with_capacity(res.len() + 1);
        ins.push(mem);
        ins.extend_from_slice(res);
        self.new_node(NodeKind::Return, Mode::X, Some(block), &ins)
    }
}
