//! Per-procedure graph store and the graph services built on it: the
//! out-edge index, visited generations and scoped scratch-table reservations.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::ops::{Index, IndexMut};
use std::rc::Rc;

use cranelift_entity::{packed_option::PackedOption, PrimaryMap, SecondaryMap};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::module::{Entity, Signature};
use crate::node::{Mode, Node, NodeData, NodeFlags, NodeKind, PinState, ProjKind};
use crate::props::Props;

bitflags::bitflags! {
    /// Analysis results that are known to still describe the graph.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GraphState: u8 {
        const CONSISTENT_DOMINANCE = 1 << 0;
        const CONSISTENT_LOOP_INFO = 1 << 1;
    }
}

/// One possible target of an indirect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalleeTarget {
    Entity(Entity),
    /// The target could not be resolved.
    Unknown,
}

const RES_SCRATCH: u8 = 1 << 0;

/// A procedure graph.
///
/// Nodes are append-only; rewrites go through [`Graph::exchange`], which
/// retargets every user and degrades the replaced node to `Bad`. The graph
/// maintains an out-edge index (`users`) and the explicit dependency edges
/// the scheduler inserts to serialize value lifetimes.
pub struct Graph {
    entity: Entity,
    nodes: PrimaryMap<Node, NodeData>,
    users: SecondaryMap<Node, BTreeSet<Node>>,
    /// tgt -> nodes that must execute before tgt.
    deps: SecondaryMap<Node, SmallVec<[Node; 2]>>,
    /// src -> nodes that must execute after src.
    dep_succs: SecondaryMap<Node, SmallVec<[Node; 2]>>,
    callee_info: FxHashMap<Node, Vec<CalleeTarget>>,
    callee_info_consistent: bool,
    states: GraphState,
    props: Props,
    resources: Rc<Cell<u8>>,

    entry_block: Node,
    end_block: Node,
    start: Node,
    end: Node,
    initial_mem: Node,
    no_mem: Node,
    args: Vec<Node>,
}

impl Graph {
    /// Create the skeleton every procedure graph shares: entry and end block,
    /// Start with its memory and argument projections, End and NoMem.
    pub fn new(entity: Entity, sig: &Signature) -> Self {
        let mut graph = Graph {
            entity,
            nodes: PrimaryMap::new(),
            users: SecondaryMap::new(),
            deps: SecondaryMap::new(),
            dep_succs: SecondaryMap::new(),
            callee_info: FxHashMap::default(),
            callee_info_consistent: false,
            states: GraphState::empty(),
            props: Props::empty(),
            resources: Rc::new(Cell::new(0)),
            entry_block: Node::from_u32(0),
            end_block: Node::from_u32(0),
            start: Node::from_u32(0),
            end: Node::from_u32(0),
            initial_mem: Node::from_u32(0),
            no_mem: Node::from_u32(0),
            args: Vec::new(),
        };

        graph.entry_block = graph.new_node(NodeKind::Block, Mode::X, None, &[]);
        graph.start = graph.new_node(NodeKind::Start, Mode::T, Some(graph.entry_block), &[]);
        graph.initial_mem = graph.new_proj(graph.start, ProjKind::Mem, Mode::M);
        graph.no_mem = graph.new_node(NodeKind::NoMem, Mode::M, Some(graph.entry_block), &[]);
        for (i, param) in sig.params.iter().enumerate() {
            let arg = graph.new_proj(graph.start, ProjKind::Res(i as u32), param.mode());
            graph.args.push(arg);
        }
        graph.end_block = graph.new_node(NodeKind::Block, Mode::X, None, &[]);
        graph.end = graph.new_node(NodeKind::End, Mode::Any, Some(graph.end_block), &[]);
        graph
    }

    pub(crate) fn new_node(
        &mut self,
        kind: NodeKind,
        mode: Mode,
        block: Option<Node>,
        ins: &[Node],
    ) -> Node {
        let pinned = match kind {
            NodeKind::Call
            | NodeKind::Block
            | NodeKind::Jmp
            | NodeKind::Return
            | NodeKind::Start
            | NodeKind::End
            | NodeKind::Phi
            | NodeKind::Store
            | NodeKind::Load { .. }
            | NodeKind::Alloc { .. } => PinState::Pinned,
            _ => PinState::Floats,
        };
        let node = self.nodes.push(NodeData {
            kind,
            mode,
            ins: SmallVec::from_slice(ins),
            block: block.into(),
            pinned,
            flags: NodeFlags::empty(),
        });
        for &input in ins {
            self.users[input].insert(node);
        }
        node
    }

    // --- accessors ---

    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn entry_block(&self) -> Node {
        self.entry_block
    }

    pub fn end_block(&self) -> Node {
        self.end_block
    }

    pub fn end(&self) -> Node {
        self.end
    }

    pub fn start(&self) -> Node {
        self.start
    }

    pub fn initial_mem(&self) -> Node {
        self.initial_mem
    }

    pub fn no_mem(&self) -> Node {
        self.no_mem
    }

    pub fn arg(&self, i: usize) -> Node {
        self.args[i]
    }

    pub fn kind(&self, node: Node) -> &NodeKind {
        &self.nodes[node].kind
    }

    pub fn mode(&self, node: Node) -> Mode {
        self.nodes[node].mode
    }

    pub fn ins(&self, node: Node) -> &[Node] {
        &self.nodes[node].ins
    }

    /// The block a node belongs to; a block belongs to itself.
    pub fn block_of(&self, node: Node) -> Node {
        self.nodes[node].block.expand().unwrap_or(node)
    }

    pub fn pinned(&self, node: Node) -> PinState {
        self.nodes[node].pinned
    }

    pub fn set_pinned(&mut self, node: Node, pinned: PinState) {
        self.nodes[node].pinned = pinned;
    }

    pub fn flags(&self, node: Node) -> NodeFlags {
        self.nodes[node].flags
    }

    pub fn set_flags(&mut self, node: Node, flags: NodeFlags) {
        self.nodes[node].flags = flags;
    }

    /// All nodes ever created, including replaced ones (degraded to `Bad`).
    pub fn nodes(&self) -> impl Iterator<Item = Node> {
        self.nodes.keys()
    }

    /// The out-edge index: every node using `node` as an input.
    pub fn users(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.users[node].iter().copied()
    }

    pub fn is_block(&self, node: Node) -> bool {
        matches!(self.nodes[node].kind, NodeKind::Block)
    }

    pub fn is_call(&self, node: Node) -> bool {
        matches!(self.nodes[node].kind, NodeKind::Call)
    }

    pub fn is_proj(&self, node: Node) -> bool {
        matches!(self.nodes[node].kind, NodeKind::Proj { .. })
    }

    pub fn is_return(&self, node: Node) -> bool {
        matches!(self.nodes[node].kind, NodeKind::Return)
    }

    pub fn is_bad(&self, node: Node) -> bool {
        matches!(self.nodes[node].kind, NodeKind::Bad)
    }

    pub fn is_phi(&self, node: Node) -> bool {
        matches!(self.nodes[node].kind, NodeKind::Phi)
    }

    // --- typed accessors ---

    pub fn proj_pred(&self, proj: Node) -> Node {
        debug_assert!(self.is_proj(proj));
        self.nodes[proj].ins[0]
    }

    pub fn proj_kind(&self, proj: Node) -> ProjKind {
        match self.nodes[proj].kind {
            NodeKind::Proj { kind } => kind,
            _ => panic!("not a Proj"),
        }
    }

    pub fn call_mem(&self, call: Node) -> Node {
        debug_assert!(self.is_call(call));
        self.nodes[call].ins[0]
    }

    pub fn call_ptr(&self, call: Node) -> Node {
        debug_assert!(self.is_call(call));
        self.nodes[call].ins[1]
    }

    pub fn call_args(&self, call: Node) -> &[Node] {
        debug_assert!(self.is_call(call));
        &self.nodes[call].ins[2..]
    }

    pub fn set_call_mem(&mut self, call: Node, mem: Node) {
        debug_assert!(self.is_call(call));
        self.set_input(call, 0, mem);
    }

    pub fn load_mem(&self, load: Node) -> Node {
        self.nodes[load].ins[0]
    }

    pub fn store_value(&self, store: Node) -> Node {
        debug_assert!(matches!(self.nodes[store].kind, NodeKind::Store));
        self.nodes[store].ins[2]
    }

    pub fn return_mem(&self, ret: Node) -> Node {
        debug_assert!(self.is_return(ret));
        self.nodes[ret].ins[0]
    }

    pub fn return_res(&self, ret: Node) -> &[Node] {
        debug_assert!(self.is_return(ret));
        &self.nodes[ret].ins[1..]
    }

    /// The keep-alive inputs of the End node.
    pub fn keepalives(&self) -> &[Node] {
        &self.nodes[self.end].ins
    }

    // --- mutation ---

    pub fn set_input(&mut self, node: Node, index: usize, new: Node) {
        let old = self.nodes[node].ins[index];
        if old == new {
            return;
        }
        self.nodes[node].ins[index] = new;
        if !self.nodes[node].ins.contains(&old) {
            self.users[old].remove(&node);
        }
        self.users[new].insert(node);
    }

    /// Replace `old` by `new` everywhere: every user's matching inputs are
    /// retargeted, then `old` is disconnected and degraded to `Bad` so later
    /// walks cannot mistake it for live structure.
    pub fn exchange(&mut self, old: Node, new: Node) {
        assert_ne!(old, new);
        let old_users = std::mem::take(&mut self.users[old]);
        for &user in &old_users {
            let ins = &mut self.nodes[user].ins;
            for slot in ins.iter_mut() {
                if *slot == old {
                    *slot = new;
                }
            }
            self.users[new].insert(user);
        }
        let old_ins = std::mem::take(&mut self.nodes[old].ins);
        for input in old_ins {
            self.users[input].remove(&old);
        }
        self.nodes[old].kind = NodeKind::Bad;
    }

    pub(crate) fn append_input(&mut self, node: Node, input: Node) {
        self.nodes[node].ins.push(input);
        self.users[input].insert(node);
    }

    /// Record that `src` must execute before `tgt` in any schedule.
    pub fn add_dep(&mut self, src: Node, tgt: Node) {
        debug_assert_ne!(src, tgt);
        self.deps[tgt].push(src);
        self.dep_succs[src].push(tgt);
    }

    /// Nodes required to execute before `tgt` by explicit dependencies.
    pub fn deps_of(&self, tgt: Node) -> &[Node] {
        &self.deps[tgt]
    }

    /// Nodes required to execute after `src` by explicit dependencies.
    pub fn dep_succs_of(&self, src: Node) -> &[Node] {
        &self.dep_succs[src]
    }

    // --- graph-wide state ---

    pub fn props(&self) -> Props {
        self.props
    }

    pub fn add_props(&mut self, props: Props) {
        self.props |= props;
    }

    pub fn states(&self) -> GraphState {
        self.states
    }

    pub fn set_state(&mut self, state: GraphState) {
        self.states |= state;
    }

    pub fn clear_state(&mut self, state: GraphState) {
        self.states -= state;
    }

    // --- callee information for indirect calls ---

    pub fn set_callees(&mut self, call: Node, targets: Vec<CalleeTarget>) {
        debug_assert!(self.is_call(call));
        self.callee_info.insert(call, targets);
    }

    pub fn callees(&self, call: Node) -> Option<&[CalleeTarget]> {
        self.callee_info.get(&call).map(|t| t.as_slice())
    }

    pub fn mark_callee_info_consistent(&mut self) {
        self.callee_info_consistent = true;
    }

    pub fn callee_info_consistent(&self) -> bool {
        self.callee_info_consistent
    }

    // --- blocks ---

    pub fn blocks(&self) -> impl Iterator<Item = Node> + '_ {
        self.nodes
            .keys()
            .filter(|&n| matches!(self.nodes[n].kind, NodeKind::Block))
    }

    pub fn nodes_in_block(&self, block: Node) -> impl Iterator<Item = Node> + '_ {
        self.nodes
            .keys()
            .filter(move |&n| self.nodes[n].block.expand() == Some(block))
    }

    /// The control-flow predecessor blocks of `block`, derived from the
    /// jump nodes entering it.
    pub fn block_preds(&self, block: Node) -> impl Iterator<Item = Node> + '_ {
        debug_assert!(self.is_block(block));
        self.nodes[block]
            .ins
            .iter()
            .filter_map(|&jump| self.nodes[jump].block.expand())
    }

    // --- scratch reservations ---

    /// Reserve the per-node scratch side table for one pass. At most one
    /// table may be live per graph; the reservation is returned on drop, on
    /// every exit path.
    pub fn reserve_scratch<T: Clone + Default>(&self) -> ScratchTable<T> {
        let mask = self.resources.get();
        assert!(
            mask & RES_SCRATCH == 0,
            "scratch table already reserved for this graph"
        );
        self.resources.set(mask | RES_SCRATCH);
        ScratchTable {
            map: SecondaryMap::new(),
            reservation: Rc::clone(&self.resources),
        }
    }
}

/// A pass-scoped side table keyed by node, standing in for a per-node scratch
/// field. Holding one reserves the graph's scratch resource.
pub struct ScratchTable<T: Clone + Default> {
    map: SecondaryMap<Node, T>,
    reservation: Rc<Cell<u8>>,
}

impl<T: Clone + Default> Index<Node> for ScratchTable<T> {
    type Output = T;

    fn index(&self, node: Node) -> &T {
        &self.map[node]
    }
}

impl<T: Clone + Default> IndexMut<Node> for ScratchTable<T> {
    fn index_mut(&mut self, node: Node) -> &mut T {
        &mut self.map[node]
    }
}

impl<T: Clone + Default> Drop for ScratchTable<T> {
    fn drop(&mut self) {
        let mask = self.reservation.get();
        self.reservation.set(mask & !RES_SCRATCH);
    }
}

/// A visited set with cheap reset: a generation counter plus per-node stamps.
/// Bumping the generation invalidates all marks at once. The counter starts
/// above the stamp default, so a fresh map has nothing marked.
pub struct VisitedMap {
    stamps: SecondaryMap<Node, u32>,
    generation: u32,
}

impl Default for VisitedMap {
    fn default() -> Self {
        Self::new()
    }
}

impl VisitedMap {
    pub fn new() -> Self {
        VisitedMap {
            stamps: SecondaryMap::new(),
            generation: 1,
        }
    }

    pub fn next_generation(&mut self) {
        self.generation += 1;
    }

    pub fn mark(&mut self, node: Node) {
        self.stamps[node] = self.generation;
    }

    pub fn visited(&self, node: Node) -> bool {
        self.stamps[node] == self.generation
    }

    /// Mark `node`, reporting whether it was already marked.
    pub fn mark_visited(&mut self, node: Node) -> bool {
        let seen = self.visited(node);
        self.mark(node);
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{Module, Signature, Type};

    fn test_graph() -> (Module, FuncRefPair) {
        let mut module = Module::new();
        let (entity, func) =
            module.define_function("f", Signature::new(&[Type::Int], &[Type::Int]));
        (module, (entity, func))
    }

    type FuncRefPair = (Entity, crate::module::FuncRef);

    #[test]
    fn users_track_inputs() {
        let (mut module, (_, func)) = test_graph();
        let graph = &mut module.graphs[func];
        let block = graph.entry_block();
        let a = graph.new_const(block, 1);
        let b = graph.new_const(block, 2);
        let sum = graph.new_add(block, a, b);

        assert_eq!(graph.users(a).collect::<Vec<_>>(), vec![sum]);
        assert_eq!(graph.ins(sum), &[a, b]);

        let c = graph.new_const(block, 3);
        graph.set_input(sum, 0, c);
        assert_eq!(graph.users(a).count(), 0);
        assert_eq!(graph.users(c).collect::<Vec<_>>(), vec![sum]);
    }

    #[test]
    fn exchange_retargets_users_and_degrades_old() {
        let (mut module, (_, func)) = test_graph();
        let graph = &mut module.graphs[func];
        let block = graph.entry_block();
        let a = graph.new_const(block, 1);
        let b = graph.new_const(block, 2);
        let sum = graph.new_add(block, a, a);
        let repl = graph.new_const(block, 9);

        graph.exchange(a, repl);
        assert_eq!(graph.ins(sum), &[repl, repl]);
        assert!(graph.is_bad(a));
        assert_eq!(graph.users(a).count(), 0);
        assert!(graph.users(repl).any(|u| u == sum));
        let _ = b;
    }

    #[test]
    fn scratch_reservation_is_exclusive() {
        let (module, (_, func)) = test_graph();
        let graph = &module.graphs[func];
        {
            let _table: ScratchTable<u32> = graph.reserve_scratch();
            // Released on drop.
        }
        let _again: ScratchTable<u32> = graph.reserve_scratch();
    }

    #[test]
    #[should_panic(expected = "already reserved")]
    fn nested_scratch_reservation_panics() {
        let (module, (_, func)) = test_graph();
        let graph = &module.graphs[func];
        let _outer: ScratchTable<u32> = graph.reserve_scratch();
        let _inner: ScratchTable<bool> = graph.reserve_scratch();
    }

    #[test]
    fn visited_generations() {
        let (mut module, (_, func)) = test_graph();
        let graph = &mut module.graphs[func];
        let block = graph.entry_block();
        let a = graph.new_const(block, 1);

        let mut visited = VisitedMap::new();
        assert!(!visited.mark_visited(a));
        assert!(visited.mark_visited(a));
        visited.next_generation();
        assert!(!visited.visited(a));
    }

    #[test]
    fn dependency_edges() {
        let (mut module, (_, func)) = test_graph();
        let graph = &mut module.graphs[func];
        let block = graph.entry_block();
        let a = graph.new_const(block, 1);
        let b = graph.new_const(block, 2);

        graph.add_dep(a, b);
        assert_eq!(graph.deps_of(b), &[a]);
        assert_eq!(graph.dep_succs_of(a), &[b]);
    }
}
