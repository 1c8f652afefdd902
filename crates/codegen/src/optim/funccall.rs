//! Optimization of function calls.
//!
//! A whole-program analysis classifies every procedure as const, pure,
//! nothrow and/or malloc, then call sites of classified procedures are
//! rewritten: calls to const procedures lose their memory edge and start
//! floating, calls to nothrow procedures lose their exception edges. Both
//! rewrites unlock later code motion.
//!
//! The solver runs in two passes over all graphs. Pass one infers nothrow and
//! malloc by inspecting the end block's predecessors; pass two infers const
//! and pure by walking each Return's memory chain backwards. Recursion into
//! callees is guarded by busy/ready sets: an in-progress callee answers
//! optimistically (pass one) or with bottom (pass two), and optimistic
//! answers are marked tentative so they are only committed at top level.

use cranelift_entity::{packed_option::PackedOption, SecondaryMap};
use rustc_hash::FxHashMap;

use petrel_ir::{
    CalleeTarget, Entity, FuncRef, Graph, GraphState, Mode, Module, Node, NodeKind, ParamAccess,
    PinState, ProjKind, Props, ScratchTable, VisitedMap,
};

use crate::bitset::BitSet;

/// What one `optimize_funccalls` run detected and rewrote.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FunccallStats {
    pub const_graphs: usize,
    pub pure_graphs: usize,
    pub nothrow_graphs: usize,
    pub malloc_graphs: usize,
    /// Classified direct call sites found during collection.
    pub direct_call_sites: usize,
    /// Classified indirect call sites found during collection.
    pub indirect_call_sites: usize,
}

/// Classify every procedure of `module` and rewrite the call sites the
/// classification allows. Idempotent: property commits are add-only, so a
/// repeated run can neither lose properties nor undo rewrites.
pub fn optimize_funccalls(module: &mut Module) -> FunccallStats {
    let mut stats = FunccallStats::default();
    let mut solver = PropSolver::default();
    let funcs = module.funcs();

    // First: nothrow and malloc.
    for &func in &funcs {
        let prop = solver.check_nothrow_or_malloc(module, func, true);
        if prop.contains(Props::NOTHROW) {
            stats.nothrow_graphs += 1;
        } else if prop.contains(Props::MALLOC) {
            stats.malloc_graphs += 1;
        }
    }

    // Remove exception edges before const/pure detection runs.
    for &func in &funcs {
        let lists = collect_nothrow_calls(module, func);
        stats.direct_call_sites += lists.n_direct;
        stats.indirect_call_sites += lists.n_indirect;
        if !lists.nothrow.is_empty() {
            fix_nothrow_call_list(module, func, &lists);
        }
    }

    solver.clear();

    // Second: const and pure.
    for &func in &funcs {
        let prop = solver.check_const_or_pure(module, func, true);
        if prop.contains(Props::CONST) {
            stats.const_graphs += 1;
            // A const procedure containing a control-flow cycle may never
            // terminate; mark it so its calls are not hoisted.
            if graph_has_cycle(&module.graphs[func]) {
                module.add_graph_props(func, Props::HAS_LOOP);
            }
        } else if prop.contains(Props::PURE) {
            stats.pure_graphs += 1;
        }
    }

    for &func in &funcs {
        let lists = collect_const_and_pure_calls(module, func);
        stats.direct_call_sites += lists.n_direct;
        stats.indirect_call_sites += lists.n_indirect;
        if !lists.float_const.is_empty() {
            fix_const_call_lists(module, func, &lists);
        }
    }

    stats
}

/// The recursion state of the whole-program analysis. `busy` guards against
/// non-terminating recursion, `ready` memoizes finished top-level results.
#[derive(Default)]
struct PropSolver {
    ready: BitSet<FuncRef>,
    busy: BitSet<FuncRef>,
}

/// How a returned value contributes to the malloc property.
enum ResultClass {
    HeapAlloc,
    SelfCall,
    DirectCall(FuncRef),
    ExternCall(Entity),
    IndirectCall(Node),
    Other,
}

/// How an exceptional end-block predecessor contributes to nothrow.
enum ExcClass {
    SelfCall,
    DirectCall(FuncRef),
    ExternCall(Entity),
    IndirectCall(Node),
    Other,
}

impl PropSolver {
    fn clear(&mut self) {
        self.ready.clear();
        self.busy.clear();
    }

    /// Check whether `func` is a nothrow and/or malloc procedure.
    fn check_nothrow_or_malloc(&mut self, module: &mut Module, func: FuncRef, top: bool) -> Props {
        if self.ready.contains(func) {
            return module.graph_props(func);
        }
        if self.busy.contains(func) {
            // Still being evaluated: answer optimistically, but tentatively.
            return Props::TENTATIVE | Props::MALLOC | Props::NOTHROW;
        }
        self.busy.insert(func);

        let mut prop = Props::MALLOC | Props::NOTHROW;
        {
            let graph = &module.graphs[func];
            let entity = graph.entity();
            if module.entities[entity].sig.results.is_empty() {
                prop -= Props::MALLOC;
            }
        }

        let end_block = module.graphs[func].end_block();
        let preds: Vec<Node> = module.graphs[func].ins(end_block).to_vec();
        for pred in preds {
            if module.graphs[func].is_return(pred) {
                if prop.contains(Props::MALLOC) {
                    let ress: Vec<Node> = module.graphs[func].return_res(pred).to_vec();
                    for res in ress {
                        prop = self.classify_malloc_result(module, func, res, prop);
                    }
                }
            } else if prop.contains(Props::NOTHROW) {
                prop = self.classify_exception_pred(module, func, pred, prop);
            }
            if (prop - Props::TENTATIVE).is_empty() {
                break;
            }
        }

        // Malloc promises alias-free memory; a returned value that is stored
        // anywhere may already have escaped.
        if prop.contains(Props::MALLOC) && any_returned_value_stored(module, func) {
            prop -= Props::MALLOC;
        }

        if !prop.is_empty() && (top || !prop.contains(Props::TENTATIVE)) {
            module.add_graph_props(func, prop - Props::TENTATIVE);
            self.ready.insert(func);
        }
        if top {
            self.ready.insert(func);
        }
        self.busy.remove(func);
        prop
    }

    fn classify_malloc_result(
        &mut self,
        module: &mut Module,
        func: FuncRef,
        res: Node,
        prop: Props,
    ) -> Props {
        let class = {
            let graph = &module.graphs[func];
            let res = strip_wrappers(graph, res);
            match *graph.kind(res) {
                NodeKind::Alloc {
                    kind: petrel_ir::AllocKind::Heap,
                } => ResultClass::HeapAlloc,
                NodeKind::Call => classify_callee(module, graph, res, |entity, callee| {
                    if callee == Some(func) {
                        ResultClass::SelfCall
                    } else if let Some(callee) = callee {
                        ResultClass::DirectCall(callee)
                    } else {
                        ResultClass::ExternCall(entity)
                    }
                })
                .unwrap_or(ResultClass::IndirectCall(res)),
                _ => ResultClass::Other,
            }
        };

        match class {
            ResultClass::HeapAlloc | ResultClass::SelfCall => prop,
            ResultClass::DirectCall(callee) => {
                let callee_prop = self.check_nothrow_or_malloc(module, callee, false);
                prop.update(callee_prop)
            }
            ResultClass::ExternCall(entity) => prop.update(module.entities[entity].props),
            ResultClass::IndirectCall(call) => {
                if all_callees_have(module, &module.graphs[func], call, Props::MALLOC) {
                    prop
                } else {
                    prop - Props::MALLOC
                }
            }
            ResultClass::Other => prop - Props::MALLOC,
        }
    }

    fn classify_exception_pred(
        &mut self,
        module: &mut Module,
        func: FuncRef,
        pred: Node,
        prop: Props,
    ) -> Props {
        let class = {
            let graph = &module.graphs[func];
            let pred = skip_projs(graph, pred);
            if graph.is_call(pred) {
                classify_callee(module, graph, pred, |entity, callee| {
                    if callee == Some(func) {
                        ExcClass::SelfCall
                    } else if let Some(callee) = callee {
                        ExcClass::DirectCall(callee)
                    } else {
                        ExcClass::ExternCall(entity)
                    }
                })
                .unwrap_or(ExcClass::IndirectCall(pred))
            } else {
                // Real exception flow.
                ExcClass::Other
            }
        };

        match class {
            ExcClass::SelfCall => prop,
            ExcClass::DirectCall(callee) => {
                // Only nothrow is checked here; do not let the callee's word
                // reset the malloc bit.
                let callee_prop = self.check_nothrow_or_malloc(module, callee, false) | Props::MALLOC;
                prop.update(callee_prop)
            }
            ExcClass::ExternCall(entity) => {
                if module.entities[entity].props.contains(Props::NOTHROW) {
                    prop
                } else {
                    prop - Props::NOTHROW
                }
            }
            ExcClass::IndirectCall(call) => {
                if all_callees_have(module, &module.graphs[func], call, Props::NOTHROW) {
                    prop
                } else {
                    prop - Props::NOTHROW
                }
            }
            ExcClass::Other => prop - Props::NOTHROW,
        }
    }

    /// Check whether `func` is a const or pure procedure.
    fn check_const_or_pure(&mut self, module: &mut Module, func: FuncRef, top: bool) -> Props {
        let entity = module.graphs[func].entity();
        let mut stored = module.graphs[func].props();
        let mut may_be_const = Props::CONST;

        // Compound values are passed through memory, so a procedure taking
        // one can never be const.
        for param in &module.entities[entity].sig.params {
            if param.is_aggregate() {
                stored -= Props::CONST;
                may_be_const = Props::empty();
            }
        }

        if stored.contains(Props::CONST) {
            return Props::CONST;
        }
        if stored.contains(Props::PURE) {
            return Props::PURE;
        }
        if self.ready.contains(func) || self.busy.contains(func) {
            // Already checked without result, or a recursion that may not
            // terminate: bottom either way.
            return Props::empty();
        }
        self.busy.insert(func);

        let mut prop = may_be_const;
        let mut visited = VisitedMap::new();
        // The memory chain walk stops at the initial memory.
        visited.mark(module.graphs[func].initial_mem());

        enum EndPred {
            Skip,
            Exception,
            Memory(Node),
        }

        let end_block = module.graphs[func].end_block();
        let preds: Vec<Node> = module.graphs[func].ins(end_block).to_vec();
        for pred in preds {
            let step = {
                let graph = &module.graphs[func];
                if graph.is_bad(pred) {
                    EndPred::Skip
                } else if graph.is_return(pred) {
                    let mem = graph.return_mem(pred);
                    if graph.is_bad(mem) || mem == graph.initial_mem() {
                        EndPred::Skip
                    } else {
                        EndPred::Memory(mem)
                    }
                } else {
                    EndPred::Exception
                }
            };
            match step {
                EndPred::Skip => continue,
                EndPred::Exception => prop = Props::empty(),
                EndPred::Memory(mem) => {
                    prop = self.follow_mem(module, func, &mut visited, mem, prop);
                }
            }
            if prop.is_empty() {
                break;
            }
        }

        if !prop.is_empty() {
            let keeps: Vec<Node> = module.graphs[func].keepalives().to_vec();
            for kept in keeps {
                let follow = {
                    let graph = &module.graphs[func];
                    if graph.is_block(kept) {
                        prop = Props::empty();
                        break;
                    }
                    graph.mode(kept) == Mode::M
                };
                if follow {
                    prop = self.follow_mem(module, func, &mut visited, kept, prop);
                    if prop.is_empty() {
                        break;
                    }
                }
            }
        }

        if top {
            if !prop.is_empty() {
                module.add_graph_props(func, prop);
            }
            self.ready.insert(func);
        }
        self.busy.remove(func);
        prop
    }

    /// Walk the memory chain backwards from `start`, meeting the property of
    /// every path. Loads weaken const to pure, const/pure calls descend into
    /// their callee, anything else is bottom.
    fn follow_mem(
        &mut self,
        module: &mut Module,
        func: FuncRef,
        visited: &mut VisitedMap,
        start: Node,
        mut prop: Props,
    ) -> Props {
        enum Step {
            Stop,
            Bottom,
            Descend(Node),
            WeakenLoad(Node),
            Branch(Vec<Node>),
            DirectCall {
                callee: Option<FuncRef>,
                entity: Entity,
                mem: Node,
            },
        }

        let mut worklist = vec![start];
        while let Some(first) = worklist.pop() {
            let mut node = first;
            loop {
                if prop.is_empty() {
                    return prop;
                }
                let step = {
                    let graph = &module.graphs[func];
                    if visited.mark_visited(node) {
                        Step::Stop
                    } else {
                        match *graph.kind(node) {
                            NodeKind::Proj { .. } => Step::Descend(graph.proj_pred(node)),
                            NodeKind::NoMem => Step::Stop,
                            NodeKind::Phi | NodeKind::Sync => Step::Branch(graph.ins(node).to_vec()),
                            NodeKind::Load { volatile } => {
                                // Volatile loads are observable effects.
                                if volatile {
                                    Step::Bottom
                                } else {
                                    Step::WeakenLoad(graph.load_mem(node))
                                }
                            }
                            NodeKind::Call => {
                                let ptr = graph.call_ptr(node);
                                if let NodeKind::SymConst { entity } = *graph.kind(ptr) {
                                    Step::DirectCall {
                                        callee: module.entities[entity].graph.expand(),
                                        entity,
                                        mem: graph.call_mem(node),
                                    }
                                } else {
                                    Step::Bottom
                                }
                            }
                            _ => Step::Bottom,
                        }
                    }
                };
                match step {
                    Step::Stop => break,
                    Step::Bottom => return Props::empty(),
                    Step::Descend(next) => node = next,
                    Step::WeakenLoad(mem) => {
                        prop = prop.max(Props::PURE);
                        node = mem;
                    }
                    Step::Branch(ins) => {
                        worklist.extend(ins);
                        break;
                    }
                    Step::DirectCall { callee, entity, mem } => {
                        let m = match callee {
                            Some(callee) => self.check_const_or_pure(module, callee, false),
                            None => {
                                module.entities[entity].props & (Props::CONST | Props::PURE)
                            }
                        };
                        prop = prop.max(m);
                        node = mem;
                    }
                }
            }
        }
        prop
    }
}

/// Resolve a call's target: `Some` for a direct call through a SymConst,
/// mapped by `f` over (entity, defining graph); `None` otherwise.
fn classify_callee<R>(
    module: &Module,
    graph: &Graph,
    call: Node,
    f: impl FnOnce(Entity, Option<FuncRef>) -> R,
) -> Option<R> {
    let ptr = graph.call_ptr(call);
    match *graph.kind(ptr) {
        NodeKind::SymConst { entity } => {
            Some(f(entity, module.entities[entity].graph.expand()))
        }
        _ => None,
    }
}

/// Whether an indirect call's possible callees all carry `wanted`. Requires a
/// closed world and consistent callee information; unknown or missing targets
/// fail the check.
fn all_callees_have(module: &Module, graph: &Graph, call: Node, wanted: Props) -> bool {
    if !module.closed_world || !graph.callee_info_consistent() {
        return false;
    }
    if !matches!(graph.kind(graph.call_ptr(call)), NodeKind::Sel) {
        return false;
    }
    let Some(targets) = graph.callees(call) else {
        return false;
    };
    if targets.is_empty() {
        // Dying code, or a call that can only raise: do not optimize.
        return false;
    }
    targets.iter().all(|target| match target {
        CalleeTarget::Unknown => false,
        CalleeTarget::Entity(entity) => module.entity_props(*entity).contains(wanted),
    })
}

/// Strip Confirm/Cast wrappers and Projs off a returned value.
fn strip_wrappers(graph: &Graph, mut node: Node) -> Node {
    loop {
        match graph.kind(node) {
            NodeKind::Cast | NodeKind::Confirm | NodeKind::Proj { .. } => {
                node = graph.ins(node)[0];
            }
            _ => return node,
        }
    }
}

fn skip_projs(graph: &Graph, mut node: Node) -> Node {
    while graph.is_proj(node) {
        node = graph.proj_pred(node);
    }
    node
}

/// Whether `node`'s value can end up stored behind a surviving reference.
fn is_stored(module: &Module, graph: &Graph, node: Node) -> bool {
    for user in graph.users(node) {
        match *graph.kind(user) {
            NodeKind::Return | NodeKind::Load { .. } | NodeKind::Cmp => {}
            NodeKind::Store => {
                // Using the value as the store address is harmless.
                if graph.store_value(user) == node {
                    return true;
                }
            }
            NodeKind::Sel | NodeKind::Cast | NodeKind::Confirm => {
                if is_stored(module, graph, user) {
                    return true;
                }
            }
            NodeKind::Call => {
                let ptr = graph.call_ptr(user);
                if let NodeKind::SymConst { entity } = *graph.kind(ptr) {
                    let access = &module.entities[entity].param_access;
                    for (i, &arg) in graph.call_args(user).iter().enumerate() {
                        if arg == node
                            && access
                                .get(i)
                                .copied()
                                .unwrap_or_default()
                                .contains(ParamAccess::STORE)
                        {
                            return true;
                        }
                    }
                } else {
                    return true;
                }
            }
            _ => return true,
        }
    }
    false
}

fn any_returned_value_stored(module: &Module, func: FuncRef) -> bool {
    let graph = &module.graphs[func];
    for &pred in graph.ins(graph.end_block()) {
        if !graph.is_return(pred) {
            continue;
        }
        for &res in graph.return_res(pred) {
            if is_stored(module, graph, res) {
                return true;
            }
        }
    }
    false
}

/// Whether the block graph contains a control-flow cycle.
fn graph_has_cycle(graph: &Graph) -> bool {
    let mut state = SecondaryMap::<Node, u8>::new();
    for root in graph.blocks() {
        if state[root] != 0 {
            continue;
        }
        let mut stack: Vec<(Node, usize)> = vec![(root, 0)];
        state[root] = 1;
        loop {
            let Some(&(block, idx)) = stack.last() else {
                break;
            };
            match graph.block_preds(block).nth(idx) {
                Some(next) => {
                    stack.last_mut().unwrap().1 += 1;
                    match state[next] {
                        0 => {
                            state[next] = 1;
                            stack.push((next, 0));
                        }
                        1 => return true,
                        _ => {}
                    }
                }
                None => {
                    state[block] = 2;
                    stack.pop();
                }
            }
        }
    }
    false
}

#[derive(Default)]
struct CallLists {
    float_const: Vec<Node>,
    nonfloat_const: Vec<Node>,
    pure_calls: Vec<Node>,
    nothrow: Vec<Node>,
    /// Every memory and control-flow Proj hanging off any Call.
    projs: Vec<Node>,
    n_direct: usize,
    n_indirect: usize,
}

/// The property word of a call site, or `None` when the site cannot be
/// classified against `wanted`. Direct calls read the callee entity; indirect
/// calls AND over all consistent callees, ORing their has-loop bits.
fn classify_call(
    module: &Module,
    graph: &Graph,
    call: Node,
    wanted: Props,
) -> Option<(Props, bool)> {
    let ptr = graph.call_ptr(call);
    match *graph.kind(ptr) {
        NodeKind::SymConst { entity } => {
            let prop = module.entity_props(entity);
            if (prop & wanted).is_empty() {
                return None;
            }
            Some((prop, true))
        }
        NodeKind::Sel if module.closed_world && graph.callee_info_consistent() => {
            let targets = graph.callees(call)?;
            if targets.is_empty() {
                return None;
            }
            let mut and_prop = wanted;
            let mut has_loop = false;
            for target in targets {
                let entity = match target {
                    CalleeTarget::Unknown => return None,
                    CalleeTarget::Entity(entity) => *entity,
                };
                let prop = module.entity_props(entity);
                and_prop &= prop;
                has_loop |= prop.contains(Props::HAS_LOOP);
                if and_prop.is_empty() {
                    return None;
                }
            }
            if has_loop {
                and_prop |= Props::HAS_LOOP;
            }
            Some((and_prop, false))
        }
        _ => None,
    }
}

fn collect_proj(graph: &Graph, node: Node, lists: &mut CallLists) {
    let pred = graph.proj_pred(node);
    if !graph.is_call(pred) {
        return;
    }
    if matches!(
        graph.proj_kind(node),
        ProjKind::Mem | ProjKind::XRegular | ProjKind::XExcept
    ) {
        lists.projs.push(node);
    }
}

fn collect_const_and_pure_calls(module: &Module, func: FuncRef) -> CallLists {
    let graph = &module.graphs[func];
    let mut lists = CallLists::default();
    for node in graph.nodes() {
        if graph.is_call(node) {
            let Some((prop, direct)) =
                classify_call(module, graph, node, Props::CONST | Props::PURE)
            else {
                continue;
            };
            if direct {
                lists.n_direct += 1;
            } else {
                lists.n_indirect += 1;
            }
            if prop.contains(Props::PURE) {
                lists.pure_calls.push(node);
            } else if prop.contains(Props::HAS_LOOP) {
                lists.nonfloat_const.push(node);
            } else {
                lists.float_const.push(node);
            }
        } else if graph.is_proj(node) {
            collect_proj(graph, node, &mut lists);
        }
    }
    lists
}

fn collect_nothrow_calls(module: &Module, func: FuncRef) -> CallLists {
    let graph = &module.graphs[func];
    let mut lists = CallLists::default();
    for node in graph.nodes() {
        if graph.is_call(node) {
            let Some((_, direct)) = classify_call(module, graph, node, Props::NOTHROW) else {
                continue;
            };
            if direct {
                lists.n_direct += 1;
            } else {
                lists.n_indirect += 1;
            }
            lists.nothrow.push(node);
        } else if graph.is_proj(node) {
            collect_proj(graph, node, &mut lists);
        }
    }
    lists
}

/// Rewrite the collected const calls: each call keeps its original memory in
/// the scratch table, is retargeted to NoMem and floats; then every memory
/// Proj is replaced by the preserved memory, every exception Proj by Bad and
/// every regular-flow Proj by a Jmp in the call's block.
///
/// Only calls from the floating list are rewritten. Calls to const
/// procedures that may loop endlessly stay pinned (floating them could make
/// a non-terminating call execute on a path that never entered it), and pure
/// calls keep their memory edge (they must not drift across stores).
fn fix_const_call_lists(module: &mut Module, func: FuncRef, lists: &CallLists) {
    let mut orig_mem: ScratchTable<PackedOption<Node>> = module.graphs[func].reserve_scratch();
    let graph = &mut module.graphs[func];
    let no_mem = graph.no_mem();

    for &call in &lists.float_const {
        let mem = graph.call_mem(call);
        orig_mem[call] = mem.into();
        graph.set_call_mem(call, no_mem);
        graph.set_pinned(call, PinState::Floats);
    }

    // A preserved memory may itself be a Proj that gets replaced below;
    // track replacements so later fixes land on the live node.
    let mut replaced: FxHashMap<Node, Node> = FxHashMap::default();
    let resolve = |replaced: &FxHashMap<Node, Node>, mut node: Node| {
        while let Some(&next) = replaced.get(&node) {
            node = next;
        }
        node
    };

    let mut exc_changed = false;
    for &proj in &lists.projs {
        let call = graph.proj_pred(proj);
        let Some(mem) = orig_mem[call].expand() else {
            // Not a floated call.
            continue;
        };
        match graph.proj_kind(proj) {
            ProjKind::Mem => {
                let mem = resolve(&replaced, mem);
                debug_assert_eq!(graph.mode(mem), Mode::M);
                // In dead code the Proj can be its own preserved memory.
                if proj != mem {
                    graph.exchange(proj, mem);
                    replaced.insert(proj, mem);
                }
            }
            ProjKind::XExcept => {
                exc_changed = true;
                let bad = graph.new_bad(Mode::X);
                graph.exchange(proj, bad);
            }
            ProjKind::XRegular => {
                exc_changed = true;
                let block = graph.block_of(call);
                let jmp = graph.new_jmp(block);
                graph.exchange(proj, jmp);
            }
            ProjKind::Res(_) => {}
        }
    }

    if exc_changed {
        graph.clear_state(GraphState::CONSISTENT_DOMINANCE | GraphState::CONSISTENT_LOOP_INFO);
    }
}

/// Rewrite the collected nothrow calls: their exception Projs become Bad,
/// their regular-flow Projs become Jmps. The memory edge stays.
fn fix_nothrow_call_list(module: &mut Module, func: FuncRef, lists: &CallLists) {
    let mut handled: ScratchTable<bool> = module.graphs[func].reserve_scratch();
    let graph = &mut module.graphs[func];

    for &call in &lists.nothrow {
        handled[call] = true;
    }

    let mut exc_changed = false;
    for &proj in &lists.projs {
        let call = graph.proj_pred(proj);
        if !handled[call] {
            continue;
        }
        match graph.proj_kind(proj) {
            ProjKind::XExcept => {
                exc_changed = true;
                let bad = graph.new_bad(Mode::X);
                graph.exchange(proj, bad);
            }
            ProjKind::XRegular => {
                exc_changed = true;
                let block = graph.block_of(call);
                let jmp = graph.new_jmp(block);
                graph.exchange(proj, jmp);
            }
            _ => {}
        }
    }

    if exc_changed {
        graph.clear_state(GraphState::CONSISTENT_DOMINANCE | GraphState::CONSISTENT_LOOP_INFO);
    }
}
