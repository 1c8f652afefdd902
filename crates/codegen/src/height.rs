//! Block-local height oracle.
//!
//! The height of a node is the length of the longest path from it to the end
//! of its block, following data users and the explicit dependency edges the
//! scheduler inserts. Phi nodes consume their operands on the incoming edges,
//! so they never extend an in-block path.

use cranelift_entity::SecondaryMap;
use petrel_ir::{Graph, Node};

#[derive(Default)]
pub struct Heights {
    heights: SecondaryMap<Node, u32>,
    /// 0 = untouched, 1 = in progress, 2 = finished; per recomputation.
    state: SecondaryMap<Node, u8>,
}

impl Heights {
    pub fn new() -> Self {
        Self::default()
    }

    /// The height of `node` within the block last recomputed.
    pub fn height(&self, node: Node) -> u32 {
        self.heights[node]
    }

    /// Recompute all heights of `block` and return the maximum.
    pub fn recompute_block(&mut self, graph: &Graph, block: Node) -> u32 {
        self.heights.clear();
        self.state.clear();

        let mut max = 0;
        for node in graph.nodes_in_block(block) {
            max = max.max(self.compute(graph, block, node));
        }
        max
    }

    fn compute(&mut self, graph: &Graph, block: Node, root: Node) -> u32 {
        if self.state[root] == 2 {
            return self.heights[root];
        }

        let mut stack = vec![root];
        while let Some(&node) = stack.last() {
            if self.state[node] == 0 {
                self.state[node] = 1;
                for succ in block_succs(graph, block, node) {
                    if self.state[succ] == 0 {
                        stack.push(succ);
                    }
                }
            } else {
                stack.pop();
                if self.state[node] == 2 {
                    continue;
                }
                let mut height = 0;
                for succ in block_succs(graph, block, node) {
                    if self.state[succ] == 2 {
                        height = height.max(self.heights[succ] + 1);
                    }
                }
                self.heights[node] = height;
                self.state[node] = 2;
            }
        }

        self.heights[root]
    }

    /// Whether `to` can be reached from `from` along in-block user and
    /// dependency edges.
    pub fn reachable_in_block(&self, graph: &Graph, block: Node, from: Node, to: Node) -> bool {
        if from == to {
            return true;
        }
        let mut visited = SecondaryMap::<Node, bool>::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            for succ in block_succs(graph, block, node) {
                if succ == to {
                    return true;
                }
                stack.push(succ);
            }
        }
        false
    }
}

fn block_succs<'a>(graph: &'a Graph, block: Node, node: Node) -> impl Iterator<Item = Node> + 'a {
    graph
        .users(node)
        .filter(move |&user| graph.block_of(user) == block && !graph.is_phi(user))
        .chain(
            graph
                .dep_succs_of(node)
                .iter()
                .copied()
                .filter(move |&succ| graph.block_of(succ) == block),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use petrel_ir::{Module, Signature, Type};

    #[test]
    fn chain_heights() {
        let mut module = Module::new();
        let (_, func) = module.define_function("f", Signature::new(&[], &[Type::Int]));
        let graph = &mut module.graphs[func];
        let block = graph.entry_block();

        let a = graph.new_const(block, 1);
        let b = graph.new_const(block, 2);
        let s1 = graph.new_add(block, a, b);
        let s2 = graph.new_add(block, s1, b);

        let mut heights = Heights::new();
        let max = heights.recompute_block(graph, block);

        assert_eq!(heights.height(s2), 0);
        assert_eq!(heights.height(s1), 1);
        assert_eq!(heights.height(a), 2);
        assert_eq!(heights.height(b), 2);
        assert_eq!(max, 2);

        assert!(heights.reachable_in_block(graph, block, a, s2));
        assert!(!heights.reachable_in_block(graph, block, s2, a));
    }

    #[test]
    fn dependency_edges_extend_paths() {
        let mut module = Module::new();
        let (_, func) = module.define_function("f", Signature::new(&[], &[]));
        let graph = &mut module.graphs[func];
        let block = graph.entry_block();

        let p = graph.new_const(block, 1);
        let q = graph.new_const(block, 2);

        let mut heights = Heights::new();
        heights.recompute_block(graph, block);
        assert_eq!(heights.height(p), 0);
        assert!(!heights.reachable_in_block(graph, block, p, q));

        graph.add_dep(p, q);
        let max = heights.recompute_block(graph, block);
        assert_eq!(heights.height(p), 1);
        assert_eq!(heights.height(q), 0);
        assert!(heights.reachable_in_block(graph, block, p, q));
        assert_eq!(max, 1);
    }
}
