//! Statement-level dependence graph.
//!
//! Nodes are statement positions (arena indices into the program's
//! statement list, which is ordered by id). Edges are the dependences that
//! still constrain the schedule; self edges never enter the graph.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A dependence graph over statement indices.
#[derive(Debug, Clone)]
pub struct DependenceGraph {
    successors: Vec<Vec<usize>>,
}

impl DependenceGraph {
    pub fn new(n_nodes: usize) -> Self {
        Self { successors: vec![Vec::new(); n_nodes] }
    }

    /// Build from `(source, target)` pairs.
    pub fn from_edges(n_nodes: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut graph = Self::new(n_nodes);
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    pub fn n_nodes(&self) -> usize {
        self.successors.len()
    }

    /// Add an edge. Self loops and duplicates are ignored.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        if let Some(succ) = self.successors.get_mut(from) {
            if !succ.contains(&to) {
                succ.push(to);
            }
        }
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.successors.get(from).map_or(false, |s| s.contains(&to))
    }

    pub fn successors(&self, node: usize) -> &[usize] {
        self.successors.get(node).map_or(&[], |s| s.as_slice())
    }

    /// Strongly connected components using Tarjan's algorithm, each sorted.
    pub fn strongly_connected_components(&self) -> Vec<Vec<usize>> {
        let n = self.n_nodes();
        let mut state = Tarjan {
            index_counter: 0,
            stack: Vec::new(),
            indices: vec![None; n],
            lowlinks: vec![0; n],
            on_stack: vec![false; n],
            sccs: Vec::new(),
        };
        for v in 0..n {
            if state.indices[v].is_none() {
                self.strongconnect(v, &mut state);
            }
        }
        state.sccs
    }

    fn strongconnect(&self, v: usize, state: &mut Tarjan) {
        state.indices[v] = Some(state.index_counter);
        state.lowlinks[v] = state.index_counter;
        state.index_counter += 1;
        state.stack.push(v);
        state.on_stack[v] = true;

        for &w in &self.successors[v] {
            match state.indices[w] {
                None => {
                    self.strongconnect(w, state);
                    state.lowlinks[v] = state.lowlinks[v].min(state.lowlinks[w]);
                }
                Some(index_w) if state.on_stack[w] => {
                    state.lowlinks[v] = state.lowlinks[v].min(index_w);
                }
                Some(_) => {}
            }
        }

        if Some(state.lowlinks[v]) == state.indices[v] {
            let mut scc = Vec::new();
            while let Some(w) = state.stack.pop() {
                state.on_stack[w] = false;
                scc.push(w);
                if w == v {
                    break;
                }
            }
            scc.sort_unstable();
            state.sccs.push(scc);
        }
    }

    /// SCCs in topological order of the condensation. Among SCCs that are
    /// ready at the same time the one holding the smallest statement comes
    /// first.
    pub fn ordered_sccs(&self) -> Vec<Vec<usize>> {
        let sccs = self.strongly_connected_components();
        let mut comp_of = vec![0; self.n_nodes()];
        for (c, scc) in sccs.iter().enumerate() {
            for &v in scc {
                comp_of[v] = c;
            }
        }

        let mut comp_succ: Vec<Vec<usize>> = vec![Vec::new(); sccs.len()];
        let mut in_degree = vec![0usize; sccs.len()];
        for v in 0..self.n_nodes() {
            for &w in &self.successors[v] {
                let (cv, cw) = (comp_of[v], comp_of[w]);
                if cv != cw && !comp_succ[cv].contains(&cw) {
                    comp_succ[cv].push(cw);
                    in_degree[cw] += 1;
                }
            }
        }

        // Keyed by the smallest member; SCC members are sorted.
        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = sccs
            .iter()
            .enumerate()
            .filter(|(c, _)| in_degree[*c] == 0)
            .map(|(c, scc)| Reverse((scc[0], c)))
            .collect();

        let mut order = Vec::with_capacity(sccs.len());
        while let Some(Reverse((_, c))) = ready.pop() {
            order.push(c);
            for &next in &comp_succ[c] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse((sccs[next][0], next)));
                }
            }
        }

        let mut sccs: Vec<Option<Vec<usize>>> = sccs.into_iter().map(Some).collect();
        order.into_iter().filter_map(|c| sccs[c].take()).collect()
    }
}

struct Tarjan {
    index_counter: usize,
    stack: Vec<usize>,
    indices: Vec<Option<usize>>,
    lowlinks: Vec<usize>,
    on_stack: Vec<bool>,
    sccs: Vec<Vec<usize>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scc() {
        // Create a cycle: 0 -> 1 -> 2 -> 0
        let graph = DependenceGraph::from_edges(3, vec![(0, 1), (1, 2), (2, 0)]);
        let sccs = graph.strongly_connected_components();
        assert_eq!(sccs, vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_self_loops_ignored() {
        let graph = DependenceGraph::from_edges(2, vec![(0, 0), (0, 1), (0, 1)]);
        assert!(!graph.has_edge(0, 0));
        assert_eq!(graph.successors(0), &[1]);
    }

    #[test]
    fn test_topological_order() {
        // 2 -> 0, 1 independent
        let graph = DependenceGraph::from_edges(3, vec![(2, 0)]);
        assert_eq!(graph.ordered_sccs(), vec![vec![1], vec![2], vec![0]]);
    }

    #[test]
    fn test_tie_break_by_smallest_statement() {
        // {1,3} cycle feeding 2; 0 independent
        let graph = DependenceGraph::from_edges(4, vec![(1, 3), (3, 1), (3, 2)]);
        assert_eq!(graph.ordered_sccs(), vec![vec![0], vec![1, 3], vec![2]]);

        let graph = DependenceGraph::new(3);
        assert_eq!(graph.ordered_sccs(), vec![vec![0], vec![1], vec![2]]);
    }
}
