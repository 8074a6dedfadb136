//! Wait-for graph cycle detection for deadlock discovery.
//!
//! The adjacency map itself (`add_edge`/`remove_edge`/`remove_transaction`)
//! is grounded in the teacher's `transaction/wait_for_graph.rs`. Cycle
//! *recovery* — finding the actual cycle membership, not just whether one
//! exists — follows the DFS-with-recursion-stack approach from the
//! original broker's `deadlock_detector.py`: the stack is kept as an
//! ordered path so that once a back edge closes a cycle, the cycle is
//! exactly the path suffix from the repeated vertex onward (not every
//! vertex reachable from it, which could include non-cycle tails).

use std::collections::{HashMap, HashSet};

use super::transaction::TxnId;

#[derive(Default)]
pub struct WaitForGraph {
    graph: HashMap<TxnId, HashSet<TxnId>>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self { graph: HashMap::new() }
    }

    pub fn add_edge(&mut self, from: TxnId, to: TxnId) {
        if from == to {
            return;
        }
        self.graph.entry(from).or_insert_with(HashSet::new).insert(to);
    }

    pub fn remove_edge(&mut self, from: TxnId, to: TxnId) {
        if let Some(waiting_on) = self.graph.get_mut(&from) {
            waiting_on.remove(&to);
        }
    }

    pub fn remove_transaction(&mut self, tid: TxnId) {
        self.graph.remove(&tid);
        for waiting_on in self.graph.values_mut() {
            waiting_on.remove(&tid);
        }
    }

    /// Returns the set of transactions forming a cycle that `start` belongs
    /// to, if any. The DFS keeps its recursion stack as an ordered path; the
    /// first time an edge points back into that path, the cycle is exactly
    /// the path suffix from the repeated vertex to the current one plus the
    /// closing edge — not every vertex reachable from the repeated vertex,
    /// which could wander into a tail that never leads back into the cycle.
    pub fn find_cycle_containing(&self, start: TxnId) -> Option<HashSet<TxnId>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.detect_from(start, &mut path, &mut visited)
    }

    fn detect_from(
        &self,
        tid: TxnId,
        path: &mut Vec<TxnId>,
        visited: &mut HashSet<TxnId>,
    ) -> Option<HashSet<TxnId>> {
        path.push(tid);
        visited.insert(tid);
        if let Some(waiting_on) = self.graph.get(&tid) {
            for &next in waiting_on {
                if let Some(pos) = path.iter().position(|&t| t == next) {
                    return Some(path[pos..].iter().copied().collect());
                }
                if visited.contains(&next) {
                    continue;
                }
                if let Some(cycle) = self.detect_from(next, path, visited) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cycle_when_graph_is_acyclic() {
        let mut g = WaitForGraph::new();
        g.add_edge(TxnId(1), TxnId(2));
        g.add_edge(TxnId(2), TxnId(3));
        assert!(g.find_cycle_containing(TxnId(1)).is_none());
    }

    #[test]
    fn detects_a_three_way_cycle() {
        let mut g = WaitForGraph::new();
        g.add_edge(TxnId(1), TxnId(2));
        g.add_edge(TxnId(2), TxnId(3));
        g.add_edge(TxnId(3), TxnId(1));
        let cycle = g.find_cycle_containing(TxnId(1)).unwrap();
        assert_eq!(cycle, [TxnId(1), TxnId(2), TxnId(3)].into_iter().collect());
    }

    #[test]
    fn removing_a_transaction_breaks_the_cycle() {
        let mut g = WaitForGraph::new();
        g.add_edge(TxnId(1), TxnId(2));
        g.add_edge(TxnId(2), TxnId(1));
        g.remove_transaction(TxnId(2));
        assert!(g.find_cycle_containing(TxnId(1)).is_none());
    }
}
