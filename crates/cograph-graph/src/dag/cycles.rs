//! Elementary cycle enumeration (Johnson's algorithm).
//!
//! Vertices are dense indices `0..n`. For each start index `s` the search
//! takes the strongly connected component with the least vertex among the
//! non-trivial components of the subgraph induced by `{s, .., n - 1}`,
//! enumerates every elementary circuit through that least vertex, and moves
//! `s` past it. Components come from petgraph's Tarjan implementation; the
//! circuit search keeps an explicit stack instead of recursing.

use std::collections::BTreeSet;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

/// Every elementary cycle of the graph given by `successors`, each as the
/// vertex sequence of the cycle starting from its least vertex.
pub fn elementary_cycles(successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut cycles = Vec::new();
    let mut start = 0;
    while start < successors.len() {
        let Some((least, members)) = least_component(successors, start) else {
            break;
        };
        circuits_from(least, &members, successors, &mut cycles);
        start = least + 1;
    }
    cycles
}

/// Least vertex of the non-trivial component with the least vertex in the
/// subgraph induced by `from..`, with that component's membership mask.
fn least_component(successors: &[Vec<usize>], from: usize) -> Option<(usize, Vec<bool>)> {
    let n = successors.len();
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let index: Vec<NodeIndex> = (from..n).map(|v| graph.add_node(v)).collect();
    for v in from..n {
        for &w in &successors[v] {
            if w >= from && w < n {
                graph.add_edge(index[v - from], index[w - from], ());
            }
        }
    }

    tarjan_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || scc.iter().any(|&x| graph.contains_edge(x, x)))
        .filter_map(|scc| {
            let members: Vec<usize> = scc.iter().map(|&x| graph[x]).collect();
            members.iter().min().copied().map(|least| (least, members))
        })
        .min_by_key(|(least, _)| *least)
        .map(|(least, members)| {
            let mut mask = vec![false; n];
            for m in members {
                mask[m] = true;
            }
            (least, mask)
        })
}

/// Johnson's CIRCUIT search from `start`, restricted to `members`.
fn circuits_from(
    start: usize,
    members: &[bool],
    successors: &[Vec<usize>],
    cycles: &mut Vec<Vec<usize>>,
) {
    let n = successors.len();
    let adjacent: Vec<Vec<usize>> = (0..n)
        .map(|v| {
            if !members[v] {
                return Vec::new();
            }
            let mut next: Vec<usize> = successors[v]
                .iter()
                .copied()
                .filter(|&w| w < n && members[w])
                .collect();
            next.sort_unstable();
            next.dedup();
            next
        })
        .collect();

    let mut blocked = vec![false; n];
    let mut blocked_by: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut closed = vec![false; n];
    let mut path = vec![start];
    let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
    blocked[start] = true;

    while let Some(&(node, cursor)) = stack.last() {
        if let Some(&next) = adjacent[node].get(cursor) {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            if next == start {
                cycles.push(path.clone());
                for &v in &path {
                    closed[v] = true;
                }
            } else if !blocked[next] {
                path.push(next);
                stack.push((next, 0));
                closed[next] = false;
                blocked[next] = true;
                continue;
            }
            if cursor + 1 < adjacent[node].len() {
                continue;
            }
        }

        if closed[node] {
            unblock(node, &mut blocked, &mut blocked_by);
        } else {
            for &w in &adjacent[node] {
                blocked_by[w].insert(node);
            }
        }
        stack.pop();
        path.pop();
    }
}

fn unblock(node: usize, blocked: &mut [bool], blocked_by: &mut [BTreeSet<usize>]) {
    let mut pending = vec![node];
    while let Some(v) = pending.pop() {
        if blocked[v] {
            blocked[v] = false;
            pending.extend(std::mem::take(&mut blocked_by[v]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjacency(n: usize, edges: &[(usize, usize)]) -> Vec<Vec<usize>> {
        let mut succ = vec![Vec::new(); n];
        for &(a, b) in edges {
            succ[a].push(b);
        }
        succ
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let succ = adjacency(4, &[(0, 1), (1, 2), (0, 2), (2, 3)]);
        assert!(elementary_cycles(&succ).is_empty());
    }

    #[test]
    fn triangle_with_chord() {
        let succ = adjacency(3, &[(0, 1), (1, 2), (2, 0), (1, 0)]);
        let mut cycles = elementary_cycles(&succ);
        cycles.sort();
        assert_eq!(cycles, vec![vec![0, 1], vec![0, 1, 2]]);
    }

    #[test]
    fn disjoint_cycles_are_both_found() {
        let succ = adjacency(4, &[(0, 1), (1, 0), (2, 3), (3, 2)]);
        assert_eq!(elementary_cycles(&succ), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let succ = adjacency(2, &[(0, 0), (0, 1)]);
        assert_eq!(elementary_cycles(&succ), vec![vec![0]]);
    }

    #[test]
    fn complete_digraph_cycle_count() {
        // K4 with both directions on every pair: 6 + 8 + 6 elementary cycles.
        let mut edges = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                if a != b {
                    edges.push((a, b));
                }
            }
        }
        let cycles = elementary_cycles(&adjacency(4, &edges));
        assert_eq!(cycles.len(), 20);
        let unique: BTreeSet<Vec<usize>> = cycles.iter().cloned().collect();
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn cycle_outside_first_component_is_found() {
        // 0 -> 1 is acyclic; 2 <-> 3 is not.
        let succ = adjacency(4, &[(0, 1), (1, 2), (2, 3), (3, 2)]);
        assert_eq!(elementary_cycles(&succ), vec![vec![2, 3]]);
    }
}
