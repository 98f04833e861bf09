//! Component and restoration-path algebra for the connectivity resolver.
//!
//! Everything here is pure: functions take the current components and the
//! set of restorable links and return new values without touching replicated
//! state. The resolver in [`crate::rooted`] decides what to do with them.
//!
//! # Terminology
//!
//! - A [`Component`] is a set of live node ids mutually reachable ignoring
//!   edge direction.
//! - A [`TombstoneLink`] is an edge that could be brought back: either an
//!   edge recorded in one or more tombstones, or a dangling adjacency entry
//!   whose missing endpoint could be restored.
//! - A [`LinkPath`] alternates nodes and links. A [`RestorablePath`] is a
//!   link path whose endpoints are live nodes of distinct components and
//!   whose interior nodes are dead but restorable.
//!
//! Exhaustive enumeration ([`find_all_paths`]) is factorial in the number of
//! links; callers gate it on the tombstone count. [`virtual_graph_path`] is
//! the polynomial alternative.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use cograph_core::VectorClock;
use num_bigint::BigUint;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::edge::EdgeKey;
use crate::id::NodeId;

/// Live node ids mutually reachable ignoring direction.
pub type Component = BTreeSet<NodeId>;

/// An edge that restoration could bring back.
#[derive(Debug, Clone, PartialEq)]
pub struct TombstoneLink {
    pub edge: EdgeKey,
    pub label: String,
    /// Log indices of the tombstones that record this edge.
    pub sources: BTreeSet<usize>,
    /// The edge is still present as a dangling adjacency entry.
    pub dangling: bool,
}

/// Alternating sequence of nodes and the links between them:
/// `nodes[i] -- links[i] -- nodes[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPath {
    pub nodes: Vec<NodeId>,
    /// Indices into the link slice the path was built from.
    pub links: Vec<usize>,
}

impl LinkPath {
    fn single(a: &NodeId, b: &NodeId, link: usize) -> Self {
        LinkPath {
            nodes: vec![a.clone(), b.clone()],
            links: vec![link],
        }
    }

    fn extended(&self, next: &NodeId, link: usize) -> Self {
        let mut path = self.clone();
        path.nodes.push(next.clone());
        path.links.push(link);
        path
    }

    /// Nodes strictly between the two endpoints.
    pub fn interior(&self) -> &[NodeId] {
        match self.nodes.len() {
            0..=2 => &[],
            n => &self.nodes[1..n - 1],
        }
    }

    pub fn first(&self) -> Option<&NodeId> {
        self.nodes.first()
    }

    pub fn last(&self) -> Option<&NodeId> {
        self.nodes.last()
    }
}

/// A candidate path together with everything needed to score it.
#[derive(Debug, Clone)]
pub struct RestorablePath {
    pub path: LinkPath,
    /// Per link, the tombstones restoring it consumes.
    pub consumed: Vec<BTreeSet<usize>>,
    /// Tombstones that restore the interior nodes.
    pub node_sources: BTreeSet<usize>,
    /// Clocks of every consumed tombstone. Dangling links contribute the
    /// empty clock, which every clock dominates.
    pub clocks: Vec<VectorClock>,
    /// Indices of every component the restoration would touch.
    pub components: BTreeSet<usize>,
}

impl RestorablePath {
    /// Union of all tombstones the path consumes.
    pub fn tombstones(&self) -> BTreeSet<usize> {
        self.consumed
            .iter()
            .flatten()
            .chain(self.node_sources.iter())
            .copied()
            .collect()
    }

    pub fn bit_cost(&self, log_len: usize) -> BigUint {
        bit_cost(&self.tombstones(), log_len)
    }
}

/// Node id -> component index, for repeated lookups.
pub fn component_lookup(components: &[Component]) -> HashMap<&NodeId, usize> {
    components
        .iter()
        .enumerate()
        .flat_map(|(i, c)| c.iter().map(move |n| (n, i)))
        .collect()
}

/// Replaces the components listed in `merge` with their union plus the
/// `connecting` nodes. The union takes the position of the lowest merged
/// index, so the root's component stays first.
pub fn merge_components(
    components: &[Component],
    merge: &BTreeSet<usize>,
    connecting: impl IntoIterator<Item = NodeId>,
) -> Vec<Component> {
    let mut union: Component = connecting.into_iter().collect();
    let mut at = None;
    let mut merged = Vec::with_capacity(components.len());
    for (i, component) in components.iter().enumerate() {
        if merge.contains(&i) {
            at.get_or_insert(merged.len());
            union.extend(component.iter().cloned());
        } else {
            merged.push(component.clone());
        }
    }
    match at {
        Some(at) => merged.insert(at, union),
        None if !union.is_empty() => merged.push(union),
        None => {}
    }
    merged
}

/// Exact cost of consuming `tombstones` out of a log of `log_len` entries.
///
/// The tombstone at index `i` weighs `2^(log_len - 1 - i)`: a more recent
/// tombstone is cheaper than every older one combined, so comparing costs
/// compares the consumed sets from the oldest entry down.
pub fn bit_cost(tombstones: &BTreeSet<usize>, log_len: usize) -> BigUint {
    tombstones
        .iter()
        .filter(|&&i| i < log_len)
        .fold(BigUint::default(), |acc, &i| {
            acc + (BigUint::from(1u8) << (log_len - 1 - i))
        })
}

/// Returns `true` if every clock in `a` is `<=` every clock in `b` and at
/// least one pair is strictly ordered.
pub fn path_precedes(a: &[VectorClock], b: &[VectorClock]) -> bool {
    let mut strict = false;
    for ca in a {
        for cb in b {
            if !ca.leq(cb) {
                return false;
            }
            strict |= ca.less(cb);
        }
    }
    strict
}

/// Enumerates every simple path over `links`, treating each link as an
/// undirected hop.
///
/// Starts from both orientations of every link and repeatedly extends each
/// path by one hop through a node not already on it. A path is only
/// extended past its last node if `can_pass` allows that node as an
/// interior node.
pub fn find_all_paths(
    links: &[TombstoneLink],
    can_pass: impl Fn(&NodeId) -> bool,
) -> Vec<LinkPath> {
    let mut frontier = Vec::new();
    for (i, link) in links.iter().enumerate() {
        if link.edge.is_self_loop() {
            continue;
        }
        frontier.push(LinkPath::single(&link.edge.source, &link.edge.target, i));
        frontier.push(LinkPath::single(&link.edge.target, &link.edge.source, i));
    }

    let mut all = frontier.clone();
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for path in &frontier {
            let Some(last) = path.last() else { continue };
            if !can_pass(last) {
                continue;
            }
            for (i, link) in links.iter().enumerate() {
                let Some(other) = link.edge.opposite(last) else {
                    continue;
                };
                if link.edge.is_self_loop() || path.nodes.contains(other) {
                    continue;
                }
                next.push(path.extended(other, i));
            }
        }
        all.extend(next.iter().cloned());
        frontier = next;
    }
    all
}

/// Breadth-first search over the graph of restorable links, starting from
/// every node of `components[start]`.
///
/// Stops at the first live node of another component. Only dead nodes for
/// which `can_pass` holds are traversed; neighbours are visited in
/// `(node id, link index)` order so every replica finds the same path.
pub fn virtual_graph_path(
    links: &[TombstoneLink],
    components: &[Component],
    start: usize,
    can_pass: impl Fn(&NodeId) -> bool,
) -> Option<LinkPath> {
    let sources = components.get(start)?;
    let lookup = component_lookup(components);

    let mut graph: UnGraph<NodeId, usize> = UnGraph::new_undirected();
    let mut index: HashMap<&NodeId, NodeIndex> = HashMap::new();
    for (i, link) in links.iter().enumerate() {
        if link.edge.is_self_loop() {
            continue;
        }
        let a = *index
            .entry(&link.edge.source)
            .or_insert_with(|| graph.add_node(link.edge.source.clone()));
        let b = *index
            .entry(&link.edge.target)
            .or_insert_with(|| graph.add_node(link.edge.target.clone()));
        graph.add_edge(a, b, i);
    }

    let mut previous: HashMap<NodeIndex, (NodeIndex, usize)> = HashMap::new();
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut queue: VecDeque<NodeIndex> = VecDeque::new();
    for node in sources {
        if let Some(&ix) = index.get(node) {
            visited.insert(ix);
            queue.push_back(ix);
        }
    }

    while let Some(current) = queue.pop_front() {
        let id = &graph[current];
        match lookup.get(id) {
            Some(&c) if c != start => return Some(unwind(&graph, &previous, current)),
            Some(_) => {}
            None if can_pass(id) => {}
            None => continue,
        }

        let mut hops: Vec<(NodeIndex, usize)> = graph
            .edges(current)
            .map(|e| {
                let other = if e.source() == current {
                    e.target()
                } else {
                    e.source()
                };
                (other, *e.weight())
            })
            .collect();
        hops.sort_by(|x, y| graph[x.0].cmp(&graph[y.0]).then(x.1.cmp(&y.1)));

        for (other, link) in hops {
            if visited.insert(other) {
                previous.insert(other, (current, link));
                queue.push_back(other);
            }
        }
    }
    None
}

fn unwind(
    graph: &UnGraph<NodeId, usize>,
    previous: &HashMap<NodeIndex, (NodeIndex, usize)>,
    end: NodeIndex,
) -> LinkPath {
    let mut nodes = vec![graph[end].clone()];
    let mut links = Vec::new();
    let mut current = end;
    while let Some(&(prev, link)) = previous.get(&current) {
        nodes.push(graph[prev].clone());
        links.push(link);
        current = prev;
    }
    nodes.reverse();
    links.reverse();
    LinkPath { nodes, links }
}

/// Lowest bit-cost candidate; the first one wins ties.
pub fn select_cheapest(candidates: Vec<RestorablePath>, log_len: usize) -> Option<RestorablePath> {
    candidates
        .into_iter()
        .map(|p| (p.bit_cost(log_len), p))
        .min_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, p)| p)
}

/// Causally preferred candidate.
///
/// Keeps only the candidates touching the most components, orders them by
/// bit-cost, then walks that order replacing the current choice only with a
/// candidate whose clocks all precede it. Concurrent candidates keep their
/// cost order.
pub fn select_causal(candidates: Vec<RestorablePath>, log_len: usize) -> Option<RestorablePath> {
    let most = candidates.iter().map(|p| p.components.len()).max()?;
    let mut pool: Vec<(BigUint, RestorablePath)> = candidates
        .into_iter()
        .filter(|p| p.components.len() == most)
        .map(|p| (p.bit_cost(log_len), p))
        .collect();
    pool.sort_by(|a, b| a.0.cmp(&b.0));

    let mut pool = pool.into_iter().map(|(_, p)| p);
    let mut best = pool.next()?;
    for candidate in pool {
        if path_precedes(&candidate.clocks, &best.clocks) {
            best = candidate;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cograph_core::ReplicaId;

    fn component(ids: &[&str]) -> Component {
        ids.iter().map(|&s| NodeId::new(s)).collect()
    }

    fn link(a: &str, b: &str, source: usize) -> TombstoneLink {
        TombstoneLink {
            edge: EdgeKey::new(a, b),
            label: String::new(),
            sources: [source].into_iter().collect(),
            dangling: false,
        }
    }

    fn clock(entries: &[(u64, u64)]) -> VectorClock {
        entries.iter().map(|&(r, c)| (ReplicaId(r), c)).collect()
    }

    fn ids(path: &LinkPath) -> Vec<&str> {
        path.nodes.iter().map(|n| n.as_str()).collect()
    }

    fn candidate(
        tombstones: &[usize],
        clocks: Vec<VectorClock>,
        components: &[usize],
    ) -> RestorablePath {
        RestorablePath {
            path: LinkPath {
                nodes: Vec::new(),
                links: Vec::new(),
            },
            consumed: vec![tombstones.iter().copied().collect()],
            node_sources: BTreeSet::new(),
            clocks,
            components: components.iter().copied().collect(),
        }
    }

    #[test]
    fn merge_keeps_union_at_lowest_index() {
        let components = vec![component(&["root"]), component(&["a"]), component(&["b"])];
        let merge: BTreeSet<usize> = [0, 2].into_iter().collect();
        let merged = merge_components(&components, &merge, [NodeId::new("x")]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], component(&["root", "b", "x"]));
        assert_eq!(merged[1], component(&["a"]));
    }

    #[test]
    fn bit_cost_prefers_recent_tombstones() {
        let old: BTreeSet<usize> = [0].into_iter().collect();
        let recent: BTreeSet<usize> = [1, 2, 3].into_iter().collect();
        assert_eq!(bit_cost(&old, 4), BigUint::from(8u32));
        assert_eq!(bit_cost(&recent, 4), BigUint::from(7u32));
        assert!(bit_cost(&recent, 4) < bit_cost(&old, 4));
    }

    #[test]
    fn bit_cost_is_exact_for_long_logs() {
        let first: BTreeSet<usize> = [0].into_iter().collect();
        assert_eq!(bit_cost(&first, 200), BigUint::from(1u8) << 199usize);
    }

    #[test]
    fn precedence_needs_every_pair_ordered() {
        let early = vec![clock(&[(1, 1)])];
        let late = vec![clock(&[(1, 2)]), clock(&[(1, 3)])];
        assert!(path_precedes(&early, &late));
        assert!(!path_precedes(&late, &early));

        let concurrent = vec![clock(&[(2, 1)])];
        assert!(!path_precedes(&early, &concurrent));
        assert!(!path_precedes(&concurrent, &early));

        let dangling = vec![VectorClock::new()];
        assert!(path_precedes(&dangling, &early));
    }

    #[test]
    fn all_paths_respect_can_pass() {
        // a - x - b, plus a direct a - b
        let links = vec![link("a", "x", 0), link("x", "b", 1), link("a", "b", 2)];
        let paths = find_all_paths(&links, |n| n.as_str() == "x");
        let mut found: Vec<Vec<&str>> = paths.iter().map(ids).collect();
        found.sort();
        assert!(found.contains(&vec!["a", "x", "b"]));
        assert!(found.contains(&vec!["b", "x", "a"]));
        assert!(!found.iter().any(|p| p.len() > 3));
        assert_eq!(paths.len(), 8);
    }

    #[test]
    fn virtual_path_reaches_nearest_component() {
        let components = vec![component(&["root", "a"]), component(&["z"]), component(&["y"])];
        let links = vec![
            link("a", "d1", 0),
            link("d1", "d2", 1),
            link("d2", "z", 2),
            link("root", "d3", 3),
            link("d3", "y", 4),
        ];
        let dead = ["d1", "d2", "d3"];
        let path =
            virtual_graph_path(&links, &components, 0, |n| dead.contains(&n.as_str())).unwrap();
        assert_eq!(ids(&path), vec!["root", "d3", "y"]);
        assert_eq!(path.links, vec![3, 4]);
        assert_eq!(path.interior(), &[NodeId::new("d3")]);
    }

    #[test]
    fn virtual_path_does_not_cross_unrestorable_nodes() {
        let components = vec![component(&["root"]), component(&["z"])];
        let links = vec![link("root", "ghost", 0), link("ghost", "z", 1)];
        assert!(virtual_graph_path(&links, &components, 0, |_| false).is_none());
        assert!(virtual_graph_path(&links, &components, 0, |_| true).is_some());
    }

    #[test]
    fn cheapest_picks_lowest_cost() {
        let best = select_cheapest(
            vec![
                candidate(&[0], vec![], &[0, 1]),
                candidate(&[1, 2], vec![], &[0, 1]),
            ],
            3,
        )
        .unwrap();
        assert_eq!(best.tombstones(), BTreeSet::from([1, 2]));
    }

    #[test]
    fn causal_prefers_more_components_then_dominance() {
        let wide = candidate(&[0], vec![clock(&[(1, 5)])], &[0, 1, 2]);
        let narrow = candidate(&[3], vec![clock(&[(1, 1)])], &[0, 1]);
        let best = select_causal(vec![narrow, wide], 4).unwrap();
        assert_eq!(best.components.len(), 3);

        let cheap_late = candidate(&[3], vec![clock(&[(1, 4)])], &[0, 1]);
        let costly_early = candidate(&[0], vec![clock(&[(1, 1)])], &[0, 1]);
        let best = select_causal(vec![cheap_late, costly_early], 4).unwrap();
        assert_eq!(best.tombstones(), BTreeSet::from([0]));

        let cheap = candidate(&[3], vec![clock(&[(2, 1)])], &[0, 1]);
        let concurrent = candidate(&[0], vec![clock(&[(1, 1)])], &[0, 1]);
        let best = select_causal(vec![concurrent, cheap], 4).unwrap();
        assert_eq!(best.tombstones(), BTreeSet::from([3]));
    }
}
