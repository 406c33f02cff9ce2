//! Path queries and MAG legality.

use crate::graph::{EdgeKind, Endpoint, Graph};
use std::collections::VecDeque;

/// The first legality condition a graph violates.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MagViolation {
    /// An edge carries a circle endpoint (or a tail/circle mix).
    #[error("{edge} is not a MAG edge")]
    NotMagEdge {
        /// Offending edge.
        edge: String,
    },

    /// A node reaches itself along directed edges.
    #[error("directed cycle through {node}")]
    DirectedCycle {
        /// A node on the cycle.
        node: String,
    },

    /// A bidirected or undirected edge closes a directed path.
    #[error("almost directed cycle: {edge} with a directed path {from} ~> {to}")]
    AlmostDirectedCycle {
        /// The bidirected/undirected edge.
        edge: String,
        /// Start of the directed path.
        from: String,
        /// End of the directed path.
        to: String,
    },

    /// A node incident to an undirected edge has an arrowhead into it.
    #[error("{node} is incident to {undirected} but has an arrowhead from {other}")]
    ArrowheadIntoUndirected {
        /// The undirected edge.
        undirected: String,
        /// The node carrying both incidences.
        node: String,
        /// Source of the arrowhead.
        other: String,
    },
}

/// Borrowed view for path queries, obtained with [`Graph::paths`].
#[derive(Clone, Copy, Debug)]
pub struct Paths<'g> {
    graph: &'g Graph,
}

impl Graph {
    /// Path queries over this graph.
    #[inline]
    pub fn paths(&self) -> Paths<'_> {
        Paths { graph: self }
    }
}

impl Paths<'_> {
    /// Whether a directed path of at least one edge leads from `from` to `to`.
    ///
    /// With `from == to` this answers whether `from` lies on a directed cycle.
    pub fn exists_directed_path(&self, from: usize, to: usize) -> bool {
        let g = self.graph;
        let mut seen = vec![false; g.num_nodes()];
        let mut queue: VecDeque<usize> = g.children(from).into();
        while let Some(v) = queue.pop_front() {
            if v == to {
                return true;
            }
            if std::mem::replace(&mut seen[v], true) {
                continue;
            }
            queue.extend(g.children(v).into_iter().filter(|&c| !seen[c]));
        }
        false
    }

    /// Whether a potentially directed path leads from `from` to `to`.
    ///
    /// Each step `a *-* b` must have no arrowhead at `a` and no tail at `b`.
    pub fn exists_semi_directed_path(&self, from: usize, to: usize) -> bool {
        let g = self.graph;
        let mut seen = vec![false; g.num_nodes()];
        let mut queue = VecDeque::from([from]);
        seen[from] = true;
        while let Some(a) = queue.pop_front() {
            for b in g.adjacent(a) {
                if !is_potentially_directed_step(g, a, b) {
                    continue;
                }
                if b == to {
                    return true;
                }
                if !seen[b] {
                    seen[b] = true;
                    queue.push_back(b);
                }
            }
        }
        false
    }

    /// All ancestors of `nodes`, including the nodes themselves, sorted.
    pub fn ancestors_of(&self, nodes: &[usize]) -> Vec<usize> {
        let g = self.graph;
        let mut seen = vec![false; g.num_nodes()];
        let mut stack: Vec<usize> = nodes.to_vec();
        while let Some(v) = stack.pop() {
            if std::mem::replace(&mut seen[v], true) {
                continue;
            }
            stack.extend(g.parents(v).into_iter().filter(|&p| !seen[p]));
        }
        seen.iter()
            .enumerate()
            .filter(|&(_, &s)| s)
            .map(|(i, _)| i)
            .collect()
    }

    /// All descendants of `nodes`, including the nodes themselves, sorted.
    pub fn descendants_of(&self, nodes: &[usize]) -> Vec<usize> {
        let g = self.graph;
        let mut seen = vec![false; g.num_nodes()];
        let mut stack: Vec<usize> = nodes.to_vec();
        while let Some(v) = stack.pop() {
            if std::mem::replace(&mut seen[v], true) {
                continue;
            }
            stack.extend(g.children(v).into_iter().filter(|&c| !seen[c]));
        }
        seen.iter()
            .enumerate()
            .filter(|&(_, &s)| s)
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether `a` is an ancestor of `b` (every node is its own ancestor).
    pub fn is_ancestor_of(&self, a: usize, b: usize) -> bool {
        a == b || self.exists_directed_path(a, b)
    }

    /// Whether the graph is a legal MAG (maximality is not checked).
    pub fn is_legal_mag(&self) -> bool {
        self.mag_legality().is_ok()
    }

    /// Checks the MAG conditions in order and reports the first violation.
    ///
    /// # Errors
    /// Returns the first [`MagViolation`] found.
    pub fn mag_legality(&self) -> Result<(), MagViolation> {
        let g = self.graph;

        for e in g.edges() {
            if !matches!(
                e.kind(),
                EdgeKind::Directed | EdgeKind::Bidirected | EdgeKind::Undirected
            ) {
                return Err(MagViolation::NotMagEdge {
                    edge: g.edge_string(&e),
                });
            }
        }

        for v in 0..g.num_nodes() {
            if self.exists_directed_path(v, v) {
                return Err(MagViolation::DirectedCycle {
                    node: g.name(v).to_string(),
                });
            }
        }

        for e in g.edges() {
            if !(e.is_bidirected() || e.is_undirected()) {
                continue;
            }
            for (from, to) in [(e.a, e.b), (e.b, e.a)] {
                if self.exists_directed_path(from, to) {
                    return Err(MagViolation::AlmostDirectedCycle {
                        edge: g.edge_string(&e),
                        from: g.name(from).to_string(),
                        to: g.name(to).to_string(),
                    });
                }
            }
        }

        for e in g.edges().filter(|e| e.is_undirected()) {
            for node in [e.a, e.b] {
                if let Some(other) = g.nodes_into(node, Endpoint::Arrow).first() {
                    return Err(MagViolation::ArrowheadIntoUndirected {
                        undirected: g.edge_string(&e),
                        node: g.name(node).to_string(),
                        other: g.name(*other).to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

pub(crate) fn is_potentially_directed_step(g: &Graph, a: usize, b: usize) -> bool {
    let at_a = g.endpoint(b, a);
    let at_b = g.endpoint(a, b);
    at_a != Some(Endpoint::Arrow) && at_b != Some(Endpoint::Tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &str) -> Graph {
        Graph::from_edges(&["A", "B", "C", "D"], edges).unwrap()
    }

    #[test]
    fn directed_paths() {
        let g = graph("A --> B\nB --> C\nD <-> C");
        let p = g.paths();
        assert!(p.exists_directed_path(0, 2));
        assert!(!p.exists_directed_path(2, 0));
        assert!(!p.exists_directed_path(3, 2));
        assert!(!p.exists_directed_path(0, 0));
        assert_eq!(p.ancestors_of(&[2]), vec![0, 1, 2]);
        assert_eq!(p.descendants_of(&[1]), vec![1, 2]);
        assert!(p.is_ancestor_of(1, 1));
    }

    #[test]
    fn semi_directed_paths_follow_circles() {
        let g = graph("A o-> B\nB o-o C\nC --> D");
        let p = g.paths();
        assert!(p.exists_semi_directed_path(0, 3));
        assert!(!p.exists_semi_directed_path(3, 0));
        assert!(!p.exists_semi_directed_path(1, 0));
    }

    #[test]
    fn legal_mag_accepts_mixed_graph() {
        let g = graph("A --- B\nB --> C\nC <-> D");
        assert_eq!(g.paths().mag_legality(), Ok(()));
    }

    #[test]
    fn directed_cycle_is_illegal() {
        let g = graph("A --> B\nB --> C\nC --> A");
        assert!(matches!(
            g.paths().mag_legality(),
            Err(MagViolation::DirectedCycle { .. })
        ));
    }

    #[test]
    fn almost_directed_cycle_is_illegal() {
        let g = graph("A --> B\nB --> C\nA <-> C");
        assert!(matches!(
            g.paths().mag_legality(),
            Err(MagViolation::AlmostDirectedCycle { .. })
        ));
    }

    #[test]
    fn arrowhead_into_undirected_component_is_illegal() {
        let g = graph("A --- B\nC --> B");
        assert!(matches!(
            g.paths().mag_legality(),
            Err(MagViolation::ArrowheadIntoUndirected { .. })
        ));
        let g = graph("A --- B\nB <-> C");
        assert!(!g.paths().is_legal_mag());
    }

    #[test]
    fn circles_are_not_mag_edges() {
        let g = graph("A o-> B");
        assert!(matches!(
            g.paths().mag_legality(),
            Err(MagViolation::NotMagEdge { .. })
        ));
    }
}
