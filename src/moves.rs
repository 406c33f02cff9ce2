//! Local edit moves over MAGs and their legality preconditions.
//!
//! A move adds or removes one directed, bidirected, or undirected edge. The
//! validity checks are stricter than MAG legality itself: an undirected edge
//! may only join nodes with no arrowhead incidence at all, and directed or
//! bidirected edges may not touch the undirected component.

use crate::error::GraphError;
use crate::graph::{EdgeKind, Graph};
use rand::Rng;
use rand::seq::SliceRandom;
use std::fmt;

// ============================================================================
// Move Types
// ============================================================================

/// The six kinds of local edits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MoveKind {
    /// Add `x --> y`.
    AddDir,
    /// Remove `x --> y`.
    RemDir,
    /// Add `x <-> y`.
    AddBi,
    /// Remove `x <-> y`.
    RemBi,
    /// Add `x --- y`.
    AddUg,
    /// Remove `x --- y`.
    RemUg,
}

impl MoveKind {
    /// Tag used in move keys.
    pub const fn label(self) -> &'static str {
        match self {
            MoveKind::AddDir => "ADD_DIR",
            MoveKind::RemDir => "REM_DIR",
            MoveKind::AddBi => "ADD_BI",
            MoveKind::RemBi => "REM_BI",
            MoveKind::AddUg => "ADD_UG",
            MoveKind::RemUg => "REM_UG",
        }
    }

    /// Whether the move adds an edge.
    pub const fn is_addition(self) -> bool {
        matches!(self, MoveKind::AddDir | MoveKind::AddBi | MoveKind::AddUg)
    }

    /// Edge kind the move creates or removes.
    pub const fn edge_kind(self) -> EdgeKind {
        match self {
            MoveKind::AddDir | MoveKind::RemDir => EdgeKind::Directed,
            MoveKind::AddBi | MoveKind::RemBi => EdgeKind::Bidirected,
            MoveKind::AddUg | MoveKind::RemUg => EdgeKind::Undirected,
        }
    }

    const fn is_symmetric(self) -> bool {
        !matches!(self, MoveKind::AddDir | MoveKind::RemDir)
    }
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One local edit. For directed moves `x` is the tail and `y` the head; for
/// the symmetric kinds the pair is stored with `x < y`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Move {
    /// Kind of edit.
    pub kind: MoveKind,
    /// First node (tail for directed moves).
    pub x: usize,
    /// Second node (head for directed moves).
    pub y: usize,
}

impl Move {
    /// Creates a move, normalizing the pair order of symmetric kinds.
    pub fn new(kind: MoveKind, x: usize, y: usize) -> Self {
        if kind.is_symmetric() && y < x {
            Self { kind, x: y, y: x }
        } else {
            Self { kind, x, y }
        }
    }

    /// The move that undoes this one when applied next.
    pub fn inverse(&self) -> Move {
        let kind = match self.kind {
            MoveKind::AddDir => MoveKind::RemDir,
            MoveKind::RemDir => MoveKind::AddDir,
            MoveKind::AddBi => MoveKind::RemBi,
            MoveKind::RemBi => MoveKind::AddBi,
            MoveKind::AddUg => MoveKind::RemUg,
            MoveKind::RemUg => MoveKind::AddUg,
        };
        Move {
            kind,
            x: self.x,
            y: self.y,
        }
    }

    /// Key `KIND:x-y` with node indices.
    pub fn key(&self) -> String {
        format!("{}:{}-{}", self.kind, self.x, self.y)
    }

    /// Key `KIND:x-y` with node names from `graph`.
    pub fn key_in(&self, graph: &Graph) -> String {
        format!("{}:{}-{}", self.kind, graph.name(self.x), graph.name(self.y))
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

// ============================================================================
// Enumeration and Validity
// ============================================================================

/// All local moves on `graph`, in a deterministic order.
///
/// For each pair `i < j`: if not adjacent, `ADD_DIR(i,j)`, `ADD_DIR(j,i)`,
/// `ADD_BI(i,j)`, `ADD_UG(i,j)`; if adjacent, the single removal matching the
/// edge's kind. Edges that are none of the three MAG kinds yield no move.
pub fn enumerate_local_moves(graph: &Graph) -> Vec<Move> {
    let n = graph.num_nodes();
    let mut moves = Vec::with_capacity(2 * n * n);
    for i in 0..n {
        for j in (i + 1)..n {
            match graph.edge(i, j) {
                None => {
                    moves.push(Move::new(MoveKind::AddDir, i, j));
                    moves.push(Move::new(MoveKind::AddDir, j, i));
                    moves.push(Move::new(MoveKind::AddBi, i, j));
                    moves.push(Move::new(MoveKind::AddUg, i, j));
                }
                Some(edge) => match edge.kind() {
                    EdgeKind::Directed if graph.is_parent_of(i, j) => {
                        moves.push(Move::new(MoveKind::RemDir, i, j));
                    }
                    EdgeKind::Directed => moves.push(Move::new(MoveKind::RemDir, j, i)),
                    EdgeKind::Bidirected => moves.push(Move::new(MoveKind::RemBi, i, j)),
                    EdgeKind::Undirected => moves.push(Move::new(MoveKind::RemUg, i, j)),
                    _ => {}
                },
            }
        }
    }
    moves
}

/// Whether `mv` may be applied to `graph` without breaking MAG legality.
///
/// Pure; the graph is not touched.
pub fn is_valid(mv: &Move, graph: &Graph) -> bool {
    let (x, y) = (mv.x, mv.y);
    let n = graph.num_nodes();
    if x >= n || y >= n || x == y {
        return false;
    }
    let paths = graph.paths();
    match mv.kind {
        MoveKind::AddDir => {
            !graph.is_adjacent(x, y)
                && !paths.exists_directed_path(y, x)
                && !graph.has_undirected_incident(x)
                && !graph.has_undirected_incident(y)
                && !closes_almost_directed_cycle(graph, x, y)
        }
        MoveKind::AddBi => {
            !graph.is_adjacent(x, y)
                && !paths.exists_directed_path(x, y)
                && !paths.exists_directed_path(y, x)
                && !graph.has_undirected_incident(x)
                && !graph.has_undirected_incident(y)
        }
        MoveKind::AddUg => {
            !graph.is_adjacent(x, y)
                && !graph.has_any_arrowhead_incident(x)
                && !graph.has_any_arrowhead_incident(y)
        }
        MoveKind::RemDir | MoveKind::RemBi | MoveKind::RemUg => graph.is_adjacent(x, y),
    }
}

/// Whether adding `x --> y` would create a directed path between the ends
/// of an existing bidirected edge.
fn closes_almost_directed_cycle(graph: &Graph, x: usize, y: usize) -> bool {
    let paths = graph.paths();
    let upstream = paths.ancestors_of(&[x]);
    let downstream = paths.descendants_of(&[y]);
    upstream
        .iter()
        .any(|&a| graph.spouses(a).iter().any(|b| downstream.binary_search(b).is_ok()))
}

/// Valid moves on `graph`, in enumeration order.
pub fn valid_moves(graph: &Graph) -> Vec<Move> {
    enumerate_local_moves(graph)
        .into_iter()
        .filter(|mv| is_valid(mv, graph))
        .collect()
}

// ============================================================================
// Move Application
// ============================================================================

fn remove_directed(graph: &mut Graph, x: usize, y: usize) -> Result<(), GraphError> {
    if graph.is_adjacent(x, y) && !graph.is_parent_of(x, y) {
        let found = graph
            .edge(x, y)
            .map(|e| graph.edge_string(&e))
            .unwrap_or_default();
        return Err(GraphError::EdgeKindMismatch {
            a: graph.name(x).to_string(),
            b: graph.name(y).to_string(),
            expected: "directed",
            found,
        });
    }
    graph.remove_edge_of_kind(x, y, EdgeKind::Directed).map(|_| ())
}

/// Applies `mv` to `graph` in place.
///
/// # Errors
/// Additions fail if the nodes are already adjacent; removals fail if there is
/// no edge or it is of another kind (or, for `REM_DIR`, points the other way).
pub fn apply(mv: &Move, graph: &mut Graph) -> Result<(), GraphError> {
    let (x, y) = (mv.x, mv.y);
    match mv.kind {
        MoveKind::AddDir => graph.add_directed_edge(x, y),
        MoveKind::AddBi => graph.add_bidirected_edge(x, y),
        MoveKind::AddUg => graph.add_undirected_edge(x, y),
        MoveKind::RemDir => remove_directed(graph, x, y),
        MoveKind::RemBi => graph.remove_edge_of_kind(x, y, EdgeKind::Bidirected).map(|_| ()),
        MoveKind::RemUg => graph.remove_edge_of_kind(x, y, EdgeKind::Undirected).map(|_| ()),
    }
}

/// Reverts `mv`, which must have just been applied to `graph`.
///
/// # Errors
/// See [`apply`]; undo is applying the inverse move.
pub fn undo(mv: &Move, graph: &mut Graph) -> Result<(), GraphError> {
    apply(&mv.inverse(), graph)
}

/// A copy of `graph` with `mv` applied.
///
/// # Errors
/// See [`apply`].
pub fn applied(mv: &Move, graph: &Graph) -> Result<Graph, GraphError> {
    let mut g = graph.clone();
    apply(mv, &mut g)?;
    Ok(g)
}

// ============================================================================
// Random Moves
// ============================================================================

/// Applies up to `count` random valid additions to `graph`, returning the moves used.
pub fn random_valid_additions<R: Rng>(graph: &mut Graph, count: usize, rng: &mut R) -> Vec<Move> {
    let mut used = Vec::with_capacity(count);
    for _ in 0..count {
        let mut candidates: Vec<Move> = valid_moves(graph)
            .into_iter()
            .filter(|mv| mv.kind.is_addition())
            .collect();
        if candidates.is_empty() {
            break;
        }
        candidates.shuffle(rng);
        let mv = candidates[0];
        if apply(&mv, graph).is_ok() {
            used.push(mv);
        }
    }
    used
}

// ============================================================================
// Tests
// ============================================================================
