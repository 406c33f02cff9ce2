//! Mixed graphs with tail, arrow, and circle endpoints.
//!
//! Representation: an `n x n` endpoint matrix. `marks[a * n + b]` holds the
//! endpoint at `b` on the edge `a *-* b` (or nothing if `a` and `b` are not
//! adjacent). There is at most one edge per pair, so the graph is simple by
//! construction, and cloning is a single flat vector copy. The local search
//! clones once per candidate move, which is why this layout was chosen over a
//! list of edge objects.

use crate::error::{GraphError, ParseError};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Endpoints and edges
// ============================================================================

const NO_EDGE: u8 = 0;
const TAIL: u8 = 1;
const ARROW: u8 = 2;
const CIRCLE: u8 = 3;

/// The mark at one end of an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    /// `-`
    Tail,
    /// `>` / `<`
    Arrow,
    /// `o`
    Circle,
}

impl Endpoint {
    #[inline(always)]
    const fn code(self) -> u8 {
        match self {
            Endpoint::Tail => TAIL,
            Endpoint::Arrow => ARROW,
            Endpoint::Circle => CIRCLE,
        }
    }

    #[inline(always)]
    const fn from_code(code: u8) -> Option<Self> {
        match code {
            TAIL => Some(Endpoint::Tail),
            ARROW => Some(Endpoint::Arrow),
            CIRCLE => Some(Endpoint::Circle),
            _ => None,
        }
    }

    /// Character used when this endpoint sits on the left node of an edge string.
    const fn left_char(self) -> char {
        match self {
            Endpoint::Tail => '-',
            Endpoint::Arrow => '<',
            Endpoint::Circle => 'o',
        }
    }

    /// Character used when this endpoint sits on the right node of an edge string.
    const fn right_char(self) -> char {
        match self {
            Endpoint::Tail => '-',
            Endpoint::Arrow => '>',
            Endpoint::Circle => 'o',
        }
    }
}

/// Coarse classification of an edge by its two endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// `a --> b` (either direction).
    Directed,
    /// `a <-> b`
    Bidirected,
    /// `a --- b`
    Undirected,
    /// `a o-o b`
    Nondirected,
    /// `a o-> b` (either direction).
    PartiallyOriented,
    /// Any other combination (`o--`, `<-o` with tail, ...).
    Other,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Directed => "directed",
            EdgeKind::Bidirected => "bidirected",
            EdgeKind::Undirected => "undirected",
            EdgeKind::Nondirected => "nondirected",
            EdgeKind::PartiallyOriented => "partially oriented",
            EdgeKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A snapshot of one edge: node `a` carries endpoint `at_a`, node `b` carries `at_b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    /// First node.
    pub a: usize,
    /// Second node.
    pub b: usize,
    /// Endpoint at `a`.
    pub at_a: Endpoint,
    /// Endpoint at `b`.
    pub at_b: Endpoint,
}

impl Edge {
    /// Returns the edge kind.
    pub fn kind(&self) -> EdgeKind {
        use Endpoint::{Arrow, Circle, Tail};
        match (self.at_a, self.at_b) {
            (Tail, Arrow) | (Arrow, Tail) => EdgeKind::Directed,
            (Arrow, Arrow) => EdgeKind::Bidirected,
            (Tail, Tail) => EdgeKind::Undirected,
            (Circle, Circle) => EdgeKind::Nondirected,
            (Circle, Arrow) | (Arrow, Circle) => EdgeKind::PartiallyOriented,
            _ => EdgeKind::Other,
        }
    }

    /// `true` for `a --> b` or `a <-- b`.
    #[inline]
    pub fn is_directed(&self) -> bool {
        self.kind() == EdgeKind::Directed
    }

    /// `true` for `a <-> b`.
    #[inline]
    pub fn is_bidirected(&self) -> bool {
        self.kind() == EdgeKind::Bidirected
    }

    /// `true` for `a --- b`.
    #[inline]
    pub fn is_undirected(&self) -> bool {
        self.kind() == EdgeKind::Undirected
    }

    /// Returns the endpoint at `node`, if `node` is on this edge.
    pub fn endpoint_at(&self, node: usize) -> Option<Endpoint> {
        if node == self.a {
            Some(self.at_a)
        } else if node == self.b {
            Some(self.at_b)
        } else {
            None
        }
    }

    /// Returns the node at the other end from `node`.
    pub fn other(&self, node: usize) -> usize {
        if node == self.a { self.b } else { self.a }
    }

    /// `true` if the edge carries an arrowhead at either end.
    #[inline]
    pub fn has_arrowhead(&self) -> bool {
        self.at_a == Endpoint::Arrow || self.at_b == Endpoint::Arrow
    }

    /// The edge with its nodes swapped.
    pub fn reversed(&self) -> Edge {
        Edge {
            a: self.b,
            b: self.a,
            at_a: self.at_b,
            at_b: self.at_a,
        }
    }
}

// ============================================================================
// Graph
// ============================================================================

/// A simple mixed graph over named nodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Graph {
    names: Arc<[String]>,
    n: usize,
    marks: Vec<u8>,
}

impl Graph {
    /// Creates an empty graph over the given node names.
    ///
    /// # Errors
    /// Returns an error if a name occurs twice.
    pub fn new<I, S>(names: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(GraphError::DuplicateNode { name: name.clone() });
            }
        }
        let n = names.len();
        Ok(Self {
            names: names.into(),
            n,
            marks: vec![NO_EDGE; n * n],
        })
    }

    /// Creates an empty graph with nodes named `X1..Xn`.
    pub fn with_nodes(n: usize) -> Self {
        let names: Vec<String> = (1..=n).map(|i| format!("X{i}")).collect();
        Self {
            names: names.into(),
            n,
            marks: vec![NO_EDGE; n * n],
        }
    }

    /// An edgeless graph sharing this graph's nodes.
    pub fn empty_like(&self) -> Self {
        Self {
            names: Arc::clone(&self.names),
            n: self.n,
            marks: vec![NO_EDGE; self.n * self.n],
        }
    }

    /// Number of nodes.
    #[inline(always)]
    pub fn num_nodes(&self) -> usize {
        self.n
    }

    /// Node names in index order.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name of node `i`.
    #[inline]
    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    /// Index of the node called `name`.
    pub fn node(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Index of the node called `name`, or an error.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownNode`] if no node has that name.
    pub fn require_node(&self, name: &str) -> Result<usize, GraphError> {
        self.node(name).ok_or_else(|| GraphError::UnknownNode {
            name: name.to_string(),
        })
    }

    #[inline(always)]
    fn slot(&self, a: usize, b: usize) -> usize {
        a * self.n + b
    }

    fn check(&self, a: usize, b: usize) -> Result<(), GraphError> {
        for i in [a, b] {
            if i >= self.n {
                return Err(GraphError::NodeOutOfRange {
                    index: i,
                    len: self.n,
                });
            }
        }
        if a == b {
            return Err(GraphError::SelfLoop {
                node: self.names[a].clone(),
            });
        }
        Ok(())
    }

    /// Whether `a` and `b` share an edge.
    #[inline(always)]
    pub fn is_adjacent(&self, a: usize, b: usize) -> bool {
        a != b && self.marks[self.slot(a, b)] != NO_EDGE
    }

    /// The endpoint at `b` on the edge between `a` and `b`.
    #[inline(always)]
    pub fn endpoint(&self, a: usize, b: usize) -> Option<Endpoint> {
        Endpoint::from_code(self.marks[self.slot(a, b)])
    }

    /// Returns the edge between `a` and `b`, oriented so that `edge.a == a`.
    pub fn edge(&self, a: usize, b: usize) -> Option<Edge> {
        if !self.is_adjacent(a, b) {
            return None;
        }
        Some(Edge {
            a,
            b,
            at_a: self.endpoint(b, a)?,
            at_b: self.endpoint(a, b)?,
        })
    }

    /// Adds an edge with the given endpoints.
    ///
    /// # Errors
    /// Fails on out-of-range nodes, self loops, or if the nodes are already adjacent.
    pub fn add_edge(
        &mut self,
        a: usize,
        b: usize,
        at_a: Endpoint,
        at_b: Endpoint,
    ) -> Result<(), GraphError> {
        self.check(a, b)?;
        if self.is_adjacent(a, b) {
            return Err(GraphError::AlreadyAdjacent {
                a: self.names[a].clone(),
                b: self.names[b].clone(),
            });
        }
        let ab = self.slot(a, b);
        let ba = self.slot(b, a);
        self.marks[ab] = at_b.code();
        self.marks[ba] = at_a.code();
        Ok(())
    }

    /// Adds `a --> b`.
    ///
    /// # Errors
    /// See [`Graph::add_edge`].
    pub fn add_directed_edge(&mut self, a: usize, b: usize) -> Result<(), GraphError> {
        self.add_edge(a, b, Endpoint::Tail, Endpoint::Arrow)
    }

    /// Adds `a <-> b`.
    ///
    /// # Errors
    /// See [`Graph::add_edge`].
    pub fn add_bidirected_edge(&mut self, a: usize, b: usize) -> Result<(), GraphError> {
        self.add_edge(a, b, Endpoint::Arrow, Endpoint::Arrow)
    }

    /// Adds `a --- b`.
    ///
    /// # Errors
    /// See [`Graph::add_edge`].
    pub fn add_undirected_edge(&mut self, a: usize, b: usize) -> Result<(), GraphError> {
        self.add_edge(a, b, Endpoint::Tail, Endpoint::Tail)
    }

    /// Adds `a o-o b`.
    ///
    /// # Errors
    /// See [`Graph::add_edge`].
    pub fn add_nondirected_edge(&mut self, a: usize, b: usize) -> Result<(), GraphError> {
        self.add_edge(a, b, Endpoint::Circle, Endpoint::Circle)
    }

    /// Adds `a o-> b`.
    ///
    /// # Errors
    /// See [`Graph::add_edge`].
    pub fn add_partially_oriented_edge(&mut self, a: usize, b: usize) -> Result<(), GraphError> {
        self.add_edge(a, b, Endpoint::Circle, Endpoint::Arrow)
    }

    /// Removes the edge between `a` and `b`, returning it if it existed.
    pub fn remove_edge(&mut self, a: usize, b: usize) -> Option<Edge> {
        let edge = self.edge(a, b)?;
        let ab = self.slot(a, b);
        let ba = self.slot(b, a);
        self.marks[ab] = NO_EDGE;
        self.marks[ba] = NO_EDGE;
        Some(edge)
    }

    /// Removes the edge between `a` and `b` only if it is of the expected kind.
    ///
    /// For [`EdgeKind::Directed`] the direction is not checked.
    ///
    /// # Errors
    /// Returns [`GraphError::NotAdjacent`] or [`GraphError::EdgeKindMismatch`].
    pub fn remove_edge_of_kind(
        &mut self,
        a: usize,
        b: usize,
        kind: EdgeKind,
    ) -> Result<Edge, GraphError> {
        self.check(a, b)?;
        let Some(edge) = self.edge(a, b) else {
            return Err(GraphError::NotAdjacent {
                a: self.names[a].clone(),
                b: self.names[b].clone(),
            });
        };
        if edge.kind() != kind {
            return Err(GraphError::EdgeKindMismatch {
                a: self.names[a].clone(),
                b: self.names[b].clone(),
                expected: kind_name(kind),
                found: self.edge_string(&edge),
            });
        }
        self.remove_edge(a, b);
        Ok(edge)
    }

    /// Sets the endpoint at `b` on the existing edge between `a` and `b`.
    ///
    /// # Errors
    /// Returns [`GraphError::NotAdjacent`] if there is no such edge.
    pub fn set_endpoint(&mut self, a: usize, b: usize, endpoint: Endpoint) -> Result<(), GraphError> {
        self.check(a, b)?;
        if !self.is_adjacent(a, b) {
            return Err(GraphError::NotAdjacent {
                a: self.names[a].clone(),
                b: self.names[b].clone(),
            });
        }
        let ab = self.slot(a, b);
        self.marks[ab] = endpoint.code();
        Ok(())
    }

    /// Rewrites every endpoint in the graph to `endpoint`, keeping the skeleton.
    pub fn reorient_all_with(&mut self, endpoint: Endpoint) {
        let code = endpoint.code();
        for m in &mut self.marks {
            if *m != NO_EDGE {
                *m = code;
            }
        }
    }

    /// Nodes adjacent to `a`, in index order.
    pub fn adjacent(&self, a: usize) -> impl Iterator<Item = usize> + '_ {
        let row = &self.marks[a * self.n..(a + 1) * self.n];
        row.iter()
            .enumerate()
            .filter(move |&(b, &m)| m != NO_EDGE && b != a)
            .map(|(b, _)| b)
    }

    /// Nodes adjacent to `a`, collected.
    pub fn adjacent_nodes(&self, a: usize) -> Vec<usize> {
        self.adjacent(a).collect()
    }

    /// Degree of `a`.
    pub fn degree(&self, a: usize) -> usize {
        self.adjacent(a).count()
    }

    /// All edges, each reported once with `a < b`.
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        (0..self.n).flat_map(move |a| {
            ((a + 1)..self.n).filter_map(move |b| self.edge(a, b))
        })
    }

    /// Edges incident to `a`, each oriented with `edge.a == a`.
    pub fn edges_of(&self, a: usize) -> impl Iterator<Item = Edge> + '_ {
        self.adjacent(a).filter_map(move |b| self.edge(a, b))
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.marks.iter().filter(|&&m| m != NO_EDGE).count() / 2
    }

    /// Nodes `x` with an edge `x *-e node`, i.e. endpoint `e` at `node`.
    pub fn nodes_into(&self, node: usize, e: Endpoint) -> Vec<usize> {
        self.adjacent(node)
            .filter(|&x| self.endpoint(x, node) == Some(e))
            .collect()
    }

    /// Nodes `x` with an edge `node *-e x`, i.e. endpoint `e` at `x`.
    pub fn nodes_out_to(&self, node: usize, e: Endpoint) -> Vec<usize> {
        self.adjacent(node)
            .filter(|&x| self.endpoint(node, x) == Some(e))
            .collect()
    }

    /// Whether `a --> b`.
    #[inline]
    pub fn is_parent_of(&self, a: usize, b: usize) -> bool {
        self.endpoint(a, b) == Some(Endpoint::Arrow) && self.endpoint(b, a) == Some(Endpoint::Tail)
    }

    /// Parents of `b`.
    pub fn parents(&self, b: usize) -> Vec<usize> {
        self.adjacent(b).filter(|&a| self.is_parent_of(a, b)).collect()
    }

    /// Children of `a`.
    pub fn children(&self, a: usize) -> Vec<usize> {
        self.adjacent(a).filter(|&b| self.is_parent_of(a, b)).collect()
    }

    /// Nodes joined to `a` by a bidirected edge.
    pub fn spouses(&self, a: usize) -> Vec<usize> {
        self.adjacent(a)
            .filter(|&b| {
                self.endpoint(a, b) == Some(Endpoint::Arrow)
                    && self.endpoint(b, a) == Some(Endpoint::Arrow)
            })
            .collect()
    }

    /// Whether `a *-> b <-* c`.
    pub fn is_def_collider(&self, a: usize, b: usize, c: usize) -> bool {
        self.endpoint(a, b) == Some(Endpoint::Arrow) && self.endpoint(c, b) == Some(Endpoint::Arrow)
    }

    /// Whether some edge has an arrowhead at `v`.
    pub fn has_arrowhead_into(&self, v: usize) -> bool {
        self.adjacent(v)
            .any(|x| self.endpoint(x, v) == Some(Endpoint::Arrow))
    }

    /// Whether some edge incident to `v` carries an arrowhead at either end.
    ///
    /// This covers incoming and outgoing directed edges as well as bidirected ones.
    pub fn has_any_arrowhead_incident(&self, v: usize) -> bool {
        self.edges_of(v).any(|e| e.has_arrowhead())
    }

    /// Whether `v` is incident to an undirected edge.
    pub fn has_undirected_incident(&self, v: usize) -> bool {
        self.edges_of(v).any(|e| e.is_undirected())
    }

    /// The induced subgraph over `nodes` (re-indexed in the given order).
    pub fn subgraph(&self, nodes: &[usize]) -> Graph {
        let names: Vec<String> = nodes.iter().map(|&i| self.names[i].clone()).collect();
        let k = nodes.len();
        let mut marks = vec![NO_EDGE; k * k];
        for (i, &a) in nodes.iter().enumerate() {
            for (j, &b) in nodes.iter().enumerate() {
                marks[i * k + j] = self.marks[self.slot(a, b)];
            }
        }
        Graph {
            names: names.into(),
            n: k,
            marks,
        }
    }

    /// Whether every edge is directed, bidirected, or undirected.
    pub fn is_mixed_without_circles(&self) -> bool {
        !self.marks.contains(&CIRCLE)
    }

    /// Formats an edge as `A --> B` using node names.
    pub fn edge_string(&self, edge: &Edge) -> String {
        format!(
            "{} {}-{} {}",
            self.names[edge.a],
            edge.at_a.left_char(),
            edge.at_b.right_char(),
            self.names[edge.b]
        )
    }

    /// Sorted edge strings with the lexicographically smaller name on the left.
    pub fn sorted_edge_strings(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .edges()
            .map(|e| {
                let e = if self.names[e.a] <= self.names[e.b] { e } else { e.reversed() };
                self.edge_string(&e)
            })
            .collect();
        lines.sort();
        lines
    }

    /// Builds a graph from node names and edge lines such as `A --> B` or `B o-o C`.
    ///
    /// # Errors
    /// Returns an error on unknown names, malformed lines, or duplicate edges.
    pub fn from_edges<S: AsRef<str>>(names: &[S], edges: &str) -> Result<Graph, ParseError> {
        let mut graph = Graph::new(names.iter().map(|s| s.as_ref().to_string()))?;
        for (line_no, line) in edges.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            add_edge_line(&mut graph, line, line_no + 1)?;
        }
        Ok(graph)
    }
}

fn kind_name(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Directed => "directed",
        EdgeKind::Bidirected => "bidirected",
        EdgeKind::Undirected => "undirected",
        EdgeKind::Nondirected => "nondirected",
        EdgeKind::PartiallyOriented => "partially oriented",
        EdgeKind::Other => "other",
    }
}

impl fmt::Display for Graph {
    /// Writes the graph in the `Graph Nodes:` / `Graph Edges:` text layout.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph Nodes:")?;
        writeln!(f, "{}", self.names.join(";"))?;
        writeln!(f)?;
        writeln!(f, "Graph Edges:")?;
        for (i, line) in self.sorted_edge_strings().iter().enumerate() {
            writeln!(f, "{}. {line}", i + 1)?;
        }
        Ok(())
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn parse_marks(arrow: &str) -> Option<(Endpoint, Endpoint)> {
    let bytes = arrow.as_bytes();
    if bytes.len() != 3 || bytes[1] != b'-' {
        return None;
    }
    let left = match bytes[0] {
        b'-' => Endpoint::Tail,
        b'<' => Endpoint::Arrow,
        b'o' => Endpoint::Circle,
        _ => return None,
    };
    let right = match bytes[2] {
        b'-' => Endpoint::Tail,
        b'>' => Endpoint::Arrow,
        b'o' => Endpoint::Circle,
        _ => return None,
    };
    Some((left, right))
}

fn add_edge_line(graph: &mut Graph, line: &str, line_no: usize) -> Result<(), ParseError> {
    let mut tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first().is_some_and(|t| t.ends_with('.')) {
        tokens.remove(0);
    }
    let [a, arrow, b] = tokens[..] else {
        return Err(ParseError::Malformed {
            line: line_no,
            message: format!("expected `A <mark>-<mark> B`, got {line:?}"),
        });
    };
    let (at_a, at_b) = parse_marks(arrow).ok_or_else(|| ParseError::Malformed {
        line: line_no,
        message: format!("unrecognized edge {arrow:?}"),
    })?;
    let a = graph.require_node(a)?;
    let b = graph.require_node(b)?;
    graph.add_edge(a, b, at_a, at_b)?;
    Ok(())
}

/// Parses the `Graph Nodes:` / `Graph Edges:` layout produced by `Display`.
///
/// Node names may be separated by `;` or `,`. Edge lines may carry a leading
/// `N.` counter.
///
/// # Errors
/// Returns an error if a section is missing or an edge line is malformed.
pub fn parse_graph(text: &str) -> Result<Graph, ParseError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty())
        .peekable();

    let Some((line_no, header)) = lines.next() else {
        return Err(ParseError::Empty);
    };
    if header != "Graph Nodes:" {
        return Err(ParseError::Malformed {
            line: line_no,
            message: "expected `Graph Nodes:`".to_string(),
        });
    }
    // A graph without nodes prints an empty node line, which trimming drops.
    let (line_no, node_line) = if matches!(lines.peek(), Some((_, "Graph Edges:"))) {
        (line_no, "")
    } else {
        lines.next().ok_or(ParseError::Malformed {
            line: line_no + 1,
            message: "missing node list".to_string(),
        })?
    };
    let names: Vec<&str> = node_line
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    let mut graph = Graph::new(names.iter().copied())?;

    match lines.next() {
        None => return Ok(graph),
        Some((_, "Graph Edges:")) => {}
        Some((n, _)) => {
            return Err(ParseError::Malformed {
                line: n.max(line_no),
                message: "expected `Graph Edges:`".to_string(),
            });
        }
    }
    for (n, line) in lines {
        add_edge_line(&mut graph, line, n)?;
    }
    Ok(graph)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Graph {
        Graph::new(["A", "B", "C"]).unwrap()
    }

    #[test]
    fn endpoint_matrix_is_consistent() {
        let mut g = abc();
        g.add_directed_edge(0, 1).unwrap();
        assert_eq!(g.endpoint(0, 1), Some(Endpoint::Arrow));
        assert_eq!(g.endpoint(1, 0), Some(Endpoint::Tail));
        assert!(g.is_parent_of(0, 1));
        assert!(!g.is_parent_of(1, 0));
        assert_eq!(g.parents(1), vec![0]);
        assert_eq!(g.children(0), vec![1]);
        assert_eq!(g.num_edges(), 1);
    }

    #[test]
    fn adding_twice_is_rejected() {
        let mut g = abc();
        g.add_bidirected_edge(0, 2).unwrap();
        let err = g.add_directed_edge(2, 0).unwrap_err();
        assert!(matches!(err, GraphError::AlreadyAdjacent { .. }));
        assert!(matches!(
            g.add_directed_edge(1, 1),
            Err(GraphError::SelfLoop { .. })
        ));
    }

    #[test]
    fn remove_edge_of_kind_checks_kind() {
        let mut g = abc();
        g.add_bidirected_edge(0, 1).unwrap();
        let err = g.remove_edge_of_kind(0, 1, EdgeKind::Directed).unwrap_err();
        assert!(matches!(err, GraphError::EdgeKindMismatch { .. }));
        assert!(g.is_adjacent(0, 1));
        let removed = g.remove_edge_of_kind(1, 0, EdgeKind::Bidirected).unwrap();
        assert!(removed.is_bidirected());
        assert!(!g.is_adjacent(0, 1));
    }

    #[test]
    fn arrowhead_queries() {
        let mut g = abc();
        g.add_directed_edge(0, 1).unwrap();
        g.add_undirected_edge(1, 2).unwrap();
        assert!(g.has_any_arrowhead_incident(0));
        assert!(!g.has_arrowhead_into(0));
        assert!(g.has_arrowhead_into(1));
        assert!(g.has_undirected_incident(2));
        assert!(!g.has_any_arrowhead_incident(2));
        assert_eq!(g.nodes_into(1, Endpoint::Arrow), vec![0]);
        assert_eq!(g.nodes_out_to(0, Endpoint::Arrow), vec![1]);
    }

    #[test]
    fn spouses_and_colliders() {
        let g = Graph::from_edges(&["A", "B", "C"], "A <-> B\nC --> B").unwrap();
        assert_eq!(g.spouses(0), vec![1]);
        assert!(g.is_def_collider(0, 1, 2));
        assert!(!g.is_def_collider(1, 0, 2));
    }

    #[test]
    fn display_and_parse_round_trip() {
        let g = Graph::from_edges(&["A", "B", "C", "D"], "A --> B\nC o-> B\nD <-> C\nA o-o D").unwrap();
        let text = g.to_string();
        assert!(text.contains("1. A --> B"));
        assert!(text.contains("C o-> B"));
        let parsed = parse_graph(&text).unwrap();
        assert_eq!(parsed, g);
    }

    #[test]
    fn empty_graph_round_trips() {
        let g = Graph::with_nodes(0);
        let parsed = parse_graph(&g.to_string()).unwrap();
        assert_eq!(parsed.num_nodes(), 0);
        assert_eq!(parsed, g);

        let parsed = parse_graph("Graph Nodes:\nA;B\n\nGraph Edges:\n").unwrap();
        assert_eq!(parsed.num_edges(), 0);
        assert_eq!(parsed.names(), &["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn sorted_edge_strings_put_smaller_name_left() {
        let g = Graph::from_edges(&["A", "B"], "B --> A").unwrap();
        assert_eq!(g.sorted_edge_strings(), vec!["A <-- B".to_string()]);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(parse_graph(""), Err(ParseError::Empty)));
        let err = Graph::from_edges(&["A", "B"], "A ==> B").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 1, .. }));
        let err = Graph::from_edges(&["A", "B"], "A --> Z").unwrap_err();
        assert!(matches!(err, ParseError::Graph(GraphError::UnknownNode { .. })));
    }

    #[test]
    fn subgraph_keeps_induced_edges() {
        let g = Graph::from_edges(&["A", "B", "C"], "A --> B\nB --- C\nA <-> C").unwrap();
        let sub = g.subgraph(&[2, 1]);
        assert_eq!(sub.names(), &["C".to_string(), "B".to_string()]);
        assert_eq!(sub.num_edges(), 1);
        assert!(sub.edge(0, 1).unwrap().is_undirected());
    }

    #[test]
    fn reorient_all_with_circles_keeps_skeleton() {
        let mut g = Graph::from_edges(&["A", "B", "C"], "A --> B\nB <-> C").unwrap();
        g.reorient_all_with(Endpoint::Circle);
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.edge(0, 1).unwrap().kind(), EdgeKind::Nondirected);
        assert!(!g.is_mixed_without_circles());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        assert!(matches!(
            Graph::new(["A", "A"]),
            Err(GraphError::DuplicateNode { .. })
        ));
    }
}
