//! FCI orientation rules over partial ancestral graphs.
//!
//! [`FciOrient`] resets a skeleton to circles, applies background knowledge,
//! orients unshielded colliders (R0) and then runs Zhang's final orientation
//! rules R1 through R10. The two decisions that need more than the graph
//! itself, whether an unshielded triple is a collider and how to orient the
//! end of a discriminating path, are delegated to an [`R0R4Strategy`].

use crate::error::ConfigError;
use crate::graph::{Endpoint, Graph};
use crate::knowledge::Knowledge;
use crate::paths::is_potentially_directed_step;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

// ============================================================================
// Strategy
// ============================================================================

/// Decision points of the orientation engine that depend on a model or a test.
pub trait R0R4Strategy {
    /// Whether the unshielded triple `x *-* z *-* y` is a collider at `z`.
    fn is_unshielded_collider(&self, graph: &Graph, x: usize, z: usize, y: usize) -> bool;

    /// Orients the `v` end of a discriminating path in place.
    ///
    /// Returns `true` if an endpoint was changed.
    fn do_discriminating_path_orientation(&self, path: &DiscriminatingPath, graph: &mut Graph) -> bool;
}

/// Whether an arrowhead may be placed at `y` on the edge `x *-* y`.
///
/// An existing arrowhead is kept and an existing tail is final. A circle may
/// become an arrowhead unless knowledge requires `y --> x`, or forbids
/// `x --> y` while the mark at `x` is not already an arrowhead.
pub fn is_arrowhead_allowed(x: usize, y: usize, graph: &Graph, knowledge: &Knowledge) -> bool {
    match graph.endpoint(x, y) {
        None | Some(Endpoint::Tail) => false,
        Some(Endpoint::Arrow) => true,
        Some(Endpoint::Circle) => {
            let (nx, ny) = (graph.name(x), graph.name(y));
            if knowledge.is_required(ny, nx) {
                return false;
            }
            !(knowledge.is_forbidden(nx, ny) && graph.endpoint(y, x) != Some(Endpoint::Arrow))
        }
    }
}

/// Sets the mark at `b` on `a *-* b`; returns whether it changed.
pub(crate) fn set_mark(graph: &mut Graph, a: usize, b: usize, e: Endpoint) -> bool {
    match graph.endpoint(a, b) {
        Some(cur) if cur != e => graph.set_endpoint(a, b, e).is_ok(),
        _ => false,
    }
}

// ============================================================================
// Discriminating Paths
// ============================================================================

/// A discriminating path `x *-> c_k <-> ... <-> c_1 <-* v *-o y` for `v`.
///
/// `collider_path` lists the interior nodes starting at `w == c_1` (adjacent to
/// `v`) and walking outwards to `c_k` (adjacent to `x`). Every interior node is
/// a collider on the path and a parent of `y`; `x` and `y` are not adjacent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DiscriminatingPath {
    /// Far end of the path, not adjacent to `y`.
    pub x: usize,
    /// Interior node adjacent to `v`.
    pub w: usize,
    /// Node whose collider status is decided.
    pub v: usize,
    /// Near end of the path.
    pub y: usize,
    /// Interior nodes from `w` outwards.
    pub collider_path: Vec<usize>,
}

impl DiscriminatingPath {
    /// Nodes of the path in order `x, c_k, ..., c_1, v, y`.
    pub fn nodes(&self) -> Vec<usize> {
        let mut nodes = Vec::with_capacity(self.collider_path.len() + 3);
        nodes.push(self.x);
        nodes.extend(self.collider_path.iter().rev());
        nodes.push(self.v);
        nodes.push(self.y);
        nodes
    }

    /// Whether this is still a discriminating path in `graph` with a circle at `v`
    /// on the `v *-* y` edge.
    pub fn exists_in(&self, graph: &Graph) -> bool {
        let (x, v, y) = (self.x, self.v, self.y);
        if self.collider_path.first() != Some(&self.w) {
            return false;
        }
        if x == y || graph.is_adjacent(x, y) {
            return false;
        }
        if graph.endpoint(y, v) != Some(Endpoint::Circle) {
            return false;
        }

        let nodes = self.nodes();
        let mut seen = HashSet::with_capacity(nodes.len());
        if !nodes.iter().all(|&n| seen.insert(n)) {
            return false;
        }

        // interior nodes sit between x and v
        (1..nodes.len() - 2).all(|i| {
            let (prev, t, next) = (nodes[i - 1], nodes[i], nodes[i + 1]);
            graph.is_def_collider(prev, t, next) && graph.is_parent_of(t, y)
        })
    }
}

/// All discriminating paths in `graph` whose `v *-* y` edge is `v o-> y`.
///
/// `max_len` bounds the number of nodes on a path (`None` for no bound).
/// The result is in a deterministic order and free of duplicates.
pub fn list_discriminating_paths(graph: &Graph, max_len: Option<usize>) -> Vec<DiscriminatingPath> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for w in 0..graph.num_nodes() {
        for y in graph.children(w) {
            for v in graph.adjacent(w) {
                if v == y || !graph.is_adjacent(v, y) {
                    continue;
                }
                if graph.endpoint(y, v) != Some(Endpoint::Circle)
                    || graph.endpoint(v, y) != Some(Endpoint::Arrow)
                {
                    continue;
                }
                discriminating_path_bfs(graph, w, v, y, max_len, &mut seen, &mut out);
            }
        }
    }
    out
}

fn discriminating_path_bfs(
    graph: &Graph,
    w: usize,
    v: usize,
    y: usize,
    max_len: Option<usize>,
    seen: &mut HashSet<DiscriminatingPath>,
    out: &mut Vec<DiscriminatingPath>,
) {
    struct State {
        t: usize,
        p: Option<usize>,
        path: Vec<usize>,
    }

    let mut queue = VecDeque::from([State { t: w, p: None, path: Vec::new() }]);
    while let Some(State { t, p, path }) = queue.pop_front() {
        if let Some(p) = p {
            // t must be a collider on the path and a parent of y to extend past it
            if graph.endpoint(p, t) != Some(Endpoint::Arrow) || !graph.is_parent_of(t, y) {
                continue;
            }
        }

        for x in graph.nodes_into(t, Endpoint::Arrow) {
            if Some(x) == p || path.contains(&x) {
                continue;
            }
            let mut collider_path = path.clone();
            collider_path.push(t);
            if max_len.is_some_and(|max| collider_path.len() + 3 > max) {
                continue;
            }

            let dp = DiscriminatingPath {
                x,
                w,
                v,
                y,
                collider_path: collider_path.clone(),
            };
            if dp.exists_in(graph) && !seen.contains(&dp) {
                seen.insert(dp.clone());
                out.push(dp);
            }

            if graph.is_parent_of(x, y) {
                queue.push_back(State {
                    t: x,
                    p: Some(t),
                    path: collider_path,
                });
            }
        }
    }
}

// ============================================================================
// Orientation Engine
// ============================================================================

/// The FCI final orientation engine.
#[derive(Clone, Debug)]
pub struct FciOrient<'s, S: ?Sized> {
    strategy: &'s S,
    knowledge: Knowledge,
    complete_rule_set: bool,
    max_path_length: Option<usize>,
}

impl<'s, S: R0R4Strategy + ?Sized> FciOrient<'s, S> {
    /// Creates an engine using the full rule set and unbounded discriminating paths.
    pub fn new(strategy: &'s S, knowledge: Knowledge) -> Self {
        Self {
            strategy,
            knowledge,
            complete_rule_set: true,
            max_path_length: None,
        }
    }

    /// Enables R5 through R10 (on by default).
    pub fn with_complete_rule_set(mut self, complete: bool) -> Self {
        self.complete_rule_set = complete;
        self
    }

    /// Bounds the number of nodes on a discriminating path.
    ///
    /// # Errors
    /// Fails for bounds below 4, the length of the shortest discriminating path.
    pub fn with_max_discriminating_path_length(mut self, max: Option<usize>) -> Result<Self, ConfigError> {
        if let Some(max) = max {
            if max < 4 {
                return Err(ConfigError::BadDiscriminatingPathLength(max));
            }
        }
        self.max_path_length = max;
        Ok(self)
    }

    /// Background knowledge in use.
    pub fn knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    /// Whether R5 through R10 run.
    pub fn complete_rule_set(&self) -> bool {
        self.complete_rule_set
    }

    /// Orients `graph` from its skeleton. Existing endpoints are discarded.
    pub fn orient(&self, graph: &mut Graph) {
        self.rule_r0(graph);
        self.final_orientation(graph);
    }

    /// Resets every mark to a circle, applies knowledge, and orients the
    /// unshielded colliders the strategy accepts.
    pub fn rule_r0(&self, graph: &mut Graph) -> bool {
        graph.reorient_all_with(Endpoint::Circle);
        let mut changed = self.orient_with_knowledge(graph);

        for b in 0..graph.num_nodes() {
            let adj = graph.adjacent_nodes(b);
            for (i, &a) in adj.iter().enumerate() {
                for &c in &adj[i + 1..] {
                    if graph.is_adjacent(a, c) || graph.is_def_collider(a, b, c) {
                        continue;
                    }
                    if !self.strategy.is_unshielded_collider(graph, a, b, c) {
                        continue;
                    }
                    if !is_arrowhead_allowed(a, b, graph, &self.knowledge)
                        || !is_arrowhead_allowed(c, b, graph, &self.knowledge)
                    {
                        continue;
                    }
                    set_mark(graph, a, b, Endpoint::Arrow);
                    set_mark(graph, c, b, Endpoint::Arrow);
                    debug!(
                        collider = %format!("{} *-> {} <-* {}", graph.name(a), graph.name(b), graph.name(c)),
                        "R0"
                    );
                    changed = true;
                }
            }
        }
        changed
    }

    /// Forbidden `x --> y` puts an arrowhead at `x`; required `x --> y` is oriented as such.
    fn orient_with_knowledge(&self, graph: &mut Graph) -> bool {
        if self.knowledge.is_empty() {
            return false;
        }
        let mut changed = false;
        for from in 0..graph.num_nodes() {
            for to in graph.adjacent_nodes(from) {
                if !self.knowledge.is_forbidden(graph.name(from), graph.name(to)) {
                    continue;
                }
                if is_arrowhead_allowed(to, from, graph, &self.knowledge) {
                    changed |= set_mark(graph, to, from, Endpoint::Arrow);
                }
            }
        }

        let required: Vec<(usize, usize)> = self
            .knowledge
            .required_edges()
            .filter_map(|(x, y)| Some((graph.node(x)?, graph.node(y)?)))
            .collect();
        for (from, to) in required {
            if !graph.is_adjacent(from, to) || !is_arrowhead_allowed(from, to, graph, &self.knowledge) {
                continue;
            }
            changed |= set_mark(graph, to, from, Endpoint::Tail);
            changed |= set_mark(graph, from, to, Endpoint::Arrow);
        }
        changed
    }

    /// Runs R1 through R4 to a fixpoint, then R5 through R10 if enabled.
    pub fn final_orientation(&self, graph: &mut Graph) {
        let mut first = true;
        loop {
            let mut changed = self.rules_r1_r2_cycle(graph);
            changed |= self.rule_r3(graph);
            if changed || (first && !self.knowledge.is_empty()) {
                changed |= self.rule_r4(graph);
                first = false;
            }
            if !changed {
                break;
            }
        }

        if !self.complete_rule_set {
            return;
        }

        self.rule_r5(graph);
        loop {
            let r6 = self.rule_r6(graph);
            let r7 = self.rule_r7(graph);
            if !(r6 || r7) {
                break;
            }
        }
        while self.rules_r8_r9_r10(graph) {}
    }

    /// R1 and R2 over every pair of neighbours of every node.
    pub fn rules_r1_r2_cycle(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        for b in 0..graph.num_nodes() {
            let adj = graph.adjacent_nodes(b);
            for (i, &a) in adj.iter().enumerate() {
                for &c in &adj[i + 1..] {
                    changed |= self.rule_r1(a, b, c, graph);
                    changed |= self.rule_r1(c, b, a, graph);
                    changed |= self.rule_r2(a, b, c, graph);
                    changed |= self.rule_r2(c, b, a, graph);
                }
            }
        }
        changed
    }

    /// `a *-> b o-* c`, `a` and `c` not adjacent: orient `b --> c`.
    pub fn rule_r1(&self, a: usize, b: usize, c: usize, graph: &mut Graph) -> bool {
        if graph.is_adjacent(a, c) {
            return false;
        }
        if graph.endpoint(a, b) != Some(Endpoint::Arrow) || graph.endpoint(c, b) != Some(Endpoint::Circle) {
            return false;
        }
        if !is_arrowhead_allowed(b, c, graph, &self.knowledge) {
            return false;
        }
        let tail = set_mark(graph, c, b, Endpoint::Tail);
        let arrow = set_mark(graph, b, c, Endpoint::Arrow);
        if tail || arrow {
            debug!(edge = %format!("{} --> {}", graph.name(b), graph.name(c)), "R1");
        }
        tail || arrow
    }

    /// `a --> b *-> c` or `a *-> b --> c` with `a *-o c`: orient `a *-> c`.
    pub fn rule_r2(&self, a: usize, b: usize, c: usize, graph: &mut Graph) -> bool {
        if !graph.is_adjacent(a, c) || graph.endpoint(a, c) != Some(Endpoint::Circle) {
            return false;
        }
        let into_b = graph.endpoint(a, b) == Some(Endpoint::Arrow);
        let into_c = graph.endpoint(b, c) == Some(Endpoint::Arrow);
        let tail_at_a = graph.endpoint(b, a) == Some(Endpoint::Tail);
        let tail_at_b = graph.endpoint(c, b) == Some(Endpoint::Tail);
        if !(into_b && into_c && (tail_at_a || tail_at_b)) {
            return false;
        }
        if !is_arrowhead_allowed(a, c, graph, &self.knowledge) {
            return false;
        }
        set_mark(graph, a, c, Endpoint::Arrow)
    }

    /// `a *-> b <-* c`, `a *-o d o-* c`, `a` and `c` not adjacent, `d *-o b`:
    /// orient `d *-> b`.
    pub fn rule_r3(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        for b in 0..graph.num_nodes() {
            let adj = graph.adjacent_nodes(b);
            for (i, &a) in adj.iter().enumerate() {
                for &c in &adj[i + 1..] {
                    if !graph.is_def_collider(a, b, c) || graph.is_adjacent(a, c) {
                        continue;
                    }
                    for &d in &adj {
                        if d == a || d == c {
                            continue;
                        }
                        if !(graph.is_adjacent(a, d) && graph.is_adjacent(c, d)) {
                            continue;
                        }
                        let circles = graph.endpoint(d, b) == Some(Endpoint::Circle)
                            && graph.endpoint(a, d) == Some(Endpoint::Circle)
                            && graph.endpoint(c, d) == Some(Endpoint::Circle);
                        if !circles || !is_arrowhead_allowed(d, b, graph, &self.knowledge) {
                            continue;
                        }
                        changed |= set_mark(graph, d, b, Endpoint::Arrow);
                    }
                }
            }
        }
        changed
    }

    /// Hands every discriminating path to the strategy until none changes the graph.
    pub fn rule_r4(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        loop {
            let mut oriented = false;
            for path in list_discriminating_paths(graph, self.max_path_length) {
                if path.exists_in(graph) && self.strategy.do_discriminating_path_orientation(&path, graph) {
                    debug!(
                        v = graph.name(path.v),
                        y = graph.name(path.y),
                        len = path.collider_path.len() + 3,
                        "R4"
                    );
                    oriented = true;
                }
            }
            changed |= oriented;
            if !oriented {
                return changed;
            }
        }
    }

    /// `a o-o b` closed by an uncovered circle path: every edge involved becomes undirected.
    pub fn rule_r5(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        let edges: Vec<_> = graph.edges().collect();
        for e in edges {
            let (x, y) = (e.a, e.b);
            if graph.endpoint(x, y) != Some(Endpoint::Circle) || graph.endpoint(y, x) != Some(Endpoint::Circle) {
                continue;
            }
            let circle = |g: &Graph, a: usize, b: usize| {
                g.endpoint(a, b) == Some(Endpoint::Circle) && g.endpoint(b, a) == Some(Endpoint::Circle)
            };
            let accept = |g: &Graph, path: &[usize]| {
                path.len() >= 4 && !g.is_adjacent(path[1], y) && !g.is_adjacent(path[path.len() - 2], x)
            };
            let Some(path) = find_uncovered_path(graph, x, y, circle, accept) else {
                continue;
            };

            set_mark(graph, x, y, Endpoint::Tail);
            set_mark(graph, y, x, Endpoint::Tail);
            for pair in path.windows(2) {
                set_mark(graph, pair[0], pair[1], Endpoint::Tail);
                set_mark(graph, pair[1], pair[0], Endpoint::Tail);
            }
            debug!(edge = %format!("{} --- {}", graph.name(x), graph.name(y)), "R5");
            changed = true;
        }
        changed
    }

    /// `a --- b o-* c`: orient `b --* c`.
    pub fn rule_r6(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        let undirected: Vec<_> = graph.edges().filter(|e| e.is_undirected()).collect();
        for e in undirected {
            for (a, b) in [(e.a, e.b), (e.b, e.a)] {
                for c in graph.adjacent_nodes(b) {
                    if c != a && graph.endpoint(c, b) == Some(Endpoint::Circle) {
                        changed |= set_mark(graph, c, b, Endpoint::Tail);
                    }
                }
            }
        }
        changed
    }

    /// `a --o b o-* c`, `a` and `c` not adjacent: orient `b --* c`.
    pub fn rule_r7(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        let edges: Vec<_> = graph.edges().collect();
        for e in edges {
            for (a, b) in [(e.a, e.b), (e.b, e.a)] {
                if graph.endpoint(a, b) != Some(Endpoint::Circle) || graph.endpoint(b, a) != Some(Endpoint::Tail) {
                    continue;
                }
                for c in graph.adjacent_nodes(b) {
                    if c != a && !graph.is_adjacent(a, c) && graph.endpoint(c, b) == Some(Endpoint::Circle) {
                        changed |= set_mark(graph, c, b, Endpoint::Tail);
                    }
                }
            }
        }
        changed
    }

    /// Tries R8, then R9, then R10 on every `a o-> c`.
    pub fn rules_r8_r9_r10(&self, graph: &mut Graph) -> bool {
        let mut changed = false;
        for c in 0..graph.num_nodes() {
            for a in graph.nodes_into(c, Endpoint::Arrow) {
                if graph.endpoint(c, a) != Some(Endpoint::Circle) {
                    continue;
                }
                changed |= self.rule_r8(a, c, graph) || self.rule_r9(a, c, graph) || self.rule_r10(a, c, graph);
            }
        }
        changed
    }

    /// `a --> b --> c` or `a --o b --> c` with `a o-> c`: orient `a --> c`.
    pub fn rule_r8(&self, a: usize, c: usize, graph: &mut Graph) -> bool {
        if !is_partially_oriented(graph, a, c) {
            return false;
        }
        let orient = graph.adjacent(a).filter(|&b| graph.is_adjacent(b, c)).any(|b| {
            graph.endpoint(b, a) == Some(Endpoint::Tail)
                && matches!(graph.endpoint(a, b), Some(Endpoint::Arrow | Endpoint::Circle))
                && graph.is_parent_of(b, c)
        });
        orient && set_mark(graph, c, a, Endpoint::Tail)
    }

    /// `a o-> c` and an uncovered potentially directed path `a, b, ..., c`
    /// with `b` and `c` not adjacent: orient `a --> c`.
    pub fn rule_r9(&self, a: usize, c: usize, graph: &mut Graph) -> bool {
        if !is_partially_oriented(graph, a, c) {
            return false;
        }
        let accept = |g: &Graph, path: &[usize]| !g.is_adjacent(path[1], c);
        if find_uncovered_path(graph, a, c, is_potentially_directed_step, accept).is_none() {
            return false;
        }
        debug!(edge = %format!("{} --> {}", graph.name(a), graph.name(c)), "R9");
        set_mark(graph, c, a, Endpoint::Tail)
    }

    /// `a o-> c`, `b --> c <-- d`, and uncovered potentially directed paths
    /// from `a` to `b` and from `a` to `d` starting through non-adjacent,
    /// distinct nodes: orient `a --> c`.
    pub fn rule_r10(&self, alpha: usize, gamma: usize, graph: &mut Graph) -> bool {
        if !is_partially_oriented(graph, alpha, gamma) {
            return false;
        }
        let into: Vec<usize> = graph
            .parents(gamma)
            .into_iter()
            .filter(|&n| n != alpha)
            .collect();
        if into.len() < 2 {
            return false;
        }
        let hops: Vec<usize> = graph.adjacent(alpha).filter(|&h| h != gamma).collect();
        let mut cache = HashMap::new();

        for (i, &beta) in into.iter().enumerate() {
            for &theta in &into[i + 1..] {
                let mu: Vec<usize> = hops
                    .iter()
                    .copied()
                    .filter(|&h| uncovered_pd_path_via(graph, alpha, h, beta, &mut cache))
                    .collect();
                if mu.is_empty() {
                    continue;
                }
                let omega: Vec<usize> = hops
                    .iter()
                    .copied()
                    .filter(|&h| uncovered_pd_path_via(graph, alpha, h, theta, &mut cache))
                    .collect();
                let found = mu
                    .iter()
                    .any(|&m| omega.iter().any(|&o| m != o && !graph.is_adjacent(m, o)));
                if found {
                    debug!(edge = %format!("{} --> {}", graph.name(alpha), graph.name(gamma)), "R10");
                    return set_mark(graph, gamma, alpha, Endpoint::Tail);
                }
            }
        }
        false
    }
}

fn is_partially_oriented(graph: &Graph, a: usize, c: usize) -> bool {
    graph.endpoint(c, a) == Some(Endpoint::Circle) && graph.endpoint(a, c) == Some(Endpoint::Arrow)
}

/// Depth-first search for an uncovered path `from, ..., to` other than the
/// direct edge, whose every step satisfies `step` and which `accept` approves.
fn find_uncovered_path<F, A>(graph: &Graph, from: usize, to: usize, step: F, accept: A) -> Option<Vec<usize>>
where
    F: Fn(&Graph, usize, usize) -> bool,
    A: Fn(&Graph, &[usize]) -> bool,
{
    fn visit<F, A>(
        graph: &Graph,
        to: usize,
        path: &mut Vec<usize>,
        on_path: &mut [bool],
        step: &F,
        accept: &A,
    ) -> bool
    where
        F: Fn(&Graph, usize, usize) -> bool,
        A: Fn(&Graph, &[usize]) -> bool,
    {
        let cur = path[path.len() - 1];
        for next in graph.adjacent_nodes(cur) {
            if on_path[next] || !step(graph, cur, next) {
                continue;
            }
            if path.len() == 1 && next == to {
                continue;
            }
            if path.len() >= 2 && graph.is_adjacent(path[path.len() - 2], next) {
                continue;
            }
            path.push(next);
            if next == to {
                if accept(graph, path) {
                    return true;
                }
            } else {
                on_path[next] = true;
                if visit(graph, to, path, on_path, step, accept) {
                    return true;
                }
                on_path[next] = false;
            }
            path.pop();
        }
        false
    }

    let mut path = vec![from];
    let mut on_path = vec![false; graph.num_nodes()];
    on_path[from] = true;
    visit(graph, to, &mut path, &mut on_path, &step, &accept).then_some(path)
}

fn uncovered_pd_path_via(
    graph: &Graph,
    alpha: usize,
    hop: usize,
    target: usize,
    cache: &mut HashMap<(usize, usize, usize), bool>,
) -> bool {
    if !is_potentially_directed_step(graph, alpha, hop) {
        return false;
    }
    if hop == target {
        return true;
    }
    dfs_uncovered_pd(graph, alpha, hop, target, cache, &mut HashSet::new())
}

fn dfs_uncovered_pd(
    graph: &Graph,
    prev: usize,
    curr: usize,
    target: usize,
    cache: &mut HashMap<(usize, usize, usize), bool>,
    visited: &mut HashSet<(usize, usize)>,
) -> bool {
    let key = (prev, curr, target);
    if let Some(&memo) = cache.get(&key) {
        return memo;
    }
    let edge = (prev.min(curr), prev.max(curr));
    if !visited.insert(edge) {
        cache.insert(key, false);
        return false;
    }

    let mut found = false;
    for next in graph.adjacent_nodes(curr) {
        if next == prev || graph.is_adjacent(prev, next) || !is_potentially_directed_step(graph, curr, next) {
            continue;
        }
        if next == target || dfs_uncovered_pd(graph, curr, next, target, cache, visited) {
            found = true;
            break;
        }
    }

    visited.remove(&edge);
    cache.insert(key, found);
    found
}

// ============================================================================
// MAG Oracle
// ============================================================================

/// Reads collider decisions off a known MAG.
///
/// Orienting the skeleton of a MAG with this strategy yields its PAG.
#[derive(Clone, Debug)]
pub struct MagOracleStrategy {
    mag: Graph,
    knowledge: Knowledge,
}

impl MagOracleStrategy {
    /// Strategy answering from `mag`.
    pub fn new(mag: Graph) -> Self {
        Self {
            mag,
            knowledge: Knowledge::new(),
        }
    }

    /// Gates discriminating-path arrowheads with `knowledge`.
    pub fn with_knowledge(mut self, knowledge: Knowledge) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// The reference MAG.
    pub fn mag(&self) -> &Graph {
        &self.mag
    }

    /// Index in the MAG of `graph`'s node `node`, matched by name.
    fn lookup(&self, graph: &Graph, node: usize) -> Option<usize> {
        if self.mag.names() == graph.names() {
            Some(node)
        } else {
            self.mag.node(graph.name(node))
        }
    }
}

impl R0R4Strategy for MagOracleStrategy {
    fn is_unshielded_collider(&self, graph: &Graph, x: usize, z: usize, y: usize) -> bool {
        match (self.lookup(graph, x), self.lookup(graph, z), self.lookup(graph, y)) {
            (Some(x), Some(z), Some(y)) => self.mag.is_def_collider(x, z, y),
            _ => false,
        }
    }

    fn do_discriminating_path_orientation(&self, path: &DiscriminatingPath, graph: &mut Graph) -> bool {
        let (Some(w), Some(v), Some(y)) = (
            self.lookup(graph, path.w),
            self.lookup(graph, path.v),
            self.lookup(graph, path.y),
        ) else {
            return false;
        };

        if self.mag.is_def_collider(w, v, y) {
            if !is_arrowhead_allowed(path.w, path.v, graph, &self.knowledge)
                || !is_arrowhead_allowed(path.y, path.v, graph, &self.knowledge)
            {
                return false;
            }
            let a = set_mark(graph, path.w, path.v, Endpoint::Arrow);
            let b = set_mark(graph, path.y, path.v, Endpoint::Arrow);
            a || b
        } else {
            set_mark(graph, path.y, path.v, Endpoint::Tail)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
