//! Moving between MAGs and PAGs, and PAG neighbourhoods for local search.
//!
//! A PAG is lifted to one of its MAGs with Zhang's construction, mutated with
//! the ordinary move catalog, and projected back with the FCI orientation
//! rules driven by the mutated MAG itself.

use crate::covariance::CovarianceMatrix;
use crate::error::ConfigError;
use crate::graph::{Endpoint, Graph};
use crate::knowledge::Knowledge;
use crate::moves;
use crate::orient::{FciOrient, MagOracleStrategy, set_mark};
use crate::paths::MagViolation;
use crate::score::{MagScore, ScoreRicfMag};
use std::collections::HashSet;
use tracing::debug;

/// Lifts a PAG to a MAG in its equivalence class.
///
/// Circles facing a tail or an arrowhead become tails (`o->` turns into `-->`,
/// `o--` into `---`). The `o-o` edges are oriented along a maximum cardinality
/// search order of the circle component, which is acyclic and adds no
/// unshielded collider when that component is chordal, as it is in a PAG.
pub fn zhang_mag_from_pag(pag: &Graph) -> Graph {
    let mut mag = pag.clone();
    let edges: Vec<_> = pag.edges().collect();

    for e in &edges {
        match (e.at_a, e.at_b) {
            (Endpoint::Circle, Endpoint::Circle) => {}
            (Endpoint::Circle, _) => {
                set_mark(&mut mag, e.b, e.a, Endpoint::Tail);
            }
            (_, Endpoint::Circle) => {
                set_mark(&mut mag, e.a, e.b, Endpoint::Tail);
            }
            _ => {}
        }
    }

    let order = circle_mcs_order(pag);
    let mut rank = vec![0; pag.num_nodes()];
    for (i, &v) in order.iter().enumerate() {
        rank[v] = i;
    }
    for e in edges.iter().filter(|e| e.at_a == Endpoint::Circle && e.at_b == Endpoint::Circle) {
        let (from, to) = if rank[e.a] < rank[e.b] { (e.a, e.b) } else { (e.b, e.a) };
        set_mark(&mut mag, to, from, Endpoint::Tail);
        set_mark(&mut mag, from, to, Endpoint::Arrow);
    }
    mag
}

/// Maximum cardinality search over the `o-o` edges; ties go to the lowest index.
fn circle_mcs_order(pag: &Graph) -> Vec<usize> {
    let n = pag.num_nodes();
    let circle_neighbors: Vec<Vec<usize>> = (0..n)
        .map(|a| {
            pag.adjacent(a)
                .filter(|&b| {
                    pag.endpoint(a, b) == Some(Endpoint::Circle) && pag.endpoint(b, a) == Some(Endpoint::Circle)
                })
                .collect()
        })
        .collect();

    let mut weight = vec![0usize; n];
    let mut numbered = vec![false; n];
    let mut order = Vec::with_capacity(n);
    for _ in 0..n {
        let Some(next) = (0..n)
            .filter(|&v| !numbered[v])
            .max_by(|&a, &b| weight[a].cmp(&weight[b]).then(b.cmp(&a)))
        else {
            break;
        };
        numbered[next] = true;
        order.push(next);
        for &u in &circle_neighbors[next] {
            if !numbered[u] {
                weight[u] += 1;
            }
        }
    }
    order
}

/// The Zhang lift of `pag`, or the first reason it is not a legal MAG.
///
/// # Errors
/// Returns the [`MagViolation`] found in the lifted graph.
pub fn legal_zhang_lift(pag: &Graph) -> Result<Graph, MagViolation> {
    let mag = zhang_mag_from_pag(pag);
    mag.paths().mag_legality()?;
    Ok(mag)
}

/// Projects a MAG to its PAG.
pub fn mag_to_pag(mag: &Graph) -> Graph {
    mag_to_pag_with(mag, &Knowledge::new())
}

/// Projects a MAG to its PAG, honouring background knowledge.
pub fn mag_to_pag_with(mag: &Graph, knowledge: &Knowledge) -> Graph {
    let oracle = MagOracleStrategy::new(mag.clone()).with_knowledge(knowledge.clone());
    let mut pag = mag.clone();
    FciOrient::new(&oracle, knowledge.clone()).orient(&mut pag);
    pag
}

/// Canonical text of a PAG: sorted edge lines (smaller name on the left) joined by `;`.
pub fn canonical_pag_key(pag: &Graph) -> String {
    pag.sorted_edge_strings().join(";")
}

/// Neighbourhoods of PAGs reached through single moves on a lifted MAG.
#[derive(Clone, Copy, Debug, Default)]
pub struct PagNeighbors;

impl PagNeighbors {
    /// Distinct PAGs one legal MAG move away from the Zhang lift of `pag`.
    ///
    /// # Panics
    /// Panics if the lift is not a legal MAG; that is a defect in the lift,
    /// not a property of the input.
    pub fn neighbors_via_zhang_lift(pag: &Graph) -> Vec<Graph> {
        let mag = match legal_zhang_lift(pag) {
            Ok(mag) => mag,
            Err(violation) => panic!("Zhang lift is not a legal MAG: {violation}\n{pag}"),
        };

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for mv in moves::valid_moves(&mag) {
            let Ok(next) = moves::applied(&mv, &mag) else {
                continue;
            };
            if !next.paths().is_legal_mag() {
                continue;
            }
            let neighbor = mag_to_pag(&next);
            if seen.insert(canonical_pag_key(&neighbor)) {
                out.push(neighbor);
            }
        }
        out
    }

    /// The neighbour with the highest score, if it strictly beats `pag`.
    ///
    /// PAGs are scored through their Zhang lifts; ties keep the earlier graph.
    pub fn best_neighbor<S: MagScore>(pag: &Graph, score: &S) -> Graph {
        let mut best = pag.clone();
        let mut best_score = score.safe_score(&zhang_mag_from_pag(pag));
        for neighbor in Self::neighbors_via_zhang_lift(pag) {
            let s = score.safe_score(&zhang_mag_from_pag(&neighbor));
            if s > best_score {
                best = neighbor;
                best_score = s;
            }
        }
        debug!(score = best_score, edges = best.num_edges(), "best PAG neighbour");
        best
    }

    /// [`PagNeighbors::best_neighbor`] under RICF BIC for `cov`.
    ///
    /// # Errors
    /// Fails if `tolerance` is not positive and finite.
    pub fn best_neighbor_by_ricf(
        pag: &Graph,
        cov: &CovarianceMatrix,
        tolerance: f64,
    ) -> Result<Graph, ConfigError> {
        let score = ScoreRicfMag::new(cov.clone(), tolerance)?;
        Ok(Self::best_neighbor(pag, &score))
    }
}
