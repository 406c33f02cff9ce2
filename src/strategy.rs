//! Orientation decisions made by comparing RICF scores of competing MAGs.
//!
//! Each decision lifts the current partially oriented graph to a MAG, builds
//! one MAG per hypothesis on copies of the lift, and keeps the hypothesis with
//! the better score. Illegal or unscoreable hypotheses score `-inf`.

use crate::covariance::CovarianceMatrix;
use crate::error::ConfigError;
use crate::graph::{Endpoint, Graph};
use crate::knowledge::Knowledge;
use crate::orient::{
    DiscriminatingPath, FciOrient, MagOracleStrategy, R0R4Strategy, is_arrowhead_allowed, set_mark,
};
use crate::pag::{legal_zhang_lift, zhang_mag_from_pag};
use crate::score::{MagScore, ScoreRicfMag};
use tracing::{debug, warn};

/// R0/R4 decisions by RICF BIC comparison.
#[derive(Clone, Debug)]
pub struct R0R4StrategyGpsRicf {
    score: ScoreRicfMag,
    knowledge: Knowledge,
    eps: f64,
}

impl R0R4StrategyGpsRicf {
    /// Default margin by which a collider must win.
    pub const DEFAULT_EPS: f64 = 1e-8;

    /// Strategy scoring with `score`.
    pub fn new(score: ScoreRicfMag) -> Self {
        Self {
            score,
            knowledge: Knowledge::new(),
            eps: Self::DEFAULT_EPS,
        }
    }

    /// Strategy scoring against `cov` with the given RICF tolerance.
    ///
    /// # Errors
    /// Fails if the tolerance is not positive and finite.
    pub fn from_covariance(cov: CovarianceMatrix, tolerance: f64) -> Result<Self, ConfigError> {
        Ok(Self::new(ScoreRicfMag::new(cov, tolerance)?))
    }

    /// Gates committed arrowheads and tails with `knowledge`.
    pub fn with_knowledge(mut self, knowledge: Knowledge) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// Sets the decision margin.
    ///
    /// # Errors
    /// Fails if `eps` is negative or not finite.
    pub fn with_eps(mut self, eps: f64) -> Result<Self, ConfigError> {
        if !(eps.is_finite() && eps >= 0.0) {
            return Err(ConfigError::BadEpsilon(eps));
        }
        self.eps = eps;
        Ok(self)
    }

    /// The underlying score.
    pub fn score(&self) -> &ScoreRicfMag {
        &self.score
    }

    /// Background knowledge in use.
    pub fn knowledge(&self) -> &Knowledge {
        &self.knowledge
    }

    /// Decision margin.
    pub fn eps(&self) -> f64 {
        self.eps
    }

    fn hypothesis_score(&self, mag: Option<&Graph>) -> f64 {
        match mag {
            Some(g) if g.paths().is_legal_mag() => self.score.safe_score(g),
            _ => f64::NEG_INFINITY,
        }
    }
}

/// `mag` with the edge `a *-* b` replaced by one with the given endpoints.
fn replace_edge(mag: &Graph, a: usize, b: usize, at_a: Endpoint, at_b: Endpoint) -> Option<Graph> {
    let mut g = mag.clone();
    g.remove_edge(a, b)?;
    g.add_edge(a, b, at_a, at_b).ok()?;
    Some(g)
}

fn collider_hypothesis(lift: &Graph, x: usize, z: usize, y: usize) -> Option<Graph> {
    let g = replace_edge(lift, x, z, Endpoint::Tail, Endpoint::Arrow)?;
    replace_edge(&g, y, z, Endpoint::Tail, Endpoint::Arrow)
}

/// No arrowhead at `z`: undirected edges where legal, otherwise `z --> x`, `z --> y`.
fn noncollider_hypothesis(lift: &Graph, x: usize, z: usize, y: usize) -> Option<Graph> {
    let undirected = replace_edge(lift, x, z, Endpoint::Tail, Endpoint::Tail)
        .and_then(|g| replace_edge(&g, y, z, Endpoint::Tail, Endpoint::Tail));
    if let Some(g) = undirected {
        if g.paths().is_legal_mag() {
            return Some(g);
        }
    }
    let g = replace_edge(lift, z, x, Endpoint::Tail, Endpoint::Arrow)?;
    replace_edge(&g, z, y, Endpoint::Tail, Endpoint::Arrow)
}

impl R0R4Strategy for R0R4StrategyGpsRicf {
    fn is_unshielded_collider(&self, graph: &Graph, x: usize, z: usize, y: usize) -> bool {
        let lift = zhang_mag_from_pag(graph);
        let collider = self.hypothesis_score(collider_hypothesis(&lift, x, z, y).as_ref());
        let noncollider = self.hypothesis_score(noncollider_hypothesis(&lift, x, z, y).as_ref());
        let decision = collider > noncollider + self.eps;
        debug!(
            triple = %format!("{}-{}-{}", graph.name(x), graph.name(z), graph.name(y)),
            collider,
            noncollider,
            decision,
            "unshielded triple"
        );
        decision
    }

    fn do_discriminating_path_orientation(&self, path: &DiscriminatingPath, graph: &mut Graph) -> bool {
        if !path.exists_in(graph) {
            return false;
        }
        let (w, v, y) = (path.w, path.v, path.y);

        let lift = zhang_mag_from_pag(graph);
        let collider = lift.edge(w, v).and_then(|e| {
            let g = replace_edge(&lift, w, v, e.at_a, Endpoint::Arrow)?;
            replace_edge(&g, v, y, Endpoint::Arrow, Endpoint::Arrow)
        });
        let noncollider = replace_edge(&lift, v, y, Endpoint::Tail, Endpoint::Arrow);
        let sc = self.hypothesis_score(collider.as_ref());
        let snc = self.hypothesis_score(noncollider.as_ref());
        let is_collider = sc > snc + self.eps;
        debug!(
            v = graph.name(v),
            y = graph.name(y),
            collider = sc,
            noncollider = snc,
            decision = is_collider,
            "discriminating path"
        );

        let saved = graph.clone();
        if is_collider {
            if !is_arrowhead_allowed(w, v, graph, &self.knowledge)
                || !is_arrowhead_allowed(y, v, graph, &self.knowledge)
            {
                return false;
            }
            set_mark(graph, w, v, Endpoint::Arrow);
            set_mark(graph, y, v, Endpoint::Arrow);
        } else {
            if self.knowledge.is_forbidden(graph.name(v), graph.name(y)) {
                return false;
            }
            set_mark(graph, y, v, Endpoint::Tail);
        }

        if let Err(violation) = legal_zhang_lift(graph) {
            warn!(%violation, v = graph.name(v), y = graph.name(y), "orientation rolled back");
            *graph = saved;
            return false;
        }
        true
    }
}

/// The orientation strategies available to [`FciOrient`].
#[derive(Clone, Debug)]
pub enum Strategy {
    /// Read decisions off a known MAG.
    MagOracle(MagOracleStrategy),
    /// Compare RICF scores.
    Ricf(R0R4StrategyGpsRicf),
}

impl R0R4Strategy for Strategy {
    fn is_unshielded_collider(&self, graph: &Graph, x: usize, z: usize, y: usize) -> bool {
        match self {
            Strategy::MagOracle(s) => s.is_unshielded_collider(graph, x, z, y),
            Strategy::Ricf(s) => s.is_unshielded_collider(graph, x, z, y),
        }
    }

    fn do_discriminating_path_orientation(&self, path: &DiscriminatingPath, graph: &mut Graph) -> bool {
        match self {
            Strategy::MagOracle(s) => s.do_discriminating_path_orientation(path, graph),
            Strategy::Ricf(s) => s.do_discriminating_path_orientation(path, graph),
        }
    }
}

/// Orients the skeleton of `graph` in place, deciding R0 and R4 by RICF scores.
///
/// # Errors
/// Fails if `tolerance` is not positive and finite.
pub fn orient_with_ricf(
    graph: &mut Graph,
    cov: &CovarianceMatrix,
    knowledge: &Knowledge,
    tolerance: f64,
) -> Result<(), ConfigError> {
    let strategy = Strategy::Ricf(
        R0R4StrategyGpsRicf::from_covariance(cov.clone(), tolerance)?.with_knowledge(knowledge.clone()),
    );
    FciOrient::new(&strategy, knowledge.clone()).orient(graph);
    Ok(())
}
