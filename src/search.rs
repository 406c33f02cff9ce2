//! Tabu local search over MAGs with restarts.
//!
//! Each restart climbs from a start graph by applying the valid, non-tabu
//! move with the largest strictly positive score gain, until no move improves
//! or the iteration budget runs out. Restarts are independent and may run on
//! the rayon pool; the best result is reduced after all of them finish.

use crate::covariance::CovarianceMatrix;
use crate::error::ConfigError;
use crate::graph::Graph;
use crate::moves::{self, Move};
use crate::score::{MagScore, ScoreRicfMag};
use rand::prelude::*;
use rand::rngs::SmallRng;
use rayon::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

// ============================================================================
// Configuration
// ============================================================================

/// Search parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct GpsParams {
    /// Maximum accepted moves per restart.
    pub max_iterations: usize,
    /// Number of restarts.
    pub restarts: usize,
    /// Whether recently applied moves (and their inverses) are forbidden.
    pub tabu_enabled: bool,
    /// Tabu list capacity.
    pub tabu_length: usize,
    /// RICF convergence tolerance.
    pub ricf_tolerance: f64,
    /// Cap on RICF sweeps per fit.
    pub ricf_max_iterations: usize,
    /// Optional deterministic base seed.
    pub seed: Option<u64>,
    /// Ridge regularization. Reserved; validated but not applied.
    pub ridge: f64,
    /// Random valid additions applied to the start graph of restarts after the first.
    pub perturbation_moves: usize,
    /// Run restarts on the rayon pool.
    pub parallel: bool,
}

impl Default for GpsParams {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            restarts: 10,
            tabu_enabled: true,
            tabu_length: 25,
            ricf_tolerance: 1e-6,
            ricf_max_iterations: ScoreRicfMag::DEFAULT_MAX_ITERATIONS,
            seed: None,
            ridge: 0.0,
            perturbation_moves: 3,
            parallel: false,
        }
    }
}

impl GpsParams {
    /// Checks the parameter bundle.
    ///
    /// # Errors
    /// Returns the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.restarts == 0 {
            return Err(ConfigError::ZeroRestarts);
        }
        if self.max_iterations == 0 || self.ricf_max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.tabu_enabled && self.tabu_length == 0 {
            return Err(ConfigError::ZeroTabuLength);
        }
        if !(self.ricf_tolerance.is_finite() && self.ricf_tolerance > 0.0) {
            return Err(ConfigError::BadTolerance(self.ricf_tolerance));
        }
        if !(self.ridge.is_finite() && self.ridge >= 0.0) {
            return Err(ConfigError::BadRidge(self.ridge));
        }
        Ok(())
    }
}

// ============================================================================
// Tabu List
// ============================================================================

/// Short-term memory forbidding recently applied moves and their inverses.
#[derive(Clone, Debug)]
pub struct TabuList {
    recent: VecDeque<Move>,
    max_size: usize,
}

impl TabuList {
    /// Creates a list holding at most `max_size` moves; zero disables it.
    pub fn new(max_size: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Whether `mv` or its inverse was applied recently.
    #[inline]
    pub fn is_tabu(&self, mv: &Move) -> bool {
        let inv = mv.inverse();
        self.recent.iter().any(|m| m == mv || *m == inv)
    }

    /// Records an applied move, evicting the oldest when full.
    #[inline]
    pub fn add(&mut self, mv: Move) {
        if self.max_size == 0 {
            return;
        }
        if self.recent.len() >= self.max_size {
            self.recent.pop_front();
        }
        self.recent.push_back(mv);
    }

    /// Number of remembered moves.
    pub fn len(&self) -> usize {
        self.recent.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

// ============================================================================
// Results
// ============================================================================

/// Per-restart summary.
#[derive(Clone, Debug, PartialEq)]
pub struct RestartStats {
    /// Restart index.
    pub restart: usize,
    /// Moves accepted.
    pub iterations: usize,
    /// Score evaluations, including the start graph.
    pub evaluations: usize,
    /// Final score of this restart.
    pub score: f64,
    /// Score of the start graph, then the score after each accepted move.
    pub trajectory: Vec<f64>,
    /// Whether the restart stopped on the cancellation flag.
    pub cancelled: bool,
}

/// Best graph over all restarts.
#[derive(Clone, Debug)]
pub struct SearchResult {
    /// Best MAG found.
    pub graph: Graph,
    /// Its score.
    pub score: f64,
    /// One entry per restart, in restart order.
    pub restarts: Vec<RestartStats>,
}

// ============================================================================
// Driver
// ============================================================================

/// Tabu search driver over a [`MagScore`].
pub struct Gps<S> {
    score: S,
    params: GpsParams,
    empty: Graph,
    cancel: Option<Arc<AtomicBool>>,
}

impl Gps<ScoreRicfMag> {
    /// Builds a driver scoring with RICF over `cov`, using the tolerance and
    /// sweep cap from `params`.
    ///
    /// # Errors
    /// Fails on invalid parameters or duplicate variable names.
    pub fn with_covariance(cov: CovarianceMatrix, params: GpsParams) -> Result<Self, ConfigError> {
        params.validate()?;
        let score = ScoreRicfMag::new(cov, params.ricf_tolerance)?
            .with_max_iterations(params.ricf_max_iterations)?;
        Self::new(score, params)
    }
}

impl<S: MagScore + Sync> Gps<S> {
    /// Creates a driver.
    ///
    /// # Errors
    /// Fails on invalid parameters or duplicate variable names.
    pub fn new(score: S, params: GpsParams) -> Result<Self, ConfigError> {
        params.validate()?;
        let empty = Graph::new(score.variables().iter().cloned())
            .map_err(|e| ConfigError::VariableMismatch(e.to_string()))?;
        Ok(Self {
            score,
            params,
            empty,
            cancel: None,
        })
    }

    /// Installs a cooperative cancellation flag, polled once per iteration.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// The parameters.
    pub fn params(&self) -> &GpsParams {
        &self.params
    }

    /// The score.
    pub fn score(&self) -> &S {
        &self.score
    }

    /// Searches from the empty graph over the score's variables.
    pub fn search(&self) -> SearchResult {
        self.run(&self.empty)
    }

    /// Searches with every restart starting from `initial`.
    ///
    /// # Errors
    /// Fails if `initial` is not a legal MAG over the score's variables.
    pub fn search_from(&self, initial: &Graph) -> Result<SearchResult, ConfigError> {
        if initial.names() != self.empty.names() {
            return Err(ConfigError::VariableMismatch(format!(
                "start graph has nodes {:?}, score has {:?}",
                initial.names(),
                self.empty.names()
            )));
        }
        initial
            .paths()
            .mag_legality()
            .map_err(|v| ConfigError::VariableMismatch(format!("start graph is not a legal MAG: {v}")))?;
        Ok(self.run(initial))
    }

    fn run(&self, start: &Graph) -> SearchResult {
        let p = &self.params;
        let base_seed = p.seed.unwrap_or_else(random_u64);
        info!(
            variables = start.num_nodes(),
            restarts = p.restarts,
            max_iterations = p.max_iterations,
            tabu = if p.tabu_enabled { p.tabu_length } else { 0 },
            parallel = p.parallel,
            "starting MAG search"
        );

        let outcomes: Vec<(Graph, RestartStats)> = if p.parallel {
            (0..p.restarts)
                .into_par_iter()
                .map(|r| self.restart(r, start, base_seed))
                .collect()
        } else {
            (0..p.restarts)
                .map(|r| self.restart(r, start, base_seed))
                .collect()
        };

        let mut best_graph = start.clone();
        let mut best_score = f64::NEG_INFINITY;
        let mut best_index = None;
        let mut stats = Vec::with_capacity(outcomes.len());
        for (graph, s) in outcomes {
            if best_index.is_none() || s.score > best_score {
                if best_index.is_some() {
                    info!(restart = s.restart, score = s.score, "new global best");
                }
                best_score = s.score;
                best_graph = graph;
                best_index = Some(s.restart);
            }
            stats.push(s);
        }

        SearchResult {
            graph: best_graph,
            score: best_score,
            restarts: stats,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// One restart. Restart 0 climbs from `start` unchanged; later restarts
    /// perturb the start and shuffle candidate order.
    fn restart(&self, restart: usize, start: &Graph, base_seed: u64) -> (Graph, RestartStats) {
        let p = &self.params;
        let mut rng = SmallRng::seed_from_u64(splitmix64(base_seed ^ restart as u64));

        let mut current = start.clone();
        if restart > 0 && p.perturbation_moves > 0 {
            let used = moves::random_valid_additions(&mut current, p.perturbation_moves, &mut rng);
            debug!(restart, perturbation = used.len(), "perturbed start graph");
        }

        let mut current_score = self.score.safe_score(&current);
        let mut trajectory = vec![current_score];
        let mut evaluations = 1;
        let mut iterations = 0;
        let mut cancelled = false;
        let mut tabu = TabuList::new(if p.tabu_enabled { p.tabu_length } else { 0 });

        while iterations < p.max_iterations {
            if self.is_cancelled() {
                cancelled = true;
                break;
            }

            let mut candidates: Vec<Move> = moves::valid_moves(&current)
                .into_iter()
                .filter(|mv| !tabu.is_tabu(mv))
                .collect();
            if restart > 0 {
                candidates.shuffle(&mut rng);
            }

            let mut best: Option<(Move, Graph, f64)> = None;
            let mut best_delta = 0.0;
            for mv in candidates {
                let Ok(g) = moves::applied(&mv, &current) else {
                    continue;
                };
                let s = self.score.safe_score(&g);
                evaluations += 1;
                if !s.is_finite() {
                    continue;
                }
                let delta = s - current_score;
                if delta > best_delta {
                    best_delta = delta;
                    best = Some((mv, g, s));
                }
            }

            let Some((mv, g, s)) = best else {
                break;
            };
            debug!(
                restart,
                iteration = iterations,
                mv = %mv.key_in(&current),
                delta = best_delta,
                score = s,
                "accepted move"
            );
            current = g;
            current_score = s;
            trajectory.push(s);
            tabu.add(mv);
            iterations += 1;
        }

        info!(restart, iterations, evaluations, score = current_score, cancelled, "restart finished");
        let stats = RestartStats {
            restart,
            iterations,
            evaluations,
            score: current_score,
            trajectory,
            cancelled,
        };
        (current, stats)
    }
}

// ============================================================================
// Seeding
// ============================================================================

fn random_u64() -> u64 {
    rand::random::<u64>()
}

/// SplitMix64 mixer for deriving per-restart seeds from a base seed.
#[inline]
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RicfError;
    use crate::moves::MoveKind;
    use std::sync::atomic::AtomicUsize;

    /// Scores a graph by how many node pairs agree with a target graph.
    struct TargetScore {
        target: Graph,
        calls: AtomicUsize,
    }

    impl TargetScore {
        fn new(names: &[&str], edges: &str) -> Self {
            Self {
                target: Graph::from_edges(names, edges).unwrap(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl MagScore for TargetScore {
        fn score(&self, graph: &Graph) -> Result<f64, RicfError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let n = graph.num_nodes();
            let mut agree = 0.0;
            for a in 0..n {
                for b in (a + 1)..n {
                    if graph.edge(a, b) == self.target.edge(a, b) {
                        agree += 1.0;
                    }
                }
            }
            Ok(agree)
        }

        fn variables(&self) -> &[String] {
            self.target.names()
        }
    }

    fn params(seed: u64) -> GpsParams {
        GpsParams {
            restarts: 3,
            max_iterations: 50,
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn splitmix64_is_deterministic() {
        assert_eq!(splitmix64(0), splitmix64(0));
        assert_eq!(splitmix64(12345), splitmix64(12345));
        assert_ne!(splitmix64(0), splitmix64(1));
    }

    #[test]
    fn gps_params_default_is_valid() {
        let p = GpsParams::default();
        assert_eq!(p.validate(), Ok(()));
        assert_eq!(p.tabu_length, 25);
        assert_eq!(p.restarts, 10);
    }

    #[test]
    fn gps_params_rejects_bad_values() {
        let bad = [
            GpsParams { restarts: 0, ..Default::default() },
            GpsParams { max_iterations: 0, ..Default::default() },
            GpsParams { tabu_length: 0, ..Default::default() },
            GpsParams { ricf_tolerance: -1.0, ..Default::default() },
            GpsParams { ridge: f64::NAN, ..Default::default() },
        ];
        for p in bad {
            assert!(p.validate().is_err(), "{p:?}");
        }
        let no_tabu = GpsParams { tabu_enabled: false, tabu_length: 0, ..Default::default() };
        assert_eq!(no_tabu.validate(), Ok(()));
    }

    #[test]
    fn test_tabu_list_basic() {
        let mut tabu = TabuList::new(2);
        let a = Move::new(MoveKind::AddDir, 0, 1);
        let b = Move::new(MoveKind::AddBi, 1, 2);
        let c = Move::new(MoveKind::AddUg, 2, 3);
        assert!(!tabu.is_tabu(&a));

        tabu.add(a);
        assert!(tabu.is_tabu(&a));
        assert!(tabu.is_tabu(&a.inverse()));
        assert!(!tabu.is_tabu(&Move::new(MoveKind::AddDir, 1, 0)));

        tabu.add(b);
        tabu.add(c);
        assert!(!tabu.is_tabu(&a));
        assert!(tabu.is_tabu(&b));
        assert!(tabu.is_tabu(&c));
        assert_eq!(tabu.len(), 2);
    }

    #[test]
    fn test_tabu_list_disabled() {
        let mut off = TabuList::new(0);
        off.add(Move::new(MoveKind::AddDir, 0, 1));
        assert!(off.is_empty());
    }

    #[test]
    fn search_recovers_target_graph() {
        let score = TargetScore::new(&["A", "B", "C", "D"], "A --> B\nB <-> C\nC --> D");
        let gps = Gps::new(score, params(7)).unwrap();
        let result = gps.search();
        assert_eq!(result.score, 6.0);
        assert_eq!(result.graph, gps.score().target);
        assert_eq!(result.restarts.len(), 3);
        assert!(result.graph.paths().is_legal_mag());
    }

    #[test]
    fn iterations_are_bounded() {
        let score = TargetScore::new(&["A", "B", "C", "D"], "A --> B\nB <-> C\nC --> D");
        let gps = Gps::new(
            score,
            GpsParams {
                max_iterations: 1,
                ..params(1)
            },
        )
        .unwrap();
        let result = gps.search();
        for s in &result.restarts {
            assert!(s.iterations <= 1);
        }
    }

    #[test]
    fn first_restart_is_strict_hill_climb() {
        let score = TargetScore::new(&["A", "B", "C"], "A --> B");
        let gps = Gps::new(score, GpsParams { restarts: 1, ..params(3) }).unwrap();
        let result = gps.search();
        let s = &result.restarts[0];
        assert_eq!(s.iterations, 1);
        assert_eq!(s.score, 3.0);
        // 12 candidates in the first sweep, then 6 valid non-tabu ones on A --> B.
        assert_eq!(s.evaluations, 1 + 12 + 6);
    }

    #[test]
    fn seeded_search_is_deterministic() {
        let run = |parallel| {
            let score = TargetScore::new(&["A", "B", "C", "D"], "A --- B\nC <-> D");
            let gps = Gps::new(score, GpsParams { parallel, ..params(99) }).unwrap();
            gps.search()
        };
        let a = run(false);
        let b = run(false);
        let c = run(true);
        assert_eq!(a.graph, b.graph);
        assert_eq!(a.restarts, b.restarts);
        assert_eq!(a.graph, c.graph);
        assert_eq!(a.restarts, c.restarts);
    }

    #[test]
    fn cancelled_search_stops_immediately() {
        let score = TargetScore::new(&["A", "B", "C"], "A --> B");
        let flag = Arc::new(AtomicBool::new(true));
        let gps = Gps::new(score, params(5)).unwrap().with_cancel_flag(flag);
        let result = gps.search();
        assert!(result.restarts.iter().all(|s| s.cancelled && s.iterations == 0));
    }

    #[test]
    fn search_from_rejects_illegal_start() {
        let score = TargetScore::new(&["A", "B", "C"], "A --> B");
        let gps = Gps::new(score, params(5)).unwrap();
        let cyclic = Graph::from_edges(&["A", "B", "C"], "A --> B\nB --> C\nC --> A").unwrap();
        assert!(gps.search_from(&cyclic).is_err());
        let other = Graph::new(["X", "Y", "Z"]).unwrap();
        assert!(gps.search_from(&other).is_err());
        let start = Graph::from_edges(&["A", "B", "C"], "B --> C").unwrap();
        let result = gps.search_from(&start).unwrap();
        assert_eq!(result.graph, gps.score().target);
    }

    /// A [`TargetScore`] that fails on graphs with a bidirected edge, and on
    /// the empty graph when `fail_empty` is set.
    struct FlakyScore {
        inner: TargetScore,
        fail_empty: bool,
    }

    impl MagScore for FlakyScore {
        fn score(&self, graph: &Graph) -> Result<f64, RicfError> {
            let empty = graph.num_edges() == 0;
            if graph.edges().any(|e| e.is_bidirected()) || (self.fail_empty && empty) {
                return Err(RicfError::NonFinite { context: "test" });
            }
            self.inner.score(graph)
        }

        fn variables(&self) -> &[String] {
            self.inner.variables()
        }
    }

    fn flaky(edges: &str, fail_empty: bool) -> FlakyScore {
        FlakyScore {
            inner: TargetScore::new(&["A", "B", "C"], edges),
            fail_empty,
        }
    }

    #[test]
    fn unscoreable_candidates_are_skipped() {
        let gps = Gps::new(flaky("A --> B\nB <-> C", false), params(21)).unwrap();
        let result = gps.search();
        assert_eq!(result.score, 2.0);
        assert!(!result.graph.edges().any(|e| e.is_bidirected()), "{}", result.graph);
        for s in &result.restarts {
            // A perturbed start may hold a bidirected edge; nothing accepted may.
            assert!(s.trajectory[1..].iter().all(|x| x.is_finite()), "{s:?}");
            assert!(s.score.is_finite());
        }
    }

    #[test]
    fn unscoreable_start_accepts_first_finite_candidate() {
        let gps = Gps::new(flaky("B --> C", true), GpsParams { restarts: 1, ..params(4) }).unwrap();
        let result = gps.search();
        let s = &result.restarts[0];
        // ADD_DIR(A,B) comes first and scores 1; ADD_DIR(B,C) would score 3.
        assert_eq!(s.trajectory, vec![f64::NEG_INFINITY, 1.0, 2.0]);
        assert_eq!(result.graph.sorted_edge_strings(), vec!["A --> B", "B --> C"]);

        let start = Graph::from_edges(&["A", "B", "C"], "B <-> C").unwrap();
        let gps = Gps::new(flaky("B --> C", false), GpsParams { restarts: 1, ..params(4) }).unwrap();
        let result = gps.search_from(&start).unwrap();
        assert_eq!(result.restarts[0].trajectory[0], f64::NEG_INFINITY);
        assert_eq!(result.score, 3.0);
        assert_eq!(result.graph, gps.score().inner.target);
    }

    #[test]
    fn accepted_scores_strictly_increase() {
        let score = TargetScore::new(&["A", "B", "C", "D", "E"], "A --> B\nB <-> C\nC --> D\nD --- E");
        let gps = Gps::new(score, GpsParams { restarts: 6, ..params(13) }).unwrap();
        let result = gps.search();
        for s in &result.restarts {
            assert_eq!(s.trajectory.len(), s.iterations + 1);
            assert_eq!(s.trajectory.last().copied(), Some(s.score));
            assert!(s.trajectory.windows(2).all(|w| w[0] < w[1]), "{s:?}");
        }
    }
}
