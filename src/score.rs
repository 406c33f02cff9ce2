//! BIC scoring of mixed graphs through RICF.

use crate::covariance::CovarianceMatrix;
use crate::error::{ConfigError, RicfError};
use crate::graph::Graph;
use crate::ricf;
use tracing::warn;

/// A deterministic score over mixed graphs; higher is better.
pub trait MagScore {
    /// Scores `graph`.
    ///
    /// # Errors
    /// Returns the numerical failure that prevented scoring.
    fn score(&self, graph: &Graph) -> Result<f64, RicfError>;

    /// Scores `graph`, mapping failures and non-finite values to `-inf`.
    fn safe_score(&self, graph: &Graph) -> f64 {
        match self.score(graph) {
            Ok(s) if s.is_finite() => s,
            Ok(s) => {
                warn!(score = s, "non-finite score treated as unscoreable");
                f64::NEG_INFINITY
            }
            Err(e) => {
                warn!(error = %e, "graph unscoreable");
                f64::NEG_INFINITY
            }
        }
    }

    /// Variable names the score is defined over.
    fn variables(&self) -> &[String];
}

/// Number of free parameters: one per edge plus one variance per node.
pub fn num_free_parameters(graph: &Graph) -> usize {
    graph.num_edges() + graph.num_nodes()
}

/// BIC penalty `0.5 * ln(max(2, n)) * k`.
pub fn bic_penalty(sample_size: usize, k: usize) -> f64 {
    0.5 * (sample_size.max(2) as f64).ln() * k as f64
}

/// RICF log-likelihood minus a BIC penalty.
#[derive(Clone, Debug)]
pub struct ScoreRicfMag {
    cov: CovarianceMatrix,
    tolerance: f64,
    max_iterations: usize,
    penalty_discount: f64,
}

impl ScoreRicfMag {
    /// Default cap on RICF sweeps.
    pub const DEFAULT_MAX_ITERATIONS: usize = 500;

    /// Creates a score bound to `cov` with the given RICF tolerance.
    ///
    /// # Errors
    /// Fails if the tolerance is not positive and finite.
    pub fn new(cov: CovarianceMatrix, tolerance: f64) -> Result<Self, ConfigError> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(ConfigError::BadTolerance(tolerance));
        }
        Ok(Self {
            cov,
            tolerance,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            penalty_discount: 1.0,
        })
    }

    /// Sets the RICF sweep cap.
    ///
    /// # Errors
    /// Fails on zero.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self, ConfigError> {
        if max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        self.max_iterations = max_iterations;
        Ok(self)
    }

    /// Scales the BIC penalty.
    ///
    /// # Errors
    /// Fails if the discount is not positive and finite.
    pub fn with_penalty_discount(mut self, discount: f64) -> Result<Self, ConfigError> {
        if !(discount.is_finite() && discount > 0.0) {
            return Err(ConfigError::BadPenaltyDiscount(discount));
        }
        self.penalty_discount = discount;
        Ok(self)
    }

    /// The bound covariance.
    pub fn covariance(&self) -> &CovarianceMatrix {
        &self.cov
    }

    /// RICF tolerance.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Penalty multiplier.
    pub fn penalty_discount(&self) -> f64 {
        self.penalty_discount
    }
}

impl MagScore for ScoreRicfMag {
    fn score(&self, graph: &Graph) -> Result<f64, RicfError> {
        let fit = ricf::fit(graph, &self.cov, self.tolerance, self.max_iterations)?;
        let ll = ricf::log_likelihood(&fit, &self.cov)?;
        let k = num_free_parameters(graph);
        Ok(ll - self.penalty_discount * bic_penalty(self.cov.sample_size(), k))
    }

    fn variables(&self) -> &[String] {
        self.cov.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn score(n: usize, rows: &[f64]) -> ScoreRicfMag {
        let cov = CovarianceMatrix::new(
            vec!["A".into(), "B".into()],
            n,
            DMatrix::from_row_slice(2, 2, rows),
        )
        .unwrap();
        ScoreRicfMag::new(cov, 1e-6).unwrap()
    }

    #[test]
    fn penalty_uses_at_least_two_samples() {
        assert_eq!(bic_penalty(1, 3), bic_penalty(2, 3));
        assert!((bic_penalty(100, 2) - 100f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn score_is_deterministic() {
        let s = score(500, &[1.0, 0.3, 0.3, 1.0]);
        let g = Graph::from_edges(&["A", "B"], "A <-> B").unwrap();
        let a = s.score(&g).unwrap();
        let b = s.score(&g).unwrap();
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn strong_correlation_rewards_an_edge() {
        let s = score(1000, &[1.0, 0.6, 0.6, 1.0]);
        let empty = Graph::new(["A", "B"]).unwrap();
        let edge = Graph::from_edges(&["A", "B"], "A --> B").unwrap();
        assert!(s.safe_score(&edge) > s.safe_score(&empty));
    }

    #[test]
    fn independence_penalizes_an_edge() {
        let s = score(1000, &[1.0, 0.0, 0.0, 1.0]);
        let empty = Graph::new(["A", "B"]).unwrap();
        let edge = Graph::from_edges(&["A", "B"], "A --> B").unwrap();
        let diff = s.safe_score(&empty) - s.safe_score(&edge);
        assert!((diff - 0.5 * 1000f64.ln()).abs() < 1e-6);
    }

    #[test]
    fn penalty_discount_scales_penalty() {
        let base = score(100, &[1.0, 0.0, 0.0, 1.0]);
        let discounted = base.clone().with_penalty_discount(2.0).unwrap();
        let g = Graph::new(["A", "B"]).unwrap();
        let diff = base.safe_score(&g) - discounted.safe_score(&g);
        assert!((diff - bic_penalty(100, 2)).abs() < 1e-9);
    }

    #[test]
    fn mismatched_graph_is_unscoreable() {
        let s = score(100, &[1.0, 0.0, 0.0, 1.0]);
        let g = Graph::new(["A", "Z"]).unwrap();
        assert!(s.score(&g).is_err());
        assert_eq!(s.safe_score(&g), f64::NEG_INFINITY);
    }

    #[test]
    fn bad_config_is_rejected() {
        let cov = CovarianceMatrix::new(vec!["A".into()], 10, DMatrix::identity(1, 1)).unwrap();
        assert!(ScoreRicfMag::new(cov.clone(), 0.0).is_err());
        assert!(ScoreRicfMag::new(cov.clone(), f64::NAN).is_err());
        let s = ScoreRicfMag::new(cov, 1e-6).unwrap();
        assert!(s.clone().with_penalty_discount(-1.0).is_err());
        assert!(s.with_max_iterations(0).is_err());
    }
}
