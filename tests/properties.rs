//! Property tests over randomly grown MAGs.

use magsearch::covariance::CovarianceMatrix;
use magsearch::graph::Graph;
use magsearch::moves;
use magsearch::pag::{PagNeighbors, canonical_pag_key, mag_to_pag};
use magsearch::score::{MagScore, ScoreRicfMag};
use nalgebra::DMatrix;
use proptest::prelude::*;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use std::collections::HashSet;

/// A legal MAG on `n` nodes built from `steps` random valid additions.
fn random_mag(n: usize, seed: u64, steps: usize) -> Graph {
    let mut g = Graph::with_nodes(n);
    let mut rng = XorShiftRng::seed_from_u64(seed);
    moves::random_valid_additions(&mut g, steps, &mut rng);
    g
}

/// Covariance of a linear chain `X1 -> X2 -> ... -> Xn`, named like [`Graph::with_nodes`].
fn chain_covariance(n: usize) -> CovarianceMatrix {
    let mut b = DMatrix::<f64>::zeros(n, n);
    for i in 1..n {
        b[(i, i - 1)] = 0.5 + 0.1 * i as f64;
    }
    let a = (DMatrix::identity(n, n) - b).try_inverse().unwrap();
    let names = (1..=n).map(|i| format!("X{i}")).collect();
    CovarianceMatrix::new(names, 500, &a * a.transpose()).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_growth_stays_legal(n in 2usize..7, seed in any::<u64>(), steps in 0usize..12) {
        let g = random_mag(n, seed, steps);
        prop_assert!(g.paths().is_legal_mag(), "illegal MAG:\n{}", g);
    }

    #[test]
    fn valid_moves_preserve_legality(n in 2usize..6, seed in any::<u64>(), steps in 0usize..8) {
        let g = random_mag(n, seed, steps);
        for mv in moves::valid_moves(&g) {
            let next = moves::applied(&mv, &g).unwrap();
            prop_assert!(next.paths().is_legal_mag(), "{} broke\n{}", mv.key_in(&g), g);
        }
    }

    #[test]
    fn apply_then_undo_restores(n in 2usize..6, seed in any::<u64>(), steps in 0usize..8) {
        let g = random_mag(n, seed, steps);
        for mv in moves::valid_moves(&g) {
            let mut h = g.clone();
            moves::apply(&mv, &mut h).unwrap();
            moves::undo(&mv, &mut h).unwrap();
            prop_assert_eq!(&h, &g);
        }
    }

    #[test]
    fn undirected_nodes_have_no_arrowheads(n in 2usize..7, seed in any::<u64>(), steps in 0usize..12) {
        let g = random_mag(n, seed, steps);
        for v in 0..n {
            if g.has_undirected_incident(v) {
                prop_assert!(!g.has_any_arrowhead_incident(v), "{} has both", g.name(v));
            }
        }
    }

    #[test]
    fn pag_neighbors_are_distinct(n in 2usize..5, seed in any::<u64>(), steps in 0usize..5) {
        let pag = mag_to_pag(&random_mag(n, seed, steps));
        let neighbors = PagNeighbors::neighbors_via_zhang_lift(&pag);
        let keys: HashSet<String> = neighbors.iter().map(canonical_pag_key).collect();
        prop_assert_eq!(keys.len(), neighbors.len());
    }

    #[test]
    fn scoring_is_deterministic(n in 2usize..6, seed in any::<u64>(), steps in 0usize..8) {
        let g = random_mag(n, seed, steps);
        let score = ScoreRicfMag::new(chain_covariance(n), 1e-6).unwrap();
        let a = score.safe_score(&g);
        let b = score.safe_score(&g.clone());
        prop_assert_eq!(a.to_bits(), b.to_bits());
    }
}
