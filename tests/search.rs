//! End-to-end search over covariance matrices implied by small linear SEMs.

use magsearch::prelude::*;
use magsearch::moves;
use nalgebra::DMatrix;

/// Population covariance of `x = B x + e` with unit error variances.
fn sem_covariance(names: &[&str], coefs: &[(usize, usize, f64)]) -> CovarianceMatrix {
    let p = names.len();
    let mut b = DMatrix::<f64>::zeros(p, p);
    for &(from, to, c) in coefs {
        b[(to, from)] = c;
    }
    let a = (DMatrix::identity(p, p) - b).try_inverse().unwrap();
    CovarianceMatrix::new(names.iter().map(|s| s.to_string()).collect(), 1000, &a * a.transpose()).unwrap()
}

fn params(seed: u64) -> GpsParams {
    GpsParams {
        restarts: 3,
        max_iterations: 50,
        ricf_tolerance: 1e-9,
        seed: Some(seed),
        ..Default::default()
    }
}

#[test]
fn add_dir_score_matches_direct_score() {
    let cov = sem_covariance(&["A", "B"], &[(0, 1, 0.7)]);
    let score = ScoreRicfMag::new(cov, 1e-9).unwrap();

    let empty = Graph::new(["A", "B"]).unwrap();
    let mv = Move::new(MoveKind::AddDir, 0, 1);
    assert!(moves::is_valid(&mv, &empty));
    let moved = moves::applied(&mv, &empty).unwrap();

    let direct = Graph::from_edges(&["A", "B"], "A --> B").unwrap();
    assert_eq!(moved, direct);
    assert_eq!(
        score.score(&moved).unwrap().to_bits(),
        score.score(&direct).unwrap().to_bits()
    );
    assert!(score.score(&direct).unwrap() > score.score(&empty).unwrap());
}

#[test]
fn search_recovers_chain_skeleton() {
    let names = ["A", "B", "C"];
    let cov = sem_covariance(&names, &[(0, 1, 0.8), (1, 2, 0.8)]);
    let truth = Graph::from_edges(&names, "A --> B\nB --> C").unwrap();
    let truth_score = ScoreRicfMag::new(cov.clone(), 1e-9).unwrap().score(&truth).unwrap();

    let result = Gps::with_covariance(cov, params(11)).unwrap().search();
    let g = &result.graph;
    assert!(g.paths().is_legal_mag(), "{g}");
    assert!(g.is_adjacent(0, 1));
    assert!(g.is_adjacent(1, 2));
    assert!(!g.is_adjacent(0, 2), "{g}");
    assert!(result.score >= truth_score - 1e-2);
    assert_eq!(result.restarts.len(), 3);
}

#[test]
fn search_finds_confounded_pair() {
    // L confounds B and C, A causes B; only A, B, C are observed.
    let full = sem_covariance(&["A", "B", "C", "L"], &[(0, 1, 0.8), (3, 1, 0.8), (3, 2, 0.8)]);
    let cov = full.restricted_to(&[0, 1, 2]);
    let result = Gps::with_covariance(cov, params(5)).unwrap().search();
    let g = &result.graph;
    assert!(g.paths().is_legal_mag(), "{g}");
    assert_eq!(g.num_edges(), 2, "{g}");
    assert!(g.is_adjacent(0, 1) && g.is_adjacent(1, 2));
    // B is a collider between A and C.
    assert!(g.is_def_collider(0, 1, 2), "{g}");
}

#[test]
fn parsed_input_drives_search() {
    let text = "\
/covariance
1000
X Y
1.0
0.0 1.0
";
    let cov = CovarianceMatrix::parse(text).unwrap();
    let result = Gps::with_covariance(cov, params(3)).unwrap().search();
    assert_eq!(result.graph.num_edges(), 0);
}

#[test]
fn pag_of_search_result_marks_collider() {
    let names = ["A", "B", "C"];
    let cov = sem_covariance(&names, &[(0, 2, 0.8), (1, 2, 0.8)]);
    let result = Gps::with_covariance(cov, params(17)).unwrap().search();
    let pag = mag_to_pag(&result.graph);
    assert_eq!(canonical_pag_key(&pag), "A o-> C;B o-> C");
}
