//! Residual iterative conditional fitting (RICF) for Gaussian MAG models.
//!
//! Nodes without an incoming arrowhead form the undirected block, fitted by
//! iterative proportional fitting over its maximal cliques. Every other node
//! is fitted by cyclic regressions on its parents and on the pseudo-variables
//! of its spouses until the parameter change drops below the tolerance.
//!
//! Matrices are indexed in covariance order, not graph order. `b` follows the
//! `B` convention of the structural equations `B X = e`: the diagonal is one
//! and `b[(v, u)]` holds the negated coefficient of parent `u` in the equation
//! for `v`.

use crate::covariance::CovarianceMatrix;
use crate::error::RicfError;
use crate::graph::Graph;
use nalgebra::{Cholesky, DMatrix, DVector};

const RIDGE: f64 = 1e-10;

/// Fitted RICF parameters.
#[derive(Clone, Debug)]
pub struct RicfFit {
    /// Structural coefficient matrix (`I - coefficients`).
    pub b: DMatrix<f64>,
    /// Error covariance; the undirected block is zeroed (see `lambda`).
    pub omega: DMatrix<f64>,
    /// Precision of the undirected block, zero elsewhere.
    pub lambda: DMatrix<f64>,
    /// Implied covariance `B^-1 Omega B^-T`.
    pub sigma_hat: DMatrix<f64>,
    /// Covariance indices of the undirected block.
    pub ug: Vec<usize>,
    /// Outer iterations used.
    pub iterations: usize,
    /// Final parameter change.
    pub diff: f64,
}

// ============================================================================
// Matrix helpers
// ============================================================================

fn select(m: &DMatrix<f64>, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols.len(), |i, j| m[(rows[i], cols[j])])
}

fn assign(m: &mut DMatrix<f64>, rows: &[usize], cols: &[usize], src: &DMatrix<f64>) {
    for (i, &r) in rows.iter().enumerate() {
        for (j, &c) in cols.iter().enumerate() {
            m[(r, c)] = src[(i, j)];
        }
    }
}

/// Inverse of the symmetrized matrix with a small ridge on the diagonal.
fn inv_spd(m: &DMatrix<f64>, context: &'static str) -> Result<DMatrix<f64>, RicfError> {
    let mut s = (m + m.transpose()) * 0.5;
    for i in 0..s.nrows() {
        s[(i, i)] += RIDGE;
    }
    let inv = s.try_inverse().ok_or(RicfError::Singular { context })?;
    if inv.iter().all(|x| x.is_finite()) {
        Ok(inv)
    } else {
        Err(RicfError::NonFinite { context })
    }
}

/// Maximum absolute column sum.
fn norm1(m: &DMatrix<f64>) -> f64 {
    m.column_iter()
        .map(|c| c.iter().map(|x| x.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

fn complement(p: usize, idx: &[usize]) -> Vec<usize> {
    (0..p).filter(|i| !idx.contains(i)).collect()
}

// ============================================================================
// Maximal cliques
// ============================================================================

/// Maximal cliques of the skeleton of `graph`, each sorted, in lexicographic order.
///
/// Bron-Kerbosch with pivoting. Isolated nodes form singleton cliques.
pub fn maximal_cliques(graph: &Graph) -> Vec<Vec<usize>> {
    let n = graph.num_nodes();
    let adj: Vec<Vec<bool>> = (0..n)
        .map(|a| (0..n).map(|b| graph.is_adjacent(a, b)).collect())
        .collect();
    let mut out = Vec::new();
    let mut current = Vec::new();
    bron_kerbosch(&adj, &mut current, (0..n).collect(), Vec::new(), &mut out);
    for c in &mut out {
        c.sort_unstable();
    }
    out.sort();
    out
}

fn bron_kerbosch(
    adj: &[Vec<bool>],
    current: &mut Vec<usize>,
    mut candidates: Vec<usize>,
    mut excluded: Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if candidates.is_empty() {
        if excluded.is_empty() {
            out.push(current.clone());
        }
        return;
    }
    // Pivot on the vertex covering the most candidates.
    let pivot = candidates
        .iter()
        .chain(excluded.iter())
        .copied()
        .max_by_key(|&u| candidates.iter().filter(|&&v| adj[u][v]).count())
        .unwrap_or(candidates[0]);
    let branch: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&v| !adj[pivot][v])
        .collect();
    for v in branch {
        current.push(v);
        bron_kerbosch(
            adj,
            current,
            candidates.iter().copied().filter(|&u| adj[v][u]).collect(),
            excluded.iter().copied().filter(|&u| adj[v][u]).collect(),
            out,
        );
        current.pop();
        candidates.retain(|&u| u != v);
        excluded.push(v);
    }
}

// ============================================================================
// Undirected block
// ============================================================================

/// Fits a concentration graph model by iterative proportional fitting.
///
/// `s` is the covariance of the nodes of `graph`, in graph order. Returns the
/// fitted covariance.
///
/// # Errors
/// Fails if a block inversion is singular or the fit does not converge within
/// `max_iterations` sweeps.
pub fn fit_con_graph(
    graph: &Graph,
    s: &DMatrix<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> Result<DMatrix<f64>, RicfError> {
    let cliques = maximal_cliques(graph);
    if cliques.len() <= 1 {
        return Ok(s.clone());
    }

    let k = s.nrows();
    let mut kmat = inv_spd(&DMatrix::from_diagonal(&s.diagonal()), "diagonal start")?;
    let mut diff = f64::INFINITY;

    for _ in 0..max_iterations {
        let old = kmat.clone();
        for a in &cliques {
            let b = complement(k, a);
            let mut kaa = inv_spd(&select(s, a, a), "clique covariance")?;
            if !b.is_empty() {
                let kab = select(&kmat, a, &b);
                let kbb_inv = inv_spd(&select(&kmat, &b, &b), "clique complement")?;
                let kba = select(&kmat, &b, a);
                kaa += kab * kbb_inv * kba;
            }
            assign(&mut kmat, a, a, &kaa);
        }
        diff = norm1(&(&kmat - &old));
        if !diff.is_finite() {
            return Err(RicfError::NonFinite {
                context: "concentration graph fit",
            });
        }
        if diff < tolerance {
            return inv_spd(&kmat, "fitted concentration");
        }
    }
    Err(RicfError::NotConverged {
        iterations: max_iterations,
        diff,
    })
}

// ============================================================================
// RICF
// ============================================================================

/// Maps covariance indices to graph nodes.
fn align(graph: &Graph, cov: &CovarianceMatrix) -> Result<Vec<usize>, RicfError> {
    let mut missing: Vec<String> = Vec::new();
    let mut node_of = Vec::with_capacity(cov.dim());
    for name in cov.names() {
        match graph.node(name) {
            Some(i) => node_of.push(i),
            None => missing.push(name.clone()),
        }
    }
    missing.extend(
        graph
            .names()
            .iter()
            .filter(|n| cov.index_of(n).is_none())
            .cloned(),
    );
    if missing.is_empty() {
        Ok(node_of)
    } else {
        Err(RicfError::VariableMismatch { missing })
    }
}

/// Fits the Gaussian MAG model of `graph` to `cov`.
///
/// # Errors
/// Returns a [`RicfError`] if variables do not match, a matrix is singular,
/// values stop being finite, or the fit does not converge within
/// `max_iterations` sweeps.
pub fn fit(
    graph: &Graph,
    cov: &CovarianceMatrix,
    tolerance: f64,
    max_iterations: usize,
) -> Result<RicfFit, RicfError> {
    let node_of = align(graph, cov)?;
    let p = cov.dim();
    let s = cov.matrix();

    if p == 0 {
        return Ok(RicfFit {
            b: DMatrix::zeros(0, 0),
            omega: DMatrix::zeros(0, 0),
            lambda: DMatrix::zeros(0, 0),
            sigma_hat: DMatrix::zeros(0, 0),
            ug: Vec::new(),
            iterations: 0,
            diff: 0.0,
        });
    }

    let mut pos = vec![0usize; graph.num_nodes()];
    for (i, &node) in node_of.iter().enumerate() {
        pos[node] = i;
    }
    let to_cov = |nodes: Vec<usize>| -> Vec<usize> {
        let mut v: Vec<usize> = nodes.into_iter().map(|u| pos[u]).collect();
        v.sort_unstable();
        v
    };
    let parents: Vec<Vec<usize>> = node_of.iter().map(|&u| to_cov(graph.parents(u))).collect();
    let spouses: Vec<Vec<usize>> = node_of.iter().map(|&u| to_cov(graph.spouses(u))).collect();
    let ug: Vec<usize> = (0..p)
        .filter(|&i| !graph.has_arrowhead_into(node_of[i]))
        .collect();

    let mut omega = DMatrix::from_diagonal(&s.diagonal());
    let mut b = DMatrix::<f64>::identity(p, p);

    if !ug.is_empty() {
        let ug_nodes: Vec<usize> = ug.iter().map(|&i| node_of[i]).collect();
        let ug_graph = graph.subgraph(&ug_nodes);
        let shat = fit_con_graph(&ug_graph, &select(s, &ug, &ug), tolerance, max_iterations)?;
        assign(&mut omega, &ug, &ug, &shat);
    }

    let all: Vec<usize> = (0..p).collect();
    let mut iterations = 0;
    let mut diff;

    loop {
        iterations += 1;
        let omega_old = omega.clone();
        let b_old = b.clone();

        for v in 0..p {
            if ug.binary_search(&v).is_ok() {
                continue;
            }
            let par = &parents[v];
            let spo = &spouses[v];

            if spo.is_empty() {
                // Parents only: ordinary least squares, fixed after the first sweep.
                if !par.is_empty() && iterations == 1 {
                    let s_pp_inv = inv_spd(&select(s, par, par), "parent covariance")?;
                    let coef = select(s, &[v], par) * s_pp_inv;
                    for (j, &u) in par.iter().enumerate() {
                        b[(v, u)] = -coef[(0, j)];
                    }
                    let explained = (&coef * select(s, par, &[v]))[(0, 0)];
                    omega[(v, v)] = s[(v, v)] - explained;
                }
                continue;
            }

            let vcomp = complement(p, &[v]);
            let o_inv = inv_spd(&select(&omega, &vcomp, &vcomp), "error covariance")?;
            let spo_pos: Vec<usize> = spo.iter().map(|&u| if u < v { u } else { u - 1 }).collect();
            let vcomp_pos: Vec<usize> = (0..vcomp.len()).collect();

            // Pseudo-variables of the spouses.
            let z = select(&o_inv, &spo_pos, &vcomp_pos) * select(&b, &vcomp, &all);

            let lpa = par.len();
            let lspo = spo.len();
            let mut xx = DMatrix::<f64>::zeros(lpa + lspo, lpa + lspo);
            xx.view_mut((0, 0), (lpa, lpa))
                .copy_from(&select(s, par, par));
            let cross = select(s, par, &all) * z.transpose();
            xx.view_mut((0, lpa), (lpa, lspo)).copy_from(&cross);
            xx.view_mut((lpa, 0), (lspo, lpa))
                .copy_from(&cross.transpose());
            xx.view_mut((lpa, lpa), (lspo, lspo))
                .copy_from(&(&z * s * z.transpose()));

            let mut yx = DVector::<f64>::zeros(lpa + lspo);
            for (j, &u) in par.iter().enumerate() {
                yx[j] = s[(v, u)];
            }
            let s_v_z = select(s, &[v], &all) * z.transpose();
            for j in 0..lspo {
                yx[lpa + j] = s_v_z[(0, j)];
            }

            let temp = inv_spd(&xx, "regression design")?.transpose() * &yx;

            for (j, &u) in par.iter().enumerate() {
                b[(v, u)] = -temp[j];
            }
            for (j, &u) in spo.iter().enumerate() {
                omega[(v, u)] = temp[lpa + j];
                omega[(u, v)] = temp[lpa + j];
            }

            let residual = s[(v, v)] - temp.dot(&yx);
            let w = DVector::from_iterator(lspo, spo.iter().map(|&u| omega[(v, u)]));
            let o_inv_spsp = select(&o_inv, &spo_pos, &spo_pos);
            omega[(v, v)] = residual + (w.transpose() * o_inv_spsp * &w)[(0, 0)];
        }

        diff = norm1(&(&omega - &omega_old)) + norm1(&(&b - &b_old));
        if !diff.is_finite() {
            return Err(RicfError::NonFinite {
                context: "RICF update",
            });
        }
        if diff < tolerance {
            break;
        }
        if iterations >= max_iterations {
            return Err(RicfError::NotConverged { iterations, diff });
        }
    }

    let mut omega = (&omega + omega.transpose()) * 0.5;
    for i in 0..p {
        if omega[(i, i)] <= 0.0 {
            omega[(i, i)] = 1e-8;
        }
    }

    let b_inv = b
        .clone()
        .try_inverse()
        .ok_or(RicfError::Singular { context: "B" })?;
    let sigma_hat = &b_inv * &omega * b_inv.transpose();

    let mut lambda = DMatrix::<f64>::zeros(p, p);
    if !ug.is_empty() {
        let lambda_ug = inv_spd(&select(&omega, &ug, &ug), "undirected block")?;
        assign(&mut lambda, &ug, &ug, &lambda_ug);
        let zeros = DMatrix::zeros(ug.len(), ug.len());
        assign(&mut omega, &ug, &ug, &zeros);
    }

    Ok(RicfFit {
        b,
        omega,
        lambda,
        sigma_hat,
        ug,
        iterations,
        diff,
    })
}

/// Gaussian log-likelihood of a fit, up to the additive constant:
/// `-n/2 * (tr(K S) - log|K|)` with `K = B^T D B`, where `D` is the inverse
/// error covariance outside the undirected block and `Lambda` inside it.
///
/// # Errors
/// Fails if `K` is not positive definite even after a small ridge.
pub fn log_likelihood(fit: &RicfFit, cov: &CovarianceMatrix) -> Result<f64, RicfError> {
    let p = cov.dim();
    if p == 0 {
        return Ok(0.0);
    }
    let n = cov.sample_size() as f64;

    let mut d = DMatrix::<f64>::zeros(p, p);
    let directed = complement(p, &fit.ug);
    if !directed.is_empty() {
        let o_inv = inv_spd(&select(&fit.omega, &directed, &directed), "error covariance")?;
        assign(&mut d, &directed, &directed, &o_inv);
    }
    if !fit.ug.is_empty() {
        let l = select(&fit.lambda, &fit.ug, &fit.ug);
        assign(&mut d, &fit.ug, &fit.ug, &l);
    }

    let k = fit.b.transpose() * d * &fit.b;
    let tr_ks = k.component_mul(&cov.matrix().transpose()).sum();

    let log_det_k = match Cholesky::new(k.clone()) {
        Some(chol) => log_det_from_cholesky(&chol),
        None => {
            let mut ks = (&k + k.transpose()) * 0.5;
            for i in 0..p {
                ks[(i, i)] += 1e-8;
            }
            let chol = Cholesky::new(ks).ok_or(RicfError::Singular {
                context: "implied precision",
            })?;
            log_det_from_cholesky(&chol)
        }
    };

    let ll = -0.5 * n * (tr_ks - log_det_k);
    if ll.is_finite() {
        Ok(ll)
    } else {
        Err(RicfError::NonFinite {
            context: "log-likelihood",
        })
    }
}

fn log_det_from_cholesky(chol: &Cholesky<f64, nalgebra::Dyn>) -> f64 {
    2.0 * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cov(names: &[&str], n: usize, rows: &[f64]) -> CovarianceMatrix {
        let p = names.len();
        CovarianceMatrix::new(
            names.iter().map(|s| s.to_string()).collect(),
            n,
            DMatrix::from_row_slice(p, p, rows),
        )
        .unwrap()
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() < tol, "{a} vs {b}");
    }

    #[test]
    fn cliques_of_a_path_and_triangle() {
        let g = Graph::from_edges(&["A", "B", "C", "D", "E"], "A --- B\nB --- C\nC --- D\nB --- D").unwrap();
        assert_eq!(maximal_cliques(&g), vec![vec![0, 1], vec![1, 2, 3], vec![4]]);
    }

    #[test]
    fn empty_graph_fits_diagonal() {
        let s = cov(&["A", "B"], 100, &[2.0, 0.6, 0.6, 1.0]);
        let g = Graph::new(["A", "B"]).unwrap();
        let fit = fit(&g, &s, 1e-8, 100).unwrap();
        assert_eq!(fit.ug, vec![0, 1]);
        assert_close(fit.sigma_hat[(0, 0)], 2.0, 1e-8);
        assert_close(fit.sigma_hat[(0, 1)], 0.0, 1e-8);
        assert_close(fit.lambda[(1, 1)], 1.0, 1e-8);
    }

    #[test]
    fn directed_edge_reproduces_covariance() {
        let s = cov(&["A", "B"], 100, &[2.0, 0.6, 0.6, 1.0]);
        let g = Graph::from_edges(&["A", "B"], "A --> B").unwrap();
        let fit = fit(&g, &s, 1e-8, 100).unwrap();
        assert_eq!(fit.ug, vec![0]);
        assert_close(fit.b[(1, 0)], -0.3, 1e-8);
        for i in 0..2 {
            for j in 0..2 {
                assert_close(fit.sigma_hat[(i, j)], s.value(i, j), 1e-6);
            }
        }
    }

    #[test]
    fn bidirected_edge_reproduces_covariance() {
        let s = cov(&["A", "B"], 100, &[1.0, 0.4, 0.4, 1.5]);
        let g = Graph::from_edges(&["A", "B"], "A <-> B").unwrap();
        let fit = fit(&g, &s, 1e-10, 500).unwrap();
        assert!(fit.ug.is_empty());
        assert_close(fit.sigma_hat[(0, 1)], 0.4, 1e-5);
        assert_close(fit.sigma_hat[(1, 1)], 1.5, 1e-5);
    }

    #[test]
    fn saturated_model_beats_empty_model() {
        let s = cov(&["A", "B"], 200, &[1.0, 0.5, 0.5, 1.0]);
        let empty = Graph::new(["A", "B"]).unwrap();
        let edge = Graph::from_edges(&["A", "B"], "A --> B").unwrap();
        let ll_empty = log_likelihood(&fit(&empty, &s, 1e-8, 100).unwrap(), &s).unwrap();
        let ll_edge = log_likelihood(&fit(&edge, &s, 1e-8, 100).unwrap(), &s).unwrap();
        assert!(ll_edge > ll_empty);
    }

    #[test]
    fn likelihood_is_equivalence_invariant() {
        let s = cov(&["A", "B"], 200, &[1.0, 0.5, 0.5, 1.0]);
        let fwd = Graph::from_edges(&["A", "B"], "A --> B").unwrap();
        let bwd = Graph::from_edges(&["A", "B"], "B --> A").unwrap();
        let und = Graph::from_edges(&["A", "B"], "A --- B").unwrap();
        let lf = log_likelihood(&fit(&fwd, &s, 1e-8, 100).unwrap(), &s).unwrap();
        let lb = log_likelihood(&fit(&bwd, &s, 1e-8, 100).unwrap(), &s).unwrap();
        let lu = log_likelihood(&fit(&und, &s, 1e-8, 100).unwrap(), &s).unwrap();
        assert_close(lf, lb, 1e-6);
        assert_close(lf, lu, 1e-6);
    }

    #[test]
    fn missing_variable_is_reported() {
        let s = cov(&["A", "B"], 10, &[1.0, 0.0, 0.0, 1.0]);
        let g = Graph::new(["A", "C"]).unwrap();
        match fit(&g, &s, 1e-6, 10) {
            Err(RicfError::VariableMismatch { missing }) => {
                assert_eq!(missing, vec!["B".to_string(), "C".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn graph_order_does_not_matter() {
        let s = cov(&["A", "B", "C"], 100, &[1.0, 0.5, 0.2, 0.5, 1.0, 0.4, 0.2, 0.4, 1.0]);
        let g1 = Graph::from_edges(&["A", "B", "C"], "A --> B\nB <-> C").unwrap();
        let g2 = Graph::from_edges(&["C", "B", "A"], "A --> B\nB <-> C").unwrap();
        let l1 = log_likelihood(&fit(&g1, &s, 1e-8, 500).unwrap(), &s).unwrap();
        let l2 = log_likelihood(&fit(&g2, &s, 1e-8, 500).unwrap(), &s).unwrap();
        assert_close(l1, l2, 1e-9);
    }
}
