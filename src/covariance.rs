//! Sample covariance input shared read-only by every score evaluation.

use crate::error::{ConfigError, ParseError};
use nalgebra::DMatrix;

/// A named, symmetric covariance matrix together with its sample size.
#[derive(Clone, Debug, PartialEq)]
pub struct CovarianceMatrix {
    names: Vec<String>,
    sample_size: usize,
    matrix: DMatrix<f64>,
}

impl CovarianceMatrix {
    /// Validates and wraps a covariance matrix.
    ///
    /// The matrix must be square with one row per name, finite, and symmetric
    /// up to `1e-10` relative to its largest entry. It is stored exactly
    /// symmetrized.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] describing the first problem found.
    pub fn new(
        names: Vec<String>,
        sample_size: usize,
        matrix: DMatrix<f64>,
    ) -> Result<Self, ConfigError> {
        let p = names.len();
        if matrix.nrows() != p || matrix.ncols() != p {
            return Err(ConfigError::CovarianceShape {
                rows: matrix.nrows(),
                cols: matrix.ncols(),
                expected: p,
            });
        }
        if sample_size == 0 {
            return Err(ConfigError::ZeroSampleSize);
        }
        for i in 0..p {
            for j in 0..p {
                if !matrix[(i, j)].is_finite() {
                    return Err(ConfigError::CovarianceNonFinite { i, j });
                }
            }
        }
        let scale = matrix.amax().max(1.0);
        for i in 0..p {
            for j in (i + 1)..p {
                if (matrix[(i, j)] - matrix[(j, i)]).abs() > 1e-10 * scale {
                    return Err(ConfigError::CovarianceAsymmetric { i, j });
                }
            }
        }
        let matrix = (&matrix + matrix.transpose()) * 0.5;
        Ok(Self {
            names,
            sample_size,
            matrix,
        })
    }

    /// Sample covariance (divisor `n - 1`) of a data matrix with one column per variable.
    ///
    /// # Errors
    /// Fails with fewer than two rows or a name/column count mismatch.
    pub fn from_data(names: Vec<String>, data: &DMatrix<f64>) -> Result<Self, ConfigError> {
        if names.len() != data.ncols() {
            return Err(ConfigError::NameCount {
                expected: data.ncols(),
                found: names.len(),
            });
        }
        let n = data.nrows();
        if n < 2 {
            return Err(ConfigError::TooFewSamples(n));
        }
        let mut centered = data.clone();
        for j in 0..data.ncols() {
            let mean = data.column(j).mean();
            for i in 0..n {
                centered[(i, j)] -= mean;
            }
        }
        let cov = centered.transpose() * &centered / (n - 1) as f64;
        Self::new(names, n, cov)
    }

    /// Parses the whitespace-separated text format:
    ///
    /// ```text
    /// /covariance        (optional header)
    /// <sample size>
    /// <name 1> <name 2> ... <name p>
    /// <row 1>
    /// ...
    /// <row p>
    /// ```
    ///
    /// Rows may be lower-triangular (row `i` holds `i + 1` values) or full.
    /// Lines starting with `#` are ignored.
    ///
    /// # Errors
    /// Returns a [`ParseError`] with the offending line number.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
            .peekable();

        if lines
            .peek()
            .is_some_and(|(_, l)| l.eq_ignore_ascii_case("/covariance"))
        {
            lines.next();
        }

        let (line, size) = lines.next().ok_or(ParseError::Empty)?;
        let sample_size: usize = size.parse().map_err(|_| ParseError::Malformed {
            line,
            message: format!("expected a sample size, got {size:?}"),
        })?;

        let (line, header) = lines.next().ok_or(ParseError::Malformed {
            line: line + 1,
            message: "missing variable names".to_string(),
        })?;
        let names: Vec<String> = header.split_whitespace().map(str::to_string).collect();
        let p = names.len();

        let mut matrix = DMatrix::<f64>::zeros(p, p);
        let mut last = line;
        for i in 0..p {
            let (line, row) = lines.next().ok_or_else(|| ParseError::Malformed {
                line: last + 1,
                message: format!("expected {p} matrix rows, found {i}"),
            })?;
            last = line;
            let values = row
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<f64>().map_err(|_| ParseError::Malformed {
                        line,
                        message: format!("not a number: {tok:?}"),
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            if values.len() != i + 1 && values.len() != p {
                return Err(ParseError::Malformed {
                    line,
                    message: format!(
                        "row {} has {} values, expected {} or {p}",
                        i + 1,
                        values.len(),
                        i + 1
                    ),
                });
            }
            for (j, &v) in values.iter().enumerate() {
                matrix[(i, j)] = v;
                if values.len() == i + 1 {
                    matrix[(j, i)] = v;
                }
            }
        }
        if let Some((line, _)) = lines.next() {
            return Err(ParseError::Malformed {
                line,
                message: "trailing data after the matrix".to_string(),
            });
        }

        Ok(Self::new(names, sample_size, matrix)?)
    }

    /// Variable names in row order.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of variables.
    #[inline]
    pub fn dim(&self) -> usize {
        self.names.len()
    }

    /// Sample size `n`.
    #[inline]
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// The full matrix.
    #[inline]
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Entry `(i, j)`.
    #[inline]
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.matrix[(i, j)]
    }

    /// Row index of variable `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// The covariance restricted to `rows x cols` (indices into this matrix).
    pub fn submatrix(&self, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), cols.len(), |i, j| self.matrix[(rows[i], cols[j])])
    }

    /// A covariance over a subset of variables, in the given order.
    pub fn restricted_to(&self, indices: &[usize]) -> CovarianceMatrix {
        CovarianceMatrix {
            names: indices.iter().map(|&i| self.names[i].clone()).collect(),
            sample_size: self.sample_size,
            matrix: self.submatrix(indices, indices),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_lower_triangular() {
        let text = "/covariance\n100\nA B C\n1.0\n0.5 1.0\n0.25 0.5 1.0\n";
        let cov = CovarianceMatrix::parse(text).unwrap();
        assert_eq!(cov.sample_size(), 100);
        assert_eq!(cov.names(), &names(&["A", "B", "C"])[..]);
        assert_eq!(cov.value(0, 2), 0.25);
        assert_eq!(cov.value(2, 0), 0.25);
        assert_eq!(cov.value(1, 2), 0.5);
    }

    #[test]
    fn parse_full_rows() {
        let text = "# comment\n50\nX Y\n2 1\n1 3\n";
        let cov = CovarianceMatrix::parse(text).unwrap();
        assert_eq!(cov.value(0, 1), 1.0);
        assert_eq!(cov.value(1, 1), 3.0);
    }

    #[test]
    fn parse_reports_line_numbers() {
        let err = CovarianceMatrix::parse("10\nA B\n1\n0.5 x\n").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: 4, .. }));
        let err = CovarianceMatrix::parse("10\nA B\n1\n").unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
        assert!(matches!(CovarianceMatrix::parse("   \n"), Err(ParseError::Empty)));
    }

    #[test]
    fn rejects_asymmetric_and_bad_shape() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.4, 1.0]);
        assert!(matches!(
            CovarianceMatrix::new(names(&["A", "B"]), 10, m),
            Err(ConfigError::CovarianceAsymmetric { i: 0, j: 1 })
        ));
        let m = DMatrix::identity(3, 3);
        assert!(matches!(
            CovarianceMatrix::new(names(&["A", "B"]), 10, m),
            Err(ConfigError::CovarianceShape { .. })
        ));
        let m = DMatrix::identity(2, 2);
        assert_eq!(
            CovarianceMatrix::new(names(&["A", "B"]), 0, m),
            Err(ConfigError::ZeroSampleSize)
        );
    }

    #[test]
    fn sample_covariance_from_data() {
        let data = DMatrix::from_row_slice(4, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0, 4.0, 8.0]);
        let cov = CovarianceMatrix::from_data(names(&["A", "B"]), &data).unwrap();
        assert_eq!(cov.sample_size(), 4);
        assert!((cov.value(0, 0) - 5.0 / 3.0).abs() < 1e-12);
        assert!((cov.value(0, 1) - 10.0 / 3.0).abs() < 1e-12);
        assert!((cov.value(1, 1) - 20.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn restriction_keeps_order() {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 0.1, 0.2, 0.1, 2.0, 0.3, 0.2, 0.3, 3.0]);
        let cov = CovarianceMatrix::new(names(&["A", "B", "C"]), 20, m).unwrap();
        let sub = cov.restricted_to(&[2, 0]);
        assert_eq!(sub.names(), &names(&["C", "A"])[..]);
        assert_eq!(sub.value(0, 0), 3.0);
        assert_eq!(sub.value(0, 1), 0.2);
    }
}
