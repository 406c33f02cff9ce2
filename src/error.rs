//! Error types shared across the crate.
//!
//! Numerical failures ([`RicfError`]) are recoverable and get absorbed at the
//! scoring boundary. Configuration errors ([`ConfigError`]) surface from
//! constructors. Structural misuse of a graph ([`GraphError`]) is returned to
//! the caller.

/// Errors raised by graph mutation and lookup.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// No node carries this name.
    #[error("unknown node: {name}")]
    UnknownNode {
        /// The name looked up.
        name: String,
    },

    /// An index past the last node.
    #[error("node index {index} out of range for a graph with {len} nodes")]
    NodeOutOfRange {
        /// The offending index.
        index: usize,
        /// Number of nodes in the graph.
        len: usize,
    },

    /// An edge from a node to itself.
    #[error("self loop at {node}")]
    SelfLoop {
        /// The node.
        node: String,
    },

    /// An addition between nodes that already share an edge.
    #[error("{a} and {b} are already adjacent")]
    AlreadyAdjacent {
        /// First node.
        a: String,
        /// Second node.
        b: String,
    },

    /// A removal or endpoint change on a missing edge.
    #[error("{a} and {b} are not adjacent")]
    NotAdjacent {
        /// First node.
        a: String,
        /// Second node.
        b: String,
    },

    /// A removal whose edge kind does not match the existing edge.
    #[error("expected a {expected} edge between {a} and {b}, found {found}")]
    EdgeKindMismatch {
        /// First node.
        a: String,
        /// Second node.
        b: String,
        /// Kind the caller asked for.
        expected: &'static str,
        /// The edge actually present.
        found: String,
    },

    /// Two nodes share a name.
    #[error("duplicate node name: {name}")]
    DuplicateNode {
        /// The repeated name.
        name: String,
    },
}

/// Numerical failures of the RICF fit.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RicfError {
    /// A matrix could not be inverted or factored.
    #[error("matrix is singular or not positive definite ({context})")]
    Singular {
        /// Which block failed.
        context: &'static str,
    },

    /// The sweep cap was hit before the tolerance.
    #[error("RICF did not converge after {iterations} iterations (diff {diff:e})")]
    NotConverged {
        /// Sweeps performed.
        iterations: usize,
        /// Largest parameter change in the last sweep.
        diff: f64,
    },

    /// A NaN or infinity appeared mid-fit.
    #[error("non-finite value encountered ({context})")]
    NonFinite {
        /// Where it was found.
        context: &'static str,
    },

    /// Graph nodes absent from the covariance matrix.
    #[error("graph variables do not match covariance variables: missing {missing:?}")]
    VariableMismatch {
        /// Names with no covariance row.
        missing: Vec<String>,
    },
}

/// Invalid configuration or input bundles, reported at construction time.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// `restarts` is 0.
    #[error("restarts must be at least 1")]
    ZeroRestarts,

    /// An iteration cap is 0.
    #[error("max_iterations must be at least 1")]
    ZeroIterations,

    /// Tabu search requested with an empty list.
    #[error("tabu list is enabled but tabu_length is 0")]
    ZeroTabuLength,

    /// RICF tolerance out of range.
    #[error("RICF tolerance must be positive and finite, got {0}")]
    BadTolerance(f64),

    /// Ridge out of range.
    #[error("ridge must be non-negative and finite, got {0}")]
    BadRidge(f64),

    /// BIC penalty discount out of range.
    #[error("penalty discount must be positive and finite, got {0}")]
    BadPenaltyDiscount(f64),

    /// Matrix dimensions disagree with the variable count.
    #[error("covariance matrix is {rows}x{cols}, expected {expected}x{expected}")]
    CovarianceShape {
        /// Rows found.
        rows: usize,
        /// Columns found.
        cols: usize,
        /// Number of variables.
        expected: usize,
    },

    /// Matrix is not symmetric.
    #[error("covariance matrix is not symmetric at ({i}, {j})")]
    CovarianceAsymmetric {
        /// Row.
        i: usize,
        /// Column.
        j: usize,
    },

    /// Matrix holds NaN or infinity.
    #[error("covariance matrix has a non-finite entry at ({i}, {j})")]
    CovarianceNonFinite {
        /// Row.
        i: usize,
        /// Column.
        j: usize,
    },

    /// Sample size is 0.
    #[error("sample size must be at least 1")]
    ZeroSampleSize,

    /// Too few data rows for a sample covariance.
    #[error("need at least 2 samples to estimate a covariance, got {0}")]
    TooFewSamples(usize),

    /// Name count disagrees with the data columns.
    #[error("expected {expected} variable names, got {found}")]
    NameCount {
        /// Data columns.
        expected: usize,
        /// Names supplied.
        found: usize,
    },

    /// Score and graph are over different variables.
    #[error("score variables do not match the graph: {0}")]
    VariableMismatch(String),

    /// Discriminating path bound below 4.
    #[error("max discriminating path length must be at least 4, got {0}")]
    BadDiscriminatingPathLength(usize),

    /// Collider decision margin out of range.
    #[error("decision margin must be non-negative and finite, got {0}")]
    BadEpsilon(f64),
}

/// Errors encountered while parsing text input.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// Nothing but blank lines and comments.
    #[error("input is empty")]
    Empty,

    /// A line that could not be understood.
    #[error("line {line}: {message}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// Structural error while building a graph.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Parsed values failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The input could not be read.
    #[error("I/O error: {0}")]
    Io(String),
}
