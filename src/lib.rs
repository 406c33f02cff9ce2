//! # MAG Local Search
//!
//! Tabu local search over maximal ancestral graphs (MAGs), scored by a BIC
//! built on residual iterative conditional fitting (RICF).
//!
//! This crate provides:
//! - A compact mixed-graph representation with tail, arrow, and circle
//!   endpoints, plus MAG legality checks.
//! - A move catalog of single-edge additions and removals whose validity
//!   checks keep every accepted graph a legal MAG.
//! - A restartable tabu search driver with optional parallel restarts.
//! - FCI orientation rules with pluggable R0/R4 decisions, used to move
//!   between MAGs and PAGs and to orient a skeleton by score comparison.
//!
//! ## Quick Start
//!
//! ```no_run
//! use magsearch::prelude::*;
//!
//! let text = std::fs::read_to_string("data.cov").unwrap();
//! let cov = CovarianceMatrix::parse(&text).unwrap();
//! let params = GpsParams {
//!     restarts: 4,
//!     seed: Some(12345),
//!     ..Default::default()
//! };
//! let gps = Gps::with_covariance(cov, params).unwrap();
//! let result = gps.search();
//! println!("{}\nscore = {}", result.graph, result.score);
//! ```
//!
//! ## Working with Graphs Directly
//!
//! ```
//! use magsearch::graph::Graph;
//! use magsearch::moves::{self, Move, MoveKind};
//!
//! let mut g = Graph::new(["A", "B", "C"]).unwrap();
//! assert_eq!(moves::enumerate_local_moves(&g).len(), 12);
//!
//! let mv = Move::new(MoveKind::AddDir, 0, 1);
//! assert!(moves::is_valid(&mv, &g));
//! moves::apply(&mv, &mut g).unwrap();
//! assert!(g.paths().is_legal_mag());
//!
//! // A --> B already gives A an arrowhead incidence.
//! assert!(!moves::is_valid(&Move::new(MoveKind::AddUg, 0, 2), &g));
//! ```
//!
//! ## Modules
//!
//! - [`graph`], [`paths`]: mixed graphs, path queries, MAG legality.
//! - [`covariance`], [`ricf`], [`score`]: covariance input, RICF fit, BIC score.
//! - [`moves`], [`search`]: move catalog and tabu search.
//! - [`knowledge`], [`orient`], [`pag`], [`strategy`]: background knowledge,
//!   FCI orientation, PAG neighbourhoods, RICF-driven orientation.
//! - [`error`]: error types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::inline_always)] // Intentional for hot-path code
#![allow(clippy::many_single_char_names)] // Mathematical variable names
#![allow(clippy::needless_range_loop)] // Often clearer for matrix indexing
#![allow(clippy::doc_markdown)]
#![allow(clippy::multiple_crate_versions)] // Cargo.lock management is external

pub mod covariance;
pub mod error;
pub mod graph;
pub mod knowledge;
pub mod moves;
pub mod orient;
pub mod pag;
pub mod paths;
pub mod ricf;
pub mod score;
pub mod search;
pub mod strategy;

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::covariance::CovarianceMatrix;
    pub use crate::error::{ConfigError, GraphError, ParseError, RicfError};
    pub use crate::graph::{Edge, EdgeKind, Endpoint, Graph, parse_graph};
    pub use crate::knowledge::Knowledge;
    pub use crate::moves::{Move, MoveKind};
    pub use crate::orient::{DiscriminatingPath, FciOrient, MagOracleStrategy, R0R4Strategy};
    pub use crate::pag::{PagNeighbors, canonical_pag_key, mag_to_pag, zhang_mag_from_pag};
    pub use crate::score::{MagScore, ScoreRicfMag};
    pub use crate::search::{Gps, GpsParams, SearchResult};
    pub use crate::strategy::{R0R4StrategyGpsRicf, Strategy, orient_with_ricf};
}
