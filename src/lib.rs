//! docfold - detects redundant or overlapping documents, merges each group
//! into one canonical document and archives the originals with a ledger.
//!
//! Flow: [`loader`] -> [`extract`] -> [`score`] / [`cluster`] ->
//! {[`select`] -> [`merge`] -> [`naming`]} folded into a [`plan`], which
//! [`archive`] applies and records in the [`ledger`].

pub mod archive;
pub mod cluster;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod loader;
pub mod lock;
pub mod logging;
pub mod merge;
pub mod naming;
pub mod plan;
pub mod probe;
pub mod score;
pub mod select;

pub use cluster::{Cluster, ClusterStrategy, GreedyStrategy, TransitiveStrategy};
pub use config::{EngineConfig, StrategyKind};
pub use document::{Document, PairScore, SizeClass};
pub use engine::{Consolidator, RunReport};
pub use error::{ConsolidateError, Result};
pub use probe::{ContentProbe, StreamingProbe};
pub use score::score;
