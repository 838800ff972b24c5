//! Semantic layer for Vantage.
//!
//! A semantic model exposes a physical table through business-friendly
//! dimension and metric names. This crate holds the model registry and the
//! compiler that lowers a business query to parameterized SQL.
pub mod compiler;
pub mod model;

pub use compiler::{CompiledQuery, SqlCompiler};
pub use model::{Dimension, FileModelRegistry, Metric, ModelRegistry, SemanticModel};
