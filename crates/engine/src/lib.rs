//! # vantage-engine
//!
//! The live query execution pipeline. A request enters as raw SQL or a
//! semantic query and moves through a fixed sequence of stages:
//!
//! 1. **Compilation** — semantic requests are lowered to parameterized SQL.
//! 2. **Sanitization** — destructive statements are rejected before any
//!    connection is touched.
//! 3. **Cache lookup** — keyed by connection id plus normalized statement
//!    text; a hit skips execution entirely.
//! 4. **Execution** — pooled Postgres connections, a hard statement timeout,
//!    best-effort server-side cancellation on expiry.
//! 5. **Analytics augmentation** — forecast, anomaly, and cluster annotations
//!    over the unpaginated rows.
//! 6. **Shaping** — limit and pagination applied last, so page math always
//!    sees the full result.
//!
//! The [`pipeline::QueryEngine`] owns all of it; everything else in this
//! crate is a stage.

pub mod augment;
pub mod cache;
pub mod executor;
pub mod paginate;
pub mod pipeline;
pub mod pool;
pub mod resolver;
pub mod sanitizer;

pub use cache::ResultCache;
pub use executor::QueryExecutor;
pub use pipeline::QueryEngine;
pub use pool::PoolRegistry;
pub use resolver::{CredentialResolver, FileCredentialResolver};
