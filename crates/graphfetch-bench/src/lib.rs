//! Graphfetch benchmark suite.
//!
//! Compares the fetch strategies over a generated shop:
//!
//! - **Lazy**: one query per association access
//! - **Join fold**: one joined query folded into roots
//! - **Batched**: root query plus one keyed round per collection
//! - **Projection**: flat rows from a single query

pub mod fixtures;
pub mod harness;

pub use fixtures::{populate, shop_schema, Population, Scale};
pub use harness::BenchContext;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a fmt subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "graphfetch_core=warn".into()))
        .with(fmt::layer())
        .try_init();
}
