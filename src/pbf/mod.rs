//! PBF ingest/emit: the reader-agnostic loader and writer logic.
//!
//! This module never depends on a concrete byte-level PBF codec. Callers
//! construct [`types::PrimitiveBlock`] values themselves — from a real
//! decoder, a fixture, or another source format entirely — and drive
//! [`load_block`]/[`emit`] directly.

pub mod types;

mod ingest;
pub use ingest::{load_block, LoadStats};

mod emit;
pub use emit::{emit, BlockSink, EmitError};
