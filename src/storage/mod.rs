//! Hybrid storage layer: an in-memory claim graph backed by durable tabular
//! and RDF stores, with an ANN vector index and RAM-budget eviction.

pub mod claim_store;
pub mod rdf;
pub mod vector_index;

pub use claim_store::{ClaimPatch, ClaimStore};
pub use vector_index::{VectorHit, VectorIndex};
