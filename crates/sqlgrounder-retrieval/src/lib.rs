//! Module routing, hybrid retrieval, and FK-neighborhood expansion.
//!
//! This crate implements the first three stages of the schema-grounding
//! pipeline:
//! - [`module_router`] — classify a question into domain modules (S1)
//! - [`hybrid_retriever`] — cosine + lexical table retrieval fused by RRF (S2)
//! - [`fk_expander`] — bounded foreign-key neighborhood growth (S3)
//!
//! Stage functions are synchronous; they bridge into the async
//! [`sqlgrounder_db::SchemaStore`] through [`blocking::block_on`].

#![forbid(unsafe_code)]

pub(crate) mod blocking;
pub mod fk_expander;
pub mod hybrid_retriever;
pub mod module_router;

pub use fk_expander::expand_fk_neighborhood;
pub use hybrid_retriever::{retrieve_hybrid, RetrievalOutcome, RRF_K};
pub use module_router::{route_modules, RouterOutcome, RoutedModule, RoutingMethod};
