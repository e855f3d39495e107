//! Bridges this crate's synchronous reranker entry point to the async
//! `sqlmodel_core::Connection` value-verification round trip, the same way
//! `sqlgrounder_retrieval::blocking` bridges hybrid retrieval.

use asupersync::runtime::RuntimeBuilder;
use std::future::Future;

/// Runs `fut` to completion on a fresh current-thread runtime. Safe to call
/// from an OS thread spawned for concurrent fan-out; never call from inside
/// a task already being driven by a runtime on the same thread.
pub(crate) fn block_on<F: Future>(fut: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("failed to build current-thread runtime");
    rt.block_on(fut)
}
