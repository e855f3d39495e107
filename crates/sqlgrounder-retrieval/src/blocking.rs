//! Bridges this crate's synchronous stage functions to the async
//! [`sqlgrounder_db::SchemaStore`] client by building a current-thread
//! runtime per call
//! (`asupersync::runtime::RuntimeBuilder::current_thread().build().block_on`).

use asupersync::runtime::RuntimeBuilder;
use std::future::Future;

/// Runs `fut` to completion on a fresh current-thread runtime.
///
/// Each call builds its own runtime, so this is safe to invoke from a plain
/// OS thread spawned for concurrent fan-out (`std::thread::scope`); it must
/// never be called from inside a task that is itself already being driven by
/// a runtime on the same thread.
pub(crate) fn block_on<F: Future>(fut: F) -> F::Output {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("failed to build current-thread runtime");
    rt.block_on(fut)
}
