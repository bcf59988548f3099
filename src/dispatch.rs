//! # Dispatchers: execution contexts backed by Tokio runtimes.
//!
//! A [`Dispatcher`] maps ready tasks to physical execution resources. Two
//! flavors exist:
//!
//! - [`Dispatcher::worker_pool`]: a bounded multi-thread runtime for
//!   general-purpose parallel execution;
//! - [`Dispatcher::current_thread`]: a single dedicated resource whose event
//!   loop runs on whichever thread blocks on it. The blocking entry point
//!   uses one of these so that "blocking" has a well-defined meaning: the
//!   calling thread is occupied until the root scope finishes.
//!
//! ## Rules
//! - Dispatcher choice affects only which physical resource executes code,
//!   never the logical ordering guarantees of scopes and tasks.
//! - Dropping a dispatcher shuts its runtime down in the background, so a
//!   drop that happens to run inside async context cannot block or panic.
//!
//! ## Example
//! ```rust
//! use taskscope::Dispatcher;
//!
//! let pool = Dispatcher::worker_pool("crunch", 2).expect("pool builds");
//! assert_eq!(pool.name(), "crunch");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime;
use tokio::task::JoinHandle;

use crate::error::RuntimeError;

/// An execution context backed by an owned Tokio runtime.
///
/// Cheap to share as `Arc<Dispatcher>`; tasks hold a clone of the `Arc` for
/// the duration of their run.
pub struct Dispatcher {
    name: Cow<'static, str>,
    handle: runtime::Handle,
    // Taken out on drop for a background shutdown.
    rt: Option<runtime::Runtime>,
}

impl Dispatcher {
    /// Builds a bounded multi-thread dispatcher.
    ///
    /// ### Parameters
    /// - `name`: stable name used in events and thread names
    /// - `workers`: worker thread count (`0` = Tokio's default, one per core)
    pub fn worker_pool(
        name: impl Into<Cow<'static, str>>,
        workers: usize,
    ) -> Result<Arc<Self>, RuntimeError> {
        let name = name.into();
        let mut builder = runtime::Builder::new_multi_thread();
        if workers > 0 {
            builder.worker_threads(workers);
        }
        let rt = builder
            .enable_time()
            .thread_name(format!("taskscope-{name}"))
            .build()
            .map_err(|source| RuntimeError::Build {
                dispatcher: name.to_string(),
                source,
            })?;
        Ok(Arc::new(Self {
            handle: rt.handle().clone(),
            rt: Some(rt),
            name,
        }))
    }

    /// Builds a single-resource dispatcher whose event loop runs on the
    /// thread that blocks on it.
    pub fn current_thread(name: impl Into<Cow<'static, str>>) -> Result<Arc<Self>, RuntimeError> {
        let name = name.into();
        let rt = runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|source| RuntimeError::Build {
                dispatcher: name.to_string(),
                source,
            })?;
        Ok(Arc::new(Self {
            handle: rt.handle().clone(),
            rt: Some(rt),
            name,
        }))
    }

    /// Returns the dispatcher's stable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedules a future onto one of this dispatcher's execution resources.
    pub(crate) fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// Occupies the calling thread driving `fut` to completion.
    ///
    /// Only the blocking entry point uses this; every other wait in the crate
    /// is a suspension that releases its execution resource.
    pub(crate) fn block_on<F: Future>(&self, fut: F) -> F::Output {
        // rt is Some for the dispatcher's whole lifetime; it is only taken in Drop.
        self.rt
            .as_ref()
            .expect("dispatcher runtime present until drop")
            .block_on(fut)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if let Some(rt) = self.rt.take() {
            rt.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("name", &self.name).finish()
    }
}

/// The dispatcher pair every runtime carries.
///
/// - `main`: the dedicated current-thread dispatcher occupied by
///   [`Runtime::block_on`](crate::Runtime::block_on)
/// - `pool`: the shared worker pool for parallel work
///
/// Additional dispatchers can be built with [`Dispatcher::worker_pool`] and
/// passed to `spawn_on` / `with_context` directly.
#[derive(Clone, Debug)]
pub struct Dispatchers {
    main: Arc<Dispatcher>,
    pool: Arc<Dispatcher>,
}

impl Dispatchers {
    pub(crate) fn new(main: Arc<Dispatcher>, pool: Arc<Dispatcher>) -> Self {
        Self { main, pool }
    }

    /// The dedicated blocking dispatcher.
    pub fn main(&self) -> &Arc<Dispatcher> {
        &self.main
    }

    /// The shared worker pool.
    pub fn pool(&self) -> &Arc<Dispatcher> {
        &self.pool
    }
}
