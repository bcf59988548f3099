//! # taskscope
//!
//! **Taskscope** is a structured-concurrency library for Rust on Tokio.
//!
//! Concurrent units of work ("tasks") are grouped under lexical scopes: a
//! scope never produces its outcome until every task it spawned has
//! completed, failed, or been cancelled, and failures propagate predictably
//! through the task tree. The crate is designed as a coordination primitive
//! for code that wants Tokio's execution model with hard lifetime guarantees
//! around groups of tasks.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//!     │   work fn    │  │   work fn    │  │   work fn    │
//!     │ (user task)  │  │ (user task)  │  │ (user task)  │
//!     └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!            ▼                 ▼                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Scope (structured boundary)                                 │
//! │  - child set (drained before the boundary returns)           │
//! │  - scope CancellationToken (parent of every child token)     │
//! │  - first-failure slot (first writer wins, cancels siblings)  │
//! └──────┬──────────────────┬─────────────────┬─────────────────┘
//!        ▼                  ▼                 ▼
//!   ┌──────────┐      ┌──────────┐      ┌──────────┐
//!   │ run_task │      │ run_task │      │ run_task │   (one per task:
//!   │ (runner) │      │ (runner) │      │ (runner) │    state machine +
//!   └────┬─────┘      └────┬─────┘      └────┬─────┘    result slot)
//!        │                 │                 │
//!        ▼                 ▼                 ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Dispatchers: "main" (current thread) + "pool" (workers)     │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                ▼
//!                     Bus (broadcast events)
//!                                ▼
//!                  SubscriberSet ──► user subscribers
//! ```
//!
//! ### Lifecycle
//! ```text
//! run_blocking(body) / Runtime::block_on(body)
//!   ├─► root Scope on the "main" dispatcher
//!   ├─► body(ctx).await
//!   │     ├─► ctx.scope().spawn(..)            fire-and-forget child
//!   │     ├─► ctx.scope().spawn_awaitable(..)  joinable child
//!   │     ├─► ctx.with_scope(..)               nested boundary
//!   │     └─► ctx.with_context(dispatcher, ..) run on another dispatcher
//!   ├─► close: drain every child, sweep unobserved failures
//!   └─► Ok(value) | Err(first failure) | Err(cancelled)
//! ```
//!
//! ## Semantics
//! | Area             | Rule                                                                  |
//! |------------------|-----------------------------------------------------------------------|
//! | **Structure**    | A scope returns only after all children (transitively) are terminal.  |
//! | **Fail-fast**    | The first unhandled failure cancels the scope's remaining children.   |
//! | **Cancellation** | Cooperative; observed at `delay`, `join`, `with_scope`, `with_context`.|
//! | **Isolation**    | Cancelling one task signals its own token, never its siblings'.       |
//! | **Errors**       | Tagged results everywhere; failure and cancellation never merge.      |
//! | **No silence**   | A failure never delivered to a `join` still fails its scope.          |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] *(demo/reference only)*.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use taskscope::{run_blocking, TaskError};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sum = run_blocking(|ctx| async move {
//!         // Two independent children run concurrently.
//!         let a = ctx.scope().spawn_awaitable("a", |c| async move {
//!             c.delay(Duration::from_millis(20)).await?;
//!             Ok(3)
//!         });
//!         let b = ctx.scope().spawn_awaitable("b", |c| async move {
//!             c.delay(Duration::from_millis(20)).await?;
//!             Ok(4)
//!         });
//!         Ok(a.join(&ctx).await? + b.join(&ctx).await?)
//!     })?;
//!     assert_eq!(sum, 7);
//!     Ok(())
//! }
//! ```

mod core;
mod dispatch;
mod error;
mod events;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use self::core::{run_blocking, Config, Runtime, RuntimeBuilder, Scope};
pub use dispatch::{Dispatcher, Dispatchers};
pub use error::{RuntimeError, TaskError};
pub use events::{Event, EventKind};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Deferred, TaskContext, TaskHandle, TaskState};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
