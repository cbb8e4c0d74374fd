//! # Summary Harness
//!
//! A local-first project summarization orchestrator for AI tools.
//!
//! Summary Harness registers projects (a named source directory bound to
//! one AI tool) and processes them on demand: every eligible file under
//! the source directory is sent to the tool's HTTP endpoint for
//! summarization, and the results are aggregated into one Markdown report
//! per run. State lives in JSON-file stores; callers observe a run only by
//! polling the project store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌────────────────┐
//! │   CLI    │──▶│    Worker      │──▶│   Processor     │
//! │  (smx)   │   │ task per run  │   │ state machine  │
//! └────┬─────┘   └───────┬───────┘   └───┬───────┬────┘
//!      │                 │               │       │
//!      ▼                 ▼               ▼       ▼
//! ┌──────────────────────────┐   ┌───────────┐ ┌──────────┐
//! │   JSON stores            │   │ Collector │ │ Executor │
//! │ projects / ai_tools      │   │ txt/xlsx  │ │ HTTP API │
//! └──────────────────────────┘   └───────────┘ └──────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The CLI saves [`models::Project`] and [`models::AiTool`] records into
//!    the [`store`]s.
//! 2. `smx run` spawns a [`worker::Worker`] task owning a
//!    [`process::ProjectProcessor`].
//! 3. The processor transitions the project to Processing, persists it,
//!    then feeds each file from the [`collect::FileCollector`] to the
//!    [`executor::ToolExecutor`], appending sections to the
//!    [`report::RunReport`]. Per-file failures land in the report; the run
//!    keeps going.
//! 4. The terminal state (Completed or Failed) is persisted with its result
//!    payload; the worker exits and the caller reads the outcome back from
//!    the store.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Project and AI tool entities, derived status |
//! | [`error`] | The `HarnessError` taxonomy |
//! | [`store`] | JSON-file repositories |
//! | [`collect`] | File enumeration and content extraction |
//! | [`executor`] | AI endpoint client and factory |
//! | [`report`] | Markdown report and prompt artifacts |
//! | [`process`] | The run state machine |
//! | [`worker`] | Spawned runs, run registry, crash recovery |

pub mod collect;
pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod process;
pub mod report;
pub mod store;
pub mod worker;
