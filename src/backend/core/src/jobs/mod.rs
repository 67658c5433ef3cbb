//! Job orchestration core.
//!
//! Everything between "an upload landed on disk" and "an artifact (or a
//! failure reason) is available" lives here:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        Conversion Orchestration                      │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌───────────┐   ┌────────────┐   ┌──────────────┐  │
//! │  │ Admission │──▶│  JobStore │──▶│ Dispatcher │──▶│  Supervisor  │  │
//! │  │  (cap)    │   │ (records, │   │ (slots via │   │ (timeout +   │  │
//! │  │           │   │  FIFO)    │   │  pool)     │   │  retries)    │  │
//! │  └───────────┘   └───────────┘   └────────────┘   └──────────────┘  │
//! │        │               ▲                                 │          │
//! │        ▼               │                                 ▼          │
//! │  ┌───────────┐   ┌───────────┐                     ┌──────────────┐ │
//! │  │  Cleanup  │──▶│  Status   │                     │  Converter   │ │
//! │  │  Sweeper  │   │ Aggregator│                     │  (subprocess)│ │
//! │  └───────────┘   └───────────┘                     └──────────────┘ │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`JobStore`] is the single shared mutable structure; all state
//! transitions are serialized through it. The dispatcher pairs free worker
//! slots with the oldest queued job, the supervisor owns the retry budget,
//! and the sweeper reclaims terminal jobs on a TTL basis.

pub mod cleanup;
pub mod job;
pub mod pool;
pub mod runner;
pub mod service;
pub mod store;

pub use cleanup::{start_sweeper, sweep_once, SweepReport, SweeperHandle};
pub use job::{Job, JobId, JobStatus};
pub use pool::{WorkerPool, WorkerPoolStats, WorkerPermit};
pub use runner::DispatcherHandle;
pub use service::{ConvertService, StagedUpload, SystemStatus};
pub use store::{JobCounters, JobStore};
