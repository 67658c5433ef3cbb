//! # docpress-core
//!
//! Office-document-to-PDF conversion service built around a bounded job
//! orchestration core.
//!
//! ## Architecture
//!
//! - **Admission & Store**: capacity-checked FIFO queue over an in-memory
//!   job record store with a strict lifecycle state machine
//! - **Worker Pool**: semaphore-bounded conversion slots with a single
//!   FIFO dispatcher
//! - **Retry Supervisor**: immediate re-attempts up to a bounded budget,
//!   with timeout and failure reasons recorded per job
//! - **Converter**: LibreOffice invoked as a supervised subprocess in its
//!   own process group, killed wholesale on timeout
//! - **Cleanup Sweeper**: TTL-based reclamation of artifacts and records
//! - **API**: axum REST surface with API-key auth, health, and Prometheus
//!   metrics

pub mod api;
pub mod config;
pub mod convert;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod telemetry;

pub use error::{DocpressError, ErrorCode, Result};
