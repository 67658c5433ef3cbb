//! Document conversion backends.
//!
//! The [`Converter`] trait is the seam between job orchestration and the
//! actual document transformation. The production implementation,
//! [`SofficeConverter`], shells out to LibreOffice; tests substitute scripted
//! implementations to drive the retry and timeout paths deterministically.

use async_trait::async_trait;
use std::path::PathBuf;

mod soffice;

pub use soffice::SofficeConverter;

/// One conversion attempt: an input document, the directory the artifact must
/// land in, and an optional converter-specific format directive (for
/// LibreOffice, a `--convert-to` filter such as `pdf:writer_pdf_Export`).
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub input_path: PathBuf,
    pub outdir: PathBuf,
    pub convert_to: Option<String>,
}

/// Terminal outcome of a single conversion attempt.
///
/// Faults that prevent the attempt from running at all (e.g. the converter
/// binary cannot be spawned) are reported as [`ConvertOutcome::Failure`]; the
/// retry supervisor treats them like any other failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// The converter exited zero and the expected artifact exists.
    Success { output_path: PathBuf },
    /// Non-zero exit, missing artifact, or a spawn/wait fault.
    Failure { reason: String },
    /// The attempt exceeded the configured wall-clock timeout and the
    /// converter process group was forcibly terminated.
    TimedOut,
}

/// A document conversion backend.
///
/// Implementations run exactly one attempt per call and never retry
/// internally; concurrency limits are the worker pool's concern.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn run(&self, req: &ConvertRequest) -> ConvertOutcome;
}
