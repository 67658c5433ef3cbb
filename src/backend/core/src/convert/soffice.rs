//! LibreOffice subprocess executor.
//!
//! Spawns `soffice` in its own process group, enforces a wall-clock timeout,
//! and on expiry terminates the whole group so forked helper processes do not
//! outlive the attempt. LibreOffice holds a lock on its user profile, so each
//! attempt gets a throwaway profile directory inside the job's working
//! directory.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{ConvertOutcome, ConvertRequest, Converter};

/// Grace period between SIGTERM and SIGKILL on timeout.
const TERM_GRACE: Duration = Duration::from_secs(5);
/// How long to wait for the process to be reaped after SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(3);
/// How long to wait for captured output after the process exits.
const OUTPUT_GRACE: Duration = Duration::from_secs(5);

/// Converter backed by a headless LibreOffice invocation.
pub struct SofficeConverter {
    binary: PathBuf,
    timeout: Duration,
}

impl SofficeConverter {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn build_args(req: &ConvertRequest, profile_uri: &str) -> Vec<OsString> {
        vec![
            OsString::from("--headless"),
            OsString::from(format!("-env:UserInstallation={}", profile_uri)),
            OsString::from("--norestore"),
            OsString::from("--nodefault"),
            OsString::from("--nolockcheck"),
            OsString::from("--nofirststartwizard"),
            OsString::from("--convert-to"),
            OsString::from(req.convert_to.as_deref().unwrap_or("pdf")),
            OsString::from("--outdir"),
            req.outdir.clone().into_os_string(),
            req.input_path.clone().into_os_string(),
        ]
    }
}

#[async_trait]
impl Converter for SofficeConverter {
    async fn run(&self, req: &ConvertRequest) -> ConvertOutcome {
        let profile_dir = req.outdir.join("lo_profile");
        if let Err(e) = tokio::fs::create_dir_all(&profile_dir).await {
            return ConvertOutcome::Failure {
                reason: format!("failed to create profile directory: {}", e),
            };
        }
        let profile_uri = match std::fs::canonicalize(&profile_dir) {
            Ok(abs) => format!("file://{}", abs.display()),
            Err(e) => {
                return ConvertOutcome::Failure {
                    reason: format!("failed to resolve profile directory: {}", e),
                }
            }
        };

        let args = Self::build_args(req, &profile_uri);
        debug!(binary = %self.binary.display(), ?args, "spawning converter");

        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&profile_dir).await;
                return ConvertOutcome::Failure {
                    reason: format!("failed to spawn {}: {}", self.binary.display(), e),
                };
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(read_to_string(stdout));
        let stderr_task = tokio::spawn(read_to_string(stderr));

        let outcome = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                // A leftover grandchild can keep the pipes open; don't let
                // the readers outlive the attempt.
                let stdout_text = tokio::time::timeout(OUTPUT_GRACE, stdout_task)
                    .await
                    .map(|joined| joined.unwrap_or_default())
                    .unwrap_or_default();
                let stderr_text = tokio::time::timeout(OUTPUT_GRACE, stderr_task)
                    .await
                    .map(|joined| joined.unwrap_or_default())
                    .unwrap_or_default();
                if !stdout_text.is_empty() {
                    debug!(stdout = %stdout_text.trim(), "converter stdout");
                }
                if !stderr_text.is_empty() {
                    debug!(stderr = %stderr_text.trim(), "converter stderr");
                }

                if !status.success() {
                    let details = pick_details(&stderr_text, &stdout_text, "Unknown error");
                    ConvertOutcome::Failure {
                        reason: match status.code() {
                            Some(code) => format!("converter failed (code {}): {}", code, details),
                            None => format!("converter killed by signal: {}", details),
                        },
                    }
                } else {
                    match find_output_pdf(&req.input_path, &req.outdir) {
                        Some(output_path) => ConvertOutcome::Success { output_path },
                        // A zero exit with no artifact still happens; surface
                        // whatever the converter printed as the cause.
                        None => {
                            let details =
                                pick_details(&stderr_text, &stdout_text, "No output produced");
                            ConvertOutcome::Failure {
                                reason: format!("output file not created: {}", details),
                            }
                        }
                    }
                }
            }
            Ok(Err(e)) => ConvertOutcome::Failure {
                reason: format!("failed to wait for converter: {}", e),
            },
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "conversion timed out, terminating converter process group"
                );
                terminate_group(&mut child).await;
                ConvertOutcome::TimedOut
            }
        };

        let _ = tokio::fs::remove_dir_all(&profile_dir).await;
        outcome
    }
}

async fn read_to_string(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn pick_details(stderr: &str, stdout: &str, fallback: &str) -> String {
    let text = if !stderr.trim().is_empty() {
        stderr
    } else if !stdout.trim().is_empty() {
        stdout
    } else {
        fallback
    };
    text.trim().to_string()
}

/// Terminate the child's entire process group: SIGTERM first, SIGKILL after a
/// grace period, waiting in between so the child is reaped.
async fn terminate_group(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // The child was spawned as its own group leader, so its pid is
            // the pgid of everything it forked.
            let pgid = pid as i32;
            unsafe {
                let _ = libc::killpg(pgid, libc::SIGTERM);
            }
            if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
                return;
            }
            warn!(pgid, "process group survived SIGTERM, sending SIGKILL");
            unsafe {
                let _ = libc::killpg(pgid, libc::SIGKILL);
            }
            let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
            return;
        }
    }

    let _ = child.start_kill();
    let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
}

/// Locate the produced PDF: same stem as the input, `.pdf` extension, inside
/// the output directory.
fn find_output_pdf(input_path: &Path, outdir: &Path) -> Option<PathBuf> {
    let stem = input_path.file_stem()?.to_string_lossy().into_owned();
    let entries = std::fs::read_dir(outdir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&stem) && name.to_ascii_lowercase().ends_with(".pdf") {
            return Some(entry.path());
        }
    }
    None
}
