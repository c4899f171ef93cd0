use indicatif::{ProgressBar, ProgressStyle};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::error::{ErrorDetail, ExportError, Result};
use crate::interpret::interpret_response;
use crate::transport::{HttpResponse, Transport};

/// Upper bound on the poll loop. There is no implicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollLimit {
    /// Give up after this many poll requests.
    Attempts(usize),
    /// Give up once this much time has passed since polling started.
    Deadline(Duration),
    /// Poll until the service answers with a terminal status.
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before every poll request. Zero polls back to back.
    pub interval: Duration,
    pub limit: PollLimit,
}

impl PollPolicy {
    pub fn new(interval: Duration, limit: PollLimit) -> Self {
        Self { interval, limit }
    }
}

/// Classification of a poll response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Ready,
    NotReady,
    Failed,
}

pub fn classify_status(status: u16) -> PollStatus {
    match status {
        200 => PollStatus::Ready,
        s if s > 201 => PollStatus::Failed,
        _ => PollStatus::NotReady,
    }
}

/// Result of a single poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Artifact bytes were written to this path.
    Ready(PathBuf),
    NotReady,
    Failed(ErrorDetail),
}

/// Polls an export URL and streams the finished artifact to disk.
///
/// The artifact is first written to a staging file next to the destination
/// and renamed over it only once the whole body has arrived. Failure and
/// cancellation drop the staging file, so the destination is left untouched.
pub struct Poller<'a> {
    transport: &'a dyn Transport,
    policy: PollPolicy,
    overwrite: bool,
    progress: bool,
    cancel: CancelToken,
}

impl<'a> Poller<'a> {
    pub fn new(transport: &'a dyn Transport, policy: PollPolicy) -> Self {
        Self {
            transport,
            policy,
            overwrite: true,
            progress: false,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the poll loop until the artifact lands at `target`.
    pub fn run(&self, export_url: &str, target: &Path) -> Result<PathBuf> {
        if !self.overwrite && target.exists() {
            return Err(ExportError::validation(format!(
                "{} already exists and overwrite is disabled",
                target.display()
            )));
        }

        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| ExportError::io(&dir, e))?;
        let mut staging = tempfile::Builder::new()
            .prefix(".exportapi-")
            .suffix(".part")
            .tempfile_in(&dir)
            .map_err(|e| ExportError::io(&dir, e))?;

        let started = Instant::now();
        let mut attempts = 0usize;
        let mut last_status: Option<u16> = None;

        loop {
            match self.policy.limit {
                PollLimit::Attempts(max) if attempts >= max => {
                    return Err(ExportError::PollLimitExceeded { attempts });
                }
                PollLimit::Deadline(limit)
                    if started
                        .elapsed()
                        .checked_add(self.policy.interval)
                        .is_none_or(|next| next > limit) =>
                {
                    return Err(ExportError::PollLimitExceeded { attempts });
                }
                _ => {}
            }

            if self.cancel.sleep(self.policy.interval) {
                info!(attempts, "export cancelled while waiting");
                return Err(ExportError::Cancelled);
            }

            attempts += 1;
            let resp = self.transport.get(export_url, &[])?;
            // A cancel that lands while the request is in flight wins over its status.
            if self.cancel.is_cancelled() {
                info!(attempts, status = resp.status, "export cancelled during request");
                return Err(ExportError::Cancelled);
            }
            if last_status != Some(resp.status) {
                last_status = Some(resp.status);
                info!(status = resp.status, attempt = attempts, "export status");
            }

            match self.poll_once(export_url, resp, &mut staging)? {
                ExportOutcome::Ready(_) => break,
                ExportOutcome::NotReady => continue,
                ExportOutcome::Failed(detail) => {
                    warn!(status = detail.status, kind = detail.kind.as_str(), "export failed");
                    return Err(ExportError::Remote(detail));
                }
            }
        }

        let persisted = if self.overwrite {
            staging.persist(target)
        } else {
            staging.persist_noclobber(target)
        };
        persisted.map_err(|e| ExportError::io(target, e.error))?;
        info!(path = %target.display(), attempts, "export downloaded");
        Ok(target.to_path_buf())
    }

    fn poll_once(
        &self,
        export_url: &str,
        mut resp: HttpResponse,
        staging: &mut NamedTempFile,
    ) -> Result<ExportOutcome> {
        match classify_status(resp.status) {
            PollStatus::NotReady => Ok(ExportOutcome::NotReady),
            PollStatus::Failed => {
                let body = resp.read_body(export_url)?;
                Ok(ExportOutcome::Failed(interpret_response(
                    resp.status,
                    resp.reason.as_deref(),
                    resp.content_type.as_deref(),
                    &body,
                )))
            }
            PollStatus::Ready => {
                let written = self.stream_body(export_url, &mut resp, staging)?;
                debug!(bytes = written, "artifact staged");
                Ok(ExportOutcome::Ready(staging.path().to_path_buf()))
            }
        }
    }

    fn stream_body(
        &self,
        export_url: &str,
        resp: &mut HttpResponse,
        staging: &mut NamedTempFile,
    ) -> Result<u64> {
        let path = staging.path().to_path_buf();
        let out = staging.as_file_mut();
        out.set_len(0).map_err(|e| ExportError::io(&path, e))?;
        out.seek(SeekFrom::Start(0))
            .map_err(|e| ExportError::io(&path, e))?;

        let pb = self.progress.then(|| progress_bar(resp.content_length));

        let mut written: u64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            if self.cancel.is_cancelled() {
                if let Some(pb) = &pb {
                    pb.abandon();
                }
                return Err(ExportError::Cancelled);
            }
            let n = match resp.body.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ExportError::network(export_url, e)),
            };
            out.write_all(&buf[..n])
                .map_err(|e| ExportError::io(&path, e))?;
            written += n as u64;
            if let Some(pb) = &pb {
                pb.inc(n as u64);
            }
        }

        out.flush().map_err(|e| ExportError::io(&path, e))?;
        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }
        Ok(written)
    }
}

fn progress_bar(len: Option<u64>) -> ProgressBar {
    match len {
        Some(len) => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
            ) {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        None => ProgressBar::new_spinner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::{ScriptedTransport, reply};
    use tempfile::TempDir;

    const GZ: &str = "application/gzip";

    fn quick(limit: PollLimit) -> PollPolicy {
        PollPolicy::new(Duration::ZERO, limit)
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(200), PollStatus::Ready);
        assert_eq!(classify_status(100), PollStatus::NotReady);
        assert_eq!(classify_status(201), PollStatus::NotReady);
        assert_eq!(classify_status(202), PollStatus::Failed);
        assert_eq!(classify_status(404), PollStatus::Failed);
        assert_eq!(classify_status(500), PollStatus::Failed);
    }

    #[test]
    fn ready_after_three_not_ready_polls() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.csv.gz");
        let transport = ScriptedTransport::new(vec![
            reply(201, "application/json", b"{}"),
            reply(201, "application/json", b"{}"),
            reply(201, "application/json", b"{}"),
            reply(200, GZ, b"artifact-bytes"),
        ]);

        let path = Poller::new(&transport, quick(PollLimit::Attempts(10)))
            .run("https://files/x.csv.gz", &target)
            .unwrap();

        assert_eq!(path, target);
        assert_eq!(transport.calls().len(), 4);
        assert_eq!(std::fs::read(&target).unwrap(), b"artifact-bytes");
        // Only the artifact remains; the staging file is gone.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn attempt_limit_is_enforced() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![
            reply(201, "application/json", b"{}"),
            reply(201, "application/json", b"{}"),
            reply(200, GZ, b"late"),
        ]);

        let err = Poller::new(&transport, quick(PollLimit::Attempts(2)))
            .run("https://files/x", &dir.path().join("x"))
            .unwrap_err();

        assert!(matches!(err, ExportError::PollLimitExceeded { attempts: 2 }));
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn deadline_limit_is_enforced() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![reply(201, "application/json", b"{}")]);

        let policy = PollPolicy::new(Duration::from_millis(30), PollLimit::Deadline(Duration::from_millis(40)));
        let err = Poller::new(&transport, policy)
            .run("https://files/x", &dir.path().join("x"))
            .unwrap_err();

        assert!(matches!(err, ExportError::PollLimitExceeded { attempts: 1 }), "{err:?}");
    }

    #[test]
    fn terminal_status_stops_polling_and_keeps_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.csv.gz");
        std::fs::write(&target, b"previous export").unwrap();
        let transport = ScriptedTransport::new(vec![
            reply(201, "application/json", b"{}"),
            reply(
                410,
                "application/xml",
                b"<errors><error>export: expired</error></errors>",
            ),
            reply(200, GZ, b"never fetched"),
        ]);

        let err = Poller::new(&transport, quick(PollLimit::Unbounded))
            .run("https://files/x", &target)
            .unwrap_err();

        let detail = err.detail().expect("remote error");
        assert_eq!(detail.kind, ErrorKind::XmlStructured);
        assert_eq!(detail.status, 410);
        assert!(detail.message().contains("expired"));
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(std::fs::read(&target).unwrap(), b"previous export");
    }

    #[test]
    fn cancel_between_polls_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.csv.gz");
        std::fs::write(&target, b"before").unwrap();

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let transport = ScriptedTransport::new(vec![
            reply(201, "application/json", b"{}"),
            reply(200, GZ, b"after"),
        ])
        .after_call(move |n| {
            if n == 1 {
                trigger.cancel();
            }
        });

        let err = Poller::new(&transport, quick(PollLimit::Unbounded))
            .with_cancel_token(cancel)
            .run("https://files/x", &target)
            .unwrap_err();

        assert!(matches!(err, ExportError::Cancelled));
        assert_eq!(transport.calls().len(), 1);
        assert_eq!(std::fs::read(&target).unwrap(), b"before");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn cancel_during_request_beats_terminal_status() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.csv.gz");
        std::fs::write(&target, b"before").unwrap();

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let transport = ScriptedTransport::new(vec![reply(500, "application/json", b"{}")])
            .after_call(move |_| trigger.cancel());

        let err = Poller::new(&transport, quick(PollLimit::Unbounded))
            .with_cancel_token(cancel)
            .run("https://files/x", &target)
            .unwrap_err();

        assert!(matches!(err, ExportError::Cancelled), "{err:?}");
        assert_eq!(transport.calls().len(), 1);
        assert_eq!(std::fs::read(&target).unwrap(), b"before");
    }

    #[test]
    fn huge_interval_with_deadline_does_not_overflow() {
        let dir = TempDir::new().unwrap();
        let transport = ScriptedTransport::new(vec![]);

        let policy = PollPolicy::new(Duration::MAX, PollLimit::Deadline(Duration::from_secs(60)));
        let err = Poller::new(&transport, policy)
            .run("https://files/x", &dir.path().join("x"))
            .unwrap_err();

        assert!(matches!(err, ExportError::PollLimitExceeded { attempts: 0 }), "{err:?}");
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn cancel_wakes_a_long_sleep() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.csv.gz");
        std::fs::write(&target, b"before").unwrap();
        let transport = ScriptedTransport::new(vec![reply(200, GZ, b"after")]);

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });

        let policy = PollPolicy::new(Duration::from_secs(60), PollLimit::Unbounded);
        let started = Instant::now();
        let err = Poller::new(&transport, policy)
            .with_cancel_token(cancel)
            .run("https://files/x", &target)
            .unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, ExportError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert!(transport.calls().is_empty());
        assert_eq!(std::fs::read(&target).unwrap(), b"before");
    }

    #[test]
    fn cancel_mid_stream_discards_partial_artifact() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.csv.gz");
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let transport = ScriptedTransport::new(vec![reply(200, GZ, b"partial")])
            .after_call(move |_| trigger.cancel());

        let err = Poller::new(&transport, quick(PollLimit::Attempts(1)))
            .with_cancel_token(cancel)
            .run("https://files/x", &target)
            .unwrap_err();

        assert!(matches!(err, ExportError::Cancelled));
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn overwrite_disabled_refuses_existing_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out.csv.gz");
        std::fs::write(&target, b"keep me").unwrap();
        let transport = ScriptedTransport::new(vec![reply(200, GZ, b"new")]);

        let err = Poller::new(&transport, quick(PollLimit::Attempts(1)))
            .with_overwrite(false)
            .run("https://files/x", &target)
            .unwrap_err();

        assert!(matches!(err, ExportError::Validation(_)));
        assert!(transport.calls().is_empty());
        assert_eq!(std::fs::read(&target).unwrap(), b"keep me");
    }
}
