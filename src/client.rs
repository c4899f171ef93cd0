use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cancel::CancelToken;
use crate::config::load_config;
use crate::error::ExportError;
use crate::handle::ExportHandle;
use crate::params::ExportParams;
use crate::paths::{DestinationResolver, HomeDirResolver};
use crate::poller::{PollLimit, PollPolicy, Poller};
use crate::requester::request_export;
use crate::transport::{HttpTransport, Transport};

/// Bound applied when the caller does not pick one with
/// [`Client::with_poll_limit`].
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base service URL, e.g. `https://api.example.com/v2`.
    pub url: String,
    /// API key; sent as a path segment of the export route.
    pub key: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

/// Export client: request, poll, download.
#[derive(Clone)]
pub struct Client {
    url: String,
    key: String,

    policy: PollPolicy,
    overwrite: bool,
    progress: bool,
    cancel: CancelToken,

    resolver: Arc<dyn DestinationResolver>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url)
            .field("policy", &self.policy)
            .field("overwrite", &self.overwrite)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client using environment variables and/or `.exportapirc`.
    ///
    /// This is equivalent to `Client::new(None, None, None)`.
    pub fn from_env() -> Result<Self> {
        Self::new(None, None, None)
    }

    /// Creates a client using (in order of precedence):
    /// - explicit `url`/`key` arguments
    /// - environment variables `EXPORTAPI_URL` / `EXPORTAPI_KEY`
    /// - config file from `EXPORTAPI_RC` or `.exportapirc`
    pub fn new(url: Option<String>, key: Option<String>, verify: Option<bool>) -> Result<Self> {
        let cfg = load_config(url, key, verify)?;
        Self::with_config(cfg)
    }

    pub fn with_config(cfg: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_secs(60), cfg.verify)?;

        Ok(Self {
            url: cfg.url,
            key: cfg.key,
            policy: PollPolicy::new(Duration::ZERO, PollLimit::Deadline(DEFAULT_POLL_DEADLINE)),
            overwrite: true,
            progress: true,
            cancel: CancelToken::new(),
            resolver: Arc::new(HomeDirResolver),
            transport: Arc::new(transport),
        })
    }

    /// Replaces the HTTP client with one using this per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration, verify: bool) -> Result<Self> {
        self.transport = Arc::new(HttpTransport::new(timeout, verify)?);
        Ok(self)
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.policy.interval = interval;
        self
    }

    /// Poll interval and bound currently in effect.
    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn with_poll_limit(mut self, limit: PollLimit) -> Self {
        self.policy.limit = limit;
        self
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

    pub fn with_resolver(mut self, resolver: impl DestinationResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    /// Requests an export of `dataset`, waits for it and downloads it.
    ///
    /// When `target` is `None` (or empty) the configured
    /// [`DestinationResolver`] chooses the path.
    pub fn export(
        &self,
        dataset: &str,
        params: &ExportParams,
        target: Option<&Path>,
    ) -> std::result::Result<ExportHandle, ExportError> {
        let job = request_export(self.transport.as_ref(), &self.url, &self.key, dataset, params)?;
        info!(dataset = %job.dataset, "export requested");

        let target = match target {
            Some(t) if !t.as_os_str().is_empty() => t.to_path_buf(),
            _ => self.resolver.resolve(&job.dataset, &job.export_url),
        };

        let path = Poller::new(self.transport.as_ref(), self.policy)
            .with_overwrite(self.overwrite)
            .with_progress(self.progress)
            .with_cancel_token(self.cancel.clone())
            .run(&job.export_url, &target)?;

        Ok(ExportHandle::new(job.dataset, path))
    }
}
