use tracing::{debug, warn};

use crate::error::{ExportError, Result};
use crate::interpret::interpret_response;
use crate::params::ExportParams;
use crate::transport::Transport;
use crate::util::urljoin;

#[derive(Debug, serde::Deserialize)]
struct ExportReply {
    #[serde(default)]
    export_url: Option<String>,
}

/// Job descriptor handed back by the initiation route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJob {
    pub dataset: String,
    /// URL to poll until the artifact is ready.
    pub export_url: String,
}

/// Asks the service to prepare an export of `dataset`.
///
/// Sends `GET {base}/export/{api_key}/{dataset}` with the encoded parameters.
/// A failed initiation is terminal; nothing is polled.
pub fn request_export(
    transport: &dyn Transport,
    base: &str,
    api_key: &str,
    dataset: &str,
    params: &ExportParams,
) -> Result<ExportJob> {
    let dataset = dataset.trim();
    let api_key = api_key.trim();
    if dataset.is_empty() {
        return Err(ExportError::validation("dataset identifier is required"));
    }
    if api_key.is_empty() {
        return Err(ExportError::validation("API key is required"));
    }

    let base = base.trim_end_matches('/');
    let url = format!("{}/export/{}/{}", base, api_key, dataset);
    // The key is part of the path; errors and logs only ever see this form.
    let shown_url = format!("{}/export/***/{}", base, dataset);
    let encoded = params.encode();
    let query: Vec<(&str, &str)> = encoded.iter().map(|(k, v)| (*k, v.as_str())).collect();

    debug!(url = %shown_url, params = ?encoded, "requesting export");
    let redact = |e| redact_key(e, api_key, &shown_url);
    let mut resp = transport.get(&url, &query).map_err(redact)?;
    let body = resp.read_body(&url).map_err(redact)?;

    if !(200..300).contains(&resp.status) {
        let detail = interpret_response(
            resp.status,
            resp.reason.as_deref(),
            resp.content_type.as_deref(),
            &body,
        );
        warn!(dataset, status = resp.status, kind = detail.kind.as_str(), "export request rejected");
        return Err(ExportError::Remote(detail));
    }

    let reply: ExportReply = serde_json::from_slice(&body)
        .map_err(|e| ExportError::protocol(&shown_url, format!("invalid JSON: {}", e)))?;
    let export_url = reply
        .export_url
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ExportError::protocol(&shown_url, "missing export_url in response"))?;

    Ok(ExportJob {
        dataset: dataset.to_string(),
        export_url: urljoin(base, &export_url),
    })
}

/// Rewrites transport failures so neither the URL nor the error chain carries the key.
fn redact_key(err: ExportError, api_key: &str, shown_url: &str) -> ExportError {
    match err {
        ExportError::Network { source, .. } => {
            let text = source.to_string();
            ExportError::Network {
                url: shown_url.to_string(),
                source: if text.contains(api_key) {
                    text.replace(api_key, "***").into()
                } else {
                    source
                },
            }
        }
        other => other,
    }
}
