use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::client::ClientConfig;

#[derive(Debug, Default)]
struct RcConfig {
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
}

pub(crate) fn load_config(
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
) -> Result<ClientConfig> {
    let url = url.or_else(|| std::env::var("EXPORTAPI_URL").ok());
    let key = key.or_else(|| std::env::var("EXPORTAPI_KEY").ok());
    resolve(url, key, verify, &rc_candidates())
}

fn resolve(
    mut url: Option<String>,
    mut key: Option<String>,
    verify: Option<bool>,
    rc_candidates: &[PathBuf],
) -> Result<ClientConfig> {
    let mut file_verify: Option<bool> = None;

    if url.is_none() || key.is_none() || verify.is_none() {
        for rc_path in rc_candidates {
            if rc_path.exists() {
                let cfg = read_rc(rc_path).with_context(|| {
                    format!("failed to read configuration file {}", rc_path.display())
                })?;

                if url.is_none() {
                    url = cfg.url;
                }
                if key.is_none() {
                    key = cfg.key;
                }
                file_verify = cfg.verify;
                break;
            }
        }
    }

    let Some(url) = url.filter(|v| !v.trim().is_empty()) else {
        bail!("{}", missing("url", "EXPORTAPI_URL", rc_candidates));
    };
    let Some(key) = key.filter(|v| !v.trim().is_empty()) else {
        bail!("{}", missing("key", "EXPORTAPI_KEY", rc_candidates));
    };

    let verify = verify.or(file_verify).unwrap_or(true);

    Ok(ClientConfig { url, key, verify })
}

fn missing(field: &str, env: &str, rc_candidates: &[PathBuf]) -> String {
    if rc_candidates.is_empty() {
        return format!(
            "Missing configuration: {} (set {} or create .exportapirc)",
            field, env
        );
    }
    format!(
        "Missing configuration: {} (set {} or put `{}:` in one of: {})",
        field,
        env,
        field,
        rc_candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    Ok(parse_rc(&std::fs::read_to_string(path)?))
}

/// Parses `name: value` lines. A bare `name:` takes its value from the next
/// line when that line has no colon of its own.
fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .peekable();

    while let Some(line) = lines.next() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let mut value = unquote(value);
        if value.is_empty() {
            if let Some(next) = lines.next_if(|l| !l.contains(':')) {
                value = unquote(next);
            }
        }
        if value.is_empty() {
            continue;
        }

        match name.trim() {
            "url" => cfg.url = Some(value.to_string()),
            "key" => cfg.key = Some(value.to_string()),
            "verify" => cfg.verify = Some(!matches!(value, "0" | "false")),
            _ => {}
        }
    }

    cfg
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    ['"', '\'']
        .iter()
        .find_map(|q| s.strip_prefix(*q)?.strip_suffix(*q))
        .unwrap_or(s)
}

/// `EXPORTAPI_RC` alone when set; otherwise `./.exportapirc` then `~/.exportapirc`.
fn rc_candidates() -> Vec<PathBuf> {
    if let Ok(p) = std::env::var("EXPORTAPI_RC") {
        return vec![PathBuf::from(p)];
    }

    [std::env::current_dir().ok(), dirs::home_dir()]
        .into_iter()
        .flatten()
        .map(|dir| dir.join(".exportapirc"))
        .collect()
}
