use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::{ErrorDetail, ErrorKind};

/// Error payload shapes the service emits as JSON.
#[derive(Debug, Default, serde::Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    title: Option<String>,
    // Some routes respond with {"message": ...} instead of {"title": ...}
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Turns a terminal response into an [`ErrorDetail`].
///
/// The declared content type picks the branch once: XML bodies are flattened
/// into their leaf elements, everything else is reported as a transport
/// failure. Never fails; a malformed XML body yields no pairs.
pub fn interpret_response(
    status: u16,
    reason: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
) -> ErrorDetail {
    match content_type.map(essence) {
        Some(mime) if is_xml(&mime) => ErrorDetail {
            kind: ErrorKind::XmlStructured,
            status,
            pairs: xml_leaf_pairs(body),
        },
        mime => ErrorDetail {
            kind: ErrorKind::Transport,
            status,
            pairs: transport_pairs(status, reason, mime.as_deref(), body),
        },
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn is_xml(mime: &str) -> bool {
    mime.ends_with("/xml") || mime.ends_with("+xml")
}

fn is_json(mime: &str) -> bool {
    mime.ends_with("/json") || mime.ends_with("+json")
}

fn transport_pairs(
    status: u16,
    reason: Option<&str>,
    mime: Option<&str>,
    body: &[u8],
) -> Vec<(String, String)> {
    let mut pairs = vec![("status".to_string(), status.to_string())];
    if let Some(reason) = reason.filter(|r| !r.is_empty()) {
        pairs.push(("reason".to_string(), reason.to_string()));
    }

    let parsed = mime
        .filter(|m| is_json(m))
        .and_then(|_| serde_json::from_slice::<ServiceErrorBody>(body).ok());
    let mut structured = false;
    if let Some(e) = parsed {
        for (name, value) in [
            ("title", e.title),
            ("message", e.message),
            ("detail", e.detail),
            ("error", e.error),
        ] {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                pairs.push((name.to_string(), value));
                structured = true;
            }
        }
    }
    if !structured {
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        if !text.is_empty() {
            pairs.push(("body".to_string(), text.to_string()));
        }
    }

    let hint = match status {
        401 | 403 => Some("check that the API key is valid and has access to this dataset"),
        404 => Some("check the configured base URL and the dataset identifier"),
        _ => None,
    };
    if let Some(hint) = hint {
        pairs.push(("hint".to_string(), hint.to_string()));
    }
    pairs
}

/// Leaf `(tag, text)` pairs in document order; empty on malformed input.
fn xml_leaf_pairs(body: &[u8]) -> Vec<(String, String)> {
    try_xml_leaf_pairs(body).unwrap_or_default()
}

fn try_xml_leaf_pairs(body: &[u8]) -> Option<Vec<(String, String)>> {
    struct Open {
        name: String,
        text: String,
        has_children: bool,
    }

    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    let mut pairs = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event_into(&mut buf).ok()? {
            Event::Start(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                saw_root = true;
                stack.push(Open {
                    name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                    text: String::new(),
                    has_children: false,
                });
            }
            Event::Empty(e) => {
                if let Some(parent) = stack.last_mut() {
                    parent.has_children = true;
                }
                saw_root = true;
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                pairs.push((name, String::new()));
            }
            Event::Text(t) => {
                let text = t.unescape().ok()?;
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let open = stack.pop()?;
                if !open.has_children {
                    pairs.push((open.name, open.text.trim().to_string()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !stack.is_empty() || !saw_root {
        return None;
    }
    Some(pairs)
}
