//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

use crate::error::{ExportError, Result};
use crate::transport::{HttpResponse, Transport};

pub(crate) struct ScriptedReply {
    status: u16,
    content_type: String,
    body: Vec<u8>,
}

pub(crate) fn reply(status: u16, content_type: &str, body: &[u8]) -> ScriptedReply {
    ScriptedReply {
        status,
        content_type: content_type.to_string(),
        body: body.to_vec(),
    }
}

type Hook = Box<dyn Fn(usize) + Send + Sync>;

/// Replays canned responses in order and records every request.
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
    after_call: Option<Hook>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
            after_call: None,
        }
    }

    /// Runs `hook` with the 1-based call number after each request is served.
    pub(crate) fn after_call(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.after_call = Some(Box::new(hook));
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((
                url.to_string(),
                query
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ));
            calls.len()
        };
        let next = self.replies.lock().unwrap().pop_front();
        let next = next.ok_or_else(|| ExportError::network(url, "script exhausted"))?;
        if let Some(hook) = &self.after_call {
            hook(n);
        }
        Ok(HttpResponse {
            status: next.status,
            reason: None,
            content_type: Some(next.content_type),
            content_length: Some(next.body.len() as u64),
            body: Box::new(Cursor::new(next.body)),
        })
    }
}
