//! `fetch`, `Request`, `Response` (spec.md §4.3, §4.4 "External-fetch
//! passthrough", §4.6 Dispatcher). `Response.body` is a stream reference;
//! the body-consuming methods (`text`, `arrayBuffer`, `json`, `blob`,
//! `formData`) drain that stream exactly once.

use isolate_core::{BodyPayload, ClassRegistry};
use isolate_protocol::value::ClassTag;
use isolate_protocol::StreamId;
use isolate_stream::{StreamConsumer, StreamItem};

use crate::error_bridge::{type_error, BridgeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

/// Host-side state for a `Request` instance. `headers_instance_id` points
/// into the bridge's shared `HeadersApi` registry.
#[derive(Debug, Clone)]
pub struct RequestState {
    pub url: String,
    pub method: HttpMethod,
    pub headers_instance_id: u64,
    pub body: BodyPayload,
}

/// Host-side state for a `Response` instance.
#[derive(Debug, Clone)]
pub struct ResponseState {
    pub status: u16,
    pub status_text: String,
    pub headers_instance_id: u64,
    pub body: BodyPayload,
    /// Set once a body-consuming method has drained the stream, so a second
    /// call fails fast instead of hanging on an already-finished channel.
    pub body_used: bool,
}

#[derive(Debug, Default)]
pub struct HttpApi {
    requests: ClassRegistry<RequestState>,
    responses: ClassRegistry<ResponseState>,
}

impl HttpApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn construct_request(&mut self, state: RequestState) -> u64 {
        self.requests.insert(ClassTag::Request, state)
    }

    pub fn request(&self, instance_id: u64) -> Result<&RequestState, BridgeError> {
        Ok(&self
            .requests
            .get(instance_id)
            .ok_or_else(|| type_error("unknown Request"))?
            .state)
    }

    pub fn construct_response(&mut self, state: ResponseState) -> u64 {
        self.responses.insert(ClassTag::Response, state)
    }

    pub fn response(&self, instance_id: u64) -> Result<&ResponseState, BridgeError> {
        Ok(&self
            .responses
            .get(instance_id)
            .ok_or_else(|| type_error("unknown Response"))?
            .state)
    }

    /// Marks a response's body consumed, failing if it already was
    /// (`body.used` must be `false` per the Fetch spec's body-mixin contract).
    pub fn mark_body_used(&mut self, instance_id: u64) -> Result<(), BridgeError> {
        let response = &mut self
            .responses
            .get_mut(instance_id)
            .ok_or_else(|| type_error("unknown Response"))?
            .state;
        if response.body_used {
            return Err(type_error("body stream already read"));
        }
        response.body_used = true;
        Ok(())
    }
}

/// Drains a body stream to completion, concatenating every chunk. Used by
/// the `text`/`arrayBuffer`/`json`/`blob`/`formData` family, which all
/// consume the whole stream before producing their guest-visible result.
pub async fn drain_body(mut consumer: StreamConsumer) -> Result<Vec<u8>, BridgeError> {
    let mut buffer = Vec::new();
    loop {
        match consumer.recv().await {
            Some(StreamItem::Chunk(chunk)) => buffer.extend_from_slice(&chunk),
            Some(StreamItem::End(Ok(()))) => return Ok(buffer),
            Some(StreamItem::End(Err(err))) => return Err(type_error(err.message)),
            None => return Ok(buffer),
        }
    }
}

pub fn body_as_json(bytes: &[u8]) -> Result<serde_json::Value, BridgeError> {
    serde_json::from_slice(bytes).map_err(|e| type_error(format!("invalid JSON body: {e}")))
}

#[must_use]
pub fn body_as_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// A fully-resolved outbound fetch request as handed to the host's external
/// fetch collaborator (spec.md §4.6's `runtime.fetch.onFetch` callback).
#[derive(Debug, Clone)]
pub struct OutboundFetch {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: BodyPayload,
}

/// The external fetch driver's answer: status/headers plus a stream
/// reference for the body, forwarded chunk-for-chunk with no buffering
/// (spec.md §4.4 "External-fetch passthrough").
#[derive(Debug, Clone)]
pub struct InboundFetchResult {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body_stream_id: Option<StreamId>,
}
