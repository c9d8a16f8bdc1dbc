//! Collaborator boundary: request payloads, response decoding, demo fallback.
//!
//! Every response is decoded and shape-checked here, so a malformed payload
//! fails loudly at the network edge instead of at first field access.

use hashbrown::HashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attention::{AttentionTensor, ShapeError};
use crate::config::{to_query, UrlValue};
use crate::search::SearchHit;
use crate::tokens::TokenMeta;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request failed with status {code}: {reason}")]
    Status { code: u16, reason: String },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("malformed attention payload: {0}")]
    Shape(#[from] ShapeError),
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    AttendMeta,
    UpdateMask,
    NearestEmbeddings,
    NearestContexts,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::AttendMeta => "attend+meta",
            Endpoint::UpdateMask => "update-mask",
            Endpoint::NearestEmbeddings => "woz-k-nearest-embeddings",
            Endpoint::NearestContexts => "woz-k-nearest-contexts",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Endpoint::UpdateMask => Method::Post,
            _ => Method::Get,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NearestKind {
    Embeddings,
    Contexts,
}

impl NearestKind {
    pub fn endpoint(self) -> Endpoint {
        match self {
            NearestKind::Embeddings => Endpoint::NearestEmbeddings,
            NearestKind::Contexts => Endpoint::NearestContexts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendRequest {
    pub sentence_a: String,
    pub sentence_b: String,
    pub layer: u32,
}

/// Mask-update payload; an empty mask goes over the wire as `[-1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskRequest {
    pub tokens_a: Vec<String>,
    pub tokens_b: Vec<String>,
    pub sentence_a: String,
    pub sentence_b: String,
    pub mask_a: Vec<i64>,
    pub mask_b: Vec<i64>,
    pub layer: u32,
}

pub fn encode_mask(mask: &[usize]) -> Vec<i64> {
    if mask.is_empty() {
        vec![-1]
    } else {
        mask.iter().map(|m| *m as i64).collect()
    }
}

impl MaskRequest {
    pub fn new(
        tokens: (Vec<String>, Vec<String>),
        sentences: (String, String),
        masks: (&[usize], &[usize]),
        layer: u32,
    ) -> Self {
        Self {
            tokens_a: tokens.0,
            tokens_b: tokens.1,
            sentence_a: sentences.0,
            sentence_b: sentences.1,
            mask_a: encode_mask(masks.0),
            mask_b: encode_mask(masks.1),
            layer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestRequest {
    #[serde(skip)]
    pub kind: NearestKind,
    #[serde(rename = "embedding", skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(rename = "context", skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<f32>>,
    pub layer: u32,
    pub heads: Vec<usize>,
    pub k: usize,
}

impl NearestRequest {
    pub fn new(kind: NearestKind, vector: Vec<f32>, layer: u32, heads: Vec<usize>, k: usize) -> Self {
        let (embedding, context) = match kind {
            NearestKind::Embeddings => (Some(vector), None),
            NearestKind::Contexts => (None, Some(vector)),
        };
        Self {
            kind,
            embedding,
            context,
            layer,
            heads,
            k,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn json_to_url_value(v: &serde_json::Value) -> Option<UrlValue> {
    use serde_json::Value;
    match v {
        Value::Null => None,
        Value::Bool(b) => Some(UrlValue::from(*b)),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => UrlValue::Int(i),
            None => UrlValue::Float(n.as_f64().unwrap_or(0.0)),
        }),
        Value::String(s) => Some(UrlValue::Text(s.clone())),
        Value::Array(items) => Some(UrlValue::List(
            items.iter().filter_map(json_to_url_value).collect(),
        )),
        Value::Object(_) => Some(UrlValue::Text(v.to_string())),
    }
}

/// Flattens a JSON object payload into the marker/comma query format.
pub fn payload_query<P: Serialize>(payload: &P) -> Result<String, ApiError> {
    let value = serde_json::to_value(payload)?;
    let serde_json::Value::Object(map) = value else {
        return Err(ApiError::Decode("payload is not an object".to_string()));
    };
    let pairs: Vec<(String, UrlValue)> = map
        .iter()
        .filter_map(|(k, v)| json_to_url_value(v).map(|u| (k.clone(), u)))
        .collect();
    Ok(to_query(&pairs))
}

/// 64-bit FNV-1a over the endpoint path and the payload's JSON, as hex.
pub fn payload_hash<P: Serialize>(endpoint: Endpoint, payload: &P) -> Result<String, ApiError> {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let json = serde_json::to_string(payload)?;
    let mut h = OFFSET;
    for b in endpoint
        .path()
        .bytes()
        .chain(std::iter::once(b':'))
        .chain(json.bytes())
    {
        h ^= b as u64;
        h = h.wrapping_mul(PRIME);
    }
    Ok(format!("{h:016x}"))
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_status")]
    status: u16,
    #[serde(default)]
    message: Option<String>,
    payload: Option<T>,
}

fn default_status() -> u16 {
    200
}

fn open_envelope<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let env: Envelope<T> = serde_json::from_str(body)?;
    if !(200..300).contains(&env.status) {
        return Err(ApiError::Status {
            code: env.status,
            reason: env.message.unwrap_or_default(),
        });
    }
    env.payload
        .ok_or_else(|| ApiError::Decode("missing payload".to_string()))
}

/// Self-attention of one sentence plus per-token metadata for both sides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttentionResponse {
    pub att: AttentionTensor,
    pub left: Vec<TokenMeta>,
    pub right: Vec<TokenMeta>,
}

impl AttentionResponse {
    pub fn validate(&self) -> Result<(), ShapeError> {
        if self.left.len() != self.att.n_queries() {
            return Err(ShapeError::Tokens {
                side: "left",
                expected: self.att.n_queries(),
                got: self.left.len(),
            });
        }
        if self.right.len() != self.att.n_keys() {
            return Err(ShapeError::Tokens {
                side: "right",
                expected: self.att.n_keys(),
                got: self.right.len(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AttentionPayload {
    aa: AttentionResponse,
}

pub fn decode_attention(body: &str) -> Result<AttentionResponse, ApiError> {
    let payload: AttentionPayload = open_envelope(body)?;
    payload.aa.validate()?;
    Ok(payload.aa)
}

pub fn decode_search(body: &str) -> Result<Vec<SearchHit>, ApiError> {
    let hits: Vec<SearchHit> = open_envelope(body)?;
    for (i, hit) in hits.iter().enumerate() {
        if hit.index >= hit.tokens.len() {
            return Err(ApiError::Decode(format!(
                "hit {i}: matched index {} outside {} tokens",
                hit.index,
                hit.tokens.len()
            )));
        }
    }
    Ok(hits)
}

// ---------------------------------------------------------------------------
// Demo table
// ---------------------------------------------------------------------------

/// Payload hash → precomputed static response file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DemoTable {
    files: HashMap<String, String>,
}

impl DemoTable {
    pub fn from_json(json: &str) -> Result<Self, ApiError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn insert(&mut self, hash: impl Into<String>, file: impl Into<String>) {
        self.files.insert(hash.into(), file.into());
    }

    pub fn lookup(&self, hash: &str) -> Option<&str> {
        self.files.get(hash).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// One HTTP round trip. The browser implementation wraps `fetch`.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

pub struct ApiClient<T: Transport> {
    transport: T,
    api_base: String,
    demo_base: String,
    demo: Option<DemoTable>,
}

fn join_url(base: &str, path: &str) -> String {
    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, api_base: impl Into<String>) -> Self {
        Self {
            transport,
            api_base: api_base.into(),
            demo_base: String::new(),
            demo: None,
        }
    }

    pub fn with_demo(mut self, demo_base: impl Into<String>, table: DemoTable) -> Self {
        self.demo_base = demo_base.into();
        self.demo = Some(table);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn attend(&self, req: &AttendRequest) -> Result<AttentionResponse, ApiError> {
        let body = self.fetch_body(Endpoint::AttendMeta, req).await?;
        decode_attention(&body)
    }

    pub async fn update_mask(&self, req: &MaskRequest) -> Result<AttentionResponse, ApiError> {
        let body = self.fetch_body(Endpoint::UpdateMask, req).await?;
        decode_attention(&body)
    }

    pub async fn nearest(&self, req: &NearestRequest) -> Result<Vec<SearchHit>, ApiError> {
        let body = self.fetch_body(req.kind.endpoint(), req).await?;
        decode_search(&body)
    }

    fn live_request<P: Serialize>(
        &self,
        endpoint: Endpoint,
        payload: &P,
    ) -> Result<HttpRequest, ApiError> {
        let url = join_url(&self.api_base, endpoint.path());
        Ok(match endpoint.method() {
            Method::Get => HttpRequest::get(format!("{url}?{}", payload_query(payload)?)),
            Method::Post => HttpRequest::post(url, serde_json::to_string(payload)?),
        })
    }

    /// Demo file on a table hit, falling through to the live endpoint on a miss
    /// or when the static fetch fails.
    async fn fetch_body<P: Serialize>(
        &self,
        endpoint: Endpoint,
        payload: &P,
    ) -> Result<String, ApiError> {
        if let Some(table) = &self.demo {
            let hash = payload_hash(endpoint, payload)?;
            if let Some(file) = table.lookup(&hash) {
                let req = HttpRequest::get(join_url(&self.demo_base, file));
                match self.transport.send(req).await {
                    Ok(resp) if resp.is_success() => {
                        tracing::debug!(endpoint = endpoint.path(), %hash, "served from demo file");
                        return Ok(resp.body);
                    }
                    Ok(resp) => tracing::warn!(
                        endpoint = endpoint.path(),
                        status = resp.status,
                        "demo file unavailable, using live endpoint"
                    ),
                    Err(e) => tracing::warn!(
                        endpoint = endpoint.path(),
                        error = %e,
                        "demo fetch failed, using live endpoint"
                    ),
                }
            }
        }

        let req = self.live_request(endpoint, payload)?;
        tracing::info!(endpoint = endpoint.path(), "dispatching request");
        let resp = self.transport.send(req).await?;
        if !resp.is_success() {
            tracing::error!(endpoint = endpoint.path(), status = resp.status, "request failed");
            return Err(ApiError::Status {
                code: resp.status,
                reason: resp.status_text,
            });
        }
        Ok(resp.body)
    }
}

// ---------------------------------------------------------------------------
// Staleness guard
// ---------------------------------------------------------------------------

/// Identifies one dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// Monotonic request counter; only the newest ticket's response is applied.
#[derive(Debug, Clone, Default)]
pub struct RequestGeneration {
    current: u64,
}

impl RequestGeneration {
    pub fn begin(&mut self) -> Ticket {
        self.current += 1;
        Ticket(self.current)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeTransport {
        routes: Vec<(String, HttpResponse)>,
        seen: RefCell<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        fn route(mut self, prefix: &str, resp: HttpResponse) -> Self {
            self.routes.push((prefix.to_string(), resp));
            self
        }
    }

    impl Transport for FakeTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
            self.seen.borrow_mut().push(request.clone());
            self.routes
                .iter()
                .find(|(p, _)| request.url.starts_with(p.as_str()))
                .map(|(_, r)| r.clone())
                .ok_or_else(|| ApiError::Network(format!("no route for {}", request.url)))
        }
    }

    const ATTENTION_BODY: &str = r#"{
        "status": 200,
        "payload": {"aa": {
            "att": [[[0.6, 0.4], [0.1, 0.9]]],
            "left": [{"text": "[CLS]"}, {"text": "hi", "pos": "INTJ"}],
            "right": [{"text": "[CLS]"}, {"text": "hi", "pos": "INTJ"}]
        }}
    }"#;

    fn attend_req() -> AttendRequest {
        AttendRequest {
            sentence_a: "hi".to_string(),
            sentence_b: String::new(),
            layer: 1,
        }
    }

    #[test]
    fn empty_mask_is_encoded_as_minus_one() {
        let req = MaskRequest::new(
            (vec!["a".into()], vec!["a".into()]),
            ("a".into(), String::new()),
            (&[], &[3]),
            2,
        );
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["maskA"], serde_json::json!([-1]));
        assert_eq!(json["maskB"], serde_json::json!([3]));
        assert_eq!(json["sentenceA"], "a");
    }

    #[test]
    fn decode_rejects_token_count_mismatch() {
        let body = r#"{"payload": {"aa": {"att": [[[1.0]]], "left": [], "right": [{"text": "x"}]}}}"#;
        assert!(matches!(
            decode_attention(body),
            Err(ApiError::Shape(ShapeError::Tokens { side: "left", .. }))
        ));
    }

    #[test]
    fn decode_rejects_ragged_tensor() {
        let body = r#"{"payload": {"aa": {"att": [[[1.0, 0.0], [1.0]]], "left": [], "right": []}}}"#;
        assert!(matches!(decode_attention(body), Err(ApiError::Decode(_))));
    }

    #[test]
    fn envelope_status_is_surfaced() {
        let body = r#"{"status": 405, "message": "bad layer", "payload": null}"#;
        assert_eq!(
            decode_attention(body),
            Err(ApiError::Status {
                code: 405,
                reason: "bad layer".to_string()
            })
        );
    }

    #[test]
    fn search_index_must_point_inside_tokens() {
        let body = r#"{"payload": [{"index": 2, "tokens": [{"text": "a"}]}]}"#;
        assert!(matches!(decode_search(body), Err(ApiError::Decode(_))));
    }

    #[test]
    fn hash_is_stable_and_payload_sensitive() {
        let a = payload_hash(Endpoint::AttendMeta, &attend_req()).unwrap();
        assert_eq!(a, payload_hash(Endpoint::AttendMeta, &attend_req()).unwrap());
        assert_eq!(a.len(), 16);
        let mut other = attend_req();
        other.layer = 2;
        assert_ne!(a, payload_hash(Endpoint::AttendMeta, &other).unwrap());
        assert_ne!(a, payload_hash(Endpoint::UpdateMask, &attend_req()).unwrap());
    }

    #[test]
    fn live_get_encodes_payload_in_query() {
        let t = FakeTransport::default().route("/api/attend", HttpResponse::ok(ATTENTION_BODY));
        let client = ApiClient::new(t, "/api");
        let resp = pollster::block_on(client.attend(&attend_req())).unwrap();
        assert_eq!(resp.att.n_heads(), 1);

        let seen = client.transport().seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::Get);
        assert!(seen[0].url.contains("sentenceA=hi"));
        assert!(seen[0].url.contains("layer=1"));
    }

    #[test]
    fn demo_hit_skips_live_endpoint() {
        let hash = payload_hash(Endpoint::AttendMeta, &attend_req()).unwrap();
        let mut table = DemoTable::default();
        table.insert(hash, "demo_hi.json");
        let t = FakeTransport::default().route("/demo/demo_hi.json", HttpResponse::ok(ATTENTION_BODY));
        let client = ApiClient::new(t, "/api").with_demo("/demo", table);

        assert!(pollster::block_on(client.attend(&attend_req())).is_ok());
        let seen = client.transport().seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].url, "/demo/demo_hi.json");
    }

    #[test]
    fn failed_demo_fetch_falls_through_to_live() {
        let hash = payload_hash(Endpoint::AttendMeta, &attend_req()).unwrap();
        let mut table = DemoTable::default();
        table.insert(hash, "missing.json");
        let t = FakeTransport::default().route("/api/", HttpResponse::ok(ATTENTION_BODY));
        let client = ApiClient::new(t, "/api/").with_demo("/demo", table);

        assert!(pollster::block_on(client.attend(&attend_req())).is_ok());
        let seen = client.transport().seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].url.starts_with("/api/attend"));
    }

    #[test]
    fn non_success_status_becomes_error() {
        let resp = HttpResponse {
            status: 503,
            status_text: "Service Unavailable".to_string(),
            body: String::new(),
        };
        let t = FakeTransport::default().route("/api", resp);
        let client = ApiClient::new(t, "/api");
        let req = MaskRequest::new(
            (vec![], vec![]),
            (String::new(), String::new()),
            (&[], &[]),
            0,
        );
        assert_eq!(
            pollster::block_on(client.update_mask(&req)),
            Err(ApiError::Status {
                code: 503,
                reason: "Service Unavailable".to_string()
            })
        );
        assert_eq!(client.transport().seen.borrow()[0].method, Method::Post);
    }

    #[test]
    fn nearest_request_names_vector_by_kind() {
        let req = NearestRequest::new(NearestKind::Contexts, vec![0.5], 3, vec![0, 1], 50);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("embedding").is_none());
        assert_eq!(json["context"], serde_json::json!([0.5]));
        assert_eq!(req.kind.endpoint().path(), "woz-k-nearest-contexts");
    }

    #[test]
    fn only_latest_ticket_is_current() {
        let mut g = RequestGeneration::default();
        let first = g.begin();
        let second = g.begin();
        assert!(!g.is_current(first));
        assert!(g.is_current(second));
    }
}
