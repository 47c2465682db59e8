//! Fake Adhocracy backend for integration tests

#![allow(dead_code)]

use adhocracy_http::{
    is_preliminary, ClientConfig, HttpService, HttpError, MetaApi, Method, PushHub, Sleeper,
    Transport, WireRequest, WireResponse,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE: &str = "http://localhost:6541";
pub const PROPOSAL: &str = "adhocracy_core.resources.proposal.IProposal";
pub const PROPOSAL_VERSION: &str = "adhocracy_core.resources.proposal.IProposalVersion";
pub const COMMENT_VERSION: &str = "adhocracy_core.resources.comment.ICommentVersion";
pub const TAG: &str = "adhocracy_core.resources.tag.ITag";
pub const TITLE: &str = "adhocracy_core.sheets.title.ITitle";
pub const COMMENT: &str = "adhocracy_core.sheets.comment.IComment";

pub fn meta_api() -> MetaApi {
    MetaApi::from_value(json!({
        "resources": {
            "adhocracy_core.resources.pool.IBasicPool": {"sheets": ["adhocracy_core.sheets.pool.IPool"]},
            "adhocracy_core.resources.proposal.IProposal": {
                "sheets": ["adhocracy_core.sheets.pool.IPool"],
                "item_type": "adhocracy_core.resources.proposal.IProposalVersion"
            },
            "adhocracy_core.resources.proposal.IProposalVersion": {
                "sheets": ["adhocracy_core.sheets.versions.IVersionable", "adhocracy_core.sheets.title.ITitle"]
            },
            "adhocracy_core.resources.comment.ICommentVersion": {
                "sheets": ["adhocracy_core.sheets.versions.IVersionable", "adhocracy_core.sheets.comment.IComment"]
            },
            "adhocracy_core.resources.tag.ITag": {"sheets": ["adhocracy_core.sheets.tags.ITag"]}
        },
        "sheets": {
            "adhocracy_core.sheets.pool.IPool": {"fields": [
                {"name": "elements", "valuetype": "adhocracy_core.schema.AbsolutePath", "containertype": "list"}
            ]},
            "adhocracy_core.sheets.versions.IVersionable": {"fields": [
                {"name": "follows", "valuetype": "adhocracy_core.schema.AbsolutePath",
                 "containertype": "list", "editable": true, "creatable": true}
            ]},
            "adhocracy_core.sheets.title.ITitle": {"fields": [
                {"name": "title", "valuetype": "adhocracy_core.schema.SingleLine", "editable": true, "creatable": true}
            ]},
            "adhocracy_core.sheets.comment.IComment": {"fields": [
                {"name": "refers_to", "valuetype": "adhocracy_core.schema.AbsolutePath",
                 "creatable": true, "create_mandatory": true},
                {"name": "content", "valuetype": "adhocracy_core.schema.Text", "editable": true}
            ]},
            "adhocracy_core.sheets.tags.ITag": {"fields": [
                {"name": "elements", "valuetype": "adhocracy_core.schema.AbsolutePath",
                 "containertype": "list", "editable": true}
            ]}
        }
    }))
    .unwrap()
}

#[derive(Default)]
struct State {
    /// Stored resources by path
    resources: HashMap<String, Value>,
    /// Head version per no-fork item
    heads: HashMap<String, String>,
    /// Versions other clients post before each of ours
    interfering: usize,
    /// Number of requests per method
    counts: HashMap<&'static str, usize>,
    /// Content types in the order the batch endpoint created them
    created_order: Vec<String>,
    next_id: usize,
}

/// In-memory backend implementing the parts of the REST API the client uses.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<State>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, path: &str, resource: Value) {
        self.state.lock().unwrap().resources.insert(path.to_string(), resource);
    }

    /// Start a no-fork item at `head`.
    pub fn set_head(&self, item: &str, head: &str) {
        self.state
            .lock()
            .unwrap()
            .heads
            .insert(item.to_string(), head.to_string());
    }

    /// Let another client win the race `n` times.
    pub fn interfere(&self, n: usize) {
        self.state.lock().unwrap().interfering = n;
    }

    pub fn count(&self, method: Method) -> usize {
        self.state
            .lock()
            .unwrap()
            .counts
            .get(method.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn created_order(&self) -> Vec<String> {
        self.state.lock().unwrap().created_order.clone()
    }

    pub fn service(&self, push: Arc<PushHub>, sleeper: Arc<dyn Sleeper>) -> HttpService {
        HttpService::new(ClientConfig::default(), Arc::new(self.clone()), meta_api(), push)
            .with_sleeper(sleeper)
    }
}

fn no_fork_error(head: &str) -> Value {
    json!({"status": "error", "errors": [{
        "name": "data.adhocracy_core.sheets.versions.IVersionable.follows",
        "location": "body",
        "description": format!("No fork allowed - valid follows resources are: {}", head)
    }]})
}

impl State {
    fn create(&mut self, parent: &str, body: &Value) -> std::result::Result<Value, Value> {
        let content_type = body["content_type"].as_str().unwrap_or_default().to_string();

        if let Some(head) = self.heads.get(parent).cloned() {
            if self.interfering > 0 {
                self.interfering -= 1;
                let moved = format!("{}other_{:07}/", parent, self.next_id);
                self.next_id += 1;
                self.heads.insert(parent.to_string(), moved);
                return Err(no_fork_error(&head));
            }
            let follows = &body["data"]["adhocracy_core.sheets.versions.IVersionable"]["follows"];
            if follows != &json!([head]) {
                return Err(no_fork_error(&head));
            }
        }

        let path = format!("{}res_{:07}/", parent, self.next_id);
        self.next_id += 1;
        if self.heads.contains_key(parent) {
            self.heads.insert(parent.to_string(), path.clone());
        }
        self.created_order.push(content_type.clone());
        let mut stored = body.clone();
        stored["path"] = json!(path);
        self.resources.insert(path.clone(), stored);
        let mut modified = vec![parent.to_string()];
        if self.heads.contains_key(parent) {
            modified.push(format!("{}LAST/", parent));
        }
        Ok(json!({"content_type": content_type, "path": path,
                  "updated_resources": {"created": [path], "modified": modified}}))
    }

    fn batch(&mut self, requests: &[Value]) -> WireResponse {
        let mut aliases: HashMap<String, String> = HashMap::new();
        let mut responses = Vec::new();
        for request in requests {
            let raw = request["path"].as_str().unwrap_or_default();
            let path = aliases.get(raw).cloned().unwrap_or_else(|| raw.to_string());
            let created = match request["method"].as_str() {
                Some("POST") => {
                    let mut body = request["body"].clone();
                    resolve(&mut body, &aliases);
                    self.create(&path, &body)
                }
                Some("GET") => self
                    .resources
                    .get(&path)
                    .cloned()
                    .ok_or_else(|| json!({"status": "error", "errors": []})),
                _ => Ok(Value::Null),
            };
            match created {
                Ok(mut body) => {
                    if let Some(result) = request["result_path"].as_str() {
                        let real = body["path"].as_str().unwrap_or_default().to_string();
                        aliases.insert(result.to_string(), real.clone());
                        if let Some(first) = request["result_first_version_path"].as_str() {
                            let version = format!("{}VERSION_0000000/", real);
                            aliases.insert(first.to_string(), version.clone());
                            body["first_version_path"] = json!(version);
                        }
                    }
                    if let Some(obj) = body.as_object_mut() {
                        obj.remove("updated_resources");
                    }
                    responses.push(json!({"code": 200, "body": body}));
                }
                Err(error) => {
                    responses.push(json!({"code": 400, "body": error}));
                    return WireResponse::new(
                        400,
                        json!({"responses": responses, "updated_resources": {}}),
                    );
                }
            }
        }
        WireResponse::new(200, json!({"responses": responses, "updated_resources": {}}))
    }
}

/// Replace preliminary paths in `value` by the real paths created earlier.
fn resolve(value: &mut Value, aliases: &HashMap<String, String>) {
    match value {
        Value::String(s) if is_preliminary(s) => {
            if let Some(real) = aliases.get(s.as_str()) {
                *s = real.clone();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| resolve(v, aliases)),
        Value::Object(map) => map.values_mut().for_each(|v| resolve(v, aliases)),
        _ => {}
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn request(&self, request: WireRequest) -> adhocracy_http::Result<WireResponse> {
        let path = request
            .url
            .strip_prefix(BASE)
            .ok_or_else(|| HttpError::Network(format!("unexpected host: {}", request.url)))?
            .to_string();
        let mut state = self.state.lock().unwrap();
        *state.counts.entry(request.method.as_str()).or_default() += 1;

        let response = match (request.method, path.as_str()) {
            (Method::Post, "/batch") => {
                let requests = request.body.as_ref().and_then(Value::as_array).cloned().unwrap_or_default();
                state.batch(&requests)
            }
            (Method::Post, parent) => {
                let body = request.body.clone().unwrap_or(Value::Null);
                match state.create(parent, &body) {
                    Ok(created) => WireResponse::new(200, created),
                    Err(error) => WireResponse::new(400, error),
                }
            }
            (Method::Get, p) if p.ends_with("/LAST/") => {
                let item = p.trim_end_matches("LAST/");
                let elements: Vec<String> = state.heads.get(item).cloned().into_iter().collect();
                WireResponse::new(
                    200,
                    json!({"content_type": TAG, "path": p,
                           "data": {"adhocracy_core.sheets.tags.ITag": {"elements": elements}}}),
                )
            }
            (Method::Get, p) => match state.resources.get(p) {
                Some(resource) => WireResponse::new(200, resource.clone()),
                None => WireResponse::new(404, json!({"status": "error", "errors": [
                    {"name": "path", "location": "url", "description": "not found"}
                ]})),
            },
            (Method::Options, _) => WireResponse::new(
                200,
                json!({"OPTIONS": {"request_body": {}}, "GET": true, "PUT": false}),
            ),
            _ => WireResponse::new(405, Value::Null),
        };
        Ok(response)
    }
}

/// Sleeper that only counts.
#[derive(Clone, Default)]
pub struct CountingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl CountingSleeper {
    pub fn count(&self) -> usize {
        self.waits.lock().unwrap().len()
    }
}

#[async_trait]
impl Sleeper for CountingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}
