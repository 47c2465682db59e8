//! Shared fixtures for unit tests

use crate::backoff::Sleeper;
use crate::client::HttpService;
use crate::config::ClientConfig;
use crate::error::{HttpError, Result};
use crate::meta_api::MetaApi;
use crate::push::PushHub;
use crate::transport::{Transport, WireRequest, WireResponse};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PROPOSAL: &str = "adhocracy_core.resources.proposal.IProposal";
pub const PROPOSAL_VERSION: &str = "adhocracy_core.resources.proposal.IProposalVersion";
pub const TITLE: &str = "adhocracy_core.sheets.title.ITitle";

fn path_list(editable: bool, creatable: bool) -> Value {
    json!({"valuetype": "adhocracy_core.schema.AbsolutePath", "containertype": "list",
           "editable": editable, "creatable": creatable})
}

fn with_name(mut field: Value, name: &str) -> Value {
    field["name"] = json!(name);
    field
}

/// Registry with the resource types and sheets used throughout the tests.
pub fn meta_api() -> MetaApi {
    MetaApi::from_value(json!({
        "resources": {
            "adhocracy_core.resources.pool.IBasicPool": {
                "sheets": ["adhocracy_core.sheets.pool.IPool", "adhocracy_core.sheets.metadata.IMetadata"]
            },
            "adhocracy_core.resources.proposal.IProposal": {
                "sheets": ["adhocracy_core.sheets.pool.IPool"],
                "item_type": "adhocracy_core.resources.proposal.IProposalVersion"
            },
            "adhocracy_core.resources.proposal.IProposalVersion": {
                "sheets": ["adhocracy_core.sheets.versions.IVersionable", "adhocracy_core.sheets.title.ITitle"]
            },
            "adhocracy_core.resources.tag.ITag": {
                "sheets": ["adhocracy_core.sheets.tags.ITag"]
            },
            "adhocracy_core.resources.comment.IComment": {
                "sheets": ["adhocracy_core.sheets.pool.IPool"],
                "item_type": "adhocracy_core.resources.comment.ICommentVersion"
            },
            "adhocracy_core.resources.comment.ICommentVersion": {
                "sheets": ["adhocracy_core.sheets.versions.IVersionable", "adhocracy_core.sheets.comment.IComment"]
            },
            "adhocracy_core.resources.rate.IRateVersion": {
                "sheets": ["adhocracy_core.sheets.rate.IRate"]
            }
        },
        "sheets": {
            "adhocracy_core.sheets.pool.IPool": {"fields": [
                with_name(path_list(false, false), "elements")
            ]},
            "adhocracy_core.sheets.metadata.IMetadata": {"fields": [
                {"name": "creator", "valuetype": "adhocracy_core.schema.AbsolutePath"},
                {"name": "creation_date", "valuetype": "adhocracy_core.schema.DateTime"},
                {"name": "hidden", "valuetype": "adhocracy_core.schema.Boolean", "editable": true},
                {"name": "deleted", "valuetype": "adhocracy_core.schema.Boolean", "editable": true}
            ]},
            "adhocracy_core.sheets.versions.IVersionable": {"fields": [
                with_name(path_list(true, true), "follows")
            ]},
            "adhocracy_core.sheets.title.ITitle": {"fields": [
                {"name": "title", "valuetype": "adhocracy_core.schema.SingleLine",
                 "editable": true, "creatable": true}
            ]},
            "adhocracy_core.sheets.tags.ITag": {"fields": [
                with_name(path_list(true, false), "elements")
            ]},
            "adhocracy_core.sheets.comment.IComment": {"fields": [
                {"name": "refers_to", "valuetype": "adhocracy_core.schema.AbsolutePath",
                 "creatable": true, "create_mandatory": true},
                {"name": "content", "valuetype": "adhocracy_core.schema.Text", "editable": true}
            ]},
            "adhocracy_core.sheets.rate.IRate": {"fields": [
                {"name": "rate", "valuetype": "adhocracy_core.schema.Rate", "editable": true},
                {"name": "subject", "valuetype": "adhocracy_core.schema.Reference", "creatable": true},
                {"name": "object", "valuetype": "adhocracy_core.schema.Reference"}
            ]},
            "adhocracy_core.sheets.geo.IPoint": {"fields": [
                {"name": "coordinates", "valuetype": "adhocracy_core.sheets.geo.Point", "editable": true},
                {"name": "accuracy", "valuetype": "adhocracy_core.schema.Float", "editable": true},
                {"name": "area", "valuetype": "adhocracy_core.sheets.geo.Polygon", "editable": true}
            ]}
        }
    }))
    .expect("fixture registry is valid")
}

/// Transport answering from a queue of scripted responses, in order.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<WireResponse>>>,
    requests: Arc<Mutex<Vec<WireRequest>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, status: u16, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(WireResponse::new(status, body));
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, request: WireRequest) -> Result<WireResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| HttpError::Network(format!("no scripted response for {}", url)))
    }
}

/// Sleeper that records waits and returns immediately.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

pub fn service_with_sleeper(transport: ScriptedTransport, sleeper: RecordingSleeper) -> HttpService {
    HttpService::new(
        ClientConfig::default(),
        Arc::new(transport),
        meta_api(),
        Arc::new(PushHub::connected()),
    )
    .with_sleeper(Arc::new(sleeper))
}

/// Service over `transport` with a connected push hub.
pub fn service(transport: ScriptedTransport) -> HttpService {
    service_with_sleeper(transport, RecordingSleeper::default())
}
