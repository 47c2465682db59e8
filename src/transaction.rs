//! Atomic batch transactions
//!
//! A transaction queues requests and sends them as one POST to the batch
//! endpoint. The server processes them in order and stops at the first
//! failure, so either all of them take effect or none does. POSTs get
//! preliminary paths right away, which later requests in the same
//! transaction may reference.

use crate::cache::UpdatedResources;
use crate::client::HttpService;
use crate::convert::{
    export_resource, import_batch_resources, parse_backend_error, BatchOutcome, BatchRequest,
    BatchResponseItem,
};
use crate::error::{HttpError, Result};
use crate::path::ResourcePath;
use crate::resource::Resource;
use crate::transport::{Method, WireRequest};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// Position of a queued request; the matching outcome has the same index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHandle {
    pub index: usize,
    pub path: ResourcePath,
}

/// Forward reference to a resource created by a queued POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostHandle {
    pub index: usize,
    /// Preliminary path of the new resource
    pub path: ResourcePath,
    /// Preliminary path of its first version, for item types
    pub first_version_path: Option<ResourcePath>,
}

#[derive(Debug, Clone)]
struct QueuedRequest {
    method: Method,
    path: ResourcePath,
    resource: Option<Resource>,
    result_path: Option<ResourcePath>,
    result_first_version_path: Option<ResourcePath>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<BatchResponseItem>,
    #[serde(default)]
    updated_resources: UpdatedResources,
}

/// Batch of requests committed atomically.
pub struct Transaction<'a> {
    service: &'a HttpService,
    requests: Vec<QueuedRequest>,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(service: &'a HttpService) -> Self {
        Self {
            service,
            requests: Vec::new(),
            committed: false,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn check_not_committed(&self) -> Result<()> {
        if self.committed {
            return Err(HttpError::TransactionAlreadyCommitted);
        }
        Ok(())
    }

    fn push(&mut self, request: QueuedRequest) -> usize {
        self.requests.push(request);
        self.requests.len() - 1
    }

    pub fn get(&mut self, path: ResourcePath) -> Result<RequestHandle> {
        self.check_not_committed()?;
        let index = self.push(QueuedRequest {
            method: Method::Get,
            path: path.clone(),
            resource: None,
            result_path: None,
            result_first_version_path: None,
        });
        Ok(RequestHandle { index, path })
    }

    pub fn put(&mut self, path: ResourcePath, resource: Resource) -> Result<RequestHandle> {
        self.check_not_committed()?;
        let index = self.push(QueuedRequest {
            method: Method::Put,
            path: path.clone(),
            resource: Some(resource),
            result_path: None,
            result_first_version_path: None,
        });
        Ok(RequestHandle { index, path })
    }

    pub fn delete(&mut self, path: ResourcePath) -> Result<RequestHandle> {
        self.check_not_committed()?;
        let index = self.push(QueuedRequest {
            method: Method::Delete,
            path: path.clone(),
            resource: None,
            result_path: None,
            result_first_version_path: None,
        });
        Ok(RequestHandle { index, path })
    }

    /// Queue creation of `resource` below `path`.
    ///
    /// Preliminary paths already set on the resource are reused, missing
    /// ones are minted. The returned handle is usable immediately.
    pub fn post(&mut self, path: ResourcePath, resource: Resource) -> Result<PostHandle> {
        self.check_not_committed()?;
        let names = self.service.preliminary_names();

        let preliminary_path = match &resource.path {
            Some(p) if p.is_preliminary() => p.clone(),
            _ => names.next_preliminary(),
        };
        let first_version_path = match &resource.first_version_path {
            Some(p) if p.is_preliminary() => Some(p.clone()),
            _ if self.service.meta_api().item_type(&resource.content_type).is_some() => {
                Some(names.next_preliminary())
            }
            _ => None,
        };

        let index = self.push(QueuedRequest {
            method: Method::Post,
            path,
            resource: Some(resource),
            result_path: Some(preliminary_path.clone()),
            result_first_version_path: first_version_path.clone(),
        });
        Ok(PostHandle {
            index,
            path: preliminary_path,
            first_version_path,
        })
    }

    /// Send the batch and import its responses in request order.
    ///
    /// The transaction is closed afterwards whether or not the batch succeeded.
    pub async fn commit(&mut self) -> Result<Vec<BatchOutcome>> {
        self.check_not_committed()?;
        self.committed = true;

        let meta = self.service.meta_api();
        let batch = self
            .requests
            .iter()
            .map(|r| -> Result<BatchRequest> {
                let body = match &r.resource {
                    Some(resource) => Some(export_resource(resource, meta, false)?),
                    None => None,
                };
                Ok(BatchRequest {
                    method: r.method,
                    path: r.path.to_wire(),
                    body,
                    result_path: r.result_path.as_ref().map(ResourcePath::to_wire),
                    result_first_version_path: r
                        .result_first_version_path
                        .as_ref()
                        .map(ResourcePath::to_wire),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(requests = batch.len(), "committing batch");
        let request = WireRequest::new(Method::Post, self.service.config().batch_url())
            .with_body(serde_json::to_value(&batch)?);
        let response = self.service.send(request).await?;

        if !response.is_success() {
            return Err(batch_error(response.status, &response.body));
        }

        let parsed: BatchResponse = serde_json::from_value(response.body)?;
        if let Some(failed) = parsed.responses.iter().find(|r| !(200..300).contains(&r.code)) {
            return Err(parse_backend_error(failed.code, &failed.body));
        }
        self.service.cache().invalidate_updated(&parsed.updated_resources);

        let outcomes = import_batch_resources(&batch, &parsed.responses, meta)?;
        info!(requests = outcomes.len(), "batch committed");
        Ok(outcomes)
    }
}

/// Error of a failed batch: the server stops at the first failing request,
/// so the last response entry carries it.
fn batch_error(status: u16, body: &Value) -> HttpError {
    let last = body
        .get("responses")
        .and_then(Value::as_array)
        .and_then(|responses| responses.last())
        .and_then(|last| serde_json::from_value::<BatchResponseItem>(last.clone()).ok());
    match last {
        Some(item) => parse_backend_error(item.code, &item.body),
        None => parse_backend_error(status, body),
    }
}
