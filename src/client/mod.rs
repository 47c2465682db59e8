//! HTTP service
//!
//! `HttpService` is the entry point for talking to an Adhocracy backend.
//! It is constructed explicitly and passed by reference; every caller
//! shares its response cache.
//!
//! # Example
//!
//! ```rust,ignore
//! use adhocracy_http::{ClientConfig, HttpService, PushHub};
//! use std::sync::Arc;
//!
//! let service = HttpService::connect(ClientConfig::default(), Arc::new(PushHub::new())).await?;
//! let proposal = service.get("/organisation/proposal_0000000/").await?;
//! ```

mod deep_post;
mod versions;

pub use versions::NoForkPosted;

use crate::backoff::{Sleeper, TokioSleeper};
use crate::cache::{Cache, UpdatedResources};
use crate::config::ClientConfig;
use crate::convert::{
    export_resource, import_options, import_resource, parse_backend_error, ImportOptions,
    OriginalElements, ResourceOptions,
};
use crate::error::{HttpError, Result};
use crate::meta_api::MetaApi;
use crate::path::{is_preliminary, PreliminaryNames};
use crate::push::PushChannel;
use crate::resource::{sheets, Resource};
use crate::transaction::Transaction;
use crate::transport::{Method, ReqwestTransport, Transport, WireRequest, WireResponse};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Header carrying the logged in user's path.
pub const USER_PATH_HEADER: &str = "X-User-Path";

/// Header carrying the session token.
pub const USER_TOKEN_HEADER: &str = "X-User-Token";

/// Session credentials sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_path: String,
    pub token: String,
}

impl Credentials {
    pub fn new(user_path: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_path: user_path.into(),
            token: token.into(),
        }
    }
}

/// Options for a GET.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Query parameters
    pub params: BTreeMap<String, String>,
    /// Fetch pool elements with their content and seed them into the cache
    pub warmup_pool_cache: bool,
}

impl GetOptions {
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn warmup_pool_cache(mut self) -> Self {
        self.warmup_pool_cache = true;
        self
    }
}

/// Client for the Adhocracy REST API.
pub struct HttpService {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    meta: Arc<MetaApi>,
    names: PreliminaryNames,
    cache: Cache,
    sleeper: Arc<dyn Sleeper>,
    credentials: RwLock<Option<Credentials>>,
}

impl HttpService {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        meta: MetaApi,
        push: Arc<dyn PushChannel>,
    ) -> Self {
        Self {
            config,
            transport,
            meta: Arc::new(meta),
            names: PreliminaryNames::new(),
            cache: Cache::new(push),
            sleeper: Arc::new(TokioSleeper),
            credentials: RwLock::new(None),
        }
    }

    /// Replace the timer used between no-fork retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Connect over HTTP and load the schema registry from the backend.
    pub async fn connect(config: ClientConfig, push: Arc<dyn PushChannel>) -> Result<Self> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config)?);

        let url = config.meta_api_url();
        let response = transport.request(WireRequest::new(Method::Get, &url)).await?;
        if !response.is_success() {
            return Err(parse_backend_error(response.status, &response.body));
        }
        let meta = MetaApi::from_value(response.body)?;

        info!(rest_url = %config.rest_url, "connected to backend");
        Ok(Self::new(config, transport, meta, push))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn meta_api(&self) -> &MetaApi {
        &self.meta
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn preliminary_names(&self) -> &PreliminaryNames {
        &self.names
    }

    pub(crate) fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// Attach credentials to all following requests. Cached responses were
    /// fetched with other permissions and are dropped.
    pub async fn set_credentials(&self, credentials: Credentials) {
        *self.credentials.write().await = Some(credentials);
        self.cache.invalidate_all();
    }

    pub async fn clear_credentials(&self) {
        *self.credentials.write().await = None;
        self.cache.invalidate_all();
    }

    /// Send a request with the session headers attached.
    pub(crate) async fn send(&self, mut request: WireRequest) -> Result<WireResponse> {
        if let Some(credentials) = self.credentials.read().await.as_ref() {
            request = request
                .with_header(USER_PATH_HEADER, credentials.user_path.as_str())
                .with_header(USER_TOKEN_HEADER, credentials.token.as_str());
        }
        self.transport.request(request).await
    }

    /// Send and return the body of a successful response.
    async fn send_ok(&self, request: WireRequest) -> Result<Value> {
        let response = self.send(request).await?;
        if !response.is_success() {
            return Err(parse_backend_error(response.status, &response.body));
        }
        Ok(response.body)
    }

    pub async fn get(&self, path: &str) -> Result<Resource> {
        self.get_with(path, GetOptions::default()).await
    }

    pub async fn get_with(&self, path: &str, options: GetOptions) -> Result<Resource> {
        check_real(path)?;

        let policy = OriginalElements::from_param(options.params.get("elements").map(String::as_str));
        let mut params = options.params;
        if options.warmup_pool_cache {
            params.insert("elements".into(), "content".into());
        }
        let subkey = query_signature(&params);
        let query: Vec<(String, String)> = params.into_iter().collect();

        let body = self
            .cache
            .memoize(path, &subkey, || {
                debug!(path, subkey = %subkey, "GET");
                self.send_ok(WireRequest::new(Method::Get, self.config.url(path)).with_query(query))
            })
            .await?;

        let import = ImportOptions {
            warmup_pool_cache: options.warmup_pool_cache,
            original_elements: policy,
        };
        import_resource(&body, &self.meta, &import, Some(&self.cache))
    }

    /// Methods the current user may use on `path`.
    pub async fn options(&self, path: &str) -> Result<ResourceOptions> {
        check_real(path)?;
        let body = self
            .cache
            .memoize(path, "OPTIONS", || {
                debug!(path, "OPTIONS");
                self.send_ok(WireRequest::new(Method::Options, self.config.url(path)))
            })
            .await?;
        Ok(import_options(&body))
    }

    pub async fn put(&self, path: &str, resource: &Resource) -> Result<Resource> {
        let body = export_resource(resource, &self.meta, false)?;
        self.write(Method::Put, path, body).await
    }

    /// Create `resource` below the pool or item at `path`.
    pub async fn post(&self, path: &str, resource: &Resource) -> Result<Resource> {
        let body = export_resource(resource, &self.meta, false)?;
        self.write(Method::Post, path, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        check_real(path)?;
        debug!(path, "DELETE");
        let body = self
            .send_ok(WireRequest::new(Method::Delete, self.config.url(path)))
            .await?;
        self.cache.invalidate(path);
        if let Some(updated) = UpdatedResources::from_body(&body) {
            self.cache.invalidate_updated(&updated);
        }
        Ok(())
    }

    /// Hide a resource by setting its metadata `hidden` flag.
    pub async fn hide(&self, path: &str, content_type: &str) -> Result<Resource> {
        let resource =
            Resource::new(content_type).with_field(sheets::METADATA, "hidden", Value::Bool(true));
        let body = export_resource(&resource, &self.meta, true)?;
        self.write(Method::Put, path, body).await
    }

    async fn write(&self, method: Method, path: &str, body: Value) -> Result<Resource> {
        check_real(path)?;
        debug!(method = method.as_str(), path, "write");
        let response = self
            .send_ok(WireRequest::new(method, self.config.url(path)).with_body(body))
            .await?;
        if let Some(updated) = UpdatedResources::from_body(&response) {
            self.cache.invalidate_updated(&updated);
        }
        import_resource(&response, &self.meta, &ImportOptions::default(), None)
    }

    /// Open a transaction. Nothing is sent until it is committed.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Run `callback` with a fresh transaction; the callback commits it.
    pub async fn with_transaction<'a, F, Fut, T>(&'a self, callback: F) -> Result<T>
    where
        F: FnOnce(Transaction<'a>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        callback(self.transaction()).await
    }
}

fn check_real(path: &str) -> Result<()> {
    if is_preliminary(path) {
        return Err(HttpError::PreliminaryPathMisuse(path.to_string()));
    }
    Ok(())
}

/// Cache subkey of a query: `key=value` pairs in key order.
fn query_signature(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
