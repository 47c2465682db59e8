//! Adhocracy HTTP - transaction and versioning layer
//!
//! Client side of the Adhocracy REST API.
//!
//! # Architecture
//!
//! - **Batches**: several requests committed atomically, with preliminary
//!   paths (`@pn<N>`) standing in for resources created in the same batch
//! - **No-fork versions**: optimistic concurrency for items with a single
//!   linear version history, retried with randomized exponential backoff
//! - **Cache**: GET/OPTIONS responses memoized while the push channel is
//!   connected, invalidated by push notifications and `updated_resources`
//!
//! # Example
//!
//! ```rust,ignore
//! use adhocracy_http::{ClientConfig, HttpService, PushHub, Resource, ResourcePath};
//! use std::sync::Arc;
//!
//! let service = HttpService::connect(ClientConfig::default(), Arc::new(PushHub::new())).await?;
//!
//! // Create an item and reference its first version in the same batch
//! let mut tx = service.transaction();
//! let proposal = tx.post(
//!     ResourcePath::real("/organisation/"),
//!     Resource::new("adhocracy_core.resources.proposal.IProposal"),
//! )?;
//! let outcomes = tx.commit().await?;
//!
//! // Append a version to a no-fork item
//! let posted = service
//!     .post_new_version_no_fork("/organisation/proposal_0000000/VERSION_0000001/", &draft, None)
//!     .await?;
//! ```

// Path handling and preliminary names
pub mod path;

// Schema registry
pub mod meta_api;

// Resource records
pub mod resource;
pub mod resource_util;

// Push notifications and caching
pub mod push;
pub mod cache;

// Wire conversion
pub mod convert;

// HTTP plumbing
pub mod transport;
pub mod backoff;

// Batches and the service facade
pub mod transaction;
pub mod client;

// Configuration
pub mod config;

// Error types
pub mod error;

#[cfg(test)]
pub(crate) mod test_support;

pub use path::{is_preliminary, parent_path, PreliminaryNames, ResourcePath};

pub use meta_api::{FieldMeta, MetaApi, ResourceMeta, ValueType};

pub use resource::{sheets, Resource, Sheet};
pub use resource_util::sort_resources_topologically;

pub use push::{PushChannel, PushHub, SubscriptionHandle};
pub use cache::{Cache, UpdatedResources};

pub use convert::{BatchOutcome, ImportOptions, OriginalElements, ResourceOptions};

pub use transport::{Method, ReqwestTransport, Transport, WireRequest, WireResponse};
pub use backoff::{Backoff, Sleeper, TokioSleeper};

pub use transaction::{PostHandle, RequestHandle, Transaction};
pub use client::{Credentials, GetOptions, HttpService, NoForkPosted};

pub use config::{ClientConfig, NoForkConfig};

pub use error::{BackendErrorItem, HttpError, Result};
