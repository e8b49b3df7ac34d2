//! Cluster client for the agent operator
//!
//! Everything the control loops need from the API server sits behind
//! `ClusterClientTrait`: a namespaced object store for Deployments, cascading
//! RBAC deletes, status writes for the operator's own resources, and an event
//! recorder.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, ClusterClientTrait};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let kube_client = kube::Client::try_default().await?;
//! let client = ClusterClient::new(kube_client, "agent-operator");
//!
//! if let Some(deployment) = client.get_deployment("monitoring", "agent-cluster-agent").await? {
//!     println!("found {:?}", deployment.metadata.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod event;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ClusterClient;
pub use cluster_trait::{ClusterClientTrait, Labels, RbacKind};
pub use error::ClusterError;
pub use event::{ClusterEvent, EventKind};
#[cfg(feature = "test-util")]
pub use mock::{MockClusterClient, Operation};
