//! Interface boundary to the orchestration platform.
//!
//! The lifecycle only ever talks to the platform through these traits; the
//! Kubernetes-backed implementations live in [`kubernetes`], and the test
//! suite substitutes in-memory fakes.

pub mod kubernetes;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;

use crate::error::PlatformError;
use crate::provision::job::JobResource;

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Job resource API, scoped to the control namespace by construction.
#[async_trait]
pub trait JobResourceApi: Send + Sync {
    async fn create(&self, job: &JobResource) -> PlatformResult<()>;

    async fn get(&self, name: &str) -> PlatformResult<JobResource>;

    /// Merge-patch a single annotation on the named job resource.
    async fn patch_annotation(&self, name: &str, key: &str, value: &str) -> PlatformResult<()>;
}

/// Read access to pod status in any namespace.
#[async_trait]
pub trait PodApi: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> PlatformResult<Pod>;
}

/// Remote command execution inside a running container.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run the command and return its captured standard output.
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> PlatformResult<String>;
}

/// Log retrieval for a single container.
#[async_trait]
pub trait PodLogs: Send + Sync {
    async fn tail(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        lines: i64,
    ) -> PlatformResult<String>;
}

/// One reachability attempt against the cluster described by a credential
/// artifact.
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    async fn check(&self, kubeconfig: &str) -> PlatformResult<()>;
}
