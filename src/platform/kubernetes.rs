//! Kubernetes-backed implementations of the platform interfaces.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, AttachParams, DynamicObject, LogParams, Patch, PatchParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, GroupVersionKind};
use kube::{Client, Config};
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::PlatformError;
use crate::platform::{ClusterProbe, JobResourceApi, PlatformResult, PodApi, PodLogs, RemoteExec};
use crate::provision::job::{JobResource, JOB_GROUP, JOB_KIND, JOB_PLURAL, JOB_VERSION};

/// Connection timeouts for the controller's own clients.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the controller's own client, preferring in-cluster configuration
/// and falling back to the default loading rules.
pub async fn ambient_client() -> PlatformResult<Client> {
    let mut config = Config::infer().await.map_err(|err| {
        PlatformError::InvalidCredentials(err.to_string())
    })?;
    config.connect_timeout = Some(CONNECT_TIMEOUT);
    config.read_timeout = Some(READ_TIMEOUT);
    Client::try_from(config).map_err(|err| PlatformError::Api(err.to_string()))
}

fn job_api_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(JOB_GROUP, JOB_VERSION, JOB_KIND),
        JOB_PLURAL,
    )
}

/// Reduce a kube client error to the platform error surface.
fn platform_error(err: kube::Error) -> PlatformError {
    match err {
        kube::Error::Api(response) => match response.code {
            403 => PlatformError::Forbidden,
            404 => PlatformError::NotFound,
            409 => PlatformError::AlreadyExists,
            _ if response.message.contains("container not found") => {
                PlatformError::ContainerNotFound
            }
            _ => PlatformError::Api(response.to_string()),
        },
        other => PlatformError::Api(other.to_string()),
    }
}

fn to_dynamic(job: &JobResource) -> PlatformResult<DynamicObject> {
    serde_json::to_value(job)
        .and_then(serde_json::from_value)
        .map_err(|err| PlatformError::Api(format!("could not encode job resource: {}", err)))
}

fn from_dynamic(object: DynamicObject) -> PlatformResult<JobResource> {
    serde_json::to_value(object)
        .and_then(serde_json::from_value)
        .map_err(|err| PlatformError::Api(format!("could not decode job resource: {}", err)))
}

/// Job resource client scoped to the control namespace.
pub struct KubeJobApi {
    api: Api<DynamicObject>,
}

impl KubeJobApi {
    pub fn new(client: Client, control_namespace: &str) -> Self {
        let resource = job_api_resource();
        Self {
            api: Api::namespaced_with(client, control_namespace, &resource),
        }
    }
}

#[async_trait]
impl JobResourceApi for KubeJobApi {
    async fn create(&self, job: &JobResource) -> PlatformResult<()> {
        let object = to_dynamic(job)?;
        self.api
            .create(&PostParams::default(), &object)
            .await
            .map_err(platform_error)?;
        Ok(())
    }

    async fn get(&self, name: &str) -> PlatformResult<JobResource> {
        let object = self.api.get(name).await.map_err(platform_error)?;
        from_dynamic(object)
    }

    async fn patch_annotation(&self, name: &str, key: &str, value: &str) -> PlatformResult<()> {
        let patch = serde_json::json!({ "metadata": { "annotations": { key: value } } });
        self.api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(platform_error)?;
        Ok(())
    }
}

/// Pod status reads across namespaces.
pub struct KubePodApi {
    client: Client,
}

impl KubePodApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodApi for KubePodApi {
    async fn get(&self, namespace: &str, name: &str) -> PlatformResult<Pod> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        pods.get(name).await.map_err(platform_error)
    }
}

/// Remote command execution over the exec subresource.
pub struct KubeExec {
    client: Client,
}

impl KubeExec {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteExec for KubeExec {
    async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        command: &[String],
    ) -> PlatformResult<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = AttachParams::default()
            .container(container)
            .stdout(true)
            .stderr(false);
        let mut attached = pods
            .exec(pod, command.to_vec(), &params)
            .await
            .map_err(platform_error)?;

        let mut output = String::new();
        if let Some(mut stdout) = attached.stdout() {
            stdout
                .read_to_string(&mut output)
                .await
                .map_err(|err| PlatformError::Api(format!("could not read exec output: {}", err)))?;
        }

        // the exec outcome arrives on the status channel, not the exit of
        // the stream
        let status = match attached.take_status() {
            Some(status) => status.await,
            None => None,
        };
        attached
            .join()
            .await
            .map_err(|err| PlatformError::Api(format!("exec did not complete: {}", err)))?;

        if let Some(status) = status {
            if status.status.as_deref() == Some("Failure") {
                let message = status.message.unwrap_or_else(|| "exec failed".to_string());
                if message.contains("container not found") {
                    return Err(PlatformError::ContainerNotFound);
                }
                return Err(PlatformError::Api(message));
            }
        }
        Ok(output)
    }
}

/// Log tails over the log subresource.
pub struct KubeLogs {
    client: Client,
}

impl KubeLogs {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodLogs for KubeLogs {
    async fn tail(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        lines: i64,
    ) -> PlatformResult<String> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(container.to_string()),
            tail_lines: Some(lines),
            ..Default::default()
        };
        pods.logs(pod, &params).await.map_err(platform_error)
    }
}

/// Probes the provisioned cluster with a client built from the credential
/// artifact extracted out of its workload.
pub struct KubeClusterProbe {
    probe_namespace: String,
    client_timeout: Duration,
}

impl KubeClusterProbe {
    pub fn new(probe_namespace: impl Into<String>, client_timeout: Duration) -> Self {
        Self {
            probe_namespace: probe_namespace.into(),
            client_timeout,
        }
    }
}

#[async_trait]
impl ClusterProbe for KubeClusterProbe {
    async fn check(&self, kubeconfig: &str) -> PlatformResult<()> {
        let parsed = Kubeconfig::from_yaml(kubeconfig)
            .map_err(|err| PlatformError::InvalidCredentials(err.to_string()))?;
        let mut config = Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
            .await
            .map_err(|err| PlatformError::InvalidCredentials(err.to_string()))?;
        config.connect_timeout = Some(self.client_timeout);
        config.read_timeout = Some(self.client_timeout);
        let host = config.cluster_url.to_string();
        let client =
            Client::try_from(config).map_err(|err| PlatformError::Api(err.to_string()))?;

        let namespaces: Api<Namespace> = Api::all(client);
        debug!("probing cluster at {}", host);
        namespaces
            .get(&self.probe_namespace)
            .await
            .map_err(platform_error)?;
        Ok(())
    }
}
