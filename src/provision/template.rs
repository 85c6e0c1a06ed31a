//! Resolution of job templates into submittable job resources.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use serde::{Deserialize, Serialize};

use crate::error::{LaunchError, Result};
use crate::provision::job::{
    JobResource, JobResourceSpec, JobResourceStatus, ANNOTATION_CHANNEL, ANNOTATION_FROM_VERSION,
    ANNOTATION_INSTALL_IMAGE, ANNOTATION_JOB, ANNOTATION_MODE, ANNOTATION_REQUESTED_BY,
    ANNOTATION_TO_VERSION, ANNOTATION_UPGRADE_IMAGE, ANNOTATION_WORKSPACE, JOB_API_VERSION,
    JOB_KIND, JOB_TYPE_PERIODIC, LABEL_JOB_NAME, LABEL_JOB_TYPE, LABEL_LAUNCH, LABEL_VERIFY,
    STATE_TRIGGERED,
};
use crate::provision::request::ClusterRequest;

/// Environment variables the submitter rewrites across every container.
pub const ENV_RELEASE_IMAGE_LATEST: &str = "RELEASE_IMAGE_LATEST";
pub const ENV_RELEASE_IMAGE_INITIAL: &str = "RELEASE_IMAGE_INITIAL";
pub const ENV_NAMESPACE: &str = "NAMESPACE";

/// A single job template as loaded from the platform's job configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobDefinition {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub pod_spec: Option<PodSpec>,
}

/// Catalog of job templates known to the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobCatalog {
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

impl JobCatalog {
    pub fn by_name(&self, name: &str) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// First template whose labels contain every pair in the selector.
    pub fn by_labels(&self, selector: &BTreeMap<String, String>) -> Option<&JobDefinition> {
        self.jobs.iter().find(|job| {
            selector
                .iter()
                .all(|(key, value)| job.labels.get(key) == Some(value))
        })
    }
}

/// Source of the job catalog. Loading and refreshing the catalog is the
/// embedding application's concern; `None` means nothing has been loaded.
pub trait JobCatalogSource: Send + Sync {
    fn catalog(&self) -> Option<Arc<JobCatalog>>;
}

/// Fixed in-memory catalog source.
pub struct StaticJobCatalog {
    catalog: Option<Arc<JobCatalog>>,
}

impl StaticJobCatalog {
    pub fn new(catalog: JobCatalog) -> Self {
        Self {
            catalog: Some(Arc::new(catalog)),
        }
    }

    /// A source with nothing loaded; every resolution fails as unconfigured.
    pub fn empty() -> Self {
        Self { catalog: None }
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let catalog: JobCatalog = serde_yaml::from_str(contents).map_err(|err| {
            LaunchError::Configuration(format!("could not parse job catalog: {}", err))
        })?;
        Ok(Self::new(catalog))
    }
}

impl JobCatalogSource for StaticJobCatalog {
    fn catalog(&self) -> Option<Arc<JobCatalog>> {
        self.catalog.clone()
    }
}

/// Resolve a template by exact name into a fresh job resource.
pub fn job_for_template(source: &dyn JobCatalogSource, name: &str) -> Result<JobResource> {
    let catalog = source.catalog().ok_or(LaunchError::NotConfigured)?;
    let definition = catalog
        .by_name(name)
        .ok_or_else(|| LaunchError::TemplateNotFound(format!("the name {}", name)))?;
    Ok(job_from_definition(definition))
}

/// Resolve the first template matching the label selector.
pub fn job_for_labels(
    source: &dyn JobCatalogSource,
    selector: &BTreeMap<String, String>,
) -> Result<JobResource> {
    let catalog = source.catalog().ok_or(LaunchError::NotConfigured)?;
    let definition = catalog.by_labels(selector).ok_or_else(|| {
        let selector_text = selector
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(",");
        LaunchError::TemplateNotFound(format!("the label selector {}", selector_text))
    })?;
    Ok(job_from_definition(definition))
}

fn job_from_definition(definition: &JobDefinition) -> JobResource {
    JobResource {
        api_version: JOB_API_VERSION.to_string(),
        kind: JOB_KIND.to_string(),
        metadata: ObjectMeta::default(),
        spec: JobResourceSpec {
            job: definition.name.clone(),
            job_type: JOB_TYPE_PERIODIC.to_string(),
            pod_spec: definition.pod_spec.clone(),
        },
        status: JobResourceStatus {
            state: STATE_TRIGGERED.to_string(),
            url: String::new(),
            start_time: Some(Time(Utc::now())),
        },
    }
}

/// Stamp identity, provenance annotations, and discovery labels onto a
/// resolved job.
pub fn stamp_job(
    job: &mut JobResource,
    request: &ClusterRequest,
    workspace: &str,
    control_namespace: &str,
) {
    let mut annotations = BTreeMap::new();
    annotations.insert(ANNOTATION_MODE.to_string(), request.mode.as_str().to_string());
    annotations.insert(
        ANNOTATION_REQUESTED_BY.to_string(),
        request.requested_by.clone(),
    );
    annotations.insert(ANNOTATION_CHANNEL.to_string(), request.channel.clone());
    annotations.insert(ANNOTATION_WORKSPACE.to_string(), workspace.to_string());
    annotations.insert(
        ANNOTATION_INSTALL_IMAGE.to_string(),
        request.install_image.clone(),
    );
    annotations.insert(
        ANNOTATION_UPGRADE_IMAGE.to_string(),
        request.upgrade_image.clone().unwrap_or_default(),
    );
    annotations.insert(ANNOTATION_JOB.to_string(), job.spec.job.clone());

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_LAUNCH.to_string(), "true".to_string());
    labels.insert(LABEL_JOB_TYPE.to_string(), job.spec.job_type.clone());
    labels.insert(LABEL_JOB_NAME.to_string(), job.spec.job.clone());

    // mark upgrade edges so release tooling can assess the run
    if let Some((from, to)) = request.verification_versions() {
        labels.insert(LABEL_VERIFY.to_string(), "true".to_string());
        annotations.insert(ANNOTATION_FROM_VERSION.to_string(), from.to_string());
        annotations.insert(ANNOTATION_TO_VERSION.to_string(), to.to_string());
    }

    job.metadata = ObjectMeta {
        name: Some(request.name.clone()),
        namespace: Some(control_namespace.to_string()),
        annotations: Some(annotations),
        labels: Some(labels),
        ..Default::default()
    };
}

/// Rewrite the recognized environment variables across every container in
/// the pod spec, leaving unrecognized names untouched.
pub fn override_job_environment(
    spec: &mut PodSpec,
    latest_image: &str,
    initial_image: &str,
    workspace: &str,
) {
    let overrides = [
        (ENV_RELEASE_IMAGE_LATEST, latest_image),
        (ENV_RELEASE_IMAGE_INITIAL, initial_image),
        (ENV_NAMESPACE, workspace),
    ];
    for container in &mut spec.containers {
        let Some(env) = container.env.as_mut() else {
            continue;
        };
        for var in env.iter_mut() {
            if let Some((_, value)) = overrides.iter().find(|(name, _)| *name == var.name) {
                var.value = Some((*value).to_string());
            }
        }
    }
}
