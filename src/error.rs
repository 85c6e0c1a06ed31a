/// Failure signals reported by the orchestration platform, reduced to the
/// cases the provisioning lifecycle distinguishes between.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("resource not found")]
    NotFound,

    #[error("access to the resource is forbidden")]
    Forbidden,

    #[error("resource already exists")]
    AlreadyExists,

    #[error("container not found")]
    ContainerNotFound,

    #[error("could not load client configuration: {0}")]
    InvalidCredentials(String),

    #[error("platform api error: {0}")]
    Api(String),
}

#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    #[error("no launch jobs have been defined")]
    NotConfigured,

    #[error("no job template matches {0}")]
    TemplateNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("could not create launch job: {0}")]
    Submission(String),

    #[error("did not retrieve job url due to an error: {0}")]
    UrlUnavailable(String),

    #[error("unable to check launch status: {0}")]
    LaunchCheck(String),

    #[error("pod was deleted")]
    PodDeleted,

    #[error("pod has already exited")]
    PodExited,

    #[error("pod never became available: {0}")]
    PodUnavailable(String),

    #[error("pod cannot be found or has been deleted, assume cluster won't come up")]
    PodGone,

    #[error("could not retrieve cluster credentials from pod: {0}")]
    CredentialRetrieval(String),

    #[error("cluster did not become reachable: {0}")]
    Unreachable(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

pub type Result<T> = std::result::Result<T, LaunchError>;
