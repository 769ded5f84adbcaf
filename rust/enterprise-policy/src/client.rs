//! Typed access to the policy resources in one namespace.
//!
//! Every object is validated before it is submitted, and updates are retried when they lose a
//! race against another writer.

use std::{fmt::Debug, future::Future, path::Path, time::Duration};

use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};
use snafu::{ResultExt, Snafu};
use stackable_operator::{
    k8s_openapi::NamespaceResourceScope,
    kube::{
        self,
        api::{Api, DeleteParams, ListParams, PostParams},
        config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
        Resource, ResourceExt,
    },
};

use crate::{
    crd::v1alpha1::{
        EnterpriseAgentgatewayParameters, EnterpriseAgentgatewayPolicy,
        EnterpriseKgatewayParameters, EnterpriseKgatewayTrafficPolicy, WAFPolicy,
    },
    validation::{validate, Violations},
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read kubeconfig {}", path.display()))]
    ReadKubeconfig {
        source: KubeconfigError,
        path: std::path::PathBuf,
    },

    #[snafu(display("failed to load kubeconfig"))]
    LoadKubeconfig { source: KubeconfigError },

    #[snafu(display("failed to create Kubernetes client"))]
    CreateClient { source: kube::Error },

    #[snafu(display("{kind} {name:?} is invalid"))]
    Invalid {
        source: Violations,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to create {kind} {name:?}"))]
    Create {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to get {kind} {name:?}"))]
    Get {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to list {kind} objects"))]
    List { source: kube::Error, kind: String },

    #[snafu(display("failed to replace {kind} {name:?}"))]
    Replace {
        source: kube::Error,
        kind: String,
        name: String,
    },

    #[snafu(display("failed to delete {kind} {name:?}"))]
    Delete {
        source: kube::Error,
        kind: String,
        name: String,
    },
}

/// Errors that are worth retrying with a fresh copy of the object.
pub trait Conflict {
    fn is_conflict(&self) -> bool;
}

impl Conflict for Error {
    fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::Replace {
                source: kube::Error::Api(response),
                ..
            } if response.code == 409
        )
    }
}

/// Resources that must pass validation before they are sent to the API server.
pub trait ValidatedResource {
    fn validate(&self) -> Result<(), Violations>;
}

macro_rules! validated_resources {
    ($($kind:ty),* $(,)?) => {
        $(
            impl ValidatedResource for $kind {
                fn validate(&self) -> Result<(), Violations> {
                    validate(&self.spec)
                }
            }
        )*
    };
}

validated_resources!(
    EnterpriseAgentgatewayPolicy,
    EnterpriseKgatewayTrafficPolicy,
    WAFPolicy,
    EnterpriseAgentgatewayParameters,
    EnterpriseKgatewayParameters,
);

/// How often and how quickly conflicting updates are retried.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Backoff {
    /// The maximum number of attempts.
    pub steps: usize,
    pub duration: Duration,
    pub factor: f64,
    /// Each delay is extended by up to this fraction of itself.
    pub jitter: f64,
}

impl Backoff {
    /// The backoff that Kubernetes clients use for conflicting writes.
    pub const DEFAULT_RETRY: Backoff = Backoff {
        steps: 5,
        duration: Duration::from_millis(10),
        factor: 1.0,
        jitter: 0.1,
    };

    /// The delays before the second and later attempts.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let Backoff {
            steps,
            duration,
            factor,
            jitter,
        } = *self;
        let mut rng = rand::thread_rng();
        (1..steps).scan(duration, move |next, _| {
            let base = *next;
            if factor > 0.0 {
                *next = base.mul_f64(factor);
            }
            Some(base + base.mul_f64(jitter * rng.gen::<f64>()))
        })
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::DEFAULT_RETRY
    }
}

/// Runs `attempt` until it succeeds, fails with an error that is not a [`Conflict`], or
/// `backoff` runs out of steps. The last error is returned in that case.
pub async fn retry_on_conflict<T, E, F, Fut>(backoff: &Backoff, mut attempt: F) -> Result<T, E>
where
    E: Conflict,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delays = backoff.delays().collect::<Vec<_>>().into_iter();
    loop {
        match attempt().await {
            Err(err) if err.is_conflict() => match delays.next() {
                Some(delay) => {
                    tracing::debug!(?delay, "conflicting write, retrying");
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            },
            result => return result,
        }
    }
}

/// Connects using `kubeconfig`, or the default kubeconfig or in-cluster configuration otherwise.
pub async fn connect(kubeconfig: Option<&Path>) -> Result<kube::Client, Error> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).context(ReadKubeconfigSnafu { path })?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context(LoadKubeconfigSnafu)?
        }
        None => return kube::Client::try_default().await.context(CreateClientSnafu),
    };
    kube::Client::try_from(config).context(CreateClientSnafu)
}

pub struct PolicyClient {
    client: kube::Client,
    namespace: String,
    backoff: Backoff,
}

impl PolicyClient {
    pub fn new(client: kube::Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(self, backoff: Backoff) -> Self {
        Self { backoff, ..self }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    pub async fn create<K>(&self, object: &K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + ValidatedResource
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let kind = K::kind(&()).into_owned();
        let name = object.name_any();
        object.validate().with_context(|_| InvalidSnafu {
            kind: &kind,
            name: &name,
        })?;
        let created = self
            .api::<K>()
            .create(&PostParams::default(), object)
            .await
            .context(CreateSnafu {
                kind: &kind,
                name: &name,
            })?;
        tracing::info!(%kind, %name, namespace = %self.namespace, "created");
        Ok(created)
    }

    pub async fn get<K>(&self, name: &str) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        self.api::<K>().get(name).await.context(GetSnafu {
            kind: K::kind(&()),
            name,
        })
    }

    pub async fn list<K>(&self) -> Result<Vec<K>, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let objects = self
            .api::<K>()
            .list(&ListParams::default())
            .await
            .context(ListSnafu { kind: K::kind(&()) })?;
        Ok(objects.items)
    }

    /// Applies `mutate` to the latest version of `name` and replaces it, starting over with a
    /// fresh copy whenever another writer got there first.
    ///
    /// Every attempt is validated after `mutate` has run. Invalid objects are never retried.
    pub async fn update_with_retry<K, F>(&self, name: &str, mutate: F) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + ValidatedResource
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
        F: Fn(&mut K),
    {
        let mutate = &mutate;
        let kind = &K::kind(&()).into_owned();
        let updated = retry_on_conflict(&self.backoff, move || async move {
            let mut latest = self.get::<K>(name).await?;
            mutate(&mut latest);
            latest
                .validate()
                .with_context(|_| InvalidSnafu { kind, name })?;
            self.api::<K>()
                .replace(name, &PostParams::default(), &latest)
                .await
                .context(ReplaceSnafu { kind, name })
        })
        .await?;
        tracing::info!(%kind, %name, namespace = %self.namespace, "updated");
        Ok(updated)
    }

    /// Deletes `name` in the foreground, so that its dependents are gone before it is.
    pub async fn delete<K>(&self, name: &str) -> Result<(), Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + DeserializeOwned,
    {
        let kind = K::kind(&()).into_owned();
        self.api::<K>()
            .delete(name, &DeleteParams::foreground())
            .await
            .context(DeleteSnafu { kind: &kind, name })?;
        tracing::info!(%kind, %name, namespace = %self.namespace, "deleted");
        Ok(())
    }
}
