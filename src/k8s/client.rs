use http::Request;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    Event, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod,
};
use kube::config::Kubeconfig;
use kube::{Api, Client, Config};
use serde::de::DeserializeOwned;

use crate::errors::{Error, Result};

fn infer_cluster_name() -> Option<String> {
    let kubeconfig = Kubeconfig::read().ok()?;
    let current = kubeconfig.current_context.as_ref()?;
    let named = kubeconfig.contexts.iter().find(|nc| nc.name == *current)?;
    let ctx = named.context.as_ref()?;
    Some(ctx.cluster.clone())
}

/// Authenticated cluster handle plus the session's namespace scope.
///
/// Namespaced accessors honor the scope: `None` means all namespaces
/// (cluster-wide list/watch), `Some(ns)` scopes every namespaced factory.
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
    cluster_name: Option<String>,
    namespace: Option<String>,
}

impl K8sClient {
    /// Connect using config discovery: explicit path, then $KUBECONFIG, then
    /// the user-home default. Failures here are fatal at startup.
    pub async fn new(config_file: Option<&str>, namespace: Option<String>) -> Result<Self> {
        if let Some(path) = config_file {
            std::env::set_var("KUBECONFIG", path);
        }
        let cluster_name = infer_cluster_name();
        let config = Config::infer()
            .await
            .map_err(|e| Error::Credential(e.to_string()))?;
        let client = Client::try_from(config).map_err(|e| Error::Credential(e.to_string()))?;
        Ok(Self {
            client,
            cluster_name,
            namespace,
        })
    }

    /// Wrap an existing client handle (alternate auth flows, tests). No
    /// kubeconfig discovery happens here.
    pub fn from_client(client: Client, namespace: Option<String>) -> Self {
        Self {
            client,
            cluster_name: None,
            namespace,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Cluster name from kubeconfig current context, or None if in-cluster or unset.
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Configured namespace scope; None means all namespaces.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn scoped<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
    {
        match self.namespace.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    // Cluster-scoped APIs
    pub fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    pub fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    pub fn persistent_volumes(&self) -> Api<PersistentVolume> {
        Api::all(self.client.clone())
    }

    // Namespaced APIs (honor the session scope)
    pub fn pods(&self) -> Api<Pod> {
        self.scoped()
    }

    pub fn persistent_volume_claims(&self) -> Api<PersistentVolumeClaim> {
        self.scoped()
    }

    pub fn events(&self) -> Api<Event> {
        self.scoped()
    }

    /// Events API pinned to one namespace regardless of the session scope.
    /// Pod event lookups always come from the pod's own namespace.
    pub fn events_in(&self, namespace: &str) -> Api<Event> {
        Api::namespaced(self.client.clone(), namespace)
    }

    pub fn deployments(&self) -> Api<Deployment> {
        self.scoped()
    }

    pub fn daemon_sets(&self) -> Api<DaemonSet> {
        self.scoped()
    }

    pub fn replica_sets(&self) -> Api<ReplicaSet> {
        self.scoped()
    }

    pub fn stateful_sets(&self) -> Api<StatefulSet> {
        self.scoped()
    }

    pub fn jobs(&self) -> Api<Job> {
        self.scoped()
    }

    pub fn cron_jobs(&self) -> Api<CronJob> {
        self.scoped()
    }

    /// Returns the Kubernetes API server version (e.g. "v1.28.0") if available.
    /// Uses the apiserver /version endpoint (gitVersion).
    pub async fn server_version(&self) -> Result<Option<String>> {
        let info = self.client.apiserver_version().await?;
        Ok(Some(info.git_version))
    }

    /// GET an arbitrary API path and decode the JSON body.
    /// Used for aggregated APIs (metrics.k8s.io) that have no typed Api.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(vec![])
            .map_err(|e| Error::Transient(format!("build request: {}", e)))?;
        Ok(self.client.request(req).await?)
    }

    /// GET an arbitrary API path as text. Used for /proxy/metrics exposition.
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(vec![])
            .map_err(|e| Error::Transient(format!("build request: {}", e)))?;
        Ok(self.client.request_text(req).await?)
    }
}
