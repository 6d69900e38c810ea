//! Cached access-review probes.
//!
//! Before the expensive list paths start, each (resource, namespace, verb)
//! is checked once via SelfSubjectAccessReview. Outcomes are cached for the
//! process lifetime and never invalidated: credentials do not change
//! mid-session.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::api::PostParams;
use kube::Api;
use log::debug;

use crate::errors::{Error, Result};
use crate::k8s::client::K8sClient;

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct AccessKey {
    group: String,
    version: String,
    resource: String,
    namespace: String,
    verb: String,
}

static ACCESS_CACHE: OnceLock<RwLock<HashMap<AccessKey, bool>>> = OnceLock::new();

fn cache() -> &'static RwLock<HashMap<AccessKey, bool>> {
    ACCESS_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Access-review front door. Cheap to clone; all state is process-wide.
#[derive(Clone)]
pub struct AccessGuard {
    client: K8sClient,
}

impl AccessGuard {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }

    /// True when the current credential may perform `verb` on `resource`
    /// (core group) in `namespace` (None = cluster-wide). Cached outcomes are
    /// returned without touching the cluster.
    pub async fn can(&self, resource: &str, namespace: Option<&str>, verb: &str) -> Result<bool> {
        let key = AccessKey {
            group: String::new(),
            version: "v1".to_string(),
            resource: resource.to_string(),
            namespace: namespace.unwrap_or_default().to_string(),
            verb: verb.to_string(),
        };
        if let Some(allowed) = cache().read().expect("access cache lock").get(&key) {
            return Ok(*allowed);
        }

        let review = SelfSubjectAccessReview {
            spec: SelfSubjectAccessReviewSpec {
                resource_attributes: Some(ResourceAttributes {
                    group: Some(key.group.clone()),
                    version: Some(key.version.clone()),
                    resource: Some(key.resource.clone()),
                    namespace: namespace.map(str::to_string),
                    verb: Some(key.verb.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        let api: Api<SelfSubjectAccessReview> = Api::all(self.client.client().clone());
        let result = api.create(&PostParams::default(), &review).await?;
        let allowed = result.status.map(|s| s.allowed).unwrap_or(false);
        debug!(
            "access review {} {} in '{}': {}",
            key.verb, key.resource, key.namespace, allowed
        );
        cache()
            .write()
            .expect("access cache lock")
            .insert(key, allowed);
        Ok(allowed)
    }

    /// Fail fast unless both get and list are allowed on `resource`.
    pub async fn require(&self, resource: &str, namespace: Option<&str>) -> Result<()> {
        for verb in ["get", "list"] {
            if !self.can(resource, namespace, verb).await? {
                return Err(Error::Authorization {
                    resource: resource.to_string(),
                    verb: verb.to_string(),
                });
            }
        }
        Ok(())
    }
}
