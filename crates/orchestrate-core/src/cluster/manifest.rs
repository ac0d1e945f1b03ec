//! Rendering the declarative resource set from a plan.
//!
//! Each component becomes one `apps/v1` Deployment and one `v1` Service.
//! Output is deterministic (object keys are sorted, documents follow plan
//! order), so rendering the same plan twice gives byte-identical YAML and a
//! re-apply is a no-op diff.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::builder::BuildResult;
use crate::component::Component;
use crate::error::Result;
use crate::plan::DeploymentPlan;
use crate::publisher::PublishOutcome;

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY: &str = "orchestrate";
pub const DEPENDS_ON_ANNOTATION: &str = "orchestrate.dev/depends-on";

/// Image reference each component should run, keyed by component name.
pub type ImageRefs = BTreeMap<String, String>;

/// Pick the image each component runs: the pushed digest when there is
/// one, otherwise the tag that was built.
pub fn deploy_images(builds: &[BuildResult], publishes: &[PublishOutcome]) -> ImageRefs {
    builds
        .iter()
        .map(|build| {
            let digest = publishes
                .iter()
                .find(|p| p.component() == build.component)
                .and_then(PublishOutcome::digest);
            let image = match digest {
                Some(d) => format!("{}@{}", build.image, d),
                None => build.image.clone(),
            };
            (build.component.clone(), image)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSet {
    documents: Vec<Value>,
}

impl ResourceSet {
    /// Render every component in `plan`. Components missing from `images`
    /// run their declared image.
    pub fn render(plan: &DeploymentPlan, images: &ImageRefs, namespace: &str) -> Self {
        let mut documents = Vec::with_capacity(plan.len() * 2);
        for component in plan.components() {
            let image = images
                .get(&component.name)
                .map(String::as_str)
                .unwrap_or(component.image.as_str());
            documents.push(deployment(component, image, namespace));
            documents.push(service(component, namespace));
        }
        Self { documents }
    }

    pub fn documents(&self) -> &[Value] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// `kind/name` for each document, lowercased the way kubectl prints them.
    pub fn resource_names(&self) -> Vec<String> {
        self.documents
            .iter()
            .map(|doc| {
                let kind = doc["kind"].as_str().unwrap_or_default().to_lowercase();
                let name = doc["metadata"]["name"].as_str().unwrap_or_default();
                format!("{kind}/{name}")
            })
            .collect()
    }

    /// Multi-document YAML suitable for `kubectl apply -f -`.
    pub fn to_yaml(&self) -> Result<String> {
        let mut out = String::new();
        for doc in &self.documents {
            out.push_str("---\n");
            out.push_str(&serde_yaml::to_string(doc)?);
        }
        Ok(out)
    }
}

fn labels(component: &Component) -> Value {
    json!({
        NAME_LABEL: component.name,
        MANAGED_BY_LABEL: MANAGED_BY,
    })
}

fn metadata(component: &Component, namespace: &str) -> Value {
    let mut meta = json!({
        "name": component.name,
        "namespace": namespace,
        "labels": labels(component),
    });
    if !component.depends_on.is_empty() {
        meta["annotations"] = json!({
            DEPENDS_ON_ANNOTATION: component.depends_on.join(","),
        });
    }
    meta
}

fn deployment(component: &Component, image: &str, namespace: &str) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": metadata(component, namespace),
        "spec": {
            "replicas": component.replicas,
            "selector": { "matchLabels": { NAME_LABEL: component.name } },
            "template": {
                "metadata": { "labels": labels(component) },
                "spec": {
                    "containers": [{
                        "name": component.name,
                        "image": image,
                        "imagePullPolicy": "IfNotPresent",
                        "ports": [{ "containerPort": component.port }],
                        "readinessProbe": {
                            "tcpSocket": { "port": component.port },
                            "periodSeconds": 5,
                        },
                    }],
                },
            },
        },
    })
}

fn service(component: &Component, namespace: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": metadata(component, namespace),
        "spec": {
            "type": "ClusterIP",
            "selector": { NAME_LABEL: component.name },
            "ports": [{
                "port": component.port,
                "targetPort": component.port,
            }],
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
