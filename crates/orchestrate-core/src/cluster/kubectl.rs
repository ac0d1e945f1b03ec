//! `ClusterApi` backed by the `kubectl` CLI.

use serde_json::Value;

use crate::error::{OrchestrateError, Result};
use crate::tool::Tool;

use super::manifest::ResourceSet;
use super::{AppliedResource, ApplySummary, ClusterApi, Observed, ResourceChange};

pub struct KubectlCluster {
    kubectl: Tool,
    context: Option<String>,
    namespace: String,
}

impl KubectlCluster {
    pub fn new(kubectl: Tool, context: Option<String>, namespace: impl Into<String>) -> Self {
        Self {
            kubectl,
            context,
            namespace: namespace.into(),
        }
    }

    fn args<'a>(&'a self, rest: &[&'a str]) -> Vec<&'a str> {
        let mut args = Vec::with_capacity(rest.len() + 4);
        if let Some(ctx) = &self.context {
            args.push("--context");
            args.push(ctx.as_str());
        }
        args.push("--namespace");
        args.push(self.namespace.as_str());
        args.extend_from_slice(rest);
        args
    }
}

impl ClusterApi for KubectlCluster {
    fn apply(&self, resources: &ResourceSet) -> Result<ApplySummary> {
        let yaml = resources.to_yaml()?;
        let output = self
            .kubectl
            .run(&self.args(&["apply", "-f", "-"]), Some(yaml.as_bytes()), None)
            .map_err(|e| OrchestrateError::Apply(e.to_string()))?;
        if !output.success {
            return Err(OrchestrateError::Apply(output.failure_hint()));
        }
        Ok(parse_apply_output(&output.stdout))
    }

    fn observe(&self, component: &str) -> Result<Observed> {
        let output = self
            .kubectl
            .run(
                &self.args(&["get", "deployment", component, "-o", "json"]),
                None,
                None,
            )
            .map_err(|e| OrchestrateError::Status {
                component: component.to_string(),
                reason: e.to_string(),
            })?;
        if !output.success {
            if output.stderr.contains("NotFound") || output.stderr.contains("not found") {
                return Ok(Observed::Absent);
            }
            return Err(OrchestrateError::Status {
                component: component.to_string(),
                reason: output.failure_hint(),
            });
        }
        let doc: Value = serde_json::from_str(&output.stdout)?;
        Ok(deployment_readiness(&doc))
    }
}

/// Parse `kubectl apply` lines such as `deployment.apps/backend configured`.
///
/// The API group suffix is dropped so names match `ResourceSet::resource_names`.
pub fn parse_apply_output(stdout: &str) -> ApplySummary {
    let resources = stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let object = parts.next()?;
            let verb = parts.next()?;
            let change = match verb {
                "created" => ResourceChange::Created,
                "configured" => ResourceChange::Configured,
                "unchanged" => ResourceChange::Unchanged,
                _ => return None,
            };
            let (kind, name) = object.split_once('/')?;
            let kind = kind.split('.').next().unwrap_or(kind);
            Some(AppliedResource {
                resource: format!("{kind}/{name}"),
                change,
            })
        })
        .collect();
    ApplySummary { resources }
}

/// A Deployment is ready once the controller has observed the latest
/// generation and the rollout is complete. Every desired replica must run
/// the current template and be available, with no old replica left over.
pub fn deployment_readiness(doc: &Value) -> Observed {
    let desired = doc["spec"]["replicas"].as_u64().unwrap_or(1);
    let generation = doc["metadata"]["generation"].as_u64().unwrap_or(0);
    let status = &doc["status"];
    let count = |field: &str| status[field].as_u64().unwrap_or(0);
    let observed_generation = count("observedGeneration");
    let ready = count("readyReplicas");
    let updated = count("updatedReplicas");
    let available = count("availableReplicas");
    let total = status["replicas"].as_u64().unwrap_or(updated);

    let rolled_out = updated >= desired && available >= desired && total == updated;
    if observed_generation >= generation && ready >= desired && rolled_out {
        Observed::Ready
    } else {
        Observed::Progressing {
            ready: ready as u32,
            desired: desired as u32,
        }
    }
}
