//! The registration table: lookup operations keyed by tool name and by
//! resource URI template.
//!
//! Empty at boot, filled once before serving, read-only afterwards.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::binder::{bind, LookupOperation, URI_SCHEME};
use crate::catalog::IndexDescriptor;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    tools: Vec<(String, LookupOperation)>,
    resources: Vec<(String, LookupOperation)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind and register every descriptor as both a tool and a resource
    /// template, in the given order.
    pub fn from_descriptors(descriptors: Vec<IndexDescriptor>, dsn: &str) -> Self {
        let mut registry = Self::new();
        for descriptor in descriptors {
            let subject = descriptor.subject().to_string();
            match bind(descriptor, dsn) {
                Ok(operation) => {
                    registry.register_tool(operation.clone());
                    registry.register_resource(operation);
                }
                Err(e) => warn!(subject = %subject, error = %e, "Skipping index"),
            }
        }
        registry
    }

    /// Register under `Lookup <subject>`. A later registration under the
    /// same name replaces the earlier one and keeps its position.
    pub fn register_tool(&mut self, operation: LookupOperation) {
        let name = operation.tool_name();
        let slot = self.tools.iter().position(|(n, _)| *n == name);
        upsert(&mut self.tools, slot, name.clone(), operation, "tool");
        info!("Registered tool: {name}");
    }

    /// Register under its URI template. Concrete URIs only carry the subject
    /// and one segment per key, so templates collide on (subject, key count)
    /// even when key names differ; the later registration replaces the
    /// earlier one as in [`Self::register_tool`].
    pub fn register_resource(&mut self, operation: LookupOperation) {
        let template = operation.uri_template();
        let slot = self.resources.iter().position(|(_, op)| {
            op.subject() == operation.subject() && op.params().len() == operation.params().len()
        });
        upsert(&mut self.resources, slot, template.clone(), operation, "resource");
        info!("Registered resource: {template}");
    }

    pub fn tool(&self, name: &str) -> Option<&LookupOperation> {
        self.tools.iter().find(|(n, _)| n == name).map(|(_, op)| op)
    }

    /// Find the template a concrete URI belongs to. The subject must match
    /// exactly and the URI must carry one segment per key; registration keeps
    /// at most one template per (subject, key count).
    pub fn resource_for_uri(&self, uri: &str) -> Option<&LookupOperation> {
        let rest = uri.strip_prefix(URI_SCHEME)?;
        let (subject, values) = rest.split_once('/')?;
        let segments = values.split('/').count();
        self.resources
            .iter()
            .map(|(_, op)| op)
            .find(|op| op.subject() == subject && op.params().len() == segments)
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn uri_templates(&self) -> Vec<&str> {
        self.resources.iter().map(|(t, _)| t.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty() && self.resources.is_empty()
    }

    /// `tools/list` payload.
    pub fn tools_json(&self) -> Value {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(name, op)| {
                json!({
                    "name": name,
                    "description": op.description(),
                    "inputSchema": op.input_schema(),
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    /// `resources/templates/list` payload.
    pub fn resource_templates_json(&self) -> Value {
        let templates: Vec<Value> = self
            .resources
            .iter()
            .map(|(template, op)| {
                json!({
                    "uriTemplate": template,
                    "name": op.subject(),
                    "description": op.description(),
                    "mimeType": "application/json",
                })
            })
            .collect();
        json!({ "resourceTemplates": templates })
    }
}

fn upsert(
    entries: &mut Vec<(String, LookupOperation)>,
    slot: Option<usize>,
    key: String,
    operation: LookupOperation,
    kind: &str,
) {
    match slot {
        Some(i) => {
            warn!(kind, name = %key, replaced = %entries[i].0, "Replacing earlier registration");
            entries[i] = (key, operation);
        }
        None => entries.push((key, operation)),
    }
}
