//! AWS Cloud Control Provider implementation
//!
//! This module contains the main provider implementation that communicates
//! with AWS Cloud Control API to manage resources.

use std::collections::HashMap;
use std::time::Duration;

use aws_config::Region;
use aws_sdk_cloudcontrol::Client as CloudControlClient;
use aws_sdk_cloudcontrol::types::OperationStatus;
use log::{debug, info};
use serde_json::json;
use terrace_core::provider::{ProviderError, ProviderResult};
use terrace_core::resource::{Resource, ResourceId, State, Value};

use crate::schemas::{AwsSchemaConfig, get_schema_config};
use crate::tags::{Tag, diff_tags, tags_from_map, tags_to_map};
use crate::template::{template_hash, template_hash_from_json};

/// AWS Cloud Control Provider
pub struct AwsProvider {
    cloudcontrol_client: CloudControlClient,
    region: String,
}

impl AwsProvider {
    /// Create a new AwsProvider for the specified region
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            cloudcontrol_client: CloudControlClient::new(&config),
            region: region.to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // =========================================================================
    // Cloud Control API Methods
    // =========================================================================

    /// Get a resource by identifier using Cloud Control API
    pub async fn cc_get_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<Option<serde_json::Value>> {
        let result = self
            .cloudcontrol_client
            .get_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await;

        match result {
            Ok(response) => {
                let Some(props_str) = response
                    .resource_description()
                    .and_then(|desc| desc.properties())
                else {
                    return Ok(None);
                };
                let props = serde_json::from_str(props_str).map_err(|e| {
                    ProviderError::InvalidResponse(format!("resource properties: {}", e))
                })?;
                Ok(Some(props))
            }
            Err(e) => {
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    Ok(None)
                } else {
                    Err(ProviderError::request("Get resource", e))
                }
            }
        }
    }

    /// Create a resource using Cloud Control API
    pub async fn cc_create_resource(
        &self,
        type_name: &str,
        desired_state: serde_json::Value,
    ) -> ProviderResult<String> {
        let result = self
            .cloudcontrol_client
            .create_resource()
            .type_name(type_name)
            .desired_state(desired_state.to_string())
            .send()
            .await
            .map_err(|e| ProviderError::request("Create resource", e))?;

        let request_token = result
            .progress_event()
            .and_then(|p| p.request_token())
            .ok_or_else(|| ProviderError::InvalidResponse("no request token returned".to_string()))?;

        self.wait_for_operation(request_token).await
    }

    /// Update a resource using Cloud Control API
    pub async fn cc_update_resource(
        &self,
        type_name: &str,
        identifier: &str,
        patch_ops: Vec<serde_json::Value>,
    ) -> ProviderResult<()> {
        if patch_ops.is_empty() {
            return Ok(());
        }

        let patch_document = serde_json::to_string(&patch_ops)
            .map_err(|e| ProviderError::request("Encode patch document", e))?;
        debug!("Patching {} {}: {}", type_name, identifier, patch_document);

        let result = self
            .cloudcontrol_client
            .update_resource()
            .type_name(type_name)
            .identifier(identifier)
            .patch_document(patch_document)
            .send()
            .await
            .map_err(|e| ProviderError::request("Update resource", e))?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token).await?;
        }

        Ok(())
    }

    /// Delete a resource using Cloud Control API
    pub async fn cc_delete_resource(
        &self,
        type_name: &str,
        identifier: &str,
    ) -> ProviderResult<()> {
        let result = self
            .cloudcontrol_client
            .delete_resource()
            .type_name(type_name)
            .identifier(identifier)
            .send()
            .await
            .map_err(|e| ProviderError::request("Delete resource", e))?;

        if let Some(request_token) = result.progress_event().and_then(|p| p.request_token()) {
            self.wait_for_operation(request_token).await?;
        }

        Ok(())
    }

    /// Wait for a Cloud Control operation to complete
    async fn wait_for_operation(&self, request_token: &str) -> ProviderResult<String> {
        let max_attempts = 120;
        let delay = Duration::from_secs(5);

        for _ in 0..max_attempts {
            let status = self
                .cloudcontrol_client
                .get_resource_request_status()
                .request_token(request_token)
                .send()
                .await
                .map_err(|e| ProviderError::request("Get operation status", e))?;

            if let Some(progress) = status.progress_event() {
                match progress.operation_status() {
                    Some(OperationStatus::Success) => {
                        return Ok(progress.identifier().unwrap_or("").to_string());
                    }
                    Some(OperationStatus::Failed) => {
                        return Err(ProviderError::Operation {
                            status: "failed".to_string(),
                            message: progress
                                .status_message()
                                .unwrap_or("unknown error")
                                .to_string(),
                        });
                    }
                    Some(OperationStatus::CancelComplete) => {
                        return Err(ProviderError::Operation {
                            status: "cancelled".to_string(),
                            message: request_token.to_string(),
                        });
                    }
                    _ => {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(ProviderError::Timeout(delay * max_attempts))
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by its provider-side identifier
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> ProviderResult<State> {
        let config = schema_config(id)?;

        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };

        let Some(props) = self
            .cc_get_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))?
        else {
            return Ok(State::not_found(id.clone()));
        };

        let attributes = properties_to_attributes(&config, &props);
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    /// Create a resource and return its observed state
    pub async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        let config = schema_config(&resource.id)?;
        let desired_state = desired_properties(&config, &resource);

        let identifier = self
            .cc_create_resource(
                config.aws_type_name,
                serde_json::Value::Object(desired_state),
            )
            .await
            .map_err(|e| e.for_resource(resource.id.clone()))?;
        info!("Created {} ({})", resource.id, identifier);

        self.read_resource(&resource.id, Some(&identifier)).await
    }

    /// Update a resource, patching only attributes that changed
    pub async fn update_resource(
        &self,
        id: ResourceId,
        identifier: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let config = schema_config(&id)?;
        let patch_ops = build_patch(&config, from, &to);

        if patch_ops.is_empty() {
            debug!("{} has no changes to apply", id);
        } else {
            self.cc_update_resource(config.aws_type_name, identifier, patch_ops)
                .await
                .map_err(|e| e.for_resource(id.clone()))?;
            info!("Updated {} ({})", id, identifier);
        }

        self.read_resource(&id, Some(identifier)).await
    }

    /// Delete a resource
    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let config = schema_config(id)?;

        self.cc_delete_resource(config.aws_type_name, identifier)
            .await
            .map_err(|e| e.for_resource(id.clone()))?;
        info!("Deleted {} ({})", id, identifier);
        Ok(())
    }
}

fn schema_config(id: &ResourceId) -> ProviderResult<AwsSchemaConfig> {
    get_schema_config(&id.resource_type)
        .ok_or_else(|| ProviderError::UnknownResourceType(id.resource_type.clone()))
}

// =============================================================================
// Value Conversion Helpers
// =============================================================================

/// Map Cloud Control properties to resource attributes
pub fn properties_to_attributes(
    config: &AwsSchemaConfig,
    props: &serde_json::Value,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();

    for (name, attr_schema) in &config.schema.attributes {
        let Some(aws_name) = &attr_schema.provider_name else {
            continue;
        };
        let Some(value) = props.get(aws_name.as_str()) else {
            continue;
        };
        if let Some(v) = aws_value_to_attribute(name, value) {
            attributes.insert(name.to_string(), v);
        }
    }

    attributes
}

/// Map resource attributes to the desired Cloud Control properties
///
/// Read-only attributes are never sent.
pub fn desired_properties(
    config: &AwsSchemaConfig,
    resource: &Resource,
) -> serde_json::Map<String, serde_json::Value> {
    let mut desired_state = serde_json::Map::new();

    for (name, attr_schema) in &config.schema.attributes {
        if attr_schema.read_only {
            continue;
        }
        let Some(aws_name) = &attr_schema.provider_name else {
            continue;
        };
        let Some(value) = resource
            .attributes
            .get(name.as_str())
            .or(attr_schema.default.as_ref())
        else {
            continue;
        };
        if let Some(v) = attribute_to_aws_value(name, value) {
            desired_state.insert(aws_name.to_string(), v);
        }
    }

    desired_state
}

/// Build JSON Patch operations turning `from` into `to`
///
/// Attributes equal on both sides are left out. `template_body` is compared
/// by digest since observed state only carries the digest.
pub fn build_patch(
    config: &AwsSchemaConfig,
    from: &State,
    to: &Resource,
) -> Vec<serde_json::Value> {
    let mut patch_ops = Vec::new();

    for name in config.schema.attribute_names() {
        let attr_schema = &config.schema.attributes[name];
        if attr_schema.read_only {
            continue;
        }
        let Some(aws_name) = &attr_schema.provider_name else {
            continue;
        };
        let path = format!("/{}", aws_name);

        let observed = from.attributes.get(name);
        let desired = to
            .attributes
            .get(name)
            .or(attr_schema.default.as_ref());

        if name == "tags" {
            patch_ops.extend(tags_patch(&path, observed, desired));
            continue;
        }

        let desired_cmp = match (name, desired) {
            ("template_body", Some(Value::String(body))) => Some(Value::String(template_hash(body))),
            (_, other) => other.cloned(),
        };
        if desired_cmp.as_ref() == observed {
            continue;
        }

        match desired.and_then(|v| attribute_to_aws_value(name, v)) {
            Some(value) => {
                let op = if observed.is_some() { "replace" } else { "add" };
                patch_ops.push(json!({"op": op, "path": path, "value": value}));
            }
            None if observed.is_some() => {
                patch_ops.push(json!({"op": "remove", "path": path}));
            }
            None => {}
        }
    }

    patch_ops
}

fn tags_patch(
    path: &str,
    observed: Option<&Value>,
    desired: Option<&Value>,
) -> Option<serde_json::Value> {
    let old = match observed {
        Some(Value::Map(map)) => tags_from_map(map),
        _ => Vec::new(),
    };
    let new = match desired {
        Some(Value::Map(map)) => tags_from_map(map),
        _ => Vec::new(),
    };

    let (create, remove) = diff_tags(&old, &new);
    if remove.is_empty() && create == old {
        return None;
    }
    debug!("Tags to create: {:?}, to remove: {:?}", create, remove);

    if create.is_empty() {
        Some(json!({"op": "remove", "path": path}))
    } else {
        let op = if old.is_empty() { "add" } else { "replace" };
        Some(json!({"op": op, "path": path, "value": create}))
    }
}

/// Convert a Cloud Control property value to an attribute value
fn aws_value_to_attribute(name: &str, value: &serde_json::Value) -> Option<Value> {
    match name {
        "template_body" => Some(Value::String(template_hash_from_json(value))),
        "stack_policy_body" => match value {
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            other => Some(Value::String(other.to_string())),
        },
        "tags" => {
            let tags: Vec<Tag> = serde_json::from_value(value.clone()).ok()?;
            Some(Value::Map(tags_to_map(&tags)))
        }
        "outputs" => {
            let outputs = value.as_array()?;
            let map = outputs
                .iter()
                .filter_map(|o| {
                    let key = o.get("OutputKey")?.as_str()?;
                    let value = o.get("OutputValue")?.as_str()?;
                    Some((key.to_string(), Value::String(value.to_string())))
                })
                .collect();
            Some(Value::Map(map))
        }
        _ => json_to_value(value),
    }
}

/// Convert an attribute value to a Cloud Control property value
fn attribute_to_aws_value(name: &str, value: &Value) -> Option<serde_json::Value> {
    match (name, value) {
        // Policies are JSON documents; pass the text through if it does not parse
        ("stack_policy_body", Value::String(s)) => {
            Some(serde_json::from_str(s).unwrap_or_else(|_| json!(s)))
        }
        ("tags", Value::Map(map)) => serde_json::to_value(tags_from_map(map)).ok(),
        _ => value_to_json(value),
    }
}

/// Convert JSON value to Value
fn json_to_value(value: &serde_json::Value) -> Option<Value> {
    match value {
        serde_json::Value::String(s) => Some(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Int(i))
            } else {
                n.as_f64().map(|f| Value::Int(f as i64))
            }
        }
        serde_json::Value::Array(arr) => {
            let items: Vec<Value> = arr.iter().filter_map(json_to_value).collect();
            Some(Value::List(items))
        }
        serde_json::Value::Object(obj) => {
            let map = obj
                .iter()
                .filter_map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
                .collect();
            Some(Value::Map(map))
        }
        serde_json::Value::Null => None,
    }
}

/// Convert Value to JSON value
fn value_to_json(value: &Value) -> Option<serde_json::Value> {
    match value {
        Value::String(s) => Some(json!(s)),
        Value::Bool(b) => Some(json!(b)),
        Value::Int(i) => Some(json!(i)),
        Value::List(items) => {
            let arr: Vec<serde_json::Value> = items.iter().filter_map(value_to_json).collect();
            Some(serde_json::Value::Array(arr))
        }
        Value::Map(map) => {
            let obj: serde_json::Map<String, serde_json::Value> = map
                .iter()
                .filter_map(|(k, v)| value_to_json(v).map(|v| (k.clone(), v)))
                .collect();
            Some(serde_json::Value::Object(obj))
        }
    }
}
