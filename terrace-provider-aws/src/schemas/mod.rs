//! AWS Cloud Control resource schema definitions

pub mod cloudformation_stack;

use terrace_core::schema::{AttributeType, ResourceSchema};

/// AWS Cloud Control schema configuration
///
/// Combines the ResourceSchema with the metadata needed to talk to
/// Cloud Control about the resource.
pub struct AwsSchemaConfig {
    /// AWS CloudFormation type name (e.g., "AWS::CloudFormation::Stack")
    pub aws_type_name: &'static str,
    /// Whether this resource type uses tags
    pub has_tags: bool,
    /// The resource schema with attribute definitions
    pub schema: ResourceSchema,
}

/// Tags type for AWS resources (map of strings)
pub fn tags_type() -> AttributeType {
    AttributeType::string_map()
}

/// Returns the schema configs of every supported resource type
pub fn configs() -> Vec<AwsSchemaConfig> {
    vec![cloudformation_stack::cloudformation_stack_config()]
}

/// Get the AwsSchemaConfig for a resource type (e.g., "aws.cloudformation_stack")
pub fn get_schema_config(resource_type: &str) -> Option<AwsSchemaConfig> {
    configs()
        .into_iter()
        .find(|c| c.schema.resource_type == resource_type)
}

/// Returns all AWS schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    configs().into_iter().map(|c| c.schema).collect()
}
