//! cloudformation_stack schema definition for AWS Cloud Control
//!
//! Based on CloudFormation AWS::CloudFormation::Stack schema:
//! https://docs.aws.amazon.com/AWSCloudFormation/latest/UserGuide/aws-resource-cloudformation-stack.html

use super::AwsSchemaConfig;
use super::tags_type;
use terrace_core::resource::Value;
use terrace_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

pub const RESOURCE_TYPE: &str = "aws.cloudformation_stack";

/// Returns the schema config for cloudformation_stack (AWS::CloudFormation::Stack)
pub fn cloudformation_stack_config() -> AwsSchemaConfig {
    AwsSchemaConfig {
        aws_type_name: "AWS::CloudFormation::Stack",
        has_tags: true,
        schema: ResourceSchema::new(RESOURCE_TYPE)
            .with_description("A CloudFormation stack managed as a single unit")
            .attribute(
                AttributeSchema::new("stack_name", AttributeType::String)
                    .required()
                    .with_description("The name that's associated with the stack")
                    .with_provider_name("StackName"),
            )
            .attribute(
                AttributeSchema::new("template_body", AttributeType::String)
                    .with_description(
                        "Structure containing the template body. Stored as its SHA-1 digest",
                    )
                    .with_provider_name("TemplateBody"),
            )
            .attribute(
                AttributeSchema::new("template_url", AttributeType::String)
                    .with_description("Location of file containing the template body")
                    .with_provider_name("TemplateURL"),
            )
            .attribute(
                AttributeSchema::new("parameters", AttributeType::string_map())
                    .with_description("The set value pairs that represent the parameters passed to CloudFormation")
                    .with_provider_name("Parameters"),
            )
            .attribute(
                AttributeSchema::new("capabilities", AttributeType::string_list())
                    .with_description("Capabilities the template is allowed to use (e.g., CAPABILITY_IAM)")
                    .with_provider_name("Capabilities"),
            )
            .attribute(
                AttributeSchema::new("notification_arns", AttributeType::string_list())
                    .with_description("The Amazon SNS topic ARNs to publish stack related events")
                    .with_provider_name("NotificationARNs"),
            )
            .attribute(
                AttributeSchema::new("disable_rollback", AttributeType::Bool)
                    .with_default(Value::Bool(false))
                    .with_description("Disable rollback of the stack if stack creation failed")
                    .with_provider_name("DisableRollback"),
            )
            .attribute(
                AttributeSchema::new("timeout_in_minutes", AttributeType::Int)
                    .with_description("The length of time, in minutes, that CloudFormation waits for the nested stack to reach the CREATE_COMPLETE state")
                    .with_provider_name("TimeoutInMinutes"),
            )
            .attribute(
                AttributeSchema::new("stack_policy_body", AttributeType::String)
                    .with_description("Structure containing the stack policy body, as JSON")
                    .with_provider_name("StackPolicyBody"),
            )
            .attribute(
                AttributeSchema::new("stack_policy_url", AttributeType::String)
                    .with_description("Location of a file containing the stack policy")
                    .with_provider_name("StackPolicyURL"),
            )
            .attribute(
                AttributeSchema::new("tags", tags_type())
                    .with_description("Key-value pairs to associate with this stack")
                    .with_provider_name("Tags"),
            )
            .attribute(
                AttributeSchema::new("outputs", AttributeType::string_map())
                    .read_only()
                    .with_description("Stack outputs by output key (read-only)")
                    .with_provider_name("Outputs"),
            )
            .attribute(
                AttributeSchema::new("stack_id", AttributeType::String)
                    .read_only()
                    .with_description("Unique identifier of the stack (read-only)")
                    .with_provider_name("StackId"),
            ),
    }
}
