//! Resource type definitions for AWS Cloud Control API

use terrace_core::provider::ResourceType;
use terrace_core::schema::ResourceSchema;

use crate::schemas::cloudformation_stack::{RESOURCE_TYPE, cloudformation_stack_config};

/// `aws.cloudformation_stack`
///
/// Its state layout never changed, so it keeps the default migrator.
pub struct CloudFormationStackType;

impl ResourceType for CloudFormationStackType {
    fn name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        cloudformation_stack_config().schema
    }
}

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(CloudFormationStackType)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_types_match_schemas() {
        for resource_type in resource_types() {
            assert_eq!(resource_type.schema().resource_type, resource_type.name());
        }
    }

    #[test]
    fn test_stack_migrator_is_current_only() {
        let migrator = CloudFormationStackType.migrator().unwrap();
        assert_eq!(migrator.current_version(), 0);
        assert!(migrator.supports(0));
        assert!(!migrator.supports(1));
    }
}
