//! EBS volume encryption rules.

use super::{ModuleScope, Results, Rule, RuleDescriptor};
use crate::model::Block;
use crate::types::Severity;

const DEFAULT_KEY_PREFIX: &str = "alias/aws/";

static DESCRIPTOR: RuleDescriptor = RuleDescriptor {
    id: "aws-ebs-encryption-customer-key",
    provider: "aws",
    service: "ebs",
    summary: "EBS volume encryption should use Customer Managed Keys",
    impact: "Using AWS managed keys does not allow for fine grained control",
    resolution: "Enable encryption using customer managed keys",
    severity: Severity::Low,
    required_types: &["resource"],
    required_labels: &["aws_ebs_volume"],
    links: &["https://registry.terraform.io/providers/hashicorp/aws/latest/docs/resources/ebs_volume#kms_key_id"],
    good_examples: &[r#"
resource "aws_kms_key" "ebs_encryption" {
  enable_key_rotation = true
}

resource "aws_ebs_volume" "example" {
  availability_zone = "us-west-2a"
  size              = 40

  kms_key_id = aws_kms_key.ebs_encryption.arn

  tags = {
    Name = "HelloWorld"
  }
}
"#],
    bad_examples: &[r#"
resource "aws_ebs_volume" "example" {
  availability_zone = "us-west-2a"
  size              = 40

  tags = {
    Name = "HelloWorld"
  }
}
"#],
};

/// EBS volumes must be encrypted with a customer managed KMS key.
///
/// Flags volumes without `kms_key_id`, and volumes whose key reference
/// resolves to a block with a `key_id` under the AWS managed `alias/aws/`
/// namespace. When the reference cannot be resolved the volume is not
/// flagged.
#[derive(Debug, Default)]
pub struct EbsEncryptionCustomerKey;

impl EbsEncryptionCustomerKey {
    /// Create the rule.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Rule for EbsEncryptionCustomerKey {
    fn descriptor(&self) -> &RuleDescriptor {
        &DESCRIPTOR
    }

    fn check(&self, block: &Block, scope: &ModuleScope<'_>) -> Results {
        let mut results = Results::default();

        let Some(kms_key_id) = block.get_attribute("kms_key_id") else {
            results.add("Resource does not use CMK", block);
            return results;
        };

        let targets = match scope.resolve_reference(kms_key_id, block) {
            Ok(targets) => targets,
            Err(e) => {
                tracing::trace!(resource = %block.qualified_address(), error = %e, "Key reference not resolved");
                return results;
            }
        };

        for target in targets {
            let Some(key_id) = target.get_attribute("key_id") else {
                continue;
            };
            let value = scope.value(target, "key_id");
            if !value.is_nil() && value.starts_with(DEFAULT_KEY_PREFIX) {
                results.add("Resource explicitly uses the default CMK", key_id);
            }
        }
        results
    }
}
