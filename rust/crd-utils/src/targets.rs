use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stackable_operator::schemars::{self, JsonSchema};

/// Common view over the two ways a policy can select the resources it attaches to.
pub trait PolicyTarget {
    fn group(&self) -> &str;
    fn kind(&self) -> &str;
    fn section_name(&self) -> Option<&str>;
}

/// Identifies an API object within the policy's namespace, optionally narrowed to a section
/// (such as a Gateway listener or an HTTPRoute rule).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalPolicyTargetReferenceWithSectionName {
    /// The API group of the target resource. The core API group is the empty string.
    pub group: String,

    /// The kind of the target resource.
    pub kind: String,

    /// The name of the target resource.
    pub name: String,

    /// The section of the target resource, such as a listener name.
    ///
    /// When unspecified, the policy targets the entire resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

/// Selects API objects within the policy's namespace by label.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalPolicyTargetSelectorWithSectionName {
    /// The API group of the target resources. The core API group is the empty string.
    pub group: String,

    /// The kind of the target resources.
    pub kind: String,

    /// Labels that a target resource must carry to be selected.
    pub match_labels: BTreeMap<String, String>,

    /// The section of the selected resources, such as a listener name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl PolicyTarget for LocalPolicyTargetReferenceWithSectionName {
    fn group(&self) -> &str {
        &self.group
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn section_name(&self) -> Option<&str> {
        self.section_name.as_deref()
    }
}

impl PolicyTarget for LocalPolicyTargetSelectorWithSectionName {
    fn group(&self) -> &str {
        &self.group
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn section_name(&self) -> Option<&str> {
        self.section_name.as_deref()
    }
}
