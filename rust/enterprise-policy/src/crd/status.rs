use serde::{Deserialize, Serialize};
use stackable_operator::{
    k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition,
    schemars::{self, JsonSchema},
};

/// The status of a policy, as reported by the controllers of the resources it attaches to.
///
/// Follows the `PolicyStatus` type of the Gateway API.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    /// One entry for every ancestor resource (usually a Gateway) that the policy is associated with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<PolicyAncestorStatus>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAncestorStatus {
    pub ancestor_ref: ParentReference,

    /// The controller that wrote this status, in the form `example.net/gateway-controller`.
    pub controller_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl PolicyStatus {
    /// The status of the condition of type `type_` for every ancestor that reports it.
    pub fn condition_statuses<'a>(&'a self, type_: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.ancestors.iter().flat_map(move |ancestor| {
            ancestor
                .conditions
                .iter()
                .filter(move |condition| condition.type_ == type_)
                .map(|condition| condition.status.as_str())
        })
    }
}

/// Identifies a parent resource, such as a Gateway or one of its listeners.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}
