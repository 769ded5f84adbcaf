use serde::{Deserialize, Serialize};
use stackable_operator::{
    kube::CustomResource,
    schemars::{self, JsonSchema},
};

mod v1alpha1_impl;

pub mod v1alpha1 {
    use super::*;
    use crate::crd::status::PolicyStatus;

    /// Web Application Firewall configuration that routes opt into through `entWAF`.
    ///
    /// The configuration is consumed by the external processing server that WAF-enabled traffic passes
    /// through. With the bundled server, all directives must be supported by the Coraza WAF engine.
    #[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
    #[kube(
        group = "waf.solo.io",
        version = "v1alpha1",
        kind = "WAFPolicy",
        plural = "wafpolicies",
        shortname = "wafpol",
        category = "enterprise",
        namespaced,
        status = "PolicyStatus",
        crates(
            kube_core = "stackable_operator::kube::core",
            k8s_openapi = "stackable_operator::k8s_openapi",
            schemars = "stackable_operator::schemars"
        )
    )]
    #[serde(rename_all = "camelCase")]
    pub struct WAFPolicySpec {
        /// Loads the OWASP CoreRuleSet (v4) with these settings.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub core_rule_set: Option<CoreRuleSet>,

        /// Settings of the WAF rule engine.
        pub rule_engine_settings: DirectiveSource,

        /// Applied after the CoreRuleSet and the rule engine settings, for example to exclude
        /// CoreRuleSet rules or to add custom ones. Between 1 and 16 entries.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub custom_directives: Option<Vec<DirectiveSource>>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct CoreRuleSet {
        pub settings: DirectiveSource,
    }

    /// Directives (rules or settings) for the WAF engine. Exactly one source must be set.
    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct DirectiveSource {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub inline: Option<String>,
    }
}
