use serde::{Deserialize, Serialize};
use stackable_operator::{
    kube::CustomResource,
    schemars::{self, JsonSchema},
};

pub mod jwt;
pub mod rbac;
pub mod transformation;
mod v1alpha1_impl;

pub use v1alpha1_impl::ALLOWED_TARGET_KINDS;

pub mod v1alpha1 {
    use kgateway_enterprise_crd_utils::{
        AuthConfigRef, LocalPolicyTargetReferenceWithSectionName,
        LocalPolicyTargetSelectorWithSectionName, NamespacedObjectReference, PolicyDisable,
        RateLimitConfigRef, RawConfig, WafPolicyRef,
    };

    use super::*;
    pub use super::{jwt::*, rbac::*, transformation::*};
    use crate::crd::status::PolicyStatus;

    /// Configures the enterprise features of kgateway for the resources it targets.
    ///
    /// The open source fields are carried through as they are. Each of `extAuth`, `rateLimit` and
    /// `transformation` is mutually exclusive with its enterprise counterpart.
    #[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[kube(
        group = "enterprisekgateway.solo.io",
        version = "v1alpha1",
        kind = "EnterpriseKgatewayTrafficPolicy",
        plural = "enterprisekgatewaytrafficpolicies",
        shortname = "ekgtp",
        category = "enterprisekgateway",
        category = "ekgw",
        namespaced,
        status = "PolicyStatus",
        printcolumn = r#"{"name":"Accepted", "type":"string", "jsonPath":".status.ancestors[*].conditions[?(@.type=='Accepted')].status", "description":"Policy acceptance status"}"#,
        printcolumn = r#"{"name":"Attached", "type":"string", "jsonPath":".status.ancestors[*].conditions[?(@.type=='Attached')].status", "description":"Policy attachment status"}"#,
        crates(
            kube_core = "stackable_operator::kube::core",
            k8s_openapi = "stackable_operator::k8s_openapi",
            schemars = "stackable_operator::schemars"
        )
    )]
    #[serde(rename_all = "camelCase")]
    pub struct EnterpriseKgatewayTrafficPolicySpec {
        /// The resources that this policy attaches to. Mutually exclusive with `targetSelectors`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub target_refs: Option<Vec<LocalPolicyTargetReferenceWithSectionName>>,

        /// Selects the resources that this policy attaches to by label. Mutually exclusive with `targetRefs`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub target_selectors: Option<Vec<LocalPolicyTargetSelectorWithSectionName>>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ai: Option<RawConfig>,

        /// Open source transformations. Mutually exclusive with `entTransformation`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub transformation: Option<RawConfig>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ext_proc: Option<RawConfig>,

        /// Open source external authorization. Mutually exclusive with `entExtAuth`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ext_auth: Option<RawConfig>,

        /// Open source rate limiting. Mutually exclusive with `entRateLimit`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub rate_limit: Option<RawConfig>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub cors: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub csrf: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub header_modifiers: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub auto_host_rewrite: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub buffer: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub timeouts: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub retry: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub rbac: Option<RawConfig>,

        /// Enterprise rate limiting, backed by RateLimitConfig resources.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ent_rate_limit: Option<EntRateLimit>,

        /// Enterprise external authorization, backed by an AuthConfig resource.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ent_ext_auth: Option<EntExtAuth>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ent_transformation: Option<EntTransformation>,

        #[serde(
            rename = "entJWT",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        pub ent_jwt: Option<StagedJwt>,

        /// Role based access control on the claims of validated JWTs.
        #[serde(
            rename = "entRBAC",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        pub ent_rbac: Option<EntRbac>,

        /// Web application firewall.
        #[serde(
            rename = "entWAF",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        pub ent_waf: Option<EntWaf>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct EntRateLimit {
        pub global: GlobalRateLimit,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct GlobalRateLimit {
        /// The GatewayExtension of the rate limit server. Defaults to the shared rate limiter extension.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub extension_ref: Option<NamespacedObjectReference>,

        /// Between 1 and 16 RateLimitConfigs whose limits are applied.
        pub rate_limit_config_refs: Vec<RateLimitConfigRef>,
    }

    /// Exactly one of `authConfigRef` and `disable` must be set.
    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct EntExtAuth {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub auth_config_ref: Option<AuthConfigRef>,

        /// The GatewayExtension of the external auth server. Defaults to the shared ext-auth extension.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub extension_ref: Option<NamespacedObjectReference>,

        /// Disables external auth that was configured at a less specific attachment level.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub disable: Option<PolicyDisable>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct EntWaf {
        /// Exactly one of `wafPolicyRef` and `disable` must be set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub waf_policy_ref: Option<WafPolicyRef>,

        /// The GatewayExtension that runs the WAF. Cannot be combined with `disable`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub waf_server: Option<NamespacedObjectReference>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub disable: Option<PolicyDisable>,
    }
}

#[cfg(test)]
mod test {
    use super::v1alpha1::*;

    #[test]
    fn test_deserialization() {
        let input: &str = r#"
        apiVersion: enterprisekgateway.solo.io/v1alpha1
        kind: EnterpriseKgatewayTrafficPolicy
        metadata:
          name: secured
          namespace: apps
        spec:
          targetRefs:
          - group: gateway.networking.k8s.io
            kind: HTTPRoute
            name: api
            sectionName: admin
          entExtAuth:
            authConfigRef:
              name: oidc
              namespace: auth
          entJWT:
            beforeExtAuth:
              providers:
                local:
                  jwks:
                    local:
                      key: "-----BEGIN PUBLIC KEY-----"
          entRBAC:
            policies:
              admins:
                principals:
                - jwtPrincipal:
                    claims:
                      role: admin
          entWAF:
            wafPolicyRef:
              name: owasp
          autoHostRewrite: true
        "#;
        let deserializer = serde_yaml::Deserializer::from_str(input);
        let policy: EnterpriseKgatewayTrafficPolicy =
            serde_yaml::with::singleton_map_recursive::deserialize(deserializer).unwrap();

        let spec = policy.spec;
        assert_eq!(
            spec.ent_ext_auth.unwrap().auth_config_ref.unwrap().to_string(),
            "oidc.auth"
        );
        assert!(spec.ent_jwt.unwrap().before_ext_auth.is_some());
        let Some(EntRbac::Policies(policies)) = spec.ent_rbac else {
            panic!("expected RBAC policies");
        };
        assert_eq!(policies["admins"].principals.len(), 1);
        assert_eq!(spec.ent_waf.unwrap().waf_policy_ref.unwrap().name, "owasp");
        assert_eq!(spec.auto_host_rewrite, Some(true));
        assert_eq!(
            spec.target_refs.unwrap()[0].section_name.as_deref(),
            Some("admin")
        );
    }
}
