use serde::{Deserialize, Serialize};
use stackable_operator::{
    kube::CustomResource,
    schemars::{self, JsonSchema},
};

mod v1alpha1_impl;

pub use v1alpha1_impl::{
    ALLOWED_TARGET_KINDS, FRONTEND_TARGET_KINDS, PRE_ROUTING_TARGET_KINDS, TRAFFIC_TARGET_KINDS,
};

pub mod v1alpha1 {
    use kgateway_enterprise_crd_utils::{
        AuthConfigRef, BackendObjectReference, LocalPolicyTargetReferenceWithSectionName,
        LocalPolicyTargetSelectorWithSectionName, RateLimitConfigRef, RawConfig,
    };

    use super::*;
    use crate::crd::status::PolicyStatus;

    /// Configures the enterprise features of agentgateway for the resources it targets.
    ///
    /// Policies attached to more specific resources (such as an HTTPRoute rule) are merged field by
    /// field onto policies attached to less specific ones (such as the Gateway).
    #[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[kube(
        group = "enterpriseagentgateway.solo.io",
        version = "v1alpha1",
        kind = "EnterpriseAgentgatewayPolicy",
        plural = "enterpriseagentgatewaypolicies",
        shortname = "eagpol",
        category = "enterpriseagentgateway",
        category = "eagw",
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
    pub struct EnterpriseAgentgatewayPolicySpec {
        /// The resources that this policy attaches to. Mutually exclusive with `targetSelectors`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub target_refs: Option<Vec<LocalPolicyTargetReferenceWithSectionName>>,

        /// Selects the resources that this policy attaches to by label. Mutually exclusive with `targetRefs`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub target_selectors: Option<Vec<LocalPolicyTargetSelectorWithSectionName>>,

        /// Settings for how the Gateway accepts connections. Can only target a whole Gateway.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub frontend: Option<Frontend>,

        /// Settings for how traffic is processed before it is sent to a backend.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub traffic: Option<Traffic>,

        /// Settings for how requests are sent to backends.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub backend: Option<Backend>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct Frontend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tcp: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tls: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub http: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub access_log: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tracing: Option<RawConfig>,
    }

    /// The point in request processing at which traffic policies apply.
    #[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, strum::Display)]
    pub enum TrafficPhase {
        /// Before a route has been selected. Only valid for Gateway and XListenerSet targets.
        PreRouting,
        PostRouting,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct Traffic {
        /// Defaults to `PostRouting`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub phase: Option<TrafficPhase>,

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
        pub host_rewrite: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub timeouts: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub retry: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub authorization: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub jwt_authentication: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub basic_authentication: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub api_key_authentication: Option<RawConfig>,

        /// Enterprise rate limiting, backed by RateLimitConfig resources.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ent_rate_limit: Option<AgwRateLimit>,

        /// Enterprise external authorization, backed by an AuthConfig resource.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ent_ext_auth: Option<AgwExtAuth>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct AgwRateLimit {
        pub global: AgwGlobalRateLimit,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct AgwGlobalRateLimit {
        /// The rate limit domain. At most 256 characters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub domain: Option<String>,

        /// The rate limit server. Defaults to the shared rate limiter extension.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub backend_ref: Option<BackendObjectReference>,

        /// Between 1 and 16 RateLimitConfigs whose limits are applied.
        pub rate_limit_config_refs: Vec<RateLimitConfigRef>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct AgwExtAuth {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub auth_config_ref: Option<AuthConfigRef>,

        /// The external auth server. Defaults to the shared ext-auth extension.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub backend_ref: Option<BackendObjectReference>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct Backend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tcp: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tls: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub http: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub auth: Option<RawConfig>,

        /// AI backend settings. Cannot be used when targeting a Service.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ai: Option<RawConfig>,

        /// MCP backend settings. Cannot be used when targeting a Service.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub mcp: Option<RawConfig>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub token_exchange: Option<TokenExchange>,
    }

    #[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
    pub enum TokenExchangeMode {
        /// Only prompt the user for consent, never exchange tokens.
        ElicitationOnly,
        ExchangeOnly,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct TokenExchange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub mode: Option<TokenExchangeMode>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub oidc: Option<TokenExchangeOidc>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct TokenExchangeOidc {
        /// The Secret holding the OIDC client credentials.
        pub secret_name: String,
    }
}
