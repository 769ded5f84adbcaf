use serde::{Deserialize, Serialize};
use stackable_operator::{
    k8s_openapi::api::{
        apps::v1::DeploymentStrategy,
        core::v1::{EnvVar, ResourceRequirements, SecurityContext},
    },
    kube::CustomResource,
    schemars::{self, JsonSchema},
};

mod v1alpha1_impl;

pub mod v1alpha1 {
    use kgateway_enterprise_crd_utils::RawConfig;

    use super::*;

    /// Configures how the agentgateway data plane is provisioned, including the enterprise
    /// extensions that are shared by all Gateways of a GatewayClass.
    #[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[kube(
        group = "enterpriseagentgateway.solo.io",
        version = "v1alpha1",
        kind = "EnterpriseAgentgatewayParameters",
        plural = "enterpriseagentgatewayparameters",
        shortname = "eagpar",
        category = "enterpriseagentgateway",
        category = "eagw",
        namespaced,
        status = "ParametersStatus",
        crates(
            kube_core = "stackable_operator::kube::core",
            k8s_openapi = "stackable_operator::k8s_openapi",
            schemars = "stackable_operator::schemars"
        )
    )]
    #[serde(rename_all = "camelCase")]
    pub struct EnterpriseAgentgatewayParametersSpec {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub shared_extensions: Option<AgentgatewayExtensions>,

        /// The certificate authority used for the Istio integration.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ca: Option<Ca>,

        /// The ID of the cluster that Istiod runs in. Defaults to `Kubernetes`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub istio_cluster_id: Option<String>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct AgentgatewayExtensions {
        #[serde(rename = "extauth", default, skip_serializing_if = "Option::is_none")]
        pub ext_auth: Option<ExtensionDeployment>,

        #[serde(rename = "ratelimiter", default, skip_serializing_if = "Option::is_none")]
        pub rate_limiter: Option<ExtensionDeployment>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ext_cache: Option<ExtensionDeployment>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct ExtensionDeployment {
        /// Deploys the extension. Disabling a previously enabled extension removes its resources,
        /// even if policies still refer to it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub enabled: Option<bool>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub image: Option<Image>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub resources: Option<ResourceRequirements>,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        pub env: Vec<EnvVar>,

        /// Overrides for the generated Deployment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub deployment: Option<RawConfig>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub service: Option<RawConfig>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub service_account: Option<RawConfig>,

        /// Creates a PodDisruptionBudget for the extension, with these overrides.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub pod_disruption_budget: Option<RawConfig>,

        /// Creates a HorizontalPodAutoscaler for the extension, with these overrides.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub horizontal_pod_autoscaler: Option<RawConfig>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct Ca {
        /// Defaults to `https://istiod.istio-system.svc:15012`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub address: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub trust_domain: Option<String>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub registry: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub repository: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tag: Option<String>,

        /// Takes precedence over `tag`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub digest: Option<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub pull_policy: Option<String>,
    }

    /// Not reported yet.
    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
    pub struct ParametersStatus {}

    /// Configures how the kgateway (Envoy) data plane is provisioned, including the enterprise
    /// extensions that are shared by all Gateways of a GatewayClass.
    #[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[kube(
        group = "enterprisekgateway.solo.io",
        version = "v1alpha1",
        kind = "EnterpriseKgatewayParameters",
        plural = "enterprisekgatewayparameters",
        category = "enterprisekgateway",
        category = "ekgw",
        namespaced,
        status = "ParametersStatus",
        crates(
            kube_core = "stackable_operator::kube::core",
            k8s_openapi = "stackable_operator::k8s_openapi",
            schemars = "stackable_operator::schemars"
        )
    )]
    #[serde(rename_all = "camelCase")]
    pub struct EnterpriseKgatewayParametersSpec {
        /// Kubernetes configuration of the proxy.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub kube: Option<KubernetesProxyConfig>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct KubernetesProxyConfig {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub deployment: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub envoy_container: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub sds_container: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub pod_template: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub service: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub service_account: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub istio: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub stats: Option<RawConfig>,

        /// Leaves the `securityContext` of generated workloads to the platform, such as OpenShift.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub omit_default_security_context: Option<bool>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub shared_extensions: Option<Extensions>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct Extensions {
        #[serde(rename = "extauth", default, skip_serializing_if = "Option::is_none")]
        pub ext_auth: Option<DeploymentConfiguration>,

        #[serde(rename = "ratelimiter", default, skip_serializing_if = "Option::is_none")]
        pub rate_limiter: Option<DeploymentConfiguration>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub ext_cache: Option<DeploymentConfiguration>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct DeploymentConfiguration {
        /// Deploys the extension. Disabling a previously enabled extension removes its resources,
        /// even if other configuration still depends on it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub enabled: Option<bool>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub resources: Option<ResourceRequirements>,

        #[serde(rename = "pod", default, skip_serializing_if = "Option::is_none")]
        pub pod_template: Option<RawConfig>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub container: Option<ContainerConfiguration>,

        /// Left to the control plane (usually 1) if not set. Leave unset when using an autoscaler.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub replicas: Option<i32>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub strategy: Option<DeploymentStrategy>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub deployment_overlay: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub service_overlay: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub service_account_overlay: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub pod_disruption_budget: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub horizontal_pod_autoscaler: Option<RawConfig>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub vertical_pod_autoscaler: Option<RawConfig>,
    }

    #[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub struct ContainerConfiguration {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub image: Option<Image>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub security_context: Option<SecurityContext>,
    }
}
