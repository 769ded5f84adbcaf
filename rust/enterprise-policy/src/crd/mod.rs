use snafu::{ResultExt, Snafu};
use stackable_operator::{
    k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition,
    kube::CustomResourceExt,
};

use crate::cel::{self, SchemaRules};

pub mod agentgateway_policy;
pub mod parameters;
pub mod status;
pub mod traffic_policy;
pub mod waf_policy;

pub mod v1alpha1 {
    pub use crate::crd::{
        agentgateway_policy::v1alpha1::{
            EnterpriseAgentgatewayPolicy, EnterpriseAgentgatewayPolicySpec,
        },
        parameters::v1alpha1::{
            EnterpriseAgentgatewayParameters, EnterpriseAgentgatewayParametersSpec,
            EnterpriseKgatewayParameters, EnterpriseKgatewayParametersSpec,
        },
        traffic_policy::v1alpha1::{
            EnterpriseKgatewayTrafficPolicy, EnterpriseKgatewayTrafficPolicySpec,
        },
        waf_policy::v1alpha1::{WAFPolicy, WAFPolicySpec},
    };
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to add validation rules to CRD {crd:?}"))]
    AddValidationRules { source: cel::Error, crd: String },
}

/// The CRD of `K`, including the validation rules that the API server enforces.
pub fn crd_with_rules<K>() -> Result<CustomResourceDefinition, Error>
where
    K: CustomResourceExt + SchemaRules,
{
    let mut crd = K::crd();
    cel::apply_patches(&mut crd, &K::schema_patches()).context(AddValidationRulesSnafu {
        crd: K::crd_name(),
    })?;
    Ok(crd)
}

/// All CRDs defined by this crate.
pub fn crds() -> Result<Vec<CustomResourceDefinition>, Error> {
    Ok(vec![
        crd_with_rules::<v1alpha1::EnterpriseAgentgatewayPolicy>()?,
        crd_with_rules::<v1alpha1::EnterpriseKgatewayTrafficPolicy>()?,
        crd_with_rules::<v1alpha1::WAFPolicy>()?,
        crd_with_rules::<v1alpha1::EnterpriseAgentgatewayParameters>()?,
        crd_with_rules::<v1alpha1::EnterpriseKgatewayParameters>()?,
    ])
}

#[cfg(test)]
mod test {
    use serde_json::Value;

    use super::*;

    fn spec_schema(crd: &CustomResourceDefinition) -> Value {
        let crd = serde_json::to_value(crd).unwrap();
        crd.pointer("/spec/versions/0/schema/openAPIV3Schema/properties/spec")
            .cloned()
            .unwrap()
    }

    fn rules(schema: &Value) -> Vec<&str> {
        schema["x-kubernetes-validations"]
            .as_array()
            .map(|rules| rules.iter().filter_map(|rule| rule["rule"].as_str()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_all_rules_apply() {
        let crds = crds().unwrap();
        let names: Vec<_> = crds
            .iter()
            .map(|crd| crd.metadata.name.as_deref().unwrap())
            .collect();
        assert_eq!(
            names,
            [
                "enterpriseagentgatewaypolicies.enterpriseagentgateway.solo.io",
                "enterprisekgatewaytrafficpolicies.enterprisekgateway.solo.io",
                "wafpolicies.waf.solo.io",
                "enterpriseagentgatewayparameters.enterpriseagentgateway.solo.io",
                "enterprisekgatewayparameters.enterprisekgateway.solo.io",
            ]
        );
    }

    #[test]
    fn test_agentgateway_policy_rules() {
        let crd = crd_with_rules::<v1alpha1::EnterpriseAgentgatewayPolicy>().unwrap();
        assert_eq!(crd.spec.names.short_names, Some(vec!["eagpol".to_string()]));
        let spec = spec_schema(&crd);
        let spec_rules = rules(&spec);
        assert!(spec_rules.contains(
            &"[has(self.targetRefs), has(self.targetSelectors)].filter(x, x).size() == 1"
        ));
        assert!(spec_rules.contains(
            &"[has(self.frontend), has(self.traffic), has(self.backend)].filter(x, x).size() >= 1"
        ));

        let target_refs = &spec["properties"]["targetRefs"];
        assert_eq!(target_refs["minItems"], 1);
        assert_eq!(target_refs["maxItems"], 16);
        assert_eq!(rules(target_refs).len(), 2);
    }

    #[test]
    fn test_traffic_policy_nested_rules() {
        let crd = crd_with_rules::<v1alpha1::EnterpriseKgatewayTrafficPolicy>().unwrap();
        let spec = spec_schema(&crd);
        assert_eq!(
            rules(&spec["properties"]["entWAF"]),
            [
                "[has(self.wafPolicyRef), has(self.disable)].filter(x, x).size() == 1",
                "[has(self.wafServer), has(self.disable)].filter(x, x).size() <= 1",
            ]
        );
        let refs = &spec["properties"]["entRateLimit"]["properties"]["global"]["properties"]
            ["rateLimitConfigRefs"];
        assert_eq!(refs["maxItems"], 16);
    }
}
