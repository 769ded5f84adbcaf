use strum::IntoEnumIterator;

use crate::{
    cel::{Constraint, SchemaPatch, SchemaRules},
    crd::parameters::v1alpha1::{
        AgentgatewayExtensions, DeploymentConfiguration, EnterpriseAgentgatewayParameters,
        EnterpriseAgentgatewayParametersSpec, EnterpriseKgatewayParameters,
        EnterpriseKgatewayParametersSpec, ExtensionDeployment, Extensions,
    },
    extensions::{ExtensionKind, SharedExtensions},
    validation::{FieldPath, Validate, Validator},
};

impl AgentgatewayExtensions {
    pub fn get(&self, kind: ExtensionKind) -> Option<&ExtensionDeployment> {
        match kind {
            ExtensionKind::ExtAuth => self.ext_auth.as_ref(),
            ExtensionKind::RateLimiter => self.rate_limiter.as_ref(),
            ExtensionKind::ExtCache => self.ext_cache.as_ref(),
        }
    }
}

impl Extensions {
    pub fn get(&self, kind: ExtensionKind) -> Option<&DeploymentConfiguration> {
        match kind {
            ExtensionKind::ExtAuth => self.ext_auth.as_ref(),
            ExtensionKind::RateLimiter => self.rate_limiter.as_ref(),
            ExtensionKind::ExtCache => self.ext_cache.as_ref(),
        }
    }
}

impl SharedExtensions for EnterpriseAgentgatewayParametersSpec {
    fn is_enabled(&self, kind: ExtensionKind) -> bool {
        self.shared_extensions
            .as_ref()
            .and_then(|extensions| extensions.get(kind))
            .and_then(|extension| extension.enabled)
            .unwrap_or(false)
    }
}

impl SharedExtensions for EnterpriseKgatewayParametersSpec {
    fn is_enabled(&self, kind: ExtensionKind) -> bool {
        self.kube
            .as_ref()
            .and_then(|kube| kube.shared_extensions.as_ref())
            .and_then(|extensions| extensions.get(kind))
            .and_then(|extension| extension.enabled)
            .unwrap_or(false)
    }
}

// The schema covers everything
impl Validate for EnterpriseAgentgatewayParametersSpec {
    fn validate_at(&self, _path: &FieldPath, _validator: &mut Validator) {}
}

impl Validate for EnterpriseKgatewayParametersSpec {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        let Some(extensions) = self
            .kube
            .as_ref()
            .and_then(|kube| kube.shared_extensions.as_ref())
        else {
            return;
        };
        let extensions_path = path.field("kube").field("sharedExtensions");
        for kind in ExtensionKind::iter() {
            if let Some(replicas) = extensions.get(kind).and_then(|extension| extension.replicas) {
                validator.minimum(
                    &extensions_path.field(kind.field_name()).field("replicas"),
                    replicas.into(),
                    0,
                );
            }
        }
    }
}

impl SchemaRules for EnterpriseAgentgatewayParameters {
    fn schema_patches() -> Vec<SchemaPatch> {
        Vec::new()
    }
}

impl SchemaRules for EnterpriseKgatewayParameters {
    fn schema_patches() -> Vec<SchemaPatch> {
        ExtensionKind::iter()
            .map(|kind| {
                SchemaPatch::at(["spec", "kube", "sharedExtensions", kind.field_name(), "replicas"])
                    .constraint(Constraint::Minimum(0))
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        extensions::plan,
        validation::{validate, Rule},
    };

    #[test]
    fn test_agentgateway_parameters() {
        let parameters: EnterpriseAgentgatewayParameters = serde_yaml::from_str(
            r#"
            apiVersion: enterpriseagentgateway.solo.io/v1alpha1
            kind: EnterpriseAgentgatewayParameters
            metadata:
              name: agentgateway
              namespace: gateways
            spec:
              istioClusterId: east
              sharedExtensions:
                extauth:
                  enabled: true
                  image:
                    repository: ext-auth-service
                    tag: 2.0.0
                  env:
                  - name: LOG_LEVEL
                    value: debug
                ratelimiter:
                  enabled: false
                extCache: {}
            "#,
        )
        .unwrap();
        let spec = &parameters.spec;
        assert_eq!(validate(spec), Ok(()));
        assert_eq!(
            spec.enabled_extensions(),
            BTreeSet::from([ExtensionKind::ExtAuth])
        );
        assert_eq!(
            spec.shared_extensions.as_ref().unwrap().ext_auth.as_ref().unwrap().env[0].name,
            "LOG_LEVEL"
        );
    }

    // Disabling an extension removes it, even though policies may still use it
    #[test]
    fn test_disabling_extension_collects_it() {
        let mut spec: EnterpriseKgatewayParametersSpec = serde_yaml::from_str(
            r#"
            kube:
              sharedExtensions:
                extauth:
                  enabled: true
                  replicas: 2
                ratelimiter:
                  enabled: true
            "#,
        )
        .unwrap();
        let deployed = plan(&BTreeSet::new(), &spec).provision;
        assert_eq!(
            deployed,
            BTreeSet::from([ExtensionKind::ExtAuth, ExtensionKind::RateLimiter])
        );

        let extensions = spec
            .kube
            .as_mut()
            .and_then(|kube| kube.shared_extensions.as_mut())
            .unwrap();
        extensions.rate_limiter.as_mut().unwrap().enabled = Some(false);
        extensions.ext_auth = None;
        let plan = plan(&deployed, &spec);
        assert!(plan.provision.is_empty());
        assert_eq!(plan.garbage_collect, deployed);
    }

    #[test]
    fn test_negative_replicas() {
        let spec: EnterpriseKgatewayParametersSpec = serde_yaml::from_str(
            r#"
            kube:
              sharedExtensions:
                extCache:
                  replicas: -1
            "#,
        )
        .unwrap();
        let violations = validate(&spec).unwrap_err();
        assert_eq!(violations.rules(), [Rule::FieldBounds]);
        assert_eq!(
            violations.iter().next().unwrap().path.to_string(),
            "spec.kube.sharedExtensions.extCache.replicas"
        );
    }
}
