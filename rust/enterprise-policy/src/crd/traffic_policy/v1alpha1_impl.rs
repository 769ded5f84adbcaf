use kgateway_enterprise_crd_utils::{
    LocalPolicyTargetReferenceWithSectionName, LocalPolicyTargetSelectorWithSectionName,
};

use super::{jwt::jwt_patches, rbac::rbac_patches, transformation::transformation_patches};
use crate::{
    attachment::{AttachablePolicy, TargetKind},
    cel::{self, Constraint, SchemaPatch, SchemaRules},
    crd::traffic_policy::v1alpha1::{
        EnterpriseKgatewayTrafficPolicy, EnterpriseKgatewayTrafficPolicySpec, EntWaf,
        GlobalRateLimit,
    },
    merge::{merge_atomic, merge_fields},
    validation::{targets::validate_target_lists, Bounds, FieldGroup, FieldPath, Validate, Validator},
};

pub const ALLOWED_TARGET_KINDS: &[TargetKind] = &[
    TargetKind::Gateway,
    TargetKind::HttpRoute,
    TargetKind::XListenerSet,
];

const RATE_LIMIT_CONFIG_REFS: Bounds = Bounds::new(1, 16);

impl AttachablePolicy for EnterpriseKgatewayTrafficPolicySpec {
    fn target_refs(&self) -> Option<&[LocalPolicyTargetReferenceWithSectionName]> {
        self.target_refs.as_deref()
    }

    fn target_selectors(&self) -> Option<&[LocalPolicyTargetSelectorWithSectionName]> {
        self.target_selectors.as_deref()
    }

    fn targets_mut(
        &mut self,
    ) -> (
        &mut Option<Vec<LocalPolicyTargetReferenceWithSectionName>>,
        &mut Option<Vec<LocalPolicyTargetSelectorWithSectionName>>,
    ) {
        (&mut self.target_refs, &mut self.target_selectors)
    }
}

impl Validate for EnterpriseKgatewayTrafficPolicySpec {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validate_target_lists(self, path, ALLOWED_TARGET_KINDS, validator);
        validator.group(
            path,
            FieldGroup::ExtAuth,
            &[self.ext_auth.is_some(), self.ent_ext_auth.is_some()],
        );
        validator.group(
            path,
            FieldGroup::RateLimit,
            &[self.rate_limit.is_some(), self.ent_rate_limit.is_some()],
        );
        validator.group(
            path,
            FieldGroup::Transformation,
            &[
                self.transformation.is_some(),
                self.ent_transformation.is_some(),
            ],
        );

        if let Some(rate_limit) = &self.ent_rate_limit {
            rate_limit
                .global
                .validate_at(&path.field("entRateLimit").field("global"), validator);
        }
        if let Some(ext_auth) = &self.ent_ext_auth {
            validator.group(
                &path.field("entExtAuth"),
                FieldGroup::EntExtAuthSource,
                &[ext_auth.auth_config_ref.is_some(), ext_auth.disable.is_some()],
            );
        }
        if let Some(transformation) = &self.ent_transformation {
            transformation.validate_at(&path.field("entTransformation"), validator);
        }
        if let Some(jwt) = &self.ent_jwt {
            jwt.validate_at(&path.field("entJWT"), validator);
        }
        if let Some(rbac) = &self.ent_rbac {
            rbac.validate_at(&path.field("entRBAC"), validator);
        }
        if let Some(waf) = &self.ent_waf {
            waf.validate_at(&path.field("entWAF"), validator);
        }
    }
}

impl Validate for GlobalRateLimit {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validator.items(
            &path.field("rateLimitConfigRefs"),
            self.rate_limit_config_refs.len(),
            RATE_LIMIT_CONFIG_REFS,
        );
    }
}

impl Validate for EntWaf {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validator.group(
            path,
            FieldGroup::WafSource,
            &[self.waf_policy_ref.is_some(), self.disable.is_some()],
        );
        validator.group(
            path,
            FieldGroup::WafServer,
            &[self.waf_server.is_some(), self.disable.is_some()],
        );
    }
}

merge_atomic!(EntWaf);
merge_fields!(EnterpriseKgatewayTrafficPolicySpec {
    target_refs,
    target_selectors,
    ai,
    ext_proc,
    cors,
    csrf,
    header_modifiers,
    auto_host_rewrite,
    buffer,
    timeouts,
    retry,
    rbac,
    ent_jwt,
    ent_rbac,
    ent_waf,
} exclusive {
    (ext_auth, ent_ext_auth),
    (rate_limit, ent_rate_limit),
    (transformation, ent_transformation),
});

impl SchemaRules for EnterpriseKgatewayTrafficPolicy {
    fn schema_patches() -> Vec<SchemaPatch> {
        let mut patches = cel::target_list_patches(ALLOWED_TARGET_KINDS);
        patches.extend([
            SchemaPatch::at(["spec"])
                .group(FieldGroup::ExtAuth)
                .group(FieldGroup::RateLimit)
                .group(FieldGroup::Transformation),
            SchemaPatch::at(["spec", "entRateLimit", "global", "rateLimitConfigRefs"])
                .constraint(Constraint::Items(RATE_LIMIT_CONFIG_REFS)),
            SchemaPatch::at(["spec", "entExtAuth"]).group(FieldGroup::EntExtAuthSource),
            SchemaPatch::at(["spec", "entWAF"])
                .group(FieldGroup::WafSource)
                .group(FieldGroup::WafServer),
        ]);
        patches.extend(jwt_patches(&["spec", "entJWT"]));
        patches.extend(rbac_patches(&["spec", "entRBAC"]));
        patches.extend(transformation_patches(&["spec", "entTransformation"]));
        patches
    }
}

#[cfg(test)]
mod test {
    use kgateway_enterprise_crd_utils::{
        AuthConfigRef, NamespacedObjectReference, PolicyDisable, RawConfig, WafPolicyRef,
    };
    use serde_json::json;

    use super::*;
    use crate::{
        attachment::Precedence,
        crd::traffic_policy::v1alpha1::{EntExtAuth, EntRateLimit, EntRbac, StagedJwt},
        merge::{merge_by_precedence, EffectivePolicy},
        validation::{validate, Rule},
    };

    fn spec_from_yaml(input: &str) -> EnterpriseKgatewayTrafficPolicySpec {
        let deserializer = serde_yaml::Deserializer::from_str(input);
        serde_yaml::with::singleton_map_recursive::deserialize(deserializer).unwrap()
    }

    fn rules(spec: &EnterpriseKgatewayTrafficPolicySpec) -> Vec<Rule> {
        validate(spec).err().map(|v| v.rules()).unwrap_or_default()
    }

    fn on_gateway(content: &str) -> EnterpriseKgatewayTrafficPolicySpec {
        spec_from_yaml(&format!(
            "targetRefs:\n- {{group: gateway.networking.k8s.io, kind: Gateway, name: http}}\n{content}"
        ))
    }

    #[test]
    fn test_valid_policy() {
        let spec = spec_from_yaml(
            r#"
            targetSelectors:
            - group: gateway.networking.x-k8s.io
              kind: XListenerSet
              matchLabels:
                team: payments
            extAuth:
              extensionRef:
                name: open-source-auth
            entRateLimit:
              global:
                rateLimitConfigRefs:
                - name: per-ip
            entTransformation:
              stages:
                early:
                  requests:
                  - requestTransformation:
                      template:
                        headers:
                          x-stage: early
            entJWT:
              afterExtAuth:
                providers:
                  okta:
                    jwks:
                      remote:
                        url: https://okta.example.com/keys
                        backendRef:
                          name: okta
                          port: 443
            entRBAC:
              disable: {}
            entWAF:
              disable: {}
            "#,
        );
        assert_eq!(validate(&spec), Ok(()));
    }

    #[test]
    fn test_target_whitelist() {
        let spec = spec_from_yaml(
            r#"
            targetRefs:
            - {group: agentgateway.dev, kind: AgentgatewayBackend, name: llm}
            timeouts:
              request: 5s
            "#,
        );
        let violations = validate(&spec).unwrap_err();
        assert_eq!(violations.rules(), [Rule::TargetNotAllowed]);
        assert!(violations
            .iter()
            .next()
            .unwrap()
            .message
            .contains("Gateway, HTTPRoute or XListenerSet"));
    }

    #[test]
    fn test_exclusive_fields() {
        let spec = on_gateway(
            r#"
transformation:
  request:
    set: [{name: x-a, value: a}]
entTransformation: {}
rateLimit: {}
entRateLimit:
  global:
    rateLimitConfigRefs: [{name: a}]
            "#,
        );
        let violations = validate(&spec).unwrap_err();
        assert_eq!(violations.rules(), [Rule::ExclusiveFields, Rule::ExclusiveFields]);
        assert!(violations.iter().all(|violation| violation.path == FieldPath::spec()));
    }

    #[test]
    fn test_ent_ext_auth_source() {
        let mut spec = on_gateway("entExtAuth: {}");
        assert_eq!(rules(&spec), [Rule::MissingRequiredField]);

        spec.ent_ext_auth = Some(EntExtAuth {
            auth_config_ref: Some(AuthConfigRef {
                name: "oidc".to_string(),
                namespace: None,
            }),
            disable: Some(PolicyDisable::default()),
            ..EntExtAuth::default()
        });
        assert_eq!(rules(&spec), [Rule::ExclusiveFields]);
    }

    #[test]
    fn test_waf_groups() {
        let mut spec = on_gateway("entWAF: {}");
        assert_eq!(rules(&spec), [Rule::MissingRequiredField]);

        spec.ent_waf = Some(EntWaf {
            waf_policy_ref: None,
            waf_server: Some(NamespacedObjectReference {
                name: "waf".to_string(),
                namespace: None,
            }),
            disable: Some(PolicyDisable::default()),
        });
        let violations = validate(&spec).unwrap_err();
        assert_eq!(violations.rules(), [Rule::ExclusiveFields]);
        assert_eq!(
            violations.iter().next().unwrap().path.to_string(),
            "spec.entWAF"
        );

        spec.ent_waf = Some(EntWaf {
            waf_policy_ref: Some(WafPolicyRef {
                name: "owasp".to_string(),
                namespace: Some("security".to_string()),
            }),
            ..EntWaf::default()
        });
        assert_eq!(validate(&spec), Ok(()));
    }

    #[test]
    fn test_rate_limit_config_refs() {
        let spec = on_gateway("entRateLimit:\n  global:\n    rateLimitConfigRefs: []");
        let violations = validate(&spec).unwrap_err();
        assert_eq!(violations.rules(), [Rule::FieldBounds]);
        assert_eq!(
            violations.iter().next().unwrap().path.to_string(),
            "spec.entRateLimit.global.rateLimitConfigRefs"
        );
    }

    #[test]
    fn test_nested_violations_are_reported() {
        let spec = on_gateway(
            r#"
entJWT: {}
entRBAC:
  policies:
    empty:
      principals: []
            "#,
        );
        assert_eq!(rules(&spec), [Rule::EmptyFieldGroup, Rule::FieldBounds]);
    }

    // Rate limiting from the Gateway, timeouts from a route rule
    #[test]
    fn test_merge_inherits_unrelated_fields() {
        let gateway = on_gateway("rateLimit:\n  local: {tokenBucket: {maxTokens: 10}}");
        let route_rule = spec_from_yaml(
            r#"
            targetRefs:
            - {group: gateway.networking.k8s.io, kind: HTTPRoute, name: api, sectionName: rule-1}
            timeouts:
              request: 30s
            "#,
        );
        let merged = merge_by_precedence([
            (Precedence::RouteRule, route_rule),
            (Precedence::Gateway, gateway),
        ])
        .unwrap();
        assert_eq!(
            merged.rate_limit,
            Some(RawConfig::new(json!({"local": {"tokenBucket": {"maxTokens": 10}}})))
        );
        assert_eq!(merged.timeouts, Some(RawConfig::new(json!({"request": "30s"}))));
        assert_eq!(merged.target_refs, None);
    }

    #[test]
    fn test_merge_exclusive_groups() {
        let gateway = on_gateway(
            "rateLimit: {local: {}}\nextAuth: {extensionRef: {name: basic}}\ncors: {maxAge: 60}",
        );
        let route = on_gateway(
            "entRateLimit:\n  global:\n    rateLimitConfigRefs: [{name: per-user}]\nentExtAuth:\n  disable: {}",
        );
        let merged =
            merge_by_precedence([(Precedence::Gateway, gateway), (Precedence::Route, route)])
                .unwrap();
        // The effective policy has no targets, but never combines exclusive fields
        let violations = validate(&merged).unwrap_err();
        assert_eq!(violations.rules(), [Rule::TargetSelection]);
        assert_eq!(merged.rate_limit, None);
        assert_eq!(merged.ext_auth, None);
        assert!(matches!(
            merged.ent_rate_limit,
            Some(EntRateLimit { ref global }) if global.rate_limit_config_refs[0].name == "per-user"
        ));
        assert_eq!(merged.ent_ext_auth.unwrap().disable, Some(PolicyDisable::default()));
        assert_eq!(merged.cors, Some(RawConfig::new(json!({"maxAge": 60}))));
    }

    #[test]
    fn test_merge_jwt_stages() {
        let gateway = on_gateway(
            r#"
entJWT:
  beforeExtAuth:
    providers:
      corp: {jwks: {local: {key: corp}}}
  afterExtAuth:
    validationPolicy: AllowMissing
            "#,
        );
        let route = on_gateway(
            r#"
entJWT:
  beforeExtAuth:
    providers:
      partner: {jwks: {local: {key: partner}}}
entRBAC:
  disable: {}
            "#,
        );
        let merged =
            merge_by_precedence([(Precedence::Gateway, gateway), (Precedence::Route, route)])
                .unwrap();
        let StagedJwt {
            before_ext_auth,
            after_ext_auth,
        } = merged.ent_jwt.unwrap();
        // A stage is replaced as a whole, so providers from lower levels do not leak through
        let providers = before_ext_auth.unwrap().providers.unwrap();
        assert_eq!(providers.keys().collect::<Vec<_>>(), ["partner"]);
        assert!(after_ext_auth.unwrap().validation_policy.is_some());
        assert_eq!(merged.ent_rbac, Some(EntRbac::Disable(PolicyDisable::default())));
    }

    #[test]
    fn test_incremental_merge_matches_full_merge() {
        let layers = vec![
            (Precedence::Gateway, on_gateway("timeouts: {request: 10s}\ncors: {maxAge: 1}")),
            (Precedence::Listener, on_gateway("timeouts: {idle: 60s}")),
            (Precedence::Route, on_gateway("entWAF: {disable: {}}")),
            (Precedence::Backend, on_gateway("cors: {maxAge: 2}")),
        ];
        let full = EffectivePolicy::from_layers(layers.clone());

        let mut incremental = EffectivePolicy::from_layers(layers[..2].to_vec());
        incremental.extend(layers[2..].to_vec()).unwrap();
        assert_eq!(incremental, full);

        let merged = full.into_policy().unwrap();
        assert_eq!(
            merged.timeouts,
            Some(RawConfig::new(json!({"request": "10s", "idle": "60s"})))
        );
        assert_eq!(merged.cors, Some(RawConfig::new(json!({"maxAge": 2}))));
    }

    #[test]
    fn test_schema_patches_cover_nested_rules() {
        let patches = EnterpriseKgatewayTrafficPolicy::schema_patches();
        let paths: Vec<String> = patches.iter().map(|patch| patch.path.join(".")).collect();
        for expected in [
            "spec.entJWT.beforeExtAuth.providers.{}.clockSkewSeconds",
            "spec.entRBAC.policies.{}.principals",
            "spec.entTransformation.stages.postRouting.responses.[].responseTransformation.template.extractors.{}",
            "spec.entWAF",
        ] {
            assert!(paths.iter().any(|path| path == expected), "missing {expected}");
        }
    }
}
