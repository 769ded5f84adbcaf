use crate::{
    cel::{Constraint, SchemaPatch, SchemaRules, ITEMS},
    crd::waf_policy::v1alpha1::{DirectiveSource, WAFPolicy, WAFPolicySpec},
    validation::{Bounds, FieldGroup, FieldPath, Validate, Validator},
};

const CUSTOM_DIRECTIVES: Bounds = Bounds::new(1, 16);

impl Validate for WAFPolicySpec {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        if let Some(core_rule_set) = &self.core_rule_set {
            core_rule_set
                .settings
                .validate_at(&path.field("coreRuleSet").field("settings"), validator);
        }
        self.rule_engine_settings
            .validate_at(&path.field("ruleEngineSettings"), validator);
        if let Some(directives) = &self.custom_directives {
            let directives_path = path.field("customDirectives");
            validator.items(&directives_path, directives.len(), CUSTOM_DIRECTIVES);
            for (i, directive) in directives.iter().enumerate() {
                directive.validate_at(&directives_path.index(i), validator);
            }
        }
    }
}

impl Validate for DirectiveSource {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validator.group(path, FieldGroup::DirectiveSource, &[self.inline.is_some()]);
    }
}

impl SchemaRules for WAFPolicy {
    fn schema_patches() -> Vec<SchemaPatch> {
        vec![
            SchemaPatch::at(["spec", "coreRuleSet", "settings"]).group(FieldGroup::DirectiveSource),
            SchemaPatch::at(["spec", "ruleEngineSettings"]).group(FieldGroup::DirectiveSource),
            SchemaPatch::at(["spec", "customDirectives"])
                .constraint(Constraint::Items(CUSTOM_DIRECTIVES)),
            SchemaPatch::at(["spec", "customDirectives", ITEMS]).group(FieldGroup::DirectiveSource),
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::validation::{validate, Rule};

    #[test]
    fn test_valid_policy() {
        let policy: WAFPolicy = serde_yaml::from_str(
            r#"
            apiVersion: waf.solo.io/v1alpha1
            kind: WAFPolicy
            metadata:
              name: owasp
              namespace: security
            spec:
              coreRuleSet:
                settings:
                  inline: 'SecAction "id:900000,phase:1,pass,t:none,nolog,setvar:tx.blocking_paranoia_level=1"'
              ruleEngineSettings:
                inline: SecRuleEngine On
              customDirectives:
              - inline: SecRuleRemoveById 920350
            "#,
        )
        .unwrap();
        assert_eq!(validate(&policy.spec), Ok(()));
    }

    #[test]
    fn test_directive_source_required() {
        let spec: WAFPolicySpec = serde_yaml::from_str(
            r#"
            ruleEngineSettings: {}
            customDirectives: []
            "#,
        )
        .unwrap();
        let violations = validate(&spec).unwrap_err();
        assert_eq!(
            violations.rules(),
            [Rule::MissingRequiredField, Rule::FieldBounds]
        );
        assert_eq!(
            violations.iter().next().unwrap().path.to_string(),
            "spec.ruleEngineSettings"
        );
    }

    #[test]
    fn test_custom_directive_limit() {
        let spec = WAFPolicySpec {
            core_rule_set: None,
            rule_engine_settings: DirectiveSource {
                inline: Some("SecRuleEngine DetectionOnly".to_string()),
            },
            custom_directives: Some(vec![DirectiveSource::default(); 17]),
        };
        let violations = validate(&spec).unwrap_err();
        // The list itself, and every empty entry in it
        assert_eq!(violations.len(), 18);
        assert_eq!(violations.rules()[0], Rule::FieldBounds);
        assert_eq!(
            violations.iter().last().unwrap().path.to_string(),
            "spec.customDirectives[16]"
        );
    }
}
