use std::collections::BTreeMap;

use kgateway_enterprise_crd_utils::PolicyDisable;
use serde::{Deserialize, Serialize};
use stackable_operator::schemars::{self, JsonSchema};

use crate::{
    cel::{Constraint, SchemaPatch, ITEMS, VALUES},
    merge::merge_atomic,
    validation::{Bounds, FieldGroup, FieldPath, Validate, Validator},
};

const PRINCIPALS: Bounds = Bounds::at_least(1);
const NON_EMPTY: Bounds = Bounds::at_least(1);

/// Role based access control, evaluated against the claims of validated JWTs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum EntRbac {
    /// Disables RBAC that was configured at a less specific attachment level.
    Disable(PolicyDisable),

    /// Named policies. A request is allowed if any of them allows it.
    Policies(BTreeMap<String, RbacPolicy>),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RbacPolicy {
    /// A request must match all of these principals. At least one is required.
    pub principals: Vec<RbacPrincipal>,

    /// What the principals may do. If not set, they may do anything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<RbacPermissions>,

    /// Separates the path segments of nested claims, such as `.` in `org.team`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_claim_delimiter: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RbacPrincipal {
    pub jwt_principal: JwtPrincipal,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JwtPrincipal {
    /// Claims that the token must carry, by claim name.
    pub claims: BTreeMap<String, String>,

    /// Only consider tokens validated by this JWT provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Defaults to `ExactString`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<ClaimMatcher>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ClaimMatcher {
    ExactString,
    Boolean,
    /// The claim is a list that contains the value.
    ListContains,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RbacPermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,

    /// HTTP methods. All methods are allowed if empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

impl Validate for EntRbac {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        let EntRbac::Policies(policies) = self else {
            return;
        };
        let policies_path = path.field("policies");
        for (name, policy) in policies {
            policy.validate_at(&policies_path.key(name), validator);
        }
    }
}

impl Validate for RbacPolicy {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        let principals_path = path.field("principals");
        validator.items(&principals_path, self.principals.len(), PRINCIPALS);
        for (i, principal) in self.principals.iter().enumerate() {
            if let Some(provider) = &principal.jwt_principal.provider {
                validator.length(
                    &principals_path.index(i).field("jwtPrincipal").field("provider"),
                    provider,
                    NON_EMPTY,
                );
            }
        }
        if let Some(path_prefix) = self
            .permissions
            .as_ref()
            .and_then(|permissions| permissions.path_prefix.as_ref())
        {
            validator.length(
                &path.field("permissions").field("pathPrefix"),
                path_prefix,
                NON_EMPTY,
            );
        }
    }
}

merge_atomic!(EntRbac);

pub(super) fn rbac_patches(base: &[&str]) -> Vec<SchemaPatch> {
    let policy: Vec<&str> = base.iter().copied().chain(["policies", VALUES]).collect();
    vec![
        SchemaPatch::at(base.iter().copied()).group(FieldGroup::RbacMode),
        SchemaPatch::at(policy.iter().copied().chain(["principals"]))
            .constraint(Constraint::Items(PRINCIPALS)),
        SchemaPatch::at(
            policy
                .iter()
                .copied()
                .chain(["principals", ITEMS, "jwtPrincipal", "provider"]),
        )
        .constraint(Constraint::Length(NON_EMPTY)),
        SchemaPatch::at(policy.iter().copied().chain(["permissions", "pathPrefix"]))
            .constraint(Constraint::Length(NON_EMPTY)),
    ]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::validation::Rule;

    fn parse(input: &str) -> EntRbac {
        let deserializer = serde_yaml::Deserializer::from_str(input);
        serde_yaml::with::singleton_map_recursive::deserialize(deserializer).unwrap()
    }

    #[test]
    fn test_policies() {
        let rbac = parse(
            r#"
            policies:
              admins:
                nestedClaimDelimiter: "."
                principals:
                - jwtPrincipal:
                    provider: okta
                    claims:
                      org.role: admin
                permissions:
                  pathPrefix: /admin
                  methods: [GET, POST]
            "#,
        );
        let mut validator = Validator::new();
        rbac.validate_at(&FieldPath::spec().field("entRBAC"), &mut validator);
        assert_eq!(validator.finish(), Ok(()));
    }

    #[test]
    fn test_disable() {
        assert_eq!(parse("disable: {}"), EntRbac::Disable(PolicyDisable::default()));
    }

    #[test]
    fn test_invalid_policy() {
        let rbac = parse(
            r#"
            policies:
              nobody:
                principals: []
              anyone:
                principals:
                - jwtPrincipal:
                    provider: ""
                    claims: {}
            "#,
        );
        let mut validator = Validator::new();
        rbac.validate_at(&FieldPath::spec().field("entRBAC"), &mut validator);
        let violations = validator.finish().unwrap_err();
        assert_eq!(violations.rules(), [Rule::FieldBounds, Rule::FieldBounds]);
        // Policies are checked in name order
        assert_eq!(
            violations
                .iter()
                .map(|violation| violation.path.to_string())
                .collect::<Vec<_>>(),
            [
                "spec.entRBAC.policies[anyone].principals[0].jwtPrincipal.provider",
                "spec.entRBAC.policies[nobody].principals",
            ]
        );
    }

    #[test]
    fn test_both_modes_are_rejected() {
        let deserializer = serde_yaml::Deserializer::from_str("{disable: {}, policies: {}}");
        let result: Result<EntRbac, _> =
            serde_yaml::with::singleton_map_recursive::deserialize(deserializer);
        assert!(result.is_err());
    }
}
