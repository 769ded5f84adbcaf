//! Renders the validation rules as CEL expressions on the generated CRD schemas, so that the API
//! server enforces the same rules as [`crate::validation`].

use snafu::{OptionExt, Snafu};
use stackable_operator::k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, JSONSchemaProps, JSONSchemaPropsOrArray, JSONSchemaPropsOrBool,
    ValidationRule,
};

use crate::{
    attachment::TargetKind,
    validation::{targets::TARGET_LIST_BOUNDS, Bounds, Cardinality, FieldGroup},
};

/// Path segment that descends into the items of an array.
pub const ITEMS: &str = "[]";
/// Path segment that descends into the values of a map.
pub const VALUES: &str = "{}";

const TARGET_LISTS: [&str; 2] = ["targetRefs", "targetSelectors"];

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("CRD {crd:?} has no schema for version {version:?}"))]
    MissingSchema { crd: String, version: String },

    #[snafu(display("CRD {crd:?} version {version:?} has no schema at {path}"))]
    MissingField {
        crd: String,
        version: String,
        path: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CelRule {
    pub rule: String,
    pub message: String,
}

impl CelRule {
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Checks how many members of `group` are set on the object that the rule is attached to.
    pub fn group(group: FieldGroup) -> Self {
        let presence = group
            .members()
            .iter()
            .map(|member| format!("has(self.{member})"))
            .collect::<Vec<_>>()
            .join(", ");
        let count = format!("[{presence}].filter(x, x).size()");
        let rule = match group.cardinality() {
            Cardinality::AtMostOne => format!("{count} <= 1"),
            Cardinality::ExactlyOne => format!("{count} == 1"),
            Cardinality::AtLeastOne => format!("{count} >= 1"),
        };
        Self::new(rule, group.message())
    }

    /// Checks that every entry of the target list the rule is attached to is one of `allowed`.
    pub fn target_whitelist(allowed: &[TargetKind]) -> Self {
        let pairs = allowed
            .iter()
            .map(|kind| format!("(r.kind == '{kind}' && r.group == '{}')", kind.group()))
            .collect::<Vec<_>>()
            .join(" || ");
        Self::new(
            format!("self.all(r, {pairs})"),
            format!(
                "targets may only reference {} resources",
                crate::validation::targets::describe_kinds(allowed)
            ),
        )
    }

    /// Checks that all entries of the target list the rule is attached to have the same kind.
    pub fn single_target_kind() -> Self {
        Self::new(
            "self.all(l1, !self.exists(l2, l1.kind != l2.kind))",
            "only one kind of target can be set on one policy",
        )
    }

    /// Requires every target `t` to satisfy `predicate` whenever `condition` holds for the policy spec.
    pub fn targets_when(condition: &str, predicate: &str, message: impl Into<String>) -> Self {
        let lists = TARGET_LISTS
            .iter()
            .map(|list| format!("(!has(self.{list}) || self.{list}.all(t, {predicate}))"))
            .collect::<Vec<_>>()
            .join(" && ");
        Self::new(format!("!({condition}) || ({lists})"), message)
    }

    pub fn into_validation_rule(self) -> ValidationRule {
        ValidationRule {
            rule: self.rule,
            message: Some(self.message),
            ..ValidationRule::default()
        }
    }
}

/// Renders `t.kind in ['Gateway', 'HTTPRoute']` for the target variable `t`.
pub fn kind_in(kinds: &[TargetKind]) -> String {
    let kinds = kinds
        .iter()
        .map(|kind| format!("'{kind}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("t.kind in [{kinds}]")
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constraint {
    Items(Bounds),
    Properties(Bounds),
    Length(Bounds),
    Minimum(i64),
}

/// Rules and size limits that apply to one node of a CRD schema.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaPatch {
    /// Field names from the schema root, or [`ITEMS`] and [`VALUES`] to descend into collections.
    pub path: Vec<String>,
    pub rules: Vec<CelRule>,
    pub constraints: Vec<Constraint>,
}

impl SchemaPatch {
    pub fn at<S: AsRef<str>>(path: impl IntoIterator<Item = S>) -> Self {
        Self {
            path: path.into_iter().map(|s| s.as_ref().to_string()).collect(),
            rules: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: CelRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn group(self, group: FieldGroup) -> Self {
        self.rule(CelRule::group(group))
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    fn apply(&self, schema: &mut JSONSchemaProps) {
        for constraint in &self.constraints {
            match *constraint {
                Constraint::Items(bounds) => {
                    schema.min_items = positive(bounds.min);
                    schema.max_items = bounds.max.map(to_i64);
                }
                Constraint::Properties(bounds) => {
                    schema.min_properties = positive(bounds.min);
                    schema.max_properties = bounds.max.map(to_i64);
                }
                Constraint::Length(bounds) => {
                    schema.min_length = positive(bounds.min);
                    schema.max_length = bounds.max.map(to_i64);
                }
                Constraint::Minimum(minimum) => schema.minimum = Some(minimum as f64),
            }
        }
        if !self.rules.is_empty() {
            schema.x_kubernetes_validations.get_or_insert_with(Vec::new).extend(
                self.rules
                    .iter()
                    .cloned()
                    .map(CelRule::into_validation_rule),
            );
        }
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn positive(n: usize) -> Option<i64> {
    (n > 0).then(|| to_i64(n))
}

/// Implemented by custom resources whose schema carries validation rules.
pub trait SchemaRules {
    fn schema_patches() -> Vec<SchemaPatch>;
}

/// The patches that every policy with `targetRefs` and `targetSelectors` needs.
pub fn target_list_patches(allowed: &[TargetKind]) -> Vec<SchemaPatch> {
    let mut patches = vec![SchemaPatch::at(["spec"]).group(FieldGroup::TargetSelection)];
    patches.extend(TARGET_LISTS.iter().map(|list| {
        SchemaPatch::at(["spec", *list])
            .constraint(Constraint::Items(TARGET_LIST_BOUNDS))
            .rule(CelRule::target_whitelist(allowed))
            .rule(CelRule::single_target_kind())
    }));
    patches
}

fn child<'a>(schema: &'a mut JSONSchemaProps, segment: &str) -> Option<&'a mut JSONSchemaProps> {
    match segment {
        ITEMS => match schema.items.as_mut()? {
            JSONSchemaPropsOrArray::Schema(items) => Some(items.as_mut()),
            JSONSchemaPropsOrArray::Schemas(_) => None,
        },
        VALUES => match schema.additional_properties.as_mut()? {
            JSONSchemaPropsOrBool::Schema(values) => Some(values.as_mut()),
            JSONSchemaPropsOrBool::Bool(_) => None,
        },
        field => {
            if schema
                .properties
                .as_ref()
                .is_some_and(|properties| properties.contains_key(field))
            {
                return schema.properties.as_mut()?.get_mut(field);
            }
            // Subschemas that were not hoisted, such as enum variants
            schema
                .all_of
                .iter_mut()
                .chain(schema.one_of.iter_mut())
                .flatten()
                .find_map(|subschema| child(subschema, field))
        }
    }
}

/// Applies `patches` to every version of `crd`.
pub fn apply_patches(
    crd: &mut CustomResourceDefinition,
    patches: &[SchemaPatch],
) -> Result<(), Error> {
    let crd_name = crd.metadata.name.clone().unwrap_or_default();
    for version in &mut crd.spec.versions {
        let schema = version
            .schema
            .as_mut()
            .and_then(|validation| validation.open_api_v3_schema.as_mut())
            .context(MissingSchemaSnafu {
                crd: &crd_name,
                version: &version.name,
            })?;
        for patch in patches {
            let mut node = Some(&mut *schema);
            for segment in &patch.path {
                node = node.and_then(|node| child(node, segment));
            }
            let node = node.context(MissingFieldSnafu {
                crd: &crd_name,
                version: &version.name,
                path: patch.path.join("."),
            })?;
            patch.apply(node);
        }
        tracing::debug!(crd = %crd_name, version = %version.name, "added validation rules");
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_group_rules() {
        assert_eq!(
            CelRule::group(FieldGroup::ExtAuth).rule,
            "[has(self.extAuth), has(self.entExtAuth)].filter(x, x).size() <= 1"
        );
        assert_eq!(
            CelRule::group(FieldGroup::TargetSelection).rule,
            "[has(self.targetRefs), has(self.targetSelectors)].filter(x, x).size() == 1"
        );
        assert_eq!(
            CelRule::group(FieldGroup::JwtStages).rule,
            "[has(self.beforeExtAuth), has(self.afterExtAuth)].filter(x, x).size() >= 1"
        );
    }

    #[test]
    fn test_target_rules() {
        assert_eq!(
            CelRule::target_whitelist(&[TargetKind::Service, TargetKind::HttpRoute]).rule,
            "self.all(r, (r.kind == 'Service' && r.group == '') || (r.kind == 'HTTPRoute' && r.group == 'gateway.networking.k8s.io'))"
        );
        assert_eq!(
            CelRule::targets_when(
                "has(self.frontend)",
                &kind_in(&[TargetKind::Gateway]),
                "frontend"
            )
            .rule,
            "!(has(self.frontend)) || ((!has(self.targetRefs) || self.targetRefs.all(t, t.kind in ['Gateway'])) && (!has(self.targetSelectors) || self.targetSelectors.all(t, t.kind in ['Gateway'])))"
        );
    }

    #[test]
    fn test_patch_navigation() {
        let mut schema: JSONSchemaProps = serde_json::from_value(serde_json::json!({
            "type": "object",
            "properties": {
                "providers": {
                    "type": "object",
                    "additionalProperties": {
                        "type": "object",
                        "properties": {
                            "audiences": {"type": "array", "items": {"type": "string"}},
                        },
                    },
                },
            },
        }))
        .unwrap();

        let mut node = Some(&mut schema);
        for segment in ["providers", VALUES, "audiences", ITEMS] {
            node = node.and_then(|node| child(node, segment));
        }
        let items = node.unwrap();
        SchemaPatch::at(["unused"])
            .constraint(Constraint::Length(Bounds::new(1, 64)))
            .apply(items);
        assert_eq!(items.min_length, Some(1));
        assert_eq!(items.max_length, Some(64));

        assert!(child(&mut schema, "missing").is_none());
    }
}
