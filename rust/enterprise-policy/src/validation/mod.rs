//! Checks policy documents against the rules that the API server would otherwise enforce through CEL.
//!
//! Every rule is evaluated, so a single pass reports all problems of a document. The result only
//! depends on the document itself.

use std::fmt::Display;

use crate::attachment::AttachablePolicy;

mod groups;
mod path;
pub mod targets;

pub use groups::{Cardinality, FieldGroup};
pub use path::FieldPath;

/// Identifies the rule that a [`Violation`] breaks.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    /// Exactly one of `targetRefs` and `targetSelectors` must be set.
    TargetSelection,
    TargetListSize,
    /// All entries of a target list must share the same kind.
    InvalidTargetKind,
    /// The `(kind, group)` pair of a target is not accepted by the policy type.
    TargetNotAllowed,
    MissingPolicyContent,
    FrontendTarget,
    TrafficTarget,
    PreRoutingTarget,
    BackendMcpServiceTarget,
    BackendAiServiceTarget,
    ExclusiveFields,
    MissingRequiredField,
    EmptyFieldGroup,
    FieldBounds,
    ExtractionReplacement,
    BodyTransformationContent,
}

/// A single broken rule, and where in the document it was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub rule: Rule,
    pub path: FieldPath,
    pub message: String,
}

impl Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} [{}]", self.path, self.message, self.rule)
    }
}

/// All rules broken by a rejected document, in the order they were found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.0.iter().map(|violation| violation.rule).collect()
    }

    pub fn contains(&self, rule: Rule) -> bool {
        self.0.iter().any(|violation| violation.rule == rule)
    }
}

impl Display for Violations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} rule violation(s)", self.0.len())?;
        for (i, violation) in self.0.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { "; " })?;
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Violations {}

impl IntoIterator for Violations {
    type Item = Violation;
    type IntoIter = std::vec::IntoIter<Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Inclusive size limits for lists, maps and strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub min: usize,
    pub max: Option<usize>,
}

impl Bounds {
    pub const fn new(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub const fn at_most(max: usize) -> Self {
        Self::new(0, max)
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn contains(self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }
}

impl Display for Bounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min, self.max) {
            (0, Some(max)) => write!(f, "at most {max}"),
            (min, Some(max)) => write!(f, "between {min} and {max}"),
            (min, None) => write!(f, "at least {min}"),
        }
    }
}

/// Collects violations while walking a document.
#[derive(Debug, Default)]
pub struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, rule: Rule, path: FieldPath, message: impl Into<String>) {
        let violation = Violation {
            rule,
            path,
            message: message.into(),
        };
        tracing::trace!(%violation, "rule violated");
        self.violations.push(violation);
    }

    /// Checks how many members of `group` are set, `present` being in the order of [`FieldGroup::members`].
    pub fn group(&mut self, path: &FieldPath, group: FieldGroup, present: &[bool]) {
        debug_assert_eq!(present.len(), group.members().len(), "{group:?}");
        let set = present.iter().filter(|is_set| **is_set).count();
        if let Some(rule) = group.violated_rule(set) {
            self.report(rule, path.clone(), group.message());
        }
    }

    pub fn bounded(&mut self, rule: Rule, path: &FieldPath, what: &str, n: usize, bounds: Bounds) {
        if !bounds.contains(n) {
            self.report(
                rule,
                path.clone(),
                format!("must have {bounds} {what}, but has {n}"),
            );
        }
    }

    pub fn items(&mut self, path: &FieldPath, n: usize, bounds: Bounds) {
        self.bounded(Rule::FieldBounds, path, "items", n, bounds);
    }

    pub fn properties(&mut self, path: &FieldPath, n: usize, bounds: Bounds) {
        self.bounded(Rule::FieldBounds, path, "properties", n, bounds);
    }

    pub fn length(&mut self, path: &FieldPath, value: &str, bounds: Bounds) {
        self.bounded(
            Rule::FieldBounds,
            path,
            "characters",
            value.chars().count(),
            bounds,
        );
    }

    pub fn minimum(&mut self, path: &FieldPath, value: i64, minimum: i64) {
        if value < minimum {
            self.report(
                Rule::FieldBounds,
                path.clone(),
                format!("must be at least {minimum}, but is {value}"),
            );
        }
    }

    pub fn finish(self) -> Result<(), Violations> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(Violations(self.violations))
        }
    }
}

/// A document (or part of one) that can check itself.
pub trait Validate {
    /// Reports every rule broken by `self`, which is located at `path`.
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator);
}

/// Validates a policy spec, reporting all broken rules.
pub fn validate<T: Validate + ?Sized>(spec: &T) -> Result<(), Violations> {
    let mut validator = Validator::new();
    spec.validate_at(&FieldPath::spec(), &mut validator);
    validator.finish()
}

/// Validates a policy spec and returns a copy without repeated target entries.
///
/// Normalization never changes whether a document is valid.
pub fn validate_and_normalize<T>(spec: &T) -> Result<T, Violations>
where
    T: Validate + AttachablePolicy + Clone,
{
    validate(spec)?;
    let mut normalized = spec.clone();
    normalized.dedup_targets();
    Ok(normalized)
}
