//! Rules about the targets that a policy attaches to.

use kgateway_enterprise_crd_utils::PolicyTarget;

use super::{Bounds, FieldGroup, FieldPath, Rule, Validator};
use crate::attachment::{AttachablePolicy, TargetKind};

pub const TARGET_LIST_BOUNDS: Bounds = Bounds::new(1, 16);

/// One of the target lists of a policy.
pub struct TargetList<'a> {
    /// The serialized name of the list field.
    pub field: &'static str,
    pub entries: Vec<&'a dyn PolicyTarget>,
}

impl TargetList<'_> {
    /// The first entry that `accepts` rejects, along with its index.
    fn find_rejected(
        &self,
        accepts: &impl Fn(&dyn PolicyTarget) -> bool,
    ) -> Option<(usize, &dyn PolicyTarget)> {
        self.entries
            .iter()
            .copied()
            .enumerate()
            .find(|(_, target)| !accepts(*target))
    }
}

/// All target lists that `policy` sets. Normally there is exactly one.
pub fn target_lists(policy: &impl AttachablePolicy) -> Vec<TargetList<'_>> {
    let mut lists = Vec::new();
    if let Some(refs) = policy.target_refs() {
        lists.push(TargetList {
            field: "targetRefs",
            entries: refs.iter().map(|t| t as &dyn PolicyTarget).collect(),
        });
    }
    if let Some(selectors) = policy.target_selectors() {
        lists.push(TargetList {
            field: "targetSelectors",
            entries: selectors.iter().map(|t| t as &dyn PolicyTarget).collect(),
        });
    }
    lists
}

/// Accepts targets whose kind is one of `kinds`, regardless of their group.
pub fn kind_in(kinds: &[TargetKind]) -> impl Fn(&dyn PolicyTarget) -> bool + '_ {
    move |target: &dyn PolicyTarget| TargetKind::from_kind(target.kind()).is_some_and(|kind| kinds.contains(&kind))
}

/// Renders a set of kinds for humans, such as `Gateway, HTTPRoute or XListenerSet`.
pub fn describe_kinds(kinds: &[TargetKind]) -> String {
    match kinds {
        [] => String::new(),
        [kind] => kind.to_string(),
        [init @ .., last] => {
            let init: Vec<String> = init.iter().map(ToString::to_string).collect();
            format!("{} or {last}", init.join(", "))
        }
    }
}

/// Checks the rules that apply to the target lists of every policy type.
///
/// `allowed` is the subset of the attachment whitelist that the policy type accepts.
pub fn validate_target_lists(
    policy: &impl AttachablePolicy,
    path: &FieldPath,
    allowed: &[TargetKind],
    validator: &mut Validator,
) {
    validator.group(
        path,
        FieldGroup::TargetSelection,
        &[
            policy.target_refs().is_some(),
            policy.target_selectors().is_some(),
        ],
    );

    for list in target_lists(policy) {
        let list_path = path.field(list.field);
        validator.bounded(
            Rule::TargetListSize,
            &list_path,
            "entries",
            list.entries.len(),
            TARGET_LIST_BOUNDS,
        );

        if let Some(first) = list.entries.first() {
            let same_kind = |target: &dyn PolicyTarget| target.kind() == first.kind();
            if let Some((i, other)) = list.find_rejected(&same_kind) {
                validator.report(
                    Rule::InvalidTargetKind,
                    list_path.index(i).field("kind"),
                    format!(
                        "only one kind of target can be set on one policy, but found {} and {}",
                        first.kind(),
                        other.kind()
                    ),
                );
            }
        }

        for (i, target) in list.entries.iter().enumerate() {
            let accepted = TargetKind::resolve(target.kind(), target.group())
                .is_some_and(|kind| allowed.contains(&kind));
            if !accepted {
                validator.report(
                    Rule::TargetNotAllowed,
                    list_path.index(i),
                    format!(
                        "{} in group {:?} cannot be targeted, only {} can",
                        target.kind(),
                        target.group(),
                        describe_kinds(allowed)
                    ),
                );
            }
        }
    }
}

/// Reports `rule` once for every target list that contains an entry rejected by `accepts`.
pub fn require_all_targets(
    policy: &impl AttachablePolicy,
    path: &FieldPath,
    rule: Rule,
    accepts: impl Fn(&dyn PolicyTarget) -> bool,
    message: &str,
    validator: &mut Validator,
) {
    for list in target_lists(policy) {
        if let Some((i, _)) = list.find_rejected(&accepts) {
            validator.report(rule, path.field(list.field).index(i), message);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_describe_kinds() {
        assert_eq!(describe_kinds(&[TargetKind::Gateway]), "Gateway");
        assert_eq!(
            describe_kinds(&[
                TargetKind::Gateway,
                TargetKind::HttpRoute,
                TargetKind::XListenerSet
            ]),
            "Gateway, HTTPRoute or XListenerSet"
        );
    }
}
