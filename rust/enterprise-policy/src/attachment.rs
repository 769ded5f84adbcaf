//! Which resources a policy may attach to, and how attachment levels rank against each other.

use kgateway_enterprise_crd_utils::{
    LocalPolicyTargetReferenceWithSectionName, LocalPolicyTargetSelectorWithSectionName,
    PolicyTarget,
};
use strum::IntoEnumIterator;

pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";
pub const GATEWAY_API_EXPERIMENTAL_GROUP: &str = "gateway.networking.x-k8s.io";
pub const AGENTGATEWAY_GROUP: &str = "agentgateway.dev";

/// A resource kind that policies can be attached to.
///
/// This is the only place that knows which API group each kind lives in. Policy types
/// declare the subset of these kinds that they accept.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::IntoStaticStr,
)]
pub enum TargetKind {
    Service,
    AgentgatewayBackend,
    Gateway,
    #[strum(serialize = "HTTPRoute")]
    HttpRoute,
    XListenerSet,
}

impl TargetKind {
    pub fn kind(self) -> &'static str {
        self.into()
    }

    pub fn group(self) -> &'static str {
        match self {
            TargetKind::Service => "",
            TargetKind::AgentgatewayBackend => AGENTGATEWAY_GROUP,
            TargetKind::Gateway | TargetKind::HttpRoute => GATEWAY_API_GROUP,
            TargetKind::XListenerSet => GATEWAY_API_EXPERIMENTAL_GROUP,
        }
    }

    /// Looks up a `(kind, group)` pair in the attachment whitelist.
    pub fn resolve(kind: &str, group: &str) -> Option<Self> {
        Self::from_kind(kind).filter(|target| target.group() == group)
    }

    /// Looks up a kind by name only, ignoring which group it was declared with.
    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::iter().find(|target| target.kind() == kind)
    }
}

/// The attachment levels that policies can be merged across, from least to most specific.
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
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Precedence {
    Gateway,
    Listener,
    Route,
    RouteRule,
    /// Backends and Services
    Backend,
}

impl Precedence {
    /// The level that a policy attached to `target` applies at.
    ///
    /// Returns [`None`] for targets outside of the attachment whitelist.
    pub fn of_target(target: &dyn PolicyTarget) -> Option<Self> {
        let sectioned = target.section_name().is_some();
        Some(match TargetKind::resolve(target.kind(), target.group())? {
            TargetKind::Gateway if sectioned => Precedence::Listener,
            TargetKind::Gateway => Precedence::Gateway,
            TargetKind::XListenerSet => Precedence::Listener,
            TargetKind::HttpRoute if sectioned => Precedence::RouteRule,
            TargetKind::HttpRoute => Precedence::Route,
            TargetKind::Service | TargetKind::AgentgatewayBackend => Precedence::Backend,
        })
    }
}

/// A policy that selects its targets through `targetRefs` or `targetSelectors`.
pub trait AttachablePolicy {
    fn target_refs(&self) -> Option<&[LocalPolicyTargetReferenceWithSectionName]>;
    fn target_selectors(&self) -> Option<&[LocalPolicyTargetSelectorWithSectionName]>;

    #[allow(clippy::type_complexity)]
    fn targets_mut(
        &mut self,
    ) -> (
        &mut Option<Vec<LocalPolicyTargetReferenceWithSectionName>>,
        &mut Option<Vec<LocalPolicyTargetSelectorWithSectionName>>,
    );

    /// Removes the target lists, which have no meaning once policies from several attachment points have been merged.
    fn clear_targets(&mut self) {
        let (refs, selectors) = self.targets_mut();
        *refs = None;
        *selectors = None;
    }

    /// Removes repeated target entries, keeping the first occurrence of each.
    fn dedup_targets(&mut self) {
        let (refs, selectors) = self.targets_mut();
        if let Some(refs) = refs {
            dedup_stable(refs);
        }
        if let Some(selectors) = selectors {
            dedup_stable(selectors);
        }
    }
}

fn dedup_stable<T: PartialEq>(items: &mut Vec<T>) {
    let mut i = 0;
    while i < items.len() {
        if items[..i].contains(&items[i]) {
            items.remove(i);
        } else {
            i += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn target(kind: &str, group: &str, section: Option<&str>) -> LocalPolicyTargetReferenceWithSectionName {
        LocalPolicyTargetReferenceWithSectionName {
            group: group.to_string(),
            kind: kind.to_string(),
            name: "target".to_string(),
            section_name: section.map(str::to_string),
        }
    }

    #[test]
    fn test_whitelist() {
        assert_eq!(TargetKind::resolve("Service", ""), Some(TargetKind::Service));
        assert_eq!(
            TargetKind::resolve("HTTPRoute", GATEWAY_API_GROUP),
            Some(TargetKind::HttpRoute)
        );
        assert_eq!(
            TargetKind::resolve("XListenerSet", GATEWAY_API_EXPERIMENTAL_GROUP),
            Some(TargetKind::XListenerSet)
        );
        assert_eq!(
            TargetKind::resolve("AgentgatewayBackend", AGENTGATEWAY_GROUP),
            Some(TargetKind::AgentgatewayBackend)
        );
        assert_eq!(TargetKind::resolve("Gateway", ""), None);
        assert_eq!(TargetKind::resolve("XListenerSet", GATEWAY_API_GROUP), None);
        assert_eq!(TargetKind::resolve("GRPCRoute", GATEWAY_API_GROUP), None);
        assert_eq!(TargetKind::HttpRoute.to_string(), "HTTPRoute");
    }

    #[test]
    fn test_precedence_of_target() {
        let cases = [
            (target("Gateway", GATEWAY_API_GROUP, None), Some(Precedence::Gateway)),
            (target("Gateway", GATEWAY_API_GROUP, Some("http")), Some(Precedence::Listener)),
            (
                target("XListenerSet", GATEWAY_API_EXPERIMENTAL_GROUP, None),
                Some(Precedence::Listener),
            ),
            (target("HTTPRoute", GATEWAY_API_GROUP, None), Some(Precedence::Route)),
            (target("HTTPRoute", GATEWAY_API_GROUP, Some("rule-0")), Some(Precedence::RouteRule)),
            (target("Service", "", Some("http")), Some(Precedence::Backend)),
            (target("Service", "apps", None), None),
        ];
        for (target, expected) in cases {
            assert_eq!(Precedence::of_target(&target), expected, "{target:?}");
        }
    }

    #[test]
    fn test_precedence_order() {
        let levels: Vec<_> = Precedence::iter().collect();
        let mut sorted = levels.clone();
        sorted.sort();
        assert_eq!(levels, sorted);
        assert_eq!("route-rule".parse::<Precedence>().unwrap(), Precedence::RouteRule);
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut refs = vec![
            target("Gateway", GATEWAY_API_GROUP, None),
            target("Gateway", GATEWAY_API_GROUP, Some("http")),
            target("Gateway", GATEWAY_API_GROUP, None),
        ];
        dedup_stable(&mut refs);
        assert_eq!(
            refs,
            vec![
                target("Gateway", GATEWAY_API_GROUP, None),
                target("Gateway", GATEWAY_API_GROUP, Some("http")),
            ]
        );
    }
}
