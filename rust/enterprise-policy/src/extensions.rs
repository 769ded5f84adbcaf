//! Decides which shared extension deployments a parameters object calls for.
//!
//! Only the parameters count. Policies that still refer to an extension never keep it alive.

use std::collections::BTreeSet;

use strum::IntoEnumIterator;

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
    strum::EnumIter,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ExtensionKind {
    ExtAuth,
    RateLimiter,
    ExtCache,
}

impl ExtensionKind {
    /// The field of `sharedExtensions` that configures this extension.
    pub fn field_name(self) -> &'static str {
        match self {
            ExtensionKind::ExtAuth => "extauth",
            ExtensionKind::RateLimiter => "ratelimiter",
            ExtensionKind::ExtCache => "extCache",
        }
    }

    /// The name of the extension's workload for `gateway_class`, such as `enterprise-ext-auth`.
    pub fn workload_name(self, gateway_class: &str) -> String {
        format!("{gateway_class}-{self}")
    }
}

/// Implemented by parameter objects that configure shared extensions.
pub trait SharedExtensions {
    /// Whether `kind` is configured and explicitly enabled.
    fn is_enabled(&self, kind: ExtensionKind) -> bool;

    fn enabled_extensions(&self) -> BTreeSet<ExtensionKind> {
        ExtensionKind::iter()
            .filter(|kind| self.is_enabled(*kind))
            .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionPlan {
    /// Enabled, but not deployed yet.
    pub provision: BTreeSet<ExtensionKind>,

    /// Deployed, but disabled or no longer configured.
    pub garbage_collect: BTreeSet<ExtensionKind>,
}

impl ExtensionPlan {
    pub fn is_empty(&self) -> bool {
        self.provision.is_empty() && self.garbage_collect.is_empty()
    }
}

/// Compares the extensions that are `deployed` with the ones that `parameters` enable.
pub fn plan<P>(deployed: &BTreeSet<ExtensionKind>, parameters: &P) -> ExtensionPlan
where
    P: SharedExtensions + ?Sized,
{
    let enabled = parameters.enabled_extensions();
    let plan = ExtensionPlan {
        provision: enabled.difference(deployed).copied().collect(),
        garbage_collect: deployed.difference(&enabled).copied().collect(),
    };
    tracing::debug!(?plan, "planned shared extensions");
    plan
}

#[cfg(test)]
mod test {
    use super::*;

    struct Enabled(&'static [ExtensionKind]);

    impl SharedExtensions for Enabled {
        fn is_enabled(&self, kind: ExtensionKind) -> bool {
            self.0.contains(&kind)
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(ExtensionKind::RateLimiter.to_string(), "rate-limiter");
        assert_eq!(
            ExtensionKind::ExtAuth.workload_name("enterprise"),
            "enterprise-ext-auth"
        );
        assert_eq!("ext-cache".parse(), Ok(ExtensionKind::ExtCache));
    }

    #[test]
    fn test_provision_and_collect() {
        let deployed = BTreeSet::from([ExtensionKind::ExtAuth, ExtensionKind::ExtCache]);
        let plan = plan(
            &deployed,
            &Enabled(&[ExtensionKind::ExtAuth, ExtensionKind::RateLimiter]),
        );
        assert_eq!(plan.provision, BTreeSet::from([ExtensionKind::RateLimiter]));
        assert_eq!(plan.garbage_collect, BTreeSet::from([ExtensionKind::ExtCache]));
    }

    #[test]
    fn test_steady_state() {
        let deployed = BTreeSet::from([ExtensionKind::RateLimiter]);
        assert!(plan(&deployed, &Enabled(&[ExtensionKind::RateLimiter])).is_empty());
        assert!(plan(&BTreeSet::new(), &Enabled(&[])).is_empty());
    }

    #[test]
    fn test_nothing_enabled_collects_everything() {
        let deployed: BTreeSet<_> = ExtensionKind::iter().collect();
        let plan = plan(&deployed, &Enabled(&[]));
        assert!(plan.provision.is_empty());
        assert_eq!(plan.garbage_collect, deployed);
    }
}
