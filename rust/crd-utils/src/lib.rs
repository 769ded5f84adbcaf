//! CRD types that are shared between the enterprise policy APIs, but aren't clearly owned by one of them.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use stackable_operator::schemars::{self, JsonSchema};

mod raw;
mod targets;

pub use raw::RawConfig;
pub use targets::{
    LocalPolicyTargetReferenceWithSectionName, LocalPolicyTargetSelectorWithSectionName,
    PolicyTarget,
};

/// Defines a reference type that selects a resource by name, optionally in another namespace.
///
/// If the namespace is omitted, the referent is resolved in the namespace of the policy that refers to it.
macro_rules! local_reference {
    ($(#[$attr:meta])* $name:ident, $referent:literal) => {
        $(#[$attr])*
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            #[doc = concat!("Name of the ", $referent, " resource.")]
            pub name: String,

            #[doc = concat!("Namespace of the ", $referent, " resource.")]
            #[doc = ""]
            #[doc = concat!("If not set, defaults to the namespace of the policy from which the ", $referent, " is referenced.")]
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub namespace: Option<String>,
        }

        impl $name {
            /// The namespace the referent lives in, given the namespace of the referring policy.
            pub fn resolve_namespace<'a>(&'a self, policy_namespace: &'a str) -> &'a str {
                self.namespace.as_deref().unwrap_or(policy_namespace)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match &self.namespace {
                    Some(ns) => write!(f, "{}.{ns}", self.name),
                    None => f.write_str(&self.name),
                }
            }
        }
    };
}

local_reference!(
    /// Selects the RateLimitConfig resource with the rate limit policy that should be used.
    RateLimitConfigRef,
    "RateLimitConfig"
);
local_reference!(
    /// Selects the AuthConfig resource with the external auth policy that should be used.
    AuthConfigRef,
    "AuthConfig"
);
local_reference!(
    /// Selects the WAFPolicy resource with the configuration that should be used.
    WafPolicyRef,
    "WAFPolicy"
);
local_reference!(
    /// A reference to an object (usually a GatewayExtension), optionally in another namespace.
    NamespacedObjectReference,
    "referenced"
);

/// References a backend (usually a Service) that traffic is sent to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackendObjectReference {
    /// Group of the referent. When unspecified or empty, the core API group is inferred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Kubernetes kind of the referent. Defaults to `Service`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Name of the referent.
    pub name: String,

    /// Namespace of the backend. When unspecified, the local namespace is inferred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Destination port number. Required when the referent is a Kubernetes Service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

impl Display for BackendObjectReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind.as_deref().unwrap_or("Service"), self.name)?;
        if let Some(ns) = &self.namespace {
            write!(f, ".{ns}")?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

/// Disables a feature for the scope of the policy, overriding policies attached at a lower precedence.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct PolicyDisable {}
