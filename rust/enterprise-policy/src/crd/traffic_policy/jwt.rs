use std::collections::BTreeMap;

use kgateway_enterprise_crd_utils::{BackendObjectReference, PolicyDisable};
use serde::{Deserialize, Serialize};
use stackable_operator::{
    schemars::{self, JsonSchema},
    time::Duration,
};

use crate::{
    cel::{Constraint, SchemaPatch, VALUES},
    merge::{merge_atomic, merge_fields},
    validation::{Bounds, FieldGroup, FieldPath, Rule, Validate, Validator},
};

const PROVIDERS: Bounds = Bounds::at_most(32);
const STAGES: [&str; 2] = ["beforeExtAuth", "afterExtAuth"];

/// JWT authentication, either before or after external auth runs (or both).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StagedJwt {
    /// Runs after external auth, so that claims set by it can be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_ext_auth: Option<EntJwt>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_ext_auth: Option<EntJwt>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntJwt {
    /// JWT providers by name. At most 32 providers can be configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<BTreeMap<String, JwtProvider>>,

    /// Defaults to `RequireValid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_policy: Option<JwtValidationPolicy>,

    /// Disables JWT authentication that was configured at a less specific attachment level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable: Option<PolicyDisable>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum JwtValidationPolicy {
    /// Reject requests without a valid JWT.
    RequireValid,
    /// Allow requests without a JWT, but reject invalid ones.
    AllowMissing,
    AllowMissingOrFailed,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JwtProvider {
    /// Where the keys used to verify tokens come from.
    pub jwks: Jwks,

    /// Tokens must be issued for one of these audiences, if any are given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audiences: Option<Vec<String>>,

    /// Tokens must carry this `iss` claim, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Where to look for the token. Defaults to the `Authorization` header with the `Bearer ` prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_source: Option<TokenSource>,

    /// Whether to forward the token upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_token: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims_to_headers: Option<Vec<ClaimToHeader>>,

    /// Allowed clock skew when checking `exp` and `nbf`. Must not be negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clock_skew_seconds: Option<i32>,

    /// Metadata key that the reason for a failed validation is written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attach_failed_status_to_metadata: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClaimToHeader {
    pub claim: String,
    pub header: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Jwks {
    /// Keys embedded in the policy.
    Local(LocalJwks),

    /// Keys fetched from a JWKS endpoint.
    Remote(RemoteJwks),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalJwks {
    /// The JWKS (or a single PEM encoded public key).
    pub key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoteJwks {
    pub url: String,

    /// The backend that serves `url`.
    pub backend_ref: BackendObjectReference,

    /// How long fetched keys are cached. Must be at least `1ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_duration: Option<Duration>,

    /// Fetch keys in the background instead of when the first request needs them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_fetch: Option<JwksAsyncFetch>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JwksAsyncFetch {
    /// Start listeners before the first fetch has completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fast_listener: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<TokenSourceHeader>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenSourceHeader {
    pub header: String,

    /// Stripped from the header value before it is parsed as a token, such as `Bearer `.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl Validate for StagedJwt {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        let stages = [&self.before_ext_auth, &self.after_ext_auth];
        validator.group(
            path,
            FieldGroup::JwtStages,
            &stages.map(|stage| stage.is_some()),
        );
        for (name, stage) in STAGES.iter().zip(stages) {
            if let Some(stage) = stage {
                stage.validate_at(&path.field(name), validator);
            }
        }
    }
}

impl Validate for EntJwt {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validator.group(
            path,
            FieldGroup::JwtProviders,
            &[self.providers.is_some(), self.disable.is_some()],
        );
        validator.group(
            path,
            FieldGroup::JwtValidationPolicy,
            &[self.validation_policy.is_some(), self.disable.is_some()],
        );
        if let Some(providers) = &self.providers {
            let providers_path = path.field("providers");
            validator.properties(&providers_path, providers.len(), PROVIDERS);
            for (name, provider) in providers {
                provider.validate_at(&providers_path.key(name), validator);
            }
        }
    }
}

impl Validate for JwtProvider {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        if let Some(clock_skew) = self.clock_skew_seconds {
            validator.minimum(&path.field("clockSkewSeconds"), clock_skew.into(), 0);
        }
        if let Jwks::Remote(RemoteJwks {
            cache_duration: Some(cache_duration),
            ..
        }) = &self.jwks
        {
            if cache_duration.is_zero() {
                validator.report(
                    Rule::FieldBounds,
                    path.field("jwks").field("remote").field("cacheDuration"),
                    "must be at least 1ms",
                );
            }
        }
    }
}

// A stage is only meaningful as a whole (providers and disable exclude each other), so stages are not merged field by field.
merge_atomic!(EntJwt);
merge_fields!(StagedJwt {
    after_ext_auth,
    before_ext_auth,
});

pub(super) fn jwt_patches(base: &[&str]) -> Vec<SchemaPatch> {
    let mut patches = vec![SchemaPatch::at(base.iter().copied()).group(FieldGroup::JwtStages)];
    for stage in STAGES {
        let stage_path: Vec<&str> = base.iter().copied().chain([stage]).collect();
        let providers_path: Vec<&str> = stage_path.iter().copied().chain(["providers"]).collect();
        let provider_path: Vec<&str> = providers_path.iter().copied().chain([VALUES]).collect();
        patches.extend([
            SchemaPatch::at(&stage_path)
                .group(FieldGroup::JwtProviders)
                .group(FieldGroup::JwtValidationPolicy),
            SchemaPatch::at(&providers_path).constraint(Constraint::Properties(PROVIDERS)),
            SchemaPatch::at(provider_path.iter().copied().chain(["clockSkewSeconds"]))
                .constraint(Constraint::Minimum(0)),
            SchemaPatch::at(provider_path.iter().copied().chain(["jwks"]))
                .group(FieldGroup::JwksSource),
        ]);
    }
    patches
}

#[cfg(test)]
mod test {
    use super::*;

    fn rules(jwt: &StagedJwt) -> Vec<Rule> {
        let mut validator = Validator::new();
        jwt.validate_at(&FieldPath::spec().field("entJWT"), &mut validator);
        validator.finish().err().map(|v| v.rules()).unwrap_or_default()
    }

    fn parse(input: &str) -> StagedJwt {
        let deserializer = serde_yaml::Deserializer::from_str(input);
        serde_yaml::with::singleton_map_recursive::deserialize(deserializer).unwrap()
    }

    #[test]
    fn test_valid_stages() {
        let jwt = parse(
            r#"
            beforeExtAuth:
              validationPolicy: AllowMissing
              providers:
                okta:
                  issuer: https://dev.okta.com
                  clockSkewSeconds: 30
                  jwks:
                    remote:
                      url: https://dev.okta.com/oauth2/v1/keys
                      backendRef:
                        name: okta
                        port: 443
                      cacheDuration: 5m
            afterExtAuth:
              disable: {}
            "#,
        );
        assert_eq!(rules(&jwt), []);
        let providers = jwt.before_ext_auth.unwrap().providers.unwrap();
        let Jwks::Remote(remote) = &providers["okta"].jwks else {
            panic!("expected remote JWKS");
        };
        assert_eq!(remote.cache_duration, Some("5m".parse().unwrap()));
    }

    #[test]
    fn test_stage_required() {
        assert_eq!(rules(&StagedJwt::default()), [Rule::EmptyFieldGroup]);
    }

    #[test]
    fn test_disable_excludes_configuration() {
        let jwt = parse(
            r#"
            afterExtAuth:
              validationPolicy: RequireValid
              disable: {}
              providers:
                local:
                  clockSkewSeconds: -1
                  jwks:
                    local:
                      key: abc
            "#,
        );
        let mut validator = Validator::new();
        jwt.validate_at(&FieldPath::spec().field("entJWT"), &mut validator);
        let violations = validator.finish().unwrap_err();
        assert_eq!(
            violations.rules(),
            [Rule::ExclusiveFields, Rule::ExclusiveFields, Rule::FieldBounds]
        );
        assert_eq!(
            violations.iter().last().unwrap().path.to_string(),
            "spec.entJWT.afterExtAuth.providers[local].clockSkewSeconds"
        );
    }

    #[test]
    fn test_provider_limit() {
        let provider = JwtProvider {
            jwks: Jwks::Local(LocalJwks {
                key: "abc".to_string(),
            }),
            audiences: None,
            issuer: None,
            token_source: None,
            keep_token: None,
            claims_to_headers: None,
            clock_skew_seconds: None,
            attach_failed_status_to_metadata: None,
        };
        let jwt = StagedJwt {
            before_ext_auth: Some(EntJwt {
                providers: Some((0..33).map(|i| (format!("p{i}"), provider.clone())).collect()),
                ..EntJwt::default()
            }),
            ..StagedJwt::default()
        };
        assert_eq!(rules(&jwt), [Rule::FieldBounds]);
    }
}
