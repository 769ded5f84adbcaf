use kgateway_enterprise_crd_utils::{
    LocalPolicyTargetReferenceWithSectionName, LocalPolicyTargetSelectorWithSectionName,
    PolicyTarget,
};

use crate::{
    attachment::{AttachablePolicy, TargetKind},
    cel::{self, CelRule, Constraint, SchemaPatch, SchemaRules},
    crd::agentgateway_policy::v1alpha1::{
        AgwGlobalRateLimit, Backend, EnterpriseAgentgatewayPolicy,
        EnterpriseAgentgatewayPolicySpec, Frontend, TokenExchange, TokenExchangeMode,
        TokenExchangeOidc, Traffic, TrafficPhase,
    },
    merge::{merge_atomic, merge_fields},
    validation::{
        targets::{kind_in, require_all_targets, validate_target_lists},
        Bounds, FieldGroup, FieldPath, Rule, Validate, Validator,
    },
};

pub const ALLOWED_TARGET_KINDS: &[TargetKind] = &[
    TargetKind::Service,
    TargetKind::AgentgatewayBackend,
    TargetKind::Gateway,
    TargetKind::HttpRoute,
    TargetKind::XListenerSet,
];
pub const FRONTEND_TARGET_KINDS: &[TargetKind] = &[TargetKind::Gateway];
pub const TRAFFIC_TARGET_KINDS: &[TargetKind] = &[
    TargetKind::Gateway,
    TargetKind::HttpRoute,
    TargetKind::XListenerSet,
];
pub const PRE_ROUTING_TARGET_KINDS: &[TargetKind] =
    &[TargetKind::Gateway, TargetKind::XListenerSet];

const RATE_LIMIT_CONFIG_REFS: Bounds = Bounds::new(1, 16);
const RATE_LIMIT_DOMAIN: Bounds = Bounds::at_most(256);

const FRONTEND_TARGET_MESSAGE: &str =
    "the frontend field can only target a Gateway without a section name";
const TRAFFIC_TARGET_MESSAGE: &str =
    "the traffic field can only target a Gateway, HTTPRoute or XListenerSet";
const PRE_ROUTING_TARGET_MESSAGE: &str =
    "the traffic.phase=PreRouting field can only target a Gateway or XListenerSet";
const BACKEND_MCP_MESSAGE: &str = "backend.mcp may not be used with a Service target";
const BACKEND_AI_MESSAGE: &str = "backend.ai may not be used with a Service target";

fn is_whole_gateway(target: &dyn PolicyTarget) -> bool {
    kind_in(FRONTEND_TARGET_KINDS)(target) && target.section_name().is_none()
}

fn is_not_service(target: &dyn PolicyTarget) -> bool {
    target.kind() != TargetKind::Service.kind()
}

impl AttachablePolicy for EnterpriseAgentgatewayPolicySpec {
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

impl Validate for EnterpriseAgentgatewayPolicySpec {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validate_target_lists(self, path, ALLOWED_TARGET_KINDS, validator);
        validator.group(
            path,
            FieldGroup::PolicyContent,
            &[
                self.frontend.is_some(),
                self.traffic.is_some(),
                self.backend.is_some(),
            ],
        );

        if self.frontend.is_some() {
            require_all_targets(
                self,
                path,
                Rule::FrontendTarget,
                is_whole_gateway,
                FRONTEND_TARGET_MESSAGE,
                validator,
            );
        }

        if let Some(traffic) = &self.traffic {
            require_all_targets(
                self,
                path,
                Rule::TrafficTarget,
                kind_in(TRAFFIC_TARGET_KINDS),
                TRAFFIC_TARGET_MESSAGE,
                validator,
            );
            if traffic.phase == Some(TrafficPhase::PreRouting) {
                require_all_targets(
                    self,
                    path,
                    Rule::PreRoutingTarget,
                    kind_in(PRE_ROUTING_TARGET_KINDS),
                    PRE_ROUTING_TARGET_MESSAGE,
                    validator,
                );
            }
            traffic.validate_at(&path.field("traffic"), validator);
        }

        if let Some(backend) = &self.backend {
            if backend.mcp.is_some() {
                require_all_targets(
                    self,
                    path,
                    Rule::BackendMcpServiceTarget,
                    is_not_service,
                    BACKEND_MCP_MESSAGE,
                    validator,
                );
            }
            if backend.ai.is_some() {
                require_all_targets(
                    self,
                    path,
                    Rule::BackendAiServiceTarget,
                    is_not_service,
                    BACKEND_AI_MESSAGE,
                    validator,
                );
            }
            validator.group(
                &path.field("backend"),
                FieldGroup::AgentgatewayBackend,
                &[
                    backend.tcp.is_some(),
                    backend.tls.is_some(),
                    backend.http.is_some(),
                    backend.auth.is_some(),
                    backend.mcp.is_some(),
                    backend.ai.is_some(),
                    backend.token_exchange.is_some(),
                ],
            );
        }
    }
}

impl Validate for Traffic {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validator.group(
            path,
            FieldGroup::AgentgatewayTraffic,
            &[
                self.transformation.is_some(),
                self.ext_proc.is_some(),
                self.ext_auth.is_some(),
                self.rate_limit.is_some(),
                self.cors.is_some(),
                self.csrf.is_some(),
                self.header_modifiers.is_some(),
                self.host_rewrite.is_some(),
                self.timeouts.is_some(),
                self.retry.is_some(),
                self.authorization.is_some(),
                self.jwt_authentication.is_some(),
                self.basic_authentication.is_some(),
                self.api_key_authentication.is_some(),
                self.ent_rate_limit.is_some(),
                self.ent_ext_auth.is_some(),
            ],
        );
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
        if let Some(rate_limit) = &self.ent_rate_limit {
            rate_limit
                .global
                .validate_at(&path.field("entRateLimit").field("global"), validator);
        }
    }
}

impl Validate for AgwGlobalRateLimit {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validator.items(
            &path.field("rateLimitConfigRefs"),
            self.rate_limit_config_refs.len(),
            RATE_LIMIT_CONFIG_REFS,
        );
        if let Some(domain) = &self.domain {
            validator.length(&path.field("domain"), domain, RATE_LIMIT_DOMAIN);
        }
    }
}

merge_atomic!(TrafficPhase, TokenExchangeMode, TokenExchangeOidc);
merge_fields!(EnterpriseAgentgatewayPolicySpec {
    target_refs,
    target_selectors,
    frontend,
    traffic,
    backend,
});
merge_fields!(Frontend {
    tcp,
    tls,
    http,
    access_log,
    tracing,
});
merge_fields!(Traffic {
    phase,
    transformation,
    ext_proc,
    cors,
    csrf,
    header_modifiers,
    host_rewrite,
    timeouts,
    retry,
    authorization,
    jwt_authentication,
    basic_authentication,
    api_key_authentication,
} exclusive {
    (ext_auth, ent_ext_auth),
    (rate_limit, ent_rate_limit),
});
merge_fields!(Backend {
    tcp,
    tls,
    http,
    auth,
    ai,
    mcp,
    token_exchange,
});
merge_fields!(TokenExchange { mode, oidc });

impl SchemaRules for EnterpriseAgentgatewayPolicy {
    fn schema_patches() -> Vec<SchemaPatch> {
        let mut patches = cel::target_list_patches(ALLOWED_TARGET_KINDS);
        patches.push(
            SchemaPatch::at(["spec"])
                .group(FieldGroup::PolicyContent)
                .rule(CelRule::targets_when(
                    "has(self.frontend)",
                    &format!("{} && !has(t.sectionName)", cel::kind_in(FRONTEND_TARGET_KINDS)),
                    FRONTEND_TARGET_MESSAGE,
                ))
                .rule(CelRule::targets_when(
                    "has(self.traffic)",
                    &cel::kind_in(TRAFFIC_TARGET_KINDS),
                    TRAFFIC_TARGET_MESSAGE,
                ))
                .rule(CelRule::targets_when(
                    &format!(
                        "has(self.traffic) && has(self.traffic.phase) && self.traffic.phase == '{}'",
                        TrafficPhase::PreRouting
                    ),
                    &cel::kind_in(PRE_ROUTING_TARGET_KINDS),
                    PRE_ROUTING_TARGET_MESSAGE,
                ))
                .rule(CelRule::targets_when(
                    "has(self.backend) && has(self.backend.mcp)",
                    &format!("t.kind != '{}'", TargetKind::Service),
                    BACKEND_MCP_MESSAGE,
                ))
                .rule(CelRule::targets_when(
                    "has(self.backend) && has(self.backend.ai)",
                    &format!("t.kind != '{}'", TargetKind::Service),
                    BACKEND_AI_MESSAGE,
                )),
        );
        patches.push(
            SchemaPatch::at(["spec", "traffic"])
                .group(FieldGroup::AgentgatewayTraffic)
                .group(FieldGroup::ExtAuth)
                .group(FieldGroup::RateLimit),
        );
        patches.push(
            SchemaPatch::at(["spec", "traffic", "entRateLimit", "global", "rateLimitConfigRefs"])
                .constraint(Constraint::Items(RATE_LIMIT_CONFIG_REFS)),
        );
        patches.push(
            SchemaPatch::at(["spec", "traffic", "entRateLimit", "global", "domain"])
                .constraint(Constraint::Length(RATE_LIMIT_DOMAIN)),
        );
        patches.push(SchemaPatch::at(["spec", "backend"]).group(FieldGroup::AgentgatewayBackend));
        patches
    }
}
