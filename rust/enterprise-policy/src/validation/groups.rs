use strum::EnumIter;

use super::Rule;

/// How many members of a [`FieldGroup`] a document may set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cardinality {
    AtMostOne,
    ExactlyOne,
    AtLeastOne,
}

impl Cardinality {
    pub fn admits(self, set: usize) -> bool {
        match self {
            Cardinality::AtMostOne => set <= 1,
            Cardinality::ExactlyOne => set == 1,
            Cardinality::AtLeastOne => set >= 1,
        }
    }
}

/// Sibling fields that constrain each other's presence.
///
/// The member names are the serialized (camelCase) field names, so the same table drives both the
/// validator and the generated CEL rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter)]
pub enum FieldGroup {
    TargetSelection,
    PolicyContent,
    AgentgatewayTraffic,
    AgentgatewayBackend,
    ExtAuth,
    RateLimit,
    Transformation,
    EntExtAuthSource,
    WafSource,
    WafServer,
    JwtStages,
    JwtProviders,
    JwtValidationPolicy,
    ExtractionSource,
    BodySource,
    RequestMatch,
    DirectiveSource,

    // The following are modelled as enums, so decoding already guarantees them.
    // They are still listed so that the generated schema rejects them with a readable message.
    RbacMode,
    JwksSource,
    TransformationKind,
}

impl FieldGroup {
    pub fn members(self) -> &'static [&'static str] {
        match self {
            FieldGroup::TargetSelection => &["targetRefs", "targetSelectors"],
            FieldGroup::PolicyContent => &["frontend", "traffic", "backend"],
            FieldGroup::AgentgatewayTraffic => &[
                "transformation",
                "extProc",
                "extAuth",
                "rateLimit",
                "cors",
                "csrf",
                "headerModifiers",
                "hostRewrite",
                "timeouts",
                "retry",
                "authorization",
                "jwtAuthentication",
                "basicAuthentication",
                "apiKeyAuthentication",
                "entRateLimit",
                "entExtAuth",
            ],
            FieldGroup::AgentgatewayBackend => {
                &["tcp", "tls", "http", "auth", "mcp", "ai", "tokenExchange"]
            }
            FieldGroup::ExtAuth => &["extAuth", "entExtAuth"],
            FieldGroup::RateLimit => &["rateLimit", "entRateLimit"],
            FieldGroup::Transformation => &["transformation", "entTransformation"],
            FieldGroup::EntExtAuthSource => &["authConfigRef", "disable"],
            FieldGroup::WafSource => &["wafPolicyRef", "disable"],
            FieldGroup::WafServer => &["wafServer", "disable"],
            FieldGroup::JwtStages => &["beforeExtAuth", "afterExtAuth"],
            FieldGroup::JwtProviders => &["providers", "disable"],
            FieldGroup::JwtValidationPolicy => &["validationPolicy", "disable"],
            FieldGroup::ExtractionSource => &["body", "header"],
            FieldGroup::BodySource => &["body", "mergeJsonKeys"],
            FieldGroup::RequestMatch => &["prefix", "path", "regex", "connect"],
            FieldGroup::DirectiveSource => &["inline"],
            FieldGroup::RbacMode => &["disable", "policies"],
            FieldGroup::JwksSource => &["local", "remote"],
            FieldGroup::TransformationKind => &["template", "headerBody"],
        }
    }

    pub fn cardinality(self) -> Cardinality {
        match self {
            FieldGroup::TargetSelection
            | FieldGroup::EntExtAuthSource
            | FieldGroup::WafSource
            | FieldGroup::DirectiveSource
            | FieldGroup::RbacMode
            | FieldGroup::JwksSource
            | FieldGroup::TransformationKind => Cardinality::ExactlyOne,
            FieldGroup::PolicyContent
            | FieldGroup::AgentgatewayTraffic
            | FieldGroup::AgentgatewayBackend
            | FieldGroup::JwtStages => Cardinality::AtLeastOne,
            FieldGroup::ExtAuth
            | FieldGroup::RateLimit
            | FieldGroup::Transformation
            | FieldGroup::WafServer
            | FieldGroup::JwtProviders
            | FieldGroup::JwtValidationPolicy
            | FieldGroup::ExtractionSource
            | FieldGroup::BodySource
            | FieldGroup::RequestMatch => Cardinality::AtMostOne,
        }
    }

    /// The rule that a document breaks by setting `set` members of this group, if any.
    pub fn violated_rule(self, set: usize) -> Option<Rule> {
        if self.cardinality().admits(set) {
            return None;
        }
        Some(match (self, set) {
            (FieldGroup::TargetSelection, _) => Rule::TargetSelection,
            (FieldGroup::PolicyContent, _) => Rule::MissingPolicyContent,
            (_, 0) if self.cardinality() == Cardinality::AtLeastOne => Rule::EmptyFieldGroup,
            (_, 0) => Rule::MissingRequiredField,
            _ => Rule::ExclusiveFields,
        })
    }

    pub fn message(self) -> String {
        let members = self.members().join(", ");
        match self.cardinality() {
            Cardinality::AtMostOne => format!("at most one of [{members}] may be set"),
            Cardinality::ExactlyOne => format!("exactly one of [{members}] must be set"),
            Cardinality::AtLeastOne => format!("at least one of [{members}] must be set"),
        }
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_violated_rule() {
        assert_eq!(FieldGroup::TargetSelection.violated_rule(0), Some(Rule::TargetSelection));
        assert_eq!(FieldGroup::TargetSelection.violated_rule(1), None);
        assert_eq!(FieldGroup::TargetSelection.violated_rule(2), Some(Rule::TargetSelection));
        assert_eq!(FieldGroup::PolicyContent.violated_rule(0), Some(Rule::MissingPolicyContent));
        assert_eq!(FieldGroup::PolicyContent.violated_rule(3), None);
        assert_eq!(FieldGroup::ExtAuth.violated_rule(0), None);
        assert_eq!(FieldGroup::ExtAuth.violated_rule(2), Some(Rule::ExclusiveFields));
        assert_eq!(FieldGroup::WafSource.violated_rule(0), Some(Rule::MissingRequiredField));
        assert_eq!(FieldGroup::JwtStages.violated_rule(0), Some(Rule::EmptyFieldGroup));
    }

    #[test]
    fn test_members_are_unique() {
        for group in FieldGroup::iter() {
            let members = group.members();
            assert!(!members.is_empty(), "{group:?}");
            for (i, member) in members.iter().enumerate() {
                assert!(!members[..i].contains(member), "{group:?} repeats {member}");
            }
        }
    }
}
