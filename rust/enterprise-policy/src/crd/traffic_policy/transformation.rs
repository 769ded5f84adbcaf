//! Enterprise request and response transformations, applied in up to three stages of request processing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use stackable_operator::schemars::{self, JsonSchema};

use crate::{
    cel::{CelRule, Constraint, SchemaPatch, ITEMS, VALUES},
    validation::{Bounds, FieldGroup, FieldPath, Rule, Validate, Validator},
};

const MATCHERS: Bounds = Bounds::at_most(32);
const TEMPLATE_ENTRIES: Bounds = Bounds::at_most(32);
const MATCH_ENTRIES: Bounds = Bounds::at_most(32);
const REGEX: Bounds = Bounds::new(1, 4096);
const HEADER_NAME: Bounds = Bounds::new(1, 4096);
const PATH: Bounds = Bounds::new(1, 1024);

const STAGES: [&str; 3] = ["early", "regular", "postRouting"];

const REPLACEMENT_REQUIRED_MESSAGE: &str =
    "replacementText must be set when mode is SingleReplace or ReplaceAll";
const REPLACE_ALL_SUBGROUP_MESSAGE: &str = "subgroup must be 0 when mode is ReplaceAll";
const BODY_REQUIRED_MESSAGE: &str = "body must be set when type is Body";
const MERGE_JSON_KEYS_REQUIRED_MESSAGE: &str = "mergeJsonKeys must be set when type is MergeJsonKeys";

/// An [Inja](https://github.com/pantor/inja) template.
pub type InjaTemplate = String;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntTransformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<StagedTransformations>,

    /// Converts between HTTP requests and AWS Lambda invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_lambda: Option<AwsLambdaTransformation>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StagedTransformations {
    /// Runs before all other filters, including external auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early: Option<RequestResponseTransformations>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular: Option<RequestResponseTransformations>,

    /// Runs after the route has been selected, in the upstream filter chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_routing: Option<RequestResponseTransformations>,

    /// Logs the request and response as seen before and after each transformation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_request_response_info: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escape_characters: Option<EscapeCharacters>,
}

/// The first matcher that matches a request (or response) selects the transformation applied to it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponseTransformations {
    /// At most 32 entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requests: Vec<RequestMatcher>,

    /// At most 32 entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub responses: Vec<ResponseMatcher>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatcher {
    /// Matches all requests if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<TransformationRequestMatcher>,

    /// Reselects the route after the transformation has been applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_route_cache: Option<bool>,

    pub request_transformation: Transformation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_transformation: Option<Transformation>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMatcher {
    /// Response headers that must all match. At most 32 entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<HeaderMatcher>,

    /// Matches the Envoy response code details, such as `via_upstream`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_code_details: Option<String>,

    pub response_transformation: Transformation,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Transformation {
    Template(TransformationTemplate),

    /// Turns the headers and body into a JSON body.
    HeaderBody(HeaderBodyTransform),
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderBodyTransform {
    /// Also adds the request path, method and query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_request_metadata: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransformationTemplate {
    /// Lets templates refer to JSON body fields by JSON pointer instead of dot notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advanced_templates: Option<bool>,

    /// Values extracted from the request, by the name templates refer to them with. At most 32 entries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extractors: BTreeMap<String, Extraction>,

    /// Headers to set, by header name. At most 32 entries.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, InjaTemplate>,

    /// At most 32 entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers_to_append: Vec<HeaderToAppend>,

    /// At most 32 entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers_to_remove: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_transformation: Option<BodyTransformation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_body_behavior: Option<ParseBodyBehavior>,

    /// Keep going if the body cannot be parsed as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_error_on_parse: Option<bool>,

    /// At most 32 entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_metadata_values: Vec<DynamicMetadataValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escape_characters: Option<EscapeCharacters>,

    /// Renames the tracing span of the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_transformer: Option<SpanTransformer>,
}

/// Extracts a value from a header or the body with a regular expression.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    /// The header to extract from. Mutually exclusive with `body`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    /// Extract from the body. Mutually exclusive with `header`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<bool>,

    /// Must match the entire source.
    pub regex: String,

    /// The capture group to extract. Defaults to 0, the whole match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup: Option<i32>,

    /// Required for the `SingleReplace` and `ReplaceAll` modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_text: Option<String>,

    /// Defaults to `Extract`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ExtractionMode>,
}

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, strum::Display,
)]
pub enum ExtractionMode {
    Extract,
    /// Replaces the captured subgroup with `replacementText`.
    SingleReplace,
    /// Replaces every match of the whole regex with `replacementText`.
    ReplaceAll,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderToAppend {
    pub key: String,
    pub value: InjaTemplate,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DynamicMetadataValue {
    /// Defaults to the transformation filter's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_namespace: Option<String>,

    pub key: String,
    pub value: InjaTemplate,

    /// Parse the rendered value as JSON instead of storing it as a string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_to_proto: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpanTransformer {
    pub name: InjaTemplate,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BodyTransformation {
    #[serde(rename = "type")]
    pub type_: BodyTransformationType,

    /// The new body. Required for type `Body`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<InjaTemplate>,

    /// Required for type `MergeJsonKeys`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_json_keys: Option<BTreeMap<String, OverridableTemplate>>,
}

#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema, strum::Display,
)]
pub enum BodyTransformationType {
    Body,
    Passthrough,
    /// Writes the extracted values to the body, as a JSON object.
    MergeExtractorsToBody,
    MergeJsonKeys,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverridableTemplate {
    pub tmpl: InjaTemplate,

    /// Also set the key if the template renders to an empty string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_empty: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ParseBodyBehavior {
    ParseAsJson,
    DontParse,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum EscapeCharacters {
    Escape,
    DontEscape,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AwsLambdaTransformation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_format: Option<AwsLambdaFormat>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<AwsLambdaFormat>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum AwsLambdaFormat {
    #[serde(rename = "APIGateway")]
    ApiGateway,
}

/// Selects the requests that a transformation applies to.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransformationRequestMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Must match the whole path, without the query string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    /// Matches CONNECT requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<bool>,

    /// Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,

    /// At most 32 entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatcher>,

    /// At most 32 entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_parameters: Vec<QueryParameterMatcher>,

    /// At most 32 entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderMatcher {
    pub name: String,

    /// Only checks that the header is present if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Treat `value` as a regular expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invert_match: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameterMatcher {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<bool>,
}

impl EntTransformation {
    /// The configured stages, with their serialized names.
    fn stages(&self) -> impl Iterator<Item = (&'static str, &RequestResponseTransformations)> {
        self.stages.iter().flat_map(|stages| {
            STAGES
                .into_iter()
                .zip([&stages.early, &stages.regular, &stages.post_routing])
                .filter_map(|(name, stage)| Some((name, stage.as_ref()?)))
        })
    }
}

impl Validate for EntTransformation {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        let stages_path = path.field("stages");
        for (name, stage) in self.stages() {
            stage.validate_at(&stages_path.field(name), validator);
        }
    }
}

impl Validate for RequestResponseTransformations {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        let requests_path = path.field("requests");
        validator.items(&requests_path, self.requests.len(), MATCHERS);
        for (i, request) in self.requests.iter().enumerate() {
            let request_path = requests_path.index(i);
            if let Some(matcher) = &request.matcher {
                matcher.validate_at(&request_path.field("matcher"), validator);
            }
            request
                .request_transformation
                .validate_at(&request_path.field("requestTransformation"), validator);
            if let Some(response_transformation) = &request.response_transformation {
                response_transformation
                    .validate_at(&request_path.field("responseTransformation"), validator);
            }
        }

        let responses_path = path.field("responses");
        validator.items(&responses_path, self.responses.len(), MATCHERS);
        for (i, response) in self.responses.iter().enumerate() {
            let response_path = responses_path.index(i);
            validator.items(
                &response_path.field("matchers"),
                response.matchers.len(),
                MATCH_ENTRIES,
            );
            response
                .response_transformation
                .validate_at(&response_path.field("responseTransformation"), validator);
        }
    }
}

impl Validate for Transformation {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        match self {
            Transformation::Template(template) => {
                template.validate_at(&path.field("template"), validator)
            }
            Transformation::HeaderBody(_) => {}
        }
    }
}

impl Validate for TransformationTemplate {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        let extractors_path = path.field("extractors");
        validator.properties(&extractors_path, self.extractors.len(), TEMPLATE_ENTRIES);
        for (name, extraction) in &self.extractors {
            extraction.validate_at(&extractors_path.key(name), validator);
        }

        validator.properties(&path.field("headers"), self.headers.len(), TEMPLATE_ENTRIES);

        let append_path = path.field("headersToAppend");
        validator.items(&append_path, self.headers_to_append.len(), TEMPLATE_ENTRIES);
        for (i, header) in self.headers_to_append.iter().enumerate() {
            validator.length(&append_path.index(i).field("key"), &header.key, HEADER_NAME);
        }

        validator.items(
            &path.field("headersToRemove"),
            self.headers_to_remove.len(),
            TEMPLATE_ENTRIES,
        );

        let metadata_path = path.field("dynamicMetadataValues");
        validator.items(
            &metadata_path,
            self.dynamic_metadata_values.len(),
            TEMPLATE_ENTRIES,
        );
        for (i, value) in self.dynamic_metadata_values.iter().enumerate() {
            validator.length(&metadata_path.index(i).field("key"), &value.key, HEADER_NAME);
        }

        if let Some(body) = &self.body_transformation {
            body.validate_at(&path.field("bodyTransformation"), validator);
        }
    }
}

impl Validate for Extraction {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validator.group(
            path,
            FieldGroup::ExtractionSource,
            &[self.body.is_some(), self.header.is_some()],
        );
        if let Some(header) = &self.header {
            validator.length(&path.field("header"), header, HEADER_NAME);
        }
        validator.length(&path.field("regex"), &self.regex, REGEX);
        if let Some(subgroup) = self.subgroup {
            validator.minimum(&path.field("subgroup"), subgroup.into(), 0);
        }

        match self.mode {
            Some(ExtractionMode::SingleReplace | ExtractionMode::ReplaceAll)
                if self.replacement_text.is_none() =>
            {
                validator.report(
                    Rule::ExtractionReplacement,
                    path.field("replacementText"),
                    REPLACEMENT_REQUIRED_MESSAGE,
                );
            }
            _ => {}
        }
        if self.mode == Some(ExtractionMode::ReplaceAll) && self.subgroup.is_some_and(|s| s != 0) {
            validator.report(
                Rule::ExtractionReplacement,
                path.field("subgroup"),
                REPLACE_ALL_SUBGROUP_MESSAGE,
            );
        }
    }
}

impl Validate for BodyTransformation {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validator.group(
            path,
            FieldGroup::BodySource,
            &[self.body.is_some(), self.merge_json_keys.is_some()],
        );
        match self.type_ {
            BodyTransformationType::Body if self.body.is_none() => validator.report(
                Rule::BodyTransformationContent,
                path.field("body"),
                BODY_REQUIRED_MESSAGE,
            ),
            BodyTransformationType::MergeJsonKeys if self.merge_json_keys.is_none() => validator
                .report(
                    Rule::BodyTransformationContent,
                    path.field("mergeJsonKeys"),
                    MERGE_JSON_KEYS_REQUIRED_MESSAGE,
                ),
            _ => {}
        }
    }
}

impl Validate for TransformationRequestMatcher {
    fn validate_at(&self, path: &FieldPath, validator: &mut Validator) {
        validator.group(
            path,
            FieldGroup::RequestMatch,
            &[
                self.prefix.is_some(),
                self.path.is_some(),
                self.regex.is_some(),
                self.connect.is_some(),
            ],
        );
        if let Some(prefix) = &self.prefix {
            validator.length(&path.field("prefix"), prefix, PATH);
        }
        if let Some(exact) = &self.path {
            validator.length(&path.field("path"), exact, PATH);
        }
        if let Some(regex) = &self.regex {
            validator.length(&path.field("regex"), regex, REGEX);
        }
        validator.items(&path.field("headers"), self.headers.len(), MATCH_ENTRIES);
        validator.items(
            &path.field("queryParameters"),
            self.query_parameters.len(),
            MATCH_ENTRIES,
        );
        validator.items(&path.field("methods"), self.methods.len(), MATCH_ENTRIES);
    }
}

/// Builds schema paths below one node.
struct At<'a>(Vec<&'a str>);

impl<'a> At<'a> {
    fn join(&self, segments: impl IntoIterator<Item = &'a str>) -> Self {
        Self(self.0.iter().copied().chain(segments).collect())
    }

    fn patch(&self) -> SchemaPatch {
        SchemaPatch::at(self.0.iter().copied())
    }
}

fn template_patches(template: &At) -> Vec<SchemaPatch> {
    let extraction = template.join(["extractors", VALUES]);
    let body = template.join(["bodyTransformation"]);
    vec![
        template
            .join(["extractors"])
            .patch()
            .constraint(Constraint::Properties(TEMPLATE_ENTRIES)),
        template
            .join(["headers"])
            .patch()
            .constraint(Constraint::Properties(TEMPLATE_ENTRIES)),
        template
            .join(["headersToAppend"])
            .patch()
            .constraint(Constraint::Items(TEMPLATE_ENTRIES)),
        template
            .join(["headersToAppend", ITEMS, "key"])
            .patch()
            .constraint(Constraint::Length(HEADER_NAME)),
        template
            .join(["headersToRemove"])
            .patch()
            .constraint(Constraint::Items(TEMPLATE_ENTRIES)),
        template
            .join(["dynamicMetadataValues"])
            .patch()
            .constraint(Constraint::Items(TEMPLATE_ENTRIES)),
        template
            .join(["dynamicMetadataValues", ITEMS, "key"])
            .patch()
            .constraint(Constraint::Length(HEADER_NAME)),
        extraction
            .patch()
            .group(FieldGroup::ExtractionSource)
            .rule(CelRule::new(
                format!(
                    "!has(self.mode) || self.mode == '{}' || has(self.replacementText)",
                    ExtractionMode::Extract
                ),
                REPLACEMENT_REQUIRED_MESSAGE,
            ))
            .rule(CelRule::new(
                format!(
                    "!has(self.mode) || self.mode != '{}' || !has(self.subgroup) || self.subgroup == 0",
                    ExtractionMode::ReplaceAll
                ),
                REPLACE_ALL_SUBGROUP_MESSAGE,
            )),
        extraction
            .join(["header"])
            .patch()
            .constraint(Constraint::Length(HEADER_NAME)),
        extraction
            .join(["regex"])
            .patch()
            .constraint(Constraint::Length(REGEX)),
        extraction
            .join(["subgroup"])
            .patch()
            .constraint(Constraint::Minimum(0)),
        body.patch()
            .group(FieldGroup::BodySource)
            .rule(CelRule::new(
                format!(
                    "self.type != '{}' || has(self.body)",
                    BodyTransformationType::Body
                ),
                BODY_REQUIRED_MESSAGE,
            ))
            .rule(CelRule::new(
                format!(
                    "self.type != '{}' || has(self.mergeJsonKeys)",
                    BodyTransformationType::MergeJsonKeys
                ),
                MERGE_JSON_KEYS_REQUIRED_MESSAGE,
            )),
    ]
}

fn kind_patches(transformation: &At) -> Vec<SchemaPatch> {
    let mut patches = vec![transformation.patch().group(FieldGroup::TransformationKind)];
    patches.extend(template_patches(&transformation.join(["template"])));
    patches
}

pub(super) fn transformation_patches(base: &[&str]) -> Vec<SchemaPatch> {
    let stages = At(base.to_vec()).join(["stages"]);
    let mut patches = Vec::new();
    for stage in STAGES {
        let stage = stages.join([stage]);
        let request = stage.join(["requests", ITEMS]);
        let matcher = request.join(["matcher"]);
        let response = stage.join(["responses", ITEMS]);
        patches.extend([
            stage
                .join(["requests"])
                .patch()
                .constraint(Constraint::Items(MATCHERS)),
            stage
                .join(["responses"])
                .patch()
                .constraint(Constraint::Items(MATCHERS)),
            response
                .join(["matchers"])
                .patch()
                .constraint(Constraint::Items(MATCH_ENTRIES)),
            matcher.patch().group(FieldGroup::RequestMatch),
            matcher
                .join(["prefix"])
                .patch()
                .constraint(Constraint::Length(PATH)),
            matcher
                .join(["path"])
                .patch()
                .constraint(Constraint::Length(PATH)),
            matcher
                .join(["regex"])
                .patch()
                .constraint(Constraint::Length(REGEX)),
            matcher
                .join(["headers"])
                .patch()
                .constraint(Constraint::Items(MATCH_ENTRIES)),
            matcher
                .join(["queryParameters"])
                .patch()
                .constraint(Constraint::Items(MATCH_ENTRIES)),
            matcher
                .join(["methods"])
                .patch()
                .constraint(Constraint::Items(MATCH_ENTRIES)),
        ]);
        patches.extend(kind_patches(&request.join(["requestTransformation"])));
        patches.extend(kind_patches(&request.join(["responseTransformation"])));
        patches.extend(kind_patches(&response.join(["responseTransformation"])));
    }
    patches
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(input: &str) -> EntTransformation {
        let deserializer = serde_yaml::Deserializer::from_str(input);
        serde_yaml::with::singleton_map_recursive::deserialize(deserializer).unwrap()
    }

    fn validate(transformation: &EntTransformation) -> Result<(), crate::validation::Violations> {
        let mut validator = Validator::new();
        transformation.validate_at(
            &FieldPath::spec().field("entTransformation"),
            &mut validator,
        );
        validator.finish()
    }

    #[test]
    fn test_valid_transformation() {
        let transformation = parse(
            r#"
            stages:
              regular:
                requests:
                - matcher:
                    prefix: /api
                    methods: [POST]
                  clearRouteCache: true
                  requestTransformation:
                    template:
                      extractors:
                        user:
                          header: x-user
                          regex: "user-(.*)"
                          subgroup: 1
                        masked:
                          body: true
                          regex: "[0-9]{16}"
                          mode: ReplaceAll
                          replacementText: "****"
                      headers:
                        x-user-id: "{{ user }}"
                      bodyTransformation:
                        type: Body
                        body: '{"user": "{{ user }}"}'
                responses:
                - matchers:
                  - name: content-type
                    value: application/json
                  responseTransformation:
                    headerBody:
                      addRequestMetadata: true
            awsLambda:
              requestFormat: APIGateway
            "#,
        );
        assert_eq!(validate(&transformation), Ok(()));
        let stages = transformation.stages.unwrap();
        assert!(stages.early.is_none());
        assert_eq!(
            transformation.aws_lambda.unwrap().request_format,
            Some(AwsLambdaFormat::ApiGateway)
        );
    }

    // An extractor without replacement text
    #[test]
    fn test_extraction_rules() {
        let transformation = parse(
            r#"
            stages:
              early:
                requests:
                - requestTransformation:
                    template:
                      extractors:
                        both:
                          body: true
                          header: x-id
                          regex: ".*"
                        replace:
                          header: x-id
                          regex: "(.*)"
                          subgroup: 1
                          mode: ReplaceAll
            "#,
        );
        let violations = validate(&transformation).unwrap_err();
        assert_eq!(
            violations.rules(),
            [
                Rule::ExclusiveFields,
                Rule::ExtractionReplacement,
                Rule::ExtractionReplacement,
            ]
        );
        assert_eq!(
            violations.iter().nth(1).unwrap().path.to_string(),
            "spec.entTransformation.stages.early.requests[0].requestTransformation.template.extractors[replace].replacementText"
        );
    }

    #[test]
    fn test_body_transformation_content() {
        let mut transformation = parse(
            r#"
            stages:
              postRouting:
                responses:
                - responseTransformation:
                    template:
                      bodyTransformation:
                        type: MergeJsonKeys
            "#,
        );
        assert_eq!(
            validate(&transformation).unwrap_err().rules(),
            [Rule::BodyTransformationContent]
        );

        let stage = transformation
            .stages
            .as_mut()
            .and_then(|stages| stages.post_routing.as_mut())
            .unwrap();
        let Transformation::Template(template) = &mut stage.responses[0].response_transformation
        else {
            panic!("expected a template");
        };
        let body = template.body_transformation.as_mut().unwrap();
        body.body = Some("{}".to_string());
        body.merge_json_keys = Some(BTreeMap::new());
        assert_eq!(
            validate(&transformation).unwrap_err().rules(),
            [Rule::ExclusiveFields]
        );
    }

    #[test]
    fn test_request_matcher() {
        let transformation = parse(
            r#"
            stages:
              regular:
                requests:
                - matcher:
                    prefix: /
                    path: /exact
                    regex: ""
                  requestTransformation:
                    headerBody: {}
            "#,
        );
        assert_eq!(
            validate(&transformation).unwrap_err().rules(),
            [Rule::ExclusiveFields, Rule::FieldBounds]
        );
    }

    #[test]
    fn test_template_limits() {
        let template = TransformationTemplate {
            headers_to_remove: vec!["x-debug".to_string(); 33],
            ..TransformationTemplate::default()
        };
        let transformation = EntTransformation {
            stages: Some(StagedTransformations {
                early: Some(RequestResponseTransformations {
                    requests: vec![
                        RequestMatcher {
                            matcher: None,
                            clear_route_cache: None,
                            request_transformation: Transformation::Template(template),
                            response_transformation: None,
                        };
                        33
                    ],
                    responses: Vec::new(),
                }),
                ..StagedTransformations::default()
            }),
            aws_lambda: None,
        };
        let violations = validate(&transformation).unwrap_err();
        // One for the list of requests, and one for each of its templates
        assert_eq!(violations.len(), 34);
        assert!(violations.iter().all(|v| v.rule == Rule::FieldBounds));
    }
}
