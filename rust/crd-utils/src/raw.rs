use serde::{Deserialize, Serialize};
use stackable_operator::schemars::{self, JsonSchema, gen::SchemaGenerator, schema::Schema};

/// Configuration owned by the upstream (open source) gateway APIs.
///
/// The enterprise APIs only care whether such a field is set and how it combines across
/// attachment levels, so its contents are carried through without interpretation.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(transparent)]
pub struct RawConfig(#[schemars(schema_with = "raw_config_schema")] pub serde_json::Value);

impl RawConfig {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<serde_json::Value> for RawConfig {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

// Structural schemas may not use the "anything goes" schema that schemars emits for `Value`
fn raw_config_schema(_: &mut SchemaGenerator) -> Schema {
    serde_json::from_value(serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
    }))
    .expect("Failed to parse JSON of raw config schema")
}
