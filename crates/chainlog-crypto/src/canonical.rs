use chainlog_types::Metadata;
use serde_json::{Map, Value};

/// Deterministic textual form of entry metadata.
///
/// Compact JSON object, keys in byte-wise ascending order, values as JSON
/// strings with standard escaping. An empty map renders as `{}`. The output
/// is self-delimiting, which keeps the chain hash preimage unambiguous even
/// though the actor id that follows it has no fixed width.
pub fn canonical_metadata(metadata: &Metadata) -> String {
    let object: Map<String, Value> = metadata
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(object).to_string()
}
