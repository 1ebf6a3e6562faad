//! Field-by-field merging of configuration tiers.

use serde_json::Value;

/// Merge `overlay` onto `base`; overlay wins.
///
/// Maps merge key by key, recursively. Everything else (lists included) is
/// replaced wholesale. A null overlay leaves the base untouched, so a YAML key
/// present but left empty does not erase a lower tier.
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Fold a list of tiers, lowest priority first.
pub fn deep_merge_all(tiers: impl IntoIterator<Item = Value>) -> Value {
    tiers.into_iter().fold(Value::Null, deep_merge)
}
