//! Recursive removal of thinking blocks from session records.
//!
//! A thinking block is any JSON object whose `"type"` field is `"thinking"`
//! or `"redacted_thinking"`. Blocks are detected at any depth and dropped
//! whole, without visiting their children.

use serde_json::Value;

/// Result of filtering one JSON subtree.
///
/// `Removed` is a dedicated marker distinct from every legal JSON value, so
/// a record whose content is literally `null` is never confused with a
/// dropped block.
#[derive(Debug, Clone, PartialEq)]
pub enum Filtered {
    /// The subtree survives, possibly with nested blocks stripped out.
    Kept(Value),
    /// The entire subtree was a thinking block; omit it from the parent.
    Removed,
}

fn is_thinking_block(map: &serde_json::Map<String, Value>) -> bool {
    map.get("type")
        .and_then(Value::as_str)
        .map_or(false, |t| t == "thinking" || t == "redacted_thinking")
}

/// Strip every thinking block from `value`, returning the cleaned value (or
/// [`Filtered::Removed`] when the whole value was a block) and the number of
/// blocks removed, nested ones included.
///
/// Object key order and array element order are preserved.
pub fn strip_thinking(value: Value) -> (Filtered, usize) {
    match value {
        Value::Object(map) => {
            if is_thinking_block(&map) {
                return (Filtered::Removed, 1);
            }
            let mut removed = 0;
            let mut cleaned = serde_json::Map::with_capacity(map.len());
            for (key, child) in map {
                let (result, count) = strip_thinking(child);
                removed += count;
                if let Filtered::Kept(child) = result {
                    cleaned.insert(key, child);
                }
            }
            (Filtered::Kept(Value::Object(cleaned)), removed)
        }
        Value::Array(items) => {
            let mut removed = 0;
            let mut cleaned = Vec::with_capacity(items.len());
            for item in items {
                let (result, count) = strip_thinking(item);
                removed += count;
                if let Filtered::Kept(item) = result {
                    cleaned.push(item);
                }
            }
            (Filtered::Kept(Value::Array(cleaned)), removed)
        }
        scalar => (Filtered::Kept(scalar), 0),
    }
}
