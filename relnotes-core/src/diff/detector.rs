use super::value::{Node, Value};
use crate::translator::needs_translation;

/// Changed paths of `current` relative to `previous`.
///
/// Nested results are stored under their full dot-joined path, and so are
/// the keys inside them. Keys that only exist in `previous` are ignored.
pub fn detect_changes(current: &Node, previous: Option<&Node>) -> Node {
    let empty = Node::new();
    diff_node(current, previous.unwrap_or(&empty), "")
}

fn diff_node(current: &Node, previous: &Node, prefix: &str) -> Node {
    let mut changes = Node::new();

    for (key, value) in current.iter() {
        let full_key = join_path(prefix, key);
        let prev = previous.get(key);

        match value {
            Value::Node(child) => {
                let empty = Node::new();
                let prev_child = match prev {
                    Some(Value::Node(p)) => p,
                    _ => &empty,
                };
                let nested = diff_node(child, prev_child, &full_key);
                if !nested.is_empty() {
                    changes.insert(full_key, Value::Node(nested));
                }
            }
            // Lists compare structurally and are replaced wholesale
            Value::List(_) | Value::Leaf(_) => {
                if prev != Some(value) {
                    changes.insert(full_key, value.clone());
                }
            }
        }
    }

    changes
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Strings in a change record worth sending to the translator, keyed by path.
///
/// List items are addressed as `path[i]`.
pub fn extract_translatable_texts(changes: &Node) -> Vec<(String, String)> {
    let mut texts = Vec::new();
    for (path, value) in changes.flatten_leaves() {
        collect_texts(&path, &value, &mut texts);
    }
    texts
}

fn collect_texts(path: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Leaf(super::Primitive::Text(text)) => {
            if needs_translation(text) {
                out.push((path.to_string(), text.clone()));
            }
        }
        Value::Leaf(_) => {}
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                match item {
                    Value::Leaf(_) | Value::Node(_) => collect_texts(&item_path, item, out),
                    // Nested lists are not walked
                    Value::List(_) => {}
                }
            }
        }
        Value::Node(node) => {
            for (key, child) in node.iter() {
                collect_texts(&join_path(path, key), child, out);
            }
        }
    }
}
