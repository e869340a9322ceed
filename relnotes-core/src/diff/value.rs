use std::fmt;

/// Scalar leaf of a change record
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Nested record compared by the change detector.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Leaf(Primitive),
    List(Vec<Value>),
    Node(Node),
}

/// String-keyed record that keeps insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    fields: Vec<(String, Value)>,
}

impl Node {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace in place, keeping the original position
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Collapse nested nodes into `(path, value)` pairs.
    ///
    /// Change records already carry full dot-joined paths at every level, so
    /// the leaf keys are used as-is.
    pub fn flatten_leaves(&self) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        for (key, value) in self.iter() {
            match value {
                Value::Node(child) => out.extend(child.flatten_leaves()),
                other => out.push((key.to_string(), other.clone())),
            }
        }
        out
    }
}

impl From<Primitive> for Value {
    fn from(p: Primitive) -> Self {
        Value::Leaf(p)
    }
}

impl From<Node> for Value {
    fn from(n: Node) -> Self {
        Value::Node(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Leaf(Primitive::Text(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Leaf(Primitive::Text(s))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Leaf(Primitive::Number(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Leaf(Primitive::Number(n as f64))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Leaf(Primitive::Number(f64::from(n)))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Leaf(Primitive::Bool(b))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Leaf(Primitive::Null),
            serde_json::Value::Bool(b) => Value::Leaf(Primitive::Bool(b)),
            serde_json::Value::Number(n) => {
                Value::Leaf(Primitive::Number(n.as_f64().unwrap_or(f64::NAN)))
            }
            serde_json::Value::String(s) => Value::Leaf(Primitive::Text(s)),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                let mut node = Node::new();
                for (k, v) in map {
                    node.insert(k, Value::from(v));
                }
                Value::Node(node)
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Leaf(Primitive::Null) => serde_json::Value::Null,
            Value::Leaf(Primitive::Bool(b)) => serde_json::Value::Bool(*b),
            Value::Leaf(Primitive::Number(n)) => number_to_json(*n),
            Value::Leaf(Primitive::Text(s)) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Node(node) => serde_json::Value::from(node),
        }
    }
}

impl From<&Node> for serde_json::Value {
    fn from(node: &Node) -> Self {
        let map = node
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
            .collect();
        serde_json::Value::Object(map)
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::Value::from(self))
    }
}
