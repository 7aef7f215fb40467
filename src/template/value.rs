//! Template values.
//!
//! Values fall into two groups. The portable ones (null, booleans, numbers,
//! strings and lists/maps of those) can be written into a page and read back
//! on a later request. [`Lazy`] and [`Opaque`] values only make sense inside
//! the request that produced them and are never serialized.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type Map = BTreeMap<String, Value>;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(Map),
    /// Computed on each lookup.
    Lazy(Lazy),
    /// A host object exposing read-only attributes, e.g. the current request.
    Opaque(Opaque),
}

/// A value computed on demand.
#[derive(Clone)]
pub struct Lazy(Arc<dyn Fn() -> Value + Send + Sync>);

impl Lazy {
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn force(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Lazy(..)")
    }
}

/// A host object seen through a fixed set of attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Opaque {
    type_name: String,
    attrs: Map,
    items: Vec<Value>,
}

impl Opaque {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attrs: Map::new(),
            items: Vec::new(),
        }
    }

    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Items yielded when the object is iterated in a `for` loop.
    #[must_use]
    pub fn items(mut self, items: Vec<Value>) -> Self {
        self.items = items;
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

impl Value {
    /// Resolves lazy values; every other value is returned unchanged.
    pub fn resolve(&self) -> Value {
        match self {
            Value::Lazy(lazy) => lazy.force(),
            other => other.clone(),
        }
    }

    /// Looks up an attribute, map key or list index.
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.get(name).cloned(),
            Value::Opaque(obj) => obj.attrs.get(name).cloned(),
            Value::List(items) => name.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            Value::Lazy(lazy) => lazy.force().get_attr(name),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Lazy(lazy) => lazy.force().is_truthy(),
            Value::Opaque(_) => true,
        }
    }

    /// Items to iterate over in a `for` loop; maps yield their keys.
    pub fn iter_items(&self) -> Vec<Value> {
        match self {
            Value::List(items) => items.clone(),
            Value::Map(map) => map.keys().cloned().map(Value::String).collect(),
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            Value::Opaque(obj) => obj.items.clone(),
            Value::Lazy(lazy) => lazy.force().iter_items(),
            _ => Vec::new(),
        }
    }

    /// Returns `true` if the value can be written out and read back on another request.
    pub fn is_portable(&self) -> bool {
        match self {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::String(_) => true,
            Value::Float(f) => f.is_finite(),
            Value::List(items) => items.iter().all(Value::is_portable),
            Value::Map(map) => map.values().all(Value::is_portable),
            Value::Lazy(_) | Value::Opaque(_) => false,
        }
    }

    /// Converts to a JSON value, or `None` if any part is not portable.
    pub fn to_portable(&self) -> Option<serde_json::Value> {
        Some(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::Number(serde_json::Number::from_f64(*f)?),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(Value::to_portable).collect::<Option<_>>()?,
            ),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| Some((k.clone(), v.to_portable()?)))
                    .collect::<Option<_>>()?,
            ),
            Value::Lazy(_) | Value::Opaque(_) => return None,
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl From<Opaque> for Value {
    fn from(obj: Opaque) -> Self {
        Value::Opaque(obj)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Lazy(a), Value::Lazy(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::List(items) => f.debug_list().entries(items).finish(),
            Value::Map(map) => f.debug_map().entries(map).finish(),
            Value::Lazy(lazy) => fmt::Debug::fmt(lazy, f),
            Value::Opaque(obj) => write!(f, "<{}>", obj.type_name),
        }
    }
}

/// Rendered form of a value.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Lazy(lazy) => write!(f, "{}", lazy.force()),
            Value::Opaque(obj) => write!(f, "<{}>", obj.type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portable_values_survive_json() {
        let mut map = Map::new();
        map.insert("n".into(), Value::Int(3));
        map.insert("f".into(), Value::Float(1.5));
        map.insert("items".into(), Value::List(vec!["a".into(), Value::Bool(true)]));
        let value = Value::Map(map);

        let json = value.to_portable().unwrap();
        assert_eq!(Value::from(json), value);
    }

    #[test]
    fn runtime_values_are_not_portable() {
        let lazy = Value::Lazy(Lazy::new(|| Value::from("x")));
        let request = Value::from(Opaque::new("request").attr("path", "/"));
        assert!(!lazy.is_portable());
        assert!(!request.is_portable());
        assert!(Value::List(vec![lazy]).to_portable().is_none());
        assert!(Value::Float(f64::NAN).to_portable().is_none());
    }

    #[test]
    fn attribute_lookup() {
        let request = Value::from(Opaque::new("request").attr("path", "/a/"));
        assert_eq!(request.get_attr("path"), Some(Value::from("/a/")));
        let list = Value::List(vec![Value::Int(7)]);
        assert_eq!(list.get_attr("0"), Some(Value::Int(7)));
        assert_eq!(list.get_attr("x"), None);
    }

    #[test]
    fn display_renders_null_as_empty() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::List(vec![Value::Int(1), "b".into()]).to_string(), "[1, b]");
    }
}
