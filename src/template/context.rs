//! Layered variable scopes.
//!
//! A [`Context`] is a stack of layers. Lookups walk from the innermost
//! (most recently pushed) layer outwards, so inner bindings shadow outer ones.
//! A layer is either a plain mapping or a whole nested context.

use std::collections::BTreeSet;

use super::value::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Mapping(Map),
    Layered(Context),
}

impl Layer {
    fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Layer::Mapping(map) => map.get(name),
            Layer::Layered(ctx) => ctx.get(name),
        }
    }
}

/// A stack of variable scopes, outermost first.
///
/// # Examples
///
/// ```
/// use phased::template::{Context, Value};
///
/// let mut ctx = Context::new();
/// ctx.set("name", "outer");
/// ctx.push();
/// ctx.set("name", "inner");
/// assert_eq!(ctx.get("name"), Some(&Value::from("inner")));
/// ctx.pop();
/// assert_eq!(ctx.get("name"), Some(&Value::from("outer")));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    layers: Vec<Layer>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with a single empty mapping layer.
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::Mapping(Map::new())],
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            layers: vec![Layer::Mapping(map)],
        }
    }

    /// Returns the innermost binding for `name` without resolving lazy values.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.layers.iter().rev().find_map(|layer| layer.get(name))
    }

    /// Returns the innermost binding for `name`, resolving lazy values.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        self.get(name).map(Value::resolve)
    }

    /// Resolves a dotted path such as `request.path`.
    pub fn resolve_path(&self, path: &str) -> Option<Value> {
        let mut parts = path.split('.');
        let mut value = self.resolve(parts.next()?)?;
        for part in parts {
            value = value.get_attr(part)?.resolve();
        }
        Some(value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Binds `name` in the innermost mapping layer.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        if !matches!(self.layers.last(), Some(Layer::Mapping(_))) {
            self.layers.push(Layer::Mapping(Map::new()));
        }
        if let Some(Layer::Mapping(map)) = self.layers.last_mut() {
            map.insert(name.into(), value.into());
        }
    }

    /// Pushes an empty mapping layer.
    pub fn push(&mut self) {
        self.layers.push(Layer::Mapping(Map::new()));
    }

    /// Pushes `map` as a new innermost layer.
    pub fn update(&mut self, map: Map) {
        self.layers.push(Layer::Mapping(map));
    }

    /// Pushes a whole context as a new innermost layer.
    pub fn push_context(&mut self, ctx: Context) {
        self.layers.push(Layer::Layered(ctx));
    }

    /// Pops the innermost layer. The outermost layer is never removed.
    pub fn pop(&mut self) -> Option<Layer> {
        if self.layers.len() > 1 {
            self.layers.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Collapses the stack into one mapping holding each name's innermost binding.
    ///
    /// With `remove_lazy`, names whose innermost binding is not portable are
    /// left out entirely; an outer portable binding for the same name does not
    /// take its place.
    pub fn flatten(&self, remove_lazy: bool) -> Map {
        let mut seen = BTreeSet::new();
        let mut flat = Map::new();
        self.flatten_into(&mut seen, &mut flat, remove_lazy);
        flat
    }

    fn flatten_into(&self, seen: &mut BTreeSet<String>, flat: &mut Map, remove_lazy: bool) {
        for layer in self.layers.iter().rev() {
            match layer {
                Layer::Mapping(map) => {
                    for (name, value) in map {
                        if !seen.insert(name.clone()) {
                            continue;
                        }
                        if remove_lazy && !value.is_portable() {
                            continue;
                        }
                        flat.insert(name.clone(), value.clone());
                    }
                }
                Layer::Layered(ctx) => ctx.flatten_into(seen, flat, remove_lazy),
            }
        }
    }
}

impl From<Map> for Context {
    fn from(map: Map) -> Self {
        Self::from_map(map)
    }
}
