//! Type tag resolution for decoding.
//!
//! Binary map headers and row stream headers carry integer type tags. The
//! decoder turns each tag into a fresh descriptor through a [`TypeRegistry`]
//! passed in by the caller, so there is no process-wide lookup table.

use std::collections::HashMap;

use super::meta::{ScalarKind, ValueMeta};

/// Constructor producing a fresh descriptor with default (normal) storage.
pub type TypeConstructor = fn() -> ValueMeta;

/// Mapping from type tag to descriptor constructor.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    constructors: HashMap<i32, TypeConstructor>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// A registry that resolves nothing.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry with every scalar kind and the map type registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for constructor in [
            ValueMeta::number as TypeConstructor,
            ValueMeta::string,
            ValueMeta::date,
            ValueMeta::boolean,
            ValueMeta::integer,
            ValueMeta::big_number,
            ValueMeta::binary,
            ValueMeta::default_map,
        ] {
            registry.register(constructor);
        }
        debug_assert_eq!(registry.len(), ScalarKind::ALL.len() + 1);
        registry
    }

    /// Register a constructor under the tag of the descriptor it builds.
    /// Returns the constructor it replaced, if any.
    pub fn register(&mut self, constructor: TypeConstructor) -> Option<TypeConstructor> {
        let tag = constructor().type_tag();
        self.constructors.insert(tag, constructor)
    }

    /// Fresh descriptor for `tag`, `None` when the tag is unknown.
    pub fn resolve(&self, tag: i32) -> Option<ValueMeta> {
        self.constructors.get(&tag).map(|constructor| constructor())
    }

    pub fn contains(&self, tag: i32) -> bool {
        self.constructors.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Registered tags in ascending order.
    pub fn tags(&self) -> Vec<i32> {
        let mut tags: Vec<i32> = self.constructors.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}
