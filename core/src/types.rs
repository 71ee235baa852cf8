//! The type registry: a dense, append-only mapping from declared type names
//! to a stable [`TypeIndex`] and a byte size.

use crate::consts::POINTER_TYPE_NAME;
use std::collections::HashMap;
use std::mem;

/// A small non-negative integer identifying a type in a [`TypeRegistry`].
///
/// `TypeIndex(0)` is reserved for the null/invalid type; looking up its size
/// is undefined. `TypeIndex(1)` is [`POINTER_TYPE`], the machine-word pointer
/// type. All user-declared types start at index 2.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(pub usize);

/// The reserved null/invalid type. Never appears as a user-facing type name.
pub const NULL_TYPE: TypeIndex = TypeIndex(0);

/// The reserved machine-word pointer type, named `"ptr"` in source.
pub const POINTER_TYPE: TypeIndex = TypeIndex(1);

/// A type's only property in this core: how many bytes it occupies. Size
/// zero is legal (an opaque marker type).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    pub size: usize,
}

/// Insertion-ordered, append-only bijection between type names and
/// [`TypeIndex`]es. Frozen (read-only) once compilation of a program begins;
/// nothing in this core ever inserts into a registry after parsing.
#[derive(Debug)]
pub struct TypeRegistry {
    names: HashMap<String, TypeIndex>,
    infos: Vec<TypeInfo>,
}

impl TypeRegistry {
    /// Creates a registry pre-seeded with the two reserved types: the null
    /// type at index 0, and [`POINTER_TYPE`] at index 1.
    pub fn new() -> Self {
        let mut names = HashMap::new();
        names.insert(POINTER_TYPE_NAME.to_string(), POINTER_TYPE);
        Self {
            names,
            infos: vec![
                TypeInfo { size: 0 },
                TypeInfo {
                    size: mem::size_of::<usize>(),
                },
            ],
        }
    }

    /// Declares a new type. Fails if `name` is already registered (including
    /// the reserved `"ptr"` name).
    pub fn insert(&mut self, name: impl Into<String>, info: TypeInfo) -> Result<TypeIndex, String> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(name);
        }
        let index = TypeIndex(self.infos.len());
        self.infos.push(info);
        self.names.insert(name, index);
        Ok(index)
    }

    /// Looks up a type by name.
    pub fn find(&self, name: &str) -> Option<TypeIndex> {
        self.names.get(name).copied()
    }

    /// Reverse lookup, used by diagnostics that need to name a type back to
    /// the user (e.g. [`crate::error::CompileError::StaticTypeMismatch`]).
    pub fn name_of(&self, index: TypeIndex) -> Option<&str> {
        self.names
            .iter()
            .find(|(_, &idx)| idx == index)
            .map(|(name, _)| name.as_str())
    }

    /// Returns the [`TypeInfo`] for an index. Panics if the index is out of
    /// range, which should not happen for any index produced by [`Self::find`]
    /// or [`Self::insert`] on this same registry.
    pub fn at(&self, index: TypeIndex) -> TypeInfo {
        self.infos[index.0]
    }

    /// Convenience: the byte size of a type.
    pub fn size_of(&self, index: TypeIndex) -> usize {
        self.at(index).size
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_types_are_preseeded() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.size_of(NULL_TYPE), 0);
        assert_eq!(registry.size_of(POINTER_TYPE), mem::size_of::<usize>());
        assert_eq!(registry.find("ptr"), Some(POINTER_TYPE));
    }

    #[test]
    fn insert_assigns_stable_indexes() {
        let mut registry = TypeRegistry::new();
        let u32_idx = registry.insert("u32", TypeInfo { size: 4 }).unwrap();
        let u8_idx = registry.insert("u8", TypeInfo { size: 1 }).unwrap();
        assert_eq!(u32_idx, TypeIndex(2));
        assert_eq!(u8_idx, TypeIndex(3));
        assert_eq!(registry.find("u32"), Some(u32_idx));
        assert_eq!(registry.size_of(u32_idx), 4);
    }

    #[test]
    fn duplicate_insert_fails() {
        let mut registry = TypeRegistry::new();
        registry.insert("u32", TypeInfo { size: 4 }).unwrap();
        assert!(registry.insert("u32", TypeInfo { size: 8 }).is_err());
    }

    #[test]
    fn duplicate_reserved_name_fails() {
        let mut registry = TypeRegistry::new();
        assert!(registry.insert("ptr", TypeInfo { size: 8 }).is_err());
    }
}
