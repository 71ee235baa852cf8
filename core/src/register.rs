//! Register files: the two register kinds (`dyvarb`, `stvarb`) that make up
//! one activation's addressable storage.

use crate::data::DataPointer;
use crate::types::{TypeIndex, TypeRegistry, NULL_TYPE};
use std::rc::Rc;

/// A dynamic register (`dyvarb`). Both its type and its data can change from
/// one instruction to the next. `data` is `None` until first written.
///
/// Dynamic registers share ownership of their backing buffer via `Rc`: when
/// `mov` aliases two dyvarbs, both registers end up holding clones of the
/// same `Rc`, and the buffer is freed once the last clone is dropped.
#[derive(Clone, Debug)]
pub struct DynamicRegister {
    pub data: Option<Rc<DataPointer>>,
    pub ty: TypeIndex,
}

impl Default for DynamicRegister {
    fn default() -> Self {
        Self {
            data: None,
            ty: NULL_TYPE,
        }
    }
}

/// A static register (`stvarb`). Its type is fixed at function-definition
/// time; its buffer is exclusively owned and mutated in place, never shared.
#[derive(Clone, Debug)]
pub struct StaticRegister {
    pub data: DataPointer,
    pub ty: TypeIndex,
}

/// The register storage for one environment: a vector of dynamic registers
/// followed conceptually by a vector of static registers. The two are kept
/// in separate `Vec`s; the unqualified `%N` naming scheme's dyvarb/stvarb
/// split is resolved against `dyvarb_count` at compile time (see
/// [`crate::compile`]), so by the time code here runs, callers already know
/// which vector and index they mean.
#[derive(Clone, Debug, Default)]
pub struct RegisterFile {
    pub dynamic: Vec<DynamicRegister>,
    pub static_: Vec<StaticRegister>,
}

impl RegisterFile {
    /// Builds a register file for a function with `dyvarb_count` dynamic
    /// registers (all initialised to `{null, NULL_TYPE}`) and one static
    /// register per entry in `stvarb_types`, each pre-allocated with a
    /// zeroed buffer sized from `registry`.
    pub fn new(dyvarb_count: usize, stvarb_types: &[TypeIndex], registry: &TypeRegistry) -> Self {
        let dynamic = (0..dyvarb_count).map(|_| DynamicRegister::default()).collect();
        let static_ = stvarb_types
            .iter()
            .map(|&ty| StaticRegister {
                data: DataPointer::zeroed(registry.size_of(ty)),
                ty,
            })
            .collect();
        Self { dynamic, static_ }
    }

    /// An empty register file, used for environments that never declare
    /// registers of their own (the global environment).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get_dynamic(&self, index: usize) -> &DynamicRegister {
        &self.dynamic[index]
    }

    pub fn get_dynamic_mut(&mut self, index: usize) -> &mut DynamicRegister {
        &mut self.dynamic[index]
    }

    pub fn get_static(&self, index: usize) -> &StaticRegister {
        &self.static_[index]
    }

    pub fn get_static_mut(&mut self, index: usize) -> &mut StaticRegister {
        &mut self.static_[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeInfo;

    #[test]
    fn new_allocates_zeroed_static_buffers() {
        let mut registry = TypeRegistry::new();
        let u32_ty = registry.insert("u32", TypeInfo { size: 4 }).unwrap();
        let file = RegisterFile::new(2, &[u32_ty, u32_ty], &registry);
        assert_eq!(file.dynamic.len(), 2);
        assert_eq!(file.static_.len(), 2);
        assert_eq!(file.get_static(0).data.bytes(), &[0, 0, 0, 0]);
        assert!(file.get_dynamic(0).data.is_none());
    }
}
