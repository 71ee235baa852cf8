//! The environment tree: global, local, and (reserved) thread environments,
//! each holding a register file and links to their neighbors.

use crate::data::LiteralDataPool;
use crate::machine::RuntimeFunction;
use crate::register::{DynamicRegister, RegisterFile};
use crate::types::TypeRegistry;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};

/// Which linked environment an `%n`/`%g`/`%t`-class register reference
/// targets, resolved at compile time from the class letter and optional
/// `(%env|%penv|%tenv)` suffix.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EnvQualifier {
    /// `%env` / bare suffix-less form — the environment executing the
    /// current instruction.
    Current,
    /// `%penv` / class `g` — the parent environment.
    Parent,
    /// `%tenv` / class `t` — the temp sibling environment.
    Temp,
}

/// The per-environment-kind state that doesn't belong in the shared register
/// file.
pub enum EnvKind {
    /// Roots the tree; owns the type registry and literal data pool.
    Global {
        types: Rc<TypeRegistry>,
        data: Rc<LiteralDataPool>,
    },
    /// One function activation: a compiled function plus a program-counter
    /// cursor, and the per-environment `%res` register.
    Local {
        function: Rc<RuntimeFunction>,
        pc: usize,
        result: DynamicRegister,
    },
    /// Reserved; not exercised by this core; carries no additional state.
    Thread,
}

/// A node in the environment tree. `children` owns its sub-environments;
/// `parent` and `temp` are non-owning back/side links (per the original
/// design note: `penv` must never be followed for ownership, and `tenv`
/// points to a sibling environment owned elsewhere).
pub struct EnvironmentNode {
    pub kind: EnvKind,
    pub registers: RegisterFile,
    pub parent: Option<Weak<RefCell<EnvironmentNode>>>,
    pub temp: Option<Weak<RefCell<EnvironmentNode>>>,
    pub children: Vec<Rc<RefCell<EnvironmentNode>>>,
}

/// A shared, mutable handle to one node in the environment tree.
pub type EnvHandle = Rc<RefCell<EnvironmentNode>>;

impl EnvironmentNode {
    /// Creates the root (global) environment. It owns the type registry and
    /// literal data pool for the program's lifetime, and has no register
    /// file of its own (nothing in this core declares registers on it).
    pub fn new_global(types: TypeRegistry, data: LiteralDataPool) -> EnvHandle {
        Rc::new(RefCell::new(EnvironmentNode {
            kind: EnvKind::Global {
                types: Rc::new(types),
                data: Rc::new(data),
            },
            registers: RegisterFile::empty(),
            parent: None,
            temp: None,
            children: Vec::new(),
        }))
    }

    /// Creates a local environment for a function activation, registers it
    /// as a child of `parent`, and returns a handle to it. `temp` is the
    /// optional temp-sibling link (always `None` in this core, since no
    /// opcode establishes one).
    pub fn new_local(
        parent: &EnvHandle,
        function: Rc<RuntimeFunction>,
        registers: RegisterFile,
        temp: Option<&EnvHandle>,
    ) -> EnvHandle {
        let node = Rc::new(RefCell::new(EnvironmentNode {
            kind: EnvKind::Local {
                function,
                pc: 0,
                result: DynamicRegister::default(),
            },
            registers,
            parent: Some(Rc::downgrade(parent)),
            temp: temp.map(Rc::downgrade),
            children: Vec::new(),
        }));
        parent.borrow_mut().children.push(Rc::clone(&node));
        node
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, EnvKind::Local { .. })
    }

    /// The type registry, reached by walking up to the global root. Cheap:
    /// the `Rc` is cloned once per lookup rather than re-walked repeatedly by
    /// callers.
    pub fn type_registry(handle: &EnvHandle) -> Rc<TypeRegistry> {
        match &handle.borrow().kind {
            EnvKind::Global { types, .. } => Rc::clone(types),
            _ => {
                let parent = handle
                    .borrow()
                    .parent
                    .as_ref()
                    .and_then(Weak::upgrade)
                    .expect("non-global environment must have a parent");
                Self::type_registry(&parent)
            }
        }
    }
}

/// Reaches the environment named by `qual`, relative to `current`. Panics if
/// `qual` asks for a link that doesn't exist (`Parent` on the global root, or
/// `Temp` when no temp sibling was established) — such a reference cannot
/// survive compilation in this core, since the only local environment ever
/// created has the global root as its parent and no temp sibling.
pub fn reach(current: &EnvHandle, qual: EnvQualifier) -> EnvHandle {
    match qual {
        EnvQualifier::Current => Rc::clone(current),
        EnvQualifier::Parent => current
            .borrow()
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .expect("%penv reference with no parent environment"),
        EnvQualifier::Temp => current
            .borrow()
            .temp
            .as_ref()
            .and_then(Weak::upgrade)
            .expect("%tenv reference with no temp environment"),
    }
}

pub fn borrow(handle: &EnvHandle) -> Ref<'_, EnvironmentNode> {
    handle.borrow()
}

pub fn borrow_mut(handle: &EnvHandle) -> RefMut<'_, EnvironmentNode> {
    handle.borrow_mut()
}
