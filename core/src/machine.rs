//! The compiled runtime form: resolved register references, the data-move
//! primitives that implement `mov`/`load`/`db_opreg`, and the VM loop that
//! drives a function's program counter to completion.

use crate::consts::MAX_CYCLE_COUNT;
use crate::data::DataPointer;
use crate::env::{borrow, borrow_mut, reach, EnvHandle, EnvKind, EnvQualifier, EnvironmentNode};
use crate::error::RuntimeError;
use crate::types::{TypeIndex, POINTER_TYPE};
use std::rc::Rc;

/// A register reference, resolved at compile time to a concrete `(kind,
/// index, env qualifier)` triple. Runtime instructions only ever see this
/// form — the dyvarb/stvarb classification of a bare `%N` has already
/// happened in [`crate::compile`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResolvedRegister {
    /// `%0` — reads as null, writes are discarded.
    Null,
    /// `%res` — always the current environment's result register.
    Result,
    Dynamic { env: EnvQualifier, index: usize },
    Static { env: EnvQualifier, index: usize },
}

/// A compiled instruction: an effect closure paired with the control-flow
/// verdict it returns. `Fn`, not `FnMut`, since no instruction captures
/// mutable state of its own — everything it touches lives in the
/// environment it's handed.
pub type RuntimeInstruction = Box<dyn Fn(&EnvHandle) -> Result<ControlAction, RuntimeError>>;

/// The VM-loop verdict after executing one instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControlAction {
    Advance,
    Jump(usize),
    Return,
}

/// A function, lowered to its fixed register layout and compiled
/// instruction sequence. Immutable once built; a [`crate::env::EnvHandle`]'s
/// local environment holds an `Rc` to one of these plus its own mutable
/// register file and program counter.
pub struct RuntimeFunction {
    pub name: String,
    pub dyvarb_count: usize,
    pub static_types: Vec<TypeIndex>,
    pub instructions: Vec<RuntimeInstruction>,
}

impl std::fmt::Debug for RuntimeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeFunction")
            .field("name", &self.name)
            .field("dyvarb_count", &self.dyvarb_count)
            .field("static_types", &self.static_types)
            .field("instruction_count", &self.instructions.len())
            .finish()
    }
}

/// What reading a resolved source register yields, before it's written into
/// a destination. Kept distinct from a plain `(Vec<u8>, TypeIndex)` pair so
/// that `mov` between two dynamic registers can alias the same `Rc` rather
/// than copying bytes.
enum SourceValue {
    Null,
    Dynamic(Option<Rc<DataPointer>>, TypeIndex),
    StaticBytes(Vec<u8>, TypeIndex),
}

fn read_source(env: &EnvHandle, reg: ResolvedRegister) -> SourceValue {
    match reg {
        ResolvedRegister::Null => SourceValue::Null,
        ResolvedRegister::Result => {
            let target = reach(env, EnvQualifier::Current);
            let node = borrow(&target);
            match &node.kind {
                EnvKind::Local { result, .. } => {
                    SourceValue::Dynamic(result.data.clone(), result.ty)
                }
                _ => SourceValue::Null,
            }
        }
        ResolvedRegister::Dynamic { env: qual, index } => {
            let target = reach(env, qual);
            let node = borrow(&target);
            let reg = node.registers.get_dynamic(index);
            SourceValue::Dynamic(reg.data.clone(), reg.ty)
        }
        ResolvedRegister::Static { env: qual, index } => {
            let target = reach(env, qual);
            let node = borrow(&target);
            let reg = node.registers.get_static(index);
            SourceValue::StaticBytes(reg.data.bytes().to_vec(), reg.ty)
        }
    }
}

/// `MoveRegister`: reads `src` and applies it to `dst` per §4.3's three
/// destination modes.
///
/// - `Null`: no effect.
/// - `DynamicSlot`: reassigns the pointer (clones the `Rc` if `src` is
///   itself dynamic, so the two registers end up aliasing the same
///   buffer — the mechanism behind scenario 4's `mov`-between-dyvarbs
///   aliasing). If `src` is a static register, a fresh dynamic buffer is
///   allocated and the bytes copied in instead, since static storage is
///   never `Rc`-shared.
/// - `StaticSlot`: always byte-copies into the destination's existing
///   buffer; the static register's type never changes.
pub fn apply_mov(env: &EnvHandle, dst: ResolvedRegister, src: ResolvedRegister) -> Result<(), RuntimeError> {
    let source = read_source(env, src);
    match dst {
        ResolvedRegister::Null => Ok(()),
        ResolvedRegister::Result => {
            let target = reach(env, EnvQualifier::Current);
            let mut node = borrow_mut(&target);
            if let EnvKind::Local { result, .. } = &mut node.kind {
                assign_dynamic(result, source);
            }
            Ok(())
        }
        ResolvedRegister::Dynamic { env: qual, index } => {
            let target = reach(env, qual);
            let mut node = borrow_mut(&target);
            let reg = node.registers.get_dynamic_mut(index);
            assign_dynamic(reg, source);
            Ok(())
        }
        ResolvedRegister::Static { env: qual, index } => {
            let bytes = match source {
                SourceValue::Null => return Err(RuntimeError::NullRegisterRead),
                SourceValue::Dynamic(None, _) => return Err(RuntimeError::NullRegisterRead),
                SourceValue::Dynamic(Some(rc), _) => rc.bytes().to_vec(),
                SourceValue::StaticBytes(bytes, _) => bytes,
            };
            let target = reach(env, qual);
            let mut node = borrow_mut(&target);
            let reg = node.registers.get_static_mut(index);
            reg.data.clear_and_copy_in(&bytes);
            Ok(())
        }
    }
}

fn assign_dynamic(reg: &mut crate::register::DynamicRegister, source: SourceValue) {
    match source {
        SourceValue::Null => {
            reg.data = None;
            reg.ty = crate::types::NULL_TYPE;
        }
        SourceValue::Dynamic(data, ty) => {
            reg.data = data;
            reg.ty = ty;
        }
        SourceValue::StaticBytes(bytes, ty) => {
            let len = bytes.len();
            reg.data = Some(Rc::new(DataPointer::from_bytes(&bytes, len)));
            reg.ty = ty;
        }
    }
}

/// `LoadData`: allocates (for a dynamic destination) or overwrites (for a
/// static one) a buffer sized from `dst_ty`, copying in up to that many
/// bytes from `bytes` and zero-padding any remainder.
pub fn apply_load_data(
    env: &EnvHandle,
    dst: ResolvedRegister,
    dst_ty: TypeIndex,
    bytes: &[u8],
) -> Result<(), RuntimeError> {
    let registry = EnvironmentNode::type_registry(env);
    let size = registry.size_of(dst_ty);
    match dst {
        ResolvedRegister::Null => {}
        ResolvedRegister::Result => {
            let target = reach(env, EnvQualifier::Current);
            let mut node = borrow_mut(&target);
            if let EnvKind::Local { result, .. } = &mut node.kind {
                result.data = Some(Rc::new(DataPointer::from_bytes(bytes, size)));
                result.ty = dst_ty;
            }
        }
        ResolvedRegister::Dynamic { env: qual, index } => {
            let target = reach(env, qual);
            let mut node = borrow_mut(&target);
            let reg = node.registers.get_dynamic_mut(index);
            reg.data = Some(Rc::new(DataPointer::from_bytes(bytes, size)));
            reg.ty = dst_ty;
        }
        ResolvedRegister::Static { env: qual, index } => {
            let target = reach(env, qual);
            let mut node = borrow_mut(&target);
            let reg = node.registers.get_static_mut(index);
            reg.data.clear_and_copy_in(bytes);
        }
    }
    Ok(())
}

/// `LoadDataPointer`: the pointer-typed variant of `LoadData`. Allocates a
/// fresh inner buffer holding `bytes`, then writes the machine-word address
/// of that buffer into the destination. See [`DataPointer::with_pointee`]
/// for why this is sound in safe Rust.
pub fn apply_load_data_pointer(
    env: &EnvHandle,
    dst: ResolvedRegister,
    bytes: &[u8],
) -> Result<(), RuntimeError> {
    let registry = EnvironmentNode::type_registry(env);
    let word_size = registry.size_of(POINTER_TYPE);
    match dst {
        ResolvedRegister::Null => {}
        ResolvedRegister::Result => {
            let target = reach(env, EnvQualifier::Current);
            let mut node = borrow_mut(&target);
            if let EnvKind::Local { result, .. } = &mut node.kind {
                result.data = Some(Rc::new(DataPointer::with_pointee(bytes, word_size)));
                result.ty = POINTER_TYPE;
            }
        }
        ResolvedRegister::Dynamic { env: qual, index } => {
            let target = reach(env, qual);
            let mut node = borrow_mut(&target);
            let reg = node.registers.get_dynamic_mut(index);
            reg.data = Some(Rc::new(DataPointer::with_pointee(bytes, word_size)));
            reg.ty = POINTER_TYPE;
        }
        ResolvedRegister::Static { env: qual, index } => {
            let target = reach(env, qual);
            let mut node = borrow_mut(&target);
            let reg = node.registers.get_static_mut(index);
            reg.data = DataPointer::with_pointee(bytes, word_size);
        }
    }
    Ok(())
}

/// `db_opreg`: prints every dynamic register of the current environment, in
/// index order, as `[data: <HEX>]`. A register that has never been written
/// prints as many zero bytes as its (null) type's size — zero for the
/// default `NULL_TYPE`.
pub fn apply_db_opreg(env: &EnvHandle) {
    let registry = EnvironmentNode::type_registry(env);
    let node = borrow(env);
    for reg in &node.registers.dynamic {
        let size = registry.size_of(reg.ty);
        let bytes = match &reg.data {
            Some(rc) => rc.bytes().to_vec(),
            None => vec![0u8; size],
        };
        let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
        println!("[data: {}]", hex);
    }
}

/// Drives `env`'s program counter through `function` until `ret` (or
/// falling off the end of the instruction list, which is equivalent).
/// Enforces [`MAX_CYCLE_COUNT`] to guarantee termination for a `ret`-less
/// program.
pub fn run(env: &EnvHandle, function: &RuntimeFunction) -> Result<(), RuntimeError> {
    let mut cycles: usize = 0;
    loop {
        let pc = match &borrow(env).kind {
            EnvKind::Local { pc, .. } => *pc,
            _ => unreachable!("run() requires a local environment"),
        };
        if pc >= function.instructions.len() {
            return Ok(());
        }

        cycles += 1;
        if cycles > MAX_CYCLE_COUNT {
            return Err(RuntimeError::TooManyCycles);
        }

        let action = (function.instructions[pc])(env)?;
        crate::debug!(println!("executed pc={} action={:?}", pc, action));

        let mut node = borrow_mut(env);
        if let EnvKind::Local { pc: pc_slot, .. } = &mut node.kind {
            match action {
                ControlAction::Advance => *pc_slot += 1,
                ControlAction::Jump(n) => *pc_slot = n,
                ControlAction::Return => return Ok(()),
            }
        }
    }
}
