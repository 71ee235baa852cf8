//! Binds a parsed [`IsProgram`]'s symbolic references — type names, data
//! indices, register tokens — to concrete runtime handles, producing a
//! [`RuntimeFunction`] ready to be allocated into an environment and run.

use crate::ast::{
    EnvWord, ImmSource, IsInstruction, IsProgram, RegisterToken,
};
use crate::data::LiteralDataPool;
use crate::env::EnvQualifier;
use crate::error::{CompileError, SourceErrorWrapper, WithSource};
use crate::machine::{
    apply_db_opreg, apply_load_data, apply_load_data_pointer, apply_mov,
    ControlAction, ResolvedRegister, RuntimeFunction, RuntimeInstruction,
};
use crate::types::{TypeIndex, TypeInfo, TypeRegistry, POINTER_TYPE};
use std::collections::HashSet;
use std::rc::Rc;

/// Struct used to compile a program, `T` tracking how far through the
/// pipeline the program has gotten. There is no separate `validate`/`delabel`
/// stage here since CVM has no labels or jumps to resolve before lowering.
#[derive(Debug)]
pub struct Compiler<T> {
    source: String,
    ast: T,
}

/// The output of [`Compiler::compile`]: a frozen type registry and data
/// pool, plus the compiled entry function, ready for [`Self::allocate`].
pub struct CompiledProgram {
    pub(crate) types: TypeRegistry,
    pub(crate) data: LiteralDataPool,
    pub(crate) entry: Rc<RuntimeFunction>,
}

impl Compiler<()> {
    pub fn new(source: String) -> Self {
        Self { source, ast: () }
    }

    /// Parses `source` into an instruction structure.
    pub fn parse(self) -> Result<Compiler<IsProgram>, WithSource<crate::error::ParseError>> {
        let ast = crate::parse::parse(&self.source)?;
        Ok(Compiler { source: self.source, ast })
    }
}

impl Compiler<IsProgram> {
    /// Resolves the parsed program's symbols and lowers its entry function
    /// into runtime form.
    pub fn compile(self) -> Result<CompiledProgram, WithSource<CompileError>> {
        let program = self.ast;
        let mut errors = Vec::new();

        let types = build_type_registry(&program, &mut errors);
        let data = build_data_pool(&program, &mut errors);

        let entry_name = program.entry.as_ref().map(|n| n.value().clone());
        let entry_name = match entry_name {
            Some(name) => name,
            None => {
                errors.push(SourceErrorWrapper::new(CompileError::NoEntryPoint, 0, ""));
                return Err(WithSource::new(errors));
            }
        };

        let mut seen_functions = HashSet::new();
        for func in &program.functions {
            if !seen_functions.insert(func.value().name.clone()) {
                errors.push(SourceErrorWrapper::new(
                    CompileError::DuplicateFunction(func.value().name.clone()),
                    func.line(),
                    func.value().name.as_str(),
                ));
            }
        }

        let entry_func = program
            .functions
            .iter()
            .find(|f| f.value().name == entry_name);
        let entry_func = match entry_func {
            Some(f) => f,
            None => {
                errors.push(SourceErrorWrapper::new(
                    CompileError::UndefinedFunction(entry_name.clone()),
                    0,
                    entry_name.as_str(),
                ));
                return Err(WithSource::new(errors));
            }
        };

        if !errors.is_empty() {
            return Err(WithSource::new(errors));
        }

        let runtime_function = compile_function(
            entry_func.value(),
            &types,
            &data,
            &mut errors,
        );

        if !errors.is_empty() {
            return Err(WithSource::new(errors));
        }

        Ok(CompiledProgram {
            types,
            data,
            entry: Rc::new(runtime_function.expect("no errors implies a function was built")),
        })
    }
}

fn build_type_registry(
    program: &IsProgram,
    errors: &mut Vec<SourceErrorWrapper<CompileError>>,
) -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    for decl in &program.types {
        if registry
            .insert(decl.name.clone(), TypeInfo { size: decl.size })
            .is_err()
        {
            errors.push(SourceErrorWrapper::new(
                CompileError::DuplicateType(decl.name.clone()),
                decl.line,
                decl.name.as_str(),
            ));
        }
    }
    registry
}

fn build_data_pool(
    program: &IsProgram,
    errors: &mut Vec<SourceErrorWrapper<CompileError>>,
) -> LiteralDataPool {
    let mut pool = LiteralDataPool::new();
    for decl in &program.datas {
        if pool.insert(decl.index, decl.bytes.clone()).is_err() {
            errors.push(SourceErrorWrapper::new(
                CompileError::DuplicateDataIndex(decl.index),
                decl.line,
                "",
            ));
        }
    }
    pool
}

/// Resolves a `stvarb`-declared type name. Unlike ordinary type lookups,
/// this one has no token to blame other than the declaration itself, so
/// [`CompileError::UndefinedType`] is raised with an empty token — the line
/// still pinpoints the offending `stvarb` directive.
fn resolve_type(
    registry: &TypeRegistry,
    name: &str,
    line: usize,
    errors: &mut Vec<SourceErrorWrapper<CompileError>>,
) -> Option<TypeIndex> {
    match registry.find(name) {
        Some(ty) => Some(ty),
        None => {
            errors.push(SourceErrorWrapper::new(
                CompileError::UndefinedType(name.to_string()),
                line,
                name,
            ));
            None
        }
    }
}

/// Resolves a [`RegisterToken`] against the compiling function's
/// `dyvarb_count`, per §4.4: class `g`/`t` always force `Parent`/`Temp`
/// regardless of any trailing `(%env)` suffix (none is even accepted on
/// those forms by the parser); class `n` honors its optional suffix,
/// defaulting to `Current`.
fn resolve_register(token: &RegisterToken, dyvarb_count: usize) -> ResolvedRegister {
    match token {
        RegisterToken::Zero => ResolvedRegister::Null,
        RegisterToken::Result => ResolvedRegister::Result,
        RegisterToken::Numeric { index, env } => {
            let qual = match env {
                EnvWord::Env => EnvQualifier::Current,
                EnvWord::Penv => EnvQualifier::Parent,
                EnvWord::Tenv => EnvQualifier::Temp,
            };
            classify(*index, dyvarb_count, qual)
        }
        RegisterToken::Global { index } => classify(*index, dyvarb_count, EnvQualifier::Parent),
        RegisterToken::Temp { index } => classify(*index, dyvarb_count, EnvQualifier::Temp),
    }
}

fn classify(index: usize, dyvarb_count: usize, env: EnvQualifier) -> ResolvedRegister {
    if index < dyvarb_count {
        ResolvedRegister::Dynamic { env, index }
    } else {
        ResolvedRegister::Static { env, index: index - dyvarb_count }
    }
}

/// Checks a resolved register reference against the compiling function's
/// actual layout before any runtime instruction is allowed to capture it,
/// per §8's invariant that "every register reference in every compiled
/// instruction resolves in-bounds against its function's register file".
///
/// Also rejects any `(%penv)`/`(%tenv)`-qualified reference (including the
/// `%g`/`%t` shorthands): this core never builds a parent environment with
/// its own register file, and no opcode ever establishes a temp sibling, so
/// such a reference would otherwise reach `RegisterFile::empty()` or an
/// absent temp link and panic at runtime instead of surfacing a diagnostic.
fn validate_register(
    reg: ResolvedRegister,
    dyvarb_count: usize,
    static_count: usize,
    token: &RegisterToken,
    line: usize,
    errors: &mut Vec<SourceErrorWrapper<CompileError>>,
) {
    let env = match reg {
        ResolvedRegister::Null | ResolvedRegister::Result => return,
        ResolvedRegister::Dynamic { env, index } => {
            if index >= dyvarb_count {
                errors.push(SourceErrorWrapper::new(
                    CompileError::RegisterOutOfBounds(token.to_string()),
                    line,
                    token.to_string(),
                ));
            }
            env
        }
        ResolvedRegister::Static { env, index } => {
            if index >= static_count {
                errors.push(SourceErrorWrapper::new(
                    CompileError::RegisterOutOfBounds(token.to_string()),
                    line,
                    token.to_string(),
                ));
            }
            env
        }
    };
    if env != EnvQualifier::Current {
        errors.push(SourceErrorWrapper::new(
            CompileError::UnsupportedEnvironmentReference(token.to_string()),
            line,
            token.to_string(),
        ));
    }
}

fn compile_function(
    func: &crate::ast::IsFunction,
    types: &TypeRegistry,
    data: &LiteralDataPool,
    errors: &mut Vec<SourceErrorWrapper<CompileError>>,
) -> Option<RuntimeFunction> {
    let mut static_types = Vec::new();
    for decl in &func.stvarb_decls {
        if let Some(ty) = resolve_type(types, &decl.ty, decl.line, errors) {
            for _ in 0..decl.count {
                static_types.push(ty);
            }
        }
    }

    let dyvarb_count = func.dyvarb_count;
    let mut instructions: Vec<RuntimeInstruction> = Vec::with_capacity(func.instructions.len());

    for node in &func.instructions {
        let line = node.line();
        match node.value() {
            IsInstruction::Mov { dst, src } => {
                let resolved_dst = resolve_register(dst, dyvarb_count);
                let resolved_src = resolve_register(src, dyvarb_count);
                validate_register(resolved_dst, dyvarb_count, static_types.len(), dst, line, errors);
                validate_register(resolved_src, dyvarb_count, static_types.len(), src, line, errors);
                instructions.push(Box::new(move |env| {
                    apply_mov(env, resolved_dst, resolved_src).map(|()| ControlAction::Advance)
                }));
            }
            IsInstruction::Load { dst, src, ty } => {
                let resolved_dst = resolve_register(dst, dyvarb_count);
                validate_register(resolved_dst, dyvarb_count, static_types.len(), dst, line, errors);
                let ty_index = resolve_type(types, ty, line, errors);

                // A `load` into a static register's fixed type must match
                // the declared type name at compile time; the original
                // "caller's obligation" runtime check is enforced eagerly
                // here instead.
                if let ResolvedRegister::Static { index, .. } = resolved_dst {
                    if let (Some(&declared), Some(ty_index)) = (static_types.get(index), ty_index) {
                        if declared != ty_index {
                            errors.push(SourceErrorWrapper::new(
                                CompileError::StaticTypeMismatch {
                                    declared: type_name(types, declared),
                                    given: ty.clone(),
                                },
                                line,
                                ty.as_str(),
                            ));
                        }
                    }
                }

                let bytes: Vec<u8> = match src {
                    ImmSource::Literal(value) => value.to_le_bytes().to_vec(),
                    ImmSource::DataIndex(idx) => match data.get(*idx) {
                        Some(blob) => blob.to_vec(),
                        None => {
                            errors.push(SourceErrorWrapper::new(
                                CompileError::UndefinedDataIndex(*idx),
                                line,
                                "",
                            ));
                            Vec::new()
                        }
                    },
                };

                if let Some(ty_index) = ty_index {
                    if ty_index == POINTER_TYPE {
                        instructions.push(Box::new(move |env| {
                            apply_load_data_pointer(env, resolved_dst, &bytes)
                                .map(|()| ControlAction::Advance)
                        }));
                    } else {
                        instructions.push(Box::new(move |env| {
                            apply_load_data(env, resolved_dst, ty_index, &bytes)
                                .map(|()| ControlAction::Advance)
                        }));
                    }
                }
            }
            IsInstruction::Ret => {
                instructions.push(Box::new(|_env| Ok(ControlAction::Return)));
            }
            IsInstruction::DbOpReg => {
                instructions.push(Box::new(|env| {
                    apply_db_opreg(env);
                    Ok(ControlAction::Advance)
                }));
            }
        }
    }

    if !errors.is_empty() {
        return None;
    }

    Some(RuntimeFunction {
        name: func.name.clone(),
        dyvarb_count,
        static_types,
        instructions,
    })
}

fn type_name(registry: &TypeRegistry, ty: TypeIndex) -> String {
    registry.name_of(ty).unwrap_or("<unknown>").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_source(source: &str) -> Result<CompiledProgram, WithSource<CompileError>> {
        let parsed = Compiler::new(source.to_string()).parse().unwrap();
        parsed.compile()
    }

    #[test]
    fn empty_entry_compiles() {
        let compiled = compile_source(".program\n  entry main\n.func main\n  ret\n").unwrap();
        assert_eq!(compiled.entry.name, "main");
        assert_eq!(compiled.entry.instructions.len(), 1);
    }

    #[test]
    fn missing_entry_function_is_an_error() {
        let err = compile_source(".program\n  entry missing\n.func main\n  ret\n").unwrap_err();
        assert!(matches!(
            err.errors()[0].error(),
            CompileError::UndefinedFunction(_)
        ));
    }

    #[test]
    fn duplicate_type_is_an_error() {
        let source = "\
.type u32
  size 4
.type u32
  size 8
.program
  entry main
.func main
  ret
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(err.errors()[0].error(), CompileError::DuplicateType(_)));
    }

    #[test]
    fn out_of_bounds_static_register_is_rejected_at_compile_time() {
        // dyvarb 0, no stvarb declared: %n5 classifies as a static register
        // at index 5, which doesn't exist. This used to compile cleanly and
        // panic at runtime inside `get_static_mut`.
        let source = "\
.type u32
  size 4
.program
  entry main
.func main
  dyvarb 0
  load %n5, 42, u32
  ret
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(
            err.errors()[0].error(),
            CompileError::RegisterOutOfBounds(token) if token == "%5"
        ));
    }

    #[test]
    fn out_of_bounds_static_register_past_one_declared_stvarb_is_rejected() {
        // dyvarb 1, stvarb 1 u32: index 3 lands past the single declared
        // static register (static position 3 - 1 = 2, but only index 0
        // exists).
        let source = "\
.type u32
  size 4
.program
  entry main
.func main
  dyvarb 1
  stvarb 1, u32
  load %n3, 1, u32
  ret
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(err.errors()[0].error(), CompileError::RegisterOutOfBounds(_)));
    }

    #[test]
    fn global_register_reference_is_rejected_at_compile_time() {
        let source = "\
.type u32
  size 4
.program
  entry main
.func main
  dyvarb 1
  load %g0, 1, u32
  ret
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(
            err.errors()[0].error(),
            CompileError::UnsupportedEnvironmentReference(token) if token == "%g0"
        ));
    }

    #[test]
    fn temp_register_reference_is_rejected_at_compile_time() {
        let source = "\
.type u32
  size 4
.program
  entry main
.func main
  dyvarb 1
  mov %n0, %t0
  ret
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(
            err.errors()[0].error(),
            CompileError::UnsupportedEnvironmentReference(token) if token == "%t0"
        ));
    }

    #[test]
    fn penv_qualified_numeric_register_is_rejected_at_compile_time() {
        let source = "\
.type u32
  size 4
.program
  entry main
.func main
  dyvarb 1
  mov %n0, %0(%penv)
  ret
";
        let err = compile_source(source).unwrap_err();
        assert!(matches!(
            err.errors()[0].error(),
            CompileError::UnsupportedEnvironmentReference(_)
        ));
    }
}
