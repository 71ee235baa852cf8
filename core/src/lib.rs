//! Core implementation of the CVM register machine. The main usage of this
//! crate is to compile CVM source into a [`compile::CompiledProgram`], then
//! allocate and execute it.
//!
//! ```
//! use cvm::{compile, allocate, execute};
//!
//! let source = "\
//! .program
//!   entry main
//! .func main
//!   ret
//! ".to_string();
//!
//! let compiled = compile(source).unwrap();
//! let env = allocate(compiled);
//! execute(&env).unwrap();
//! ```

#![deny(clippy::all)]

pub mod ast;
pub mod compile;
mod consts;
pub mod data;
pub mod env;
pub mod error;
pub mod machine;
mod parse;
pub mod register;
pub mod types;

pub use compile::{CompiledProgram, Compiler};
pub use consts::MAX_CYCLE_COUNT;
pub use env::EnvHandle;
pub use error::CvmError;

use env::{EnvKind, EnvironmentNode};
use error::{RuntimeError, WithSource};

/// Executes `body` only when running in debug mode (enabled by setting the
/// environment variable `DEBUG=true`). Compiles away to nothing in a release
/// build.
///
/// ```
/// cvm::debug!(println!("Hello!"));
/// ```
#[macro_export]
macro_rules! debug {
    ($arg:expr) => {
        #[cfg(debug_assertions)]
        {
            if let Ok(debug_val) = std::env::var("DEBUG") {
                if debug_val.to_lowercase().as_str() == "true" {
                    $arg
                }
            }
        }
    };
}

/// Parses and compiles `source` into a [`CompiledProgram`]. This is the
/// `compile` stage of the `compile → allocate → execute` pipeline described
/// in the CLI surface; it does not allocate any runtime state, so it's also
/// what the `cvm compile` subcommand uses to surface diagnostics without
/// running anything.
pub fn compile(source: String) -> Result<CompiledProgram, CvmError> {
    let compiled = Compiler::new(source).parse()?.compile()?;
    Ok(compiled)
}

/// Builds the environment tree for `compiled`: a global root owning the type
/// registry and literal data pool, with a single local child environment for
/// the entry function's activation, ready to [`execute`]. Consumes
/// `compiled` since the tree takes ownership of its type registry and data
/// pool.
pub fn allocate(compiled: CompiledProgram) -> EnvHandle {
    let registers = register::RegisterFile::new(
        compiled.entry.dyvarb_count,
        &compiled.entry.static_types,
        &compiled.types,
    );
    let global = EnvironmentNode::new_global(compiled.types, compiled.data);
    EnvironmentNode::new_local(&global, compiled.entry, registers, None)
}

/// Runs `env`'s entry function to completion.
pub fn execute(env: &EnvHandle) -> Result<(), WithSource<RuntimeError>> {
    let function = match &env::borrow(env).kind {
        EnvKind::Local { function, .. } => std::rc::Rc::clone(function),
        _ => panic!("execute() requires a local environment"),
    };
    machine::run(env, &function).map_err(|e| WithSource::single(e, 0, ""))
}

/// Convenience wrapper combining all three pipeline stages: `compile`,
/// `allocate`, and `execute`.
pub fn compile_and_run(source: String) -> Result<(), CvmError> {
    let compiled = compile(source)?;
    let env = allocate(compiled);
    execute(&env)?;
    Ok(())
}
