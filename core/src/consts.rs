/// The maximum number of instructions a single function activation may
/// execute before being killed. Functions that take this number of steps
/// *will* terminate normally, but the next instruction *after* hitting this
/// threshold triggers a runtime error. This isn't a strategic restriction on
/// programs, just a mechanism to prevent a malformed `ret`-less program from
/// running forever.
pub const MAX_CYCLE_COUNT: usize = 1_000_000;

/// The name recognized by the `.type` section for the machine-word pointer
/// type. Pre-seeded into every [`crate::types::TypeRegistry`] as
/// [`crate::types::POINTER_TYPE`].
pub const POINTER_TYPE_NAME: &str = "ptr";

/// The literal token that names the zero/null register (`%0`). Bypasses the
/// ordinary `%<class><index>` naming scheme entirely; see
/// [`crate::ast::RegisterToken`].
pub const ZERO_REGISTER_TOKEN: &str = "%0";

/// The literal token that names the per-environment result register.
pub const RESULT_REGISTER_TOKEN: &str = "%res";
