//! Integration tests for symbol-resolution failures: everything that
//! `core::compile` can reject once a program has parsed cleanly.

use cvm::compile;
use cvm::error::{CompileError, CvmError};

fn compile_err(source: &str) -> CvmError {
    compile(source.to_string()).expect_err("program should fail to compile")
}

#[test]
fn duplicate_type_declaration_aborts() {
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
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(errors.errors()[0].error(), CompileError::DuplicateType(name) if name == "u32"));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn missing_entry_function_is_undefined_function() {
    let source = "\
.program
  entry missing
.func main
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(
                errors.errors()[0].error(),
                CompileError::UndefinedFunction(name) if name == "missing"
            ));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn missing_entry_directive_is_no_entry_point() {
    let source = "\
.func main
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(errors.errors()[0].error(), CompileError::NoEntryPoint));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn undefined_type_in_load_is_reported() {
    let source = "\
.program
  entry main
.func main
  dyvarb 1
  load %n0, 1, nonexistent
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(
                errors.errors()[0].error(),
                CompileError::UndefinedType(name) if name == "nonexistent"
            ));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn undefined_data_index_in_load_is_reported() {
    let source = "\
.type u32
  size 4
.program
  entry main
.func main
  dyvarb 1
  load %n0, #9, u32
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(errors.errors()[0].error(), CompileError::UndefinedDataIndex(9)));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn duplicate_data_index_is_reported() {
    let source = "\
.datas
  data #1 0x01 1
  data #1 0x02 1
.program
  entry main
.func main
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(errors.errors()[0].error(), CompileError::DuplicateDataIndex(1)));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn load_into_static_with_mismatched_type_is_rejected_at_compile_time() {
    let source = "\
.type u32
  size 4
.type u8
  size 1
.program
  entry main
.func main
  stvarb 1, u32
  load %n0, 1, u8
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(
                errors.errors()[0].error(),
                CompileError::StaticTypeMismatch { declared, given }
                    if declared == "u32" && given == "u8"
            ));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn duplicate_function_declaration_is_reported() {
    let source = "\
.program
  entry main
.func main
  ret
.func main
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(
                errors.errors()[0].error(),
                CompileError::DuplicateFunction(name) if name == "main"
            ));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn load_into_a_static_register_past_the_declared_stvarb_count_is_rejected() {
    let source = "\
.type u32
  size 4
.program
  entry main
.func main
  dyvarb 1
  load %n3, 1, u32
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(errors.errors()[0].error(), CompileError::RegisterOutOfBounds(_)));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn mov_naming_a_global_register_is_rejected_instead_of_left_to_panic() {
    let source = "\
.program
  entry main
.func main
  dyvarb 1
  mov %n0, %g0
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(
                errors.errors()[0].error(),
                CompileError::UnsupportedEnvironmentReference(_)
            ));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn mov_naming_a_temp_register_is_rejected_instead_of_left_to_panic() {
    let source = "\
.program
  entry main
.func main
  dyvarb 1
  mov %n0, %t0
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(
                errors.errors()[0].error(),
                CompileError::UnsupportedEnvironmentReference(_)
            ));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}

#[test]
fn mov_naming_a_penv_qualified_register_is_rejected_instead_of_left_to_panic() {
    let source = "\
.program
  entry main
.func main
  dyvarb 1
  mov %n0, %n0(%penv)
  ret
";
    match compile_err(source) {
        CvmError::Compile(errors) => {
            assert!(matches!(
                errors.errors()[0].error(),
                CompileError::UnsupportedEnvironmentReference(_)
            ));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}
