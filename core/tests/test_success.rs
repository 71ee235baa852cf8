//! End-to-end tests covering the core data-move scenarios: compiling a whole
//! program, running its entry function, and inspecting the resulting
//! register state directly (rather than scraping `db_opreg`'s stdout, which
//! isn't something a test can assert on cleanly).

use cvm::env::{borrow, EnvKind};
use cvm::{allocate, compile, execute};

fn run_source(source: &str) -> cvm::EnvHandle {
    let compiled = compile(source.to_string()).expect("program should compile");
    let env = allocate(compiled);
    execute(&env).expect("program should run to completion");
    env
}

#[test]
fn empty_entry_runs_with_no_registers() {
    let source = "\
.program
  entry main
.func main
  ret
";
    let env = run_source(source);
    let node = borrow(&env);
    assert!(node.registers.dynamic.is_empty());
    assert!(node.registers.static_.is_empty());
    match &node.kind {
        EnvKind::Local { pc, .. } => assert_eq!(*pc, 0),
        _ => panic!("expected a local environment"),
    }
}

#[test]
fn load_immediate_into_dyvarb() {
    let source = "\
.type u32
  size 4
.program
  entry main
.func main
  dyvarb 1
  load %n0, 42, u32
  db_opreg
  ret
";
    let env = run_source(source);
    let node = borrow(&env);
    let reg = node.registers.get_dynamic(0);
    assert_eq!(reg.data.as_ref().unwrap().bytes(), &42u32.to_le_bytes());
}

#[test]
fn load_from_data_section() {
    let source = "\
.type u32
  size 4
.datas
  data #1 0xDEADBEEF 4
.program
  entry main
.func main
  dyvarb 1
  load %n0, #1, u32
  ret
";
    let env = run_source(source);
    let node = borrow(&env);
    let reg = node.registers.get_dynamic(0);
    assert_eq!(reg.data.as_ref().unwrap().bytes(), &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn mov_between_dyvarbs_aliases_the_buffer() {
    let source = "\
.type u32
  size 4
.datas
  data #1 0x11223344 4
.program
  entry main
.func main
  dyvarb 2
  load %n0, #1, u32
  mov %n1, %n0
  ret
";
    let env = run_source(source);
    let node = borrow(&env);
    let r0 = node.registers.get_dynamic(0);
    let r1 = node.registers.get_dynamic(1);
    assert_eq!(r1.ty, r0.ty);
    assert!(std::rc::Rc::ptr_eq(
        r0.data.as_ref().unwrap(),
        r1.data.as_ref().unwrap()
    ));
    assert_eq!(r1.data.as_ref().unwrap().bytes(), &[0x11, 0x22, 0x33, 0x44]);
}

#[test]
fn mov_into_stvarb_copies_bytes_not_the_pointer() {
    let source = "\
.type u32
  size 4
.datas
  data #1 0x01020304 4
  data #2 0x09090909 4
.program
  entry main
.func main
  dyvarb 1
  stvarb 1, u32
  load %n0, #1, u32
  mov %n1, %n0
  load %n0, #2, u32
  ret
";
    let env = run_source(source);
    let node = borrow(&env);
    // %n1 (a static index, since dyvarb_count is 1) must still hold the
    // bytes from the first load; the second load into %n0 rebinds the
    // dynamic register to a different buffer entirely, which would have
    // corrupted an aliased static register.
    assert_eq!(node.registers.get_static(0).data.bytes(), &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(
        node.registers.get_dynamic(0).data.as_ref().unwrap().bytes(),
        &[0x09, 0x09, 0x09, 0x09]
    );
}

#[test]
fn result_register_holds_the_last_mov_into_it() {
    let source = "\
.type u32
  size 4
.program
  entry main
.func main
  dyvarb 1
  load %n0, 7, u32
  mov %res, %n0
  ret
";
    let env = run_source(source);
    let node = borrow(&env);
    match &node.kind {
        EnvKind::Local { result, .. } => {
            assert_eq!(result.data.as_ref().unwrap().bytes(), &7u32.to_le_bytes());
        }
        _ => panic!("expected a local environment"),
    }
}
