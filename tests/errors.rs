//! Recoverable-error and resource-bound scenarios: the VM survives a
//! recoverable runtime error and remains usable, and call-stack depth is
//! enforced at the documented default limit.

mod common;

use common::Asm;
use threadvm::bytecode::{BytecodeFunction, Opcode};
use threadvm::consts::VmConfig;
use threadvm::interpreter::Vm;
use threadvm::value::Value;

#[test]
fn integer_division_by_zero_is_recoverable_and_the_vm_stays_usable() {
    let mut a = Asm::new();
    a.push_int(1).push_int(0).op(Opcode::Div).op(Opcode::Return);
    let bad = a.finish();

    let mut vm = Vm::new();
    assert!(vm.execute(&bad).is_err());

    let mut ok = Asm::new();
    ok.push_int(7).op(Opcode::Return);
    vm.execute(&ok.finish()).unwrap();
    assert_eq!(vm.last_return(), &Value::Integer(7));
}

/// `depth(n) = n <= 0 ? 0 : depth(n - 1)`, recursing entirely through the
/// interpreter (`CALL` is never JIT-supported).
fn depth_bytecode() -> Vec<u8> {
    let mut a = Asm::new();
    a.load_local(0).push_int(0).op(Opcode::Le);
    let recurse_jump = a.jump_if_false();
    a.push_int(0).op(Opcode::Return);

    let recurse_label = a.here();
    a.patch_to(recurse_jump, recurse_label);
    a.load_local(0).push_int(1).op(Opcode::Sub);
    a.call("depth", 1);
    a.op(Opcode::Return);
    a.finish()
}

fn call_depth(n: i64) -> Vec<u8> {
    let mut a = Asm::new();
    a.push_int(n).call("depth", 1).op(Opcode::Return);
    a.finish()
}

#[test]
fn recursion_to_the_configured_depth_succeeds_one_past_it_overflows() {
    let mut vm = Vm::with_config(VmConfig::default());
    vm.register_function(BytecodeFunction::new("depth", 1, depth_bytecode()));

    // 1023 recursive calls plus the base case: exactly 1024 frames.
    assert!(vm.execute(&call_depth(1023)).is_ok());

    // One call further pushes a 1025th frame and must overflow.
    assert!(vm.execute(&call_depth(1024)).is_err());

    // The VM keeps working afterward.
    assert!(vm.execute(&call_depth(10)).is_ok());
}

#[test]
fn undefined_global_is_recoverable() {
    let mut a = Asm::new();
    a.load_var("missing").op(Opcode::Return);
    let mut vm = Vm::new();
    assert!(vm.execute(&a.finish()).is_err());
}

#[test]
fn stack_underflow_on_pop_from_empty_stack_is_recoverable() {
    let mut a = Asm::new();
    a.op(Opcode::Pop);
    let mut vm = Vm::new();
    assert!(vm.execute(&a.finish()).is_err());
}

#[test]
fn arity_mismatch_does_not_corrupt_subsequent_calls() {
    let mut body = Asm::new();
    body.op(Opcode::Return);
    let mut vm = Vm::new();
    vm.register_function(BytecodeFunction::new("f", 1, body.finish()));

    let mut bad_call = Asm::new();
    bad_call.call("f", 0).op(Opcode::Return);
    assert!(vm.execute(&bad_call.finish()).is_err());

    let mut good_call = Asm::new();
    good_call.push_int(9).call("f", 1).op(Opcode::Return);
    vm.execute(&good_call.finish()).unwrap();
}
