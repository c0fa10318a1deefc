//! End-to-end JIT promotion scenarios: warmup, specialization selection,
//! sticky Failed, and post-JIT recompilation.

mod common;

use common::Asm;
use threadvm::bytecode::{BytecodeFunction, Opcode};
use threadvm::consts::VmConfig;
use threadvm::interpreter::Vm;
use threadvm::value::Value;

/// Iterative `fib(n)`, expressed entirely in the int-only JIT's supported
/// subset: locals `0=n, 1=a, 2=b, 3=i, 4=tmp`.
fn fib_bytecode() -> Vec<u8> {
    let mut a = Asm::new();
    a.push_int(0).store_local(1).op(Opcode::Pop);
    a.push_int(1).store_local(2).op(Opcode::Pop);
    a.push_int(0).store_local(3).op(Opcode::Pop);

    let loop_start = a.here();
    a.load_local(3).load_local(0).op(Opcode::Lt);
    let exit_jump = a.jump_if_false();

    a.load_local(1).load_local(2).op(Opcode::Add).store_local(4).op(Opcode::Pop);
    a.load_local(2).store_local(1).op(Opcode::Pop);
    a.load_local(4).store_local(2).op(Opcode::Pop);
    a.load_local(3).push_int(1).op(Opcode::Add).store_local(3).op(Opcode::Pop);
    let back_jump = a.jump();
    a.patch_to(back_jump, loop_start);

    let exit_label = a.here();
    a.patch_to(exit_jump, exit_label);
    a.load_local(1).op(Opcode::Return);
    a.finish()
}

fn call_with_int(name: &str, n: i64) -> Vec<u8> {
    let mut a = Asm::new();
    a.push_int(n).call(name, 1).op(Opcode::Return);
    a.finish()
}

fn call_with_float(name: &str, x: f64) -> Vec<u8> {
    let mut a = Asm::new();
    a.push_float(x).call(name, 1).op(Opcode::Return);
    a.finish()
}

#[test]
fn fib_promotes_to_int_only_jit_after_warmup() {
    let mut vm = Vm::with_config(VmConfig::default());
    vm.register_function(BytecodeFunction::new("fib", 1, fib_bytecode()));

    for _ in 0..5 {
        vm.execute(&call_with_int("fib", 30)).unwrap();
        assert_eq!(vm.last_return(), &Value::Integer(832_040));
    }
    assert!(vm.is_jit_compiled("fib"));

    vm.execute(&call_with_int("fib", 30)).unwrap();
    assert_eq!(vm.last_return(), &Value::Integer(832_040));
}

/// `poly(x) = x*x - 2*x + 1`, using only opcodes the float-only JIT
/// supports.
fn poly_bytecode() -> Vec<u8> {
    let mut a = Asm::new();
    a.load_local(0).load_local(0).op(Opcode::Mul);
    a.push_float(2.0).load_local(0).op(Opcode::Mul);
    a.op(Opcode::Sub);
    a.push_float(1.0).op(Opcode::Add);
    a.op(Opcode::Return);
    a.finish()
}

#[test]
fn poly_promotes_to_float_only_jit_after_warmup() {
    let mut vm = Vm::with_config(VmConfig::default());
    vm.register_function(BytecodeFunction::new("poly", 1, poly_bytecode()));

    for _ in 0..5 {
        vm.execute(&call_with_float("poly", 3.0)).unwrap();
        assert_eq!(vm.last_return(), &Value::Float(4.0));
    }
    assert!(vm.is_jit_compiled("poly"));

    vm.execute(&call_with_float("poly", 3.0)).unwrap();
    assert_eq!(vm.last_return(), &Value::Float(4.0));
}

/// A function that calls `PRINT` can never be compiled; it must be marked
/// Failed after warmup and keep interpreting correctly forever after.
fn printer_bytecode() -> Vec<u8> {
    let mut a = Asm::new();
    a.load_local(0).op(Opcode::Dup).op(Opcode::Print);
    a.op(Opcode::Return);
    a.finish()
}

#[test]
fn function_using_print_is_marked_failed_and_keeps_interpreting() {
    let mut vm = Vm::with_config(VmConfig::default());
    vm.register_function(BytecodeFunction::new("announce", 1, printer_bytecode()));

    for i in 0..6 {
        vm.execute(&call_with_int("announce", i)).unwrap();
        assert_eq!(vm.last_return(), &Value::Integer(i));
    }
    assert!(!vm.is_jit_compiled("announce"));
}

/// An `add(a, b)` function compiled IntOnly, then driven with enough Float
/// calls to flip the type profile and trigger a successful recompile to
/// FloatOnly. The int entry must remain usable afterward.
fn add_bytecode() -> Vec<u8> {
    let mut a = Asm::new();
    a.load_local(0).load_local(1).op(Opcode::Add).op(Opcode::Return);
    a.finish()
}

fn call_add_int(a: i64, b: i64) -> Vec<u8> {
    let mut asm = Asm::new();
    asm.push_int(a).push_int(b).call("add", 2).op(Opcode::Return);
    asm.finish()
}

fn call_add_float(a: f64, b: f64) -> Vec<u8> {
    let mut asm = Asm::new();
    asm.push_float(a).push_float(b).call("add", 2).op(Opcode::Return);
    asm.finish()
}

#[test]
fn int_only_function_recompiles_to_float_only_after_a_call_mix_shift() {
    let mut vm = Vm::with_config(VmConfig::default());
    vm.register_function(BytecodeFunction::new("add", 2, add_bytecode()));

    for _ in 0..5 {
        vm.execute(&call_add_int(2, 3)).unwrap();
    }
    assert!(vm.is_jit_compiled("add"));
    assert_eq!(vm.last_return(), &Value::Integer(5));

    for _ in 0..50 {
        vm.execute(&call_add_float(2.5, 1.5)).unwrap();
    }
    assert_eq!(vm.last_return(), &Value::Float(4.0));

    // The int entry must still work for a later Integer call.
    vm.execute(&call_add_int(10, 20)).unwrap();
    assert_eq!(vm.last_return(), &Value::Integer(30));
}
