//! `CALL` opcode handling: argument classification and JIT profile
//! recording, the native fast paths for already-compiled functions, the
//! compile-trigger path for cold functions, and the plain interpreted
//! fallback that recurses back into [`super::Vm::run`].

use crate::bytecode::BytecodeFunction;
use crate::consts::MAX_STACK_ARGS;
use crate::error::RuntimeError;
use crate::jit::{FloatFn, IntFn};
use crate::value::Value;

use super::frame::CallFrame;
use super::Vm;

impl Vm {
    pub(super) fn dispatch_call(&mut self, name: &str, argc: u8) -> Result<(), RuntimeError> {
        let function = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UndefinedFunction(name.to_string()))?;

        if function.arity != argc {
            return Err(RuntimeError::ArityMismatch {
                name: name.to_string(),
                expected: function.arity,
                got: argc,
            });
        }

        let argc = argc as usize;
        if self.stack.len() < argc {
            return Err(RuntimeError::StackUnderflow);
        }
        let args_start = self.stack.len() - argc;

        let all_int = self.stack[args_start..].iter().all(|v| matches!(v, Value::Integer(_)));
        let all_float = !all_int && self.stack[args_start..].iter().all(|v| matches!(v, Value::Float(_)));
        self.jit.record_call(name, all_int, all_float);

        // Every call against an already-compiled function counts toward the
        // recompile window, whether or not this particular call's argument
        // types match the currently installed specialization — a function
        // whose call-site mix has drifted needs exactly those mismatched
        // calls to accumulate before recompilation is worth attempting.
        if self.jit.is_compiled(name) && self.jit.note_post_jit_call(name, &self.config) {
            self.jit.recompile(&function);
        }

        if all_int {
            if let Some(native) = self.jit.native_int(name) {
                return self.invoke_native_int(native, args_start);
            }
        } else if all_float {
            if let Some(native) = self.jit.native_float(name) {
                return self.invoke_native_float(native, args_start);
            }
        }

        self.jit.maybe_compile(&function, &self.config);
        self.invoke_interpreted(&function, args_start)
    }

    fn invoke_native_int(&mut self, native: IntFn, args_start: usize) -> Result<(), RuntimeError> {
        let argc = self.stack.len() - args_start;
        let result = if argc <= MAX_STACK_ARGS {
            let mut buf = [0i64; MAX_STACK_ARGS];
            for (slot, v) in buf.iter_mut().zip(&self.stack[args_start..]) {
                *slot = v.as_integer().expect("classified all_int above");
            }
            unsafe { native(buf.as_ptr(), argc as u32) }
        } else {
            let heap: Vec<i64> = self.stack[args_start..]
                .iter()
                .map(|v| v.as_integer().expect("classified all_int above"))
                .collect();
            unsafe { native(heap.as_ptr(), argc as u32) }
        };

        self.stack.truncate(args_start);
        self.push(Value::Integer(result))
    }

    fn invoke_native_float(&mut self, native: FloatFn, args_start: usize) -> Result<(), RuntimeError> {
        let argc = self.stack.len() - args_start;
        let result = if argc <= MAX_STACK_ARGS {
            let mut buf = [0f64; MAX_STACK_ARGS];
            for (slot, v) in buf.iter_mut().zip(&self.stack[args_start..]) {
                *slot = v.as_float().expect("classified all_float above");
            }
            unsafe { native(buf.as_ptr(), argc as u32) }
        } else {
            let heap: Vec<f64> = self.stack[args_start..]
                .iter()
                .map(|v| v.as_float().expect("classified all_float above"))
                .collect();
            unsafe { native(heap.as_ptr(), argc as u32) }
        };

        self.stack.truncate(args_start);
        self.push(Value::Float(result))
    }

    fn invoke_interpreted(&mut self, function: &BytecodeFunction, args_start: usize) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(RuntimeError::CallStackOverflow {
                limit: self.config.max_call_depth,
            });
        }

        let args = self.stack.split_off(args_start);
        let frame = CallFrame::capture(function.name.clone(), &mut self.locals, &mut self.stack);
        self.frames.push(frame);
        self.locals = args;

        let body = function.bytecode.clone();
        let result = self.run(&body);

        let frame = self.frames.pop().expect("just pushed above");
        frame.restore(&mut self.locals, &mut self.stack);

        let value = result?;
        self.push(value)
    }
}

#[cfg(test)]
mod tests {
    use crate::bytecode::{BytecodeFunction, Opcode};
    use crate::interpreter::Vm;
    use crate::value::Value;

    fn push_int(code: &mut Vec<u8>, v: i64) {
        code.push(Opcode::PushInt as u8);
        code.extend_from_slice(&v.to_le_bytes());
    }

    fn call(code: &mut Vec<u8>, name: &str, argc: u8) {
        code.push(Opcode::Call as u8);
        code.extend_from_slice(&(name.len() as u16).to_le_bytes());
        code.extend_from_slice(name.as_bytes());
        code.push(argc);
    }

    #[test]
    fn interpreted_call_returns_and_restores_caller_stack() {
        let mut add_body = Vec::new();
        add_body.push(Opcode::LoadLocal as u8);
        add_body.push(0);
        add_body.push(Opcode::LoadLocal as u8);
        add_body.push(1);
        add_body.push(Opcode::Add as u8);
        add_body.push(Opcode::Return as u8);

        let mut vm = Vm::new();
        vm.register_function(BytecodeFunction::new("add", 2, add_body));

        let mut code = Vec::new();
        push_int(&mut code, 10);
        push_int(&mut code, 2);
        push_int(&mut code, 3);
        call(&mut code, "add", 2);
        code.push(Opcode::Add as u8);
        code.push(Opcode::Return as u8);

        vm.execute(&code).unwrap();
        assert_eq!(vm.last_return(), &Value::Integer(15));
    }

    #[test]
    fn calling_an_undefined_function_is_a_recoverable_error() {
        let mut code = Vec::new();
        call(&mut code, "missing", 0);
        code.push(Opcode::Return as u8);

        let mut vm = Vm::new();
        assert!(vm.execute(&code).is_err());
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let mut body = Vec::new();
        body.push(Opcode::Return as u8);

        let mut vm = Vm::new();
        vm.register_function(BytecodeFunction::new("f", 1, body.clone()));

        let mut code = Vec::new();
        call(&mut code, "f", 0);
        code.push(Opcode::Return as u8);

        assert!(vm.execute(&code).is_err());
        let _ = body;
    }

    #[test]
    fn deep_recursion_past_the_configured_limit_overflows() {
        let mut config = crate::consts::VmConfig::default();
        config.max_call_depth = 4;
        let mut vm = Vm::with_config(config);

        let mut body = Vec::new();
        call(&mut body, "loop", 0);
        body.push(Opcode::Return as u8);
        vm.register_function(BytecodeFunction::new("loop", 0, body));

        let mut code = Vec::new();
        call(&mut code, "loop", 0);
        code.push(Opcode::Return as u8);

        assert!(vm.execute(&code).is_err());
    }
}
