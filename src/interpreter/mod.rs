//! [`Vm`]: the bytecode stack machine.
//!
//! Owns the operand stack, locals, globals, the call-frame stack, the
//! registered function table, and the JIT subsystem. `execute` is the sole
//! entry point; `CALL` opcodes recurse back into it through [`call`].

mod call;
mod dispatch;
mod frame;

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::bytecode::BytecodeFunction;
use crate::consts::VmConfig;
use crate::error::VmError;
use crate::jit::Jit;
use crate::registry::FunctionTable;
use crate::value::Value;

use frame::CallFrame;

/// The bytecode stack machine. Not `Send`/`Sync`: the operand stack, the
/// JIT's native-code caches, and `Rc`-shared strings are all non-atomic by
/// design (single-threaded execution, §5).
#[derive(Debug)]
pub struct Vm {
    stack: Vec<Value>,
    locals: Vec<Value>,
    globals: HashMap<String, Value>,
    last_return: Value,
    functions: FunctionTable,
    frames: Vec<CallFrame>,
    jit: Jit,
    config: VmConfig,
}

impl Vm {
    /// Construct a VM with the default [`VmConfig`].
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Construct a VM with embedder-supplied thresholds.
    pub fn with_config(config: VmConfig) -> Self {
        Self {
            stack: Vec::new(),
            locals: Vec::new(),
            globals: HashMap::new(),
            last_return: Value::None,
            functions: FunctionTable::new(),
            frames: Vec::new(),
            jit: Jit::new(),
            config,
        }
    }

    /// Register a bytecode function that `CALL` can invoke by name.
    /// Re-registering a name replaces the previous definition and clears
    /// any JIT state recorded against it.
    pub fn register_function(&mut self, function: BytecodeFunction) {
        let name = function.name.clone();
        self.functions.register(function);
        self.jit.forget(&name);
    }

    /// Run `bytecode` as a top-level program under an empty call stack.
    /// Clears the operand stack and locals on entry; globals and JIT state
    /// persist across calls. On success, the program's final value is
    /// available via [`Vm::last_return`].
    pub fn execute(&mut self, bytecode: &[u8]) -> Result<(), VmError> {
        self.stack.clear();
        self.locals.clear();
        let code: Rc<[u8]> = Rc::from(bytecode);
        debug!(len = code.len(), "executing top-level bytecode");
        let result = self.run(&code)?;
        self.last_return = result;
        Ok(())
    }

    /// The value produced by the most recently completed [`Vm::execute`]
    /// or, before any call, `Value::None`.
    pub fn last_return(&self) -> &Value {
        &self.last_return
    }

    /// Read a global by name, written by `STORE_VAR`.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Write a global directly, bypassing bytecode — useful for embedders
    /// seeding parameters before `execute`.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// True if `name` currently has a JIT-compiled native entry (int, float,
    /// or both).
    pub fn is_jit_compiled(&self, name: &str) -> bool {
        self.jit.is_compiled(name)
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
