//! The tiered JIT: per-function call profiling, the warmup → compile →
//! recompile state machine, and the three-phase Cranelift pipeline that
//! turns a bytecode function into native code.

mod lower;
mod scan;
mod translate;

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::bytecode::BytecodeFunction;
use crate::consts::VmConfig;
use crate::profile::{JitSpecialization, TypeProfile};

pub use lower::{FloatFn, IntFn};

/// The observable compilation state of a single function, matching the
/// Cold / Hot / Requalified / Failed states named in the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JitState {
    Cold,
    Compiled,
    Failed,
}

struct JitRecord {
    profile: TypeProfile,
    call_count: u64,
    post_jit_calls: u64,
    state: JitState,
    specialization: Option<JitSpecialization>,
    int_ptr: Option<IntFn>,
    float_ptr: Option<FloatFn>,
    recompiled: bool,
    // Retained so the JITModule (and the memory backing `int_ptr`/`float_ptr`)
    // outlives every call to the native function.
    _modules: Vec<cranelift_jit::JITModule>,
}

impl Default for JitRecord {
    fn default() -> Self {
        Self {
            profile: TypeProfile::default(),
            call_count: 0,
            post_jit_calls: 0,
            state: JitState::Cold,
            specialization: None,
            int_ptr: None,
            float_ptr: None,
            recompiled: false,
            _modules: Vec::new(),
        }
    }
}

/// Owns every function's [`JitRecord`] and drives compilation. Holds no
/// reference to the VM's registered functions — call sites pass the
/// [`BytecodeFunction`] they already have in hand.
#[derive(Debug, Default)]
pub struct Jit {
    records: HashMap<Rc<str>, JitRecordDebug>,
}

// `cranelift_jit::JITModule` doesn't implement `Debug`; wrap the record so
// `Jit` can still derive it for test assertions and `{:?}` convenience.
struct JitRecordDebug(JitRecord);

impl std::fmt::Debug for JitRecordDebug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JitRecord")
            .field("state", &self.0.state)
            .field("specialization", &self.0.specialization)
            .field("call_count", &self.0.call_count)
            .field("post_jit_calls", &self.0.post_jit_calls)
            .field("recompiled", &self.0.recompiled)
            .finish()
    }
}

impl Jit {
    /// A `Jit` with no recorded functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all state for `name`, e.g. after it is re-registered with new
    /// bytecode.
    pub fn forget(&mut self, name: &str) {
        self.records.remove(name);
    }

    /// True if `name` has at least one native entry installed.
    pub fn is_compiled(&self, name: &str) -> bool {
        self.records
            .get(name)
            .is_some_and(|r| r.0.int_ptr.is_some() || r.0.float_ptr.is_some())
    }

    /// The int-only native entry for `name`, if compiled.
    pub fn native_int(&self, name: &str) -> Option<IntFn> {
        self.records.get(name).and_then(|r| r.0.int_ptr)
    }

    /// The float-only native entry for `name`, if compiled.
    pub fn native_float(&self, name: &str) -> Option<FloatFn> {
        self.records.get(name).and_then(|r| r.0.float_ptr)
    }

    /// Record one call's argument-type classification against `name`'s
    /// profile.
    pub fn record_call(&mut self, name: &str, all_int: bool, all_float: bool) {
        self.entry(name).0.profile.record(all_int, all_float);
    }

    /// Record one additional call served by a native entry, returning `true`
    /// once the post-JIT call count reaches `config.recompile_threshold`.
    pub fn note_post_jit_call(&mut self, name: &str, config: &VmConfig) -> bool {
        let record = self.entry(name);
        if record.0.recompiled {
            return false;
        }
        record.0.post_jit_calls += 1;
        record.0.post_jit_calls >= config.recompile_threshold as u64
    }

    /// Increment `name`'s call count and attempt compilation once the
    /// threshold is reached. A no-op once the function is `Compiled` or
    /// `Failed`.
    pub fn maybe_compile(&mut self, function: &BytecodeFunction, config: &VmConfig) {
        let state = self.entry(function.name.as_ref()).0.state;
        if state != JitState::Cold {
            return;
        }
        let record = self.entry(function.name.as_ref());
        record.0.call_count += 1;
        if record.0.call_count < config.jit_threshold as u64 {
            return;
        }
        if function.bytecode.len() < config.min_bytecode_size {
            return;
        }
        let specialization = record.0.profile.preferred_specialization().unwrap_or(JitSpecialization::IntOnly);
        self.compile(function, specialization);
    }

    /// After the post-JIT recompile threshold is reached: pick the
    /// profile's current preference, and attempt compiling it if it
    /// differs from the function's current specialization. A function is
    /// recompiled at most once.
    pub fn recompile(&mut self, function: &BytecodeFunction) {
        let record = self.entry(function.name.as_ref());
        if record.0.recompiled || record.0.state != JitState::Compiled {
            return;
        }
        record.0.recompiled = true;
        let current = record.0.specialization;
        if current.is_some_and(|c| record.0.profile.still_prefers(c)) {
            return;
        }
        if let Some(new_spec) = record.0.profile.preferred_specialization() {
            self.compile(function, new_spec);
            self.entry(function.name.as_ref()).0.recompiled = true;
        }
    }

    fn entry(&mut self, name: &str) -> &mut JitRecordDebug {
        if !self.records.contains_key(name) {
            self.records.insert(Rc::from(name), JitRecordDebug(JitRecord::default()));
        }
        self.records.get_mut(name).expect("just inserted")
    }

    fn compile(&mut self, function: &BytecodeFunction, specialization: JitSpecialization) {
        let name = function.name.clone();
        let scan = match scan::scan(&function.bytecode, function.arity, specialization) {
            Some(s) => s,
            None => {
                debug!(function = %name, ?specialization, "JIT scan rejected function");
                self.mark_failed(&name);
                return;
            }
        };

        let isa_builder = match cranelift_native::builder() {
            Ok(b) => b,
            Err(_) => {
                self.mark_failed(&name);
                return;
            }
        };
        let flags = cranelift_codegen::settings::Flags::new(cranelift_codegen::settings::builder());
        let call_conv = match isa_builder.finish(flags) {
            Ok(isa) => isa.default_call_conv(),
            Err(_) => {
                self.mark_failed(&name);
                return;
            }
        };

        let ir = match translate::translate(&function.bytecode, function.arity, &scan, specialization, call_conv) {
            Some(f) => f,
            None => {
                debug!(function = %name, ?specialization, "JIT translation rejected function");
                self.mark_failed(&name);
                return;
            }
        };

        match lower::lower(ir, specialization, &name) {
            Some(lower::Compiled::Int { ptr, module }) => {
                let record = self.entry(&name);
                record.0.int_ptr = Some(ptr);
                record.0.state = JitState::Compiled;
                record.0.specialization = Some(JitSpecialization::IntOnly);
                record.0.post_jit_calls = 0;
                record.0.profile.reset();
                record.0._modules.push(module);
                debug!(function = %name, "JIT compiled IntOnly");
            }
            Some(lower::Compiled::Float { ptr, module }) => {
                let record = self.entry(&name);
                record.0.float_ptr = Some(ptr);
                record.0.state = JitState::Compiled;
                record.0.specialization = Some(JitSpecialization::FloatOnly);
                record.0.post_jit_calls = 0;
                record.0.profile.reset();
                record.0._modules.push(module);
                debug!(function = %name, "JIT compiled FloatOnly");
            }
            None => {
                debug!(function = %name, ?specialization, "JIT lowering failed");
                self.mark_failed(&name);
            }
        }
    }

    fn mark_failed(&mut self, name: &str) {
        self.entry(name).0.state = JitState::Failed;
    }
}
