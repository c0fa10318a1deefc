//! Phase 4 — lowering: verify the translated IR, run Cranelift's own
//! optimizer at `OptLevel::Speed` (this implementation's realization of "a
//! light function-pass pipeline, then aggressive code-gen" — Cranelift has
//! no separately-named mem2reg/GVN/simplify-CFG passes to invoke
//! individually), and finalize a native function via `cranelift-jit`.

use cranelift_codegen::ir::Function;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Linkage, Module};

use crate::profile::JitSpecialization;

/// A native function pointer for the int-only specialization: the same
/// `(*const i64, u32) -> i64` shape as the original's `JITFnPtr`.
pub type IntFn = unsafe extern "C" fn(*const i64, u32) -> i64;
/// A native function pointer for the float-only specialization.
pub type FloatFn = unsafe extern "C" fn(*const f64, u32) -> f64;

/// A successfully compiled native function, holding the pointer plus the
/// owning [`JITModule`] so it can be retained for the VM's lifetime —
/// native code must not be freed while any pointer to it could still be
/// live on the interpreter stack.
pub enum Compiled {
    /// An int-only compiled function.
    Int { ptr: IntFn, module: JITModule },
    /// A float-only compiled function.
    Float { ptr: FloatFn, module: JITModule },
}

/// Verify, compile, and finalize `func` into native code for `specialization`.
/// Returns `None` on a verification or codegen failure — the caller marks
/// the function Failed and logs the reason at `debug!`.
pub fn lower(func: Function, specialization: JitSpecialization, symbol: &str) -> Option<Compiled> {
    let mut flag_builder = settings::builder();
    flag_builder.set("opt_level", "speed").ok()?;
    flag_builder.set("is_pic", "false").ok()?;
    let flags = settings::Flags::new(flag_builder);

    let isa_builder = cranelift_native::builder().ok()?;
    let isa = isa_builder.finish(flags).ok()?;

    let jit_builder = JITBuilder::with_isa(isa, default_libcall_names());
    let mut module = JITModule::new(jit_builder);

    let func_id = module
        .declare_function(symbol, Linkage::Local, &func.signature)
        .ok()?;

    let mut ctx = Context::for_function(func);
    ctx.verify(module.isa()).ok()?;

    module.define_function(func_id, &mut ctx).ok()?;
    module.finalize_definitions().ok()?;

    let code_ptr = module.get_finalized_function(func_id);
    match specialization {
        JitSpecialization::IntOnly => {
            let ptr: IntFn = unsafe { std::mem::transmute(code_ptr) };
            Some(Compiled::Int { ptr, module })
        }
        JitSpecialization::FloatOnly => {
            let ptr: FloatFn = unsafe { std::mem::transmute(code_ptr) };
            Some(Compiled::Float { ptr, module })
        }
    }
}
