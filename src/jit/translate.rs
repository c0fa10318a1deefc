//! Phase 2/3 — IR construction: builds the Cranelift IR skeleton (entry
//! block, one `Variable` per local, one [`Block`] per basic-block start) and
//! then translates each block's opcodes against a compile-time SSA operand
//! stack, the way `atlas-jit`'s `IrTranslator` and the `MeTTa-Compiler`
//! JIT's `CodegenContext` both do.

use std::collections::BTreeMap;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{types, AbiParam, Block, Function, InstBuilder, MemFlags, Signature, TrapCode, Type, UserFuncName, Value as IrValue};
use cranelift_codegen::isa::CallConv;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext, Variable};

use crate::bytecode::{Cursor, Opcode};
use crate::profile::JitSpecialization;

use super::scan::ScanResult;

/// Cranelift's user trap code for an integer division/modulo by zero
/// reached inside compiled code (§7: a hard process abort, never a Rust
/// panic).
pub const TRAP_DIV_BY_ZERO: u16 = 1;

fn scalar_type(specialization: JitSpecialization) -> Type {
    match specialization {
        JitSpecialization::IntOnly => types::I64,
        JitSpecialization::FloatOnly => types::F64,
    }
}

/// Build the full IR [`Function`] for a scanned bytecode body. Returns
/// `None` on any translation-time invariant violation (operand-stack
/// underflow, a branch target outside the known block set, a non-empty
/// compile-time stack at a branch point) — the caller marks the function
/// Failed.
pub fn translate(
    code: &[u8],
    arity: u8,
    scan: &ScanResult,
    specialization: JitSpecialization,
    call_conv: CallConv,
) -> Option<Function> {
    let scalar_ty = scalar_type(specialization);

    let mut sig = Signature::new(call_conv);
    sig.params.push(AbiParam::new(types::I64)); // ptr to argument scalars
    sig.params.push(AbiParam::new(types::I32)); // argc
    sig.returns.push(AbiParam::new(scalar_ty));

    let mut func = Function::with_name_signature(UserFuncName::user(0, 0), sig);
    let mut func_ctx = FunctionBuilderContext::new();
    let mut builder = FunctionBuilder::new(&mut func, &mut func_ctx);

    let entry_block = builder.create_block();
    builder.append_block_params_for_function_params(entry_block);
    builder.switch_to_block(entry_block);
    let ptr_val = builder.block_params(entry_block)[0];

    let mut locals = Vec::with_capacity(scan.local_count as usize);
    for _ in 0..scan.local_count {
        locals.push(builder.declare_var(scalar_ty));
    }
    for (i, &var) in locals.iter().enumerate() {
        let value = if (i as u8) < arity {
            builder.ins().load(scalar_ty, MemFlags::trusted(), ptr_val, (i as i32) * 8)
        } else {
            zero_const(&mut builder, scalar_ty)
        };
        builder.def_var(var, value);
    }

    let offsets: Vec<usize> = scan.block_starts.iter().copied().collect();
    let mut blocks: BTreeMap<usize, Block> = BTreeMap::new();
    for &offset in &offsets {
        blocks.insert(offset, builder.create_block());
    }
    builder.ins().jump(blocks[&0], &[]);

    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(code.len());
        let fallthrough = offsets.get(i + 1).map(|next| blocks[next]);
        builder.switch_to_block(blocks[&start]);
        translate_block(&mut builder, code, start, end, &blocks, &locals, specialization, scalar_ty, fallthrough)?;
    }

    builder.seal_all_blocks();
    builder.finalize();
    Some(func)
}

fn zero_const(builder: &mut FunctionBuilder, scalar_ty: Type) -> IrValue {
    if scalar_ty == types::F64 {
        builder.ins().f64const(0.0)
    } else {
        builder.ins().iconst(types::I64, 0)
    }
}

#[allow(clippy::too_many_arguments)]
fn translate_block(
    builder: &mut FunctionBuilder,
    code: &[u8],
    start: usize,
    end: usize,
    blocks: &BTreeMap<usize, Block>,
    locals: &[Variable],
    specialization: JitSpecialization,
    scalar_ty: Type,
    fallthrough: Option<Block>,
) -> Option<()> {
    let is_float = specialization == JitSpecialization::FloatOnly;
    let mut stack: Vec<IrValue> = Vec::new();
    let mut cursor = Cursor::at(code, start);

    while cursor.ip < end {
        let op = cursor.read_opcode().ok()?;
        match op {
            Opcode::PushInt => {
                let v = cursor.read_i64().ok()?;
                let iv = builder.ins().iconst(types::I64, v);
                stack.push(if is_float {
                    builder.ins().fcvt_from_sint(types::F64, iv)
                } else {
                    iv
                });
            }
            Opcode::PushFloat => {
                let v = cursor.read_f64().ok()?;
                stack.push(builder.ins().f64const(v));
            }
            Opcode::Pop => {
                stack.pop()?;
            }
            Opcode::Dup => {
                let top = *stack.last()?;
                stack.push(top);
            }

            Opcode::Add => {
                let (a, b) = pop2(&mut stack)?;
                stack.push(if is_float { builder.ins().fadd(a, b) } else { builder.ins().iadd(a, b) });
            }
            Opcode::Sub => {
                let (a, b) = pop2(&mut stack)?;
                stack.push(if is_float { builder.ins().fsub(a, b) } else { builder.ins().isub(a, b) });
            }
            Opcode::Mul => {
                let (a, b) = pop2(&mut stack)?;
                stack.push(if is_float { builder.ins().fmul(a, b) } else { builder.ins().imul(a, b) });
            }
            Opcode::Div => {
                let (a, b) = pop2(&mut stack)?;
                let result = if is_float {
                    builder.ins().fdiv(a, b)
                } else {
                    guard_nonzero(builder, b);
                    builder.ins().sdiv(a, b)
                };
                stack.push(result);
            }
            Opcode::Mod => {
                let (a, b) = pop2(&mut stack)?;
                guard_nonzero(builder, b);
                stack.push(builder.ins().srem(a, b));
            }
            Opcode::Neg => {
                let a = stack.pop()?;
                stack.push(if is_float { builder.ins().fneg(a) } else { builder.ins().ineg(a) });
            }

            Opcode::Eq => compare(builder, &mut stack, is_float, IntCC::Equal, FloatCC::Equal)?,
            Opcode::Ne => compare(builder, &mut stack, is_float, IntCC::NotEqual, FloatCC::NotEqual)?,
            Opcode::Lt => compare(builder, &mut stack, is_float, IntCC::SignedLessThan, FloatCC::LessThan)?,
            Opcode::Le => compare(
                builder,
                &mut stack,
                is_float,
                IntCC::SignedLessThanOrEqual,
                FloatCC::LessThanOrEqual,
            )?,
            Opcode::Gt => compare(builder, &mut stack, is_float, IntCC::SignedGreaterThan, FloatCC::GreaterThan)?,
            Opcode::Ge => compare(
                builder,
                &mut stack,
                is_float,
                IntCC::SignedGreaterThanOrEqual,
                FloatCC::GreaterThanOrEqual,
            )?,

            Opcode::And => {
                let (a, b) = pop2(&mut stack)?;
                let zero = builder.ins().iconst(types::I64, 0);
                let a_true = builder.ins().icmp(IntCC::NotEqual, a, zero);
                let b_true = builder.ins().icmp(IntCC::NotEqual, b, zero);
                let both = builder.ins().band(a_true, b_true);
                stack.push(builder.ins().uextend(types::I64, both));
            }
            Opcode::Or => {
                let (a, b) = pop2(&mut stack)?;
                let zero = builder.ins().iconst(types::I64, 0);
                let a_true = builder.ins().icmp(IntCC::NotEqual, a, zero);
                let b_true = builder.ins().icmp(IntCC::NotEqual, b, zero);
                let either = builder.ins().bor(a_true, b_true);
                stack.push(builder.ins().uextend(types::I64, either));
            }
            Opcode::Not => {
                let a = stack.pop()?;
                let cmp = if is_float {
                    let zero = builder.ins().f64const(0.0);
                    builder.ins().fcmp(FloatCC::Equal, a, zero)
                } else {
                    let zero = builder.ins().iconst(types::I64, 0);
                    builder.ins().icmp(IntCC::Equal, a, zero)
                };
                stack.push(widen_bool(builder, cmp, is_float));
            }

            Opcode::BitAnd => {
                let (a, b) = pop2(&mut stack)?;
                stack.push(builder.ins().band(a, b));
            }
            Opcode::BitOr => {
                let (a, b) = pop2(&mut stack)?;
                stack.push(builder.ins().bor(a, b));
            }
            Opcode::BitXor => {
                let (a, b) = pop2(&mut stack)?;
                stack.push(builder.ins().bxor(a, b));
            }
            Opcode::BitNot => {
                let a = stack.pop()?;
                stack.push(builder.ins().bnot(a));
            }
            Opcode::Shl => {
                let (a, b) = pop2(&mut stack)?;
                let mask = builder.ins().iconst(types::I64, 63);
                let amt = builder.ins().band(b, mask);
                stack.push(builder.ins().ishl(a, amt));
            }
            Opcode::Shr => {
                let (a, b) = pop2(&mut stack)?;
                let mask = builder.ins().iconst(types::I64, 63);
                let amt = builder.ins().band(b, mask);
                stack.push(builder.ins().sshr(a, amt));
            }

            Opcode::LoadLocal => {
                let idx = cursor.read_u8().ok()? as usize;
                let var = *locals.get(idx)?;
                stack.push(builder.use_var(var));
            }
            Opcode::StoreLocal => {
                let idx = cursor.read_u8().ok()? as usize;
                let var = *locals.get(idx)?;
                let top = *stack.last()?;
                builder.def_var(var, top);
            }

            Opcode::Jump => {
                let target = cursor.read_u16().ok()? as usize;
                if !stack.is_empty() {
                    return None;
                }
                let block = *blocks.get(&target)?;
                builder.ins().jump(block, &[]);
                return Some(());
            }
            Opcode::JumpIfFalse => {
                let target = cursor.read_u16().ok()? as usize;
                let cond = stack.pop()?;
                if !stack.is_empty() {
                    return None;
                }
                let false_block = *blocks.get(&target)?;
                let true_block = fallthrough?;
                let truthy = if is_float {
                    let zero = builder.ins().f64const(0.0);
                    builder.ins().fcmp(FloatCC::NotEqual, cond, zero)
                } else {
                    let zero = builder.ins().iconst(types::I64, 0);
                    builder.ins().icmp(IntCC::NotEqual, cond, zero)
                };
                builder.ins().brif(truthy, true_block, &[], false_block, &[]);
                return Some(());
            }
            Opcode::Return => {
                let result = stack.pop().unwrap_or_else(|| zero_const(builder, scalar_ty));
                builder.ins().return_(&[result]);
                return Some(());
            }

            // PUSH_STRING/LOAD_VAR/STORE_VAR/CALL/PRINT/HALT are excluded
            // from both supported subsets; the structural scan never hands
            // translate() a function containing them.
            _ => return None,
        }
    }

    if !stack.is_empty() {
        return None;
    }
    match fallthrough {
        Some(next) => {
            builder.ins().jump(next, &[]);
        }
        None => {
            let zero = zero_const(builder, scalar_ty);
            builder.ins().return_(&[zero]);
        }
    }
    Some(())
}

fn pop2(stack: &mut Vec<IrValue>) -> Option<(IrValue, IrValue)> {
    let b = stack.pop()?;
    let a = stack.pop()?;
    Some((a, b))
}

fn compare(
    builder: &mut FunctionBuilder,
    stack: &mut Vec<IrValue>,
    is_float: bool,
    int_cc: IntCC,
    float_cc: FloatCC,
) -> Option<()> {
    let (a, b) = pop2(stack)?;
    let cmp = if is_float { builder.ins().fcmp(float_cc, a, b) } else { builder.ins().icmp(int_cc, a, b) };
    stack.push(widen_bool(builder, cmp, is_float));
    Some(())
}

/// Widen an `i8` 0/1 comparison result to the function's scalar type.
fn widen_bool(builder: &mut FunctionBuilder, cmp: IrValue, is_float: bool) -> IrValue {
    if is_float {
        let widened = builder.ins().uextend(types::I32, cmp);
        builder.ins().fcvt_from_uint(types::F64, widened)
    } else {
        builder.ins().uextend(types::I64, cmp)
    }
}

/// Emit a guard that traps on a zero divisor, matching the bailout-block
/// pattern used for division/modulo in the int-only specialization.
fn guard_nonzero(builder: &mut FunctionBuilder, divisor: IrValue) {
    let zero = builder.ins().iconst(types::I64, 0);
    let is_nonzero = builder.ins().icmp(IntCC::NotEqual, divisor, zero);
    let continue_block = builder.create_block();
    let bailout_block = builder.create_block();
    builder.ins().brif(is_nonzero, continue_block, &[], bailout_block, &[]);

    builder.switch_to_block(bailout_block);
    builder.ins().trap(TrapCode::unwrap_user(TRAP_DIV_BY_ZERO));

    builder.switch_to_block(continue_block);
}
