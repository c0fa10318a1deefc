//! Phase 1 — structural scan: a single linear pass over a function's
//! bytecode that recovers basic-block boundaries and the highest local
//! index referenced, and rejects any function using an opcode outside the
//! chosen specialization's supported subset.

use std::collections::BTreeSet;

use crate::bytecode::{Cursor, Opcode};
use crate::profile::JitSpecialization;

/// The recoverable structure of a function body: where its basic blocks
/// begin, and how many local slots it needs.
pub struct ScanResult {
    /// Bytecode offsets at which a new basic block begins. Always includes
    /// `0`; every jump target and every instruction immediately following a
    /// branch or `RETURN` is also a block start.
    pub block_starts: BTreeSet<usize>,
    /// `max(arity, 1 + highest LOAD_LOCAL/STORE_LOCAL index)`.
    pub local_count: u8,
}

/// Walk `code` once, collecting block boundaries and checking every opcode
/// against `specialization`'s supported subset. Returns `None` if the
/// function contains an unsupported opcode, a malformed operand, or is
/// otherwise not compilable — the caller marks the function Failed.
pub fn scan(code: &[u8], arity: u8, specialization: JitSpecialization) -> Option<ScanResult> {
    let mut block_starts = BTreeSet::new();
    block_starts.insert(0);
    let mut max_local = arity.saturating_sub(1);
    let mut has_locals = arity > 0;

    let mut cursor = Cursor::new(code);
    while !cursor.at_end() {
        let op = cursor.read_opcode().ok()?;
        if !is_supported(op, specialization) {
            return None;
        }
        match op {
            Opcode::PushInt => {
                cursor.read_i64().ok()?;
            }
            Opcode::PushFloat => {
                cursor.read_f64().ok()?;
            }
            Opcode::LoadLocal | Opcode::StoreLocal => {
                let idx = cursor.read_u8().ok()?;
                has_locals = true;
                max_local = max_local.max(idx);
            }
            Opcode::Jump => {
                let target = cursor.read_u16().ok()? as usize;
                if target > code.len() {
                    return None;
                }
                block_starts.insert(target);
                block_starts.insert(cursor.ip);
            }
            Opcode::JumpIfFalse => {
                let target = cursor.read_u16().ok()? as usize;
                if target > code.len() {
                    return None;
                }
                block_starts.insert(target);
                block_starts.insert(cursor.ip);
            }
            Opcode::Return => {
                block_starts.insert(cursor.ip);
            }
            _ => {}
        }
    }

    Some(ScanResult {
        block_starts,
        local_count: if has_locals { max_local + 1 } else { 0 },
    })
}

fn is_supported(op: Opcode, specialization: JitSpecialization) -> bool {
    match specialization {
        JitSpecialization::IntOnly => op.supported_by_int_jit(),
        JitSpecialization::FloatOnly => op.supported_by_float_jit(),
    }
}
