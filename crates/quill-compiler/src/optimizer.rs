//! Peephole optimizer over the basic-block IR.
//!
//! Two passes, gated by [`OptLevel`]: constant folding (MEDIUM+) and jump
//! threading (SOFT+) — fold first, retarget jump chains second, both
//! driven by the same optimization-level enum.

use quill_bytecode::{Opcode, StaticValue};

use crate::ir::{BlockId, Instr, TranslationUnit};

/// Optimization level (`-O {0..3}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptLevel {
    /// `-O0`: no optimization passes run.
    None,
    /// `-O1`: jump threading only.
    Soft,
    /// `-O2`: constant folding + jump threading.
    Medium,
    /// `-O3`: same passes as `Medium` (no further level is defined yet;
    /// reserved so a future pass has somewhere to gate on).
    Full,
}

impl OptLevel {
    /// Map a CLI `-O` level (0-3) to an [`OptLevel`].
    pub fn from_cli(level: u8) -> Self {
        match level {
            0 => OptLevel::None,
            1 => OptLevel::Soft,
            2 => OptLevel::Medium,
            _ => OptLevel::Full,
        }
    }
}

/// Run the optimizer pipeline over `tu` in place, at `level`.
pub fn optimize(tu: &mut TranslationUnit, level: OptLevel) {
    if level >= OptLevel::Medium {
        constant_fold(tu);
    }
    if level >= OptLevel::Soft {
        jump_thread(tu);
    }
}

/// Whether `op` is foldable constant arithmetic/logic.
fn foldable(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::IDiv
            | Opcode::Mod
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::Land
            | Opcode::Lor
            | Opcode::Lxor
    )
}

/// Evaluate a foldable binary op against two static pool entries,
/// following the same overflow/promotion/division rules as the
/// interpreter's opcodes, so folded and unfolded programs observably
/// agree. Returns `None` when the
/// runtime itself would panic (e.g. division by zero) — such triples are
/// left unfolded so the panic still occurs at the original point.
fn fold_arith(op: Opcode, lhs: &StaticValue, rhs: &StaticValue) -> Option<StaticValue> {
    use StaticValue::*;

    // Decimal operands (or a decimal/integer mix) fold in floating point;
    // otherwise promote to unsigned if either operand is unsigned .
    let as_f64 = |v: &StaticValue| -> Option<f64> {
        match v {
            Int(i) => Some(*i as f64),
            UInt(u) => Some(*u as f64),
            Decimal(d) => Some(*d),
            _ => None,
        }
    };

    if matches!(lhs, Decimal(_)) || matches!(rhs, Decimal(_)) {
        let a = as_f64(lhs)?;
        let b = as_f64(rhs)?;
        let r = match op {
            Opcode::Add => a + b,
            Opcode::Sub => a - b,
            Opcode::Mul => a * b,
            Opcode::Div => {
                if b == 0.0 {
                    return None;
                }
                a / b
            }
            _ => return None, // shifts/bitwise aren't defined on decimals
        };
        return Some(Decimal(r));
    }

    match (lhs, rhs) {
        (Int(a), Int(b)) => fold_int(op, *a, *b),
        (UInt(a), UInt(b)) => fold_uint(op, *a, *b),
        // Mixed signed/unsigned promotes to unsigned .
        (Int(a), UInt(b)) if *a >= 0 => fold_uint(op, *a as u64, *b),
        (UInt(a), Int(b)) if *b >= 0 => fold_uint(op, *a, *b as u64),
        _ => None,
    }
}

fn fold_int(op: Opcode, a: i64, b: i64) -> Option<StaticValue> {
    let r = match op {
        Opcode::Add => a.checked_add(b)?,
        Opcode::Sub => a.checked_sub(b)?,
        Opcode::Mul => a.checked_mul(b)?,
        Opcode::Div | Opcode::IDiv => {
            if b == 0 {
                return None;
            }
            a.checked_div(b)?
        }
        Opcode::Mod => {
            if b == 0 {
                return None;
            }
            a.checked_rem(b)?
        }
        Opcode::Shl => a.checked_shl(b as u32)?,
        Opcode::Shr => a.checked_shr(b as u32)?,
        Opcode::Land => a & b,
        Opcode::Lor => a | b,
        Opcode::Lxor => a ^ b,
        _ => return None,
    };
    Some(StaticValue::Int(r))
}

fn fold_uint(op: Opcode, a: u64, b: u64) -> Option<StaticValue> {
    let r = match op {
        Opcode::Add => a.checked_add(b)?,
        Opcode::Sub => a.checked_sub(b)?,
        Opcode::Mul => a.checked_mul(b)?,
        Opcode::Div | Opcode::IDiv => {
            if b == 0 {
                return None;
            }
            a.checked_div(b)?
        }
        Opcode::Mod => {
            if b == 0 {
                return None;
            }
            a.checked_rem(b)?
        }
        Opcode::Shl => a.checked_shl(b as u32)?,
        Opcode::Shr => a.checked_shr(b as u32)?,
        Opcode::Land => a & b,
        Opcode::Lor => a | b,
        Opcode::Lxor => a ^ b,
        _ => return None,
    };
    Some(StaticValue::UInt(r))
}

/// Constant folding pass : walk every block looking for
/// `LSTATIC a, LSTATIC b, OP` triples, fold at compile time, intern the
/// result, rewrite to a single `LSTATIC r`, decrement the two retired
/// operands' usage counts, then compact the static pool and remap every
/// instruction that indexes it.
fn constant_fold(tu: &mut TranslationUnit) {
    for block in &mut tu.blocks {
        let mut i = 0;
        while i + 2 < block.instrs.len() {
            let (op_a, op_b, op_op) = (&block.instrs[i], &block.instrs[i + 1], &block.instrs[i + 2]);
            let is_triple = op_a.op == Opcode::LStatic
                && op_a.jump_target.is_none()
                && op_b.op == Opcode::LStatic
                && op_b.jump_target.is_none()
                && foldable(op_op.op)
                && op_op.jump_target.is_none();

            if !is_triple {
                i += 1;
                continue;
            }

            let a_idx = op_a.arg;
            let b_idx = op_b.arg;
            let line = op_a.line;
            let folded = {
                let lhs = tu.statics.get(a_idx).clone();
                let rhs = tu.statics.get(b_idx).clone();
                fold_arith(op_op.op, &lhs, &rhs)
            };

            if let Some(value) = folded {
                tu.statics.release(a_idx);
                tu.statics.release(b_idx);
                let r_idx = tu.statics.push(value);
                block.instrs.splice(i..i + 3, [Instr::new(Opcode::LStatic, r_idx, line)]);
                // Re-examine from the same position: the new LSTATIC may
                // itself chain into a following fold (e.g. `3 + 4 * 2`).
            } else {
                i += 1;
            }
        }
    }

    let remap = tu.statics.compact();
    for block in &mut tu.blocks {
        for instr in &mut block.instrs {
            // Every opcode whose argument indexes the static pool must be
            // remapped after compaction, not just `LSTATIC` — `MKFN` and
            // `IMPMOD`/`IMPFRM` do too (spec §4.11), and the interpreter
            // reads `code.statics[arg]` for all of them.
            if matches!(instr.op, Opcode::LStatic | Opcode::MkFn | Opcode::ImpMod | Opcode::ImpFrm) {
                if let Some(new_idx) = remap[instr.arg as usize] {
                    instr.arg = new_idx;
                }
            }
        }
    }
}

/// Jump threading pass : for every jump to a block, follow the
/// chain while the target is a trivial (single unconditional `JMP`) or
/// empty block, retargeting to the final destination.
fn jump_thread(tu: &mut TranslationUnit) {
    let resolve = |blocks: &[crate::ir::BasicBlock], mut target: BlockId| -> BlockId {
        let mut seen = std::collections::HashSet::new();
        loop {
            if !seen.insert(target) {
                break target; // guard against a degenerate jump cycle
            }
            if let Some(next) = blocks[target].is_trivial_jump() {
                target = next;
                continue;
            }
            if blocks[target].is_empty() && target + 1 < blocks.len() {
                // An empty block falls through to the next one in layout order.
                target += 1;
                continue;
            }
            break target;
        }
    };

    for i in 0..tu.blocks.len() {
        for j in 0..tu.blocks[i].instrs.len() {
            if let Some(target) = tu.blocks[i].instrs[j].jump_target {
                let resolved = resolve(&tu.blocks, target);
                tu.blocks[i].instrs[j].jump_target = Some(resolved);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_bytecode::StaticValue;

    fn tu_with(instrs: Vec<Instr>) -> TranslationUnit {
        let mut tu = TranslationUnit::new();
        tu.blocks[0].instrs = instrs;
        tu
    }

    fn sample_inner_code() -> quill_bytecode::Code {
        quill_bytecode::Code {
            name: Some("foo".into()),
            instructions: Vec::new(),
            statics: Vec::new(),
            globals: Vec::new(),
            locals: Vec::new(),
            enclosed: Vec::new(),
            params: Vec::new(),
            stack_size: 0,
            sync_stack_size: 0,
            locals_count: 0,
            line_map: Vec::new(),
            start_line: 1,
            flags: quill_bytecode::CodeFlags::default(),
            trap_table: Vec::new(),
        }
    }

    #[test]
    fn folds_arithmetic_fold_end_to_end() {
        // 3 + 4 * 2: parsed as Add(3, Mul(4, 2)) by precedence, but codegen
        // emits operands left-to-right, so the triple appearing first in
        // the instruction stream is `LSTATIC 4, LSTATIC 2, MUL`.
        let mut tu = TranslationUnit::new();
        let three = tu.statics.push(StaticValue::Int(3));
        let four = tu.statics.push(StaticValue::Int(4));
        let two = tu.statics.push(StaticValue::Int(2));
        tu.blocks[0].instrs = vec![
            Instr::new(Opcode::LStatic, three, 1),
            Instr::new(Opcode::LStatic, four, 1),
            Instr::new(Opcode::LStatic, two, 1),
            Instr::new(Opcode::Mul, 0, 1),
            Instr::new(Opcode::Add, 0, 1),
        ];

        constant_fold(&mut tu);

        // Two folds collapse the five instructions into one LSTATIC 11.
        assert_eq!(tu.blocks[0].instrs.len(), 1);
        assert_eq!(tu.blocks[0].instrs[0].op, Opcode::LStatic);
        let result = tu.statics.get(tu.blocks[0].instrs[0].arg);
        assert!(matches!(result, StaticValue::Int(11)));
        // No residual 3, 4, or 2 in the compacted pool.
        assert_eq!(tu.statics.len(), 1);
    }

    #[test]
    fn does_not_fold_division_by_zero() {
        let mut tu = TranslationUnit::new();
        let a = tu.statics.push(StaticValue::Int(10));
        let z = tu.statics.push(StaticValue::Int(0));
        tu.blocks[0].instrs = vec![
            Instr::new(Opcode::LStatic, a, 1),
            Instr::new(Opcode::LStatic, z, 1),
            Instr::new(Opcode::Div, 0, 1),
        ];
        constant_fold(&mut tu);
        assert_eq!(tu.blocks[0].instrs.len(), 3);
    }

    #[test]
    fn remaps_mkfn_and_impmod_after_fold_compacts_pool() {
        // `let x = 1 + 1` folds away two slots ahead of a later `MKFN`/
        // `IMPMOD` constant in the pool; both must be remapped to the
        // compacted index, not left pointing at the pre-fold slot.
        let mut tu = TranslationUnit::new();
        let one_a = tu.statics.push(StaticValue::Int(1));
        let one_b = tu.statics.push(StaticValue::Int(1));
        let code_const = tu.statics.push(StaticValue::Code(std::sync::Arc::new(sample_inner_code())));
        let mod_name = tu.statics.push(StaticValue::String("os".into()));
        tu.blocks[0].instrs = vec![
            Instr::new(Opcode::LStatic, one_a, 1),
            Instr::new(Opcode::LStatic, one_b, 1),
            Instr::new(Opcode::Add, 0, 1),
            Instr::new(Opcode::MkFn, code_const, 2),
            Instr::new(Opcode::ImpMod, mod_name, 3),
        ];

        constant_fold(&mut tu);

        // Pool compacted to [folded 2, code, "os"] (the two retired 1s freed).
        assert_eq!(tu.statics.len(), 3);
        let mkfn = tu.blocks[0].instrs.iter().find(|i| i.op == Opcode::MkFn).unwrap();
        assert!(matches!(tu.statics.get(mkfn.arg), StaticValue::Code(_)));
        let impmod = tu.blocks[0].instrs.iter().find(|i| i.op == Opcode::ImpMod).unwrap();
        assert!(matches!(tu.statics.get(impmod.arg), StaticValue::String(s) if &**s == "os"));
    }

    #[test]
    fn jump_thread_collapses_trivial_chain() {
        let mut tu = tu_with(vec![Instr::jump(Opcode::Jf, 1, 1)]);
        tu.blocks.push(crate::ir::BasicBlock { instrs: vec![Instr::jump(Opcode::Jmp, 2, 1)] });
        tu.blocks.push(crate::ir::BasicBlock { instrs: vec![Instr::new(Opcode::Ret, 0, 2)] });

        jump_thread(&mut tu);

        assert_eq!(tu.blocks[0].instrs[0].jump_target, Some(2));
    }
}
