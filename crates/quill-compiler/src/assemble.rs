//! Linearizes an optimized [`TranslationUnit`] into a [`quill_bytecode::Code`]
//! object.
//!
//! Because every opcode's encoded width depends only on the opcode itself
//! (never on its argument value — see `quill_bytecode::Opcode::width`),
//! assembly needs only a single layout pass to assign each block a byte
//! offset, followed by a fixup pass that resolves jump instructions'
//! block targets into absolute byte offsets now that every block's
//! offset is known.

use quill_bytecode::{encode, Code, CodeFlags, LineMapBuilder, Opcode, TrapEntry};

use crate::ir::{BlockId, TranslationUnit};

/// Assemble `tu` into a finished `Code` object.
pub fn assemble(tu: TranslationUnit, name: Option<String>, params: &[String], flags: CodeFlags, start_line: u32) -> Code {
    // Pass 1: lay out blocks in order, recording each block's starting
    // byte offset and each jump instruction's own offset (so its 24-bit
    // argument can be patched once every block's offset is known).
    let mut block_offsets: Vec<u32> = vec![0; tu.blocks.len()];
    let mut jump_fixups: Vec<(usize, BlockId)> = Vec::new();
    let mut instructions = Vec::new();
    let mut line_map = LineMapBuilder::new(start_line);

    for (block_id, block) in tu.blocks.iter().enumerate() {
        block_offsets[block_id] = instructions.len() as u32;
        for instr in &block.instrs {
            let offset = instructions.len() as u32;
            line_map.record(offset, instr.line);
            if let Some(target) = instr.jump_target {
                jump_fixups.push((offset as usize, target));
                encode(instr.op, 0, &mut instructions);
            } else {
                encode(instr.op, instr.arg, &mut instructions);
            }
        }
    }

    // Pass 2: patch jump arguments now that every block's start offset is
    // known. A jump instruction is always the 4-byte form (`Opcode::width`
    // classifies every jump opcode as `InstrWidth::Four`), so the argument
    // bytes sit at a fixed `offset+1..offset+4`.
    for (offset, target) in jump_fixups {
        let dest = block_offsets[target];
        instructions[offset + 1] = (dest & 0xFF) as u8;
        instructions[offset + 2] = ((dest >> 8) & 0xFF) as u8;
        instructions[offset + 3] = ((dest >> 16) & 0xFF) as u8;
    }

    // Resolve each recorded `trap` scope's block-ID triple into the
    // byte-offset ranges `Code::trap_entry_for` scans at runtime, reusing
    // the same `block_offsets` pass 1 already computed.
    let trap_table: Vec<TrapEntry> = tu
        .trap_entries
        .iter()
        .map(|&(start_block, end_block, handler_block)| TrapEntry {
            start: block_offsets[start_block],
            end: block_offsets[end_block],
            handler: block_offsets[handler_block],
        })
        .collect();

    Code {
        name,
        instructions,
        statics: tu.statics.into_values(),
        globals: tu.globals.into_vec(),
        locals: tu.locals.into_vec(),
        enclosed: tu.enclosed.into_vec(),
        params: params.to_vec(),
        stack_size: tu.stack.required,
        sync_stack_size: tu.sync_stack.required,
        locals_count: tu.next_local_slot,
        line_map: line_map.into_bytes(),
        start_line,
        flags,
        trap_table,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Instr;

    #[test]
    fn assembles_straight_line_code() {
        let mut tu = TranslationUnit::new();
        let idx = tu.statics.push(quill_bytecode::StaticValue::Int(1));
        tu.blocks[0].instrs.push(Instr::new(Opcode::LStatic, idx, 1));
        tu.blocks[0].instrs.push(Instr::new(Opcode::Ret, 0, 1));

        let code = assemble(tu, Some("f".into()), &[], CodeFlags::default(), 1);
        let ops: Vec<Opcode> = code.instructions_iter().map(|(op, _, _)| op).collect();
        assert_eq!(ops, vec![Opcode::LStatic, Opcode::Ret]);
    }

    #[test]
    fn patches_forward_jump_to_absolute_offset() {
        let mut tu = TranslationUnit::new();
        tu.blocks[0].instrs.push(Instr::jump(Opcode::Jmp, 1, 1));
        tu.blocks.push(crate::ir::BasicBlock { instrs: vec![Instr::new(Opcode::Ret, 0, 2)] });

        let code = assemble(tu, None, &[], CodeFlags::default(), 1);
        let (op, arg, _) = code.instructions_iter().next().unwrap();
        assert_eq!(op, Opcode::Jmp);
        // Block 1 starts right after the 4-byte JMP.
        assert_eq!(arg, 4);
    }
}
