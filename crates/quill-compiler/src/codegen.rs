//! Lowers `quill_ast` into the basic-block IR.
//!
//! Split between a scope-walking front door and an expression/statement
//! emitter, following a "declare in current scope, resolve by walking
//! parents" idiom backed by [`crate::symtab::SymbolTable`].

use quill_ast::{BinOp, Block, Expr, FuncDef, Literal, Module, Stmt, UnOp};
use quill_bytecode::{CodeFlags, Opcode, StaticValue};

use crate::error::{CompileError, CompileResult};
use crate::ir::{JBlockKind, TranslationUnit};
use crate::symtab::{Resolution, SymbolKind, SymbolTable};

/// Drives codegen for one module, recursively compiling nested function
/// definitions into their own `Code` objects.
pub struct Codegen {
    symtab: SymbolTable,
    opt_level: crate::optimizer::OptLevel,
}

impl Codegen {
    /// Begin codegen for a module named `module_name`, optimizing emitted
    /// functions at `opt_level` (`-O`).
    pub fn new(module_name: &str, opt_level: crate::optimizer::OptLevel) -> Self {
        Codegen { symtab: SymbolTable::new(module_name), opt_level }
    }

    /// Compile an entire module into its top-level `Code` (an implicit
    /// function with no parameters run once at import time).
    pub fn compile_module(&mut self, module: &Module) -> CompileResult<quill_bytecode::Code> {
        let mut tu = TranslationUnit::new();
        self.compile_block(&mut tu, &module.body)?;
        self.emit_implicit_return(&mut tu, 0);
        Ok(self.assemble(tu, Some(module.name.clone()), &[], CodeFlags { is_module: true, ..CodeFlags::default() }, 1))
    }

    /// Compile one function definition into its own `Code`, descending
    /// into a fresh symbol-table scope.
    fn compile_funcdef(&mut self, def: &FuncDef, line: u32) -> CompileResult<quill_bytecode::Code> {
        self.symtab.enter_scope(&def.name, SymbolKind::Func);

        let mut tu = TranslationUnit::new();
        for param in &def.params {
            let node = self
                .symtab
                .declare(&param.name, SymbolKind::Variable)
                .map_err(|(existing, new)| CompileError::Redeclaration {
                    name: param.name.clone(),
                    existing_kind: existing,
                    new_kind: new,
                    span: quill_ast::Span::default(),
                })?;
            let slot = tu.locals.intern(&param.name);
            self.symtab.set_slot(node, slot);
            tu.next_local_slot = tu.next_local_slot.max(slot + 1);
        }
        if let Some(name) = &def.variadic {
            let slot = tu.locals.intern(name);
            tu.next_local_slot = tu.next_local_slot.max(slot + 1);
        }
        if let Some(name) = &def.kwargs {
            let slot = tu.locals.intern(name);
            tu.next_local_slot = tu.next_local_slot.max(slot + 1);
        }

        self.compile_block(&mut tu, &def.body)?;
        self.emit_implicit_return(&mut tu, line);

        self.symtab.exit_scope();

        let flags = CodeFlags {
            variadic: def.variadic.is_some(),
            kwargs: def.kwargs.is_some(),
            generator: false,
            is_module: false,
        };
        Ok(self.assemble(tu, Some(def.name.clone()), &def.params.iter().map(|p| p.name.clone()).collect::<Vec<_>>(), flags, line))
    }

    fn emit_implicit_return(&mut self, tu: &mut TranslationUnit, line: u32) {
        let nil_idx = tu.statics.push(StaticValue::Nil);
        tu.emit(Opcode::LStatic, nil_idx, line);
        tu.emit(Opcode::Ret, 0, line);
    }

    fn compile_block(&mut self, tu: &mut TranslationUnit, block: &Block) -> CompileResult<()> {
        for stmt in &block.stmts {
            self.compile_stmt(tu, stmt)?;
        }
        Ok(())
    }

    fn compile_stmt(&mut self, tu: &mut TranslationUnit, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Expr(expr) => {
                self.compile_expr(tu, expr)?;
                tu.emit(Opcode::Pop, 0, line_of(expr));
            }
            Stmt::Let { name, value, is_const } => {
                let line = line_of(value);
                self.compile_expr(tu, value)?;
                let kind = if *is_const { SymbolKind::Constant } else { SymbolKind::Variable };
                let node = self.symtab.declare(name, kind).map_err(|(existing, new)| CompileError::Redeclaration {
                    name: name.clone(),
                    existing_kind: existing,
                    new_kind: new,
                    span: quill_ast::Span { line, column: 0 },
                })?;
                self.store_name(tu, name, node, line);
            }
            Stmt::Assign { target, value } => {
                let line = line_of(value);
                self.compile_expr(tu, value)?;
                self.compile_assign_target(tu, target, line)?;
            }
            Stmt::If { cond, then_body, else_body } => self.compile_if(tu, cond, then_body, else_body.as_ref())?,
            Stmt::While { cond, body } => self.compile_while(tu, cond, body)?,
            Stmt::Loop { body } => self.compile_loop(tu, body)?,
            Stmt::Break => {
                let jb = tu.innermost_loop().ok_or(CompileError::LoopControlOutsideLoop("break", quill_ast::Span::default()))?;
                let target = jb.break_target;
                let pops = tu.pops_until_loop();
                if pops > 0 {
                    tu.emit_with_effect(Opcode::PopGt, pops, 0, 0);
                }
                tu.emit_jump(Opcode::Jmp, target, 0);
            }
            Stmt::Continue => {
                let jb = tu.innermost_loop().ok_or(CompileError::LoopControlOutsideLoop("continue", quill_ast::Span::default()))?;
                let target = jb.continue_target.ok_or(CompileError::LoopControlOutsideLoop("continue", quill_ast::Span::default()))?;
                let pops = tu.pops_until_loop();
                if pops > 0 {
                    tu.emit_with_effect(Opcode::PopGt, pops, 0, 0);
                }
                tu.emit_jump(Opcode::Jmp, target, 0);
            }
            Stmt::Return(value) => {
                let line = value.as_ref().map(line_of).unwrap_or(0);
                match value {
                    Some(expr) => self.compile_expr(tu, expr)?,
                    None => {
                        let idx = tu.statics.push(StaticValue::Nil);
                        tu.emit(Opcode::LStatic, idx, line);
                    }
                }
                tu.emit(Opcode::Ret, 0, line);
            }
            Stmt::FuncDef(def) => {
                let line = 0;
                let inner_code = self.compile_funcdef(def, line)?;
                let idx = tu.statics.push(StaticValue::Code(std::sync::Arc::new(inner_code)));
                tu.emit_with_effect(Opcode::MkFn, idx, line, 1);
                let node = self.symtab.declare(&def.name, SymbolKind::Func).map_err(|(existing, new)| CompileError::Redeclaration {
                    name: def.name.clone(),
                    existing_kind: existing,
                    new_kind: new,
                    span: quill_ast::Span::default(),
                })?;
                self.store_name(tu, &def.name, node, line);
            }
            Stmt::Import { what, as_name } => {
                let line = 0;
                let idx = tu.statics.push(StaticValue::String(what.clone().into_boxed_str()));
                tu.emit_with_effect(Opcode::ImpMod, idx, line, 1);
                let bound = as_name.clone().unwrap_or_else(|| what.clone());
                let node = self.symtab.declare(&bound, SymbolKind::Module).map_err(|(existing, new)| CompileError::Redeclaration {
                    name: bound.clone(),
                    existing_kind: existing,
                    new_kind: new,
                    span: quill_ast::Span::default(),
                })?;
                self.store_name(tu, &bound, node, line);
            }
            Stmt::Sync { guard, body } => {
                let line = line_of(guard);
                self.compile_expr(tu, guard)?;
                tu.sync_stack.apply(1);
                tu.push_cleanup_scope(JBlockKind::Sync, 1);
                self.symtab.enter_scope("", SymbolKind::Nested);
                self.compile_block(tu, body)?;
                self.symtab.exit_scope();
                tu.pop_jblock();
                tu.sync_stack.apply(-1);
                tu.emit_with_effect(Opcode::PopGt, 1, line, 0);
            }
            Stmt::Trap { body, handlers } => {
                // A dedicated entry block gives the body a clean byte-offset
                // start/end pair to record in the trap table ,
                // rather than sharing a block with whatever preceded it.
                let body_block = tu.new_block();
                tu.emit_jump(Opcode::Jmp, body_block, 0);
                tu.switch_to(body_block);

                tu.push_cleanup_scope(JBlockKind::Trap, 0);
                self.symtab.enter_scope("", SymbolKind::Nested);
                self.compile_block(tu, body)?;
                self.symtab.exit_scope();
                tu.pop_jblock();

                let after = tu.new_block();
                tu.emit_jump(Opcode::Jmp, after, 0);

                // Every block created while compiling the body landed at an
                // index between `body_block` and `after` (both created
                // before any handler block), so `[body_block, after)` is
                // exactly the body's block range.
                if !handlers.is_empty() {
                    let handler_entry = tu.blocks.len();
                    tu.record_trap(body_block, after, handler_entry);
                }

                for (_exc_type, bind_name, handler_body) in handlers {
                    let handler_block = tu.new_block();
                    tu.switch_to(handler_block);
                    self.symtab.enter_scope("", SymbolKind::Nested);
                    if !bind_name.is_empty() {
                        let node = self.symtab.declare(bind_name, SymbolKind::Variable).map_err(|(existing, new)| {
                            CompileError::Redeclaration {
                                name: bind_name.clone(),
                                existing_kind: existing,
                                new_kind: new,
                                span: quill_ast::Span::default(),
                            }
                        })?;
                        self.store_name(tu, bind_name, node, 0);
                    }
                    self.compile_block(tu, handler_body)?;
                    self.symtab.exit_scope();
                    tu.emit_jump(Opcode::Jmp, after, 0);
                }
                tu.switch_to(after);
            }
            Stmt::Defer(expr) => {
                let line = line_of(expr);
                self.compile_expr(tu, expr)?;
                tu.emit(Opcode::Dfr, 0, line);
            }
        }
        Ok(())
    }

    fn compile_assign_target(&mut self, tu: &mut TranslationUnit, target: &Expr, line: u32) -> CompileResult<()> {
        match target {
            Expr::Ident(name, span) => {
                let resolution = self.symtab.lookup(name).ok_or(CompileError::UndeclaredName { name: name.clone(), span: *span })?;
                match resolution {
                    Resolution::Local(node) => {
                        let slot = self.symtab.slot_of(node).unwrap_or_else(|| tu.locals.intern(name));
                        tu.emit(Opcode::StLc, slot, line);
                    }
                    Resolution::Enclosed(_) => {
                        let idx = tu.enclosed.intern(name);
                        tu.emit(Opcode::StEnc, idx, line);
                    }
                    Resolution::Global(_) => {
                        let idx = tu.globals.intern(name);
                        tu.emit(Opcode::StGbl, idx, line);
                    }
                }
                Ok(())
            }
            Expr::GetAttr { target, name, .. } => {
                self.compile_expr(tu, target)?;
                let idx = tu.globals.intern(name);
                tu.emit_with_effect(Opcode::StAttr, idx, line, -2);
                Ok(())
            }
            Expr::Subscript { target, index, .. } => {
                self.compile_expr(tu, target)?;
                self.compile_expr(tu, index)?;
                tu.emit(Opcode::StIdx, 0, line);
                Ok(())
            }
            _ => Err(CompileError::InvalidAssignmentTarget(target.span())),
        }
    }

    /// Emit the store half of a `let`/assignment/import binding once the
    /// value is already on top of the operand stack.
    fn store_name(&mut self, tu: &mut TranslationUnit, name: &str, node: usize, line: u32) {
        if self.symtab.is_module_scope(self.symtab.current()) {
            let idx = tu.globals.intern(name);
            tu.emit(Opcode::StGbl, idx, line);
        } else {
            let slot = tu.locals.intern(name);
            self.symtab.set_slot(node, slot);
            tu.next_local_slot = tu.next_local_slot.max(slot + 1);
            tu.emit(Opcode::StLc, slot, line);
        }
    }

    fn compile_if(&mut self, tu: &mut TranslationUnit, cond: &Expr, then_body: &Block, else_body: Option<&Block>) -> CompileResult<()> {
        let line = line_of(cond);
        self.compile_expr(tu, cond)?;

        let then_block = tu.new_block();
        let after_block = tu.new_block();
        let else_block = if else_body.is_some() { tu.new_block() } else { after_block };

        tu.emit_jump(Opcode::Jf, else_block, line);
        tu.emit_jump(Opcode::Jmp, then_block, line);

        tu.switch_to(then_block);
        self.symtab.enter_scope("", SymbolKind::Nested);
        self.compile_block(tu, then_body)?;
        self.symtab.exit_scope();
        tu.emit_jump(Opcode::Jmp, after_block, line);

        if let Some(else_stmts) = else_body {
            tu.switch_to(else_block);
            self.symtab.enter_scope("", SymbolKind::Nested);
            self.compile_block(tu, else_stmts)?;
            self.symtab.exit_scope();
            tu.emit_jump(Opcode::Jmp, after_block, line);
        }

        tu.switch_to(after_block);
        Ok(())
    }

    fn compile_while(&mut self, tu: &mut TranslationUnit, cond: &Expr, body: &Block) -> CompileResult<()> {
        let line = line_of(cond);
        let cond_block = tu.new_block();
        let body_block = tu.new_block();
        let after_block = tu.new_block();

        tu.emit_jump(Opcode::Jmp, cond_block, line);
        tu.switch_to(cond_block);
        self.compile_expr(tu, cond)?;
        tu.emit_jump(Opcode::Jf, after_block, line);
        tu.emit_jump(Opcode::Jmp, body_block, line);

        tu.switch_to(body_block);
        tu.push_loop(after_block, cond_block);
        self.symtab.enter_scope("", SymbolKind::Nested);
        self.compile_block(tu, body)?;
        self.symtab.exit_scope();
        tu.pop_jblock();
        tu.emit_jump(Opcode::Jmp, cond_block, line);

        tu.switch_to(after_block);
        Ok(())
    }

    fn compile_loop(&mut self, tu: &mut TranslationUnit, body: &Block) -> CompileResult<()> {
        let body_block = tu.new_block();
        let after_block = tu.new_block();

        tu.emit_jump(Opcode::Jmp, body_block, 0);
        tu.switch_to(body_block);
        tu.push_loop(after_block, body_block);
        self.symtab.enter_scope("", SymbolKind::Nested);
        self.compile_block(tu, body)?;
        self.symtab.exit_scope();
        tu.pop_jblock();
        tu.emit_jump(Opcode::Jmp, body_block, 0);

        tu.switch_to(after_block);
        Ok(())
    }

    fn compile_expr(&mut self, tu: &mut TranslationUnit, expr: &Expr) -> CompileResult<()> {
        let line = line_of(expr);
        match expr {
            Expr::Literal(lit, _) => {
                let idx = tu.statics.push(literal_to_static(lit));
                tu.emit(Opcode::LStatic, idx, line);
            }
            Expr::Ident(name, span) => {
                let resolution = self.symtab.lookup(name).ok_or(CompileError::UndeclaredName { name: name.clone(), span: *span })?;
                match resolution {
                    Resolution::Local(node) => {
                        let slot = self.symtab.slot_of(node).unwrap_or_else(|| tu.locals.intern(name));
                        tu.emit(Opcode::LdLc, slot, line);
                    }
                    Resolution::Enclosed(_) => {
                        let idx = tu.enclosed.intern(name);
                        tu.emit(Opcode::LdEnc, idx, line);
                    }
                    Resolution::Global(_) => {
                        let idx = tu.globals.intern(name);
                        tu.emit(Opcode::LdGbl, idx, line);
                    }
                }
            }
            Expr::Binary(op, lhs, rhs, _) => self.compile_binary(tu, *op, lhs, rhs, line)?,
            Expr::Unary(op, operand, _) => {
                self.compile_expr(tu, operand)?;
                let opcode = match op {
                    UnOp::Neg => Opcode::Neg,
                    UnOp::Pos => Opcode::Dup, // pass-through: `+x` has no distinct opcode
                    UnOp::Not => Opcode::Not,
                    UnOp::Inv => Opcode::LNot,
                };
                tu.emit(opcode, 0, line);
                if matches!(op, UnOp::Pos) {
                    // Dup leaves two copies; drop the original, keeping one.
                    tu.emit_with_effect(Opcode::PopGt, 1, line, -1);
                }
            }
            Expr::Call { callee, args, kwargs, .. } => {
                self.compile_expr(tu, callee)?;
                for arg in args {
                    self.compile_expr(tu, arg)?;
                }
                let mut mode = quill_bytecode::OpCodeCallMode::default();
                if !kwargs.is_empty() {
                    // `Opcode::Call`'s contract is a single trailing kwargs
                    // dict, not one stack slot per keyword argument, so
                    // build that dict here with the same MKDT shape
                    // `Expr::Dict` uses.
                    for (key, value) in kwargs {
                        let key_idx = tu.statics.push(StaticValue::String(key.clone().into_boxed_str()));
                        tu.emit(Opcode::LStatic, key_idx, line);
                        self.compile_expr(tu, value)?;
                    }
                    tu.emit_with_effect(Opcode::MkDt, kwargs.len() as u32, line, 1 - 2 * kwargs.len() as i32);
                    mode = mode.union(quill_bytecode::OpCodeCallMode::KW_PARAMS);
                }
                let trailing = if kwargs.is_empty() { 0 } else { 1 };
                let packed = quill_bytecode::instruction::pack_call_arg(args.len() as u16, mode);
                let consumed = 1 + args.len() as i32 + trailing;
                tu.emit_with_effect(Opcode::Call, packed, line, -(consumed) + 1);
            }
            Expr::GetAttr { target, name, .. } => {
                self.compile_expr(tu, target)?;
                let idx = tu.globals.intern(name);
                tu.emit(Opcode::LdAttr, idx, line);
            }
            Expr::SetAttr { target, name, value, .. } => {
                self.compile_expr(tu, target)?;
                self.compile_expr(tu, value)?;
                let idx = tu.globals.intern(name);
                tu.emit_with_effect(Opcode::StAttr, idx, line, -2);
                // SetAttr is itself an expression yielding the assigned value.
                tu.emit_with_effect(Opcode::LStatic, tu.statics.push(StaticValue::Nil), line, 1);
            }
            Expr::Subscript { target, index, .. } => {
                self.compile_expr(tu, target)?;
                self.compile_expr(tu, index)?;
                tu.emit(Opcode::LdIdx, 0, line);
            }
            Expr::List(items, _) => self.compile_seq(tu, items, Opcode::MkLt, line)?,
            Expr::Tuple(items, _) => self.compile_seq(tu, items, Opcode::MkTp, line)?,
            Expr::Set(items, _) => self.compile_seq(tu, items, Opcode::MkSt, line)?,
            Expr::Dict(pairs, _) => {
                for (key, value) in pairs {
                    self.compile_expr(tu, key)?;
                    self.compile_expr(tu, value)?;
                }
                tu.emit_with_effect(Opcode::MkDt, pairs.len() as u32, line, 1 - 2 * pairs.len() as i32);
            }
            Expr::Spawn(inner, _) => {
                self.compile_expr(tu, inner)?;
                tu.emit(Opcode::Spw, 0, line);
            }
        }
        Ok(())
    }

    fn compile_seq(&mut self, tu: &mut TranslationUnit, items: &[Expr], op: Opcode, line: u32) -> CompileResult<()> {
        for item in items {
            self.compile_expr(tu, item)?;
        }
        tu.emit_with_effect(op, items.len() as u32, line, 1 - items.len() as i32);
        Ok(())
    }

    fn compile_binary(&mut self, tu: &mut TranslationUnit, op: BinOp, lhs: &Expr, rhs: &Expr, line: u32) -> CompileResult<()> {
        match op {
            BinOp::LogAnd => {
                self.compile_expr(tu, lhs)?;
                let short_circuit = tu.new_block();
                let rhs_block = tu.new_block();
                tu.emit_jump(Opcode::Jfop, short_circuit, line);
                tu.emit_jump(Opcode::Jmp, rhs_block, line);
                tu.switch_to(rhs_block);
                tu.emit_with_effect(Opcode::Pop, 0, line, -1);
                self.compile_expr(tu, rhs)?;
                tu.emit_jump(Opcode::Jmp, short_circuit, line);
                tu.switch_to(short_circuit);
                return Ok(());
            }
            BinOp::LogOr => {
                self.compile_expr(tu, lhs)?;
                let short_circuit = tu.new_block();
                let rhs_block = tu.new_block();
                tu.emit_jump(Opcode::Jtop, short_circuit, line);
                tu.emit_jump(Opcode::Jmp, rhs_block, line);
                tu.switch_to(rhs_block);
                tu.emit_with_effect(Opcode::Pop, 0, line, -1);
                self.compile_expr(tu, rhs)?;
                tu.emit_jump(Opcode::Jmp, short_circuit, line);
                tu.switch_to(short_circuit);
                return Ok(());
            }
            _ => {}
        }

        self.compile_expr(tu, lhs)?;
        self.compile_expr(tu, rhs)?;
        let opcode = match op {
            BinOp::Add => Opcode::Add,
            BinOp::Sub => Opcode::Sub,
            BinOp::Mul => Opcode::Mul,
            BinOp::Div => Opcode::Div,
            BinOp::IDiv => Opcode::IDiv,
            BinOp::Mod => Opcode::Mod,
            BinOp::Shl => Opcode::Shl,
            BinOp::Shr => Opcode::Shr,
            BinOp::And => Opcode::Land,
            BinOp::Or => Opcode::Lor,
            BinOp::Xor => Opcode::Lxor,
            BinOp::Eq => Opcode::CmpEq,
            BinOp::Ne => Opcode::CmpNe,
            BinOp::Gr => Opcode::CmpGr,
            BinOp::Grq => Opcode::CmpGrq,
            BinOp::Le => Opcode::CmpLe,
            BinOp::Leq => Opcode::CmpLeq,
            BinOp::LogAnd | BinOp::LogOr => unreachable!("handled above"),
        };
        tu.emit(opcode, 0, line);
        Ok(())
    }

    fn assemble(&mut self, mut tu: TranslationUnit, name: Option<String>, params: &[String], flags: CodeFlags, start_line: u32) -> quill_bytecode::Code {
        crate::optimizer::optimize(&mut tu, self.opt_level);
        crate::assemble::assemble(tu, name, params, flags, start_line)
    }
}

fn literal_to_static(lit: &Literal) -> StaticValue {
    match lit {
        Literal::Nil => StaticValue::Nil,
        Literal::Bool(b) => StaticValue::Bool(*b),
        Literal::Int(i) => StaticValue::Int(*i),
        Literal::UInt(u) => StaticValue::UInt(*u),
        Literal::Decimal(d) => StaticValue::Decimal(*d),
        Literal::String(s) => StaticValue::String(s.clone().into_boxed_str()),
        Literal::Bytes(b) => StaticValue::Bytes(b.clone()),
    }
}

fn line_of(expr: &Expr) -> u32 {
    expr.span().line
}
