//! # Quill Compiler
//!
//! Lowers `quill-ast` into a basic-block IR, runs the
//! constant-folding and jump-threading optimizer, and assembles the
//! result into a `quill_bytecode::Code` object.
//!
//! Module layout: `codegen` (AST → IR), `ir` (the block graph +
//! symbol-adjacent bookkeeping types), `symtab` (hierarchical scope
//! tracking), `optimizer` (constant fold + jump thread), `assemble`
//! (IR → linearized bytecode), `error` (typed compile errors).

#![warn(missing_docs)]

pub mod assemble;
pub mod codegen;
pub mod error;
pub mod ir;
pub mod optimizer;
pub mod symtab;

pub use codegen::Codegen;
pub use error::{CompileError, CompileResult};
pub use optimizer::OptLevel;

/// Compile a whole module at the given optimization level (`-O`).
pub fn compile_module(module: &quill_ast::Module, opt_level: OptLevel) -> CompileResult<quill_bytecode::Code> {
    Codegen::new(&module.name, opt_level).compile_module(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_ast::*;

    fn span() -> Span {
        Span::default()
    }

    #[test]
    fn compiles_trivial_module() {
        let module = Module {
            name: "main".into(),
            body: Block { stmts: vec![Stmt::Let { name: "x".into(), value: Expr::Literal(Literal::Int(11), span()), is_const: false }] },
        };
        let code = compile_module(&module, OptLevel::Medium).unwrap();
        assert!(code.flags.is_module);
        assert_eq!(code.display_name(), "main");
    }

    #[test]
    fn folds_constant_arithmetic_end_to_end() {
        // 3 + 4 * 2 should assemble to a single LSTATIC 11 with no
        // residual operand statics (end-to-end scenario).
        let lit = |n: i64| Expr::Literal(Literal::Int(n), span());
        let expr = Expr::Binary(
            BinOp::Add,
            Box::new(lit(3)),
            Box::new(Expr::Binary(BinOp::Mul, Box::new(lit(4)), Box::new(lit(2)), span())),
            span(),
        );
        let module = Module { name: "m".into(), body: Block { stmts: vec![Stmt::Expr(expr)] } };
        let code = compile_module(&module, OptLevel::Medium).unwrap();

        let lstatic_count = code.instructions_iter().filter(|(op, _, _)| *op == quill_bytecode::Opcode::LStatic).count();
        // One LSTATIC for the folded `11`, one for the implicit-return nil.
        assert_eq!(lstatic_count, 2);
        let has_eleven = code.statics.iter().any(|s| matches!(s, quill_bytecode::StaticValue::Int(11)));
        assert!(has_eleven);
        let has_residual = code.statics.iter().any(|s| matches!(s, quill_bytecode::StaticValue::Int(3 | 4 | 2)));
        assert!(!has_residual);
    }

    #[test]
    fn undeclared_name_is_a_compile_error() {
        let module = Module {
            name: "m".into(),
            body: Block { stmts: vec![Stmt::Expr(Expr::Ident("missing".into(), span()))] },
        };
        let err = compile_module(&module, OptLevel::None).unwrap_err();
        assert!(matches!(err, CompileError::UndeclaredName { .. }));
    }
}
