//! Abstract syntax tree produced by the parser.

pub mod expr;
pub mod stmt;

pub use expr::{Expr, ExprKind, InfixOp, PrefixOp};
pub use stmt::{Block, Program, Stmt, StmtKind};
