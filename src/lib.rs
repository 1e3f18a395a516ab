//! Marmot: a small dynamically-typed, expression-oriented scripting
//! language.
//!
//! # Execution Modes
//!
//! Marmot programs can run on two backends:
//! - **Bytecode VM**: single-pass compilation to a packed instruction
//!   stream executed by a stack machine (the default)
//! - **Tree-walk interpreter**: direct AST evaluation

pub mod ast;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod span;
pub mod vm;

use error::MarmotError;
use interpreter::value::Value;

/// Execution mode for running Marmot programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Bytecode virtual machine.
    #[default]
    Bytecode,
    /// Tree-walking interpreter.
    TreeWalk,
}

/// Run a program and return the value of its last expression statement.
pub fn run_source(source: &str, mode: ExecutionMode) -> Result<Value, MarmotError> {
    run_with_options(source, mode, false)
}

/// Run a program with full control over execution options.
pub fn run_with_options(
    source: &str,
    mode: ExecutionMode,
    disassemble: bool,
) -> Result<Value, MarmotError> {
    let program = parse(source)?;

    match mode {
        ExecutionMode::TreeWalk => {
            let mut interpreter = interpreter::Interpreter::new();
            Ok(interpreter.interpret(&program)?)
        }
        ExecutionMode::Bytecode => {
            let mut compiler = vm::Compiler::new();
            compiler.compile(&program)?;
            let bytecode = compiler.bytecode();

            if disassemble {
                print!("{}", vm::disassemble_bytecode(&bytecode));
                println!("---");
            }

            let mut machine = vm::Vm::new(bytecode);
            machine.run()?;
            Ok(machine.last_popped().clone())
        }
    }
}

/// Run a program from a file.
pub fn run_file(
    path: &std::path::Path,
    mode: ExecutionMode,
    disassemble: bool,
) -> Result<Value, MarmotError> {
    let source = std::fs::read_to_string(path)?;
    run_with_options(&source, mode, disassemble)
}

/// Parse source code into an AST without executing.
pub fn parse(source: &str) -> Result<ast::Program, MarmotError> {
    let tokens = lexer::Scanner::new(source).scan_tokens()?;
    let program = parser::Parser::new(tokens).parse()?;
    Ok(program)
}

/// Compile source code to bytecode without executing.
pub fn compile(source: &str) -> Result<vm::Bytecode, MarmotError> {
    let program = parse(source)?;
    let mut compiler = vm::Compiler::new();
    compiler.compile(&program)?;
    Ok(compiler.bytecode())
}
