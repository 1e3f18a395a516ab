//! Interactive prompt with persistent state across submissions.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::interpreter::value::Value;
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::vm::{Compiler, SymbolTable, Vm, GLOBALS_SIZE};

const HISTORY_FILE: &str = ".marmot_history";
const PROMPT: &str = ">> ";

pub struct Repl {
    history_file: PathBuf,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}

impl Repl {
    pub fn new() -> Self {
        let history_file = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HISTORY_FILE);
        Self { history_file }
    }

    pub fn run(&mut self) {
        println!("Marmot {} (type .help for help)", env!("CARGO_PKG_VERSION"));

        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(err) => {
                eprintln!("{}", format!("Could not start line editor: {}", err).red());
                return;
            }
        };
        let _ = editor.load_history(&self.history_file);

        // Compiler and VM state threaded through every submission, so
        // bindings from earlier lines stay visible.
        let symbols = Compiler::new().symbol_table();
        let mut constants: Vec<Value> = Vec::new();
        let mut globals = vec![Value::Null; GLOBALS_SIZE];

        loop {
            match editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = editor.add_history_entry(line);

                    match line {
                        ".help" => {
                            println!(".help  show this help");
                            println!(".exit  leave the repl");
                            continue;
                        }
                        ".exit" | "exit" => break,
                        _ => {}
                    }

                    match eval_line(line, symbols.clone(), constants, globals) {
                        (Some(value), new_constants, new_globals) => {
                            if !matches!(value, Value::Null) {
                                println!("{}", value);
                            }
                            constants = new_constants;
                            globals = new_globals;
                        }
                        (None, new_constants, new_globals) => {
                            constants = new_constants;
                            globals = new_globals;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("{}", format!("Readline error: {}", err).red());
                    break;
                }
            }
        }

        let _ = editor.save_history(&self.history_file);
    }
}

type ReplState = (Option<Value>, Vec<Value>, Vec<Value>);

/// Compile and run one submission; returns the printed value (if any)
/// plus the constants and globals to carry into the next one.
fn eval_line(
    line: &str,
    symbols: Rc<RefCell<SymbolTable>>,
    constants: Vec<Value>,
    globals: Vec<Value>,
) -> ReplState {
    let tokens = match Scanner::new(line).scan_tokens() {
        Ok(tokens) => tokens,
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            return (None, constants, globals);
        }
    };
    let program = match Parser::new(tokens).parse() {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            return (None, constants, globals);
        }
    };

    let mut compiler = Compiler::new_with_state(symbols, constants);
    if let Err(err) = compiler.compile(&program) {
        eprintln!("{}", err.to_string().red());
        return (None, compiler.bytecode().constants, globals);
    }
    let bytecode = compiler.bytecode();
    let constants = bytecode.constants.clone();

    let mut vm = Vm::new_with_state(bytecode, globals);
    if let Err(err) = vm.run() {
        eprintln!("{}", err.to_string().red());
        return (None, constants, vm.into_globals());
    }
    let value = vm.last_popped().clone();
    let globals = vm.into_globals();
    (Some(value), constants, globals)
}
