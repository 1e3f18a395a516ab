//! Single-pass bytecode compiler: AST to instruction stream.
//!
//! The compiler walks the tree once, emitting into the buffer of the
//! current compilation scope. Function literals open a nested scope and
//! an enclosed symbol table; leaving the scope yields the function's
//! finished instruction stream.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Block, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use crate::error::CompileError;
use crate::interpreter::builtins::BUILTINS;
use crate::interpreter::value::{CompiledFunction, Value};
use crate::vm::code::{self, Instructions, Opcode};
use crate::vm::symbol_table::{Symbol, SymbolScope, SymbolTable};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// The compiled artifact: top-level instructions plus the constant pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// The opcode and start position of an emitted instruction.
#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// Per-function instruction buffer with the last two emissions tracked
/// for peephole rewrites.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The bytecode compiler.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: Rc<RefCell<SymbolTable>>,
    scopes: Vec<CompilationScope>,
    scope_index: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// A fresh compiler with a global symbol table seeded with the
    /// builtin registry.
    pub fn new() -> Self {
        let symbol_table = Rc::new(RefCell::new(SymbolTable::new()));
        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.borrow_mut().define_builtin(index, builtin.name);
        }
        Self {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
            scope_index: 0,
        }
    }

    /// Reuse a symbol table and constant pool from a previous compile,
    /// so a REPL keeps its global bindings.
    pub fn new_with_state(symbol_table: Rc<RefCell<SymbolTable>>, constants: Vec<Value>) -> Self {
        let mut compiler = Self::new();
        compiler.symbol_table = symbol_table;
        compiler.constants = constants;
        compiler
    }

    /// The symbol table, for handing to a later `new_with_state`.
    pub fn symbol_table(&self) -> Rc<RefCell<SymbolTable>> {
        self.symbol_table.clone()
    }

    /// Compile a whole program into the current scope.
    pub fn compile(&mut self, program: &Program) -> CompileResult<()> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    /// The finished artifact.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[self.scope_index].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    // --- Statements ---

    fn compile_statement(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[]);
            }
            StmtKind::Let { name, value } => {
                // A function literal named after its binding gets the
                // slot reserved first, so the body can resolve the name.
                let self_named = matches!(
                    &value.kind,
                    ExprKind::Function { name: Some(fn_name), .. } if fn_name == name
                );
                let symbol = if self_named {
                    let symbol = self.symbol_table.borrow_mut().define(name);
                    self.compile_expression(value)?;
                    symbol
                } else {
                    self.compile_expression(value)?;
                    self.symbol_table.borrow_mut().define(name)
                };
                match symbol.scope {
                    SymbolScope::Global => self.emit(Opcode::SetGlobal, &[symbol.index]),
                    _ => self.emit(Opcode::SetLocal, &[symbol.index]),
                };
            }
            StmtKind::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    // --- Expressions ---

    fn compile_expression(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::IntegerLiteral(n) => {
                let index = self.add_constant(Value::Int(*n));
                self.emit(Opcode::Constant, &[index]);
            }
            ExprKind::StringLiteral(s) => {
                let index = self.add_constant(Value::string(s.as_str()));
                self.emit(Opcode::Constant, &[index]);
            }
            ExprKind::BooleanLiteral(true) => {
                self.emit(Opcode::True, &[]);
            }
            ExprKind::BooleanLiteral(false) => {
                self.emit(Opcode::False, &[]);
            }
            ExprKind::Identifier(name) => {
                let symbol = self.symbol_table.borrow_mut().resolve(name);
                match symbol {
                    Some(symbol) => self.load_symbol(&symbol),
                    None => {
                        return Err(CompileError::UndefinedVariable(name.clone(), expr.span));
                    }
                }
            }
            ExprKind::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator {
                    PrefixOp::Bang => self.emit(Opcode::Bang, &[]),
                    PrefixOp::Minus => self.emit(Opcode::Minus, &[]),
                };
            }
            ExprKind::Infix {
                operator,
                left,
                right,
            } => {
                // `<` compiles its operands swapped; the VM only knows
                // one comparison direction.
                if *operator == InfixOp::Less {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Opcode::GreaterThan, &[]);
                    return Ok(());
                }
                self.compile_expression(left)?;
                self.compile_expression(right)?;
                match operator {
                    InfixOp::Add => self.emit(Opcode::Add, &[]),
                    InfixOp::Sub => self.emit(Opcode::Sub, &[]),
                    InfixOp::Mul => self.emit(Opcode::Mul, &[]),
                    InfixOp::Div => self.emit(Opcode::Div, &[]),
                    InfixOp::Greater => self.emit(Opcode::GreaterThan, &[]),
                    InfixOp::Equal => self.emit(Opcode::Equal, &[]),
                    InfixOp::NotEqual => self.emit(Opcode::NotEqual, &[]),
                    InfixOp::Less => unreachable!("handled above"),
                };
            }
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;
                // Placeholder operand, patched once the target is known.
                let jump_not_truthy = self.emit(Opcode::JumpNotTruthy, &[9999]);

                self.compile_block(consequence)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }

                let jump = self.emit(Opcode::Jump, &[9999]);
                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_not_truthy, after_consequence);

                match alternative {
                    None => {
                        self.emit(Opcode::Null, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;
                        if self.last_instruction_is(Opcode::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }
                let after_alternative = self.current_instructions().len();
                self.change_operand(jump, after_alternative);
            }
            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
            }
            ExprKind::Hash(pairs) => {
                // Sort by the keys' textual rendering for deterministic
                // bytecode.
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_key(|(key, _)| key.to_string());
                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
            }
            ExprKind::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
            }
            ExprKind::Function {
                name,
                parameters,
                body,
            } => {
                self.compile_function_literal(name.as_deref(), parameters, body)?;
            }
            ExprKind::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
            }
        }
        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        name: Option<&str>,
        parameters: &[String],
        body: &Block,
    ) -> CompileResult<()> {
        self.enter_scope();

        if let Some(name) = name {
            self.symbol_table.borrow_mut().define_function_name(name);
        }
        for parameter in parameters {
            self.symbol_table.borrow_mut().define(parameter);
        }

        self.compile_block(body)?;

        // The body's value escapes: a trailing Pop becomes the return,
        // and a body without one returns null.
        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[]);
        }

        let num_locals = self.symbol_table.borrow().num_definitions();
        let free_symbols = self.symbol_table.borrow().free_symbols.clone();
        let instructions = self.leave_scope();

        // Push the captured values in capture order, then wrap.
        for symbol in &free_symbols {
            self.load_symbol(symbol);
        }

        let func = CompiledFunction {
            instructions,
            num_locals,
            num_params: parameters.len(),
        };
        let index = self.add_constant(Value::CompiledFunction(Rc::new(func)));
        self.emit(Opcode::Closure, &[index, free_symbols.len()]);
        Ok(())
    }

    // --- Emission ---

    fn current_instructions(&self) -> &Instructions {
        &self.scopes[self.scope_index].instructions
    }

    /// Append a constant to the pool and return its index.
    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    /// Assemble and append an instruction, returning its start position.
    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let instruction = code::make(op, operands);
        let position = self.current_instructions().len();
        let scope = &mut self.scopes[self.scope_index];
        scope.instructions.extend(instruction);
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position,
        });
        position
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        matches!(
            self.scopes[self.scope_index].last_instruction,
            Some(EmittedInstruction { opcode, .. }) if opcode == op
        )
    }

    /// Drop the trailing Pop so the value stays on the stack.
    fn remove_last_pop(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        if let Some(last) = scope.last_instruction {
            scope.instructions.truncate(last.position);
            scope.last_instruction = scope.previous_instruction;
            scope.previous_instruction = None;
        }
    }

    /// Rewrite a trailing Pop in place to ReturnValue.
    fn replace_last_pop_with_return(&mut self) {
        let scope = &mut self.scopes[self.scope_index];
        if let Some(last) = &mut scope.last_instruction {
            let position = last.position;
            last.opcode = Opcode::ReturnValue;
            let instruction = code::make(Opcode::ReturnValue, &[]);
            scope.instructions[position..position + instruction.len()]
                .copy_from_slice(&instruction);
        }
    }

    /// Rewrite the operand of the instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = Opcode::from_u8(self.current_instructions()[position])
            .expect("patch target is a valid instruction");
        let instruction = code::make(op, &[operand]);
        let scope = &mut self.scopes[self.scope_index];
        scope.instructions[position..position + instruction.len()].copy_from_slice(&instruction);
    }

    // --- Scopes ---

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.scope_index += 1;
        let enclosed = SymbolTable::new_enclosed(self.symbol_table.clone());
        self.symbol_table = Rc::new(RefCell::new(enclosed));
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack is never empty");
        self.scope_index -= 1;
        let outer = self
            .symbol_table
            .borrow()
            .outer
            .clone()
            .expect("nested scope has an outer table");
        self.symbol_table = outer;
        scope.instructions
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[]),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;
    use crate::vm::code::{disassemble, make};

    fn compile(source: &str) -> Bytecode {
        let program = parse_source(source).expect("parser error");
        let mut compiler = Compiler::new();
        compiler.compile(&program).expect("compile error");
        compiler.bytecode()
    }

    fn concat(parts: &[Vec<u8>]) -> Instructions {
        parts.iter().flatten().copied().collect()
    }

    fn assert_instructions(source: &str, expected: &[Vec<u8>]) {
        let bytecode = compile(source);
        let expected = concat(expected);
        assert_eq!(
            bytecode.instructions,
            expected,
            "source: {}\nwant:\n{}got:\n{}",
            source,
            disassemble(&expected),
            disassemble(&bytecode.instructions)
        );
    }

    fn func(instructions: &[Vec<u8>], num_locals: usize, num_params: usize) -> Value {
        Value::CompiledFunction(Rc::new(CompiledFunction {
            instructions: concat(instructions),
            num_locals,
            num_params,
        }))
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_instructions(
            "1 + 2",
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1; 2",
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::Pop, &[]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "-1",
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::Minus, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_boolean_expressions() {
        assert_instructions(
            "true",
            &[make(Opcode::True, &[]), make(Opcode::Pop, &[])],
        );
        assert_instructions(
            "1 > 2",
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::GreaterThan, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "1 == 2",
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Equal, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
        assert_instructions(
            "!true",
            &[
                make(Opcode::True, &[]),
                make(Opcode::Bang, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_less_than_swaps_operands() {
        // `1 < 2` compiles the right operand first and reuses
        // OpGreaterThan.
        let bytecode = compile("1 < 2");
        assert_eq!(bytecode.constants, vec![Value::Int(2), Value::Int(1)]);
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::GreaterThan, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_conditional_without_alternative() {
        assert_instructions(
            "if (true) { 10 }; 3333;",
            &[
                // 0000
                make(Opcode::True, &[]),
                // 0001
                make(Opcode::JumpNotTruthy, &[10]),
                // 0004
                make(Opcode::Constant, &[0]),
                // 0007
                make(Opcode::Jump, &[11]),
                // 0010
                make(Opcode::Null, &[]),
                // 0011
                make(Opcode::Pop, &[]),
                // 0012
                make(Opcode::Constant, &[1]),
                // 0015
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_conditional_with_alternative() {
        assert_instructions(
            "if (true) { 10 } else { 20 }; 3333;",
            &[
                // 0000
                make(Opcode::True, &[]),
                // 0001
                make(Opcode::JumpNotTruthy, &[10]),
                // 0004
                make(Opcode::Constant, &[0]),
                // 0007
                make(Opcode::Jump, &[13]),
                // 0010
                make(Opcode::Constant, &[1]),
                // 0013
                make(Opcode::Pop, &[]),
                // 0014
                make(Opcode::Constant, &[2]),
                // 0017
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_global_let_statements() {
        assert_instructions(
            "let one = 1; let two = 2; one;",
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::SetGlobal, &[1]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_undefined_variable() {
        let program = parse_source("foobar").expect("parser error");
        let mut compiler = Compiler::new();
        let err = compiler.compile(&program).unwrap_err();
        assert!(matches!(err, CompileError::UndefinedVariable(name, _) if name == "foobar"));
    }

    #[test]
    fn test_string_expressions() {
        let bytecode = compile("\"mar\" + \"mot\"");
        assert_eq!(
            bytecode.constants,
            vec![Value::string("mar"), Value::string("mot")]
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_array_literals() {
        assert_instructions(
            "[]",
            &[make(Opcode::Array, &[0]), make(Opcode::Pop, &[])],
        );
        assert_instructions(
            "[1, 2, 3]",
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Array, &[3]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_hash_literals_sort_keys_textually() {
        let bytecode = compile("{\"b\": 2, \"c\": 3, \"a\": 1}");
        // Pairs are emitted in textual key order: a, b, c.
        assert_eq!(
            bytecode.constants,
            vec![
                Value::string("a"),
                Value::Int(1),
                Value::string("b"),
                Value::Int(2),
                Value::string("c"),
                Value::Int(3),
            ]
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Constant, &[4]),
                make(Opcode::Constant, &[5]),
                make(Opcode::Hash, &[6]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_index_expressions() {
        assert_instructions(
            "[1, 2][1 + 1]",
            &[
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Array, &[2]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Add, &[]),
                make(Opcode::Index, &[]),
                make(Opcode::Pop, &[]),
            ],
        );
    }

    #[test]
    fn test_functions() {
        let bytecode = compile("fn() { return 5 + 10 }");
        assert_eq!(
            bytecode.constants,
            vec![
                Value::Int(5),
                Value::Int(10),
                func(
                    &[
                        make(Opcode::Constant, &[0]),
                        make(Opcode::Constant, &[1]),
                        make(Opcode::Add, &[]),
                        make(Opcode::ReturnValue, &[]),
                    ],
                    0,
                    0,
                ),
            ]
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[make(Opcode::Closure, &[2, 0]), make(Opcode::Pop, &[])])
        );
    }

    #[test]
    fn test_function_implicit_return() {
        // A trailing expression statement's Pop becomes ReturnValue.
        let bytecode = compile("fn() { 5 + 10 }");
        assert_eq!(
            bytecode.constants[2],
            func(
                &[
                    make(Opcode::Constant, &[0]),
                    make(Opcode::Constant, &[1]),
                    make(Opcode::Add, &[]),
                    make(Opcode::ReturnValue, &[]),
                ],
                0,
                0,
            )
        );
    }

    #[test]
    fn test_empty_function_returns_null() {
        let bytecode = compile("fn() { }");
        assert_eq!(
            bytecode.constants,
            vec![func(&[make(Opcode::Return, &[])], 0, 0)]
        );
    }

    #[test]
    fn test_let_statement_scopes() {
        let bytecode = compile("let num = 55; fn() { num }");
        assert_eq!(
            bytecode.constants,
            vec![
                Value::Int(55),
                func(
                    &[
                        make(Opcode::GetGlobal, &[0]),
                        make(Opcode::ReturnValue, &[]),
                    ],
                    0,
                    0,
                ),
            ]
        );

        let bytecode = compile("fn() { let num = 55; num }");
        assert_eq!(
            bytecode.constants,
            vec![
                Value::Int(55),
                func(
                    &[
                        make(Opcode::Constant, &[0]),
                        make(Opcode::SetLocal, &[0]),
                        make(Opcode::GetLocal, &[0]),
                        make(Opcode::ReturnValue, &[]),
                    ],
                    1,
                    0,
                ),
            ]
        );
    }

    #[test]
    fn test_function_calls() {
        let bytecode = compile("let noArg = fn() { 24 }; noArg();");
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Closure, &[1, 0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Call, &[0]),
                make(Opcode::Pop, &[]),
            ])
        );

        let bytecode = compile("let manyArg = fn(a, b, c) { c }; manyArg(24, 25, 26);");
        assert_eq!(
            bytecode.constants[0],
            func(
                &[
                    make(Opcode::GetLocal, &[2]),
                    make(Opcode::ReturnValue, &[]),
                ],
                3,
                3,
            )
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Closure, &[0, 0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Constant, &[3]),
                make(Opcode::Call, &[3]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_builtins() {
        assert_instructions(
            "len([]); push([], 1);",
            &[
                make(Opcode::GetBuiltin, &[0]),
                make(Opcode::Array, &[0]),
                make(Opcode::Call, &[1]),
                make(Opcode::Pop, &[]),
                make(Opcode::GetBuiltin, &[5]),
                make(Opcode::Array, &[0]),
                make(Opcode::Constant, &[0]),
                make(Opcode::Call, &[2]),
                make(Opcode::Pop, &[]),
            ],
        );

        let bytecode = compile("fn() { len([]) }");
        assert_eq!(
            bytecode.constants,
            vec![func(
                &[
                    make(Opcode::GetBuiltin, &[0]),
                    make(Opcode::Array, &[0]),
                    make(Opcode::Call, &[1]),
                    make(Opcode::ReturnValue, &[]),
                ],
                0,
                0,
            )]
        );
    }

    #[test]
    fn test_closures() {
        let bytecode = compile("fn(a) { fn(b) { a + b } }");
        assert_eq!(
            bytecode.constants,
            vec![
                func(
                    &[
                        make(Opcode::GetFree, &[0]),
                        make(Opcode::GetLocal, &[0]),
                        make(Opcode::Add, &[]),
                        make(Opcode::ReturnValue, &[]),
                    ],
                    1,
                    1,
                ),
                func(
                    &[
                        make(Opcode::GetLocal, &[0]),
                        make(Opcode::Closure, &[0, 1]),
                        make(Opcode::ReturnValue, &[]),
                    ],
                    1,
                    1,
                ),
            ]
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[make(Opcode::Closure, &[1, 0]), make(Opcode::Pop, &[])])
        );
    }

    #[test]
    fn test_nested_closures() {
        let bytecode = compile("fn(a) { fn(b) { fn(c) { a + b + c } } }");
        assert_eq!(
            bytecode.constants,
            vec![
                func(
                    &[
                        make(Opcode::GetFree, &[0]),
                        make(Opcode::GetFree, &[1]),
                        make(Opcode::Add, &[]),
                        make(Opcode::GetLocal, &[0]),
                        make(Opcode::Add, &[]),
                        make(Opcode::ReturnValue, &[]),
                    ],
                    1,
                    1,
                ),
                func(
                    &[
                        make(Opcode::GetFree, &[0]),
                        make(Opcode::GetLocal, &[0]),
                        make(Opcode::Closure, &[0, 2]),
                        make(Opcode::ReturnValue, &[]),
                    ],
                    1,
                    1,
                ),
                func(
                    &[
                        make(Opcode::GetLocal, &[0]),
                        make(Opcode::Closure, &[1, 1]),
                        make(Opcode::ReturnValue, &[]),
                    ],
                    1,
                    1,
                ),
            ]
        );
    }

    #[test]
    fn test_recursive_function_uses_current_closure() {
        let bytecode = compile("let countDown = fn(x) { countDown(x - 1); }; countDown(1);");
        assert_eq!(
            bytecode.constants,
            vec![
                Value::Int(1),
                func(
                    &[
                        make(Opcode::CurrentClosure, &[]),
                        make(Opcode::GetLocal, &[0]),
                        make(Opcode::Constant, &[0]),
                        make(Opcode::Sub, &[]),
                        make(Opcode::Call, &[1]),
                        make(Opcode::ReturnValue, &[]),
                    ],
                    1,
                    1,
                ),
                Value::Int(1),
            ]
        );
        assert_eq!(
            bytecode.instructions,
            concat(&[
                make(Opcode::Closure, &[1, 0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[2]),
                make(Opcode::Call, &[1]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn test_compilation_scopes_bookkeeping() {
        let mut compiler = Compiler::new();
        let global_table = compiler.symbol_table();

        compiler.emit(Opcode::Mul, &[]);
        assert_eq!(compiler.scope_index, 0);

        compiler.enter_scope();
        assert_eq!(compiler.scope_index, 1);
        compiler.emit(Opcode::Sub, &[]);
        assert_eq!(compiler.scopes[1].instructions.len(), 1);
        assert!(compiler.last_instruction_is(Opcode::Sub));
        assert!(!Rc::ptr_eq(&compiler.symbol_table(), &global_table));

        compiler.leave_scope();
        assert_eq!(compiler.scope_index, 0);
        assert!(Rc::ptr_eq(&compiler.symbol_table(), &global_table));

        compiler.emit(Opcode::Add, &[]);
        assert_eq!(compiler.scopes[0].instructions.len(), 2);
        assert!(compiler.last_instruction_is(Opcode::Add));
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let source = "let h = {\"b\": 1, \"a\": 2}; let f = fn(x) { x + h[\"a\"] }; f(1);";
        let first = compile(source);
        let second = compile(source);
        assert_eq!(first.instructions, second.instructions);
        assert_eq!(first.constants, second.constants);
    }

    #[test]
    fn test_new_with_state_reuses_globals() {
        let mut first = Compiler::new();
        let program = parse_source("let a = 1;").expect("parser error");
        first.compile(&program).expect("compile error");
        let state = first.symbol_table();
        let constants = first.bytecode().constants;

        let mut second = Compiler::new_with_state(state, constants);
        let program = parse_source("a + 1").expect("parser error");
        second.compile(&program).expect("compile error");

        // `a` still resolves to global slot 0; the constant pool grows
        // from where the previous compile left it.
        assert_eq!(
            second.bytecode().instructions,
            concat(&[
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }
}
