//! Tree-walking evaluator, the alternative backend to the bytecode VM.
//!
//! Evaluation errors travel as `Value::Error` through the tree, the way
//! `return` travels as `Value::ReturnValue`; `interpret` converts a
//! surviving error value into a `RuntimeError` for the caller.

pub mod builtins;
pub mod environment;
pub mod value;

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Block, Expr, ExprKind, InfixOp, PrefixOp, Program, Stmt, StmtKind};
use crate::error::RuntimeError;

use environment::Environment;
use indexmap::IndexMap;
use value::{Function, HashKey, HashPair, Value};

/// The tree-walking interpreter. Keeps its global environment across
/// calls so a REPL can reuse it.
pub struct Interpreter {
    env: Rc<RefCell<Environment>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            env: Rc::new(RefCell::new(Environment::new())),
        }
    }

    /// Evaluate a program, returning the value of its last statement.
    pub fn interpret(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        let result = self.eval_program(program);
        match result {
            Value::Error(message) => Err(RuntimeError::General(message)),
            value => Ok(value),
        }
    }

    fn eval_program(&mut self, program: &Program) -> Value {
        let env = self.env.clone();
        let mut result = Value::Null;
        for stmt in &program.statements {
            result = self.eval_statement(stmt, &env);
            match result {
                Value::ReturnValue(inner) => return *inner,
                Value::Error(_) => return result,
                _ => {}
            }
        }
        result
    }

    fn eval_statement(&mut self, stmt: &Stmt, env: &Rc<RefCell<Environment>>) -> Value {
        match &stmt.kind {
            StmtKind::Let { name, value } => {
                let value = self.eval_expression(value, env);
                if value.is_error() {
                    return value;
                }
                env.borrow_mut().define(name.clone(), value);
                Value::Null
            }
            StmtKind::Return(expr) => {
                let value = self.eval_expression(expr, env);
                if value.is_error() {
                    return value;
                }
                Value::ReturnValue(Box::new(value))
            }
            StmtKind::Expression(expr) => self.eval_expression(expr, env),
        }
    }

    fn eval_block(&mut self, block: &Block, env: &Rc<RefCell<Environment>>) -> Value {
        let mut result = Value::Null;
        for stmt in &block.statements {
            result = self.eval_statement(stmt, env);
            // Return values bubble through nested blocks unopened.
            if matches!(result, Value::ReturnValue(_) | Value::Error(_)) {
                return result;
            }
        }
        result
    }

    fn eval_expression(&mut self, expr: &Expr, env: &Rc<RefCell<Environment>>) -> Value {
        match &expr.kind {
            ExprKind::IntegerLiteral(n) => Value::Int(*n),
            ExprKind::StringLiteral(s) => Value::string(s.as_str()),
            ExprKind::BooleanLiteral(b) => Value::Bool(*b),
            ExprKind::Identifier(name) => self.eval_identifier(name, env),
            ExprKind::Prefix { operator, right } => {
                let right = self.eval_expression(right, env);
                if right.is_error() {
                    return right;
                }
                eval_prefix(*operator, right)
            }
            ExprKind::Infix {
                operator,
                left,
                right,
            } => {
                let left = self.eval_expression(left, env);
                if left.is_error() {
                    return left;
                }
                let right = self.eval_expression(right, env);
                if right.is_error() {
                    return right;
                }
                eval_infix(*operator, left, right)
            }
            ExprKind::If {
                condition,
                consequence,
                alternative,
            } => {
                let condition = self.eval_expression(condition, env);
                if condition.is_error() {
                    return condition;
                }
                if condition.is_truthy() {
                    self.eval_block(consequence, env)
                } else if let Some(alternative) = alternative {
                    self.eval_block(alternative, env)
                } else {
                    Value::Null
                }
            }
            ExprKind::Function {
                parameters, body, ..
            } => Value::Function(Rc::new(Function {
                parameters: parameters.clone(),
                body: body.clone(),
                env: env.clone(),
            })),
            ExprKind::Call {
                function,
                arguments,
            } => {
                let callee = self.eval_expression(function, env);
                if callee.is_error() {
                    return callee;
                }
                let args = match self.eval_expressions(arguments, env) {
                    Ok(args) => args,
                    Err(err) => return err,
                };
                self.apply_function(callee, args)
            }
            ExprKind::Array(elements) => match self.eval_expressions(elements, env) {
                Ok(elements) => Value::Array(Rc::new(elements)),
                Err(err) => err,
            },
            ExprKind::Hash(pairs) => self.eval_hash_literal(pairs, env),
            ExprKind::Index { left, index } => {
                let left = self.eval_expression(left, env);
                if left.is_error() {
                    return left;
                }
                let index = self.eval_expression(index, env);
                if index.is_error() {
                    return index;
                }
                eval_index(left, index)
            }
        }
    }

    fn eval_identifier(&mut self, name: &str, env: &Rc<RefCell<Environment>>) -> Value {
        if let Some(value) = env.borrow().get(name) {
            return value;
        }
        if let Some(builtin) = builtins::lookup(name) {
            return Value::Builtin(builtin);
        }
        Value::error(format!("identifier not found: {}", name))
    }

    fn eval_expressions(
        &mut self,
        exprs: &[Expr],
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Vec<Value>, Value> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let value = self.eval_expression(expr, env);
            if value.is_error() {
                return Err(value);
            }
            values.push(value);
        }
        Ok(values)
    }

    fn eval_hash_literal(
        &mut self,
        pairs: &[(Expr, Expr)],
        env: &Rc<RefCell<Environment>>,
    ) -> Value {
        let mut map = IndexMap::new();
        for (key_expr, value_expr) in pairs {
            let key = self.eval_expression(key_expr, env);
            if key.is_error() {
                return key;
            }
            let Some(hash_key) = HashKey::from_value(&key) else {
                return Value::error(format!("unusable as hash key: {}", key.type_name()));
            };
            let value = self.eval_expression(value_expr, env);
            if value.is_error() {
                return value;
            }
            map.insert(hash_key, HashPair { key, value });
        }
        Value::Hash(Rc::new(map))
    }

    fn apply_function(&mut self, callee: Value, args: Vec<Value>) -> Value {
        match callee {
            Value::Function(func) => {
                if args.len() != func.parameters.len() {
                    return Value::error(format!(
                        "wrong number of arguments: want={}, got={}",
                        func.parameters.len(),
                        args.len()
                    ));
                }
                let call_env = Rc::new(RefCell::new(Environment::with_enclosing(func.env.clone())));
                for (param, arg) in func.parameters.iter().zip(args) {
                    call_env.borrow_mut().define(param.clone(), arg);
                }
                match self.eval_block(&func.body, &call_env) {
                    Value::ReturnValue(inner) => *inner,
                    other => other,
                }
            }
            Value::Builtin(builtin) => (builtin.func)(&args),
            other => Value::error(format!("not a function: {}", other.type_name())),
        }
    }
}

fn eval_prefix(operator: PrefixOp, right: Value) -> Value {
    match operator {
        PrefixOp::Bang => Value::Bool(!right.is_truthy()),
        PrefixOp::Minus => match right {
            Value::Int(n) => Value::Int(n.wrapping_neg()),
            other => Value::error(format!("unknown operator: -{}", other.type_name())),
        },
    }
}

fn eval_infix(operator: InfixOp, left: Value, right: Value) -> Value {
    match (&left, &right) {
        (Value::Int(l), Value::Int(r)) => eval_integer_infix(operator, *l, *r),
        (Value::String(l), Value::String(r)) if operator == InfixOp::Add => {
            Value::string(format!("{}{}", l, r))
        }
        _ => match operator {
            InfixOp::Equal => Value::Bool(left.same_identity(&right)),
            InfixOp::NotEqual => Value::Bool(!left.same_identity(&right)),
            _ if left.tag() != right.tag() => Value::error(format!(
                "type mismatch: {} {} {}",
                left.type_name(),
                operator,
                right.type_name()
            )),
            _ => Value::error(format!(
                "unknown operator: {} {} {}",
                left.type_name(),
                operator,
                right.type_name()
            )),
        },
    }
}

fn eval_integer_infix(operator: InfixOp, left: i64, right: i64) -> Value {
    match operator {
        InfixOp::Add => Value::Int(left.wrapping_add(right)),
        InfixOp::Sub => Value::Int(left.wrapping_sub(right)),
        InfixOp::Mul => Value::Int(left.wrapping_mul(right)),
        InfixOp::Div => {
            if right == 0 {
                Value::error("division by zero")
            } else {
                Value::Int(left.wrapping_div(right))
            }
        }
        InfixOp::Less => Value::Bool(left < right),
        InfixOp::Greater => Value::Bool(left > right),
        InfixOp::Equal => Value::Bool(left == right),
        InfixOp::NotEqual => Value::Bool(left != right),
    }
}

fn eval_index(left: Value, index: Value) -> Value {
    match (&left, &index) {
        (Value::Array(elements), Value::Int(i)) => {
            if *i < 0 || *i as usize >= elements.len() {
                Value::Null
            } else {
                elements[*i as usize].clone()
            }
        }
        (Value::Hash(pairs), key) => match HashKey::from_value(key) {
            Some(hash_key) => pairs
                .get(&hash_key)
                .map(|p| p.value.clone())
                .unwrap_or(Value::Null),
            None => Value::error(format!("unusable as hash key: {}", key.type_name())),
        },
        _ => Value::error(format!(
            "index operator not supported: {}",
            left.type_name()
        )),
    }
}
