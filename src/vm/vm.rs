//! The stack-based virtual machine.
//!
//! Executes a `Bytecode` artifact against a value stack, a call-frame
//! stack and a globals vector. Popped values stay in their stack slot
//! until overwritten, which is what lets `last_popped` observe the
//! result of the final expression statement.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::RuntimeError;
use crate::interpreter::builtins::BUILTINS;
use crate::interpreter::value::{Closure, CompiledFunction, HashKey, HashPair, Value};
use crate::vm::code::{self, Opcode};
use crate::vm::compiler::Bytecode;

/// Value stack capacity.
pub const STACK_SIZE: usize = 2048;
/// Globals vector capacity.
pub const GLOBALS_SIZE: usize = 65536;
/// Call-frame stack capacity.
pub const MAX_FRAMES: usize = 1024;

/// A call frame: the running closure, its instruction pointer and the
/// stack offset where its local slots begin.
struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    base_pointer: usize,
}

/// The virtual machine.
pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Points to the next free stack slot.
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::new_with_state(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Run against an existing globals vector, so a REPL keeps bindings
    /// across submissions. The globals must have been produced with the
    /// same symbol table the compiler used, or indices misalign.
    pub fn new_with_state(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let main_fn = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_params: 0,
        };
        let main_closure = Closure {
            func: Rc::new(main_fn),
            free: Vec::new(),
        };
        let mut frames = Vec::with_capacity(MAX_FRAMES);
        frames.push(Frame {
            closure: Rc::new(main_closure),
            ip: 0,
            base_pointer: 0,
        });

        Self {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
        }
    }

    /// Reclaim the globals vector for a later `new_with_state`.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The most recently popped value: the slot just above the stack
    /// pointer.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    /// Run to completion or the first runtime error.
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            let frame_idx = self.frames.len() - 1;
            let ip = self.frames[frame_idx].ip;
            let instructions = &self.frames[frame_idx].closure.func.instructions;
            if ip >= instructions.len() {
                break;
            }
            let byte = instructions[ip];
            let op = Opcode::from_u8(byte)
                .ok_or_else(|| RuntimeError::general(format!("undefined opcode {}", byte)))?;
            self.frames[frame_idx].ip += 1;

            match op {
                Opcode::Constant => {
                    let index = self.read_u16_operand();
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }
                Opcode::Pop => {
                    self.pop();
                }
                Opcode::True => self.push(Value::Bool(true))?,
                Opcode::False => self.push(Value::Bool(false))?,
                Opcode::Null => self.push(Value::Null)?,

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    self.execute_binary_operation(op)?;
                }
                Opcode::GreaterThan | Opcode::Equal | Opcode::NotEqual => {
                    self.execute_comparison(op)?;
                }
                Opcode::Minus => {
                    let operand = self.pop();
                    match operand {
                        Value::Int(n) => self.push(Value::Int(n.wrapping_neg()))?,
                        other => {
                            return Err(RuntimeError::UnsupportedNegation(other.type_name()));
                        }
                    }
                }
                Opcode::Bang => {
                    let operand = self.pop();
                    self.push(Value::Bool(!operand.is_truthy()))?;
                }

                Opcode::Jump => {
                    let target = self.read_u16_operand();
                    self.frames[frame_idx].ip = target;
                }
                Opcode::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop();
                    if !condition.is_truthy() {
                        self.frames[frame_idx].ip = target;
                    }
                }

                Opcode::SetGlobal => {
                    let index = self.read_u16_operand();
                    self.globals[index] = self.pop();
                }
                Opcode::GetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let slot = self.read_u8_operand();
                    let base = self.frames[frame_idx].base_pointer;
                    self.stack[base + slot] = self.pop();
                }
                Opcode::GetLocal => {
                    let slot = self.read_u8_operand();
                    let base = self.frames[frame_idx].base_pointer;
                    let value = self.stack[base + slot].clone();
                    self.push(value)?;
                }
                Opcode::GetBuiltin => {
                    let index = self.read_u8_operand();
                    self.push(Value::Builtin(BUILTINS[index]))?;
                }
                Opcode::GetFree => {
                    let slot = self.read_u8_operand();
                    let value = self.frames[frame_idx].closure.free[slot].clone();
                    self.push(value)?;
                }
                Opcode::CurrentClosure => {
                    let closure = self.frames[frame_idx].closure.clone();
                    self.push(Value::Closure(closure))?;
                }

                Opcode::Array => {
                    let count = self.read_u16_operand();
                    let elements = self.stack[self.sp - count..self.sp].to_vec();
                    self.sp -= count;
                    self.push(Value::Array(Rc::new(elements)))?;
                }
                Opcode::Hash => {
                    let count = self.read_u16_operand();
                    let hash = self.build_hash(count)?;
                    self.sp -= count;
                    self.push(hash)?;
                }
                Opcode::Index => {
                    let index = self.pop();
                    let left = self.pop();
                    self.execute_index(left, index)?;
                }

                Opcode::Closure => {
                    let const_index = self.read_u16_operand();
                    let free_count = self.read_u8_operand();
                    self.push_closure(const_index, free_count)?;
                }
                Opcode::Call => {
                    let arg_count = self.read_u8_operand();
                    self.execute_call(arg_count)?;
                }
                Opcode::ReturnValue => {
                    let value = self.pop();
                    let frame = self.frames.pop().expect("frame stack is never empty");
                    self.sp = frame.base_pointer - 1;
                    self.push(value)?;
                }
                Opcode::Return => {
                    let frame = self.frames.pop().expect("frame stack is never empty");
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }
            }
        }
        Ok(())
    }

    // --- Operand decoding ---

    fn read_u16_operand(&mut self) -> usize {
        let frame = self.frames.last_mut().expect("frame stack is never empty");
        let value = code::read_u16(&frame.closure.func.instructions[frame.ip..]);
        frame.ip += 2;
        value as usize
    }

    fn read_u8_operand(&mut self) -> usize {
        let frame = self.frames.last_mut().expect("frame stack is never empty");
        let value = code::read_u8(&frame.closure.func.instructions[frame.ip..]);
        frame.ip += 1;
        value as usize
    }

    // --- Stack ---

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        self.stack[self.sp].clone()
    }

    // --- Operations ---

    fn execute_binary_operation(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();
        match (&left, &right) {
            (Value::Int(l), Value::Int(r)) => {
                let result = match op {
                    Opcode::Add => l.wrapping_add(*r),
                    Opcode::Sub => l.wrapping_sub(*r),
                    Opcode::Mul => l.wrapping_mul(*r),
                    Opcode::Div => {
                        if *r == 0 {
                            return Err(RuntimeError::DivisionByZero);
                        }
                        l.wrapping_div(*r)
                    }
                    _ => unreachable!("binary dispatch covers arithmetic opcodes only"),
                };
                self.push(Value::Int(result))
            }
            (Value::String(l), Value::String(r)) if op == Opcode::Add => {
                self.push(Value::string(format!("{}{}", l, r)))
            }
            _ => Err(RuntimeError::UnsupportedOperands {
                op: binary_op_symbol(op),
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn execute_comparison(&mut self, op: Opcode) -> Result<(), RuntimeError> {
        let right = self.pop();
        let left = self.pop();
        if let (Value::Int(l), Value::Int(r)) = (&left, &right) {
            let result = match op {
                Opcode::GreaterThan => l > r,
                Opcode::Equal => l == r,
                Opcode::NotEqual => l != r,
                _ => unreachable!("comparison dispatch covers comparison opcodes only"),
            };
            return self.push(Value::Bool(result));
        }
        match op {
            Opcode::Equal => self.push(Value::Bool(left.same_identity(&right))),
            Opcode::NotEqual => self.push(Value::Bool(!left.same_identity(&right))),
            _ => Err(RuntimeError::UnsupportedOperands {
                op: ">",
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn build_hash(&mut self, count: usize) -> Result<Value, RuntimeError> {
        let mut pairs = IndexMap::with_capacity(count / 2);
        let start = self.sp - count;
        for i in (start..self.sp).step_by(2) {
            let key = self.stack[i].clone();
            let value = self.stack[i + 1].clone();
            let hash_key = HashKey::from_value(&key)
                .ok_or_else(|| RuntimeError::UnhashableKey(key.type_name()))?;
            pairs.insert(hash_key, HashPair { key, value });
        }
        Ok(Value::Hash(Rc::new(pairs)))
    }

    fn execute_index(&mut self, left: Value, index: Value) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Value::Array(elements), _) => {
                let Value::Int(i) = index else {
                    return Err(RuntimeError::general(format!(
                        "array index must be an Int, got {}",
                        index.type_name()
                    )));
                };
                if i < 0 || i as usize >= elements.len() {
                    self.push(Value::Null)
                } else {
                    let element = elements[i as usize].clone();
                    self.push(element)
                }
            }
            (Value::Hash(pairs), key) => {
                let hash_key = HashKey::from_value(key)
                    .ok_or_else(|| RuntimeError::UnhashableKey(key.type_name()))?;
                let value = pairs
                    .get(&hash_key)
                    .map(|p| p.value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            _ => Err(RuntimeError::NotIndexable(left.type_name())),
        }
    }

    fn push_closure(&mut self, const_index: usize, free_count: usize) -> Result<(), RuntimeError> {
        let constant = self.constants[const_index].clone();
        let Value::CompiledFunction(func) = constant else {
            return Err(RuntimeError::general(format!(
                "not a function: {}",
                constant.type_name()
            )));
        };
        let free = self.stack[self.sp - free_count..self.sp].to_vec();
        self.sp -= free_count;
        self.push(Value::Closure(Rc::new(Closure { func, free })))
    }

    fn execute_call(&mut self, arg_count: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - arg_count].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, arg_count),
            // A bare compiled function is promoted to a closure with no
            // captures; the canonical callable is always a closure.
            Value::CompiledFunction(func) => self.call_closure(
                Rc::new(Closure {
                    func,
                    free: Vec::new(),
                }),
                arg_count,
            ),
            Value::Builtin(builtin) => {
                let args = self.stack[self.sp - arg_count..self.sp].to_vec();
                self.sp = self.sp - arg_count - 1;
                let result = (builtin.func)(&args);
                self.push(result)
            }
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, arg_count: usize) -> Result<(), RuntimeError> {
        if arg_count != closure.func.num_params {
            return Err(RuntimeError::WrongArity {
                expected: closure.func.num_params,
                got: arg_count,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(RuntimeError::StackOverflow);
        }
        let base_pointer = self.sp - arg_count;
        let new_sp = base_pointer + closure.func.num_locals;
        if new_sp > STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.frames.push(Frame {
            closure,
            ip: 0,
            base_pointer,
        });
        self.sp = new_sp;
        Ok(())
    }
}

fn binary_op_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        _ => "?",
    }
}
