//! Runtime values shared by the compiler, the VM and the interpreter.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Block;
use crate::interpreter::environment::Environment;
use crate::vm::code::Instructions;

/// Type tag carried by hash keys and used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int,
    String,
    Bool,
    Null,
    Array,
    Hash,
    Function,
    CompiledFunction,
    Closure,
    Builtin,
    Error,
    ReturnValue,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeTag::Int => "Int",
            TypeTag::String => "String",
            TypeTag::Bool => "Bool",
            TypeTag::Null => "Null",
            TypeTag::Array => "Array",
            TypeTag::Hash => "Hash",
            TypeTag::Function => "Function",
            TypeTag::CompiledFunction => "CompiledFunction",
            TypeTag::Closure => "Closure",
            TypeTag::Builtin => "Builtin",
            TypeTag::Error => "Error",
            TypeTag::ReturnValue => "ReturnValue",
        };
        write!(f, "{}", s)
    }
}

/// A hashable key: the value's type tag plus a 64-bit payload.
///
/// The payload is the integer value itself, FNV-1a of the string bytes,
/// or 0/1 for booleans. Arrays, hashes, functions and errors are not
/// hashable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub tag: TypeTag,
    pub value: u64,
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET_BASIS, |hash, b| {
            (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
        })
}

impl HashKey {
    /// Derive a key from a value, if the value is hashable.
    pub fn from_value(value: &Value) -> Option<HashKey> {
        match value {
            Value::Int(n) => Some(HashKey {
                tag: TypeTag::Int,
                value: *n as u64,
            }),
            Value::String(s) => Some(HashKey {
                tag: TypeTag::String,
                value: fnv1a(s.as_bytes()),
            }),
            Value::Bool(b) => Some(HashKey {
                tag: TypeTag::Bool,
                value: u64::from(*b),
            }),
            _ => None,
        }
    }
}

/// A key/value entry of a hash; the original key is kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// A function compiled to bytecode: its instruction stream plus the
/// number of local slots to reserve and declared parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_params: usize,
}

/// A compiled function paired with its captured free variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

/// A function value in the tree-walking backend: AST plus defining
/// environment.
#[derive(Debug)]
pub struct Function {
    pub parameters: Vec<String>,
    pub body: Block,
    pub env: Rc<RefCell<Environment>>,
}

/// Host function signature for builtins. Failures are reported as
/// `Value::Error`, not host errors.
pub type BuiltinFn = fn(&[Value]) -> Value;

/// A named builtin function.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

/// A runtime value in Marmot.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    String(Rc<str>),
    Bool(bool),
    Null,
    Array(Rc<Vec<Value>>),
    Hash(Rc<IndexMap<HashKey, HashPair>>),
    /// Tree-walking backend closure.
    Function(Rc<Function>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
    /// Internal wrapper used by the tree-walking backend to unwind
    /// `return` through nested blocks.
    ReturnValue(Box<Value>),
    Error(String),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(message.into())
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Int(_) => TypeTag::Int,
            Value::String(_) => TypeTag::String,
            Value::Bool(_) => TypeTag::Bool,
            Value::Null => TypeTag::Null,
            Value::Array(_) => TypeTag::Array,
            Value::Hash(_) => TypeTag::Hash,
            Value::Function(_) => TypeTag::Function,
            Value::CompiledFunction(_) => TypeTag::CompiledFunction,
            Value::Closure(_) => TypeTag::Closure,
            Value::Builtin(_) => TypeTag::Builtin,
            Value::ReturnValue(_) => TypeTag::ReturnValue,
            Value::Error(_) => TypeTag::Error,
        }
    }

    pub fn type_name(&self) -> String {
        self.tag().to_string()
    }

    /// Null and false are falsy; everything else, including 0, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Identity comparison as the VM's `==` sees it: booleans and null
    /// compare as singletons, reference types by pointer, everything
    /// else is unequal. Integer comparison happens before this.
    pub fn same_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            _ => false,
        }
    }
}

// Structural equality, used by tests and by hash lookups in the
// interpreter. Function values compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a.name == b.name,
            (Value::ReturnValue(a), Value::ReturnValue(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Array(elements) => {
                let rendered: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Value::Hash(pairs) => {
                let rendered: Vec<String> = pairs
                    .values()
                    .map(|p| format!("{}: {}", p.key, p.value))
                    .collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Value::Function(func) => {
                write!(f, "fn({}) {}", func.parameters.join(", "), func.body)
            }
            Value::CompiledFunction(_) => write!(f, "<compiled fn>"),
            Value::Closure(_) => write!(f, "<closure>"),
            Value::Builtin(b) => write!(f, "<builtin {}>", b.name),
            Value::ReturnValue(inner) => write!(f, "{}", inner),
            Value::Error(message) => write!(f, "Error: {}", message),
        }
    }
}
