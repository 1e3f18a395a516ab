//! The ordered builtin function registry.
//!
//! Slice order defines the `OpGetBuiltin` indices baked into compiled
//! bytecode; new builtins must be appended at the end.

use std::rc::Rc;

use lazy_static::lazy_static;

use crate::interpreter::value::{Builtin, Value};

lazy_static! {
    /// The canonical builtins, in index order.
    pub static ref BUILTINS: Vec<Builtin> = vec![
        Builtin { name: "len", func: builtin_len },
        Builtin { name: "print", func: builtin_print },
        Builtin { name: "first", func: builtin_first },
        Builtin { name: "last", func: builtin_last },
        Builtin { name: "rest", func: builtin_rest },
        Builtin { name: "push", func: builtin_push },
    ];
}

/// Find a builtin by name.
pub fn lookup(name: &str) -> Option<Builtin> {
    BUILTINS.iter().find(|b| b.name == name).copied()
}

fn wrong_arity(got: usize, want: usize) -> Value {
    Value::error(format!(
        "wrong number of arguments. got={}, want={}",
        got, want
    ))
}

fn builtin_len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arity(args.len(), 1);
    }
    match &args[0] {
        Value::String(s) => Value::Int(s.len() as i64),
        Value::Array(elements) => Value::Int(elements.len() as i64),
        other => Value::error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn builtin_print(args: &[Value]) -> Value {
    for arg in args {
        println!("{}", arg);
    }
    Value::Null
}

fn builtin_first(args: &[Value]) -> Value {
    match expect_array("first", args) {
        Ok(elements) => elements.first().cloned().unwrap_or(Value::Null),
        Err(err) => err,
    }
}

fn builtin_last(args: &[Value]) -> Value {
    match expect_array("last", args) {
        Ok(elements) => elements.last().cloned().unwrap_or(Value::Null),
        Err(err) => err,
    }
}

fn builtin_rest(args: &[Value]) -> Value {
    match expect_array("rest", args) {
        Ok(elements) => {
            if elements.is_empty() {
                Value::Null
            } else {
                Value::Array(Rc::new(elements[1..].to_vec()))
            }
        }
        Err(err) => err,
    }
}

fn builtin_push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_arity(args.len(), 2);
    }
    match &args[0] {
        Value::Array(elements) => {
            let mut new_elements = elements.as_ref().clone();
            new_elements.push(args[1].clone());
            Value::Array(Rc::new(new_elements))
        }
        other => Value::error(format!(
            "argument to `push` must be an Array, got {}",
            other.type_name()
        )),
    }
}

fn expect_array<'a>(name: &str, args: &'a [Value]) -> Result<&'a Vec<Value>, Value> {
    if args.len() != 1 {
        return Err(wrong_arity(args.len(), 1));
    }
    match &args[0] {
        Value::Array(elements) => Ok(elements),
        other => Err(Value::error(format!(
            "argument to `{}` must be an Array, got {}",
            name,
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(values: Vec<Value>) -> Value {
        Value::Array(Rc::new(values))
    }

    #[test]
    fn test_registry_order_is_stable() {
        let names: Vec<&str> = BUILTINS.iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["len", "print", "first", "last", "rest", "push"]);
    }

    #[test]
    fn test_len() {
        assert_eq!(builtin_len(&[Value::string("hello")]), Value::Int(5));
        assert_eq!(builtin_len(&[Value::string("")]), Value::Int(0));
        assert_eq!(
            builtin_len(&[array(vec![Value::Int(1), Value::Int(2)])]),
            Value::Int(2)
        );
        assert!(builtin_len(&[Value::Int(1)]).is_error());
        assert!(builtin_len(&[]).is_error());
    }

    #[test]
    fn test_first_last_rest() {
        let arr = array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(builtin_first(&[arr.clone()]), Value::Int(1));
        assert_eq!(builtin_last(&[arr.clone()]), Value::Int(3));
        assert_eq!(
            builtin_rest(&[arr]),
            array(vec![Value::Int(2), Value::Int(3)])
        );

        let empty = array(Vec::new());
        assert_eq!(builtin_first(&[empty.clone()]), Value::Null);
        assert_eq!(builtin_last(&[empty.clone()]), Value::Null);
        assert_eq!(builtin_rest(&[empty]), Value::Null);
    }

    #[test]
    fn test_push_does_not_mutate() {
        let original = array(vec![Value::Int(1)]);
        let pushed = builtin_push(&[original.clone(), Value::Int(2)]);
        assert_eq!(pushed, array(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(original, array(vec![Value::Int(1)]));
    }

    #[test]
    fn test_push_onto_empty() {
        let pushed = builtin_push(&[array(Vec::new()), Value::Int(1)]);
        assert_eq!(pushed, array(vec![Value::Int(1)]));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("len").map(|b| b.name), Some("len"));
        assert!(lookup("nope").is_none());
    }
}
