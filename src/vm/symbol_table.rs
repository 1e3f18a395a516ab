//! Lexical symbol resolution for the compiler.
//!
//! Tables form a parent chain, one per compilation scope. Resolving a
//! name that lives in an enclosing function promotes it to a free
//! variable of the current scope; the order of first capture fixes the
//! free indices the compiler emits loads for.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Where a symbol lives, which decides the load instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    /// The currently-compiling function's own name.
    Function,
}

/// A resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// One scope's name bindings, linked to its enclosing scope.
#[derive(Debug, Default)]
pub struct SymbolTable {
    pub outer: Option<Rc<RefCell<SymbolTable>>>,
    /// Original (outer) symbols captured by this scope, in capture order.
    pub free_symbols: Vec<Symbol>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_enclosed(outer: Rc<RefCell<SymbolTable>>) -> Self {
        Self {
            outer: Some(outer),
            ..Self::default()
        }
    }

    /// Number of names defined directly in this table (locals or globals).
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// Define a name in this scope. Global if the table has no parent,
    /// local otherwise. Redefinition in the same table overwrites.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_some() {
            SymbolScope::Local
        } else {
            SymbolScope::Global
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Register a builtin at a fixed registry index. Not counted in the
    /// definition counter.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Bind the currently-compiling function's own name, so it can refer
    /// to itself without capturing itself as a free variable.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let name = original.name.clone();
        self.free_symbols.push(original);
        let symbol = Symbol {
            name: name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(name, symbol.clone());
        symbol
    }

    /// Look up a name here or in the enclosing chain. Globals, builtins
    /// and function names pass through unchanged; enclosing locals and
    /// frees are promoted to free variables of this scope.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.clone()?;
        let symbol = outer.borrow_mut().resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin | SymbolScope::Function => Some(symbol),
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(symbol)),
        }
    }
}
