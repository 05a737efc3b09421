//! The scoped symbol table: a stack of scopes, each an ordered list of
//! named declarations.
//!
//! Lookup is linear within each scope. Declaration counts in Oberon-0
//! programs are small, so an association list is simpler and fast enough;
//! this is an intentional simplicity choice, not a gap.

use std::rc::Rc;

use crate::core::SourceSpan;
use crate::diagnostic::{Diagnostic, Label};
use crate::problems::Problem;
use crate::types::Type;

/// How a formal parameter is passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    Value,
    Reference,
}

/// A formal parameter of a procedure, in declaration order.
#[derive(Debug, Clone)]
pub struct Param {
    pub mode: ParamMode,
    pub ty: Rc<Type>,
}

/// The kind-specific payload of a declaration.
#[derive(Debug, Clone)]
pub enum DeclKind {
    /// A compile-time constant with its value.
    Const { value: i32 },
    /// A variable with its byte offset from its frame base.
    Var { offset: i32 },
    /// A reference parameter; the frame slot holds the address of the
    /// actual value.
    RefParam { offset: i32 },
    /// A procedure. The entry position is `None` until the body has been
    /// generated, which is how forward references are detected.
    Procedure {
        entry: Option<usize>,
        params: Vec<Param>,
    },
    /// A named type.
    TypeName,
    /// A builtin procedure, identified by a function number.
    Builtin { function: u16 },
}

/// A named declaration in some scope.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclKind,
    pub ty: Rc<Type>,
    /// Lexical level: 0 for module scope, N for the nesting depth of the
    /// enclosing procedure.
    pub level: i32,
    /// True for declarations introduced by a formal parameter list.
    pub is_param: bool,
}

/// A stable handle to a declaration, valid while the scope that contains
/// it is still open. Used to fill in a procedure's entry position and
/// parameter list after the declaration was inserted.
#[derive(Debug, Clone, Copy)]
pub struct DeclHandle {
    scope: usize,
    index: usize,
}

/// The symbol table: a stack of open scopes, innermost last.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Vec<Declaration>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new innermost scope.
    pub fn open_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Closes the innermost scope, discarding its declarations.
    pub fn close_scope(&mut self) {
        self.scopes.pop();
    }

    /// Adds a declaration to the innermost scope. Reports a diagnostic
    /// when the name is already declared in that scope.
    pub fn declare(
        &mut self,
        decl: Declaration,
        span: &SourceSpan,
    ) -> Result<DeclHandle, Diagnostic> {
        let scope_index = self.scopes.len() - 1;
        let scope = &mut self.scopes[scope_index];
        if scope.iter().any(|d| d.name == decl.name) {
            return Err(Diagnostic::problem(
                Problem::MultipleDefinition,
                Label::span(span.clone(), format!("multiple definitions '{}'", decl.name)),
            ));
        }
        scope.push(decl);
        Ok(DeclHandle {
            scope: scope_index,
            index: scope.len() - 1,
        })
    }

    /// Finds a declaration by name, searching from the innermost scope
    /// outwards.
    pub fn lookup(&self, name: &str) -> Option<&Declaration> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().find(|d| d.name == name))
    }

    /// Mutable access through a handle returned by `declare`.
    pub fn decl_mut(&mut self, handle: DeclHandle) -> &mut Declaration {
        &mut self.scopes[handle.scope][handle.index]
    }

    /// Read access through a handle returned by `declare`.
    pub fn decl(&self, handle: DeclHandle) -> &Declaration {
        &self.scopes[handle.scope][handle.index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, level: i32) -> Declaration {
        Declaration {
            name: name.to_owned(),
            kind: DeclKind::Var { offset: 0 },
            ty: Rc::new(Type::Int),
            level,
            is_param: false,
        }
    }

    #[test]
    fn symbol_table_when_duplicate_in_scope_then_err() {
        let mut table = SymbolTable::new();
        table.open_scope();
        table.declare(var("x", 0), &SourceSpan::default()).unwrap();
        let result = table.declare(var("x", 0), &SourceSpan::default());
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().problem, Problem::MultipleDefinition);
    }

    #[test]
    fn symbol_table_when_shadowed_then_finds_innermost() {
        let mut table = SymbolTable::new();
        table.open_scope();
        table.declare(var("x", 0), &SourceSpan::default()).unwrap();
        table.open_scope();
        table.declare(var("x", 1), &SourceSpan::default()).unwrap();
        assert_eq!(table.lookup("x").unwrap().level, 1);
        table.close_scope();
        assert_eq!(table.lookup("x").unwrap().level, 0);
    }

    #[test]
    fn symbol_table_when_scope_closed_then_outer_still_visible() {
        let mut table = SymbolTable::new();
        table.open_scope();
        table.declare(var("global", 0), &SourceSpan::default()).unwrap();
        table.open_scope();
        table.declare(var("local", 1), &SourceSpan::default()).unwrap();
        table.close_scope();
        assert!(table.lookup("global").is_some());
        assert!(table.lookup("local").is_none());
    }

    #[test]
    fn symbol_table_when_handle_then_mutation_visible_via_lookup() {
        let mut table = SymbolTable::new();
        table.open_scope();
        let handle = table
            .declare(
                Declaration {
                    name: "p".to_owned(),
                    kind: DeclKind::Procedure {
                        entry: None,
                        params: vec![],
                    },
                    ty: Rc::new(Type::Int),
                    level: 0,
                    is_param: false,
                },
                &SourceSpan::default(),
            )
            .unwrap();

        // The inner scope may be open while the procedure is updated.
        table.open_scope();
        if let DeclKind::Procedure { entry, .. } = &mut table.decl_mut(handle).kind {
            *entry = Some(17);
        }
        table.close_scope();

        match &table.lookup("p").unwrap().kind {
            DeclKind::Procedure { entry, .. } => assert_eq!(*entry, Some(17)),
            _ => panic!("expected procedure"),
        }
    }
}
