use crate::error::StaticError;
use crate::expr::{Expr, Stmt};
use crate::scanner::Token;
use crate::types::Locals;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq)]
enum FunctionType {
    None,
    Function,
    Initializer,
    Method,
}

#[derive(Clone, Copy, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Computes how many scopes out each local variable reference binds, and
/// reports scoping mistakes. Every error is collected; nothing stops the walk.
pub struct Resolver<'b> {
    scopes: Vec<HashMap<&'b str, bool>>,
    locals: Locals,
    errors: Vec<StaticError>,
    current_function: FunctionType,
    current_class: ClassType,
    loop_depth: usize,
}

impl<'b> Default for Resolver<'b> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'b> Resolver<'b> {
    pub fn new() -> Self {
        Self {
            scopes: vec![],
            locals: Locals::new(),
            errors: vec![],
            current_function: FunctionType::None,
            current_class: ClassType::None,
            loop_depth: 0,
        }
    }

    pub fn resolve(mut self, statements: &'b [Stmt]) -> Result<Locals, Vec<StaticError>> {
        self.resolve_statements(statements);
        tracing::debug!(locals = self.locals.len(), errors = self.errors.len(), "resolved");
        if self.errors.is_empty() {
            Ok(self.locals)
        } else {
            Err(self.errors)
        }
    }

    fn resolve_statements(&mut self, statements: &'b [Stmt]) {
        for statement in statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_statement(&mut self, statement: &'b Stmt) {
        match statement {
            Stmt::Block { statements } => {
                self.begin_scope();
                self.resolve_statements(statements);
                self.end_scope();
            }
            Stmt::Var { name, initializer } => {
                self.declare(name);
                if let Some(init) = initializer {
                    self.resolve_expr(init);
                }
                self.define(name);
            }
            Stmt::Function { name, params, body } => {
                self.declare(name);
                self.define(name);
                self.resolve_function(params, body, FunctionType::Function);
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
            Stmt::Expression(expr) | Stmt::Print { value: expr, .. } => {
                self.resolve_expr(expr);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_statement(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(expr);
                }
            }
            Stmt::Break { keyword } => {
                if self.loop_depth == 0 {
                    self.error(keyword, "Can't break outside of a loop.");
                }
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.loop_depth += 1;
                self.resolve_statement(body);
                self.loop_depth -= 1;
            }
        }
    }

    fn resolve_class(&mut self, name: &'b Token, superclass: Option<&'b Expr>, methods: &'b [Stmt]) {
        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;
        self.declare(name);
        self.define(name);

        if let Some(superclass) = superclass {
            if let Expr::Variable { name: super_name, .. } = superclass {
                if super_name.lexeme == name.lexeme {
                    self.error(super_name, "A class can't inherit from itself.");
                }
            }
            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass);
            self.begin_scope();
            self.scope_insert("super");
        }

        self.begin_scope();
        self.scope_insert("this");
        for method in methods {
            if let Stmt::Function { name, params, body } = method {
                let kind = if name.lexeme.as_str() == "init" {
                    FunctionType::Initializer
                } else {
                    FunctionType::Method
                };
                self.resolve_function(params, body, kind);
            }
        }
        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }
        self.current_class = enclosing_class;
    }

    fn declare(&mut self, name: &'b Token) {
        let duplicate = match self.scopes.last_mut() {
            Some(scope) => scope.insert(&name.lexeme, false).is_some(),
            None => false,
        };
        if duplicate {
            self.error(name, "Already a variable with this name in this scope.");
        }
    }

    fn define(&mut self, name: &'b Token) {
        self.scope_insert(&name.lexeme);
    }

    fn scope_insert(&mut self, name: &'b str) {
        if let Some(last) = self.scopes.last_mut() {
            last.insert(name, true);
        }
    }

    fn resolve_expr(&mut self, expr: &'b Expr) {
        match expr {
            Expr::Variable { name, id } => {
                if self
                    .scopes
                    .last()
                    .and_then(|x| x.get(name.lexeme.as_str()))
                    == Some(&false)
                {
                    self.error(name, "Can't read local variable in its own initializer.");
                }
                self.resolve_local(*id, &name.lexeme);
            }
            Expr::Assign { name, value, id } => {
                self.resolve_expr(value);
                self.resolve_local(*id, &name.lexeme);
            }
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }
            Expr::Call { callee, args, .. } => {
                self.resolve_expr(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::Grouping(expr) | Expr::Unary { right: expr, .. } => self.resolve_expr(expr),
            Expr::LiteralNode(_) => {}
            Expr::This { keyword, id } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                } else {
                    self.resolve_local(*id, "this");
                }
            }
            Expr::Super { keyword, id, .. } => {
                match self.current_class {
                    ClassType::None => self.error(keyword, "Can't use 'super' outside of a class."),
                    ClassType::Class => {
                        self.error(keyword, "Can't use 'super' in a class with no superclass.")
                    }
                    ClassType::Subclass => {}
                }
                self.resolve_local(*id, "super");
            }
        }
    }

    fn resolve_function(&mut self, params: &'b [Token], body: &'b [Stmt], function_type: FunctionType) {
        let enclosing = std::mem::replace(&mut self.current_function, function_type);
        // a loop around the declaration does not make `break` legal in the body
        let enclosing_loops = std::mem::take(&mut self.loop_depth);
        self.begin_scope();
        for param in params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_statements(body);
        self.end_scope();
        self.loop_depth = enclosing_loops;
        self.current_function = enclosing;
    }

    fn resolve_local(&mut self, id: usize, name: &str) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(name) {
                self.locals.insert(id, depth);
                return;
            }
        }
    }

    fn error(&mut self, token: &Token, msg: &str) {
        self.errors.push(StaticError::at(token, msg));
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new())
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scanner::Scanner;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Vec<Stmt> {
        let (tokens, _) = Scanner::new(source).scan_tokens();
        let mut id = 0;
        let (stmts, errors) = Parser::new(tokens, &mut id).parse();
        assert!(errors.is_empty(), "{:?}", errors);
        stmts
    }

    fn errors(source: &str) -> Vec<String> {
        let stmts = parse(source);
        match Resolver::new().resolve(&stmts) {
            Ok(_) => vec![],
            Err(errors) => errors.into_iter().map(|e| e.msg).collect(),
        }
    }

    /// Distances of every resolved `Variable` named `name`, in source order.
    fn distances(source: &str, name: &str) -> Vec<Option<usize>> {
        fn collect(stmt: &Stmt, name: &str, ids: &mut Vec<usize>) {
            match stmt {
                Stmt::Block { statements } => statements.iter().for_each(|s| collect(s, name, ids)),
                Stmt::Function { body, .. } => body.iter().for_each(|s| collect(s, name, ids)),
                Stmt::Print {
                    value: Expr::Variable { name: n, id },
                    ..
                } if n.lexeme.as_str() == name => ids.push(*id),
                _ => {}
            }
        }
        let stmts = parse(source);
        let mut ids = vec![];
        stmts.iter().for_each(|s| collect(s, name, &mut ids));
        let locals = Resolver::new().resolve(&stmts).expect("no errors");
        ids.iter().map(|id| locals.get(id).copied()).collect()
    }

    #[test]
    fn distances_count_scope_boundaries() {
        let source = "var a = 1; { var a = 2; print a; { print a; fun f() { print a; } } } print a;";
        assert_eq!(distances(source, "a"), vec![Some(0), Some(1), Some(2), None]);
    }

    #[test]
    fn structural_rules_are_all_reported() {
        assert_eq!(
            errors(
                "return 1; \
                 { var a = 1; var a = 2; } \
                 { var b = b; } \
                 print this; \
                 print super.x; \
                 class A { m() { print super.m; } } \
                 class B < B {} \
                 break;"
            ),
            vec![
                "Can't return from top-level code.",
                "Already a variable with this name in this scope.",
                "Can't read local variable in its own initializer.",
                "Can't use 'this' outside of a class.",
                "Can't use 'super' outside of a class.",
                "Can't use 'super' in a class with no superclass.",
                "A class can't inherit from itself.",
                "Can't break outside of a loop.",
            ]
        );
    }

    #[test]
    fn globals_may_be_redeclared() {
        assert!(errors("var a = 1; var a = 2; var b = b;").is_empty());
    }

    #[test]
    fn initializer_may_only_return_nothing() {
        assert!(errors("class A { init() { return; } }").is_empty());
        assert_eq!(
            errors("class A { init() { return 1; } }"),
            vec!["Can't return a value from an initializer."]
        );
        assert!(errors("class A { m() { return 1; } }").is_empty());
    }

    #[test]
    fn break_does_not_cross_function_boundaries() {
        assert!(errors("while (true) { if (true) break; }").is_empty());
        assert_eq!(
            errors("while (true) { fun f() { break; } }"),
            vec!["Can't break outside of a loop."]
        );
    }
}
