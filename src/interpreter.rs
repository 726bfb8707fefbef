use crate::class::{Class, Instance};
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::expr::{Expr, Stmt};
use crate::function::{Callable, Clock, LoxFunction};
use crate::scanner::{Literal, Token, TokenType};
use crate::types::{Locals, Shared};
use by_address::ByAddress;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};
use std::rc::Rc;
use std::sync::Arc;

const MAX_CALL_DEPTH: usize = 4096;
const RED_ZONE: usize = 256 * 1024;
const STACK_PER_GROWTH: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub enum Type {
    Primitive(Literal),
    Function(Rc<dyn Callable>),
    Class(Rc<Class>),
    Object(Shared<Instance>),
}

impl Type {
    fn nil() -> Self {
        Type::Primitive(Literal::NIL)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primitive(l) => write!(f, "{}", l),
            Self::Function(func) => write!(f, "{}", func),
            Self::Class(class) => write!(f, "{}", class),
            Self::Object(instance) => write!(f, "{}", instance.borrow()),
        }
    }
}

impl std::fmt::Debug for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Non-local exits travelling up the statement walk. `Break` is consumed by
/// the nearest loop, `Return` by the nearest function call.
#[derive(Debug)]
pub enum Jump {
    Break,
    Return(Type),
}

pub struct Interpreter {
    environment: Shared<Environment>,
    globals: Shared<Environment>,
    locals: Locals,
    out: Box<dyn Write>,
    call_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Sends `print` output to `out` instead of stdout.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        let env = Environment::new(None);
        let mut interpreter = Self {
            environment: env.clone(),
            globals: env,
            locals: HashMap::new(),
            out,
            call_depth: 0,
        };
        interpreter.define_native("clock", Rc::new(Clock::new()));
        interpreter
    }

    pub fn define_native(&mut self, name: &str, native: Rc<dyn Callable>) {
        self.globals
            .borrow_mut()
            .define(name, Type::Function(native));
    }

    /// Records the resolver's scope distances for a freshly parsed program.
    pub fn resolve(&mut self, locals: Locals) {
        self.locals.extend(locals);
    }

    pub fn interpret_program(&mut self, statements: &[Stmt]) -> Result<(), RuntimeError> {
        self.interpret_stmts(statements)?;
        Ok(())
    }

    pub fn visit(&mut self, expr: &Expr) -> Result<Type, RuntimeError> {
        let res = match expr {
            Expr::LiteralNode(literal) => Type::Primitive(literal.clone()),
            Expr::Grouping(expr) => self.visit(expr)?,
            Expr::Unary { operator, right } => {
                let right_val = self.visit(right)?;
                match (operator.token_type, right_val) {
                    (TokenType::MINUS, Type::Primitive(Literal::Number(num))) => {
                        Type::Primitive(Literal::Number(-num))
                    }
                    (TokenType::BANG, right_val) => {
                        Type::Primitive(Literal::Boolean(!is_truthy(&right_val)))
                    }
                    _ => RuntimeError::new(operator.clone(), "Operand must be a number.")?,
                }
            }
            Expr::Binary {
                left,
                right,
                operator,
            } => {
                let left = self.visit(left)?;
                let right = self.visit(right)?;
                binary(operator, left, right)?
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.visit(condition)?) {
                    self.visit(then_branch)?
                } else {
                    self.visit(else_branch)?
                }
            }
            Expr::Variable { name, id } => self.lookup_variable(name, *id)?,
            Expr::Assign { name, value, id } => {
                let val = self.visit(value)?;
                if let Some(&distance) = self.locals.get(id) {
                    self.environment
                        .borrow_mut()
                        .assign_at(distance, name, val.clone())?;
                } else {
                    self.globals.borrow_mut().assign(name, val.clone())?;
                }
                val
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let val = self.visit(left)?;
                match operator.token_type {
                    TokenType::OR if is_truthy(&val) => val,
                    TokenType::AND if !is_truthy(&val) => val,
                    _ => self.visit(right)?,
                }
            }
            Expr::Call {
                callee,
                args,
                paren,
            } => {
                let callee = self.visit(callee)?;
                let mut arguments = vec![];
                for arg in args {
                    arguments.push(self.visit(arg)?);
                }
                let func: &dyn Callable = match &callee {
                    Type::Function(func) => func.as_ref(),
                    Type::Class(class) => class,
                    _ => RuntimeError::new(paren.clone(), "Can only call functions and classes.")?,
                };
                if func.arity() != arguments.len() {
                    RuntimeError::new(
                        paren.clone(),
                        &format!(
                            "Expected {} arguments but got {}.",
                            func.arity(),
                            arguments.len()
                        ),
                    )?
                }
                self.call(func, &arguments, paren)?
            }
            Expr::Get { object, name } => match self.visit(object)? {
                Type::Object(instance) => Instance::get(&instance, name)?,
                _ => RuntimeError::new(name.clone(), "Only instances have properties.")?,
            },
            Expr::Set {
                object,
                name,
                value,
            } => {
                let instance = match self.visit(object)? {
                    Type::Object(instance) => instance,
                    _ => RuntimeError::new(name.clone(), "Only instances have fields.")?,
                };
                let val = self.visit(value)?;
                instance.borrow_mut().set(name, val.clone());
                val
            }
            Expr::This { keyword, id } => self.lookup_variable(keyword, *id)?,
            Expr::Super {
                keyword,
                method,
                id,
            } => self.super_method(keyword, method, *id)?,
        };
        Ok(res)
    }

    /// `super` sits one scope outside the scope binding `this`.
    fn super_method(&self, keyword: &Token, method: &Token, id: usize) -> Result<Type, RuntimeError> {
        let distance = match self.locals.get(&id) {
            Some(&distance) => distance,
            None => RuntimeError::new(keyword.clone(), "Can't use 'super' outside of a class.")?,
        };
        let env = self.environment.borrow();
        let superclass = env.get_at(distance, "super");
        let object = env.get_at(distance.saturating_sub(1), "this");
        match (superclass, object) {
            (Some(Type::Class(superclass)), Some(Type::Object(instance))) => {
                match superclass.find_method(&method.lexeme) {
                    Some(found) => Ok(Type::Function(found.bind(instance))),
                    None => RuntimeError::new(
                        method.clone(),
                        &format!("Undefined property '{}'.", method.lexeme),
                    ),
                }
            }
            _ => RuntimeError::new(keyword.clone(), "Superclass is not bound."),
        }
    }

    fn lookup_variable(&self, name: &Token, id: usize) -> Result<Type, RuntimeError> {
        if let Some(&distance) = self.locals.get(&id) {
            match self.environment.borrow().get_at(distance, &name.lexeme) {
                Some(val) => Ok(val),
                None => RuntimeError::new(
                    name.clone(),
                    &format!("Undefined variable '{}'.", name.lexeme),
                ),
            }
        } else {
            self.globals.borrow().get(name)
        }
    }

    pub fn interpret_stmts(&mut self, statements: &[Stmt]) -> Result<Option<Jump>, RuntimeError> {
        for statement in statements {
            let res = self.interpret_stmt(statement)?;
            if res.is_some() {
                return Ok(res);
            }
        }
        Ok(None)
    }

    pub fn interpret_stmt(&mut self, statement: &Stmt) -> Result<Option<Jump>, RuntimeError> {
        match statement {
            Stmt::Expression(expr) => {
                self.visit(expr)?;
            }
            Stmt::Print { keyword, value } => {
                let val = self.visit(value)?;
                if let Err(e) = writeln!(self.out, "{}", val) {
                    RuntimeError::new(keyword.clone(), &format!("Could not write output: {}", e))?
                }
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(init) => self.visit(init)?,
                    None => Type::nil(),
                };
                self.environment.borrow_mut().define(&name.lexeme, value);
            }
            Stmt::Block { statements } => {
                let env = Environment::new(Some(self.environment.clone()));
                return self.execute_block(statements, env);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.visit(condition)?) {
                    return self.interpret_stmt(then_branch);
                } else if let Some(else_statement) = else_branch {
                    return self.interpret_stmt(else_statement);
                }
            }
            Stmt::While { condition, body } => {
                while is_truthy(&self.visit(condition)?) {
                    match self.interpret_stmt(body)? {
                        Some(Jump::Break) => break,
                        Some(ret @ Jump::Return(_)) => return Ok(Some(ret)),
                        None => {}
                    }
                }
            }
            Stmt::Break { .. } => return Ok(Some(Jump::Break)),
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.visit(expr)?,
                    None => Type::nil(),
                };
                return Ok(Some(Jump::Return(value)));
            }
            Stmt::Function { name, params, body } => {
                let func = LoxFunction::new(name, params, body, self.environment.clone(), false);
                self.environment
                    .borrow_mut()
                    .define(&name.lexeme, Type::Function(func));
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.declare_class(name, superclass.as_ref(), methods)?,
        }
        Ok(None)
    }

    fn declare_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Stmt],
    ) -> Result<(), RuntimeError> {
        let enclosing = self.environment.clone();
        enclosing.borrow_mut().define(&name.lexeme, Type::nil());

        let superclass = match superclass {
            Some(expr) => match self.visit(expr)? {
                Type::Class(class) => Some(class),
                _ => {
                    let token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => name,
                    };
                    RuntimeError::new(token.clone(), "Superclass must be a class.")?
                }
            },
            None => None,
        };

        let closure = match &superclass {
            Some(superclass) => {
                let env = Environment::new(Some(enclosing.clone()));
                env.borrow_mut().define("super", Type::Class(superclass.clone()));
                env
            }
            None => enclosing.clone(),
        };

        let mut table = HashMap::new();
        for method in methods {
            if let Stmt::Function {
                name: method_name,
                params,
                body,
            } = method
            {
                let is_initializer = method_name.lexeme.as_str() == "init";
                let func = LoxFunction::new(method_name, params, body, closure.clone(), is_initializer);
                table.insert(method_name.lexeme.to_string(), func);
            }
        }

        let class = Class::new(&name.lexeme, table, superclass);
        let res = enclosing.borrow_mut().assign(name, Type::Class(class));
        res
    }

    /// Runs a call on a stack that grows on demand. Runaway recursion ends in
    /// a runtime error instead of exhausting memory.
    fn call(
        &mut self,
        func: &dyn Callable,
        args: &[Type],
        paren: &Token,
    ) -> Result<Type, RuntimeError> {
        if self.call_depth >= MAX_CALL_DEPTH {
            return RuntimeError::new(paren.clone(), "Stack overflow.");
        }
        self.call_depth += 1;
        let res = stacker::maybe_grow(RED_ZONE, STACK_PER_GROWTH, || func.call(self, args));
        self.call_depth -= 1;
        res
    }

    /// Runs `statements` inside `environment`, restoring the caller's scope on
    /// every exit path.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Shared<Environment>,
    ) -> Result<Option<Jump>, RuntimeError> {
        let previous = std::mem::replace(&mut self.environment, environment);
        let res = self.interpret_stmts(statements);
        self.environment = previous;
        res
    }
}

fn binary(operator: &Token, left: Type, right: Type) -> Result<Type, RuntimeError> {
    use Literal::{Boolean, Number};
    let res = match (operator.token_type, left, right) {
        (TokenType::COMMA, _, right) => return Ok(right),
        (TokenType::EqualEqual, left, right) => Boolean(is_equal(&left, &right)),
        (TokenType::PLUS, Type::Primitive(Number(l)), Type::Primitive(Number(r))) => Number(l + r),
        (TokenType::PLUS, left, right)
            if matches!(left, Type::Primitive(Literal::String(_)))
                || matches!(right, Type::Primitive(Literal::String(_))) =>
        {
            Literal::String(Arc::new(format!("{}{}", left, right)))
        }
        (TokenType::PLUS, _, _) => RuntimeError::new(
            operator.clone(),
            "Operands must be two numbers or at least one string.",
        )?,
        (token_type, Type::Primitive(Number(l)), Type::Primitive(Number(r))) => match token_type {
            TokenType::MINUS => Number(l - r),
            TokenType::STAR => Number(l * r),
            TokenType::SLASH if r == 0.0 => RuntimeError::new(operator.clone(), "Division by zero.")?,
            TokenType::SLASH => Number(l / r),
            TokenType::GREATER => Boolean(l > r),
            TokenType::GreaterEqual => Boolean(l >= r),
            TokenType::LESS => Boolean(l < r),
            TokenType::LessEqual => Boolean(l <= r),
            _ => RuntimeError::new(operator.clone(), "Unsupported binary operator.")?,
        },
        _ => RuntimeError::new(operator.clone(), "Operands must be numbers.")?,
    };
    Ok(Type::Primitive(res))
}

fn is_truthy(val: &Type) -> bool {
    !matches!(
        val,
        Type::Primitive(Literal::NIL) | Type::Primitive(Literal::Boolean(false))
    )
}

fn is_equal(left: &Type, right: &Type) -> bool {
    match (left, right) {
        (Type::Primitive(l), Type::Primitive(r)) => l == r,
        (Type::Function(l), Type::Function(r)) => ByAddress(&**l) == ByAddress(&**r),
        (Type::Class(l), Type::Class(r)) => ByAddress(&**l) == ByAddress(&**r),
        (Type::Object(l), Type::Object(r)) => ByAddress(&**l) == ByAddress(&**r),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::resolver::Resolver;
    use crate::scanner::Scanner;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    #[derive(Clone, Default)]
    struct Captured(Rc<RefCell<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run(source: &str) -> (String, Result<(), RuntimeError>) {
        let (tokens, errors) = Scanner::new(source).scan_tokens();
        assert!(errors.is_empty());
        let mut id = 0;
        let (stmts, errors) = Parser::new(tokens, &mut id).parse();
        assert!(errors.is_empty(), "{:?}", errors);
        let locals = Resolver::new().resolve(&stmts).expect("resolves");
        let captured = Captured::default();
        let mut interpreter = Interpreter::with_output(Box::new(captured.clone()));
        interpreter.resolve(locals);
        let res = interpreter.interpret_program(&stmts);
        let out = String::from_utf8(captured.0.borrow().clone()).unwrap();
        (out, res)
    }

    #[test]
    fn renders_values() {
        let (out, res) = run(
            "print 3; print 2.5; print nil; print true; print \"s\"; \
             fun f() {} print f; print clock; class C {} print C; print C();",
        );
        assert!(res.is_ok());
        assert_eq!(
            out,
            "3\n2.5\nnil\ntrue\ns\n<fn f>\n<native fn>\nC\nC instance\n"
        );
    }

    #[test]
    fn equality_never_coerces() {
        let (out, _) = run(
            "print 1 == 1; print \"1\" == 1; print nil == false; print \"a\" == \"a\"; \
             class C {} var c = C(); print c == c; print c == C(); print clock == clock;",
        );
        assert_eq!(out, "true\nfalse\nfalse\ntrue\ntrue\nfalse\ntrue\n");
    }

    #[test]
    fn truthiness_and_short_circuit() {
        let (out, _) = run(
            "print 0 ? \"t\" : \"f\"; print \"\" and 1; print nil or \"x\"; \
             print false and undefined; print !nil;",
        );
        assert_eq!(out, "t\n1\nx\nfalse\ntrue\n");
    }

    #[test]
    fn deep_recursion_runs_and_runaway_recursion_is_reported() {
        let (out, res) = run(
            "fun depth(n) { if (n == 0) return 0; return depth(n - 1) + 1; } print depth(3000);",
        );
        assert!(res.is_ok());
        assert_eq!(out, "3000\n");

        let (out, res) = run("fun forever(n) { return forever(n + 1); }\nforever(0);");
        assert_eq!(out, "");
        let err = res.expect_err("recursion is capped");
        assert_eq!(err.msg, "Stack overflow.");
        assert_eq!(err.token.line, 1);
    }

    #[test]
    fn subclass_declaration_binds_the_class() {
        let (out, res) = run("class A {} { class B < A {} print B; print B(); }");
        assert!(res.is_ok());
        assert_eq!(out, "B\nB instance\n");
    }

    #[test]
    fn environment_is_restored_after_errors() {
        let (tokens, _) = Scanner::new("{ var a = 1; a = a + nil; }").scan_tokens();
        let mut id = 0;
        let (stmts, _) = Parser::new(tokens, &mut id).parse();
        let locals = Resolver::new().resolve(&stmts).unwrap();
        let mut interpreter = Interpreter::with_output(Box::new(Captured::default()));
        interpreter.resolve(locals);
        assert!(interpreter.interpret_program(&stmts).is_err());
        assert!(Rc::ptr_eq(&interpreter.environment, &interpreter.globals));
    }

    #[test]
    fn comma_yields_the_right_operand() {
        let (out, _) = run("var a = 0; print (a = 1, a + 1);");
        assert_eq!(out, "2\n");
    }
}
