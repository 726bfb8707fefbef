use crate::class::Instance;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::expr::Stmt;
use crate::interpreter::{Interpreter, Jump, Type};
use crate::scanner::{Literal, Token};
use crate::types::Shared;
use std::fmt::{Display, Formatter};
use std::rc::Rc;
use std::time::Instant;

pub trait Callable {
    fn arity(&self) -> usize;
    fn call(&self, interpreter: &mut Interpreter, args: &[Type]) -> Result<Type, RuntimeError>;
    fn name(&self) -> String;
}

impl Display for dyn Callable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Seconds elapsed since the interpreter was created.
pub struct Clock {
    start: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Callable for Clock {
    fn arity(&self) -> usize {
        0
    }

    fn call(&self, _: &mut Interpreter, _: &[Type]) -> Result<Type, RuntimeError> {
        Ok(Type::Primitive(Literal::Number(
            self.start.elapsed().as_secs_f64(),
        )))
    }

    fn name(&self) -> String {
        "<native fn>".to_string()
    }
}

pub struct LoxFunction {
    name: Token,
    params: Vec<Token>,
    body: Rc<Vec<Stmt>>,
    closure: Shared<Environment>,
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        name: &Token,
        params: &[Token],
        body: &Rc<Vec<Stmt>>,
        closure: Shared<Environment>,
        is_initializer: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.clone(),
            params: params.to_vec(),
            body: body.clone(),
            closure,
            is_initializer,
        })
    }

    /// A copy of this method whose closure binds `this` to `instance`.
    pub fn bind(&self, instance: Shared<Instance>) -> Rc<LoxFunction> {
        let env = Environment::new(Some(self.closure.clone()));
        env.borrow_mut().define("this", Type::Object(instance));
        Self::new(&self.name, &self.params, &self.body, env, self.is_initializer)
    }

    fn this(&self) -> Type {
        self.closure
            .borrow()
            .get_at(0, "this")
            .unwrap_or(Type::Primitive(Literal::NIL))
    }
}

impl Display for LoxFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "<fn {}>", self.name)
    }
}

impl Callable for LoxFunction {
    fn arity(&self) -> usize {
        self.params.len()
    }

    #[tracing::instrument(level = "trace", skip_all, fields(name = %self.name))]
    fn call(&self, interpreter: &mut Interpreter, args: &[Type]) -> Result<Type, RuntimeError> {
        let environment = Environment::new(Some(self.closure.clone()));
        {
            let mut env = environment.borrow_mut();
            for (param, arg) in self.params.iter().zip(args) {
                env.define(&param.lexeme, arg.clone());
            }
        }
        let jump = interpreter.execute_block(&self.body, environment)?;
        if self.is_initializer {
            return Ok(self.this());
        }
        match jump {
            Some(Jump::Return(value)) => Ok(value),
            _ => Ok(Type::Primitive(Literal::NIL)),
        }
    }

    fn name(&self) -> String {
        self.to_string()
    }
}
