use crate::error::RuntimeError;
use crate::function::{Callable, LoxFunction};
use crate::interpreter::{Interpreter, Type};
use crate::scanner::Token;
use crate::types::{create_shared, Shared};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub struct Class {
    name: String,
    methods: HashMap<String, Rc<LoxFunction>>,
    superclass: Option<Rc<Class>>,
}

impl Class {
    pub fn new(
        name: &str,
        methods: HashMap<String, Rc<LoxFunction>>,
        superclass: Option<Rc<Class>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            methods,
            superclass,
        })
    }

    /// Looks `name` up in this class, then each superclass in turn.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        let mut class = self;
        loop {
            if let Some(method) = class.methods.get(name) {
                return Some(method.clone());
            }
            class = class.superclass.as_deref()?;
        }
    }
}

impl Display for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Calling a class builds an instance and runs `init` on it when present.
impl Callable for Rc<Class> {
    fn arity(&self) -> usize {
        self.find_method("init").map(|init| init.arity()).unwrap_or(0)
    }

    fn call(&self, interpreter: &mut Interpreter, args: &[Type]) -> Result<Type, RuntimeError> {
        let instance = Instance::new(self.clone());
        if let Some(init) = self.find_method("init") {
            init.bind(instance.clone()).call(interpreter, args)?;
        }
        Ok(Type::Object(instance))
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

pub struct Instance {
    class: Rc<Class>,
    fields: HashMap<String, Type>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Shared<Self> {
        create_shared(Self {
            class,
            fields: HashMap::default(),
        })
    }

    /// Fields shadow methods; methods come back bound to `this_ref`.
    pub fn get(this_ref: &Shared<Self>, name: &Token) -> Result<Type, RuntimeError> {
        let instance = this_ref.borrow();
        if let Some(val) = instance.fields.get(name.lexeme.as_str()) {
            return Ok(val.clone());
        }
        match instance.class.find_method(&name.lexeme) {
            Some(method) => Ok(Type::Function(method.bind(this_ref.clone()))),
            None => RuntimeError::new(
                name.clone(),
                &format!("Undefined property '{}'.", name.lexeme),
            ),
        }
    }

    pub fn set(&mut self, name: &Token, val: Type) {
        self.fields.insert(name.lexeme.to_string(), val);
    }
}

impl Display for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} instance", self.class)
    }
}
