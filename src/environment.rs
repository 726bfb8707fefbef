use crate::error::RuntimeError;
use crate::interpreter::Type;
use crate::scanner::Token;
use crate::types::{create_shared, Shared};
use std::collections::HashMap;

/// One lexical scope. Closures keep their defining scope alive through the
/// shared `enclosing` link.
pub struct Environment {
    values: HashMap<String, Type>,
    enclosing: Option<Shared<Environment>>,
}

impl Environment {
    pub fn new(enclosing: Option<Shared<Environment>>) -> Shared<Environment> {
        create_shared(Environment {
            values: HashMap::default(),
            enclosing,
        })
    }

    pub fn define(&mut self, name: &str, val: Type) {
        self.values.insert(name.to_string(), val);
    }

    pub fn assign(&mut self, name: &Token, val: Type) -> Result<(), RuntimeError> {
        if let Some(value) = self.values.get_mut(name.lexeme.as_str()) {
            *value = val;
            Ok(())
        } else if let Some(enclosing) = self.enclosing.as_ref() {
            enclosing.borrow_mut().assign(name, val)
        } else {
            undefined(name)
        }
    }

    pub fn get(&self, name: &Token) -> Result<Type, RuntimeError> {
        if let Some(value) = self.values.get(name.lexeme.as_str()) {
            Ok(value.clone())
        } else if let Some(enclosing) = self.enclosing.as_ref() {
            enclosing.borrow().get(name)
        } else {
            undefined(name)
        }
    }

    /// Reads `name` exactly `distance` scopes out, without searching further.
    pub fn get_at(&self, distance: usize, name: &str) -> Option<Type> {
        if distance == 0 {
            return self.values.get(name).cloned();
        }
        let env = self.ancestor(distance)?;
        let value = env.borrow().values.get(name).cloned();
        value
    }

    pub fn assign_at(&mut self, distance: usize, name: &Token, val: Type) -> Result<(), RuntimeError> {
        let slot_exists = if distance == 0 {
            self.values.get_mut(name.lexeme.as_str()).map(|slot| *slot = val).is_some()
        } else if let Some(env) = self.ancestor(distance) {
            let mut env = env.borrow_mut();
            env.values.get_mut(name.lexeme.as_str()).map(|slot| *slot = val).is_some()
        } else {
            false
        };
        if slot_exists {
            Ok(())
        } else {
            undefined(name)
        }
    }

    fn ancestor(&self, distance: usize) -> Option<Shared<Environment>> {
        let mut env = self.enclosing.clone();
        for _ in 1..distance {
            env = env?.borrow().enclosing.clone();
        }
        env
    }
}

fn undefined<T>(name: &Token) -> Result<T, RuntimeError> {
    RuntimeError::new(
        name.clone(),
        &format!("Undefined variable '{}'.", name.lexeme),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{Literal, TokenType};

    fn name(lexeme: &str) -> Token {
        Token::synthetic(TokenType::IDENTIFIER, lexeme, 1)
    }

    fn number(n: f64) -> Type {
        Type::Primitive(Literal::Number(n))
    }

    #[test]
    fn lookups_walk_outward_and_shadow() {
        let global = Environment::new(None);
        global.borrow_mut().define("a", number(1.0));
        global.borrow_mut().define("b", number(2.0));
        let inner = Environment::new(Some(global.clone()));
        inner.borrow_mut().define("a", number(3.0));

        assert_eq!(inner.borrow().get(&name("a")).unwrap().to_string(), "3");
        assert_eq!(inner.borrow().get(&name("b")).unwrap().to_string(), "2");
        assert_eq!(inner.borrow().get_at(1, "a").unwrap().to_string(), "1");
        assert!(inner.borrow().get(&name("c")).is_err());
    }

    #[test]
    fn assignment_never_creates_a_binding() {
        let global = Environment::new(None);
        let inner = Environment::new(Some(global.clone()));
        let err = inner.borrow_mut().assign(&name("x"), number(1.0)).unwrap_err();
        assert_eq!(err.msg, "Undefined variable 'x'.");
        assert!(global.borrow().get_at(0, "x").is_none());
    }

    #[test]
    fn assign_at_targets_one_scope() {
        let global = Environment::new(None);
        global.borrow_mut().define("x", number(1.0));
        let middle = Environment::new(Some(global.clone()));
        middle.borrow_mut().define("x", number(2.0));
        let inner = Environment::new(Some(middle.clone()));

        inner.borrow_mut().assign_at(2, &name("x"), number(9.0)).unwrap();
        assert_eq!(global.borrow().get_at(0, "x").unwrap().to_string(), "9");
        assert_eq!(middle.borrow().get_at(0, "x").unwrap().to_string(), "2");
        assert!(inner.borrow_mut().assign_at(5, &name("x"), number(0.0)).is_err());
    }
}
