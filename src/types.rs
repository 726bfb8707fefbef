use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

pub type Shared<T> = Rc<RefCell<T>>;

/// Expression id -> number of scopes between the reference and its binding.
pub type Locals = HashMap<usize, usize>;

pub fn create_shared<T>(val: T) -> Shared<T> {
    Rc::new(RefCell::new(val))
}
