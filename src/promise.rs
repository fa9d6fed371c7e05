use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
  Pending,
  Resolved(Value),
  Rejected(String),
}

/// A value that arrives later, settled by whoever holds the matching
/// [`Resolver`]. Threads waiting on one sit in `PromiseWait` and are resumed
/// by the sequencer once it settles.
#[derive(Debug, Clone)]
pub struct Promise {
  state: Rc<RefCell<PromiseState>>,
}

#[derive(Debug, Clone)]
pub struct Resolver {
  state: Rc<RefCell<PromiseState>>,
}

impl Promise {
  pub fn pending() -> (Promise, Resolver) {
    let state = Rc::new(RefCell::new(PromiseState::Pending));
    (
      Promise {
        state: Rc::clone(&state),
      },
      Resolver { state },
    )
  }

  pub fn resolved(value: Value) -> Promise {
    Promise {
      state: Rc::new(RefCell::new(PromiseState::Resolved(value))),
    }
  }

  pub fn rejected(reason: impl Into<String>) -> Promise {
    Promise {
      state: Rc::new(RefCell::new(PromiseState::Rejected(reason.into()))),
    }
  }

  pub fn state(&self) -> PromiseState {
    self.state.borrow().clone()
  }

  pub fn is_settled(&self) -> bool {
    !matches!(*self.state.borrow(), PromiseState::Pending)
  }
}

impl Resolver {
  /// Settles the promise. Later calls are ignored.
  pub fn resolve(&self, value: Value) {
    let mut state = self.state.borrow_mut();
    if *state == PromiseState::Pending {
      *state = PromiseState::Resolved(value);
    }
  }

  pub fn reject(&self, reason: impl Into<String>) {
    let mut state = self.state.borrow_mut();
    if *state == PromiseState::Pending {
      *state = PromiseState::Rejected(reason.into());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn settles_once() {
    let (promise, resolver) = Promise::pending();
    assert!(!promise.is_settled());
    resolver.resolve(Value::from(1.));
    resolver.reject("late");
    assert_eq!(promise.state(), PromiseState::Resolved(Value::from(1.)));
  }
}
