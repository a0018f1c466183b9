// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Handle scopes: stacked owners of contiguous handle-ID ranges. The scope
//! opened for a native callback also carries the invocation record; its ID
//! doubles as the `napi_callback_info` the callback receives.

use std::os::raw::c_void;

use crate::error::Error;
use crate::error::Result;
use crate::handle::consts;
use crate::handle::HandleStore;
use crate::value::Value;

/// What `napi_get_cb_info` reads back out of a callback invocation.
#[derive(Debug)]
pub struct CallbackInfo {
  pub this: Value,
  pub args: Vec<Value>,
  pub data: *mut c_void,
  pub new_target: Option<Value>,
}

#[derive(Debug)]
pub struct HandleScope {
  pub start: usize,
  pub end: usize,
  escape_called: bool,
  pub callback_info: Option<CallbackInfo>,
}

impl HandleScope {
  fn new(start: usize) -> HandleScope {
    HandleScope {
      start,
      end: start,
      escape_called: false,
      callback_info: None,
    }
  }

  fn owns(&self, id: usize) -> bool {
    id >= self.start && id < self.end
  }
}

/// The per-context scope stack. Index 0 is the root scope covering the
/// singleton range; it is never closed. `napi_handle_scope` values are
/// depths into this stack, so LIFO violations are cheap to detect.
pub struct ScopeStore {
  stack: Vec<HandleScope>,
}

impl ScopeStore {
  pub fn new() -> ScopeStore {
    let mut root = HandleScope::new(1);
    root.end = consts::MIN_ID;
    ScopeStore { stack: vec![root] }
  }

  pub fn depth(&self) -> usize {
    self.stack.len() - 1
  }

  pub fn open(&mut self, store: &HandleStore) -> usize {
    self.stack.push(HandleScope::new(store.next_id()));
    self.stack.len() - 1
  }

  /// Closes `scope_id`, which must be the innermost open scope.
  pub fn close(&mut self, store: &mut HandleStore, scope_id: usize) -> Result {
    if scope_id == 0 || scope_id != self.stack.len() - 1 {
      return Err(Error::HandleScopeMismatch);
    }
    let scope = self.stack.pop().unwrap();
    if scope.start != scope.end {
      store.erase(scope.start, scope.end);
    }
    Ok(())
  }

  pub fn current(&self) -> &HandleScope {
    self.stack.last().unwrap()
  }

  pub fn current_mut(&mut self) -> &mut HandleScope {
    self.stack.last_mut().unwrap()
  }

  pub fn get(&self, scope_id: usize) -> Option<&HandleScope> {
    self.stack.get(scope_id)
  }

  pub fn get_mut(&mut self, scope_id: usize) -> Option<&mut HandleScope> {
    self.stack.get_mut(scope_id)
  }

  /// Stores a value in the innermost scope and returns its handle ID.
  pub fn add(&mut self, store: &mut HandleStore, value: Value) -> usize {
    let id = store.push(value);
    let scope = self.current_mut();
    scope.end = id + 1;
    id
  }

  /// Promotes `handle` into the parent of `scope_id`: the escapee is
  /// swapped down to the scope's first slot and the boundary shifted so the
  /// slot now belongs to the parent.
  pub fn escape(
    &mut self,
    store: &mut HandleStore,
    scope_id: usize,
    handle: usize,
  ) -> Result<usize> {
    if scope_id == 0 || scope_id >= self.stack.len() {
      return Err(Error::HandleScopeMismatch);
    }
    if self.stack[scope_id].escape_called {
      return Err(Error::EscapeCalledTwice);
    }
    if !self.stack[scope_id].owns(handle) {
      return Err(Error::InvalidArg);
    }
    self.stack[scope_id].escape_called = true;

    let escaped = self.stack[scope_id].start;
    store.swap(handle, escaped);
    self.stack[scope_id].start += 1;
    self.stack[scope_id - 1].end += 1;
    Ok(escaped)
  }
}

impl Default for ScopeStore {
  fn default() -> ScopeStore {
    ScopeStore::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::Obj;

  fn setup() -> (ScopeStore, HandleStore) {
    (ScopeStore::new(), HandleStore::new(Obj::plain()))
  }

  #[test]
  fn close_is_lifo() {
    let (mut scopes, mut store) = setup();
    let outer = scopes.open(&store);
    let inner = scopes.open(&store);
    assert_eq!(
      scopes.close(&mut store, outer).unwrap_err(),
      Error::HandleScopeMismatch
    );
    scopes.close(&mut store, inner).unwrap();
    scopes.close(&mut store, outer).unwrap();
    assert_eq!(scopes.depth(), 0);
  }

  #[test]
  fn closing_drops_owned_handles() {
    let (mut scopes, mut store) = setup();
    let scope = scopes.open(&store);
    let id = scopes.add(&mut store, Value::Number(7.0));
    scopes.close(&mut store, scope).unwrap();
    assert!(store.get(id).is_none());
  }

  #[test]
  fn escape_promotes_exactly_once() {
    let (mut scopes, mut store) = setup();
    let outer = scopes.open(&store);
    let inner = scopes.open(&store);
    let id = scopes.add(&mut store, Value::Number(42.0));

    let escaped = scopes.escape(&mut store, inner, id).unwrap();
    assert_eq!(
      scopes.escape(&mut store, inner, id).unwrap_err(),
      Error::EscapeCalledTwice
    );

    scopes.close(&mut store, inner).unwrap();
    assert!(matches!(store.get(escaped), Some(Value::Number(n)) if n == 42.0));
    scopes.close(&mut store, outer).unwrap();
    assert!(store.get(escaped).is_none());
  }

  #[test]
  fn escaping_a_foreign_handle_fails() {
    let (mut scopes, mut store) = setup();
    let outer = scopes.open(&store);
    let id = scopes.add(&mut store, Value::Number(1.0));
    let inner = scopes.open(&store);
    assert_eq!(
      scopes.escape(&mut store, inner, id).unwrap_err(),
      Error::InvalidArg
    );
    scopes.close(&mut store, inner).unwrap();
    scopes.close(&mut store, outer).unwrap();
  }
}
