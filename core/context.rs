// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! The process-wide registry tying stores, scopes and environments
//! together. All of it is host-thread-only; the context is reached through
//! a thread local, so foreign threads simply never find an environment.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::Error;
use crate::error::Result;
use crate::handle::consts;
use crate::handle::HandleStore;
use crate::reference::FinalizerGuard;
use crate::reference::FinalizerRecord;
use crate::reference::Ownership;
use crate::reference::Reference;
use crate::reference::RefStore;
use crate::scope::ScopeStore;
use crate::task_queue::TaskQueue;
use crate::types::*;
use crate::value::Obj;
use crate::value::ObjKind;
use crate::value::PromiseState;
use crate::value::Value;

use crate::env::Env;

thread_local! {
  static CONTEXT: RefCell<Option<Rc<Context>>> = const { RefCell::new(None) };
}

#[derive(Default)]
struct EnvStore {
  envs: Vec<Option<Rc<Env>>>,
  free: Vec<usize>,
}

#[derive(Default)]
struct DeferredStore {
  deferreds: Vec<Option<Rc<Obj>>>,
  free: Vec<usize>,
}

pub struct Context {
  pub(crate) handle_store: RefCell<HandleStore>,
  pub scopes: RefCell<ScopeStore>,
  envs: RefCell<EnvStore>,
  pub(crate) refs: RefCell<RefStore>,
  deferreds: RefCell<DeferredStore>,
  /// Cross-thread wake-ups from TSFNs and async work land here.
  pub tasks: Arc<TaskQueue>,
  global: Rc<Obj>,
}

impl Context {
  fn new() -> Rc<Context> {
    let global = Obj::plain();
    Rc::new(Context {
      handle_store: RefCell::new(HandleStore::new(global.clone())),
      scopes: RefCell::new(ScopeStore::new()),
      envs: RefCell::new(EnvStore::default()),
      refs: RefCell::new(RefStore::default()),
      deferreds: RefCell::new(DeferredStore::default()),
      tasks: TaskQueue::new(),
      global,
    })
  }

  /// The host thread's context, created on first use.
  pub fn current() -> Rc<Context> {
    CONTEXT.with(|cell| {
      cell
        .borrow_mut()
        .get_or_insert_with(Context::new)
        .clone()
    })
  }

  /// Tears down the host thread's context: every environment is destroyed
  /// with hooks and finalizers run.
  pub fn destroy() {
    let Some(ctx) = CONTEXT.with(|cell| cell.borrow_mut().take()) else {
      return;
    };
    let envs: Vec<Rc<Env>> = {
      let store = ctx.envs.borrow();
      store.envs.iter().flatten().cloned().collect()
    };
    for env in envs {
      ctx.destroy_env(&env);
    }
  }

  pub fn global(&self) -> Rc<Obj> {
    self.global.clone()
  }

  // Environments

  pub fn create_env(&self) -> Rc<Env> {
    let mut store = self.envs.borrow_mut();
    let id = match store.free.pop() {
      Some(id) => id,
      None => {
        store.envs.push(None);
        store.envs.len()
      }
    };
    let env = Env::new(id);
    store.envs[id - 1] = Some(env.clone());
    log::debug!("created napi env {}", id);
    env
  }

  pub fn env(&self, raw: napi_env) -> Option<Rc<Env>> {
    let id = raw as usize;
    if id == 0 {
      return None;
    }
    self
      .envs
      .borrow()
      .envs
      .get(id - 1)
      .and_then(|slot| slot.clone())
  }

  pub fn env_checked(&self, raw: napi_env) -> Result<Rc<Env>> {
    self.env(raw).ok_or(Error::InvalidArg)
  }

  /// Teardown: cleanup hooks LIFO, then finalizers (finalizing list first,
  /// LIFO), then the instance-data finalizer, then removal.
  pub fn destroy_env(&self, env: &Rc<Env>) {
    if env.destroying.replace(true) {
      return;
    }
    log::debug!("destroying napi env {}", env.id);

    env.drain_cleanup_hooks();
    self.run_pending_finalizers_for(env);

    let finalizing: Vec<u32> = {
      let mut list = env.finalizing_reflist.borrow_mut();
      list.drain(..).rev().collect()
    };
    for ref_id in finalizing {
      let reference = self.refs.borrow_mut().remove(ref_id);
      let Some(reference) = reference else {
        continue;
      };
      reference.clear();
      if let Some(record_id) = reference.finalizer.take() {
        if let Some(record) = env.take_finalizer_record(record_id) {
          self.run_finalizer(env, record);
        }
      }
    }

    let live: Vec<u32> = {
      let mut list = env.reflist.borrow_mut();
      list.drain(..).rev().collect()
    };
    for ref_id in live {
      if let Some(reference) = self.refs.borrow_mut().remove(ref_id) {
        reference.clear();
      }
    }

    if let Some(data) = env.instance_data.borrow_mut().take() {
      if let Some(cb) = data.finalize_cb {
        self.run_finalizer(
          env,
          FinalizerRecord {
            cb,
            data: data.data,
            hint: data.finalize_hint,
          },
        );
      }
    }

    let mut store = self.envs.borrow_mut();
    if let Some(slot) = store.envs.get_mut(env.id - 1) {
      *slot = None;
      store.free.push(env.id);
    }
  }

  // Scopes

  pub fn open_scope(&self, env: &Env) -> usize {
    let id = {
      let store = self.handle_store.borrow();
      self.scopes.borrow_mut().open(&store)
    };
    env.open_handle_scopes.set(env.open_handle_scopes.get() + 1);
    id
  }

  pub fn close_scope(&self, env: &Env, scope_id: usize) -> Result {
    if env.open_handle_scopes.get() == 0 {
      return Err(Error::HandleScopeMismatch);
    }
    self
      .scopes
      .borrow_mut()
      .close(&mut self.handle_store.borrow_mut(), scope_id)?;
    env.open_handle_scopes.set(env.open_handle_scopes.get() - 1);
    Ok(())
  }

  pub fn escape(&self, scope_id: usize, handle: usize) -> Result<usize> {
    self
      .scopes
      .borrow_mut()
      .escape(&mut self.handle_store.borrow_mut(), scope_id, handle)
  }

  // Handles

  /// Stores a value in the current scope, reusing singleton IDs where the
  /// value has one.
  pub fn add_value(&self, value: Value) -> usize {
    match &value {
      Value::Undefined => return consts::UNDEFINED,
      Value::Null => return consts::NULL,
      Value::Bool(false) => return consts::FALSE,
      Value::Bool(true) => return consts::TRUE,
      Value::Str(s) if s.is_empty() => return consts::EMPTY_STRING,
      Value::Object(obj) if Rc::ptr_eq(obj, &self.global) => {
        return consts::GLOBAL
      }
      _ => {}
    }
    self
      .scopes
      .borrow_mut()
      .add(&mut self.handle_store.borrow_mut(), value)
  }

  pub fn value_from_handle(&self, handle: napi_value) -> Option<Value> {
    let id = handle as usize;
    if id == 0 {
      return None;
    }
    self.handle_store.borrow().get(id)
  }

  // References

  pub fn create_reference(
    &self,
    env: &Env,
    value: Value,
    initial_refcount: u32,
    ownership: Ownership,
  ) -> Rc<Reference> {
    let reference =
      self
        .refs
        .borrow_mut()
        .insert(env.id, value, initial_refcount, ownership);
    env.reflist.borrow_mut().push(reference.id);
    reference
  }

  /// As `create_reference`, but with a native finalizer that runs when the
  /// target is collected or the environment is torn down.
  pub fn create_reference_with_finalizer(
    &self,
    env: &Env,
    value: Value,
    initial_refcount: u32,
    ownership: Ownership,
    record: FinalizerRecord,
  ) -> Rc<Reference> {
    let reference =
      self
        .refs
        .borrow_mut()
        .insert(env.id, value, initial_refcount, ownership);
    let record_id = env.add_finalizer_record(record);
    reference.finalizer.set(Some(record_id));
    if let Some(Value::Object(obj)) = reference.get() {
      obj
        .guards
        .borrow_mut()
        .push(FinalizerGuard::new(env.pending_finalizers.clone(), record_id));
    }
    env.finalizing_reflist.borrow_mut().push(reference.id);
    reference
  }

  pub fn reference(&self, raw: napi_ref) -> Option<Rc<Reference>> {
    self.refs.borrow().get(raw as u32)
  }

  /// Explicit deletion: disarms the finalizer instead of running it.
  pub fn delete_reference(&self, env: &Env, raw: napi_ref) -> Result {
    let id = raw as u32;
    let reference = self.refs.borrow_mut().remove(id).ok_or(Error::InvalidArg)?;
    if let Some(record_id) = reference.finalizer.take() {
      env.take_finalizer_record(record_id);
      env.finalizing_reflist.borrow_mut().retain(|r| *r != id);
    } else {
      env.reflist.borrow_mut().retain(|r| *r != id);
    }
    reference.clear();
    Ok(())
  }

  // Finalizers

  /// Runs one finalizer with a fresh scope around the callback and no
  /// borrows held.
  pub fn run_finalizer(&self, env: &Env, record: FinalizerRecord) {
    let scope = self.open_scope(env);
    // SAFETY: the add-on registered this callback through the ABI.
    unsafe { (record.cb)(env.id as napi_env, record.data, record.hint) };
    // A panicking close here would mean the finalizer unbalanced scopes.
    let _ = self.close_scope(env, scope);
  }

  fn run_pending_finalizers_for(&self, env: &Rc<Env>) {
    loop {
      let next = env.pending_finalizers.borrow_mut().pop_front();
      let Some(record_id) = next else {
        break;
      };
      if let Some(record) = env.take_finalizer_record(record_id) {
        self.run_finalizer(env, record);
      }
    }
  }

  /// Drains death announcements for every environment. Called from the
  /// host pump; the embedder's "GC cycle".
  pub fn run_pending_finalizers(&self) {
    let envs: Vec<Rc<Env>> = {
      let store = self.envs.borrow();
      store.envs.iter().flatten().cloned().collect()
    };
    for env in envs {
      self.run_pending_finalizers_for(&env);
    }
  }

  /// One host-thread turn: queued cross-thread tasks, then finalizers.
  pub fn pump(&self) -> usize {
    let ran = self.tasks.run_until_idle();
    self.run_pending_finalizers();
    ran
  }

  // Deferreds

  /// Creates a promise and the one-shot capability to settle it.
  pub fn create_promise(&self) -> (usize, Rc<Obj>) {
    let promise = Obj::new(ObjKind::Promise(RefCell::new(PromiseState::Pending)));
    let mut store = self.deferreds.borrow_mut();
    let id = match store.free.pop() {
      Some(id) => id,
      None => {
        store.deferreds.push(None);
        store.deferreds.len()
      }
    };
    store.deferreds[id - 1] = Some(promise.clone());
    (id, promise)
  }

  /// Settles and consumes the deferred; a second settlement on the same
  /// deferred no longer finds it.
  pub fn settle_deferred(
    &self,
    deferred: napi_deferred,
    value: Value,
    reject: bool,
  ) -> Result {
    let id = deferred as usize;
    if id == 0 {
      return Err(Error::InvalidArg);
    }
    let promise = {
      let mut store = self.deferreds.borrow_mut();
      let slot = store
        .deferreds
        .get_mut(id - 1)
        .ok_or(Error::InvalidArg)?
        .take()
        .ok_or(Error::InvalidArg)?;
      store.free.push(id);
      slot
    };
    let ObjKind::Promise(state) = &promise.kind else {
      return Err(Error::InvalidArg);
    };
    *state.borrow_mut() = if reject {
      PromiseState::Rejected(value)
    } else {
      PromiseState::Fulfilled(value)
    };
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn singleton_handles_are_stable() {
    let ctx = Context::new();
    assert_eq!(ctx.add_value(Value::Undefined), consts::UNDEFINED);
    assert_eq!(ctx.add_value(Value::Null), consts::NULL);
    assert_eq!(ctx.add_value(Value::Bool(true)), consts::TRUE);
    assert_eq!(ctx.add_value(Value::Bool(false)), consts::FALSE);
    assert_eq!(ctx.add_value(Value::string("")), consts::EMPTY_STRING);
    assert_eq!(
      ctx.add_value(Value::Object(ctx.global())),
      consts::GLOBAL
    );
  }

  #[test]
  fn deferred_settles_exactly_once() {
    let ctx = Context::new();
    let (id, promise) = ctx.create_promise();
    ctx
      .settle_deferred(id as napi_deferred, Value::Number(42.0), false)
      .unwrap();
    match &promise.kind {
      ObjKind::Promise(state) => {
        assert!(matches!(
          &*state.borrow(),
          PromiseState::Fulfilled(Value::Number(n)) if *n == 42.0
        ));
      }
      _ => unreachable!(),
    }
    assert_eq!(
      ctx
        .settle_deferred(id as napi_deferred, Value::Number(1.0), true)
        .unwrap_err(),
      Error::InvalidArg
    );
  }

  #[test]
  fn env_slots_are_reused_after_destroy() {
    let ctx = Context::new();
    let env = ctx.create_env();
    let id = env.id;
    ctx.destroy_env(&env);
    assert!(ctx.env(id as napi_env).is_none());
    let env2 = ctx.create_env();
    assert_eq!(env2.id, id);
  }
}
