// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Thread-safe functions: the one place producer threads are allowed to
//! touch the runtime. Each TSFN owns a bounded FIFO behind a mutex plus a
//! condvar for blocked producers; items drain on the host thread via the
//! context's task queue. The registry is process-global so foreign threads
//! never need the (thread-local) context.

use std::collections::VecDeque;
use std::os::raw::c_void;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::ThreadId;

use once_cell::sync::Lazy;
use parking_lot::Condvar;
use parking_lot::Mutex;

use napi_host_core::types::*;
use napi_host_core::Context;
use napi_host_core::Error;
use napi_host_core::Ownership;
use napi_host_core::Result;
use napi_host_core::Value;

use crate::util::*;

static TSFNS: Lazy<Mutex<TsfnRegistry>> =
  Lazy::new(|| Mutex::new(TsfnRegistry::default()));

#[derive(Default)]
struct TsfnRegistry {
  slots: Vec<Option<Arc<Tsfn>>>,
  free: Vec<usize>,
}

impl TsfnRegistry {
  fn insert(&mut self, build: impl FnOnce(usize) -> Tsfn) -> Arc<Tsfn> {
    let id = match self.free.pop() {
      Some(id) => id,
      None => {
        self.slots.push(None);
        self.slots.len()
      }
    };
    let tsfn = Arc::new(build(id));
    self.slots[id - 1] = Some(tsfn.clone());
    tsfn
  }

  fn get(&self, id: usize) -> Option<Arc<Tsfn>> {
    if id == 0 {
      return None;
    }
    self.slots.get(id - 1).and_then(|slot| slot.clone())
  }

  fn remove(&mut self, id: usize) {
    if let Some(slot) = self.slots.get_mut(id - 1) {
      if slot.take().is_some() {
        self.free.push(id);
      }
    }
  }
}

fn lookup(func: napi_threadsafe_function) -> Result<Arc<Tsfn>> {
  TSFNS.lock().get(func as usize).ok_or(Error::InvalidArg)
}

struct TsfnState {
  /// Data pointers as integers so the state is Send.
  queue: VecDeque<usize>,
  thread_count: usize,
  closing: bool,
}

pub struct Tsfn {
  id: usize,
  env_id: usize,
  max_queue_size: usize,
  context: usize,
  call_js_cb: Option<napi_threadsafe_function_call_js>,
  finalize_cb: Option<napi_finalize>,
  finalize_data: usize,
  /// Strong reference pinning the host callable (0 = none).
  func_ref: u32,
  /// For would-deadlock detection on blocking calls.
  host_thread: ThreadId,
  referenced: AtomicBool,
  state: Mutex<TsfnState>,
  space: Condvar,
  tasks: Arc<napi_host_core::TaskQueue>,
}

impl Tsfn {
  /// True once closing is set and the queue has fully drained; the caller
  /// then runs the finalizer.
  fn should_finalize(&self) -> bool {
    let state = self.state.lock();
    state.closing && state.queue.is_empty() && state.thread_count == 0
  }

  fn post_wakeup(self: &Arc<Tsfn>) {
    let id = self.id;
    self.tasks.post(Box::new(move || drain_on_host(id)));
  }
}

#[napi_sym::napi_sym]
fn napi_create_threadsafe_function(
  env: napi_env,
  func: napi_value,
  _async_resource: napi_value,
  _async_resource_name: napi_value,
  max_queue_size: usize,
  initial_thread_count: usize,
  thread_finalize_data: *mut c_void,
  thread_finalize_cb: Option<napi_finalize>,
  context: *mut c_void,
  call_js_cb: Option<napi_threadsafe_function_call_js>,
  result: *mut napi_threadsafe_function,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  if initial_thread_count == 0 {
    return Err(Error::InvalidArg);
  }
  // Either a host callable or a custom call_js_cb must exist for calls to
  // mean anything.
  let func_ref = if func.is_null() {
    if call_js_cb.is_none() {
      return Err(Error::InvalidArg);
    }
    0
  } else {
    let callable = object_arg(&ctx, func).map_err(|_| Error::FunctionExpected)?;
    if callable.function_data().is_none() {
      return Err(Error::FunctionExpected);
    }
    ctx
      .create_reference(&env, Value::Object(callable), 1, Ownership::Runtime)
      .id
  };

  let tasks = ctx.tasks.clone();
  let env_id = env.id;
  let tsfn = TSFNS.lock().insert(|id| Tsfn {
    id,
    env_id,
    max_queue_size,
    context: context as usize,
    call_js_cb,
    finalize_cb: thread_finalize_cb,
    finalize_data: thread_finalize_data as usize,
    func_ref,
    host_thread: std::thread::current().id(),
    referenced: AtomicBool::new(true),
    state: Mutex::new(TsfnState {
      queue: VecDeque::new(),
      thread_count: initial_thread_count,
      closing: false,
    }),
    space: Condvar::new(),
    tasks,
  });
  log::debug!(
    "tsfn {} created (queue cap {}, {} producers)",
    tsfn.id,
    max_queue_size,
    initial_thread_count
  );
  *result = tsfn.id as napi_threadsafe_function;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_threadsafe_function_context(
  func: napi_threadsafe_function,
  result: *mut *mut c_void,
) -> Result {
  check_arg!(result);
  let tsfn = lookup(func)?;
  *result = tsfn.context as *mut c_void;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_call_threadsafe_function(
  func: napi_threadsafe_function,
  data: *mut c_void,
  is_blocking: napi_threadsafe_function_call_mode,
) -> Result {
  let tsfn = lookup(func)?;
  {
    let mut state = tsfn.state.lock();
    if state.closing {
      return Err(Error::Closing);
    }
    if tsfn.max_queue_size > 0 {
      while state.queue.len() >= tsfn.max_queue_size {
        if is_blocking == napi_tsfn_nonblocking {
          return Err(Error::QueueFull);
        }
        // Blocking on the host thread would starve the drain forever.
        if std::thread::current().id() == tsfn.host_thread {
          return Err(Error::WouldDeadlock);
        }
        tsfn.space.wait(&mut state);
        if state.closing {
          return Err(Error::Closing);
        }
      }
    }
    state.queue.push_back(data as usize);
  }
  tsfn.post_wakeup();
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_acquire_threadsafe_function(func: napi_threadsafe_function) -> Result {
  let tsfn = lookup(func)?;
  let mut state = tsfn.state.lock();
  if state.closing {
    return Err(Error::Closing);
  }
  state.thread_count += 1;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_release_threadsafe_function(
  func: napi_threadsafe_function,
  mode: napi_threadsafe_function_release_mode,
) -> Result {
  let tsfn = lookup(func)?;
  {
    let mut state = tsfn.state.lock();
    if state.thread_count == 0 {
      return Err(Error::InvalidArg);
    }
    state.thread_count -= 1;
    if mode == napi_tsfn_abort || state.thread_count == 0 {
      state.closing = true;
      // Unblock producers parked on a full queue so they observe closing.
      tsfn.space.notify_all();
    }
  }
  // The host thread decides whether it is time to finalize.
  tsfn.post_wakeup();
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_ref_threadsafe_function(
  env: napi_env,
  func: napi_threadsafe_function,
) -> Result {
  let (_, _env) = env_ref(env)?;
  let tsfn = lookup(func)?;
  tsfn.referenced.store(true, Ordering::Release);
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_unref_threadsafe_function(
  env: napi_env,
  func: napi_threadsafe_function,
) -> Result {
  let (_, _env) = env_ref(env)?;
  let tsfn = lookup(func)?;
  tsfn.referenced.store(false, Ordering::Release);
  Ok(())
}

/// Whether any live TSFN still wants the host pump alive; the embedder's
/// run loop consults this.
pub fn any_referenced() -> bool {
  let registry = TSFNS.lock();
  registry
    .slots
    .iter()
    .flatten()
    .any(|tsfn| tsfn.referenced.load(Ordering::Acquire))
}

/// Host-thread drain: pop-invoke until empty, then finalize if the TSFN is
/// closing and fully released. Wake-ups are posted per call and coalesce
/// into no-op drains.
fn drain_on_host(id: usize) {
  let Some(tsfn) = TSFNS.lock().get(id) else {
    return;
  };
  let ctx = Context::current();
  let Some(env) = ctx.env(tsfn.env_id as napi_env) else {
    // Environment torn down first; nothing can run, drop everything.
    TSFNS.lock().remove(id);
    return;
  };

  loop {
    let data = {
      let mut state = tsfn.state.lock();
      let data = state.queue.pop_front();
      if data.is_some() {
        tsfn.space.notify_one();
      }
      data
    };
    let Some(data) = data else {
      break;
    };

    if let Some(call_js_cb) = tsfn.call_js_cb {
      let scope = ctx.open_scope(&env);
      let func_handle = match ctx
        .reference(tsfn.func_ref as usize as napi_ref)
        .and_then(|r| r.get())
      {
        Some(value) => ctx.add_value(value) as napi_value,
        None => std::ptr::null_mut(),
      };
      // SAFETY: calling into the add-on with its own context pointer.
      unsafe {
        call_js_cb(
          env.id as napi_env,
          func_handle,
          tsfn.context as *mut c_void,
          data as *mut c_void,
        );
      }
      let _ = ctx.close_scope(&env, scope);
      // Exceptions from the callback route through the pending slot; an
      // unhandled one is fatal-logged rather than poisoning later items.
      if let Some(exception) = env.take_exception() {
        log::error!(
          "unhandled exception in threadsafe callback: {}",
          exception.coerce_to_string()
        );
      }
    } else if let Some(Value::Object(callable)) = ctx
      .reference(tsfn.func_ref as usize as napi_ref)
      .and_then(|r| r.get())
    {
      // No custom dispatcher: invoke the callable with no arguments.
      if let Err(err) = ctx.call_function(&env, &callable, Value::Undefined, &[])
      {
        if let napi_host_core::CallError::Exception(exception) = err {
          log::error!(
            "unhandled exception in threadsafe callback: {}",
            exception.coerce_to_string()
          );
        }
      }
    }
  }

  if tsfn.should_finalize() {
    if let Some(finalize_cb) = tsfn.finalize_cb {
      ctx.run_finalizer(
        &env,
        napi_host_core::FinalizerRecord {
          cb: finalize_cb,
          data: tsfn.finalize_data as *mut c_void,
          hint: tsfn.context as *mut c_void,
        },
      );
    }
    if tsfn.func_ref != 0 {
      let _ = ctx.delete_reference(&env, tsfn.func_ref as usize as napi_ref);
    }
    TSFNS.lock().remove(id);
    log::debug!("tsfn {} finalized", id);
  }
}
