// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Async work: `execute` runs on a shared worker pool with no scope and no
//! handle access; `complete` is posted back to the host thread wrapped in a
//! fresh scope. Cancellation wins only if it lands before a worker picks
//! the job up.

use std::collections::VecDeque;
use std::os::raw::c_void;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Condvar;
use parking_lot::Mutex;

use napi_host_core::types::*;
use napi_host_core::Context;
use napi_host_core::Error;
use napi_host_core::Result;

use crate::util::*;

// Work-item state machine.
const CREATED: u8 = 0;
const QUEUED: u8 = 1;
const RUNNING: u8 = 2;
const CANCELLED: u8 = 3;
const DONE: u8 = 4;

pub struct AsyncWork {
  env_id: usize,
  execute: napi_async_execute_callback,
  complete: Option<napi_async_complete_callback>,
  data: usize,
  state: AtomicU8,
}

// Data pointers cross threads as integers; the add-on owns their safety.
unsafe impl Send for AsyncWork {}
unsafe impl Sync for AsyncWork {}

static WORKS: Lazy<Mutex<WorkRegistry>> =
  Lazy::new(|| Mutex::new(WorkRegistry::default()));

#[derive(Default)]
struct WorkRegistry {
  slots: Vec<Option<Arc<AsyncWork>>>,
  free: Vec<usize>,
}

impl WorkRegistry {
  fn insert(&mut self, work: Arc<AsyncWork>) -> usize {
    let id = match self.free.pop() {
      Some(id) => id,
      None => {
        self.slots.push(None);
        self.slots.len()
      }
    };
    self.slots[id - 1] = Some(work);
    id
  }

  fn get(&self, id: usize) -> Option<Arc<AsyncWork>> {
    if id == 0 {
      return None;
    }
    self.slots.get(id - 1).and_then(|slot| slot.clone())
  }

  fn remove(&mut self, id: usize) -> Option<Arc<AsyncWork>> {
    let slot = self.slots.get_mut(id - 1)?;
    let work = slot.take();
    if work.is_some() {
      self.free.push(id);
    }
    work
  }
}

// Shared bounded pool. Per-work threads would be correct but starve under
// load; pool size is the tunable the design notes ask for.
struct WorkerPool {
  jobs: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
  available: Condvar,
}

static POOL: Lazy<Arc<WorkerPool>> = Lazy::new(|| {
  let pool = Arc::new(WorkerPool {
    jobs: Mutex::new(VecDeque::new()),
    available: Condvar::new(),
  });
  let size = std::env::var("NAPI_HOST_POOL_SIZE")
    .ok()
    .and_then(|v| v.parse::<usize>().ok())
    .filter(|n| *n > 0)
    .unwrap_or(4);
  log::debug!("starting async-work pool with {} workers", size);
  for i in 0..size {
    let pool = pool.clone();
    std::thread::Builder::new()
      .name(format!("napi-worker-{}", i))
      .spawn(move || loop {
        let job = {
          let mut jobs = pool.jobs.lock();
          loop {
            match jobs.pop_front() {
              Some(job) => break job,
              None => pool.available.wait(&mut jobs),
            }
          }
        };
        job();
      })
      .expect("failed to spawn async-work thread");
  }
  pool
});

fn submit(job: Box<dyn FnOnce() + Send>) {
  let pool = POOL.clone();
  pool.jobs.lock().push_back(job);
  pool.available.notify_one();
}

#[napi_sym::napi_sym]
fn napi_create_async_work(
  env: napi_env,
  _async_resource: napi_value,
  _async_resource_name: napi_value,
  execute: Option<napi_async_execute_callback>,
  complete: Option<napi_async_complete_callback>,
  data: *mut c_void,
  result: *mut napi_async_work,
) -> Result {
  let (_, env) = env_ref(env)?;
  check_arg!(result);
  let execute = execute.ok_or(Error::InvalidArg)?;
  let work = Arc::new(AsyncWork {
    env_id: env.id,
    execute,
    complete,
    data: data as usize,
    state: AtomicU8::new(CREATED),
  });
  let id = WORKS.lock().insert(work);
  *result = id as napi_async_work;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_delete_async_work(env: napi_env, work: napi_async_work) -> Result {
  let (_, _env) = env_ref(env)?;
  check_arg!(work);
  WORKS
    .lock()
    .remove(work as usize)
    .map(|_| ())
    .ok_or(Error::InvalidArg)
}

#[napi_sym::napi_sym]
fn napi_queue_async_work(env: napi_env, work: napi_async_work) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(work);
  let item = WORKS.lock().get(work as usize).ok_or(Error::InvalidArg)?;
  if item
    .state
    .compare_exchange(CREATED, QUEUED, Ordering::AcqRel, Ordering::Acquire)
    .is_err()
  {
    return Err(Error::GenericFailure);
  }

  let tasks = ctx.tasks.clone();
  submit(Box::new(move || {
    let status = match item.state.compare_exchange(
      QUEUED,
      RUNNING,
      Ordering::AcqRel,
      Ordering::Acquire,
    ) {
      Ok(_) => {
        // SAFETY: execute must not touch handles; it gets the raw env
        // pointer for identification only.
        unsafe {
          (item.execute)(item.env_id as napi_env, item.data as *mut c_void)
        };
        item.state.store(DONE, Ordering::Release);
        napi_ok
      }
      // Cancelled before we started; skip execute entirely.
      Err(_) => napi_cancelled,
    };
    let item = item.clone();
    tasks.post(Box::new(move || complete_on_host(item, status)));
  }));
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_cancel_async_work(env: napi_env, work: napi_async_work) -> Result {
  let (_, _env) = env_ref(env)?;
  check_arg!(work);
  let item = WORKS.lock().get(work as usize).ok_or(Error::InvalidArg)?;
  item
    .state
    .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
    .map(|_| ())
    .map_err(|_| Error::GenericFailure)
}

/// Host-thread side: a fresh scope, a clean pending-exception slot, then
/// the add-on's completion callback.
fn complete_on_host(item: Arc<AsyncWork>, status: napi_status) {
  let Some(complete) = item.complete else {
    return;
  };
  let ctx = Context::current();
  let Some(env) = ctx.env(item.env_id as napi_env) else {
    return;
  };
  drop(env.take_exception());
  let scope = ctx.open_scope(&env);
  // SAFETY: completion callback registered through the ABI.
  unsafe { complete(env.id as napi_env, status, item.data as *mut c_void) };
  let _ = ctx.close_scope(&env, scope);
  if let Some(exception) = env.take_exception() {
    log::error!(
      "unhandled exception in async-work completion: {}",
      exception.coerce_to_string()
    );
  }
}
