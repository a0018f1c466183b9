// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! The concurrency engine: thread-safe function delivery and lifecycle,
//! async work execution and cancellation, promise settlement.

mod common;

use std::os::raw::c_void;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use napi_host::shim::*;
use napi_host::types::*;
use napi_host::Context;
use napi_host::ObjKind;
use napi_host::PromiseState;
use napi_host::Registration;
use napi_host::Value;

// ---- E4: four producers, one drain ---------------------------------------

static TSFN_ITEMS: parking_lot::Mutex<Vec<usize>> =
  parking_lot::Mutex::new(Vec::new());
static TSFN_FINALIZED: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn collect_item(
  _env: napi_env,
  _js_callback: napi_value,
  _context: *mut c_void,
  data: *mut c_void,
) {
  TSFN_ITEMS.lock().push(data as usize);
}

unsafe extern "C" fn tsfn_finalize(
  _env: napi_env,
  _data: *mut c_void,
  _hint: *mut c_void,
) {
  TSFN_FINALIZED.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn tsfn_preserves_per_producer_order_and_finalizes_once() {
  let reg = Registration::new();
  let env_rc = reg.environment();
  let ctx = Context::current();

  let mut tsfn = std::ptr::null_mut();
  assert_napi_ok!(napi_create_threadsafe_function(
    reg.env(),
    std::ptr::null_mut(),
    std::ptr::null_mut(),
    make_string(reg.env(), "tsfn-test"),
    0,
    4,
    std::ptr::null_mut(),
    Some(tsfn_finalize),
    std::ptr::null_mut(),
    Some(collect_item),
    &mut tsfn
  ));
  let _ = reg.finish(std::ptr::null_mut());

  let tsfn_addr = tsfn as usize;
  let producers: Vec<_> = (0..4u32)
    .map(|thread| {
      std::thread::spawn(move || {
        for seq in 0..100usize {
          let data = (thread as usize + 1) * 1000 + seq;
          let status = unsafe {
            napi_call_threadsafe_function(
              tsfn_addr as napi_threadsafe_function,
              data as *mut c_void,
              napi_tsfn_blocking,
            )
          };
          assert_eq!(status, napi_ok);
        }
        let status = unsafe {
          napi_release_threadsafe_function(
            tsfn_addr as napi_threadsafe_function,
            napi_tsfn_release,
          )
        };
        assert_eq!(status, napi_ok);
      })
    })
    .collect();

  while TSFN_FINALIZED.load(Ordering::SeqCst) == 0 {
    ctx.tasks.wait_and_run(Duration::from_millis(20));
    ctx.run_pending_finalizers();
  }
  for producer in producers {
    producer.join().unwrap();
  }

  let items = TSFN_ITEMS.lock();
  assert_eq!(items.len(), 400);
  for thread in 1..=4usize {
    let per_thread: Vec<usize> = items
      .iter()
      .copied()
      .filter(|item| item / 1000 == thread)
      .collect();
    assert_eq!(per_thread.len(), 100);
    assert!(
      per_thread.windows(2).all(|w| w[0] < w[1]),
      "producer {} items arrived out of order",
      thread
    );
  }
  assert_eq!(TSFN_FINALIZED.load(Ordering::SeqCst), 1);

  // Once closed and finalized the handle is gone.
  assert_napi_status!(
    napi_call_threadsafe_function(
      tsfn_addr as napi_threadsafe_function,
      std::ptr::null_mut(),
      napi_tsfn_nonblocking
    ),
    napi_invalid_arg
  );

  ctx.destroy_env(&env_rc);
}

// ---- bounded queue behavior on the host thread ---------------------------

static BOUNDED_ITEMS: AtomicUsize = AtomicUsize::new(0);
static BOUNDED_FINALIZED: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn count_item(
  _env: napi_env,
  _js_callback: napi_value,
  _context: *mut c_void,
  _data: *mut c_void,
) {
  BOUNDED_ITEMS.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn bounded_finalize(
  _env: napi_env,
  _data: *mut c_void,
  _hint: *mut c_void,
) {
  BOUNDED_FINALIZED.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn full_queue_reports_queue_full_and_would_deadlock() {
  let reg = Registration::new();
  let env_rc = reg.environment();
  let ctx = Context::current();

  let mut tsfn = std::ptr::null_mut();
  assert_napi_ok!(napi_create_threadsafe_function(
    reg.env(),
    std::ptr::null_mut(),
    std::ptr::null_mut(),
    make_string(reg.env(), "bounded"),
    1,
    1,
    std::ptr::null_mut(),
    Some(bounded_finalize),
    std::ptr::null_mut(),
    Some(count_item),
    &mut tsfn
  ));
  let _ = reg.finish(std::ptr::null_mut());

  assert_napi_ok!(napi_call_threadsafe_function(
    tsfn,
    std::ptr::null_mut(),
    napi_tsfn_nonblocking
  ));
  // Queue of one is now full; the host thread must not block on it.
  assert_napi_status!(
    napi_call_threadsafe_function(
      tsfn,
      std::ptr::null_mut(),
      napi_tsfn_nonblocking
    ),
    napi_queue_full
  );
  assert_napi_status!(
    napi_call_threadsafe_function(
      tsfn,
      std::ptr::null_mut(),
      napi_tsfn_blocking
    ),
    napi_would_deadlock
  );

  assert_napi_ok!(napi_release_threadsafe_function(tsfn, napi_tsfn_release));
  // Closing: producers are refused before the drain happens.
  assert_napi_status!(
    napi_call_threadsafe_function(
      tsfn,
      std::ptr::null_mut(),
      napi_tsfn_nonblocking
    ),
    napi_closing
  );

  while BOUNDED_FINALIZED.load(Ordering::SeqCst) == 0 {
    ctx.tasks.wait_and_run(Duration::from_millis(20));
  }
  // The item enqueued before release was still dispatched.
  assert_eq!(BOUNDED_ITEMS.load(Ordering::SeqCst), 1);

  ctx.destroy_env(&env_rc);
}

// ---- async work -----------------------------------------------------------

static WORK_EXECUTED: AtomicUsize = AtomicUsize::new(0);
static WORK_STATUS: AtomicI32 = AtomicI32::new(-1);

unsafe extern "C" fn work_execute(_env: napi_env, data: *mut c_void) {
  assert_eq!(data as usize, 0xBEEF);
  WORK_EXECUTED.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn work_complete(
  _env: napi_env,
  status: napi_status,
  data: *mut c_void,
) {
  assert_eq!(data as usize, 0xBEEF);
  WORK_STATUS.store(status, Ordering::SeqCst);
}

#[test]
fn async_work_executes_off_thread_and_completes_on_host() {
  let reg = Registration::new();
  let env_rc = reg.environment();
  let ctx = Context::current();
  let env = reg.env();

  let mut work = std::ptr::null_mut();
  assert_napi_ok!(napi_create_async_work(
    env,
    std::ptr::null_mut(),
    make_string(env, "work-test"),
    Some(work_execute),
    Some(work_complete),
    0xBEEF as *mut c_void,
    &mut work
  ));
  assert_napi_ok!(napi_queue_async_work(env, work));
  // Double-queueing the same work item is an error.
  assert_napi_status!(napi_queue_async_work(env, work), napi_generic_failure);

  while WORK_STATUS.load(Ordering::SeqCst) == -1 {
    ctx.tasks.wait_and_run(Duration::from_millis(20));
  }
  assert_eq!(WORK_STATUS.load(Ordering::SeqCst), napi_ok);
  assert_eq!(WORK_EXECUTED.load(Ordering::SeqCst), 1);

  assert_napi_ok!(napi_delete_async_work(env, work));
  let _ = reg.finish(std::ptr::null_mut());
  ctx.destroy_env(&env_rc);
}

static GATE: parking_lot::Mutex<bool> = parking_lot::Mutex::new(false);
static GATE_OPEN: parking_lot::Condvar = parking_lot::Condvar::new();
static CANCELLED_EXECUTED: AtomicUsize = AtomicUsize::new(0);
static CANCELLED_STATUS: AtomicI32 = AtomicI32::new(-1);
static BLOCKER_DONE: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn blocker_execute(_env: napi_env, _data: *mut c_void) {
  let mut open = GATE.lock();
  while !*open {
    GATE_OPEN.wait(&mut open);
  }
}

unsafe extern "C" fn blocker_complete(
  _env: napi_env,
  _status: napi_status,
  _data: *mut c_void,
) {
  BLOCKER_DONE.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn cancelled_execute(_env: napi_env, _data: *mut c_void) {
  CANCELLED_EXECUTED.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn cancelled_complete(
  _env: napi_env,
  status: napi_status,
  _data: *mut c_void,
) {
  CANCELLED_STATUS.store(status, Ordering::SeqCst);
}

#[test]
fn cancelling_unstarted_work_skips_execute() {
  let reg = Registration::new();
  let env_rc = reg.environment();
  let ctx = Context::current();
  let env = reg.env();

  // Saturate the pool so the victim cannot start.
  let mut blockers = Vec::new();
  for _ in 0..4 {
    let mut blocker = std::ptr::null_mut();
    assert_napi_ok!(napi_create_async_work(
      env,
      std::ptr::null_mut(),
      make_string(env, "blocker"),
      Some(blocker_execute),
      Some(blocker_complete),
      std::ptr::null_mut(),
      &mut blocker
    ));
    assert_napi_ok!(napi_queue_async_work(env, blocker));
    blockers.push(blocker);
  }

  let mut victim = std::ptr::null_mut();
  assert_napi_ok!(napi_create_async_work(
    env,
    std::ptr::null_mut(),
    make_string(env, "victim"),
    Some(cancelled_execute),
    Some(cancelled_complete),
    std::ptr::null_mut(),
    &mut victim
  ));
  assert_napi_ok!(napi_queue_async_work(env, victim));
  assert_napi_ok!(napi_cancel_async_work(env, victim));

  {
    let mut open = GATE.lock();
    *open = true;
    GATE_OPEN.notify_all();
  }

  while CANCELLED_STATUS.load(Ordering::SeqCst) == -1
    || BLOCKER_DONE.load(Ordering::SeqCst) < 4
  {
    ctx.tasks.wait_and_run(Duration::from_millis(20));
  }
  assert_eq!(CANCELLED_STATUS.load(Ordering::SeqCst), napi_cancelled);
  assert_eq!(CANCELLED_EXECUTED.load(Ordering::SeqCst), 0);

  for blocker in blockers {
    assert_napi_ok!(napi_delete_async_work(env, blocker));
  }
  assert_napi_ok!(napi_delete_async_work(env, victim));
  let _ = reg.finish(std::ptr::null_mut());
  ctx.destroy_env(&env_rc);
}

// ---- E5: promise settlement ------------------------------------------------

#[test]
fn promise_resolves_once_and_refuses_resettlement() {
  let reg = Registration::new();
  let env = reg.env();
  let ctx = Context::current();

  let mut deferred = std::ptr::null_mut();
  let mut promise = std::ptr::null_mut();
  assert_napi_ok!(napi_create_promise(env, &mut deferred, &mut promise));

  let mut is_promise = false;
  assert_napi_ok!(napi_is_promise(env, promise, &mut is_promise));
  assert!(is_promise);

  let promise_obj = match ctx.value_from_handle(promise).unwrap() {
    Value::Object(obj) => obj,
    _ => unreachable!(),
  };

  assert_napi_ok!(napi_resolve_deferred(
    env,
    deferred,
    make_double(env, 42.0)
  ));
  match &promise_obj.kind {
    ObjKind::Promise(state) => {
      assert!(matches!(
        &*state.borrow(),
        PromiseState::Fulfilled(Value::Number(n)) if *n == 42.0
      ));
    }
    _ => unreachable!(),
  }

  // The deferred was consumed; a second settlement fails.
  assert_napi_status!(
    napi_reject_deferred(env, deferred, make_double(env, 1.0)),
    napi_invalid_arg
  );

  let _ = reg.finish(std::ptr::null_mut());
}
