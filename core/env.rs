// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Per-add-on environment state. Everything here is host-thread-only.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::raw::c_void;
use std::rc::Rc;

use crate::error::error_message;
use crate::error::Error;
use crate::error::Result;
use crate::reference::FinalizerRecord;
use crate::reference::FinalizerTable;
use crate::reference::PendingQueue;
use crate::types::*;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct LastError {
  pub error_code: napi_status,
  pub engine_error_code: i32,
}

#[derive(Debug)]
pub struct InstanceData {
  pub data: *mut c_void,
  pub finalize_cb: Option<napi_finalize>,
  pub finalize_hint: *mut c_void,
}

#[derive(Debug)]
pub struct CleanupHook {
  pub hook: napi_cleanup_hook,
  pub arg: *mut c_void,
}

pub struct Env {
  pub id: usize,
  pub open_handle_scopes: Cell<usize>,
  last_error: RefCell<LastError>,
  error_info: RefCell<napi_extended_error_info>,
  pub last_exception: RefCell<Option<Value>>,
  pub instance_data: RefCell<Option<InstanceData>>,
  /// References without finalizers, in creation order.
  pub reflist: RefCell<Vec<u32>>,
  /// References carrying finalizer records; torn down first, LIFO.
  pub finalizing_reflist: RefCell<Vec<u32>>,
  pub finalizers: RefCell<FinalizerTable>,
  pub pending_finalizers: PendingQueue,
  cleanup_hooks: RefCell<Vec<CleanupHook>>,
  pub external_memory: Cell<i64>,
  pub destroying: Cell<bool>,
}

impl Env {
  pub fn new(id: usize) -> Rc<Env> {
    Rc::new(Env {
      id,
      open_handle_scopes: Cell::new(0),
      last_error: RefCell::new(LastError::default()),
      error_info: RefCell::new(napi_extended_error_info {
        error_message: std::ptr::null(),
        engine_reserved: std::ptr::null_mut(),
        engine_error_code: 0,
        error_code: napi_ok,
      }),
      last_exception: RefCell::new(None),
      instance_data: RefCell::new(None),
      reflist: RefCell::new(Vec::new()),
      finalizing_reflist: RefCell::new(Vec::new()),
      finalizers: RefCell::new(FinalizerTable::default()),
      pending_finalizers: Rc::new(RefCell::new(VecDeque::new())),
      cleanup_hooks: RefCell::new(Vec::new()),
      external_memory: Cell::new(0),
      destroying: Cell::new(false),
    })
  }

  pub fn clear_last_error(&self) {
    let mut last = self.last_error.borrow_mut();
    last.error_code = napi_ok;
    last.engine_error_code = 0;
  }

  pub fn set_last_error(&self, status: napi_status) {
    let mut last = self.last_error.borrow_mut();
    last.error_code = status;
    last.engine_error_code = 0;
  }

  pub fn last_error_code(&self) -> napi_status {
    self.last_error.borrow().error_code
  }

  /// Refreshes and returns the env-owned extended error info. The pointer
  /// stays valid as long as the environment does.
  pub fn error_info_ptr(&self) -> *const napi_extended_error_info {
    let last = self.last_error.borrow();
    let mut info = self.error_info.borrow_mut();
    info.error_code = last.error_code;
    info.engine_error_code = last.engine_error_code;
    info.engine_reserved = std::ptr::null_mut();
    info.error_message = if last.error_code == napi_ok {
      std::ptr::null()
    } else {
      error_message(last.error_code).as_ptr()
    };
    self.error_info.as_ptr()
  }

  pub fn has_pending_exception(&self) -> bool {
    self.last_exception.borrow().is_some()
  }

  pub fn throw(&self, error: Value) {
    *self.last_exception.borrow_mut() = Some(error);
  }

  pub fn take_exception(&self) -> Option<Value> {
    self.last_exception.borrow_mut().take()
  }

  pub fn add_finalizer_record(&self, record: FinalizerRecord) -> u32 {
    self.finalizers.borrow_mut().insert(record)
  }

  pub fn take_finalizer_record(&self, id: u32) -> Option<FinalizerRecord> {
    self.finalizers.borrow_mut().take(id)
  }

  pub fn add_cleanup_hook(
    &self,
    hook: napi_cleanup_hook,
    arg: *mut c_void,
  ) -> Result {
    let mut hooks = self.cleanup_hooks.borrow_mut();
    if hooks
      .iter()
      .any(|h| h.hook == hook && h.arg == arg)
    {
      log::warn!("env {}: cleanup hook registered twice", self.id);
      return Err(Error::GenericFailure);
    }
    hooks.push(CleanupHook { hook, arg });
    Ok(())
  }

  pub fn remove_cleanup_hook(
    &self,
    hook: napi_cleanup_hook,
    arg: *mut c_void,
  ) -> Result {
    let mut hooks = self.cleanup_hooks.borrow_mut();
    // Removal walks back-to-front, matching the LIFO drain order.
    match hooks
      .iter()
      .rposition(|h| h.hook == hook && h.arg == arg)
    {
      Some(index) => {
        hooks.remove(index);
        Ok(())
      }
      None => Err(Error::GenericFailure),
    }
  }

  /// Runs cleanup hooks LIFO. A hook may remove other hooks; re-checking
  /// membership before each call honors that.
  pub fn drain_cleanup_hooks(&self) {
    loop {
      let next = self.cleanup_hooks.borrow_mut().pop();
      let Some(hook) = next else {
        break;
      };
      // SAFETY: registered by the add-on through the ABI; the add-on
      // guarantees the pointer outlives the environment.
      unsafe { (hook.hook)(hook.arg) };
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn last_error_tracks_status_and_message() {
    let env = Env::new(1);
    env.set_last_error(napi_invalid_arg);
    assert_eq!(env.last_error_code(), napi_invalid_arg);
    let info = env.error_info_ptr();
    // SAFETY: pointer into env-owned storage refreshed above.
    let info = unsafe { &*info };
    assert_eq!(info.error_code, napi_invalid_arg);
    assert!(!info.error_message.is_null());
    env.clear_last_error();
    assert_eq!(env.last_error_code(), napi_ok);
  }

  #[test]
  fn duplicate_cleanup_hook_is_rejected() {
    unsafe extern "C" fn hook(_arg: *mut c_void) {}
    let env = Env::new(1);
    env.add_cleanup_hook(hook, std::ptr::null_mut()).unwrap();
    assert!(env.add_cleanup_hook(hook, std::ptr::null_mut()).is_err());
    env.remove_cleanup_hook(hook, std::ptr::null_mut()).unwrap();
    env.add_cleanup_hook(hook, std::ptr::null_mut()).unwrap();
  }
}
