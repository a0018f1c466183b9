// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Strong/weak references and native finalizers.
//!
//! A finalizer is a record in the owning environment's table plus a guard
//! stored on the target object. Dropping the object's last `Rc` drops the
//! guard, which enqueues the record ID on the environment's pending queue;
//! the queue is drained on the host thread. Taking the record out of the
//! table is the only way to run or disarm it, so every finalizer runs at
//! most once no matter how many paths race to it.

use std::cell::Cell;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::os::raw::c_void;
use std::rc::Rc;
use std::rc::Weak;

use crate::types::napi_finalize;
use crate::value::Obj;
use crate::value::Value;

pub type PendingQueue = Rc<RefCell<VecDeque<u32>>>;

pub struct FinalizerRecord {
  pub cb: napi_finalize,
  pub data: *mut c_void,
  pub hint: *mut c_void,
}

impl std::fmt::Debug for FinalizerRecord {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FinalizerRecord")
      .field("data", &self.data)
      .field("hint", &self.hint)
      .finish()
  }
}

/// Slab of finalizer records owned by one environment.
#[derive(Debug, Default)]
pub struct FinalizerTable {
  records: Vec<Option<FinalizerRecord>>,
  free: Vec<u32>,
}

impl FinalizerTable {
  pub fn insert(&mut self, record: FinalizerRecord) -> u32 {
    if let Some(id) = self.free.pop() {
      self.records[id as usize] = Some(record);
      id
    } else {
      self.records.push(Some(record));
      (self.records.len() - 1) as u32
    }
  }

  /// Removes the record; `None` means it already ran or was disarmed.
  pub fn take(&mut self, id: u32) -> Option<FinalizerRecord> {
    let record = self.records.get_mut(id as usize)?.take();
    if record.is_some() {
      self.free.push(id);
    }
    record
  }
}

/// Dropped together with its target object; announces the death on the
/// pending queue. Whether anything happens then depends on whether the
/// record is still in the table.
#[derive(Debug)]
pub struct FinalizerGuard {
  queue: PendingQueue,
  record: u32,
}

impl FinalizerGuard {
  pub fn new(queue: PendingQueue, record: u32) -> FinalizerGuard {
    FinalizerGuard { queue, record }
  }
}

impl Drop for FinalizerGuard {
  fn drop(&mut self) {
    self.queue.borrow_mut().push_back(self.record);
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
  /// Deleted by the runtime once the finalizer has run.
  Runtime,
  /// The add-on must call napi_delete_reference itself.
  Userland,
}

#[derive(Debug)]
enum RefValue {
  Strong(Value),
  Weak(Weak<Obj>),
  Empty,
}

/// A persistent pin on a value. Refcount > 0 retains the target; at zero
/// the target may be collected and reads yield the empty sentinel.
#[derive(Debug)]
pub struct Reference {
  pub id: u32,
  pub env_id: usize,
  value: RefCell<RefValue>,
  refcount: Cell<u32>,
  pub finalizer: Cell<Option<u32>>,
  pub ownership: Ownership,
}

impl Reference {
  pub fn new(
    id: u32,
    env_id: usize,
    value: Value,
    initial_refcount: u32,
    ownership: Ownership,
  ) -> Reference {
    let slot = if initial_refcount > 0 {
      RefValue::Strong(value)
    } else {
      Reference::downgrade(value)
    };
    Reference {
      id,
      env_id,
      value: RefCell::new(slot),
      refcount: Cell::new(initial_refcount),
      finalizer: Cell::new(None),
      ownership,
    }
  }

  // Primitives cannot be observed for collection, so a weak slot for one is
  // empty from the start.
  fn downgrade(value: Value) -> RefValue {
    match value {
      Value::Object(obj) => RefValue::Weak(Rc::downgrade(&obj)),
      _ => RefValue::Empty,
    }
  }

  pub fn refcount(&self) -> u32 {
    self.refcount.get()
  }

  pub fn ref_(&self) -> u32 {
    if self.get().is_none() {
      return 0;
    }
    let count = self.refcount.get() + 1;
    self.refcount.set(count);
    if count == 1 {
      let upgraded = match &*self.value.borrow() {
        RefValue::Weak(weak) => weak.upgrade().map(Value::Object),
        _ => None,
      };
      if let Some(value) = upgraded {
        *self.value.borrow_mut() = RefValue::Strong(value);
      }
    }
    count
  }

  pub fn unref(&self) -> u32 {
    let count = self.refcount.get();
    if count == 0 || self.get().is_none() {
      return 0;
    }
    let count = count - 1;
    self.refcount.set(count);
    if count == 0 {
      let current = std::mem::replace(&mut *self.value.borrow_mut(), RefValue::Empty);
      let next = match current {
        RefValue::Strong(value) => Reference::downgrade(value),
        other => other,
      };
      *self.value.borrow_mut() = next;
    }
    count
  }

  /// The referenced value, or `None` once the target has been collected.
  pub fn get(&self) -> Option<Value> {
    let resolved = match &*self.value.borrow() {
      RefValue::Strong(value) => return Some(value.clone()),
      RefValue::Weak(weak) => weak.upgrade().map(Value::Object),
      RefValue::Empty => None,
    };
    if resolved.is_none() {
      *self.value.borrow_mut() = RefValue::Empty;
    }
    resolved
  }

  pub fn clear(&self) {
    *self.value.borrow_mut() = RefValue::Empty;
  }
}

/// Context-wide reference slab; IDs start at 1 so a null `napi_ref` is
/// never a valid reference.
#[derive(Default)]
pub struct RefStore {
  refs: Vec<Option<Rc<Reference>>>,
  free: Vec<u32>,
}

impl RefStore {
  pub fn insert(
    &mut self,
    env_id: usize,
    value: Value,
    initial_refcount: u32,
    ownership: Ownership,
  ) -> Rc<Reference> {
    let id = match self.free.pop() {
      Some(id) => id,
      None => {
        self.refs.push(None);
        self.refs.len() as u32
      }
    };
    let reference = Rc::new(Reference::new(
      id,
      env_id,
      value,
      initial_refcount,
      ownership,
    ));
    self.refs[(id - 1) as usize] = Some(reference.clone());
    reference
  }

  pub fn get(&self, id: u32) -> Option<Rc<Reference>> {
    if id == 0 {
      return None;
    }
    self.refs.get((id - 1) as usize).and_then(|r| r.clone())
  }

  pub fn remove(&mut self, id: u32) -> Option<Rc<Reference>> {
    if id == 0 {
      return None;
    }
    let slot = self.refs.get_mut((id - 1) as usize)?;
    let reference = slot.take();
    if reference.is_some() {
      self.free.push(id);
    }
    reference
  }
}
