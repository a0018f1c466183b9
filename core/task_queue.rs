// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Multi-producer task queue drained on the host thread. Producer threads
//! (thread-safe function callers, async-work workers) post closures; the
//! host thread pumps them between turns. Multiple wake-ups coalesce into
//! however many tasks are queued when the pump runs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Condvar;
use parking_lot::Mutex;

pub type HostTask = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
pub struct TaskQueue {
  tasks: Mutex<VecDeque<HostTask>>,
  wakeup: Condvar,
}

impl TaskQueue {
  pub fn new() -> Arc<TaskQueue> {
    Arc::new(TaskQueue::default())
  }

  /// Any thread.
  pub fn post(&self, task: HostTask) {
    self.tasks.lock().push_back(task);
    self.wakeup.notify_one();
  }

  /// Host thread only: run everything queued right now. Tasks posted while
  /// draining run too. Returns how many tasks ran.
  pub fn run_until_idle(&self) -> usize {
    let mut ran = 0;
    loop {
      let task = self.tasks.lock().pop_front();
      match task {
        Some(task) => {
          task();
          ran += 1;
        }
        None => return ran,
      }
    }
  }

  /// Host thread only: block until at least one task is available or the
  /// timeout elapses, then drain. Returns how many tasks ran.
  pub fn wait_and_run(&self, timeout: Duration) -> usize {
    {
      let mut tasks = self.tasks.lock();
      if tasks.is_empty() {
        self.wakeup.wait_for(&mut tasks, timeout);
      }
    }
    self.run_until_idle()
  }

  pub fn is_empty(&self) -> bool {
    self.tasks.lock().is_empty()
  }
}
