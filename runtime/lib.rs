// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! The ABI surface of the NAPI host runtime. `install()` wires every
//! implemented slot into the shim's function table; `Registration` is the
//! contract handed to the (external) shared-library loader: an environment,
//! an empty exports object, and a way to collect the exports afterwards.

#![allow(clippy::missing_safety_doc)]

use std::rc::Rc;
use std::sync::Once;

use once_cell::sync::Lazy;

pub mod async_work;
pub mod env_api;
pub mod js_native_api;
pub mod shim;
pub mod threadsafe_functions;
pub(crate) mod util;

pub use napi_host_core::types;
pub use napi_host_core::types::napi_addon_register_func;
pub use napi_host_core::types::napi_env;
pub use napi_host_core::types::napi_value;
pub use napi_host_core::CallError;
pub use napi_host_core::Context;
pub use napi_host_core::Env;
pub use napi_host_core::Error;
pub use napi_host_core::Obj;
pub use napi_host_core::ObjKind;
pub use napi_host_core::PromiseState;
pub use napi_host_core::Result;
pub use napi_host_core::Value;

static TABLE: Lazy<shim::NapiFunctionTable> = Lazy::new(build_table);
static INSTALL: Once = Once::new();

/// Installs the slot table into the shim. Idempotent; every entry path
/// (`Registration::new`, embedders) calls it.
pub fn install() {
  INSTALL.call_once(|| {
    // SAFETY: the table is 'static and never mutated after this point.
    unsafe {
      shim::napi_host_set_function_table(
        &*TABLE as *const shim::NapiFunctionTable as *mut _,
      );
    }
    log::debug!("napi function table installed");
  });
}

fn build_table() -> shim::NapiFunctionTable {
  use crate::async_work as aw;
  use crate::env_api as ea;
  use crate::js_native_api as js;
  use crate::threadsafe_functions as ts;

  shim::NapiFunctionTable {
    // Errors and exceptions
    napi_get_last_error_info: Some(ea::napi_get_last_error_info),
    napi_throw: Some(js::napi_throw),
    napi_throw_error: Some(js::napi_throw_error),
    napi_throw_type_error: Some(js::napi_throw_type_error),
    napi_throw_range_error: Some(js::napi_throw_range_error),
    napi_create_error: Some(js::napi_create_error),
    napi_create_type_error: Some(js::napi_create_type_error),
    napi_create_range_error: Some(js::napi_create_range_error),
    napi_is_error: Some(js::napi_is_error),
    napi_is_exception_pending: Some(js::napi_is_exception_pending),
    napi_get_and_clear_last_exception: Some(
      js::napi_get_and_clear_last_exception,
    ),
    napi_fatal_exception: Some(ea::napi_fatal_exception),

    // Singletons and value creation
    napi_get_undefined: Some(js::napi_get_undefined),
    napi_get_null: Some(js::napi_get_null),
    napi_get_global: Some(js::napi_get_global),
    napi_get_boolean: Some(js::napi_get_boolean),
    napi_create_object: Some(js::napi_create_object),
    napi_create_array: Some(js::napi_create_array),
    napi_create_array_with_length: Some(js::napi_create_array_with_length),
    napi_create_double: Some(js::napi_create_double),
    napi_create_int32: Some(js::napi_create_int32),
    napi_create_uint32: Some(js::napi_create_uint32),
    napi_create_int64: Some(js::napi_create_int64),
    napi_create_string_latin1: Some(js::napi_create_string_latin1),
    napi_create_string_utf8: Some(js::napi_create_string_utf8),
    napi_create_string_utf16: Some(js::napi_create_string_utf16),
    napi_create_symbol: Some(js::napi_create_symbol),
    napi_create_date: Some(js::napi_create_date),
    napi_create_bigint_int64: Some(js::napi_create_bigint_int64),
    napi_create_bigint_uint64: Some(js::napi_create_bigint_uint64),
    napi_create_bigint_words: Some(js::napi_create_bigint_words),

    // Inspection and extraction
    napi_typeof: Some(js::napi_typeof),
    napi_get_value_double: Some(js::napi_get_value_double),
    napi_get_value_int32: Some(js::napi_get_value_int32),
    napi_get_value_uint32: Some(js::napi_get_value_uint32),
    napi_get_value_int64: Some(js::napi_get_value_int64),
    napi_get_value_bool: Some(js::napi_get_value_bool),
    napi_get_value_string_latin1: Some(js::napi_get_value_string_latin1),
    napi_get_value_string_utf8: Some(js::napi_get_value_string_utf8),
    napi_get_value_string_utf16: Some(js::napi_get_value_string_utf16),
    napi_get_value_external: Some(js::napi_get_value_external),
    napi_get_value_bigint_int64: Some(js::napi_get_value_bigint_int64),
    napi_get_value_bigint_uint64: Some(js::napi_get_value_bigint_uint64),
    napi_get_value_bigint_words: Some(js::napi_get_value_bigint_words),
    napi_get_date_value: Some(js::napi_get_date_value),
    napi_is_array: Some(js::napi_is_array),
    napi_is_arraybuffer: Some(js::napi_is_arraybuffer),
    napi_is_typedarray: Some(js::napi_is_typedarray),
    napi_is_dataview: Some(js::napi_is_dataview),
    napi_is_buffer: Some(js::napi_is_buffer),
    napi_is_date: Some(js::napi_is_date),
    napi_is_promise: Some(js::napi_is_promise),
    napi_strict_equals: Some(js::napi_strict_equals),
    napi_instanceof: Some(js::napi_instanceof),

    // Coercions
    napi_coerce_to_bool: Some(js::napi_coerce_to_bool),
    napi_coerce_to_number: Some(js::napi_coerce_to_number),
    napi_coerce_to_object: Some(js::napi_coerce_to_object),
    napi_coerce_to_string: Some(js::napi_coerce_to_string),

    // Properties
    napi_get_prototype: Some(js::napi_get_prototype),
    napi_get_property_names: Some(js::napi_get_property_names),
    napi_get_all_property_names: Some(js::napi_get_all_property_names),
    napi_set_property: Some(js::napi_set_property),
    napi_has_property: Some(js::napi_has_property),
    napi_get_property: Some(js::napi_get_property),
    napi_delete_property: Some(js::napi_delete_property),
    napi_has_own_property: Some(js::napi_has_own_property),
    napi_set_named_property: Some(js::napi_set_named_property),
    napi_has_named_property: Some(js::napi_has_named_property),
    napi_get_named_property: Some(js::napi_get_named_property),
    napi_set_element: Some(js::napi_set_element),
    napi_has_element: Some(js::napi_has_element),
    napi_get_element: Some(js::napi_get_element),
    napi_delete_element: Some(js::napi_delete_element),
    napi_define_properties: Some(js::napi_define_properties),
    napi_get_array_length: Some(js::napi_get_array_length),
    napi_object_freeze: Some(js::napi_object_freeze),
    napi_object_seal: Some(js::napi_object_seal),
    napi_type_tag_object: Some(js::napi_type_tag_object),
    napi_check_object_type_tag: Some(js::napi_check_object_type_tag),

    // Functions, classes, wraps
    napi_create_function: Some(js::napi_create_function),
    napi_call_function: Some(js::napi_call_function),
    napi_new_instance: Some(js::napi_new_instance),
    napi_get_cb_info: Some(js::napi_get_cb_info),
    napi_get_new_target: Some(js::napi_get_new_target),
    napi_define_class: Some(js::napi_define_class),
    napi_wrap: Some(js::napi_wrap),
    napi_unwrap: Some(js::napi_unwrap),
    napi_remove_wrap: Some(js::napi_remove_wrap),
    napi_create_external: Some(js::napi_create_external),
    napi_add_finalizer: Some(js::napi_add_finalizer),
    napi_make_callback: Some(js::napi_make_callback),

    // References and scopes
    napi_create_reference: Some(js::napi_create_reference),
    napi_delete_reference: Some(js::napi_delete_reference),
    napi_reference_ref: Some(js::napi_reference_ref),
    napi_reference_unref: Some(js::napi_reference_unref),
    napi_get_reference_value: Some(js::napi_get_reference_value),
    napi_open_handle_scope: Some(js::napi_open_handle_scope),
    napi_close_handle_scope: Some(js::napi_close_handle_scope),
    napi_open_escapable_handle_scope: Some(
      js::napi_open_escapable_handle_scope,
    ),
    napi_close_escapable_handle_scope: Some(
      js::napi_close_escapable_handle_scope,
    ),
    napi_escape_handle: Some(js::napi_escape_handle),

    // Buffers and views
    napi_is_detached_arraybuffer: Some(js::napi_is_detached_arraybuffer),
    napi_detach_arraybuffer: Some(js::napi_detach_arraybuffer),
    napi_create_arraybuffer: Some(js::napi_create_arraybuffer),
    napi_create_external_arraybuffer: Some(
      js::napi_create_external_arraybuffer,
    ),
    napi_get_arraybuffer_info: Some(js::napi_get_arraybuffer_info),
    napi_create_typedarray: Some(js::napi_create_typedarray),
    napi_get_typedarray_info: Some(js::napi_get_typedarray_info),
    napi_create_dataview: Some(js::napi_create_dataview),
    napi_get_dataview_info: Some(js::napi_get_dataview_info),
    napi_create_buffer: Some(js::napi_create_buffer),
    napi_create_external_buffer: Some(js::napi_create_external_buffer),
    napi_create_buffer_copy: Some(js::napi_create_buffer_copy),
    napi_get_buffer_info: Some(js::napi_get_buffer_info),

    // Promises
    napi_create_promise: Some(js::napi_create_promise),
    napi_resolve_deferred: Some(js::napi_resolve_deferred),
    napi_reject_deferred: Some(js::napi_reject_deferred),

    // Environment
    napi_get_version: Some(ea::napi_get_version),
    napi_get_node_version: Some(ea::napi_get_node_version),
    napi_adjust_external_memory: Some(js::napi_adjust_external_memory),
    napi_set_instance_data: Some(js::napi_set_instance_data),
    napi_get_instance_data: Some(js::napi_get_instance_data),
    napi_add_env_cleanup_hook: Some(ea::napi_add_env_cleanup_hook),
    napi_remove_env_cleanup_hook: Some(ea::napi_remove_env_cleanup_hook),

    // Async work
    napi_create_async_work: Some(aw::napi_create_async_work),
    napi_delete_async_work: Some(aw::napi_delete_async_work),
    napi_queue_async_work: Some(aw::napi_queue_async_work),
    napi_cancel_async_work: Some(aw::napi_cancel_async_work),

    // Thread-safe functions
    napi_create_threadsafe_function: Some(ts::napi_create_threadsafe_function),
    napi_get_threadsafe_function_context: Some(
      ts::napi_get_threadsafe_function_context,
    ),
    napi_call_threadsafe_function: Some(ts::napi_call_threadsafe_function),
    napi_acquire_threadsafe_function: Some(
      ts::napi_acquire_threadsafe_function,
    ),
    napi_release_threadsafe_function: Some(
      ts::napi_release_threadsafe_function,
    ),
    napi_unref_threadsafe_function: Some(ts::napi_unref_threadsafe_function),
    napi_ref_threadsafe_function: Some(ts::napi_ref_threadsafe_function),

    // Everything else keeps its shim default: the no-semantics sentinels
    // (async contexts, callback scopes, uv loop, async cleanup hooks,
    // module registration) and the script-engine symbols.
    ..Default::default()
  }
}

/// The registration context the external loader works with: an opaque
/// environment handle, a pre-created empty exports object, and retrieval
/// of the final exports once the add-on's init has run.
pub struct Registration {
  ctx: Rc<Context>,
  env: Rc<Env>,
  scope: usize,
  exports: Rc<Obj>,
  exports_handle: napi_value,
}

impl Registration {
  #[allow(clippy::new_without_default)]
  pub fn new() -> Registration {
    install();
    let ctx = Context::current();
    let env = ctx.create_env();
    let scope = ctx.open_scope(&env);
    let exports = Obj::plain();
    let exports_handle =
      ctx.add_value(Value::Object(exports.clone())) as napi_value;
    Registration {
      ctx,
      env,
      scope,
      exports,
      exports_handle,
    }
  }

  pub fn env(&self) -> napi_env {
    self.env.id as napi_env
  }

  pub fn environment(&self) -> Rc<Env> {
    self.env.clone()
  }

  pub fn exports_handle(&self) -> napi_value {
    self.exports_handle
  }

  /// Convenience wrapper: invoke the add-on's registration entry point and
  /// collect the exports.
  ///
  /// # Safety
  ///
  /// `init` must be a genuine `napi_register_module_v1` implementation.
  pub unsafe fn register(self, init: napi_addon_register_func) -> Result<Value> {
    let ret = init(self.env(), self.exports_handle());
    self.finish(ret)
  }

  /// Consumes the returned handle (the add-on may return the same exports
  /// object or a replacement) and closes the registration scope.
  pub fn finish(self, ret: napi_value) -> Result<Value> {
    let exports = if ret.is_null() {
      Value::Object(self.exports.clone())
    } else {
      self
        .ctx
        .value_from_handle(ret)
        .unwrap_or(Value::Object(self.exports.clone()))
    };
    if let Some(exception) = self.env.take_exception() {
      log::warn!(
        "add-on registration threw: {}",
        exception.coerce_to_string()
      );
      self.ctx.close_scope(&self.env, self.scope)?;
      return Err(Error::PendingException);
    }
    self.ctx.close_scope(&self.env, self.scope)?;
    Ok(exports)
  }
}
