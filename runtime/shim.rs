// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! The symbol shim: every `napi_*` symbol an add-on can import, exported as
//! a C function that forwards through one function-pointer table. The table
//! address is installed once at startup via `napi_host_set_function_table`
//! and read-only afterwards; the table layout is private to this crate and
//! never part of the external contract.
//!
//! Forwarder contract: null table pointer -> `napi_generic_failure`; absent
//! slot -> the per-symbol default (`false` for predicates, identity
//! comparison for strict-equals, `napi_generic_failure` for producers).
//! Symbols with no runtime semantics get tiny defaults writing a non-null
//! sentinel so callers that check for error propagation stay satisfied.

#![allow(clippy::missing_safety_doc)]

use std::os::raw::c_char;
use std::os::raw::c_void;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering;

use napi_host_core::types::*;

static FUNCTION_TABLE: AtomicPtr<NapiFunctionTable> =
  AtomicPtr::new(std::ptr::null_mut());

/// Installs the slot table. Called once at startup by the runtime; the
/// name itself is incidental, only the shim and the runtime know it.
#[no_mangle]
pub unsafe extern "C" fn napi_host_set_function_table(
  table: *mut NapiFunctionTable,
) {
  FUNCTION_TABLE.store(table, Ordering::Release);
}

fn table() -> Option<&'static NapiFunctionTable> {
  let ptr = FUNCTION_TABLE.load(Ordering::Acquire);
  if ptr.is_null() {
    None
  } else {
    // SAFETY: install-once then read-only; the runtime hands over a
    // 'static table.
    Some(unsafe { &*ptr })
  }
}

// Sentinel target for the out-pointers of symbols that have no semantics
// here (uv loop, async contexts, callback scopes, async cleanup handles).
static SENTINEL: u8 = 0;

pub(crate) fn sentinel_ptr() -> *mut c_void {
  &SENTINEL as *const u8 as *mut c_void
}

macro_rules! napi_symbols {
  ($(
    fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(=> $default:expr)?;
  )*) => {
    /// The private slot table. One field per exported symbol, same
    /// signature minus the forwarding.
    #[repr(C)]
    #[derive(Default)]
    pub struct NapiFunctionTable {
      $(pub $name: Option<unsafe extern "C" fn($($ty),*) -> napi_status>,)*
    }

    $(
      #[no_mangle]
      pub unsafe extern "C" fn $name($($arg: $ty),*) -> napi_status {
        let Some(table) = table() else {
          return napi_generic_failure;
        };
        match table.$name {
          Some(slot) => slot($($arg),*),
          None => napi_symbols!(@default $($default)? ; $($arg),*),
        }
      }
    )*
  };
  (@default ; $($arg:ident),*) => {{
    $(let _ = $arg;)*
    napi_generic_failure
  }};
  (@default $default:expr ; $($arg:ident),*) => { $default };
}

napi_symbols! {
  // Error handling
  fn napi_get_last_error_info(env: napi_env, result: *mut *const napi_extended_error_info);
  fn napi_throw(env: napi_env, error: napi_value);
  fn napi_throw_error(env: napi_env, code: *const c_char, msg: *const c_char);
  fn napi_throw_type_error(env: napi_env, code: *const c_char, msg: *const c_char);
  fn napi_throw_range_error(env: napi_env, code: *const c_char, msg: *const c_char);
  fn napi_create_error(env: napi_env, code: napi_value, msg: napi_value, result: *mut napi_value);
  fn napi_create_type_error(env: napi_env, code: napi_value, msg: napi_value, result: *mut napi_value);
  fn napi_create_range_error(env: napi_env, code: napi_value, msg: napi_value, result: *mut napi_value);
  fn napi_is_error(env: napi_env, value: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_is_exception_pending(env: napi_env, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_get_and_clear_last_exception(env: napi_env, result: *mut napi_value);
  fn napi_fatal_exception(env: napi_env, err: napi_value);

  // Singletons and primitive creation
  fn napi_get_undefined(env: napi_env, result: *mut napi_value);
  fn napi_get_null(env: napi_env, result: *mut napi_value);
  fn napi_get_global(env: napi_env, result: *mut napi_value);
  fn napi_get_boolean(env: napi_env, value: bool, result: *mut napi_value);
  fn napi_create_object(env: napi_env, result: *mut napi_value);
  fn napi_create_array(env: napi_env, result: *mut napi_value);
  fn napi_create_array_with_length(env: napi_env, length: usize, result: *mut napi_value);
  fn napi_create_double(env: napi_env, value: f64, result: *mut napi_value);
  fn napi_create_int32(env: napi_env, value: i32, result: *mut napi_value);
  fn napi_create_uint32(env: napi_env, value: u32, result: *mut napi_value);
  fn napi_create_int64(env: napi_env, value: i64, result: *mut napi_value);
  fn napi_create_string_latin1(env: napi_env, string: *const c_char, length: usize, result: *mut napi_value);
  fn napi_create_string_utf8(env: napi_env, string: *const c_char, length: usize, result: *mut napi_value);
  fn napi_create_string_utf16(env: napi_env, string: *const u16, length: usize, result: *mut napi_value);
  fn napi_create_symbol(env: napi_env, description: napi_value, result: *mut napi_value);
  fn napi_create_date(env: napi_env, time: f64, result: *mut napi_value);
  fn napi_create_bigint_int64(env: napi_env, value: i64, result: *mut napi_value);
  fn napi_create_bigint_uint64(env: napi_env, value: u64, result: *mut napi_value);
  fn napi_create_bigint_words(env: napi_env, sign_bit: i32, word_count: usize, words: *const u64, result: *mut napi_value);

  // Value inspection and extraction
  fn napi_typeof(env: napi_env, value: napi_value, result: *mut napi_valuetype);
  fn napi_get_value_double(env: napi_env, value: napi_value, result: *mut f64);
  fn napi_get_value_int32(env: napi_env, value: napi_value, result: *mut i32);
  fn napi_get_value_uint32(env: napi_env, value: napi_value, result: *mut u32);
  fn napi_get_value_int64(env: napi_env, value: napi_value, result: *mut i64);
  fn napi_get_value_bool(env: napi_env, value: napi_value, result: *mut bool);
  fn napi_get_value_string_latin1(env: napi_env, value: napi_value, buf: *mut c_char, bufsize: usize, result: *mut usize);
  fn napi_get_value_string_utf8(env: napi_env, value: napi_value, buf: *mut c_char, bufsize: usize, result: *mut usize);
  fn napi_get_value_string_utf16(env: napi_env, value: napi_value, buf: *mut u16, bufsize: usize, result: *mut usize);
  fn napi_get_value_external(env: napi_env, value: napi_value, result: *mut *mut c_void);
  fn napi_get_value_bigint_int64(env: napi_env, value: napi_value, result: *mut i64, lossless: *mut bool);
  fn napi_get_value_bigint_uint64(env: napi_env, value: napi_value, result: *mut u64, lossless: *mut bool);
  fn napi_get_value_bigint_words(env: napi_env, value: napi_value, sign_bit: *mut i32, word_count: *mut usize, words: *mut u64);
  fn napi_get_date_value(env: napi_env, value: napi_value, result: *mut f64);
  fn napi_is_array(env: napi_env, value: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_is_arraybuffer(env: napi_env, value: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_is_typedarray(env: napi_env, value: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_is_dataview(env: napi_env, value: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_is_buffer(env: napi_env, value: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_is_date(env: napi_env, value: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_is_promise(env: napi_env, value: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_strict_equals(env: napi_env, lhs: napi_value, rhs: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = lhs == rhs; } napi_ok };
  fn napi_instanceof(env: napi_env, object: napi_value, constructor: napi_value, result: *mut bool);

  // Coercions
  fn napi_coerce_to_bool(env: napi_env, value: napi_value, result: *mut napi_value);
  fn napi_coerce_to_number(env: napi_env, value: napi_value, result: *mut napi_value);
  fn napi_coerce_to_object(env: napi_env, value: napi_value, result: *mut napi_value);
  fn napi_coerce_to_string(env: napi_env, value: napi_value, result: *mut napi_value);

  // Properties
  fn napi_get_prototype(env: napi_env, object: napi_value, result: *mut napi_value);
  fn napi_get_property_names(env: napi_env, object: napi_value, result: *mut napi_value);
  fn napi_get_all_property_names(env: napi_env, object: napi_value, key_mode: napi_key_collection_mode, key_filter: napi_key_filter, key_conversion: napi_key_conversion, result: *mut napi_value);
  fn napi_set_property(env: napi_env, object: napi_value, key: napi_value, value: napi_value);
  fn napi_has_property(env: napi_env, object: napi_value, key: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_get_property(env: napi_env, object: napi_value, key: napi_value, result: *mut napi_value);
  fn napi_delete_property(env: napi_env, object: napi_value, key: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = true; } napi_ok };
  fn napi_has_own_property(env: napi_env, object: napi_value, key: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_set_named_property(env: napi_env, object: napi_value, utf8name: *const c_char, value: napi_value);
  fn napi_has_named_property(env: napi_env, object: napi_value, utf8name: *const c_char, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_get_named_property(env: napi_env, object: napi_value, utf8name: *const c_char, result: *mut napi_value);
  fn napi_set_element(env: napi_env, object: napi_value, index: u32, value: napi_value);
  fn napi_has_element(env: napi_env, object: napi_value, index: u32, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_get_element(env: napi_env, object: napi_value, index: u32, result: *mut napi_value);
  fn napi_delete_element(env: napi_env, object: napi_value, index: u32, result: *mut bool)
    => { if !result.is_null() { *result = true; } napi_ok };
  fn napi_define_properties(env: napi_env, object: napi_value, property_count: usize, properties: *const napi_property_descriptor);
  fn napi_get_array_length(env: napi_env, value: napi_value, result: *mut u32);
  fn napi_object_freeze(env: napi_env, object: napi_value);
  fn napi_object_seal(env: napi_env, object: napi_value);
  fn napi_type_tag_object(env: napi_env, value: napi_value, type_tag: *const napi_type_tag);
  fn napi_check_object_type_tag(env: napi_env, value: napi_value, type_tag: *const napi_type_tag, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };

  // Functions, classes, wraps
  fn napi_create_function(env: napi_env, utf8name: *const c_char, length: usize, cb: napi_callback, data: *mut c_void, result: *mut napi_value);
  fn napi_call_function(env: napi_env, recv: napi_value, func: napi_value, argc: usize, argv: *const napi_value, result: *mut napi_value);
  fn napi_new_instance(env: napi_env, constructor: napi_value, argc: usize, argv: *const napi_value, result: *mut napi_value);
  fn napi_get_cb_info(env: napi_env, cbinfo: napi_callback_info, argc: *mut usize, argv: *mut napi_value, this_arg: *mut napi_value, data: *mut *mut c_void);
  fn napi_get_new_target(env: napi_env, cbinfo: napi_callback_info, result: *mut napi_value);
  fn napi_define_class(env: napi_env, utf8name: *const c_char, length: usize, constructor: napi_callback, data: *mut c_void, property_count: usize, properties: *const napi_property_descriptor, result: *mut napi_value);
  fn napi_wrap(env: napi_env, js_object: napi_value, native_object: *mut c_void, finalize_cb: Option<napi_finalize>, finalize_hint: *mut c_void, result: *mut napi_ref);
  fn napi_unwrap(env: napi_env, js_object: napi_value, result: *mut *mut c_void);
  fn napi_remove_wrap(env: napi_env, js_object: napi_value, result: *mut *mut c_void);
  fn napi_create_external(env: napi_env, data: *mut c_void, finalize_cb: Option<napi_finalize>, finalize_hint: *mut c_void, result: *mut napi_value);
  fn napi_add_finalizer(env: napi_env, js_object: napi_value, finalize_data: *mut c_void, finalize_cb: Option<napi_finalize>, finalize_hint: *mut c_void, result: *mut napi_ref);
  fn napi_make_callback(env: napi_env, async_context: napi_async_context, recv: napi_value, func: napi_value, argc: usize, argv: *const napi_value, result: *mut napi_value);

  // References and scopes
  fn napi_create_reference(env: napi_env, value: napi_value, initial_refcount: u32, result: *mut napi_ref);
  fn napi_delete_reference(env: napi_env, reference: napi_ref);
  fn napi_reference_ref(env: napi_env, reference: napi_ref, result: *mut u32);
  fn napi_reference_unref(env: napi_env, reference: napi_ref, result: *mut u32);
  fn napi_get_reference_value(env: napi_env, reference: napi_ref, result: *mut napi_value);
  fn napi_open_handle_scope(env: napi_env, result: *mut napi_handle_scope);
  fn napi_close_handle_scope(env: napi_env, scope: napi_handle_scope);
  fn napi_open_escapable_handle_scope(env: napi_env, result: *mut napi_escapable_handle_scope);
  fn napi_close_escapable_handle_scope(env: napi_env, scope: napi_escapable_handle_scope);
  fn napi_escape_handle(env: napi_env, scope: napi_escapable_handle_scope, escapee: napi_value, result: *mut napi_value);

  // Buffers and views
  fn napi_is_detached_arraybuffer(env: napi_env, value: napi_value, result: *mut bool)
    => { if !result.is_null() { *result = false; } napi_ok };
  fn napi_detach_arraybuffer(env: napi_env, arraybuffer: napi_value);
  fn napi_create_arraybuffer(env: napi_env, byte_length: usize, data: *mut *mut c_void, result: *mut napi_value);
  fn napi_create_external_arraybuffer(env: napi_env, external_data: *mut c_void, byte_length: usize, finalize_cb: Option<napi_finalize>, finalize_hint: *mut c_void, result: *mut napi_value);
  fn napi_get_arraybuffer_info(env: napi_env, arraybuffer: napi_value, data: *mut *mut c_void, byte_length: *mut usize);
  fn napi_create_typedarray(env: napi_env, array_type: napi_typedarray_type, length: usize, arraybuffer: napi_value, byte_offset: usize, result: *mut napi_value);
  fn napi_get_typedarray_info(env: napi_env, typedarray: napi_value, array_type: *mut napi_typedarray_type, length: *mut usize, data: *mut *mut c_void, arraybuffer: *mut napi_value, byte_offset: *mut usize);
  fn napi_create_dataview(env: napi_env, byte_length: usize, arraybuffer: napi_value, byte_offset: usize, result: *mut napi_value);
  fn napi_get_dataview_info(env: napi_env, dataview: napi_value, byte_length: *mut usize, data: *mut *mut c_void, arraybuffer: *mut napi_value, byte_offset: *mut usize);
  fn napi_create_buffer(env: napi_env, size: usize, data: *mut *mut c_void, result: *mut napi_value);
  fn napi_create_external_buffer(env: napi_env, length: usize, data: *mut c_void, finalize_cb: Option<napi_finalize>, finalize_hint: *mut c_void, result: *mut napi_value);
  fn napi_create_buffer_copy(env: napi_env, length: usize, data: *const c_void, result_data: *mut *mut c_void, result: *mut napi_value);
  fn napi_get_buffer_info(env: napi_env, value: napi_value, data: *mut *mut c_void, length: *mut usize);

  // Promises
  fn napi_create_promise(env: napi_env, deferred: *mut napi_deferred, promise: *mut napi_value);
  fn napi_resolve_deferred(env: napi_env, deferred: napi_deferred, resolution: napi_value);
  fn napi_reject_deferred(env: napi_env, deferred: napi_deferred, rejection: napi_value);

  // Environment
  fn napi_get_version(env: napi_env, result: *mut u32)
    => { if !result.is_null() { *result = NAPI_VERSION; } napi_ok };
  fn napi_get_node_version(env: napi_env, result: *mut *const napi_node_version);
  fn napi_adjust_external_memory(env: napi_env, change_in_bytes: i64, adjusted_value: *mut i64);
  fn napi_set_instance_data(env: napi_env, data: *mut c_void, finalize_cb: Option<napi_finalize>, finalize_hint: *mut c_void);
  fn napi_get_instance_data(env: napi_env, data: *mut *mut c_void);
  fn napi_add_env_cleanup_hook(env: napi_env, hook: Option<napi_cleanup_hook>, arg: *mut c_void);
  fn napi_remove_env_cleanup_hook(env: napi_env, hook: Option<napi_cleanup_hook>, arg: *mut c_void);
  fn napi_module_register(module: *mut c_void)
    => { let _ = module; napi_ok };

  // No runtime semantics: succeed with a non-null sentinel where an output
  // pointer exists, so error-propagation checks in add-ons stay happy.
  fn napi_async_init(env: napi_env, async_resource: napi_value, async_resource_name: napi_value, result: *mut napi_async_context)
    => { if !result.is_null() { *result = crate::shim::sentinel_ptr(); } napi_ok };
  fn napi_async_destroy(env: napi_env, async_context: napi_async_context)
    => { let _ = (env, async_context); napi_ok };
  fn napi_open_callback_scope(env: napi_env, resource_object: napi_value, context: napi_async_context, result: *mut napi_callback_scope)
    => { if !result.is_null() { *result = crate::shim::sentinel_ptr(); } napi_ok };
  fn napi_close_callback_scope(env: napi_env, scope: napi_callback_scope)
    => { let _ = (env, scope); napi_ok };
  fn napi_get_uv_event_loop(env: napi_env, uv_loop: *mut *mut c_void)
    => { if !uv_loop.is_null() { *uv_loop = crate::shim::sentinel_ptr(); } napi_ok };
  fn napi_add_async_cleanup_hook(env: napi_env, hook: Option<napi_async_cleanup_hook>, arg: *mut c_void, remove_handle: *mut napi_async_cleanup_hook_handle)
    => { if !remove_handle.is_null() { *remove_handle = crate::shim::sentinel_ptr(); } napi_ok };
  fn napi_remove_async_cleanup_hook(remove_handle: napi_async_cleanup_hook_handle)
    => { let _ = remove_handle; napi_ok };

  // No script engine: these keep the blanket producer default.
  fn napi_run_script(env: napi_env, script: napi_value, result: *mut napi_value);

  // Async work
  fn napi_create_async_work(env: napi_env, async_resource: napi_value, async_resource_name: napi_value, execute: Option<napi_async_execute_callback>, complete: Option<napi_async_complete_callback>, data: *mut c_void, result: *mut napi_async_work);
  fn napi_delete_async_work(env: napi_env, work: napi_async_work);
  fn napi_queue_async_work(env: napi_env, work: napi_async_work);
  fn napi_cancel_async_work(env: napi_env, work: napi_async_work);

  // Thread-safe functions
  fn napi_create_threadsafe_function(env: napi_env, func: napi_value, async_resource: napi_value, async_resource_name: napi_value, max_queue_size: usize, initial_thread_count: usize, thread_finalize_data: *mut c_void, thread_finalize_cb: Option<napi_finalize>, context: *mut c_void, call_js_cb: Option<napi_threadsafe_function_call_js>, result: *mut napi_threadsafe_function);
  fn napi_get_threadsafe_function_context(func: napi_threadsafe_function, result: *mut *mut c_void);
  fn napi_call_threadsafe_function(func: napi_threadsafe_function, data: *mut c_void, is_blocking: napi_threadsafe_function_call_mode);
  fn napi_acquire_threadsafe_function(func: napi_threadsafe_function);
  fn napi_release_threadsafe_function(func: napi_threadsafe_function, mode: napi_threadsafe_function_release_mode);
  fn napi_unref_threadsafe_function(env: napi_env, func: napi_threadsafe_function);
  fn napi_ref_threadsafe_function(env: napi_env, func: napi_threadsafe_function);
}

/// Fatal errors log and return instead of aborting; survivability is the
/// policy here. Hand-written because the symbol returns nothing.
#[no_mangle]
pub unsafe extern "C" fn napi_fatal_error(
  location: *const c_char,
  location_len: isize,
  message: *const c_char,
  message_len: isize,
) {
  let read = |ptr: *const c_char, len: isize| -> String {
    if ptr.is_null() {
      return String::new();
    }
    if len < 0 {
      std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
    } else {
      let bytes = std::slice::from_raw_parts(ptr as *const u8, len as usize);
      String::from_utf8_lossy(bytes).into_owned()
    }
  };
  let location = read(location, location_len);
  let message = read(message, message_len);
  if location.is_empty() {
    log::error!("napi_fatal_error: {}", message);
  } else {
    log::error!("napi_fatal_error at {}: {}", location, message);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn null_table_fails_closed() {
    // The install in other tests may have run; force the uninstalled view
    // by reading the default-constructed table instead.
    let empty = NapiFunctionTable::default();
    assert!(empty.napi_get_undefined.is_none());
  }

  #[test]
  fn sentinel_is_non_null() {
    assert!(!sentinel_ptr().is_null());
  }
}
