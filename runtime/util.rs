// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

use std::borrow::Cow;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::rc::Rc;

use napi_host_core::types::*;
use napi_host_core::Context;
use napi_host_core::Env;
use napi_host_core::Error;
use napi_host_core::Obj;
use napi_host_core::Result;
use napi_host_core::Value;

macro_rules! check_arg {
  ($ptr:expr) => {
    if $ptr.is_null() {
      return Err(crate::Error::InvalidArg);
    }
  };
}
pub(crate) use check_arg;

/// Entry preamble: resolve the context and environment behind a raw
/// `napi_env`. A foreign thread gets a fresh, empty thread-local context
/// and therefore `InvalidArg` — which is exactly the contract.
pub fn env_ref(env: napi_env) -> Result<(Rc<Context>, Rc<Env>)> {
  let ctx = Context::current();
  let env = ctx.env_checked(env)?;
  Ok((ctx, env))
}

pub fn clear_last_error(env: napi_env) {
  if let Some(env) = Context::current().env(env) {
    env.clear_last_error();
  }
}

pub fn set_last_error(env: napi_env, status: napi_status) {
  if let Some(env) = Context::current().env(env) {
    env.set_last_error(status);
  }
}

/// Inverse of the `Error -> napi_status` mapping, for the few places that
/// route through another generated slot and get a raw status back.
pub fn status_error(status: napi_status) -> Error {
  match status {
    napi_invalid_arg => Error::InvalidArg,
    napi_object_expected => Error::ObjectExpected,
    napi_string_expected => Error::StringExpected,
    napi_name_expected => Error::NameExpected,
    napi_function_expected => Error::FunctionExpected,
    napi_number_expected => Error::NumberExpected,
    napi_boolean_expected => Error::BooleanExpected,
    napi_array_expected => Error::ArrayExpected,
    napi_pending_exception => Error::PendingException,
    napi_cancelled => Error::Cancelled,
    napi_escape_called_twice => Error::EscapeCalledTwice,
    napi_handle_scope_mismatch => Error::HandleScopeMismatch,
    napi_callback_scope_mismatch => Error::CallbackScopeMismatch,
    napi_queue_full => Error::QueueFull,
    napi_closing => Error::Closing,
    napi_bigint_expected => Error::BigintExpected,
    napi_date_expected => Error::DateExpected,
    napi_arraybuffer_expected => Error::ArrayBufferExpected,
    napi_detachable_arraybuffer_expected => {
      Error::DetachableArraybufferExpected
    }
    napi_would_deadlock => Error::WouldDeadlock,
    napi_no_external_buffers_allowed => Error::NoExternalBuffersAllowed,
    napi_cannot_run_js => Error::CannotRunJs,
    _ => Error::GenericFailure,
  }
}

pub fn check_pending(env: &Env) -> Result {
  if env.has_pending_exception() {
    return Err(Error::PendingException);
  }
  Ok(())
}

/// Stores a value and hands back its handle. Non-singleton values need an
/// open scope to own them.
pub fn add_value(ctx: &Context, env: &Env, value: Value) -> Result<usize> {
  let singleton = matches!(
    &value,
    Value::Undefined | Value::Null | Value::Bool(_)
  ) || matches!(&value, Value::Str(s) if s.is_empty());
  if !singleton && env.open_handle_scopes.get() == 0 {
    return Err(Error::HandleScopeMismatch);
  }
  Ok(ctx.add_value(value))
}

pub fn value_arg(ctx: &Context, handle: napi_value) -> Result<Value> {
  ctx.value_from_handle(handle).ok_or(Error::InvalidArg)
}

pub fn object_arg(ctx: &Context, handle: napi_value) -> Result<Rc<Obj>> {
  match value_arg(ctx, handle)? {
    Value::Object(obj) => Ok(obj),
    _ => Err(Error::ObjectExpected),
  }
}

/// Reads a UTF-8 buffer per the NAPI length convention: `NAPI_AUTO_LENGTH`
/// means NUL-terminated, anything else is an exact byte count.
pub fn read_utf8<'a>(ptr: *const c_char, len: usize) -> Result<Cow<'a, str>> {
  if ptr.is_null() {
    return Err(Error::InvalidArg);
  }
  // SAFETY: the add-on vouches for the pointer per the NAPI contract.
  unsafe {
    if len == NAPI_AUTO_LENGTH {
      Ok(CStr::from_ptr(ptr).to_string_lossy())
    } else {
      let bytes = std::slice::from_raw_parts(ptr as *const u8, len);
      Ok(String::from_utf8_lossy(bytes))
    }
  }
}

/// Property keys are strings in this model; everything else is coerced,
/// which also covers symbol keys by description (approximation).
pub fn key_string(ctx: &Context, key: napi_value) -> Result<String> {
  let key = value_arg(ctx, key)?;
  match key {
    Value::Str(s) => Ok(s.to_string()),
    other => Ok(other.coerce_to_string()),
  }
}

/// Copies a string into a caller buffer with NUL termination, returning
/// the copied byte count; a null buffer asks for the total length instead.
pub fn copy_string_bytes(
  bytes: &[u8],
  buf: *mut c_char,
  bufsize: usize,
  result: *mut usize,
) {
  if buf.is_null() {
    if !result.is_null() {
      // SAFETY: caller-provided out pointer.
      unsafe { *result = bytes.len() };
    }
    return;
  }
  if bufsize == 0 {
    if !result.is_null() {
      unsafe { *result = 0 };
    }
    return;
  }
  let copied = bytes.len().min(bufsize - 1);
  // SAFETY: buf has room for `bufsize` bytes per the caller.
  unsafe {
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, copied);
    *buf.add(copied) = 0;
    if !result.is_null() {
      *result = copied;
    }
  }
}
