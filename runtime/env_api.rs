// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Environment-level table slots: versioning, extended error info, cleanup
//! hooks and the fatal-exception path.

use std::os::raw::c_char;
use std::os::raw::c_void;

use napi_host_core::types::*;
use napi_host_core::Error;
use napi_host_core::Result;
use napi_host_core::Value;

use crate::util::*;

#[napi_sym::napi_sym]
fn napi_get_version(env: napi_env, result: *mut u32) -> Result {
  let (_, _env) = env_ref(env)?;
  check_arg!(result);
  *result = NAPI_VERSION;
  Ok(())
}

const NODE_VERSION: napi_node_version = napi_node_version {
  major: 18,
  minor: 12,
  patch: 1,
  release: "napi-host\0".as_ptr() as *const c_char,
};

#[napi_sym::napi_sym]
fn napi_get_node_version(
  env: napi_env,
  result: *mut *const napi_node_version,
) -> Result {
  let (_, _env) = env_ref(env)?;
  check_arg!(result);
  *result = &NODE_VERSION as *const napi_node_version;
  Ok(())
}

// Deliberately does not clear or set last_error: the whole point is to
// report the previous entry point's status. The napi_sym wrapper is not
// used for that reason.
pub unsafe extern "C" fn napi_get_last_error_info(
  env: napi_env,
  result: *mut *const napi_extended_error_info,
) -> napi_status {
  let Ok((_, env)) = env_ref(env) else {
    return napi_invalid_arg;
  };
  if result.is_null() {
    return napi_invalid_arg;
  }
  *result = env.error_info_ptr();
  napi_ok
}

#[napi_sym::napi_sym]
fn napi_fatal_exception(env: napi_env, err: napi_value) -> Result {
  let (ctx, _env) = env_ref(env)?;
  let err = value_arg(&ctx, err)?;
  // No uncaught-exception hook to route to; log and survive.
  log::error!("napi_fatal_exception: {}", err.coerce_to_string());
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_add_env_cleanup_hook(
  env: napi_env,
  hook: Option<napi_cleanup_hook>,
  arg: *mut c_void,
) -> Result {
  let (_, env) = env_ref(env)?;
  let hook = hook.ok_or(Error::InvalidArg)?;
  env.add_cleanup_hook(hook, arg)
}

#[napi_sym::napi_sym]
fn napi_remove_env_cleanup_hook(
  env: napi_env,
  hook: Option<napi_cleanup_hook>,
  arg: *mut c_void,
) -> Result {
  let (_, env) = env_ref(env)?;
  let hook = hook.ok_or(Error::InvalidArg)?;
  env.remove_cleanup_hook(hook, arg)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn node_version_release_is_nul_terminated() {
    // SAFETY: static C string.
    let release = unsafe { std::ffi::CStr::from_ptr(NODE_VERSION.release) };
    assert_eq!(release.to_str().unwrap(), "napi-host");
  }

  #[test]
  fn value_formatting_for_fatal_log() {
    let err = Value::string("boom");
    assert_eq!(err.coerce_to_string(), "boom");
  }
}
