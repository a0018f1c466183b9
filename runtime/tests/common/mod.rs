// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Shared harness for the ABI suites: tiny add-ons written as extern "C"
//! callbacks in the test binary, exercised through the exported symbols.

#![allow(dead_code)]

use std::os::raw::c_char;

use napi_host::shim::*;
use napi_host::types::*;

macro_rules! assert_napi_ok {
  ($call:expr) => {{
    let status = unsafe { $call };
    assert_eq!(status, napi_host::types::napi_ok, "{} failed", stringify!($call));
  }};
}
pub(crate) use assert_napi_ok;

macro_rules! assert_napi_status {
  ($call:expr, $status:expr) => {{
    let status = unsafe { $call };
    assert_eq!(status, $status, "{}", stringify!($call));
  }};
}
pub(crate) use assert_napi_status;

macro_rules! cb_args {
  ($env:expr, $info:expr, $n:expr) => {{
    let mut argv: [napi_value; $n] = [std::ptr::null_mut(); $n];
    let mut argc: usize = $n;
    let mut this: napi_value = std::ptr::null_mut();
    let status = napi_get_cb_info(
      $env,
      $info,
      &mut argc,
      argv.as_mut_ptr(),
      &mut this,
      std::ptr::null_mut(),
    );
    assert_eq!(status, napi_host::types::napi_ok);
    (argv, argc, this)
  }};
}
pub(crate) use cb_args;

pub fn make_string(env: napi_env, s: &str) -> napi_value {
  let mut out = std::ptr::null_mut();
  assert_napi_ok!(napi_create_string_utf8(
    env,
    s.as_ptr() as *const c_char,
    s.len(),
    &mut out
  ));
  out
}

pub fn make_double(env: napi_env, n: f64) -> napi_value {
  let mut out = std::ptr::null_mut();
  assert_napi_ok!(napi_create_double(env, n, &mut out));
  out
}

pub fn get_double(env: napi_env, value: napi_value) -> f64 {
  let mut out = 0f64;
  assert_napi_ok!(napi_get_value_double(env, value, &mut out));
  out
}

pub fn get_string(env: napi_env, value: napi_value) -> String {
  let mut len = 0usize;
  assert_napi_ok!(napi_get_value_string_utf8(
    env,
    value,
    std::ptr::null_mut(),
    0,
    &mut len
  ));
  let mut buf = vec![0u8; len + 1];
  let mut copied = 0usize;
  assert_napi_ok!(napi_get_value_string_utf8(
    env,
    value,
    buf.as_mut_ptr() as *mut c_char,
    buf.len(),
    &mut copied
  ));
  buf.truncate(copied);
  String::from_utf8(buf).unwrap()
}

pub fn type_of(env: napi_env, value: napi_value) -> napi_valuetype {
  let mut ty = -1;
  assert_napi_ok!(napi_typeof(env, value, &mut ty));
  ty
}

pub fn last_status(env: napi_env) -> napi_status {
  let mut info: *const napi_extended_error_info = std::ptr::null();
  assert_napi_ok!(napi_get_last_error_info(env, &mut info));
  assert!(!info.is_null());
  unsafe { (*info).error_code }
}
