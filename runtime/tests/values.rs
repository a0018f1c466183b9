// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Value surface: singletons, handle stability, strings, arrays, buffers.

mod common;

use std::os::raw::c_char;

use common::*;
use napi_host::shim::*;
use napi_host::types::*;
use napi_host::Registration;

fn with_env(f: impl FnOnce(napi_env)) {
  let reg = Registration::new();
  f(reg.env());
  let _ = reg.finish(std::ptr::null_mut());
}

#[test]
fn singleton_handles_are_fixed_across_environments() {
  let reg_a = Registration::new();
  let reg_b = Registration::new();
  for env in [reg_a.env(), reg_b.env()] {
    let mut undefined = std::ptr::null_mut();
    let mut null = std::ptr::null_mut();
    let mut t = std::ptr::null_mut();
    let mut f = std::ptr::null_mut();
    let mut global = std::ptr::null_mut();
    assert_napi_ok!(napi_get_undefined(env, &mut undefined));
    assert_napi_ok!(napi_get_null(env, &mut null));
    assert_napi_ok!(napi_get_boolean(env, true, &mut t));
    assert_napi_ok!(napi_get_boolean(env, false, &mut f));
    assert_napi_ok!(napi_get_global(env, &mut global));
    assert_eq!(undefined as usize, 2);
    assert_eq!(null as usize, 3);
    assert_eq!(f as usize, 4);
    assert_eq!(t as usize, 5);
    assert_eq!(global as usize, 6);
  }
  // Registration scopes close LIFO.
  let _ = reg_b.finish(std::ptr::null_mut());
  let _ = reg_a.finish(std::ptr::null_mut());
}

#[test]
fn handles_stay_stable_until_their_scope_closes() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let value = make_double(env, 1234.5);
    for _ in 0..3 {
      assert_eq!(get_double(env, value), 1234.5);
    }
    let text = make_string(env, "stable");
    assert_eq!(get_string(env, text), "stable");

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}

#[test]
fn utf8_round_trip_with_truncation_and_length_query() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let input = "héllo wörld";
    let value = make_string(env, input);
    assert_eq!(get_string(env, value), input);

    // Null buffer asks for the total byte length.
    let mut total = 0usize;
    assert_napi_ok!(napi_get_value_string_utf8(
      env,
      value,
      std::ptr::null_mut(),
      0,
      &mut total
    ));
    assert_eq!(total, input.len());

    // A short buffer truncates and still terminates.
    let mut buf = [0u8; 4];
    let mut copied = 0usize;
    assert_napi_ok!(napi_get_value_string_utf8(
      env,
      value,
      buf.as_mut_ptr() as *mut c_char,
      buf.len(),
      &mut copied
    ));
    assert_eq!(copied, 3);
    assert_eq!(buf[3], 0);

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}

#[test]
fn typeof_reports_napi_valuetypes() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let mut undefined = std::ptr::null_mut();
    assert_napi_ok!(napi_get_undefined(env, &mut undefined));
    assert_eq!(type_of(env, undefined), napi_undefined);

    assert_eq!(type_of(env, make_double(env, 1.0)), napi_number);
    assert_eq!(type_of(env, make_string(env, "s")), napi_string);

    let mut obj = std::ptr::null_mut();
    assert_napi_ok!(napi_create_object(env, &mut obj));
    assert_eq!(type_of(env, obj), napi_object);

    let mut bigint = std::ptr::null_mut();
    assert_napi_ok!(napi_create_bigint_int64(env, -7, &mut bigint));
    assert_eq!(type_of(env, bigint), napi_bigint);

    let mut symbol = std::ptr::null_mut();
    assert_napi_ok!(napi_create_symbol(
      env,
      std::ptr::null_mut(),
      &mut symbol
    ));
    assert_eq!(type_of(env, symbol), napi_symbol);

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}

#[test]
fn strict_equals_and_value_identity() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let a = make_double(env, 3.0);
    let b = make_double(env, 3.0);
    let mut eq = false;
    assert_napi_ok!(napi_strict_equals(env, a, b, &mut eq));
    assert!(eq, "same numbers compare equal across distinct handles");

    let mut obj_a = std::ptr::null_mut();
    let mut obj_b = std::ptr::null_mut();
    assert_napi_ok!(napi_create_object(env, &mut obj_a));
    assert_napi_ok!(napi_create_object(env, &mut obj_b));
    assert_napi_ok!(napi_strict_equals(env, obj_a, obj_b, &mut eq));
    assert!(!eq, "distinct objects are not strictly equal");

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}

#[test]
fn arrays_grow_and_report_length() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let mut array = std::ptr::null_mut();
    assert_napi_ok!(napi_create_array(env, &mut array));
    assert_napi_ok!(napi_set_element(env, array, 4, make_double(env, 9.0)));

    let mut len = 0u32;
    assert_napi_ok!(napi_get_array_length(env, array, &mut len));
    assert_eq!(len, 5);

    let mut hole = std::ptr::null_mut();
    assert_napi_ok!(napi_get_element(env, array, 1, &mut hole));
    assert_eq!(type_of(env, hole), napi_undefined);

    let mut tail = std::ptr::null_mut();
    assert_napi_ok!(napi_get_element(env, array, 4, &mut tail));
    assert_eq!(get_double(env, tail), 9.0);

    // Element ops demand an actual array.
    let mut obj = std::ptr::null_mut();
    assert_napi_ok!(napi_create_object(env, &mut obj));
    assert_napi_status!(
      napi_get_array_length(env, obj, &mut len),
      napi_array_expected
    );

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}

#[test]
fn arraybuffer_data_and_detach() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let mut data = std::ptr::null_mut();
    let mut buffer = std::ptr::null_mut();
    assert_napi_ok!(napi_create_arraybuffer(env, 16, &mut data, &mut buffer));
    assert!(!data.is_null());

    let mut is_ab = false;
    assert_napi_ok!(napi_is_arraybuffer(env, buffer, &mut is_ab));
    assert!(is_ab);

    // Writes through the raw pointer land in the buffer the info reports.
    unsafe { *(data as *mut u8) = 0xAB };
    let mut info_data = std::ptr::null_mut();
    let mut len = 0usize;
    assert_napi_ok!(napi_get_arraybuffer_info(
      env,
      buffer,
      &mut info_data,
      &mut len
    ));
    assert_eq!(len, 16);
    assert_eq!(unsafe { *(info_data as *const u8) }, 0xAB);

    assert_napi_ok!(napi_detach_arraybuffer(env, buffer));
    let mut detached = false;
    assert_napi_ok!(napi_is_detached_arraybuffer(env, buffer, &mut detached));
    assert!(detached);
    assert_napi_status!(
      napi_detach_arraybuffer(env, buffer),
      napi_detachable_arraybuffer_expected
    );

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}

#[test]
fn typedarray_views_share_the_backing_buffer() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let mut data = std::ptr::null_mut();
    let mut buffer = std::ptr::null_mut();
    assert_napi_ok!(napi_create_arraybuffer(env, 8, &mut data, &mut buffer));

    let mut view = std::ptr::null_mut();
    assert_napi_ok!(napi_create_typedarray(
      env,
      napi_uint8_array,
      4,
      buffer,
      2,
      &mut view
    ));

    let mut ty = -1;
    let mut len = 0usize;
    let mut view_data = std::ptr::null_mut();
    let mut backing = std::ptr::null_mut();
    let mut offset = 0usize;
    assert_napi_ok!(napi_get_typedarray_info(
      env,
      view,
      &mut ty,
      &mut len,
      &mut view_data,
      &mut backing,
      &mut offset
    ));
    assert_eq!(ty, napi_uint8_array);
    assert_eq!(len, 4);
    assert_eq!(offset, 2);
    assert_eq!(view_data as usize, data as usize + 2);

    // Out-of-bounds views throw a RangeError and fail.
    let mut bogus = std::ptr::null_mut();
    assert_napi_status!(
      napi_create_typedarray(env, napi_uint8_array, 16, buffer, 0, &mut bogus),
      napi_generic_failure
    );
    let mut pending = false;
    assert_napi_ok!(napi_is_exception_pending(env, &mut pending));
    assert!(pending);
    let mut exception = std::ptr::null_mut();
    assert_napi_ok!(napi_get_and_clear_last_exception(env, &mut exception));

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}

#[test]
fn buffers_are_uint8_views() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let payload = [1u8, 2, 3, 4];
    let mut copy_data = std::ptr::null_mut();
    let mut buffer = std::ptr::null_mut();
    assert_napi_ok!(napi_create_buffer_copy(
      env,
      payload.len(),
      payload.as_ptr() as *const _,
      &mut copy_data,
      &mut buffer
    ));

    let mut is_buf = false;
    assert_napi_ok!(napi_is_buffer(env, buffer, &mut is_buf));
    assert!(is_buf);

    let mut data = std::ptr::null_mut();
    let mut len = 0usize;
    assert_napi_ok!(napi_get_buffer_info(env, buffer, &mut data, &mut len));
    assert_eq!(len, 4);
    let bytes = unsafe { std::slice::from_raw_parts(data as *const u8, len) };
    assert_eq!(bytes, &payload);

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}

#[test]
fn date_and_coercions() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let mut date = std::ptr::null_mut();
    assert_napi_ok!(napi_create_date(env, 1234.0, &mut date));
    let mut is_date = false;
    assert_napi_ok!(napi_is_date(env, date, &mut is_date));
    assert!(is_date);
    let mut ms = 0f64;
    assert_napi_ok!(napi_get_date_value(env, date, &mut ms));
    assert_eq!(ms, 1234.0);

    let mut coerced = std::ptr::null_mut();
    assert_napi_ok!(napi_coerce_to_string(
      env,
      make_double(env, 42.0),
      &mut coerced
    ));
    assert_eq!(get_string(env, coerced), "42");

    let mut as_number = std::ptr::null_mut();
    assert_napi_ok!(napi_coerce_to_number(
      env,
      make_string(env, " 6.5 "),
      &mut as_number
    ));
    assert_eq!(get_double(env, as_number), 6.5);

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}

#[test]
fn property_names_and_attributes() {
  with_env(|env| {
    let mut scope = std::ptr::null_mut();
    assert_napi_ok!(napi_open_handle_scope(env, &mut scope));

    let mut obj = std::ptr::null_mut();
    assert_napi_ok!(napi_create_object(env, &mut obj));
    assert_napi_ok!(napi_set_named_property(
      env,
      obj,
      c"alpha".as_ptr(),
      make_double(env, 1.0)
    ));
    assert_napi_ok!(napi_set_named_property(
      env,
      obj,
      c"beta".as_ptr(),
      make_double(env, 2.0)
    ));

    let mut names = std::ptr::null_mut();
    assert_napi_ok!(napi_get_property_names(env, obj, &mut names));
    let mut count = 0u32;
    assert_napi_ok!(napi_get_array_length(env, names, &mut count));
    assert_eq!(count, 2);
    let mut first = std::ptr::null_mut();
    assert_napi_ok!(napi_get_element(env, names, 0, &mut first));
    assert_eq!(get_string(env, first), "alpha");

    let mut has = false;
    assert_napi_ok!(napi_has_named_property(
      env,
      obj,
      c"beta".as_ptr(),
      &mut has
    ));
    assert!(has);

    assert_napi_ok!(napi_object_freeze(env, obj));
    assert_napi_ok!(napi_set_named_property(
      env,
      obj,
      c"gamma".as_ptr(),
      make_double(env, 3.0)
    ));
    assert_napi_ok!(napi_has_named_property(
      env,
      obj,
      c"gamma".as_ptr(),
      &mut has
    ));
    assert!(!has, "writes to a frozen object are dropped");

    assert_napi_ok!(napi_close_handle_scope(env, scope));
  });
}
