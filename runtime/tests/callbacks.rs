// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! End-to-end add-on scenarios: a function-exporting echo add-on, a class
//! with wrapped native state, and the exception round trip.

mod common;

use std::os::raw::c_void;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use common::*;
use napi_host::shim::*;
use napi_host::types::*;
use napi_host::CallError;
use napi_host::Context;
use napi_host::ObjKind;
use napi_host::Registration;
use napi_host::Value;

// ---- E1: echo add-on -----------------------------------------------------

unsafe extern "C" fn add_cb(
  env: napi_env,
  info: napi_callback_info,
) -> napi_value {
  let (argv, argc, _this) = cb_args!(env, info, 2);
  assert_eq!(argc, 2);

  let mut a = 0f64;
  let mut b = 0f64;
  if napi_get_value_double(env, argv[0], &mut a) != napi_ok
    || napi_get_value_double(env, argv[1], &mut b) != napi_ok
  {
    napi_throw_type_error(env, c"E_ARG".as_ptr(), c"numbers only".as_ptr());
    return std::ptr::null_mut();
  }
  let mut out = std::ptr::null_mut();
  assert_napi_ok!(napi_create_double(env, a + b, &mut out));
  out
}

unsafe extern "C" fn echo_init(
  env: napi_env,
  exports: napi_value,
) -> napi_value {
  let mut add = std::ptr::null_mut();
  assert_napi_ok!(napi_create_function(
    env,
    c"add".as_ptr(),
    NAPI_AUTO_LENGTH,
    Some(add_cb),
    std::ptr::null_mut(),
    &mut add
  ));
  assert_napi_ok!(napi_set_named_property(env, exports, c"add".as_ptr(), add));
  exports
}

#[test]
fn echo_addon_adds_numbers_and_throws_on_strings() {
  let reg = Registration::new();
  let env = reg.environment();
  let ctx = Context::current();
  let exports = unsafe { reg.register(echo_init) }.unwrap();

  let exports = exports.as_object().unwrap();
  let add = match ctx.get_property(&env, exports, "add").unwrap() {
    Value::Object(func) => func,
    other => panic!("expected function export, got {:?}", other),
  };

  let sum = ctx
    .call_function(
      &env,
      &add,
      Value::Undefined,
      &[Value::Number(2.0), Value::Number(3.0)],
    )
    .unwrap();
  assert!(matches!(sum, Value::Number(n) if n == 5.0));

  let err = ctx
    .call_function(
      &env,
      &add,
      Value::Undefined,
      &[Value::string("hi"), Value::string("lo")],
    )
    .unwrap_err();
  match err {
    CallError::Exception(Value::Object(error)) => {
      assert!(error.is_error());
      let name = ctx.get_property(&env, &error, "name").unwrap();
      assert!(matches!(name, Value::Str(s) if &*s == "TypeError"));
    }
    other => panic!("expected a thrown TypeError, got {:?}", other),
  }

  ctx.destroy_env(&env);
}

// ---- E2/E3: counter class with wrapped native state ----------------------

static COUNTER_DROPS: AtomicUsize = AtomicUsize::new(0);

unsafe extern "C" fn counter_finalize(
  _env: napi_env,
  data: *mut c_void,
  _hint: *mut c_void,
) {
  drop(Box::from_raw(data as *mut i64));
  COUNTER_DROPS.fetch_add(1, Ordering::SeqCst);
}

unsafe extern "C" fn counter_ctor(
  env: napi_env,
  info: napi_callback_info,
) -> napi_value {
  let (argv, argc, this) = cb_args!(env, info, 1);

  // new.target is set for a real construction.
  let mut new_target = std::ptr::null_mut();
  assert_napi_ok!(napi_get_new_target(env, info, &mut new_target));
  assert!(!new_target.is_null());

  let initial = if argc > 0 {
    let mut n = 0f64;
    if napi_get_value_double(env, argv[0], &mut n) == napi_ok {
      n as i64
    } else {
      0
    }
  } else {
    0
  };
  let state = Box::into_raw(Box::new(initial));
  assert_napi_ok!(napi_wrap(
    env,
    this,
    state as *mut c_void,
    Some(counter_finalize),
    std::ptr::null_mut(),
    std::ptr::null_mut()
  ));
  std::ptr::null_mut()
}

unsafe fn counter_state(env: napi_env, this: napi_value) -> *mut i64 {
  let mut state = std::ptr::null_mut();
  assert_napi_ok!(napi_unwrap(env, this, &mut state));
  state as *mut i64
}

unsafe extern "C" fn counter_increment(
  env: napi_env,
  info: napi_callback_info,
) -> napi_value {
  let (_argv, _argc, this) = cb_args!(env, info, 0);
  *counter_state(env, this) += 1;
  std::ptr::null_mut()
}

unsafe extern "C" fn counter_value_getter(
  env: napi_env,
  info: napi_callback_info,
) -> napi_value {
  let (_argv, _argc, this) = cb_args!(env, info, 0);
  let mut out = std::ptr::null_mut();
  assert_napi_ok!(napi_create_double(
    env,
    *counter_state(env, this) as f64,
    &mut out
  ));
  out
}

unsafe extern "C" fn counter_describe_static(
  env: napi_env,
  _info: napi_callback_info,
) -> napi_value {
  make_string(env, "counts things")
}

unsafe extern "C" fn counter_init(
  env: napi_env,
  exports: napi_value,
) -> napi_value {
  let properties = [
    napi_property_descriptor {
      utf8name: c"increment".as_ptr(),
      name: std::ptr::null_mut(),
      method: Some(counter_increment),
      getter: None,
      setter: None,
      value: std::ptr::null_mut(),
      attributes: napi_default_method,
      data: std::ptr::null_mut(),
    },
    napi_property_descriptor {
      utf8name: c"value".as_ptr(),
      name: std::ptr::null_mut(),
      method: None,
      getter: Some(counter_value_getter),
      setter: None,
      value: std::ptr::null_mut(),
      attributes: napi_default,
      data: std::ptr::null_mut(),
    },
    napi_property_descriptor {
      utf8name: c"describe".as_ptr(),
      name: std::ptr::null_mut(),
      method: Some(counter_describe_static),
      getter: None,
      setter: None,
      value: std::ptr::null_mut(),
      attributes: napi_default_method | napi_static,
      data: std::ptr::null_mut(),
    },
  ];
  let mut class = std::ptr::null_mut();
  assert_napi_ok!(napi_define_class(
    env,
    c"Counter".as_ptr(),
    NAPI_AUTO_LENGTH,
    Some(counter_ctor),
    std::ptr::null_mut(),
    properties.len(),
    properties.as_ptr(),
    &mut class
  ));
  assert_napi_ok!(napi_set_named_property(
    env,
    exports,
    c"Counter".as_ptr(),
    class
  ));
  exports
}

#[test]
fn counter_class_constructs_increments_and_finalizes() {
  let reg = Registration::new();
  let env = reg.environment();
  let ctx = Context::current();
  let exports = unsafe { reg.register(counter_init) }.unwrap();
  let exports = exports.as_object().unwrap();

  let class = match ctx.get_property(&env, exports, "Counter").unwrap() {
    Value::Object(class) => class,
    other => panic!("expected constructor, got {:?}", other),
  };

  // Static properties live on the constructor itself.
  let describe = ctx.get_property(&env, &class, "describe").unwrap();
  let described = match describe {
    Value::Object(func) => ctx
      .call_function(&env, &func, Value::Object(class.clone()), &[])
      .unwrap(),
    other => panic!("expected static method, got {:?}", other),
  };
  assert!(matches!(described, Value::Str(s) if &*s == "counts things"));

  {
    let instance = ctx.new_instance(&env, &class, &[]).unwrap();
    let instance_obj = instance.as_object().unwrap().clone();

    let increment =
      match ctx.get_property(&env, &instance_obj, "increment").unwrap() {
        Value::Object(func) => func,
        other => panic!("expected instance method, got {:?}", other),
      };
    for _ in 0..3 {
      ctx
        .call_function(&env, &increment, instance.clone(), &[])
        .unwrap();
    }

    let value = ctx.get_property(&env, &instance_obj, "value").unwrap();
    assert!(matches!(value, Value::Number(n) if n == 3.0));
  }

  // The instance is unreachable; its wrap finalizer frees the native box.
  ctx.run_pending_finalizers();
  assert_eq!(COUNTER_DROPS.load(Ordering::SeqCst), 1);

  ctx.destroy_env(&env);
  assert_eq!(COUNTER_DROPS.load(Ordering::SeqCst), 1);
}

// ---- E6: exception round trip --------------------------------------------

unsafe extern "C" fn always_throws(
  env: napi_env,
  _info: napi_callback_info,
) -> napi_value {
  napi_throw_type_error(env, c"E_ARG".as_ptr(), c"bad".as_ptr());
  std::ptr::null_mut()
}

#[test]
fn thrown_type_error_reaches_the_host_with_code_and_message() {
  let reg = Registration::new();
  let env = reg.environment();
  let ctx = Context::current();

  let mut func = std::ptr::null_mut();
  assert_napi_ok!(napi_create_function(
    reg.env(),
    c"boom".as_ptr(),
    NAPI_AUTO_LENGTH,
    Some(always_throws),
    std::ptr::null_mut(),
    &mut func
  ));
  let boom = match ctx.value_from_handle(func).unwrap() {
    Value::Object(func) => func,
    _ => unreachable!(),
  };
  let _ = reg.finish(std::ptr::null_mut());

  let err = ctx
    .call_function(&env, &boom, Value::Undefined, &[])
    .unwrap_err();
  let CallError::Exception(Value::Object(error)) = err else {
    panic!("expected exception");
  };
  assert!(error.is_error());
  let message = ctx.get_property(&env, &error, "message").unwrap();
  assert!(matches!(message, Value::Str(s) if &*s == "bad"));
  let code = ctx.get_property(&env, &error, "code").unwrap();
  assert!(matches!(code, Value::Str(s) if &*s == "E_ARG"));
  let name = ctx.get_property(&env, &error, "name").unwrap();
  assert!(matches!(name, Value::Str(s) if &*s == "TypeError"));

  // The env slot was drained when the exception surfaced.
  let mut pending = true;
  assert_napi_ok!(napi_is_exception_pending(reg_env_raw(&env), &mut pending));
  assert!(!pending);

  ctx.destroy_env(&env);
}

fn reg_env_raw(env: &std::rc::Rc<napi_host::Env>) -> napi_env {
  env.id as napi_env
}

// ---- argument padding ----------------------------------------------------

unsafe extern "C" fn wants_three(
  env: napi_env,
  info: napi_callback_info,
) -> napi_value {
  let (argv, argc, _this) = cb_args!(env, info, 3);
  // One actual argument; the remaining slots read as undefined.
  assert_eq!(argc, 1);
  let mut ty = -1;
  assert_napi_ok!(napi_typeof(env, argv[1], &mut ty));
  assert_eq!(ty, napi_undefined);
  assert_napi_ok!(napi_typeof(env, argv[2], &mut ty));
  assert_eq!(ty, napi_undefined);
  let mut out = std::ptr::null_mut();
  assert_napi_ok!(napi_create_double(env, argc as f64, &mut out));
  out
}

#[test]
fn cb_info_pads_missing_arguments_with_undefined() {
  let reg = Registration::new();
  let env = reg.environment();
  let ctx = Context::current();

  let mut func = std::ptr::null_mut();
  assert_napi_ok!(napi_create_function(
    reg.env(),
    c"wantsThree".as_ptr(),
    NAPI_AUTO_LENGTH,
    Some(wants_three),
    std::ptr::null_mut(),
    &mut func
  ));
  let func = match ctx.value_from_handle(func).unwrap() {
    Value::Object(func) => func,
    _ => unreachable!(),
  };
  let _ = reg.finish(std::ptr::null_mut());

  let reported = ctx
    .call_function(&env, &func, Value::Undefined, &[Value::Number(1.0)])
    .unwrap();
  assert!(matches!(reported, Value::Number(n) if n == 1.0));

  ctx.destroy_env(&env);
}

// ---- plain call vs construction ------------------------------------------

unsafe extern "C" fn observes_new_target(
  env: napi_env,
  info: napi_callback_info,
) -> napi_value {
  let mut new_target = std::ptr::null_mut();
  assert_napi_ok!(napi_get_new_target(env, info, &mut new_target));
  let mut out = std::ptr::null_mut();
  assert_napi_ok!(napi_get_boolean(env, !new_target.is_null(), &mut out));
  out
}

#[test]
fn new_target_distinguishes_construction_from_plain_calls() {
  let reg = Registration::new();
  let env = reg.environment();
  let ctx = Context::current();

  let mut class = std::ptr::null_mut();
  assert_napi_ok!(napi_define_class(
    reg.env(),
    c"Probe".as_ptr(),
    NAPI_AUTO_LENGTH,
    Some(observes_new_target),
    std::ptr::null_mut(),
    0,
    std::ptr::null(),
    &mut class
  ));
  let class = match ctx.value_from_handle(class).unwrap() {
    Value::Object(class) => class,
    _ => unreachable!(),
  };
  let _ = reg.finish(std::ptr::null_mut());

  // Plain call: new.target is null, the callback returns false.
  let plain = ctx
    .call_function(&env, &class, Value::Undefined, &[])
    .unwrap();
  assert!(matches!(plain, Value::Bool(false)));

  // Construction: callback returns true, which overrides nothing since it
  // is not an object, so the fresh instance comes back.
  let constructed = ctx.new_instance(&env, &class, &[]).unwrap();
  match constructed {
    Value::Object(obj) => assert!(matches!(obj.kind, ObjKind::Plain)),
    other => panic!("expected an instance, got {:?}", other),
  }

  ctx.destroy_env(&env);
}
