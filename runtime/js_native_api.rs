// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Table slots for the js_native_api surface: values, strings, objects,
//! properties, functions and classes, wraps, references, scopes, buffers
//! and promises. Every function here lands in the shim's table; none of
//! them owns an exported symbol name.

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use std::os::raw::c_char;
use std::os::raw::c_void;
use std::rc::Rc;

use napi_host_core::function::create_constructor;
use napi_host_core::function::create_function;
use napi_host_core::types::*;
use napi_host_core::value::ArrayBufferData;
use napi_host_core::value::DataViewData;
use napi_host_core::value::ExternalData;
use napi_host_core::value::TypedArrayData;
use napi_host_core::CallError;
use napi_host_core::ClassTemplate;
use napi_host_core::Context;
use napi_host_core::Env;
use napi_host_core::Error;
use napi_host_core::ErrorClass;
use napi_host_core::FinalizerRecord;
use napi_host_core::InstanceData;
use napi_host_core::Obj;
use napi_host_core::ObjKind;
use napi_host_core::Ownership;
use napi_host_core::Property;
use napi_host_core::PropertyValue;
use napi_host_core::Result;
use napi_host_core::Value;
use napi_host_core::Wrap;

use crate::util::*;

// Shared plumbing

fn read_args(
  ctx: &Context,
  argc: usize,
  argv: *const napi_value,
) -> Result<Vec<Value>> {
  if argc == 0 {
    return Ok(Vec::new());
  }
  check_arg!(argv);
  // SAFETY: argv points at argc handles per the NAPI contract.
  let handles = unsafe { std::slice::from_raw_parts(argv, argc) };
  handles.iter().map(|h| value_arg(ctx, *h)).collect()
}

fn raise(env: &Env, err: CallError) -> Error {
  match err {
    CallError::Exception(value) => {
      env.throw(value);
      Error::PendingException
    }
    CallError::CannotRunJs => Error::CannotRunJs,
  }
}

unsafe fn property_from_descriptor(
  ctx: &Context,
  env: &Env,
  p: &napi_property_descriptor,
) -> Result<(Rc<str>, Property)> {
  let key: Rc<str> = if !p.utf8name.is_null() {
    Rc::from(read_utf8(p.utf8name, NAPI_AUTO_LENGTH)?.as_ref())
  } else if !p.name.is_null() {
    Rc::from(key_string(ctx, p.name)?.as_str())
  } else {
    return Err(Error::NameExpected);
  };

  let value = if p.method.is_some() {
    PropertyValue::Data(Value::Object(create_function(
      env.id, &key, p.method, p.data,
    )))
  } else if p.getter.is_some() || p.setter.is_some() {
    let getter = p.getter.map(|_| {
      Value::Object(create_function(env.id, &key, p.getter, p.data))
    });
    let setter = p.setter.map(|_| {
      Value::Object(create_function(env.id, &key, p.setter, p.data))
    });
    PropertyValue::Accessor { getter, setter }
  } else if !p.value.is_null() {
    PropertyValue::Data(value_arg(ctx, p.value)?)
  } else {
    PropertyValue::Data(Value::Undefined)
  };

  Ok((
    key,
    Property {
      value,
      attributes: p.attributes,
    },
  ))
}

// Singletons and primitive creation

#[napi_sym::napi_sym]
fn napi_get_undefined(env: napi_env, result: *mut napi_value) -> Result {
  let (_, _env) = env_ref(env)?;
  check_arg!(result);
  *result = napi_host_core::consts::UNDEFINED as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_null(env: napi_env, result: *mut napi_value) -> Result {
  let (_, _env) = env_ref(env)?;
  check_arg!(result);
  *result = napi_host_core::consts::NULL as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_global(env: napi_env, result: *mut napi_value) -> Result {
  let (_, _env) = env_ref(env)?;
  check_arg!(result);
  *result = napi_host_core::consts::GLOBAL as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_boolean(
  env: napi_env,
  value: bool,
  result: *mut napi_value,
) -> Result {
  let (_, _env) = env_ref(env)?;
  check_arg!(result);
  *result = if value {
    napi_host_core::consts::TRUE as napi_value
  } else {
    napi_host_core::consts::FALSE as napi_value
  };
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_object(env: napi_env, result: *mut napi_value) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = add_value(&ctx, &env, Value::Object(Obj::plain()))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_array(env: napi_env, result: *mut napi_value) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result =
    add_value(&ctx, &env, Value::Object(Obj::array(Vec::new())))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_array_with_length(
  env: napi_env,
  length: usize,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let elements = vec![Value::Undefined; length];
  *result =
    add_value(&ctx, &env, Value::Object(Obj::array(elements)))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_double(
  env: napi_env,
  value: f64,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = add_value(&ctx, &env, Value::Number(value))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_int32(
  env: napi_env,
  value: i32,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = add_value(&ctx, &env, Value::Number(value as f64))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_uint32(
  env: napi_env,
  value: u32,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = add_value(&ctx, &env, Value::Number(value as f64))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_int64(
  env: napi_env,
  value: i64,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = add_value(&ctx, &env, Value::Number(value as f64))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_string_utf8(
  env: napi_env,
  string: *const c_char,
  length: usize,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let string = read_utf8(string, length)?;
  *result = add_value(&ctx, &env, Value::string(string))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_string_latin1(
  env: napi_env,
  string: *const c_char,
  length: usize,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_arg!(string);
  // SAFETY: add-on provided buffer; latin-1 bytes map 1:1 to code points.
  let decoded: String = unsafe {
    if length == NAPI_AUTO_LENGTH {
      std::ffi::CStr::from_ptr(string)
        .to_bytes()
        .iter()
        .map(|b| *b as char)
        .collect()
    } else {
      std::slice::from_raw_parts(string as *const u8, length)
        .iter()
        .map(|b| *b as char)
        .collect()
    }
  };
  *result = add_value(&ctx, &env, Value::string(decoded))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_string_utf16(
  env: napi_env,
  string: *const u16,
  length: usize,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_arg!(string);
  // SAFETY: add-on provided buffer, NUL-scanned when length is automatic.
  let units: &[u16] = unsafe {
    if length == NAPI_AUTO_LENGTH {
      let mut len = 0;
      while *string.add(len) != 0 {
        len += 1;
      }
      std::slice::from_raw_parts(string, len)
    } else {
      std::slice::from_raw_parts(string, length)
    }
  };
  let decoded = String::from_utf16_lossy(units);
  *result = add_value(&ctx, &env, Value::string(decoded))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_symbol(
  env: napi_env,
  description: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let description = if description.is_null() {
    None
  } else {
    match value_arg(&ctx, description)? {
      Value::Str(s) => Some(s),
      _ => return Err(Error::StringExpected),
    }
  };
  let symbol = Obj::new(ObjKind::Symbol(description));
  *result = add_value(&ctx, &env, Value::Object(symbol))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_date(
  env: napi_env,
  time: f64,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let date = Obj::new(ObjKind::Date(std::cell::Cell::new(time)));
  *result = add_value(&ctx, &env, Value::Object(date))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_bigint_int64(
  env: napi_env,
  value: i64,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = add_value(&ctx, &env, Value::BigInt(value as i128))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_bigint_uint64(
  env: napi_env,
  value: u64,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = add_value(&ctx, &env, Value::BigInt(value as i128))? as napi_value;
  Ok(())
}

// Word-level construction is approximated by the widest native integer;
// overflowing values saturate.
#[napi_sym::napi_sym]
fn napi_create_bigint_words(
  env: napi_env,
  sign_bit: i32,
  word_count: usize,
  words: *const u64,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let mut magnitude: i128 = 0;
  if word_count > 0 {
    check_arg!(words);
    // SAFETY: words points at word_count u64s.
    let words =
      unsafe { std::slice::from_raw_parts(words, word_count.min(2)) };
    for (i, word) in words.iter().enumerate() {
      magnitude = magnitude.saturating_add((*word as i128) << (64 * i as u32));
    }
  }
  let value = if sign_bit != 0 { -magnitude } else { magnitude };
  *result = add_value(&ctx, &env, Value::BigInt(value))? as napi_value;
  Ok(())
}

// Value inspection and extraction

#[napi_sym::napi_sym]
fn napi_typeof(
  env: napi_env,
  value: napi_value,
  result: *mut napi_valuetype,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  *result = value_arg(&ctx, value)?.type_of();
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_value_double(
  env: napi_env,
  value: napi_value,
  result: *mut f64,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  match value_arg(&ctx, value)? {
    Value::Number(n) => {
      *result = n;
      Ok(())
    }
    _ => Err(Error::NumberExpected),
  }
}

// JS ToInt32: truncate, non-finite becomes zero.
#[napi_sym::napi_sym]
fn napi_get_value_int32(
  env: napi_env,
  value: napi_value,
  result: *mut i32,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  match value_arg(&ctx, value)? {
    Value::Number(n) => {
      *result = if n.is_finite() { (n.trunc() as i64) as i32 } else { 0 };
      Ok(())
    }
    _ => Err(Error::NumberExpected),
  }
}

#[napi_sym::napi_sym]
fn napi_get_value_uint32(
  env: napi_env,
  value: napi_value,
  result: *mut u32,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  match value_arg(&ctx, value)? {
    Value::Number(n) => {
      *result = if n.is_finite() { (n.trunc() as i64) as u32 } else { 0 };
      Ok(())
    }
    _ => Err(Error::NumberExpected),
  }
}

#[napi_sym::napi_sym]
fn napi_get_value_int64(
  env: napi_env,
  value: napi_value,
  result: *mut i64,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  match value_arg(&ctx, value)? {
    Value::Number(n) => {
      *result = if n.is_finite() { n.trunc() as i64 } else { 0 };
      Ok(())
    }
    _ => Err(Error::NumberExpected),
  }
}

#[napi_sym::napi_sym]
fn napi_get_value_bool(
  env: napi_env,
  value: napi_value,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  match value_arg(&ctx, value)? {
    Value::Bool(b) => {
      *result = b;
      Ok(())
    }
    _ => Err(Error::BooleanExpected),
  }
}

#[napi_sym::napi_sym]
fn napi_get_value_string_utf8(
  env: napi_env,
  value: napi_value,
  buf: *mut c_char,
  bufsize: usize,
  result: *mut usize,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  match value_arg(&ctx, value)? {
    Value::Str(s) => {
      copy_string_bytes(s.as_bytes(), buf, bufsize, result);
      Ok(())
    }
    _ => Err(Error::StringExpected),
  }
}

#[napi_sym::napi_sym]
fn napi_get_value_string_latin1(
  env: napi_env,
  value: napi_value,
  buf: *mut c_char,
  bufsize: usize,
  result: *mut usize,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  match value_arg(&ctx, value)? {
    Value::Str(s) => {
      let bytes: Vec<u8> = s
        .chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect();
      copy_string_bytes(&bytes, buf, bufsize, result);
      Ok(())
    }
    _ => Err(Error::StringExpected),
  }
}

#[napi_sym::napi_sym]
fn napi_get_value_string_utf16(
  env: napi_env,
  value: napi_value,
  buf: *mut u16,
  bufsize: usize,
  result: *mut usize,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  match value_arg(&ctx, value)? {
    Value::Str(s) => {
      let units: Vec<u16> = s.encode_utf16().collect();
      if buf.is_null() {
        if !result.is_null() {
          *result = units.len();
        }
        return Ok(());
      }
      if bufsize == 0 {
        if !result.is_null() {
          *result = 0;
        }
        return Ok(());
      }
      let copied = units.len().min(bufsize - 1);
      std::ptr::copy_nonoverlapping(units.as_ptr(), buf, copied);
      *buf.add(copied) = 0;
      if !result.is_null() {
        *result = copied;
      }
      Ok(())
    }
    _ => Err(Error::StringExpected),
  }
}

#[napi_sym::napi_sym]
fn napi_get_value_external(
  env: napi_env,
  value: napi_value,
  result: *mut *mut c_void,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, value).map_err(|_| Error::InvalidArg)?;
  match &obj.kind {
    ObjKind::External(external) => {
      *result = external.data;
      Ok(())
    }
    _ => Err(Error::InvalidArg),
  }
}

#[napi_sym::napi_sym]
fn napi_get_value_bigint_int64(
  env: napi_env,
  value: napi_value,
  result: *mut i64,
  lossless: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  match value_arg(&ctx, value)? {
    Value::BigInt(n) => {
      *result = n as i64;
      if !lossless.is_null() {
        *lossless = i64::try_from(n).is_ok();
      }
      Ok(())
    }
    _ => Err(Error::BigintExpected),
  }
}

#[napi_sym::napi_sym]
fn napi_get_value_bigint_uint64(
  env: napi_env,
  value: napi_value,
  result: *mut u64,
  lossless: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  match value_arg(&ctx, value)? {
    Value::BigInt(n) => {
      *result = n as u64;
      if !lossless.is_null() {
        *lossless = u64::try_from(n).is_ok();
      }
      Ok(())
    }
    _ => Err(Error::BigintExpected),
  }
}

// Kept as a short-circuit: reports zero words instead of splitting the
// value. Add-ons that need real word access are out of luck, loudly.
#[napi_sym::napi_sym]
fn napi_get_value_bigint_words(
  env: napi_env,
  value: napi_value,
  sign_bit: *mut i32,
  word_count: *mut usize,
  _words: *mut u64,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(word_count);
  match value_arg(&ctx, value)? {
    Value::BigInt(n) => {
      if !sign_bit.is_null() {
        *sign_bit = (n < 0) as i32;
      }
      *word_count = 0;
      Ok(())
    }
    _ => Err(Error::BigintExpected),
  }
}

#[napi_sym::napi_sym]
fn napi_get_date_value(
  env: napi_env,
  value: napi_value,
  result: *mut f64,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, value).map_err(|_| Error::DateExpected)?;
  match &obj.kind {
    ObjKind::Date(ms) => {
      *result = ms.get();
      Ok(())
    }
    _ => Err(Error::DateExpected),
  }
}

macro_rules! predicate {
  ($name:ident, $test:expr) => {
    #[napi_sym::napi_sym]
    fn $name(env: napi_env, value: napi_value, result: *mut bool) -> Result {
      let (ctx, _env) = env_ref(env)?;
      check_arg!(result);
      let value = value_arg(&ctx, value)?;
      #[allow(clippy::redundant_closure_call)]
      {
        *result = ($test)(&value);
      }
      Ok(())
    }
  };
}

predicate!(napi_is_array, |v: &Value| matches!(
  v,
  Value::Object(obj) if obj.is_array()
));
predicate!(napi_is_arraybuffer, |v: &Value| matches!(
  v,
  Value::Object(obj) if obj.is_arraybuffer()
));
predicate!(napi_is_typedarray, |v: &Value| matches!(
  v,
  Value::Object(obj) if obj.is_typedarray()
));
predicate!(napi_is_dataview, |v: &Value| matches!(
  v,
  Value::Object(obj) if obj.is_dataview()
));
predicate!(napi_is_buffer, |v: &Value| matches!(
  v,
  Value::Object(obj) if obj.is_buffer()
));
predicate!(napi_is_error, |v: &Value| matches!(
  v,
  Value::Object(obj) if obj.is_error()
));
predicate!(napi_is_date, |v: &Value| matches!(
  v,
  Value::Object(obj) if obj.is_date()
));
predicate!(napi_is_promise, |v: &Value| matches!(
  v,
  Value::Object(obj) if obj.is_promise()
));

#[napi_sym::napi_sym]
fn napi_strict_equals(
  env: napi_env,
  lhs: napi_value,
  rhs: napi_value,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  let lhs = value_arg(&ctx, lhs)?;
  let rhs = value_arg(&ctx, rhs)?;
  *result = lhs.strict_equals(&rhs);
  Ok(())
}

// Short-circuit preserved from the source: any object "is an instance".
// There is no prototype chain to walk here.
#[napi_sym::napi_sym]
fn napi_instanceof(
  env: napi_env,
  object: napi_value,
  constructor: napi_value,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  let ctor = object_arg(&ctx, constructor)
    .map_err(|_| Error::FunctionExpected)?;
  if ctor.function_data().is_none() {
    return Err(Error::FunctionExpected);
  }
  *result = matches!(value_arg(&ctx, object)?, Value::Object(_));
  Ok(())
}

// Coercions

#[napi_sym::napi_sym]
fn napi_coerce_to_bool(
  env: napi_env,
  value: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_pending(&env)?;
  let value = value_arg(&ctx, value)?;
  *result = add_value(&ctx, &env, Value::Bool(value.truthy()))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_coerce_to_number(
  env: napi_env,
  value: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_pending(&env)?;
  let value = value_arg(&ctx, value)?;
  *result =
    add_value(&ctx, &env, Value::Number(value.coerce_to_number()))?
      as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_coerce_to_string(
  env: napi_env,
  value: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_pending(&env)?;
  let value = value_arg(&ctx, value)?;
  *result = add_value(&ctx, &env, Value::string(value.coerce_to_string()))?
    as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_coerce_to_object(
  env: napi_env,
  value: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_pending(&env)?;
  let coerced = match value_arg(&ctx, value)? {
    Value::Undefined | Value::Null => return Err(Error::ObjectExpected),
    Value::Object(obj) => Value::Object(obj),
    // Primitive boxing is approximated by an empty object.
    _ => Value::Object(Obj::plain()),
  };
  *result = add_value(&ctx, &env, coerced)? as napi_value;
  Ok(())
}

// Properties

// No prototype chain in this model; the closest stable answer.
#[napi_sym::napi_sym]
fn napi_get_prototype(
  env: napi_env,
  object: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  object_arg(&ctx, object)?;
  *result = napi_host_core::consts::UNDEFINED as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_property_names(
  env: napi_env,
  object: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, object)?;
  let names: Vec<Value> = ctx
    .property_names(&obj, false)
    .into_iter()
    .map(Value::Str)
    .collect();
  *result = add_value(&ctx, &env, Value::Object(Obj::array(names)))?
    as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_all_property_names(
  env: napi_env,
  object: napi_value,
  _key_mode: napi_key_collection_mode,
  key_filter: napi_key_filter,
  _key_conversion: napi_key_conversion,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, object)?;
  let names: Vec<Value> = if key_filter & napi_key_skip_strings != 0 {
    // String keys are the only keys; skipping them leaves nothing.
    Vec::new()
  } else {
    obj
      .props
      .borrow()
      .iter()
      .filter(|(_, prop)| {
        (key_filter & napi_key_writable == 0 || prop.writable())
          && (key_filter & napi_key_enumerable == 0 || prop.enumerable())
          && (key_filter & napi_key_configurable == 0 || prop.configurable())
      })
      .map(|(key, _)| Value::Str(key.clone()))
      .collect()
  };
  *result = add_value(&ctx, &env, Value::Object(Obj::array(names)))?
    as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_set_property(
  env: napi_env,
  object: napi_value,
  key: napi_value,
  value: napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_pending(&env)?;
  let obj = object_arg(&ctx, object)?;
  let key = key_string(&ctx, key)?;
  let value = value_arg(&ctx, value)?;
  ctx
    .set_property(&env, &obj, &key, value)
    .map_err(|err| raise(&env, err))
}

#[napi_sym::napi_sym]
fn napi_get_property(
  env: napi_env,
  object: napi_value,
  key: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_pending(&env)?;
  let obj = object_arg(&ctx, object)?;
  let key = key_string(&ctx, key)?;
  let value = ctx
    .get_property(&env, &obj, &key)
    .map_err(|err| raise(&env, err))?;
  *result = add_value(&ctx, &env, value)? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_has_property(
  env: napi_env,
  object: napi_value,
  key: napi_value,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, object)?;
  let key = key_string(&ctx, key)?;
  *result = ctx.has_property(&obj, &key);
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_has_own_property(
  env: napi_env,
  object: napi_value,
  key: napi_value,
  result: *mut bool,
) -> Result {
  // Own and "inherited" coincide without a prototype chain.
  match napi_has_property(env, object, key, result) {
    napi_ok => Ok(()),
    status => Err(status_error(status)),
  }
}

#[napi_sym::napi_sym]
fn napi_delete_property(
  env: napi_env,
  object: napi_value,
  key: napi_value,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  let obj = object_arg(&ctx, object)?;
  let key = key_string(&ctx, key)?;
  let deleted = ctx.delete_property(&obj, &key);
  if !result.is_null() {
    *result = deleted;
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_set_named_property(
  env: napi_env,
  object: napi_value,
  utf8name: *const c_char,
  value: napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_pending(&env)?;
  let obj = object_arg(&ctx, object)?;
  let key = read_utf8(utf8name, NAPI_AUTO_LENGTH)?;
  let value = value_arg(&ctx, value)?;
  ctx
    .set_property(&env, &obj, &key, value)
    .map_err(|err| raise(&env, err))
}

#[napi_sym::napi_sym]
fn napi_get_named_property(
  env: napi_env,
  object: napi_value,
  utf8name: *const c_char,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_pending(&env)?;
  let obj = object_arg(&ctx, object)?;
  let key = read_utf8(utf8name, NAPI_AUTO_LENGTH)?;
  let value = ctx
    .get_property(&env, &obj, &key)
    .map_err(|err| raise(&env, err))?;
  *result = add_value(&ctx, &env, value)? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_has_named_property(
  env: napi_env,
  object: napi_value,
  utf8name: *const c_char,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, object)?;
  let key = read_utf8(utf8name, NAPI_AUTO_LENGTH)?;
  *result = ctx.has_property(&obj, &key);
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_set_element(
  env: napi_env,
  object: napi_value,
  index: u32,
  value: napi_value,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  let obj = object_arg(&ctx, object)?;
  let value = value_arg(&ctx, value)?;
  let ObjKind::Array(elements) = &obj.kind else {
    return Err(Error::ArrayExpected);
  };
  let mut elements = elements.borrow_mut();
  let index = index as usize;
  if elements.len() <= index {
    elements.resize(index + 1, Value::Undefined);
  }
  elements[index] = value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_element(
  env: napi_env,
  object: napi_value,
  index: u32,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, object)?;
  let ObjKind::Array(elements) = &obj.kind else {
    return Err(Error::ArrayExpected);
  };
  let value = elements
    .borrow()
    .get(index as usize)
    .cloned()
    .unwrap_or(Value::Undefined);
  *result = add_value(&ctx, &env, value)? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_has_element(
  env: napi_env,
  object: napi_value,
  index: u32,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, object)?;
  let ObjKind::Array(elements) = &obj.kind else {
    return Err(Error::ArrayExpected);
  };
  *result = (index as usize) < elements.borrow().len();
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_delete_element(
  env: napi_env,
  object: napi_value,
  index: u32,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  let obj = object_arg(&ctx, object)?;
  let ObjKind::Array(elements) = &obj.kind else {
    return Err(Error::ArrayExpected);
  };
  let mut elements = elements.borrow_mut();
  let index = index as usize;
  if index < elements.len() {
    elements[index] = Value::Undefined;
  }
  if !result.is_null() {
    *result = true;
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_array_length(
  env: napi_env,
  value: napi_value,
  result: *mut u32,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, value).map_err(|_| Error::ArrayExpected)?;
  let ObjKind::Array(elements) = &obj.kind else {
    return Err(Error::ArrayExpected);
  };
  *result = elements.borrow().len() as u32;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_define_properties(
  env: napi_env,
  object: napi_value,
  property_count: usize,
  properties: *const napi_property_descriptor,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  let obj = object_arg(&ctx, object)?;
  if property_count == 0 {
    return Ok(());
  }
  check_arg!(properties);
  // SAFETY: descriptor array of property_count entries.
  let descriptors =
    unsafe { std::slice::from_raw_parts(properties, property_count) };
  for descriptor in descriptors {
    let (key, prop) =
      unsafe { property_from_descriptor(&ctx, &env, descriptor)? };
    obj.props.borrow_mut().insert(key, prop);
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_object_freeze(env: napi_env, object: napi_value) -> Result {
  let (ctx, _env) = env_ref(env)?;
  let obj = object_arg(&ctx, object)?;
  obj.sealed.set(true);
  obj.frozen.set(true);
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_object_seal(env: napi_env, object: napi_value) -> Result {
  let (ctx, _env) = env_ref(env)?;
  let obj = object_arg(&ctx, object)?;
  obj.sealed.set(true);
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_type_tag_object(
  env: napi_env,
  value: napi_value,
  type_tag: *const napi_type_tag,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(type_tag);
  let obj = object_arg(&ctx, value)?;
  if obj.type_tag.get().is_some() {
    return Err(Error::InvalidArg);
  }
  // SAFETY: caller-provided tag struct.
  obj.type_tag.set(Some(unsafe { *type_tag }));
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_check_object_type_tag(
  env: napi_env,
  value: napi_value,
  type_tag: *const napi_type_tag,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(type_tag);
  check_arg!(result);
  let obj = object_arg(&ctx, value)?;
  // SAFETY: caller-provided tag struct.
  let tag = unsafe { *type_tag };
  *result = obj.type_tag.get() == Some(tag);
  Ok(())
}

// Functions and classes

#[napi_sym::napi_sym]
fn napi_create_function(
  env: napi_env,
  utf8name: *const c_char,
  length: usize,
  cb: napi_callback,
  data: *mut c_void,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  if cb.is_none() {
    return Err(Error::InvalidArg);
  }
  let name = if utf8name.is_null() {
    std::borrow::Cow::Borrowed("anonymous")
  } else {
    read_utf8(utf8name, length)?
  };
  let func = create_function(env.id, &name, cb, data);
  *result = add_value(&ctx, &env, Value::Object(func))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_call_function(
  env: napi_env,
  recv: napi_value,
  func: napi_value,
  argc: usize,
  argv: *const napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_pending(&env)?;
  let func = object_arg(&ctx, func).map_err(|_| Error::FunctionExpected)?;
  if func.function_data().is_none() {
    return Err(Error::FunctionExpected);
  }
  let this = if recv.is_null() {
    Value::Undefined
  } else {
    value_arg(&ctx, recv)?
  };
  let args = read_args(&ctx, argc, argv)?;
  let value = ctx
    .call_function(&env, &func, this, &args)
    .map_err(|err| raise(&env, err))?;
  if !result.is_null() {
    *result = add_value(&ctx, &env, value)? as napi_value;
  }
  Ok(())
}

// There is no async-context bookkeeping to restore; calling back into the
// host is a plain call here.
#[napi_sym::napi_sym]
fn napi_make_callback(
  env: napi_env,
  _async_context: napi_async_context,
  recv: napi_value,
  func: napi_value,
  argc: usize,
  argv: *const napi_value,
  result: *mut napi_value,
) -> Result {
  match napi_call_function(env, recv, func, argc, argv, result) {
    napi_ok => Ok(()),
    status => Err(status_error(status)),
  }
}

#[napi_sym::napi_sym]
fn napi_new_instance(
  env: napi_env,
  constructor: napi_value,
  argc: usize,
  argv: *const napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_pending(&env)?;
  let ctor =
    object_arg(&ctx, constructor).map_err(|_| Error::FunctionExpected)?;
  if ctor.function_data().is_none() {
    return Err(Error::FunctionExpected);
  }
  let args = read_args(&ctx, argc, argv)?;
  let instance = ctx
    .new_instance(&env, &ctor, &args)
    .map_err(|err| raise(&env, err))?;
  *result = add_value(&ctx, &env, instance)? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_cb_info(
  env: napi_env,
  cbinfo: napi_callback_info,
  argc: *mut usize,
  argv: *mut napi_value,
  this_arg: *mut napi_value,
  data: *mut *mut c_void,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(cbinfo);

  // Clone out of the scope store before storing anything back into it.
  let (args, this, cb_data) = {
    let scopes = ctx.scopes.borrow();
    let info = scopes
      .get(cbinfo as usize)
      .and_then(|scope| scope.callback_info.as_ref())
      .ok_or(Error::InvalidArg)?;
    (info.args.clone(), info.this.clone(), info.data)
  };

  if !argv.is_null() {
    check_arg!(argc);
    let requested = *argc;
    // SAFETY: argv has room for `requested` handles.
    let out = std::slice::from_raw_parts_mut(argv, requested);
    for (i, slot) in out.iter_mut().enumerate() {
      *slot = match args.get(i) {
        Some(value) => add_value(&ctx, &env, value.clone())? as napi_value,
        None => napi_host_core::consts::UNDEFINED as napi_value,
      };
    }
  }
  if !argc.is_null() {
    *argc = args.len();
  }
  if !this_arg.is_null() {
    *this_arg = add_value(&ctx, &env, this)? as napi_value;
  }
  if !data.is_null() {
    *data = cb_data;
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_new_target(
  env: napi_env,
  cbinfo: napi_callback_info,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(cbinfo);
  check_arg!(result);
  let new_target = {
    let scopes = ctx.scopes.borrow();
    scopes
      .get(cbinfo as usize)
      .and_then(|scope| scope.callback_info.as_ref())
      .ok_or(Error::InvalidArg)?
      .new_target
      .clone()
  };
  *result = match new_target {
    Some(target) => add_value(&ctx, &env, target)? as napi_value,
    None => std::ptr::null_mut(),
  };
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_define_class(
  env: napi_env,
  utf8name: *const c_char,
  length: usize,
  constructor: napi_callback,
  data: *mut c_void,
  property_count: usize,
  properties: *const napi_property_descriptor,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  if constructor.is_none() {
    return Err(Error::InvalidArg);
  }
  let name = read_utf8(utf8name, length)?;

  let mut template = ClassTemplate::default();
  let mut statics: Vec<(Rc<str>, Property)> = Vec::new();
  if property_count > 0 {
    check_arg!(properties);
    // SAFETY: descriptor array of property_count entries.
    let descriptors =
      unsafe { std::slice::from_raw_parts(properties, property_count) };
    for descriptor in descriptors {
      let (key, prop) =
        unsafe { property_from_descriptor(&ctx, &env, descriptor)? };
      if descriptor.attributes & napi_static != 0 {
        statics.push((key, prop));
      } else {
        template.instance.push((key, prop));
      }
    }
  }

  let ctor = create_constructor(env.id, &name, constructor, data, template);
  {
    let mut props = ctor.props.borrow_mut();
    for (key, prop) in statics {
      props.insert(key, prop);
    }
  }
  *result = add_value(&ctx, &env, Value::Object(ctor))? as napi_value;
  Ok(())
}

// Wraps

#[napi_sym::napi_sym]
fn napi_wrap(
  env: napi_env,
  js_object: napi_value,
  native_object: *mut c_void,
  finalize_cb: Option<napi_finalize>,
  finalize_hint: *mut c_void,
  result: *mut napi_ref,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  let obj = object_arg(&ctx, js_object)?;
  if obj.wrap.borrow().is_some() {
    return Err(Error::InvalidArg);
  }

  let ownership = if result.is_null() {
    Ownership::Runtime
  } else {
    Ownership::Userland
  };
  let reference = match finalize_cb {
    Some(cb) => ctx.create_reference_with_finalizer(
      &env,
      Value::Object(obj.clone()),
      0,
      ownership,
      FinalizerRecord {
        cb,
        data: native_object,
        hint: finalize_hint,
      },
    ),
    None => {
      ctx.create_reference(&env, Value::Object(obj.clone()), 0, ownership)
    }
  };

  *obj.wrap.borrow_mut() = Some(Wrap {
    native: native_object,
    ref_id: reference.id,
  });
  if !result.is_null() {
    *result = reference.id as usize as napi_ref;
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_unwrap(
  env: napi_env,
  js_object: napi_value,
  result: *mut *mut c_void,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  let obj = object_arg(&ctx, js_object)?;
  let wrap = obj.wrap.borrow();
  let wrap = wrap.as_ref().ok_or(Error::InvalidArg)?;
  *result = wrap.native;
  Ok(())
}

/// Surrenders the association: the native pointer comes back, the
/// finalizer is disarmed, the pinning reference dies.
#[napi_sym::napi_sym]
fn napi_remove_wrap(
  env: napi_env,
  js_object: napi_value,
  result: *mut *mut c_void,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  let obj = object_arg(&ctx, js_object)?;
  let wrap = obj.wrap.borrow_mut().take().ok_or(Error::InvalidArg)?;
  ctx.delete_reference(&env, wrap.ref_id as usize as napi_ref)?;
  if !result.is_null() {
    *result = wrap.native;
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_external(
  env: napi_env,
  data: *mut c_void,
  finalize_cb: Option<napi_finalize>,
  finalize_hint: *mut c_void,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let external = Obj::new(ObjKind::External(ExternalData { data }));
  if let Some(cb) = finalize_cb {
    ctx.create_reference_with_finalizer(
      &env,
      Value::Object(external.clone()),
      0,
      Ownership::Runtime,
      FinalizerRecord {
        cb,
        data,
        hint: finalize_hint,
      },
    );
  }
  *result = add_value(&ctx, &env, Value::Object(external))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_add_finalizer(
  env: napi_env,
  js_object: napi_value,
  finalize_data: *mut c_void,
  finalize_cb: Option<napi_finalize>,
  finalize_hint: *mut c_void,
  result: *mut napi_ref,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  let obj = object_arg(&ctx, js_object)?;
  let cb = finalize_cb.ok_or(Error::InvalidArg)?;
  let ownership = if result.is_null() {
    Ownership::Runtime
  } else {
    Ownership::Userland
  };
  let reference = ctx.create_reference_with_finalizer(
    &env,
    Value::Object(obj),
    0,
    ownership,
    FinalizerRecord {
      cb,
      data: finalize_data,
      hint: finalize_hint,
    },
  );
  if !result.is_null() {
    *result = reference.id as usize as napi_ref;
  }
  Ok(())
}

// References

#[napi_sym::napi_sym]
fn napi_create_reference(
  env: napi_env,
  value: napi_value,
  initial_refcount: u32,
  result: *mut napi_ref,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let value = value_arg(&ctx, value)?;
  let reference =
    ctx.create_reference(&env, value, initial_refcount, Ownership::Userland);
  *result = reference.id as usize as napi_ref;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_delete_reference(env: napi_env, reference: napi_ref) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(reference);
  ctx.delete_reference(&env, reference)
}

#[napi_sym::napi_sym]
fn napi_reference_ref(
  env: napi_env,
  reference: napi_ref,
  result: *mut u32,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(reference);
  let reference = ctx.reference(reference).ok_or(Error::InvalidArg)?;
  let count = reference.ref_();
  if !result.is_null() {
    *result = count;
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_reference_unref(
  env: napi_env,
  reference: napi_ref,
  result: *mut u32,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(reference);
  let reference = ctx.reference(reference).ok_or(Error::InvalidArg)?;
  let count = reference.unref();
  if !result.is_null() {
    *result = count;
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_reference_value(
  env: napi_env,
  reference: napi_ref,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(reference);
  check_arg!(result);
  let reference = ctx.reference(reference).ok_or(Error::InvalidArg)?;
  *result = match reference.get() {
    // Collected target: the empty-handle sentinel.
    None => std::ptr::null_mut(),
    Some(value) => add_value(&ctx, &env, value)? as napi_value,
  };
  Ok(())
}

// Scopes

#[napi_sym::napi_sym]
fn napi_open_handle_scope(
  env: napi_env,
  result: *mut napi_handle_scope,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = ctx.open_scope(&env) as napi_handle_scope;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_close_handle_scope(env: napi_env, scope: napi_handle_scope) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(scope);
  ctx.close_scope(&env, scope as usize)
}

#[napi_sym::napi_sym]
fn napi_open_escapable_handle_scope(
  env: napi_env,
  result: *mut napi_escapable_handle_scope,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = ctx.open_scope(&env) as napi_escapable_handle_scope;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_close_escapable_handle_scope(
  env: napi_env,
  scope: napi_escapable_handle_scope,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(scope);
  ctx.close_scope(&env, scope as usize)
}

#[napi_sym::napi_sym]
fn napi_escape_handle(
  env: napi_env,
  scope: napi_escapable_handle_scope,
  escapee: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(scope);
  check_arg!(escapee);
  check_arg!(result);
  let escaped = ctx.escape(scope as usize, escapee as usize)?;
  *result = escaped as napi_value;
  Ok(())
}

// Errors and exceptions

#[napi_sym::napi_sym]
fn napi_throw(env: napi_env, error: napi_value) -> Result {
  let (ctx, env) = env_ref(env)?;
  let error = value_arg(&ctx, error)?;
  env.throw(error);
  Ok(())
}

fn throw_with_class(
  env: napi_env,
  class: ErrorClass,
  code: *const c_char,
  msg: *const c_char,
) -> Result {
  let (_, env) = env_ref(env)?;
  let msg = read_utf8(msg, NAPI_AUTO_LENGTH)?;
  let code = if code.is_null() {
    None
  } else {
    Some(read_utf8(code, NAPI_AUTO_LENGTH)?)
  };
  env.throw(Value::Object(Obj::error(class, msg, code.as_deref())));
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_throw_error(
  env: napi_env,
  code: *const c_char,
  msg: *const c_char,
) -> Result {
  throw_with_class(env, ErrorClass::Error, code, msg)
}

#[napi_sym::napi_sym]
fn napi_throw_type_error(
  env: napi_env,
  code: *const c_char,
  msg: *const c_char,
) -> Result {
  throw_with_class(env, ErrorClass::TypeError, code, msg)
}

#[napi_sym::napi_sym]
fn napi_throw_range_error(
  env: napi_env,
  code: *const c_char,
  msg: *const c_char,
) -> Result {
  throw_with_class(env, ErrorClass::RangeError, code, msg)
}

fn create_error_with_class(
  env: napi_env,
  class: ErrorClass,
  code: napi_value,
  msg: napi_value,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let Value::Str(message) = value_arg(&ctx, msg)? else {
    return Err(Error::StringExpected);
  };
  let code = if code.is_null() {
    None
  } else {
    match value_arg(&ctx, code)? {
      Value::Str(code) => Some(code),
      _ => None,
    }
  };
  let error = Obj::error(class, message, code.as_deref());
  // SAFETY: result checked non-null above.
  unsafe {
    *result = add_value(&ctx, &env, Value::Object(error))? as napi_value;
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_error(
  env: napi_env,
  code: napi_value,
  msg: napi_value,
  result: *mut napi_value,
) -> Result {
  create_error_with_class(env, ErrorClass::Error, code, msg, result)
}

#[napi_sym::napi_sym]
fn napi_create_type_error(
  env: napi_env,
  code: napi_value,
  msg: napi_value,
  result: *mut napi_value,
) -> Result {
  create_error_with_class(env, ErrorClass::TypeError, code, msg, result)
}

#[napi_sym::napi_sym]
fn napi_create_range_error(
  env: napi_env,
  code: napi_value,
  msg: napi_value,
  result: *mut napi_value,
) -> Result {
  create_error_with_class(env, ErrorClass::RangeError, code, msg, result)
}

#[napi_sym::napi_sym]
fn napi_is_exception_pending(env: napi_env, result: *mut bool) -> Result {
  let (_, env) = env_ref(env)?;
  check_arg!(result);
  *result = env.has_pending_exception();
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_and_clear_last_exception(
  env: napi_env,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  *result = match env.take_exception() {
    Some(exception) => add_value(&ctx, &env, exception)? as napi_value,
    None => napi_host_core::consts::UNDEFINED as napi_value,
  };
  Ok(())
}

// ArrayBuffers, typed arrays, data views, buffers

#[napi_sym::napi_sym]
fn napi_create_arraybuffer(
  env: napi_env,
  byte_length: usize,
  data: *mut *mut c_void,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let buffer = ArrayBufferData::new(byte_length);
  if !data.is_null() {
    *data = buffer.data_ptr() as *mut c_void;
  }
  let obj = Obj::new(ObjKind::ArrayBuffer(buffer));
  *result = add_value(&ctx, &env, Value::Object(obj))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_external_arraybuffer(
  env: napi_env,
  external_data: *mut c_void,
  byte_length: usize,
  finalize_cb: Option<napi_finalize>,
  finalize_hint: *mut c_void,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_arg!(external_data);
  let buffer = ArrayBufferData::external(external_data as *mut u8, byte_length);
  let obj = Obj::new(ObjKind::ArrayBuffer(buffer));
  if let Some(cb) = finalize_cb {
    ctx.create_reference_with_finalizer(
      &env,
      Value::Object(obj.clone()),
      0,
      Ownership::Runtime,
      FinalizerRecord {
        cb,
        data: external_data,
        hint: finalize_hint,
      },
    );
  }
  *result = add_value(&ctx, &env, Value::Object(obj))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_arraybuffer_info(
  env: napi_env,
  arraybuffer: napi_value,
  data: *mut *mut c_void,
  byte_length: *mut usize,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  let obj =
    object_arg(&ctx, arraybuffer).map_err(|_| Error::ArrayBufferExpected)?;
  let ObjKind::ArrayBuffer(buffer) = &obj.kind else {
    return Err(Error::ArrayBufferExpected);
  };
  if !data.is_null() {
    *data = buffer.data_ptr() as *mut c_void;
  }
  if !byte_length.is_null() {
    *byte_length = buffer.byte_length();
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_detach_arraybuffer(env: napi_env, arraybuffer: napi_value) -> Result {
  let (ctx, _env) = env_ref(env)?;
  let obj =
    object_arg(&ctx, arraybuffer).map_err(|_| Error::ArrayBufferExpected)?;
  let ObjKind::ArrayBuffer(buffer) = &obj.kind else {
    return Err(Error::ArrayBufferExpected);
  };
  buffer.detach()
}

#[napi_sym::napi_sym]
fn napi_is_detached_arraybuffer(
  env: napi_env,
  value: napi_value,
  result: *mut bool,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(result);
  *result = match value_arg(&ctx, value)? {
    Value::Object(obj) => match &obj.kind {
      ObjKind::ArrayBuffer(buffer) => buffer.is_detached(),
      _ => false,
    },
    _ => false,
  };
  Ok(())
}

fn checked_view(
  ctx: &Context,
  env: &Env,
  arraybuffer: napi_value,
  byte_offset: usize,
  byte_length: usize,
) -> Result<Rc<Obj>> {
  let buffer_obj = object_arg(ctx, arraybuffer)?;
  let ObjKind::ArrayBuffer(buffer) = &buffer_obj.kind else {
    return Err(Error::InvalidArg);
  };
  if byte_offset + byte_length > buffer.byte_length() {
    env.throw(Value::Object(Obj::error(
      ErrorClass::RangeError,
      "view exceeds the bounds of its backing buffer",
      Some("ERR_BUFFER_OUT_OF_BOUNDS"),
    )));
    return Err(Error::GenericFailure);
  }
  Ok(buffer_obj)
}

#[napi_sym::napi_sym]
fn napi_create_typedarray(
  env: napi_env,
  array_type: napi_typedarray_type,
  length: usize,
  arraybuffer: napi_value,
  byte_offset: usize,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let element_size =
    typedarray_element_size(array_type).ok_or(Error::InvalidArg)?;
  let buffer =
    checked_view(&ctx, &env, arraybuffer, byte_offset, length * element_size)?;
  let view = Obj::new(ObjKind::TypedArray(TypedArrayData {
    buffer,
    array_type,
    byte_offset,
    length,
  }));
  *result = add_value(&ctx, &env, Value::Object(view))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_typedarray_info(
  env: napi_env,
  typedarray: napi_value,
  array_type: *mut napi_typedarray_type,
  length: *mut usize,
  data: *mut *mut c_void,
  arraybuffer: *mut napi_value,
  byte_offset: *mut usize,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  let obj = object_arg(&ctx, typedarray).map_err(|_| Error::InvalidArg)?;
  let ObjKind::TypedArray(view) = &obj.kind else {
    return Err(Error::InvalidArg);
  };
  if !array_type.is_null() {
    *array_type = view.array_type;
  }
  if !length.is_null() {
    *length = view.length;
  }
  if !data.is_null() {
    *data = view.data_ptr() as *mut c_void;
  }
  if !arraybuffer.is_null() {
    *arraybuffer =
      add_value(&ctx, &env, Value::Object(view.buffer.clone()))? as napi_value;
  }
  if !byte_offset.is_null() {
    *byte_offset = view.byte_offset;
  }
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_dataview(
  env: napi_env,
  byte_length: usize,
  arraybuffer: napi_value,
  byte_offset: usize,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let buffer = checked_view(&ctx, &env, arraybuffer, byte_offset, byte_length)?;
  let view = Obj::new(ObjKind::DataView(DataViewData {
    buffer,
    byte_offset,
    byte_length,
  }));
  *result = add_value(&ctx, &env, Value::Object(view))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_dataview_info(
  env: napi_env,
  dataview: napi_value,
  byte_length: *mut usize,
  data: *mut *mut c_void,
  arraybuffer: *mut napi_value,
  byte_offset: *mut usize,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  let obj = object_arg(&ctx, dataview).map_err(|_| Error::InvalidArg)?;
  let ObjKind::DataView(view) = &obj.kind else {
    return Err(Error::InvalidArg);
  };
  if !byte_length.is_null() {
    *byte_length = view.byte_length;
  }
  if !data.is_null() {
    *data = view.data_ptr() as *mut c_void;
  }
  if !arraybuffer.is_null() {
    *arraybuffer =
      add_value(&ctx, &env, Value::Object(view.buffer.clone()))? as napi_value;
  }
  if !byte_offset.is_null() {
    *byte_offset = view.byte_offset;
  }
  Ok(())
}

fn buffer_from_arraybuffer(
  ctx: &Context,
  env: &Env,
  buffer: ArrayBufferData,
  size: usize,
) -> Result<(usize, *mut u8)> {
  let data_ptr = buffer.data_ptr();
  let buffer_obj = Obj::new(ObjKind::ArrayBuffer(buffer));
  let view = Obj::new(ObjKind::TypedArray(TypedArrayData {
    buffer: buffer_obj,
    array_type: napi_uint8_array,
    byte_offset: 0,
    length: size,
  }));
  let handle = add_value(ctx, env, Value::Object(view))?;
  Ok((handle, data_ptr))
}

#[napi_sym::napi_sym]
fn napi_create_buffer(
  env: napi_env,
  size: usize,
  data: *mut *mut c_void,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let (handle, ptr) =
    buffer_from_arraybuffer(&ctx, &env, ArrayBufferData::new(size), size)?;
  if !data.is_null() {
    *data = ptr as *mut c_void;
  }
  *result = handle as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_buffer_copy(
  env: napi_env,
  length: usize,
  data: *const c_void,
  result_data: *mut *mut c_void,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  let mut bytes = vec![0u8; length];
  if !data.is_null() && length > 0 {
    // SAFETY: source buffer of `length` bytes per the caller.
    std::ptr::copy_nonoverlapping(
      data as *const u8,
      bytes.as_mut_ptr(),
      length,
    );
  }
  let (handle, ptr) = buffer_from_arraybuffer(
    &ctx,
    &env,
    ArrayBufferData::from_vec(bytes),
    length,
  )?;
  if !result_data.is_null() {
    *result_data = ptr as *mut c_void;
  }
  *result = handle as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_create_external_buffer(
  env: napi_env,
  length: usize,
  data: *mut c_void,
  finalize_cb: Option<napi_finalize>,
  finalize_hint: *mut c_void,
  result: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(result);
  check_arg!(data);
  let buffer_obj = Obj::new(ObjKind::ArrayBuffer(ArrayBufferData::external(
    data as *mut u8,
    length,
  )));
  let view = Obj::new(ObjKind::TypedArray(TypedArrayData {
    buffer: buffer_obj.clone(),
    array_type: napi_uint8_array,
    byte_offset: 0,
    length,
  }));
  if let Some(cb) = finalize_cb {
    ctx.create_reference_with_finalizer(
      &env,
      Value::Object(buffer_obj),
      0,
      Ownership::Runtime,
      FinalizerRecord {
        cb,
        data,
        hint: finalize_hint,
      },
    );
  }
  *result = add_value(&ctx, &env, Value::Object(view))? as napi_value;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_buffer_info(
  env: napi_env,
  value: napi_value,
  data: *mut *mut c_void,
  length: *mut usize,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  let obj = object_arg(&ctx, value).map_err(|_| Error::InvalidArg)?;
  let (ptr, len) = match &obj.kind {
    ObjKind::TypedArray(view) => (view.data_ptr(), view.length),
    ObjKind::DataView(view) => (view.data_ptr(), view.byte_length),
    _ => return Err(Error::InvalidArg),
  };
  if !data.is_null() {
    *data = ptr as *mut c_void;
  }
  if !length.is_null() {
    *length = len;
  }
  Ok(())
}

// Promises

#[napi_sym::napi_sym]
fn napi_create_promise(
  env: napi_env,
  deferred: *mut napi_deferred,
  promise: *mut napi_value,
) -> Result {
  let (ctx, env) = env_ref(env)?;
  check_arg!(deferred);
  check_arg!(promise);
  let (deferred_id, promise_obj) = ctx.create_promise();
  *promise = add_value(&ctx, &env, Value::Object(promise_obj))? as napi_value;
  *deferred = deferred_id as napi_deferred;
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_resolve_deferred(
  env: napi_env,
  deferred: napi_deferred,
  resolution: napi_value,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(deferred);
  let value = value_arg(&ctx, resolution)?;
  ctx.settle_deferred(deferred, value, false)
}

#[napi_sym::napi_sym]
fn napi_reject_deferred(
  env: napi_env,
  deferred: napi_deferred,
  rejection: napi_value,
) -> Result {
  let (ctx, _env) = env_ref(env)?;
  check_arg!(deferred);
  let value = value_arg(&ctx, rejection)?;
  ctx.settle_deferred(deferred, value, true)
}

// Instance data and memory accounting

#[napi_sym::napi_sym]
fn napi_set_instance_data(
  env: napi_env,
  data: *mut c_void,
  finalize_cb: Option<napi_finalize>,
  finalize_hint: *mut c_void,
) -> Result {
  let (_, env) = env_ref(env)?;
  *env.instance_data.borrow_mut() = Some(InstanceData {
    data,
    finalize_cb,
    finalize_hint,
  });
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_get_instance_data(env: napi_env, data: *mut *mut c_void) -> Result {
  let (_, env) = env_ref(env)?;
  check_arg!(data);
  *data = env
    .instance_data
    .borrow()
    .as_ref()
    .map(|d| d.data)
    .unwrap_or(std::ptr::null_mut());
  Ok(())
}

#[napi_sym::napi_sym]
fn napi_adjust_external_memory(
  env: napi_env,
  change_in_bytes: i64,
  adjusted_value: *mut i64,
) -> Result {
  let (_, env) = env_ref(env)?;
  check_arg!(adjusted_value);
  let adjusted = env.external_memory.get() + change_in_bytes;
  env.external_memory.set(adjusted);
  *adjusted_value = adjusted;
  Ok(())
}
