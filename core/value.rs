// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! The host value model. The runtime owns every script-side value an add-on
//! can observe; `napi_value` handles index into storage of these.

use std::cell::Cell;
use std::cell::RefCell;
use std::os::raw::c_void;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::Error;
use crate::error::Result;
use crate::function::FunctionData;
use crate::reference::FinalizerGuard;
use crate::types::*;

#[derive(Clone, Debug)]
pub enum Value {
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  // Approximation: one native integer instead of arbitrary words.
  BigInt(i128),
  Str(Rc<str>),
  Object(Rc<Obj>),
}

impl Value {
  pub fn string(s: impl AsRef<str>) -> Value {
    Value::Str(Rc::from(s.as_ref()))
  }

  pub fn type_of(&self) -> napi_valuetype {
    match self {
      Value::Undefined => napi_undefined,
      Value::Null => napi_null,
      Value::Bool(_) => napi_boolean,
      Value::Number(_) => napi_number,
      Value::BigInt(_) => napi_bigint,
      Value::Str(_) => napi_string,
      Value::Object(obj) => match obj.kind {
        ObjKind::Function(_) => napi_function,
        ObjKind::External(_) => napi_external,
        ObjKind::Symbol(_) => napi_symbol,
        _ => napi_object,
      },
    }
  }

  /// Same type and same value; object identity is pointer identity.
  /// `NaN != NaN` falls out of the f64 comparison.
  pub fn strict_equals(&self, other: &Value) -> bool {
    match (self, other) {
      (Value::Undefined, Value::Undefined) => true,
      (Value::Null, Value::Null) => true,
      (Value::Bool(a), Value::Bool(b)) => a == b,
      (Value::Number(a), Value::Number(b)) => a == b,
      (Value::BigInt(a), Value::BigInt(b)) => a == b,
      (Value::Str(a), Value::Str(b)) => a == b,
      (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
      _ => false,
    }
  }

  pub fn truthy(&self) -> bool {
    match self {
      Value::Undefined | Value::Null => false,
      Value::Bool(b) => *b,
      Value::Number(n) => *n != 0.0 && !n.is_nan(),
      Value::BigInt(n) => *n != 0,
      Value::Str(s) => !s.is_empty(),
      Value::Object(_) => true,
    }
  }

  pub fn coerce_to_number(&self) -> f64 {
    match self {
      Value::Undefined => f64::NAN,
      Value::Null => 0.0,
      Value::Bool(b) => {
        if *b {
          1.0
        } else {
          0.0
        }
      }
      Value::Number(n) => *n,
      Value::BigInt(n) => *n as f64,
      Value::Str(s) => {
        let t = s.trim();
        if t.is_empty() {
          0.0
        } else {
          t.parse::<f64>().unwrap_or(f64::NAN)
        }
      }
      Value::Object(obj) => match &obj.kind {
        ObjKind::Date(ms) => ms.get(),
        _ => f64::NAN,
      },
    }
  }

  pub fn coerce_to_string(&self) -> String {
    match self {
      Value::Undefined => "undefined".to_string(),
      Value::Null => "null".to_string(),
      Value::Bool(b) => b.to_string(),
      Value::Number(n) => number_to_string(*n),
      Value::BigInt(n) => n.to_string(),
      Value::Str(s) => s.to_string(),
      Value::Object(obj) => obj.to_display_string(),
    }
  }

  pub fn as_object(&self) -> Result<&Rc<Obj>> {
    match self {
      Value::Object(obj) => Ok(obj),
      _ => Err(Error::ObjectExpected),
    }
  }
}

/// JS-flavored number formatting: integral doubles print without the
/// fraction, non-finite values by name.
pub fn number_to_string(n: f64) -> String {
  if n.is_nan() {
    "NaN".to_string()
  } else if n.is_infinite() {
    if n > 0.0 {
      "Infinity".to_string()
    } else {
      "-Infinity".to_string()
    }
  } else if n == n.trunc() && n.abs() < 1e21 {
    format!("{}", n as i64)
  } else {
    format!("{}", n)
  }
}

#[derive(Debug)]
pub struct Obj {
  pub kind: ObjKind,
  pub props: RefCell<IndexMap<Rc<str>, Property>>,
  pub frozen: Cell<bool>,
  pub sealed: Cell<bool>,
  pub wrap: RefCell<Option<Wrap>>,
  pub type_tag: Cell<Option<napi_type_tag>>,
  pub guards: RefCell<Vec<FinalizerGuard>>,
}

#[derive(Debug)]
pub enum ObjKind {
  Plain,
  Array(RefCell<Vec<Value>>),
  Error(ErrorData),
  Function(FunctionData),
  External(ExternalData),
  ArrayBuffer(ArrayBufferData),
  TypedArray(TypedArrayData),
  DataView(DataViewData),
  Promise(RefCell<PromiseState>),
  Date(Cell<f64>),
  Symbol(Option<Rc<str>>),
}

impl Obj {
  pub fn new(kind: ObjKind) -> Rc<Obj> {
    Rc::new(Obj {
      kind,
      props: RefCell::new(IndexMap::new()),
      frozen: Cell::new(false),
      sealed: Cell::new(false),
      wrap: RefCell::new(None),
      type_tag: Cell::new(None),
      guards: RefCell::new(Vec::new()),
    })
  }

  pub fn plain() -> Rc<Obj> {
    Obj::new(ObjKind::Plain)
  }

  pub fn array(elements: Vec<Value>) -> Rc<Obj> {
    Obj::new(ObjKind::Array(RefCell::new(elements)))
  }

  pub fn error(
    class: ErrorClass,
    message: impl AsRef<str>,
    code: Option<&str>,
  ) -> Rc<Obj> {
    let message: Rc<str> = Rc::from(message.as_ref());
    let obj = Obj::new(ObjKind::Error(ErrorData {
      class,
      message: message.clone(),
    }));
    {
      let mut props = obj.props.borrow_mut();
      props.insert(
        Rc::from("message"),
        Property::data(Value::Str(message), napi_default_jsproperty),
      );
      props.insert(
        Rc::from("name"),
        Property::data(Value::string(class.name()), napi_default_jsproperty),
      );
      if let Some(code) = code {
        props.insert(
          Rc::from("code"),
          Property::data(Value::string(code), napi_default_jsproperty),
        );
      }
    }
    obj
  }

  pub fn is_array(&self) -> bool {
    matches!(self.kind, ObjKind::Array(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self.kind, ObjKind::Error(_))
  }

  pub fn is_arraybuffer(&self) -> bool {
    matches!(self.kind, ObjKind::ArrayBuffer(_))
  }

  pub fn is_typedarray(&self) -> bool {
    matches!(self.kind, ObjKind::TypedArray(_))
  }

  pub fn is_dataview(&self) -> bool {
    matches!(self.kind, ObjKind::DataView(_))
  }

  /// Node buffers are uint8 views in this model.
  pub fn is_buffer(&self) -> bool {
    matches!(
      &self.kind,
      ObjKind::TypedArray(view) if view.array_type == napi_uint8_array
    )
  }

  pub fn is_promise(&self) -> bool {
    matches!(self.kind, ObjKind::Promise(_))
  }

  pub fn is_date(&self) -> bool {
    matches!(self.kind, ObjKind::Date(_))
  }

  pub fn function_data(&self) -> Option<&FunctionData> {
    match &self.kind {
      ObjKind::Function(data) => Some(data),
      _ => None,
    }
  }

  fn to_display_string(&self) -> String {
    match &self.kind {
      ObjKind::Array(elements) => elements
        .borrow()
        .iter()
        .map(Value::coerce_to_string)
        .collect::<Vec<_>>()
        .join(","),
      ObjKind::Error(data) => {
        if data.message.is_empty() {
          data.class.name().to_string()
        } else {
          format!("{}: {}", data.class.name(), data.message)
        }
      }
      ObjKind::Function(data) => {
        format!("function {}() {{ [native code] }}", data.name())
      }
      ObjKind::Symbol(desc) => {
        format!("Symbol({})", desc.as_deref().unwrap_or(""))
      }
      ObjKind::Date(ms) => format!("[date {}]", ms.get()),
      _ => "[object Object]".to_string(),
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
  Error,
  TypeError,
  RangeError,
}

impl ErrorClass {
  pub fn name(self) -> &'static str {
    match self {
      ErrorClass::Error => "Error",
      ErrorClass::TypeError => "TypeError",
      ErrorClass::RangeError => "RangeError",
    }
  }
}

#[derive(Debug)]
pub struct ErrorData {
  pub class: ErrorClass,
  pub message: Rc<str>,
}

#[derive(Debug)]
pub struct ExternalData {
  pub data: *mut c_void,
}

#[derive(Debug)]
pub enum PromiseState {
  Pending,
  Fulfilled(Value),
  Rejected(Value),
}

/// Native pointer association created by `napi_wrap`. The reference keeps
/// the finalizer record reachable for `napi_remove_wrap` to disarm.
#[derive(Debug)]
pub struct Wrap {
  pub native: *mut c_void,
  pub ref_id: u32,
}

#[derive(Clone, Debug)]
pub struct Property {
  pub value: PropertyValue,
  pub attributes: napi_property_attributes,
}

impl Property {
  pub fn data(value: Value, attributes: napi_property_attributes) -> Property {
    Property {
      value: PropertyValue::Data(value),
      attributes,
    }
  }

  pub fn enumerable(&self) -> bool {
    self.attributes & napi_enumerable != 0
  }

  pub fn writable(&self) -> bool {
    self.attributes & napi_writable != 0
  }

  pub fn configurable(&self) -> bool {
    self.attributes & napi_configurable != 0
  }
}

#[derive(Clone, Debug)]
pub enum PropertyValue {
  Data(Value),
  Accessor {
    getter: Option<Value>,
    setter: Option<Value>,
  },
}

#[derive(Debug)]
enum BufferStorage {
  Owned(Vec<u8>),
  External { ptr: *mut u8, len: usize },
}

#[derive(Debug)]
pub struct ArrayBufferData {
  storage: RefCell<BufferStorage>,
  detached: Cell<bool>,
}

impl ArrayBufferData {
  pub fn new(byte_length: usize) -> ArrayBufferData {
    ArrayBufferData {
      storage: RefCell::new(BufferStorage::Owned(vec![0; byte_length])),
      detached: Cell::new(false),
    }
  }

  pub fn from_vec(bytes: Vec<u8>) -> ArrayBufferData {
    ArrayBufferData {
      storage: RefCell::new(BufferStorage::Owned(bytes)),
      detached: Cell::new(false),
    }
  }

  /// Caller-owned memory; release is the caller's finalizer's business.
  pub fn external(ptr: *mut u8, len: usize) -> ArrayBufferData {
    ArrayBufferData {
      storage: RefCell::new(BufferStorage::External { ptr, len }),
      detached: Cell::new(false),
    }
  }

  // The owned Vec is never resized after creation, so the heap pointer is
  // stable for the buffer's lifetime.
  pub fn data_ptr(&self) -> *mut u8 {
    match &*self.storage.borrow() {
      BufferStorage::Owned(bytes) => bytes.as_ptr() as *mut u8,
      BufferStorage::External { ptr, .. } => *ptr,
    }
  }

  pub fn byte_length(&self) -> usize {
    if self.detached.get() {
      return 0;
    }
    match &*self.storage.borrow() {
      BufferStorage::Owned(bytes) => bytes.len(),
      BufferStorage::External { len, .. } => *len,
    }
  }

  pub fn is_detached(&self) -> bool {
    self.detached.get()
  }

  pub fn detach(&self) -> Result {
    if self.detached.get() {
      return Err(Error::DetachableArraybufferExpected);
    }
    self.detached.set(true);
    *self.storage.borrow_mut() = BufferStorage::Owned(Vec::new());
    Ok(())
  }
}

#[derive(Debug)]
pub struct TypedArrayData {
  pub buffer: Rc<Obj>,
  pub array_type: napi_typedarray_type,
  pub byte_offset: usize,
  /// Element count, not bytes.
  pub length: usize,
}

impl TypedArrayData {
  pub fn buffer_data(&self) -> &ArrayBufferData {
    match &self.buffer.kind {
      ObjKind::ArrayBuffer(data) => data,
      _ => unreachable!("typedarray backed by non-arraybuffer"),
    }
  }

  pub fn data_ptr(&self) -> *mut u8 {
    // SAFETY: offset lies inside the buffer, validated at construction.
    unsafe { self.buffer_data().data_ptr().add(self.byte_offset) }
  }
}

#[derive(Debug)]
pub struct DataViewData {
  pub buffer: Rc<Obj>,
  pub byte_offset: usize,
  pub byte_length: usize,
}

impl DataViewData {
  pub fn buffer_data(&self) -> &ArrayBufferData {
    match &self.buffer.kind {
      ObjKind::ArrayBuffer(data) => data,
      _ => unreachable!("dataview backed by non-arraybuffer"),
    }
  }

  pub fn data_ptr(&self) -> *mut u8 {
    // SAFETY: offset lies inside the buffer, validated at construction.
    unsafe { self.buffer_data().data_ptr().add(self.byte_offset) }
  }
}
