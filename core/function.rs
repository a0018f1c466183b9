// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! The callback trampoline: host-callable functions backed by native
//! callback pointers, the construction protocol for classes, and the
//! property engine (which must be able to invoke accessors).

use std::cell::RefCell;
use std::os::raw::c_void;
use std::rc::Rc;

use crate::context::Context;
use crate::env::Env;
use crate::scope::CallbackInfo;
use crate::types::*;
use crate::value::Obj;
use crate::value::ObjKind;
use crate::value::Property;
use crate::value::PropertyValue;
use crate::value::Value;

/// What a native function pointer becomes on the host side. The bundle is
/// pinned for the add-on's lifetime by the function object that carries it.
pub struct FunctionData {
  name: RefCell<Rc<str>>,
  pub cb: napi_callback,
  pub data: *mut c_void,
  pub env_id: usize,
  /// Present on constructors made by napi_define_class.
  pub template: Option<ClassTemplate>,
}

impl std::fmt::Debug for FunctionData {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FunctionData")
      .field("name", &self.name.borrow())
      .field("env_id", &self.env_id)
      .field("is_class", &self.template.is_some())
      .finish()
  }
}

impl FunctionData {
  pub fn name(&self) -> Rc<str> {
    self.name.borrow().clone()
  }

  pub fn set_name(&self, name: &str) {
    *self.name.borrow_mut() = Rc::from(name);
  }
}

/// Per-instance properties stamped onto every construction of a class.
#[derive(Debug, Default)]
pub struct ClassTemplate {
  pub instance: Vec<(Rc<str>, Property)>,
}

/// Why a host-side invocation did not produce a value.
#[derive(Debug)]
pub enum CallError {
  /// The callback left an exception pending; it is raised to the caller.
  Exception(Value),
  /// The runtime is tearing down and cannot run script-side code.
  CannotRunJs,
}

pub type CallResult = std::result::Result<Value, CallError>;

pub fn create_function(
  env_id: usize,
  name: &str,
  cb: napi_callback,
  data: *mut c_void,
) -> Rc<Obj> {
  Obj::new(ObjKind::Function(FunctionData {
    name: RefCell::new(Rc::from(name)),
    cb,
    data,
    env_id,
    template: None,
  }))
}

pub fn create_constructor(
  env_id: usize,
  name: &str,
  cb: napi_callback,
  data: *mut c_void,
  template: ClassTemplate,
) -> Rc<Obj> {
  Obj::new(ObjKind::Function(FunctionData {
    name: RefCell::new(Rc::from(name)),
    cb,
    data,
    env_id,
    template: Some(template),
  }))
}

impl Context {
  /// The trampoline. Opens a scope, parks the invocation record on it (the
  /// scope ID doubles as `napi_callback_info`), calls the native callback,
  /// surfaces a pending exception to the caller, and unwraps the returned
  /// handle before the scope closes.
  pub fn call_function(
    &self,
    env: &Rc<Env>,
    func: &Rc<Obj>,
    this: Value,
    args: &[Value],
  ) -> CallResult {
    self.invoke(env, func, this, args, None)
  }

  fn invoke(
    &self,
    env: &Rc<Env>,
    func: &Rc<Obj>,
    this: Value,
    args: &[Value],
    new_target: Option<Value>,
  ) -> CallResult {
    if env.destroying.get() {
      return Err(CallError::CannotRunJs);
    }
    let Some(data) = func.function_data() else {
      return Err(CallError::Exception(Value::Object(Obj::error(
        crate::value::ErrorClass::TypeError,
        "value is not a function",
        None,
      ))));
    };
    let Some(cb) = data.cb else {
      return Ok(Value::Undefined);
    };

    let scope_id = self.open_scope(env);
    self.scopes.borrow_mut().get_mut(scope_id).unwrap().callback_info =
      Some(CallbackInfo {
        this,
        args: args.to_vec(),
        data: data.data,
        new_target,
      });

    // SAFETY: calling into the add-on, which promised this pointer at
    // function-creation time.
    let ret = unsafe { cb(env.id as napi_env, scope_id as napi_callback_info) };

    let outcome = if let Some(exception) = env.take_exception() {
      Err(CallError::Exception(exception))
    } else if ret.is_null() {
      Ok(Value::Undefined)
    } else {
      Ok(self.value_from_handle(ret).unwrap_or(Value::Undefined))
    };

    let _ = self.close_scope(env, scope_id);
    outcome
  }

  /// Host-side `new`: stamp the class template onto a fresh object, run the
  /// constructor with `new_target` set. A constructor returning an object
  /// overrides the instance (JS construction semantics).
  pub fn new_instance(
    &self,
    env: &Rc<Env>,
    constructor: &Rc<Obj>,
    args: &[Value],
  ) -> CallResult {
    let instance = Obj::plain();
    if let Some(data) = constructor.function_data() {
      if let Some(template) = &data.template {
        let mut props = instance.props.borrow_mut();
        for (key, prop) in &template.instance {
          props.insert(key.clone(), prop.clone());
        }
      }
    }
    let ret = self.invoke(
      env,
      constructor,
      Value::Object(instance.clone()),
      args,
      Some(Value::Object(constructor.clone())),
    )?;
    Ok(match ret {
      Value::Object(obj) => Value::Object(obj),
      _ => Value::Object(instance),
    })
  }

  // Property engine. Accessors run through the trampoline, so these live
  // with it.

  pub fn get_property(
    &self,
    env: &Rc<Env>,
    obj: &Rc<Obj>,
    key: &str,
  ) -> CallResult {
    if let ObjKind::Array(elements) = &obj.kind {
      if key == "length" {
        return Ok(Value::Number(elements.borrow().len() as f64));
      }
    }
    let prop = {
      let props = obj.props.borrow();
      match props.get(key) {
        Some(prop) => match &prop.value {
          PropertyValue::Data(value) => return Ok(value.clone()),
          PropertyValue::Accessor { getter, .. } => getter.clone(),
        },
        None => return Ok(Value::Undefined),
      }
    };
    match prop {
      Some(Value::Object(getter)) => {
        self.call_function(env, &getter, Value::Object(obj.clone()), &[])
      }
      _ => Ok(Value::Undefined),
    }
  }

  /// Sloppy-mode semantics: writes to frozen objects, non-writable
  /// properties and setter-less accessors are silently dropped.
  pub fn set_property(
    &self,
    env: &Rc<Env>,
    obj: &Rc<Obj>,
    key: &str,
    value: Value,
  ) -> std::result::Result<(), CallError> {
    if obj.frozen.get() {
      return Ok(());
    }
    enum Action {
      CallSetter(Value),
      Done,
    }
    let action = {
      let mut props = obj.props.borrow_mut();
      match props.get_mut(key) {
        Some(prop) => match &mut prop.value {
          PropertyValue::Data(slot) => {
            if prop.attributes & napi_writable != 0 {
              *slot = value.clone();
            }
            Action::Done
          }
          PropertyValue::Accessor { setter, .. } => match setter {
            Some(setter) => Action::CallSetter(setter.clone()),
            None => Action::Done,
          },
        },
        None => {
          if !obj.sealed.get() {
            props.insert(
              Rc::from(key),
              Property::data(value.clone(), napi_default_jsproperty),
            );
          }
          Action::Done
        }
      }
    };
    if let Action::CallSetter(Value::Object(setter)) = action {
      self
        .call_function(env, &setter, Value::Object(obj.clone()), &[value])
        .map(|_| ())
    } else {
      Ok(())
    }
  }

  pub fn has_property(&self, obj: &Rc<Obj>, key: &str) -> bool {
    if obj.is_array() && key == "length" {
      return true;
    }
    obj.props.borrow().contains_key(key)
  }

  /// JS `delete`: true unless the property exists and is non-configurable.
  pub fn delete_property(&self, obj: &Rc<Obj>, key: &str) -> bool {
    let mut props = obj.props.borrow_mut();
    match props.get(key) {
      Some(prop) if !prop.configurable() => false,
      Some(_) => {
        props.shift_remove(key);
        true
      }
      None => true,
    }
  }

  /// Own enumerable string keys, insertion order.
  pub fn property_names(&self, obj: &Rc<Obj>, all: bool) -> Vec<Rc<str>> {
    obj
      .props
      .borrow()
      .iter()
      .filter(|(_, prop)| all || prop.enumerable())
      .map(|(key, _)| key.clone())
      .collect()
  }
}
