// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

//! Engine for hosting Node-API add-ons: the handle/scope/reference machinery
//! that keeps every `napi_value` a stable identifier into host-managed
//! storage, plus environments, the callback trampoline and the host-thread
//! task queue. The ABI surface over this lives in the `napi_host` crate.

pub mod context;
pub mod env;
pub mod error;
pub mod function;
pub mod handle;
pub mod reference;
pub mod scope;
pub mod task_queue;
pub mod types;
pub mod value;

pub use context::Context;
pub use env::Env;
pub use env::InstanceData;
pub use error::error_message;
pub use error::Error;
pub use error::Result;
pub use function::CallError;
pub use function::ClassTemplate;
pub use function::FunctionData;
pub use handle::consts;
pub use handle::HandleStore;
pub use reference::FinalizerRecord;
pub use reference::Ownership;
pub use reference::Reference;
pub use scope::CallbackInfo;
pub use task_queue::HostTask;
pub use task_queue::TaskQueue;
pub use value::ArrayBufferData;
pub use value::DataViewData;
pub use value::ErrorClass;
pub use value::Obj;
pub use value::ObjKind;
pub use value::PromiseState;
pub use value::Property;
pub use value::PropertyValue;
pub use value::TypedArrayData;
pub use value::Value;
pub use value::Wrap;
