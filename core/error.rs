// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

use std::ffi::CStr;

use crate::types::*;

pub type Result<T = ()> = std::result::Result<T, Error>;

/// One variant per non-ok `napi_status`. Slot implementations return these
/// through `?`; the `#[napi_sym]` wrapper converts them back into the raw
/// status for the ABI and records them as the environment's last error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
  #[error("Invalid argument")]
  InvalidArg,
  #[error("An object was expected")]
  ObjectExpected,
  #[error("A string was expected")]
  StringExpected,
  #[error("A string or symbol was expected")]
  NameExpected,
  #[error("A function was expected")]
  FunctionExpected,
  #[error("A number was expected")]
  NumberExpected,
  #[error("A boolean was expected")]
  BooleanExpected,
  #[error("An array was expected")]
  ArrayExpected,
  #[error("Unknown failure")]
  GenericFailure,
  #[error("An exception is pending")]
  PendingException,
  #[error("The async work item was cancelled")]
  Cancelled,
  #[error("napi_escape_handle already called on scope")]
  EscapeCalledTwice,
  #[error("Invalid handle scope usage")]
  HandleScopeMismatch,
  #[error("Invalid callback scope usage")]
  CallbackScopeMismatch,
  #[error("Thread-safe function queue is full")]
  QueueFull,
  #[error("Thread-safe function handle is closing")]
  Closing,
  #[error("A bigint was expected")]
  BigintExpected,
  #[error("A date was expected")]
  DateExpected,
  #[error("An arraybuffer was expected")]
  ArrayBufferExpected,
  #[error("A detachable arraybuffer was expected")]
  DetachableArraybufferExpected,
  #[error("Main thread would deadlock")]
  WouldDeadlock,
  #[error("External buffers are not allowed")]
  NoExternalBuffersAllowed,
  #[error("Cannot run JavaScript")]
  CannotRunJs,
}

impl From<Error> for napi_status {
  fn from(err: Error) -> napi_status {
    match err {
      Error::InvalidArg => napi_invalid_arg,
      Error::ObjectExpected => napi_object_expected,
      Error::StringExpected => napi_string_expected,
      Error::NameExpected => napi_name_expected,
      Error::FunctionExpected => napi_function_expected,
      Error::NumberExpected => napi_number_expected,
      Error::BooleanExpected => napi_boolean_expected,
      Error::ArrayExpected => napi_array_expected,
      Error::GenericFailure => napi_generic_failure,
      Error::PendingException => napi_pending_exception,
      Error::Cancelled => napi_cancelled,
      Error::EscapeCalledTwice => napi_escape_called_twice,
      Error::HandleScopeMismatch => napi_handle_scope_mismatch,
      Error::CallbackScopeMismatch => napi_callback_scope_mismatch,
      Error::QueueFull => napi_queue_full,
      Error::Closing => napi_closing,
      Error::BigintExpected => napi_bigint_expected,
      Error::DateExpected => napi_date_expected,
      Error::ArrayBufferExpected => napi_arraybuffer_expected,
      Error::DetachableArraybufferExpected => {
        napi_detachable_arraybuffer_expected
      }
      Error::WouldDeadlock => napi_would_deadlock,
      Error::NoExternalBuffersAllowed => napi_no_external_buffers_allowed,
      Error::CannotRunJs => napi_cannot_run_js,
    }
  }
}

impl Error {
  pub fn status(self) -> napi_status {
    self.into()
  }
}

// Messages handed out through napi_get_last_error_info. Indexed by status;
// storage is static so the pointer stays valid until the next entry point
// (and beyond).
static ERROR_MESSAGES: &[&CStr] = &[
  c"",
  c"Invalid argument",
  c"An object was expected",
  c"A string was expected",
  c"A string or symbol was expected",
  c"A function was expected",
  c"A number was expected",
  c"A boolean was expected",
  c"An array was expected",
  c"Unknown failure",
  c"An exception is pending",
  c"The async work item was cancelled",
  c"napi_escape_handle already called on scope",
  c"Invalid handle scope usage",
  c"Invalid callback scope usage",
  c"Thread-safe function queue is full",
  c"Thread-safe function handle is closing",
  c"A bigint was expected",
  c"A date was expected",
  c"An arraybuffer was expected",
  c"A detachable arraybuffer was expected",
  c"Main thread would deadlock",
  c"External buffers are not allowed",
  c"Cannot run JavaScript",
];

pub fn error_message(status: napi_status) -> &'static CStr {
  ERROR_MESSAGES
    .get(status as usize)
    .copied()
    .unwrap_or(c"Unknown error")
}
