// Copyright 2018-2023 the Deno authors. All rights reserved. MIT license.

use proc_macro::TokenStream;
use quote::quote;

/// Turns a `Result`-returning slot implementation into the
/// `unsafe extern "C" fn … -> napi_status` shape the function table wants.
/// When the first parameter is named `env`, the wrapper also clears the
/// environment's last error on entry and records the status of an `Err` on
/// the way out, so every non-ok return and `napi_get_last_error_info`
/// agree.
#[proc_macro_attribute]
pub fn napi_sym(_attr: TokenStream, item: TokenStream) -> TokenStream {
  let func = syn::parse::<syn::ItemFn>(item).expect("expected a function");

  let name = &func.sig.ident;
  let block = &func.block;
  let inputs = &func.sig.inputs;
  let output = &func.sig.output;
  let ret_ty = match output {
    syn::ReturnType::Default => panic!("expected a Result return type"),
    syn::ReturnType::Type(_, ty) => quote! { #ty },
  };

  let first_is_env = match inputs.first() {
    Some(syn::FnArg::Typed(pat)) => match &*pat.pat {
      syn::Pat::Ident(ident) => ident.ident == "env",
      _ => false,
    },
    _ => false,
  };
  let clear_last_error = if first_is_env {
    quote! { crate::util::clear_last_error(env); }
  } else {
    quote! {}
  };
  let record_last_error = if first_is_env {
    quote! { crate::util::set_last_error(env, status); }
  } else {
    quote! {}
  };

  TokenStream::from(quote! {
    pub unsafe extern "C" fn #name(#inputs) -> napi_status {
      #clear_last_error
      let mut inner = || -> #ret_ty {
        let result = #block;
        result
      };
      let result = inner();
      match result {
        Ok(_) => napi_ok,
        Err(err) => {
          let status: napi_status = err.into();
          #record_last_error
          status
        }
      }
    }
  })
}
