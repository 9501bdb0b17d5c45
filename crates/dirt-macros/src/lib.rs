//! `dirt-macros`: the proc-macro half of `dirt-rpc`'s reflective method
//! lookup (spec §4.6).
//!
//! # Why
//! Rust has no runtime attribute introspection, so `Edge::dispatch` cannot
//! literally "look up `head` as an attribute of the API object" the way the
//! spec describes. `#[dirt_macros::api]` recovers the same capability at
//! compile time: it scans a plain `impl` block's `pub async fn` methods and
//! emits a sibling `impl dirt_core::Api for Type` that dispatches on the
//! method name, answers `method_names()`/`doc()`/`no_timeout()`, matching
//! spec §4.6 exactly without any of it being hand-written by the app author.
//!
//! # How
//! Built the same way the teacher's `#[spark::service]` macro is: parse
//! with `syn`, rewrite with `quote`. Unlike `#[spark::service]` (which
//! rewrites a single free function into one `Service`), this macro leaves
//! the original methods untouched and only adds a sibling trait impl, since
//! an API object naturally has more than one method.
//!
//! Two helper attributes are recognised on individual methods and stripped
//! before the original `impl` block is re-emitted (they are not real
//! attributes anywhere else, so they must never survive to the compiler):
//! `#[no_timeout]` marks a method as exempt from the edge's call timeout;
//! `#[stream]` marks a method as returning `dirt_core::BoxedValueStream`
//! rather than a plain `dirt_core::Value`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Error, FnArg, ImplItem, ItemImpl, Lit, Meta, Signature, parse_macro_input, spanned::Spanned};

#[proc_macro_attribute]
pub fn api(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return Error::new(
            proc_macro2::Span::call_site(),
            "#[dirt_macros::api] does not accept arguments",
        )
        .to_compile_error()
        .into();
    }

    let input = parse_macro_input!(item as ItemImpl);
    expand(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

struct ApiMethod {
    ident: syn::Ident,
    name: String,
    doc: Option<String>,
    no_timeout: bool,
    is_stream: bool,
}

fn expand(mut input: ItemImpl) -> Result<TokenStream2, Error> {
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "#[dirt_macros::api] does not support generic impl blocks",
        ));
    }

    let self_ty = input.self_ty.clone();
    let mut methods = Vec::new();

    for item in input.items.iter_mut() {
        let ImplItem::Fn(method) = item else {
            continue;
        };
        if !matches!(method.vis, syn::Visibility::Public(_)) {
            continue;
        }
        if method.sig.asyncness.is_none() {
            return Err(Error::new(
                method.sig.span(),
                "#[dirt_macros::api] methods must be `pub async fn`",
            ));
        }

        validate_receiver(&method.sig)?;

        let (no_timeout, is_stream) = extract_markers(&mut method.attrs);
        let doc = extract_doc(&method.attrs);
        let ident = method.sig.ident.clone();
        let name = ident.to_string();

        methods.push(ApiMethod {
            ident,
            name,
            doc,
            no_timeout,
            is_stream,
        });
    }

    let method_names = methods.iter().map(|m| &m.name);

    let doc_arms = methods.iter().map(|m| {
        let name = &m.name;
        match &m.doc {
            Some(doc) => quote! { #name => ::core::option::Option::Some(#doc.to_string()) },
            None => quote! { #name => ::core::option::Option::None },
        }
    });

    let no_timeout_arms = methods.iter().map(|m| {
        let name = &m.name;
        let flag = m.no_timeout;
        quote! { #name => #flag }
    });

    let invoke_arms = methods.iter().map(|m| {
        let name = &m.name;
        let ident = &m.ident;
        if m.is_stream {
            quote! {
                #name => {
                    let stream = self.#ident(args, kwargs).await?;
                    ::core::result::Result::Ok(dirt_core::ApiOutcome::Stream(stream))
                }
            }
        } else {
            quote! {
                #name => {
                    let value = self.#ident(args, kwargs).await?;
                    ::core::result::Result::Ok(dirt_core::ApiOutcome::Value(value))
                }
            }
        }
    });

    let expanded = quote! {
        #input

        #[dirt_macros::__private::async_trait]
        impl dirt_core::Api for #self_ty {
            fn method_names(&self) -> ::std::vec::Vec<::std::string::String> {
                ::std::vec![#(#method_names.to_string()),*]
            }

            fn doc(&self, method: &str) -> ::core::option::Option<::std::string::String> {
                match method {
                    #(#doc_arms,)*
                    _ => ::core::option::Option::None,
                }
            }

            fn no_timeout(&self, method: &str) -> bool {
                match method {
                    #(#no_timeout_arms,)*
                    _ => false,
                }
            }

            async fn invoke(
                &self,
                method: &str,
                args: dirt_core::Args,
                kwargs: dirt_core::KwArgs,
            ) -> dirt_core::Result<dirt_core::ApiOutcome> {
                match method {
                    #(#invoke_arms)*
                    other => ::core::result::Result::Err(dirt_core::DirtError::not_found(other)),
                }
            }
        }
    };

    Ok(expanded)
}

/// Methods generated by this macro must take `&self` followed by exactly
/// `(args: Args, kwargs: KwArgs)` — the macro doesn't attempt to validate
/// the argument *types* (that's for the compiler once it sees the generated
/// call site), only that the shape (receiver + two more params) matches.
fn validate_receiver(sig: &Signature) -> Result<(), Error> {
    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver)) if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(Error::new(
                sig.span(),
                "#[dirt_macros::api] methods must take `&self`",
            ));
        }
    }
    let arg_count = inputs
        .filter(|arg| matches!(arg, FnArg::Typed(_)))
        .count();
    if arg_count != 2 {
        return Err(Error::new(
            sig.span(),
            "#[dirt_macros::api] methods must take exactly (args, kwargs)",
        ));
    }
    Ok(())
}

fn extract_markers(attrs: &mut Vec<syn::Attribute>) -> (bool, bool) {
    let mut no_timeout = false;
    let mut is_stream = false;
    attrs.retain(|attr| {
        if attr.path().is_ident("no_timeout") {
            no_timeout = true;
            false
        } else if attr.path().is_ident("stream") {
            is_stream = true;
            false
        } else {
            true
        }
    });
    (no_timeout, is_stream)
}

fn extract_doc(attrs: &[syn::Attribute]) -> Option<String> {
    let mut lines = Vec::new();
    for attr in attrs {
        if !attr.path().is_ident("doc") {
            continue;
        }
        if let Meta::NameValue(name_value) = &attr.meta {
            if let syn::Expr::Lit(expr_lit) = &name_value.value {
                if let Lit::Str(lit_str) = &expr_lit.lit {
                    lines.push(lit_str.value().trim().to_string());
                }
            }
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

// Referenced above so the generated code has a stable path back to
// `async_trait`, without forcing every `#[dirt_macros::api]` user to add a
// direct `async-trait` dependency of their own.
#[doc(hidden)]
pub mod __private {
    pub use async_trait::async_trait;
}
