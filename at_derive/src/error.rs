//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations from
//! a per-variant `#[error("...")]` message.
//!
//! # Usage
//!
//! ```ignore
//! use at_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum ATError {
//!     #[error("invalid opcode {opcode:#04x} at {pc:#06x}")]
//!     InvalidOpCode { opcode: u8, pc: u32 },
//!
//!     #[error("compilation failed: {0}")]
//!     CompilationError(String),
//!
//!     #[error("stack underflow")]
//!     Underflow,
//! }
//! ```
//!
//! Positional placeholders (`{0}`, `{1:x}`) refer to tuple fields, named
//! placeholders (`{pc}`, `{pc:#06x}`) to struct fields. Struct fields that the
//! message never mentions are not passed to `write!`.

use proc_macro::TokenStream;
use quote::{format_ident, quote, ToTokens};
use syn::{parse_macro_input, Data, DeriveInput, Fields, Lit, Meta};

pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Enum(data_enum) = &input.data else {
        return Err(syn::Error::new_spanned(
            input,
            "Error derive only supports enums",
        ));
    };

    let display_arms = data_enum
        .variants
        .iter()
        .map(|variant| {
            let variant_name = &variant.ident;
            let message = extract_error_message(&variant.attrs, &variant.ident)?;

            let arm = match &variant.fields {
                Fields::Unit => quote! {
                    Self::#variant_name => write!(f, #message),
                },
                Fields::Unnamed(fields) => {
                    let count = fields.unnamed.len();
                    let format_str = convert_positional_to_named(&message, count);
                    let bindings: Vec<_> = (0..count)
                        .map(|i| {
                            let ident = format_ident!("f{}", i);
                            if mentions(&format_str, &ident.to_string()) {
                                quote!(#ident)
                            } else {
                                quote!(_)
                            }
                        })
                        .collect();
                    let args = (0..count)
                        .map(|i| format_ident!("f{}", i))
                        .filter(|ident| mentions(&format_str, &ident.to_string()))
                        .map(|ident| quote!(#ident = #ident));
                    quote! {
                        Self::#variant_name(#(#bindings),*) => write!(f, #format_str #(, #args)*),
                    }
                }
                Fields::Named(fields) => {
                    let used: Vec<_> = fields
                        .named
                        .iter()
                        .filter_map(|field| field.ident.as_ref())
                        .filter(|ident| mentions(&message, &ident.to_string()))
                        .collect();
                    quote! {
                        Self::#variant_name { #(#used,)* .. } => write!(f, #message #(, #used = #used)*),
                    }
                }
            };

            Ok(arm)
        })
        .collect::<syn::Result<Vec<_>>>()?;

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                match self {
                    #(#display_arms)*
                }
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Extracts the message from an `#[error("...")]` attribute.
fn extract_error_message<T: ToTokens>(attrs: &[syn::Attribute], target: &T) -> syn::Result<String> {
    for attr in attrs {
        if !attr.path().is_ident("error") {
            continue;
        }
        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")]",
            ));
        };
        return match syn::parse2::<Lit>(meta_list.tokens.clone()) {
            Ok(Lit::Str(lit_str)) => Ok(lit_str.value()),
            _ => Err(syn::Error::new_spanned(
                &attr.meta,
                "#[error] message must be a string literal, e.g. #[error(\"invalid opcode: {0}\")]",
            )),
        };
    }

    Err(syn::Error::new_spanned(
        target,
        "missing #[error(\"...\")] attribute; every error variant must declare a display message",
    ))
}

/// Returns true if `format_str` contains a `{name}` or `{name:spec}` placeholder.
fn mentions(format_str: &str, name: &str) -> bool {
    let open = format!("{{{}", name);
    format_str.match_indices(&open).any(|(at, _)| {
        let escaped = format_str[..at].ends_with('{')
            && format_str[..at].chars().rev().take_while(|&c| c == '{').count() % 2 == 1;
        let rest = &format_str[at + open.len()..];
        !escaped && (rest.starts_with('}') || rest.starts_with(':'))
    })
}

/// Rewrites positional placeholders `{0}`, `{1:x}` as `{f0}`, `{f1:x}`.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        for terminator in ['}', ':'] {
            let positional = format!("{{{}{}", i, terminator);
            let named = format!("{{f{}{}", i, terminator);
            result = result.replace(&positional, &named);
        }
    }
    result
}
