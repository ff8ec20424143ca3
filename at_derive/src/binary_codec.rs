//! Derive macro for fixed-layout binary serialization.
//!
//! Generates `Encode` and `Decode` implementations for structs whose fields
//! all have fixed-width encodings.
//!
//! # Supported Types
//!
//! - **Named structs**: `struct Header { version: u16, code_pages: u16 }`
//! - **Tuple structs**: `struct Register([u64; 4])`
//!
//! Enums, unions and unit structs are rejected.
//!
//! # Binary Format
//!
//! Fields are written in declaration order with no padding or length
//! prefixes. Integers are big-endian, arrays are written element by element.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Fields};

/// Derives `Encode` and `Decode` for a struct.
///
/// # Example
///
/// ```ignore
/// use at_derive::BinaryCodec;
///
/// #[derive(BinaryCodec)]
/// pub struct Timestamp {
///     pub block_height: u32,
///     pub transaction_sequence: u32,
/// }
/// ```
///
/// expands to
///
/// ```ignore
/// impl Encode for Timestamp {
///     fn encode<S: EncodeSink>(&self, out: &mut S) {
///         self.block_height.encode(out);
///         self.transaction_sequence.encode(out);
///     }
/// }
///
/// impl Decode for Timestamp {
///     fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
///         Ok(Self {
///             block_height: u32::decode(input)?,
///             transaction_sequence: u32::decode(input)?,
///         })
///     }
/// }
/// ```
pub fn derive_binary_codec(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let Data::Struct(data_struct) = &input.data else {
        return syn::Error::new_spanned(&input, "BinaryCodec derive only supports structs")
            .to_compile_error()
            .into();
    };

    let (encode_body, decode_body) = match &data_struct.fields {
        Fields::Named(fields) => {
            let names: Vec<_> = fields.named.iter().map(|f| &f.ident).collect();
            (
                quote! {
                    #( crate::types::encoding::Encode::encode(&self.#names, out); )*
                },
                quote! {
                    Ok(Self {
                        #( #names: crate::types::encoding::Decode::decode(input)?, )*
                    })
                },
            )
        }
        Fields::Unnamed(fields) => {
            let indices: Vec<_> = (0..fields.unnamed.len()).map(syn::Index::from).collect();
            let decoders = indices
                .iter()
                .map(|_| quote!(crate::types::encoding::Decode::decode(input)?));
            (
                quote! {
                    #( crate::types::encoding::Encode::encode(&self.#indices, out); )*
                },
                quote! {
                    Ok(Self( #(#decoders),* ))
                },
            )
        }
        Fields::Unit => {
            return syn::Error::new_spanned(&input, "BinaryCodec derive needs at least one field")
                .to_compile_error()
                .into();
        }
    };

    TokenStream::from(quote! {
        impl #impl_generics crate::types::encoding::Encode for #name #ty_generics #where_clause {
            fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
                #encode_body
            }
        }

        impl #impl_generics crate::types::encoding::Decode for #name #ty_generics #where_clause {
            fn decode(input: &mut &[u8]) -> ::std::result::Result<Self, crate::types::encoding::DecodeError> {
                #decode_body
            }
        }
    })
}
