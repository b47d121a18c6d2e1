//! Procedural macros for the `wpan-frame` crate.
//!
//! The [`macro@frame`] attribute turns a field list into a zero-copy
//! reader/writer over a byte buffer. Fields are laid out in declaration order,
//! little-endian. Bit fields (`#[bits(n)]`) are packed from the least
//! significant bit of the current octet and must add up to whole octets.
//!
//! Supported field types: `bool` (one bit), `u8` (bits or a full octet),
//! `u16`, `u32` (3 or 4 octets with `#[bytes(n)]`), `u64` and `&[u8]` with an
//! explicit `#[bytes(n)]`. `#[into(Type)]` converts the raw value on read and
//! write through `From`. Fields whose name starts with `_` are reserved: they
//! take space but get no accessors.

use proc_macro::TokenStream;
use quote::{format_ident, quote, ToTokens};
use syn::{parse_macro_input, Attribute, ItemStruct};

fn int_attr(attrs: &[Attribute], name: &str) -> Option<usize> {
    attrs
        .iter()
        .find(|attr| attr.path().is_ident(name))
        .map(|attr| {
            attr.parse_args::<syn::LitInt>()
                .and_then(|lit| lit.base10_parse::<usize>())
                .expect("expected an integer literal")
        })
}

fn into_attr(attrs: &[Attribute]) -> Option<syn::Type> {
    attrs
        .iter()
        .find(|attr| attr.path().is_ident("into"))
        .map(|attr| attr.parse_args::<syn::Type>().expect("expected a type"))
}

#[proc_macro_attribute]
pub fn frame(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemStruct);

    let item_attrs = input.attrs;
    let vis = input.vis;
    let name = input.ident;

    let mut getters = vec![];
    let mut setters = vec![];

    let mut offset = 0usize;
    let mut bits_offset = 0usize;

    for field in input.fields {
        let fnname = field.ident.expect("only named fields are supported");
        let ty = field.ty;
        let ty_str = ty.to_token_stream().to_string();
        let docs: Vec<_> = field
            .attrs
            .iter()
            .filter(|attr| attr.path().is_ident("doc"))
            .collect();

        let bits = int_attr(&field.attrs, "bits");
        let bytes = int_attr(&field.attrs, "bytes").or(match ty_str.as_str() {
            "bool" | "u8" => Some(1),
            "u16" => Some(2),
            "u32" => Some(4),
            "u64" => Some(8),
            _ => None,
        });
        let into = into_attr(&field.attrs);

        let reserved = fnname.to_string().starts_with('_');
        let setter_name = format_ident!("set_{}", fnname);

        let (raw_ty, getter, setter) = match (ty_str.as_str(), bits) {
            ("bool", _) => (
                quote! { bool },
                quote! { ((self.buffer.as_ref()[#offset] >> #bits_offset) & 0b1) != 0 },
                quote! {
                    let b = &mut self.buffer.as_mut()[#offset];
                    *b = (*b & !(0b1 << #bits_offset)) | ((value as u8) << #bits_offset);
                },
            ),
            ("u8", Some(bits)) => {
                let mask = ((1u16 << bits) - 1) as u8;
                (
                    quote! { u8 },
                    quote! { (self.buffer.as_ref()[#offset] >> #bits_offset) & #mask },
                    quote! {
                        let b = &mut self.buffer.as_mut()[#offset];
                        *b = (*b & !(#mask << #bits_offset)) | ((value & #mask) << #bits_offset);
                    },
                )
            }
            ("u8", None) => (
                quote! { u8 },
                quote! { self.buffer.as_ref()[#offset] },
                quote! { self.buffer.as_mut()[#offset] = value; },
            ),
            ("u16", _) => (
                quote! { u16 },
                quote! {
                    let b = &self.buffer.as_ref()[#offset..][..2];
                    u16::from_le_bytes([b[0], b[1]])
                },
                quote! { self.buffer.as_mut()[#offset..][..2].copy_from_slice(&value.to_le_bytes()); },
            ),
            ("u32", _) if bytes == Some(3) => (
                quote! { u32 },
                quote! {
                    let b = &self.buffer.as_ref()[#offset..][..3];
                    u32::from_le_bytes([b[0], b[1], b[2], 0])
                },
                quote! { self.buffer.as_mut()[#offset..][..3].copy_from_slice(&value.to_le_bytes()[..3]); },
            ),
            ("u32", _) => (
                quote! { u32 },
                quote! {
                    let b = &self.buffer.as_ref()[#offset..][..4];
                    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
                },
                quote! { self.buffer.as_mut()[#offset..][..4].copy_from_slice(&value.to_le_bytes()); },
            ),
            ("u64", _) => (
                quote! { u64 },
                quote! {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(&self.buffer.as_ref()[#offset..][..8]);
                    u64::from_le_bytes(raw)
                },
                quote! { self.buffer.as_mut()[#offset..][..8].copy_from_slice(&value.to_le_bytes()); },
            ),
            ("& [u8]", _) => {
                let len = bytes.expect("byte slices need #[bytes(n)]");
                (
                    quote! { &[u8] },
                    quote! { &self.buffer.as_ref()[#offset..][..#len] },
                    quote! { self.buffer.as_mut()[#offset..][..#len].copy_from_slice(value); },
                )
            }
            (other, _) => panic!("unsupported field type `{other}`"),
        };

        if !reserved {
            if let Some(into) = into {
                getters.push(quote! {
                    #(#docs)*
                    pub fn #fnname(&self) -> #into {
                        <#into>::from({ #getter })
                    }
                });
                setters.push(quote! {
                    #(#docs)*
                    pub fn #setter_name(&mut self, value: #into) {
                        let value: #raw_ty = value.into();
                        #setter
                    }
                });
            } else if ty_str == "& [u8]" {
                getters.push(quote! {
                    #(#docs)*
                    pub fn #fnname(&self) -> &[u8] {
                        #getter
                    }
                });
                setters.push(quote! {
                    #(#docs)*
                    pub fn #setter_name(&mut self, value: &[u8]) {
                        #setter
                    }
                });
            } else {
                getters.push(quote! {
                    #(#docs)*
                    pub fn #fnname(&self) -> #raw_ty {
                        #getter
                    }
                });
                setters.push(quote! {
                    #(#docs)*
                    pub fn #setter_name(&mut self, value: #raw_ty) {
                        #setter
                    }
                });
            }
        }

        match bits {
            Some(bits) => {
                bits_offset += bits;
                if bits_offset % 8 == 0 {
                    offset += bits_offset / 8;
                    bits_offset = 0;
                }
            }
            None if ty_str == "bool" => {
                bits_offset += 1;
                if bits_offset % 8 == 0 {
                    offset += 1;
                    bits_offset = 0;
                }
            }
            None => {
                assert!(bits_offset == 0, "`{fnname}` starts in the middle of an octet");
                offset += bytes.unwrap_or(0);
            }
        }
    }

    assert!(bits_offset == 0, "bit fields of `{name}` do not fill whole octets");

    quote! {
        #(#item_attrs)*
        #vis struct #name<T: AsRef<[u8]>> {
            buffer: T,
        }

        impl<T: AsRef<[u8]>> #name<T> {
            /// Create a new reader/writer, checking that the buffer is long
            /// enough.
            pub fn new(buffer: T) -> crate::Result<Self> {
                let s = Self::new_unchecked(buffer);

                if !s.check_len() {
                    return Err(crate::Error);
                }

                Ok(s)
            }

            /// Returns `false` if the buffer is too short to contain this
            /// structure.
            pub fn check_len(&self) -> bool {
                self.buffer.as_ref().len() >= Self::size()
            }

            /// Create a new reader/writer without length checking.
            pub fn new_unchecked(buffer: T) -> Self {
                Self { buffer }
            }

            /// Returns the size of this structure in octets.
            pub const fn size() -> usize {
                #offset
            }

            /// Consume the reader and return the underlying buffer.
            pub fn into_inner(self) -> T {
                self.buffer
            }

            #(#getters)*
        }

        impl<T: AsRef<[u8]> + AsMut<[u8]>> #name<T> {
            #(#setters)*
        }
    }
    .into()
}
