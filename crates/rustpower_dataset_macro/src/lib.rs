use proc_macro::TokenStream;
use quote::quote;
use syn::*;

/// Derives `ComponentLayout` for a `#[repr(C)]` record struct.
///
/// Every named field becomes one attribute descriptor, in declaration order, with its
/// byte offset taken from `offset_of!` and its scalar kind from the field type's
/// `AttributeType::CTYPE`. A leading `r#` is stripped so `r#type` registers as `type`.
#[proc_macro_derive(ComponentLayout)]
pub fn derive_component_layout(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let is_repr_c = input.attrs.iter().any(|attr| {
        attr.path().is_ident("repr")
            && attr
                .parse_args::<Ident>()
                .map(|ident| ident == "C")
                .unwrap_or(false)
    });
    if !is_repr_c {
        return Error::new_spanned(name, "ComponentLayout requires #[repr(C)]")
            .to_compile_error()
            .into();
    }

    let attributes = match input.data {
        syn::Data::Struct(data) => match data.fields {
            syn::Fields::Named(ref fields) => fields
                .named
                .iter()
                .map(|f| {
                    let fname = f.ident.as_ref().unwrap();
                    let ty = &f.ty;
                    let raw = fname.to_string();
                    let attr_name = raw.strip_prefix("r#").unwrap_or(&raw).to_string();
                    quote! {
                        MetaAttribute::new::<#ty>(#attr_name, ::core::mem::offset_of!(#name, #fname))
                    }
                })
                .collect::<Vec<_>>(),
            _ => panic!("ComponentLayout can only be derived for named struct"),
        },
        _ => panic!("ComponentLayout only supports structs"),
    };

    let expanded = quote! {
        impl ComponentLayout for #name {
            fn attributes() -> Vec<MetaAttribute> {
                vec![#(#attributes),*]
            }
        }
    };

    TokenStream::from(expanded)
}
