use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::{spanned::Spanned, ItemStruct, LitStr};

pub fn derive_serialize_impl(st: ItemStruct) -> syn::Result<TokenStream> {
    let mut stmts = vec![];
    for (i, field) in st.fields.iter().enumerate() {
        let field_name = field
            .ident
            .clone()
            .unwrap_or_else(|| Ident::new(&i.to_string(), field.span()));
        let error = LitStr::new(
            &format!("cannot serialize field {}::{}", st.ident, field_name),
            field.span(),
        );

        stmts.push(quote! {
            ::anyhow::Context::context(
                ::aurorakit_core::binary::Serialize::serialize(&self.#field_name, serializer),
                #error,
            )?;
        });
    }

    let type_name = st.ident;
    let (impl_generics, type_generics, where_clause) = st.generics.split_for_impl();
    let stmts = TokenStream::from_iter(stmts);

    Ok(quote! {
        impl #impl_generics ::aurorakit_core::binary::Serialize for #type_name #type_generics #where_clause {
            fn serialize(&self, serializer: &mut ::aurorakit_core::binary::Serializer<impl ::std::io::Write>) -> ::anyhow::Result<()> {
                #stmts
                Ok(())
            }
        }
    })
}
