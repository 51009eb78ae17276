use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, LitStr};

// ============================================================================
// #[derive(RemoteEvent)]
// ============================================================================

/// Derive macro that implements `RemoteEvent` for a payload type.
///
/// The event-type discriminator defaults to the type's identifier and can
/// be overridden with a `#[remote_event(name = "...")]` attribute. The
/// discriminator is what the dispatch index is keyed by, so renaming a
/// Rust type without pinning the name changes which handlers fire.
///
/// # Usage
///
/// ```ignore
/// #[derive(Serialize, Deserialize, RemoteEvent)]
/// struct OrderCreated {
///     order_id: String,
/// }
/// assert_eq!(OrderCreated::event_type(), "OrderCreated");
/// ```
///
/// With an explicit wire name:
/// ```ignore
/// #[derive(Serialize, Deserialize, RemoteEvent)]
/// #[remote_event(name = "orders.created.v1")]
/// struct OrderCreated {
///     order_id: String,
/// }
/// assert_eq!(OrderCreated::event_type(), "orders.created.v1");
/// ```
#[proc_macro_derive(RemoteEvent, attributes(remote_event))]
pub fn derive_remote_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = &input.ident;

    let mut name = ident.to_string();
    for attr in &input.attrs {
        if attr.path().is_ident("remote_event") {
            let result = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let lit: LitStr = meta.value()?.parse()?;
                    name = lit.value();
                    Ok(())
                } else {
                    Err(meta.error("expected `name = \"...\"`"))
                }
            });
            if let Err(err) = result {
                return err.to_compile_error().into();
            }
        }
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::remote_event_bus::RemoteEvent for #ident #ty_generics #where_clause {
            fn event_type() -> &'static str {
                #name
            }
        }
    };

    expanded.into()
}
