use proc_macro::TokenStream;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::{parse::Parse, parse::ParseStream, parse_macro_input, ItemFn, Lit, Token};
use syn::{Error, Result};

/// Parsed `#[query(...)]` attribute arguments.
struct QueryArgs {
    tag: String,
    ttl: Option<String>,
    grace: Option<String>,
}

impl Parse for QueryArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let vars = Punctuated::<syn::MetaNameValue, Token![,]>::parse_terminated(input)?;

        let mut tag = None;
        let mut ttl = None;
        let mut grace = None;

        for var in vars {
            let ident = var
                .path
                .get_ident()
                .ok_or_else(|| Error::new_spanned(&var.path, "expected identifier"))?;

            let value = match &var.lit {
                Lit::Str(lit_str) => lit_str.value(),
                _ => return Err(Error::new_spanned(&var.lit, "expected a string literal")),
            };

            if ident == "tag" {
                tag = Some(value);
            } else if ident == "ttl" {
                ttl = Some(value);
            } else if ident == "grace" {
                grace = Some(value);
            } else {
                return Err(Error::new_spanned(ident, "unknown query argument"));
            }
        }

        Ok(QueryArgs {
            tag: tag.ok_or_else(|| Error::new(input.span(), "`tag` is required"))?,
            ttl,
            grace,
        })
    }
}

/// Wraps a function so every call is routed through the process-global
/// engine's named-query façade, under a single-segment tag named by
/// `tag` and a cache key derived from the function's name and argument
/// values (via their `Debug` representation, following the same
/// approach as positional cache-key derivation elsewhere in the
/// ecosystem).
///
/// ```ignore
/// #[tagcache::query(tag = "user", ttl = "60s")]
/// async fn get_user(id: u64) -> tagcache::Result<User> {
///     fetch_user_from_db(id).await
/// }
/// ```
///
/// Invalidate every cached call of `get_user` with
/// `engine.invalidate(&[TagPath::single("user")], false)`.
#[proc_macro_attribute]
pub fn query(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as QueryArgs);
    let input_fn = parse_macro_input!(item as ItemFn);

    let vis = &input_fn.vis;
    let sig = &input_fn.sig;
    let block = &input_fn.block;
    let attrs = &input_fn.attrs;

    if sig.asyncness.is_none() {
        return Error::new_spanned(sig, "#[query] only supports async functions")
            .to_compile_error()
            .into();
    }

    let fn_name = &sig.ident;
    let inputs = &sig.inputs;

    let arg_names: Vec<_> = inputs
        .iter()
        .map(|arg| match arg {
            syn::FnArg::Receiver(_) => quote! { self },
            syn::FnArg::Typed(pat_type) => {
                if let syn::Pat::Ident(pat_ident) = &*pat_type.pat {
                    let ident = &pat_ident.ident;
                    quote! { #ident }
                } else {
                    quote! { _ }
                }
            }
        })
        .collect();

    let tag_name = &args.tag;
    let ttl_expr = match &args.ttl {
        Some(ttl) => quote! { Some(tagcache::duration::parse_ms(#ttl)?) },
        None => quote! { None },
    };
    let grace_expr = match &args.grace {
        Some(grace) => quote! { Some(Some(tagcache::duration::parse_ms(#grace)?)) },
        None => quote! { None },
    };

    let expanded = quote! {
        #(#attrs)*
        #vis #sig {
            let cache_key = format!("{}-{:?}", stringify!(#fn_name), (#(&(#arg_names)),*));
            let tags = vec![tagcache::TagPath::single(#tag_name)];
            let loader = || async { #block };
            tagcache::global_engine()
                .query(&cache_key, tags, loader, #ttl_expr, #grace_expr)
                .await
        }
    };

    expanded.into()
}
