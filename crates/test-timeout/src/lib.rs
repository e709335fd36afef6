//! Test attributes that fail a test instead of letting it hang.
//!
//! `#[timeout]` wraps a synchronous test, `#[tokio_timeout_test]` an async one
//! (on a current-thread runtime with all drivers enabled). Both take an optional
//! limit in seconds, either `#[timeout(5)]` or `#[timeout(secs = 5)]`, defaulting
//! to 60. Setting `TEST_TIMEOUT_SCALE` multiplies every limit at run time.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{Attribute, Ident, ItemFn, LitInt, Token, parse_macro_input};

const DEFAULT_SECS: u64 = 60;

struct Limit(u64);

impl Parse for Limit {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        if input.is_empty() {
            return Ok(Limit(DEFAULT_SECS));
        }
        if input.peek(Ident) {
            let key: Ident = input.parse()?;
            if key != "secs" {
                return Err(syn::Error::new_spanned(key, "expected `secs = <seconds>`"));
            }
            input.parse::<Token![=]>()?;
        }
        let lit: LitInt = input.parse()?;
        let secs: u64 = lit.base10_parse()?;
        if secs == 0 {
            return Err(syn::Error::new_spanned(lit, "timeout must be greater than zero"));
        }
        Ok(Limit(secs))
    }
}

#[proc_macro_attribute]
pub fn tokio_timeout_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let Limit(secs) = parse_macro_input!(attr as Limit);
    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            &sig.ident,
            "tokio_timeout_test can only be applied to async functions",
        )
        .to_compile_error()
        .into();
    }
    sig.asyncness = None;

    let attrs = without(attrs, is_tokio_test_attribute);
    let body = quote! {
        let runtime = ::tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build Tokio runtime");
        runtime.block_on(async {
            ::tokio::time::timeout(__limit, async move #block)
                .await
                .expect("test timed out");
        });
    };
    expand(attrs, vis, sig, secs, body)
}

#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let Limit(secs) = parse_macro_input!(attr as Limit);
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(
            &sig.ident,
            "timeout expects a synchronous test; use tokio_timeout_test for async",
        )
        .to_compile_error()
        .into();
    }

    let attrs = without(attrs, is_test_attribute);
    let body = quote! {
        let _ = __limit;
        #block
    };
    expand(attrs, vis, sig, secs, body)
}

/// Runs `body` on a watchdog thread; the test panics if it has not finished
/// within the limit, and re-raises the body's own panic otherwise.
fn expand(
    attrs: Vec<Attribute>,
    vis: syn::Visibility,
    sig: syn::Signature,
    secs: u64,
    body: TokenStream2,
) -> TokenStream {
    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let __scale = ::std::env::var("TEST_TIMEOUT_SCALE")
                .ok()
                .and_then(|raw| raw.parse::<u32>().ok())
                .filter(|scale| *scale > 0)
                .unwrap_or(1);
            let __limit = ::std::time::Duration::from_secs(#secs) * __scale;
            let (sender, receiver) = ::std::sync::mpsc::channel();
            let name = ::std::thread::current().name().map(str::to_owned);
            let mut builder = ::std::thread::Builder::new();
            if let Some(name) = name {
                builder = builder.name(name);
            }
            builder
                .spawn(move || {
                    let result = ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| {
                        #body
                    }));
                    let _ = sender.send(result);
                })
                .expect("failed to spawn test thread");
            match receiver.recv_timeout(__limit) {
                Ok(Ok(())) => {}
                Ok(Err(payload)) => ::std::panic::resume_unwind(payload),
                Err(::std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    panic!("test timed out after {:?}", __limit)
                }
                Err(::std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread failed before reporting result")
                }
            }
        }
    })
}

fn without(attrs: Vec<Attribute>, drop: fn(&Attribute) -> bool) -> Vec<Attribute> {
    attrs.into_iter().filter(|attr| !drop(attr)).collect()
}

fn is_tokio_test_attribute(attr: &Attribute) -> bool {
    let mut segments = attr.path().segments.iter();
    matches!(
        (segments.next(), segments.next(), segments.next()),
        (Some(first), Some(second), None)
            if first.ident == "tokio" && second.ident == "test"
    )
}

fn is_test_attribute(attr: &Attribute) -> bool {
    let mut segments = attr.path().segments.iter();
    matches!((segments.next(), segments.next()), (Some(first), None) if first.ident == "test")
}
