//! Proc macros for hosted-e2e
//!
//! Provides the `#[hosted_e2e::test]` attribute for cluster lifecycle tests.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{FnArg, ItemFn, Pat, PatType, ReturnType};

/// Attribute macro for hosted cluster tests.
///
/// Builds a `TestContext` from the environment and passes it to the test as
/// `ctx: &mut TestContext`. Deletes the test cluster when the test passes and
/// prints diagnostics, keeping the cluster, when it fails.
///
/// # Example
///
/// ```ignore
/// use hosted_e2e::provider::Ack;
/// use hosted_e2e::TestContext;
///
/// #[hosted_e2e::test]
/// #[ignore]
/// async fn ack_create(ctx: &mut TestContext) {
///     let version = ctx.k8s_version::<Ack>(false).await.unwrap();
///     ctx.create_cluster::<Ack>(&version).await.unwrap();
/// }
/// ```
///
/// # With Result Return Type
///
/// ```ignore
/// #[hosted_e2e::test]
/// #[ignore]
/// async fn ack_upgrade(ctx: &mut TestContext) -> Result<(), Box<dyn std::error::Error>> {
///     scenario::upgrade_kubernetes_version_checks::<Ack>(ctx).await?;
///     Ok(())
/// }
/// ```
///
/// # Environment Variables
///
/// - `CATTLE_TEST_CONFIG` - test config file (required)
/// - `HOSTED_E2E_KEEP_ALL` - never delete, even on success
///
/// Setting `cleanup: false` in the config also keeps clusters.
#[proc_macro_attribute]
pub fn test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input_fn = syn::parse_macro_input!(item as ItemFn);
    test_impl(&input_fn).into()
}

/// Check if a function has a parameter named "ctx"
fn has_ctx_param(input_fn: &ItemFn) -> bool {
    input_fn.sig.inputs.iter().any(|arg| {
        if let FnArg::Typed(PatType { pat, .. }) = arg {
            if let Pat::Ident(ident) = pat.as_ref() {
                return ident.ident == "ctx";
            }
        }
        false
    })
}

/// Check if a function has an explicit return type (e.g., `-> Result<...>`)
fn has_result_return(input_fn: &ItemFn) -> bool {
    matches!(&input_fn.sig.output, ReturnType::Type(..))
}

fn test_impl(input_fn: &ItemFn) -> proc_macro2::TokenStream {
    let fn_name = &input_fn.sig.ident;
    let fn_block = &input_fn.block;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;

    if !has_ctx_param(input_fn) {
        return quote! {
            #(#fn_attrs)*
            #[tokio::test]
            #fn_vis async fn #fn_name() {
                ::hosted_e2e::telemetry::init_logging();
                #fn_block
            }
        };
    }

    let body_name = format_ident!("__hosted_e2e_{}", fn_name);
    let inputs = &input_fn.sig.inputs;
    let output = &input_fn.sig.output;

    // Normalize to Result<(), Box<dyn Any + Send>> so errors and panics share one path
    let flatten = if has_result_return(input_fn) {
        quote! {
            let outcome = match outcome {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    eprintln!("[hosted-e2e] test returned an error: {}", e);
                    Err(Box::new(e.to_string()) as Box<dyn std::any::Any + Send>)
                }
                Err(panic_info) => Err(panic_info),
            };
        }
    } else {
        quote! {}
    };

    quote! {
        #(#fn_attrs)*
        #[tokio::test]
        #fn_vis async fn #fn_name() {
            use ::hosted_e2e::__private::FutureExt;

            async fn #body_name(#inputs) #output #fn_block

            ::hosted_e2e::telemetry::init_logging();

            #[allow(unused_mut)]
            let mut ctx = ::hosted_e2e::TestContext::from_env()
                .unwrap_or_else(|e| panic!("Failed to create TestContext: {}", e));

            let outcome = std::panic::AssertUnwindSafe(#body_name(&mut ctx))
                .catch_unwind()
                .await;
            #flatten

            match outcome {
                Ok(()) => {
                    if ctx.should_cleanup() {
                        if let Err(e) = ctx.cleanup().await {
                            eprintln!("[hosted-e2e] Warning: cleanup failed: {}", e);
                        }
                    } else {
                        eprintln!("[hosted-e2e] cleanup disabled - keeping cluster: {}", ctx.cluster_name);
                    }
                }
                Err(panic_info) => {
                    let diag = ctx.collect_diagnostics().await;
                    eprintln!("{}", diag);
                    std::panic::resume_unwind(panic_info);
                }
            }
        }
    }
}
