use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse::Parser, punctuated::Punctuated, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature,
    Token, Type,
};

/// Which store a test runs on, and what it starts with.
struct Setup {
    /// `Some(started)` seeds the example election.
    seed: Option<bool>,
    mongo: bool,
}

impl Setup {
    fn parse(args: TokenStream) -> Result<Self, syn::Error> {
        let args = Punctuated::<Ident, Token![,]>::parse_terminated.parse(args)?;
        let mut setup = Setup {
            seed: None,
            mongo: false,
        };
        for arg in args {
            match arg.to_string().as_str() {
                "scheduled" | "started" if setup.seed.is_some() => {
                    return Err(syn::Error::new(arg.span(), "Only one of `scheduled` or `started`"));
                }
                "scheduled" => setup.seed = Some(false),
                "started" => setup.seed = Some(true),
                "mongo" if !setup.mongo => setup.mongo = true,
                _ => {
                    return Err(syn::Error::new(
                        arg.span(),
                        "Expected `scheduled`, `started` or `mongo`",
                    ));
                }
            }
        }
        Ok(setup)
    }
}

/// Transform an asynchronous test into a synchronous one and inject dependencies.
///
/// Every test gets a fresh store and an [`crate::engine::Engine`] on it.
/// Injectable parameters, matched by type name, are `Client`
/// ([`rocket::local::asynchronous::Client`] on that engine), `Engine`, the
/// store itself and `Seeded`.
///
/// Arguments:
/// - `scheduled` or `started` seeds the example election from
///   [`crate::engine::fixtures::seed`] and makes it active, starting it in the
///   second case. A `Seeded` parameter requires one of them.
/// - `mongo` runs the test on a `MongoStore` in a throwaway database, which is
///   dropped afterwards even if the test panics. The test is skipped when no
///   `db_uri` is configured. Without it the store is a `MemoryStore`.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = match syn::parse::<ItemFn>(input) {
        Ok(item_fn) => item_fn,
        Err(err) => return err.into_compile_error().into(),
    };
    let setup = match Setup::parse(args) {
        Ok(setup) => setup,
        Err(err) => return err.into_compile_error().into(),
    };

    // Extract type information and reject invalid function signatures.
    let injected = match check_sig(&item_fn.sig, &setup) {
        Ok(injected) => injected,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let maybe_seed = setup
        .seed
        .map(|started| {
            quote! {
                let seeded = crate::engine::fixtures::seed(&engine, #started).await;
            }
        })
        .unwrap_or_default();
    let maybe_client = injected
        .iter()
        .any(|arg| arg.to_string() == "rocket_client")
        .then(|| {
            quote! {
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_engine(engine.clone()),
                )
                .await
                .unwrap();
            }
        })
        .unwrap_or_default();
    let run = quote! {
        let engine = crate::engine::Engine::new(store.clone());
        #maybe_seed
        #maybe_client
        #new_name(#(#injected),*).await;
    };

    let body = if setup.mongo {
        quote! {
            // Separate runtimes for setup/cleanup and for inside the `catch_unwind`.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("backend-test-setup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("backend-test")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            let (db, store) = match outer_runtime.block_on(crate::model::mongodb::test_database()) {
                Some(test_db) => test_db,
                None => {
                    log::warn!("Skipping {}: no `db_uri` configured", stringify!(#name));
                    return;
                }
            };

            // Use a mutex to safely transfer `!UnwindSafe` data.
            let mutex = std::sync::Mutex::new((store, inner_runtime));
            let result = std::panic::catch_unwind(|| {
                let (store, runtime) = mutex.into_inner().unwrap();
                runtime.block_on(async { #run });
            });

            outer_runtime.block_on(async { db.drop(None).await.unwrap() });
            if let Err(panic) = result {
                std::panic::resume_unwind(panic);
            }
        }
    } else {
        quote! {
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("backend-test")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let store = crate::store::MemoryStore::new();
                #run
            });
        }
    };

    quote! {
        #[test]
        #[allow(unused_variables)]
        fn #name() {
            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(
                ["coop_election"],
                None,
                None,
            );

            #body
        }
    }
    .into()
}

/// Ensure the wrapped test is async, and map each parameter to the value injected for it.
fn check_sig(sig: &Signature, setup: &Setup) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }
    let store_type = if setup.mongo { "MongoStore" } else { "MemoryStore" };

    let mut seen = Vec::new();
    let mut injected = vec![];
    for input in &sig.inputs {
        let type_ident = match input {
            FnArg::Typed(pat_type) => match (&*pat_type.pat, &*pat_type.ty) {
                (Pat::Ident(_), Type::Path(type_path)) => type_path.path.segments.last(),
                _ => None,
            },
            FnArg::Receiver(_) => None,
        }
        .map(|segment| segment.ident.to_string());

        let value = match type_ident.as_deref() {
            Some("Client") => quote! { rocket_client },
            Some("Engine") => quote! { engine.clone() },
            Some(store) if store == store_type => quote! { store.clone() },
            Some("Seeded") if setup.seed.is_some() => quote! { seeded.clone() },
            Some("Seeded") => {
                return Err(syn::Error::new(
                    input.span(),
                    "A `Seeded` parameter needs `#[backend_test(scheduled)]` or `#[backend_test(started)]`",
                ));
            }
            _ => {
                return Err(syn::Error::new(
                    input.span(),
                    format!(
                        "Expected one of `client: Client`, `engine: Engine`, `store: {store_type}` or `seeded: Seeded`"
                    ),
                ));
            }
        };
        let key = value.to_string();
        if seen.contains(&key) {
            return Err(syn::Error::new(
                input.span(),
                "Each injectable type may only be requested once",
            ));
        }
        seen.push(key);
        injected.push(value);
    }

    Ok(injected)
}
