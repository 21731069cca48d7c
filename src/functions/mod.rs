//! # Extension Functions
//!
//! A name to function map shared by every [`Context`](crate::context::Context) of an
//! [`App`](crate::app::App), used for cross-handler helpers such as `redirect` or
//! `serve_data`.
//!
//! ## Calling Convention
//!
//! An extension function returns exactly one value, or one value plus one error.
//! Functions built with the typed constructors on [`ExtensionFn`] satisfy this by
//! construction. Functions built from a raw [`Signature`] are checked by
//! [`FunctionRegistry::register`], which rejects anything else with
//! [`RegistryError::InvalidSignature`](crate::error::RegistryError::InvalidSignature).
//!
//! Calls take boxed arguments. Before invoking, the registry checks the argument count
//! (trailing variadic parameters accept any number) and each argument's type.
//!
//! ## Example
//!
//! ```rust
//! use brrtcontext::functions::{arg, ExtensionFn, FunctionRegistry};
//!
//! let mut registry = FunctionRegistry::with_builtins();
//! registry
//!     .register(
//!         "shout",
//!         ExtensionFn::fn1(|_ctx, s: String| s.to_uppercase()),
//!     )
//!     .unwrap();
//! assert!(registry.contains("shout"));
//! assert!(registry.contains("redirect"));
//! ```

pub mod builtins;
mod core;

pub use self::core::{
    arg, Arg, CallOutput, ExtensionFn, FunctionRegistry, ParamSpec, ReturnSpec, Signature,
};
pub use builtins::FLASHES_KEY;
