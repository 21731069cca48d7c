//! Request and response carriers handed to a [`Context`](crate::context::Context).
//!
//! The socket-owning HTTP layer is external; it builds a [`Request`] per inbound
//! request and writes out the [`ResponseWriter`] returned by
//! [`Route::serve`](crate::app::Route::serve).

pub mod request;
pub mod response;

pub use request::{parse_cookies, parse_query_params, HeaderVec, ParamVec, Request};
pub use response::{Cookie, ResponseWriter};
