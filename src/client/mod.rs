//! REST side of the client.
//!
//! - [`http_middleware`] - request/response middleware chain
//! - [`auth`] - bearer tokens, the credential seam, and the auth middleware
//! - `remote` - JSON client over `reqwest` (feature `http-client`)
//! - `api` - typed backend endpoints (feature `http-client`)

pub mod auth;
pub mod http_middleware;

#[cfg(feature = "http-client")]
pub mod api;
#[cfg(feature = "http-client")]
pub mod remote;

pub use auth::{AuthMiddleware, BearerToken, CredentialSource, TokenPair};
pub use http_middleware::{
    HttpMiddleware, HttpMiddlewareChain, HttpMiddlewareContext, HttpRequest, HttpResponse,
};

#[cfg(feature = "http-client")]
pub use api::StudyApi;
#[cfg(feature = "http-client")]
pub use remote::RemoteClient;
