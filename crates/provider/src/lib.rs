//! Request routing and translation for the Code Assist backends.
//!
//! [`Gateway`] ties the pieces together: [`model`] resolves aliases per
//! header style, [`request`] builds the backend envelope, [`router`] walks the
//! endpoint fallback list and [`response`] unwraps what comes back.
//! [`ReqwestTransport`] is the production [`HttpTransport`](gravlink_types::HttpTransport).

pub mod gateway;
pub mod model;
pub mod request;
pub mod response;
pub mod router;
pub mod transport;

pub use gateway::{FetchOptions, Gateway};
pub use model::{ResolvedModel, Tier, resolve_effective_model, resolve_model};
pub use request::{PreparedRequest, RequestOptions, ToolDebug};
pub use router::EndpointRouter;
pub use transport::{ReqwestTransport, build_http_client};
