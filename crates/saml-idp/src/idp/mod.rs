//! Identity Provider messages: what comes in from Service Providers and what
//! goes back to them.

pub mod assertion;
pub mod logout;
pub mod request;
pub mod response;

pub use assertion::{AssertionBuilder, AssertionParams};
pub use logout::LogoutResponseBuilder;
pub use request::{ExternalSignature, InboundRequest, ParsedRequest, RequestKind, RequestValidator};
pub use response::ResponseBuilder;
