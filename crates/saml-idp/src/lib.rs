pub mod algorithm;
pub mod binding;
pub mod c14n;
pub mod certificate;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod idp;
pub mod log;
pub mod signature;
pub mod signing;
pub mod state;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use algorithm::DigestAlgorithm;
pub use binding::Binding;
pub use directory::{ServiceProviderDirectory, ServiceProviderRecord, StaticDirectory};
pub use error::{Error, Result};
pub use log::{LogSink, TracingSink};
pub use signing::{SignedMessageBuilder, SigningCredentials};

/// Fresh identifier for an outbound message; builders prefix it with `_`.
pub fn new_reference_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
