use crate::algorithm::DigestAlgorithm;
use crate::clock::{Clock, SystemClock, format_instant};
use crate::error::Result;
use crate::signing::{SignedMessageBuilder, SigningCredentials};
use crate::xml::{escape_attribute, escape_text, ns};
use chrono::{DateTime, Utc};
use std::cell::OnceCell;

pub const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";

/// Answers a `LogoutRequest` with a signed success `LogoutResponse`.
///
/// `IssueInstant` is taken from the clock once, on first use, and reused by
/// every later build.
pub struct LogoutResponseBuilder {
    pub response_id: String,
    pub issuer_uri: String,
    pub slo_url: String,
    pub saml_request_id: String,
    pub algorithm: Option<DigestAlgorithm>,
    pub public_cert: String,
    pub private_key: String,
    pub key_password: Option<String>,
    clock: Box<dyn Clock>,
    now: OnceCell<DateTime<Utc>>,
}

impl LogoutResponseBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        response_id: impl Into<String>,
        issuer_uri: impl Into<String>,
        slo_url: impl Into<String>,
        saml_request_id: impl Into<String>,
        algorithm: Option<DigestAlgorithm>,
        public_cert: impl Into<String>,
        private_key: impl Into<String>,
        key_password: Option<String>,
    ) -> Self {
        Self {
            response_id: response_id.into(),
            issuer_uri: issuer_uri.into(),
            slo_url: slo_url.into(),
            saml_request_id: saml_request_id.into(),
            algorithm,
            public_cert: public_cert.into(),
            private_key: private_key.into(),
            key_password,
            clock: Box::new(SystemClock),
            now: OnceCell::new(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.get_or_init(|| self.clock.now())
    }

    /// Fails with [`Error::CryptoMaterial`](crate::Error::CryptoMaterial)
    /// when the key or certificate cannot be used to sign.
    pub fn build(&self) -> Result<String> {
        let credentials = SigningCredentials::from_pem(
            &self.public_cert,
            &self.private_key,
            self.key_password.as_deref(),
            self.algorithm,
        )?;
        let response_id = format!("_{}", self.response_id);
        let unsigned = self.unsigned(&response_id);

        let signed = SignedMessageBuilder::new(credentials).sign_after_issuer(&unsigned, &response_id)?;
        tracing::debug!(
            response_id = %response_id,
            in_response_to = %self.saml_request_id,
            "built logout response"
        );
        Ok(signed)
    }

    fn unsigned(&self, response_id: &str) -> String {
        format!(
            concat!(
                r#"<LogoutResponse xmlns="{protocol}" Destination="{destination}" ID="{id}" InResponseTo="{in_response_to}" IssueInstant="{now}" Version="2.0">"#,
                r#"<Issuer xmlns="{assertion}">{issuer}</Issuer>"#,
                r#"<Status><StatusCode Value="{success}"></StatusCode></Status>"#,
                "</LogoutResponse>",
            ),
            protocol = ns::PROTOCOL,
            destination = escape_attribute(&self.slo_url),
            id = escape_attribute(response_id),
            in_response_to = escape_attribute(&self.saml_request_id),
            now = format_instant(self.now()),
            assertion = ns::ASSERTION,
            issuer = escape_text(&self.issuer_uri),
            success = STATUS_SUCCESS,
        )
    }
}
