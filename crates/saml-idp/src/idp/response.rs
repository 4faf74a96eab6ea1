use crate::binding::encode_post;
use crate::clock::{Clock, format_instant};
use crate::error::Result;
use crate::idp::assertion::{AssertionBuilder, AssertionParams};
use crate::idp::logout::STATUS_SUCCESS;
use crate::signing::{SignedMessageBuilder, SigningCredentials};
use crate::xml::{escape_attribute, escape_text, ns};

/// `samlp:Response` carrying one signed assertion, itself signed.
///
/// Destination, `InResponseTo` and issuer come from the assertion; both
/// signatures use the credentials' algorithm.
pub struct ResponseBuilder {
    response_id: String,
    assertion: AssertionBuilder,
    signer: SignedMessageBuilder,
}

impl ResponseBuilder {
    pub fn new(
        response_id: impl Into<String>,
        params: AssertionParams,
        credentials: SigningCredentials,
    ) -> Self {
        let params = AssertionParams {
            algorithm: Some(credentials.algorithm()),
            ..params
        };
        Self {
            response_id: response_id.into(),
            assertion: AssertionBuilder::new(params),
            signer: SignedMessageBuilder::new(credentials),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.assertion = self.assertion.with_clock(clock);
        self
    }

    pub fn assertion(&self) -> &AssertionBuilder {
        &self.assertion
    }

    pub fn response_id_string(&self) -> String {
        format!("_{}", self.response_id)
    }

    /// Signs the assertion on first call, then wraps and signs the envelope.
    pub fn build(&mut self) -> Result<String> {
        if self.assertion.signature().is_none() {
            let digest = self.assertion.digest()?.to_string();
            let block = self.signer.signature_block(
                self.assertion.raw(),
                &self.assertion.reference_string(),
                &digest,
            )?;
            self.assertion.set_signature(block);
            self.assertion.rebuild();
        }

        let response_id = self.response_id_string();
        let params = self.assertion.params();
        let unsigned = format!(
            concat!(
                r#"<Response xmlns="{protocol}" Destination="{destination}" ID="{id}" InResponseTo="{in_response_to}" IssueInstant="{now}" Version="2.0">"#,
                r#"<Issuer xmlns="{assertion_ns}">{issuer}</Issuer>"#,
                r#"<Status><StatusCode Value="{success}"></StatusCode></Status>"#,
                "{assertion}",
                "</Response>",
            ),
            protocol = ns::PROTOCOL,
            destination = escape_attribute(&params.acs_url),
            id = escape_attribute(&response_id),
            in_response_to = escape_attribute(&params.saml_request_id),
            now = format_instant(self.assertion.now()),
            assertion_ns = ns::ASSERTION,
            issuer = escape_text(&params.issuer_uri),
            success = STATUS_SUCCESS,
            assertion = self.assertion.raw(),
        );

        let signed = self.signer.sign_after_issuer(&unsigned, &response_id)?;
        tracing::debug!(
            response_id = %response_id,
            in_response_to = %params.saml_request_id,
            destination = %params.acs_url,
            "built SAML response"
        );
        Ok(signed)
    }

    /// Base64 for the `SAMLResponse` field of the POST binding.
    pub fn encoded(&mut self) -> Result<String> {
        Ok(encode_post(&self.build()?))
    }
}
