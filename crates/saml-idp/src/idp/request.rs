//! Inbound `AuthnRequest` and `LogoutRequest` handling.
//!
//! A [`RequestValidator`] turns an encoded message into an [`InboundRequest`].
//! Decoding never fails outright: a message that cannot be decoded, parsed or
//! classified still produces an `InboundRequest`, one whose accessors are all
//! empty and whose [`InboundRequest::is_valid`] is false.

use crate::algorithm::DigestAlgorithm;
use crate::binding::{Binding, decode_base64};
use crate::directory::{ServiceProviderDirectory, ServiceProviderRecord};
use crate::error::{Error, Result};
use crate::log::{LogSink, TracingSink};
use crate::signature;
use crate::xml::{XmlDocument, XmlElement, ns};
use std::cell::OnceCell;

static TRACING_SINK: TracingSink = TracingSink;

/// Query parameters of a redirect-binding message signed outside the XML.
///
/// `saml_request` and `relay_state` are the values as received, before
/// URL-encoding; the signed string is rebuilt from them. `saml_request` may be
/// left out, the encoded message itself standing in for it; when given it
/// must be exactly the message that was decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalSignature {
    pub saml_request: Option<String>,
    pub relay_state: Option<String>,
    pub sig_algorithm: Option<String>,
    pub signature: Option<String>,
}

impl ExternalSignature {
    pub fn is_supplied(&self) -> bool {
        self.saml_request.is_some()
            || self.relay_state.is_some()
            || self.sig_algorithm.is_some()
            || self.signature.is_some()
    }

    /// `SAMLRequest=..[&RelayState=..]&SigAlg=..`, form-urlencoded.
    fn signed_query(&self, saml_request: &str) -> Option<String> {
        let sig_algorithm = self.sig_algorithm.as_deref()?;

        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("SAMLRequest", saml_request);
        if let Some(relay_state) = self.relay_state.as_deref() {
            query.append_pair("RelayState", relay_state);
        }
        query.append_pair("SigAlg", sig_algorithm);
        Some(query.finish())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Authn {
        acs_url: Option<String>,
        requested_authn_context: Option<String>,
    },
    Logout {
        name_id: Option<String>,
        session_index: Option<String>,
    },
}

/// Fields extracted from a decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub request_id: Option<String>,
    /// Never `Some("")`.
    pub issuer: Option<String>,
    pub kind: RequestKind,
}

impl ParsedRequest {
    pub fn from_document(document: &XmlDocument) -> Result<Self> {
        let root = document.root();
        let kind = match root.local_name() {
            "AuthnRequest" => RequestKind::Authn {
                acs_url: root.attribute("AssertionConsumerServiceURL").map(str::to_string),
                requested_authn_context: root
                    .child(ns::PROTOCOL, "RequestedAuthnContext")
                    .and_then(|context| context.child(ns::ASSERTION, "AuthnContextClassRef"))
                    .and_then(non_blank_text),
            },
            "LogoutRequest" => RequestKind::Logout {
                name_id: root.child(ns::ASSERTION, "NameID").and_then(non_blank_text),
                session_index: root.child(ns::PROTOCOL, "SessionIndex").and_then(non_blank_text),
            },
            other => return Err(Error::Decode(format!("unsupported request type {other}"))),
        };

        Ok(Self {
            request_id: root.attribute("ID").map(str::to_string),
            issuer: root.child(ns::ASSERTION, "Issuer").and_then(non_blank_text),
            kind,
        })
    }
}

/// Element text as written, `None` when it is empty or only whitespace.
fn non_blank_text(element: &XmlElement) -> Option<String> {
    let text = element.text();
    (!text.trim().is_empty()).then_some(text)
}

/// Entry point for inbound messages. Borrows the SP directory and the sink
/// diagnostics go to; both outlive every request it produces.
#[derive(Clone, Copy)]
pub struct RequestValidator<'a> {
    directory: &'a dyn ServiceProviderDirectory,
    log: &'a dyn LogSink,
}

impl<'a> RequestValidator<'a> {
    pub fn new(directory: &'a dyn ServiceProviderDirectory) -> Self {
        Self {
            directory,
            log: &TRACING_SINK,
        }
    }

    pub fn with_log_sink(mut self, log: &'a dyn LogSink) -> Self {
        self.log = log;
        self
    }

    /// Raw XML, as received through the POST binding once base64 is undone.
    pub fn from_xml(&self, xml: &str) -> InboundRequest<'a> {
        let decoded = XmlDocument::parse(xml);
        self.inbound(Binding::Post, None, decoded, ExternalSignature::default())
    }

    /// Base64 `SAMLRequest` from the POST binding.
    pub fn from_post_request(&self, encoded: &str) -> InboundRequest<'a> {
        let decoded = Binding::Post
            .decode(encoded)
            .and_then(|xml| XmlDocument::parse(&xml));
        self.inbound(Binding::Post, Some(encoded), decoded, ExternalSignature::default())
    }

    /// Base64 over raw deflate, from the redirect binding. `external` carries
    /// the query-string signature when the SP signed the URL instead of the
    /// XML; pass `ExternalSignature::default()` otherwise.
    pub fn from_deflated_request(
        &self,
        encoded: &str,
        external: ExternalSignature,
    ) -> InboundRequest<'a> {
        let decoded = Binding::Redirect
            .decode(encoded)
            .and_then(|xml| XmlDocument::parse(&xml));
        self.inbound(Binding::Redirect, Some(encoded), decoded, external)
    }

    fn inbound(
        &self,
        binding: Binding,
        encoded: Option<&str>,
        decoded: Result<XmlDocument>,
        external: ExternalSignature,
    ) -> InboundRequest<'a> {
        let decoded = decoded.and_then(|document| {
            let parsed = ParsedRequest::from_document(&document)?;
            Ok((document, parsed))
        });

        let (document, parsed) = match decoded {
            Ok((document, parsed)) => (Some(document), Some(parsed)),
            Err(e) => {
                tracing::debug!(binding = binding.uri(), error = %e, "failed to decode SAML request");
                (None, None)
            }
        };

        InboundRequest {
            binding,
            encoded: encoded.map(str::to_string),
            document,
            parsed,
            external,
            directory: self.directory,
            log: self.log,
            service_provider: OnceCell::new(),
        }
    }
}

/// One decoded inbound message. Owned by the call that received it.
pub struct InboundRequest<'a> {
    binding: Binding,
    encoded: Option<String>,
    document: Option<XmlDocument>,
    parsed: Option<ParsedRequest>,
    external: ExternalSignature,
    directory: &'a dyn ServiceProviderDirectory,
    log: &'a dyn LogSink,
    service_provider: OnceCell<Option<ServiceProviderRecord>>,
}

impl InboundRequest<'_> {
    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// The message as received, before binding decoding. `None` for raw XML.
    pub fn encoded(&self) -> Option<&str> {
        self.encoded.as_deref()
    }

    pub fn is_decoded(&self) -> bool {
        self.parsed.is_some()
    }

    pub fn parsed(&self) -> Option<&ParsedRequest> {
        self.parsed.as_ref()
    }

    pub fn document(&self) -> Option<&XmlDocument> {
        self.document.as_ref()
    }

    /// Root element of the decoded request.
    pub fn request(&self) -> Option<&XmlElement> {
        self.document.as_ref().map(XmlDocument::root)
    }

    pub fn external_signature(&self) -> &ExternalSignature {
        &self.external
    }

    pub fn request_id(&self) -> Option<&str> {
        self.parsed.as_ref()?.request_id.as_deref()
    }

    pub fn issuer(&self) -> Option<&str> {
        self.parsed.as_ref()?.issuer.as_deref()
    }

    pub fn is_authn_request(&self) -> bool {
        matches!(
            self.parsed,
            Some(ParsedRequest {
                kind: RequestKind::Authn { .. },
                ..
            })
        )
    }

    pub fn is_logout_request(&self) -> bool {
        matches!(
            self.parsed,
            Some(ParsedRequest {
                kind: RequestKind::Logout { .. },
                ..
            })
        )
    }

    pub fn acs_url(&self) -> Option<&str> {
        match &self.parsed.as_ref()?.kind {
            RequestKind::Authn { acs_url, .. } => acs_url.as_deref(),
            RequestKind::Logout { .. } => None,
        }
    }

    pub fn requested_authn_context(&self) -> Option<&str> {
        match &self.parsed.as_ref()?.kind {
            RequestKind::Authn {
                requested_authn_context,
                ..
            } => requested_authn_context.as_deref(),
            RequestKind::Logout { .. } => None,
        }
    }

    pub fn name_id(&self) -> Option<&str> {
        match &self.parsed.as_ref()?.kind {
            RequestKind::Logout { name_id, .. } => name_id.as_deref(),
            RequestKind::Authn { .. } => None,
        }
    }

    pub fn session_index(&self) -> Option<&str> {
        match &self.parsed.as_ref()?.kind {
            RequestKind::Logout { session_index, .. } => session_index.as_deref(),
            RequestKind::Authn { .. } => None,
        }
    }

    /// Looked up by issuer on first use, at most once.
    pub fn service_provider(&self) -> Option<&ServiceProviderRecord> {
        self.service_provider
            .get_or_init(|| self.issuer().and_then(|issuer| self.directory.find(issuer)))
            .as_ref()
    }

    pub fn logout_url(&self) -> Option<&str> {
        self.service_provider()?.logout_url()
    }

    /// Where the answer to this request goes: the ACS URL of an
    /// `AuthnRequest`, the SP's logout URL for a `LogoutRequest`.
    pub fn response_url(&self) -> Option<&str> {
        match &self.parsed.as_ref()?.kind {
            RequestKind::Authn { acs_url, .. } => acs_url.as_deref(),
            RequestKind::Logout { .. } => self.logout_url(),
        }
    }

    /// Emits exactly one diagnostic to the log sink when it returns false.
    pub fn is_valid(&self) -> bool {
        match self.validation_failure() {
            None => {
                tracing::debug!(
                    request_id = self.request_id(),
                    issuer = self.issuer(),
                    "SAML request is valid"
                );
                true
            }
            Some(message) => {
                self.log.emit(&message);
                false
            }
        }
    }

    fn validation_failure(&self) -> Option<String> {
        if self.parsed.is_none() {
            return Some("Unable to decode SAML request".into());
        }

        let issuer = self.issuer().unwrap_or_default();
        let Some(service_provider) = self.service_provider() else {
            return Some(format!("Unable to find service provider for issuer {issuer}"));
        };

        let signature_valid = if self.external.is_supplied() {
            self.has_valid_external_signature()
        } else {
            self.has_valid_signature()
        };
        if !signature_valid {
            return Some(format!("Signature is invalid for issuer {issuer}"));
        }

        let Some(response_url) = self.response_url() else {
            return Some(format!("Unable to find response url for issuer {issuer}"));
        };
        if !service_provider.accepts_response_url(response_url) {
            return Some(format!("Invalid response url {response_url} for issuer {issuer}"));
        }

        None
    }

    /// Checks the signature enveloped in the XML against the SP certificate.
    /// True without looking when the SP does not require signed requests.
    pub fn has_valid_signature(&self) -> bool {
        let Some(service_provider) = self.service_provider() else {
            return false;
        };
        if !service_provider.sign_authn_request {
            return true;
        }
        let Some(document) = self.document.as_ref() else {
            return false;
        };

        match service_provider.certificate() {
            Ok(certificate) => signature::verify_document(
                document,
                &certificate,
                None,
                service_provider.fingerprint.as_deref(),
            ),
            Err(e) => {
                tracing::debug!(entity_id = %service_provider.entity_id, error = %e, "unusable SP certificate");
                false
            }
        }
    }

    /// Checks the redirect-binding query signature against the SP
    /// certificate. True without looking when the SP does not require signed
    /// requests; false when any needed parameter is missing or the signed
    /// `SAMLRequest` is not the message that was decoded.
    pub fn has_valid_external_signature(&self) -> bool {
        let Some(service_provider) = self.service_provider() else {
            return false;
        };
        if !service_provider.sign_authn_request {
            return true;
        }

        match self.check_external_signature(service_provider) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::debug!(entity_id = %service_provider.entity_id, error = %e, "external signature rejected");
                false
            }
        }
    }

    fn check_external_signature(&self, service_provider: &ServiceProviderRecord) -> Result<bool> {
        let encoded = self
            .encoded
            .as_deref()
            .ok_or_else(|| Error::Signature("no encoded message to bind the signature to".into()))?;
        let saml_request = match self.external.saml_request.as_deref() {
            Some(signed) if signed != encoded => {
                return Err(Error::Signature(
                    "signed SAMLRequest is not the decoded message".into(),
                ));
            }
            Some(signed) => signed,
            None => encoded,
        };
        let signed_query = self
            .external
            .signed_query(saml_request)
            .ok_or_else(|| Error::Signature("SigAlg missing".into()))?;
        let sig_algorithm = self.external.sig_algorithm.as_deref().unwrap_or_default();
        let algorithm = DigestAlgorithm::from_signature_uri(sig_algorithm)
            .ok_or_else(|| Error::Signature(format!("unsupported SigAlg {sig_algorithm}")))?;
        let signature = self
            .external
            .signature
            .as_deref()
            .ok_or_else(|| Error::Signature("Signature missing".into()))?;
        let signature = decode_base64(signature)?;
        let certificate = service_provider.certificate()?;

        Ok(signature::verify_detached(
            signed_query.as_bytes(),
            &signature,
            &certificate,
            algorithm,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::encode_redirect;
    use crate::certificate::fingerprint;
    use crate::directory::StaticDirectory;
    use crate::log::capture::CapturingSink;
    use crate::signing::{SignedMessageBuilder, SigningCredentials};
    use crate::test_support::TestCredentials;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    const REQUEST_ID: &str = "_af43d1a0-e111-0130-661a-3c0754403fdb";

    fn authn_request(issuer: &str) -> String {
        format!(
            "<samlp:AuthnRequest AssertionConsumerServiceURL='http://localhost:3000/saml/consume' Destination='http://localhost:1337/saml/auth' ID='{REQUEST_ID}' IssueInstant='2013-08-06T22:01:35Z' Version='2.0' xmlns:samlp='urn:oasis:names:tc:SAML:2.0:protocol'><saml:Issuer xmlns:saml='urn:oasis:names:tc:SAML:2.0:assertion'>{issuer}</saml:Issuer><samlp:NameIDPolicy AllowCreate='true' Format='urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress' xmlns:samlp='urn:oasis:names:tc:SAML:2.0:protocol'/><samlp:RequestedAuthnContext Comparison='exact'><saml:AuthnContextClassRef xmlns:saml='urn:oasis:names:tc:SAML:2.0:assertion'>urn:oasis:names:tc:SAML:2.0:ac:classes:Password</saml:AuthnContextClassRef></samlp:RequestedAuthnContext></samlp:AuthnRequest>"
        )
    }

    const LOGOUT_REQUEST: &str = "<LogoutRequest ID='_some_response_id' Version='2.0' IssueInstant='2010-06-01T13:00:00Z' Destination='http://localhost:3000/saml/logout' xmlns='urn:oasis:names:tc:SAML:2.0:protocol'><Issuer xmlns='urn:oasis:names:tc:SAML:2.0:assertion'>http://example.com</Issuer><NameID xmlns='urn:oasis:names:tc:SAML:2.0:assertion' Format='urn:oasis:names:tc:SAML:2.0:nameid-format:persistent'>some_name_id</NameID><SessionIndex>abc123index</SessionIndex></LogoutRequest>";

    fn record(entity_id: &str, cert: &str, sign_authn_request: bool) -> ServiceProviderRecord {
        ServiceProviderRecord {
            entity_id: entity_id.into(),
            cert: cert.into(),
            fingerprint: None,
            acs_url: Some("http://localhost:3000/saml/consume".into()),
            response_hosts: vec!["localhost".into(), "example.com".into()],
            sign_authn_request,
            logout_service_url: Some("http://example.com/saml/logout".into()),
        }
    }

    fn directory(cert: &str, sign_authn_request: bool) -> StaticDirectory {
        StaticDirectory::new([
            record("localhost:3000", cert, sign_authn_request),
            record("http://example.com", cert, sign_authn_request),
        ])
    }

    #[test]
    fn authn_request_accessors() {
        let directory = directory("", false);
        let request = RequestValidator::new(&directory).from_xml(&authn_request("localhost:3000"));

        assert_eq!(request.request_id(), Some(REQUEST_ID));
        assert_eq!(request.issuer(), Some("localhost:3000"));
        assert_eq!(request.acs_url(), Some("http://localhost:3000/saml/consume"));
        assert_eq!(request.response_url(), request.acs_url());
        assert_eq!(
            request.requested_authn_context(),
            Some("urn:oasis:names:tc:SAML:2.0:ac:classes:Password")
        );
        assert!(request.is_authn_request());
        assert!(!request.is_logout_request());
        assert_eq!(request.request().and_then(|r| r.attribute("ID")), Some(REQUEST_ID));
        assert!(request.service_provider().is_some());
        assert!(request.has_valid_signature());
        assert!(request.is_valid());
    }

    #[test]
    fn logout_request_accessors() {
        let directory = directory("", false);
        let request = RequestValidator::new(&directory).from_xml(LOGOUT_REQUEST);

        assert_eq!(request.request_id(), Some("_some_response_id"));
        assert!(request.is_logout_request());
        assert!(!request.is_authn_request());
        assert_eq!(request.name_id(), Some("some_name_id"));
        assert_eq!(request.session_index(), Some("abc123index"));
        assert_eq!(request.issuer(), Some("http://example.com"));
        assert_eq!(request.acs_url(), None);
        assert_eq!(request.response_url(), request.logout_url());
        assert_eq!(request.logout_url(), Some("http://example.com/saml/logout"));
        assert!(request.is_valid());
    }

    #[test]
    fn deflated_request_inflates() {
        let directory = directory("", false);
        let xml = authn_request("localhost:3000");
        let encoded = encode_redirect(&xml).unwrap();

        let request = RequestValidator::new(&directory)
            .from_deflated_request(&encoded, ExternalSignature::default());
        assert_eq!(request.binding(), Binding::Redirect);
        assert_eq!(request.request_id(), Some(REQUEST_ID));
    }

    #[test]
    fn garbage_is_invalid_without_panicking() {
        let directory = directory("", false);
        let sink = CapturingSink::default();
        let validator = RequestValidator::new(&directory).with_log_sink(&sink);

        let request = validator.from_deflated_request("bang!", ExternalSignature::default());
        assert!(!request.is_decoded());
        assert!(!request.is_valid());
        assert!(!request.is_authn_request() && !request.is_logout_request());
        assert_eq!(request.request_id(), None);
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn unsupported_root_is_a_decode_failure() {
        let directory = directory("", false);
        let xml = r#"<samlp:ArtifactResolve xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_x"/>"#;
        let request = RequestValidator::new(&directory).from_xml(xml);
        assert!(!request.is_authn_request());
        assert!(!request.is_logout_request());
        assert!(!request.is_valid());
    }

    #[test]
    fn empty_issuer_logs_exactly_once() {
        let directory = directory("", false);
        let sink = CapturingSink::default();
        let request = RequestValidator::new(&directory)
            .with_log_sink(&sink)
            .from_xml(&authn_request(""));

        assert_eq!(request.issuer(), None);
        assert!(!request.is_valid());
        assert_eq!(
            sink.messages(),
            vec!["Unable to find service provider for issuer ".to_string()]
        );
    }

    #[test]
    fn unknown_issuer_is_invalid() {
        let directory = directory("", false);
        let sink = CapturingSink::default();
        let request = RequestValidator::new(&directory)
            .with_log_sink(&sink)
            .from_xml(&authn_request("unknown.example.com"));

        assert!(request.service_provider().is_none());
        assert!(!request.is_valid());
        assert_eq!(
            sink.messages(),
            vec!["Unable to find service provider for issuer unknown.example.com".to_string()]
        );
    }

    #[test]
    fn service_provider_is_resolved_once() {
        let lookups = std::sync::atomic::AtomicUsize::new(0);
        let directory = |issuer: &str| {
            lookups.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            (issuer == "localhost:3000").then(|| record(issuer, "", false))
        };
        let request = RequestValidator::new(&directory).from_xml(&authn_request("localhost:3000"));

        assert!(request.is_valid());
        assert!(request.service_provider().is_some());
        assert_eq!(lookups.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn response_url_host_must_be_acceptable() {
        let directory = StaticDirectory::new([ServiceProviderRecord {
            response_hosts: vec!["foo.example.com".into()],
            ..record("localhost:3000", "", false)
        }]);
        let sink = CapturingSink::default();
        let request = RequestValidator::new(&directory)
            .with_log_sink(&sink)
            .from_xml(&authn_request("localhost:3000"));

        assert!(!request.is_valid());
        assert_eq!(sink.messages().len(), 1);
        assert!(sink.messages()[0].starts_with("Invalid response url"));
    }

    #[test]
    fn unsigned_request_fails_when_signing_is_required() {
        let sp = TestCredentials::generate("sp.example.com");
        let directory = directory(&sp.cert_pem(), true);
        let request = RequestValidator::new(&directory).from_xml(&authn_request("localhost:3000"));

        assert!(!request.has_valid_signature());
        assert!(!request.is_valid());
    }

    #[test]
    fn signed_request_verifies_against_sp_certificate() {
        let sp = TestCredentials::generate("sp.example.com");
        let credentials = SigningCredentials::new(
            sp.cert.clone(),
            sp.key.clone(),
            Some(DigestAlgorithm::Sha256),
        )
        .unwrap();
        let signed = SignedMessageBuilder::new(credentials)
            .sign_after_issuer(&authn_request("localhost:3000"), REQUEST_ID)
            .unwrap();

        let mut sp_record = record("localhost:3000", &sp.cert_pem(), true);
        sp_record.fingerprint = Some(fingerprint(&sp.cert, None).unwrap());
        let directory = StaticDirectory::new([sp_record.clone()]);
        let request = RequestValidator::new(&directory).from_xml(&signed);
        assert!(request.has_valid_signature());
        assert!(request.is_valid());

        let tampered = signed.replace("localhost:3000/saml/consume", "localhost:3000/saml/steal");
        assert!(!RequestValidator::new(&directory).from_xml(&tampered).has_valid_signature());

        let other = TestCredentials::generate("evil.example.com");
        sp_record.fingerprint = Some(fingerprint(&other.cert, None).unwrap());
        let directory = StaticDirectory::new([sp_record]);
        assert!(!RequestValidator::new(&directory).from_xml(&signed).has_valid_signature());
    }

    fn query_signed_logout(sp: &TestCredentials, relay_state: Option<&str>) -> (String, ExternalSignature) {
        let encoded = encode_redirect(LOGOUT_REQUEST).unwrap();
        let mut external = ExternalSignature {
            saml_request: Some(encoded.clone()),
            relay_state: relay_state.map(str::to_string),
            sig_algorithm: Some(DigestAlgorithm::Sha256.signature_uri().to_string()),
            signature: None,
        };
        let query = external.signed_query(&encoded).unwrap();
        let signature = signature::sign(query.as_bytes(), &sp.key, DigestAlgorithm::Sha256).unwrap();
        external.signature = Some(STANDARD.encode(signature));
        (encoded, external)
    }

    #[test]
    fn query_signed_logout_request_verifies() {
        let sp = TestCredentials::generate("sp.example.com");
        let directory = directory(&sp.cert_pem(), true);
        let (encoded, external) = query_signed_logout(&sp, Some("relay/state?x=1"));

        let request = RequestValidator::new(&directory).from_deflated_request(&encoded, external);
        assert!(request.has_valid_external_signature());
        assert!(request.is_valid());
    }

    #[test]
    fn query_signature_from_another_key_fails() {
        let sp = TestCredentials::generate("sp.example.com");
        let other = TestCredentials::generate("evil.example.com");
        let directory = directory(&sp.cert_pem(), true);
        let (encoded, external) = query_signed_logout(&other, None);

        let request = RequestValidator::new(&directory).from_deflated_request(&encoded, external);
        assert!(!request.has_valid_external_signature());
        assert!(!request.is_valid());
    }

    #[test]
    fn dropping_relay_state_breaks_the_query_signature() {
        let sp = TestCredentials::generate("sp.example.com");
        let directory = directory(&sp.cert_pem(), true);
        let (encoded, mut external) = query_signed_logout(&sp, Some("state"));
        external.relay_state = None;

        let request = RequestValidator::new(&directory).from_deflated_request(&encoded, external);
        assert!(!request.has_valid_external_signature());
    }

    #[test]
    fn missing_external_parameters_return_false() {
        let sp = TestCredentials::generate("sp.example.com");
        let directory = directory(&sp.cert_pem(), true);
        let (encoded, complete) = query_signed_logout(&sp, None);

        let partial = [
            ExternalSignature { sig_algorithm: None, ..complete.clone() },
            ExternalSignature { signature: None, ..complete.clone() },
            ExternalSignature { sig_algorithm: Some("urn:unknown".into()), ..complete.clone() },
            ExternalSignature { signature: Some("!!".into()), ..complete },
        ];
        for external in partial {
            let request = RequestValidator::new(&directory).from_deflated_request(&encoded, external);
            assert!(!request.has_valid_external_signature());
            assert!(!request.is_valid());
        }
    }

    #[test]
    fn encoded_message_stands_in_for_missing_saml_request() {
        let sp = TestCredentials::generate("sp.example.com");
        let directory = directory(&sp.cert_pem(), true);
        let (encoded, external) = query_signed_logout(&sp, Some("state"));
        let external = ExternalSignature {
            saml_request: None,
            ..external
        };

        let request = RequestValidator::new(&directory).from_deflated_request(&encoded, external);
        assert_eq!(request.encoded(), Some(encoded.as_str()));
        assert!(request.has_valid_external_signature());
        assert!(request.is_valid());
    }

    #[test]
    fn query_signature_only_vouches_for_the_message_it_signed() {
        let sp = TestCredentials::generate("sp.example.com");
        let directory = directory(&sp.cert_pem(), true);
        let (_, signed_for_other) = query_signed_logout(&sp, None);
        let substituted = encode_redirect(&LOGOUT_REQUEST.replace("some_name_id", "victim")).unwrap();

        let sink = CapturingSink::default();
        let request = RequestValidator::new(&directory)
            .with_log_sink(&sink)
            .from_deflated_request(&substituted, signed_for_other);
        assert_eq!(request.name_id(), Some("victim"));
        assert!(!request.has_valid_external_signature());
        assert!(!request.is_valid());
        assert_eq!(
            sink.messages(),
            vec!["Signature is invalid for issuer http://example.com".to_string()]
        );
    }

    #[test]
    fn element_text_is_kept_as_written() {
        let directory = directory("", false);
        let xml = LOGOUT_REQUEST
            .replace(">some_name_id<", ">  some_name_id\n<")
            .replace(">abc123index<", "> \t\n <");
        let request = RequestValidator::new(&directory).from_xml(&xml);

        assert_eq!(request.name_id(), Some("  some_name_id\n"));
        assert_eq!(request.session_index(), None);
    }

    #[test]
    fn external_signature_skipped_when_not_required() {
        let directory = directory("", false);
        let encoded = encode_redirect(LOGOUT_REQUEST).unwrap();
        let external = ExternalSignature {
            signature: Some("garbage".into()),
            ..ExternalSignature::default()
        };
        let request = RequestValidator::new(&directory).from_deflated_request(&encoded, external);
        assert!(request.has_valid_external_signature());
        assert!(request.is_valid());
    }
}
