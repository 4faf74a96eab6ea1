#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use saml_idp::ServiceProviderRecord;
use std::io::Write;

#[path = "../../src/test_support.rs"]
mod test_support;
pub use test_support::TestCredentials;

pub const REQUEST_ID: &str = "_af43d1a0-e111-0130-661a-3c0754403fdb";
pub const SP_ENTITY_ID: &str = "localhost:3000";
pub const ACS_URL: &str = "http://localhost:3000/saml/consume";
pub const SP_LOGOUT_URL: &str = "http://localhost:3000/saml/logout";

pub fn authn_request_xml(issuer: &str) -> String {
    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" AssertionConsumerServiceURL="{ACS_URL}" Destination="http://localhost:1337/saml/auth" ID="{REQUEST_ID}" IssueInstant="2013-08-06T22:01:35Z" Version="2.0"><saml:Issuer xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">{issuer}</saml:Issuer><samlp:RequestedAuthnContext Comparison="exact"><saml:AuthnContextClassRef xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">urn:oasis:names:tc:SAML:2.0:ac:classes:Password</saml:AuthnContextClassRef></samlp:RequestedAuthnContext></samlp:AuthnRequest>"#
    )
}

pub fn logout_request_xml(issuer: &str) -> String {
    format!(
        r#"<LogoutRequest xmlns="urn:oasis:names:tc:SAML:2.0:protocol" Destination="http://localhost:1337/saml/logout" ID="_some_response_id" IssueInstant="2010-06-01T13:00:00Z" Version="2.0"><Issuer xmlns="urn:oasis:names:tc:SAML:2.0:assertion">{issuer}</Issuer><NameID xmlns="urn:oasis:names:tc:SAML:2.0:assertion">some_name_id</NameID><SessionIndex>abc123index</SessionIndex></LogoutRequest>"#
    )
}

/// Redirect binding encoding, wrapped at 60 columns like MIME base64.
pub fn encode_redirect_binding(xml: &str) -> String {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(xml.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();
    let encoded = STANDARD.encode(&compressed);
    encoded
        .as_bytes()
        .chunks(60)
        .map(|line| format!("{}\n", std::str::from_utf8(line).unwrap()))
        .collect()
}

pub fn sp_record(cert_pem: &str, sign_authn_request: bool) -> ServiceProviderRecord {
    ServiceProviderRecord {
        entity_id: SP_ENTITY_ID.into(),
        cert: cert_pem.into(),
        fingerprint: None,
        acs_url: Some(ACS_URL.into()),
        response_hosts: vec![],
        sign_authn_request,
        logout_service_url: Some(SP_LOGOUT_URL.into()),
    }
}
