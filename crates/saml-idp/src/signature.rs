//! Sign and verify primitives shared by the inbound validator and the
//! outbound builders.
//!
//! Verification never returns an error to the caller: every malformed
//! structure, unsupported algorithm or mismatch collapses into `false`, with
//! the reason logged at debug level.

use crate::algorithm::DigestAlgorithm;
use crate::binding::decode_base64;
use crate::certificate::{fingerprint, fingerprints_match, parse_certificate};
use crate::error::{Error, Result};
use crate::xml::{XmlDocument, XmlElement, ns};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::pkey::{PKey, Private};
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509;

pub use crate::c14n::Canonicalization;

pub const ENVELOPED_SIGNATURE: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

impl Canonicalization {
    /// Parses `xml` and canonicalizes its root element.
    pub fn apply(self, xml: &str) -> Result<String> {
        let document = XmlDocument::parse(xml)?;
        Ok(self.canonicalize(document.root(), None, &[]))
    }
}

/// Base64 digest of `bytes`, without line breaks.
pub fn digest(bytes: &[u8], algorithm: DigestAlgorithm) -> Result<String> {
    let hashed = openssl::hash::hash(algorithm.message_digest(), bytes)
        .map_err(|e| Error::CryptoMaterial(format!("digest failed: {e}")))?;
    Ok(STANDARD.encode(hashed))
}

/// RSA signature over already canonical bytes.
pub fn sign(
    canonical: &[u8],
    private_key: &PKey<Private>,
    algorithm: DigestAlgorithm,
) -> Result<Vec<u8>> {
    let mut signer = Signer::new(algorithm.message_digest(), private_key)
        .map_err(|e| Error::CryptoMaterial(format!("signer creation failed: {e}")))?;
    signer
        .update(canonical)
        .map_err(|e| Error::CryptoMaterial(format!("signer update failed: {e}")))?;
    signer
        .sign_to_vec()
        .map_err(|e| Error::CryptoMaterial(format!("signing failed: {e}")))
}

/// Checks a detached RSA signature over raw bytes.
pub fn verify_detached(
    data: &[u8],
    signature: &[u8],
    certificate: &X509,
    algorithm: DigestAlgorithm,
) -> bool {
    match check_detached(data, signature, certificate, algorithm) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::debug!(error = %e, "detached signature check failed");
            false
        }
    }
}

fn check_detached(
    data: &[u8],
    signature: &[u8],
    certificate: &X509,
    algorithm: DigestAlgorithm,
) -> Result<bool> {
    let public_key = certificate
        .public_key()
        .map_err(|e| Error::Signature(format!("certificate has no usable public key: {e}")))?;
    let mut verifier = Verifier::new(algorithm.message_digest(), &public_key)
        .map_err(|e| Error::Signature(format!("verifier creation failed: {e}")))?;
    verifier
        .update(data)
        .map_err(|e| Error::Signature(format!("verifier update failed: {e}")))?;
    verifier
        .verify(signature)
        .map_err(|e| Error::Signature(format!("verification failed: {e}")))
}

/// Verifies the enveloped signature of a serialized document.
///
/// `canonicalization` pins the method the `SignedInfo` must declare; `None`
/// accepts any supported method.
pub fn verify(
    signed_xml: &str,
    certificate: &X509,
    canonicalization: Option<Canonicalization>,
) -> bool {
    match XmlDocument::parse(signed_xml) {
        Ok(document) => verify_document(&document, certificate, canonicalization, None),
        Err(e) => {
            tracing::debug!(error = %e, "signed document does not parse");
            false
        }
    }
}

/// Same as [`verify`] over a parsed document. When `expected_fingerprint` is
/// given and the signature embeds an `X509Certificate`, that certificate must
/// carry the expected fingerprint.
pub fn verify_document(
    document: &XmlDocument,
    certificate: &X509,
    canonicalization: Option<Canonicalization>,
    expected_fingerprint: Option<&str>,
) -> bool {
    match check_enveloped(document, certificate, canonicalization, expected_fingerprint) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::debug!(error = %e, "enveloped signature rejected");
            false
        }
    }
}

fn check_enveloped(
    document: &XmlDocument,
    certificate: &X509,
    required: Option<Canonicalization>,
    expected_fingerprint: Option<&str>,
) -> Result<bool> {
    let root = document.root();
    let signature = required_child(root, ns::DSIG, "Signature")?;
    let signed_info = required_child(signature, ns::DSIG, "SignedInfo")?;

    let c14n_method = required_child(signed_info, ns::DSIG, "CanonicalizationMethod")?;
    let c14n_uri = algorithm_of(signed_info, "CanonicalizationMethod")?;
    let c14n = Canonicalization::from_uri(c14n_uri)
        .ok_or_else(|| Error::Signature(format!("unsupported canonicalization {c14n_uri}")))?;
    if required.is_some_and(|required| required != c14n) {
        return Err(Error::Signature(format!(
            "canonicalization {c14n_uri} is not the expected one"
        )));
    }

    let signature_uri = algorithm_of(signed_info, "SignatureMethod")?;
    let signature_algorithm = DigestAlgorithm::from_signature_uri(signature_uri)
        .ok_or_else(|| Error::Signature(format!("unsupported signature method {signature_uri}")))?;

    let mut references = signed_info.elements().filter(|el| el.is(ns::DSIG, "Reference"));
    let reference = references
        .next()
        .ok_or_else(|| Error::Signature("SignedInfo has no Reference".into()))?;
    if references.next().is_some() {
        return Err(Error::Signature("SignedInfo has more than one Reference".into()));
    }

    // Only a reference to the whole message is meaningful; anything else lets
    // a signed fragment vouch for unsigned content around it.
    let uri = reference.attribute("URI").unwrap_or_default();
    let referenced = match uri.strip_prefix('#') {
        Some(id) => document.element_by_id(id),
        None if uri.is_empty() => Some(root),
        None => None,
    };
    if !referenced.is_some_and(|el| std::ptr::eq(el, root)) {
        return Err(Error::Signature(format!("reference {uri:?} does not target the root")));
    }

    let (reference_c14n, reference_prefixes) = reference_canonicalization(reference)?;
    let digest_uri = algorithm_of(reference, "DigestMethod")?;
    let digest_algorithm = DigestAlgorithm::from_digest_uri(digest_uri)
        .ok_or_else(|| Error::Signature(format!("unsupported digest method {digest_uri}")))?;
    let expected_digest = decode_base64(&required_child(reference, ns::DSIG, "DigestValue")?.text())?;

    let content = reference_c14n.canonicalize(root, Some(signature), &reference_prefixes);
    let computed_digest = openssl::hash::hash(digest_algorithm.message_digest(), content.as_bytes())
        .map_err(|e| Error::Signature(format!("digest failed: {e}")))?;
    if computed_digest.len() != expected_digest.len()
        || !openssl::memcmp::eq(&computed_digest[..], &expected_digest)
    {
        return Err(Error::Signature("digest mismatch".into()));
    }

    if let Some(expected) = expected_fingerprint {
        check_embedded_certificate(signature, expected)?;
    }

    let canonical_signed_info =
        c14n.canonicalize(signed_info, None, &inclusive_prefixes(c14n_method));
    let signature_value =
        decode_base64(&required_child(signature, ns::DSIG, "SignatureValue")?.text())?;

    check_detached(
        canonical_signed_info.as_bytes(),
        &signature_value,
        certificate,
        signature_algorithm,
    )
}

/// Every transform must be one we apply; the last canonicalization transform
/// wins, exclusive C14N if none is listed.
fn reference_canonicalization(reference: &XmlElement) -> Result<(Canonicalization, Vec<String>)> {
    let mut method = (Canonicalization::Exclusive, Vec::new());
    if let Some(transforms) = reference.child(ns::DSIG, "Transforms") {
        for transform in transforms.elements().filter(|el| el.is(ns::DSIG, "Transform")) {
            let uri = transform.attribute("Algorithm").unwrap_or_default();
            if uri == ENVELOPED_SIGNATURE {
                continue;
            }
            let c14n = Canonicalization::from_uri(uri)
                .ok_or_else(|| Error::Signature(format!("unsupported transform {uri}")))?;
            method = (c14n, inclusive_prefixes(transform));
        }
    }
    Ok(method)
}

/// `PrefixList` of an `ec:InclusiveNamespaces` child, if any.
fn inclusive_prefixes(method: &XmlElement) -> Vec<String> {
    method
        .child(crate::c14n::EXCLUSIVE, "InclusiveNamespaces")
        .and_then(|list| list.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn check_embedded_certificate(signature: &XmlElement, expected: &str) -> Result<()> {
    let Some(embedded) = signature
        .child(ns::DSIG, "KeyInfo")
        .and_then(|key_info| key_info.descendant(ns::DSIG, "X509Certificate"))
    else {
        return Ok(());
    };

    let cert = parse_certificate(&embedded.text())
        .map_err(|e| Error::Signature(format!("embedded certificate: {e}")))?;
    let actual = fingerprint(&cert, None)
        .map_err(|e| Error::Signature(format!("embedded certificate: {e}")))?;
    if fingerprints_match(&actual, expected) {
        Ok(())
    } else {
        Err(Error::Signature("embedded certificate fingerprint mismatch".into()))
    }
}

fn required_child<'a>(parent: &'a XmlElement, namespace: &str, name: &str) -> Result<&'a XmlElement> {
    parent
        .child(namespace, name)
        .ok_or_else(|| Error::Signature(format!("missing {name} in {}", parent.local_name())))
}

fn algorithm_of<'a>(parent: &'a XmlElement, name: &str) -> Result<&'a str> {
    required_child(parent, ns::DSIG, name)?
        .attribute("Algorithm")
        .ok_or_else(|| Error::Signature(format!("{name} has no Algorithm")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestCredentials;

    #[test]
    fn detached_signature_round_trip() {
        let creds = TestCredentials::generate("sp.example.com");
        let data = b"SAMLRequest=abc&SigAlg=x";
        for alg in [DigestAlgorithm::Sha1, DigestAlgorithm::Sha256, DigestAlgorithm::Sha512] {
            let signature = sign(data, &creds.key, alg).unwrap();
            assert!(verify_detached(data, &signature, &creds.cert, alg));
            assert!(!verify_detached(b"tampered", &signature, &creds.cert, alg));
        }
    }

    #[test]
    fn detached_signature_with_wrong_certificate() {
        let signer = TestCredentials::generate("sp.example.com");
        let other = TestCredentials::generate("evil.example.com");
        let signature = sign(b"data", &signer.key, DigestAlgorithm::Sha256).unwrap();
        assert!(!verify_detached(b"data", &signature, &other.cert, DigestAlgorithm::Sha256));
        assert!(!verify_detached(b"data", b"garbage", &signer.cert, DigestAlgorithm::Sha256));
    }

    #[test]
    fn digest_has_no_line_breaks() {
        let value = digest(&[0u8; 4096], DigestAlgorithm::Sha512).unwrap();
        assert!(!value.contains('\n'));
        assert_eq!(decode_base64(&value).unwrap().len(), 64);
    }

    #[test]
    fn unsigned_document_does_not_verify() {
        let creds = TestCredentials::generate("sp.example.com");
        let xml = r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_a"/>"#;
        assert!(!verify(xml, &creds.cert, None));
        assert!(!verify("<<<", &creds.cert, None));
    }

    #[test]
    fn garbled_signature_block_does_not_verify() {
        let creds = TestCredentials::generate("sp.example.com");
        let xml = r##"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_a"><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="urn:unknown"/><ds:Reference URI="#_a"/></ds:SignedInfo><ds:SignatureValue>!!!</ds:SignatureValue></ds:Signature></samlp:AuthnRequest>"##;
        assert!(!verify(xml, &creds.cert, None));
    }

    const SIGNED_ELSEWHERE: &str = include_str!("../tests/fixtures/sp-signed-authn-request.xml");
    const SIGNER_CERT: &str = include_str!("../tests/fixtures/sp-cert.pem");

    #[test]
    fn verifies_request_signed_elsewhere() {
        let cert = parse_certificate(SIGNER_CERT).unwrap();
        assert!(verify(SIGNED_ELSEWHERE, &cert, None));
        assert!(verify(SIGNED_ELSEWHERE, &cert, Some(Canonicalization::Exclusive)));
        assert!(!verify(SIGNED_ELSEWHERE, &cert, Some(Canonicalization::ExclusiveWithComments)));

        let document = XmlDocument::parse(SIGNED_ELSEWHERE).unwrap();
        assert!(verify_document(
            &document,
            &cert,
            None,
            Some("d724c29dfa68e76c789591a62be50784a457168b")
        ));
        let other = TestCredentials::generate("sp.example.org");
        assert!(!verify_document(
            &document,
            &cert,
            None,
            Some(&fingerprint(&other.cert, None).unwrap())
        ));
        assert!(!verify(SIGNED_ELSEWHERE, &other.cert, None));
    }

    #[test]
    fn request_signed_elsewhere_rejects_edits() {
        let cert = parse_certificate(SIGNER_CERT).unwrap();
        let edits = [
            ("PasswordProtectedTransport", "Password"),
            ("AllowCreate='true'", "AllowCreate='false'"),
            ("sIKPyvP2iBXaaJQBeW1bEiA3UeUjcI1ZYoY", "tIKPyvP2iBXaaJQBeW1bEiA3UeUjcI1ZYoY"),
            ("PrefixList=\"xs\"", "PrefixList=\"\""),
        ];
        for (from, to) in edits {
            let edited = SIGNED_ELSEWHERE.replace(from, to);
            assert_ne!(edited, SIGNED_ELSEWHERE);
            assert!(!verify(&edited, &cert, None), "{from} -> {to}");
        }
        // Only whitespace outside the root, which canonical form drops.
        assert!(verify(&format!("{SIGNED_ELSEWHERE}\n\n"), &cert, None));
    }

    #[test]
    fn apply_parses_and_canonicalizes() {
        assert_eq!(
            Canonicalization::Exclusive.apply(r#"<a z="1" xmlns:u="urn:u" y='2'/>"#).unwrap(),
            r#"<a y="2" z="1"></a>"#
        );
        assert!(Canonicalization::Exclusive.apply("<a>").is_err());
    }
}
