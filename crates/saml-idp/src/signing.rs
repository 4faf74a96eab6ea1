//! Enveloped signatures for outbound protocol messages.
//!
//! [`SignedMessageBuilder`] is composed into every builder that emits a signed
//! document. It digests the unsigned root element, signs the `SignedInfo` in
//! the exact position it will occupy, and splices the `ds:Signature` right
//! after the root's `Issuer`.

use crate::algorithm::DigestAlgorithm;
use crate::certificate::{key_info_encoding, parse_certificate};
use crate::error::{Error, Result};
use crate::signature::{self, Canonicalization, ENVELOPED_SIGNATURE};
use crate::xml::{XmlDocument, escape_attribute, ns};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

/// IdP certificate, RSA private key and the algorithm they sign with.
pub struct SigningCredentials {
    certificate: X509,
    private_key: PKey<Private>,
    algorithm: DigestAlgorithm,
}

impl SigningCredentials {
    pub fn new(
        certificate: X509,
        private_key: PKey<Private>,
        algorithm: Option<DigestAlgorithm>,
    ) -> Result<Self> {
        if private_key.rsa().is_err() {
            return Err(Error::CryptoMaterial("signing key must be RSA".into()));
        }
        let public_key = certificate
            .public_key()
            .map_err(|e| Error::CryptoMaterial(format!("certificate has no public key: {e}")))?;
        if !public_key.public_eq(&private_key) {
            return Err(Error::CryptoMaterial(
                "private key does not belong to the certificate".into(),
            ));
        }

        Ok(Self {
            certificate,
            private_key,
            algorithm: DigestAlgorithm::resolve(algorithm),
        })
    }

    /// Loads PEM material. An encrypted key needs `password`.
    pub fn from_pem(
        certificate_pem: &str,
        private_key_pem: &str,
        password: Option<&str>,
        algorithm: Option<DigestAlgorithm>,
    ) -> Result<Self> {
        let certificate = parse_certificate(certificate_pem)?;
        let private_key = match password {
            Some(password) => {
                PKey::private_key_from_pem_passphrase(private_key_pem.as_bytes(), password.as_bytes())
            }
            // An empty passphrase keeps OpenSSL from prompting on the terminal.
            None => PKey::private_key_from_pem_callback(private_key_pem.as_bytes(), |_| Ok(0)),
        }
        .map_err(|e| Error::CryptoMaterial(format!("failed to parse private key: {e}")))?;

        Self::new(certificate, private_key, algorithm)
    }

    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }
}

pub struct SignedMessageBuilder {
    credentials: SigningCredentials,
}

impl SignedMessageBuilder {
    pub fn new(credentials: SigningCredentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &SigningCredentials {
        &self.credentials
    }

    /// Signs `unsigned_xml`, whose root carries `ID="{reference_id}"`, and
    /// returns the document with the signature embedded after its `Issuer`.
    pub fn sign_after_issuer(&self, unsigned_xml: &str, reference_id: &str) -> Result<String> {
        let canonical = Canonicalization::Exclusive.apply(unsigned_xml)?;
        let digest = signature::digest(canonical.as_bytes(), self.credentials.algorithm)?;
        let block = self.signature_block(unsigned_xml, reference_id, &digest)?;
        splice_after_issuer(unsigned_xml, &block)
    }

    /// Builds the `ds:Signature` element for a reference whose digest the
    /// caller already computed. `context_xml` is the unsigned document the
    /// block will be spliced into after its `Issuer`; the `SignedInfo` is
    /// canonicalized in that position before it is signed.
    pub fn signature_block(
        &self,
        context_xml: &str,
        reference_id: &str,
        digest_value: &str,
    ) -> Result<String> {
        let signed_info = self.signed_info(reference_id, digest_value);

        let placeholder = splice_after_issuer(context_xml, &self.signature_element(&signed_info, "")?)?;
        let document = XmlDocument::parse(&placeholder)?;
        let signed_info_element = document
            .root()
            .child(ns::DSIG, "Signature")
            .and_then(|sig| sig.child(ns::DSIG, "SignedInfo"))
            .ok_or_else(|| Error::Xml("spliced signature is not a child of the root".into()))?;
        let canonical = Canonicalization::Exclusive.canonicalize(signed_info_element, None, &[]);

        let value = signature::sign(
            canonical.as_bytes(),
            &self.credentials.private_key,
            self.credentials.algorithm,
        )?;

        self.signature_element(&signed_info, &STANDARD.encode(value))
    }

    fn signed_info(&self, reference_id: &str, digest_value: &str) -> String {
        let algorithm = self.credentials.algorithm;
        let c14n = Canonicalization::Exclusive.uri();
        format!(
            concat!(
                "<ds:SignedInfo>",
                r#"<ds:CanonicalizationMethod Algorithm="{c14n}"></ds:CanonicalizationMethod>"#,
                r#"<ds:SignatureMethod Algorithm="{signature_method}"></ds:SignatureMethod>"#,
                r##"<ds:Reference URI="#{reference}">"##,
                r#"<ds:Transforms>"#,
                r#"<ds:Transform Algorithm="{enveloped}"></ds:Transform>"#,
                r#"<ds:Transform Algorithm="{c14n}"></ds:Transform>"#,
                r#"</ds:Transforms>"#,
                r#"<ds:DigestMethod Algorithm="{digest_method}"></ds:DigestMethod>"#,
                r#"<ds:DigestValue>{digest}</ds:DigestValue>"#,
                r#"</ds:Reference>"#,
                r#"</ds:SignedInfo>"#,
            ),
            c14n = c14n,
            signature_method = algorithm.signature_uri(),
            reference = escape_attribute(reference_id),
            enveloped = ENVELOPED_SIGNATURE,
            digest_method = algorithm.digest_uri(),
            digest = digest_value,
        )
    }

    fn signature_element(&self, signed_info: &str, signature_value: &str) -> Result<String> {
        let certificate = key_info_encoding(&self.credentials.certificate)?;
        Ok(format!(
            concat!(
                r#"<ds:Signature xmlns:ds="{ds}">"#,
                "{signed_info}",
                "<ds:SignatureValue>{value}</ds:SignatureValue>",
                "<ds:KeyInfo><ds:X509Data><ds:X509Certificate>{certificate}</ds:X509Certificate></ds:X509Data></ds:KeyInfo>",
                "</ds:Signature>",
            ),
            ds = ns::DSIG,
            signed_info = signed_info,
            value = signature_value,
            certificate = certificate,
        ))
    }
}

/// Inserts `block` immediately after the root element's `Issuer`.
fn splice_after_issuer(xml: &str, block: &str) -> Result<String> {
    let document = XmlDocument::parse(xml)?;
    let issuer = document
        .root()
        .child(ns::ASSERTION, "Issuer")
        .ok_or_else(|| Error::Xml("document has no Issuer to sign after".into()))?;
    let at = issuer.span().end;

    let mut signed = String::with_capacity(xml.len() + block.len());
    signed.push_str(&xml[..at]);
    signed.push_str(block);
    signed.push_str(&xml[at..]);
    Ok(signed)
}
