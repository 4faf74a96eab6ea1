use crate::algorithm::DigestAlgorithm;
use crate::binding::decode_base64;
use crate::error::{Error, Result};
use openssl::x509::X509;
use samael::crypto::mime_encode_x509_cert;

/// Parses an X.509 certificate given as PEM, with or without the armor lines.
pub fn parse_certificate(pem: &str) -> Result<X509> {
    let trimmed = pem.trim();
    if trimmed.contains("-----BEGIN CERTIFICATE-----") {
        return X509::from_pem(trimmed.as_bytes())
            .map_err(|e| Error::CryptoMaterial(format!("invalid certificate: {e}")));
    }

    let der = decode_base64(trimmed)
        .map_err(|e| Error::CryptoMaterial(format!("invalid certificate: {e}")))?;
    X509::from_der(&der).map_err(|e| Error::CryptoMaterial(format!("invalid certificate: {e}")))
}

/// Colon separated, upper case hex digest of the DER encoding, e.g.
/// `9E:6B:...`. SHA-1 unless told otherwise.
pub fn fingerprint(cert: &X509, algorithm: Option<DigestAlgorithm>) -> Result<String> {
    let algorithm = algorithm.unwrap_or(DigestAlgorithm::Sha1);
    let digest = cert
        .digest(algorithm.message_digest())
        .map_err(|e| Error::CryptoMaterial(format!("fingerprint failed: {e}")))?;

    Ok(digest
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(":"))
}

/// Compares fingerprints ignoring case and separators.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    fn normalize(value: &str) -> String {
        value
            .chars()
            .filter(char::is_ascii_hexdigit)
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }
    let (a, b) = (normalize(a), normalize(b));
    !a.is_empty() && a == b
}

/// Base64 body used inside `ds:X509Certificate`, wrapped with bare `\n` so
/// the text needs no escaping in canonical form.
pub fn key_info_encoding(cert: &X509) -> Result<String> {
    let der = cert
        .to_der()
        .map_err(|e| Error::CryptoMaterial(format!("failed to encode certificate as DER: {e}")))?;
    Ok(mime_encode_x509_cert(&der).replace('\r', ""))
}
