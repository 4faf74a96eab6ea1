use openssl::hash::MessageDigest;
use std::sync::OnceLock;

static DEFAULT_ALGORITHM: OnceLock<DigestAlgorithm> = OnceLock::new();

/// Digest family used for both reference digests and RSA signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Maps a symbolic tag (`sha256`, `sha384`, `sha512`) to an algorithm.
    ///
    /// Unrecognized tags, including `sha1` and typos, resolve to SHA-1 instead
    /// of failing. Callers that need strictness should match the tag
    /// themselves before calling this.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "sha256" => DigestAlgorithm::Sha256,
            "sha384" => DigestAlgorithm::Sha384,
            "sha512" => DigestAlgorithm::Sha512,
            "sha1" => DigestAlgorithm::Sha1,
            other => {
                tracing::debug!(tag = other, "unrecognized digest algorithm, using sha1");
                DigestAlgorithm::Sha1
            }
        }
    }

    /// Explicit value, else the process-wide default, else SHA-1.
    pub fn resolve(explicit: Option<DigestAlgorithm>) -> Self {
        Self::resolve_with(explicit, DEFAULT_ALGORITHM.get().copied())
    }

    pub fn resolve_with(explicit: Option<DigestAlgorithm>, default: Option<DigestAlgorithm>) -> Self {
        explicit.or(default).unwrap_or_default()
    }

    pub fn tag(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn message_digest(self) -> MessageDigest {
        match self {
            DigestAlgorithm::Sha1 => MessageDigest::sha1(),
            DigestAlgorithm::Sha256 => MessageDigest::sha256(),
            DigestAlgorithm::Sha384 => MessageDigest::sha384(),
            DigestAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }

    /// `ds:DigestMethod` algorithm URI.
    pub fn digest_uri(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "http://www.w3.org/2000/09/xmldsig#sha1",
            DigestAlgorithm::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            DigestAlgorithm::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#sha384",
            DigestAlgorithm::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    /// `ds:SignatureMethod` and redirect-binding `SigAlg` URI.
    pub fn signature_uri(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "http://www.w3.org/2000/09/xmldsig#rsa-sha1",
            DigestAlgorithm::Sha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            DigestAlgorithm::Sha384 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha384",
            DigestAlgorithm::Sha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
        }
    }

    pub fn from_digest_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.digest_uri() == uri)
    }

    pub fn from_signature_uri(uri: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.signature_uri() == uri)
    }

    const ALL: [DigestAlgorithm; 4] = [
        DigestAlgorithm::Sha1,
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ];
}

/// Installs the process-wide default. Only the first call wins; later calls
/// return the algorithm that is already in effect as the error.
pub fn set_default_algorithm(algorithm: DigestAlgorithm) -> Result<(), DigestAlgorithm> {
    DEFAULT_ALGORITHM.set(algorithm).map_err(|_| default_algorithm())
}

pub fn default_algorithm() -> DigestAlgorithm {
    DigestAlgorithm::resolve(None)
}
