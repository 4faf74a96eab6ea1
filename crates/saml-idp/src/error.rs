pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to decode SAML message: {0}")]
    Decode(String),
    #[error("invalid XML: {0}")]
    Xml(String),
    #[error("signature rejected: {0}")]
    Signature(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid signing material: {0}")]
    CryptoMaterial(String),
}

impl Error {
    /// Whether the error came from outbound key or certificate material. These
    /// are the only errors a builder lets escape.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::CryptoMaterial(_))
    }
}
