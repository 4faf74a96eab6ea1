use crate::algorithm::DigestAlgorithm;
use anyhow::{Context, Result};

pub struct Config {
    pub entity_id: String,
    pub idp_cert_path: String,
    pub idp_key_path: String,
    pub idp_key_password: Option<String>,
    pub algorithm: Option<DigestAlgorithm>,
    pub sp_directory_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let entity_id = std::env::var("ENTITY_ID").context("ENTITY_ID must be set")?;
        let idp_cert_path = std::env::var("IDP_CERT_PATH").context("IDP_CERT_PATH must be set")?;
        let idp_key_path = std::env::var("IDP_KEY_PATH").context("IDP_KEY_PATH must be set")?;
        let sp_directory_path =
            std::env::var("SP_DIRECTORY_PATH").context("SP_DIRECTORY_PATH must be set")?;

        let idp_key_password = std::env::var("IDP_KEY_PASSWORD").ok();
        let algorithm = std::env::var("SAML_ALGORITHM")
            .ok()
            .map(|tag| DigestAlgorithm::from_tag(&tag));

        Ok(Self {
            entity_id,
            idp_cert_path,
            idp_key_path,
            idp_key_password,
            algorithm,
            sp_directory_path,
        })
    }
}
