use crate::algorithm;
use crate::config::Config;
use crate::directory::StaticDirectory;
use crate::idp::logout::LogoutResponseBuilder;
use crate::idp::request::InboundRequest;
use crate::signing::SigningCredentials;
use anyhow::{Context, Result};

/// Everything the binary loads once at startup.
pub struct IdpState {
    pub config: Config,
    pub directory: StaticDirectory,
    pub idp_cert_pem: String,
    pub idp_key_pem: String,
}

impl IdpState {
    pub fn new(config: Config) -> Result<Self> {
        let idp_cert_pem = std::fs::read_to_string(&config.idp_cert_path)
            .context("failed to read IDP certificate")?;
        let idp_key_pem = std::fs::read_to_string(&config.idp_key_path)
            .context("failed to read IDP private key")?;

        SigningCredentials::from_pem(
            &idp_cert_pem,
            &idp_key_pem,
            config.idp_key_password.as_deref(),
            config.algorithm,
        )
        .context("failed to load IDP signing credentials")?;

        let sp_json = std::fs::read_to_string(&config.sp_directory_path)
            .context("failed to read service provider directory")?;
        let directory = StaticDirectory::from_json(&sp_json)
            .context("failed to parse service provider directory")?;

        if let Some(configured) = config.algorithm
            && let Err(current) = algorithm::set_default_algorithm(configured)
        {
            tracing::warn!(
                configured = configured.tag(),
                current = current.tag(),
                "default algorithm was already set"
            );
        }

        tracing::info!(
            entity_id = %config.entity_id,
            service_providers = directory.len(),
            algorithm = algorithm::default_algorithm().tag(),
            "IdP state loaded"
        );

        Ok(Self {
            config,
            directory,
            idp_cert_pem,
            idp_key_pem,
        })
    }

    /// Signed success response to a validated `LogoutRequest`.
    pub fn logout_response(&self, request: &InboundRequest<'_>) -> Result<String> {
        let slo_url = request
            .logout_url()
            .context("service provider has no logout url")?;
        let request_id = request
            .request_id()
            .context("logout request has no ID")?;

        let builder = LogoutResponseBuilder::new(
            crate::new_reference_id(),
            self.config.entity_id.clone(),
            slo_url,
            request_id,
            self.config.algorithm,
            self.idp_cert_pem.clone(),
            self.idp_key_pem.clone(),
            self.config.idp_key_password.clone(),
        );
        builder.build().context("failed to build logout response")
    }
}
