use crate::certificate::parse_certificate;
use crate::error::{Error, Result};
use openssl::x509::X509;
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

/// What the IdP knows about a Service Provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceProviderRecord {
    pub entity_id: String,
    /// PEM, with or without armor lines.
    pub cert: String,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub acs_url: Option<String>,
    #[serde(default)]
    pub response_hosts: Vec<String>,
    #[serde(default)]
    pub sign_authn_request: bool,
    #[serde(default, alias = "assertion_consumer_logout_service_url")]
    pub logout_service_url: Option<String>,
}

impl ServiceProviderRecord {
    pub fn certificate(&self) -> Result<X509> {
        parse_certificate(&self.cert)
    }

    pub fn logout_url(&self) -> Option<&str> {
        self.logout_service_url.as_deref()
    }

    /// Configured response hosts, or the hosts of the SP's own endpoints
    /// when none are configured.
    pub fn acceptable_response_hosts(&self) -> Vec<String> {
        if !self.response_hosts.is_empty() {
            return self
                .response_hosts
                .iter()
                .map(|host| host.to_ascii_lowercase())
                .collect();
        }

        [self.acs_url.as_deref(), self.logout_url()]
            .into_iter()
            .flatten()
            .filter_map(host_of)
            .collect()
    }

    pub fn accepts_response_url(&self, url: &str) -> bool {
        host_of(url).is_some_and(|host| self.acceptable_response_hosts().contains(&host))
    }
}

pub(crate) fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|host| host.to_ascii_lowercase())
}

/// Resolves an issuer to the Service Provider it names.
pub trait ServiceProviderDirectory: Send + Sync {
    fn find(&self, issuer: &str) -> Option<ServiceProviderRecord>;
}

impl<F> ServiceProviderDirectory for F
where
    F: Fn(&str) -> Option<ServiceProviderRecord> + Send + Sync,
{
    fn find(&self, issuer: &str) -> Option<ServiceProviderRecord> {
        self(issuer)
    }
}

/// Fixed set of records keyed by entity id.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    records: HashMap<String, ServiceProviderRecord>,
}

impl StaticDirectory {
    pub fn new(records: impl IntoIterator<Item = ServiceProviderRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.entity_id.clone(), record))
                .collect(),
        }
    }

    /// Parses a JSON array of records.
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<ServiceProviderRecord> = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("invalid service provider list: {e}")))?;
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ServiceProviderDirectory for StaticDirectory {
    fn find(&self, issuer: &str) -> Option<ServiceProviderRecord> {
        self.records.get(issuer).cloned()
    }
}
