//! SAML `Assertion` documents.

use crate::algorithm::DigestAlgorithm;
use crate::clock::{Clock, SystemClock, format_instant};
use crate::error::Result;
use crate::signature;
use crate::xml::{escape_attribute, escape_text, ns};
use chrono::{DateTime, Duration, Utc};
use std::cell::OnceCell;

pub const EMAIL_ADDRESS_FORMAT: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";
pub const BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
pub const EMAIL_ADDRESS_CLAIM: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
/// The only authentication context assertions are issued with.
pub const AUTHN_CONTEXT_CLASS: &str = "urn:federation:authentication:windows";

const NOT_BEFORE_SKEW_SECS: i64 = 5;
const SUBJECT_LIFETIME_SECS: i64 = 3 * 60;
const CONDITIONS_LIFETIME_SECS: i64 = 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionParams {
    /// Without the leading underscore; the element ID is `_{reference_id}`.
    pub reference_id: String,
    pub issuer_uri: String,
    /// Also the email address claim value.
    pub name_id: String,
    pub audience_uri: String,
    pub saml_request_id: String,
    pub acs_url: String,
    /// `None` defers to the process-wide default.
    pub algorithm: Option<DigestAlgorithm>,
}

/// Builds one assertion, memoizing the document and its digest.
///
/// All time fields derive from a single instant taken on first use.
/// [`rebuild`](Self::rebuild) regenerates the document with that same
/// instant but keeps an already computed digest; call
/// [`recompute_digest`](Self::recompute_digest) when the digest must follow.
pub struct AssertionBuilder {
    params: AssertionParams,
    algorithm: DigestAlgorithm,
    signature: Option<String>,
    clock: Box<dyn Clock>,
    now: OnceCell<DateTime<Utc>>,
    raw: OnceCell<String>,
    digest: OnceCell<String>,
}

impl AssertionBuilder {
    pub fn new(params: AssertionParams) -> Self {
        Self {
            algorithm: DigestAlgorithm::resolve(params.algorithm),
            params,
            signature: None,
            clock: Box::new(SystemClock),
            now: OnceCell::new(),
            raw: OnceCell::new(),
            digest: OnceCell::new(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn params(&self) -> &AssertionParams {
        &self.params
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// `_{reference_id}`, used as both the assertion ID and the session index.
    pub fn reference_string(&self) -> String {
        format!("_{}", self.params.reference_id)
    }

    pub fn now(&self) -> DateTime<Utc> {
        *self.now.get_or_init(|| self.clock.now())
    }

    /// Signature block spliced in after `Issuer` on the next build.
    pub fn set_signature(&mut self, signature: impl Into<String>) {
        self.signature = Some(signature.into());
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn raw(&self) -> &str {
        self.raw.get_or_init(|| self.fresh())
    }

    pub fn rebuild(&mut self) -> &str {
        self.raw.take();
        self.raw()
    }

    /// Base64 digest of [`raw`](Self::raw) as serialized. An unsigned
    /// document is emitted in canonical form, so this is also the reference
    /// digest its signature needs.
    pub fn digest(&self) -> Result<&str> {
        if let Some(digest) = self.digest.get() {
            return Ok(digest.as_str());
        }
        let digest = self.encode()?;
        Ok(self.digest.get_or_init(|| digest).as_str())
    }

    pub fn recompute_digest(&mut self) -> Result<&str> {
        self.digest.take();
        self.digest()
    }

    fn encode(&self) -> Result<String> {
        signature::digest(self.raw().as_bytes(), self.algorithm)
    }

    fn fresh(&self) -> String {
        let now = self.now();
        let p = &self.params;
        let reference = escape_attribute(&self.reference_string());
        let now_iso = format_instant(now);
        let name_id = escape_text(&p.name_id);

        format!(
            concat!(
                r#"<Assertion xmlns="{ns}" ID="{reference}" IssueInstant="{now}" Version="2.0">"#,
                "<Issuer>{issuer}</Issuer>",
                "{signature}",
                "<Subject>",
                r#"<NameID Format="{email_format}">{name_id}</NameID>"#,
                r#"<SubjectConfirmation Method="{bearer}">"#,
                r#"<SubjectConfirmationData InResponseTo="{request_id}" NotOnOrAfter="{subject_expiry}" Recipient="{acs_url}"></SubjectConfirmationData>"#,
                "</SubjectConfirmation>",
                "</Subject>",
                r#"<Conditions NotBefore="{not_before}" NotOnOrAfter="{conditions_expiry}">"#,
                "<AudienceRestriction><Audience>{audience}</Audience></AudienceRestriction>",
                "</Conditions>",
                "<AttributeStatement>",
                r#"<Attribute Name="{claim}"><AttributeValue>{name_id}</AttributeValue></Attribute>"#,
                "</AttributeStatement>",
                r#"<AuthnStatement AuthnInstant="{now}" SessionIndex="{reference}">"#,
                "<AuthnContext><AuthnContextClassRef>{context}</AuthnContextClassRef></AuthnContext>",
                "</AuthnStatement>",
                "</Assertion>",
            ),
            ns = ns::ASSERTION,
            reference = reference,
            now = now_iso,
            issuer = escape_text(&p.issuer_uri),
            signature = self.signature.as_deref().unwrap_or_default(),
            email_format = EMAIL_ADDRESS_FORMAT,
            name_id = name_id,
            bearer = BEARER,
            request_id = escape_attribute(&p.saml_request_id),
            subject_expiry = format_instant(now + Duration::seconds(SUBJECT_LIFETIME_SECS)),
            acs_url = escape_attribute(&p.acs_url),
            not_before = format_instant(now - Duration::seconds(NOT_BEFORE_SKEW_SECS)),
            conditions_expiry = format_instant(now + Duration::seconds(CONDITIONS_LIFETIME_SECS)),
            audience = escape_text(&p.audience_uri),
            claim = EMAIL_ADDRESS_CLAIM,
            context = AUTHN_CONTEXT_CLASS,
        )
    }
}
