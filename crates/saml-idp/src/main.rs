use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use saml_idp::config::Config;
use saml_idp::idp::{ExternalSignature, InboundRequest, RequestValidator};
use saml_idp::state::IdpState;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Validates one inbound SAML request and answers logout requests.
#[derive(Parser)]
#[command(name = "saml-idp")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    binding: BindingCommand,
}

#[derive(Subcommand)]
enum BindingCommand {
    /// Deflated and base64 encoded `SAMLRequest` from a redirect URL
    Redirect(RedirectArgs),
    /// Base64 encoded `SAMLRequest` from a POST form
    Post {
        saml_request: String,
    },
}

#[derive(Args)]
struct RedirectArgs {
    saml_request: String,

    /// `RelayState` query parameter, as received
    relay_state: Option<String>,

    /// `SigAlg` query parameter, when the URL is signed
    sig_alg: Option<String>,

    /// `Signature` query parameter, when the URL is signed
    signature: Option<String>,
}

impl RedirectArgs {
    fn external_signature(&self) -> ExternalSignature {
        let present = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());
        let sig_algorithm = present(&self.sig_alg);
        let signature = present(&self.signature);
        if sig_algorithm.is_none() && signature.is_none() {
            return ExternalSignature::default();
        }

        ExternalSignature {
            saml_request: Some(self.saml_request.clone()),
            relay_state: present(&self.relay_state),
            sig_algorithm,
            signature,
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    let state = IdpState::new(config)?;
    let validator = RequestValidator::new(&state.directory);

    let request = match &cli.binding {
        BindingCommand::Redirect(args) => {
            validator.from_deflated_request(&args.saml_request, args.external_signature())
        }
        BindingCommand::Post { saml_request } => validator.from_post_request(saml_request),
    };

    answer(&state, &request)
}

fn answer(state: &IdpState, request: &InboundRequest<'_>) -> Result<()> {
    let valid = request.is_valid();
    tracing::info!(
        request_id = request.request_id(),
        issuer = request.issuer(),
        authn = request.is_authn_request(),
        logout = request.is_logout_request(),
        response_url = request.response_url(),
        valid,
        "processed SAML request"
    );

    if !valid {
        bail!("SAML request rejected");
    }

    if request.is_logout_request() {
        let response = state
            .logout_response(request)
            .context("failed to answer logout request")?;
        println!("{}", saml_idp::binding::encode_post(&response));
    }

    Ok(())
}
