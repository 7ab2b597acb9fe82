use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use url::Url;

use saml_context::config::{self, Deployment};
use saml_context::context::{InboundTransport, OutboundTransport};
use saml_context::types::NameIdValue;
use saml_context::{EntityId, MetadataStore, SamlCredential, SecurityContext};

#[derive(Parser)]
#[command(name = "saml-context")]
#[command(about = "Resolve the local SAML entity and security context for a request")]
struct Cli {
    /// Configuration file (defaults to SAML_CONTEXT_CONFIG, XDG config, ./saml-context.json)
    #[arg(long, global = true, env = "SAML_CONTEXT_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the context for a request path or URL
    Resolve {
        /// Request path, e.g. /saml/SSO/alias/acme/idp
        #[arg(long, conflicts_with = "url", required_unless_present = "url")]
        path: Option<String>,
        /// Full request URL
        #[arg(long)]
        url: Option<String>,
    },
    /// Resolve the context for a previously authenticated credential
    ResolveCredential {
        /// Hosted entity that consumed the assertion
        #[arg(long)]
        local_entity_id: String,
        /// Entity that issued the assertion
        #[arg(long, default_value = "")]
        remote_entity_id: String,
        #[arg(long, default_value = "anonymous")]
        name_id: String,
    },
    /// Load the configuration, bootstrap the provider and list hosted entities
    Check,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("saml_context=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();
    let deployment = match &cli.config {
        Some(path) => config::load_from_path(path)?,
        None => config::load_deployment()?,
    };

    match cli.command {
        Commands::Resolve { path, url } => {
            let uri = match (path, url) {
                (Some(path), _) => path,
                (None, Some(url)) => Url::parse(&url)?.to_string(),
                (None, None) => return Err(anyhow!("either --path or --url is required")),
            };
            let request = http::Request::builder().uri(uri.as_str()).body(())?;

            let provider = deployment.into_provider()?;
            let ctx = provider.local_entity(
                InboundTransport::from_request(&request),
                OutboundTransport::new(),
            )?;
            print_context(&ctx);
        }
        Commands::ResolveCredential {
            local_entity_id,
            remote_entity_id,
            name_id,
        } => {
            let credential = SamlCredential::new(
                NameIdValue::new(name_id),
                EntityId::new(remote_entity_id),
                EntityId::new(local_entity_id),
            );

            let provider = deployment.into_provider()?;
            let ctx = provider.local_entity_for_credential(
                InboundTransport::default(),
                OutboundTransport::new(),
                &credential,
            )?;
            print_context(&ctx);
        }
        Commands::Check => check(deployment)?,
    }

    Ok(())
}

fn check(deployment: Deployment) -> Result<()> {
    let mut aliases: Vec<(String, String)> = deployment
        .metadata
        .aliases()
        .map(|(alias, entity_id)| (alias.to_string(), entity_id.to_string()))
        .collect();
    aliases.sort();

    let provider = deployment.into_provider()?;
    let metadata = provider.metadata();
    info!("Configuration is valid");

    println!(
        "Hosted SP: {}",
        metadata
            .hosted_sp_name()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!();
    println!("{:<20} {:<50} {:<8} {:<10}", "ALIAS", "ENTITY", "LOCAL", "PROFILE");
    println!("{}", "-".repeat(90));

    for (alias, entity_id) in aliases {
        let extended = metadata.extended_metadata(&EntityId::new(entity_id.as_str()))?;
        let profile = if extended.is_pkix() { "pkix" } else { "explicit" };
        println!(
            "{:<20} {:<50} {:<8} {:<10}",
            alias, entity_id, extended.local, profile
        );
    }

    Ok(())
}

fn print_context(ctx: &SecurityContext) {
    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());

    println!("Request:             {}", ctx.request_id());
    println!("Path:                {}", ctx.inbound_transport().path());
    println!(
        "Local entity:        {}",
        or_dash(ctx.local_entity_id().map(|id| id.to_string()))
    );
    println!(
        "Role:                {}",
        or_dash(ctx.local_entity_role().map(|r| r.as_segment().to_string()))
    );
    println!(
        "Signing credential:  {}",
        or_dash(
            ctx.local_signing_credential()
                .and_then(|c| c.name())
                .map(|n| n.to_string())
        )
    );
    println!(
        "Decryption key:      {}",
        or_dash(
            ctx.local_decrypter()
                .and_then(|d| d.credential())
                .and_then(|c| c.name())
                .map(|n| n.to_string())
        )
    );
    println!(
        "Trust engine:        {}",
        or_dash(ctx.local_trust_engine().map(|e| format!("{:?}", e.kind())))
    );
}
