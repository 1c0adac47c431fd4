// gem2claude - transparent TLS interception gateway: Anthropic Messages
// API in front, Gemini out the back.
// Author: kelexine (https://github.com/kelexine)

use anyhow::Result;
use clap::Parser;
use gem2claude::cli::Args;
use gem2claude::config::AppConfig;
use gem2claude::gemini::GeminiClient;
use gem2claude::oauth::{login, Authorizer, OAuthManager};
use gem2claude::passthrough::PassthroughClient;
use gem2claude::server::{create_router, tls, TlsMaterial};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Phase 1: parse CLI arguments and load configuration.
    let args = Args::parse();
    let config = AppConfig::load()?;

    // Phase 2: initialize logging (C8) before anything else can fail.
    gem2claude::utils::logging::init(&config.logging)?;
    info!("starting gem2claude v{}", env!("CARGO_PKG_VERSION"));

    // Phase 2.5: optional OAuth login flow, then continue into the server.
    if args.login {
        login::run().await?;
    }

    // Phase 3: load OAuth credentials for the Gemini backend Authorizer.
    info!(path = %config.oauth.credentials_path, "loading OAuth credentials");
    let oauth_manager = OAuthManager::new(&config.oauth).await?;
    let authorizer: Arc<dyn Authorizer> = Arc::new(oauth_manager.clone());

    // Phase 4: build the upstream Gemini client (C4), resolving a Cloud
    // Code project id up front if the compatibility-proxy envelope needs one.
    let gemini_client = GeminiClient::new(config.gemini.clone(), authorizer).await?;
    info!(project_id = ?gemini_client.project_id(), "Gemini client ready");

    // Phase 5: build the passthrough client (C5), resolving (or loading
    // the cached) real Anthropic IP.
    let passthrough_client = PassthroughClient::new(&config.passthrough).await?;
    info!(
        host = %passthrough_client.upstream_host(),
        ip = %passthrough_client.cached_ip().get(),
        "passthrough client ready"
    );

    // Phase 6: assemble the router (C6) and TLS material (C7), then serve.
    let app = create_router(config.clone(), gemini_client, oauth_manager, passthrough_client)?;
    let material = TlsMaterial::from_files(&config.listener.cert_path, &config.listener.key_path)?;
    let addr = config.listener.listen_addr.parse()?;

    tls::serve(addr, material, app).await?;

    info!("server shut down gracefully");
    Ok(())
}
