//! REST API server for community member avatars and profile fields.
//!
//! Loads members and profile fields from an optional seed file, then serves
//! the avatar and profile field endpoints until Ctrl+C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use community_api::router::{AppState, Router};
use community_api::server::Server;
use community_core::config::{SiteConfig, SiteSettings};
use community_core::member::{Member, Role};
use community_core::profile::NewFieldGroup;
use community_core::seed::SeedFile;
use community_core::Community;
use tokio::signal;

/// Command-line arguments for the community server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Data directory holding uploaded avatars
    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Public URL prefix of uploaded files
    #[arg(long, default_value = "http://localhost:8080/uploads")]
    base_url: String,

    /// JSON seed file with members and profile field groups
    #[arg(long)]
    seed: Option<PathBuf>,

    /// REST namespace
    #[arg(long, default_value = "buddypress")]
    namespace: String,

    /// REST API version
    #[arg(long, default_value = "v1")]
    api_version: String,

    /// Hide community resources from anonymous visitors
    #[arg(long)]
    private_community: bool,

    /// Reject avatar uploads
    #[arg(long)]
    disable_avatar_uploads: bool,

    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    request_timeout_ms: u64,

    /// Largest accepted avatar upload in bytes
    #[arg(long, default_value_t = 5_120_000)]
    avatar_max_filesize: usize,

    /// Largest accepted request body in bytes, avatar uploads excepted
    #[arg(long, default_value_t = 1_048_576)]
    max_body_size: usize,
}

impl Args {
    fn site_config(&self) -> SiteConfig {
        SiteConfig {
            namespace: self.namespace.clone(),
            version: self.api_version.clone(),
            base_url: self.base_url.clone(),
            data_dir: PathBuf::from(&self.data_dir),
            settings: SiteSettings {
                community_visibility_private: self.private_community,
                avatar_uploads_disabled: self.disable_avatar_uploads,
            },
            request_timeout_ms: self.request_timeout_ms,
            avatar_max_filesize: self.avatar_max_filesize,
            max_body_size: self.max_body_size,
            ..Default::default()
        }
    }
}

/// Populates the community from the seed file, or with an administrator
/// and an undeletable base group when there is none.
fn populate(community: &Community, seed: Option<&PathBuf>) -> anyhow::Result<Vec<Member>> {
    match seed {
        Some(path) => {
            let summary = SeedFile::load(path)
                .and_then(|seed| seed.apply(community))
                .with_context(|| format!("Failed to apply seed file {}", path.display()))?;
            Ok(summary.members)
        }
        None => {
            let admin = community
                .add_member("admin", Role::Administrator, None)
                .context("Failed to create administrator")?;
            community
                .create_group(NewFieldGroup {
                    can_delete: false,
                    ..NewFieldGroup::named("Base")
                })
                .context("Failed to create base field group")?;
            Ok(vec![admin])
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt::init();

    let config = args.site_config();
    let community = Arc::new(Community::new());
    let members = populate(&community, args.seed.as_ref())?;

    let route_prefix = config.route_prefix();
    let router = Router::new(AppState::new(community, config));

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("Invalid host or port")?;
    let server = Server::new(addr, router);

    println!("Starting community server...");
    println!("  Host: {}", args.host);
    println!("  Port: {}", args.port);
    println!("  Routes under: {}", route_prefix);
    println!("  Data directory: {}", args.data_dir);
    println!("  Private community: {}", args.private_community);
    println!("  Avatar uploads disabled: {}", args.disable_avatar_uploads);
    println!("  Request timeout: {} ms", args.request_timeout_ms);
    println!("  Members:");
    for member in &members {
        println!(
            "    #{} {} ({}) token: {}",
            member.id, member.name, member.role, member.token
        );
    }

    // Start server with graceful shutdown
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.serve().await {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for Ctrl+C
    signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c")?;
    println!("\nShutting down server...");
    server_handle.abort();

    Ok(())
}
