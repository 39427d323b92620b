//! ldapgate - LDAP login service
//!
//! Authenticates users against LDAP directories, maps them to local
//! accounts and supports single sign-on from a front-end web server.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ldapgate_api::LdapgateServer;
use ldapgate_auth::{Expression, ServerRegistry};
use ldapgate_core::config::LdapgateConfig;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ldapgate")]
#[command(author = "ldapgate Team")]
#[command(version = ldapgate_core::VERSION)]
#[command(about = "LDAP login service with single sign-on", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LDAPGATE_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "LDAPGATE_BIND_ADDRESS")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, env = "LDAPGATE_PORT")]
    port: Option<u16>,

    /// Database URL
    #[arg(long, env = "LDAPGATE_DATABASE_URL")]
    database_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LDAPGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, env = "LDAPGATE_LOG_FORMAT")]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the login server
    Server,

    /// Validate the configuration
    CheckConfig {
        /// Also bind to every enabled directory server
        #[arg(long)]
        test_connections: bool,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_logging(&config);

    match cli.command {
        Some(Commands::Version) => {
            print_banner();
        }
        Some(Commands::CheckConfig { test_connections }) => {
            check_config(&config, test_connections).await?;
        }
        Some(Commands::Server) | None => {
            print_banner();
            run_server(config).await?;
        }
    }

    Ok(())
}

/// Config file (or defaults), then `LDAPGATE_*` variables, then flags
fn load_config(cli: &Cli) -> anyhow::Result<LdapgateConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = LdapgateConfig::from_file(path)
                .with_context(|| format!("loading {}", path))?;
            config.apply_env();
            config
        }
        None => LdapgateConfig::from_env(),
    };

    if let Some(bind) = &cli.bind {
        config.server.bind_address = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }

    Ok(config)
}

fn init_logging(config: &LdapgateConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn print_banner() {
    println!(
        r#"
    _     _
   | | __| | __ _ _ __   __ _  __ _| |_ ___
   | |/ _` |/ _` | '_ \ / _` |/ _` | __/ _ \
   | | (_| | (_| | |_) | (_| | (_| | ||  __/
   |_|\__,_|\__,_| .__/ \__, |\__,_|\__\___|
                 |_|    |___/

   LDAP login service with single sign-on
   Version: {}
"#,
        ldapgate_core::VERSION
    );
}

async fn check_config(config: &LdapgateConfig, test_connections: bool) -> anyhow::Result<()> {
    config.validate()?;
    info!(servers = config.servers.len(), "Configuration is valid");

    if let Some(source) = config.authentication.predicate_source() {
        Expression::parse(source).context("allow predicate")?;
        info!("Allow predicate parses");
    }

    if !test_connections {
        return Ok(());
    }

    let registry = ServerRegistry::from_definitions(&config.servers);
    let mut failures = 0;
    for directory in registry.all() {
        if !directory.definition().enabled {
            info!(sid = %directory.sid(), "Skipping disabled server");
            continue;
        }

        match directory.test_connection().await {
            Ok(server_info) => info!(
                sid = %directory.sid(),
                vendor = ?server_info.vendor,
                naming_contexts = ?server_info.naming_contexts,
                "✅ Connection successful"
            ),
            Err(e) => {
                error!(sid = %directory.sid(), error = %e, "❌ Connection failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} directory server(s) unreachable", failures);
    }
    Ok(())
}

async fn run_server(config: LdapgateConfig) -> anyhow::Result<()> {
    info!("Starting ldapgate server...");
    info!("Database: {}", config.database.url);

    let server = LdapgateServer::new(config);
    server.run().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "ldapgate",
            "--bind",
            "127.0.0.1",
            "--port",
            "9090",
            "--log-format",
            "json",
            "check-config",
            "--test-connections",
        ]);

        assert!(matches!(
            cli.command,
            Some(Commands::CheckConfig {
                test_connections: true
            })
        ));

        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.logging.format, "json");
    }

    #[tokio::test]
    async fn test_check_config_rejects_unknown_sid() {
        let config = LdapgateConfig::from_toml(
            r#"
            [session]
            secret = "0123456789abcdef0123"
            ttl_seconds = 3600
            cookie_secure = true

            [authentication]
            sids = ["hogwarts"]
            "#,
        )
        .unwrap();

        assert!(check_config(&config, false).await.is_err());
    }
}
