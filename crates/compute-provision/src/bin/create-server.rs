//! create-server - provision a single Compute Engine node and print how to reach it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use compute_provision::{provision, Credentials, ProvisionConfig, ProvisioningClient};

/// Provision one node and report its address and login credentials.
#[derive(Parser)]
#[command(name = "create-server")]
#[command(about = "Create a single compute node and print its login details")]
struct Cli {
    /// Service-account identity (e.g., svc@my-project.iam.gserviceaccount.com).
    identity: String,

    /// Path to the service-account private key (PEM or JSON key file).
    key_file: PathBuf,

    /// YAML configuration file.
    #[arg(long, env = "PROVISION_CONFIG")]
    config: Option<PathBuf>,

    /// Zone to create the node in.
    #[arg(long, env = "PROVISION_ZONE")]
    zone: Option<String>,

    /// Hardware profile name (e.g., f1-micro).
    #[arg(long, env = "PROVISION_HARDWARE_PROFILE")]
    hardware_profile: Option<String>,

    /// Image name prefix (e.g., centos-7).
    #[arg(long, env = "PROVISION_IMAGE_PREFIX")]
    image_prefix: Option<String>,

    /// Node group name.
    #[arg(long, env = "PROVISION_GROUP")]
    group: Option<String>,

    /// Number of nodes to create.
    #[arg(long, env = "PROVISION_COUNT")]
    count: Option<u32>,

    /// Initial poll interval in milliseconds.
    #[arg(long, env = "PROVISION_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Upper bound for the poll interval in milliseconds.
    #[arg(long, env = "PROVISION_POLL_MAX_INTERVAL_MS")]
    poll_max_interval_ms: Option<u64>,

    /// Project override (or set `PROVISION_PROJECT` env var).
    #[arg(long, env = "PROVISION_PROJECT")]
    project: Option<String>,

    /// Login user for the node.
    #[arg(long, env = "PROVISION_LOGIN_USER")]
    login_user: Option<String>,

    /// Existing SSH private key for the login user; generated when omitted.
    #[arg(long, env = "PROVISION_LOGIN_KEY_FILE")]
    login_key_file: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> Result<ProvisionConfig> {
        let mut config = match &self.config {
            Some(path) => ProvisionConfig::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => ProvisionConfig::default(),
        };

        if let Some(zone) = &self.zone {
            config.zone.clone_from(zone);
        }
        if let Some(profile) = &self.hardware_profile {
            config.hardware_profile_name.clone_from(profile);
        }
        if let Some(prefix) = &self.image_prefix {
            config.image_name_prefix.clone_from(prefix);
        }
        if let Some(group) = &self.group {
            config.group_name.clone_from(group);
        }
        if let Some(count) = self.count {
            config.node_count = count;
        }
        if let Some(millis) = self.poll_interval_ms {
            config.poll_interval_millis = millis;
        }
        if let Some(millis) = self.poll_max_interval_ms {
            config.poll_max_interval_millis = millis;
        }
        if self.project.is_some() {
            config.project.clone_from(&self.project);
        }
        if let Some(user) = &self.login_user {
            config.login_user.clone_from(user);
        }
        if self.login_key_file.is_some() {
            config.login_key_file.clone_from(&self.login_key_file);
        }

        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let credentials = Credentials::from_key_file(&cli.identity, &cli.key_file)
        .context("Failed to read service account credentials")?;

    let config = cli.load_config()?;
    info!(
        provider = %config.provider,
        zone = %config.zone,
        group = %config.group_name,
        "Starting provisioning"
    );

    let client = ProvisioningClient::connect(config, &credentials)
        .await
        .context("Failed to open compute session")?;

    let mut stdout = std::io::stdout();
    let outcome = provision(client, &mut stdout).await;

    if let Err(e) = outcome.nodes {
        error!(error = %e, "Provisioning failed");
        eprintln!("{:?}", anyhow::Error::new(e).context("Provisioning failed"));
    }

    outcome.release.context("Failed to release compute session")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["create-server", "svc@p.iam.gserviceaccount.com", "key.pem"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = cli(&[
            "--count",
            "3",
            "--poll-interval-ms",
            "500",
            "--poll-max-interval-ms",
            "4000",
            "--zone",
            "us-central1-a",
        ])
        .load_config()
        .unwrap();

        assert_eq!(config.node_count, 3);
        assert_eq!(config.poll_interval_millis, 500);
        assert_eq!(config.poll_max_interval_millis, 4000);
        assert_eq!(config.zone, "us-central1-a");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_interval_does_not_move_max() {
        let config = cli(&["--poll-interval-ms", "30000"]).load_config().unwrap();
        assert_eq!(config.poll_interval_millis, 30_000);
        assert_eq!(
            config.poll_max_interval_millis,
            ProvisionConfig::default().poll_max_interval_millis
        );
        assert!(config.validate().is_err());
    }
}
