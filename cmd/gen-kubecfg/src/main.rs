mod bootstrap;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use pkg_client::{CaSource, KubeResourceClient, PollPolicy, ResourceClient};
use pkg_constants::cluster::DEFAULT_SECRET_WAIT_INTERVAL_SECS;
use pkg_constants::csr::DEFAULT_SIGNER_NAME;
use pkg_constants::paths::{DEFAULT_OUTPUT_DIR, DEFAULT_TOOL_CONFIG};
use pkg_generator::{GenerateError, GeneratorSettings, Pipeline, generator_for};
use pkg_types::config::{ToolConfigFile, load_config_file};
use pkg_types::params::{
    CredentialType, Params, Scope, ServiceAccountMode, parse_namespace_list,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    Cluster,
    Namespace,
}

#[derive(Parser, Debug)]
#[command(
    name = "gen-kubecfg",
    about = "Issue a client certificate or service account token and write a kubeconfig for it"
)]
struct Cli {
    /// Kubeconfig used to reach the cluster (default: $KUBECONFIG, then ~/.kube/config)
    #[arg(long)]
    kubeconfig: Option<String>,

    /// Path to YAML tool config file
    #[arg(long, short, default_value = DEFAULT_TOOL_CONFIG)]
    config: String,

    /// Credential type: cert or token
    #[arg(long = "type", short = 't', default_value = "cert")]
    credential_type: CredentialType,

    /// User (cert) or service account (token) to generate for
    #[arg(long, short)]
    username: String,

    /// Output filename (default: <username>.kubeconfig)
    #[arg(long)]
    save_as: Option<String>,

    /// Bind roles cluster-wide or in the listed namespaces
    #[arg(long, value_enum, default_value_t = ScopeArg::Cluster)]
    scope: ScopeArg,

    /// Comma separated namespaces for namespace scope
    #[arg(long, default_value = "")]
    namespaces: String,

    /// Cluster role to bind (repeatable)
    #[arg(long = "cluster-role", short = 'r')]
    cluster_roles: Vec<String>,

    /// Use an existing service account instead of creating one
    #[arg(long, default_value_t = false)]
    existing_sa: bool,

    /// Namespace of the service account (token only)
    #[arg(long)]
    sa_namespace: Option<String>,

    /// Signer poll attempts
    #[arg(long)]
    poll_attempts: Option<u32>,

    /// Seconds between signer polls
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

/// CLI flags merged over the config file, then built-in defaults.
#[derive(Debug, Clone)]
struct Resolved {
    settings: GeneratorSettings,
    signer_name: String,
    ca_source: CaSource,
}

fn resolve(cli: &Cli, file: ToolConfigFile) -> Result<Resolved> {
    let defaults = GeneratorSettings::default();

    let poll_attempts = cli
        .poll_attempts
        .or(file.poll_attempts)
        .unwrap_or(defaults.csr_poll.max_attempts);
    let poll_interval = cli
        .poll_interval_secs
        .or(file.poll_interval_secs)
        .map(Duration::from_secs)
        .unwrap_or(defaults.csr_poll.interval);
    let poll_backoff = file
        .poll_backoff
        .unwrap_or(defaults.csr_poll.backoff_multiplier);
    let secret_wait_attempts = file
        .secret_wait_attempts
        .unwrap_or(defaults.secret_wait.max_attempts);

    if poll_attempts == 0 {
        bail!("poll-attempts must be at least 1");
    }
    if secret_wait_attempts == 0 {
        bail!("secret-wait-attempts must be at least 1");
    }
    if !poll_backoff.is_finite() || poll_backoff < 1.0 {
        bail!("poll-backoff must be a finite number >= 1.0 (got {})", poll_backoff);
    }

    let ca_defaults = CaSource::default();
    Ok(Resolved {
        settings: GeneratorSettings {
            csr_poll: PollPolicy::new(poll_attempts, poll_interval).with_backoff(poll_backoff),
            secret_wait: PollPolicy::new(
                secret_wait_attempts,
                Duration::from_secs(DEFAULT_SECRET_WAIT_INTERVAL_SECS),
            ),
            output_dir: PathBuf::from(
                file.output_dir
                    .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            ),
        },
        signer_name: file
            .signer_name
            .unwrap_or_else(|| DEFAULT_SIGNER_NAME.to_string()),
        ca_source: CaSource {
            namespace: file.ca_config_map_namespace.unwrap_or(ca_defaults.namespace),
            config_map: file.ca_config_map.unwrap_or(ca_defaults.config_map),
            key: file.ca_config_map_key.unwrap_or(ca_defaults.key),
        },
    })
}

fn build_params(cli: &Cli) -> Result<Params> {
    let mut params = Params::new(cli.username.trim(), cli.credential_type);
    params.request.scope = match cli.scope {
        ScopeArg::Cluster => {
            if !cli.namespaces.trim().is_empty() {
                bail!("--namespaces requires --scope namespace");
            }
            Scope::Cluster
        }
        ScopeArg::Namespace => Scope::Namespaces(parse_namespace_list(&cli.namespaces)),
    };
    params.save_as = cli.save_as.clone();
    params.cluster_roles = cli.cluster_roles.clone();

    match cli.credential_type {
        CredentialType::Token => {
            params.service_account_namespace = cli.sa_namespace.clone();
            params.service_account_mode = if cli.existing_sa {
                ServiceAccountMode::Existing
            } else {
                ServiceAccountMode::Create
            };
        }
        CredentialType::Certificate => {
            if cli.existing_sa || cli.sa_namespace.is_some() {
                bail!("--existing-sa and --sa-namespace only apply to --type token");
            }
        }
    }
    Ok(params)
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    // Load config file (returns defaults if file not found)
    let file_cfg: ToolConfigFile = load_config_file(&cli.config)?;
    let resolved = resolve(&cli, file_cfg)?;
    let mut params = build_params(&cli)?;

    let kubeconfig = bootstrap::kubeconfig_path(cli.kubeconfig.as_deref())?;
    let (client, cluster) = bootstrap::connect(&kubeconfig).await?;
    params.cluster = cluster;

    info!("Starting gen-kubecfg");
    info!("  Kubeconfig:  {}", kubeconfig.display());
    info!("  Cluster:     {} ({})", params.cluster.name, params.cluster.endpoint);
    info!("  Identity:    {} [{}]", params.username(), params.request.credential_type);
    info!("  Scope:       {}", params.request.scope);
    info!(
        "  Signer poll: {} x {:?}",
        resolved.settings.csr_poll.max_attempts, resolved.settings.csr_poll.interval
    );

    let client: Arc<dyn ResourceClient> = Arc::new(
        KubeResourceClient::new(client)
            .with_signer_name(resolved.signer_name)
            .with_ca_source(resolved.ca_source),
    );
    let generator = generator_for(params.request.credential_type, client, &resolved.settings);

    let outcome = match Pipeline::new(generator).run(params).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_timeout() => {
            let unreachable = matches!(
                &e.source,
                GenerateError::Client(c) if c.is_unreachable_timeout()
            );
            if unreachable {
                error!(stage = %e.stage, "Cluster unreachable while waiting for the signer: {}", e.source);
            } else {
                error!(stage = %e.stage, "Signer did not respond: {}", e.source);
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    println!(
        "Generated kubeconfig for '{}': {}",
        outcome.params.username(),
        outcome.config_path.display()
    );
    if let Some(err) = &outcome.binding_error {
        warn!("Kubeconfig is usable but role binding is incomplete: {}", err);
        std::process::exit(2);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["gen-kubecfg"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn cli_flags_override_config_file() {
        let cli = cli(&["-u", "alice", "--poll-attempts", "9"]);
        let file = ToolConfigFile {
            poll_attempts: Some(3),
            poll_interval_secs: Some(0),
            signer_name: Some("example.com/signer".into()),
            ..Default::default()
        };
        let resolved = resolve(&cli, file).unwrap();

        assert_eq!(resolved.settings.csr_poll.max_attempts, 9);
        assert_eq!(resolved.settings.csr_poll.interval, Duration::ZERO);
        assert_eq!(resolved.signer_name, "example.com/signer");
        assert_eq!(resolved.ca_source.key, "client-ca-file");
    }

    #[test]
    fn defaults_without_config_file() {
        let resolved = resolve(&cli(&["-u", "alice"]), ToolConfigFile::default()).unwrap();
        assert_eq!(resolved.settings.csr_poll.max_attempts, 5);
        assert_eq!(resolved.settings.csr_poll.interval, Duration::from_secs(1));
        assert_eq!(resolved.settings.output_dir, PathBuf::from("."));
        assert_eq!(resolved.signer_name, DEFAULT_SIGNER_NAME);
    }

    #[test]
    fn rejects_unusable_poll_settings() {
        let zero_attempts = cli(&["-u", "alice", "--poll-attempts", "0"]);
        assert!(resolve(&zero_attempts, ToolConfigFile::default()).is_err());

        for backoff in [f64::INFINITY, f64::NAN, 0.5] {
            let file = ToolConfigFile {
                poll_backoff: Some(backoff),
                ..Default::default()
            };
            assert!(resolve(&cli(&["-u", "alice"]), file).is_err(), "accepted {backoff}");
        }

        let file = ToolConfigFile {
            secret_wait_attempts: Some(0),
            ..Default::default()
        };
        assert!(resolve(&cli(&["-u", "alice"]), file).is_err());

        // Huge intervals are accepted; each wait is capped.
        let huge = cli(&["-u", "alice", "--poll-interval-secs", "18446744073709551615"]);
        let resolved = resolve(&huge, ToolConfigFile::default()).unwrap();
        assert!(resolved.settings.csr_poll.delay_after(1) <= Duration::from_secs(300));
    }

    #[test]
    fn token_params_from_flags() {
        let cli = cli(&[
            "--type",
            "token",
            "-u",
            "ci-bot",
            "--sa-namespace",
            "ci",
            "--scope",
            "namespace",
            "--namespaces",
            "staging, prod",
            "-r",
            "deployer",
        ]);
        let params = build_params(&cli).unwrap();

        assert_eq!(params.request.credential_type, CredentialType::Token);
        assert_eq!(params.service_account_mode, ServiceAccountMode::Create);
        assert_eq!(params.service_account_namespace.as_deref(), Some("ci"));
        assert_eq!(params.target_namespaces(), ["staging", "prod"]);
        assert_eq!(params.cluster_roles, vec!["deployer"]);
    }

    #[test]
    fn rejects_inconsistent_flags() {
        assert!(build_params(&cli(&["-u", "alice", "--namespaces", "a"])).is_err());
        assert!(build_params(&cli(&["-u", "alice", "--existing-sa"])).is_err());
        assert!(Cli::try_parse_from(["gen-kubecfg", "-u", "x", "--type", "ssh"]).is_err());
    }
}
