//! Database reachability monitor.
//!
//! Probes one Oracle or Firebird database every five minutes and reports the
//! outcome to a webhook.
//!
//! # Security Guarantees
//! - The database password is stored encrypted with a key bound to this host
//! - Passwords never appear in logs or console output
//! - Each probe runs a single read-only query

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use dbwatch::{ExecutionMode, Monitor, ReportStatus};
use dbwatch_core::bootstrap::{self, APMAN_CANDIDATES, ApmanSettings, LICENSE_CANDIDATES};
use dbwatch_core::{
    ConfigStore, ConnectionDescriptor, Credential, MachineKey, SecretVault, ServiceConfig,
    WebhookMethod, init_logging,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dbwatch")]
#[command(about = "Database reachability monitor with webhook reporting")]
#[command(version)]
#[command(long_about = "
dbwatch - periodic database reachability probe

Every five minutes dbwatch connects to the configured database, reads the
FIRM identifiers and reports the outcome to a webhook as JSON.

SUPPORTED DATABASES:
- Oracle   [if compiled with --features oracle]
- Firebird [if compiled with --features firebird]

EXAMPLES:
  dbwatch configure
  dbwatch auto-config https://hooks.example.com/dbwatch
  dbwatch check
  dbwatch run
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Probe on schedule until interrupted (default)
    Run,
    /// Run one probe in test mode and print the result
    Check,
    /// Interactive setup from apman.ini
    Configure(ConfigureArgs),
    /// Non-interactive setup from apman.ini and the licence file
    AutoConfig(AutoConfigArgs),
}

#[derive(Args)]
pub struct ConfigureArgs {
    /// Path to apman.ini (searched on C: to F: if omitted)
    #[arg(long, value_name = "FILE")]
    pub apman: Option<PathBuf>,

    /// Webhook URL (prompted for if omitted)
    #[arg(long, value_name = "URL")]
    pub webhook_url: Option<String>,

    /// HTTP method used for the webhook
    #[arg(long, default_value = "POST", value_parser = parse_webhook_method)]
    pub webhook_method: WebhookMethod,
}

#[derive(Args)]
pub struct AutoConfigArgs {
    /// Webhook URL reports are sent to
    #[arg(value_name = "WEBHOOK_URL")]
    pub webhook_url: String,

    /// Path to apman.ini (searched on C: to F: if omitted)
    #[arg(long, value_name = "FILE")]
    pub apman: Option<PathBuf>,

    /// Path to licencja_aow.xml (searched on C: to F: if omitted)
    #[arg(long, value_name = "FILE")]
    pub license: Option<PathBuf>,

    /// HTTP method used for the webhook
    #[arg(long, default_value = "POST", value_parser = parse_webhook_method)]
    pub webhook_method: WebhookMethod,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Configuration file
    #[arg(
        long,
        global = true,
        env = "DBWATCH_CONFIG",
        value_name = "FILE",
        help = "Configuration file (default: dbwatch.json next to the executable)"
    )]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

fn parse_webhook_method(value: &str) -> std::result::Result<WebhookMethod, String> {
    value.parse().map_err(|e: dbwatch_core::DbWatchError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet, cli.global.log_file.as_deref())?;

    let store = cli
        .global
        .config
        .clone()
        .map_or_else(ConfigStore::beside_executable, ConfigStore::new);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_service(&store).await,
        Command::Check => check_once(&store).await,
        Command::Configure(args) => configure(&store, &args).await,
        Command::AutoConfig(args) => auto_configure(&store, &args).await,
    }
}

fn open_vault(store: &ConfigStore) -> dbwatch_core::Result<SecretVault> {
    let key = MachineKey::discover(&store.key_file_path()).map_err(|e| {
        error!("Failed to obtain machine key: {}", e);
        e
    })?;
    SecretVault::new(&key)
}

/// Runs the schedule until Ctrl-C or SIGTERM.
async fn run_service(store: &ConfigStore) -> Result<()> {
    info!("dbwatch service starting...");
    let monitor = Monitor::initialize(store, open_vault(store), ExecutionMode::Production).await;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    monitor.run(&cancel).await;
    info!("dbwatch service stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!("Failed to listen for Ctrl-C: {}", e);
                            return;
                        }
                    }
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
    }

    info!("Shutdown requested, stopping...");
    cancel.cancel();
}

/// One probe in test mode with a console summary.
async fn check_once(store: &ConfigStore) -> Result<()> {
    info!("Running a single check...");
    let monitor = Monitor::initialize(store, open_vault(store), ExecutionMode::Test).await;

    let Some(target) = monitor.target() else {
        bail!(
            "No usable configuration at {}; run `dbwatch configure` first",
            store.path().display()
        );
    };
    println!("Target:  {}", target.descriptor());

    let Some(report) = monitor.run_cycle(&CancellationToken::new()).await else {
        bail!("Check did not run");
    };

    match report.payload.status {
        ReportStatus::Success => {
            println!("Status:  success");
            if let Some(strategy) = &report.result.auth_strategy {
                println!("Auth:    {}", strategy);
            }
            let ids: Vec<String> = report.payload.firm_ids.iter().map(ToString::to_string).collect();
            println!("FIRM:    {} row(s) [{}]", ids.len(), ids.join(", "));
        }
        ReportStatus::Error => {
            println!("Status:  error");
            println!("Message: {}", report.payload.message);
        }
    }
    println!(
        "Webhook: {}",
        if report.delivered { "delivered" } else { "not delivered" }
    );

    if report.result.is_success() {
        Ok(())
    } else {
        bail!("Check failed")
    }
}

/// Interactive setup: descriptor from apman.ini, password and webhook from the console.
async fn configure(store: &ConfigStore, args: &ConfigureArgs) -> Result<()> {
    let apman_path = bootstrap::locate(args.apman.as_deref(), APMAN_CANDIDATES, "apman.ini")?;
    println!("Using {}", apman_path.display());

    let settings = bootstrap::read_apman(&apman_path)?;
    let descriptor = settings.to_descriptor()?;
    println!("Database: {} (user {})", descriptor, descriptor.user());

    let password = prompt_password(&format!("Password for {}: ", descriptor.user()))?;
    let webhook_url = match &args.webhook_url {
        Some(url) => url.clone(),
        None => prompt_line("Webhook URL: ")?,
    };

    save_config(store, &descriptor, &password, webhook_url, args.webhook_method).await
}

/// Setup without prompts, using the password the suite derives from the customer number.
async fn auto_configure(store: &ConfigStore, args: &AutoConfigArgs) -> Result<()> {
    let apman_path = bootstrap::locate(args.apman.as_deref(), APMAN_CANDIDATES, "apman.ini")?;
    let license_path =
        bootstrap::locate(args.license.as_deref(), LICENSE_CANDIDATES, "licencja_aow.xml")?;
    info!(
        apman = %apman_path.display(),
        license = %license_path.display(),
        "Automatic configuration"
    );

    let settings = bootstrap::read_apman(&apman_path)?;
    let descriptor = settings.to_descriptor()?;
    let password = derive_auto_credential(&settings, &license_path)?;
    info!(target_db = %descriptor, "Automatic configuration target");

    save_config(
        store,
        &descriptor,
        &password,
        args.webhook_url.clone(),
        args.webhook_method,
    )
    .await
}

/// Password for `apw_user` from the licence customer number.
///
/// The customer number is the variable part of the password and stays out of
/// logs.
fn derive_auto_credential(settings: &ApmanSettings, license_path: &Path) -> Result<Credential> {
    let customer_id = bootstrap::read_license_id(license_path)?;
    let password = bootstrap::auto_config_credential(settings, &customer_id)?;
    info!(license = %license_path.display(), "Derived credential from licence file");
    Ok(password)
}

async fn save_config(
    store: &ConfigStore,
    descriptor: &ConnectionDescriptor,
    password: &Credential,
    webhook_url: String,
    webhook_method: WebhookMethod,
) -> Result<()> {
    let vault = open_vault(store)?;
    let mut config = ServiceConfig::new(descriptor, webhook_url, vault.protect(password.expose())?);
    config.webhook_method = webhook_method;
    config.validate()?;

    store
        .save(&config)
        .await
        .with_context(|| format!("Failed to write {}", store.path().display()))?;

    info!(path = %store.path().display(), "Configuration saved");
    println!("Configuration written to {}", store.path().display());
    Ok(())
}

fn prompt_password(prompt: &str) -> Result<Credential> {
    print!("{}", prompt);
    io::stdout()
        .flush()
        .context("Failed to flush stdout before reading password")?;
    let password = rpassword::read_password().context("Failed to read password")?;

    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(Credential::new(password))
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;

    let value = line.trim();
    if value.is_empty() {
        bail!("A value is required");
    }
    Ok(value.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::sync::{Arc, Mutex};

    /// Log sink shared with the test body.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_derived_credential_never_reaches_logs() {
        let dir = tempfile::tempdir().unwrap();
        let license = dir.path().join("licencja_aow.xml");
        std::fs::write(
            &license,
            r#"<licencja xmlns="http://www.kamsoft.pl/ks"><id-knt-ks>918273</id-knt-ks></licencja>"#,
        )
        .unwrap();
        let settings = ApmanSettings {
            db_type: "FB".into(),
            db_server: "fbhost".into(),
            db_user: "apw_user".into(),
            db_path: "D:/KSBAZA/WAPTEKA.FDB".into(),
        };

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let password = tracing::subscriber::with_default(subscriber, || {
            derive_auto_credential(&settings, &license).unwrap()
        });

        assert_eq!(password.expose(), "apw_user918273");
        let text = log.text();
        assert!(text.contains("Derived credential from licence file"));
        assert!(!text.contains("918273"));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_is_the_default_command() {
        let cli = Cli::try_parse_from(["dbwatch", "-v"]);
        assert!(cli.is_ok_and(|cli| cli.command.is_none() && cli.global.verbose == 1));
    }

    #[test]
    fn test_auto_config_takes_webhook_and_method() {
        let cli = Cli::try_parse_from([
            "dbwatch",
            "auto-config",
            "https://hooks.example.com/x",
            "--webhook-method",
            "put",
        ]);
        assert!(cli.is_ok_and(|cli| matches!(
            cli.command,
            Some(Command::AutoConfig(AutoConfigArgs { webhook_method: WebhookMethod::Put, .. }))
        )));
    }

    #[test]
    fn test_unknown_webhook_method_is_rejected() {
        let cli = Cli::try_parse_from(["dbwatch", "configure", "--webhook-method", "PATCH"]);
        assert!(cli.is_err());
    }
}
