//! dyndnsd - dynamic DNS update daemon.
//!
//! Thin integration layer: reads the JSON settings file, registers the
//! built-in provider adapters, wires up the public IP source and the
//! optional resolver, and hands everything to the supervisor in
//! dyndns-core. All update policy lives in the core crate.
//!
//! ## Configuration
//!
//! The settings file path comes from the first command line argument, or
//! from `DYNDNS_CONFIG` when no argument is given. The log level comes
//! from `DYNDNS_LOG_LEVEL` (trace, debug, info, warn, error; default
//! info).
//!
//! ```bash
//! dyndnsd /etc/dyndns/config.json
//! ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use dyndns_core::{
    LogNotifier, ProviderRegistry, PublicIpSource, Resolver, Settings, Supervisor,
};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn log_level_from_env() -> Level {
    match env::var("DYNDNS_LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn config_path() -> Result<String> {
    if let Some(path) = env::args().nth(1) {
        return Ok(path);
    }
    env::var("DYNDNS_CONFIG").context(
        "no settings file given; pass a path or set DYNDNS_CONFIG",
    )
}

fn load_settings(path: &str) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading settings file {}", path))?;
    let settings: Settings = serde_json::from_str(&raw)
        .with_context(|| format!("parsing settings file {}", path))?;
    settings
        .validate()
        .with_context(|| format!("validating settings file {}", path))?;
    Ok(settings)
}

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level_from_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    let settings = match config_path().and_then(|path| load_settings(&path)) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    info!(
        "Starting dyndnsd: {} domain(s), polling every {}s",
        settings.domains.len(),
        settings.interval
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(settings).await {
            Ok(()) => DaemonExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                exit_code_for(&e)
            }
        }
    })
    .into()
}

/// Map a startup/runtime failure to its exit code. Configuration problems
/// that only surface during wiring (unknown provider name, unusable IP
/// source) are still configuration errors.
fn exit_code_for(err: &anyhow::Error) -> DaemonExitCode {
    match err.downcast_ref::<dyndns_core::Error>() {
        Some(dyndns_core::Error::Config(_)) => DaemonExitCode::ConfigError,
        _ => DaemonExitCode::RuntimeError,
    }
}

async fn run_daemon(settings: Settings) -> Result<()> {
    let mut registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    dyndns_provider_cloudflare::register(&mut registry);

    let providers = Arc::new(registry.bind(&settings).context("binding providers")?);
    info!("Bound {} provider adapter(s)", providers.len());

    let ip_source =
        Arc::new(PublicIpSource::from_settings(&settings).context("building IP source")?);
    let resolver = settings
        .resolver
        .as_ref()
        .map(|server| Arc::new(Resolver::new(vec![server.clone()])));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let supervisor = Supervisor::new(
        &settings,
        providers,
        Arc::clone(&ip_source) as Arc<dyn dyndns_core::IpSource>,
        resolver,
        Arc::new(LogNotifier),
        shutdown_rx.clone(),
    );

    if settings.run_once {
        info!("Running a single update pass");
        return supervisor.run_once().await.map_err(Into::into);
    }

    let refresh = ip_source.spawn_refresh(
        Duration::from_secs(settings.interval),
        shutdown_rx,
    );

    let mut run = tokio::spawn(async move { supervisor.run().await });

    tokio::select! {
        signal = wait_for_shutdown() => {
            info!("Received {}, shutting down", signal?);
            let _ = shutdown_tx.send(true);
            let _ = refresh.await;
            run.await.context("joining supervisor")??;
        }
        result = &mut run => {
            // The supervisor only returns on its own when the restart
            // budget is exhausted or every worker exited.
            let _ = shutdown_tx.send(true);
            let _ = refresh.await;
            result.context("joining supervisor")??;
        }
    }

    Ok(())
}

/// Wait for SIGTERM or SIGINT and report which one arrived
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("installing SIGINT handler")?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("waiting for CTRL-C")?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_file(contents: &str) -> std::path::PathBuf {
        let path = env::temp_dir().join(format!(
            "dyndnsd-test-{}-{}.json",
            std::process::id(),
            contents.len()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn valid_settings_file_loads() {
        let path = temp_settings_file(
            r#"{
                "provider": "cloudflare",
                "login_token": "token",
                "domains": [
                    { "domain_name": "example.com", "sub_domains": ["www"] }
                ],
                "ip_urls": ["https://api.ipify.org"]
            }"#,
        );
        let settings = load_settings(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.domains.len(), 1);
        assert_eq!(settings.provider.as_deref(), Some("cloudflare"));
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        let path = temp_settings_file("{ not json");
        assert!(load_settings(path.to_str().unwrap()).is_err());
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn missing_file_is_a_config_error() {
        assert!(load_settings("/nonexistent/dyndns.json").is_err());
    }

    #[test]
    fn wiring_failures_keep_their_config_or_runtime_classification() {
        let bind_failure =
            anyhow::Error::from(dyndns_core::Error::config("unknown provider type: route53"))
                .context("binding providers");
        assert!(matches!(
            exit_code_for(&bind_failure),
            DaemonExitCode::ConfigError
        ));

        let crash = anyhow::Error::from(dyndns_core::Error::RestartBudgetExhausted {
            restarts: 5,
        });
        assert!(matches!(
            exit_code_for(&crash),
            DaemonExitCode::RuntimeError
        ));
    }

    #[test]
    fn exit_codes_follow_systemd_conventions() {
        assert_eq!(
            format!("{:?}", ExitCode::from(DaemonExitCode::CleanShutdown)),
            format!("{:?}", ExitCode::from(0u8))
        );
        assert_eq!(
            format!("{:?}", ExitCode::from(DaemonExitCode::ConfigError)),
            format!("{:?}", ExitCode::from(1u8))
        );
        assert_eq!(
            format!("{:?}", ExitCode::from(DaemonExitCode::RuntimeError)),
            format!("{:?}", ExitCode::from(2u8))
        );
    }
}
