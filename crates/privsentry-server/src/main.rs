//! PrivSentry: privacy compliance pipeline server.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use privsentry_audit::ReportFilter;
use privsentry_core::{PiiType, PrivSentryConfig};
use privsentry_protocol::{ConsentRecord, SqliteConsentStore};
use privsentry_server::{build_router, AppState};

fn resolve_data_dir() -> PathBuf {
    std::env::var("PRIVSENTRY_DATA_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn print_help() {
    println!("PrivSentry: privacy compliance pipeline");
    println!();
    println!("Usage: privsentry [command]");
    println!();
    println!("Commands:");
    println!("  serve                    Start the server (default)");
    println!("  process <file> [user]    Run the full pipeline on one file");
    println!("  report [user]            Generate a compliance report");
    println!("  export [output]          Export the audit log as CSV");
    println!("  consent <user> <type> <grant|deny> [valid_until]");
    println!("                           Write a record to the primary consent store");
    println!("  help                     Show this help message");
}

/// Write one consent record into the primary store named by the environment.
fn seed_consent(data_dir: &std::path::Path, args: &[String]) -> anyhow::Result<()> {
    let [user, pii_type, decision, rest @ ..] = args else {
        anyhow::bail!("Usage: privsentry consent <user> <type> <grant|deny> [valid_until]");
    };
    let pii_type: PiiType = pii_type.parse().map_err(anyhow::Error::msg)?;
    let granted = match decision.as_str() {
        "grant" => true,
        "deny" => false,
        other => anyhow::bail!("Expected grant or deny, got {}", other),
    };
    let valid_until = rest
        .first()
        .map(|raw| chrono::DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&chrono::Utc)))
        .transpose()?;

    let config = PrivSentryConfig::from_env(data_dir)?;
    let store = SqliteConsentStore::open(&config.data_paths.consent_db, &config.consent_table()?)?;
    store.upsert(user, pii_type, &ConsentRecord { granted, valid_until })?;
    info!("Consent for {} / {} set to {}", user, pii_type, decision);
    Ok(())
}

/// Stage backends may own blocking HTTP clients; build them off the async runtime.
async fn load_state(data_dir: PathBuf) -> anyhow::Result<Arc<AppState>> {
    let state = tokio::task::spawn_blocking(move || -> anyhow::Result<AppState> {
        let config = PrivSentryConfig::from_env(&data_dir)?;
        Ok(AppState::new(config))
    })
    .await??;
    Ok(Arc::new(state))
}

/// Run a one-shot CLI command and print its JSON result.
async fn run_command<T, F>(state: Arc<AppState>, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&AppState) -> anyhow::Result<T> + Send + 'static,
    T: serde::Serialize + Send + 'static,
{
    let value = tokio::task::spawn_blocking(move || f(&state)).await??;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(value)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let data_dir = resolve_data_dir();

    match args.get(1).map(String::as_str) {
        None | Some("serve") => {}
        Some("process") => {
            let Some(file) = args.get(2).map(PathBuf::from) else {
                eprintln!("Usage: privsentry process <file> [user]");
                std::process::exit(1);
            };
            let user = args.get(3).cloned();
            let state = load_state(data_dir).await?;
            let run = run_command(state, move |s| {
                Ok(s.pipeline.process_file(&file, user.as_deref()))
            })
            .await?;
            std::process::exit(if run.event.error().is_none() { 0 } else { 1 });
        }
        Some("report") => {
            let filter = ReportFilter {
                user_id: args.get(2).cloned(),
                ..Default::default()
            };
            let state = load_state(data_dir).await?;
            run_command(state, move |s| Ok(s.pipeline.audit().generate_report(&filter)?)).await?;
            return Ok(());
        }
        Some("export") => {
            let output = args.get(2).map(PathBuf::from);
            let state = load_state(data_dir).await?;
            let outcome = run_command(state, move |s| {
                Ok(s.pipeline.audit().export_csv(output.as_deref()))
            })
            .await?;
            std::process::exit(if outcome.exported { 0 } else { 1 });
        }
        Some("consent") => {
            if let Err(e) = seed_consent(&data_dir, &args[2..]) {
                eprintln!("{}", e);
                std::process::exit(1);
            }
            return Ok(());
        }
        Some("--help" | "-h" | "help") => {
            print_help();
            return Ok(());
        }
        Some(other) => {
            eprintln!("Unknown command: {}. Use 'privsentry help' for usage.", other);
            std::process::exit(1);
        }
    }

    info!("Data directory: {}", data_dir.display());
    let state = load_state(data_dir).await?;
    let port = state.config.port;

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("PrivSentry server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
