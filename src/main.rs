//! Print the child count of every built-in view as JSON
//!
//! ```bash
//! case-views <case.db> [data-source-id]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use case_views::common::audit;
use case_views::preferences::{self, ViewPreferences};
use case_views::summary::summarize_views;
use case_views::{CoreError, CoreResult, SqliteCaseGateway};
use tracing::{error, warn};

fn main() -> ExitCode {
    // Control log level with RUST_LOG env var:
    //   RUST_LOG=debug case-views case.db
    case_views::logging::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "case-views failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> CoreResult<()> {
    let mut args = std::env::args().skip(1);
    let case_path = args.next().map(PathBuf::from).ok_or_else(|| {
        CoreError::Configuration("usage: case-views <case.db> [data-source-id]".to_string())
    })?;
    let data_source_id = args
        .next()
        .map(|raw| {
            raw.parse::<i64>().map_err(|_| {
                CoreError::Configuration(format!("invalid data source id: {}", raw))
            })
        })
        .transpose()?;

    let prefs = match preferences::get_store().and_then(|store| store.load()) {
        Ok(prefs) => prefs,
        Err(e) => {
            warn!(error = %e, "Preferences unavailable, using defaults");
            ViewPreferences::default()
        }
    };

    let gateway = SqliteCaseGateway::open(&case_path)?;
    audit::log_case_opened(&case_path, data_source_id);

    let counts = summarize_views(&gateway, data_source_id, &prefs.query_preferences())?;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}
