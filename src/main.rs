// Entry point: summarise EPC certificates for one authority by area.
//
// Arguments are `key=value` overrides (see `RunOptions::from_args`), e.g.
//   epc_summary datadir=data/teignbridge code_name=PARISH_CODE map=parishes
// Logging is controlled by `EPC_SUMMARY_LOG` (default `epc_summary=info`).
mod accumulate;
mod classify;
mod error;
mod finalize;
mod loader;
mod map;
mod order;
mod output;
mod pipeline;
mod types;
mod util;
mod version;

use pipeline::{run, RunOptions};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("EPC_SUMMARY_LOG")
        .unwrap_or_else(|_| EnvFilter::new("epc_summary=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let opts = RunOptions::from_args(std::env::args().skip(1));
    match run(&opts) {
        Ok(report) => {
            info!(
                summary_recomputed = report.summary_recomputed(),
                map_regenerated = report.map_regenerated,
                "Summary complete."
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error summarising area: {e}");
            ExitCode::FAILURE
        }
    }
}
