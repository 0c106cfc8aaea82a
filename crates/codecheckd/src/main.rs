use anyhow::Result;
use clap::Parser;
use tracing::Level;

use codecheck_core::telemetry::{init_tracing, LogFormat};
use codecheckd::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(LogFormat::from_json_flag(config.log_json), level);

    codecheckd::serve(config).await
}
