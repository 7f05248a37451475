//! rastro binary entry point

use anyhow::{bail, Context, Result};
use clap::Parser;
use rastro::cli::{Cli, OutputFormat};
use rastro::dispatch::{ControlChannel, ControlRequest, ControlResponse};
use rastro::engine::{EngineConfig, TraceEngine};
use rastro::provider::ManualProvider;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if !cli.has_action() {
        bail!("no operation requested; see --help");
    }

    let provider = Arc::new(ManualProvider::new());
    let engine = Arc::new(TraceEngine::new(
        Arc::clone(&provider) as Arc<dyn rastro::provider::InstrumentationProvider>,
        EngineConfig {
            max_targets: cli.max_targets,
            log_capacity: cli.log_capacity,
        },
    ));
    let channel = ControlChannel::new(Arc::clone(&engine));
    let mut session = channel
        .open()
        .context("failed to open the control channel")?;

    if cli.reset {
        session.execute(ControlRequest::Reset)?;
    }

    let update = cli.param_update();
    if !update.is_noop() {
        session.execute(ControlRequest::SetParams(update.encode()))?;
    }

    let options = cli.register_options();
    for name in &cli.add {
        session.execute(ControlRequest::Register {
            name: name.clone(),
            options,
        })?;
    }
    for name in &cli.delete {
        session.execute(ControlRequest::Unregister { name: name.clone() })?;
    }

    for name in &cli.sample {
        for _ in 0..cli.sample_count {
            if !provider.fire_call(name) {
                bail!("no probe installed for '{name}'; register it with --add");
            }
        }
    }

    if cli.settings {
        if let ControlResponse::Text(text) = session.execute(ControlRequest::DumpSettings)? {
            print!("{text}");
        }
    }

    if cli.logs {
        match cli.format {
            OutputFormat::Text => {
                if let ControlResponse::Text(text) = session.execute(ControlRequest::DumpLogs)? {
                    if !text.is_empty() {
                        println!("{text}");
                    }
                }
            }
            OutputFormat::Json => {
                let views = engine.log_views();
                println!("{}", serde_json::to_string_pretty(&views)?);
            }
        }
    }

    Ok(())
}
