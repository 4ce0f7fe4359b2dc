use std::io::Write;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use resmgr::config::Cli;
use resmgr::config::Commands;
use resmgr::config::ReplayArgs;
use resmgr::replay;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay(replay_args) => run_replay(replay_args),
    }
}

fn run_replay(replay_args: ReplayArgs) -> Result<()> {
    let _guard = utils::logging::init(replay_args.log_path.as_ref());

    tracing::info!("Starting cri-resmgr replay {}", &**version::VERSION);

    let summary = replay::run(
        &replay_args.input,
        replay_args.output.as_deref(),
        replay_args.strict,
    )
    .map_err(|report| anyhow::anyhow!("{report:?}"))?;

    if replay_args.output.is_none() {
        let json = serde_json::to_string_pretty(&summary).context("serialize summary failed")?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{json}").context("write summary to stdout failed")?;
    }

    Ok(())
}
