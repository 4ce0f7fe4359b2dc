use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct ReplayArgs {
    #[arg(
        long,
        env = "CRI_RESMGR_REPLAY_INPUT",
        value_hint = clap::ValueHint::FilePath,
        help = "YAML or JSON file holding the recorded CRI events"
    )]
    pub input: PathBuf,

    #[arg(
        long,
        value_hint = clap::ValueHint::FilePath,
        help = "Write the pod summary to this file instead of stdout"
    )]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = false,
        help = "Abort on the first event the cache rejects"
    )]
    pub strict: bool,

    #[arg(
        long,
        env = utils::logging::LOG_PATH_ENV_VAR,
        value_hint = clap::ValueHint::DirPath,
        help = "Directory for rotated log files, logs go to stderr if unset"
    )]
    pub log_path: Option<PathBuf>,
}
