use clap::Parser;
use mpchat::commands::ask::{self, AskArgs};
use mpchat::commands::exit_on_error;

/// Same as `mpchat ask`, as a stand-alone binary.
#[derive(Debug, Parser)]
#[command(
    name = "mpask",
    about = ask::ABOUT,
    after_help = ask::HELP_EXAMPLES,
    disable_version_flag = true
)]
struct Cli {
    #[command(flatten)]
    ask: AskArgs,
}

#[tokio::main]
async fn main() {
    exit_on_error(ask::run(Cli::parse().ask).await);
}
