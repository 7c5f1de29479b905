use std::io;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use mpchat::commands::ask::{self, AskArgs};
use mpchat::commands::config::{self, ConfigArgs};
use mpchat::commands::exit_on_error;

const BIN_NAME: &str = "mpchat";

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  mpchat ask \"2+2?\"\n  echo \"Summarize this\" | mpchat ask --provider openai --stream\n  mpchat ask --provider deepseek --dry-run --json \"Explain retries\"\n  mpchat config check\n  mpchat completion bash > ~/.local/share/bash-completion/completions/mpchat";

#[derive(Debug, Parser)]
#[command(
    name = BIN_NAME,
    about = "Chat with Anthropic, OpenAI and DeepSeek models",
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = ask::ABOUT, after_help = ask::HELP_EXAMPLES)]
    Ask(AskArgs),
    #[command(about = "Inspect the local config file")]
    Config(ConfigArgs),
    #[command(about = "Generate a shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

impl From<CompletionShell> for Shell {
    fn from(shell: CompletionShell) -> Self {
        match shell {
            CompletionShell::Bash => Shell::Bash,
            CompletionShell::Zsh => Shell::Zsh,
            CompletionShell::Fish => Shell::Fish,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ask(args) => ask::run(args).await,
        Commands::Config(args) => config::run(args),
        Commands::Completion { shell } => {
            generate(Shell::from(shell), &mut Cli::command(), BIN_NAME, &mut io::stdout());
            Ok(())
        }
    };

    exit_on_error(result);
}
