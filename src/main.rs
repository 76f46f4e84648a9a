use std::io;
use std::process;

use baqpipe::commands::VERSION;
use baqpipe::commands::config::{self, ConfigArgs};
use baqpipe::commands::query::{self, QueryArgs};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  baqpipe query OrderTrackerWebsiteQuery --filter OrderHed_OrderNum=525224,530860\n  baqpipe query OrdersQ --select OrderNum,PONum --filters-json '{\"OrderNum\":[1,2,3]}' --json\n  baqpipe config check --profile erp\n  baqpipe completion bash > ~/.local/share/bash-completion/completions/baqpipe";

const QUERY_HELP_EXAMPLES: &str = "Examples:\n  baqpipe query OrdersQ --filter Company=EPIC06 --filter OrderNum=1001,1002\n  baqpipe query OrdersQ --select OrderNum --select PONum --dry-run\n  baqpipe query OrdersQ --profile erp --retry-method POST --missing-report out/missing.csv";

#[derive(Debug, Parser)]
#[command(
    name = "baqpipe",
    version = VERSION,
    propagate_version = true,
    about = "Chunked BAQ query client",
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run a BAQ with automatic filter chunking", after_help = QUERY_HELP_EXAMPLES)]
    Query(Box<QueryArgs>),
    #[command(about = "Manage local config")]
    Config(ConfigArgs),
    #[command(about = "Generate shell completion script")]
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

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    let out = &mut io::stdout();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "baqpipe", out),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "baqpipe", out),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "baqpipe", out),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Query(args) => query::run(*args).await,
        Commands::Config(args) => config::run(args),
        Commands::Completion { shell } => {
            print_completion(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}
