use std::process;

use baqpipe::commands::VERSION;
use baqpipe::commands::query::{self, QueryArgs};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "baqget", version = VERSION, about = "Run a BAQ with automatic filter chunking")]
struct Cli {
    #[command(flatten)]
    query: QueryArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = query::run(cli.query).await {
        eprintln!("{err}");
        process::exit(1);
    }
}
