//! CLI entry point - the composition root.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use xtl_cli::{Cli, CliError, Commands, GlossaryCommand, RulesCommand, bootstrap, handlers};

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve { relay, events } => {
            let ctx = bootstrap(relay.into_config())?;
            handlers::serve::execute(ctx, events).await?;
        }
        Commands::Glossary(GlossaryCommand::Lookup { path, text }) => {
            handlers::glossary::lookup(&path, &text)?;
        }
        Commands::Glossary(GlossaryCommand::Add {
            path,
            source,
            target,
        }) => {
            handlers::glossary::add(&path, &source, &target)?;
        }
        Commands::Rules(RulesCommand::Apply { path, post, text }) => {
            handlers::rules::apply(&path, post, &text)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before parsing so XTL_* fallbacks see it
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Err(err) = run(command).await {
        if let Some(cli_err) = err.downcast_ref::<CliError>() {
            eprintln!("Error: {cli_err}");
            std::process::exit(cli_err.exit_code());
        }
        return Err(err);
    }
    Ok(())
}
