//! SkyQL entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use skyql::{compile, ArrayPolicy, TABLES};
use skyql_cli::config::{ConfigArgs, SkyqlConfig};
use skyql_cli::render::{render_diagnostics, render_json, render_outcome};
use skyql_cli::{BskySession, QueryInterpreter, SearchTarget};

#[derive(Parser)]
#[command(
    name = "skyql",
    about = "Query Bluesky with SQL-like statements",
    version
)]
struct Cli {
    /// Public API host used when not signed in.
    /// Also reads from SKYQL_SERVICE.
    #[arg(long, global = true)]
    service: Option<String>,

    /// Host used to sign in and for signed-in calls.
    /// Also reads from SKYQL_AUTH_SERVICE.
    #[arg(long, global = true)]
    auth_service: Option<String>,

    /// Handle or email to sign in with. Also reads from SKYQL_IDENTIFIER.
    #[arg(short, long, global = true)]
    identifier: Option<String>,

    /// App password. Also reads from SKYQL_PASSWORD.
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Page size for list tables (1-100). Also reads from SKYQL_LIMIT.
    #[arg(long, global = true)]
    limit: Option<u32>,

    /// How array fields become columns (skip, index).
    #[arg(long, global = true, default_value = "skip")]
    array_policy: ArrayPolicy,

    /// Refuse queries that have syntax errors instead of recovering.
    #[arg(long, global = true)]
    strict: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single query.
    ///
    /// Example:
    ///   skyql query "SELECT handle, displayName FROM followers WHERE actor = 'bsky.app'"
    Query {
        /// Query text.
        query: String,
    },

    /// Show the syntax tree and diagnostics of a query without running it.
    Parse {
        /// Query text.
        query: String,
    },

    /// List queryable tables.
    Tables,

    /// Full-text search over posts, or accounts with --people.
    Search {
        /// Search text.
        text: String,

        /// Search accounts instead of posts.
        #[arg(long)]
        people: bool,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   skyql completions bash > ~/.local/share/bash-completion/completions/skyql
    ///   skyql completions zsh > ~/.zfunc/_skyql
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode (default).
    Repl,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = SkyqlConfig::resolve(ConfigArgs {
        service: cli.service.clone(),
        auth_service: cli.auth_service.clone(),
        identifier: cli.identifier.clone(),
        password: cli.password.clone(),
        limit: cli.limit,
        array_policy: cli.array_policy,
        strict: cli.strict,
    });
    let interpreter = QueryInterpreter::new(config.array_policy).strict(config.strict);

    match cli.command.unwrap_or(Commands::Repl) {
        Commands::Query { query } => {
            let mut session = BskySession::open(&config).await?;
            let report = interpreter.run(&mut session, &query).await?;
            if !report.compiled.diagnostics.is_empty() {
                eprint!("{}", render_diagnostics(&query, &report.compiled.diagnostics));
            }
            if cli.json {
                println!("{}", render_json(&report.outcome)?);
            } else {
                print!("{}", render_outcome(&report.outcome));
            }
        }

        Commands::Parse { query } => {
            let compiled = compile(&query)?;
            if cli.json {
                let out = serde_json::json!({
                    "tree": compiled.tree,
                    "query": compiled.query,
                    "diagnostics": compiled.diagnostics,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                print!("{}", compiled.tree);
                eprint!("{}", render_diagnostics(&query, &compiled.diagnostics));
            }
            if cli.strict && !compiled.is_clean() {
                std::process::exit(1);
            }
        }

        Commands::Tables => {
            for (name, desc) in TABLES {
                println!("{name:<14} {desc}");
            }
        }

        Commands::Search { text, people } => {
            let mut session = BskySession::open(&config).await?;
            let target = if people {
                SearchTarget::Actors
            } else {
                SearchTarget::Posts
            };
            let outcome = interpreter.search(&mut session, target, &text).await?;
            if cli.json {
                println!("{}", render_json(&outcome)?);
            } else {
                print!("{}", render_outcome(&outcome));
            }
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "skyql", &mut std::io::stdout());
        }

        Commands::Repl => {
            let session = BskySession::open(&config).await?;
            skyql_cli::repl::run(session, interpreter, cli.json).await?;
        }
    }

    Ok(())
}
