//! Interactive REPL.
//!
//! Launch with `skyql repl` (or just `skyql`). Lines starting with `/` are
//! commands; anything else runs as a query. Ctrl+C cancels a query that is
//! still waiting on the network.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use skyql::{compile, ArrayPolicy, TABLES};

use crate::config::{history_path, Credentials};
use crate::interpreter::{QueryInterpreter, QueryReport, SearchTarget};
use crate::render::{render_diagnostics, render_json, render_outcome};
use crate::session::BskySession;

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/login", "Sign in: /login <handle> <app-password>"),
    ("/logout", "Drop the current session"),
    ("/whoami", "Show the signed-in account"),
    ("/tables", "List queryable tables"),
    ("/tree", "Show the syntax tree of a query"),
    ("/search", "Search posts: /search <text>"),
    ("/people", "Search accounts: /people <text>"),
    ("/prefs", "Show preferences of the signed-in account"),
    ("/json", "Toggle JSON output"),
    ("/arrays", "Array columns: /arrays skip|index"),
    ("/limit", "Page size: /limit <n>"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

const KEYWORDS: &[&str] = &["SELECT", "FROM", "WHERE", "AND", "OR"];

/// REPL helper for tab completion.
#[derive(Default)]
struct QueryHelper;

impl Completer for QueryHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if input.starts_with('/') && !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        if input.starts_with('/') && !input.starts_with("/tree") {
            return Ok((pos, Vec::new()));
        }

        let (word_start, candidates) = word_candidates(input);
        let matches = candidates
            .into_iter()
            .map(|(name, desc)| Pair {
                display: if desc.is_empty() {
                    name.to_string()
                } else {
                    format!("{name:<12} {desc}")
                },
                replacement: format!("{name} "),
            })
            .collect();
        Ok((word_start, matches))
    }
}

impl Hinter for QueryHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() {
            return None;
        }
        hint_for(line)
    }
}

/// Word under the cursor, and the table names (right after `FROM`) or
/// keywords it could complete to. Keywords carry no description.
fn word_candidates(input: &str) -> (usize, Vec<(&'static str, &'static str)>) {
    let word_start = input
        .rfind(|c: char| c.is_whitespace() || c == ',')
        .map(|i| i + 1)
        .unwrap_or(0);
    let word = &input[word_start..];
    if word.is_empty() {
        return (word_start, Vec::new());
    }

    let candidates = if input[..word_start].trim_end().ends_with("FROM") {
        let word = word.to_lowercase();
        TABLES
            .iter()
            .copied()
            .filter(|(name, _)| name.starts_with(&word))
            .collect()
    } else {
        let word = word.to_uppercase();
        KEYWORDS
            .iter()
            .filter(|kw| kw.starts_with(&word))
            .map(|kw| (*kw, ""))
            .collect()
    };
    (word_start, candidates)
}

/// Inline hint for a line with the cursor at its end: the rest of a
/// command, keyword or table name. Only exact-case prefixes are hinted
/// since the hint is appended to what was typed.
fn hint_for(line: &str) -> Option<String> {
    if line.starts_with('/') {
        if line.contains(' ') {
            return None;
        }
        return COMMANDS
            .iter()
            .find(|(cmd, _)| cmd.starts_with(line) && *cmd != line)
            .map(|(cmd, _)| cmd[line.len()..].to_string());
    }

    let (word_start, candidates) = word_candidates(line);
    let word = &line[word_start..];
    candidates
        .into_iter()
        .find(|(name, _)| name.starts_with(word) && *name != word)
        .map(|(name, _)| name[word.len()..].to_string())
}

impl Highlighter for QueryHelper {}
impl Validator for QueryHelper {}
impl Helper for QueryHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// REPL state carried between lines.
struct ReplState {
    session: BskySession,
    interpreter: QueryInterpreter,
    json: bool,
}

/// Run the interactive REPL.
pub async fn run(
    session: BskySession,
    interpreter: QueryInterpreter,
    json: bool,
) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[36m\u{25c9}\x1b[0m \x1b[1mskyql v{}\x1b[0m \x1b[90mSQL-like queries for Bluesky\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Try \x1b[36mSELECT * FROM posts WHERE actor = 'bsky.app'\x1b[0m. \x1b[90m/help\x1b[0m for commands, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<QueryHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(config)?;
    rl.set_helper(Some(QueryHelper));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = history_path();
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let mut state = ReplState {
        session,
        interpreter,
        json,
    };

    loop {
        let prompt = match state.session.handle() {
            Some(handle) => format!(" \x1b[36m{handle}>\x1b[0m "),
            None => " \x1b[36mskyql>\x1b[0m ".to_string(),
        };

        let read = tokio::task::block_in_place(|| rl.readline(&prompt));
        match read {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let Some(input) = line.strip_prefix('/') else {
                    run_query(&mut state, line).await;
                    continue;
                };
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let mut parts = input.splitn(2, ' ');
                let cmd = parts.next().unwrap_or("");
                let args = parts.next().unwrap_or("").trim();

                match cmd {
                    "exit" | "quit" => {
                        eprintln!("  Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => cmd_help(),
                    "clear" | "cls" => eprint!("\x1b[2J\x1b[H"),
                    "tables" => cmd_tables(),
                    "tree" => cmd_tree(args),
                    "json" => {
                        state.json = !state.json;
                        eprintln!("  JSON output {}", if state.json { "on" } else { "off" });
                    }
                    "arrays" => cmd_arrays(args, &mut state),
                    "limit" => cmd_limit(args, &mut state),
                    "login" => cmd_login(args, &mut state).await,
                    "logout" => {
                        state.session.logout();
                        eprintln!("  Signed out.");
                    }
                    "whoami" => cmd_whoami(&state),
                    "search" => cmd_search(args, &mut state, false).await,
                    "people" => cmd_search(args, &mut state, true).await,
                    "prefs" => cmd_prefs(&mut state).await,
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    let _ = std::fs::create_dir_all(hist_path.parent().unwrap_or(std::path::Path::new(".")));
    let _ = rl.save_history(&hist_path);

    Ok(())
}

/// Race a network call against Ctrl+C. `None` means it was cancelled.
async fn cancellable<T>(fut: impl std::future::Future<Output = T>) -> Option<T> {
    tokio::select! {
        result = fut => Some(result),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("  \x1b[90m(cancelled)\x1b[0m");
            None
        }
    }
}

async fn run_query(state: &mut ReplState, line: &str) {
    let interpreter = state.interpreter;
    let Some(result) = cancellable(interpreter.run(&mut state.session, line)).await else {
        return;
    };
    match result {
        Ok(report) => print_report(line, &report, state.json),
        Err(e) => eprintln!("  Error: {e}"),
    }
}

fn print_report(line: &str, report: &QueryReport, json: bool) {
    if !report.compiled.diagnostics.is_empty() {
        eprint!("{}", render_diagnostics(line, &report.compiled.diagnostics));
    }
    if json {
        match render_json(&report.outcome) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("  Error: {e}"),
        }
    } else {
        print!("{}", render_outcome(&report.outcome));
    }
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Anything else is run as a query, e.g.");
    eprintln!("    SELECT handle, displayName FROM followers WHERE actor = 'bsky.app'");
    eprintln!();
}

fn cmd_tables() {
    eprintln!();
    for (name, desc) in TABLES {
        eprintln!("    {name:<14} {desc}");
    }
    eprintln!();
}

fn cmd_tree(args: &str) {
    if args.is_empty() {
        eprintln!("  Usage: /tree <query>");
        return;
    }
    match compile(args) {
        Ok(compiled) => {
            print!("{}", compiled.tree);
            if !compiled.diagnostics.is_empty() {
                eprint!("{}", render_diagnostics(args, &compiled.diagnostics));
            }
        }
        Err(e) => eprintln!("  Error: {e}"),
    }
}

fn cmd_arrays(args: &str, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Array columns: {}", state.interpreter.array_policy());
        return;
    }
    match args.parse::<ArrayPolicy>() {
        Ok(policy) => {
            state.interpreter.set_array_policy(policy);
            eprintln!("  Array columns: {policy}");
        }
        Err(e) => eprintln!("  {e}"),
    }
}

fn cmd_limit(args: &str, state: &mut ReplState) {
    if args.is_empty() {
        eprintln!("  Page size: {}", state.session.limit());
        return;
    }
    match args.parse::<u32>() {
        Ok(n) => {
            let limit = crate::config::resolve_limit(Some(n));
            state.session.set_limit(limit);
            eprintln!("  Page size: {limit}");
        }
        Err(_) => eprintln!("  Usage: /limit <n>"),
    }
}

async fn cmd_login(args: &str, state: &mut ReplState) {
    let mut parts = args.split_whitespace();
    let (Some(identifier), Some(password)) = (parts.next(), parts.next()) else {
        eprintln!("  Usage: /login <handle> <app-password>");
        return;
    };
    let creds = Credentials {
        identifier: identifier.to_string(),
        password: password.to_string(),
    };
    match cancellable(state.session.login(&creds)).await {
        Some(Ok(())) => eprintln!(
            "  Signed in as {}",
            state.session.handle().unwrap_or(identifier)
        ),
        Some(Err(e)) => eprintln!("  {e}"),
        None => {}
    }
}

fn cmd_whoami(state: &ReplState) {
    match (state.session.handle(), state.session.did()) {
        (Some(handle), Some(did)) => {
            eprintln!("  {handle} ({did})");
            if let Some(exp) = state.session.access_expires_at() {
                eprintln!("  Access token expires {}", exp.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        _ => eprintln!("  Not signed in (stealth mode)."),
    }
}

async fn cmd_search(args: &str, state: &mut ReplState, people: bool) {
    if args.is_empty() {
        eprintln!("  Usage: /{} <text>", if people { "people" } else { "search" });
        return;
    }
    let target = if people {
        SearchTarget::Actors
    } else {
        SearchTarget::Posts
    };
    let json = state.json;
    let interpreter = state.interpreter;
    let Some(result) = cancellable(interpreter.search(&mut state.session, target, args)).await
    else {
        return;
    };
    match result {
        Ok(outcome) => {
            if json {
                match render_json(&outcome) {
                    Ok(out) => println!("{out}"),
                    Err(e) => eprintln!("  Error: {e}"),
                }
            } else {
                print!("{}", render_outcome(&outcome));
            }
        }
        Err(e) => eprintln!("  Error: {e}"),
    }
}

async fn cmd_prefs(state: &mut ReplState) {
    if !state.session.is_authenticated() {
        eprintln!("  Preferences need a signed-in account. Use /login first.");
        return;
    }
    match cancellable(state.session.get_preferences()).await {
        Some(Ok(prefs)) => match serde_json::to_string_pretty(&prefs) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("  Error: {e}"),
        },
        Some(Err(e)) => eprintln!("  Error: {e}"),
        None => {}
    }
}
