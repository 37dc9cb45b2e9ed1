use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use ticketmap_core::aggregate::collect_from_tracker;
use ticketmap_core::config::{
    DEFAULT_CONFIG_PATH, ResolvedSettings, SettingsOverrides, load_config, resolve_credential,
    resolve_settings,
};
use ticketmap_core::output::{render_comment_map, write_comment_map};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(
    name = "ticketmap",
    version,
    about = "Collect tracker ticket comments into one JSON document keyed by ticket title"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "URL", help = "Tracker API base URL")]
    api_url: Option<String>,
    #[arg(long, global = true, help = "Print resolved settings diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    api_url: Option<String>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            api_url: cli.api_url.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Fetch every ticket and comment and write the comment map")]
    Fetch(FetchArgs),
    #[command(about = "Show resolved settings without contacting the tracker")]
    Config,
}

#[derive(Debug, Args)]
struct FetchArgs {
    #[arg(short, long, value_name = "PATH", help = "Output file (default _build/comments.json)")]
    output: Option<PathBuf>,
    #[arg(long, conflicts_with = "output", help = "Print the document to stdout instead")]
    stdout: bool,
    #[arg(long, help = "Indent the JSON document")]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    dotenvy::dotenv().ok();
    init_tracing();

    match cli.command {
        Some(Commands::Fetch(args)) => run_fetch(&runtime, args),
        Some(Commands::Config) => run_config(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_fetch(runtime: &RuntimeOptions, args: FetchArgs) -> Result<()> {
    let overrides = SettingsOverrides {
        api_url: runtime.api_url.clone(),
        output_path: args.output,
        pretty: args.pretty.then_some(true),
    };
    let settings = resolve_runtime_settings(runtime, &overrides)?;
    let token = resolve_credential()?;
    if runtime.diagnostics {
        eprintln!("[diagnostics]\n{}", settings.diagnostics());
    }

    let report = collect_from_tracker(settings.tracker.clone(), token)
        .context("failed to collect ticket comments")?;

    if args.stdout {
        let rendered = render_comment_map(&report.comments, settings.output.pretty)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(rendered.as_bytes())?;
        writeln!(stdout)?;
        return Ok(());
    }

    let bytes = write_comment_map(
        &settings.output.path,
        &report.comments,
        settings.output.pretty,
    )?;

    println!("comments written");
    println!("output: {}", normalize_path(&settings.output.path));
    println!("bytes: {bytes}");
    println!("tickets: {}", report.tickets);
    println!("titles: {}", report.titles());
    println!("merged_titles: {}", report.merged_titles);
    println!("comments: {}", report.kept_comments);
    println!("deleted_comments: {}", report.deleted_comments);
    println!("events: {}", report.events);
    println!("ticket_pages: {}", report.ticket_pages);
    println!("event_pages: {}", report.event_pages);
    println!("requests: {}", report.request_count);
    Ok(())
}

fn run_config(runtime: &RuntimeOptions) -> Result<()> {
    let overrides = SettingsOverrides {
        api_url: runtime.api_url.clone(),
        ..SettingsOverrides::default()
    };
    let config_path = config_path(runtime);
    let settings = resolve_runtime_settings(runtime, &overrides)?;

    println!("resolved settings");
    println!(
        "config_path: {} ({})",
        normalize_path(&config_path),
        if config_path.exists() { "found" } else { "missing" }
    );
    println!("api_url: {}", settings.tracker.api_url);
    println!("api_url_source: {}", settings.tracker.api_url_source.as_str());
    println!("user_agent: {}", settings.tracker.user_agent);
    println!("timeout_ms: {}", settings.tracker.timeout_ms);
    println!("output: {}", normalize_path(&settings.output.path));
    println!("output_source: {}", settings.output.path_source.as_str());
    println!("pretty: {}", format_flag(settings.output.pretty));
    match resolve_credential() {
        Ok(token) => println!("credential: present ({})", token.source_var()),
        Err(error) => println!("credential: missing ({error})"),
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", settings.diagnostics());
    }
    Ok(())
}

fn resolve_runtime_settings(
    runtime: &RuntimeOptions,
    overrides: &SettingsOverrides,
) -> Result<ResolvedSettings> {
    let config = load_config(&config_path(runtime))?;
    Ok(resolve_settings(&config, overrides)?)
}

fn config_path(runtime: &RuntimeOptions) -> PathBuf {
    runtime
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TICKETMAP_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "ticketmap_core=debug,info"
        } else {
            "ticketmap_core=info,warn"
        })
    });

    let format = env::var("TICKETMAP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn fetch_accepts_output_and_pretty() {
        let cli = Cli::try_parse_from([
            "ticketmap",
            "--api-url",
            "https://todo.example/api",
            "fetch",
            "--output",
            "site/comments.json",
            "--pretty",
        ])
        .expect("parse");
        assert_eq!(cli.api_url.as_deref(), Some("https://todo.example/api"));
        match cli.command {
            Some(Commands::Fetch(args)) => {
                assert_eq!(args.output, Some(PathBuf::from("site/comments.json")));
                assert!(args.pretty);
                assert!(!args.stdout);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn stdout_conflicts_with_output() {
        let result = Cli::try_parse_from(["ticketmap", "fetch", "--stdout", "--output", "x.json"]);
        assert!(result.is_err());
    }
}
