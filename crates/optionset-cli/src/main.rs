// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::{Config, SourceKind};
use optionset_db::Store;
use optionset_tui::Screen;
use runtime::{StoreRuntime, WebApiRuntime, check_fields};
use std::env;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `optionset --print-example-config` to generate a template",
            options.config_path.display()
        )
    })?;
    init_logging(&config)?;

    let kind = if options.demo {
        SourceKind::Demo
    } else {
        config.source_kind()?
    };
    if options.print_db_path {
        println!("{}", config.db_path()?.display());
        return Ok(());
    }
    tracing::info!(?kind, config = %options.config_path.display(), "starting");

    let screen_config = config.screen_config();
    match kind {
        SourceKind::Demo | SourceKind::Sqlite => {
            let store = if kind == SourceKind::Demo {
                let store = Store::open_memory()?;
                store.bootstrap()?;
                store.seed_demo_data()?;
                store
            } else {
                let db_path = config.db_path()?;
                let store = Store::open(&db_path).with_context(|| {
                    format!(
                        "open database {} -- if this path is wrong, set [source].db_path or OPTIONSET_DB_PATH",
                        db_path.display()
                    )
                })?;
                store.bootstrap()?;
                store
            };

            if options.check_only {
                return print_check(check_fields(&store, &store, &screen_config)?);
            }
            let mut runtime = StoreRuntime::new(&store);
            optionset_tui::run_app(&mut Screen::new(screen_config), &mut runtime)
        }
        SourceKind::WebApi => {
            let base_url = config
                .webapi_base_url()
                .ok_or_else(|| anyhow!("[webapi].base_url is required for source.kind = \"webapi\""))?;
            let token = config.webapi_token();
            if token.is_none() {
                tracing::warn!(
                    token_env = config.webapi_token_env(),
                    "no bearer token in the environment; requests are sent unauthenticated"
                );
            }
            let client = optionset_webapi::Client::new(
                base_url,
                token.as_deref(),
                config.webapi_timeout()?,
            )
            .with_context(|| {
                format!(
                    "invalid [webapi] config in {}; fix base_url/timeout values",
                    options.config_path.display()
                )
            })?;

            if options.check_only {
                return print_check(check_fields(&client, &client, &screen_config)?);
            }
            let mut runtime = WebApiRuntime::new(client);
            optionset_tui::run_app(&mut Screen::new(screen_config), &mut runtime)
        }
    }
}

fn print_check(report: Vec<(String, usize)>) -> Result<()> {
    for (label, count) in report {
        println!("{label}: {count} records");
    }
    Ok(())
}

/// The terminal belongs to the form, so logs always go to a file.
fn init_logging(config: &Config) -> Result<()> {
    let path = config.log_path()?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let filter = config.log_filter();
    let filter = EnvFilter::try_new(&filter)
        .with_context(|| format!("invalid log filter {filter:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("optionset: searchable lookup picker");
    println!("  --config <path>          Use a specific config path");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a config template");
    println!("  --demo                   Launch with seeded countries and cities (in-memory)");
    println!("  --check                  Resolve every configured field and print record counts");
    println!("  --help                   Show this help");
}
