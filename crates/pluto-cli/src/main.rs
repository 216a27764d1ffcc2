// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use pluto_app::StormState;
use pluto_cortex::{Client, ConnectOptions};
use runtime::CortexRuntime;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

const LOG_PATH_ENV: &str = "PLUTO_LOG";
const LOG_LEVEL_ENV: &str = "PLUTO_LOG_LEVEL";

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

    init_logging()?;

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `pluto --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let connect = ConnectOptions {
        timeout: config.cortex_timeout()?,
        insecure: config.insecure(),
        password: None,
    };
    let address = options
        .url
        .clone()
        .or_else(|| config.cortex_url().map(str::to_owned));

    if options.check_only {
        if let Some(address) = &address {
            let client = Client::connect(address, &connect)
                .with_context(|| format!("check login against {address}"))?;
            println!("logged in as {}@{}", client.user(), client.base_url());
        }
        return Ok(());
    }

    info!(config = %options.config_path.display(), "starting pluto");
    let mut state = StormState::new(config.storm_limits());
    let mut runtime = CortexRuntime::new(connect);
    pluto_tui::run_app(&mut state, &mut runtime, address.as_deref().unwrap_or_default())
}

/// Sends tracing output to `PLUTO_LOG` when set; the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let Some(path) = env::var_os(LOG_PATH_ENV) else {
        return Ok(());
    };
    let path = PathBuf::from(path);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}; fix or unset {LOG_PATH_ENV}", path.display()))?;

    let level = env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_owned());
    let filter = EnvFilter::try_new(&level)
        .with_context(|| format!("invalid {LOG_LEVEL_ENV} filter {level:?}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    url: Option<String>,
    print_config_path: bool,
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
        url: None,
        print_config_path: false,
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
            "--url" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow!("--url requires a cortex address such as https://user@host:4443")
                })?;
                options.url = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
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
    println!("pluto - terminal client for a Synapse Cortex");
    println!("  --config <path>          Use a specific config path");
    println!("  --url <address>          Prefill the login address (https://user@host:4443)");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --check                  Validate config; with --url, also log in");
    println!("  --help                   Show this help");
    println!();
    println!("Environment:");
    println!("  PLUTO_PASSWORD           Password when the address has none");
    println!("  PLUTO_CONFIG_PATH        Config file override");
    println!("  PLUTO_LOG                Write logs to this file");
    println!("  PLUTO_LOG_LEVEL          Log filter (default info)");
}
