//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `http_inspect` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - Mapping command outcomes to the process exit code
//!
//! All core functionality is implemented in the library crate.

use std::io::{self, IsTerminal, Write};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use http_inspect::client::{
    with_accept, with_body_content, with_body_resource, with_content_type, with_force_http1, with_force_http2,
    with_force_type, with_header_line, with_insecure, with_jq, with_method, with_raw, with_style, with_terminal,
    with_trace, ClientOption,
};
use http_inspect::config::{CertArgs, Cli, Command, DebugArgs};
use http_inspect::initialization::{init_crypto_provider, init_logger_with, init_resolver};
use http_inspect::render::available_styles;
use http_inspect::{check_certificates, CertCheckOptions, ClientConfig, Deadline};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logger_with(cli.log_level.clone().into(), cli.log_format.clone())
        .context("Failed to initialize logger")?;

    // Initialize crypto provider for TLS operations
    init_crypto_provider();

    let passed = match cli.command {
        Command::Debug(args) => run_debug(args).await,
        Command::Cert(args) => run_cert(args).await,
    };
    match passed {
        Ok(true) => Ok(()),
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("http_inspect error: {e:#}");
            process::exit(1);
        }
    }
}

fn deadline(timeout: Option<u64>) -> Deadline {
    Deadline::from_timeout(timeout.map(Duration::from_secs))
}

async fn run_debug(args: DebugArgs) -> Result<bool> {
    if args.list_styles {
        let mut out = io::stdout().lock();
        for style in available_styles() {
            writeln!(out, "{style}")?;
        }
        return Ok(true);
    }
    let Some(url) = args.url else {
        anyhow::bail!("an url is required");
    };

    let mut options: Vec<ClientOption> = vec![
        with_method(args.method),
        with_style(args.style),
        with_terminal(io::stdout().is_terminal()),
    ];
    if args.insecure {
        options.push(with_insecure());
    }
    if let Some(accept) = args.accept {
        options.push(with_accept(accept));
    }
    if let Some(content_type) = args.request_content_type {
        options.push(with_content_type(content_type));
    }
    for line in args.headers {
        options.push(with_header_line(line));
    }
    if args.force_http1 {
        options.push(with_force_http1());
    }
    if args.force_http2 {
        options.push(with_force_http2());
    }
    if args.trace {
        options.push(with_trace());
    }
    if let Some(force_type) = args.force_type {
        options.push(with_force_type(force_type));
    }
    if let Some(filter) = args.jq {
        options.push(with_jq(filter));
    }
    if args.raw_response {
        options.push(with_raw());
    }
    match (args.request_body_content, args.request_body) {
        (Some(content), _) => options.push(with_body_content(content)),
        (None, Some(location)) => options.push(with_body_resource(location)),
        (None, None) => {}
    }

    let config = ClientConfig::builder(url).options(options).build()?;
    config.run(init_resolver(), deadline(args.timeout)).await?;
    Ok(true)
}

async fn run_cert(args: CertArgs) -> Result<bool> {
    let options = CertCheckOptions {
        grace_days: args.days,
        deadline: deadline(args.timeout),
    };
    let report = check_certificates(&args.target, &init_resolver(), options).await?;
    report.write_to(&mut io::stdout().lock())?;
    Ok(report.passed())
}
