use std::io::{self, BufRead, Write};

use anyhow::Result;
use clap::Parser;
use graph_core::{Dispatcher, Response};
use serde_json::Value;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "graph-worker",
    version,
    about = "Serves plot and integral requests as JSON lines on stdin/stdout"
)]
struct Cli {
    /// Log filter directive (e.g. `graph_core=debug`); defaults to RUST_LOG
    #[arg(long)]
    log: Option<String>,

    /// Pretty-print responses
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.log.as_deref())?)
        .with_writer(io::stderr)
        .init();

    let dispatcher = Dispatcher::default();
    serve(&dispatcher, io::stdin().lock(), &mut io::stdout(), cli.pretty)
}

/// `--log` wins, then RUST_LOG, then `warn`.
fn log_filter(directive: Option<&str>) -> Result<EnvFilter> {
    Ok(match directive {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    })
}

/// Answers one request per input line until the input closes.
fn serve(
    dispatcher: &Dispatcher<graph_core::equation_engine::BytecodeCompiler>,
    input: impl BufRead,
    output: &mut impl Write,
    pretty: bool,
) -> Result<()> {
    for line in input.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!("stdin read error: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message: Value = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                error!("invalid JSON message: {e}");
                let response = Response::Error {
                    message: format!("parse error: {e}"),
                };
                write_response(output, &response, pretty)?;
                continue;
            }
        };

        match dispatcher.handle(&message) {
            Some(response) => write_response(output, &response, pretty)?,
            None => debug!("no response for message: {line}"),
        }
    }
    Ok(())
}

fn write_response(output: &mut impl Write, response: &Response, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    };
    writeln!(output, "{json}")?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> Vec<Value> {
        let mut output = Vec::new();
        serve(&Dispatcher::default(), input.as_bytes(), &mut output, false).expect("serve");
        String::from_utf8(output)
            .expect("utf8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("each line is JSON"))
            .collect()
    }

    #[test]
    fn one_line_per_known_request() {
        let responses = run(concat!(
            r#"{"type":"computeIntegral","mode":"cartesian","expression":"x","a":0,"b":2}"#,
            "\n\n",
            r#"{"type":"progress"}"#,
            "\n",
            r#"{"type":"compute","mode":"3d","expr":"x*y","xRange":{"min":0,"max":1},"yRange":{"min":0,"max":1},"resolution":4}"#,
            "\n",
        ));
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["type"], "integralResult");
        assert!((responses[0]["value"].as_f64().expect("value") - 2.0).abs() < 1e-9);
        assert_eq!(responses[1]["mode"], "3d");
    }

    #[test]
    fn malformed_lines_get_an_error_and_serving_continues() {
        let responses = run("{not json\n{\"type\":\"computeIntegral\",\"mode\":\"polar\",\"rExpr\":\"2\",\"a\":0,\"b\":1}\n");
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["type"], "error");
        assert!((responses[1]["value"].as_f64().expect("value") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn cli_flags_parse() {
        let cli = Cli::try_parse_from(["graph-worker", "--log", "graph_core=debug", "--pretty"])
            .expect("flags");
        assert_eq!(cli.log.as_deref(), Some("graph_core=debug"));
        assert!(cli.pretty);
    }

    #[test]
    fn log_filter_prefers_flag_then_rust_log() {
        use tracing_subscriber::filter::LevelFilter;

        let flag = log_filter(Some("trace")).expect("valid directive");
        assert_eq!(flag.max_level_hint(), Some(LevelFilter::TRACE));
        assert!(log_filter(Some("graph_core=loud")).is_err());

        std::env::set_var("RUST_LOG", "debug");
        let from_env = log_filter(None).expect("default filter");
        assert_eq!(from_env.max_level_hint(), Some(LevelFilter::DEBUG));

        std::env::remove_var("RUST_LOG");
        let fallback = log_filter(None).expect("default filter");
        assert_eq!(fallback.max_level_hint(), Some(LevelFilter::WARN));
    }
}
