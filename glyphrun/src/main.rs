use std::env;
use std::fs;
use std::process::ExitCode;

use glyphlib::value::Value;
use glyphlib::vm::{Vm, VmConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "Usage: glyphrun run <file.glyphc> [name=value ...] [--max-steps <n>] [--trace]";

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("GLYPH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<ExitCode, String> {
    let mut args = env::args().skip(1);
    let Some(cmd) = args.next() else {
        return Err(USAGE.to_string());
    };

    match cmd.as_str() {
        "run" => {
            let Some(path) = args.next() else {
                return Err(USAGE.to_string());
            };
            let mut config = VmConfig::default();
            let mut locals = Vec::new();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--trace" => config.trace = true,
                    "--max-steps" => {
                        let Some(n) = args.next() else {
                            return Err("--max-steps needs a number".to_string());
                        };
                        config.max_steps = n
                            .parse()
                            .map_err(|e| format!("invalid --max-steps `{n}`: {e}"))?;
                    }
                    _ => locals.push(parse_local(&arg)?),
                }
            }
            run_file(&path, config, locals)
        }
        _ => Err("Unknown command. Supported: run".to_string()),
    }
}

/// `name=value`, where the value is JSON when it parses as JSON and a plain
/// string otherwise.
fn parse_local(arg: &str) -> Result<(String, Value), String> {
    let Some((name, raw)) = arg.split_once('=') else {
        return Err(format!("expected name=value, got `{arg}`\n{USAGE}"));
    };
    if name.is_empty() {
        return Err(format!("missing local name in `{arg}`"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

fn run_file(path: &str, config: VmConfig, locals: Vec<(String, Value)>) -> Result<ExitCode, String> {
    let bytes = fs::read(path).map_err(|e| format!("Failed to read `{path}`: {e}"))?;

    let mut vm = Vm::with_config(config);
    for (name, value) in locals {
        debug!(local = %name, value = %value.to_json(), "injecting local");
        vm.set_local(name, value);
    }

    match vm.execute(&bytes) {
        Ok(value) => {
            println!("{}", value.to_json());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("[{}] Runtime error: {e}", e.code());
            Ok(ExitCode::from(1))
        }
    }
}
