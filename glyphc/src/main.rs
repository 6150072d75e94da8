use std::env;
use std::fs;
use std::path::Path;
use std::process::ExitCode;

use glyphlib::ast::{Item, Route};
use glyphlib::compiler::{CompileError, CompiledItem, Compiler, OptimizationLevel, WsEvent};
use glyphlib::decompiler::{DecompiledResult, decompile};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const EXIT_OK: u8 = 0;
const EXIT_USAGE: u8 = 2;
const EXIT_IO: u8 = 3;
const EXIT_PARSE: u8 = 10;
const EXIT_SEMANTIC: u8 = 11;
const EXIT_UNSUPPORTED: u8 = 12;
const EXIT_DECODE: u8 = 13;

const USAGE: &str = "Usage: glyphc check <item.json> | glyphc build <item.json> <out.glyphc> [--opt <level>] | glyphc disasm <file.glyphc|item.json> [--opt <level>] | glyphc decompile <file.glyphc>";

fn main() -> ExitCode {
    init_logging();
    match run() {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(EXIT_USAGE)
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
    let mut args: Vec<String> = env::args().skip(1).collect();
    let level = take_opt_level(&mut args)?;
    let mut args = args.into_iter();
    let Some(cmd) = args.next() else {
        return Err(USAGE.to_string());
    };

    match cmd.as_str() {
        "check" => {
            let Some(path) = args.next() else {
                return Err("Usage: glyphc check <item.json>".to_string());
            };
            if args.next().is_some() {
                return Err("Usage: glyphc check <item.json>".to_string());
            }
            check_file(&path)
        }
        "build" => {
            let Some(input) = args.next() else {
                return Err("Usage: glyphc build <item.json> <out.glyphc> [--opt <level>]".to_string());
            };
            let Some(output) = args.next() else {
                return Err("Usage: glyphc build <item.json> <out.glyphc> [--opt <level>]".to_string());
            };
            if args.next().is_some() {
                return Err("Usage: glyphc build <item.json> <out.glyphc> [--opt <level>]".to_string());
            }
            build_file(&input, &output, level)
        }
        "disasm" => {
            let Some(path) = args.next() else {
                return Err("Usage: glyphc disasm <file.glyphc|item.json>".to_string());
            };
            if args.next().is_some() {
                return Err("Usage: glyphc disasm <file.glyphc|item.json>".to_string());
            }
            disasm_file(&path, level)
        }
        "decompile" => {
            let Some(path) = args.next() else {
                return Err("Usage: glyphc decompile <file.glyphc>".to_string());
            };
            if args.next().is_some() {
                return Err("Usage: glyphc decompile <file.glyphc>".to_string());
            }
            decompile_file(&path)
        }
        _ => Err("Unknown command. Supported: check, build, disasm, decompile".to_string()),
    }
}

/// Removes `--opt <level>` from `args`; the default is `basic`.
fn take_opt_level(args: &mut Vec<String>) -> Result<OptimizationLevel, String> {
    let Some(at) = args.iter().position(|a| a == "--opt") else {
        return Ok(OptimizationLevel::Basic);
    };
    if at + 1 >= args.len() {
        return Err("--opt needs a level: none, basic, aggressive or 0-3".to_string());
    }
    let value = args.remove(at + 1);
    args.remove(at);
    value.parse()
}

/// One compiled body. WebSocket routes yield one per handler, labelled by
/// event; every other item yields at most one, unlabelled.
struct Unit {
    label: Option<&'static str>,
    bytes: Vec<u8>,
}

/// Reads an item file. A JSON object without a `kind` tag is a bare route.
fn load_item(path: &str) -> Result<Item, ExitCode> {
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("Failed to read `{path}`: {e}");
        ExitCode::from(EXIT_IO)
    })?;
    let parse_error = |e: serde_json::Error| {
        eprintln!("[E-PARSE][parse] {path}: {e}");
        ExitCode::from(EXIT_PARSE)
    };
    let json: serde_json::Value = serde_json::from_str(&text).map_err(parse_error)?;
    if json.get("kind").is_some() {
        serde_json::from_value(json).map_err(parse_error)
    } else {
        serde_json::from_value::<Route>(json)
            .map(Item::Route)
            .map_err(parse_error)
    }
}

fn compile(path: &str, level: OptimizationLevel) -> Result<Vec<Unit>, ExitCode> {
    let item = load_item(path)?;
    debug!(path, %level, "compiling item");
    let compiled = Compiler::new(level).compile_item(&item).map_err(|e| {
        print_compile_error(path, &e);
        ExitCode::from(if e.is_semantic() {
            EXIT_SEMANTIC
        } else {
            EXIT_UNSUPPORTED
        })
    })?;
    Ok(units(compiled))
}

fn units(compiled: CompiledItem) -> Vec<Unit> {
    let single = |bytes| vec![Unit { label: None, bytes }];
    match compiled {
        CompiledItem::Route { bytecode, .. }
        | CompiledItem::Command { bytecode, .. }
        | CompiledItem::CronTask { bytecode, .. }
        | CompiledItem::EventHandler { bytecode, .. }
        | CompiledItem::QueueWorker { bytecode, .. } => single(bytecode),
        CompiledItem::WebSocket(ws) => [
            WsEvent::Connect,
            WsEvent::Message,
            WsEvent::Disconnect,
            WsEvent::Error,
        ]
        .into_iter()
        .filter_map(|event| {
            ws.handler(event).map(|bytes| Unit {
                label: Some(event.name()),
                bytes: bytes.to_vec(),
            })
        })
        .collect(),
        CompiledItem::Declaration { name } => {
            debug!(name, "declaration carries no bytecode");
            Vec::new()
        }
    }
}

/// `out.glyphc` for unlabelled units, `out.<label>.glyphc` next to it otherwise.
fn unit_path(output: &str, label: Option<&str>) -> String {
    let Some(label) = label else {
        return output.to_string();
    };
    let out = Path::new(output);
    let stem = out.file_stem().and_then(|s| s.to_str()).unwrap_or("out");
    out.with_file_name(format!("{stem}.{label}.glyphc"))
        .to_string_lossy()
        .into_owned()
}

fn load_bytecode(path: &str) -> Result<DecompiledResult, ExitCode> {
    let bytes = fs::read(path).map_err(|e| {
        eprintln!("Failed to read `{path}`: {e}");
        ExitCode::from(EXIT_IO)
    })?;
    decompile(&bytes).map_err(|e| {
        eprintln!("Failed to decode `{path}`: {e}");
        ExitCode::from(EXIT_DECODE)
    })
}

fn check_file(path: &str) -> Result<ExitCode, String> {
    match compile(path, OptimizationLevel::None) {
        Ok(_) => {
            println!("ok: {path}");
            Ok(ExitCode::from(EXIT_OK))
        }
        Err(code) => Ok(code),
    }
}

fn build_file(input: &str, output: &str, level: OptimizationLevel) -> Result<ExitCode, String> {
    let units = match compile(input, level) {
        Ok(units) => units,
        Err(code) => return Ok(code),
    };
    if units.is_empty() {
        println!("nothing to build: {input} is a declaration");
    }
    for unit in units {
        let path = unit_path(output, unit.label);
        if let Err(e) = fs::write(&path, unit.bytes) {
            eprintln!("Failed to write `{path}`: {e}");
            return Ok(ExitCode::from(EXIT_IO));
        }
        println!("built: {path}");
    }
    Ok(ExitCode::from(EXIT_OK))
}

fn disasm_file(path: &str, level: OptimizationLevel) -> Result<ExitCode, String> {
    if path.ends_with(".glyphc") {
        return Ok(match load_bytecode(path) {
            Ok(result) => {
                print!("{}", result.format_disassembly());
                ExitCode::from(EXIT_OK)
            }
            Err(code) => code,
        });
    }
    if !path.ends_with(".json") {
        return Err("disasm supports only .glyphc and .json files".to_string());
    }
    let units = match compile(path, level) {
        Ok(units) => units,
        Err(code) => return Ok(code),
    };
    for unit in units {
        let result = match decompile(&unit.bytes) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Failed to decode `{path}`: {e}");
                return Ok(ExitCode::from(EXIT_DECODE));
            }
        };
        if let Some(label) = unit.label {
            println!("== on_{label} ==");
        }
        print!("{}", result.format_disassembly());
    }
    Ok(ExitCode::from(EXIT_OK))
}

fn decompile_file(path: &str) -> Result<ExitCode, String> {
    match load_bytecode(path) {
        Ok(result) => {
            print!("{}", result.format());
            Ok(ExitCode::from(EXIT_OK))
        }
        Err(code) => Ok(code),
    }
}

fn print_compile_error(path: &str, e: &CompileError) {
    let phase = if e.is_semantic() { "semantic" } else { "unsupported" };
    eprintln!("[{}][{phase}] {path}: {}", e.code(), e.message);
}
