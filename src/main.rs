// src/main.rs
mod config;
mod mbp;
mod orderbook;
mod parser;
mod price;
mod processor;

use crate::config::AppConfig;
use crate::processor::Processor;
use anyhow::Context;
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DEFAULT_OUTPUT: &str = "mbp_output.csv";

fn print_usage(program: &str) {
    println!("Usage: {program} <input_mbo_file> [output_mbp_file]");
    println!();
    println!("Rebuilds a Market-By-Price (MBP-10) stream from Market-By-Order");
    println!("(MBO) events, one output row per book-changing input event.");
    println!();
    println!("Arguments:");
    println!("  input_mbo_file   input MBO CSV file");
    println!("  output_mbp_file  output MBP CSV file (default: {DEFAULT_OUTPUT})");
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        let program = args.first().map(String::as_str).unwrap_or("mbo2mbp");
        print_usage(program);
        return ExitCode::from(1);
    }
    let input = PathBuf::from(&args[1]);
    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    // Load config before the logger to allow the JSON formatting choice.
    let cfg = match AppConfig::load_or_default(Path::new(config::DEFAULT_CONFIG_PATH)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config error: {e:?}");
            return ExitCode::from(1);
        }
    };
    init_logger(cfg.general.json_logs);

    match run(&cfg, &input, &output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:?}");
            ExitCode::from(1)
        }
    }
}

fn run(cfg: &AppConfig, input: &Path, output: &Path) -> anyhow::Result<()> {
    info!("converting {} -> {}", input.display(), output.display());

    let src = File::open(input).with_context(|| format!("open input {}", input.display()))?;
    let sink = File::create(output).with_context(|| format!("create output {}", output.display()))?;

    let mut processor = Processor::new(sink, cfg)?;
    processor.run(BufReader::new(src))?;
    processor.report();
    info!("wrote {} rows to {}", processor.rows_out(), output.display());
    Ok(())
}

fn init_logger(json_logs: bool) {
    if json_logs {
        let mut b =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        b.format(|buf, record| {
            use std::io::Write;
            let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            writeln!(
                buf,
                "{{\"ts\":\"{}\",\"level\":\"{}\",\"target\":\"{}\",\"msg\":\"{}\"}}",
                ts,
                record.level(),
                record.target(),
                record.args().to_string().replace('"', "'")
            )
        })
        .init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }
}
