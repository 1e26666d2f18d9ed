//! decode_header - run the detection header parser on a raw value
//!
//! Reads the header value from the first argument, or from stdin when no
//! argument is given, and prints the decoded mapping as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Read;

use object_announcer::speech::compose_announcement;
use object_announcer::HeaderParser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Decode an x-detected-objects header value")]
struct Args {
    /// Raw header value, e.g. "{'person': 1, 'chair': 2}".
    value: Option<String>,

    /// Also print the sentence that would be spoken.
    #[arg(long)]
    announce: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let raw = match args.value {
        Some(value) => value,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read header value from stdin")?;
            buf
        }
    };

    let parser = HeaderParser::new();
    match parser.decode(&raw) {
        Ok(decoded) => {
            println!("{}", serde_json::to_string(&decoded.mapping)?);
            eprintln!("strategy: {}", decoded.strategy.unwrap_or("none (empty header)"));
            if args.announce {
                println!("{}", compose_announcement(&decoded.mapping));
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", err);
            eprintln!("tried: {}", parser.strategy_names().join(", "));
            std::process::exit(2);
        }
    }
}
