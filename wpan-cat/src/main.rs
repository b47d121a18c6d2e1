use std::process::ExitCode;

use clap::Parser;
use colored::*;
use wpan_cat::FrameParser;

/// `cat` for IEEE 802.15.4 frames.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The IEEE 802.15.4 frame to parse, in hex, without FCS.
    #[clap(value_parser(clap::builder::NonEmptyStringValueParser::new()))]
    input: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match FrameParser::parse_hex(&args.input) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}: {err}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}
