//! Table image validation tool
//!
//! Runs the flight validators over a table file and reports the verdict:
//!
//! ```text
//! tblcheck ats <file>       validate an ATS (or Append) image
//! tblcheck rts <file>       validate an RTS image
//! ```

use seqcmd::constants::{ATS_BUFF_WORDS, RTS_BUFF_WORDS};
use seqcmd::{parse_rts, verify_ats_table};
use std::process::ExitCode;

fn usage() -> ExitCode {
    eprintln!("usage: tblcheck <ats|rts> <file>");
    ExitCode::from(2)
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        return usage();
    }

    let bytes = match std::fs::read(&args[2]) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("tblcheck: cannot read {}: {}", args[2], e);
            return ExitCode::FAILURE;
        }
    };
    let words = bytes.len() / 4;

    let result = match args[1].as_str() {
        "ats" => verify_ats_table(&bytes, words.min(ATS_BUFF_WORDS)),
        "rts" => parse_rts(&bytes, words.min(RTS_BUFF_WORDS)),
        _ => return usage(),
    };

    match result {
        Ok(stats) => {
            println!(
                "{}: valid, {} entries, {} bytes",
                args[2],
                stats.entry_count,
                stats.byte_count()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: rejected: {}", args[2], e);
            ExitCode::FAILURE
        }
    }
}
