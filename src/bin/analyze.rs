use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use mail_cleaner::stats::SpamStats;

#[derive(Parser)]
#[command(name = "analyze")]
#[command(about = "Summarize a spam classification log", long_about = None)]
struct Cli {
    /// Audit log written by the AI rule, e.g. spam_classification.log
    log_file: PathBuf,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let stats = File::open(&cli.log_file).and_then(|file| SpamStats::parse(BufReader::new(file)));
    match stats {
        Ok(stats) => {
            print!("{}", stats.render());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error parsing log file {}: {e}", cli.log_file.display());
            ExitCode::FAILURE
        }
    }
}
