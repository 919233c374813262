//! Entrypoint of the lp binary
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use clap::Parser;
use dotenvy::dotenv;

mod commands {
    pub(crate) mod parse;
}
mod logging;

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "lp",
    version,
    about = "Line protocol inspection tool",
    long_about = r#"Line protocol inspection tool

Examples:
    # Re-serialize a file in canonical form with second precision timestamps
    lp parse metrics.lp --output-precision s

    # List the series keys of whatever arrives on stdin
    cat metrics.lp | lp parse --keys

Flags may also be set with the environment variables named in --help, or in a
.env file in the working directory.
"#
)]
struct Config {
    #[clap(flatten)]
    logging_config: logging::LoggingConfig,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Parse line protocol and write it back out in canonical form
    Parse(commands::parse::Config),
}

fn main() {
    load_dotenv();

    let config = Config::parse();

    if let Err(e) = logging::init(&config.logging_config) {
        eprintln!("Initializing logs failed: {e}");
        std::process::exit(ReturnCode::Failure as _);
    }

    match config.command {
        None => println!("command required, -h/--help for help"),
        Some(Command::Parse(config)) => {
            if let Err(e) = commands::parse::command(config) {
                eprintln!("Parse command failed: {e}");
                std::process::exit(ReturnCode::Failure as _)
            }
        }
    }
}

/// Source the .env file before initialising the Config struct so its values
/// act as environment variable fallbacks.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing env file is fine, the Config defaults apply
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}
