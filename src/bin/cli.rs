//! respwire CLI Client
//!
//! Sends commands to a RESP server and inspects append-only files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use respwire::aof::AofRecovery;
use respwire::network::Connection;
use respwire::{Aof, Kind, Value};

/// respwire CLI
#[derive(Parser, Debug)]
#[command(name = "respwire-cli")]
#[command(about = "CLI for RESP servers and append-only files")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one command and print the reply
    Send {
        /// Command name followed by its arguments
        #[arg(required = true, num_args = 1..)]
        args: Vec<String>,
    },

    /// Print every value stored in an append-only file
    Dump {
        /// The file to read
        path: PathBuf,
    },

    /// Check an append-only file for a torn or corrupt tail
    Check {
        /// The file to check
        path: PathBuf,

        /// Truncate the damaged tail
        #[arg(long)]
        fix: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();

    let result = match args.command {
        Commands::Send { args: command } => send(&args.server, &command),
        Commands::Dump { path } => dump(&path),
        Commands::Check { path, fix } => check(&path, fix),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("(error) {}", e);
            ExitCode::FAILURE
        }
    }
}

fn send(server: &str, command: &[String]) -> respwire::Result<ExitCode> {
    let mut conn = Connection::connect(server)?;
    let reply = conn.call(&command[0], &command[1..])?;
    print_reply(&reply, 0);

    Ok(match reply.kind() {
        Kind::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn dump(path: &Path) -> respwire::Result<ExitCode> {
    // Opening would create a missing file
    std::fs::metadata(path)?;
    let aof = Aof::open(path)?;
    let mut count = 0u64;
    let scanned = aof.scan(|value| {
        count += 1;
        println!("{}) {}", count, value);
    });
    aof.close()?;

    match scanned {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("stopped after {} values: {}", count, e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn check(path: &Path, fix: bool) -> respwire::Result<ExitCode> {
    let result = if fix {
        AofRecovery::repair(path)?
    } else {
        AofRecovery::verify(path)?
    };

    println!("values:   {}", result.values_recovered);
    println!("valid:    {} of {} bytes", result.valid_len, result.file_len);

    match &result.tail_error {
        None => {
            println!("status:   ok");
            Ok(ExitCode::SUCCESS)
        }
        Some(reason) if result.was_truncated => {
            println!("status:   repaired ({}), dropped {} bytes", reason, result.trailing_bytes());
            Ok(ExitCode::SUCCESS)
        }
        Some(reason) => {
            println!("status:   damaged ({}), {} trailing bytes", reason, result.trailing_bytes());
            println!("run again with --fix to truncate");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print a reply the way redis-cli does
fn print_reply(value: &Value, indent: usize) {
    match value.kind() {
        Kind::SimpleString => println!("{}", value.as_str()),
        Kind::Error => println!("(error) {}", value.as_str()),
        Kind::Integer => println!("(integer) {}", value.as_integer()),
        Kind::BulkString if value.is_null() => println!("(nil)"),
        Kind::BulkString => println!("\"{}\"", value.as_str()),
        Kind::Array => match value.as_array() {
            None => println!("(nil)"),
            Some([]) => println!("(empty array)"),
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        print!("{:width$}", "", width = indent);
                    }
                    let label = format!("{}) ", i + 1);
                    print!("{}", label);
                    print_reply(item, indent + label.len());
                }
            }
        },
    }
}
