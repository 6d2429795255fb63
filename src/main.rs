//! EDB - A Versioned Hierarchical Record Store
//!
//! This is the main entry point for the EDB command-line interface.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use edb::db::{Backend, Edb, EdbConfig, Repl, ReplConfig};
use edb::record::{LogicalRecord, PathLayout};
use edb::storage::Signature;

const COMMANDS: &[&str] = &["add", "commit", "query", "nodes", "reset", "log", "head"];

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse simple command line args.
    let mut path = PathBuf::from(".edb");
    let mut verbose = false;
    let mut backend = Backend::Disk;
    let mut layout = PathLayout::Values;
    let mut author = Signature::edb();
    let mut command: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--database" => {
                i += 1;
                if i < args.len() {
                    path = PathBuf::from(&args[i]);
                }
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-m" | "--memory" => {
                backend = Backend::Memory;
            }
            "-l" | "--layout" => {
                i += 1;
                match args.get(i).map(|l| l.parse::<PathLayout>()) {
                    Some(Ok(l)) => layout = l,
                    Some(Err(e)) => {
                        eprintln!("{}", e);
                        return ExitCode::FAILURE;
                    }
                    None => {
                        eprintln!("--layout needs a value");
                        return ExitCode::FAILURE;
                    }
                }
            }
            "--author" => {
                i += 1;
                if let Some(name) = args.get(i) {
                    author.name = name.clone();
                }
            }
            "--email" => {
                i += 1;
                if let Some(email) = args.get(i) {
                    author.email = email.clone();
                }
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("EDB v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg if COMMANDS.contains(&arg) => {
                // everything after the command belongs to it
                command = args[i..].to_vec();
                break;
            }
            arg => {
                // Treat as repository path if no flag.
                if !arg.starts_with('-') {
                    path = PathBuf::from(arg);
                } else {
                    eprintln!("Unknown option: {}", arg);
                    return ExitCode::FAILURE;
                }
            }
        }
        i += 1;
    }

    // Open store.
    let config = EdbConfig::new(&path)
        .backend(backend)
        .layout(layout)
        .create_if_missing(true)
        .verbose(verbose);

    init_tracing(config.log_filter());

    let db = match Edb::open_with_config(config) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Error opening store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Execute single command or run REPL.
    let result = if command.is_empty() {
        run_repl(db, author)
    } else {
        execute_command(db, &author, &command)
    };

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn print_help() {
    println!("EDB - A Versioned Hierarchical Record Store");
    println!();
    println!("Usage: edb [OPTIONS] [PATH] [COMMAND [ARGS...]]");
    println!();
    println!("Options:");
    println!("  -d, --database PATH    Path to repository directory (default: .edb)");
    println!("  -m, --memory           Use a throw-away in-memory store");
    println!("  -l, --layout LAYOUT    Path layout: values | identity (default: values)");
    println!("      --author NAME      Author recorded on commits");
    println!("      --email EMAIL      Author email recorded on commits");
    println!("  -v, --verbose          Enable debug logging (RUST_LOG overrides)");
    println!("  -h, --help             Show this help message");
    println!("  --version              Show version");
    println!();
    println!("Commands (no command starts the REPL):");
    println!("  add f=v [f=v ...]      Store one record and commit it");
    println!("  commit [MESSAGE]       Commit on top of HEAD without changes");
    println!("  query [PATTERN]        Print records matching PATTERN (default: *)");
    println!("  nodes [SEG ...]        List entries under a path");
    println!("  reset COMMIT [DEPTH]   Move HEAD DEPTH commits behind COMMIT");
    println!("  log [N]                Show the last N commits");
    println!("  head                   Print the current HEAD");
    println!();
    println!("Examples:");
    println!("  edb                                  Start REPL with default store");
    println!("  edb mystore add kind=job name=daily  Add a record to 'mystore'");
    println!("  edb mystore query 'kind:job'         Query records and exit");
}

fn execute_command(mut db: Edb, author: &Signature, command: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<&str> = command[1..].iter().map(String::as_str).collect();

    match command[0].as_str() {
        "add" => {
            let pairs = args
                .iter()
                .map(|arg| arg.split_once('=').ok_or_else(|| format!("expected field=value, got '{}'", arg)))
                .collect::<Result<Vec<_>, _>>()?;
            db.add([LogicalRecord::from_pairs(pairs)?])?;
            println!("{}", db.commit(&author.name, &author.email)?);
        }
        "commit" => {
            let id = if args.is_empty() {
                db.commit(&author.name, &author.email)?
            } else {
                db.commit_with_message(&author.name, &author.email, &args.join(" "))?
            };
            println!("{}", id);
        }
        "query" => {
            let pattern = if args.is_empty() { "*".to_string() } else { args.join(" ") };
            let records = db.query(&pattern, false)?;
            for record in &records {
                println!("{}", record);
            }
            println!("({} records)", records.len());
        }
        "nodes" => {
            for record in db.query_nodes(args.as_slice())? {
                println!("{}", record);
            }
        }
        "reset" => {
            let commit = args.first().ok_or("usage: reset COMMIT [DEPTH]")?;
            let depth = match args.get(1) {
                Some(d) => d.parse::<usize>()?,
                None => 0,
            };
            println!("{}", db.reset(commit, depth)?);
        }
        "log" => {
            let limit = match args.first() {
                Some(n) => Some(n.parse::<usize>()?),
                None => None,
            };
            for commit in db.history(limit)? {
                println!("{} {} {}", commit.id, commit.timestamp.to_rfc3339(), commit.summary());
            }
        }
        "head" => match db.head()? {
            Some(head) => println!("{}", head),
            None => println!("no commits yet"),
        },
        other => return Err(format!("unknown command '{}'", other).into()),
    }
    Ok(())
}

fn run_repl(db: Edb, author: Signature) -> Result<(), Box<dyn std::error::Error>> {
    let config = ReplConfig {
        author,
        ..Default::default()
    };
    let mut repl = Repl::with_config(db, config);
    repl.run()?;
    Ok(())
}
