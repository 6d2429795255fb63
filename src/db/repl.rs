//! Interactive REPL (Read-Eval-Print Loop) for EDB.

use std::io::{self, BufRead, Write};

use super::api::{Edb, EdbResult};
use crate::record::LogicalRecord;
use crate::storage::Signature;

/// REPL configuration.
#[derive(Debug, Clone)]
pub struct ReplConfig {
    /// Prompt string.
    pub prompt: String,
    /// Show timing information.
    pub timing: bool,
    /// Max records to display.
    pub max_rows: usize,
    /// Author recorded on `.commit`.
    pub author: Signature,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            prompt: "edb> ".into(),
            timing: true,
            max_rows: 100,
            author: Signature::edb(),
        }
    }
}

/// The interactive REPL.
pub struct Repl {
    db: Edb,
    config: ReplConfig,
    history: Vec<String>,
}

impl Repl {
    /// Create a new REPL over the given store.
    pub fn new(db: Edb) -> Self {
        Self::with_config(db, ReplConfig::default())
    }

    /// Create a REPL with custom configuration.
    pub fn with_config(db: Edb, config: ReplConfig) -> Self {
        Self {
            db,
            config,
            history: Vec::new(),
        }
    }

    /// Run the REPL interactively.
    pub fn run(&mut self) -> EdbResult<()> {
        self.print_banner();

        let stdin = io::stdin();
        let mut stdout = io::stdout();

        loop {
            print!("{}", self.config.prompt);
            stdout.flush()?;

            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                // EOF.
                println!("\nGoodbye!");
                break;
            }

            let cmd = line.trim();
            if cmd.is_empty() {
                continue;
            }
            self.history.push(cmd.to_string());

            let start = std::time::Instant::now();
            match self.execute(cmd, &mut stdout) {
                Ok(true) => break,
                Ok(false) => {
                    if self.config.timing {
                        println!("Time: {:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
                    }
                }
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Ok(())
    }

    fn print_banner(&self) {
        println!("╔═══════════════════════════════════════════════════╗");
        println!("║                     EDB v0.1.0                    ║");
        println!("║        A Versioned Hierarchical Record Store      ║");
        println!("╠═══════════════════════════════════════════════════╣");
        println!("║          Type .help for available commands        ║");
        println!("╚═══════════════════════════════════════════════════╝");
        println!();
    }

    /// Run one command, writing its output to `out`.
    ///
    /// Returns `Ok(true)` when the REPL should exit.
    pub fn execute(&mut self, cmd: &str, out: &mut dyn Write) -> EdbResult<bool> {
        let cmd = cmd.trim().trim_start_matches(&['.', '\\'][..]);
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        let command = parts.first().map(|s| s.to_lowercase());
        let args = parts.get(1..).unwrap_or(&[]);

        match command.as_deref() {
            Some("help") | Some("h") | Some("?") => {
                self.print_help(out)?;
            }
            Some("quit") | Some("exit") | Some("q") => {
                return Ok(true);
            }
            Some("add") => match parse_record(args) {
                Some(record) => {
                    self.db.add([record])?;
                    writeln!(out, "staged ({} pending)", self.db.staged())?;
                }
                None => writeln!(out, "Usage: .add <field>=<value> [<field>=<value> ...]")?,
            },
            Some("rm") | Some("remove") => match parse_record(args) {
                Some(record) => {
                    self.db.remove([record])?;
                    writeln!(out, "removal staged ({} pending)", self.db.staged())?;
                }
                None => writeln!(out, "Usage: .rm <field>=<value> [<field>=<value> ...]")?,
            },
            Some("commit") => {
                let author = self.config.author.clone();
                let id = if args.is_empty() {
                    self.db.commit(&author.name, &author.email)?
                } else {
                    self.db
                        .commit_with_message(&author.name, &author.email, &args.join(" "))?
                };
                writeln!(out, "{}", id)?;
            }
            Some("query") => {
                let include_head = args.contains(&"--head");
                let pattern: Vec<&str> = args.iter().copied().filter(|a| *a != "--head").collect();
                let pattern = if pattern.is_empty() { "*".to_string() } else { pattern.join(" ") };
                let records = self.db.query(&pattern, include_head)?;
                self.print_records(&records, out)?;
            }
            Some("nodes") | Some("ls") => {
                let records = self.db.query_nodes(args)?;
                self.print_records(&records, out)?;
            }
            Some("reset") => match args {
                [commit] | [commit, _] => {
                    let depth = match args.get(1).map(|d| d.parse::<usize>()) {
                        Some(Ok(depth)) => depth,
                        Some(Err(_)) => {
                            writeln!(out, "depth must be a non-negative integer")?;
                            return Ok(false);
                        }
                        None => 0,
                    };
                    let id = self.db.reset(commit, depth)?;
                    writeln!(out, "HEAD is now at {}", id)?;
                }
                _ => writeln!(out, "Usage: .reset <commit> [depth]")?,
            },
            Some("log") => {
                let limit = args.first().and_then(|n| n.parse().ok()).or(Some(10));
                for commit in self.db.history(limit)? {
                    writeln!(
                        out,
                        "{} {} {} {}",
                        commit.id.short(),
                        commit.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        commit.author_name,
                        commit.summary()
                    )?;
                }
            }
            Some("head") => match self.db.head()? {
                Some(head) => writeln!(out, "{}", head)?,
                None => writeln!(out, "no commits yet")?,
            },
            Some("status") => {
                if self.db.staged() == 0 {
                    writeln!(out, "nothing staged")?;
                }
                for (path, entry) in self.db.staged_entries() {
                    let mark = if entry.record().is_some() { '+' } else { '-' };
                    writeln!(out, "{} {}", mark, path)?;
                }
            }
            Some("discard") => {
                self.db.discard();
                writeln!(out, "staged changes discarded")?;
            }
            Some("unlock") => {
                if self.db.clear_head_lock()? {
                    writeln!(out, "removed stale HEAD lock")?;
                } else {
                    writeln!(out, "HEAD is not locked")?;
                }
            }
            Some("stats") => {
                writeln!(out, "{}", self.db.stats()?)?;
            }
            Some("history") => {
                writeln!(out, "Command History:")?;
                for (i, cmd) in self.history.iter().enumerate() {
                    writeln!(out, "  {}: {}", i + 1, cmd)?;
                }
            }
            Some("timing") => {
                self.config.timing = !self.config.timing;
                writeln!(out, "Timing: {}", if self.config.timing { "on" } else { "off" })?;
            }
            Some("clear") => {
                // Clear screen (ANSI escape).
                write!(out, "\x1B[2J\x1B[H")?;
            }
            Some(cmd) => {
                writeln!(out, "Unknown command: .{}", cmd)?;
                writeln!(out, "Type .help for available commands")?;
            }
            None => {}
        }

        Ok(false)
    }

    fn print_help(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "Commands:")?;
        writeln!(out, "  .help, .h, .?             Show this help message")?;
        writeln!(out, "  .quit, .exit, .q          Exit the REPL")?;
        writeln!(out, "  .add f=v [f=v ...]        Stage a record")?;
        writeln!(out, "  .rm f=v [f=v ...]         Stage the removal of a record")?;
        writeln!(out, "  .commit [message]         Commit staged records")?;
        writeln!(out, "  .query [pattern] [--head] Query records (*, field:glob, glob)")?;
        writeln!(out, "  .nodes [seg ...]          List entries under a path")?;
        writeln!(out, "  .reset <commit> [depth]   Move HEAD to an ancestor of <commit>")?;
        writeln!(out, "  .log [n]                  Show commit history")?;
        writeln!(out, "  .head                     Show the current HEAD")?;
        writeln!(out, "  .status                   Show staged changes")?;
        writeln!(out, "  .discard                  Drop staged changes")?;
        writeln!(out, "  .unlock                   Remove a HEAD lock left by a crashed writer")?;
        writeln!(out, "  .stats                    Show store statistics")?;
        writeln!(out, "  .history                  Show command history")?;
        writeln!(out, "  .timing                   Toggle timing display")?;
        writeln!(out, "  .clear                    Clear the screen")?;
        writeln!(out)
    }

    fn print_records(&self, records: &[LogicalRecord], out: &mut dyn Write) -> io::Result<()> {
        if records.is_empty() {
            return writeln!(out, "(0 records)");
        }

        let limit = records.len().min(self.config.max_rows);
        for record in records.iter().take(limit) {
            writeln!(out, "{}", record)?;
        }
        if records.len() > limit {
            writeln!(out, "... ({} more records)", records.len() - limit)?;
        }
        writeln!(out, "({} records)", records.len())
    }
}

/// `["kind=job", "name=nightly"]` into a record; `None` if malformed
fn parse_record(args: &[&str]) -> Option<LogicalRecord> {
    if args.is_empty() {
        return None;
    }
    let pairs = args
        .iter()
        .map(|arg| arg.split_once('='))
        .collect::<Option<Vec<_>>>()?;
    LogicalRecord::from_pairs(pairs).ok()
}
