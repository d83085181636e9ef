//! Slash commands operating on the session store

mod handler;

pub use handler::*;

use crate::session::{SessionError, SessionResult};

/// What a `delete` command removes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    Current,
    All,
    Session(String),
    /// 1-based inclusive range over the recency-ordered history
    Range { start: usize, end: usize },
    OlderThan { days: u32 },
}

/// A parsed session command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    History { limit: Option<usize> },
    Search { query: String },
    Save,
    Export,
    Delete(DeleteTarget),
    Retitle { session_id: Option<String> },
}

impl SessionCommand {
    /// Parse a command line such as `/delete range 2 4`
    pub fn parse(input: &str) -> SessionResult<Self> {
        let input = input.trim();
        let input = input.strip_prefix('/').unwrap_or(input);
        let mut words = input.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| SessionError::validation("empty command"))?
            .to_lowercase();
        let args: Vec<&str> = words.collect();

        match name.as_str() {
            "history" => {
                expect_at_most(&name, &args, 1)?;
                let limit = args.first().map(|n| parse_number(n, "history length")).transpose()?;
                Ok(SessionCommand::History { limit })
            }
            "search" => {
                let query = args.join(" ");
                if query.is_empty() {
                    return Err(SessionError::validation("usage: search <query>"));
                }
                Ok(SessionCommand::Search { query })
            }
            "save" => {
                expect_at_most(&name, &args, 0)?;
                Ok(SessionCommand::Save)
            }
            "export" => {
                expect_at_most(&name, &args, 0)?;
                Ok(SessionCommand::Export)
            }
            "delete" => parse_delete(&args).map(SessionCommand::Delete),
            "retitle" => {
                expect_at_most(&name, &args, 1)?;
                Ok(SessionCommand::Retitle {
                    session_id: args.first().map(|id| id.to_string()),
                })
            }
            other => Err(SessionError::validation(format!("unknown command: {}", other))),
        }
    }
}

fn parse_delete(args: &[&str]) -> SessionResult<DeleteTarget> {
    const USAGE: &str = "usage: delete current|all|<id>|range <start> <end>|old <days>";

    match args {
        ["current"] => Ok(DeleteTarget::Current),
        ["all"] => Ok(DeleteTarget::All),
        ["range", start, end] => Ok(DeleteTarget::Range {
            start: parse_number(start, "range start")?,
            end: parse_number(end, "range end")?,
        }),
        ["old", days] => Ok(DeleteTarget::OlderThan {
            days: parse_number(days, "day count")?,
        }),
        [keyword, ..] if matches!(*keyword, "current" | "all" | "range" | "old") => {
            Err(SessionError::validation(USAGE))
        }
        [id] => Ok(DeleteTarget::Session(id.to_string())),
        _ => Err(SessionError::validation(USAGE)),
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> SessionResult<T> {
    raw.parse()
        .map_err(|_| SessionError::validation(format!("{} must be a whole number, got {:?}", what, raw)))
}

fn expect_at_most(name: &str, args: &[&str], max: usize) -> SessionResult<()> {
    if args.len() > max {
        return Err(SessionError::validation(format!(
            "too many arguments for {}",
            name
        )));
    }
    Ok(())
}
