//! Console commands for the headless client.

use plaza_shared::math::Vec3;
use thiserror::Error;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    /// Join the given room, or the configured one.
    Connect { room: Option<String> },
    Disconnect,
    Status,
    Name(String),
    Teleport(Vec3),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub const HELP: &[&str] = &[
    "connect [room]     - join a room (default: configured room)",
    "disconnect         - leave the current room",
    "status             - show connection and player state",
    "name <username>    - change display name",
    "teleport <x> <y> <z> - move the local player",
    "quit               - exit",
];

/// Parses one line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let tokens = tokenize(line);
    let Some((head, args)) = tokens.split_first() else {
        return Ok(None);
    };

    let cmd = match head.to_ascii_lowercase().as_str() {
        "connect" => ConsoleCommand::Connect {
            room: args.first().cloned(),
        },
        "disconnect" => ConsoleCommand::Disconnect,
        "status" => ConsoleCommand::Status,
        "name" => {
            if args.is_empty() {
                return Err(ConsoleError::Usage("name <username>"));
            }
            ConsoleCommand::Name(args.join(" "))
        }
        "teleport" | "tp" => {
            let coords: Vec<f32> = args.iter().filter_map(|a| a.parse().ok()).collect();
            match coords.as_slice() {
                [x, y, z] if args.len() == 3 => ConsoleCommand::Teleport(Vec3::new(*x, *y, *z)),
                _ => return Err(ConsoleError::Usage("teleport <x> <y> <z>")),
            }
        }
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };
    Ok(Some(cmd))
}

/// Splits on whitespace; double quotes group words.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
