//! Chat command parsing.
//!
//! A chat message is a command iff it starts with `+` followed by at least one
//! ASCII letter or digit. Command names are case-insensitive; arguments are
//! whitespace-separated.
//!
//! | Command                | Effect                  |
//! |------------------------|-------------------------|
//! | `+roll <name>`         | roll once for `<name>`  |
//! | `+rollcount <count>`   | roll `<count>` times    |

/// Marker character that opens every command.
const COMMAND_PREFIX: char = '+';

/// A recognized chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Roll once, crediting `name`.
    Roll {
        /// Viewer the roll is for.
        name: String,
    },
    /// Roll `count` times.
    RollCount {
        /// Number of rolls, between 1 and the configured maximum.
        count: u32,
    },
}

impl Command {
    /// Number of rolls this command asks for.
    #[must_use]
    pub const fn rolls(&self) -> u32 {
        match self {
            Self::Roll { .. } => 1,
            Self::RollCount { count } => *count,
        }
    }
}

/// Errors for messages that look like commands but cannot be run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// No command with this name.
    #[error("Command not found")]
    NotFound {
        /// The upper-cased command name.
        name: String,
    },

    /// The command needs more arguments.
    #[error("Command signature incomplete")]
    Incomplete {
        /// The upper-cased command name.
        name: String,
    },

    /// An argument was present but unusable.
    #[error("invalid argument {argument:?} for {name}: {reason}")]
    InvalidArgument {
        /// The upper-cased command name.
        name: String,
        /// The rejected argument.
        argument: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Parses chat messages into [`Command`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandParser {
    max_roll_count: u32,
}

impl CommandParser {
    /// Create a parser that caps `+rollcount` at `max_roll_count`.
    #[must_use]
    pub const fn new(max_roll_count: u32) -> Self {
        Self { max_roll_count }
    }

    /// The configured `+rollcount` cap.
    #[must_use]
    pub const fn max_roll_count(&self) -> u32 {
        self.max_roll_count
    }

    /// Parse one chat message.
    ///
    /// Returns `None` when the message is not a command at all, so ordinary
    /// chat passes through silently.
    #[must_use]
    pub fn parse(&self, message: &str) -> Option<Result<Command, CommandError>> {
        if !is_command(message) {
            return None;
        }
        let mut tokens = message
            .strip_prefix(COMMAND_PREFIX)?
            .split_whitespace();
        let name = tokens.next()?.to_ascii_uppercase();
        let arguments: Vec<&str> = tokens.collect();
        Some(self.build(name, &arguments))
    }

    fn build(&self, name: String, arguments: &[&str]) -> Result<Command, CommandError> {
        let arity = match name.as_str() {
            "ROLL" | "ROLLCOUNT" => 1,
            _ => return Err(CommandError::NotFound { name }),
        };
        let Some(&first) = arguments.first().filter(|_| arguments.len() >= arity) else {
            return Err(CommandError::Incomplete { name });
        };

        if name == "ROLL" {
            return Ok(Command::Roll {
                name: first.to_owned(),
            });
        }

        let invalid = |reason: String| CommandError::InvalidArgument {
            name: name.clone(),
            argument: first.to_owned(),
            reason,
        };
        let count = first.parse::<u32>().map_err(|e| invalid(e.to_string()))?;
        if count == 0 || count > self.max_roll_count {
            return Err(invalid(format!(
                "must be between 1 and {}",
                self.max_roll_count
            )));
        }
        Ok(Command::RollCount { count })
    }
}

/// Whether a message has the command shape `+[a-z0-9]...`.
#[must_use]
pub fn is_command(message: &str) -> bool {
    let mut chars = message.chars();
    chars.next() == Some(COMMAND_PREFIX) && chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
}
