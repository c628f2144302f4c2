use std::str::FromStr;

use crate::error::ParseError;

/// A validated request from the command side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start {
        id: u64,
        duration_seconds: u64,
        message: String,
    },
    Change {
        id: u64,
        duration_seconds: u64,
        message: String,
    },
}

impl Command {
    #[must_use]
    pub const fn id(&self) -> u64 {
        match self {
            Self::Start { id, .. } | Self::Change { id, .. } => *id,
        }
    }
}

/// Parses `Start_Alarm(<id>) <seconds> <message>` and `Change_Alarm(<id>) <seconds> <message>`.
impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let bad = || ParseError {
            line: line.to_string(),
        };
        let line = line.trim();
        let (action, rest) = line.split_once(char::is_whitespace).ok_or_else(bad)?;
        let (seconds, message) = rest
            .trim_start()
            .split_once(char::is_whitespace)
            .ok_or_else(bad)?;
        let message = message.trim_start();
        if message.is_empty() {
            return Err(bad());
        }
        let duration_seconds = seconds.parse::<u64>().map_err(|_| bad())?;

        let (keyword, id) = action
            .strip_suffix(')')
            .and_then(|action| action.split_once('('))
            .ok_or_else(bad)?;
        let id = id.parse::<u64>().map_err(|_| bad())?;
        let message = message.to_string();
        match keyword {
            "Start_Alarm" => Ok(Self::Start {
                id,
                duration_seconds,
                message,
            }),
            "Change_Alarm" => Ok(Self::Change {
                id,
                duration_seconds,
                message,
            }),
            _ => Err(bad()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        assert_eq!(
            "Start_Alarm(1) 2 ping pong".parse::<Command>(),
            Ok(Command::Start {
                id: 1,
                duration_seconds: 2,
                message: "ping pong".to_string()
            })
        );
    }

    #[test]
    fn test_parse_change_with_extra_spaces() {
        assert_eq!(
            "  Change_Alarm(42)   7   wake up \n".parse::<Command>(),
            Ok(Command::Change {
                id: 42,
                duration_seconds: 7,
                message: "wake up".to_string()
            })
        );
    }

    #[test]
    fn test_bad_commands() {
        for line in [
            "",
            "Start_Alarm(1) 2",
            "Start_Alarm(1) two ping",
            "Start_Alarm(1) -2 ping",
            "Start_Alarm(-1) 2 ping",
            "Start_Alarm 2 ping",
            "Start_Alarm(1 2 ping",
            "Start_Alarm(x) 2 ping",
            "Stop_Alarm(1) 2 ping",
            "10 hello",
        ] {
            let err = line.parse::<Command>().unwrap_err();
            assert_eq!(err.to_string(), "Bad command", "{line:?}");
        }
    }
}
