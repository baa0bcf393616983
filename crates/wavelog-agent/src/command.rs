//! Textual control commands accepted by a node.

use crate::error::NodeError;
use std::fmt;
use std::str::FromStr;

/// Command sent to a running [`LogNode`](crate::LogNode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeCommand {
    /// Join the configured groups and start the election
    Start,
    /// Leave every group
    Stop,
    /// Log protocol steps and extra records
    Verbose,
    /// Dump the time-space trace on termination
    DumpTimeSpace,
    /// Send a bakery message to a random peer; `owner` defaults to this node
    SendRandom {
        /// Payload
        content: String,
        /// Node the message is about
        owner: Option<String>,
    },
    /// Stop the node loop
    Terminate,
}

impl FromStr for NodeCommand {
    type Err = NodeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["START"] => Ok(Self::Start),
            ["STOP"] => Ok(Self::Stop),
            ["VERBOSE"] => Ok(Self::Verbose),
            ["DUMP", "TS"] => Ok(Self::DumpTimeSpace),
            ["$TERM"] => Ok(Self::Terminate),
            ["SEND", "RANDOM", content] => Ok(Self::SendRandom {
                content: (*content).to_string(),
                owner: None,
            }),
            ["SEND", "RANDOM", content, owner] => Ok(Self::SendRandom {
                content: (*content).to_string(),
                owner: Some((*owner).to_string()),
            }),
            _ => Err(NodeError::unknown_command(line)),
        }
    }
}

impl fmt::Display for NodeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("START"),
            Self::Stop => f.write_str("STOP"),
            Self::Verbose => f.write_str("VERBOSE"),
            Self::DumpTimeSpace => f.write_str("DUMP TS"),
            Self::Terminate => f.write_str("$TERM"),
            Self::SendRandom {
                content,
                owner: None,
            } => write!(f, "SEND RANDOM {content}"),
            Self::SendRandom {
                content,
                owner: Some(owner),
            } => write!(f, "SEND RANDOM {content} {owner}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_commands() {
        assert_eq!("START".parse::<NodeCommand>().unwrap(), NodeCommand::Start);
        assert_eq!(
            "DUMP TS".parse::<NodeCommand>().unwrap(),
            NodeCommand::DumpTimeSpace
        );
        assert_eq!(
            "SEND RANDOM BAKED 4F2A".parse::<NodeCommand>().unwrap(),
            NodeCommand::SendRandom {
                content: "BAKED".into(),
                owner: Some("4F2A".into())
            }
        );
    }

    #[test]
    fn test_display_parses_back() {
        for command in [
            NodeCommand::Start,
            NodeCommand::Terminate,
            NodeCommand::SendRandom {
                content: "STIRRED".into(),
                owner: None,
            },
        ] {
            assert_eq!(command.to_string().parse::<NodeCommand>().unwrap(), command);
        }
    }

    #[test]
    fn test_unknown_command() {
        let err = "JUMP".parse::<NodeCommand>().unwrap_err();
        assert_matches!(err, NodeError::UnknownCommand(ref line) if line == "JUMP");
        assert_eq!(err.code(), 600);
        assert!("SEND RANDOM".parse::<NodeCommand>().is_err());
        assert!("start".parse::<NodeCommand>().is_err());
    }
}
