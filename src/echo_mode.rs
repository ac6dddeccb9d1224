use std::fmt;

use clap::ValueEnum;

/// EchoMode selects which side produces the payload during the exchange.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, serde::Serialize)]
pub enum EchoMode {
    /// Client sends the payload and reads back whatever the peer echoes.
    #[default]
    #[value(name = "echo")]
    #[serde(rename = "echo")]
    Bidirectional,
    /// Peer generates the payload after accepting the requested size.
    #[value(name = "remote")]
    #[serde(rename = "remote")]
    RemoteGenerated,
}

impl EchoMode {
    /// Whether the client writes the payload itself.
    pub fn writes_payload(&self) -> bool {
        matches!(self, EchoMode::Bidirectional)
    }
}

impl fmt::Display for EchoMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            EchoMode::Bidirectional => write!(f, "echo"),
            EchoMode::RemoteGenerated => write!(f, "remote"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_mode_parsing() {
        assert_eq!(
            EchoMode::from_str("echo", false).unwrap(),
            EchoMode::Bidirectional
        );
        assert_eq!(
            EchoMode::from_str("remote", false).unwrap(),
            EchoMode::RemoteGenerated
        );
        assert!(EchoMode::from_str("both", false).is_err());
        assert!(EchoMode::from_str("", false).is_err());
    }

    #[test]
    fn test_echo_mode_display_roundtrip() {
        for mode in [EchoMode::Bidirectional, EchoMode::RemoteGenerated] {
            assert_eq!(EchoMode::from_str(&mode.to_string(), false).unwrap(), mode);
        }
    }

    #[test]
    fn test_writes_payload() {
        assert!(EchoMode::Bidirectional.writes_payload());
        assert!(!EchoMode::RemoteGenerated.writes_payload());
    }
}
