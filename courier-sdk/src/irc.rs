//! IRC message types — the wire codec for the client engine.
//! This is a minimal parser/formatter for RFC 1459 protocol lines.

use std::fmt;

/// A parsed IRC message.
///
/// If a trailing argument is present it is also mirrored as the last element
/// of `params`, so `params.last()` always yields the final argument whether
/// or not it was colon-prefixed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Origin of the message, reduced to the sender's nickname.
    pub prefix: Option<String>,
    /// Command verb (uppercased) or three-digit numeric reply.
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl Message {
    /// Parse a raw IRC line with CR/LF already stripped.
    ///
    /// Returns `None` for lines that do not form a message; the engine
    /// treats that as a protocol violation.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let mut rest = line;

        // Parse prefix: :server or :nick!user@host
        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let end = stripped.find(' ')?;
            rest = stripped[end + 1..].trim_start();
            Some(parse_sender(&stripped[..end]))
        } else {
            None
        };

        // The first " :" splits the middle section from the trailing.
        let (middle, trailing) = match rest.find(" :") {
            Some(i) => (&rest[..i], Some(rest[i + 2..].to_string())),
            None => (rest, None),
        };
        let trailing = trailing.filter(|t| !t.is_empty());

        let mut tokens = middle.split_whitespace();
        let command = tokens.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = tokens.map(str::to_string).collect();
        if let Some(ref t) = trailing {
            params.push(t.clone());
        }

        Some(Message {
            prefix,
            command,
            params,
            trailing,
        })
    }

    /// Positional parameter accessor.
    pub fn param(&self, i: usize) -> Option<&str> {
        self.params.get(i).map(String::as_str)
    }

    /// The conceptual last argument (the trailing, if one was present).
    pub fn last_param(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        for (i, param) in self.params.iter().enumerate() {
            if i == self.params.len() - 1
                && (self.trailing.is_some()
                    || param.contains(' ')
                    || param.starts_with(':')
                    || param.is_empty())
            {
                write!(f, " :{param}")?;
            } else {
                write!(f, " {param}")?;
            }
        }
        Ok(())
    }
}

/// Reduce a message prefix to the sender's nickname: everything before the
/// first `!`, or the whole prefix for server origins.
fn parse_sender(prefix: &str) -> String {
    match prefix.find('!') {
        Some(i) => prefix[..i].to_string(),
        None => prefix.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple() {
        let msg = Message::parse("NICK alice").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "NICK");
        assert_eq!(msg.params, vec!["alice"]);
        assert_eq!(msg.trailing, None);
    }

    #[test]
    fn parse_privmsg_with_prefix() {
        let msg = Message::parse(":nick!user@host PRIVMSG #chan :hello world").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("nick"));
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#chan", "hello world"]);
        assert_eq!(msg.trailing.as_deref(), Some("hello world"));
    }

    #[test]
    fn parse_ping() {
        let msg = Message::parse("PING :server.example").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.trailing.as_deref(), Some("server.example"));
        assert_eq!(msg.last_param(), Some("server.example"));
    }

    #[test]
    fn parse_server_prefix_kept_whole() {
        let msg = Message::parse(":irc.example 001 alice :Welcome").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("irc.example"));
        assert_eq!(msg.command, "001");
        assert_eq!(msg.params, vec!["alice", "Welcome"]);
    }

    #[test]
    fn parse_command_only() {
        let msg = Message::parse("QUIT").unwrap();
        assert_eq!(msg.command, "QUIT");
        assert!(msg.params.is_empty());
    }

    #[test]
    fn parse_lowercase_command_uppercased() {
        let msg = Message::parse("privmsg #chan :hi").unwrap();
        assert_eq!(msg.command, "PRIVMSG");
    }

    #[test]
    fn parse_rejects_empty_and_garbage() {
        assert!(Message::parse("").is_none());
        assert!(Message::parse("   ").is_none());
        // A colon-prefixed line with no command is not a message.
        assert!(Message::parse(":orphan").is_none());
    }

    #[test]
    fn last_param_law() {
        let msg = Message::parse(":s 005 nick CHANTYPES=# :are supported").unwrap();
        assert_eq!(msg.last_param(), msg.trailing.as_deref());
    }

    #[test]
    fn trailing_mirrored_into_params() {
        let msg = Message::parse("TOPIC #chan :new topic here").unwrap();
        assert_eq!(msg.params.last().map(String::as_str), Some("new topic here"));
    }

    #[test]
    fn round_trip() {
        for line in [
            ":nick PRIVMSG #chan :hello world",
            "PING :server.example",
            "JOIN #a,#b",
            ":irc.example 001 alice :Welcome to IRC",
            "MODE #chan +o alice",
        ] {
            let msg = Message::parse(line).unwrap();
            assert_eq!(msg.to_string(), line);
        }
    }

    #[test]
    fn redundant_trailing_normalized() {
        // ":word" trailing with no spaces serializes back with the colon
        // because the parse recorded an explicit trailing.
        let msg = Message::parse("PART #chan :bye").unwrap();
        assert_eq!(msg.to_string(), "PART #chan :bye");
        // An empty trailing is treated as absent.
        let msg = Message::parse("TOPIC #chan :").unwrap();
        assert_eq!(msg.trailing, None);
        assert_eq!(msg.to_string(), "TOPIC #chan");
    }
}
