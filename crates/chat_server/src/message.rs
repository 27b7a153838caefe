use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    combinator::all_consuming,
};
use std::fmt;
use thiserror::Error;

// Message format:
//
//     message  =  [ ":" prefix SPACE ] command [ params ]
//     prefix   =  1*( any octet except SPACE )
//     command  =  1*( letter / "_" )
//     params   =  *( SPACE middle ) [ ":" trailing ]
//     middle   =  1*( any octet except SPACE and ":" )
//     trailing =  *( any octet )
//
// Lines are LF-terminated on the wire (an optional CR before the LF is
// tolerated and stripped by the transport). Decoding is UTF-8 with
// replacement. The trailing segment starts at the first ":" after the
// prefix and may itself contain ":" and spaces.

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MessageError {
    #[error("empty message")]
    Empty,
    #[error("no command")]
    NoCommand,
    #[error("bad prefix")]
    BadPrefix,
    #[error("bad command: '{0}'")]
    BadCommand(String),
    #[error("{0}: bad number of parameters")]
    BadParamCount(String),
}

/// Declared parameter count of a known command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    fn admits(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

/// Arity of `command`, or `None` for commands unknown to the protocol.
/// Unknown commands parse with any parameter list; what to do with them
/// is a per-state decision.
pub fn arity(command: &str) -> Option<Arity> {
    use Arity::*;

    let arity = match command {
        // client -> server
        "REGISTER" => Exact(2),
        "LOGIN" => Exact(1),
        "PASSWORD" => Exact(1),
        "LOGOUT" => Exact(0),
        "UNREGISTER" => Exact(0),
        "LIST" => Exact(0),
        "ISON" => AtLeast(0),
        "HELP" => Exact(0),
        "CREATE" => AtLeast(2),
        "DELETE" => Exact(1),
        "JOIN" => Exact(1),
        "QUIT" => Exact(1),
        "ADD" => AtLeast(2),
        "KICK" => AtLeast(2),
        "NAMES" => Exact(0),
        "LEAVE" => Exact(0),
        "MSG" => Exact(2),

        // server <-> server
        "CONNECT" => Exact(1),
        "DISCONNECT" => Exact(0),
        "SYNC" => Exact(0),
        "ADDED" => AtLeast(2),
        "KICKED" => AtLeast(2),
        "JOINED" => Exact(2),
        "USR_QUIT" => Exact(2),

        // server -> client
        "RPL_PWD" => Exact(0),
        "OK_REG" => Exact(3),
        "OK_LOGIN" => Exact(1),
        "OK_LOGOUT" => Exact(1),
        "OK_UNREG" => Exact(1),
        "OK_CREATED" => AtLeast(3),
        "OK_DELETED" => Exact(1),
        "OK_JOINED" => Exact(2),
        "OK_LEFT" => Exact(2),
        "OK_QUIT" => Exact(2),
        "OK_ADDED" => AtLeast(2),
        "OK_KICKED" => AtLeast(2),
        "RPL_LIST" => AtLeast(1),
        "RPL_ISON" => AtLeast(0),
        "RPL_NAMES" => AtLeast(1),
        "RPL_HELP" => Exact(1),
        "NOTIFIED" => Exact(3),
        "INFO" => Exact(2),
        "WARN" => Exact(1),
        "CLOSED" => Exact(1),

        // errors
        "ERR_TAKEN" => Exact(2),
        "ERR_CLASH_REG" => Exact(2),
        "ERR_CLASH_LOGIN" => Exact(1),
        "ERR_BAD_PASSWORD" => Exact(1),
        "ERR_NOUSER" => Exact(1),
        "ERR_NOCHANNEL" => Exact(1),
        "ERR_EXISTS" => Exact(1),
        "ERR_BAD_NAME" => Exact(0),
        "ERR_BAD_MODE" => Exact(0),
        "ERR_NO_PERM" => Exact(2),
        "ERR_BAD_OP" => Exact(1),
        "ERR_INTERNAL" => Exact(1),
        "ERR_NUM_PARAMS" => Exact(0),

        _ => return None,
    };
    Some(arity)
}

// command = 1*( letter / "_" )
fn command_parser(input: &str) -> IResult<&str, &str> {
    all_consuming(take_while1(|c: char| c.is_ascii_alphabetic() || c == '_')).parse(input)
}

/// A parsed wire message.
///
/// If [`Message::parse`] succeeds the message is well-formed: the command
/// matches the command grammar and, for known commands, the parameter
/// count matches the declared arity.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl Message {
    pub fn new<C, P>(command: C, params: P) -> Self
    where
        C: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Message {
            prefix: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_prefix<S, C, P>(prefix: S, command: C, params: P) -> Self
    where
        S: Into<String>,
        C: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Message {
            prefix: Some(prefix.into()),
            ..Message::new(command, params)
        }
    }

    pub fn parse(line: &str) -> Result<Message, MessageError> {
        if line.is_empty() {
            return Err(MessageError::Empty);
        }

        let (prefix, rest) = match line.strip_prefix(':') {
            Some(stripped) => {
                let (prefix, rest) = stripped.split_once(' ').ok_or(MessageError::NoCommand)?;
                if prefix.is_empty() {
                    return Err(MessageError::BadPrefix);
                }
                (Some(prefix.to_owned()), rest)
            }
            None => (None, line),
        };

        let (leading, trailing) = match rest.split_once(':') {
            Some((leading, trailing)) => (leading, Some(trailing)),
            None => (rest, None),
        };

        let mut words = leading.split_whitespace();
        let command = words.next().ok_or(MessageError::NoCommand)?;
        if command_parser(command).is_err() {
            return Err(MessageError::BadCommand(command.to_owned()));
        }

        let mut params: Vec<String> = words.map(str::to_owned).collect();
        match trailing {
            Some(t) if !t.is_empty() => params.push(t.to_owned()),
            _ => {}
        }

        if let Some(arity) = arity(command) {
            if !arity.admits(params.len()) {
                return Err(MessageError::BadParamCount(command.to_owned()));
            }
        }

        Ok(Message {
            prefix,
            command: command.to_owned(),
            params,
        })
    }
}

// A last parameter containing a space or ":" (or empty) must go out as a
// trailing segment, otherwise it would not survive a re-parse.
fn needs_trailing(param: &str) -> bool {
    param.is_empty() || param.contains(' ') || param.contains(':')
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        write!(f, "{}", self.command)?;
        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {param}")?;
            }
            if needs_trailing(last) {
                write!(f, " :{last}")?;
            } else {
                write!(f, " {last}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_params() {
        let msg = Message::parse("REGISTER alice a@x").unwrap();
        assert_eq!(msg.prefix, None);
        assert_eq!(msg.command, "REGISTER");
        assert_eq!(msg.params, vec!["alice", "a@x"]);
    }

    #[test]
    fn parses_prefix_and_trailing() {
        let msg = Message::parse(":alice MSG #lounge :hi there").unwrap();
        assert_eq!(msg.prefix.as_deref(), Some("alice"));
        assert_eq!(msg.command, "MSG");
        assert_eq!(msg.params, vec!["#lounge", "hi there"]);
    }

    #[test]
    fn trailing_may_contain_colons_and_spaces() {
        let msg = Message::parse("MSG #lounge :see: this one").unwrap();
        assert_eq!(msg.params, vec!["#lounge", "see: this one"]);
    }

    #[test]
    fn empty_trailing_is_not_a_parameter() {
        // "MSG #c :" would otherwise smuggle an empty second parameter
        assert_eq!(
            Message::parse("MSG #c :"),
            Err(MessageError::BadParamCount("MSG".to_owned()))
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        let cases = [
            ("", MessageError::Empty),
            ("   ", MessageError::NoCommand),
            (":prefix", MessageError::NoCommand),
            (": LOGIN alice", MessageError::BadPrefix),
            ("L0GIN alice", MessageError::BadCommand("L0GIN".to_owned())),
            ("123 x", MessageError::BadCommand("123".to_owned())),
        ];

        for (line, expected) in cases {
            assert_eq!(Message::parse(line), Err(expected), "line: {line:?}");
        }
    }

    #[test]
    fn enforces_declared_arity() {
        let cases = [
            "REGISTER alice",
            "REGISTER alice a@x extra",
            "LOGIN",
            "PASSWORD",
            "CREATE #chan",
            "ADD #chan",
            "LOGOUT spurious",
        ];

        for line in cases {
            match Message::parse(line) {
                Err(MessageError::BadParamCount(_)) => {}
                other => panic!("expected arity error for {line:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_commands_take_any_params() {
        let msg = Message::parse("FROBNICATE a b c").unwrap();
        assert_eq!(msg.command, "FROBNICATE");
        assert_eq!(msg.params.len(), 3);
    }

    #[test]
    fn serializes_with_trailing_marker() {
        let msg = Message::with_prefix("alice", "MSG", ["#lounge", "hi there"]);
        assert_eq!(msg.to_string(), ":alice MSG #lounge :hi there");

        let msg = Message::new("CLOSED", ["Too many password retries."]);
        assert_eq!(msg.to_string(), "CLOSED :Too many password retries.");
    }

    #[test]
    fn roundtrips() {
        let cases = [
            Message::new("RPL_PWD", Vec::<String>::new()),
            Message::new("OK_REG", ["alice", "a@x", "s3cr3t"]),
            Message::with_prefix("alice", "MSG", ["#lounge", "hi there"]),
            Message::with_prefix("bob", "MSG", ["#lounge", "hi"]),
            Message::new("MSG", ["#lounge", "with: colon"]),
            Message::new("ISON", ["a", "b", "c"]),
        ];

        for msg in cases {
            let reparsed = Message::parse(&msg.to_string()).unwrap();
            assert_eq!(reparsed, msg, "line: {}", msg.to_string());
        }
    }
}
