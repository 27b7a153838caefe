//! Typed views of inbound wire messages.
//!
//! The codec already guarantees arity for known commands, so these
//! conversions only destructure. A `None` means "not a command of this
//! peer class" and falls through to the state's unknown policy.

use crate::message::Message;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    Register { nick: String, mail: String },
    Login { nick: String },
    Password { password: String },
    Logout,
    Unregister,
    List,
    IsOn { nicks: Vec<String> },
    Help,
    // mode kept raw: an unknown mode answers ERR_BAD_MODE, not a parse error
    Create { channel: String, mode: String, members: Vec<String> },
    Delete { channel: String },
    Join { channel: String },
    Quit { channel: String },
    Add { channel: String, nicks: Vec<String> },
    Kick { channel: String, nicks: Vec<String> },
    Names,
    Leave,
    Msg { channel: String, content: String },
}

impl ClientCommand {
    pub fn from_message(msg: &Message) -> Option<Self> {
        let params = &msg.params;
        let command = match msg.command.as_str() {
            "REGISTER" => ClientCommand::Register {
                nick: params[0].clone(),
                mail: params[1].clone(),
            },
            "LOGIN" => ClientCommand::Login {
                nick: params[0].clone(),
            },
            "PASSWORD" => ClientCommand::Password {
                password: params[0].clone(),
            },
            "LOGOUT" => ClientCommand::Logout,
            "UNREGISTER" => ClientCommand::Unregister,
            "LIST" => ClientCommand::List,
            "ISON" => ClientCommand::IsOn {
                nicks: params.clone(),
            },
            "HELP" => ClientCommand::Help,
            "CREATE" => ClientCommand::Create {
                channel: params[0].clone(),
                mode: params[1].clone(),
                members: params[2..].to_vec(),
            },
            "DELETE" => ClientCommand::Delete {
                channel: params[0].clone(),
            },
            "JOIN" => ClientCommand::Join {
                channel: params[0].clone(),
            },
            "QUIT" => ClientCommand::Quit {
                channel: params[0].clone(),
            },
            "ADD" => ClientCommand::Add {
                channel: params[0].clone(),
                nicks: params[1..].to_vec(),
            },
            "KICK" => ClientCommand::Kick {
                channel: params[0].clone(),
                nicks: params[1..].to_vec(),
            },
            "NAMES" => ClientCommand::Names,
            "LEAVE" => ClientCommand::Leave,
            "MSG" => ClientCommand::Msg {
                channel: params[0].clone(),
                content: params[1].clone(),
            },
            _ => return None,
        };
        Some(command)
    }

    /// The wire name, for logs and error replies.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Register { .. } => "REGISTER",
            ClientCommand::Login { .. } => "LOGIN",
            ClientCommand::Password { .. } => "PASSWORD",
            ClientCommand::Logout => "LOGOUT",
            ClientCommand::Unregister => "UNREGISTER",
            ClientCommand::List => "LIST",
            ClientCommand::IsOn { .. } => "ISON",
            ClientCommand::Help => "HELP",
            ClientCommand::Create { .. } => "CREATE",
            ClientCommand::Delete { .. } => "DELETE",
            ClientCommand::Join { .. } => "JOIN",
            ClientCommand::Quit { .. } => "QUIT",
            ClientCommand::Add { .. } => "ADD",
            ClientCommand::Kick { .. } => "KICK",
            ClientCommand::Names => "NAMES",
            ClientCommand::Leave => "LEAVE",
            ClientCommand::Msg { .. } => "MSG",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerCommand {
    Connect { password: String },
    Disconnect,
    Sync,
}

impl ServerCommand {
    pub fn from_message(msg: &Message) -> Option<Self> {
        let command = match msg.command.as_str() {
            "CONNECT" => ServerCommand::Connect {
                password: msg.params[0].clone(),
            },
            "DISCONNECT" => ServerCommand::Disconnect,
            "SYNC" => ServerCommand::Sync,
            _ => return None,
        };
        Some(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Message {
        Message::parse(line).unwrap()
    }

    #[test]
    fn maps_client_commands() {
        let cases = [
            (
                "REGISTER alice a@x",
                ClientCommand::Register {
                    nick: "alice".to_owned(),
                    mail: "a@x".to_owned(),
                },
            ),
            (
                "CREATE #vip priv bob carol",
                ClientCommand::Create {
                    channel: "#vip".to_owned(),
                    mode: "priv".to_owned(),
                    members: vec!["bob".to_owned(), "carol".to_owned()],
                },
            ),
            (
                "KICK #lounge bob",
                ClientCommand::Kick {
                    channel: "#lounge".to_owned(),
                    nicks: vec!["bob".to_owned()],
                },
            ),
            (
                "MSG #lounge :hi there",
                ClientCommand::Msg {
                    channel: "#lounge".to_owned(),
                    content: "hi there".to_owned(),
                },
            ),
            ("ISON", ClientCommand::IsOn { nicks: vec![] }),
        ];

        for (line, expected) in cases {
            assert_eq!(
                ClientCommand::from_message(&parse(line)).unwrap(),
                expected,
                "line: {line:?}"
            );
        }
    }

    #[test]
    fn server_events_are_not_client_commands() {
        for line in ["CONNECT hunter2", "OK_LOGIN alice", "SYNC"] {
            assert_eq!(ClientCommand::from_message(&parse(line)), None);
        }
    }

    #[test]
    fn maps_server_commands() {
        assert_eq!(
            ServerCommand::from_message(&parse("CONNECT hunter2")),
            Some(ServerCommand::Connect {
                password: "hunter2".to_owned()
            })
        );
        assert_eq!(
            ServerCommand::from_message(&parse("DISCONNECT")),
            Some(ServerCommand::Disconnect)
        );
    }
}
