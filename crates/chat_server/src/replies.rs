//! Wire lines the server sends to its clients.
//!
//! Every reply knows how to format itself as one protocol line; the
//! transport appends the LF.

use crate::db::ChannelMode;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Reply<'a> {
    // Registration / login
    Pwd,
    Registered {
        nick: &'a str,
        mail: &'a str,
        password: &'a str,
    },
    Taken {
        what: &'a str, // "nick" or "mail"
        value: &'a str,
    },
    RegClash {
        what: &'a str,
        value: &'a str,
    },
    LoggedIn {
        nick: &'a str,
    },
    LoginClash {
        nick: &'a str,
    },
    WrongPassword {
        remaining: u8,
    },
    LoggedOut {
        nick: &'a str,
    },
    Unregistered {
        nick: &'a str,
    },

    // Queries
    List {
        mode: ChannelMode,
        channels: &'a [String],
    },
    IsOn {
        nicks: &'a [String],
    },
    Names {
        channel: &'a str,
        nicks: &'a [String],
    },
    Help {
        text: &'a str,
    },

    // Channel lifecycle and membership
    Created {
        channel: &'a str,
        creator: &'a str,
        mode: ChannelMode,
        members: &'a [String],
    },
    Deleted {
        channel: &'a str,
    },
    Joined {
        channel: &'a str,
        nick: &'a str,
    },
    Left {
        channel: &'a str,
        nick: &'a str,
    },
    Quit {
        channel: &'a str,
        nick: &'a str,
    },
    Added {
        channel: &'a str,
        nicks: &'a [String],
    },
    Kicked {
        channel: &'a str,
        nicks: &'a [String],
    },

    // Conversation traffic
    ChannelMsg {
        author: &'a str,
        channel: &'a str,
        content: &'a str,
    },
    Notified {
        author: &'a str,
        target: &'a str,
        content: &'a str,
    },
    Info {
        text: &'a str,
    },
    Warn {
        text: &'a str,
    },
    Closed {
        text: &'a str,
    },

    // Errors
    NoUser {
        nick: &'a str,
    },
    NoChannel {
        channel: &'a str,
    },
    Exists {
        channel: &'a str,
    },
    BadName,
    BadMode,
    NoPerm {
        op: &'a str,
        reason: &'a str,
    },
    BadOp {
        op: &'a str,
    },
    Internal {
        reason: &'a str,
    },
    NumParams,
}

impl<'a> Reply<'a> {
    pub fn format(&self) -> String {
        match self {
            Reply::Pwd => "RPL_PWD".to_owned(),
            Reply::Registered {
                nick,
                mail,
                password,
            } => format!("OK_REG {nick} {mail} {password}"),
            Reply::Taken { what, value } => format!("ERR_TAKEN {what} {value}"),
            Reply::RegClash { what, value } => format!("ERR_CLASH_REG {what} {value}"),
            Reply::LoggedIn { nick } => format!("OK_LOGIN {nick}"),
            Reply::LoginClash { nick } => format!("ERR_CLASH_LOGIN {nick}"),
            Reply::WrongPassword { remaining } => format!("ERR_BAD_PASSWORD {remaining}"),
            Reply::LoggedOut { nick } => format!("OK_LOGOUT {nick}"),
            Reply::Unregistered { nick } => format!("OK_UNREG {nick}"),

            Reply::List { mode, channels } => {
                format!("RPL_LIST {mode} {}", channels.join(" ")).trim_end().to_owned()
            }
            Reply::IsOn { nicks } => format!("RPL_ISON {}", nicks.join(" ")).trim_end().to_owned(),
            Reply::Names { channel, nicks } => {
                format!("RPL_NAMES {channel} {}", nicks.join(" ")).trim_end().to_owned()
            }
            Reply::Help { text } => format!("RPL_HELP :{text}"),

            Reply::Created {
                channel,
                creator,
                mode,
                members,
            } => format!("OK_CREATED {channel} {creator} {mode} {}", members.join(" "))
                .trim_end()
                .to_owned(),
            Reply::Deleted { channel } => format!("OK_DELETED {channel}"),
            Reply::Joined { channel, nick } => format!("OK_JOINED {channel} {nick}"),
            Reply::Left { channel, nick } => format!("OK_LEFT {channel} {nick}"),
            Reply::Quit { channel, nick } => format!("OK_QUIT {channel} {nick}"),
            Reply::Added { channel, nicks } => {
                format!("OK_ADDED {channel} {}", nicks.join(" "))
            }
            Reply::Kicked { channel, nicks } => {
                format!("OK_KICKED {channel} {}", nicks.join(" "))
            }

            Reply::ChannelMsg {
                author,
                channel,
                content,
            } => format!(":{author} MSG {channel} :{content}"),
            Reply::Notified {
                author,
                target,
                content,
            } => format!("NOTIFIED {author} {target} :{content}"),
            Reply::Info { text } => format!("INFO MSG :{text}"),
            Reply::Warn { text } => format!("WARN :{text}"),
            Reply::Closed { text } => format!("CLOSED :{text}"),

            Reply::NoUser { nick } => format!("ERR_NOUSER {nick}"),
            Reply::NoChannel { channel } => format!("ERR_NOCHANNEL {channel}"),
            Reply::Exists { channel } => format!("ERR_EXISTS {channel}"),
            Reply::BadName => "ERR_BAD_NAME".to_owned(),
            Reply::BadMode => "ERR_BAD_MODE".to_owned(),
            Reply::NoPerm { op, reason } => format!("ERR_NO_PERM {op} :{reason}"),
            Reply::BadOp { op } => format!("ERR_BAD_OP :{op}"),
            Reply::Internal { reason } => format!("ERR_INTERNAL :{reason}"),
            Reply::NumParams => "ERR_NUM_PARAMS".to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn formats_registration_replies() {
        let cases = [
            (Reply::Pwd, "RPL_PWD"),
            (
                Reply::Registered {
                    nick: "alice",
                    mail: "a@x",
                    password: "s3cr3t",
                },
                "OK_REG alice a@x s3cr3t",
            ),
            (
                Reply::Taken {
                    what: "mail",
                    value: "a@x",
                },
                "ERR_TAKEN mail a@x",
            ),
            (Reply::WrongPassword { remaining: 2 }, "ERR_BAD_PASSWORD 2"),
            (
                Reply::Closed {
                    text: "Too many password retries.",
                },
                "CLOSED :Too many password retries.",
            ),
        ];

        for (reply, expected) in cases {
            assert_eq!(reply.format(), expected);
        }
    }

    #[test]
    fn formats_channel_replies() {
        let members = vec!["alice".to_owned(), "bob".to_owned()];
        let kicked = vec!["bob".to_owned()];
        let cases = [
            (
                Reply::Created {
                    channel: "#vip",
                    creator: "alice",
                    mode: ChannelMode::Private,
                    members: &members,
                },
                "OK_CREATED #vip alice priv alice bob",
            ),
            (
                Reply::Names {
                    channel: "#vip",
                    nicks: &members,
                },
                "RPL_NAMES #vip alice bob",
            ),
            (
                Reply::Kicked {
                    channel: "#lounge",
                    nicks: &kicked,
                },
                "OK_KICKED #lounge bob",
            ),
            (
                Reply::Notified {
                    author: "alice",
                    target: "carol",
                    content: "You were added to channel #vip!",
                },
                "NOTIFIED alice carol :You were added to channel #vip!",
            ),
        ];

        for (reply, expected) in cases {
            assert_eq!(reply.format(), expected);
        }
    }

    #[test]
    fn replies_parse_back_as_messages() {
        let replies = [
            Reply::Pwd,
            Reply::LoggedIn { nick: "alice" },
            Reply::ChannelMsg {
                author: "alice",
                channel: "#lounge",
                content: "hi",
            },
            Reply::NoPerm {
                op: "DELETE",
                reason: "Only the creator may delete a channel.",
            },
            Reply::Internal {
                reason: "DB error, please try again.",
            },
        ];

        for reply in replies {
            let line = reply.format();
            Message::parse(&line).unwrap_or_else(|e| panic!("{line:?}: {e}"));
        }
    }
}
