//! Per-connection state machine for an end-user client.
//!
//! A client walks Initial -> Registering | LoggingIn -> LoggedIn <->
//! Conversation, with a terminal Closed. Each state accepts a disjoint
//! command set; anything else hits that state's unknown policy (close,
//! warn-then-close, or ignore). The peer task owns the state and selects
//! over socket messages and dispatcher events, so transitions stay
//! serialized per peer.

use log::{debug, error, info, warn};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::ai::AiConnector;
use crate::commands::ClientCommand;
use crate::connection::Connection;
use crate::db::{ChannelMode, Db, DbError};
use crate::dispatcher::{ClientHandle, Dispatcher, PeerId, SERVERS, next_peer_id};
use crate::message::Message;
use crate::replies::Reply;

const PASSWORD_RETRIES: u8 = 3;
const EVENT_CHANNEL_SIZE: usize = 32;

// A slow store must not block login completion.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const DB_ERROR_TEXT: &str = "DB error, please try again.";

const HELP_LOGGED_IN: &str =
    "Available commands: LOGOUT UNREGISTER LIST ISON HELP CREATE DELETE JOIN QUIT ADD KICK";
const HELP_CONVERSATION: &str = "Available commands: NAMES MSG HELP LEAVE QUIT ADD KICK DELETE";

#[derive(Debug)]
enum ClientState {
    Initial,
    // The pending PASSWORD continuation is the state itself: dropping the
    // peer task cancels it with no deferred store effects.
    Registering { nick: String, mail: String, warns: u8 },
    LoggingIn { nick: String, retries: u8, warns: u8 },
    LoggedIn,
    Conversation { channel: String },
    Closed,
}

pub struct ClientPeer {
    id: PeerId,
    db: Db,
    dispatcher: Arc<Dispatcher>,
    ai: AiConnector,
    conn: Connection,
    events_tx: mpsc::Sender<Message>,
    events_rx: mpsc::Receiver<Message>,
    nick: Option<String>,
    state: ClientState,
}

impl ClientPeer {
    pub fn new(db: Db, dispatcher: Arc<Dispatcher>, ai: AiConnector, conn: Connection) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        ClientPeer {
            id: next_peer_id(),
            db,
            dispatcher,
            ai,
            conn,
            events_tx,
            events_rx,
            nick: None,
            state: ClientState::Initial,
        }
    }

    /// Drives the connection until it closes. `first` is the opening
    /// message the listener demultiplexed on.
    pub async fn run(mut self, first: Message) {
        self.handle_message(first).await;

        while !matches!(self.state, ClientState::Closed) {
            tokio::select! {
                inbound = self.conn.messages.recv() => match inbound {
                    Some(msg) => self.handle_message(msg).await,
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
            }
        }

        if let Some(nick) = &self.nick {
            self.dispatcher.remove_client(nick, self.id);
        }
        self.conn.close();
        info!("[{}] client peer finished", self.id);
    }

    fn nick(&self) -> String {
        self.nick.clone().unwrap_or_default()
    }

    /// Sends CLOSED and enters the terminal state; the run loop tears the
    /// sockets down.
    async fn close(&mut self, text: &str) {
        self.conn.out.send(Reply::Closed { text }).await;
        self.state = ClientState::Closed;
    }

    async fn internal_error(&mut self, e: DbError) {
        error!("[{}] store failure: {e}", self.id);
        self.conn
            .out
            .send(Reply::Internal {
                reason: DB_ERROR_TEXT,
            })
            .await;
    }

    async fn broadcast(&self, msg: Message) {
        self.dispatcher.publish(SERVERS, self.id, &msg).await;
    }

    async fn handle_message(&mut self, msg: Message) {
        info!("[{}] >> {msg}", self.id);
        let command = ClientCommand::from_message(&msg);
        match &self.state {
            ClientState::Initial => self.handle_initial(command).await,
            ClientState::Registering { .. } => self.handle_registering(command).await,
            ClientState::LoggingIn { .. } => self.handle_logging_in(command).await,
            ClientState::LoggedIn => self.handle_logged_in(command).await,
            ClientState::Conversation { .. } => self.handle_conversation(command).await,
            ClientState::Closed => {}
        }
    }

    // --- Initial ---------------------------------------------------------

    async fn handle_initial(&mut self, command: Option<ClientCommand>) {
        match command {
            Some(ClientCommand::Register { nick, mail }) => self.register(nick, mail).await,
            Some(ClientCommand::Login { nick }) => self.login(nick).await,
            _ => self.close("Incorrect opening message.").await,
        }
    }

    // REGISTER <nick> <mail>
    //
    // Checks availability, then parks waiting for a PASSWORD. The account
    // is only created once the password arrives.
    async fn register(&mut self, nick: String, mail: String) {
        match self.db.account_available(&nick, &mail).await {
            Ok((true, true)) => {
                self.conn.out.send(Reply::Pwd).await;
                self.state = ClientState::Registering {
                    nick,
                    mail,
                    warns: PASSWORD_RETRIES,
                };
            }
            Ok((_, false)) => {
                self.conn
                    .out
                    .send(Reply::Taken {
                        what: "mail",
                        value: &mail,
                    })
                    .await;
            }
            Ok((false, true)) => {
                self.conn
                    .out
                    .send(Reply::Taken {
                        what: "nick",
                        value: &nick,
                    })
                    .await;
            }
            Err(e) => self.internal_error(e).await,
        }
    }

    // LOGIN <nick>
    async fn login(&mut self, nick: String) {
        match self.db.users_registered(std::slice::from_ref(&nick)).await {
            Ok(registered) if registered.contains(&nick) => {
                self.conn.out.send(Reply::Pwd).await;
                self.state = ClientState::LoggingIn {
                    nick,
                    retries: PASSWORD_RETRIES,
                    warns: PASSWORD_RETRIES,
                };
            }
            Ok(_) => {
                self.conn.out.send(Reply::NoUser { nick: &nick }).await;
            }
            Err(e) => self.internal_error(e).await,
        }
    }

    // --- Registering / LoggingIn -----------------------------------------

    async fn handle_registering(&mut self, command: Option<ClientCommand>) {
        let Some(ClientCommand::Password { password }) = command else {
            self.expect_password().await;
            return;
        };
        let ClientState::Registering { nick, mail, .. } = &self.state else {
            return;
        };
        let (nick, mail) = (nick.clone(), mail.clone());

        match self.db.add_user(&nick, &mail, &password).await {
            Ok(()) => {
                self.conn
                    .out
                    .send(Reply::Registered {
                        nick: &nick,
                        mail: &mail,
                        password: &password,
                    })
                    .await;
                self.broadcast(Message::new(
                    "OK_REG",
                    [nick.clone(), mail.clone(), password.clone()],
                ))
                .await;
                self.enter_logged_in(nick).await;
            }
            Err(DbError::Duplicate { field }) => {
                // Someone took the nick or mail between the availability
                // check and the insert.
                let value = if field == "mail" { &mail } else { &nick };
                self.conn
                    .out
                    .send(Reply::RegClash { what: field, value })
                    .await;
                self.state = ClientState::Initial;
            }
            Err(e) => {
                self.internal_error(e).await;
                self.state = ClientState::Initial;
            }
        }
    }

    async fn handle_logging_in(&mut self, command: Option<ClientCommand>) {
        let Some(ClientCommand::Password { password }) = command else {
            self.expect_password().await;
            return;
        };
        let ClientState::LoggingIn { nick, .. } = &self.state else {
            return;
        };
        let nick = nick.clone();

        match self.db.password_correct(&nick, &password).await {
            Ok(true) => self.enter_logged_in(nick).await,
            Ok(false) => {
                let remaining = match &mut self.state {
                    ClientState::LoggingIn { retries, .. } => {
                        *retries -= 1;
                        *retries
                    }
                    _ => return,
                };
                if remaining > 0 {
                    self.conn
                        .out
                        .send(Reply::WrongPassword { remaining })
                        .await;
                } else {
                    self.close("Too many password retries.").await;
                }
            }
            Err(e) => self.internal_error(e).await,
        }
    }

    // Anything but PASSWORD while a password is pending: warn a few
    // times, then give up on the peer.
    async fn expect_password(&mut self) {
        let out_of_warns = match &mut self.state {
            ClientState::Registering { warns, .. } | ClientState::LoggingIn { warns, .. } => {
                if *warns > 0 {
                    *warns -= 1;
                    false
                } else {
                    true
                }
            }
            _ => return,
        };
        if out_of_warns {
            self.close("Password message expected.").await;
        } else {
            self.conn
                .out
                .send(Reply::Warn {
                    text: "Provide password.",
                })
                .await;
        }
    }

    // --- LoggedIn entry ---------------------------------------------------

    async fn enter_logged_in(&mut self, nick: String) {
        let handle = ClientHandle {
            id: self.id,
            events: self.events_tx.clone(),
        };
        if !self.dispatcher.add_client(&nick, handle) {
            self.conn.out.send(Reply::LoginClash { nick: &nick }).await;
            self.close("Nick already logged in.").await;
            return;
        }
        self.nick = Some(nick.clone());

        self.conn.out.send(Reply::LoggedIn { nick: &nick }).await;
        self.broadcast(Message::new("OK_LOGIN", [nick.clone()])).await;
        self.drain_notifications(&nick).await;
        self.state = ClientState::LoggedIn;
    }

    // Pending notifications are best effort: failures are logged, login
    // completes regardless.
    async fn drain_notifications(&mut self, nick: &str) {
        match timeout(DRAIN_TIMEOUT, self.db.get_notifications(nick)).await {
            Ok(Ok(pending)) => {
                for notification in &pending {
                    self.conn
                        .out
                        .send(Reply::Notified {
                            author: &notification.author,
                            target: nick,
                            content: &notification.content,
                        })
                        .await;
                }
                match timeout(DRAIN_TIMEOUT, self.db.delete_notifications(nick)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("[{}] deleting notifications failed: {e}", self.id),
                    Err(_) => error!("[{}] deleting notifications timed out", self.id),
                }
            }
            Ok(Err(e)) => error!("[{}] fetching notifications failed: {e}", self.id),
            Err(_) => error!("[{}] fetching notifications timed out", self.id),
        }
    }

    // --- LoggedIn ---------------------------------------------------------

    async fn handle_logged_in(&mut self, command: Option<ClientCommand>) {
        match command {
            Some(ClientCommand::Logout) => self.logout().await,
            Some(ClientCommand::Unregister) => self.unregister().await,
            Some(ClientCommand::List) => self.list().await,
            Some(ClientCommand::IsOn { nicks }) => self.ison(nicks).await,
            Some(ClientCommand::Help) => {
                self.conn
                    .out
                    .send(Reply::Help {
                        text: HELP_LOGGED_IN,
                    })
                    .await;
            }
            Some(ClientCommand::Create {
                channel,
                mode,
                members,
            }) => self.create(channel, mode, members).await,
            Some(ClientCommand::Delete { channel }) => self.delete(channel).await,
            Some(ClientCommand::Join { channel }) => self.join(channel).await,
            Some(ClientCommand::Quit { channel }) => self.quit(channel).await,
            Some(ClientCommand::Add { channel, nicks }) => self.add(channel, nicks).await,
            Some(ClientCommand::Kick { channel, nicks }) => self.kick(channel, nicks).await,
            Some(other) => warn!("[{}] ignoring {} while logged in", self.id, other.name()),
            None => warn!("[{}] ignoring unknown command while logged in", self.id),
        }
    }

    async fn logout(&mut self) {
        let nick = self.nick();
        self.conn.out.send(Reply::LoggedOut { nick: &nick }).await;
        self.broadcast(Message::new("OK_LOGOUT", [nick])).await;
        self.close("Logged out.").await;
    }

    async fn unregister(&mut self) {
        let nick = self.nick();
        match self.db.delete_user(&nick).await {
            Ok(()) => {
                self.broadcast(Message::new("OK_UNREG", [nick.clone()])).await;
                self.conn.out.send(Reply::Unregistered { nick: &nick }).await;
                self.close("Unregistered.").await;
            }
            Err(e) => self.internal_error(e).await,
        }
    }

    async fn list(&mut self) {
        let nick = self.nick();
        let pub_channels = match self.db.get_pub_channels().await {
            Ok(channels) => channels,
            Err(e) => return self.internal_error(e).await,
        };
        let priv_channels = match self.db.get_priv_channels(&nick).await {
            Ok(channels) => channels,
            Err(e) => return self.internal_error(e).await,
        };
        self.conn
            .out
            .send(Reply::List {
                mode: ChannelMode::Public,
                channels: &pub_channels,
            })
            .await;
        self.conn
            .out
            .send(Reply::List {
                mode: ChannelMode::Private,
                channels: &priv_channels,
            })
            .await;
    }

    async fn ison(&mut self, nicks: Vec<String>) {
        let online = self.dispatcher.is_on(&nicks);
        self.conn.out.send(Reply::IsOn { nicks: &online }).await;
    }

    // CREATE <#channel> <pub|priv> [nick ...]
    async fn create(&mut self, channel: String, mode: String, mut members: Vec<String>) {
        let nick = self.nick();
        let Ok(mode) = ChannelMode::from_str(&mode) else {
            self.conn.out.send(Reply::BadMode).await;
            return;
        };
        if !channel.starts_with('#') {
            self.conn.out.send(Reply::BadName).await;
            return;
        }
        match self.db.channel_exists(&channel).await {
            Ok(false) => {}
            Ok(true) => {
                self.conn.out.send(Reply::Exists { channel: &channel }).await;
                return;
            }
            Err(e) => return self.internal_error(e).await,
        }

        // A private channel always counts its creator as a member.
        if mode == ChannelMode::Private && !members.contains(&nick) {
            members.insert(0, nick.clone());
        }
        if !self.require_registered(&members).await {
            return;
        }

        match self.db.add_channel(&channel, &nick, mode, &members).await {
            Ok(()) => {}
            Err(DbError::Duplicate { .. }) => {
                self.conn.out.send(Reply::Exists { channel: &channel }).await;
                return;
            }
            Err(e) => return self.internal_error(e).await,
        }
        self.dispatcher.add_channel(&channel, false);

        self.conn
            .out
            .send(Reply::Created {
                channel: &channel,
                creator: &nick,
                mode,
                members: &members,
            })
            .await;
        let mut params = vec![channel.clone(), nick.clone(), mode.to_string()];
        params.extend(members.iter().cloned());
        self.broadcast(Message::new("OK_CREATED", params)).await;

        let content = format!("You were added to channel {channel}!");
        self.notify_or_store(&members, &content).await;
    }

    // DELETE <#channel> -- only the creator may tear a channel down.
    async fn delete(&mut self, channel: String) {
        let nick = self.nick();
        let mode = match self.db.get_channel_mode(&channel).await {
            Ok(Some(mode)) => mode,
            Ok(None) => {
                self.conn
                    .out
                    .send(Reply::NoChannel { channel: &channel })
                    .await;
                return;
            }
            Err(e) => return self.internal_error(e).await,
        };
        if !self.require_creator(&channel, "DELETE").await {
            return;
        }

        // Members that will not see the in-channel OK_DELETED learn about
        // it on their next login.
        if mode == ChannelMode::Private {
            let members = match self.db.get_members(&channel).await {
                Ok(members) => members,
                Err(e) => return self.internal_error(e).await,
            };
            let present = self.dispatcher.names(&channel);
            let content = format!("Channel {channel} was deleted!");
            let absent: Vec<String> = members
                .into_iter()
                .filter(|member| *member != nick && !present.contains(member))
                .collect();
            self.notify_or_store(&absent, &content).await;
        }

        if let Err(e) = self.db.delete_channel(&channel).await {
            return self.internal_error(e).await;
        }

        let deleted = Message::new("OK_DELETED", [channel.clone()]);
        self.dispatcher.publish(&channel, self.id, &deleted).await;
        self.dispatcher.remove_channel(&channel);
        self.broadcast(deleted).await;
        self.conn.out.send(Reply::Deleted { channel: &channel }).await;

        if let ClientState::Conversation { channel: current } = &self.state {
            if *current == channel {
                self.state = ClientState::LoggedIn;
            }
        }
    }

    // JOIN <#channel> -- membership gates private channels only.
    async fn join(&mut self, channel: String) {
        let nick = self.nick();
        let mode = match self.db.get_channel_mode(&channel).await {
            Ok(Some(mode)) => mode,
            Ok(None) => {
                self.conn
                    .out
                    .send(Reply::NoChannel { channel: &channel })
                    .await;
                return;
            }
            Err(e) => return self.internal_error(e).await,
        };
        if mode == ChannelMode::Private {
            match self.db.is_member(&nick, &channel).await {
                Ok(true) => {}
                Ok(false) => {
                    self.conn
                        .out
                        .send(Reply::NoPerm {
                            op: "JOIN",
                            reason: "You are not a member of this channel.",
                        })
                        .await;
                    return;
                }
                Err(e) => return self.internal_error(e).await,
            }
        }

        self.dispatcher.add_channel(&channel, false);
        self.dispatcher.subscribe(&channel, &nick);
        // Members already present learn about the newcomer in-channel.
        let joined = Message::new("JOINED", [channel.clone(), nick.clone()]);
        self.dispatcher.publish(&channel, self.id, &joined).await;
        self.conn
            .out
            .send(Reply::Joined {
                channel: &channel,
                nick: &nick,
            })
            .await;
        self.broadcast(Message::new("OK_JOINED", [channel.clone(), nick])).await;
        self.state = ClientState::Conversation { channel };
    }

    // ADD <#channel> <nick ...> -- private channels, creator only.
    async fn add(&mut self, channel: String, nicks: Vec<String>) {
        if !self.require_private(&channel, "ADD").await {
            return;
        }
        if !self.require_creator(&channel, "ADD").await {
            return;
        }
        if !self.require_registered(&nicks).await {
            return;
        }

        if let Err(e) = self.db.add_members(&channel, &nicks).await {
            return self.internal_error(e).await;
        }

        self.conn
            .out
            .send(Reply::Added {
                channel: &channel,
                nicks: &nicks,
            })
            .await;
        let mut params = vec![channel.clone()];
        params.extend(nicks.iter().cloned());
        self.broadcast(Message::new("ADDED", params)).await;
        self.publish_info(
            &channel,
            format!("Users {} were added to channel {channel}.", nicks.join(" ")),
        )
        .await;

        let content = format!("You were added to channel {channel}!");
        self.notify_or_store(&nicks, &content).await;
    }

    // KICK <#channel> <nick ...> -- private channels, creator only; the
    // creator cannot kick itself.
    async fn kick(&mut self, channel: String, nicks: Vec<String>) {
        let nick = self.nick();
        if !self.require_private(&channel, "KICK").await {
            return;
        }
        if !self.require_creator(&channel, "KICK").await {
            return;
        }
        let nicks: Vec<String> = nicks.into_iter().filter(|n| *n != nick).collect();
        if nicks.is_empty() {
            self.conn.out.send(Reply::NumParams).await;
            return;
        }
        if !self.require_registered(&nicks).await {
            return;
        }

        if let Err(e) = self.db.delete_members(&channel, &nicks).await {
            return self.internal_error(e).await;
        }

        self.conn
            .out
            .send(Reply::Kicked {
                channel: &channel,
                nicks: &nicks,
            })
            .await;
        let mut params = vec![channel.clone()];
        params.extend(nicks.iter().cloned());
        let kicked = Message::new("KICKED", params);
        // Local publish first: present kicked peers must learn to leave.
        self.dispatcher.publish(&channel, self.id, &kicked).await;
        self.broadcast(kicked).await;
        self.publish_info(
            &channel,
            format!("Users {} were kicked from channel {channel}.", nicks.join(" ")),
        )
        .await;

        let content = format!("You were kicked from channel {channel}!");
        self.notify_or_store(&nicks, &content).await;
    }

    // QUIT <#channel> -- give up membership of a private channel.
    async fn quit(&mut self, channel: String) {
        let nick = self.nick();
        if !self.require_private(&channel, "QUIT").await {
            return;
        }

        if let Err(e) = self
            .db
            .delete_members(&channel, std::slice::from_ref(&nick))
            .await
        {
            return self.internal_error(e).await;
        }

        self.conn
            .out
            .send(Reply::Quit {
                channel: &channel,
                nick: &nick,
            })
            .await;
        self.broadcast(Message::new("USR_QUIT", [channel.clone(), nick.clone()])).await;
        self.publish_info(&channel, format!("User {nick} quit channel {channel}."))
            .await;

        // No longer a member, so no longer welcome as present.
        if let ClientState::Conversation { channel: current } = &self.state {
            if *current == channel {
                self.dispatcher.unsubscribe(&channel, &nick);
                self.state = ClientState::LoggedIn;
            }
        }
    }

    // --- Conversation -----------------------------------------------------

    async fn handle_conversation(&mut self, command: Option<ClientCommand>) {
        match command {
            Some(ClientCommand::Names) => self.names().await,
            Some(ClientCommand::Msg { channel, content }) => self.msg(channel, content).await,
            Some(ClientCommand::Help) => {
                self.conn
                    .out
                    .send(Reply::Help {
                        text: HELP_CONVERSATION,
                    })
                    .await;
            }
            Some(ClientCommand::Leave) => self.leave().await,
            Some(ClientCommand::Quit { channel }) => self.quit(channel).await,
            Some(ClientCommand::Add { channel, nicks }) => self.add(channel, nicks).await,
            Some(ClientCommand::Kick { channel, nicks }) => self.kick(channel, nicks).await,
            Some(ClientCommand::Delete { channel }) => self.delete(channel).await,
            Some(other) => warn!("[{}] ignoring {} in conversation", self.id, other.name()),
            None => warn!("[{}] ignoring unknown command in conversation", self.id),
        }
    }

    async fn names(&mut self) {
        let ClientState::Conversation { channel } = &self.state else {
            return;
        };
        let channel = channel.clone();
        let nicks = self.dispatcher.names(&channel);
        self.conn
            .out
            .send(Reply::Names {
                channel: &channel,
                nicks: &nicks,
            })
            .await;
    }

    // MSG <#channel> :<content>
    //
    // The server stamps the speaker's nick as prefix; the author never
    // sees its own message echoed. The stamped line also goes to the
    // peer servers and to the scoring side-channel.
    async fn msg(&mut self, channel: String, content: String) {
        let nick = self.nick();
        let stamped = Message::with_prefix(nick, "MSG", [channel.clone(), content]);
        self.dispatcher.publish(&channel, self.id, &stamped).await;
        self.broadcast(stamped.clone()).await;
        self.ai.score(stamped.to_string());
    }

    async fn leave(&mut self) {
        let ClientState::Conversation { channel } = &self.state else {
            return;
        };
        let channel = channel.clone();
        let nick = self.nick();

        self.publish_info(&channel, format!("User {nick} left channel {channel}."))
            .await;
        self.dispatcher.unsubscribe(&channel, &nick);
        self.conn
            .out
            .send(Reply::Left {
                channel: &channel,
                nick: &nick,
            })
            .await;
        self.state = ClientState::LoggedIn;
    }

    // --- Dispatcher events ------------------------------------------------

    async fn handle_event(&mut self, event: Message) {
        let current = match &self.state {
            ClientState::Conversation { channel } => Some(channel.clone()),
            ClientState::LoggedIn => None,
            _ => {
                debug!("[{}] dropping event {} in inactive state", self.id, event.command);
                return;
            }
        };
        let nick = self.nick();

        match event.command.as_str() {
            "MSG" => {
                if let (Some(author), [channel, content]) = (&event.prefix, &event.params[..]) {
                    self.conn
                        .out
                        .send(Reply::ChannelMsg {
                            author,
                            channel,
                            content,
                        })
                        .await;
                }
            }
            "KICKED" => {
                self.conn.out.send_line(event.to_string()).await;
                let channel = &event.params[0];
                let kicked_me = event.params[1..].iter().any(|n| *n == nick);
                if kicked_me && current.as_deref() == Some(channel.as_str()) {
                    self.dispatcher.unsubscribe(channel, &nick);
                    self.state = ClientState::LoggedIn;
                }
            }
            "OK_DELETED" => {
                self.conn.out.send_line(event.to_string()).await;
                if current.as_deref() == Some(event.params[0].as_str()) {
                    self.state = ClientState::LoggedIn;
                }
            }
            _ => {
                // NOTIFIED, INFO and the rest of the channel traffic go
                // through verbatim.
                self.conn.out.send_line(event.to_string()).await;
            }
        }
    }

    // --- Shared checks and notification fan-out ---------------------------

    /// Channel must exist and be private, else ERR_NOCHANNEL/ERR_BAD_OP.
    async fn require_private(&mut self, channel: &str, op: &str) -> bool {
        match self.db.get_channel_mode(channel).await {
            Ok(Some(ChannelMode::Private)) => true,
            Ok(Some(ChannelMode::Public)) => {
                self.conn.out.send(Reply::BadOp { op }).await;
                false
            }
            Ok(None) => {
                self.conn.out.send(Reply::NoChannel { channel }).await;
                false
            }
            Err(e) => {
                self.internal_error(e).await;
                false
            }
        }
    }

    /// Caller must be the channel creator, else ERR_NO_PERM.
    async fn require_creator(&mut self, channel: &str, op: &str) -> bool {
        let nick = self.nick();
        match self.db.get_channel_creator(channel).await {
            Ok(Some(creator)) if creator == nick => true,
            Ok(_) => {
                self.conn
                    .out
                    .send(Reply::NoPerm {
                        op,
                        reason: "Only the channel creator may do this.",
                    })
                    .await;
                false
            }
            Err(e) => {
                self.internal_error(e).await;
                false
            }
        }
    }

    /// Every listed nick must have an account, else ERR_NOUSER for the
    /// first unknown one.
    async fn require_registered(&mut self, nicks: &[String]) -> bool {
        let own = self.nick();
        let to_check: Vec<String> = nicks.iter().filter(|n| **n != own).cloned().collect();
        if to_check.is_empty() {
            return true;
        }
        match self.db.users_registered(&to_check).await {
            Ok(registered) => {
                if let Some(unknown) = to_check.iter().find(|n| !registered.contains(*n)) {
                    self.conn.out.send(Reply::NoUser { nick: unknown }).await;
                    false
                } else {
                    true
                }
            }
            Err(e) => {
                self.internal_error(e).await;
                false
            }
        }
    }

    async fn publish_info(&self, channel: &str, text: String) {
        let info = Message::new("INFO", ["MSG".to_owned(), text]);
        self.dispatcher.publish(channel, self.id, &info).await;
    }

    /// Online targets get a NOTIFIED right away; offline ones get a
    /// persisted notification drained on their next login. Self is
    /// skipped.
    async fn notify_or_store(&mut self, targets: &[String], content: &str) {
        let author = self.nick();
        for target in targets {
            if *target == author {
                continue;
            }
            let notified = Message::new(
                "NOTIFIED",
                [author.clone(), target.clone(), content.to_owned()],
            );
            if !self.dispatcher.notify(target, &notified).await {
                if let Err(e) = self.db.add_notification(&author, target, content).await {
                    error!("[{}] storing notification for {target} failed: {e}", self.id);
                }
            }
        }
    }
}
