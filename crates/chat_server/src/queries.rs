//! SQL text for the persistent store.

// Table creation.
pub const CREATE_TABLE_USER: &str = "CREATE TABLE IF NOT EXISTS user (
    user_id INTEGER PRIMARY KEY,
    nick TEXT UNIQUE NOT NULL,
    mail TEXT UNIQUE NOT NULL,
    password TEXT NOT NULL
)";

pub const CREATE_TABLE_CHANNEL: &str = "CREATE TABLE IF NOT EXISTS channel (
    channel_id INTEGER PRIMARY KEY,
    name TEXT UNIQUE NOT NULL,
    creator TEXT NOT NULL REFERENCES user (nick) ON DELETE CASCADE,
    public INTEGER NOT NULL,
    CHECK (public IN (0, 1))
)";

pub const CREATE_TABLE_IS_MEMBER: &str = "CREATE TABLE IF NOT EXISTS is_member (
    id INTEGER PRIMARY KEY,
    user TEXT NOT NULL REFERENCES user (nick) ON DELETE CASCADE,
    channel TEXT NOT NULL REFERENCES channel (name) ON DELETE CASCADE,
    UNIQUE (user, channel)
)";

pub const CREATE_TABLE_NOTIFICATION: &str = "CREATE TABLE IF NOT EXISTS notification (
    notif_id INTEGER PRIMARY KEY,
    author TEXT NOT NULL REFERENCES user (nick),
    target TEXT NOT NULL REFERENCES user (nick) ON DELETE CASCADE,
    content TEXT NOT NULL
)";

// Lookups.
pub const SELECT_NICK: &str = "SELECT nick FROM user WHERE nick = ?";
pub const SELECT_MAIL: &str = "SELECT mail FROM user WHERE mail = ?";
pub const SELECT_PASSWORD: &str = "SELECT password FROM user WHERE nick = ?";
pub const SELECT_CHANNEL: &str = "SELECT name FROM channel WHERE name = ?";
pub const SELECT_CHANNEL_MODE: &str = "SELECT public FROM channel WHERE name = ?";
pub const SELECT_CHANNEL_CREATOR: &str = "SELECT creator FROM channel WHERE name = ?";
pub const SELECT_IS_MEMBER: &str = "SELECT id FROM is_member WHERE user = ? AND channel = ?";
pub const SELECT_MEMBERS: &str = "SELECT user FROM is_member WHERE channel = ?";
pub const SELECT_PUB_CHANNELS: &str = "SELECT name FROM channel WHERE public = 1";
pub const SELECT_PRIV_CHANNELS: &str = "SELECT channel FROM is_member
    JOIN channel ON channel.name = is_member.channel
    WHERE is_member.user = ? AND channel.public = 0";
pub const SELECT_NOTIFICATIONS: &str =
    "SELECT author, content FROM notification WHERE target = ?";

// Insertion.
pub const INSERT_USER: &str = "INSERT INTO user (nick, mail, password) VALUES (?, ?, ?)";
pub const INSERT_CHANNEL: &str = "INSERT INTO channel (name, creator, public) VALUES (?, ?, ?)";
pub const INSERT_MEMBER: &str = "INSERT OR IGNORE INTO is_member (user, channel) VALUES (?, ?)";
pub const INSERT_NOTIFICATION: &str =
    "INSERT INTO notification (author, target, content) VALUES (?, ?, ?)";

// Deletion.
pub const DELETE_USER: &str = "DELETE FROM user WHERE nick = ?";
pub const DELETE_CHANNEL: &str = "DELETE FROM channel WHERE name = ?";
pub const DELETE_MEMBER: &str = "DELETE FROM is_member WHERE user = ? AND channel = ?";
pub const DELETE_NOTIFICATIONS: &str = "DELETE FROM notification WHERE target = ?";
