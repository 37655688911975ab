//! Wire protocol shared by the relay server and its clients.
//!
//! Requests are JSON objects carrying an `action` discriminator plus the
//! fields of exactly one variant. Responses are `{status, message}` pairs.
//! Framing and text encoding live in [`codec`].

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;

pub use codec::{DecodeError, EncodeError, ReadError, MAX_FRAME_LEN};

pub const DEFAULT_PORT: u16 = 9002;
pub const DEFAULT_ROOM_CAPACITY: usize = 2;

pub const MSG_LOGIN_SUCCESS: &str = "Login successful!";
pub const MSG_ACCOUNT_CREATED: &str = "Account created successfully!";
pub const MSG_WAITING: &str = "Waiting for opponent...";
pub const MSG_JOINED: &str = "Joined room - start playing!";
pub const MSG_ROOM_FULL: &str = "Room full.";
pub const MSG_LEFT_ROOM: &str = "You have left the room.";
pub const OPPONENT_PREFIX: &str = "Opponent says: ";

/// The `action` discriminator of a request envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Login,
    Create,
    JoinOrCreateRoom,
    LeaveRoom,
    PlayAction,
}

impl Action {
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "login" => Some(Action::Login),
            "create" => Some(Action::Create),
            "joinOrCreateRoom" => Some(Action::JoinOrCreateRoom),
            "leaveRoom" => Some(Action::LeaveRoom),
            "playAction" => Some(Action::PlayAction),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Create => "create",
            Action::JoinOrCreateRoom => "joinOrCreateRoom",
            Action::LeaveRoom => "leaveRoom",
            Action::PlayAction => "playAction",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of `login` and `create`. Neither field is validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRequest {
    #[serde(rename = "roomName")]
    pub room_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayMessage {
    pub content: String,
}

/// A decoded client request, one strongly-typed payload per action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action")]
pub enum Request {
    #[serde(rename = "login")]
    Login(Credentials),
    #[serde(rename = "create")]
    Create(Credentials),
    #[serde(rename = "joinOrCreateRoom")]
    JoinOrCreateRoom(RoomRequest),
    #[serde(rename = "leaveRoom")]
    LeaveRoom,
    #[serde(rename = "playAction")]
    PlayAction(PlayMessage),
}

impl Request {
    pub fn action(&self) -> Action {
        match self {
            Request::Login(_) => Action::Login,
            Request::Create(_) => Action::Create,
            Request::JoinOrCreateRoom(_) => Action::JoinOrCreateRoom,
            Request::LeaveRoom => Action::LeaveRoom,
            Request::PlayAction(_) => Action::PlayAction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub message: String,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            status: Status::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
        }
    }
}
