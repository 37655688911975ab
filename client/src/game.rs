//! Client-side session state driven by server responses

use log::debug;
use shared::{
    Response, Status, MSG_JOINED, MSG_LEFT_ROOM, MSG_LOGIN_SUCCESS, MSG_WAITING, OPPONENT_PREFIX,
};
use std::fmt;

/// Display progression of one client session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Login,
    Lobby,
    WaitingForOpponent,
    Playing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Login => "login",
            SessionState::Lobby => "lobby",
            SessionState::WaitingForOpponent => "waiting",
            SessionState::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Session state plus the last feedback shown to the user
#[derive(Debug, Clone)]
pub struct ClientGameState {
    state: SessionState,
    feedback: Option<String>,
    room_status: Option<String>,
    opponent_moves: Vec<String>,
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            state: SessionState::Login,
            feedback: None,
            room_status: None,
            opponent_moves: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn room_status(&self) -> Option<&str> {
        self.room_status.as_deref()
    }

    /// Everything the opponent sent during the current match
    pub fn opponent_moves(&self) -> &[String] {
        &self.opponent_moves
    }

    /// Applies a server response. Returns the new state if it changed.
    pub fn apply_response(&mut self, response: &Response) -> Option<SessionState> {
        let message = response.message.as_str();

        match response.status {
            Status::Success if message == MSG_LOGIN_SUCCESS => {
                self.feedback = Some(message.to_string());
                self.change_state(SessionState::Lobby)
            }
            Status::Success if message == MSG_WAITING => {
                self.room_status = Some("Waiting for an opponent...".to_string());
                self.change_state(SessionState::WaitingForOpponent)
            }
            Status::Success if message == MSG_JOINED => {
                self.room_status = Some("Opponent found! Start playing.".to_string());
                self.opponent_moves.clear();
                self.change_state(SessionState::Playing)
            }
            Status::Success => {
                if let Some(content) = message.strip_prefix(OPPONENT_PREFIX) {
                    self.opponent_moves.push(content.to_string());
                }
                self.feedback = Some(message.to_string());
                None
            }
            Status::Info => {
                self.feedback = Some(message.to_string());
                if message == MSG_LEFT_ROOM && self.state != SessionState::Login {
                    self.room_status = None;
                    self.change_state(SessionState::Lobby)
                } else {
                    None
                }
            }
            Status::Error => {
                self.feedback = Some(format!("Error: {}", message));
                None
            }
        }
    }

    fn change_state(&mut self, next: SessionState) -> Option<SessionState> {
        if next == self.state {
            return None;
        }

        debug!("Session state {} -> {}", self.state, next);
        self.state = next;
        Some(next)
    }
}
