//! Routes decoded requests to their handlers.
//!
//! Malformed frames and unknown actions are logged and dropped. No response
//! is produced for them and the connection stays open.

use crate::room_manager::{Outbox, RoomManager};
use crate::transport::ConnectionId;
use log::{debug, error, info, warn};
use shared::codec::{self, DecodeError};
use shared::{Credentials, Request, Response, MSG_ACCOUNT_CREATED, MSG_LOGIN_SUCCESS};

/// Decodes one inbound frame and handles it against `rooms`
pub fn dispatch(rooms: &mut RoomManager, sender: ConnectionId, frame: &[u8]) -> Outbox {
    match codec::decode_request(frame) {
        Ok(request) => {
            debug!("{} -> {}", sender, request.action());
            handle_request(rooms, sender, request)
        }
        Err(e) => {
            log_dropped(sender, &e);
            Vec::new()
        }
    }
}

pub fn handle_request(rooms: &mut RoomManager, sender: ConnectionId, request: Request) -> Outbox {
    match request {
        Request::Login(credentials) => handle_auth(sender, &credentials, false),
        Request::Create(credentials) => handle_auth(sender, &credentials, true),
        Request::JoinOrCreateRoom(room) => rooms.join_or_create(&room.room_name, sender),
        Request::LeaveRoom => rooms.leave(sender),
        Request::PlayAction(play) => rooms.relay(sender, &play.content),
    }
}

/// There is no account store: every login and every creation succeeds
fn handle_auth(sender: ConnectionId, credentials: &Credentials, create: bool) -> Outbox {
    let message = if create {
        info!("{} created account '{}'", sender, credentials.username);
        MSG_ACCOUNT_CREATED
    } else {
        info!("{} logged in as '{}'", sender, credentials.username);
        MSG_LOGIN_SUCCESS
    };

    vec![(sender, Response::success(message))]
}

fn log_dropped(sender: ConnectionId, err: &DecodeError) {
    match err {
        DecodeError::MissingAction => warn!("Invalid message received from {}", sender),
        DecodeError::UnknownAction(action) => warn!("Unknown action from {}: {}", sender, action),
        _ => error!("Error processing message from {}: {}", sender, err),
    }
}
