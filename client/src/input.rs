//! Terminal input parsing into protocol requests

use crate::game::SessionState;
use shared::{Credentials, PlayMessage, Request, RoomRequest};

pub const HELP: &str = "\
Commands:
  login <username> [password]   log in
  create <username> [password]  create an account
  join <room>                   join or create a room
  leave                         leave the current room
  play <text>                   send a move to your opponent
  help                          show this help
  quit                          disconnect and exit
While playing, any other text is sent as a move.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(Request),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("nothing to send")]
    Empty,

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown command `{0}`, type `help` for a list")]
    Unknown(String),
}

/// Parses one line of user input given the current session state
pub fn parse_command(line: &str, state: SessionState) -> Result<Command, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(InputError::Empty);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_ascii_lowercase().as_str() {
        "login" => {
            let credentials = credentials(rest, "login <username> [password]")?;
            Ok(Command::Send(Request::Login(credentials)))
        }
        "create" => {
            let credentials = credentials(rest, "create <username> [password]")?;
            Ok(Command::Send(Request::Create(credentials)))
        }
        "join" => {
            if rest.is_empty() {
                return Err(InputError::Usage("join <room>"));
            }
            Ok(Command::Send(Request::JoinOrCreateRoom(RoomRequest {
                room_name: rest.to_string(),
            })))
        }
        "leave" => Ok(Command::Send(Request::LeaveRoom)),
        "play" => {
            if rest.is_empty() {
                return Err(InputError::Usage("play <text>"));
            }
            Ok(play(rest))
        }
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        _ if state == SessionState::Playing => Ok(play(line)),
        other => Err(InputError::Unknown(other.to_string())),
    }
}

fn credentials(args: &str, usage: &'static str) -> Result<Credentials, InputError> {
    let mut parts = args.split_whitespace();
    let username = parts.next().ok_or(InputError::Usage(usage))?;
    let password = parts.next().unwrap_or_default();

    if parts.next().is_some() {
        return Err(InputError::Usage(usage));
    }

    Ok(Credentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

fn play(content: &str) -> Command {
    Command::Send(Request::PlayAction(PlayMessage {
        content: content.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Command, InputError> {
        parse_command(line, SessionState::Lobby)
    }

    #[test]
    fn test_login_and_create() {
        assert_eq!(
            parse("login alice secret"),
            Ok(Command::Send(Request::Login(Credentials {
                username: "alice".to_string(),
                password: "secret".to_string(),
            })))
        );
        assert_eq!(
            parse("CREATE bob"),
            Ok(Command::Send(Request::Create(Credentials {
                username: "bob".to_string(),
                password: String::new(),
            })))
        );
    }

    #[test]
    fn test_login_usage_errors() {
        assert_eq!(
            parse("login"),
            Err(InputError::Usage("login <username> [password]"))
        );
        assert!(matches!(parse("login a b c"), Err(InputError::Usage(_))));
    }

    #[test]
    fn test_join_keeps_spaces_in_room_name() {
        assert_eq!(
            parse("join  friday night "),
            Ok(Command::Send(Request::JoinOrCreateRoom(RoomRequest {
                room_name: "friday night".to_string(),
            })))
        );
        assert_eq!(parse("join"), Err(InputError::Usage("join <room>")));
    }

    #[test]
    fn test_leave_help_quit() {
        assert_eq!(parse("leave"), Ok(Command::Send(Request::LeaveRoom)));
        assert_eq!(parse("help"), Ok(Command::Help));
        assert_eq!(parse("exit"), Ok(Command::Quit));
    }

    #[test]
    fn test_play_command() {
        assert_eq!(
            parse("play knight to f3"),
            Ok(Command::Send(Request::PlayAction(PlayMessage {
                content: "knight to f3".to_string(),
            })))
        );
        assert_eq!(parse("play"), Err(InputError::Usage("play <text>")));
    }

    #[test]
    fn test_bare_text_depends_on_state() {
        assert_eq!(parse("e2e4"), Err(InputError::Unknown("e2e4".to_string())));
        assert_eq!(
            parse_command("e2e4 !", SessionState::Playing),
            Ok(Command::Send(Request::PlayAction(PlayMessage {
                content: "e2e4 !".to_string(),
            })))
        );
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(parse("   "), Err(InputError::Empty));
    }
}
