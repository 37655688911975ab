//! Client connection to the relay server

use crate::game::{ClientGameState, SessionState};
use crate::input::{parse_command, Command, InputError, HELP};
use log::{debug, info, warn};
use shared::codec;
use shared::{Request, Response, Status};
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

pub struct Client {
    server_addr: SocketAddr,
    writer: OwnedWriteHalf,
    responses: mpsc::UnboundedReceiver<Response>,
    game_state: ClientGameState,
}

impl Client {
    /// Connects and starts receiving responses in the background
    pub async fn connect(server_addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        let server_addr = stream.peer_addr()?;
        info!("Connected to {}", server_addr);

        let (reader, writer) = stream.into_split();
        let (response_tx, responses) = mpsc::unbounded_channel();
        tokio::spawn(receive_loop(reader, response_tx));

        Ok(Client {
            server_addr,
            writer,
            responses,
            game_state: ClientGameState::new(),
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub async fn send_request(
        &mut self,
        request: &Request,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let frame = codec::encode(request)?;
        codec::write_frame(&mut self.writer, &frame).await?;
        debug!("Sent {}", request.action());
        Ok(())
    }

    /// Waits for the next response and applies it to the session state.
    /// Returns `None` once the server has closed the connection.
    pub async fn next_response(&mut self) -> Option<Response> {
        let response = self.responses.recv().await?;
        if let Some(state) = self.game_state.apply_response(&response) {
            info!("Session state changed to {}", state);
        }
        Some(response)
    }

    /// Interactive loop reading commands from stdin until `quit`, end of
    /// input or server disconnect
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("{}", HELP);
        self.print_prompt();

        loop {
            let before = self.game_state.state();

            tokio::select! {
                response = self.next_response() => match response {
                    Some(response) => {
                        self.print_response(&response, before);
                        self.print_prompt();
                    }
                    None => {
                        println!("Disconnected from server.");
                        break;
                    }
                },

                line = lines.next_line() => {
                    let Some(line) = line? else { break };

                    match parse_command(&line, self.game_state.state()) {
                        Ok(Command::Send(request)) => self.send_request(&request).await?,
                        Ok(Command::Help) => println!("{}", HELP),
                        Ok(Command::Quit) => break,
                        Err(InputError::Empty) => {}
                        Err(e) => println!("{}", e),
                    }
                    self.print_prompt();
                },
            }
        }

        Ok(())
    }

    fn print_response(&self, response: &Response, before: SessionState) {
        match response.status {
            Status::Error => println!("Error: {}", response.message),
            Status::Success | Status::Info => println!("{}", response.message),
        }

        if self.game_state.state() != before {
            if let Some(room_status) = self.game_state.room_status() {
                println!("[room] {}", room_status);
            }
        }
    }

    fn print_prompt(&self) {
        use std::io::Write;

        print!("{}> ", self.game_state.state());
        let _ = std::io::stdout().flush();
    }
}

async fn receive_loop(mut reader: OwnedReadHalf, responses: mpsc::UnboundedSender<Response>) {
    loop {
        match codec::read_frame(&mut reader).await {
            Ok(Some(frame)) => match codec::decode_response(&frame) {
                Ok(response) => {
                    if responses.send(response).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Dropping malformed response: {}", e),
            },
            Ok(None) => break,
            Err(e) if e.is_recoverable() => warn!("Dropping response: {}", e),
            Err(e) => {
                warn!("Error receiving from server: {}", e);
                break;
            }
        }
    }
    debug!("Receive loop finished");
}
