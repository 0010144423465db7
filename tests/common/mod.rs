//! In-process stand-in for the FreeSWITCH inbound Event Socket.

#![allow(dead_code)]

use std::time::Duration;

use freeswitch_call_control::{EslEvent, SwitchConfig};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

pub const PASSWORD: &str = "ClueCon";

/// Listening socket that speaks just enough ESL for the tests.
pub struct MockSwitch {
    listener: TcpListener,
    pub port: u16,
}

/// Server side of one accepted, authenticated connection.
pub struct MockSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl MockSwitch {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        let port = listener
            .local_addr()
            .unwrap()
            .port();
        Self { listener, port }
    }

    /// Config pointing at this switch, with short timeouts.
    pub fn config(&self) -> SwitchConfig {
        SwitchConfig {
            port: self.port,
            endpoint_domain: "192.168.1.246".into(),
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(2),
            retry_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    /// Accept one connection and run the auth handshake.
    pub async fn accept(&self) -> MockSession {
        let mut session = self
            .accept_unauthenticated()
            .await;
        let auth = session
            .read_command()
            .await
            .expect("client sent auth");
        assert_eq!(auth, format!("auth {}", PASSWORD));
        session
            .reply("+OK accepted")
            .await;
        session
    }

    /// Accept one connection and send the auth greeting only.
    pub async fn accept_unauthenticated(&self) -> MockSession {
        let (socket, _) = self
            .listener
            .accept()
            .await
            .unwrap();
        let (read_half, write_half) = socket.into_split();
        let mut session = MockSession {
            reader: BufReader::new(read_half),
            writer: write_half,
        };
        session
            .write(b"Content-Type: auth/request\n\n")
            .await;
        session
    }

    /// Serve a single api command on the next connection.
    ///
    /// Returns the command line the client sent, `None` if it hung up first.
    pub fn serve_api(self, body: &'static str) -> tokio::task::JoinHandle<Option<String>> {
        self.serve_api_after(Duration::ZERO, body)
    }

    /// [`serve_api`](Self::serve_api), holding the reply back for `delay`.
    pub fn serve_api_after(
        self,
        delay: Duration,
        body: &'static str,
    ) -> tokio::task::JoinHandle<Option<String>> {
        tokio::spawn(async move {
            let mut session = self
                .accept()
                .await;
            let command = session
                .read_command()
                .await?;
            tokio::time::sleep(delay).await;
            session
                .api_response(body)
                .await;
            session
                .wait_closed()
                .await;
            Some(command)
        })
    }
}

impl MockSession {
    async fn write(&mut self, bytes: &[u8]) {
        // The client may already have hung up.
        let _ = self
            .writer
            .write_all(bytes)
            .await;
    }

    /// Next command line, `None` on EOF.
    pub async fn read_command(&mut self) -> Option<String> {
        let mut command = None;
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .ok()?;
            if n == 0 {
                return None;
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if command.is_some() {
                    return command;
                }
                continue;
            }
            if command.is_none() {
                command = Some(line.to_string());
            }
        }
    }

    pub async fn reply(&mut self, reply_text: &str) {
        let frame = format!(
            "Content-Type: command/reply\nReply-Text: {}\n\n",
            reply_text
        );
        self.write(frame.as_bytes())
            .await;
    }

    pub async fn api_response(&mut self, body: &str) {
        let frame = format!(
            "Content-Type: api/response\nContent-Length: {}\n\n{}",
            body.len(),
            body
        );
        self.write(frame.as_bytes())
            .await;
    }

    pub async fn send_event(&mut self, event: &EslEvent) {
        let payload = event.to_plain_format();
        let frame = format!(
            "Content-Type: text/event-plain\nContent-Length: {}\n\n{}",
            payload.len(),
            payload
        );
        self.write(frame.as_bytes())
            .await;
    }

    pub async fn send_json_event(&mut self, json: &str) {
        let frame = format!(
            "Content-Type: text/event-json\nContent-Length: {}\n\n{}",
            json.len(),
            json
        );
        self.write(frame.as_bytes())
            .await;
    }

    /// Read until the client closes its side.
    pub async fn wait_closed(&mut self) {
        while self
            .read_command()
            .await
            .is_some()
        {}
    }

    pub async fn close(mut self) {
        let _ = self
            .writer
            .shutdown()
            .await;
    }
}
