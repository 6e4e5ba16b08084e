//! IRC connection: registration, channel joins and the read/write loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;
use tracing::{debug, error, info, warn};

use titlebot_common::config::AppConfig;
use titlebot_common::error::AppError;
use titlebot_common::types::InboundMessage;
use titlebot_engine::{ChannelTransport, InboundHandler};

use crate::message::{IrcMessage, privmsg};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Maximum reconnect backoff delay.
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one IRC network.
#[derive(Debug, Clone)]
pub struct IrcConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub nick: String,
    pub nick_password: Option<String>,
    pub channels: Vec<String>,
}

impl IrcConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            host: config.irc_host.clone(),
            port: config.irc_port,
            tls: config.irc_tls,
            nick: config.irc_nick.clone(),
            nick_password: config.irc_nick_password.clone(),
            channels: config.channels.clone(),
        }
    }
}

/// Cloneable sending side of the IRC connection.
///
/// Lines are queued and written by the connection task once it is registered;
/// lines queued while disconnected go out after the next registration.
#[derive(Clone)]
pub struct IrcTransport {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl ChannelTransport for IrcTransport {
    async fn send(&self, channel: &str, text: &str) -> Result<(), AppError> {
        self.tx
            .send(privmsg(channel, text))
            .map_err(|_| AppError::Transport("IRC client is not running".to_string()))
    }
}

trait Connection: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Connection for T {}

/// How a single connection ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Disconnected { registered: bool },
    Shutdown,
}

/// IRC client with automatic reconnect.
pub struct IrcClient {
    config: IrcConfig,
    handler: Option<Arc<dyn InboundHandler>>,
    outbound_tx: mpsc::UnboundedSender<String>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
}

impl IrcClient {
    pub fn new(config: IrcConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            config,
            handler: None,
            outbound_tx,
            outbound_rx,
        }
    }

    pub fn transport(&self) -> IrcTransport {
        IrcTransport {
            tx: self.outbound_tx.clone(),
        }
    }

    /// Register the receiver of every inbound `PRIVMSG`.
    pub fn set_inbound_handler(&mut self, handler: Arc<dyn InboundHandler>) {
        self.handler = Some(handler);
    }

    /// Stay connected until `shutdown` completes, then send `QUIT`.
    ///
    /// Only fails if TLS cannot be set up at all; connection errors are
    /// logged and retried with exponential backoff.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), AppError>
    where
        F: Future,
    {
        tokio::pin!(shutdown);

        let tls = if self.config.tls {
            Some(tls_connector()?)
        } else {
            None
        };
        let mut backoff = INITIAL_BACKOFF;

        loop {
            info!(
                host = %self.config.host,
                port = self.config.port,
                tls = self.config.tls,
                "Connecting to IRC server"
            );

            let connected = tokio::select! {
                connected = self.connect(tls.as_ref()) => connected,
                _ = shutdown.as_mut() => return Ok(()),
            };

            let end = match connected {
                Ok(stream) => self.run_session(stream, shutdown.as_mut()).await,
                Err(e) => Err(e),
            };

            match end {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Disconnected { registered }) => {
                    warn!("IRC connection closed by server");
                    if registered {
                        backoff = INITIAL_BACKOFF;
                    }
                }
                Err(e) => error!(error = %e, "IRC connection error"),
            }

            info!(delay_ms = backoff.as_millis() as u64, "Reconnecting after delay");
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = shutdown.as_mut() => return Ok(()),
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect(&self, tls: Option<&TlsConnector>) -> Result<Box<dyn Connection>, AppError> {
        let addr = (self.config.host.as_str(), self.config.port);
        let tcp = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                AppError::Transport(format!(
                    "timed out connecting to {}:{}",
                    self.config.host, self.config.port
                ))
            })??;
        tcp.set_nodelay(true)?;

        let Some(connector) = tls else {
            return Ok(Box::new(tcp));
        };

        let server_name = ServerName::try_from(self.config.host.clone())
            .map_err(|e| AppError::Tls(format!("invalid server name {}: {e}", self.config.host)))?;
        let stream = connector.connect(server_name, tcp).await?;
        Ok(Box::new(stream))
    }

    async fn run_session<S, F>(
        &mut self,
        stream: S,
        mut shutdown: Pin<&mut F>,
    ) -> Result<SessionEnd, AppError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        F: Future,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        let mut registration = Registration::new(&self.config);

        for line in registration.greeting() {
            write_line(&mut writer, &line).await?;
        }

        loop {
            tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => {
                    if read? == 0 {
                        return Ok(SessionEnd::Disconnected { registered: registration.registered });
                    }
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    buf.clear();

                    let message = match IrcMessage::parse(&line) {
                        Ok(message) => message,
                        Err(e) => {
                            debug!(error = %e, "Skipping unparseable line");
                            continue;
                        }
                    };

                    let reaction = registration.handle(&message);
                    for reply in &reaction.replies {
                        write_line(&mut writer, reply).await?;
                    }
                    if let (Some(inbound), Some(handler)) = (reaction.inbound, &self.handler) {
                        handler.on_message(inbound).await;
                    }
                }
                // Held back until the server has accepted NICK/USER.
                Some(line) = self.outbound_rx.recv(), if registration.registered => {
                    write_line(&mut writer, &line).await?;
                }
                _ = &mut shutdown => {
                    info!("Sending QUIT");
                    write_line(&mut writer, "QUIT :").await?;
                    writer.shutdown().await?;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> Result<(), AppError> {
    debug!(line = %line, "Sending IRC line");
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

fn tls_connector() -> Result<TlsConnector, AppError> {
    let mut roots = rustls::RootCertStore::empty();

    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!(error = %e, "Failed to load native certificates");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(added, ignored, "Loaded native root certificates");

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| AppError::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// What to do in response to one server line.
#[derive(Debug, Default, PartialEq, Eq)]
struct Reaction {
    replies: Vec<String>,
    inbound: Option<InboundMessage>,
}

/// Per-connection protocol state.
struct Registration {
    account: String,
    nick: String,
    password: Option<String>,
    channels: Vec<String>,
    registered: bool,
}

impl Registration {
    fn new(config: &IrcConfig) -> Self {
        Self {
            account: config.nick.clone(),
            nick: config.nick.clone(),
            password: config.nick_password.clone(),
            channels: config.channels.clone(),
            registered: false,
        }
    }

    fn greeting(&self) -> Vec<String> {
        vec![
            format!("NICK {}", self.nick),
            format!("USER {} 0 * :{}", self.account, self.account),
        ]
    }

    fn handle(&mut self, message: &IrcMessage) -> Reaction {
        let mut reaction = Reaction::default();

        match message.command.as_str() {
            "PING" => {
                let reply = match message.param(0) {
                    Some(token) => format!("PONG :{token}"),
                    None => "PONG".to_string(),
                };
                reaction.replies.push(reply);
            }
            "001" => {
                self.registered = true;
                if let Some(nick) = message.param(0) {
                    self.nick = nick.to_string();
                }
                info!(nick = %self.nick, "Registered with IRC server");

                if let Some(password) = &self.password {
                    reaction
                        .replies
                        .push(format!("PRIVMSG NickServ :IDENTIFY {} {}", self.account, password));
                }
                for channel in &self.channels {
                    reaction.replies.push(format!("JOIN {channel}"));
                }
            }
            "433" if !self.registered => {
                warn!(nick = %self.nick, "Nick already in use, retrying with suffix");
                self.nick.push('_');
                reaction.replies.push(format!("NICK {}", self.nick));
            }
            "JOIN" if message.nick() == Some(self.nick.as_str()) => {
                if let Some(channel) = message.param(0) {
                    info!(channel = %channel, "Joined channel");
                }
            }
            "PRIVMSG" => {
                if let (Some(user), Some(target), Some(text)) =
                    (message.nick(), message.param(0), message.param(1))
                {
                    debug!(user = %user, target = %target, text = %text, "Received message");
                    reaction.inbound = Some(InboundMessage::new(target, user, text));
                }
            }
            "ERROR" => {
                warn!(reason = message.param(0).unwrap_or_default(), "Server sent ERROR");
            }
            _ => {}
        }

        reaction
    }
}
