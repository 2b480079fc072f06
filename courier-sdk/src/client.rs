//! The IRC client: connection supervisor, protocol engine, and the consumer
//! surface.
//!
//! A [`Client`] owns one connection to one server. The supervisor task dials
//! (plain or TLS), spawns a receive task feeding the protocol state machine,
//! and reconnects with exponential backoff when the transport drops. Every
//! parsed inbound message is forwarded to the consumer `messages` channel;
//! transport transitions go out on `connection_changed`.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig as TlsClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::backoff::Backoff;
use crate::config::Config;
use crate::error::{classify_tls_error, Error};
use crate::event::ConnectionState;
use crate::irc::Message;
use crate::sasl;

/// Longest accepted IRC line, sized for IRCv3 tags and long ISUPPORT bursts.
pub const MAX_LINE_LEN: usize = 8191;

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause between a server-sent ERROR and the terminal shutdown, so the
/// consumer sees the message first.
const ERROR_GRACE: Duration = Duration::from_millis(500);
const OUTBOUND_CAPACITY: usize = 32;
const MESSAGES_CAPACITY: usize = 32;
const EVENTS_CAPACITY: usize = 16;

const RPL_WELCOME: &str = "001";
const RPL_ISUPPORT: &str = "005";
const ERR_NICKNAMEINUSE: &str = "433";
const ERR_NICKCOLLISION: &str = "436";
const ERR_UNAVAILRESOURCE: &str = "437";
const RPL_SASLSUCCESS: &str = "903";
const ERR_SASLFAIL: &str = "904";
const ERR_SASLTOOLONG: &str = "905";

const CTCP_DELIM: char = '\u{1}';

type Writer = Arc<AsyncMutex<Box<dyn AsyncWrite + Send + Unpin>>>;
type Reader = FramedRead<Box<dyn AsyncRead + Send + Unpin>, LinesCodec>;

/// Mutable client state, guarded by a single mutex.
#[derive(Default)]
struct State {
    nick: String,
    connected: bool,
    registered: bool,
    /// Joined channels in insertion order, replayed on reconnect.
    channels: Vec<String>,
    /// Features advertised via RPL_ISUPPORT.
    features: HashMap<String, String>,
}

/// Everything a connection generation's tasks need. Each clone carries a
/// handle on the teardown latch; the supervisor waits for all clones to
/// drop before it releases the connection.
#[derive(Clone)]
struct TaskCtx {
    inner: Arc<Inner>,
    writer: Writer,
    msg_tx: mpsc::Sender<Message>,
    done_tx: mpsc::Sender<()>,
}

struct Inner {
    config: Config,
    state: Mutex<State>,
    backoff: Mutex<Backoff>,
    out_tx: mpsc::Sender<String>,
    out_rx: AsyncMutex<mpsc::Receiver<String>>,
    conn_tx: mpsc::Sender<ConnectionState>,
    /// Taken by the first `connect()`; owned by the supervisor thereafter so
    /// the consumer messages channel closes exactly once, on supervisor exit.
    msg_tx: Mutex<Option<mpsc::Sender<Message>>>,
    /// Socket writer of the current generation, for traffic that bypasses
    /// the outbound queue (PONG, registration).
    writer: Mutex<Option<Writer>>,
    quit_tx: watch::Sender<bool>,
    /// Reconnect trigger for the current generation; the supervisor installs
    /// a fresh channel each cycle.
    reconnect_tx: Mutex<watch::Sender<bool>>,
}

/// Handle to a running IRC client. Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Build a client from a configuration. Returns the client handle, the
    /// inbound message channel, and the connection state channel.
    pub fn new(config: Config) -> (Client, mpsc::Receiver<Message>, mpsc::Receiver<ConnectionState>) {
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (msg_tx, msg_rx) = mpsc::channel(MESSAGES_CAPACITY);
        let (conn_tx, conn_rx) = mpsc::channel(EVENTS_CAPACITY);
        let (quit_tx, _) = watch::channel(false);
        let (reconnect_tx, _) = watch::channel(false);

        let state = State {
            nick: config.nick.clone(),
            ..State::default()
        };

        let inner = Arc::new(Inner {
            config,
            state: Mutex::new(state),
            backoff: Mutex::new(Backoff::default()),
            out_tx,
            out_rx: AsyncMutex::new(out_rx),
            conn_tx,
            msg_tx: Mutex::new(Some(msg_tx)),
            writer: Mutex::new(None),
            quit_tx,
            reconnect_tx: Mutex::new(reconnect_tx),
        });

        (Client { inner }, msg_rx, conn_rx)
    }

    /// Start the supervisor. Dialing, registration, and all retries happen
    /// in the background; progress is reported on `connection_changed`.
    /// Subsequent calls are no-ops.
    pub fn connect(&self) {
        if let Some(msg_tx) = self.inner.msg_tx.lock().unwrap().take() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(run(inner, msg_tx));
        }
    }

    /// Tear down the current transport and dial again after backoff.
    pub fn reconnect(&self) {
        self.inner.raise_reconnect();
    }

    /// Send QUIT and shut the client down. Idempotent: the consumer
    /// messages channel is closed exactly once no matter how often this is
    /// called.
    pub async fn quit(&self) {
        let writer = self.inner.writer.lock().unwrap().clone();
        if let Some(w) = writer {
            let _ = write_line(&w, "QUIT").await;
        }
        self.inner.raise_quit();
    }

    /// Enqueue a raw line for sending once registration completes. Lines
    /// queued before the welcome are preserved and drained in FIFO order.
    pub async fn write(&self, line: &str) {
        self.inner.enqueue(line.to_string()).await;
    }

    /// `write` with format arguments: `client.writef(format_args!(…))`.
    pub async fn writef(&self, args: fmt::Arguments<'_>) {
        self.inner.enqueue(args.to_string()).await;
    }

    /// Request a new nickname. The stored nick updates immediately; the
    /// server echo confirms it.
    pub async fn set_nick(&self, nick: &str) {
        self.inner.state.lock().unwrap().nick = nick.to_string();
        self.inner.enqueue(format!("NICK {nick}")).await;
    }

    pub async fn join(&self, channels: &[&str]) {
        if channels.is_empty() {
            return;
        }
        self.inner.enqueue(format!("JOIN {}", channels.join(","))).await;
    }

    pub async fn part(&self, channels: &[&str]) {
        if channels.is_empty() {
            return;
        }
        self.inner.enqueue(format!("PART {}", channels.join(","))).await;
    }

    pub async fn privmsg(&self, target: &str, msg: &str) {
        self.inner.enqueue(format!("PRIVMSG {target} :{msg}")).await;
    }

    pub async fn notice(&self, target: &str, msg: &str) {
        self.inner.enqueue(format!("NOTICE {target} :{msg}")).await;
    }

    pub async fn whois(&self, nick: &str) {
        self.inner.enqueue(format!("WHOIS {nick}")).await;
    }

    pub async fn topic(&self, channel: &str) {
        self.inner.enqueue(format!("TOPIC {channel}")).await;
    }

    pub async fn invite(&self, nick: &str, channel: &str) {
        self.inner.enqueue(format!("INVITE {nick} {channel}")).await;
    }

    pub async fn kick(&self, channel: &str, users: &[&str]) {
        self.inner
            .enqueue(format!("KICK {channel} {}", users.join(",")))
            .await;
    }

    pub async fn mode(&self, target: &str, modes: &str, params: &str) {
        let line = format!("MODE {target} {modes} {params}");
        self.inner.enqueue(line.trim_end().to_string()).await;
    }

    pub async fn away(&self, message: &str) {
        if message.is_empty() {
            self.inner.enqueue("AWAY".to_string()).await;
        } else {
            self.inner.enqueue(format!("AWAY :{message}")).await;
        }
    }

    pub async fn oper(&self, name: &str, password: &str) {
        self.inner.enqueue(format!("OPER {name} {password}")).await;
    }

    /// The current nickname, tracking server echoes and collision fallback.
    pub fn nick(&self) -> String {
        self.inner.state.lock().unwrap().nick.clone()
    }

    /// Channels the client is currently joined to, in join order.
    pub fn channels(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().channels.clone()
    }

    /// Server features advertised via RPL_ISUPPORT.
    pub fn features(&self) -> HashMap<String, String> {
        self.inner.state.lock().unwrap().features.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().unwrap().connected
    }

    pub fn is_registered(&self) -> bool {
        self.inner.state.lock().unwrap().registered
    }
}

impl Inner {
    async fn enqueue(&self, line: String) {
        let _ = self.out_tx.send(line).await;
    }

    async fn conn_event(&self, event: ConnectionState) {
        let _ = self.conn_tx.send(event).await;
    }

    fn raise_quit(&self) {
        self.quit_tx.send_replace(true);
    }

    fn raise_reconnect(&self) {
        self.reconnect_tx.lock().unwrap().send_replace(true);
    }

    fn quit_raised(&self) -> bool {
        *self.quit_tx.subscribe().borrow()
    }

    fn current_nick(&self) -> String {
        self.state.lock().unwrap().nick.clone()
    }

    fn registered(&self) -> bool {
        self.state.lock().unwrap().registered
    }

    /// Mark the transport gone and forget the generation's writer.
    fn mark_disconnected(&self) {
        let mut st = self.state.lock().unwrap();
        st.connected = false;
        st.registered = false;
        drop(st);
        *self.writer.lock().unwrap() = None;
    }
}

/// Wait until a control signal is raised. Also returns when the sender is
/// gone, which only happens once the generation is over.
async fn wait_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Append CRLF and push one line onto the wire.
async fn write_line(writer: &Writer, line: &str) -> std::io::Result<()> {
    let mut w = writer.lock().await;
    w.write_all(line.as_bytes()).await?;
    w.write_all(b"\r\n").await?;
    w.flush().await
}

fn default_tls_config() -> TlsClientConfig {
    let root_store = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    TlsClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// The supervisor: owns the reconnect loop and the teardown protocol.
async fn run(inner: Arc<Inner>, msg_tx: mpsc::Sender<Message>) {
    let mut quit_rx = inner.quit_tx.subscribe();

    loop {
        // Fresh control channel and teardown latch for this generation.
        let (reconnect_tx, mut reconnect_rx) = watch::channel(false);
        *inner.reconnect_tx.lock().unwrap() = reconnect_tx;
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

        try_connect(&inner, &mut quit_rx, msg_tx.clone(), done_tx.clone()).await;
        drop(done_tx);

        let quit = tokio::select! {
            _ = wait_signal(&mut quit_rx) => true,
            _ = wait_signal(&mut reconnect_rx) => false,
        };

        // Tear down this generation: stop the tasks, wait for both to
        // observe the signal, release the transport.
        inner.mark_disconnected();
        inner.raise_reconnect();
        while done_rx.recv().await.is_some() {}

        if quit {
            // Dropping msg_tx here closes the consumer messages channel.
            return;
        }

        let delay = inner.backoff.lock().unwrap().next();
        tracing::debug!(
            host = %inner.config.host,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_signal(&mut quit_rx) => return,
        }
    }
}

/// Dial until a connection is established. Transient errors retry after
/// backoff; a fatal TLS trust failure or a quit signal stops the loop.
async fn try_connect(
    inner: &Arc<Inner>,
    quit_rx: &mut watch::Receiver<bool>,
    msg_tx: mpsc::Sender<Message>,
    done_tx: mpsc::Sender<()>,
) {
    loop {
        if inner.quit_raised() {
            return;
        }

        match connect(inner, msg_tx.clone(), done_tx.clone()).await {
            Ok(()) => return,
            Err(err) => {
                tracing::warn!(host = %inner.config.host, error = %err, "connection attempt failed");
                inner.mark_disconnected();
                let fatal = err.is_fatal();
                inner.conn_event(ConnectionState::down(err)).await;
                if fatal {
                    return;
                }
            }
        }

        let delay = inner.backoff.lock().unwrap().next();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = wait_signal(quit_rx) => return,
        }
    }
}

/// One dial attempt: TCP, optional TLS with SNI forced to the configured
/// host, registration, and the receive task.
async fn connect(
    inner: &Arc<Inner>,
    msg_tx: mpsc::Sender<Message>,
    done_tx: mpsc::Sender<()>,
) -> Result<(), Error> {
    let config = &inner.config;
    let port = config.dial_port();

    let tcp = tokio::time::timeout(
        DIAL_TIMEOUT,
        TcpStream::connect((config.host.as_str(), port)),
    )
    .await
    .map_err(|_| Error::ConnectTimeout)??;

    let (reader, writer): (Box<dyn AsyncRead + Send + Unpin>, Box<dyn AsyncWrite + Send + Unpin>) =
        if config.tls {
            let tls_config = config
                .tls_config
                .clone()
                .unwrap_or_else(|| Arc::new(default_tls_config()));
            let server_name = ServerName::try_from(config.host.clone())
                .map_err(|_| Error::InvalidServerName(config.host.clone()))?;
            let connector = TlsConnector::from(tls_config);
            let stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(classify_tls_error)?;
            let (r, w) = tokio::io::split(stream);
            (Box::new(r), Box::new(w))
        } else {
            let (r, w) = tokio::io::split(tcp);
            (Box::new(r), Box::new(w))
        };

    let lines: Reader = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let writer: Writer = Arc::new(AsyncMutex::new(writer));

    *inner.writer.lock().unwrap() = Some(Arc::clone(&writer));
    inner.state.lock().unwrap().connected = true;
    inner.conn_event(ConnectionState::up()).await;
    tracing::debug!(host = %config.host, port, tls = config.tls, "connected");

    let ctx = TaskCtx {
        inner: Arc::clone(inner),
        writer: Arc::clone(&writer),
        msg_tx,
        done_tx,
    };

    register(inner, &writer).await?;
    tokio::spawn(recv_loop(ctx, lines));

    Ok(())
}

/// Open the registration handshake: CAP LS when SASL is configured, then
/// PASS, NICK, USER. The rest of the exchange is driven by the receive
/// task's state machine.
async fn register(inner: &Arc<Inner>, writer: &Writer) -> Result<(), Error> {
    let config = &inner.config;
    if config.sasl.is_some() {
        write_line(writer, "CAP LS 302").await?;
    }
    if let Some(ref password) = config.password {
        write_line(writer, &format!("PASS {password}")).await?;
    }
    let nick = inner.current_nick();
    write_line(writer, &format!("NICK {nick}")).await?;
    write_line(
        writer,
        &format!("USER {} 0 * :{}", config.username, config.realname),
    )
    .await?;
    Ok(())
}

/// The receive task: scans lines, feeds the state machine, forwards every
/// message to the consumer, and converts transport failures into reconnect
/// or quit signals.
async fn recv_loop(ctx: TaskCtx, mut lines: Reader) {
    let mut quit_rx = ctx.inner.quit_tx.subscribe();
    let mut reconnect_rx = ctx.inner.reconnect_tx.lock().unwrap().subscribe();

    loop {
        let item = tokio::select! {
            _ = wait_signal(&mut quit_rx) => return,
            _ = wait_signal(&mut reconnect_rx) => return,
            item = lines.next() => item,
        };

        match item {
            Some(Ok(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let msg = match Message::parse(line) {
                    Some(msg) => msg,
                    None => {
                        ctx.inner
                            .conn_event(ConnectionState::down(Error::BadProtocol))
                            .await;
                        ctx.inner.raise_quit();
                        return;
                    }
                };

                let terminal = handle_message(&ctx, &msg).await;
                let _ = ctx.msg_tx.send(msg).await;

                if terminal {
                    tokio::time::sleep(ERROR_GRACE).await;
                    ctx.inner.raise_quit();
                    return;
                }
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                ctx.inner
                    .conn_event(ConnectionState::down(Error::BadProtocol))
                    .await;
                ctx.inner.raise_quit();
                return;
            }
            Some(Err(LinesCodecError::Io(err))) => {
                if ctx.inner.quit_raised() {
                    return;
                }
                ctx.inner
                    .conn_event(ConnectionState::down(Error::Io(err)))
                    .await;
                ctx.inner.raise_reconnect();
                return;
            }
            None => {
                if ctx.inner.quit_raised() {
                    return;
                }
                ctx.inner
                    .conn_event(ConnectionState::down(Error::ConnectionClosed))
                    .await;
                ctx.inner.raise_reconnect();
                return;
            }
        }
    }
}

/// The send task: drains the outbound queue once registration completes.
/// Exits on quit, reconnect, or write failure (the receive task observes a
/// dead connection and schedules the reconnect).
fn start_send_task(ctx: &TaskCtx) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        // ctx holds this generation's latch handle until the task returns.
        let mut quit_rx = ctx.inner.quit_tx.subscribe();
        let mut reconnect_rx = ctx.inner.reconnect_tx.lock().unwrap().subscribe();
        let mut out_rx = ctx.inner.out_rx.lock().await;

        loop {
            let line = tokio::select! {
                _ = wait_signal(&mut quit_rx) => return,
                _ = wait_signal(&mut reconnect_rx) => return,
                line = out_rx.recv() => match line {
                    Some(line) => line,
                    None => return,
                },
            };

            if let Err(err) = write_line(&ctx.writer, &line).await {
                tracing::debug!(error = %err, "outbound write failed");
                return;
            }
        }
    });
}

/// Drive the protocol state machine for one inbound message. Returns true
/// when the engine must terminate (server-sent ERROR).
async fn handle_message(ctx: &TaskCtx, msg: &Message) -> bool {
    let inner = &ctx.inner;
    let from_self = msg.prefix.as_deref() == Some(inner.current_nick().as_str());

    match msg.command.as_str() {
        // PONG bypasses the outbound queue so it cannot sit behind queued
        // traffic, and works before registration.
        "PING" => {
            let token = msg.last_param().unwrap_or("");
            let reply = if token.is_empty() {
                "PONG".to_string()
            } else {
                format!("PONG :{token}")
            };
            let _ = write_line(&ctx.writer, &reply).await;
        }

        RPL_WELCOME => {
            let confirmed = msg
                .param(0)
                .unwrap_or(inner.config.nick.as_str())
                .to_string();
            let channels;
            {
                let mut st = inner.state.lock().unwrap();
                st.nick = confirmed;
                st.registered = true;
                channels = st.channels.clone();
            }
            inner.backoff.lock().unwrap().reset();
            tracing::debug!(host = %inner.config.host, "registered");

            if !channels.is_empty() {
                let _ = write_line(&ctx.writer, &format!("JOIN {}", channels.join(","))).await;
            }
            start_send_task(ctx);
        }

        RPL_ISUPPORT => {
            if msg.params.len() >= 2 {
                let end = if msg.trailing.is_some() {
                    msg.params.len() - 1
                } else {
                    msg.params.len()
                };
                let mut st = inner.state.lock().unwrap();
                for token in &msg.params[1..end] {
                    match token.split_once('=') {
                        Some((key, value)) => {
                            st.features.insert(key.to_string(), value.to_string())
                        }
                        None => st.features.insert(token.to_string(), String::new()),
                    };
                }
            }
        }

        ERR_NICKNAMEINUSE | ERR_NICKCOLLISION | ERR_UNAVAILRESOURCE => {
            if !inner.registered() {
                if let Some(ref fallback) = inner.config.nick_fallback {
                    let rejected = msg
                        .param(1)
                        .map(str::to_string)
                        .unwrap_or_else(|| inner.current_nick());
                    let replacement = fallback(&rejected);
                    tracing::debug!(%rejected, %replacement, "nick unavailable, retrying");
                    inner.state.lock().unwrap().nick = replacement.clone();
                    let _ = write_line(&ctx.writer, &format!("NICK {replacement}")).await;
                }
                // Without a fallback the numeric is forwarded and the
                // consumer decides how to recover.
            }
        }

        "NICK" => {
            if from_self {
                if let Some(new_nick) = msg.last_param() {
                    inner.state.lock().unwrap().nick = new_nick.to_string();
                }
            }
        }

        "JOIN" => {
            if from_self {
                if let Some(channel) = msg.param(0) {
                    let mut st = inner.state.lock().unwrap();
                    if !st.channels.iter().any(|c| c == channel) {
                        st.channels.push(channel.to_string());
                    }
                }
            }
        }

        "PART" => {
            if from_self {
                if let Some(channel) = msg.param(0) {
                    inner.state.lock().unwrap().channels.retain(|c| c != channel);
                }
            }
        }

        "KICK" => {
            if msg.param(1) == Some(inner.current_nick().as_str()) {
                if let Some(channel) = msg.param(0) {
                    inner.state.lock().unwrap().channels.retain(|c| c != channel);
                }
            }
        }

        "QUIT" => {
            if from_self {
                inner.state.lock().unwrap().channels.clear();
            }
        }

        "CAP" => handle_cap(ctx, msg).await,

        "AUTHENTICATE" => {
            if msg.param(0) == Some("+") {
                if let Some(ref sasl) = inner.config.sasl {
                    let payload = sasl::encode_plain(&sasl.username, &sasl.password);
                    let _ = write_line(&ctx.writer, &format!("AUTHENTICATE {payload}")).await;
                }
            }
        }

        // Success or failure both conclude the negotiation so registration
        // can complete.
        RPL_SASLSUCCESS | ERR_SASLFAIL | ERR_SASLTOOLONG => {
            let _ = write_line(&ctx.writer, "CAP END").await;
        }

        "PRIVMSG" => {
            if let (Some(sender), Some(text)) = (msg.prefix.as_deref(), msg.trailing.as_deref()) {
                if let Some((keyword, payload)) = parse_ctcp(text) {
                    handle_ctcp(inner, sender, keyword, payload).await;
                }
            }
        }

        "ERROR" => return true,

        _ => {}
    }

    false
}

/// Capability negotiation, entered only when SASL is configured (the client
/// never opens a CAP exchange otherwise).
async fn handle_cap(ctx: &TaskCtx, msg: &Message) {
    let inner = &ctx.inner;
    let subcommand = msg.param(1).map(str::to_ascii_uppercase);

    match subcommand.as_deref() {
        Some("LS") => {
            let caps = msg.last_param().unwrap_or("");
            let has_sasl = caps
                .split_whitespace()
                .any(|c| c == "sasl" || c.starts_with("sasl="));
            if has_sasl && inner.config.sasl.is_some() {
                let _ = write_line(&ctx.writer, "CAP REQ :sasl").await;
            } else if msg.param(2) == Some("*") {
                // Multiline LS: more capability lines follow.
            } else {
                let _ = write_line(&ctx.writer, "CAP END").await;
            }
        }
        Some("ACK") => {
            let caps = msg.last_param().unwrap_or("");
            if caps.split_whitespace().any(|c| c == "sasl") && inner.config.sasl.is_some() {
                let _ = write_line(&ctx.writer, "AUTHENTICATE PLAIN").await;
            } else {
                let _ = write_line(&ctx.writer, "CAP END").await;
            }
        }
        Some("NAK") => {
            let _ = write_line(&ctx.writer, "CAP END").await;
        }
        _ => {}
    }
}

/// A PRIVMSG whose trailing is framed by 0x01 is a CTCP request.
fn parse_ctcp(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_prefix(CTCP_DELIM)?.strip_suffix(CTCP_DELIM)?;
    let mut parts = inner.splitn(2, ' ');
    let keyword = parts.next().filter(|k| !k.is_empty())?;
    Some((keyword, parts.next().unwrap_or("")))
}

/// CTCP replies go back to the sender as NOTICE, per convention.
async fn handle_ctcp(inner: &Arc<Inner>, sender: &str, keyword: &str, payload: &str) {
    match keyword {
        "VERSION" => {
            inner
                .enqueue(format!(
                    "NOTICE {sender} :{CTCP_DELIM}VERSION {}{CTCP_DELIM}",
                    inner.config.version
                ))
                .await;
        }
        "PING" => {
            inner
                .enqueue(format!("NOTICE {sender} :{CTCP_DELIM}PING {payload}{CTCP_DELIM}"))
                .await;
        }
        "TIME" => {
            inner
                .enqueue(format!(
                    "NOTICE {sender} :{CTCP_DELIM}TIME {}{CTCP_DELIM}",
                    chrono::Local::now().to_rfc2822()
                ))
                .await;
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ctcp_framing() {
        assert_eq!(parse_ctcp("\u{1}VERSION\u{1}"), Some(("VERSION", "")));
        assert_eq!(parse_ctcp("\u{1}PING 12345\u{1}"), Some(("PING", "12345")));
        assert_eq!(parse_ctcp("plain text"), None);
        assert_eq!(parse_ctcp("\u{1}unterminated"), None);
        assert_eq!(parse_ctcp("\u{1}\u{1}"), None);
    }

    #[tokio::test]
    async fn isupport_merges_features() {
        let (client, _msgs, _events) = Client::new(Config::new("irc.example", "alice"));
        let ctx = test_ctx(&client);

        let msg =
            Message::parse(":srv 005 alice CHANTYPES=# NICKLEN=30 WHOX :are supported").unwrap();
        handle_message(&ctx, &msg).await;

        let features = client.features();
        assert_eq!(features.get("CHANTYPES").map(String::as_str), Some("#"));
        assert_eq!(features.get("NICKLEN").map(String::as_str), Some("30"));
        assert_eq!(features.get("WHOX").map(String::as_str), Some(""));
        assert!(!features.contains_key("are supported"));
        assert!(!features.contains_key("alice"));
    }

    #[tokio::test]
    async fn channel_tracking_follows_own_membership() {
        let (client, _msgs, _events) = Client::new(Config::new("irc.example", "alice"));
        let ctx = test_ctx(&client);

        for line in [
            ":alice!u@h JOIN #a",
            ":alice!u@h JOIN #b",
            ":bob!u@h JOIN #c",
            ":alice!u@h JOIN #a",
        ] {
            handle_message(&ctx, &Message::parse(line).unwrap()).await;
        }
        assert_eq!(client.channels(), vec!["#a", "#b"]);

        handle_message(&ctx, &Message::parse(":alice!u@h PART #a").unwrap()).await;
        assert_eq!(client.channels(), vec!["#b"]);

        handle_message(&ctx, &Message::parse(":op!u@h KICK #b alice :bye").unwrap()).await;
        assert!(client.channels().is_empty());
    }

    #[tokio::test]
    async fn nick_echo_updates_state() {
        let (client, _msgs, _events) = Client::new(Config::new("irc.example", "alice"));
        let ctx = test_ctx(&client);

        handle_message(&ctx, &Message::parse(":alice!u@h NICK :alice_").unwrap()).await;
        assert_eq!(client.nick(), "alice_");

        // Someone else's rename does not touch our nick.
        handle_message(&ctx, &Message::parse(":bob!u@h NICK :carol").unwrap()).await;
        assert_eq!(client.nick(), "alice_");
    }

    /// A context whose writer goes nowhere, for exercising the state
    /// machine without a socket.
    fn test_ctx(client: &Client) -> TaskCtx {
        let (msg_tx, _msg_rx) = mpsc::channel(8);
        let (done_tx, _done_rx) = mpsc::channel(1);
        let writer: Writer = Arc::new(AsyncMutex::new(Box::new(tokio::io::sink())));
        TaskCtx {
            inner: Arc::clone(&client.inner),
            writer,
            msg_tx,
            done_tx,
        }
    }
}
