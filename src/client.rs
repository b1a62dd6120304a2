//! The IRC client core.
//!
//! [`Session`] is the sans-IO half: it digests parsed lines, mutates the
//! channel/user model, fires hooks, and queues outbound replies. [`Client`]
//! wraps a session with a transport, the line framer, the reconnect
//! controller, and the raw-line log, and is driven by repeated
//! [`Client::think`] calls from the application's tick loop.
//!
//! One `think()` performs at most one unit of work: a reconnect attempt, or
//! reading and dispatching up to [`LINES_PER_THINK`] framed lines plus a
//! flush of whatever those lines queued.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::casemap::irc_eq;
use crate::config::{SectionHandle, SectionPair};
use crate::ctcp::Ctcp;
use crate::error::{ConfigError, Error, HandshakeError, ProtocolError, TransportError};
use crate::events::{Context, EventHandler, OutboundQueue};
use crate::framer::{Framed, LineFramer};
use crate::handshake::{Action, Handshake, HandshakeConfig, SaslCredentials};
use crate::isupport::ServerParams;
use crate::message::Message;
use crate::reconnect::Reconnector;
use crate::track::{Channel, Tracker};
use crate::transport::{ClientIdentity, Connector, Transport};

/// Upper bound on framed lines dispatched per `think()`.
pub const LINES_PER_THINK: usize = 32;

/// Wall-clock budget for completing registration.
pub const HANDSHAKE_BUDGET: Duration = Duration::from_secs(60);

const DEFAULT_RECONNECT_DELAY_SECS: i64 = 15;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: i32 = 3;

/// Connection lifecycle of a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport; a reconnect may be pending.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Transport up, registration incomplete.
    Registering,
    /// Registered and ready.
    Connected,
    /// No further reconnects; the owner should drop the client.
    Dead,
}

/// What a `think()` call concluded about the client's viability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThinkStatus {
    /// Keep ticking.
    Alive,
    /// The client is dead; drop it.
    Dead,
}

/// Outcome of dispatching one inbound line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    /// Nothing noteworthy for the driver.
    Continue,
    /// Registration just completed.
    Ready,
    /// The session must be torn down.
    Disconnect(String),
}

/// The sans-IO session: model, hooks, and outbound queue, with no socket.
///
/// Drive it with [`Session::handle_line`] and drain
/// [`Session::pop_outbound`]; the [`Client`] does exactly this around a
/// real transport, and tests do it with literal server lines.
pub struct Session<H: EventHandler> {
    sections: SectionPair,
    handler: H,
    handshake: Handshake,
    params: ServerParams,
    tracker: Tracker,
    outbound: OutboundQueue,
    nickname: String,
    ready: bool,
}

impl<H: EventHandler> Session<H> {
    /// Bind a session to its config sections and event handler.
    pub fn new(sections: SectionPair, handler: H) -> Self {
        let nickname = sections.read_or("Nick", "");
        Session {
            handshake: Handshake::new(HandshakeConfig {
                nickname: nickname.clone(),
                realname: nickname.clone(),
                sasl: None,
            }),
            sections,
            handler,
            params: ServerParams::default(),
            tracker: Tracker::new(),
            outbound: OutboundQueue::new(),
            nickname,
            ready: false,
        }
    }

    /// The config section pair this session reads from.
    #[must_use]
    pub fn sections(&self) -> &SectionPair {
        &self.sections
    }

    /// The event handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Mutable access to the event handler.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Mutable access for rehash re-binding.
    pub fn sections_mut(&mut self) -> &mut SectionPair {
        &mut self.sections
    }

    /// Read-only view of the channel/user tables.
    #[must_use]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Mutable model access (channel kind reclassification).
    pub fn tracker_mut(&mut self) -> &mut Tracker {
        &mut self.tracker
    }

    /// The server-advertised parameter block.
    #[must_use]
    pub fn params(&self) -> &ServerParams {
        &self.params
    }

    /// The client's current nickname.
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Whether registration has completed this session.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Queue one outbound line (no CR/LF allowed).
    pub fn push_outbound(&mut self, line: String) -> Result<(), ProtocolError> {
        if line.contains(['\r', '\n']) {
            return Err(ProtocolError::EmbeddedCrLf);
        }
        self.outbound.push_back(line);
        Ok(())
    }

    /// Take the next queued outbound line.
    pub fn pop_outbound(&mut self) -> Option<String> {
        self.outbound.pop_front()
    }

    /// Begin a fresh registration: re-read identity and SASL keys from the
    /// (possibly rehashed) config and queue the opening handshake lines.
    pub fn reset_for_connect(&mut self) -> Result<(), ConfigError> {
        let nickname = self.sections.require("Nick")?;
        let realname = self.sections.read_or("Realname", &nickname);
        let sasl = match (
            self.sections.read("SASL.Account"),
            self.sections.read("SASL.Password"),
        ) {
            (Some(account), Some(password)) => Some(SaslCredentials { account, password }),
            _ => None,
        };

        self.tracker.clear();
        self.params = ServerParams::default();
        self.outbound.clear();
        self.ready = false;
        self.nickname = nickname.clone();
        self.handshake = Handshake::new(HandshakeConfig {
            nickname,
            realname,
            sasl,
        });
        for action in self.handshake.start() {
            if let Action::Send(line) = action {
                self.outbound.push_back(line);
            }
        }
        Ok(())
    }

    /// Tear down session state, firing `on_disconnect`.
    pub fn end(&mut self, reason: &str) {
        let mut ctx = Context::new(
            &self.nickname,
            &self.params.server_name,
            &self.tracker,
            &mut self.outbound,
        );
        self.handler.on_disconnect(&mut ctx, reason);
        self.tracker.clear();
        self.outbound.clear();
        self.ready = false;
    }

    /// Fire `on_error` (transport failures and ERROR frames).
    pub fn notify_error(&mut self, message: &str) {
        let mut ctx = Context::new(
            &self.nickname,
            &self.params.server_name,
            &self.tracker,
            &mut self.outbound,
        );
        self.handler.on_error(&mut ctx, message);
    }

    /// Fire `on_reconnect_attempt`.
    pub fn notify_reconnect_attempt(&mut self, success: bool) {
        let mut ctx = Context::new(
            &self.nickname,
            &self.params.server_name,
            &self.tracker,
            &mut self.outbound,
        );
        self.handler.on_reconnect_attempt(&mut ctx, success);
    }

    /// Queue `text` to every channel whose kind is at least `threshold`.
    /// Returns the number of channels messaged.
    pub fn queue_to_channels(
        &mut self,
        threshold: i32,
        text: &str,
    ) -> Result<usize, ProtocolError> {
        if text.contains(['\r', '\n']) {
            return Err(ProtocolError::EmbeddedCrLf);
        }
        let lines: Vec<String> = self
            .tracker
            .channels()
            .filter(|c| c.kind() >= threshold)
            .map(|c| format!("PRIVMSG {} :{}", c.name(), text))
            .collect();
        let count = lines.len();
        self.outbound.extend(lines);
        Ok(count)
    }

    fn default_kind(&self) -> i32 {
        self.sections.read_int("DefaultChannelType", 0)
    }

    /// Dispatch one inbound line: registration machine, model mutation,
    /// hooks. `on_raw` fires last.
    pub fn handle_line(&mut self, line: &str) -> LineOutcome {
        let msg = Message::parse(line);
        let mut outcome = LineOutcome::Continue;
        let mut became_ready = false;

        if !self.handshake.is_ready() {
            for action in self.handshake.feed(&msg) {
                match action {
                    Action::Send(out) => self.outbound.push_back(out),
                    Action::Ready => {
                        self.ready = true;
                        became_ready = true;
                    }
                    Action::Failed(HandshakeError::SaslFailed(reason)) => {
                        warn!(reason = %reason, "SASL failed; continuing unauthenticated");
                    }
                    Action::Failed(HandshakeError::ServerError(reason)) => {
                        outcome = LineOutcome::Disconnect(reason);
                    }
                }
            }
            if !self.handshake.is_ready() && self.nickname != self.handshake.nickname() {
                self.nickname = self.handshake.nickname().to_string();
            }
        }

        self.dispatch(&msg, &mut outcome);

        if let Some(numeric) = msg.numeric() {
            let mut ctx = Context::new(
                &self.nickname,
                &self.params.server_name,
                &self.tracker,
                &mut self.outbound,
            );
            self.handler.on_numeric(&mut ctx, numeric, &msg);
        }

        if became_ready {
            outcome = LineOutcome::Ready;
            let mut ctx = Context::new(
                &self.nickname,
                &self.params.server_name,
                &self.tracker,
                &mut self.outbound,
            );
            self.handler.on_connect(&mut ctx);
        }

        let mut ctx = Context::new(
            &self.nickname,
            &self.params.server_name,
            &self.tracker,
            &mut self.outbound,
        );
        self.handler.on_raw(&mut ctx, msg.raw);

        outcome
    }

    fn dispatch(&mut self, msg: &Message<'_>, outcome: &mut LineOutcome) {
        if let Some(numeric) = msg.numeric() {
            self.dispatch_numeric(numeric, msg);
            return;
        }

        let sender = msg.prefix;
        let nick = sender.map(|p| p.nick).unwrap_or("");

        match msg.command.to_ascii_uppercase().as_str() {
            "PING" => {
                let token = msg.text().unwrap_or("");
                self.outbound.push_back(format!("PONG :{token}"));
            }
            "PRIVMSG" => {
                let Some(target) = msg.param(0) else { return };
                let text = msg.trailing.unwrap_or("");
                if let Some(prefix) = &sender {
                    if !prefix.is_server() {
                        self.tracker.observe_user(prefix);
                    }
                }

                if let Some(ctcp) = Ctcp::parse(text) {
                    let mut ctx = Context::new(
                        &self.nickname,
                        &self.params.server_name,
                        &self.tracker,
                        &mut self.outbound,
                    );
                    if ctcp.is_action() {
                        self.handler.on_action(&mut ctx, target, nick, ctcp.payload);
                    } else {
                        self.handler
                            .on_ctcp(&mut ctx, target, nick, ctcp.command, ctcp.payload);
                    }
                } else if self.params.is_channel(target) {
                    let mut ctx = Context::new(
                        &self.nickname,
                        &self.params.server_name,
                        &self.tracker,
                        &mut self.outbound,
                    );
                    self.handler.on_chat(&mut ctx, target, nick, text);
                } else if irc_eq(target, &self.nickname) {
                    let mut ctx = Context::new(
                        &self.nickname,
                        &self.params.server_name,
                        &self.tracker,
                        &mut self.outbound,
                    );
                    self.handler.on_private_chat(&mut ctx, nick, text);
                }
            }
            "NOTICE" => {
                let Some(target) = msg.param(0) else { return };
                let text = msg.trailing.unwrap_or("");
                let from_server = match &sender {
                    Some(p) => p.is_server(),
                    None => true,
                };
                let mut ctx = Context::new(
                    &self.nickname,
                    &self.params.server_name,
                    &self.tracker,
                    &mut self.outbound,
                );
                if from_server {
                    self.handler.on_server_notice(&mut ctx, target, nick, text);
                } else {
                    self.handler.on_notice(&mut ctx, target, nick, text);
                }
            }
            "JOIN" => {
                let Some(channel) = msg.param(0).or(msg.trailing) else {
                    return;
                };
                let Some(prefix) = sender else { return };
                let default_kind = self.default_kind();
                self.tracker.join(channel, &prefix, default_kind);
                let mut ctx = Context::new(
                    &self.nickname,
                    &self.params.server_name,
                    &self.tracker,
                    &mut self.outbound,
                );
                self.handler.on_join(&mut ctx, channel, nick);
            }
            "PART" => {
                let Some(channel) = msg.param(0) else { return };
                let reason = msg.trailing.unwrap_or("");
                if irc_eq(nick, &self.nickname) {
                    self.tracker.remove_channel(channel);
                } else {
                    self.tracker.part(channel, nick);
                }
                let mut ctx = Context::new(
                    &self.nickname,
                    &self.params.server_name,
                    &self.tracker,
                    &mut self.outbound,
                );
                self.handler.on_part(&mut ctx, channel, nick, reason);
            }
            "KICK" => {
                let Some(channel) = msg.param(0) else { return };
                let Some(victim) = msg.param(1) else { return };
                let reason = msg.trailing.unwrap_or("");
                if irc_eq(victim, &self.nickname) {
                    self.tracker.remove_channel(channel);
                    if self.sections.read_bool("AutoJoinOnKick", false) {
                        self.outbound.push_back(format!("JOIN {channel}"));
                    }
                } else {
                    self.tracker.part(channel, victim);
                }
                let mut ctx = Context::new(
                    &self.nickname,
                    &self.params.server_name,
                    &self.tracker,
                    &mut self.outbound,
                );
                self.handler.on_kick(&mut ctx, channel, nick, victim, reason);
            }
            "QUIT" => {
                if nick.is_empty() {
                    return;
                }
                let reason = msg.trailing.unwrap_or("");
                self.tracker.quit(nick);
                let mut ctx = Context::new(
                    &self.nickname,
                    &self.params.server_name,
                    &self.tracker,
                    &mut self.outbound,
                );
                self.handler.on_quit(&mut ctx, nick, reason);
            }
            "NICK" => {
                let Some(new_nick) = msg.param(0).or(msg.trailing) else {
                    return;
                };
                if nick.is_empty() {
                    return;
                }
                self.tracker.rename(nick, new_nick);
                if irc_eq(nick, &self.nickname) {
                    self.nickname = new_nick.to_string();
                }
                let mut ctx = Context::new(
                    &self.nickname,
                    &self.params.server_name,
                    &self.tracker,
                    &mut self.outbound,
                );
                self.handler.on_nick(&mut ctx, nick, new_nick);
            }
            "MODE" => {
                let Some(target) = msg.param(0) else { return };
                let modestring = msg.param(1).or(msg.trailing).unwrap_or("");
                let args: Vec<&str> = msg.params.iter().skip(2).copied().collect();
                if self.params.is_channel(target) {
                    self.tracker
                        .apply_mode(&self.params, target, modestring, &args);
                }
                let mut modes = modestring.to_string();
                for arg in &args {
                    modes.push(' ');
                    modes.push_str(arg);
                }
                let mut ctx = Context::new(
                    &self.nickname,
                    &self.params.server_name,
                    &self.tracker,
                    &mut self.outbound,
                );
                self.handler.on_mode(&mut ctx, target, nick, &modes);
            }
            "INVITE" => {
                let Some(invited) = msg.param(0) else { return };
                let Some(channel) = msg.param(1).or(msg.trailing) else {
                    return;
                };
                let mut ctx = Context::new(
                    &self.nickname,
                    &self.params.server_name,
                    &self.tracker,
                    &mut self.outbound,
                );
                self.handler.on_invite(&mut ctx, channel, nick, invited);
            }
            "ERROR" => {
                let text = msg.trailing.unwrap_or("connection terminated");
                let mut ctx = Context::new(
                    &self.nickname,
                    &self.params.server_name,
                    &self.tracker,
                    &mut self.outbound,
                );
                self.handler.on_error(&mut ctx, text);
                *outcome = LineOutcome::Disconnect(text.to_string());
            }
            _ => {}
        }
    }

    fn dispatch_numeric(&mut self, numeric: u16, msg: &Message<'_>) {
        match numeric {
            1 => {
                if let Some(prefix) = &msg.prefix {
                    self.params.server_name = prefix.nick.to_string();
                }
                // The server's idea of our nick is authoritative.
                if let Some(nick) = msg.param(0) {
                    self.nickname = nick.to_string();
                }
            }
            4 => {
                if let Some(name) = msg.param(1) {
                    self.params.server_name = name.to_string();
                }
            }
            5 => {
                // The target nick leads the token list; it parses as a bare
                // key, which absorb() treats as a no-op.
                self.params.absorb(&msg.params);
            }
            353 => {
                // :srv 353 <nick> <symbol> <channel> :[sigils]nick ...
                let Some(channel) = msg.params.last().copied() else {
                    return;
                };
                let default_kind = self.default_kind();
                self.tracker.names_begin(channel, default_kind);
                for token in msg.trailing.unwrap_or("").split_whitespace() {
                    self.tracker.names_token(&self.params, channel, token);
                }
            }
            366 => {
                if let Some(channel) = msg.param(1) {
                    self.tracker.names_end(channel);
                }
            }
            _ => {}
        }
    }
}

/// Raw wire log: every inbound and outbound line, timestamped, appended to
/// a file and/or echoed to stderr.
struct RawLog {
    file: Option<std::fs::File>,
    echo: bool,
}

impl RawLog {
    fn closed() -> Self {
        RawLog {
            file: None,
            echo: false,
        }
    }

    fn open(path: Option<&str>, echo: bool) -> Self {
        let file = path.and_then(|p| {
            match std::fs::OpenOptions::new().create(true).append(true).open(p) {
                Ok(f) => Some(f),
                Err(e) => {
                    warn!(path = p, error = %e, "cannot open raw log");
                    None
                }
            }
        });
        RawLog { file, echo }
    }

    fn incoming(&mut self, line: &str) {
        self.write("<<", line);
    }

    fn outgoing(&mut self, line: &str) {
        self.write(">>", line);
    }

    fn write(&mut self, direction: &str, line: &str) {
        if self.file.is_none() && !self.echo {
            return;
        }
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        if let Some(file) = &mut self.file {
            use std::io::Write;
            let _ = writeln!(file, "[{stamp}] {direction} {line}");
        }
        if self.echo {
            eprintln!("[{stamp}] {direction} {line}");
        }
    }
}

/// A long-lived, self-healing IRC client.
///
/// Constructed against a primary config section and a fallback section;
/// missing `Hostname` or `Nick` leaves the client born dead with the error
/// available through [`Client::config_error`].
pub struct Client<H: EventHandler> {
    session: Session<H>,
    status: ConnectionStatus,
    transport: Option<Transport>,
    framer: LineFramer,
    reconnector: Reconnector,
    raw_log: RawLog,
    handshake_started: Option<Instant>,
    config_error: Option<ConfigError>,
}

impl<H: EventHandler> Client<H> {
    /// Create a client bound to its config sections and handler.
    pub fn new(primary: SectionHandle, fallback: SectionHandle, handler: H) -> Self {
        let sections = SectionPair::new(primary, fallback);
        let delay = sections
            .read_long("AutoReconnectDelay", DEFAULT_RECONNECT_DELAY_SECS)
            .max(0) as u64;
        let max_attempts =
            sections.read_int("MaxReconnectAttempts", DEFAULT_MAX_RECONNECT_ATTEMPTS);
        let reconnector = Reconnector::new(Duration::from_secs(delay), max_attempts);

        let mut config_error = None;
        let mut status = ConnectionStatus::Disconnected;
        for key in ["Hostname", "Nick"] {
            if let Err(e) = sections.require(key) {
                warn!(error = %e, "client is unusable");
                config_error = Some(e);
                status = ConnectionStatus::Dead;
                break;
            }
        }

        Client {
            session: Session::new(sections, handler),
            status,
            transport: None,
            framer: LineFramer::new(),
            reconnector,
            raw_log: RawLog::closed(),
            handshake_started: None,
            config_error,
        }
    }

    /// The construction-time configuration error, if the client was born
    /// dead.
    #[must_use]
    pub fn config_error(&self) -> Option<&ConfigError> {
        self.config_error.as_ref()
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// The sans-IO session (model, params, nickname).
    #[must_use]
    pub fn session(&self) -> &Session<H> {
        &self.session
    }

    /// Mutable session access (channel kinds, section re-binding).
    pub fn session_mut(&mut self) -> &mut Session<H> {
        &mut self.session
    }

    /// The client's current nickname.
    #[must_use]
    pub fn nickname(&self) -> &str {
        self.session.nickname()
    }

    /// The server name advertised at welcome.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.session.params().server_name
    }

    /// Read-only view of the channel/user tables.
    #[must_use]
    pub fn tracker(&self) -> &Tracker {
        self.session.tracker()
    }

    /// Iterate all tracked channels.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.session.tracker().channels()
    }

    /// Look up a channel by name, case-insensitively.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.session.tracker().channel(name)
    }

    /// Number of tracked channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.session.tracker().channel_count()
    }

    /// The primary config section's name.
    #[must_use]
    pub fn config_section_name(&self) -> Option<&str> {
        self.session.sections().primary().name()
    }

    /// Read a config key from the primary section, then the fallback.
    #[must_use]
    pub fn read_config_value(&self, key: &str) -> Option<String> {
        self.session.sections().read(key)
    }

    /// Read a boolean config key with a default.
    #[must_use]
    pub fn read_config_bool(&self, key: &str, default: bool) -> bool {
        self.session.sections().read_bool(key, default)
    }

    /// Read an `i32` config key with a default.
    #[must_use]
    pub fn read_config_int(&self, key: &str, default: i32) -> i32 {
        self.session.sections().read_int(key, default)
    }

    /// Read an `i64` config key with a default.
    #[must_use]
    pub fn read_config_long(&self, key: &str, default: i64) -> i64 {
        self.session.sections().read_long(key, default)
    }

    /// Read an `f64` config key with a default.
    #[must_use]
    pub fn read_config_double(&self, key: &str, default: f64) -> f64 {
        self.session.sections().read_double(key, default)
    }

    /// Rebind the primary config section after a rehash.
    pub fn set_primary_section(&mut self, primary: SectionHandle) {
        self.session.sections_mut().set_primary(primary);
    }

    /// Rebind the fallback config section after a rehash.
    pub fn set_fallback_section(&mut self, fallback: SectionHandle) {
        self.session.sections_mut().set_fallback(fallback);
    }

    /// The reconnect controller (delay, attempts, bounds).
    #[must_use]
    pub fn reconnector(&self) -> &Reconnector {
        &self.reconnector
    }

    /// The delay between reconnect attempts.
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnector.delay()
    }

    /// Consecutive reconnect attempts since the last successful handshake.
    #[must_use]
    pub fn reconnect_attempts(&self) -> i32 {
        self.reconnector.attempts()
    }

    /// The reconnect attempt bound; negative means infinite.
    #[must_use]
    pub fn max_reconnect_attempts(&self) -> i32 {
        self.reconnector.max_attempts()
    }

    /// Change the reconnect attempt bound; negative means infinite.
    pub fn set_max_reconnect_attempts(&mut self, max_attempts: i32) {
        self.reconnector.set_max_attempts(max_attempts);
    }

    /// Progress the client by one unit of work.
    pub async fn think(&mut self) -> ThinkStatus {
        match self.status {
            ConnectionStatus::Dead => ThinkStatus::Dead,
            ConnectionStatus::Disconnected => {
                if self.reconnector.stay_dead() || self.reconnector.exhausted() {
                    self.status = ConnectionStatus::Dead;
                    return ThinkStatus::Dead;
                }
                if self.reconnector.due() {
                    self.attempt_connect().await;
                }
                if self.status == ConnectionStatus::Dead {
                    ThinkStatus::Dead
                } else {
                    ThinkStatus::Alive
                }
            }
            ConnectionStatus::Connecting
            | ConnectionStatus::Registering
            | ConnectionStatus::Connected => {
                self.pump().await;
                if self.status == ConnectionStatus::Dead {
                    ThinkStatus::Dead
                } else {
                    ThinkStatus::Alive
                }
            }
        }
    }

    /// Send one raw line immediately (CRLF appended).
    pub async fn send_line(&mut self, line: &str) -> Result<(), Error> {
        self.session.push_outbound(line.to_string())?;
        self.flush_outbound().await;
        Ok(())
    }

    /// Alias for [`Client::send_line`].
    pub async fn raw(&mut self, line: &str) -> Result<(), Error> {
        self.send_line(line).await
    }

    /// Send a PRIVMSG.
    pub async fn privmsg(&mut self, target: &str, text: &str) -> Result<(), Error> {
        self.send_line(&format!("PRIVMSG {target} :{text}")).await
    }

    /// Send a NOTICE.
    pub async fn notice(&mut self, target: &str, text: &str) -> Result<(), Error> {
        self.send_line(&format!("NOTICE {target} :{text}")).await
    }

    /// Join a channel.
    pub async fn join(&mut self, channel: &str) -> Result<(), Error> {
        self.send_line(&format!("JOIN {channel}")).await
    }

    /// Part a channel. Without an explicit reason the configured
    /// `AutoPartMessage` is used.
    pub async fn part(&mut self, channel: &str, reason: Option<&str>) -> Result<(), Error> {
        let configured;
        let reason = match reason {
            Some(r) => Some(r),
            None => {
                configured = self.session.sections().read("AutoPartMessage");
                configured.as_deref()
            }
        };
        match reason {
            Some(r) => self.send_line(&format!("PART {channel} :{r}")).await,
            None => self.send_line(&format!("PART {channel}")).await,
        }
    }

    /// Send a QUIT. The server will close the stream; the reconnect
    /// controller decides what happens next.
    pub async fn quit(&mut self, reason: Option<&str>) -> Result<(), Error> {
        match reason {
            Some(r) => self.send_line(&format!("QUIT :{r}")).await,
            None => self.send_line("QUIT").await,
        }
    }

    /// Message every channel whose kind is at least `threshold`; returns
    /// the number of channels messaged.
    pub async fn message_channels(
        &mut self,
        threshold: i32,
        text: &str,
    ) -> Result<usize, Error> {
        let count = self.session.queue_to_channels(threshold, text)?;
        self.flush_outbound().await;
        Ok(count)
    }

    /// Message every channel with a kind of at least 0.
    pub async fn message_all_channels(&mut self, text: &str) -> Result<usize, Error> {
        self.message_channels(0, text).await
    }

    /// Cancel the current session. The QUIT is best-effort; with
    /// `stay_dead` no further reconnects are attempted.
    pub async fn disconnect(&mut self, reason: Option<&str>, stay_dead: bool) {
        self.reconnector.set_stay_dead(stay_dead);
        if let Some(transport) = &mut self.transport {
            let quit = match reason {
                Some(r) => format!("QUIT :{r}"),
                None => "QUIT".to_string(),
            };
            self.raw_log.outgoing(&quit);
            let _ = transport.send(format!("{quit}\r\n").as_bytes()).await;
        }
        self.teardown(reason.unwrap_or("disconnected")).await;
    }

    async fn attempt_connect(&mut self) {
        let sections = self.session.sections().clone();
        let delay = sections
            .read_long("AutoReconnectDelay", DEFAULT_RECONNECT_DELAY_SECS)
            .max(0) as u64;
        let max_attempts =
            sections.read_int("MaxReconnectAttempts", DEFAULT_MAX_RECONNECT_ATTEMPTS);
        self.reconnector
            .set_policy(Duration::from_secs(delay), max_attempts);

        let Some(hostname) = sections.read("Hostname") else {
            warn!("Hostname vanished from config");
            self.config_error = Some(ConfigError::MissingKey {
                section: sections.primary().name().unwrap_or("<root>").to_string(),
                key: "Hostname".to_string(),
            });
            self.status = ConnectionStatus::Dead;
            return;
        };
        let ssl = sections.read_bool("SSL", false);
        let default_port = if ssl { 6697 } else { 6667 };
        let port = sections.read_int("Port", default_port) as u16;

        self.raw_log = RawLog::open(
            sections.read("LogFile").as_deref(),
            sections.read_bool("PrintOutput", false),
        );

        self.reconnector.begin_attempt();
        self.status = ConnectionStatus::Connecting;
        debug!(host = %hostname, port, ssl, "connecting");

        let mut connector = if ssl {
            Connector::tls(ClientIdentity {
                certificate: sections.read("Certificate").map(Into::into),
                key: sections.read("Key").map(Into::into),
            })
        } else {
            Connector::plain()
        };
        if let Some(bind_host) = sections.read("BindHost") {
            connector = connector.with_local_bind(bind_host, sections.read_int("BindPort", 0) as u16);
        }

        match connector.connect(&hostname, port).await {
            Ok(transport) => {
                self.transport = Some(transport);
                self.framer.reset();
                if let Err(e) = self.session.reset_for_connect() {
                    warn!(error = %e, "client is unusable");
                    self.config_error = Some(e);
                    self.status = ConnectionStatus::Dead;
                    return;
                }
                self.status = ConnectionStatus::Registering;
                self.handshake_started = Some(Instant::now());
                self.session.notify_reconnect_attempt(true);
                self.flush_outbound().await;
            }
            Err(e) => {
                warn!(error = %e, host = %hostname, "connect failed");
                self.session.notify_error(&e.to_string());
                self.session.notify_reconnect_attempt(false);
                self.reconnector.schedule();
                self.status = ConnectionStatus::Disconnected;
                if self.reconnector.exhausted() {
                    self.status = ConnectionStatus::Dead;
                }
            }
        }
    }

    async fn pump(&mut self) {
        if self.status == ConnectionStatus::Registering {
            let overrun = self
                .handshake_started
                .is_some_and(|started| started.elapsed() >= HANDSHAKE_BUDGET);
            if overrun {
                let e = TransportError::HandshakeTimeout;
                self.session.notify_error(&e.to_string());
                self.teardown("handshake timed out").await;
                return;
            }
        }

        let Some(transport) = &mut self.transport else {
            self.status = ConnectionStatus::Disconnected;
            return;
        };

        match transport.read_chunk(self.framer.buffer_mut()).await {
            Ok(0) => self.framer.mark_eof(),
            Ok(_) => {}
            Err(e) if e.is_retry() => {}
            Err(e) => {
                self.session.notify_error(&e.to_string());
                self.teardown("transport error").await;
                return;
            }
        }

        for _ in 0..LINES_PER_THINK {
            match self.framer.next_line() {
                Ok(Framed::Line(bytes)) => {
                    let line = String::from_utf8_lossy(&bytes).into_owned();
                    self.raw_log.incoming(&line);
                    match self.session.handle_line(&line) {
                        LineOutcome::Continue => {}
                        LineOutcome::Ready => {
                            self.status = ConnectionStatus::Connected;
                            self.handshake_started = None;
                            self.reconnector.reset();
                        }
                        LineOutcome::Disconnect(reason) => {
                            self.flush_outbound().await;
                            self.teardown(&reason).await;
                            return;
                        }
                    }
                }
                Ok(Framed::Incomplete) => break,
                Ok(Framed::Eof) => {
                    let e = TransportError::Closed;
                    self.session.notify_error(&e.to_string());
                    self.teardown("connection closed by peer").await;
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "dropping overlong line");
                }
            }
        }

        self.flush_outbound().await;
    }

    async fn flush_outbound(&mut self) {
        while let Some(line) = self.session.pop_outbound() {
            let Some(transport) = &mut self.transport else {
                return;
            };
            self.raw_log.outgoing(&line);
            let wire = format!("{line}\r\n");
            if let Err(e) = transport.send(wire.as_bytes()).await {
                warn!(error = %e, "send failed");
                self.session.notify_error(&e.to_string());
                self.teardown("send failure").await;
                return;
            }
        }
    }

    async fn teardown(&mut self, reason: &str) {
        if let Some(mut transport) = self.transport.take() {
            transport.shutdown().await;
        }
        self.framer.reset();
        self.handshake_started = None;
        self.session.end(reason);

        if self.reconnector.stay_dead() {
            self.status = ConnectionStatus::Dead;
            return;
        }
        self.reconnector.schedule();
        self.status = if self.reconnector.exhausted() {
            ConnectionStatus::Dead
        } else {
            ConnectionStatus::Disconnected
        };
    }
}
