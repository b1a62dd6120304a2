//! Sans-IO registration state machine.
//!
//! The machine consumes parsed server messages and produces actions
//! (lines to send, readiness, failures). It performs no I/O and keeps no
//! timers, which makes the CAP/SASL/NICK/USER flow testable without a
//! socket; the owning client enforces the wall-clock handshake budget.
//!
//! Flow: when SASL credentials are configured the machine opens with
//! `CAP LS`, requests `sasl` if advertised, runs `AUTHENTICATE PLAIN`, and
//! closes negotiation with `CAP END` whatever the outcome. Without SASL it
//! identifies immediately. Registration completes at end-of-MOTD (376) or
//! its absence (422), not at the 001 welcome.

use std::collections::HashSet;

use crate::error::HandshakeError;
use crate::message::Message;
use crate::sasl;

/// Registration progress of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RegistrationState {
    /// No transport yet.
    #[default]
    Offline,
    /// Sent `CAP LS`, collecting the advertised capability list.
    CapNegotiating,
    /// Requested `sasl`, exchanging AUTHENTICATE frames.
    SaslAuthenticating,
    /// NICK/USER sent, awaiting the 001 welcome.
    AwaitingWelcome,
    /// Welcome received, awaiting 376/422.
    AwaitingMotdEnd,
    /// Fully registered.
    Ready,
}

/// SASL PLAIN credentials.
#[derive(Clone, Debug)]
pub struct SaslCredentials {
    /// Account name.
    pub account: String,
    /// Account password.
    pub password: String,
}

/// Identity configuration for one registration attempt.
#[derive(Clone, Debug)]
pub struct HandshakeConfig {
    /// Desired nickname.
    pub nickname: String,
    /// Real name / GECOS.
    pub realname: String,
    /// SASL credentials; their presence gates CAP negotiation.
    pub sasl: Option<SaslCredentials>,
}

/// Actions produced by the handshake state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Send this line to the server.
    Send(String),
    /// Registration is complete; begin normal operation.
    Ready,
    /// A handshake failure occurred. SASL failures are advisory; server
    /// errors tear the session down.
    Failed(HandshakeError),
}

/// Sans-IO state machine for the registration flow.
#[derive(Clone, Debug)]
pub struct Handshake {
    config: HandshakeConfig,
    state: RegistrationState,
    /// Nick currently being negotiated; grows a discriminator on collision.
    nickname: String,
    /// Capabilities advertised across all CAP LS chunks.
    advertised: HashSet<String>,
}

impl Handshake {
    /// Create a machine for one connection attempt.
    #[must_use]
    pub fn new(config: HandshakeConfig) -> Self {
        let nickname = config.nickname.clone();
        Self {
            config,
            state: RegistrationState::Offline,
            nickname,
            advertised: HashSet::new(),
        }
    }

    /// Current registration state.
    #[must_use]
    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// The nick currently in effect, including any collision discriminator.
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Whether registration has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == RegistrationState::Ready
    }

    /// Begin the handshake after the transport connects.
    ///
    /// Opens CAP negotiation when SASL is configured, otherwise identifies
    /// immediately.
    #[must_use]
    pub fn start(&mut self) -> Vec<Action> {
        if self.config.sasl.is_some() {
            self.state = RegistrationState::CapNegotiating;
            vec![Action::Send("CAP LS".into())]
        } else {
            self.identify()
        }
    }

    /// Feed one parsed server message.
    ///
    /// Frames that do not belong to the handshake produce no actions and do
    /// not advance state; the caller dispatches them normally.
    #[must_use]
    pub fn feed(&mut self, msg: &Message<'_>) -> Vec<Action> {
        if msg.command.eq_ignore_ascii_case("ERROR") {
            let reason = msg.trailing.unwrap_or("connection terminated").to_string();
            return vec![Action::Failed(HandshakeError::ServerError(reason))];
        }

        match self.state {
            RegistrationState::CapNegotiating => self.feed_cap(msg),
            RegistrationState::SaslAuthenticating => self.feed_sasl(msg),
            RegistrationState::AwaitingWelcome => self.feed_welcome(msg),
            RegistrationState::AwaitingMotdEnd => self.feed_motd(msg),
            RegistrationState::Offline | RegistrationState::Ready => vec![],
        }
    }

    fn feed_cap(&mut self, msg: &Message<'_>) -> Vec<Action> {
        if !msg.command.eq_ignore_ascii_case("CAP") {
            return vec![];
        }
        match msg.param(1).unwrap_or("").to_ascii_uppercase().as_str() {
            "LS" => {
                // `CAP * LS * :...` marks a continuation chunk; buffer the
                // advertised set until the terminating chunk arrives.
                let continuation = msg.param(2) == Some("*");
                for cap in msg.trailing.unwrap_or("").split_whitespace() {
                    let name = cap.split('=').next().unwrap_or(cap);
                    self.advertised.insert(name.to_string());
                }
                if continuation {
                    return vec![];
                }
                if self.advertised.contains("sasl") {
                    vec![Action::Send("CAP REQ :sasl".into())]
                } else {
                    self.finish_caps()
                }
            }
            "ACK" => {
                let acked = msg.trailing.unwrap_or("");
                if acked.split_whitespace().any(|c| c == "sasl") {
                    self.state = RegistrationState::SaslAuthenticating;
                    vec![Action::Send("AUTHENTICATE PLAIN".into())]
                } else {
                    self.finish_caps()
                }
            }
            "NAK" => self.finish_caps(),
            _ => vec![],
        }
    }

    fn feed_sasl(&mut self, msg: &Message<'_>) -> Vec<Action> {
        if msg.command.eq_ignore_ascii_case("AUTHENTICATE") {
            if msg.param(0) == Some("+") {
                if let Some(creds) = &self.config.sasl {
                    let payload = sasl::encode_plain(&creds.account, &creds.password);
                    if !sasl::fits_single_chunk(&payload) {
                        tracing::warn!(
                            len = payload.len(),
                            "SASL payload exceeds one AUTHENTICATE chunk"
                        );
                    }
                    return vec![Action::Send(format!("AUTHENTICATE {payload}"))];
                }
            }
            return vec![];
        }

        match msg.numeric() {
            // RPL_LOGGEDIN precedes the success numeric; wait for 903.
            Some(900) => vec![],
            Some(903) => self.finish_caps(),
            Some(902) | Some(904..=907) => {
                let reason = msg.trailing.unwrap_or("authentication failed").to_string();
                let mut actions = vec![Action::Failed(HandshakeError::SaslFailed(reason))];
                actions.extend(self.finish_caps());
                actions
            }
            _ => vec![],
        }
    }

    fn feed_welcome(&mut self, msg: &Message<'_>) -> Vec<Action> {
        match msg.numeric() {
            Some(1) => {
                self.state = RegistrationState::AwaitingMotdEnd;
                vec![]
            }
            Some(433) | Some(436) => self.retry_nick(),
            // Some servers skip the MOTD numerals entirely after 001; a 422
            // before 001 would be out of order and is ignored here.
            _ => vec![],
        }
    }

    fn feed_motd(&mut self, msg: &Message<'_>) -> Vec<Action> {
        match msg.numeric() {
            Some(376) | Some(422) => {
                self.state = RegistrationState::Ready;
                vec![Action::Ready]
            }
            _ => vec![],
        }
    }

    /// Close CAP negotiation and identify.
    fn finish_caps(&mut self) -> Vec<Action> {
        let mut actions = vec![Action::Send("CAP END".into())];
        actions.extend(self.identify());
        actions
    }

    fn identify(&mut self) -> Vec<Action> {
        self.state = RegistrationState::AwaitingWelcome;
        vec![
            Action::Send(format!("NICK {}", self.nickname)),
            Action::Send(format!(
                "USER {} 0 * :{}",
                self.nickname, self.config.realname
            )),
        ]
    }

    /// Append a discriminator to the colliding nick and retry.
    fn retry_nick(&mut self) -> Vec<Action> {
        self.nickname.push('_');
        vec![Action::Send(format!("NICK {}", self.nickname))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(sasl: bool) -> HandshakeConfig {
        HandshakeConfig {
            nickname: "alice".into(),
            realname: "Alice Example".into(),
            sasl: sasl.then(|| SaslCredentials {
                account: "alice".into(),
                password: "sesame".into(),
            }),
        }
    }

    fn sends(actions: &[Action]) -> Vec<&str> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    fn feed(machine: &mut Handshake, line: &str) -> Vec<Action> {
        machine.feed(&Message::parse(line))
    }

    #[test]
    fn test_no_sasl_skips_cap() {
        let mut machine = Handshake::new(config(false));
        let actions = machine.start();
        assert_eq!(
            sends(&actions),
            vec!["NICK alice", "USER alice 0 * :Alice Example"]
        );
        assert_eq!(machine.state(), RegistrationState::AwaitingWelcome);
    }

    #[test]
    fn test_sasl_flow() {
        let mut machine = Handshake::new(config(true));
        assert_eq!(sends(&machine.start()), vec!["CAP LS"]);

        let actions = feed(&mut machine, ":srv CAP * LS :multi-prefix sasl");
        assert_eq!(sends(&actions), vec!["CAP REQ :sasl"]);

        let actions = feed(&mut machine, ":srv CAP alice ACK :sasl");
        assert_eq!(sends(&actions), vec!["AUTHENTICATE PLAIN"]);
        assert_eq!(machine.state(), RegistrationState::SaslAuthenticating);

        let actions = feed(&mut machine, "AUTHENTICATE +");
        assert_eq!(
            sends(&actions),
            vec!["AUTHENTICATE AGFsaWNlAHNlc2FtZQ=="]
        );

        let actions = feed(&mut machine, ":srv 903 alice :SASL authentication successful");
        assert_eq!(
            sends(&actions),
            vec!["CAP END", "NICK alice", "USER alice 0 * :Alice Example"]
        );
        assert_eq!(machine.state(), RegistrationState::AwaitingWelcome);

        assert!(feed(&mut machine, ":srv 001 alice :Welcome").is_empty());
        let actions = feed(&mut machine, ":srv 376 alice :End of MOTD");
        assert_eq!(actions, vec![Action::Ready]);
        assert!(machine.is_ready());
    }

    #[test]
    fn test_sasl_not_advertised_ends_cap() {
        let mut machine = Handshake::new(config(true));
        let _ = machine.start();
        let actions = feed(&mut machine, ":srv CAP * LS :multi-prefix away-notify");
        assert_eq!(
            sends(&actions),
            vec!["CAP END", "NICK alice", "USER alice 0 * :Alice Example"]
        );
    }

    #[test]
    fn test_multiline_ls_buffers_until_terminator() {
        let mut machine = Handshake::new(config(true));
        let _ = machine.start();

        let actions = feed(&mut machine, ":srv CAP * LS * :multi-prefix away-notify");
        assert!(actions.is_empty(), "continuation chunk must not act");

        let actions = feed(&mut machine, ":srv CAP * LS :sasl");
        assert_eq!(sends(&actions), vec!["CAP REQ :sasl"]);
    }

    #[test]
    fn test_sasl_failure_continues_unauthenticated() {
        let mut machine = Handshake::new(config(true));
        let _ = machine.start();
        let _ = feed(&mut machine, ":srv CAP * LS :sasl");
        let _ = feed(&mut machine, ":srv CAP alice ACK :sasl");
        let _ = feed(&mut machine, "AUTHENTICATE +");

        let actions = feed(&mut machine, ":srv 904 alice :SASL authentication failed");
        assert!(matches!(
            actions[0],
            Action::Failed(HandshakeError::SaslFailed(_))
        ));
        assert_eq!(
            sends(&actions),
            vec!["CAP END", "NICK alice", "USER alice 0 * :Alice Example"]
        );
    }

    #[test]
    fn test_nick_collision_appends_discriminator() {
        let mut machine = Handshake::new(config(false));
        let _ = machine.start();

        let actions = feed(&mut machine, ":srv 433 * alice :Nickname is already in use");
        assert_eq!(sends(&actions), vec!["NICK alice_"]);
        assert_eq!(machine.nickname(), "alice_");

        let actions = feed(&mut machine, ":srv 436 * alice_ :Nickname collision");
        assert_eq!(sends(&actions), vec!["NICK alice__"]);
    }

    #[test]
    fn test_no_motd_is_ready() {
        let mut machine = Handshake::new(config(false));
        let _ = machine.start();
        let _ = feed(&mut machine, ":srv 001 alice :Welcome");
        let actions = feed(&mut machine, ":srv 422 alice :MOTD File is missing");
        assert_eq!(actions, vec![Action::Ready]);
    }

    #[test]
    fn test_error_frame_fails() {
        let mut machine = Handshake::new(config(false));
        let _ = machine.start();
        let actions = feed(&mut machine, "ERROR :Closing Link: banned");
        assert!(matches!(
            actions[0],
            Action::Failed(HandshakeError::ServerError(_))
        ));
    }

    #[test]
    fn test_unexpected_frames_do_not_advance() {
        let mut machine = Handshake::new(config(false));
        let _ = machine.start();
        assert!(feed(&mut machine, ":srv NOTICE * :*** Looking up your hostname").is_empty());
        assert!(feed(&mut machine, "PING :xyz").is_empty());
        assert_eq!(machine.state(), RegistrationState::AwaitingWelcome);
    }
}
