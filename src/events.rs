//! The event-hook surface.
//!
//! Surrounding code supplies an [`EventHandler`] at client construction;
//! every method has a no-op default so handlers implement only what they
//! care about. Hooks run synchronously from `think()` and receive a
//! [`Context`] that permits exactly two things: queueing outbound lines and
//! read-only inspection of the client's state. A handler must not attempt
//! to destroy the client from within a hook.

use std::collections::VecDeque;

use crate::error::ProtocolError;
use crate::message::Message;
use crate::track::Tracker;

/// Outbound lines queued by hooks and flushed by the client's tick.
pub(crate) type OutboundQueue = VecDeque<String>;

/// The restricted client surface available inside a hook.
pub struct Context<'a> {
    nickname: &'a str,
    server_name: &'a str,
    tracker: &'a Tracker,
    out: &'a mut OutboundQueue,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        nickname: &'a str,
        server_name: &'a str,
        tracker: &'a Tracker,
        out: &'a mut OutboundQueue,
    ) -> Self {
        Context {
            nickname,
            server_name,
            tracker,
            out,
        }
    }

    /// The client's current nickname.
    #[must_use]
    pub fn nickname(&self) -> &str {
        self.nickname
    }

    /// The server name advertised at welcome, or empty before then.
    #[must_use]
    pub fn server_name(&self) -> &str {
        self.server_name
    }

    /// Read-only view of the channel/user tables.
    #[must_use]
    pub fn tracker(&self) -> &Tracker {
        self.tracker
    }

    /// Queue a raw line for sending after the current dispatch completes.
    ///
    /// The line must not contain CR or LF.
    pub fn send_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        if line.contains(['\r', '\n']) {
            return Err(ProtocolError::EmbeddedCrLf);
        }
        self.out.push_back(line.to_string());
        Ok(())
    }

    /// Queue a PRIVMSG.
    pub fn privmsg(&mut self, target: &str, text: &str) -> Result<(), ProtocolError> {
        self.send_line(&format!("PRIVMSG {target} :{text}"))
    }

    /// Queue a NOTICE.
    pub fn notice(&mut self, target: &str, text: &str) -> Result<(), ProtocolError> {
        self.send_line(&format!("NOTICE {target} :{text}"))
    }

    /// Queue a JOIN.
    pub fn join(&mut self, channel: &str) -> Result<(), ProtocolError> {
        self.send_line(&format!("JOIN {channel}"))
    }

    /// Queue a PART, with an optional reason.
    pub fn part(&mut self, channel: &str, reason: Option<&str>) -> Result<(), ProtocolError> {
        match reason {
            Some(reason) => self.send_line(&format!("PART {channel} :{reason}")),
            None => self.send_line(&format!("PART {channel}")),
        }
    }
}

/// Hooks invoked by the client as it digests server traffic.
///
/// Model mutations happen before the hook fires, so a handler observing
/// `on_join` already sees the new member through [`Context::tracker`].
/// `on_raw` fires last for every successfully dispatched line.
#[allow(unused_variables)]
pub trait EventHandler {
    /// Registration completed (end of MOTD reached).
    fn on_connect(&mut self, ctx: &mut Context<'_>) {}

    /// The session was torn down.
    fn on_disconnect(&mut self, ctx: &mut Context<'_>, reason: &str) {}

    /// A reconnect attempt finished.
    fn on_reconnect_attempt(&mut self, ctx: &mut Context<'_>, success: bool) {}

    /// Every dispatched inbound line, verbatim.
    fn on_raw(&mut self, ctx: &mut Context<'_>, line: &str) {}

    /// Every numeric reply.
    fn on_numeric(&mut self, ctx: &mut Context<'_>, numeric: u16, msg: &Message<'_>) {}

    /// The server sent an ERROR frame or the transport failed.
    fn on_error(&mut self, ctx: &mut Context<'_>, message: &str) {}

    /// Channel message.
    fn on_chat(&mut self, ctx: &mut Context<'_>, channel: &str, nick: &str, message: &str) {}

    /// Message addressed to the client's own nick.
    fn on_private_chat(&mut self, ctx: &mut Context<'_>, nick: &str, message: &str) {}

    /// NOTICE from a user.
    fn on_notice(&mut self, ctx: &mut Context<'_>, target: &str, sender: &str, message: &str) {}

    /// NOTICE from a server.
    fn on_server_notice(
        &mut self,
        ctx: &mut Context<'_>,
        target: &str,
        server: &str,
        message: &str,
    ) {
    }

    /// CTCP query other than ACTION.
    fn on_ctcp(
        &mut self,
        ctx: &mut Context<'_>,
        target: &str,
        nick: &str,
        command: &str,
        payload: &str,
    ) {
    }

    /// CTCP ACTION (`/me`).
    fn on_action(&mut self, ctx: &mut Context<'_>, target: &str, nick: &str, message: &str) {}

    /// INVITE to a channel.
    fn on_invite(&mut self, ctx: &mut Context<'_>, channel: &str, inviter: &str, invited: &str) {}

    /// A user joined a channel.
    fn on_join(&mut self, ctx: &mut Context<'_>, channel: &str, nick: &str) {}

    /// A user left a channel.
    fn on_part(&mut self, ctx: &mut Context<'_>, channel: &str, nick: &str, reason: &str) {}

    /// A user was kicked from a channel.
    fn on_kick(
        &mut self,
        ctx: &mut Context<'_>,
        channel: &str,
        kicker: &str,
        kicked: &str,
        reason: &str,
    ) {
    }

    /// A user quit the network.
    fn on_quit(&mut self, ctx: &mut Context<'_>, nick: &str, reason: &str) {}

    /// A user changed nicknames.
    fn on_nick(&mut self, ctx: &mut Context<'_>, old_nick: &str, new_nick: &str) {}

    /// A MODE change was applied.
    fn on_mode(&mut self, ctx: &mut Context<'_>, target: &str, setter: &str, modes: &str) {}
}

/// An [`EventHandler`] that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHandler;

impl EventHandler for NullHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_queues_outbound() {
        let tracker = Tracker::new();
        let mut out = OutboundQueue::new();
        let mut ctx = Context::new("alice", "srv", &tracker, &mut out);

        ctx.privmsg("#c", "hello").unwrap();
        ctx.notice("bob", "psst").unwrap();
        ctx.join("#d").unwrap();
        ctx.part("#d", Some("bye")).unwrap();
        ctx.part("#d", None).unwrap();

        assert_eq!(
            out.iter().collect::<Vec<_>>(),
            vec![
                "PRIVMSG #c :hello",
                "NOTICE bob :psst",
                "JOIN #d",
                "PART #d :bye",
                "PART #d",
            ]
        );
    }

    #[test]
    fn test_context_rejects_embedded_crlf() {
        let tracker = Tracker::new();
        let mut out = OutboundQueue::new();
        let mut ctx = Context::new("alice", "srv", &tracker, &mut out);

        assert_eq!(
            ctx.send_line("PRIVMSG #c :evil\r\nQUIT"),
            Err(ProtocolError::EmbeddedCrLf)
        );
        assert!(out.is_empty());
    }

    #[test]
    fn test_null_handler_compiles_with_defaults() {
        let tracker = Tracker::new();
        let mut out = OutboundQueue::new();
        let mut ctx = Context::new("alice", "srv", &tracker, &mut out);
        let mut handler = NullHandler;
        handler.on_connect(&mut ctx);
        handler.on_chat(&mut ctx, "#c", "bob", "hi");
    }
}
