//! CTCP frame handling.
//!
//! A CTCP query is a PRIVMSG body wrapped in 0x01 delimiters:
//! `\x01COMMAND arguments\x01`. A missing closing delimiter is tolerated.
//! `ACTION` frames (`/me`) are surfaced separately from other CTCP queries.

const DELIM: char = '\u{1}';

/// A CTCP query split out of a PRIVMSG body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ctcp<'a> {
    /// The CTCP command, e.g. `ACTION`, `VERSION`.
    pub command: &'a str,
    /// Everything after the command, without the trailing delimiter.
    pub payload: &'a str,
}

impl<'a> Ctcp<'a> {
    /// Split a message body into a CTCP frame, if it is one.
    pub fn parse(text: &'a str) -> Option<Self> {
        let inner = text.strip_prefix(DELIM)?;
        let inner = inner.strip_suffix(DELIM).unwrap_or(inner);
        let (command, payload) = match inner.find(' ') {
            Some(sp) => (&inner[..sp], &inner[sp + 1..]),
            None => (inner, ""),
        };
        if command.is_empty() {
            return None;
        }
        Some(Ctcp { command, payload })
    }

    /// Whether this frame is an `ACTION` (`/me`).
    #[must_use]
    pub fn is_action(&self) -> bool {
        self.command.eq_ignore_ascii_case("ACTION")
    }
}
