//! IRC wire-format message parsing.
//!
//! This module provides zero-copy parsing of IRC lines using the nom
//! parser combinator library. Parsing is **total**: every input line
//! produces a [`Message`], with fields left empty or absent where the line
//! carried no information. Borrowed views into the input are used
//! throughout; callers copy only when storing.

use nom::{
    bytes::complete::take_while1,
    character::complete::{char, space0},
    combinator::opt,
    sequence::preceded,
    IResult,
};

/// The sender portion of a message (the part after `:` and before the first
/// space).
///
/// A prefix with `!`/`@` separators names a user; without separators the
/// whole prefix is a server name and is kept in [`Prefix::nick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prefix<'a> {
    /// The unsplit prefix text.
    pub raw: &'a str,
    /// Nickname, or the server name when no separators are present.
    pub nick: &'a str,
    /// Ident between `!` and `@`, if present.
    pub user: Option<&'a str>,
    /// Hostname after `@`, if present.
    pub host: Option<&'a str>,
}

impl<'a> Prefix<'a> {
    /// Split a raw prefix into nick, user, and host on `!` and `@`.
    pub fn parse(raw: &'a str) -> Self {
        let (nick_user, host) = match raw.find('@') {
            Some(at) => (&raw[..at], Some(&raw[at + 1..])),
            None => (raw, None),
        };
        let (nick, user) = match nick_user.find('!') {
            Some(bang) => (&nick_user[..bang], Some(&nick_user[bang + 1..])),
            None => (nick_user, None),
        };
        Prefix {
            raw,
            nick,
            user,
            host,
        }
    }

    /// Whether this prefix names a server rather than a user.
    ///
    /// A prefix without `!` or `@` separators is a server name.
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.user.is_none() && self.host.is_none()
    }
}

/// A parsed IRC line with borrowed string slices.
///
/// `params` holds the middle parameters only; the trailing parameter
/// (introduced by ` :`) is kept separately in [`Message::trailing`],
/// verbatim including internal spaces. An empty trailing (`:` followed by
/// nothing) is preserved as empty-but-present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message<'a> {
    /// The line as received, terminators stripped.
    pub raw: &'a str,
    /// Sender, if the line started with `:`.
    pub prefix: Option<Prefix<'a>>,
    /// Command word or numeric string. Empty only for degenerate input.
    pub command: &'a str,
    /// Middle parameters in order.
    pub params: Vec<&'a str>,
    /// Trailing parameter, absent when no ` :` was found.
    pub trailing: Option<&'a str>,
}

fn parse_prefix(input: &str) -> IResult<&str, &str> {
    preceded(char(':'), take_while1(|c| c != ' '))(input)
}

fn parse_command(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != ' ')(input)
}

/// Split the remainder after the command into middles and trailing.
///
/// Runs of spaces separate parameters; a parameter starting with `:` is the
/// trailing parameter and consumes the rest of the line verbatim.
fn parse_params(input: &str) -> (Vec<&str>, Option<&str>) {
    let mut params = Vec::new();
    let mut trailing = None;
    let mut rest = input;

    while rest.as_bytes().first() == Some(&b' ') {
        while rest.as_bytes().first() == Some(&b' ') {
            rest = &rest[1..];
        }
        if rest.is_empty() {
            break;
        }
        if let Some(stripped) = rest.strip_prefix(':') {
            trailing = Some(stripped);
            break;
        }
        let end = rest.find(' ').unwrap_or(rest.len());
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    (params, trailing)
}

impl<'a> Message<'a> {
    /// Parse one IRC line.
    ///
    /// Total over its input: malformed lines yield a message with empty
    /// fields where information was missing. Trailing CR/LF is stripped.
    pub fn parse(line: &'a str) -> Self {
        let raw = line.trim_end_matches(['\r', '\n']);

        // opt() cannot fail, so the unwraps below are on Ok by construction.
        let (rest, _) = space0::<_, nom::error::Error<&str>>(raw).unwrap_or((raw, ""));
        let (rest, prefix) = opt(parse_prefix)(rest).unwrap_or((rest, None));
        let (rest, _) = space0::<_, nom::error::Error<&str>>(rest).unwrap_or((rest, ""));
        let (rest, command) = opt(parse_command)(rest).unwrap_or((rest, None));
        let (params, trailing) = parse_params(rest);

        Message {
            raw,
            prefix: prefix.map(Prefix::parse),
            command: command.unwrap_or(""),
            params,
            trailing,
        }
    }

    /// The numeric value of the command, if it is all ASCII digits.
    #[must_use]
    pub fn numeric(&self) -> Option<u16> {
        if self.command.is_empty() || !self.command.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.command.parse().ok()
    }

    /// The `i`th middle parameter.
    #[must_use]
    pub fn param(&self, i: usize) -> Option<&'a str> {
        self.params.get(i).copied()
    }

    /// The trailing parameter, or the last middle when no trailing exists.
    ///
    /// Several commands (PART, QUIT, KICK reasons) accept either form.
    #[must_use]
    pub fn text(&self) -> Option<&'a str> {
        self.trailing.or_else(|| self.params.last().copied())
    }

    /// Reconstruct the wire form of this message, without terminators.
    #[must_use]
    pub fn render(&self) -> String {
        let mut s = String::with_capacity(self.raw.len());
        if let Some(prefix) = &self.prefix {
            s.push(':');
            s.push_str(prefix.raw);
            s.push(' ');
        }
        s.push_str(self.command);
        for p in &self.params {
            s.push(' ');
            s.push_str(p);
        }
        if let Some(t) = self.trailing {
            s.push_str(" :");
            s.push_str(t);
        }
        s
    }
}

impl std::fmt::Display for Message<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
