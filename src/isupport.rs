//! RPL_ISUPPORT (005) absorption.
//!
//! The server advertises its parameters as space-separated `KEY` or
//! `KEY=VALUE` tokens. The client folds the tokens it understands into a
//! [`ServerParams`] block; everything else is ignored. Absorbing the same
//! 005 line twice yields the same block.

/// A single 005 token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IsupportEntry<'a> {
    /// Token key, e.g. `PREFIX`.
    pub key: &'a str,
    /// Value after `=`, if any.
    pub value: Option<&'a str>,
}

impl<'a> IsupportEntry<'a> {
    /// Split one token on its first `=`.
    pub fn parse(token: &'a str) -> Self {
        match token.find('=') {
            Some(eq) => IsupportEntry {
                key: &token[..eq],
                value: Some(&token[eq + 1..]),
            },
            None => IsupportEntry {
                key: token,
                value: None,
            },
        }
    }
}

/// The parsed value of a `PREFIX=(modes)sigils` token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrefixSpec<'a> {
    /// Mode letters, most significant first.
    pub modes: &'a str,
    /// Matching sigils in the same order.
    pub prefixes: &'a str,
}

impl<'a> PrefixSpec<'a> {
    /// Parse `(ov)@+` style values. The two halves must be the same length.
    pub fn parse(s: &'a str) -> Option<Self> {
        let open = s.find('(')?;
        let close = s[open + 1..].find(')')? + open + 1;
        let modes = &s[open + 1..close];
        let prefixes = &s[close + 1..];
        if modes.is_empty() || modes.len() != prefixes.len() {
            return None;
        }
        Some(PrefixSpec { modes, prefixes })
    }
}

/// The parsed value of a `CHANMODES=A,B,C,D` token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChanModes<'a> {
    /// List modes; always take an argument.
    pub a: &'a str,
    /// Parametric modes; always take an argument.
    pub b: &'a str,
    /// Numeric modes; take an argument only when set.
    pub c: &'a str,
    /// Flag modes; never take an argument.
    pub d: &'a str,
}

impl<'a> ChanModes<'a> {
    /// Split the four comma-separated mode classes.
    pub fn parse(s: &'a str) -> Option<Self> {
        let mut parts = s.splitn(4, ',');
        let (a, b, c, d) = (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        Some(ChanModes { a, b, c, d })
    }
}

/// Server-advertised parameters, with RFC 1459 baseline defaults.
///
/// `prefixes` and `prefix_modes` are positionally matched, most significant
/// first: `prefix_modes[i]` grants the sigil `prefixes[i]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerParams {
    /// Server name from the 001/004 prefix.
    pub server_name: String,
    /// Ordered prefix mode letters.
    pub prefix_modes: String,
    /// Ordered prefix sigils.
    pub prefixes: String,
    /// Channel-prefix characters.
    pub chan_types: String,
    /// CHANMODES class A (list) letters.
    pub mode_a: String,
    /// CHANMODES class B (parametric) letters.
    pub mode_b: String,
    /// CHANMODES class C (numeric) letters.
    pub mode_c: String,
    /// CHANMODES class D (flag) letters.
    pub mode_d: String,
}

impl Default for ServerParams {
    fn default() -> Self {
        ServerParams {
            server_name: String::new(),
            prefix_modes: "ov".into(),
            prefixes: "@+".into(),
            chan_types: "#".into(),
            mode_a: "b".into(),
            mode_b: "k".into(),
            mode_c: "l".into(),
            mode_d: "psitnm".into(),
        }
    }
}

impl ServerParams {
    /// Fold a 005 token list into the block.
    ///
    /// `tokens` are the middle parameters after the target nick; the
    /// `:are supported by this server` trailing has already been split off
    /// by the parser. Unknown keys are ignored; malformed values leave the
    /// current setting untouched.
    pub fn absorb(&mut self, tokens: &[&str]) {
        for &token in tokens {
            if token.is_empty() {
                continue;
            }
            let entry = IsupportEntry::parse(token);
            match entry.key {
                k if k.eq_ignore_ascii_case("PREFIX") => {
                    if let Some(spec) = entry.value.and_then(PrefixSpec::parse) {
                        self.prefix_modes = spec.modes.to_string();
                        self.prefixes = spec.prefixes.to_string();
                    }
                }
                k if k.eq_ignore_ascii_case("CHANMODES") => {
                    if let Some(modes) = entry.value.and_then(ChanModes::parse) {
                        self.mode_a = modes.a.to_string();
                        self.mode_b = modes.b.to_string();
                        self.mode_c = modes.c.to_string();
                        self.mode_d = modes.d.to_string();
                    }
                }
                k if k.eq_ignore_ascii_case("CHANTYPES") => {
                    if let Some(types) = entry.value {
                        if !types.is_empty() {
                            self.chan_types = types.to_string();
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Whether `name` is a channel per the advertised channel-prefix set.
    #[must_use]
    pub fn is_channel(&self, name: &str) -> bool {
        name.chars()
            .next()
            .is_some_and(|c| self.chan_types.contains(c))
    }

    /// The sigil granted by a prefix mode letter.
    #[must_use]
    pub fn prefix_for_mode(&self, mode: char) -> Option<char> {
        let idx = self.prefix_modes.find(mode)?;
        self.prefixes.chars().nth(idx)
    }

    /// Whether `mode` is a prefix mode letter.
    #[must_use]
    pub fn is_prefix_mode(&self, mode: char) -> bool {
        self.prefix_modes.contains(mode)
    }

    /// Priority rank of a sigil; lower is more significant.
    #[must_use]
    pub fn prefix_priority(&self, sigil: char) -> Option<usize> {
        self.prefixes.find(sigil)
    }
}
