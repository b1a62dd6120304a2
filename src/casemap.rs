//! Case folding for nicknames and channel names.
//!
//! Nick and channel comparisons are ASCII case-insensitive. The RFC 1459
//! `{}|~` / `[]\^` equivalences are deliberately not applied; modern
//! networks advertise `CASEMAPPING=ascii` and the tables key on the plain
//! ASCII fold.

/// Lowercases a nick or channel name for use as a table key.
pub fn irc_to_lower(s: &str) -> String {
    s.to_ascii_lowercase()
}

/// Compares two nicks or channel names case-insensitively.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
