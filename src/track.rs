//! Channel and user state tracking.
//!
//! The client maintains a shadow model of the server's view: a table of
//! known users and a table of joined channels, each channel holding members
//! that share ownership of the global user records. A user's
//! `channel_count` mirrors the number of channels it appears in; users
//! observed only through direct messages sit at zero until they quit.
//!
//! Nothing here persists across reconnects; the model is rebuilt from the
//! network every session.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::casemap::irc_to_lower;
use crate::isupport::ServerParams;
use crate::message::Prefix;

/// A user known to the client.
#[derive(Debug)]
pub struct User {
    nickname: String,
    username: Option<String>,
    hostname: Option<String>,
    channel_count: usize,
}

impl User {
    /// The user's nickname with original casing.
    #[must_use]
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Ident, if a prefix has carried one.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Hostname, if a prefix has carried one.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Number of tracked channels this user shares with the client.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }
}

/// Shared handle to a [`User`], owned jointly by the user table and every
/// channel membership that references it.
pub type SharedUser = Arc<RwLock<User>>;

/// A channel membership: a user handle plus that channel's prefix sigils.
#[derive(Debug)]
pub struct Member {
    user: SharedUser,
    /// Sigils held on this channel, most significant first.
    prefixes: String,
}

impl Member {
    /// The underlying user record.
    #[must_use]
    pub fn user(&self) -> &SharedUser {
        &self.user
    }

    /// This member's sigils, ordered by advertised priority.
    #[must_use]
    pub fn prefixes(&self) -> &str {
        &self.prefixes
    }

    /// The member's nickname (copied out of the shared record).
    #[must_use]
    pub fn nickname(&self) -> String {
        self.user.read().nickname.clone()
    }

    /// Insert a sigil, keeping advertised priority order. Adding a sigil the
    /// member already holds changes nothing.
    fn add_prefix(&mut self, sigil: char, params: &ServerParams) {
        if self.prefixes.contains(sigil) {
            return;
        }
        let merged: String = params
            .prefixes
            .chars()
            .filter(|&p| p == sigil || self.prefixes.contains(p))
            .collect();
        self.prefixes = merged;
    }

    fn remove_prefix(&mut self, sigil: char) {
        self.prefixes.retain(|c| c != sigil);
    }
}

/// A channel the client is present in.
#[derive(Debug)]
pub struct Channel {
    name: String,
    kind: i32,
    members: HashMap<String, Member>,
    /// Set while a 353 NAMES burst is being accumulated, cleared by 366.
    adding_names: bool,
}

impl Channel {
    fn new(name: &str, kind: i32) -> Self {
        Channel {
            name: name.to_string(),
            kind,
            members: HashMap::new(),
            adding_names: false,
        }
    }

    /// Channel name with original casing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The channel's classification; 0 for newly observed channels.
    #[must_use]
    pub fn kind(&self) -> i32 {
        self.kind
    }

    /// Reclassify this channel (used by surrounding code to gate e.g.
    /// admin-only channels).
    pub fn set_kind(&mut self, kind: i32) {
        self.kind = kind;
    }

    /// Number of known members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Look up a member by nick, case-insensitively.
    #[must_use]
    pub fn member(&self, nick: &str) -> Option<&Member> {
        self.members.get(&irc_to_lower(nick))
    }

    /// Iterate all members.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// The member's most significant sigil, if any.
    #[must_use]
    pub fn member_prefix(&self, nick: &str) -> Option<char> {
        self.member(nick)?.prefixes.chars().next()
    }

    /// Whether a NAMES burst is currently being accumulated.
    #[must_use]
    pub fn adding_names(&self) -> bool {
        self.adding_names
    }
}

/// The client's user and channel tables.
#[derive(Debug, Default)]
pub struct Tracker {
    users: HashMap<String, SharedUser>,
    channels: HashMap<String, Channel>,
}

impl Tracker {
    /// Create empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all state (used on disconnect).
    pub fn clear(&mut self) {
        self.users.clear();
        self.channels.clear();
    }

    /// Look up a user by nick.
    #[must_use]
    pub fn user(&self, nick: &str) -> Option<SharedUser> {
        self.users.get(&irc_to_lower(nick)).cloned()
    }

    /// Number of known users.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Look up a channel by name.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(&irc_to_lower(name))
    }

    /// Mutable channel lookup.
    pub fn channel_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(&irc_to_lower(name))
    }

    /// Iterate all channels.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Number of tracked channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Record a user sighting, creating the record on first observation and
    /// refreshing ident/host when the prefix carries them.
    pub fn observe_user(&mut self, prefix: &Prefix<'_>) -> SharedUser {
        let key = irc_to_lower(prefix.nick);
        let user = self.users.entry(key).or_insert_with(|| {
            Arc::new(RwLock::new(User {
                nickname: prefix.nick.to_string(),
                username: None,
                hostname: None,
                channel_count: 0,
            }))
        });
        {
            let mut record = user.write();
            if let Some(ident) = prefix.user {
                record.username = Some(ident.to_string());
            }
            if let Some(host) = prefix.host {
                record.hostname = Some(host.to_string());
            }
        }
        user.clone()
    }

    fn user_by_nick(&mut self, nick: &str) -> SharedUser {
        let key = irc_to_lower(nick);
        self.users
            .entry(key)
            .or_insert_with(|| {
                Arc::new(RwLock::new(User {
                    nickname: nick.to_string(),
                    username: None,
                    hostname: None,
                    channel_count: 0,
                }))
            })
            .clone()
    }

    /// Decrement a released membership's user and evict it at zero.
    fn release(&mut self, member: Member) {
        let key = {
            let mut record = member.user.write();
            record.channel_count = record.channel_count.saturating_sub(1);
            if record.channel_count > 0 {
                return;
            }
            irc_to_lower(&record.nickname)
        };
        self.users.remove(&key);
    }

    /// Handle a JOIN: ensure the channel and user exist and add the
    /// membership with no prefixes.
    pub fn join(&mut self, channel: &str, prefix: &Prefix<'_>, default_kind: i32) {
        let user = self.observe_user(prefix);
        let key = irc_to_lower(channel);
        let chan = self
            .channels
            .entry(key)
            .or_insert_with(|| Channel::new(channel, default_kind));
        let nick_key = irc_to_lower(prefix.nick);
        if !chan.members.contains_key(&nick_key) {
            user.write().channel_count += 1;
            chan.members.insert(
                nick_key,
                Member {
                    user,
                    prefixes: String::new(),
                },
            );
        }
    }

    /// Remove one member from one channel, evicting an orphaned user.
    /// Returns false when the channel or member was unknown.
    pub fn part(&mut self, channel: &str, nick: &str) -> bool {
        let chan_key = irc_to_lower(channel);
        let Some(chan) = self.channels.get_mut(&chan_key) else {
            return false;
        };
        let Some(member) = chan.members.remove(&irc_to_lower(nick)) else {
            return false;
        };
        self.release(member);
        true
    }

    /// Drop an entire channel (the local user left or was kicked),
    /// releasing every membership.
    pub fn remove_channel(&mut self, name: &str) {
        if let Some(chan) = self.channels.remove(&irc_to_lower(name)) {
            for (_, member) in chan.members {
                self.release(member);
            }
        }
    }

    /// Handle a QUIT: remove the user from every channel and the table.
    pub fn quit(&mut self, nick: &str) {
        let nick_key = irc_to_lower(nick);
        let mut released = Vec::new();
        for chan in self.channels.values_mut() {
            if let Some(member) = chan.members.remove(&nick_key) {
                released.push(member);
            }
        }
        for member in released {
            self.release(member);
        }
        // Users addressed directly never held a membership; drop them too.
        self.users.remove(&nick_key);
    }

    /// Handle a NICK change: rekey the user table and every membership,
    /// preserving prefixes.
    pub fn rename(&mut self, old: &str, new: &str) {
        let old_key = irc_to_lower(old);
        let new_key = irc_to_lower(new);
        if let Some(user) = self.users.remove(&old_key) {
            user.write().nickname = new.to_string();
            self.users.insert(new_key.clone(), user);
        }
        for chan in self.channels.values_mut() {
            if let Some(member) = chan.members.remove(&old_key) {
                chan.members.insert(new_key.clone(), member);
            }
        }
    }

    /// Begin (or continue) a 353 NAMES burst for a channel.
    pub fn names_begin(&mut self, channel: &str, default_kind: i32) {
        let key = irc_to_lower(channel);
        let chan = self
            .channels
            .entry(key)
            .or_insert_with(|| Channel::new(channel, default_kind));
        chan.adding_names = true;
    }

    /// Add one `[<sigils>]<nick>` token from a NAMES reply.
    pub fn names_token(&mut self, params: &ServerParams, channel: &str, token: &str) {
        let sigil_len = token
            .chars()
            .take_while(|&c| params.prefix_priority(c).is_some())
            .map(char::len_utf8)
            .sum::<usize>();
        let (sigils, nick) = token.split_at(sigil_len);
        if nick.is_empty() {
            return;
        }

        let user = self.user_by_nick(nick);
        let Some(chan) = self.channels.get_mut(&irc_to_lower(channel)) else {
            return;
        };
        let nick_key = irc_to_lower(nick);
        let member = chan.members.entry(nick_key).or_insert_with(|| {
            user.write().channel_count += 1;
            Member {
                user: user.clone(),
                prefixes: String::new(),
            }
        });
        // Normalize burst sigils into advertised priority order.
        member.prefixes = params
            .prefixes
            .chars()
            .filter(|&p| sigils.contains(p))
            .collect();
    }

    /// End a NAMES burst (366).
    pub fn names_end(&mut self, channel: &str) {
        if let Some(chan) = self.channels.get_mut(&irc_to_lower(channel)) {
            chan.adding_names = false;
        }
    }

    /// Apply a channel MODE change per the advertised mode classes.
    ///
    /// Argument consumption: prefix modes and classes A/B always take one,
    /// class C only when setting, class D and unknown letters never. An
    /// argument underflow skips the letter and continues.
    pub fn apply_mode(
        &mut self,
        params: &ServerParams,
        channel: &str,
        modestring: &str,
        args: &[&str],
    ) {
        let chan_key = irc_to_lower(channel);
        let Some(chan) = self.channels.get_mut(&chan_key) else {
            return;
        };

        let mut adding = true;
        let mut args = args.iter().copied();
        for letter in modestring.chars() {
            match letter {
                '+' => adding = true,
                '-' => adding = false,
                _ => {
                    let takes_arg = params.is_prefix_mode(letter)
                        || params.mode_a.contains(letter)
                        || params.mode_b.contains(letter)
                        || (adding && params.mode_c.contains(letter));
                    let arg = if takes_arg { args.next() } else { None };
                    if takes_arg && arg.is_none() {
                        debug!(mode = %letter, channel, "mode argument underflow");
                        continue;
                    }

                    if params.is_prefix_mode(letter) {
                        let Some(sigil) = params.prefix_for_mode(letter) else {
                            continue;
                        };
                        let Some(target) = arg else { continue };
                        if let Some(member) = chan.members.get_mut(&irc_to_lower(target)) {
                            if adding {
                                member.add_prefix(sigil, params);
                            } else {
                                member.remove_prefix(sigil);
                            }
                        }
                    }
                }
            }
        }
    }
}
