//! End-to-end scenarios driving the sans-IO session with literal server
//! lines, asserting on the model, the hook stream, and the outbound queue.

use longwire::{
    Config, Context, EventHandler, LineOutcome, Message, SectionPair, Session,
};

/// Records every hook invocation for assertions.
#[derive(Default)]
struct Recorder {
    connects: usize,
    chats: Vec<(String, String, String)>,
    private_chats: Vec<(String, String)>,
    actions: Vec<(String, String, String)>,
    ctcps: Vec<(String, String, String, String)>,
    notices: Vec<(String, String, String)>,
    server_notices: Vec<(String, String, String)>,
    joins: Vec<(String, String)>,
    parts: Vec<(String, String, String)>,
    kicks: Vec<(String, String, String, String)>,
    quits: Vec<(String, String)>,
    nicks: Vec<(String, String)>,
    modes: Vec<(String, String, String)>,
    invites: Vec<(String, String, String)>,
    errors: Vec<String>,
    numerics: Vec<u16>,
    raws: Vec<String>,
}

impl EventHandler for Recorder {
    fn on_connect(&mut self, _ctx: &mut Context<'_>) {
        self.connects += 1;
    }
    fn on_chat(&mut self, _ctx: &mut Context<'_>, channel: &str, nick: &str, message: &str) {
        self.chats
            .push((channel.into(), nick.into(), message.into()));
    }
    fn on_private_chat(&mut self, _ctx: &mut Context<'_>, nick: &str, message: &str) {
        self.private_chats.push((nick.into(), message.into()));
    }
    fn on_action(&mut self, _ctx: &mut Context<'_>, target: &str, nick: &str, message: &str) {
        self.actions
            .push((target.into(), nick.into(), message.into()));
    }
    fn on_ctcp(
        &mut self,
        _ctx: &mut Context<'_>,
        target: &str,
        nick: &str,
        command: &str,
        payload: &str,
    ) {
        self.ctcps
            .push((target.into(), nick.into(), command.into(), payload.into()));
    }
    fn on_notice(&mut self, _ctx: &mut Context<'_>, target: &str, sender: &str, message: &str) {
        self.notices
            .push((target.into(), sender.into(), message.into()));
    }
    fn on_server_notice(
        &mut self,
        _ctx: &mut Context<'_>,
        target: &str,
        server: &str,
        message: &str,
    ) {
        self.server_notices
            .push((target.into(), server.into(), message.into()));
    }
    fn on_join(&mut self, _ctx: &mut Context<'_>, channel: &str, nick: &str) {
        self.joins.push((channel.into(), nick.into()));
    }
    fn on_part(&mut self, _ctx: &mut Context<'_>, channel: &str, nick: &str, reason: &str) {
        self.parts
            .push((channel.into(), nick.into(), reason.into()));
    }
    fn on_kick(
        &mut self,
        _ctx: &mut Context<'_>,
        channel: &str,
        kicker: &str,
        kicked: &str,
        reason: &str,
    ) {
        self.kicks
            .push((channel.into(), kicker.into(), kicked.into(), reason.into()));
    }
    fn on_quit(&mut self, _ctx: &mut Context<'_>, nick: &str, reason: &str) {
        self.quits.push((nick.into(), reason.into()));
    }
    fn on_nick(&mut self, _ctx: &mut Context<'_>, old_nick: &str, new_nick: &str) {
        self.nicks.push((old_nick.into(), new_nick.into()));
    }
    fn on_mode(&mut self, _ctx: &mut Context<'_>, target: &str, setter: &str, modes: &str) {
        self.modes
            .push((target.into(), setter.into(), modes.into()));
    }
    fn on_invite(&mut self, _ctx: &mut Context<'_>, channel: &str, inviter: &str, invited: &str) {
        self.invites
            .push((channel.into(), inviter.into(), invited.into()));
    }
    fn on_error(&mut self, _ctx: &mut Context<'_>, message: &str) {
        self.errors.push(message.into());
    }
    fn on_numeric(&mut self, _ctx: &mut Context<'_>, numeric: u16, _msg: &Message<'_>) {
        self.numerics.push(numeric);
    }
    fn on_raw(&mut self, _ctx: &mut Context<'_>, line: &str) {
        self.raws.push(line.into());
    }
}

const BASE_DOC: &str = r#"
[Net]
Hostname = "irc.example.net"
Nick = "alice"
Realname = "Alice Example"
"#;

const AUTO_REJOIN_DOC: &str = r#"
[Net]
Hostname = "irc.example.net"
Nick = "alice"
AutoJoinOnKick = true
"#;

/// Capture the crate's tracing diagnostics in test output. Repeated calls
/// are fine; only the first subscriber wins.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .compact()
        .try_init();
}

fn session_with(doc: &str) -> Session<Recorder> {
    init_tracing();
    let config = Config::parse(doc).unwrap();
    let pair = SectionPair::new(config.section("Net"), config.root_section());
    let mut session = Session::new(pair, Recorder::default());
    session.reset_for_connect().unwrap();
    session
}

fn drain(session: &mut Session<Recorder>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(line) = session.pop_outbound() {
        lines.push(line);
    }
    lines
}

fn feed(session: &mut Session<Recorder>, lines: &[&str]) {
    for line in lines {
        let _ = session.handle_line(line);
    }
}

/// A registered session sitting in `#c` with alice (@), bob (+), carol.
fn joined_session() -> Session<Recorder> {
    let mut session = session_with(BASE_DOC);
    feed(
        &mut session,
        &[
            ":srv 001 alice :Welcome",
            ":srv 005 PREFIX=(ov)@+ CHANTYPES=# :are supported",
            ":srv 376 alice :End of MOTD",
            ":alice!u@h JOIN #c",
            ":srv 353 alice = #c :@alice +bob carol",
            ":srv 366 alice #c :End",
        ],
    );
    let _ = drain(&mut session);
    session
}

#[test]
fn scenario_welcome_then_motd() {
    let mut session = session_with(BASE_DOC);
    assert_eq!(
        drain(&mut session),
        vec!["NICK alice", "USER alice 0 * :Alice Example"]
    );

    feed(
        &mut session,
        &[
            ":srv 001 alice :Welcome",
            ":srv 005 PREFIX=(ov)@+ CHANTYPES=# :are supported",
        ],
    );
    assert!(!session.is_ready());

    let outcome = session.handle_line(":srv 376 alice :End of MOTD");
    assert_eq!(outcome, LineOutcome::Ready);

    assert!(session.is_ready());
    assert_eq!(session.params().server_name, "srv");
    assert_eq!(session.params().prefixes, "@+");
    assert_eq!(session.params().prefix_modes, "ov");
    assert_eq!(session.handler().connects, 1, "on_connect fired exactly once");
    assert_eq!(session.handler().numerics, vec![1, 5, 376]);
}

#[test]
fn scenario_join_names_end() {
    let session = joined_session();
    let tracker = session.tracker();

    let chan = tracker.channel("#c").unwrap();
    assert_eq!(chan.member_count(), 3);
    assert_eq!(chan.member("alice").unwrap().prefixes(), "@");
    assert_eq!(chan.member("bob").unwrap().prefixes(), "+");
    assert_eq!(chan.member("carol").unwrap().prefixes(), "");
    assert!(!chan.adding_names());

    assert_eq!(tracker.user_count(), 3);
    for nick in ["alice", "bob", "carol"] {
        assert_eq!(tracker.user(nick).unwrap().read().channel_count(), 1);
    }

    assert_eq!(session.handler().joins, vec![("#c".to_string(), "alice".to_string())]);
}

#[test]
fn scenario_mode_prefix_changes() {
    let mut session = joined_session();

    feed(&mut session, &[":op MODE #c +o-v bob bob"]);
    assert_eq!(
        session.tracker().channel("#c").unwrap().member("bob").unwrap().prefixes(),
        "@"
    );

    feed(&mut session, &[":op MODE #c -o bob"]);
    assert_eq!(
        session.tracker().channel("#c").unwrap().member("bob").unwrap().prefixes(),
        ""
    );

    feed(
        &mut session,
        &[":op MODE #c +o bob", ":op MODE #c +o bob"],
    );
    assert_eq!(
        session.tracker().channel("#c").unwrap().member("bob").unwrap().prefixes(),
        "@"
    );

    assert_eq!(session.handler().modes[0].2, "+o-v bob bob");
}

#[test]
fn scenario_nick_change() {
    let mut session = joined_session();
    feed(&mut session, &[":bob!u@h NICK robert"]);

    let tracker = session.tracker();
    let chan = tracker.channel("#c").unwrap();
    assert!(chan.member("bob").is_none());
    assert_eq!(chan.member_count(), 3);
    assert_eq!(chan.member("robert").unwrap().prefixes(), "+");
    assert!(tracker.user("bob").is_none());
    assert!(tracker.user("robert").is_some());
    assert_eq!(
        session.handler().nicks,
        vec![("bob".to_string(), "robert".to_string())]
    );
}

#[test]
fn scenario_kick_local_with_auto_rejoin() {
    let mut session = session_with(AUTO_REJOIN_DOC);
    feed(
        &mut session,
        &[
            ":srv 001 alice :Welcome",
            ":srv 376 alice :End of MOTD",
            ":alice!u@h JOIN #c",
            ":srv 353 alice = #c :@alice +bob carol",
            ":srv 366 alice #c :End",
        ],
    );
    let _ = drain(&mut session);

    feed(&mut session, &[":op KICK #c alice :bye"]);
    assert!(session.tracker().channel("#c").is_none(), "channel removed");
    assert_eq!(
        drain(&mut session),
        vec!["JOIN #c"],
        "outbound JOIN follows the kick"
    );
    assert_eq!(
        session.handler().kicks,
        vec![(
            "#c".to_string(),
            "op".to_string(),
            "alice".to_string(),
            "bye".to_string()
        )]
    );

    // The server echoes the rejoin; the channel comes back.
    feed(&mut session, &[":alice!u@h JOIN #c"]);
    assert!(session.tracker().channel("#c").is_some());
}

#[test]
fn scenario_kick_without_rejoin_empties_tables() {
    let mut session = joined_session();
    feed(&mut session, &[":op KICK #c alice :bye"]);

    assert_eq!(session.tracker().channel_count(), 0);
    assert_eq!(session.tracker().user_count(), 0);
    assert!(drain(&mut session).is_empty(), "no rejoin without the config");
}

#[test]
fn scenario_ping_pong() {
    let mut session = joined_session();
    feed(&mut session, &["PING :abc"]);
    assert_eq!(drain(&mut session), vec!["PONG :abc"]);
}

#[test]
fn local_part_empties_channel() {
    let mut session = joined_session();
    feed(&mut session, &[":alice!u@h PART #c :leaving"]);
    assert_eq!(session.tracker().channel_count(), 0);
    assert_eq!(session.tracker().user_count(), 0);
    assert_eq!(
        session.handler().parts,
        vec![("#c".to_string(), "alice".to_string(), "leaving".to_string())]
    );
}

#[test]
fn remote_part_drops_orphaned_user() {
    let mut session = joined_session();
    feed(&mut session, &[":carol!u@h PART #c"]);
    let tracker = session.tracker();
    assert_eq!(tracker.channel("#c").unwrap().member_count(), 2);
    assert!(tracker.user("carol").is_none());
}

#[test]
fn quit_removes_user_everywhere() {
    let mut session = joined_session();
    feed(
        &mut session,
        &[
            ":bob!u@h JOIN #d",
            ":bob!u@h QUIT :gone fishing",
        ],
    );
    let tracker = session.tracker();
    assert!(tracker.user("bob").is_none());
    assert!(tracker.channel("#c").unwrap().member("bob").is_none());
    assert_eq!(
        session.handler().quits,
        vec![("bob".to_string(), "gone fishing".to_string())]
    );
}

#[test]
fn member_prefixes_stay_a_subsequence_of_advertised() {
    let mut session = session_with(BASE_DOC);
    feed(
        &mut session,
        &[
            ":srv 001 alice :Welcome",
            ":srv 005 PREFIX=(qov)~@+ :are supported",
            ":srv 376 alice :End",
            ":alice!u@h JOIN #c",
            ":srv 353 alice = #c :+dave",
            ":srv 366 alice #c :End",
            // Grant out of priority order.
            ":op MODE #c +q dave",
            ":op MODE #c +o dave",
        ],
    );

    let advertised = &session.params().prefixes;
    let held = session
        .tracker()
        .channel("#c")
        .unwrap()
        .member("dave")
        .unwrap()
        .prefixes()
        .to_string();
    assert_eq!(held, "~@+");

    // Subsequence check, same order.
    let mut positions = held.chars().map(|c| advertised.find(c).unwrap());
    let mut last = None;
    for pos in &mut positions {
        assert!(last.map_or(true, |prev| pos > prev), "order violated");
        last = Some(pos);
    }
}

#[test]
fn isupport_absorb_is_idempotent_across_lines() {
    let mut session = session_with(BASE_DOC);
    let line = ":srv 005 alice PREFIX=(ov)@+ CHANTYPES=#& CHANMODES=beI,k,l,imnt :are supported";
    feed(&mut session, &[line]);
    let first = session.params().clone();
    feed(&mut session, &[line]);
    assert_eq!(session.params(), &first);
}

#[test]
fn names_burst_with_zero_names_clears_flag() {
    let mut session = joined_session();
    feed(&mut session, &[":srv 353 alice = #c :"]);
    assert!(session.tracker().channel("#c").unwrap().adding_names());
    feed(&mut session, &[":srv 366 alice #c :End"]);
    assert!(!session.tracker().channel("#c").unwrap().adding_names());
}

#[test]
fn private_and_channel_chat_paths() {
    let mut session = joined_session();
    feed(
        &mut session,
        &[
            ":bob!u@h PRIVMSG #c :hello channel",
            ":bob!u@h PRIVMSG alice :hello you",
            ":bob!u@h PRIVMSG #c :\u{1}ACTION waves\u{1}",
        ],
    );
    assert_eq!(
        session.handler().chats,
        vec![(
            "#c".to_string(),
            "bob".to_string(),
            "hello channel".to_string()
        )]
    );
    assert_eq!(
        session.handler().private_chats,
        vec![("bob".to_string(), "hello you".to_string())]
    );
    assert_eq!(
        session.handler().actions,
        vec![("#c".to_string(), "bob".to_string(), "waves".to_string())]
    );
}

#[test]
fn ctcp_query_path() {
    let mut session = joined_session();
    feed(&mut session, &[":bob!u@h PRIVMSG alice :\u{1}VERSION\u{1}"]);
    assert_eq!(
        session.handler().ctcps,
        vec![(
            "alice".to_string(),
            "bob".to_string(),
            "VERSION".to_string(),
            String::new()
        )]
    );
}

#[test]
fn notice_paths_split_on_sender_kind() {
    let mut session = joined_session();
    feed(
        &mut session,
        &[
            ":bob!u@h NOTICE alice :psst",
            ":irc.example.net NOTICE alice :*** maintenance at midnight",
        ],
    );
    assert_eq!(
        session.handler().notices,
        vec![("alice".to_string(), "bob".to_string(), "psst".to_string())]
    );
    assert_eq!(
        session.handler().server_notices,
        vec![(
            "alice".to_string(),
            "irc.example.net".to_string(),
            "*** maintenance at midnight".to_string()
        )]
    );
}

#[test]
fn invite_hook() {
    let mut session = joined_session();
    feed(&mut session, &[":bob!u@h INVITE alice :#secret"]);
    assert_eq!(
        session.handler().invites,
        vec![(
            "#secret".to_string(),
            "bob".to_string(),
            "alice".to_string()
        )]
    );
}

#[test]
fn error_frame_disconnects() {
    let mut session = joined_session();
    let outcome = session.handle_line("ERROR :Closing Link: flooding");
    assert_eq!(
        outcome,
        LineOutcome::Disconnect("Closing Link: flooding".to_string())
    );
    assert_eq!(session.handler().errors, vec!["Closing Link: flooding"]);
}

#[test]
fn on_raw_fires_for_every_line() {
    let mut session = joined_session();
    let before = session.handler().raws.len();
    feed(
        &mut session,
        &["PING :x", ":bob!u@h PRIVMSG #c :hi", ":srv 999 alice :whatever"],
    );
    assert_eq!(session.handler().raws.len(), before + 3);
    assert!(session.handler().numerics.contains(&999));
}

#[test]
fn message_channels_honours_kind_threshold() {
    let mut session = joined_session();
    feed(&mut session, &[":alice!u@h JOIN #admin"]);
    session
        .tracker_mut()
        .channel_mut("#admin")
        .unwrap()
        .set_kind(2);
    let _ = drain(&mut session);

    let sent = session.queue_to_channels(1, "admins only").unwrap();
    assert_eq!(sent, 1);
    assert_eq!(drain(&mut session), vec!["PRIVMSG #admin :admins only"]);

    let sent = session.queue_to_channels(0, "everyone").unwrap();
    assert_eq!(sent, 2);
}

#[test]
fn hooks_can_reply_through_context() {
    struct AutoReplier;
    impl EventHandler for AutoReplier {
        fn on_chat(&mut self, ctx: &mut Context<'_>, channel: &str, nick: &str, message: &str) {
            if message == "!ping" {
                let _ = ctx.privmsg(channel, &format!("{nick}: pong"));
            }
        }
    }

    init_tracing();
    let config = Config::parse(BASE_DOC).unwrap();
    let pair = SectionPair::new(config.section("Net"), config.root_section());
    let mut session = Session::new(pair, AutoReplier);
    session.reset_for_connect().unwrap();
    feed_lines(&mut session);

    let _ = session.handle_line(":bob!u@h PRIVMSG #c :!ping");
    let mut outbound = Vec::new();
    while let Some(line) = session.pop_outbound() {
        outbound.push(line);
    }
    assert!(outbound.contains(&"PRIVMSG #c :bob: pong".to_string()));

    fn feed_lines(session: &mut Session<AutoReplier>) {
        for line in [
            ":srv 001 alice :Welcome",
            ":srv 376 alice :End",
            ":alice!u@h JOIN #c",
        ] {
            let _ = session.handle_line(line);
        }
    }
}

#[test]
fn nick_collision_discriminator_tracks_nickname() {
    let mut session = session_with(BASE_DOC);
    let _ = drain(&mut session);

    feed(&mut session, &[":srv 433 * alice :Nickname is already in use"]);
    assert_eq!(session.nickname(), "alice_");
    assert_eq!(drain(&mut session), vec!["NICK alice_"]);

    feed(
        &mut session,
        &[":srv 001 alice_ :Welcome", ":srv 376 alice_ :End"],
    );
    assert_eq!(session.nickname(), "alice_");
    assert!(session.is_ready());
}

#[test]
fn rehashed_sections_are_read_on_next_lookup() {
    let mut session = joined_session();

    // Rebind to a replacement document between ticks; the kick handler must
    // see the new AutoJoinOnKick value.
    let replacement = Config::parse(
        "[Net]\nHostname = \"irc.example.net\"\nNick = \"alice\"\nAutoJoinOnKick = true\n",
    )
    .unwrap();
    session.sections_mut().set_primary(replacement.section("Net"));
    session.sections_mut().set_fallback(replacement.root_section());

    feed(&mut session, &[":op KICK #c alice :bye"]);
    assert_eq!(drain(&mut session), vec!["JOIN #c"]);
}
