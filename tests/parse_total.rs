//! Property-based tests for the message parser and the line framer.
//!
//! The parser must be total: any input below the framer's soft cap yields a
//! message value, never a panic. Rendered messages must survive a trip back
//! through the framer and parser unchanged.

use longwire::{Framed, LineFramer, Message};
use proptest::prelude::*;

fn nickname_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9\\-_]{0,8}").expect("valid regex")
}

fn command_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[A-Z]{3,10}").expect("valid regex"),
        prop::string::string_regex("[0-9]{3}").expect("valid regex"),
    ]
}

fn middle_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[#&a-zA-Z][a-zA-Z0-9\\-_]{0,15}").expect("valid regex")
}

fn trailing_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[^\r\n\0]{0,200}").expect("valid regex")
}

proptest! {
    /// Any printable line parses to some message without panicking.
    #[test]
    fn parse_is_total_on_printable(line in "\\PC{0,400}") {
        let _ = Message::parse(&line);
    }

    /// Arbitrary byte soup (lossily decoded, as the client does) parses.
    #[test]
    fn parse_is_total_on_bytes(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let text = String::from_utf8_lossy(&bytes);
        let _ = Message::parse(&text);
    }

    /// Structured messages survive render → frame → parse intact.
    #[test]
    fn render_frames_and_reparses(
        nick in nickname_strategy(),
        command in command_strategy(),
        middles in prop::collection::vec(middle_strategy(), 0..4),
        trailing in prop::option::of(trailing_strategy()),
    ) {
        let mut line = format!(":{nick} {command}");
        for middle in &middles {
            line.push(' ');
            line.push_str(middle);
        }
        if let Some(t) = &trailing {
            line.push_str(" :");
            line.push_str(t);
        }

        let msg = Message::parse(&line);
        let rendered = msg.render();

        let mut framer = LineFramer::new();
        framer.push(rendered.as_bytes());
        framer.push(b"\r\n");
        let framed = match framer.next_line().unwrap() {
            Framed::Line(bytes) => bytes,
            other => panic!("expected a framed line, got {other:?}"),
        };
        let reparsed_text = String::from_utf8(framed.to_vec()).unwrap();
        let reparsed = Message::parse(&reparsed_text);

        prop_assert_eq!(msg.prefix, reparsed.prefix);
        prop_assert_eq!(msg.command, reparsed.command);
        prop_assert_eq!(msg.params, reparsed.params);
        prop_assert_eq!(msg.trailing, reparsed.trailing);
    }

    /// The framer never yields a line longer than its cap and never panics,
    /// whatever byte stream arrives in whatever chunking.
    #[test]
    fn framer_is_robust_to_chunking(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..300), 0..12),
    ) {
        let mut framer = LineFramer::new();
        for chunk in &chunks {
            framer.push(chunk);
            loop {
                match framer.next_line() {
                    Ok(Framed::Line(line)) => {
                        prop_assert!(line.len() <= longwire::MAX_LINE_LEN);
                        prop_assert!(!line.is_empty());
                    }
                    Ok(Framed::Incomplete) | Ok(Framed::Eof) => break,
                    Err(_) => {}
                }
            }
        }
    }
}
