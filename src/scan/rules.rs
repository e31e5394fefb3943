//! Ordered dispatch table for worker stdout lines.
//!
//! The rule set is data: an ordered list of (matcher, handler) pairs
//! evaluated top to bottom, first match wins. Handlers delegate to
//! [`ScanCtx`] methods; the table itself stays line-testable.

use tracing::{debug, warn};

use super::json::{self, JsonLine};
use super::scanner::ScanCtx;

#[derive(Clone, Copy, Debug)]
pub(crate) enum LineTest {
    /// A JSON object line (`{...}`).
    Json,
    /// Prefix match; handler receives the rest of the line (possibly empty).
    Prefix(&'static str),
    /// Prefix match requiring a non-empty rest.
    PrefixWithBody(&'static str),
}

impl LineTest {
    pub(crate) fn matches<'line>(&self, line: &'line str) -> Option<&'line str> {
        match self {
            LineTest::Json => json::looks_like_json(line).then_some(line),
            LineTest::Prefix(prefix) => line.strip_prefix(prefix),
            LineTest::PrefixWithBody(prefix) => {
                line.strip_prefix(prefix).filter(|rest| !rest.is_empty())
            }
        }
    }
}

pub(crate) struct LineRule {
    pub test: LineTest,
    pub run: fn(&mut ScanCtx, &str),
}

pub(crate) const STDOUT_RULES: &[LineRule] = &[
    LineRule {
        test: LineTest::Json,
        run: json_line,
    },
    LineRule {
        test: LineTest::PrefixWithBody("-- BOLT -- Registered room: "),
        run: session_token,
    },
    LineRule {
        test: LineTest::PrefixWithBody("-- BOLT -- Loading arena name: "),
        run: arena_name,
    },
    LineRule {
        test: LineTest::Prefix("-- BOLT -- Player assigned "),
        run: player_joining,
    },
    LineRule {
        test: LineTest::Prefix("-- BOLT -- REMOTE CALLBACKS "),
        run: player_joining,
    },
    LineRule {
        test: LineTest::PrefixWithBody("-- BOLT -- Registered player: "),
        run: player_registered,
    },
    LineRule {
        test: LineTest::PrefixWithBody("-- BOLT -- Unregistered player: "),
        run: player_unregistered,
    },
    LineRule {
        test: LineTest::Prefix("-- BOLT -- ArenaSpecName Changed"),
        run: defaults_changed,
    },
    LineRule {
        test: LineTest::Prefix("-- BOLT -- BallsPerSecond Changed"),
        run: defaults_changed,
    },
    LineRule {
        test: LineTest::Prefix("-- BOLT -- GameState Changed"),
        run: game_state_changed,
    },
    LineRule {
        test: LineTest::PrefixWithBody("Received request for ArenaSpecName "),
        run: arena_name,
    },
    LineRule {
        test: LineTest::Prefix("Upload complete"),
        run: upload_complete,
    },
    LineRule {
        test: LineTest::Prefix("Finished populating pool"),
        run: pool_populated,
    },
    LineRule {
        test: LineTest::Prefix("Disconnected"),
        run: session_lost,
    },
    LineRule {
        test: LineTest::Prefix("Failed to create session"),
        run: session_lost,
    },
];

/// Runs the first matching rule. Returns whether any rule claimed the line.
pub(crate) fn dispatch(ctx: &mut ScanCtx, line: &str) -> bool {
    for rule in STDOUT_RULES {
        if let Some(body) = rule.test.matches(line) {
            (rule.run)(ctx, body);
            return true;
        }
    }
    false
}

fn json_line(ctx: &mut ScanCtx, line: &str) {
    if ctx.collector.is_none() {
        return;
    }
    match json::classify(line) {
        Ok(JsonLine::Kill(kill)) => ctx.apply_kill(*kill),
        Ok(JsonLine::Match(m)) => ctx.apply_match_line(*m),
        Ok(JsonLine::Other) => debug!("unrecognized json line"),
        Err(err) => warn!(error = %err, "json decode failed"),
    }
}

fn session_token(ctx: &mut ScanCtx, body: &str) {
    ctx.set_session(body);
}

fn arena_name(ctx: &mut ScanCtx, body: &str) {
    ctx.set_arena(body);
}

fn player_joining(ctx: &mut ScanCtx, _body: &str) {
    ctx.player_joining();
}

fn player_registered(ctx: &mut ScanCtx, body: &str) {
    ctx.register_player(body);
}

fn player_unregistered(ctx: &mut ScanCtx, body: &str) {
    ctx.unregister_player(body);
}

fn defaults_changed(ctx: &mut ScanCtx, _body: &str) {
    ctx.defaults_changed();
}

fn game_state_changed(ctx: &mut ScanCtx, _body: &str) {
    ctx.game_state_changed();
}

fn upload_complete(ctx: &mut ScanCtx, _body: &str) {
    // More timely, less reliable, than waiting for the match id to change.
    ctx.flush();
}

fn pool_populated(ctx: &mut ScanCtx, _body: &str) {
    ctx.pool_populated();
}

fn session_lost(ctx: &mut ScanCtx, _body: &str) {
    ctx.session_lost();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_test_requires_braces() {
        assert!(LineTest::Json.matches(r#"{"matchId":"x"}"#).is_some());
        assert!(LineTest::Json.matches("plain text").is_none());
        assert!(LineTest::Json.matches("{unclosed").is_none());
    }

    #[test]
    fn prefix_with_body_rejects_bare_tags() {
        let test = LineTest::PrefixWithBody("-- BOLT -- Registered player: ");
        assert_eq!(
            test.matches("-- BOLT -- Registered player: 2000"),
            Some("2000")
        );
        assert!(test.matches("-- BOLT -- Registered player: ").is_none());
    }

    #[test]
    fn rule_order_puts_json_first() {
        // JSON lines must never fall through to prefix rules, and the two
        // arena announcements use distinct tags.
        assert!(matches!(STDOUT_RULES[0].test, LineTest::Json));
        let tagged = STDOUT_RULES
            .iter()
            .filter(|rule| {
                matches!(
                    rule.test,
                    LineTest::Prefix(p) | LineTest::PrefixWithBody(p) if p.starts_with("-- BOLT -- ")
                )
            })
            .count();
        assert_eq!(tagged, 9);
    }
}
