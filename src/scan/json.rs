//! Decoding of the worker's JSON match/kill lines.

use chrono::{DateTime, NaiveDateTime, Utc};

use super::ignore::JSON_DISPLAY_LIMIT;
use crate::matches::{Kill, Match};

/// What a JSON-looking line decoded to.
#[derive(Debug)]
pub(crate) enum JsonLine {
    Kill(Box<Kill>),
    Match(Box<Match>),
    /// JSON, but not a shape we know; passed through for display only.
    Other,
}

pub(crate) fn looks_like_json(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.first() == Some(&b'{') && bytes.last() == Some(&b'}')
}

/// Classifies by a cheap probe of the line head, then decodes.
///
/// The discriminating field sits in the first handful of keys on real worker
/// output; probing [`JSON_DISPLAY_LIMIT`] bytes avoids parsing every blob
/// twice.
pub(crate) fn classify(line: &str) -> Result<JsonLine, serde_json::Error> {
    let mut cut = line.len().min(JSON_DISPLAY_LIMIT);
    while cut > 0 && !line.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = &line[..cut];
    if head.contains(r#""shooterId""#) {
        return serde_json::from_str::<Kill>(line).map(|kill| JsonLine::Kill(Box::new(kill)));
    }
    if head.contains(r#""matchId""#) {
        return serde_json::from_str::<Match>(line).map(|m| JsonLine::Match(Box::new(m)));
    }
    Ok(JsonLine::Other)
}

/// Match ids embed a timestamp after the session token, in one of the two
/// layouts the worker has shipped with.
const ID_LAYOUTS: &[&str] = &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %I:%M:%S %p"];

/// Extracts the timestamp fragment embedded in a match id, using the session
/// token as the delimiter. `None` when the token is absent or sits at the
/// very end (no fragment to parse), or the fragment fits no known layout.
pub(crate) fn parse_match_id_timestamp(id: &str, session: &str) -> Option<DateTime<Utc>> {
    let at = id.find(session)?;
    let fragment = &id[at + session.len()..];
    if fragment.is_empty() {
        return None;
    }
    ID_LAYOUTS.iter().find_map(|layout| {
        NaiveDateTime::parse_from_str(fragment, layout)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

/// True when the id can belong to the current session at all: the token must
/// appear strictly before the end of the id.
pub(crate) fn id_matches_session(id: &str, session: &str) -> bool {
    match id.find(session) {
        Some(at) => at + session.len() < id.len(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn kill_lines_classify_by_head_probe() {
        let line = r#"{"shooterId":"2000","shooterName":"Alice","killTime":12.5}"#;
        match classify(line).expect("decode") {
            JsonLine::Kill(kill) => {
                assert_eq!(kill.shooter_name, "Alice");
                assert_eq!(kill.kill_time, 12.5);
            }
            other => panic!("expected kill, got {other:?}"),
        }
    }

    #[test]
    fn match_lines_classify_by_head_probe() {
        let line = r#"{"matchId":"Room01/02/2026 15:04:05","arenaName":"Colosseum"}"#;
        match classify(line).expect("decode") {
            JsonLine::Match(m) => assert_eq!(m.arena_name, "Colosseum"),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn unknown_shapes_pass_through() {
        assert!(matches!(
            classify(r#"{"telemetry":true}"#),
            Ok(JsonLine::Other)
        ));
    }

    #[test]
    fn malformed_known_shapes_error() {
        assert!(classify(r#"{"matchId":::}"#).is_err());
    }

    #[test]
    fn id_timestamps_parse_both_layouts() {
        let expect = Utc.with_ymd_and_hms(2026, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(
            parse_match_id_timestamp("Room01/02/2026 15:04:05", "Room"),
            Some(expect)
        );
        assert_eq!(
            parse_match_id_timestamp("Room1/2/2026 3:04:05 PM", "Room"),
            Some(expect)
        );
    }

    #[test]
    fn id_session_matching_rejects_token_at_end() {
        assert!(id_matches_session("Room01/02/2026 15:04:05", "Room"));
        assert!(!id_matches_session("prefix-Room", "Room"));
        assert!(!id_matches_session("OtherLobby01/02/2026", "Room"));
        // An unannounced (empty) token accepts anything non-empty.
        assert!(id_matches_session("whatever", ""));
    }

    #[test]
    fn unparseable_fragments_yield_none() {
        assert_eq!(parse_match_id_timestamp("Roomgarbage", "Room"), None);
        assert_eq!(parse_match_id_timestamp("NoToken", "Room"), None);
    }
}
