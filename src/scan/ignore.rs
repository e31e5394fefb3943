//! Static ignore tables for worker output noise.
//!
//! These lines are semantically irrelevant runtime chatter (Unity filename
//! echoes, ALSA probing, Steam API grumbling). They produce no output and no
//! state change.

const STDOUT_IGNORE_PREFIXES: &[&str] = &[
    "(Filename:",
    "-- BOLT -- ArenaSidesSwapped Changed",
    "-- BOLT -- CountdownStartTime Changed",
];

const STDERR_IGNORE_PREFIXES: &[&str] = &[
    "ALSA lib conf.c:",
    "ALSA lib confmisc.c:",
    "ALSA lib pcm.c:",
    "Unable to connect to 127.",
    "[S_API",
    "dlopen failed trying to load:",
    "with error:",
];

const STDERR_IGNORE_CONTAINS: &[&str] = &[".steam/sdk64/steamclient.so"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

pub(crate) fn is_ignored(stream: Stream, line: &str) -> bool {
    let sample = line.trim();
    if sample.is_empty() {
        return true;
    }
    let (prefixes, contains): (&[&str], &[&str]) = match stream {
        Stream::Stdout => (STDOUT_IGNORE_PREFIXES, &[]),
        Stream::Stderr => (STDERR_IGNORE_PREFIXES, STDERR_IGNORE_CONTAINS),
    };
    prefixes.iter().any(|prefix| sample.starts_with(prefix))
        || contains.iter().any(|needle| sample.contains(needle))
}

/// Display budget for JSON blobs forwarded to the sink.
pub(crate) const JSON_DISPLAY_LIMIT: usize = 66;

/// Truncates `line` to at most `limit` bytes (on a char boundary), noting
/// how much was dropped.
pub(crate) fn truncate_for_display(line: &str, limit: usize) -> String {
    if line.len() < limit {
        return line.to_string();
    }
    let mut cut = limit;
    while cut > 0 && !line.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... ({} bytes)", &line[..cut], line.len() - cut)
}
