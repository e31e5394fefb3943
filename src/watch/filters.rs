//! Stock batch filters.
//!
//! Each filter is a pure function over one batch, composable in order and
//! unit-testable against synthetic batches. The usual control-directory
//! pipeline is `[last_names, lock_names, dedup_names]`.

use super::event::{WatchEvent, WatchOp};

/// Rewrites `<name>.lock` events as `Created` events for `<name>`.
///
/// Writers that stage content in a `.lock` file and rename it into place
/// surface as a single logical update of the final name.
pub fn lock_names(mut events: Vec<WatchEvent>) -> Vec<WatchEvent> {
    for event in &mut events {
        if let Some(name) = event.name.strip_suffix(".lock") {
            event.name = name.to_string();
            event.op = WatchOp::Created;
        }
    }
    events
}

/// Appends a synthetic `Created` event for the plain sibling of any
/// `last`-prefixed name.
///
/// A status file retiring (`up` renamed to `lastup`) only notifies for
/// `lastup`; the consumer still needs to re-read `up` to observe it gone.
pub fn last_names(mut events: Vec<WatchEvent>) -> Vec<WatchEvent> {
    let synthesized: Vec<WatchEvent> = events
        .iter()
        .filter_map(|event| event.name.strip_prefix("last"))
        .filter(|name| !name.is_empty())
        .map(WatchEvent::created)
        .collect();
    events.extend(synthesized);
    events
}

/// Merges repeated names within one batch into a single event.
///
/// First-seen order is preserved. A name that was both created and removed
/// within the batch collapses to `Created`; consumers re-read the file and
/// find out for themselves.
pub fn dedup_names(events: Vec<WatchEvent>) -> Vec<WatchEvent> {
    let mut out: Vec<WatchEvent> = Vec::with_capacity(events.len());
    for event in events {
        match out.iter_mut().find(|seen| seen.name == event.name) {
            Some(seen) => {
                if event.op == WatchOp::Created {
                    seen.op = WatchOp::Created;
                }
            }
            None => out.push(event),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_names_rewrites_suffix_and_op() {
        let out = lock_names(vec![
            WatchEvent::removed("down.lock"),
            WatchEvent::created("up"),
        ]);
        assert_eq!(
            out,
            vec![WatchEvent::created("down"), WatchEvent::created("up")]
        );
    }

    #[test]
    fn last_names_synthesizes_plain_sibling() {
        let out = last_names(vec![WatchEvent::created("lastup")]);
        assert_eq!(
            out,
            vec![WatchEvent::created("lastup"), WatchEvent::created("up")]
        );
    }

    #[test]
    fn last_names_ignores_bare_prefix() {
        let out = last_names(vec![WatchEvent::created("last")]);
        assert_eq!(out, vec![WatchEvent::created("last")]);
    }

    #[test]
    fn dedup_names_merges_and_prefers_created() {
        let out = dedup_names(vec![
            WatchEvent::created("down"),
            WatchEvent::removed("down"),
            WatchEvent::removed("stop"),
        ]);
        assert_eq!(
            out,
            vec![WatchEvent::created("down"), WatchEvent::removed("stop")]
        );
    }

    #[test]
    fn pipeline_composes_in_order() {
        let batch = vec![
            WatchEvent::created("down.lock"),
            WatchEvent::created("lastup"),
            WatchEvent::created("down"),
        ];
        let out = dedup_names(lock_names(last_names(batch)));
        assert_eq!(
            out,
            vec![
                WatchEvent::created("down"),
                WatchEvent::created("lastup"),
                WatchEvent::created("up"),
            ]
        );
    }
}
