//! Edit-history reconstruction
//!
//! A file's history is a newest-first chain of diffs. Local diffs are
//! recorded on the client as forward edits. Remote diffs are recorded on
//! the server at push time, and the local copy may or may not contain them.

use serde::{Deserialize, Serialize};

use crate::diff::{can_apply_forward, reverse_apply_diff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOrigin {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffWithOrigin {
    pub diff: String,
    pub origin: DiffOrigin,
}

impl DiffWithOrigin {
    pub fn local(diff: impl Into<String>) -> Self {
        Self {
            diff: diff.into(),
            origin: DiffOrigin::Local,
        }
    }

    pub fn remote(diff: impl Into<String>) -> Self {
        Self {
            diff: diff.into(),
            origin: DiffOrigin::Remote,
        }
    }
}

/// Walk `diffs` (newest first) back from `current`.
///
/// Local diffs are always reverse-applied. A remote diff whose old side
/// already matches the content was never pulled, so it is skipped instead.
/// Returns `None` as soon as any step fails to apply.
pub fn reconstruct_content(current: &str, diffs: &[DiffWithOrigin]) -> Option<String> {
    let mut content = current.to_string();
    for (step, entry) in diffs.iter().enumerate() {
        if entry.origin == DiffOrigin::Remote && can_apply_forward(&content, &entry.diff) {
            log::debug!("History step {}: remote diff not present locally, skipping", step);
            continue;
        }
        match reverse_apply_diff(&content, &entry.diff) {
            Some(previous) => content = previous,
            None => {
                log::warn!("History step {}: {:?} diff does not apply", step, entry.origin);
                return None;
            }
        }
    }
    Some(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::create_diff;

    #[test]
    fn test_local_chain_restores_base_and_middle() {
        let v0 = "a\n";
        let v1 = "a\nb\n";
        let v2 = "a\nb\nc\n";
        let chain = vec![
            DiffWithOrigin::local(create_diff(v1, v2)),
            DiffWithOrigin::local(create_diff(v0, v1)),
        ];
        assert_eq!(reconstruct_content(v2, &chain).as_deref(), Some(v0));
        assert_eq!(reconstruct_content(v2, &chain[..1]).as_deref(), Some(v1));
        assert_eq!(reconstruct_content(v2, &[]).as_deref(), Some(v2));
    }

    #[test]
    fn test_remote_diff_skipped_at_old_side() {
        let old = "本当にいいお父さんですか？\n本当にいいお母さんですか？\n";
        let new = "本当にいいお父さんですか？\n本当にいいお母さんですか？\naaaaaa\n";
        let chain = vec![DiffWithOrigin::remote(create_diff(old, new))];
        assert_eq!(reconstruct_content(old, &chain).as_deref(), Some(old));
    }

    #[test]
    fn test_remote_diff_reversed_at_new_side() {
        let chain = vec![DiffWithOrigin::remote(create_diff("line1\n", "line1\nline2\n"))];
        assert_eq!(
            reconstruct_content("line1\nline2\n", &chain).as_deref(),
            Some("line1\n")
        );
    }

    #[test]
    fn test_mixed_chain() {
        let v0 = "line1\n";
        let v1 = "line1\nline2\n";
        let v2 = "line1\nline2\nline3\n";
        let v3 = "line1\nline2\nline3\nline4\n";
        let v4 = "line1\nline2\nline3\nline4\nline5\n";
        let chain = vec![
            DiffWithOrigin::local(create_diff(v3, v4)),
            DiffWithOrigin::local(create_diff(v2, v3)),
            DiffWithOrigin::remote(create_diff(v1, v2)),
            DiffWithOrigin::remote(create_diff(v0, v1)),
        ];
        assert_eq!(reconstruct_content(v4, &chain).as_deref(), Some(v0));
        assert_eq!(reconstruct_content(v4, &chain[..3]).as_deref(), Some(v1));
        assert_eq!(reconstruct_content(v4, &chain[..2]).as_deref(), Some(v2));
        assert_eq!(reconstruct_content(v4, &chain[..1]).as_deref(), Some(v3));
    }

    #[test]
    fn test_unpulled_remote_after_local_edit() {
        let v0 = "original content\n";
        let v1 = "original content\nnew from push\n";
        let edited = "original content\nlocal edit\n";
        let chain = vec![
            DiffWithOrigin::local(create_diff(v0, edited)),
            DiffWithOrigin::remote(create_diff(v0, v1)),
        ];
        assert_eq!(reconstruct_content(edited, &chain).as_deref(), Some(v0));
    }

    #[test]
    fn test_edits_in_the_middle() {
        let v0 = "# Title\n\nParagraph one.\n\nParagraph two.\n\nParagraph three.\n";
        let v1 = "# Title\n\nParagraph one.\n\nUpdated paragraph two.\n\nParagraph three.\n";
        let v2 = "# Title\n\nParagraph one.\n\nUpdated paragraph two.\n\nParagraph three.\n\nNew section.\n";
        let v3 = "# New Title\n\nParagraph one.\n\nUpdated paragraph two.\n\nParagraph three.\n\nNew section.\n";
        let chain = vec![
            DiffWithOrigin::local(create_diff(v2, v3)),
            DiffWithOrigin::remote(create_diff(v1, v2)),
            DiffWithOrigin::remote(create_diff(v0, v1)),
        ];
        assert_eq!(reconstruct_content(v3, &chain).as_deref(), Some(v0));
        assert_eq!(reconstruct_content(v3, &chain[..2]).as_deref(), Some(v1));
    }

    #[test]
    fn test_remote_chain_from_pulled_state() {
        let versions = ["aaa\n", "aaa\nbbb\n", "aaa\nbbb\nccc\n", "aaa\nbbb\nccc\nddd\n"];
        let chain: Vec<_> = versions
            .windows(2)
            .rev()
            .map(|w| DiffWithOrigin::remote(create_diff(w[0], w[1])))
            .collect();
        assert_eq!(reconstruct_content(versions[3], &chain).as_deref(), Some(versions[0]));
    }

    #[test]
    fn test_corrupt_link_fails_whole_chain() {
        let chain = vec![
            DiffWithOrigin::local(create_diff("aaa\nbbb\n", "aaa\nbbb\nccc\n")),
            DiffWithOrigin::local(create_diff("xxx\nyyy\n", "zzz\n")),
        ];
        assert_eq!(reconstruct_content("aaa\nbbb\nccc\n", &chain), None);
    }
}
