//! Append-only log line codec.
//!
//! One entry per line, newline-terminated UTF-8 text:
//!
//! ```text
//! ADD <id> <json:{id,path,created}>
//! DEL <id> {}
//! ```
//!
//! Blank lines are permitted and ignored on replay. The in-memory index is
//! the left-fold of all entries in file order: ADD inserts or overwrites the
//! record for `id`, DEL removes it.

use crate::record::ObjectRecord;

/// Action token for entries that insert a record.
pub const ACTION_ADD: &str = "ADD";

/// Action token for entries that remove a record.
pub const ACTION_DEL: &str = "DEL";

/// Split a log line into `(action, id, payload)`.
///
/// Returns `None` when the line does not carry all three tokens. Replay
/// skips such lines silently; only a recognizable `ADD` with a bad payload
/// or an unknown action token is treated as corruption.
#[must_use]
pub fn split_entry(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.splitn(3, ' ');
    let action = parts.next()?;
    let id = parts.next()?;
    let payload = parts.next()?;
    if action.is_empty() || id.is_empty() || payload.is_empty() {
        return None;
    }
    Some((action, id, payload))
}

/// Render an ADD entry for `record`, newline-terminated.
pub fn encode_add(record: &ObjectRecord) -> Result<String, serde_json::Error> {
    let payload = serde_json::to_string(record)?;
    Ok(format!("{ACTION_ADD} {} {payload}\n", record.id))
}

/// Render a DEL entry for `id`, newline-terminated.
///
/// The payload slot is a fixed `{}`: deletion carries no metadata beyond the
/// id itself.
#[must_use]
pub fn encode_del(id: &str) -> String {
    format!("{ACTION_DEL} {id} {{}}\n")
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_should_split_three_token_entry() {
        let (action, id, payload) = split_entry("ADD abc-123 {\"k\":1}").unwrap();
        assert_eq!(action, "ADD");
        assert_eq!(id, "abc-123");
        assert_eq!(payload, "{\"k\":1}");
    }

    #[test]
    fn test_should_keep_spaces_inside_payload() {
        // Everything after the second space belongs to the payload, so JSON
        // containing spaces survives the split intact.
        let (_, _, payload) = split_entry("ADD x {\"path\":\"a b.txt\"}").unwrap();
        assert_eq!(payload, "{\"path\":\"a b.txt\"}");
    }

    #[test]
    fn test_should_reject_short_or_empty_lines() {
        assert!(split_entry("").is_none());
        assert!(split_entry("ADD").is_none());
        assert!(split_entry("ADD abc").is_none());
        assert!(split_entry("   ").is_none());
    }

    #[test]
    fn test_should_encode_add_and_del_lines() {
        let record = ObjectRecord::new(PathBuf::from("a.txt"));
        let line = encode_add(&record).unwrap();
        assert!(line.starts_with(&format!("ADD {} {{", record.id)));
        assert!(line.ends_with('\n'));

        let (action, id, payload) = split_entry(line.trim_end()).unwrap();
        assert_eq!(action, ACTION_ADD);
        assert_eq!(id, record.id);
        let parsed: ObjectRecord = serde_json::from_str(payload).unwrap();
        assert_eq!(parsed, record);

        assert_eq!(encode_del("abc"), "DEL abc {}\n");
    }
}
