//! Deterministic CSV encoding of the feed.
//!
//! Rows keep the buffer's presentation order (newest first). Every field is
//! wrapped in double quotes and embedded quotes are doubled, so a record can
//! be split back into its exact fields with [`split_record`].

use crate::feed::comment::Comment;
use chrono::{NaiveDate, SecondsFormat};

/// Fixed header row.
pub const CSV_HEADER: &str = "Timestamp,Username,Nickname,Comment";

/// Prefix of every export file name.
pub const EXPORT_FILE_PREFIX: &str = "tiktok_comments";

/// Serialize comments into CSV text.
///
/// The output is the header followed by one row per comment, joined with
/// `\n` and without a trailing newline. Timestamps are UTC RFC 3339 with
/// millisecond precision, which sorts lexically.
pub fn serialize<'a, I>(comments: I) -> String
where
    I: IntoIterator<Item = &'a Comment>,
{
    let mut lines = vec![CSV_HEADER.to_string()];
    lines.extend(comments.into_iter().map(serialize_row));
    lines.join("\n")
}

fn serialize_row(comment: &Comment) -> String {
    let timestamp = comment
        .received_at
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    [
        quote(&timestamp),
        quote(&comment.username),
        quote(&comment.nickname),
        quote(&comment.text),
    ]
    .join(",")
}

/// Wrap a field in double quotes, doubling any quote inside it.
pub fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Split one quoted record back into its fields.
///
/// Accepts only the shape [`serialize`] produces: every field quoted,
/// separated by commas. Returns `None` for anything else.
pub fn split_record(record: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut chars = record.chars().peekable();

    loop {
        if chars.next()? != '"' {
            return None;
        }

        let mut field = String::new();
        loop {
            match chars.next()? {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => break,
                c => field.push(c),
            }
        }
        fields.push(field);

        match chars.next() {
            None => return Some(fields),
            Some(',') => continue,
            Some(_) => return None,
        }
    }
}

/// Export file name for a target on a given calendar date.
///
/// `tiktok_comments_<target>_<YYYY-MM-DD>.csv`. Path separators in the
/// target are replaced so the name always stays a single path component.
pub fn export_filename(target_username: &str, date: NaiveDate) -> String {
    let target: String = target_username
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    format!(
        "{EXPORT_FILE_PREFIX}_{target}_{}.csv",
        date.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn comment(username: &str, nickname: &str, text: &str, secs: i64) -> Comment {
        let received_at: DateTime<Utc> = DateTime::from_timestamp(secs, 0).unwrap();
        Comment::ingest_at(
            Some(username.to_string()),
            Some(nickname.to_string()),
            Some(text.to_string()),
            received_at,
        )
    }

    #[test]
    fn test_header_only_for_no_rows() {
        assert_eq!(serialize(std::iter::empty()), CSV_HEADER);
    }

    #[test]
    fn test_rows_in_given_order() {
        let newer = comment("bob", "Bob", "second", 1_700_000_060);
        let older = comment("alice", "Alice", "first", 1_700_000_000);
        let csv = serialize([&newer, &older]);

        let lines: Vec<&str> = csv.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Timestamp,Username,Nickname,Comment");
        assert_eq!(
            lines[1],
            "\"2023-11-14T22:14:20.000Z\",\"bob\",\"Bob\",\"second\""
        );
        assert_eq!(
            lines[2],
            "\"2023-11-14T22:13:20.000Z\",\"alice\",\"Alice\",\"first\""
        );
        assert!(!csv.ends_with('\n'));
    }

    #[test]
    fn test_quotes_are_doubled() {
        let c = comment("alice", "Alice", "He said \"hi\", bye", 1_700_000_000);
        let csv = serialize([&c]);
        assert!(csv.contains("\"He said \"\"hi\"\", bye\""));
    }

    #[test]
    fn test_split_recovers_quoted_text() {
        let text = "He said \"hi\", bye";
        let c = comment("al\"ice", "A, B", text, 1_700_000_000);
        let csv = serialize([&c]);
        let row = csv.split('\n').nth(1).unwrap();

        let fields = split_record(row).expect("well-formed record");
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[1], "al\"ice");
        assert_eq!(fields[2], "A, B");
        assert_eq!(fields[3], text);
    }

    #[test]
    fn test_split_rejects_unquoted() {
        assert!(split_record("a,b").is_none());
        assert!(split_record("\"a\"b").is_none());
        assert!(split_record("\"unterminated").is_none());
        assert_eq!(split_record("\"\""), Some(vec![String::new()]));
    }

    #[test]
    fn test_deterministic() {
        let c = comment("alice", "Alice", "same", 1_700_000_000);
        assert_eq!(serialize([&c]), serialize([&c]));
    }

    #[test]
    fn test_export_filename() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            export_filename("cnnindonesia", date),
            "tiktok_comments_cnnindonesia_2024-03-09.csv"
        );
        assert_eq!(
            export_filename("../etc", date),
            "tiktok_comments_.._etc_2024-03-09.csv"
        );
    }
}
