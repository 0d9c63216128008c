//! Field-alias table for raw upstream threads.
//!
//! The upstream payload has changed shape across versions, so each logical
//! field is read from the first non-empty key in a declared precedence
//! list. "Non-empty" follows the payload's own notion of absence: `null`,
//! `""`, `0`, `false`, `[]`, and `{}` all count as missing.

use serde_json::Value;

/// A logical field and the keys it may appear under, highest precedence first.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub name: &'static str,
    pub keys: &'static [&'static str],
}

pub const ID: FieldAliases = FieldAliases {
    name: "id",
    keys: &["id"],
};

pub const THREAD_ID: FieldAliases = FieldAliases {
    name: "thread_id",
    keys: &["thread_id"],
};

pub const COURSE_ID: FieldAliases = FieldAliases {
    name: "course_id",
    keys: &["course_id"],
};

pub const TITLE: FieldAliases = FieldAliases {
    name: "title",
    keys: &["title", "subject"],
};

pub const CONTENT: FieldAliases = FieldAliases {
    name: "content",
    keys: &["content", "body", "text"],
};

pub const CATEGORY: FieldAliases = FieldAliases {
    name: "category",
    keys: &["category", "folder", "type"],
};

pub const ATTACHMENTS: FieldAliases = FieldAliases {
    name: "attachments",
    keys: &["attachments", "files"],
};

pub const POSTED_AT: FieldAliases = FieldAliases {
    name: "posted_at",
    keys: &["created_at", "createdAt", "created"],
};

pub const UPDATED_AT: FieldAliases = FieldAliases {
    name: "updated_at",
    keys: &["updated_at", "updatedAt", "edited_at"],
};

pub const URL: FieldAliases = FieldAliases {
    name: "url",
    keys: &["url"],
};

pub const AUTHOR: FieldAliases = FieldAliases {
    name: "author",
    keys: &["author", "user", "creator"],
};

// Attachment object fields.

pub const FILENAME: FieldAliases = FieldAliases {
    name: "filename",
    keys: &["filename", "name"],
};

pub const FILE_TYPE: FieldAliases = FieldAliases {
    name: "file_type",
    keys: &["file_type", "mime"],
};

pub const FILE_SIZE: FieldAliases = FieldAliases {
    name: "file_size",
    keys: &["size", "file_size"],
};

/// Returns the first present, non-empty value among the field's keys.
pub fn probe<'a>(raw: &'a Value, field: &FieldAliases) -> Option<&'a Value> {
    field
        .keys
        .iter()
        .filter_map(|key| raw.get(*key))
        .find(|v| is_present(v))
}

/// Like [`probe`], but only accepts a string value.
pub fn probe_str<'a>(raw: &'a Value, field: &FieldAliases) -> Option<&'a str> {
    probe(raw, field).and_then(Value::as_str)
}

/// Reads an integer ID that may be encoded as a JSON number or a numeric string.
pub fn probe_i64(raw: &Value, field: &FieldAliases) -> Option<i64> {
    probe(raw, field).and_then(as_i64)
}

pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Renders a scalar as a string (numbers included), for opaque IDs.
pub fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_alias_wins() {
        let raw = json!({"title": "A", "subject": "B"});
        assert_eq!(probe_str(&raw, &TITLE), Some("A"));
    }

    #[test]
    fn empty_values_fall_through_to_next_alias() {
        let raw = json!({"title": "", "subject": "B"});
        assert_eq!(probe_str(&raw, &TITLE), Some("B"));

        let raw = json!({"content": null, "body": "", "text": "t"});
        assert_eq!(probe_str(&raw, &CONTENT), Some("t"));

        let raw = json!({"attachments": [], "files": [{"filename": "a"}]});
        assert!(probe(&raw, &ATTACHMENTS).unwrap().is_array());
    }

    #[test]
    fn missing_everywhere_is_none() {
        let raw = json!({"other": 1});
        assert!(probe(&raw, &TITLE).is_none());
        assert!(probe(&json!(null), &TITLE).is_none());
    }

    #[test]
    fn ids_accept_numbers_and_numeric_strings() {
        assert_eq!(probe_i64(&json!({"id": 42}), &ID), Some(42));
        assert_eq!(probe_i64(&json!({"id": "42"}), &ID), Some(42));
        assert_eq!(probe_i64(&json!({"id": "abc"}), &ID), None);
        assert_eq!(probe_i64(&json!({"id": 0}), &ID), None);
    }
}
