//! Subject naming shared by the generator, the client runtime and the server.
//!
//! Subjects are `/`-separated token lists. Leading, trailing and repeated
//! separators are dropped so `"/ms-users/"` and `"ms-users"` name the same
//! service path.

use crate::{CANCEL_SUFFIX, CATALOGUE_OPERATION, INBOX_PREFIX};

pub const SUBJECT_SEPARATOR: char = '/';

/// Normalize a service path: trim separators and collapse empty tokens.
pub fn normalize(path: &str) -> String {
    path.split(SUBJECT_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// `{service_path}/{operation}`.
pub fn operation_subject(service_path: &str, operation: &str) -> String {
    let base = normalize(service_path);
    let op = normalize(operation);
    if base.is_empty() {
        op
    } else {
        format!("{base}/{op}")
    }
}

/// Subject the server answers with its schema SDL.
pub fn catalogue_subject(service_path: &str) -> String {
    operation_subject(service_path, CATALOGUE_OPERATION)
}

/// Subject pattern a server subscribes to for all of its operations.
pub fn service_wildcard(service_path: &str) -> String {
    operation_subject(service_path, "*")
}

/// `_INBOX/{id}`.
pub fn inbox_subject(id: &str) -> String {
    format!("{INBOX_PREFIX}/{id}")
}

/// Returns `true` for reply inboxes and the subjects below them.
pub fn is_inbox_subject(subject: &str) -> bool {
    subject.split(SUBJECT_SEPARATOR).next() == Some(INBOX_PREFIX)
}

/// `{inbox}/cancel`.
pub fn cancel_subject(inbox: &str) -> String {
    format!("{inbox}/{CANCEL_SUFFIX}")
}

/// Last token of a subject, i.e. the operation name for an operation subject.
pub fn last_token(subject: &str) -> &str {
    subject
        .rsplit(SUBJECT_SEPARATOR)
        .next()
        .unwrap_or(subject)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_subject_joins_with_slash() {
        assert_eq!(operation_subject("ms-users", "WatchUserStatus"), "ms-users/WatchUserStatus");
        assert_eq!(operation_subject("/svc//users/", "GetUser"), "svc/users/GetUser");
        assert_eq!(operation_subject("", "GetUser"), "GetUser");
    }

    #[test]
    fn reserved_subjects() {
        assert_eq!(catalogue_subject("ms-users"), "ms-users/__catalogue");
        assert_eq!(service_wildcard("ms-users"), "ms-users/*");
        assert_eq!(cancel_subject(&inbox_subject("abc")), "_INBOX/abc/cancel");
    }

    #[test]
    fn inbox_subjects_are_recognised() {
        assert!(is_inbox_subject(&inbox_subject("abc")));
        assert!(is_inbox_subject(&cancel_subject(&inbox_subject("abc"))));
        assert!(!is_inbox_subject("ms-users/GetUser"));
        assert!(!is_inbox_subject("_INBOXES/x"));
    }

    #[test]
    fn last_token_extracts_operation() {
        assert_eq!(last_token("svc/users/GetUser"), "GetUser");
        assert_eq!(last_token("GetUser"), "GetUser");
    }
}
