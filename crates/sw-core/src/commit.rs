//! Deterministic commit message synthesis. Given the same approved change,
//! the message is byte-identical on every run: fixed trailer order, no
//! timestamps, no environment.

use crate::types::ChangeOperation;
use crate::types::enums::OperationKind;
use crate::types::ids::ChangeId;

/// First line is the human summary verbatim; the body is a fixed-order
/// trailer block describing the operation and both approvals.
pub fn commit_message(summary: &str, change_id: &ChangeId, operation: &ChangeOperation) -> String {
    let mut message = String::new();
    message.push_str(summary.trim());
    message.push_str("\n\n");
    message.push_str(&format!("operation: {}\n", operation.kind));
    match (&operation.destination_path, operation.kind) {
        (Some(dest), OperationKind::Move | OperationKind::Rename) => {
            message.push_str(&format!("path: {} -> {}\n", operation.source_path, dest));
        }
        _ => {
            message.push_str(&format!("path: {}\n", operation.source_path));
        }
    }
    message.push_str(&format!("change-id: {change_id}\n"));
    message.push_str(&format!("language: {}\n", operation.language));
    message.push_str("use-consent: approved\n");
    message.push_str("apply-approval: approved\n");
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::enums::Language;

    fn operation(kind: OperationKind, destination: Option<&str>) -> ChangeOperation {
        ChangeOperation {
            kind,
            source_path: "src/lib.rs".to_string(),
            destination_path: destination.map(str::to_string),
            language: Language::Rust,
            hunks: Vec::new(),
            base_sha256: None,
            post_sha256: None,
        }
    }

    #[test]
    fn message_is_byte_deterministic() {
        let id = ChangeId::derive("tidy the lib module", "some diff");
        let op = operation(OperationKind::Edit, None);
        let a = commit_message("tidy the lib module", &id, &op);
        let b = commit_message("tidy the lib module", &id, &op);
        assert_eq!(a, b);
        assert!(a.starts_with("tidy the lib module\n\noperation: edit\npath: src/lib.rs\n"));
        assert!(a.ends_with("use-consent: approved\napply-approval: approved\n"));
    }

    #[test]
    fn rename_includes_both_paths() {
        let id = ChangeId::derive("rename the module file", "diff");
        let op = ChangeOperation {
            destination_path: Some("src/util.rs".to_string()),
            ..operation(OperationKind::Rename, None)
        };
        let message = commit_message("rename the module file", &id, &op);
        assert!(message.contains("operation: rename\npath: src/lib.rs -> src/util.rs\n"));
    }

    #[test]
    fn trailer_order_is_fixed() {
        let id = ChangeId::derive("adjust something small", "diff");
        let message = commit_message("adjust something small", &id, &operation(OperationKind::Edit, None));
        let op_at = message.find("operation:").unwrap();
        let path_at = message.find("path:").unwrap();
        let id_at = message.find("change-id:").unwrap();
        let lang_at = message.find("language:").unwrap();
        let consent_at = message.find("use-consent:").unwrap();
        let approval_at = message.find("apply-approval:").unwrap();
        assert!(op_at < path_at && path_at < id_at && id_at < lang_at);
        assert!(lang_at < consent_at && consent_at < approval_at);
    }
}
