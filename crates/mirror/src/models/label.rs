//! Gmail system labels the sync engine cares about

pub const INBOX: &str = "INBOX";
pub const TRASH: &str = "TRASH";
pub const SPAM: &str = "SPAM";
pub const STARRED: &str = "STARRED";

/// Whether a label set marks a message as starred
pub fn is_starred(labels: &[String]) -> bool {
    labels.iter().any(|l| l == STARRED)
}
