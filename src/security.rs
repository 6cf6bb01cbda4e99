#![forbid(unsafe_code)]

//! Shared security helpers used by the phewtube binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

const REDACTED: &str = "API_KEY_HIDDEN";

/// Fails fast when a binary is started as root.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Replaces every occurrence of `key` inside `text` so request URLs can be
/// logged without leaking credentials.
pub fn redact_key(text: &str, key: Option<&str>) -> String {
    match key {
        Some(key) if !key.is_empty() => text.replace(key, REDACTED),
        _ => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Uid;

    #[test]
    fn ensure_not_root_allows_unprivileged_uid() {
        let uid = Uid::from_raw(1000);
        assert!(ensure_not_root_for(uid, "tester").is_ok());
    }

    #[test]
    fn ensure_not_root_rejects_root_uid() {
        let uid = Uid::from_raw(0);
        let err = ensure_not_root_for(uid, "tester").unwrap_err();
        assert!(err.to_string().contains("must not be run as root"));
    }

    #[test]
    fn redact_key_hides_every_occurrence() {
        let url = "https://api.test/videos?id=abc&key=s3cr3t&again=s3cr3t";
        let redacted = redact_key(url, Some("s3cr3t"));
        assert!(!redacted.contains("s3cr3t"));
        assert_eq!(redacted.matches(REDACTED).count(), 2);
    }

    #[test]
    fn redact_key_without_key_is_identity() {
        assert_eq!(redact_key("plain", None), "plain");
        assert_eq!(redact_key("plain", Some("")), "plain");
    }
}
