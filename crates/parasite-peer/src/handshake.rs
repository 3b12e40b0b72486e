use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{PeerError, Result};

/// Command-line flag that carries the handshake blob to a plugin.
pub const HANDSHAKE_FLAG: &str = "-h";

/// Identity the host hands to every plugin it launches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandshakeRecord {
    /// Name of the host application.
    pub host_name: String,
    /// Host version, compared as a plain string.
    pub host_version: String,
}

impl HandshakeRecord {
    pub fn new(host_name: impl Into<String>, host_version: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
            host_version: host_version.into(),
        }
    }

    /// Encode into the opaque blob passed on the plugin command line.
    pub fn encode(&self) -> Result<String> {
        self.validate()?;
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a blob produced by [`encode`](Self::encode).
    pub fn decode(blob: &str) -> Result<Self> {
        if blob.trim().is_empty() {
            return Err(PeerError::HandshakeFailed("empty handshake blob".into()));
        }

        let raw = STANDARD
            .decode(blob.trim())
            .map_err(|err| PeerError::HandshakeFailed(format!("handshake blob is not base64: {err}")))?;
        let record: Self = serde_json::from_slice(&raw)
            .map_err(|err| PeerError::HandshakeFailed(format!("invalid handshake record: {err}")))?;

        record.validate()?;
        Ok(record)
    }

    fn validate(&self) -> Result<()> {
        validate_host_name(&self.host_name)?;
        validate_version(&self.host_version)
    }
}

/// What a plugin requires of the host that launched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    /// Host name that must match exactly.
    pub expected_host_name: String,
    /// Lowest acceptable host version.
    pub min_host_version: String,
}

/// Decode `blob` and check it against `config`.
///
/// Versions are compared lexicographically, so `"9"` sorts after `"10"`.
pub fn validate_handshake(blob: &str, config: &HandshakeConfig) -> Result<HandshakeRecord> {
    let record = HandshakeRecord::decode(blob)?;

    if record.host_name != config.expected_host_name {
        return Err(PeerError::HandshakeFailed(format!(
            "unexpected host '{}' (expected '{}')",
            record.host_name, config.expected_host_name
        )));
    }

    if !is_version_compatible(&record.host_version, &config.min_host_version) {
        return Err(PeerError::HandshakeFailed(format!(
            "host version '{}' is older than required '{}'",
            record.host_version, config.min_host_version
        )));
    }

    Ok(record)
}

fn validate_host_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PeerError::HandshakeFailed("host name is empty".into()));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        return Err(PeerError::HandshakeFailed("host version is empty".into()));
    }
    Ok(())
}

fn is_version_compatible(host_version: &str, min_version: &str) -> bool {
    host_version >= min_version
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, min: &str) -> HandshakeConfig {
        HandshakeConfig {
            expected_host_name: name.to_string(),
            min_host_version: min.to_string(),
        }
    }

    fn blob(name: &str, version: &str) -> String {
        HandshakeRecord::new(name, version).encode().unwrap()
    }

    #[test]
    fn matching_host_accepted() {
        let record = validate_handshake(&blob("editor", "1.2.0"), &config("editor", "1.2.0")).unwrap();
        assert_eq!(record, HandshakeRecord::new("editor", "1.2.0"));
    }

    #[test]
    fn newer_host_accepted() {
        assert!(validate_handshake(&blob("editor", "1.3.0"), &config("editor", "1.2.0")).is_ok());
    }

    #[test]
    fn older_host_rejected() {
        let err = validate_handshake(&blob("editor", "1.1.9"), &config("editor", "1.2.0")).unwrap_err();
        assert!(matches!(err, PeerError::HandshakeFailed(msg) if msg.contains("older")));
    }

    #[test]
    fn versions_compare_as_strings() {
        assert!(validate_handshake(&blob("editor", "9"), &config("editor", "10")).is_ok());
        assert!(validate_handshake(&blob("editor", "10"), &config("editor", "9")).is_err());
    }

    #[test]
    fn wrong_host_rejected() {
        let err = validate_handshake(&blob("other", "2.0"), &config("editor", "1.0")).unwrap_err();
        assert!(matches!(err, PeerError::HandshakeFailed(msg) if msg.contains("unexpected host")));
    }

    #[test]
    fn host_name_is_case_sensitive() {
        assert!(validate_handshake(&blob("Editor", "2.0"), &config("editor", "1.0")).is_err());
    }

    #[test]
    fn garbage_blob_rejected() {
        let err = validate_handshake("not base64 at all!", &config("editor", "1.0")).unwrap_err();
        assert!(matches!(err, PeerError::HandshakeFailed(_)));
    }

    #[test]
    fn non_json_blob_rejected() {
        let blob = STANDARD.encode(b"\x81\xa4name");
        let err = validate_handshake(&blob, &config("editor", "1.0")).unwrap_err();
        assert!(matches!(err, PeerError::HandshakeFailed(msg) if msg.contains("invalid handshake record")));
    }

    #[test]
    fn empty_blob_rejected() {
        assert!(HandshakeRecord::decode("").is_err());
        assert!(HandshakeRecord::decode(" ").is_err());
    }

    #[test]
    fn long_identity_accepted() {
        let name = "h".repeat(300);
        let version = format!("2.{}", "0".repeat(200));
        let record = validate_handshake(&blob(&name, &version), &config(&name, "1.0")).unwrap();
        assert_eq!(record.host_version, version);
    }

    #[test]
    fn empty_fields_rejected() {
        assert!(HandshakeRecord::new("", "1.0").encode().is_err());
        assert!(HandshakeRecord::new("editor", "").encode().is_err());

        let blob = STANDARD.encode(br#"{"host_name":"editor","host_version":""}"#);
        assert!(HandshakeRecord::decode(&blob).is_err());
    }

    #[test]
    fn missing_field_rejected() {
        let blob = STANDARD.encode(br#"{"host_name":"editor"}"#);
        assert!(matches!(
            HandshakeRecord::decode(&blob),
            Err(PeerError::HandshakeFailed(_))
        ));
    }

    #[test]
    fn blob_is_single_shell_token() {
        let blob = blob("my host", "1.0 beta");
        assert!(!blob.chars().any(char::is_whitespace));
    }
}
