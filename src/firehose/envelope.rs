use serde::Deserialize;
use serde_json::Value;

/// A single frame from the firehose: `{kind, did, time_us, commit?,
/// identity?, account?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub kind: String,
    /// The repository owner DID — not necessarily the subject of the record.
    pub did: String,
    pub time_us: i64,
    pub commit: Option<Commit>,
    pub identity: Option<IdentityFrame>,
    pub account: Option<AccountFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub rev: String,
    pub operation: Operation,
    pub collection: String,
    pub rkey: String,
    pub cid: Option<String>,
    pub record: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityFrame {
    pub did: String,
    pub handle: Option<String>,
    pub seq: i64,
    pub time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountFrame {
    pub active: bool,
    pub did: String,
    pub seq: i64,
    pub time: String,
}

impl Envelope {
    /// Builds the AT-URI of the record this envelope's commit addresses:
    /// `at://<did>/<collection>/<rkey>`.
    pub fn record_uri(&self) -> Option<String> {
        let commit = self.commit.as_ref()?;
        Some(format!("at://{}/{}/{}", self.did, commit.collection, commit.rkey))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commit_envelope() {
        let raw = r#"{
            "kind": "commit",
            "did": "did:plc:alice",
            "time_us": 1234567890,
            "commit": {
                "rev": "abc",
                "operation": "create",
                "collection": "feed.comment",
                "rkey": "xyz",
                "cid": "bafy123",
                "record": {"content": "hi"}
            }
        }"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.kind, "commit");
        let commit = envelope.commit.as_ref().unwrap();
        assert_eq!(commit.operation, Operation::Create);
        assert_eq!(
            envelope.record_uri().unwrap(),
            "at://did:plc:alice/feed.comment/xyz"
        );
    }

    #[test]
    fn parses_identity_envelope() {
        let raw = r#"{
            "kind": "identity",
            "did": "did:plc:alice",
            "time_us": 1,
            "identity": {"did": "did:plc:alice", "handle": "alice.example", "seq": 1, "time": "2026-01-01T00:00:00Z"}
        }"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.identity.unwrap().handle.as_deref(), Some("alice.example"));
        assert!(envelope.record_uri().is_none());
    }
}
