use serde::Deserialize;

/// A DID document as returned by the upstream identity directory. Only the
/// fields the resolver needs are modelled; the rest pass through unused.
#[derive(Debug, Clone, Deserialize)]
pub struct DidDocument {
    pub id: String,
    #[serde(default, rename = "alsoKnownAs")]
    pub also_known_as: Vec<String>,
    #[serde(default)]
    pub service: Vec<DidService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DidService {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

impl DidDocument {
    /// The handle advertised in `alsoKnownAs` as `at://<handle>`, if any.
    pub fn handle(&self) -> Option<&str> {
        self.also_known_as
            .iter()
            .find_map(|aka| aka.strip_prefix("at://"))
    }

    /// The PDS service endpoint, identified by the AT Protocol's
    /// conventional service id/type.
    pub fn pds_url(&self) -> Option<&str> {
        self.service
            .iter()
            .find(|s| s.id == "#atproto_pds" || s.service_type == "AtprotoPersonalDataServer")
            .map(|s| s.service_endpoint.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DidDocument {
        serde_json::from_value(serde_json::json!({
            "id": "did:plc:abc123",
            "alsoKnownAs": ["at://alice.example"],
            "service": [{
                "id": "#atproto_pds",
                "type": "AtprotoPersonalDataServer",
                "serviceEndpoint": "https://pds.example"
            }]
        }))
        .unwrap()
    }

    #[test]
    fn extracts_handle_and_pds_url() {
        let doc = sample();
        assert_eq!(doc.handle(), Some("alice.example"));
        assert_eq!(doc.pds_url(), Some("https://pds.example"));
    }

    #[test]
    fn missing_service_yields_none() {
        let doc = DidDocument {
            id: "did:plc:abc".into(),
            also_known_as: vec![],
            service: vec![],
        };
        assert_eq!(doc.handle(), None);
        assert_eq!(doc.pds_url(), None);
    }
}
