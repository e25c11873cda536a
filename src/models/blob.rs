use serde_json::Value;

/// Structural unpack of `{$type:"blob", ref:{$link:cid}, mimeType, size}`.
/// Invalid blob structures degrade to `None` rather than erroring, leaving
/// the field untouched by the user-profile projector.
pub fn extract_blob_cid(value: Option<&Value>) -> Option<String> {
    let value = value?;
    if value.get("$type")?.as_str()? != "blob" {
        return None;
    }
    value.get("ref")?.get("$link")?.as_str().map(str::to_string)
}

/// Builds the public blob-fetch URL a client uses to retrieve a blob:
/// `<pds-url>/xrpc/com.atproto.sync.getBlob?did=<did>&cid=<cid>`.
pub fn blob_url(pds_url: &str, did: &str, cid: &str) -> String {
    format!(
        "{}/xrpc/com.atproto.sync.getBlob?did={}&cid={}",
        pds_url.trim_end_matches('/'),
        urlencoding::encode(did),
        urlencoding::encode(cid)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_valid_blob_ref() {
        let v = json!({
            "$type": "blob",
            "ref": { "$link": "bafyreiabc123" },
            "mimeType": "image/png",
            "size": 1024
        });
        assert_eq!(extract_blob_cid(Some(&v)), Some("bafyreiabc123".to_string()));
    }

    #[test]
    fn degrades_on_missing_field() {
        let v = json!({ "$type": "blob" });
        assert_eq!(extract_blob_cid(Some(&v)), None);
    }

    #[test]
    fn degrades_on_wrong_type() {
        let v = json!({ "$type": "not-a-blob", "ref": { "$link": "x" } });
        assert_eq!(extract_blob_cid(Some(&v)), None);
    }

    #[test]
    fn degrades_on_absent_value() {
        assert_eq!(extract_blob_cid(None), None);
    }

    #[test]
    fn builds_blob_url() {
        let url = blob_url("https://pds.example", "did:plc:abc", "bafy123");
        assert_eq!(
            url,
            "https://pds.example/xrpc/com.atproto.sync.getBlob?did=did%3Aplc%3Aabc&cid=bafy123"
        );
    }
}
