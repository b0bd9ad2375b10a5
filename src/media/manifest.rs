//! IIIF Presentation manifest inspection.

use serde_json::Value;

/// First `.jpg`/`.png` image in `sequences → canvases → images`, skipping logos.
pub fn first_image_url(manifest: &Value) -> Option<String> {
    let canvases = manifest
        .get("sequences")?
        .as_array()?
        .first()?
        .get("canvases")?
        .as_array()?;

    canvases
        .iter()
        .filter_map(|canvas| canvas.get("images")?.as_array())
        .flatten()
        .filter_map(|image| image.get("resource")?.get("@id")?.as_str())
        .find(|id| {
            let lower = id.to_ascii_lowercase();
            (lower.ends_with(".jpg") || lower.ends_with(".png")) && !lower.contains("logo")
        })
        .map(str::to_string)
}

/// Number of canvases (pages) in the first sequence.
pub fn canvas_count(manifest: &Value) -> usize {
    manifest
        .get("sequences")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(|s| s.get("canvases"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(ids: &[&str]) -> Value {
        json!({
            "sequences": [{
                "canvases": ids.iter().map(|id| json!({
                    "images": [{"resource": {"@id": id}}]
                })).collect::<Vec<_>>()
            }]
        })
    }

    #[test]
    fn skips_logos_and_non_images() {
        let m = manifest(&[
            "https://iiif.example/logo.png",
            "https://iiif.example/page1/info.json",
            "https://iiif.example/page2/full/max/0/default.JPG",
        ]);
        assert_eq!(
            first_image_url(&m).as_deref(),
            Some("https://iiif.example/page2/full/max/0/default.JPG")
        );
        assert_eq!(canvas_count(&m), 3);
    }

    #[test]
    fn empty_or_malformed_manifest_has_no_image() {
        assert!(first_image_url(&json!({})).is_none());
        assert!(first_image_url(&json!({"sequences": []})).is_none());
        assert!(first_image_url(&json!({"sequences": [{"canvases": "x"}]})).is_none());
        assert_eq!(canvas_count(&json!({})), 0);
    }
}
