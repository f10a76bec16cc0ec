//! Pulling a JSON object out of free-form model output.

use serde::de::DeserializeOwned;

pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Slice from the first `{` to the last `}`, if any.
pub fn first_json_object(response: &str) -> Option<&str> {
    let s = strip_code_blocks(response);
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

/// Decode the embedded object into `T`; the error text is for logs.
pub fn parse_embedded<T: DeserializeOwned>(response: &str) -> Result<T, String> {
    let raw = first_json_object(response).ok_or_else(|| "no JSON object in response".to_string())?;
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_object_inside_fences_and_prose() {
        let r = "Sure! Here it is:\n```json\n{\"a\": {\"b\": 1}}\n```\nAnything else?";
        assert_eq!(first_json_object(r), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(first_json_object("no braces"), None);
        assert_eq!(first_json_object("} backwards {"), None);
    }

    #[test]
    fn parse_reports_errors_as_text() {
        #[derive(serde::Deserialize)]
        struct X {
            #[allow(dead_code)]
            n: u32,
        }
        assert!(parse_embedded::<X>("{\"n\": 3}").is_ok());
        assert!(parse_embedded::<X>("{\"n\": \"x\"}").is_err());
    }
}
