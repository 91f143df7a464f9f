//! User-agent string classifier. The scoring model itself (token embedding,
//! inference) is an internal algorithm and out of scope; this module covers
//! the configuration surface and request validation only.

use std::fs;

use crate::task::Classifier;

const DEFAULT_MAX_TOKENS: u32 = 50;

#[derive(Debug)]
pub struct UserAgent {
    max_tokens: u32,
}

impl UserAgent {
    /// `token_map_path` and `model_path` are required and must be openable;
    /// `max_tokens` defaults to 50 when absent, matching `Generator::SetUpClassifier`.
    pub fn load(token_map_path: &str, model_path: &str, max_tokens: Option<u32>) -> Result<Self, UserAgentError> {
        fs::metadata(token_map_path).map_err(|e| UserAgentError::OpenFailed("token_map_path", token_map_path.to_string(), e))?;
        fs::metadata(model_path).map_err(|e| UserAgentError::OpenFailed("model_path", model_path.to_string(), e))?;
        Ok(Self {
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}

impl Classifier for UserAgent {
    fn filter_code(&self) -> u64 {
        crate::cache::fingerprint(b"USERAGENT")
    }

    fn parse_entry(&self, entry: &serde_json::Value) -> Option<Vec<u8>> {
        let items = entry.as_array()?;
        if items.len() != 1 {
            return None;
        }
        Some(items[0].as_str()?.as_bytes().to_vec())
    }

    fn classify(&self, _entry: &[u8]) -> u32 {
        tracing::trace!("user-agent model inference is not implemented; returning 0");
        0
    }

    fn describe(&self, entry: &[u8]) -> String {
        String::from_utf8_lossy(entry).into_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UserAgentError {
    #[error("cannot open {0} '{1}': {2}")]
    OpenFailed(&'static str, String, std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_map_is_rejected() {
        let err = UserAgent::load("/nonexistent/token_map", "/nonexistent/model", None).unwrap_err();
        assert!(matches!(err, UserAgentError::OpenFailed("token_map_path", _, _)));
    }

    #[test]
    fn parse_entry_requires_single_string() {
        let ua = UserAgent { max_tokens: 50 };
        let ok: serde_json::Value = serde_json::from_str(r#"["Mozilla/5.0"]"#).unwrap();
        assert!(ua.parse_entry(&ok).is_some());
        let bad: serde_json::Value = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert!(ua.parse_entry(&bad).is_none());
    }
}
