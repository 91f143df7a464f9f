//! Yara pattern scanner. Rule compilation and matching are internal
//! algorithms and out of scope; this module covers configuration and the
//! per-entry `[chunk]` / `[chunk, encoding]` request shape.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::task::Classifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Hex,
    Base64,
}

impl Encoding {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "hex" => Some(Encoding::Hex),
            "base64" => Some(Encoding::Base64),
            _ => None,
        }
    }
}

pub struct Yara {
    fastmode: bool,
    timeout: u32,
    rule_files: Vec<String>,
}

impl Yara {
    /// `fastmode` defaults to true, `timeout` to 0 (no timeout);
    /// `rule_file_list` is required and must be non-empty, matching
    /// `Generator::LoadConfig`.
    pub fn new(rule_files: Vec<String>, fastmode: Option<bool>, timeout: Option<u32>) -> Result<Self, YaraError> {
        if rule_files.is_empty() {
            return Err(YaraError::NoRuleFiles);
        }
        Ok(Self {
            fastmode: fastmode.unwrap_or(true),
            timeout: timeout.unwrap_or(0),
            rule_files,
        })
    }

    pub fn fastmode(&self) -> bool {
        self.fastmode
    }

    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn rule_files(&self) -> &[String] {
        &self.rule_files
    }
}

fn decode(chunk: &str, encoding: Encoding) -> Option<Vec<u8>> {
    match encoding {
        Encoding::Hex => hex::decode(chunk).ok(),
        Encoding::Base64 => BASE64.decode(chunk).ok(),
    }
}

impl Classifier for Yara {
    fn filter_code(&self) -> u64 {
        crate::cache::fingerprint(b"YARA")
    }

    /// Accepts `[chunk]` (raw string) or `[chunk, encoding]` with
    /// `encoding` in `{hex, base64}`.
    fn parse_entry(&self, entry: &serde_json::Value) -> Option<Vec<u8>> {
        let fields = entry.as_array()?;
        match fields.len() {
            1 => Some(fields[0].as_str()?.as_bytes().to_vec()),
            2 => {
                let chunk = fields[0].as_str()?;
                let encoding = Encoding::parse(fields[1].as_str()?)?;
                decode(chunk, encoding)
            }
            _ => None,
        }
    }

    fn classify(&self, _entry: &[u8]) -> u32 {
        tracing::trace!("yara rule matching is not implemented; returning 0");
        0
    }

    fn describe(&self, entry: &[u8]) -> String {
        hex::encode(entry)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum YaraError {
    #[error("rule_file_list must contain at least one rule file")]
    NoRuleFiles,
}
