//! Content type parsing and support checks.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A parsed `type/subtype; name=value` content type. Type, subtype and
/// parameter names are lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub media_type: String,
    pub subtype: String,
    pub parameters: Vec<(String, String)>,
}

impl ContentType {
    /// Parse a content type string.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = input.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (media_type, subtype) = essence
            .split_once('/')
            .ok_or_else(|| Error::not_supported(format!("Malformed content type: {input:?}")))?;
        let media_type = media_type.trim().to_ascii_lowercase();
        let subtype = subtype.trim().to_ascii_lowercase();
        if media_type.is_empty() || subtype.is_empty() || subtype.contains('/') {
            return Err(Error::not_supported(format!(
                "Malformed content type: {input:?}"
            )));
        }

        let mut parameters = Vec::new();
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (name, value) = param.split_once('=').ok_or_else(|| {
                Error::not_supported(format!("Malformed parameter {param:?} in {input:?}"))
            })?;
            let value = value.trim().trim_matches('"');
            parameters.push((name.trim().to_ascii_lowercase(), value.to_string()));
        }

        Ok(Self {
            media_type,
            subtype,
            parameters,
        })
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.media_type, self.subtype)
    }

    /// Value of a parameter, by lowercase name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The `codecs` parameter.
    pub fn codecs(&self) -> Option<&str> {
        self.parameter("codecs")
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.media_type, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, "; {}=\"{}\"", name, value)?;
        }
        Ok(())
    }
}

/// Whether a source buffer can be created for `content_type`.
///
/// Empty or malformed strings are unsupported. Otherwise the subtype must be
/// one of `supported_subtypes`.
pub fn is_type_supported(content_type: &str, supported_subtypes: &[String]) -> bool {
    if content_type.trim().is_empty() {
        return false;
    }
    match ContentType::parse(content_type) {
        Ok(parsed) => supported_subtypes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&parsed.subtype)),
        Err(_) => false,
    }
}

/// Whether the byte stream format carries no usable timestamps, so the
/// buffer must generate them (and is locked into sequence mode).
pub fn should_generate_timestamps(content_type: &ContentType) -> bool {
    match content_type.subtype.as_str() {
        "webm" | "mp4" | "mp2t" => false,
        "aac" | "mpeg" => content_type.media_type == "audio",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn subtypes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_with_codecs() {
        let ct: ContentType = "Video/MP4; codecs=\"avc1.64001f, mp4a.40.2\""
            .parse()
            .unwrap();
        assert_eq!(ct.media_type, "video");
        assert_eq!(ct.subtype, "mp4");
        assert_eq!(ct.essence(), "video/mp4");
        assert_eq!(ct.codecs(), Some("avc1.64001f, mp4a.40.2"));
        assert_eq!(ct.to_string(), "video/mp4; codecs=\"avc1.64001f, mp4a.40.2\"");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_matches!(ContentType::parse(""), Err(Error::NotSupported(_)));
        assert_matches!(ContentType::parse("video"), Err(Error::NotSupported(_)));
        assert_matches!(ContentType::parse("video/"), Err(Error::NotSupported(_)));
        assert_matches!(ContentType::parse("a/b/c"), Err(Error::NotSupported(_)));
        assert_matches!(
            ContentType::parse("video/mp4; codecs"),
            Err(Error::NotSupported(_))
        );
    }

    #[test]
    fn test_is_type_supported() {
        let mp4 = subtypes(&["mp4"]);
        assert!(is_type_supported("video/mp4", &mp4));
        assert!(is_type_supported("audio/mp4; codecs=\"mp4a.40.2\"", &mp4));
        assert!(!is_type_supported("video/webm", &mp4));
        assert!(!is_type_supported("", &mp4));
        assert!(!is_type_supported("   ", &mp4));
        assert!(!is_type_supported("mp4", &mp4));
        assert!(is_type_supported("video/webm", &subtypes(&["mp4", "webm"])));
    }

    #[test]
    fn test_should_generate_timestamps() {
        let check = |s: &str| should_generate_timestamps(&ContentType::parse(s).unwrap());
        assert!(!check("video/mp4"));
        assert!(!check("audio/mp4"));
        assert!(!check("video/webm"));
        assert!(!check("video/mp2t"));
        assert!(check("audio/aac"));
        assert!(check("audio/mpeg"));
        assert!(!check("video/mpeg"));
    }
}
