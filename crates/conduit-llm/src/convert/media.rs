//! MIME classification for media parts

/// Broad category of a media part, deciding how it is embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaCategory {
    Image,
    Document,
    Audio,
    Video,
    /// No vendor block exists; the part is described in text instead
    Unsupported,
}

impl MediaCategory {
    /// Classify a MIME type, ignoring case and parameters
    pub fn classify(mime_type: &str) -> Self {
        let essence = essence(mime_type);
        let Some((kind, subtype)) = essence.split_once('/') else {
            return Self::Unsupported;
        };

        match kind {
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "application" if is_document(subtype) => Self::Document,
            _ => Self::Unsupported,
        }
    }
}

fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_document(subtype: &str) -> bool {
    matches!(subtype, "pdf" | "msword" | "rtf")
        || subtype.starts_with("vnd.openxmlformats-officedocument.")
        || subtype.starts_with("vnd.oasis.opendocument.")
        || subtype.starts_with("vnd.ms-")
}

/// Audio encoding name derived from the MIME subtype
///
/// `audio/mpeg` becomes `mp3`, the wave aliases become `wav`, and an
/// `x-` prefix is dropped from anything else.
pub fn audio_format(mime_type: &str) -> String {
    let essence = essence(mime_type);
    let subtype = essence.split_once('/').map_or(essence.as_str(), |(_, s)| s);

    match subtype {
        "mpeg" | "mp3" => "mp3".to_owned(),
        "wav" | "wave" | "x-wav" | "vnd.wave" => "wav".to_owned(),
        other => other.strip_prefix("x-").unwrap_or(other).to_owned(),
    }
}

/// `data:` URI for a base64 payload
pub fn data_uri(mime_type: &str, data: &str) -> String {
    format!("data:{mime_type};base64,{data}")
}

/// Text standing in for media no vendor block can carry
pub fn unsupported_description(mime_type: &str, display_name: Option<&str>) -> String {
    match display_name {
        Some(name) => format!("[Unsupported media: {mime_type} ({name})]"),
        None => format!("[Unsupported media: {mime_type}]"),
    }
}
