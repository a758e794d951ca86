use crate::source::ImageResult;

/// Payload delivered to `on_load`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadEvent {
    pub source: ImageResult,
}

/// Payload delivered to `on_error`.
///
/// The reason is always reported as 404; the real HTTP status is not known
/// at this layer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadErrorEvent {
    pub error: String,
}

impl LoadErrorEvent {
    pub fn for_uri(uri: &str) -> Self {
        Self {
            error: format!("Failed to load resource {uri} (404)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_embeds_uri_and_fixed_reason() {
        let event = LoadErrorEvent::for_uri("https://x/missing.png");
        assert_eq!(
            event.error,
            "Failed to load resource https://x/missing.png (404)"
        );
    }
}
