/// Numeric identifier handed out by the asset packager.
pub type AssetId = u32;

/// A packaged asset as reported by the asset registry.
///
/// `scales` lists the device-pixel scales the packager emitted, in the order
/// it emitted them; `[1.0, 2.0]` means `name.type` and `name@2x.type` exist.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackagerAsset {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: String,
    #[cfg_attr(feature = "serde", serde(rename = "httpServerLocation"))]
    pub http_server_location: String,
    pub scales: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub width: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub height: Option<f64>,
}

impl PackagerAsset {
    /// Public URI for this asset at `scale`. Scale 1 carries no `@Nx` suffix.
    pub fn uri_for_scale(&self, scale: f64) -> String {
        let suffix = if scale == 1.0 {
            String::new()
        } else {
            format!("@{scale}x")
        };
        format!(
            "{}/{}{}.{}",
            self.http_server_location, self.name, suffix, self.kind
        )
    }
}
