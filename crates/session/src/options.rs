//! Caller-facing render options.

use serde::{Deserialize, Serialize};

use crate::capture::ErrorPolicy;
use crate::session::SessionSetting;

/// Default mime type for raster output.
pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// Units accepted for PDF page geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfUnit {
    Pt,
    Mm,
    Cm,
    In,
}

impl std::str::FromStr for PdfUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pt" => Ok(Self::Pt),
            "mm" => Ok(Self::Mm),
            "cm" => Ok(Self::Cm),
            "in" => Ok(Self::In),
            other => Err(format!("unknown unit '{other}' (expected pt, mm, cm or in)")),
        }
    }
}

/// Options accepted by every export call. Unset fields keep the renderer's
/// own defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_background: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_bleed: Option<bool>,

    /// Per-job asset load timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_load_timeout: Option<u64>,
    /// Per-job font load timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_load_timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_text_render_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_vertical_resize_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_split_allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_overflow: Option<String>,

    #[serde(default)]
    pub skip_font_error: bool,
    #[serde(default)]
    pub skip_image_error: bool,

    // PDF only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<PdfUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_mark_size: Option<f64>,
}

impl RenderOptions {
    pub fn mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE)
    }

    /// Configuration calls issued into the session before a job runs, in
    /// a stable order.
    pub fn session_settings(&self) -> Vec<SessionSetting> {
        let mut settings = Vec::new();
        if let Some(ms) = self.asset_load_timeout {
            settings.push(SessionSetting::AssetLoadTimeout(ms));
        }
        if let Some(ms) = self.font_load_timeout {
            settings.push(SessionSetting::FontLoadTimeout(ms));
        }
        if let Some(enabled) = self.html_text_render_enabled {
            settings.push(SessionSetting::HtmlTextRenderEnabled(enabled));
        }
        if let Some(enabled) = self.text_vertical_resize_enabled {
            settings.push(SessionSetting::TextVerticalResizeEnabled(enabled));
        }
        if let Some(allowed) = self.text_split_allowed {
            settings.push(SessionSetting::TextSplitAllowed(allowed));
        }
        if let Some(mode) = &self.text_overflow {
            settings.push(SessionSetting::TextOverflow(mode.clone()));
        }
        settings
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy {
            skip_font_error: self.skip_font_error,
            skip_image_error: self.skip_image_error,
        }
    }
}
