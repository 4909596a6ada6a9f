//! Device profile detection
//!
//! The profile is a pure function of the signals the webview shell reports
//! at launch. It never fails: anything unrecognised is a non-mobile `Other`.

use serde::{Deserialize, Serialize};

/// Operating system family, as far as camera permissions are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFamily {
    Ios,
    Android,
    Other,
}

impl Default for PlatformFamily {
    fn default() -> Self {
        Self::Other
    }
}

/// Raw environment signals collected by the shell
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentSignals {
    /// Browser user-agent string
    pub user_agent: String,

    /// `display-mode: standalone` media query matched
    pub display_mode_standalone: bool,

    /// Safari's non-standard `navigator.standalone`
    pub navigator_standalone: bool,

    /// `document.referrer`
    pub referrer: String,

    /// `navigator.maxTouchPoints`
    pub touch_points: u32,
}

impl EnvironmentSignals {
    /// Parse the percent-encoded launch query passed by the shell, e.g.
    /// `ua=Mozilla%2F5.0...&standalone=1&referrer=android-app%3A%2F%2Fcom.example`.
    ///
    /// Unknown keys and malformed pairs are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut signals = Self::default();
        let query = query.strip_prefix('?').unwrap_or(query);

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let value = match urlencoding::decode(&raw.replace('+', " ")) {
                Ok(v) => v.into_owned(),
                Err(e) => {
                    tracing::debug!("Skipping undecodable signal {}: {}", key, e);
                    continue;
                }
            };

            match key {
                "ua" => signals.user_agent = value,
                "standalone" => signals.display_mode_standalone = parse_flag(&value),
                "ios_standalone" => signals.navigator_standalone = parse_flag(&value),
                "referrer" => signals.referrer = value,
                "touch_points" => signals.touch_points = value.parse().unwrap_or(0),
                _ => {}
            }
        }

        signals
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Immutable classification of the running environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    pub is_mobile: bool,
    pub platform_family: PlatformFamily,
    /// Running from the home screen rather than a browser tab
    pub is_installed_app: bool,
}

impl DeviceProfile {
    /// Classify the environment described by `signals`
    pub fn detect(signals: &EnvironmentSignals) -> Self {
        let ua = signals.user_agent.as_str();

        let is_apple_handheld = ["iPhone", "iPad", "iPod"].iter().any(|m| ua.contains(m));
        // iPadOS 13+ reports a desktop Safari UA; touch support gives it away
        let is_desktop_class_ipad = ua.contains("Macintosh") && signals.touch_points > 1;

        let platform_family = if is_apple_handheld || is_desktop_class_ipad {
            PlatformFamily::Ios
        } else if ua.contains("Android") {
            PlatformFamily::Android
        } else {
            PlatformFamily::Other
        };

        let is_mobile = platform_family != PlatformFamily::Other || ua.contains("Mobi");

        let is_installed_app = signals.display_mode_standalone
            || signals.navigator_standalone
            || signals.referrer.starts_with("android-app://");

        let profile = Self {
            is_mobile,
            platform_family,
            is_installed_app,
        };
        tracing::debug!("Detected device profile: {:?}", profile);
        profile
    }

    pub fn is_ios(&self) -> bool {
        self.platform_family == PlatformFamily::Ios
    }

    /// Installed iOS web apps only re-prompt for the camera after a full restart
    pub fn is_ios_installed_app(&self) -> bool {
        self.is_ios() && self.is_installed_app
    }
}
