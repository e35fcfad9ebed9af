//! Device platforms and the build artifact rules attached to them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Artifact extensions accepted for iOS devices.
pub const IOS_BUILD_EXTENSIONS: &[&str] = &[".ipa", ".app"];

/// Artifact extensions accepted for Android devices.
pub const ANDROID_BUILD_EXTENSIONS: &[&str] = &[".apk", ".aab"];

/// Mobile platform of a simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }

    /// Parse a platform name (`"ios"`, `"android"`, any case).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("ios") {
            Some(Platform::Ios)
        } else if s.eq_ignore_ascii_case("android") {
            Some(Platform::Android)
        } else {
            None
        }
    }

    /// Guess the platform from a device name and OS version.
    ///
    /// Only a *prefix* match is performed: `"iPhone 14"` is iOS but
    /// `"My iPhone 14"` is not. Everything that is not recognised as iOS
    /// is treated as Android.
    pub fn detect(device_name: &str, os_version: &str) -> Self {
        if device_name.starts_with("iPhone") || os_version.starts_with("iOS") {
            Platform::Ios
        } else {
            Platform::Android
        }
    }

    /// Extensions (dot included) of artifacts installable on this platform.
    pub fn build_extensions(&self) -> &'static [&'static str] {
        match self {
            Platform::Ios => IOS_BUILD_EXTENSIONS,
            Platform::Android => ANDROID_BUILD_EXTENSIONS,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allowed artifact extensions for a platform; an unknown platform accepts
/// the union of every known set.
pub fn allowed_build_extensions(platform: Option<Platform>) -> Vec<&'static str> {
    match platform {
        Some(p) => p.build_extensions().to_vec(),
        None => IOS_BUILD_EXTENSIONS
            .iter()
            .chain(ANDROID_BUILD_EXTENSIONS)
            .copied()
            .collect(),
    }
}

/// Whether a lower-cased extension (dot included) is a valid build artifact.
pub fn is_valid_build_extension(ext: &str, platform: Option<Platform>) -> bool {
    allowed_build_extensions(platform).contains(&ext)
}

/// Split an uploaded filename into `(stem, extension)`.
///
/// The extension is everything from the last `.` of the final path
/// component, lower-cased, dot included; it is empty when there is no dot.
/// The stem keeps its original case.
pub fn split_filename(filename: &str) -> (&str, String) {
    let base_start = filename.rfind(['/', '\\']).map_or(0, |i| i + 1);
    match filename[base_start..].rfind('.') {
        Some(dot) => {
            let dot = base_start + dot;
            (&filename[..dot], filename[dot..].to_ascii_lowercase())
        }
        None => (filename, String::new()),
    }
}
