use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod dialog_names;
pub mod file_meta;
pub mod i18n;
pub mod password;

pub use dialog_names::random_dialog_name;
pub use file_meta::{FileKind, format_file_size, format_relative_time, is_image};
pub use i18n::{MessageKey, translate, translate_with};
pub use password::{
    generate_password, hash_password, reminder_file_contents, reminder_file_name,
    validate_password_format,
};

pub const MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;
pub const MAX_DEVICE_NAME_LEN: usize = 128;
pub const MAX_DIALOG_NAME_LEN: usize = 128;

pub type DialogId = String;
pub type DeviceId = String;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("password length must be between {min} and {max} digits, got {got}", min = password::MIN_PASSWORD_DIGITS, max = password::MAX_PASSWORD_DIGITS)]
    InvalidPasswordLength { got: usize },
    #[error("password must consist of 4 to 6 ASCII digits")]
    InvalidPasswordFormat,
    #[error("dialog name must be non-empty and <= {MAX_DIALOG_NAME_LEN} chars")]
    InvalidDialogName,
    #[error("file exceeds {MAX_FILE_BYTES} bytes: {size}")]
    FileTooLarge { size: u64 },
}

/// Visual theme preference. Unknown stored values fall back to the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Dark => "dark",
            Theme::Light => "light",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "light" => Theme::Light,
            _ => Theme::Dark,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "en" => Some(Language::En),
            "ru" => Some(Language::Ru),
            _ => None,
        }
    }

    /// Map a locale tag ("ru", "ru_RU.UTF-8", "ru-RU") to a supported
    /// language; anything not Russian reads as English.
    pub fn detect(locale: &str) -> Self {
        let lower = locale.trim().to_ascii_lowercase();
        if lower.starts_with("ru") {
            Language::Ru
        } else {
            Language::En
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_parse_falls_back_to_dark() {
        assert_eq!(Theme::parse("light"), Theme::Light);
        assert_eq!(Theme::parse("dark"), Theme::Dark);
        assert_eq!(Theme::parse("solarized"), Theme::Dark);
        assert_eq!(Theme::parse(""), Theme::Dark);
    }

    #[test]
    fn language_detect_from_locale() {
        assert_eq!(Language::detect("ru_RU.UTF-8"), Language::Ru);
        assert_eq!(Language::detect("ru-RU"), Language::Ru);
        assert_eq!(Language::detect("en_US.UTF-8"), Language::En);
        assert_eq!(Language::detect("de_DE"), Language::En);
        assert_eq!(Language::detect(""), Language::En);
    }

    #[test]
    fn language_parse_rejects_unknown() {
        assert_eq!(Language::parse("en"), Some(Language::En));
        assert_eq!(Language::parse("ru"), Some(Language::Ru));
        assert_eq!(Language::parse("fr"), None);
    }
}
