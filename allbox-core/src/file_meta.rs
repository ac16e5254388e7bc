use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico"];
const VIDEO_EXTS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "flv"];
const AUDIO_EXTS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "m4a"];
const ARCHIVE_EXTS: &[&str] = &["zip", "rar", "7z", "tar", "gz"];
const SPREADSHEET_EXTS: &[&str] = &["xls", "xlsx", "csv"];
const PRESENTATION_EXTS: &[&str] = &["ppt", "pptx", "key"];
const DOCUMENT_EXTS: &[&str] = &["doc", "docx", "pdf", "txt", "rtf", "odt"];
const CODE_EXTS: &[&str] = &[
    "js", "ts", "jsx", "tsx", "html", "css", "json", "py", "java", "c", "cpp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Archive,
    Spreadsheet,
    Presentation,
    Document,
    Code,
    Other,
}

impl FileKind {
    pub fn classify(file_name: &str) -> Self {
        let ext = file_extension(file_name);
        let ext = ext.as_str();
        if IMAGE_EXTS.contains(&ext) {
            FileKind::Image
        } else if VIDEO_EXTS.contains(&ext) {
            FileKind::Video
        } else if AUDIO_EXTS.contains(&ext) {
            FileKind::Audio
        } else if ARCHIVE_EXTS.contains(&ext) {
            FileKind::Archive
        } else if SPREADSHEET_EXTS.contains(&ext) {
            FileKind::Spreadsheet
        } else if PRESENTATION_EXTS.contains(&ext) {
            FileKind::Presentation
        } else if DOCUMENT_EXTS.contains(&ext) {
            FileKind::Document
        } else if CODE_EXTS.contains(&ext) {
            FileKind::Code
        } else {
            FileKind::Other
        }
    }
}

pub fn is_image(file_name: &str) -> bool {
    // SVG previews render inline, .ico does not, hence the shorter list.
    let ext = file_extension(file_name);
    ["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp"].contains(&ext.as_str())
}

fn file_extension(file_name: &str) -> String {
    file_name
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Human-readable size: `0 B`, `512 B`, `1.5 KB`, `2 MB`. One decimal place,
/// dropped when it is zero.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_owned();
    }

    let mut index = (bytes.ilog2() / 10) as usize;
    if index >= UNITS.len() {
        index = UNITS.len() - 1;
    }
    let value = bytes as f64 / 1024_f64.powi(index as i32);
    let rounded = (value * 10.0).round() / 10.0;
    if (rounded - rounded.trunc()).abs() < f64::EPSILON {
        format!("{} {}", rounded.trunc() as u64, UNITS[index])
    } else {
        format!("{rounded:.1} {}", UNITS[index])
    }
}

/// Compact "time ago" rendering used on dialog and file cards.
pub fn format_relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    let minutes = elapsed.num_minutes();
    let hours = elapsed.num_hours();
    let days = elapsed.num_days();

    if minutes < 1 {
        return "Just now".to_owned();
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    if hours < 24 {
        return format!("{hours}h ago");
    }
    if days < 7 {
        return format!("{days}d ago");
    }

    if then.year() == now.year() {
        then.format("%b %-d").to_string()
    } else {
        then.format("%b %-d, %Y").to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn classification_by_extension() {
        assert_eq!(FileKind::classify("photo.JPG"), FileKind::Image);
        assert_eq!(FileKind::classify("clip.mkv"), FileKind::Video);
        assert_eq!(FileKind::classify("note.m4a"), FileKind::Audio);
        assert_eq!(FileKind::classify("bundle.tar"), FileKind::Archive);
        assert_eq!(FileKind::classify("sheet.csv"), FileKind::Spreadsheet);
        assert_eq!(FileKind::classify("deck.key"), FileKind::Presentation);
        assert_eq!(FileKind::classify("report.pdf"), FileKind::Document);
        assert_eq!(FileKind::classify("main.cpp"), FileKind::Code);
        assert_eq!(FileKind::classify("mystery.bin"), FileKind::Other);
        assert_eq!(FileKind::classify("no_extension"), FileKind::Other);
    }

    #[test]
    fn image_preview_excludes_ico() {
        assert!(is_image("icon.png"));
        assert!(!is_image("favicon.ico"));
    }

    #[test]
    fn file_sizes_round_to_one_decimal() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2 MB");
        assert_eq!(format_file_size(100 * 1024 * 1024), "100 MB");
    }

    #[test]
    fn relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let at = |secs: i64| now - chrono::Duration::seconds(secs);

        assert_eq!(format_relative_time(at(30), now), "Just now");
        assert_eq!(format_relative_time(at(5 * 60), now), "5m ago");
        assert_eq!(format_relative_time(at(3 * 3600), now), "3h ago");
        assert_eq!(format_relative_time(at(2 * 86_400), now), "2d ago");
        assert_eq!(
            format_relative_time(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(), now),
            "Mar 1"
        );
        assert_eq!(
            format_relative_time(Utc.with_ymd_and_hms(2024, 12, 5, 0, 0, 0).unwrap(), now),
            "Dec 5, 2024"
        );
    }
}
