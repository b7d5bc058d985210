/// Script detection and file-name splitting
use once_cell::sync::Lazy;
use regex::Regex;

/// Hiragana, katakana (full and half width) and CJK ideographs.
static JAPANESE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\x{3040}-\x{309F}\x{30A0}-\x{30FF}\x{31F0}-\x{31FF}\x{3400}-\x{4DBF}\x{4E00}-\x{9FFF}\x{F900}-\x{FAFF}\x{FF66}-\x{FF9F}]",
    )
    .expect("valid japanese script regex")
});

/// Returns true when `text` contains at least one Japanese code point.
pub fn needs_translation(text: &str) -> bool {
    JAPANESE_REGEX.is_match(text)
}

/// Splits a file name at its final extension segment.
///
/// A leading dot does not start an extension, so `.profile` has none.
pub fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(index) if index > 0 => (&file_name[..index], Some(&file_name[index + 1..])),
        _ => (file_name, None),
    }
}

/// The file name with its final extension removed. This is the unit that is
/// cached, substituted and translated.
pub fn base_name(file_name: &str) -> &str {
    split_extension(file_name).0
}

/// Cache key for a file name.
pub fn normalized_base_name(file_name: &str) -> String {
    base_name(file_name).trim().to_string()
}

/// Re-attaches the original extension to a translated base name.
pub fn display_name(file_name: &str, translated_base: &str) -> String {
    match split_extension(file_name).1 {
        Some(ext) if !ext.is_empty() => format!("{translated_base}.{ext}"),
        _ => translated_base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_kana_and_kanji() {
        assert!(needs_translation("ひらがな"));
        assert!(needs_translation("カタカナ"));
        assert!(needs_translation("日本語"));
        assert!(needs_translation("report_ﾃｽﾄ"));
        assert!(needs_translation("mixed 写真 2024"));
    }

    #[test]
    fn latin_names_are_skipped() {
        assert!(!needs_translation("holiday-photos"));
        assert!(!needs_translation(""));
        assert!(!needs_translation("café résumé"));
        assert!(!needs_translation("한국어"));
    }

    #[test]
    fn strips_only_the_last_extension() {
        assert_eq!(base_name("写真.jpg"), "写真");
        assert_eq!(base_name("archive.tar.gz"), "archive.tar");
        assert_eq!(base_name("README"), "README");
        assert_eq!(base_name(".profile"), ".profile");
    }

    #[test]
    fn display_name_keeps_extension() {
        assert_eq!(display_name("写真.jpg", "Photo"), "Photo.jpg");
        assert_eq!(display_name("メモ", "Memo"), "Memo");
        assert_eq!(display_name("資料.tar.gz", "Materials.tar"), "Materials.tar.gz");
    }
}
