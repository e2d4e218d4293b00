//! Uploaded documents: naming rules and text extraction

mod extract;

pub use extract::extract_text_from_file;

use chrono::{DateTime, Local};
use uuid::Uuid;

/// Whether `filename` has one of `allowed` extensions (case-insensitive)
pub fn allowed_file(filename: &str, allowed: &[&str]) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => allowed.contains(&ext.to_lowercase().as_str()),
        None => false,
    }
}

/// Reduce a client-supplied name to a safe single path component
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = kept.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Stored name for an uploaded resume: `{uuid}_{secure name}`
pub fn unique_resume_name(secure_name: &str) -> String {
    format!("{}_{}", Uuid::new_v4(), secure_name)
}

/// Stored name for an uploaded icon: `{uuid hex}_{secure name}`
pub fn unique_icon_name(secure_name: &str) -> String {
    format!("{}_{}", Uuid::new_v4().simple(), secure_name)
}

/// Display name for pasted resume text
pub fn text_artifact_name(now: DateTime<Local>) -> String {
    format!("text_artifact_{}.txt", now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_allowed_file() {
        let exts = ["pdf", "docx", "txt"];
        assert!(allowed_file("CV.PDF", &exts));
        assert!(allowed_file("my.resume.docx", &exts));
        assert!(!allowed_file("resume", &exts));
        assert!(!allowed_file("resume.exe", &exts));
        assert!(!allowed_file("resume.", &exts));
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My Resume 2024.pdf"), "My_Resume_2024.pdf");
        assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("..\\windows\\cv.docx"), "windows_cv.docx");
        assert_eq!(secure_filename("résumé.pdf"), "rsum.pdf");
        assert_eq!(secure_filename("a  b\tc.txt"), "a_b_c.txt");
        assert_eq!(secure_filename("..."), "file");
        assert_eq!(secure_filename("<script>.svg"), "script.svg");
    }

    #[test]
    fn test_generated_names() {
        let resume = unique_resume_name("cv.pdf");
        assert_eq!(resume.len(), 36 + 1 + "cv.pdf".len());
        assert!(resume.ends_with("_cv.pdf"));

        let icon = unique_icon_name("bot.png");
        assert_eq!(icon.len(), 32 + 1 + "bot.png".len());

        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(text_artifact_name(now), "text_artifact_20240309_140507.txt");
    }
}
