//! Plain text from uploaded resumes

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;

static PARAGRAPH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<w:p(?:\s[^>]*[^/])?>(.*?)</w:p>").expect("valid paragraph regex")
});

static RUN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*[^/])?>(.*?)</w:t>|<w:tab/>").expect("valid run regex")
});

/// Extract text by extension. Unsupported types and failures yield an empty string.
pub fn extract_text_from_file(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let result = match ext.as_str() {
        "pdf" => extract_pdf(path),
        "docx" => extract_docx(path),
        "txt" | "text" => std::fs::read_to_string(path).map_err(|e| e.to_string()),
        other => Err(format!("unsupported file type '{}'", other)),
    };

    match result {
        Ok(text) => text,
        Err(e) => {
            log::warn!("Could not extract text from {}: {}", path.display(), e);
            String::new()
        }
    }
}

fn extract_pdf(path: &Path) -> Result<String, String> {
    // pdf-extract panics on some malformed documents
    let path = path.to_path_buf();
    std::panic::catch_unwind(move || pdf_extract::extract_text(&path))
        .map_err(|_| "PDF parser panicked".to_string())?
        .map(|text| text.trim().to_string())
        .map_err(|e| format!("PDF extraction failed: {}", e))
}

fn extract_docx(path: &Path) -> Result<String, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("Invalid DOCX container: {}", e))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| format!("DOCX has no document body: {}", e))?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;

    Ok(docx_paragraphs(&xml).join("\n\n"))
}

/// Non-blank paragraph texts of a WordprocessingML body
fn docx_paragraphs(xml: &str) -> Vec<String> {
    PARAGRAPH_RE
        .captures_iter(xml)
        .filter_map(|para| {
            let text: String = RUN_RE
                .captures_iter(&para[1])
                .map(|run| match run.get(1) {
                    Some(t) => unescape_xml(t.as_str()),
                    None => "\t".to_string(),
                })
                .collect();
            if text.trim().is_empty() { None } else { Some(text) }
        })
        .collect()
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
