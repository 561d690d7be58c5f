//! Upload validation and document text extraction. Thin wrappers over
//! the extraction crates; the interesting part of the request flow
//! lives in the quota gate and the handlers, not here.

use std::io::{Cursor, Read};

use thiserror::Error;

use crate::errors::AppError;

pub const MAX_FILE_BYTES: usize = 5 * 1024 * 1024;
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "docx", "doc"];
/// A job description shorter than this carries too little signal.
pub const MIN_JD_CHARS: usize = 50;
/// Below this the extraction almost certainly failed (scanned image,
/// empty file), so the request is rejected before spending an AI call.
pub const MIN_CV_CHARS: usize = 100;
/// Coarser floor applied right after extraction, before the CV-specific
/// check in the handler: anything shorter is unreadable output.
const MIN_EXTRACTED_CHARS: usize = 50;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Only PDF and DOCX files are supported")]
    UnsupportedFormat,

    #[error("File size exceeds {max_mb}MB limit")]
    TooLarge { max_mb: usize },

    #[error("Could not read the document: {0}")]
    Unreadable(String),
}

impl From<ExtractError> for AppError {
    fn from(e: ExtractError) -> Self {
        AppError::Validation(e.to_string())
    }
}

fn extension(filename: &str) -> Option<String> {
    filename.rsplit('.').next().map(|e| e.to_lowercase())
}

pub fn validate_upload(filename: &str, size_bytes: usize) -> Result<(), ExtractError> {
    let ext = extension(filename).unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ExtractError::UnsupportedFormat);
    }
    if size_bytes > MAX_FILE_BYTES {
        return Err(ExtractError::TooLarge {
            max_mb: MAX_FILE_BYTES / (1024 * 1024),
        });
    }
    Ok(())
}

/// Extracts plain text from an uploaded document by extension.
pub fn extract_text(data: &[u8], filename: &str) -> Result<String, ExtractError> {
    let text = match extension(filename).unwrap_or_default().as_str() {
        "pdf" => pdf_extract::extract_text_from_mem(data)
            .map_err(|e| ExtractError::Unreadable(format!("PDF parse failed: {e}")))?,
        "docx" | "doc" => extract_docx(data)?,
        _ => return Err(ExtractError::UnsupportedFormat),
    };
    let text = text.trim().to_string();
    if text.chars().count() < MIN_EXTRACTED_CHARS {
        return Err(ExtractError::Unreadable(
            "No text found; the document may be a scanned image".to_string(),
        ));
    }
    Ok(text)
}

/// A .docx is a zip archive; the text lives in `word/document.xml`.
fn extract_docx(data: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| ExtractError::Unreadable(format!("not a DOCX archive: {e}")))?;
    let mut file = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Unreadable("DOCX has no document body".to_string()))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| ExtractError::Unreadable(format!("DOCX body unreadable: {e}")))?;
    Ok(strip_document_xml(&xml))
}

/// Reduces WordprocessingML to plain text: paragraph ends become
/// newlines, tags are dropped, the five XML entities are decoded.
fn strip_document_xml(xml: &str) -> String {
    let with_breaks = xml.replace("</w:p>", "\n").replace("<w:tab/>", "\t");

    let mut out = String::with_capacity(with_breaks.len() / 4);
    let mut in_tag = false;
    for c in with_breaks.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }

    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_checked_case_insensitively() {
        assert!(validate_upload("resume.pdf", 1024).is_ok());
        assert!(validate_upload("Resume.DOCX", 1024).is_ok());
        assert!(validate_upload("resume.doc", 1024).is_ok());
        assert!(matches!(
            validate_upload("resume.txt", 1024),
            Err(ExtractError::UnsupportedFormat)
        ));
        assert!(matches!(
            validate_upload("noextension", 1024),
            Err(ExtractError::UnsupportedFormat)
        ));
    }

    #[test]
    fn oversize_uploads_are_rejected() {
        assert!(validate_upload("resume.pdf", MAX_FILE_BYTES).is_ok());
        assert!(matches!(
            validate_upload("resume.pdf", MAX_FILE_BYTES + 1),
            Err(ExtractError::TooLarge { max_mb: 5 })
        ));
    }

    fn docx_bytes(body_xml: &str) -> Vec<u8> {
        use std::io::Write;
        let mut buf = Cursor::new(Vec::new());
        let mut archive = zip::ZipWriter::new(&mut buf);
        archive
            .start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        archive.write_all(body_xml.as_bytes()).unwrap();
        archive.finish().unwrap();
        drop(archive);
        buf.into_inner()
    }

    #[test]
    fn extraction_below_the_readable_floor_is_rejected() {
        let short = docx_bytes("<w:p><w:r><w:t>Too short</w:t></w:r></w:p>");
        assert!(matches!(
            extract_text(&short, "cv.docx"),
            Err(ExtractError::Unreadable(_))
        ));

        let body = format!(
            "<w:p><w:r><w:t>{}</w:t></w:r></w:p>",
            "Shipped payment systems in Rust. ".repeat(5)
        );
        let text = extract_text(&docx_bytes(&body), "cv.docx").unwrap();
        assert!(text.contains("Shipped payment systems"));
    }

    #[test]
    fn document_xml_is_reduced_to_text() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Senior Rust Engineer</w:t></w:r></w:p>
            <w:p><w:r><w:t>Built &amp; shipped services</w:t><w:tab/><w:t>2020</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = strip_document_xml(xml);
        assert!(text.contains("Senior Rust Engineer\n"));
        assert!(text.contains("Built & shipped services\t2020"));
        assert!(!text.contains('<'));
    }
}
