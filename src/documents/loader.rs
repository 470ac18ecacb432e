//! Turning files on disk into [`TextUnit`]s.
//!
//! Format detection is by extension only and resolves once per file to a
//! [`FileFormat`]. PDF yields one unit per page, TXT and DOCX one unit per
//! file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::json;
use walkdir::WalkDir;

use super::error::DocumentError;
use super::types::{Metadata, TextUnit, keys};

/// File formats the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Pdf,
    Docx,
    Txt,
}

impl FileFormat {
    pub const ALL: [FileFormat; 3] = [FileFormat::Pdf, FileFormat::Docx, FileFormat::Txt];

    /// Extension with the leading dot, as recorded in `file_type`.
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Pdf => ".pdf",
            FileFormat::Docx => ".docx",
            FileFormat::Txt => ".txt",
        }
    }

    /// Match an extension, with or without the leading dot, case-insensitively.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let normalized = extension.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extension()[1..] == normalized)
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Lowercase extension of `path` with the leading dot, or empty.
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Loads PDF, DOCX and TXT files.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Extensions accepted by [`load_document`](Self::load_document).
    pub fn supported_extensions() -> Vec<&'static str> {
        FileFormat::ALL.iter().map(FileFormat::extension).collect()
    }

    /// Load a single file.
    ///
    /// Every unit carries `source` (the path as given) and `file_type`.
    /// PDF units also carry `page` (0-based) and `total_pages`.
    pub fn load_document(&self, path: &Path) -> Result<Vec<TextUnit>, DocumentError> {
        if !path.is_file() {
            return Err(DocumentError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let format =
            FileFormat::from_path(path).ok_or_else(|| DocumentError::UnsupportedFormat {
                path: path.to_path_buf(),
                extension: dotted_extension(path),
            })?;

        let mut base = Metadata::new();
        base.insert(
            keys::SOURCE.to_string(),
            json!(path.to_string_lossy().into_owned()),
        );
        base.insert(keys::FILE_TYPE.to_string(), json!(format.extension()));

        let units = match format {
            FileFormat::Txt => load_txt(path, base)?,
            FileFormat::Pdf => load_pdf(path, base)?,
            FileFormat::Docx => load_docx(path, base)?,
        };

        tracing::debug!(
            target: "loader",
            "loaded {} unit(s) from {}",
            units.len(),
            path.display()
        );
        Ok(units)
    }

    /// Load every supported file under `dir`, recursively.
    ///
    /// Files are visited in file-name order. A file that fails to load is
    /// logged and skipped; files with other extensions are ignored.
    pub fn load_directory(&self, dir: &Path) -> Result<Vec<TextUnit>, DocumentError> {
        if !dir.is_dir() {
            return Err(DocumentError::NotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut units = Vec::new();
        let mut loaded_files = 0usize;
        let mut failed_files = 0usize;

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(target: "loader", "skipping unreadable entry: {e}");
                    continue;
                }
            };

            if !entry.file_type().is_file() || FileFormat::from_path(entry.path()).is_none() {
                continue;
            }

            match self.load_document(entry.path()) {
                Ok(mut file_units) => {
                    loaded_files += 1;
                    units.append(&mut file_units);
                }
                Err(e) => {
                    failed_files += 1;
                    tracing::warn!(
                        target: "loader",
                        "failed to load {}: {e}",
                        entry.path().display()
                    );
                }
            }
        }

        tracing::info!(
            target: "loader",
            "loaded {loaded_files} file(s) from {} ({failed_files} failed, {} unit(s))",
            dir.display(),
            units.len()
        );
        Ok(units)
    }
}

fn load_txt(path: &Path, metadata: Metadata) -> Result<Vec<TextUnit>, DocumentError> {
    let content = std::fs::read_to_string(path).map_err(|e| DocumentError::io(path, e))?;
    Ok(vec![TextUnit::new(content, metadata)])
}

fn load_pdf(path: &Path, metadata: Metadata) -> Result<Vec<TextUnit>, DocumentError> {
    // pdf-extract panics on some malformed files
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path))
        .map_err(|_| DocumentError::pdf(path, "parser panicked on malformed input"))?
        .map_err(|e| DocumentError::pdf(path, e))?;

    if pages.is_empty() {
        return Err(DocumentError::EmptyDocument {
            path: path.to_path_buf(),
        });
    }

    let total_pages = pages.len();
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(page, text)| {
            let mut page_metadata = metadata.clone();
            page_metadata.insert(keys::PAGE.to_string(), json!(page));
            page_metadata.insert(keys::TOTAL_PAGES.to_string(), json!(total_pages));
            TextUnit::new(text, page_metadata)
        })
        .collect())
}

fn load_docx(path: &Path, metadata: Metadata) -> Result<Vec<TextUnit>, DocumentError> {
    let file = File::open(path).map_err(|e| DocumentError::io(path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| DocumentError::docx(path, e))?;

    let mut xml = Vec::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| DocumentError::docx(path, format!("word/document.xml: {e}")))?
        .read_to_end(&mut xml)
        .map_err(|e| DocumentError::io(path, e))?;

    let text = extract_docx_text(&xml).map_err(|e| DocumentError::docx(path, e))?;
    Ok(vec![TextUnit::new(text, metadata)])
}

/// Plain text of a WordprocessingML body.
///
/// Text runs (`w:t`) are concatenated, each paragraph ends with a newline,
/// `w:tab` becomes a tab and `w:br`/`w:cr` become newlines.
pub fn extract_docx_text(xml: &[u8]) -> Result<String, String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut in_run = false;
    let mut in_text_run = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" => in_text_run = true,
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"r" => in_run = false,
                b"t" => in_text_run = false,
                b"p" => text.push('\n'),
                _ => {}
            },
            // Tab stops in paragraph properties are also `w:tab`, only runs count
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" if in_run => text.push('\t'),
                b"br" | b"cr" if in_run => text.push('\n'),
                b"p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_run {
                    let run = e.unescape().map_err(|e| e.to_string())?;
                    text.push_str(&run);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            FileFormat::from_path(Path::new("a/Report.PDF")),
            Some(FileFormat::Pdf)
        );
        assert_eq!(FileFormat::from_extension(".docx"), Some(FileFormat::Docx));
        assert_eq!(FileFormat::from_extension("txt"), Some(FileFormat::Txt));
        assert_eq!(FileFormat::from_path(Path::new("notes.md")), None);
        assert_eq!(FileFormat::from_path(Path::new("no_extension")), None);
        assert_eq!(
            DocumentLoader::supported_extensions(),
            vec![".pdf", ".docx", ".txt"]
        );
    }

    #[test]
    fn test_load_txt_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Notes.TXT");
        fs::write(&path, "plain text body").unwrap();

        let units = DocumentLoader::new().load_document(&path).unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].content, "plain text body");
        assert_eq!(units[0].source(), Some(path.to_string_lossy().as_ref()));
        assert_eq!(units[0].metadata[keys::FILE_TYPE], ".txt");
        assert!(!units[0].metadata.contains_key(keys::PAGE));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = DocumentLoader::new()
            .load_document(Path::new("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(matches!(err, DocumentError::NotFound { .. }));
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("readme.md");
        fs::write(&path, "# hi").unwrap();

        let err = DocumentLoader::new().load_document(&path).unwrap_err();
        match err {
            DocumentError::UnsupportedFormat { extension, .. } => assert_eq!(extension, ".md"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_utf8_txt_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.txt");
        fs::write(&path, [0xff, 0xfe, 0x00, 0xc3]).unwrap();

        let err = DocumentLoader::new().load_document(&path).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[test]
    fn test_corrupt_pdf_is_pdf_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.pdf");
        fs::write(&path, b"this is not a pdf").unwrap();

        let err = DocumentLoader::new().load_document(&path).unwrap_err();
        assert!(matches!(err, DocumentError::Pdf { .. }));
    }

    #[test]
    fn test_corrupt_docx_is_docx_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.docx");
        fs::write(&path, b"not a zip archive").unwrap();

        let err = DocumentLoader::new().load_document(&path).unwrap_err();
        assert!(matches!(err, DocumentError::Docx { .. }));
    }

    #[test]
    fn test_extract_docx_text() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>First</w:t></w:r><w:r><w:t xml:space="preserve"> paragraph &amp; more</w:t></w:r></w:p>
    <w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>Name</w:t><w:tab/><w:t>Value</w:t><w:br/><w:t>Next line</w:t></w:r></w:p>
    <w:p/>
    <w:p><w:r><w:instrText>IGNORED</w:instrText><w:t>Last</w:t></w:r></w:p>
  </w:body>
</w:document>"#;

        let text = extract_docx_text(xml).unwrap();
        assert_eq!(
            text,
            "First paragraph & more\nName\tValue\nNext line\n\nLast\n"
        );
    }

    #[test]
    fn test_load_directory_skips_failures() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(temp_dir.path().join("b.txt"), "bravo").unwrap();
        fs::write(nested.join("a.txt"), "alpha").unwrap();
        fs::write(temp_dir.path().join("broken.pdf"), "garbage").unwrap();
        fs::write(temp_dir.path().join("ignored.md"), "markdown").unwrap();

        let units = DocumentLoader::new()
            .load_directory(temp_dir.path())
            .unwrap();
        let contents: Vec<_> = units.iter().map(|u| u.content.as_str()).collect();

        assert_eq!(contents.len(), 2);
        assert!(contents.contains(&"alpha"));
        assert!(contents.contains(&"bravo"));
    }

    #[test]
    fn test_load_directory_missing_and_empty() {
        let loader = DocumentLoader::new();
        assert!(matches!(
            loader.load_directory(Path::new("/no/such/dir")),
            Err(DocumentError::NotFound { .. })
        ));

        let temp_dir = TempDir::new().unwrap();
        assert!(loader.load_directory(temp_dir.path()).unwrap().is_empty());
    }
}
