use std::io::Write;
use std::path::Path;

use tempfile::TempDir;

use docrag::documents::{
    Chunker, ChunkingConfig, DocumentError, DocumentLoader, RecursiveChunker, keys,
};

fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    for (name, content) in entries {
        zip.start_file(*name, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

/// Minimal PDF with one Helvetica text line per page.
fn write_pdf(path: &Path, pages: &[&str]) {
    let font_id = 3 + 2 * pages.len();
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..pages.len())
                .map(|i| format!("{} 0 R", 3 + 2 * i))
                .collect::<Vec<_>>()
                .join(" "),
            pages.len()
        ),
    ];
    for (i, text) in pages.iter().enumerate() {
        let stream = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 {font_id} 0 R >> >> /Contents {} 0 R >>",
            4 + 2 * i
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }
    objects.push(
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    );

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, object) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{object}\nendobj\n", i + 1));
    }
    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    ));

    std::fs::write(path, pdf).unwrap();
}

const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Travel policy</w:t></w:r></w:p>
    <w:p><w:r><w:t>Book economy for flights under six hours.</w:t></w:r></w:p>
    <w:sectPr/>
  </w:body>
</w:document>"#;

#[test]
fn test_docx_single_unit_with_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("Travel.DOCX");
    write_zip(
        &path,
        &[
            ("[Content_Types].xml", "<Types/>"),
            ("word/document.xml", DOCUMENT_XML),
        ],
    );

    let units = DocumentLoader::new().load_document(&path).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(
        units[0].content,
        "Travel policy\nBook economy for flights under six hours.\n"
    );
    assert_eq!(units[0].metadata[keys::FILE_TYPE], ".docx");
    assert_eq!(
        units[0].source(),
        Some(path.to_string_lossy().as_ref())
    );
}

#[test]
fn test_pdf_unit_per_page_with_page_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("report.pdf");
    write_pdf(&path, &["Page one text", "Page two text", "Page three text"]);

    let units = DocumentLoader::new().load_document(&path).unwrap();
    assert_eq!(units.len(), 3);
    for (i, (unit, expected)) in units
        .iter()
        .zip(["Page one text", "Page two text", "Page three text"])
        .enumerate()
    {
        assert!(
            unit.content.contains(expected),
            "page {i} content was {:?}",
            unit.content
        );
        assert_eq!(unit.metadata[keys::PAGE], i);
        assert_eq!(unit.metadata[keys::TOTAL_PAGES], 3);
        assert_eq!(unit.metadata[keys::FILE_TYPE], ".pdf");
        assert_eq!(unit.source(), Some(path.to_string_lossy().as_ref()));
    }
}

#[test]
fn test_docx_without_body_part_is_docx_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("empty.docx");
    write_zip(&path, &[("[Content_Types].xml", "<Types/>")]);

    let err = DocumentLoader::new().load_document(&path).unwrap_err();
    assert!(matches!(err, DocumentError::Docx { .. }));
}

#[test]
fn test_loaded_units_chunk_with_inherited_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("long.txt");
    let paragraph = "Sentence about storage engines and their tradeoffs. ".repeat(10);
    std::fs::write(&path, vec![paragraph; 4].join("\n\n")).unwrap();

    let units = DocumentLoader::new().load_document(&path).unwrap();
    let chunker = RecursiveChunker::new(ChunkingConfig::new(300, 50)).unwrap();
    let chunks = chunker.chunk_units(&units);

    assert!(chunks.len() > 4);
    for (i, chunk) in chunks.iter().enumerate() {
        assert!(chunk.char_count() <= 300);
        assert_eq!(chunk.chunk_id(), Some(i as u64));
        assert_eq!(chunk.source(), Some(path.to_string_lossy().as_ref()));
        assert_eq!(chunk.metadata[keys::FILE_TYPE], ".txt");
    }
}
