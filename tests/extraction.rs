//! Integration tests for PDF text extraction.
//!
//! Builds a minimal-but-valid PDF in memory (body first, then an xref table
//! with correct byte offsets) so `pdf-extract` can parse it without any
//! fixture files on disk.

use archdiagram::extract::{extract_pdf_bytes, extract_pdf_file, ExtractError};

/// Minimal valid single-page PDF containing one text-draw operation.
fn minimal_pdf() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 46 >> stream\nBT /F1 12 Tf 100 700 Td (archdiagram test) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o1).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o2).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o3).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o4).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o5).as_bytes());
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

#[test]
fn minimal_pdf_parses_as_single_page() {
    let content = extract_pdf_bytes(&minimal_pdf()).unwrap();
    assert_eq!(content.num_pages, 1);
    assert_eq!(content.method, "pdf-extract");
    assert!(content.text.contains("--- Page 1 ---"));
}

#[test]
fn corrupt_pdf_is_an_error_not_a_panic() {
    let err = extract_pdf_bytes(b"this is not a pdf at all").unwrap_err();
    assert!(matches!(err, ExtractError::Pdf(_)));
}

#[test]
fn pdf_file_roundtrip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, minimal_pdf()).unwrap();

    let content = extract_pdf_file(&path).unwrap();
    assert_eq!(content.num_pages, 1);
}

#[test]
fn wrong_extension_rejected_before_parsing() {
    let dir = tempfile::tempdir().unwrap();
    // Valid PDF bytes under the wrong name are still rejected; the HTTP
    // layer promises extension-based validation up front.
    let path = dir.path().join("doc.txt");
    std::fs::write(&path, minimal_pdf()).unwrap();

    let err = extract_pdf_file(&path).unwrap_err();
    assert!(matches!(err, ExtractError::NotAPdf(_)));
}
