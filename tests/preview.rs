mod common;

use common::DocxBuilder;
use docxide_fill::{ReplacementMap, ScanOptions, preview_path};

#[test]
fn preview_lists_mapped_placeholders_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let a = DocxBuilder::new()
        .paragraph(&["{{Client}} owes {{Amount}}"])
        .write(dir.path(), "a.docx");
    let b = DocxBuilder::new()
        .paragraph(&["{{Other}}"])
        .write(dir.path(), "b.docx");
    let c = DocxBuilder::new()
        .paragraph(&["{{client}}"])
        .write(dir.path(), "c.docx");
    let before: Vec<Vec<u8>> = [&a, &b, &c]
        .iter()
        .map(|p| std::fs::read(p).unwrap())
        .collect();

    let map: ReplacementMap = [("CLIENT", "Ann"), ("Missing", "x")].into_iter().collect();
    let preview = preview_path(dir.path(), &map, &ScanOptions::default()).unwrap();

    assert_eq!(preview.files_to_process, vec![a.clone(), c.clone()]);
    assert_eq!(preview.placeholders_to_replace.len(), 1);
    let client = &preview.placeholders_to_replace[0];
    assert_eq!(client.name, "Client");
    assert_eq!(client.total_occurrences, 2);

    let after: Vec<Vec<u8>> = [&a, &b, &c]
        .iter()
        .map(|p| std::fs::read(p).unwrap())
        .collect();
    assert_eq!(before, after);
}

#[test]
fn preview_rejects_an_empty_map() {
    let dir = tempfile::tempdir().unwrap();
    assert!(preview_path(dir.path(), &ReplacementMap::new(), &ScanOptions::default()).is_err());
}
