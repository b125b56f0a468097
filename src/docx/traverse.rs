use super::xml::XmlElement;
use super::{DocxPackage, PartKind, WML_NS};

/// Where a paragraph lives: its part and the child-index path from the
/// part's root element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ParagraphLocation {
    pub(crate) part: usize,
    pub(crate) kind: PartKind,
    pub(crate) path: Vec<usize>,
    /// Number of enclosing `w:tbl` elements.
    pub(crate) table_depth: usize,
}

/// Every paragraph of the package: body first, then headers, then footers,
/// each in document order. Paragraphs nested in tables (at any depth) and
/// block-level content controls are included; text boxes inside runs are not.
pub(crate) fn paragraphs(package: &DocxPackage) -> Vec<ParagraphLocation> {
    let mut out = Vec::new();
    for (index, part) in package.parts.iter().enumerate() {
        collect_part(index, part.kind, &part.root, &mut out);
    }
    out
}

fn collect_part(part: usize, kind: PartKind, root: &XmlElement, out: &mut Vec<ParagraphLocation>) {
    // Explicit stack so deeply nested tables cannot overflow the call stack
    let mut stack: Vec<(Vec<usize>, usize)> = vec![(Vec::new(), 0)];
    while let Some((path, table_depth)) = stack.pop() {
        let Some(element) = root.at_path(&path) else {
            continue;
        };
        if element.is(WML_NS, "p") {
            out.push(ParagraphLocation {
                part,
                kind,
                path,
                table_depth,
            });
            continue;
        }
        if !descends(element) {
            continue;
        }
        let depth = table_depth + usize::from(element.is(WML_NS, "tbl"));
        for (i, child) in element.children.iter().enumerate().rev() {
            if matches!(child, super::xml::XmlNode::Element(_)) {
                let mut child_path = path.clone();
                child_path.push(i);
                stack.push((child_path, depth));
            }
        }
    }
}

/// Containers that can hold paragraphs. Property blocks, deleted content and
/// foreign markup never do.
fn descends(element: &XmlElement) -> bool {
    if element.namespace.as_deref() != Some(WML_NS) {
        return false;
    }
    !matches!(
        element.name.as_str(),
        "pPr" | "rPr" | "tblPr" | "tblGrid" | "trPr" | "tcPr" | "sectPr" | "sdtPr" | "sdtEndPr"
            | "del" | "moveFrom"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml;

    fn locate(src: &str) -> Vec<(Vec<usize>, usize)> {
        let root = xml::parse(src).unwrap();
        let mut out = Vec::new();
        collect_part(0, PartKind::Body, &root, &mut out);
        out.into_iter().map(|l| (l.path, l.table_depth)).collect()
    }

    #[test]
    fn visits_nested_tables_in_document_order() {
        let src = r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>
<w:p/>
<w:tbl><w:tr><w:tc><w:p/><w:tbl><w:tr><w:tc><w:p/></w:tc></w:tr></w:tbl></w:tc></w:tr></w:tbl>
<w:sdt><w:sdtContent><w:p/></w:sdtContent></w:sdt>
<w:p/>
<w:sectPr/>
</w:body></w:document>"#;
        let found = locate(src);
        let depths: Vec<usize> = found.iter().map(|(_, d)| *d).collect();
        assert_eq!(depths, vec![0, 1, 2, 0, 0]);
        // body is child 0 of the document; whitespace text nodes sit between blocks
        assert_eq!(found[0].0, vec![0, 1]);
        assert_eq!(found[4].0, vec![0, 7]);
    }

    #[test]
    fn paragraph_count_matches_deep_nesting() {
        let mut src = String::from(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
        );
        for _ in 0..200 {
            src.push_str("<w:tbl><w:tr><w:tc><w:p/>");
        }
        for _ in 0..200 {
            src.push_str("</w:tc></w:tr></w:tbl>");
        }
        src.push_str("</w:body></w:document>");
        let found = locate(&src);
        assert_eq!(found.len(), 200);
        assert_eq!(found.last().map(|(_, d)| *d), Some(200));
    }
}
