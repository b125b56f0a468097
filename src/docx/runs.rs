use crate::text::{Insert, RunSequence, RunText};

use super::WML_NS;
use super::xml::{XML_NS, XmlAttribute, XmlElement, XmlNode};

/// Inline wrappers whose runs belong to the paragraph's text.
fn is_inline_wrapper(element: &XmlElement) -> bool {
    element.namespace.as_deref() == Some(WML_NS)
        && matches!(
            element.name.as_str(),
            "hyperlink" | "ins" | "smartTag" | "customXml" | "sdt" | "sdtContent" | "fldSimple"
                | "dir" | "bdo" | "moveTo"
        )
}

/// Child-index paths (relative to the paragraph) of every run, in order.
pub(crate) fn run_paths(paragraph: &XmlElement) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    collect(paragraph, &mut Vec::new(), &mut out);
    out
}

fn collect(container: &XmlElement, prefix: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
    for (i, child) in container.children.iter().enumerate() {
        let XmlNode::Element(el) = child else {
            continue;
        };
        prefix.push(i);
        if el.is(WML_NS, "r") {
            out.push(prefix.clone());
        } else if is_inline_wrapper(el) {
            collect(el, prefix, out);
        }
        prefix.pop();
    }
}

/// Text carried by a run's `w:t` children.
pub(crate) fn run_text(run: &XmlElement) -> String {
    run.elements()
        .filter(|e| e.is(WML_NS, "t"))
        .map(XmlElement::text)
        .collect()
}

/// Plain text of each run, for read-only scanning.
pub(crate) fn run_texts(paragraph: &XmlElement) -> Vec<String> {
    run_paths(paragraph)
        .iter()
        .filter_map(|p| paragraph.at_path(p))
        .map(run_text)
        .collect()
}

/// A run whose text shares it with other content (breaks, tabs, field chars).
fn is_mixed(run: &XmlElement) -> bool {
    let content = run.elements().filter(|e| !e.is(WML_NS, "rPr"));
    let (mut count, mut has_text) = (0, false);
    for el in content {
        count += 1;
        has_text |= el.is(WML_NS, "t");
    }
    has_text && count > 1
}

/// One run per content element, each carrying a copy of the run properties.
fn split_run(run: XmlElement) -> Vec<XmlElement> {
    let rpr = run.child(WML_NS, "rPr").cloned();
    let shell = XmlElement {
        attributes: run.attributes.clone(),
        children: rpr.into_iter().map(XmlNode::Element).collect(),
        ..XmlElement::new(run.prefix.as_deref(), &run.name, run.namespace.as_deref())
    };
    let mut pieces: Vec<XmlElement> = Vec::new();
    let mut pending = Vec::new();
    for child in run.children {
        match child {
            XmlNode::Element(el) if el.is(WML_NS, "rPr") => {}
            XmlNode::Element(el) => {
                let mut piece = shell.clone();
                piece.children.append(&mut pending);
                piece.children.push(XmlNode::Element(el));
                pieces.push(piece);
            }
            XmlNode::Text(t) if t.trim().is_empty() => {}
            other => pending.push(other),
        }
    }
    if let Some(last) = pieces.last_mut() {
        last.children.append(&mut pending);
    }
    pieces
}

/// Split every mixed run in `container` and its inline wrappers, so text
/// edits never move the content around them.
fn split_mixed_runs(container: &mut XmlElement) {
    for child in std::mem::take(&mut container.children) {
        match child {
            XmlNode::Element(run) if run.is(WML_NS, "r") && is_mixed(&run) => {
                container
                    .children
                    .extend(split_run(run).into_iter().map(XmlNode::Element));
            }
            XmlNode::Element(mut wrapper) if is_inline_wrapper(&wrapper) => {
                split_mixed_runs(&mut wrapper);
                container.children.push(XmlNode::Element(wrapper));
            }
            other => container.children.push(other),
        }
    }
}

/// Editable view of one paragraph's runs. Runs that mix text with other
/// content are split up front; the paragraph's text is unchanged by that.
pub(crate) struct ParagraphRuns<'a> {
    paragraph: &'a mut XmlElement,
    paths: Vec<Vec<usize>>,
    prefix: Option<String>,
    modified: bool,
}

impl<'a> ParagraphRuns<'a> {
    pub(crate) fn new(paragraph: &'a mut XmlElement, wml_prefix: Option<&str>) -> Self {
        split_mixed_runs(paragraph);
        let paths = run_paths(paragraph);
        Self {
            paragraph,
            paths,
            prefix: wml_prefix.map(String::from),
            modified: false,
        }
    }

    pub(crate) fn is_modified(&self) -> bool {
        self.modified
    }

    /// Element in the WordprocessingML namespace with the part's prefix.
    pub(crate) fn wml_element(&self, name: &str) -> XmlElement {
        XmlElement::new(self.prefix.as_deref(), name, Some(WML_NS))
    }

    fn run(&self, index: usize) -> Option<&XmlElement> {
        self.paragraph.at_path(self.paths.get(index)?)
    }

    fn run_mut(&mut self, index: usize) -> Option<&mut XmlElement> {
        let path = self.paths.get(index)?;
        self.paragraph.at_path_mut(path)
    }

    fn text_element(&self, text: &str) -> XmlElement {
        let mut t = self.wml_element("t");
        if !text.is_empty() {
            t.set_attribute(XmlAttribute::prefixed("xml", "space", XML_NS, "preserve"));
            t.children.push(XmlNode::Text(text.to_string()));
        }
        t
    }

    /// New run formatted like the run at `index`.
    fn styled_run(&self, index: usize, content: XmlElement) -> XmlElement {
        let mut run = self.wml_element("r");
        if let Some(rpr) = self.run(index).and_then(|r| r.child(WML_NS, "rPr")) {
            run.children.push(XmlNode::Element(rpr.clone()));
        }
        run.children.push(XmlNode::Element(content));
        run
    }

    /// Shift the paths of runs that follow `path` in the same container.
    fn shift_siblings(&mut self, path: &[usize], delta: isize) {
        let depth = path.len() - 1;
        let (container, at) = (&path[..depth], path[depth]);
        for p in &mut self.paths {
            if p.len() > depth && p[..depth] == *container && p[depth] > at {
                p[depth] = p[depth].saturating_add_signed(delta);
            }
        }
    }
}

impl RunText for ParagraphRuns<'_> {
    fn run_count(&self) -> usize {
        self.paths.len()
    }

    fn run_text(&self, index: usize) -> String {
        self.run(index).map(run_text).unwrap_or_default()
    }
}

impl RunSequence for ParagraphRuns<'_> {
    type Drawing = XmlElement;

    /// Put `text` in the run's first `w:t` and drop the others.
    fn set_run_text(&mut self, index: usize, text: &str) {
        let replacement = self.text_element(text);
        let Some(run) = self.run_mut(index) else {
            return;
        };
        let mut placed = false;
        run.children.retain_mut(|child| {
            let XmlNode::Element(el) = child else {
                return true;
            };
            if !el.is(WML_NS, "t") {
                return true;
            }
            if placed || text.is_empty() {
                return false;
            }
            let preserved = el.prefix.clone();
            *el = replacement.clone();
            el.prefix = preserved;
            placed = true;
            true
        });
        if !placed && !text.is_empty() {
            run.children.push(XmlNode::Element(replacement));
        }
        self.modified = true;
    }

    fn insert_after(&mut self, index: usize, insert: Insert<XmlElement>) {
        let content = match insert {
            Insert::Text(t) => self.text_element(&t),
            Insert::Drawing(d) => d,
        };
        let new_run = self.styled_run(index, content);
        let Some(path) = self.paths.get(index).cloned() else {
            return;
        };
        let depth = path.len() - 1;
        let Some(container) = self.paragraph.at_path_mut(&path[..depth]) else {
            return;
        };
        container
            .children
            .insert(path[depth] + 1, XmlNode::Element(new_run));
        self.shift_siblings(&path, 1);
        let mut new_path = path;
        new_path[depth] += 1;
        self.paths.insert(index + 1, new_path);
        self.modified = true;
    }

    fn is_blank(&self, index: usize) -> bool {
        let Some(run) = self.run(index) else {
            return true;
        };
        run.children.iter().all(|child| match child {
            XmlNode::Element(el) => {
                el.is(WML_NS, "rPr") || (el.is(WML_NS, "t") && el.text().is_empty())
            }
            XmlNode::Text(t) => t.trim().is_empty(),
            XmlNode::Comment(_) => true,
        })
    }

    fn remove_run(&mut self, index: usize) {
        if index >= self.paths.len() {
            return;
        }
        let path = self.paths.remove(index);
        let depth = path.len() - 1;
        if let Some(container) = self.paragraph.at_path_mut(&path[..depth]) {
            container.children.remove(path[depth]);
        }
        self.shift_siblings(&path, -1);
        self.modified = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::xml;
    use crate::rewrite::{apply_all, apply_span};
    use crate::text::LogicalParagraphText;

    fn paragraph(body: &str) -> XmlElement {
        xml::parse(&format!(
            r#"<w:p xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">{body}</w:p>"#
        ))
        .unwrap()
    }

    #[test]
    fn runs_inside_hyperlinks_are_part_of_the_text() {
        let p = paragraph(
            r#"<w:r><w:t>a</w:t></w:r><w:hyperlink><w:r><w:t>b</w:t></w:r></w:hyperlink><w:del><w:r><w:delText>x</w:delText></w:r></w:del><w:r><w:t>c</w:t></w:r>"#,
        );
        assert_eq!(run_texts(&p), vec!["a", "b", "c"]);
    }

    #[test]
    fn split_across_wrapper_keeps_formatting() {
        let mut p = paragraph(
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t>{{NA</w:t></w:r><w:hyperlink><w:r><w:t>ME}} tail</w:t></w:r></w:hyperlink>"#,
        );
        let mut runs = ParagraphRuns::new(&mut p, Some("w"));
        let layout = LogicalParagraphText::from_runs(&runs);
        apply_span(&mut runs, &layout, 0..8, Insert::Text("Bob".into())).unwrap();
        assert!(runs.is_modified());
        assert_eq!(run_texts(&p), vec!["Bob", " tail"]);
        let first = p.child_element(0).unwrap();
        assert!(first.child(WML_NS, "rPr").is_some());
    }

    #[test]
    fn non_text_content_survives_rewrite() {
        let mut p = paragraph(r#"<w:r><w:tab/><w:t>{{X}}</w:t></w:r>"#);
        let mut runs = ParagraphRuns::new(&mut p, Some("w"));
        let layout = LogicalParagraphText::from_runs(&runs);
        apply_span(&mut runs, &layout, 0..5, Insert::Text("y".into())).unwrap();
        let first = p.child_element(0).unwrap();
        assert!(first.child(WML_NS, "tab").is_some());
        assert_eq!(run_texts(&p), vec!["", "y"]);
    }

    /// Run content in document order: text, or `<name>` for other elements.
    fn content(p: &XmlElement) -> Vec<String> {
        run_paths(p)
            .iter()
            .filter_map(|path| p.at_path(path))
            .flat_map(|run| run.elements())
            .filter(|e| !e.is(WML_NS, "rPr"))
            .map(|e| {
                if e.is(WML_NS, "t") {
                    e.text()
                } else {
                    format!("<{}>", e.name)
                }
            })
            .collect()
    }

    #[test]
    fn break_after_placeholder_stays_after_the_value() {
        let mut p = paragraph(r#"<w:r><w:t>{{A}}</w:t><w:br/><w:t>line2</w:t></w:r>"#);
        let mut runs = ParagraphRuns::new(&mut p, Some("w"));
        let layout = LogicalParagraphText::from_runs(&runs);
        assert_eq!(layout.text, "{{A}}line2");
        apply_span(&mut runs, &layout, 0..5, Insert::Text("X".into())).unwrap();
        assert_eq!(content(&p), vec!["X", "<br>", "line2"]);
    }

    #[test]
    fn tab_between_placeholders_keeps_its_place() {
        let mut p = paragraph(
            r#"<w:r><w:rPr><w:i/></w:rPr><w:t>{{A}}</w:t><w:tab/><w:t>{{B}}</w:t></w:r>"#,
        );
        let mut runs = ParagraphRuns::new(&mut p, Some("w"));
        let layout = LogicalParagraphText::from_runs(&runs);
        let results = apply_all(
            &mut runs,
            &layout,
            vec![
                (0..5, Insert::Text("1".into())),
                (5..10, Insert::Text("2".into())),
            ],
        );
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(content(&p), vec!["1", "<tab>", "2"]);
        // every piece keeps the original formatting
        let runs: Vec<&XmlElement> = p.elements().collect();
        assert_eq!(runs.len(), 3);
        assert!(runs.iter().all(|r| r.child(WML_NS, "rPr").is_some()));
    }

    #[test]
    fn splitting_alone_is_not_a_modification() {
        let mut p = paragraph(r#"<w:r><w:t>a</w:t><w:br/><w:t>b</w:t></w:r>"#);
        let runs = ParagraphRuns::new(&mut p, Some("w"));
        assert!(!runs.is_modified());
        assert_eq!(runs.run_count(), 3);
        assert_eq!(content(&p), vec!["a", "<br>", "b"]);
    }
}
