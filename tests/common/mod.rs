#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const REL_HEADER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
const REL_FOOTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// One run of plain text.
pub fn run(text: &str) -> String {
    format!(r#"<w:r><w:t xml:space="preserve">{}</w:t></w:r>"#, escape(text))
}

/// One bold run.
pub fn bold_run(text: &str) -> String {
    format!(
        r#"<w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">{}</w:t></w:r>"#,
        escape(text)
    )
}

/// A paragraph with one run per entry.
pub fn p(runs: &[&str]) -> String {
    let body: String = runs.iter().map(|r| run(r)).collect();
    format!("<w:p>{body}</w:p>")
}

/// A one-cell table wrapping `content`.
pub fn table(content: &str) -> String {
    format!("<w:tbl><w:tblPr/><w:tr><w:tc><w:tcPr/>{content}</w:tc></w:tr></w:tbl>")
}

/// Builds a minimal but complete WordprocessingML package in memory.
#[derive(Default)]
pub struct DocxBuilder {
    body: Vec<String>,
    headers: Vec<String>,
    footers: Vec<String>,
}

impl DocxBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw block-level XML appended to the body.
    pub fn block(mut self, xml: &str) -> Self {
        self.body.push(xml.to_string());
        self
    }

    pub fn paragraph(self, runs: &[&str]) -> Self {
        self.block(&p(runs))
    }

    pub fn header(mut self, xml: &str) -> Self {
        self.headers.push(xml.to_string());
        self
    }

    pub fn footer(mut self, xml: &str) -> Self {
        self.footers.push(xml.to_string());
        self
    }

    pub fn document_xml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}"><w:body>{}<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr></w:body></w:document>"#,
            self.body.concat()
        )
    }

    pub fn build(&self) -> Vec<u8> {
        let mut overrides = String::from(
            r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
        );
        let mut rels = String::new();
        let mut parts: Vec<(String, String)> = Vec::new();
        let mut next_id = 1;

        for (kind, root, rel_type, list) in [
            ("header", "hdr", REL_HEADER, &self.headers),
            ("footer", "ftr", REL_FOOTER, &self.footers),
        ] {
            for (i, content) in list.iter().enumerate() {
                let name = format!("{kind}{}.xml", i + 1);
                overrides.push_str(&format!(
                    r#"<Override PartName="/word/{name}" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.{kind}+xml"/>"#
                ));
                rels.push_str(&format!(
                    r#"<Relationship Id="rId{next_id}" Type="{rel_type}" Target="{name}"/>"#
                ));
                next_id += 1;
                parts.push((
                    format!("word/{name}"),
                    format!(
                        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:{root} xmlns:w="{W_NS}" xmlns:r="{R_NS}">{content}</w:{root}>"#
                    ),
                ));
            }
        }

        let content_types = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>{overrides}</Types>"#
        );
        let package_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;
        let document_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        );

        let mut entries = vec![
            ("[Content_Types].xml".to_string(), content_types),
            ("_rels/.rels".to_string(), package_rels.to_string()),
            ("word/document.xml".to_string(), self.document_xml()),
            ("word/_rels/document.xml.rels".to_string(), document_rels),
        ];
        entries.extend(parts);
        zip_entries(&entries)
    }

    /// Write the package to `dir/name` and return its path.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

pub fn zip_entries(entries: &[(String, String)]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, body) in entries {
            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf.into_inner()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Entry names of a package, in archive order.
pub fn entry_names(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let zip = zip::ZipArchive::new(file).unwrap();
    zip.file_names().map(String::from).collect::<Vec<_>>()
}

pub fn read_entry(path: &Path, name: &str) -> Option<Vec<u8>> {
    let file = std::fs::File::open(path).unwrap();
    let mut zip = zip::ZipArchive::new(file).unwrap();
    let mut entry = zip.by_name(name).ok()?;
    let mut data = Vec::new();
    entry.read_to_end(&mut data).unwrap();
    Some(data)
}

pub fn read_text(path: &Path, name: &str) -> Option<String> {
    read_entry(path, name).map(|d| String::from_utf8(d).unwrap())
}

/// Text of each paragraph in a part, counting only `w:t` content.
pub fn paragraph_texts(path: &Path, part: &str) -> Vec<String> {
    let xml = read_text(path, part).unwrap();
    let doc = roxmltree::Document::parse(&xml).unwrap();
    doc.descendants()
        .filter(|n| n.has_tag_name((W_NS, "p")))
        .map(|p| {
            p.descendants()
                .filter(|n| n.has_tag_name((W_NS, "t")))
                .filter_map(|t| t.text())
                .collect()
        })
        .collect()
}

pub fn body_texts(path: &Path) -> Vec<String> {
    paragraph_texts(path, "word/document.xml")
}

/// `(cx, cy)` of every inline drawing in a part.
pub fn drawing_extents(path: &Path, part: &str) -> Vec<(u64, u64)> {
    let xml = read_text(path, part).unwrap();
    let doc = roxmltree::Document::parse(&xml).unwrap();
    doc.descendants()
        .filter(|n| n.tag_name().name() == "extent")
        .map(|n| {
            let v = |a: &str| n.attribute(a).unwrap().parse::<u64>().unwrap();
            (v("cx"), v("cy"))
        })
        .collect()
}

/// `r:embed` ids of every picture in a part.
pub fn embedded_ids(path: &Path, part: &str) -> Vec<String> {
    let xml = read_text(path, part).unwrap();
    let doc = roxmltree::Document::parse(&xml).unwrap();
    doc.descendants()
        .filter(|n| n.tag_name().name() == "blip")
        .filter_map(|n| n.attribute((R_NS, "embed")).map(String::from))
        .collect()
}

/// `(Id, Target)` of image relationships in a rels part.
pub fn image_relationships(path: &Path, rels: &str) -> Vec<(String, String)> {
    let Some(xml) = read_text(path, rels) else {
        return Vec::new();
    };
    let doc = roxmltree::Document::parse(&xml).unwrap();
    doc.descendants()
        .filter(|n| n.tag_name().name() == "Relationship")
        .filter(|n| n.attribute("Type").is_some_and(|t| t.ends_with("/image")))
        .map(|n| {
            (
                n.attribute("Id").unwrap().to_string(),
                n.attribute("Target").unwrap().to_string(),
            )
        })
        .collect()
}
