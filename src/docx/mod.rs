pub(crate) mod image;
pub(crate) mod runs;
pub(crate) mod traverse;
pub(crate) mod xml;

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use xml::{XmlAttribute, XmlElement, XmlNode};

pub(crate) const WML_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub(crate) const DML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub(crate) const WPD_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
pub(crate) const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
pub(crate) const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

const CONTENT_TYPES: &str = "[Content_Types].xml";
const DEFAULT_MAIN_PART: &str = "word/document.xml";

/// Which kind of part owns a paragraph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PartKind {
    Body,
    Header,
    Footer,
}

pub(crate) struct Part {
    pub(crate) name: String,
    pub(crate) kind: PartKind,
    pub(crate) root: XmlElement,
    pub(crate) wml_prefix: Option<String>,
    pub(crate) dirty: bool,
}

struct Relationship {
    id: String,
    rel_type: String,
    target: String,
}

/// An opened DOCX package: raw entries in archive order plus parsed
/// body/header/footer parts.
pub(crate) struct DocxPackage {
    entries: Vec<(String, Vec<u8>)>,
    pub(crate) parts: Vec<Part>,
    rels: HashMap<String, XmlElement>,
    dirty_entries: HashSet<String>,
    content_types: XmlElement,
    next_drawing_id: u32,
    image_rels: HashMap<(usize, String), String>,
}

impl DocxPackage {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
            _ => Error::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", e, path.display()),
            )),
        })?;
        Self::from_reader(file)
    }

    pub(crate) fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut zip = zip::ZipArchive::new(reader)
            .map_err(|_| Error::MalformedDocument("file is not a ZIP archive".into()))?;

        let mut entries = Vec::with_capacity(zip.len());
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let name = entry.name().to_string();
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| Error::MalformedDocument(format!("{name}: {e}")))?;
            entries.push((name, data));
        }

        let content_types = entries
            .iter()
            .find(|(n, _)| n == CONTENT_TYPES)
            .map(|(_, d)| parse_entry(CONTENT_TYPES, d))
            .ok_or_else(|| Error::MalformedDocument("missing [Content_Types].xml".into()))??;

        let mut package = DocxPackage {
            entries,
            parts: Vec::new(),
            rels: HashMap::new(),
            dirty_entries: HashSet::new(),
            content_types,
            next_drawing_id: 1,
            image_rels: HashMap::new(),
        };

        let main = package.main_part_name();
        let main_root = package
            .entry_text(&main)
            .ok_or_else(|| {
                Error::MalformedDocument(format!("missing {main} (is this a DOCX file?)"))
            })
            .and_then(|text| parse_text(&main, &text))?;
        if !main_root.is(WML_NS, "document") {
            return Err(Error::MalformedDocument(format!("{main} is not a w:document")));
        }
        package.parts.push(Part::new(main.clone(), PartKind::Body, main_root));

        let related = package.relationships(&main);
        for kind in [PartKind::Header, PartKind::Footer] {
            let suffix = match kind {
                PartKind::Header => "/header",
                _ => "/footer",
            };
            for rel in related.iter().filter(|r| r.rel_type.ends_with(suffix)) {
                let name = resolve_target(&main, &rel.target);
                let Some(text) = package.entry_text(&name) else {
                    log::warn!("{} relationship {} points at missing part {name}", main, rel.id);
                    continue;
                };
                let root = parse_text(&name, &text)?;
                log::debug!("Found {:?} part {name}", kind);
                package.parts.push(Part::new(name, kind, root));
            }
        }

        package.next_drawing_id = package
            .parts
            .iter()
            .flat_map(|p| p.root.descendants())
            .filter(|e| e.is(WPD_NS, "docPr"))
            .filter_map(|e| e.attribute("id").and_then(|v| v.parse::<u32>().ok()))
            .max()
            .map_or(1, |m| m + 1);

        Ok(package)
    }

    fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    fn entry_text(&self, name: &str) -> Option<String> {
        self.entry(name)
            .map(|d| String::from_utf8_lossy(d).into_owned())
    }

    fn main_part_name(&self) -> String {
        let Some(text) = self.entry_text("_rels/.rels") else {
            return DEFAULT_MAIN_PART.to_string();
        };
        parse_rels_xml(&text)
            .into_iter()
            .find(|r| r.rel_type == OFFICE_DOCUMENT_REL)
            .map(|r| resolve_target("", &r.target))
            .unwrap_or_else(|| DEFAULT_MAIN_PART.to_string())
    }

    /// Relationships of a part like "word/header1.xml", read from
    /// "word/_rels/header1.xml.rels".
    fn relationships(&self, part_name: &str) -> Vec<Relationship> {
        let Some(text) = self.entry_text(&rels_path(part_name)) else {
            return Vec::new();
        };
        parse_rels_xml(&text)
    }

    pub(crate) fn next_drawing_id(&mut self) -> u32 {
        let id = self.next_drawing_id;
        self.next_drawing_id += 1;
        id
    }

    /// Relationship ID already registered on `part` for this image source.
    pub(crate) fn cached_image_rel(&self, part: usize, source: &str) -> Option<&str> {
        self.image_rels
            .get(&(part, source.to_string()))
            .map(String::as_str)
    }

    /// Store image bytes as a new media entry next to `part` and register an
    /// image relationship on that same part. Returns the relationship ID.
    pub(crate) fn add_image(
        &mut self,
        part: usize,
        source: &str,
        data: Vec<u8>,
        extension: &str,
        content_type: &str,
    ) -> Result<String> {
        let part_name = self
            .parts
            .get(part)
            .map(|p| p.name.clone())
            .ok_or_else(|| Error::RewriteInconsistency(format!("no part #{part}")))?;
        let dir = part_name.rsplit_once('/').map_or("", |(d, _)| d);

        let media_name = (1..)
            .map(|n| join_path(dir, &format!("media/image{n}.{extension}")))
            .find(|name| self.entry(name).is_none())
            .unwrap_or_default();
        let target = media_name
            .strip_prefix(&format!("{dir}/"))
            .unwrap_or(&media_name)
            .to_string();

        self.ensure_default_content_type(extension, content_type);

        let rels_name = rels_path(&part_name);
        if !self.rels.contains_key(&rels_name) {
            let tree = match self.entry(&rels_name) {
                Some(data) => parse_entry(&rels_name, data)?,
                None => XmlElement::new(None, "Relationships", Some(PKG_REL_NS))
                    .with_attr(XmlAttribute::plain("xmlns", PKG_REL_NS)),
            };
            self.rels.insert(rels_name.clone(), tree);
        }
        let Some(rels) = self.rels.get_mut(&rels_name) else {
            return Err(Error::RewriteInconsistency(format!("{rels_name} not loaded")));
        };

        let next = rels
            .elements()
            .filter_map(|r| r.attribute("Id"))
            .filter_map(|id| id.strip_prefix("rId")?.parse::<u32>().ok())
            .max()
            .map_or(1, |m| m + 1);
        let id = format!("rId{next}");
        let prefix = rels.prefix.clone();
        rels.children.push(XmlNode::Element(
            XmlElement::new(prefix.as_deref(), "Relationship", Some(PKG_REL_NS))
                .with_attr(XmlAttribute::plain("Id", id.clone()))
                .with_attr(XmlAttribute::plain("Type", IMAGE_REL))
                .with_attr(XmlAttribute::plain("Target", target)),
        ));
        self.dirty_entries.insert(rels_name);

        log::debug!("Registered {media_name} as {id} on {part_name}");
        self.entries.push((media_name, data));
        self.image_rels.insert((part, source.to_string()), id.clone());
        Ok(id)
    }

    /// Undo `add_image` for an image whose drawing never made it into `part`.
    pub(crate) fn discard_image(&mut self, part: usize, source: &str) {
        let Some(id) = self.image_rels.remove(&(part, source.to_string())) else {
            return;
        };
        let Some(part_name) = self.parts.get(part).map(|p| p.name.clone()) else {
            return;
        };
        let rels_name = rels_path(&part_name);
        let Some(rels) = self.rels.get_mut(&rels_name) else {
            return;
        };
        let mut target = None;
        rels.children.retain(|child| match child {
            XmlNode::Element(e) if e.attribute("Id") == Some(id.as_str()) => {
                target = e.attribute("Target").map(String::from);
                false
            }
            _ => true,
        });
        let emptied = rels.elements().next().is_none();

        if let Some(target) = target {
            let media = resolve_target(&part_name, &target);
            log::debug!("Dropping unused {media} ({id}) from {part_name}");
            self.entries.retain(|(name, _)| *name != media);
        }
        if emptied && self.entry(&rels_name).is_none() {
            self.rels.remove(&rels_name);
            self.dirty_entries.remove(&rels_name);
        }
    }

    fn ensure_default_content_type(&mut self, extension: &str, content_type: &str) {
        let declared = self.content_types.elements().any(|e| {
            e.name == "Default"
                && e.attribute("Extension")
                    .is_some_and(|x| x.eq_ignore_ascii_case(extension))
        });
        if declared {
            return;
        }
        let prefix = self.content_types.prefix.clone();
        let namespace = self.content_types.namespace.clone();
        let default = XmlElement::new(prefix.as_deref(), "Default", namespace.as_deref())
            .with_attr(XmlAttribute::plain("Extension", extension))
            .with_attr(XmlAttribute::plain("ContentType", content_type));
        // Defaults conventionally precede Overrides
        let at = self
            .content_types
            .children
            .iter()
            .position(|c| matches!(c, XmlNode::Element(e) if e.name == "Override"))
            .unwrap_or(self.content_types.children.len());
        self.content_types.children.insert(at, XmlNode::Element(default));
        self.dirty_entries.insert(CONTENT_TYPES.to_string());
    }

    pub(crate) fn is_modified(&self) -> bool {
        !self.dirty_entries.is_empty() || self.parts.iter().any(|p| p.dirty)
    }

    /// Write the package, re-serializing only what changed.
    pub(crate) fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut rewritten: HashMap<&str, Vec<u8>> = HashMap::new();
        for part in self.parts.iter().filter(|p| p.dirty) {
            rewritten.insert(part.name.as_str(), xml::serialize(&part.root)?);
        }
        for name in &self.dirty_entries {
            let tree = if name == CONTENT_TYPES {
                Some(&self.content_types)
            } else {
                self.rels.get(name)
            };
            if let Some(tree) = tree {
                rewritten.insert(name.as_str(), xml::serialize(tree)?);
            }
        }

        let mut zip = zip::ZipWriter::new(writer);
        let deflated = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        let stored = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);

        let mut written: HashSet<&str> = HashSet::new();
        for (name, data) in &self.entries {
            if name.ends_with('/') {
                zip.add_directory(name.as_str(), deflated)?;
                continue;
            }
            let opts = if name.contains("/media/") { stored } else { deflated };
            zip.start_file(name.as_str(), opts)?;
            zip.write_all(rewritten.get(name.as_str()).map_or(data.as_slice(), |d| d.as_slice()))?;
            written.insert(name.as_str());
        }
        // Relationship parts that did not exist before
        let mut created: Vec<(&&str, &Vec<u8>)> = rewritten
            .iter()
            .filter(|(name, _)| !written.contains(**name))
            .collect();
        created.sort_by_key(|(name, _)| **name);
        for (name, data) in created {
            zip.start_file(*name, deflated)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
        Ok(())
    }

    /// Replace `path` atomically: write a sibling temp file, then rename it
    /// over the original.
    pub(crate) fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        self.write_to(tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl Part {
    fn new(name: String, kind: PartKind, root: XmlElement) -> Self {
        let wml_prefix = root
            .attributes
            .iter()
            .find(|a| a.value == WML_NS && a.qname.starts_with("xmlns:"))
            .map(|a| a.qname["xmlns:".len()..].to_string())
            .or_else(|| root.prefix.clone().filter(|_| root.namespace.as_deref() == Some(WML_NS)));
        Part {
            name,
            kind,
            root,
            wml_prefix,
            dirty: false,
        }
    }
}

fn parse_entry(name: &str, data: &[u8]) -> Result<XmlElement> {
    parse_text(name, &String::from_utf8_lossy(data))
}

fn parse_text(name: &str, text: &str) -> Result<XmlElement> {
    xml::parse(text.trim_start_matches('\u{feff}'))
        .map_err(|e| Error::MalformedDocument(format!("{name}: {e}")))
}

fn parse_rels_xml(xml_content: &str) -> Vec<Relationship> {
    let Ok(xml) = roxmltree::Document::parse(xml_content.trim_start_matches('\u{feff}')) else {
        return Vec::new();
    };
    xml.root_element()
        .children()
        .filter(|n| n.tag_name().name() == "Relationship")
        .filter(|n| n.attribute("TargetMode") != Some("External"))
        .filter_map(|n| {
            Some(Relationship {
                id: n.attribute("Id")?.to_string(),
                rel_type: n.attribute("Type")?.to_string(),
                target: n.attribute("Target")?.to_string(),
            })
        })
        .collect()
}

fn rels_path(part_path: &str) -> String {
    match part_path.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part_path}.rels"),
    }
}

/// Resolve a relationship target against its source part's directory.
fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let base = source_part.rsplit_once('/').map_or("", |(d, _)| d);
    join_path(base, target)
}

fn join_path(base: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for seg in relative.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}
