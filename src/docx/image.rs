use std::io::Cursor;
use std::path::Path;

use image::ImageFormat;

use crate::error::{Error, Result};
use crate::fit::display_size;
use crate::model::ImageInfo;

use super::xml::{XmlAttribute, XmlElement};
use super::{DML_NS, DocxPackage, PIC_NS, REL_NS, WML_NS, WPD_NS};

const EMU_PER_PIXEL: u64 = 9525;

/// Read native dimensions from the image header.
pub(crate) fn probe(data: &[u8]) -> Result<ImageInfo> {
    let reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| Error::CorruptImage(e.to_string()))?;
    let Some(format) = reader.format() else {
        return Err(Error::UnsupportedImageFormat("unrecognized image data".into()));
    };
    if media_type(format).is_none() {
        return Err(Error::UnsupportedImageFormat(format!("{format:?}")));
    }
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| Error::CorruptImage(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(Error::CorruptImage(format!("{format:?} image has zero size")));
    }
    Ok(ImageInfo {
        width,
        height,
        format,
    })
}

/// Formats Word can embed, with package extension and content type.
fn media_type(format: ImageFormat) -> Option<(&'static str, &'static str)> {
    match format {
        ImageFormat::Png => Some(("png", "image/png")),
        ImageFormat::Jpeg => Some(("jpeg", "image/jpeg")),
        ImageFormat::Gif => Some(("gif", "image/gif")),
        ImageFormat::Bmp => Some(("bmp", "image/bmp")),
        ImageFormat::Tiff => Some(("tiff", "image/tiff")),
        _ => None,
    }
}

/// An image directive with its resolved file.
pub(crate) struct ImageRequest<'a> {
    pub(crate) name: &'a str,
    pub(crate) source: &'a str,
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
}

/// Load, size and register an image on `part`, returning the `w:drawing`
/// element to splice into the paragraph.
pub(crate) fn resolve(
    package: &mut DocxPackage,
    part: usize,
    request: &ImageRequest,
) -> Result<XmlElement> {
    let path = Path::new(request.source);
    let data = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => Error::Io(e),
    })?;
    let info = probe(&data)?;
    let (width, height) = display_size(info.width, info.height, request.width, request.height)?;
    log::trace!(
        "Image {}: {:?} {}x{} -> {}x{}",
        request.name,
        info.format,
        info.width,
        info.height,
        width,
        height
    );

    let rel_id = match package.cached_image_rel(part, request.source) {
        Some(id) => id.to_string(),
        None => {
            let (ext, content_type) = media_type(info.format)
                .ok_or_else(|| Error::UnsupportedImageFormat(format!("{:?}", info.format)))?;
            package.add_image(part, request.source, data, ext, content_type)?
        }
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| request.name.to_string());
    let doc_pr_id = package.next_drawing_id();
    let wml_prefix = package.parts.get(part).and_then(|p| p.wml_prefix.clone());

    Ok(drawing_element(
        wml_prefix.as_deref(),
        &rel_id,
        doc_pr_id,
        request.name,
        &file_name,
        u64::from(width) * EMU_PER_PIXEL,
        u64::from(height) * EMU_PER_PIXEL,
    ))
}

fn wp(name: &str) -> XmlElement {
    XmlElement::new(Some("wp"), name, Some(WPD_NS))
}

fn a(name: &str) -> XmlElement {
    XmlElement::new(Some("a"), name, Some(DML_NS))
}

fn pic(name: &str) -> XmlElement {
    XmlElement::new(Some("pic"), name, Some(PIC_NS))
}

fn attr(name: &str, value: impl ToString) -> XmlAttribute {
    XmlAttribute::plain(name, value.to_string())
}

/// Inline picture. Namespaces are declared on `wp:inline` so the drawing is
/// valid even in header/footer parts with a minimal root.
fn drawing_element(
    wml_prefix: Option<&str>,
    rel_id: &str,
    doc_pr_id: u32,
    name: &str,
    file_name: &str,
    cx: u64,
    cy: u64,
) -> XmlElement {
    let picture = pic("pic")
        .with_child(
            pic("nvPicPr")
                .with_child(
                    pic("cNvPr")
                        .with_attr(attr("id", 0))
                        .with_attr(attr("name", file_name)),
                )
                .with_child(pic("cNvPicPr")),
        )
        .with_child(
            pic("blipFill")
                .with_child(a("blip").with_attr(XmlAttribute::prefixed("r", "embed", REL_NS, rel_id)))
                .with_child(a("stretch").with_child(a("fillRect"))),
        )
        .with_child(
            pic("spPr")
                .with_child(
                    a("xfrm")
                        .with_child(a("off").with_attr(attr("x", 0)).with_attr(attr("y", 0)))
                        .with_child(a("ext").with_attr(attr("cx", cx)).with_attr(attr("cy", cy))),
                )
                .with_child(
                    a("prstGeom")
                        .with_attr(attr("prst", "rect"))
                        .with_child(a("avLst")),
                ),
        );

    let inline = wp("inline")
        .with_attr(XmlAttribute::xmlns("wp", WPD_NS))
        .with_attr(XmlAttribute::xmlns("a", DML_NS))
        .with_attr(XmlAttribute::xmlns("pic", PIC_NS))
        .with_attr(XmlAttribute::xmlns("r", REL_NS))
        .with_attr(attr("distT", 0))
        .with_attr(attr("distB", 0))
        .with_attr(attr("distL", 0))
        .with_attr(attr("distR", 0))
        .with_child(wp("extent").with_attr(attr("cx", cx)).with_attr(attr("cy", cy)))
        .with_child(
            wp("effectExtent")
                .with_attr(attr("l", 0))
                .with_attr(attr("t", 0))
                .with_attr(attr("r", 0))
                .with_attr(attr("b", 0)),
        )
        .with_child(
            wp("docPr")
                .with_attr(attr("id", doc_pr_id))
                .with_attr(attr("name", format!("Picture {doc_pr_id}")))
                .with_attr(attr("descr", name)),
        )
        .with_child(
            wp("cNvGraphicFramePr").with_child(
                a("graphicFrameLocks").with_attr(attr("noChangeAspect", 1)),
            ),
        )
        .with_child(
            a("graphic").with_child(
                a("graphicData")
                    .with_attr(attr("uri", PIC_NS))
                    .with_child(picture),
            ),
        );

    XmlElement::new(wml_prefix, "drawing", Some(WML_NS)).with_child(inline)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn probes_png_dimensions() {
        let info = probe(&png(40, 20)).unwrap();
        assert_eq!((info.width, info.height, info.format), (40, 20, ImageFormat::Png));
    }

    #[test]
    fn garbage_is_unsupported() {
        assert!(matches!(probe(b"not an image at all"), Err(Error::UnsupportedImageFormat(_))));
    }

    #[test]
    fn truncated_png_is_corrupt() {
        let data = png(10, 10);
        assert!(matches!(probe(&data[..12]), Err(Error::CorruptImage(_))));
    }

    #[test]
    fn drawing_carries_extent_and_relationship() {
        let d = drawing_element(Some("w"), "rId7", 3, "LOGO", "logo.png", 9525 * 200, 9525 * 100);
        let inline = d.child(WPD_NS, "inline").unwrap();
        let extent = inline.child(WPD_NS, "extent").unwrap();
        assert_eq!(extent.attribute("cx"), Some("1905000"));
        assert_eq!(extent.attribute("cy"), Some("952500"));
        let blip = d
            .descendants()
            .into_iter()
            .find(|e| e.is(DML_NS, "blip"))
            .unwrap();
        assert_eq!(blip.attributes[0].value, "rId7");
        assert_eq!(blip.attributes[0].qname, "r:embed");
    }
}
