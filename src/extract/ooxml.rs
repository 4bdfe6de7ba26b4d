//! Shared helpers for Office Open XML packages (ZIP archives of XML parts).

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Reader};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

use super::ExtractionError;

pub(crate) type Package<'a> = ZipArchive<Cursor<&'a [u8]>>;

const WORDPROCESSING_NS: &[u8] = b"http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const PRESENTATION_NS: &[u8] = b"http://schemas.openxmlformats.org/presentationml/2006/main";
const DRAWING_NS: &[u8] = b"http://schemas.openxmlformats.org/drawingml/2006/main";
const RELATIONSHIPS_NS: &[u8] =
    b"http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// OOXML vocabularies the extractors care about, whatever prefix a document binds them to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ns {
    Word,
    Presentation,
    Drawing,
    Relationships,
    Other,
}

impl Ns {
    pub(crate) fn of(resolved: &ResolveResult<'_>) -> Self {
        let ResolveResult::Bound(namespace) = resolved else {
            return Self::Other;
        };
        match namespace.as_ref() {
            WORDPROCESSING_NS => Self::Word,
            PRESENTATION_NS => Self::Presentation,
            DRAWING_NS => Self::Drawing,
            RELATIONSHIPS_NS => Self::Relationships,
            _ => Self::Other,
        }
    }
}

/// An element name resolved to its vocabulary and local part.
pub(crate) type Tag = (Ns, Vec<u8>);

/// Read the next event together with the vocabulary of its element name.
pub(crate) fn next_event<'i>(
    reader: &mut NsReader<&'i [u8]>,
    format: &'static str,
) -> Result<(Ns, Event<'i>), ExtractionError> {
    let (resolved, event) = reader
        .read_resolved_event()
        .map_err(|error| ExtractionError::malformed(format, error))?;
    Ok((Ns::of(&resolved), event))
}

/// Open the ZIP container of an Office document.
pub(crate) fn open_package<'a>(
    bytes: &'a [u8],
    format: &'static str,
) -> Result<Package<'a>, ExtractionError> {
    ZipArchive::new(Cursor::new(bytes))
        .map_err(|error| ExtractionError::malformed(format, format!("not a ZIP package: {error}")))
}

/// Read a part as UTF-8, returning `None` when the package does not contain it.
pub(crate) fn read_part(
    package: &mut Package<'_>,
    name: &str,
    format: &'static str,
) -> Result<Option<String>, ExtractionError> {
    let mut file = match package.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(error) => return Err(ExtractionError::malformed(format, error)),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|error| ExtractionError::malformed(format, format!("{name}: {error}")))?;
    Ok(Some(xml))
}

/// Read a part that every valid package of this format must contain.
pub(crate) fn read_required_part(
    package: &mut Package<'_>,
    name: &str,
    format: &'static str,
) -> Result<String, ExtractionError> {
    read_part(package, name, format)?
        .ok_or_else(|| ExtractionError::malformed(format, format!("missing part {name}")))
}

/// Map relationship ids to their targets from a `.rels` part.
pub(crate) fn parse_relationships(
    xml: &str,
    format: &'static str,
) -> Result<HashMap<String, String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut relationships = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element))
                if element.local_name().as_ref() == b"Relationship" =>
            {
                let id = attribute(&element, b"Id", format)?;
                let target = attribute(&element, b"Target", format)?;
                if let (Some(id), Some(target)) = (id, target) {
                    relationships.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(error) => return Err(ExtractionError::malformed(format, error)),
        }
    }

    Ok(relationships)
}

/// Fetch an attribute by vocabulary and local name, whatever prefix it is written with.
pub(crate) fn namespaced_attribute(
    reader: &NsReader<&[u8]>,
    element: &BytesStart<'_>,
    namespace: Ns,
    local: &[u8],
    format: &'static str,
) -> Result<Option<String>, ExtractionError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|error| ExtractionError::malformed(format, error))?;
        let (resolved, name) = reader.resolve_attribute(attr.key);
        if Ns::of(&resolved) == namespace && name.as_ref() == local {
            let value = attr
                .unescape_value()
                .map_err(|error| ExtractionError::malformed(format, error))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Fetch an attribute by its qualified name, unescaped.
fn attribute(
    element: &BytesStart<'_>,
    name: &[u8],
    format: &'static str,
) -> Result<Option<String>, ExtractionError> {
    for attr in element.attributes() {
        let attr = attr.map_err(|error| ExtractionError::malformed(format, error))?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|error| ExtractionError::malformed(format, error))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) fn build_package(parts: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in parts {
        writer
            .start_file(*name, FileOptions::default())
            .expect("start zip entry");
        writer
            .write_all(content.as_bytes())
            .expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationships_map_ids_to_targets() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide2.xml"/>
</Relationships>"#;
        let map = parse_relationships(xml, "test").expect("relationships");
        assert_eq!(map.get("rId2").map(String::as_str), Some("slides/slide1.xml"));
        assert_eq!(map.get("rId3").map(String::as_str), Some("slides/slide2.xml"));
    }

    #[test]
    fn namespaces_resolve_regardless_of_prefix() {
        let xml = r#"<x:sld xmlns:x="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns="http://schemas.openxmlformats.org/drawingml/2006/main"><p/></x:sld>"#;
        let mut reader = NsReader::from_str(xml);
        let mut seen = Vec::new();
        loop {
            match next_event(&mut reader, "test").expect("event") {
                (ns, Event::Start(element)) | (ns, Event::Empty(element)) => {
                    seen.push((ns, element.local_name().as_ref().to_vec()));
                }
                (_, Event::Eof) => break,
                _ => {}
            }
        }
        assert_eq!(
            seen,
            vec![
                (Ns::Presentation, b"sld".to_vec()),
                (Ns::Drawing, b"p".to_vec())
            ]
        );
    }

    #[test]
    fn garbage_bytes_are_not_a_package() {
        let error = open_package(b"definitely not a zip", "Word").expect_err("invalid zip");
        assert!(error.to_string().starts_with("Malformed Word document"));
    }

    #[test]
    fn missing_parts_read_as_none() {
        let bytes = build_package(&[("a.xml", "<a/>")]);
        let mut package = open_package(&bytes, "test").expect("package");
        assert!(read_part(&mut package, "b.xml", "test").expect("read").is_none());
        assert_eq!(
            read_part(&mut package, "a.xml", "test").expect("read").as_deref(),
            Some("<a/>")
        );
    }
}
