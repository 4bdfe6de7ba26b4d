//! PowerPoint (`.pptx`) text extraction.
//!
//! Slides are read in presentation order (the `p:sldIdLst` of `ppt/presentation.xml`). For
//! every top-level shape that carries a text body, the shape's paragraphs are joined with `\n`
//! and the shape text is emitted followed by a newline. Shapes nested in groups, pictures, and
//! graphic frames (tables, charts) are skipped. PresentationML and DrawingML elements are
//! matched by namespace rather than by prefix.

use quick_xml::NsReader;
use quick_xml::events::Event;
use std::collections::HashMap;

use super::ExtractionError;
use super::ooxml::{
    Ns, Package, Tag, namespaced_attribute, next_event, open_package, parse_relationships,
    read_part, read_required_part,
};

const FORMAT: &str = "PowerPoint";
const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// Extract shape text from every slide of a `.pptx` file.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut package = open_package(bytes, FORMAT)?;
    let slide_parts = slide_order(&mut package)?;

    let mut text = String::new();
    for part in &slide_parts {
        let xml = read_required_part(&mut package, part, FORMAT)?;
        for shape in shape_texts(&xml)? {
            text.push_str(&shape);
            text.push('\n');
        }
    }
    tracing::debug!(slides = slide_parts.len(), "Presentation parsed");
    Ok(text)
}

/// Resolve slide part names in presentation order.
fn slide_order(package: &mut Package<'_>) -> Result<Vec<String>, ExtractionError> {
    let presentation = read_required_part(package, PRESENTATION_PART, FORMAT)?;
    let relationships = match read_part(package, PRESENTATION_RELS, FORMAT)? {
        Some(xml) => parse_relationships(&xml, FORMAT)?,
        None => HashMap::new(),
    };

    let mut reader = NsReader::from_str(&presentation);
    let mut parts = Vec::new();
    loop {
        match next_event(&mut reader, FORMAT)? {
            (Ns::Presentation, Event::Start(element) | Event::Empty(element))
                if element.local_name().as_ref() == b"sldId" =>
            {
                let id =
                    namespaced_attribute(&reader, &element, Ns::Relationships, b"id", FORMAT)?;
                let Some(id) = id else {
                    continue;
                };
                match relationships.get(&id) {
                    Some(target) => parts.push(resolve_target(target)),
                    None => tracing::warn!(relationship = %id, "Slide relationship missing"),
                }
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }
    Ok(parts)
}

/// Turn a relationship target relative to `ppt/` into a package part name.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("ppt/{}", target.trim_start_matches("./")),
    }
}

/// Collect the text of every top-level text-bearing shape on a slide.
fn shape_texts(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<Tag> = Vec::new();
    let mut shapes = Vec::new();
    // Paragraphs of the shape currently being read; `None` until its text body starts.
    let mut paragraphs: Option<Vec<String>> = None;
    let mut shape_depth: Option<usize> = None;
    let mut in_text = false;

    loop {
        match next_event(&mut reader, FORMAT)? {
            (ns, Event::Start(element)) => {
                let local = element.local_name();
                match (ns, local.as_ref()) {
                    (Ns::Presentation, b"sp")
                        if shape_depth.is_none() && parent_is(&stack, Ns::Presentation, b"spTree") =>
                    {
                        shape_depth = Some(stack.len());
                    }
                    (Ns::Presentation, b"txBody") if shape_depth.is_some() => {
                        paragraphs = Some(Vec::new())
                    }
                    (Ns::Drawing, b"p") => {
                        if let Some(paragraphs) = paragraphs.as_mut() {
                            paragraphs.push(String::new());
                        }
                    }
                    (Ns::Drawing, b"t") => in_text = true,
                    _ => {}
                }
                stack.push((ns, local.as_ref().to_vec()));
            }
            (Ns::Drawing, Event::Empty(element)) => match element.local_name().as_ref() {
                b"p" => {
                    if let Some(paragraphs) = paragraphs.as_mut() {
                        paragraphs.push(String::new());
                    }
                }
                b"br" => {
                    if let Some(last) = paragraphs.as_mut().and_then(|p| p.last_mut()) {
                        last.push('\n');
                    }
                }
                _ => {}
            },
            (_, Event::Text(content)) if in_text => {
                if let Some(last) = paragraphs.as_mut().and_then(|p| p.last_mut()) {
                    let unescaped = content
                        .unescape()
                        .map_err(|error| ExtractionError::malformed(FORMAT, error))?;
                    last.push_str(&unescaped);
                }
            }
            (ns, Event::End(element)) => {
                stack.pop();
                match (ns, element.local_name().as_ref()) {
                    (Ns::Drawing, b"t") => in_text = false,
                    (Ns::Presentation, b"sp") if shape_depth == Some(stack.len()) => {
                        if let Some(done) = paragraphs.take() {
                            shapes.push(done.join("\n"));
                        }
                        shape_depth = None;
                    }
                    _ => {}
                }
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Ok(shapes)
}

fn parent_is(stack: &[Tag], namespace: Ns, local: &[u8]) -> bool {
    stack
        .last()
        .is_some_and(|(ns, name)| *ns == namespace && name.as_slice() == local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ooxml::build_package;

    const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:sldIdLst><p:sldId id="256" r:id="rId7"/><p:sldId id="257" r:id="rId3"/></p:sldIdLst></p:presentation>"#;

    const PRESENTATION_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/><Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide2.xml"/></Relationships>"#;

    fn slide(shapes: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr/><p:grpSpPr/>{shapes}</p:spTree></p:cSld></p:sld>"#
        )
    }

    fn text_shape(paragraphs: &[&str]) -> String {
        let body: String = paragraphs
            .iter()
            .map(|text| format!("<a:p><a:r><a:rPr lang=\"en-US\"/><a:t>{text}</a:t></a:r></a:p>"))
            .collect();
        format!("<p:sp><p:nvSpPr/><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/>{body}</p:txBody></p:sp>")
    }

    #[test]
    fn slides_follow_presentation_order_not_file_names() {
        let first = slide(&text_shape(&["Agenda"]));
        let second = slide(&format!(
            "{}{}",
            text_shape(&["Quarterly results"]),
            text_shape(&["Revenue up", "Costs down"])
        ));
        let bytes = build_package(&[
            ("ppt/presentation.xml", PRESENTATION),
            ("ppt/_rels/presentation.xml.rels", PRESENTATION_RELS_XML),
            ("ppt/slides/slide1.xml", &first),
            ("ppt/slides/slide2.xml", &second),
        ]);

        assert_eq!(
            extract_text(&bytes).expect("pptx text"),
            "Quarterly results\nRevenue up\nCosts down\nAgenda\n"
        );
    }

    #[test]
    fn pictures_and_grouped_shapes_are_skipped() {
        let xml = slide(&format!(
            "{}<p:pic><p:nvPicPr/></p:pic><p:grpSp>{}</p:grpSp>{}",
            text_shape(&["Visible"]),
            text_shape(&["Grouped"]),
            "<p:sp><p:nvSpPr/><p:spPr/></p:sp>"
        ));
        assert_eq!(shape_texts(&xml).expect("shapes"), vec!["Visible".to_string()]);
    }

    #[test]
    fn line_breaks_and_entities_inside_a_paragraph() {
        let xml = slide(
            "<p:sp><p:txBody><a:p><a:r><a:t>R&amp;D</a:t></a:r><a:br/><a:r><a:t>budget</a:t></a:r></a:p><a:p/></p:txBody></p:sp>",
        );
        assert_eq!(
            shape_texts(&xml).expect("shapes"),
            vec!["R&D\nbudget\n".to_string()]
        );
    }

    #[test]
    fn shapes_resolve_by_namespace_not_prefix() {
        let xml = r#"<ns0:sld xmlns:ns0="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:ns1="http://schemas.openxmlformats.org/drawingml/2006/main"><ns0:cSld><ns0:spTree><ns0:sp><ns0:txBody><ns1:p><ns1:r><ns1:t>Renamed</ns1:t></ns1:r></ns1:p></ns0:txBody></ns0:sp></ns0:spTree></ns0:cSld></ns0:sld>"#;
        assert_eq!(shape_texts(xml).expect("shapes"), vec!["Renamed".to_string()]);
    }

    #[test]
    fn slide_ids_resolve_with_any_relationship_prefix() {
        let presentation = r#"<pr:presentation xmlns:pr="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:rel="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><pr:sldIdLst><pr:sldId id="256" rel:id="rId3"/></pr:sldIdLst></pr:presentation>"#;
        let bytes = build_package(&[
            ("ppt/presentation.xml", presentation),
            ("ppt/_rels/presentation.xml.rels", PRESENTATION_RELS_XML),
            ("ppt/slides/slide1.xml", &slide(&text_shape(&["Only slide"]))),
        ]);
        assert_eq!(extract_text(&bytes).expect("pptx text"), "Only slide\n");
    }

    #[test]
    fn relative_and_absolute_targets_resolve_to_part_names() {
        assert_eq!(resolve_target("slides/slide3.xml"), "ppt/slides/slide3.xml");
        assert_eq!(resolve_target("/ppt/slides/slide3.xml"), "ppt/slides/slide3.xml");
    }

    #[test]
    fn missing_presentation_part_is_malformed() {
        let bytes = build_package(&[("ppt/slides/slide1.xml", "<p:sld/>")]);
        let error = extract_text(&bytes).expect_err("no presentation part");
        assert!(matches!(error, ExtractionError::Malformed { format: "PowerPoint", .. }));
    }
}
