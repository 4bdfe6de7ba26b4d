//! Word (`.docx`) text extraction.
//!
//! Only paragraphs that are direct children of the document body are read, matching what a
//! reader sees as the main text flow: table cells, content controls, and text boxes are left
//! out. Paragraph text is the concatenation of its runs, with `w:tab` as `\t` and `w:br`/`w:cr`
//! as `\n`. Paragraphs, including empty ones, are joined with a single newline. Elements are
//! matched by namespace, so documents that bind WordprocessingML to another prefix (or to the
//! default namespace) read the same.

use quick_xml::NsReader;
use quick_xml::events::Event;

use super::ExtractionError;
use super::ooxml::{Ns, Tag, next_event, open_package, read_required_part};

const FORMAT: &str = "Word";
const DOCUMENT_PART: &str = "word/document.xml";

/// Extract the body paragraphs of a `.docx` file.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut package = open_package(bytes, FORMAT)?;
    let xml = read_required_part(&mut package, DOCUMENT_PART, FORMAT)?;
    let paragraphs = body_paragraphs(&xml)?;
    tracing::debug!(paragraphs = paragraphs.len(), "Word document parsed");
    Ok(paragraphs.join("\n"))
}

fn body_paragraphs(xml: &str) -> Result<Vec<String>, ExtractionError> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<Tag> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut paragraph_depth = 0;
    let mut run_depth = 0usize;
    let mut text_box_depth = 0usize;
    let mut in_text = false;

    loop {
        match next_event(&mut reader, FORMAT)? {
            (ns, Event::Start(element)) => {
                let local = element.local_name();
                if ns == Ns::Word {
                    match local.as_ref() {
                        b"p" if is_body(&stack) => {
                            current = Some(String::new());
                            paragraph_depth = stack.len();
                        }
                        b"r" => run_depth += 1,
                        b"t" => in_text = true,
                        b"txbxContent" => text_box_depth += 1,
                        _ => {}
                    }
                }
                stack.push((ns, local.as_ref().to_vec()));
            }
            (Ns::Word, Event::Empty(element)) => {
                let readable = run_depth > 0 && text_box_depth == 0;
                match (element.local_name().as_ref(), current.as_mut()) {
                    (b"p", _) if is_body(&stack) => paragraphs.push(String::new()),
                    (b"tab", Some(text)) if readable => text.push('\t'),
                    (b"br" | b"cr", Some(text)) if readable => text.push('\n'),
                    _ => {}
                }
            }
            (_, Event::Text(content)) if in_text && run_depth > 0 && text_box_depth == 0 => {
                if let Some(text) = current.as_mut() {
                    let unescaped = content
                        .unescape()
                        .map_err(|error| ExtractionError::malformed(FORMAT, error))?;
                    text.push_str(&unescaped);
                }
            }
            (ns, Event::End(element)) => {
                let local = element.local_name();
                if ns == Ns::Word {
                    match local.as_ref() {
                        b"r" => run_depth = run_depth.saturating_sub(1),
                        b"t" => in_text = false,
                        b"txbxContent" => text_box_depth = text_box_depth.saturating_sub(1),
                        _ => {}
                    }
                }
                stack.pop();
                if ns == Ns::Word && local.as_ref() == b"p" && stack.len() == paragraph_depth {
                    if let Some(text) = current.take() {
                        paragraphs.push(text);
                    }
                }
            }
            (_, Event::Eof) => break,
            _ => {}
        }
    }

    Ok(paragraphs)
}

fn is_body(stack: &[Tag]) -> bool {
    stack
        .last()
        .is_some_and(|(ns, local)| *ns == Ns::Word && local.as_slice() == b"body")
}
