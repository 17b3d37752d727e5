//! Event-driven tree construction over `quick-xml`.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{resolve, split_qname, Attribute, Element, NamespaceDecl, Node, XmlError};

pub(super) fn parse(xml: &str, inherited: &[NamespaceDecl]) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut scope: Vec<NamespaceDecl> = inherited.to_vec();
    let mut marks: Vec<usize> = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if root.is_some() {
                    return Err(XmlError::TrailingContent);
                }
                marks.push(scope.len());
                stack.push(open_element(&start, &mut scope)?);
            }
            Event::Empty(start) => {
                if root.is_some() {
                    return Err(XmlError::TrailingContent);
                }
                let mark = scope.len();
                let element = open_element(&start, &mut scope)?;
                scope.truncate(mark);
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack.pop().ok_or(XmlError::TrailingContent)?;
                if let Some(mark) = marks.pop() {
                    scope.truncate(mark);
                }
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let raw = std::str::from_utf8(&text)?;
                let value = unescape(&normalize_newlines(raw))?.into_owned();
                push_text(&mut stack, value)?;
            }
            Event::CData(data) => {
                let value = normalize_newlines(std::str::from_utf8(&data)?);
                push_text(&mut stack, value)?;
            }
            Event::Comment(comment) => {
                if let Some(parent) = stack.last_mut() {
                    let body = std::str::from_utf8(&comment)?.to_string();
                    parent.children.push(Node::Comment(body));
                }
            }
            Event::DocType(_) => return Err(XmlError::DocType),
            Event::Decl(_) | Event::PI(_) => {}
            Event::Eof => break,
        }
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Unclosed(open.qualified_name()));
    }
    root.ok_or(XmlError::Empty)
}

fn open_element(start: &BytesStart<'_>, scope: &mut Vec<NamespaceDecl>) -> Result<Element, XmlError> {
    let qname = std::str::from_utf8(start.name().as_ref())?.to_string();
    let mut declarations = Vec::new();
    let mut raw_attributes = Vec::new();

    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = std::str::from_utf8(attribute.key.as_ref())?;
        let raw = std::str::from_utf8(&attribute.value)?;
        let value = unescape(&normalize_attribute(raw))?.into_owned();

        if key == "xmlns" {
            declarations.push(NamespaceDecl { prefix: None, uri: value });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            declarations.push(NamespaceDecl {
                prefix: Some(prefix.to_string()),
                uri: value,
            });
        } else {
            raw_attributes.push((key.to_string(), value));
        }
    }

    scope.extend(declarations.iter().cloned());

    let (prefix, name) = split_qname(&qname);
    let namespace = match prefix.as_deref() {
        Some(p) => Some(
            resolve(scope, Some(p))
                .ok_or_else(|| XmlError::UnboundPrefix(p.to_string()))?
                .to_string(),
        ),
        None => resolve(scope, None).map(str::to_string),
    };

    let attributes = raw_attributes
        .into_iter()
        .map(|(key, value)| {
            let (prefix, name) = split_qname(&key);
            let namespace = match prefix.as_deref() {
                Some(p) => Some(
                    resolve(scope, Some(p))
                        .ok_or_else(|| XmlError::UnboundPrefix(p.to_string()))?
                        .to_string(),
                ),
                None => None,
            };
            Ok(Attribute {
                prefix,
                name,
                namespace,
                value,
            })
        })
        .collect::<Result<Vec<_>, XmlError>>()?;

    Ok(Element {
        prefix,
        name,
        namespace,
        declarations,
        attributes,
        children: Vec::new(),
    })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn push_text(stack: &mut [Element], value: String) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            if let Some(Node::Text(previous)) = parent.children.last_mut() {
                previous.push_str(&value);
            } else {
                parent.children.push(Node::Text(value));
            }
            Ok(())
        }
        None if value.trim().is_empty() => Ok(()),
        None => Err(XmlError::TrailingContent),
    }
}

fn normalize_newlines(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\r', "\n")
}

/// Literal whitespace in attribute values becomes a space; character
/// references survive because normalization runs before unescaping.
fn normalize_attribute(raw: &str) -> String {
    normalize_newlines(raw).replace(['\t', '\n'], " ")
}
