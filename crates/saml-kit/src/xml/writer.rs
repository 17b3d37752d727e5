//! Tree serialization.

use super::{Element, Node};

pub(super) fn write(element: &Element) -> String {
    let mut out = String::new();
    write_element(element, &mut out);
    out
}

fn write_element(element: &Element, out: &mut String) {
    let qname = element.qualified_name();
    out.push('<');
    out.push_str(&qname);

    for decl in &element.declarations {
        match &decl.prefix {
            Some(prefix) => {
                out.push_str(" xmlns:");
                out.push_str(prefix);
            }
            None => out.push_str(" xmlns"),
        }
        out.push_str("=\"");
        escape_attribute(&decl.uri, out);
        out.push('"');
    }

    for attr in &element.attributes {
        out.push(' ');
        if let Some(prefix) = &attr.prefix {
            out.push_str(prefix);
            out.push(':');
        }
        out.push_str(&attr.name);
        out.push_str("=\"");
        escape_attribute(&attr.value, out);
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for node in &element.children {
        match node {
            Node::Element(child) => write_element(child, out),
            Node::Text(text) => escape_text(text, out),
            Node::Comment(body) => {
                out.push_str("<!--");
                out.push_str(body);
                out.push_str("-->");
            }
        }
    }
    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::Element;

    #[test]
    fn preserves_whitespace_in_attributes() {
        let element = Element::new("a", "").with_attr("v", "line\nbreak\t\"q\"");
        let xml = element.to_xml();
        assert_eq!(xml, r#"<a v="line&#10;break&#9;&quot;q&quot;"/>"#);
        assert_eq!(Element::parse(&xml).unwrap(), element);
    }

    #[test]
    fn writes_comments_and_declarations() {
        let xml = r#"<p:a xmlns:p="urn:p" xmlns="urn:d"><!-- note --><b>x &gt; y</b></p:a>"#;
        let element = Element::parse(xml).unwrap();
        assert_eq!(element.to_xml(), xml);
    }
}
