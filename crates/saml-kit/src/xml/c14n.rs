//! Exclusive XML Canonicalization 1.0, without comments.
//!
//! Only namespace declarations that the output visibly uses are rendered,
//! each at the outermost element that needs it. Declarations named in the
//! `InclusiveNamespaces` prefix list are rendered as in inclusive c14n.

use super::{resolve, Element, NamespaceDecl, Node};

/// Canonicalizes `element` as an apex node.
///
/// `scope` holds the declarations inherited from the element's ancestors.
/// `exclude` names one descendant to omit, used for enveloped signatures.
pub fn canonicalize(
    element: &Element,
    scope: &[NamespaceDecl],
    inclusive_prefixes: &[String],
    exclude: Option<&Element>,
) -> String {
    let mut canonicalizer = Canonicalizer {
        inclusive_prefixes,
        exclude,
        in_scope: scope.to_vec(),
        rendered: Vec::new(),
        out: String::new(),
    };
    canonicalizer.element(element);
    canonicalizer.out
}

struct Canonicalizer<'a> {
    inclusive_prefixes: &'a [String],
    exclude: Option<&'a Element>,
    in_scope: Vec<NamespaceDecl>,
    rendered: Vec<(Option<String>, String)>,
    out: String,
}

impl Canonicalizer<'_> {
    fn element(&mut self, element: &Element) {
        let scope_mark = self.in_scope.len();
        let rendered_mark = self.rendered.len();
        self.in_scope.extend(element.declarations.iter().cloned());

        let emitted = self.namespaces_to_emit(element);
        let qname = element.qualified_name();

        self.out.push('<');
        self.out.push_str(&qname);
        for (prefix, uri) in &emitted {
            match prefix {
                Some(prefix) => {
                    self.out.push_str(" xmlns:");
                    self.out.push_str(prefix);
                }
                None => self.out.push_str(" xmlns"),
            }
            self.out.push_str("=\"");
            escape_attribute(uri, &mut self.out);
            self.out.push('"');
        }

        let mut attributes: Vec<_> = element.attributes.iter().collect();
        attributes.sort_by(|a, b| {
            let a_ns = a.namespace.as_deref().unwrap_or_default();
            let b_ns = b.namespace.as_deref().unwrap_or_default();
            (a_ns, a.name.as_str()).cmp(&(b_ns, b.name.as_str()))
        });
        for attr in attributes {
            self.out.push(' ');
            if let Some(prefix) = &attr.prefix {
                self.out.push_str(prefix);
                self.out.push(':');
            }
            self.out.push_str(&attr.name);
            self.out.push_str("=\"");
            escape_attribute(&attr.value, &mut self.out);
            self.out.push('"');
        }
        self.out.push('>');

        self.rendered.extend(emitted);

        for node in &element.children {
            match node {
                Node::Element(child) => {
                    if self.exclude.is_some_and(|excluded| std::ptr::eq(excluded, child)) {
                        continue;
                    }
                    self.element(child);
                }
                Node::Text(text) => escape_text(text, &mut self.out),
                Node::Comment(_) => {}
            }
        }

        self.out.push_str("</");
        self.out.push_str(&qname);
        self.out.push('>');

        self.rendered.truncate(rendered_mark);
        self.in_scope.truncate(scope_mark);
    }

    fn namespaces_to_emit(&self, element: &Element) -> Vec<(Option<String>, String)> {
        let mut needed: Vec<(Option<String>, String)> = vec![(
            element.prefix.clone(),
            element.namespace.clone().unwrap_or_default(),
        )];
        for attr in &element.attributes {
            if let Some(prefix) = &attr.prefix {
                if prefix != "xml" {
                    needed.push((Some(prefix.clone()), attr.namespace.clone().unwrap_or_default()));
                }
            }
        }
        for listed in self.inclusive_prefixes {
            let prefix = (listed != "#default").then(|| listed.clone());
            if let Some(uri) = resolve(&self.in_scope, prefix.as_deref()) {
                needed.push((prefix, uri.to_string()));
            }
        }

        let mut emitted: Vec<(Option<String>, String)> = Vec::new();
        for (prefix, uri) in needed {
            if emitted.iter().any(|(p, _)| *p == prefix) {
                continue;
            }
            let current = self
                .rendered
                .iter()
                .rev()
                .find(|(p, _)| *p == prefix)
                .map(|(_, u)| u.as_str());
            match current {
                Some(existing) if existing == uri => {}
                None if uri.is_empty() => {}
                _ => emitted.push((prefix, uri)),
            }
        }
        emitted.sort_by(|a, b| a.0.cmp(&b.0));
        emitted
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
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
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}
