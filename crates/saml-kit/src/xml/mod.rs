//! Namespace-aware XML tree.
//!
//! Messages are parsed once into an [`Element`] tree that keeps each node's
//! prefix, its resolved namespace and the declarations it carries. The tree
//! is what signatures are computed over (see [`canonicalize`]) and what the
//! builders assemble outgoing messages from.
//!
//! Elements are addressed by a [`Path`], the list of child indices from the
//! root, so a node located during an immutable walk can later be replaced.

mod c14n;
mod parser;
mod schema;
mod writer;

pub use c14n::canonicalize;
pub use schema::{SchemaValidator, StructuralSchema};

use thiserror::Error;

use crate::types::XML_NS;

/// Child-index path from a root element to one of its descendants.
pub type Path = Vec<usize>;

/// XML parsing errors.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The reader rejected the input.
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),

    /// An attribute could not be read.
    #[error("malformed attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    /// An entity or character reference could not be expanded.
    #[error("invalid reference: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    /// The input is not UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// DTDs are never accepted.
    #[error("document type declarations are not allowed")]
    DocType,

    /// A prefix was used without a declaration in scope.
    #[error("undeclared namespace prefix: {0}")]
    UnboundPrefix(String),

    /// No root element was found.
    #[error("document has no root element")]
    Empty,

    /// Something other than whitespace follows or precedes the root element.
    #[error("content outside the root element")]
    TrailingContent,

    /// Input ended inside an element.
    #[error("unclosed element: {0}")]
    Unclosed(String),
}

/// A namespace declaration (`xmlns` or `xmlns:prefix`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// Declared prefix; `None` for the default namespace.
    pub prefix: Option<String>,
    /// Namespace URI; empty undeclares the default namespace.
    pub uri: String,
}

impl NamespaceDecl {
    /// Creates a declaration. An empty prefix declares the default namespace.
    pub fn new(prefix: &str, uri: &str) -> Self {
        Self {
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            uri: uri.to_string(),
        }
    }
}

/// Looks up the namespace bound to `prefix` in a scope, innermost last.
pub(crate) fn resolve<'a>(scope: &'a [NamespaceDecl], prefix: Option<&str>) -> Option<&'a str> {
    if prefix == Some("xml") {
        return Some(XML_NS);
    }
    scope
        .iter()
        .rev()
        .find(|decl| decl.prefix.as_deref() == prefix)
        .map(|decl| decl.uri.as_str())
        .filter(|uri| !uri.is_empty())
}

fn split_qname(qname: &str) -> (Option<String>, String) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, qname.to_string()),
    }
}

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Namespace; unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Unescaped value.
    pub value: String,
}

/// A child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Nested element.
    Element(Element),
    /// Character data, unescaped.
    Text(String),
    /// Comment body.
    Comment(String),
}

/// An XML element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Prefix as written.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Resolved namespace.
    pub namespace: Option<String>,
    /// Namespace declarations made on this element, in document order.
    pub declarations: Vec<NamespaceDecl>,
    /// Attributes other than namespace declarations, in document order.
    pub attributes: Vec<Attribute>,
    /// Child nodes.
    pub children: Vec<Node>,
}

impl Element {
    /// Parses a complete document.
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        parser::parse(xml, &[])
    }

    /// Parses a fragment that may use prefixes declared by an enclosing
    /// document, such as decrypted content.
    pub fn parse_fragment(xml: &str, scope: &[NamespaceDecl]) -> Result<Self, XmlError> {
        parser::parse(xml, scope)
    }

    /// Creates an element from a qualified name such as `samlp:Response`.
    pub fn new(qname: &str, namespace: &str) -> Self {
        let (prefix, name) = split_qname(qname);
        Self {
            prefix,
            name,
            namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
            declarations: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Adds a namespace declaration.
    #[must_use]
    pub fn declare(mut self, prefix: &str, uri: &str) -> Self {
        self.declarations.push(NamespaceDecl::new(prefix, uri));
        self
    }

    /// Adds an unqualified attribute.
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Adds an unqualified attribute when a value is present.
    #[must_use]
    pub fn with_optional_attr(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.with_attr(name, value),
            None => self,
        }
    }

    /// Adds a namespace-qualified attribute such as `xml:lang`.
    #[must_use]
    pub fn with_qualified_attr(mut self, qname: &str, namespace: &str, value: impl Into<String>) -> Self {
        let (prefix, name) = split_qname(qname);
        self.attributes.push(Attribute {
            prefix,
            name,
            namespace: Some(namespace.to_string()),
            value: value.into(),
        });
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.push(child);
        self
    }

    /// Appends a child element when present.
    #[must_use]
    pub fn with_optional_child(self, child: Option<Self>) -> Self {
        match child {
            Some(child) => self.with_child(child),
            None => self,
        }
    }

    /// Appends several child elements.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children
            .extend(children.into_iter().map(Node::Element));
        self
    }

    /// Appends character data.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Sets an unqualified attribute, replacing an existing value.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|attr| attr.namespace.is_none() && attr.name == name)
        {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute {
                prefix: None,
                name: name.to_string(),
                namespace: None,
                value,
            }),
        }
    }

    /// Replaces all children with a single text node.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    /// Appends a child element.
    pub fn push(&mut self, child: Self) {
        self.children.push(Node::Element(child));
    }

    /// Inserts a child element at a node index.
    pub fn insert(&mut self, index: usize, child: Self) {
        let index = index.min(self.children.len());
        self.children.insert(index, Node::Element(child));
    }

    /// Returns `prefix:name`, or just the name when unprefixed.
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Checks namespace and local name.
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Returns an unqualified attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.namespace.is_none() && attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Returns a namespace-qualified attribute.
    pub fn attr_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.namespace.as_deref() == Some(namespace) && attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// Returns the `ID` attribute.
    pub fn id(&self) -> Option<&str> {
        self.attr("ID")
    }

    /// Iterates child elements, skipping text and comments.
    pub fn elements(&self) -> impl Iterator<Item = &Self> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Iterates child elements with the given name.
    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Self> + 'a {
        self.elements().filter(move |child| child.is(namespace, name))
    }

    /// Returns the first child element with the given name.
    pub fn child(&self, namespace: &str, name: &str) -> Option<&Self> {
        self.elements().find(|child| child.is(namespace, name))
    }

    /// Follows a chain of child names.
    pub fn descend(&self, steps: &[(&str, &str)]) -> Option<&Self> {
        steps
            .iter()
            .try_fold(self, |element, (namespace, name)| element.child(namespace, name))
    }

    /// Returns the direct character data of this element.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns the trimmed text of a child, if that child exists.
    pub fn child_text(&self, namespace: &str, name: &str) -> Option<String> {
        self.child(namespace, name)
            .map(|child| child.text().trim().to_string())
    }

    /// Resolves a path to an element.
    pub fn at(&self, path: &[usize]) -> Option<&Self> {
        path.iter().try_fold(self, |element, index| match element.children.get(*index) {
            Some(Node::Element(child)) => Some(child),
            _ => None,
        })
    }

    /// Resolves a path to a mutable element.
    pub fn at_mut(&mut self, path: &[usize]) -> Option<&mut Self> {
        let mut element = self;
        for index in path {
            element = match element.children.get_mut(*index) {
                Some(Node::Element(child)) => child,
                _ => return None,
            };
        }
        Some(element)
    }

    /// Finds every element matching a predicate, in document order.
    pub fn find_paths(&self, predicate: impl Fn(&Self) -> bool) -> Vec<Path> {
        let mut found = Vec::new();
        let mut current = Vec::new();
        collect_paths(self, &predicate, &mut current, &mut found);
        found
    }

    /// Counts elements carrying the given `ID`.
    pub fn count_ids(&self, id: &str) -> usize {
        self.find_paths(|element| element.id() == Some(id)).len()
    }

    /// Returns the namespace declarations an element at `path` inherits from
    /// its ancestors, outermost first.
    pub fn scope_at(&self, path: &[usize]) -> Vec<NamespaceDecl> {
        let mut scope = self.declarations.clone();
        let mut element = self;
        for index in path.iter().take(path.len().saturating_sub(1)) {
            match element.children.get(*index) {
                Some(Node::Element(child)) => {
                    scope.extend(child.declarations.iter().cloned());
                    element = child;
                }
                _ => break,
            }
        }
        if path.is_empty() {
            scope.clear();
        }
        scope
    }

    /// Serializes the tree.
    pub fn to_xml(&self) -> String {
        writer::write(self)
    }
}

fn collect_paths(
    element: &Element,
    predicate: &impl Fn(&Element) -> bool,
    current: &mut Path,
    found: &mut Vec<Path>,
) {
    if predicate(element) {
        found.push(current.clone());
    }
    for (index, node) in element.children.iter().enumerate() {
        if let Node::Element(child) = node {
            current.push(index);
            collect_paths(child, predicate, current, found);
            current.pop();
        }
    }
}
