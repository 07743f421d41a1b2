//! Typed access to a parsed HTML page.
//!
//! The wizard pages are not semantically marked up, so the parser needs a
//! little more than CSS selectors: parent text, enclosing table rows, and
//! attribute lookups that fail loudly. [`Node`] wraps a `scraper` element
//! with exactly those operations.

use scraper::{ElementRef, Html, Selector};

use crate::error::{GeoconvertError, GeoconvertResult};

/// The most recently fetched page of a wizard walk.
pub struct Snapshot {
    url: String,
    html: Html,
}

impl Snapshot {
    /// Parse a response body. Text decoding has already happened at the
    /// transport boundary, so the tree holds plain UTF-8 strings.
    pub fn parse(url: impl Into<String>, body: &str) -> Self {
        Self {
            url: url.into(),
            html: Html::parse_document(body),
        }
    }

    /// URL the page was served from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The `<html>` element.
    pub fn root(&self) -> Node<'_> {
        Node {
            el: self.html.root_element(),
        }
    }

    /// The first `<form>` on the page.
    pub fn first_form(&self) -> GeoconvertResult<Node<'_>> {
        self.root()
            .find("form", |_| true)
            .ok_or(GeoconvertError::MissingForm)
    }
}

/// A single element in a [`Snapshot`].
#[derive(Clone, Copy)]
pub struct Node<'a> {
    el: ElementRef<'a>,
}

impl<'a> Node<'a> {
    /// Lower-cased tag name.
    pub fn name(&self) -> &'a str {
        self.el.value().name()
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.el.value().attr(name)
    }

    /// Attribute lookup that turns absence into a [`GeoconvertError::MissingAttribute`].
    pub fn require(
        &self,
        element: &'static str,
        attribute: &'static str,
    ) -> GeoconvertResult<&'a str> {
        self.attr(attribute)
            .ok_or(GeoconvertError::MissingAttribute { element, attribute })
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.el.value().attrs()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.el.value().classes().any(|c| c == class)
    }

    /// All descendants (excluding `self`) with tag `tag` that satisfy
    /// `predicate`, in document order. A tag that is not a valid selector
    /// matches nothing.
    pub fn children<P>(&self, tag: &str, predicate: P) -> Vec<Node<'a>>
    where
        P: Fn(&Node<'a>) -> bool,
    {
        let Ok(sel) = Selector::parse(tag) else {
            return Vec::new();
        };
        self.el
            .select(&sel)
            .map(|el| Node { el })
            .filter(|n| predicate(n))
            .collect()
    }

    /// First descendant with tag `tag` that satisfies `predicate`.
    pub fn find<P>(&self, tag: &str, predicate: P) -> Option<Node<'a>>
    where
        P: Fn(&Node<'a>) -> bool,
    {
        let sel = Selector::parse(tag).ok()?;
        self.el
            .select(&sel)
            .map(|el| Node { el })
            .find(|n| predicate(n))
    }

    /// Concatenated text of every descendant text node.
    pub fn text(&self) -> String {
        self.el.text().collect()
    }

    pub fn parent(&self) -> Option<Node<'a>> {
        self.el.parent().and_then(ElementRef::wrap).map(|el| Node { el })
    }

    /// Nearest ancestor with tag `tag`.
    pub fn ancestor(&self, tag: &str) -> Option<Node<'a>> {
        self.el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .map(|el| Node { el })
            .find(|n| n.name().eq_ignore_ascii_case(tag))
    }
}

/// Predicate matching `<input type="...">` case-insensitively.
pub fn input_type<'a>(kind: &'static str) -> impl Fn(&Node<'a>) -> bool {
    move |n: &Node<'a>| n.attr("type").is_some_and(|t| t.eq_ignore_ascii_case(kind))
}
