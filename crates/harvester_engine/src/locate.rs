//! Locator evaluation over parsed HTML.

use harvester_core::{Locator, Read};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::source::SourceError;

pub(crate) fn parse_selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|err| SourceError::InvalidLocator {
        css: css.to_string(),
        message: format!("{err:?}"),
    })
}

/// Descendants of `scope` matching `locator`, in document order.
pub(crate) fn select<'a>(
    scope: ElementRef<'a>,
    locator: &Locator,
) -> Result<Vec<ElementRef<'a>>, SourceError> {
    let selector = parse_selector(&locator.css)?;
    let Some(filter) = &locator.has_text else {
        return Ok(scope.select(&selector).collect());
    };

    let within = filter.within.as_deref().map(parse_selector).transpose()?;
    let matches = scope
        .select(&selector)
        .filter(|element| match &within {
            Some(inner) => element
                .select(inner)
                .any(|descendant| filter.matches(&rendered_text(descendant))),
            None => filter.matches(&rendered_text(*element)),
        })
        .collect();
    Ok(matches)
}

/// Text content with whitespace runs collapsed, roughly what a browser renders.
pub(crate) fn rendered_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn read(element: ElementRef<'_>, read: &Read, base: Option<&Url>) -> Option<String> {
    match read {
        Read::Text => Some(rendered_text(element)),
        Read::Attribute(name) => element.value().attr(name).map(str::to_string),
        Read::Href => element.value().attr("href").map(|href| resolve(href, base)),
    }
}

pub(crate) fn resolve(href: &str, base: Option<&Url>) -> String {
    let href = href.trim();
    match base.map(|base| base.join(href)) {
        Some(Ok(url)) => url.to_string(),
        _ => href.to_string(),
    }
}

/// An item's outer HTML plus the tag names of its ancestors below `<body>`,
/// outermost first. Re-parsing inside those ancestors keeps elements such as
/// `tr` or `td` that the parser drops outside their table context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ItemMarkup {
    html: String,
    ancestors: Vec<String>,
}

impl ItemMarkup {
    fn capture(element: ElementRef<'_>) -> Self {
        let mut ancestors: Vec<String> = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .map(|ancestor| ancestor.value().name().to_string())
            .take_while(|name| name != "body" && name != "html")
            .collect();
        ancestors.reverse();
        Self {
            html: element.html(),
            ancestors,
        }
    }

    fn wrapped(&self) -> String {
        let mut doc = String::with_capacity(self.html.len() + 16 * self.ancestors.len());
        for tag in &self.ancestors {
            doc.push('<');
            doc.push_str(tag);
            doc.push('>');
        }
        doc.push_str(&self.html);
        for tag in self.ancestors.iter().rev() {
            doc.push_str("</");
            doc.push_str(tag);
            doc.push('>');
        }
        doc
    }
}

fn first_child_element(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.children().find_map(ElementRef::wrap)
}

/// The item element inside a re-parsed [`ItemMarkup::wrapped`] document.
fn item_root<'a>(document: &'a Html, markup: &ItemMarkup) -> Option<ElementRef<'a>> {
    let body = document
        .root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .find(|element| element.value().name() == "body")?;
    (0..=markup.ancestors.len()).try_fold(body, |element, _| first_child_element(element))
}

/// Every element in `html` matching `locator`, captured for later queries.
pub(crate) fn extract_items(html: &str, locator: &Locator) -> Result<Vec<ItemMarkup>, SourceError> {
    let document = Html::parse_document(html);
    let items = select(document.root_element(), locator)?
        .into_iter()
        .map(ItemMarkup::capture)
        .collect();
    Ok(items)
}

/// Reads `read` from every element of the item matching `locator`.
pub(crate) fn query_item(
    item: &ItemMarkup,
    locator: &Locator,
    read_mode: &Read,
    base: Option<&Url>,
) -> Result<Vec<String>, SourceError> {
    let document = Html::parse_document(&item.wrapped());
    let Some(root) = item_root(&document, item) else {
        return Ok(Vec::new());
    };
    let values = select(root, locator)?
        .into_iter()
        .filter_map(|element| read(element, read_mode, base))
        .collect();
    Ok(values)
}

/// First element in the document matching `locator`, as its resolved `href`
/// (which may be absent).
pub(crate) fn find_first(
    html: &str,
    locator: &Locator,
    base: Option<&Url>,
) -> Result<Option<Option<String>>, SourceError> {
    let document = Html::parse_document(html);
    let found = select(document.root_element(), locator)?
        .into_iter()
        .next()
        .map(|element| read(element, &Read::Href, base));
    Ok(found)
}
