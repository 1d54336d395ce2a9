use std::collections::BTreeSet;

use scraper::{ElementRef, Html, Selector};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Missing element: {0}")]
    MissingElement(String),
    #[error("Missing attribute '{0}' on {1}")]
    MissingAttr(&'static str, &'static str),
}

/// Marker normattiva serves (with a 200) when a URN lookup matches nothing.
const NOT_FOUND_MARKER: &str = "Provvedimento non trovato in banca dati";

/// Head metadata of a norm page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct NormHead {
    pub title: String,
    pub description: String,
}

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn is_not_found(html: &str) -> bool {
    html.contains(NOT_FOUND_MARKER)
}

/// Result links of a multi-match disambiguation page. Empty when the lookup
/// landed directly on a single act.
pub(crate) fn parse_search_results(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let result_selector = Selector::parse("#corpo_risultati a").unwrap();

    let hrefs: BTreeSet<String> = document
        .select(&result_selector)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect();

    hrefs.into_iter().collect()
}

/// Href of the permanent-link anchor: the parent `<a>` of the
/// "Collegamento permanente" icon.
pub(crate) fn parse_permalink_href(html: &str) -> Result<String, ParseError> {
    let document = Html::parse_document(html);
    let icon_selector = Selector::parse("img[alt='Collegamento permanente']").unwrap();

    let icon = document
        .select(&icon_selector)
        .next()
        .ok_or_else(|| ParseError::MissingElement("permanent link icon".to_string()))?;

    let anchor = icon
        .parent()
        .and_then(ElementRef::wrap)
        .ok_or_else(|| ParseError::MissingElement("permanent link anchor".to_string()))?;

    anchor
        .value()
        .attr("href")
        .map(str::to_string)
        .ok_or(ParseError::MissingAttr("href", "permanent link anchor"))
}

/// Canonical permalink href (carrying the full URN) from the page the
/// permanent-link anchor redirects to.
pub(crate) fn parse_canonical_href(html: &str) -> Result<String, ParseError> {
    let document = Html::parse_document(html);
    let anchor_selector = Selector::parse("#corpo_errore a").unwrap();

    let anchor = document
        .select(&anchor_selector)
        .next()
        .ok_or_else(|| ParseError::MissingElement("#corpo_errore a".to_string()))?;

    anchor
        .value()
        .attr("href")
        .map(str::to_string)
        .ok_or(ParseError::MissingAttr("href", "#corpo_errore anchor"))
}

/// Title and description from the `#testa_atto` block. Either may come back
/// empty; a missing head is not an error.
pub(crate) fn parse_norm_head(html: &str) -> NormHead {
    let document = Html::parse_document(html);
    let title_selector = Selector::parse("#testa_atto p").unwrap();
    let head_selector = Selector::parse("#testa_atto").unwrap();

    let raw_title = document
        .select(&title_selector)
        .next()
        .map(elem_text)
        .unwrap_or_default();
    let title = normalize_whitespace(&raw_title);

    let description = document
        .select(&head_selector)
        .next()
        .map(|head| normalize_whitespace(&elem_text(head).replace(&raw_title, "")))
        .unwrap_or_default();

    NormHead { title, description }
}

/// Src of the table-of-contents iframe.
pub(crate) fn parse_toc_src(html: &str) -> Result<String, ParseError> {
    let document = Html::parse_document(html);
    let frame_selector = Selector::parse("#leftFrame").unwrap();

    let frame = document
        .select(&frame_selector)
        .next()
        .ok_or_else(|| ParseError::MissingElement("#leftFrame".to_string()))?;

    frame
        .value()
        .attr("src")
        .map(str::to_string)
        .ok_or(ParseError::MissingAttr("src", "#leftFrame"))
}

/// Per-article URLs from the TOC tree, rewritten from the article-body
/// endpoint to the URN-references one.
pub(crate) fn parse_article_urls(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let article_selector = Selector::parse("#albero li a").unwrap();

    document
        .select(&article_selector)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.replace("atto/caricaArticolo", "do/atto/caricaRiferimentiURN"))
        .collect()
}

/// Hrefs of norms referenced by one article. Only URN-shaped links with an
/// act number are kept; the `~` fragment pointing inside the target act is
/// stripped so references dedupe at act granularity.
pub(crate) fn parse_reference_hrefs(html: &str) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    let link_selector = Selector::parse("#dx_dettaglio div.wrapper_pre pre a").unwrap();

    document
        .select(&link_selector)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| href.contains("urn") && href.contains(';'))
        .filter_map(|href| href.split('~').next())
        .map(str::to_string)
        .collect()
}
