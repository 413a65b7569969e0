//! Narrow page-automation capability.
//!
//! The pipeline only needs four primitives — navigate, a bounded wait for a
//! selector, query-all, and element reads — so that is the whole trait. The
//! shipped backing fetches server-rendered HTML over HTTP and answers queries
//! against that snapshot; tests drive the same trait with canned pages.

pub mod http;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

use crate::error::BrowserError;

/// A handle over one rendered element. Supports nested queries so the
/// extractor can walk seat-fare rows inside a listing card.
pub trait Element: Send {
    /// Concatenated descendant text, whitespace as rendered.
    fn text(&self) -> String;

    fn attr(&self, name: &str) -> Option<String>;

    fn select(&self, selector: &str) -> Vec<Box<dyn Element>>;

    fn select_first(&self, selector: &str) -> Option<Box<dyn Element>> {
        self.select(selector).into_iter().next()
    }
}

#[async_trait]
pub trait Browser: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Wait up to `timeout` for `selector` to match on the current page.
    /// Returns false (not an error) when it never does.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool, BrowserError>;

    fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>, BrowserError>;
}

// ── Snapshot-backed elements ──────────────────────────────────────────────────

/// Element backed by its own serialized HTML, reparsed per query. Pages are
/// a few hundred KB at most; owning the markup keeps handles `Send` and
/// independent of the page they came from.
struct HtmlFragment {
    html: String,
}

fn fragment_root<'a>(doc: &'a Html) -> Option<ElementRef<'a>> {
    doc.root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .next()
}

impl Element for HtmlFragment {
    fn text(&self) -> String {
        let doc = Html::parse_fragment(&self.html);
        doc.root_element().text().collect::<Vec<_>>().join(" ")
    }

    fn attr(&self, name: &str) -> Option<String> {
        let doc = Html::parse_fragment(&self.html);
        fragment_root(&doc)?.value().attr(name).map(str::to_string)
    }

    fn select(&self, selector: &str) -> Vec<Box<dyn Element>> {
        let Ok(sel) = Selector::parse(selector) else {
            return Vec::new();
        };
        let doc = Html::parse_fragment(&self.html);
        doc.select(&sel)
            .map(|el| Box::new(HtmlFragment { html: el.html() }) as Box<dyn Element>)
            .collect()
    }
}

/// Run a selector over a full document and box the matches.
pub(crate) fn select_in_document(
    document: &str,
    selector: &str,
) -> Result<Vec<Box<dyn Element>>, BrowserError> {
    let sel =
        Selector::parse(selector).map_err(|_| BrowserError::Selector(selector.to_string()))?;
    let doc = Html::parse_document(document);
    Ok(doc
        .select(&sel)
        .map(|el| Box::new(HtmlFragment { html: el.html() }) as Box<dyn Element>)
        .collect())
}

// ── Test fake ─────────────────────────────────────────────────────────────────

#[cfg(test)]
pub mod fake {
    use super::*;

    /// Serves one canned document regardless of URL, with optional injected
    /// navigation failures to exercise the retry path.
    pub struct StaticBrowser {
        html: String,
        failures_left: u32,
        document: Option<String>,
    }

    impl StaticBrowser {
        pub fn new(html: impl Into<String>) -> Self {
            Self {
                html: html.into(),
                failures_left: 0,
                document: None,
            }
        }

        pub fn failing_first(mut self, failures: u32) -> Self {
            self.failures_left = failures;
            self
        }
    }

    #[async_trait]
    impl Browser for StaticBrowser {
        async fn navigate(&mut self, _url: &str) -> Result<(), BrowserError> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(BrowserError::Unavailable("injected navigation failure".into()));
            }
            self.document = Some(self.html.clone());
            Ok(())
        }

        async fn wait_for_selector(
            &mut self,
            selector: &str,
            _timeout: Duration,
        ) -> Result<bool, BrowserError> {
            Ok(!self.query_all(selector)?.is_empty())
        }

        fn query_all(&self, selector: &str) -> Result<Vec<Box<dyn Element>>, BrowserError> {
            let doc = self.document.as_deref().ok_or(BrowserError::NoPage)?;
            select_in_document(doc, selector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = r#"
        <div class="bus-item" data-id="b1">
          <span class="travels"> VRL  Travels </span>
          <ul><li class="seat-type-fare"><span class="fare-details">₹ 800</span></li>
              <li class="seat-type-fare"><span class="fare-details">₹ 500</span></li></ul>
        </div>"#;

    #[test]
    fn nested_selects_reach_inner_rows() {
        let cards = select_in_document(CARD, ".bus-item").unwrap();
        assert_eq!(cards.len(), 1);
        let rows = cards[0].select(".seat-type-fare");
        assert_eq!(rows.len(), 2);
        assert!(rows[1].text().contains("500"));
    }

    #[test]
    fn attr_reads_the_element_itself() {
        let cards = select_in_document(CARD, ".bus-item").unwrap();
        assert_eq!(cards[0].attr("data-id").as_deref(), Some("b1"));
        assert_eq!(cards[0].attr("missing"), None);
    }

    #[test]
    fn bad_selector_is_an_error() {
        assert!(select_in_document(CARD, ":::").is_err());
    }
}
