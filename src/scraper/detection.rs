//! Page classification: anti-bot interstitials, CAPTCHAs and broken pages
//!
//! Everything here is case-insensitive substring matching against the
//! configured indicator lists, plus a small amount of DOM inspection for
//! pages that only render with JavaScript.

use crate::config::DetectionConfig;
use crate::scraper::outcome::PageIssue;
use scraper::{Html, Node, Selector};

/// Which CAPTCHA vendors were recognized on a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptchaReport {
    /// Vendor names, in configuration order
    pub kinds: Vec<String>,
    /// The indicators that matched
    pub indicators: Vec<String>,
}

impl CaptchaReport {
    pub fn present(&self) -> bool {
        !self.kinds.is_empty()
    }
}

/// Everything noticed about one page body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageAnalysis {
    pub bot_detected: bool,
    pub captcha: CaptchaReport,
    pub empty_content: bool,
    pub error_page: bool,
    pub timeout_page: bool,
    pub js_required: bool,
}

impl PageAnalysis {
    pub fn issues(&self) -> Vec<PageIssue> {
        let flags = [
            (self.bot_detected, PageIssue::BotDetected),
            (self.captcha.present(), PageIssue::CaptchaPresent),
            (self.empty_content, PageIssue::EmptyContent),
            (self.error_page, PageIssue::ErrorPage),
            (self.timeout_page, PageIssue::Timeout),
            (self.js_required, PageIssue::JsRequired),
        ];
        flags
            .into_iter()
            .filter_map(|(set, issue)| set.then_some(issue))
            .collect()
    }
}

/// Classifies page bodies against a set of indicator lists
#[derive(Debug, Clone)]
pub struct Detector {
    bot: Vec<String>,
    captcha: Vec<(String, Vec<String>)>,
    error: Vec<String>,
    timeout: Vec<String>,
    js_required: Vec<String>,
    min_content_length: usize,
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn any_match(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle.as_str()))
}

impl Detector {
    pub fn new(config: &DetectionConfig, min_content_length: usize) -> Self {
        Self {
            bot: lowercase_all(&config.bot_indicators),
            captcha: config
                .captcha_indicators
                .iter()
                .map(|(kind, indicators)| (kind.clone(), lowercase_all(indicators)))
                .collect(),
            error: lowercase_all(&config.error_indicators),
            timeout: lowercase_all(&config.timeout_indicators),
            js_required: lowercase_all(&config.js_required_indicators),
            min_content_length,
        }
    }

    /// True when the body looks like an anti-bot interstitial
    pub fn is_bot_detected(&self, html: &str) -> bool {
        any_match(&html.to_lowercase(), &self.bot)
    }

    pub fn captcha(&self, html: &str) -> CaptchaReport {
        self.captcha_lowercase(&html.to_lowercase())
    }

    fn captcha_lowercase(&self, lower: &str) -> CaptchaReport {
        let mut report = CaptchaReport::default();
        for (kind, indicators) in &self.captcha {
            let matched: Vec<&String> = indicators
                .iter()
                .filter(|ind| lower.contains(ind.as_str()))
                .collect();
            if !matched.is_empty() {
                report.kinds.push(kind.clone());
                report.indicators.extend(matched.into_iter().cloned());
            }
        }
        report
    }

    pub fn analyze(&self, html: &str) -> PageAnalysis {
        let lower = html.to_lowercase();

        PageAnalysis {
            bot_detected: any_match(&lower, &self.bot),
            captcha: self.captcha_lowercase(&lower),
            empty_content: html.trim().len() < self.min_content_length,
            error_page: any_match(&lower, &self.error),
            timeout_page: any_match(&lower, &self.timeout),
            js_required: any_match(&lower, &self.js_required)
                || self.noscript_shell(html),
        }
    }

    /// A page whose only readable text is a `<noscript>` plea for JavaScript
    fn noscript_shell(&self, html: &str) -> bool {
        let Ok(noscript) = Selector::parse("noscript") else {
            return false;
        };
        let document = Html::parse_document(html);

        let asks_for_js = document.select(&noscript).any(|element| {
            element
                .text()
                .collect::<String>()
                .to_lowercase()
                .contains("javascript")
        });

        asks_for_js && visible_text_len(&document) < self.min_content_length
    }
}

/// Length of text outside script, style and noscript elements
fn visible_text_len(document: &Html) -> usize {
    document
        .tree
        .nodes()
        .filter_map(|node| {
            let Node::Text(text) = node.value() else {
                return None;
            };
            let hidden = node
                .parent()
                .and_then(|parent| parent.value().as_element().map(|el| el.name()))
                .map(|name| matches!(name, "script" | "style" | "noscript"))
                .unwrap_or(false);
            (!hidden).then(|| text.trim().len())
        })
        .sum()
}

/// Text of the first `<title>` element, if any
pub fn extract_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}
