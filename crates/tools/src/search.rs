//! Search backend URL building and response decoding.
//!
//! The backend is queried with `format=json`; Chrome renders the JSON body
//! inside a single `<pre>` block, which is what gets decoded here.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use webtools_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RawSearchResult>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSearchResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// `<base>/search?q=<query>&format=json`
pub fn build_search_url(base_url: &str, query: &str) -> String {
    format!(
        "{}/search?q={}&format=json",
        base_url.trim_end_matches('/'),
        urlencoding::encode(query)
    )
}

/// Decode a rendered backend page into at most `max_results` results.
pub fn parse_search_page(html: &str, max_results: usize) -> Result<Vec<SearchResult>> {
    let document = Html::parse_document(html);
    let pre = Selector::parse("pre").map_err(|e| Error::Other(format!("Invalid selector: {:?}", e)))?;

    let block = document
        .select(&pre)
        .next()
        .ok_or_else(|| Error::NotFound("No <pre> block in search response".to_string()))?;
    let body: String = block.text().collect();

    decode_search_results(&body, max_results)
}

/// Decode the backend JSON. The first `max_results` entries are taken in
/// backend order, then entries without a title or url are dropped.
pub fn decode_search_results(json: &str, max_results: usize) -> Result<Vec<SearchResult>> {
    let response: SearchResponse = serde_json::from_str(json)?;

    Ok(response
        .results
        .into_iter()
        .take(max_results)
        .filter_map(|raw| {
            let title = raw.title.filter(|t| !t.is_empty())?;
            let url = raw.url.filter(|u| !u.is_empty())?;
            Some(SearchResult {
                title,
                url,
                snippet: raw.content.unwrap_or_default(),
            })
        })
        .collect())
}
