//! Knowledge and location lookup
//!
//! Runs a Wikipedia search (Action API for titles, REST API for the page
//! summary) and a Nominatim geocode of the same query concurrently. The
//! geocode is the only in-plan source of coordinates, so a later `weather`
//! capability reads `latitude`/`longitude` from this payload.

use async_trait::async_trait;
use reqwest::{Client, Url};
use sdk::capability::{Capability, CapabilityContext};
use sdk::errors::EngineError;
use sdk::types::{CapabilityResult, PriorResults};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::network_error;

const NAME: &str = "search";
const MAX_SEARCH_RESULTS: usize = 3;

/// Words that frame a request rather than name its subject
const FILLER_WORDS: &[&str] = &[
    "a", "about", "an", "at", "can", "current", "currently", "do", "for", "forecast", "how",
    "in", "is", "it", "know", "like", "look", "me", "near", "of", "please", "search", "show",
    "tell", "the", "today", "tomorrow", "up", "weather", "what", "what's", "whats", "where",
    "who", "you",
];

pub struct SearchCapability {
    client: Client,
    wikipedia_base_url: String,
    nominatim_base_url: String,
}

#[derive(Debug, Deserialize)]
struct ActionSearchResponse {
    query: Option<ActionSearchQuery>,
}

#[derive(Debug, Deserialize)]
struct ActionSearchQuery {
    #[serde(default)]
    search: Vec<ActionSearchHit>,
}

#[derive(Debug, Deserialize)]
struct ActionSearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageSummary {
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(rename = "type", default)]
    page_type: String,
    content_urls: Option<ContentUrls>,
}

#[derive(Debug, Deserialize)]
struct ContentUrls {
    desktop: Option<PageUrl>,
}

#[derive(Debug, Deserialize)]
struct PageUrl {
    page: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug)]
struct Article {
    title: String,
    summary: String,
    url: Option<String>,
    search_results: Vec<String>,
}

#[derive(Debug)]
struct Place {
    latitude: f64,
    longitude: f64,
    display_name: String,
}

impl SearchCapability {
    pub fn new(client: Client, wikipedia_base_url: &str, nominatim_base_url: &str) -> Self {
        Self {
            client,
            wikipedia_base_url: wikipedia_base_url.trim_end_matches('/').to_string(),
            nominatim_base_url: nominatim_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Wikipedia article for the query: first non-disambiguation hit
    async fn lookup_article(&self, query: &str) -> Result<Option<Article>, EngineError> {
        let url = format!("{}/w/api.php", self.wikipedia_base_url);
        let limit = MAX_SEARCH_RESULTS.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(EngineError::capability(
                NAME,
                format!("Wikipedia search returned {}", response.status()),
            ));
        }

        let body: ActionSearchResponse = response
            .json()
            .await
            .map_err(|e| EngineError::capability(NAME, format!("bad Wikipedia response: {}", e)))?;
        let titles: Vec<String> = body
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default();

        for title in &titles {
            match self.page_summary(title).await? {
                Some(page) if page.page_type != "disambiguation" && !page.extract.is_empty() => {
                    return Ok(Some(Article {
                        title: page.title,
                        summary: page.extract,
                        url: page.content_urls.and_then(|u| u.desktop).map(|d| d.page),
                        search_results: titles.clone(),
                    }));
                }
                _ => tracing::debug!("Skipping Wikipedia page '{}'", title),
            }
        }

        Ok(None)
    }

    async fn page_summary(&self, title: &str) -> Result<Option<PageSummary>, EngineError> {
        let segment = title.replace(' ', "_");
        let mut url = Url::parse(&self.wikipedia_base_url)
            .map_err(|e| EngineError::capability(NAME, format!("bad Wikipedia URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| EngineError::capability(NAME, "Wikipedia URL cannot be a base"))?
            .pop_if_empty()
            .extend(["api", "rest_v1", "page", "summary", segment.as_str()]);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EngineError::capability(
                NAME,
                format!("Wikipedia summary returned {}", response.status()),
            ));
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(|e| EngineError::capability(NAME, format!("bad summary response: {}", e)))
    }

    async fn geocode(&self, query: &str) -> Result<Option<Place>, EngineError> {
        let url = format!("{}/search", self.nominatim_base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| network_error(NAME, e))?;

        if !response.status().is_success() {
            return Err(EngineError::capability(
                NAME,
                format!("Nominatim returned {}", response.status()),
            ));
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .map_err(|e| EngineError::capability(NAME, format!("bad Nominatim response: {}", e)))?;

        Ok(places.into_iter().next().and_then(|place| {
            Some(Place {
                latitude: place.lat.trim().parse().ok()?,
                longitude: place.lon.trim().parse().ok()?,
                display_name: place.display_name,
            })
        }))
    }
}

/// Reduce a request to its subject: "what's the weather in Paris?" -> "Paris"
pub fn subject_query(input: &str) -> String {
    let words: Vec<&str> = input
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation() && c != '\'' && c != '-'))
        .filter(|w| !w.is_empty())
        .filter(|w| !FILLER_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();

    if words.is_empty() {
        input.trim().to_string()
    } else {
        words.join(" ")
    }
}

#[async_trait]
impl Capability for SearchCapability {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Wikipedia lookup plus geocoding; the only source of latitude/longitude for a place"
    }

    async fn invoke(
        &self,
        _ctx: &CapabilityContext,
        input: &str,
        _prior: &PriorResults,
    ) -> Result<CapabilityResult, EngineError> {
        let query = subject_query(input);
        tracing::info!("Searching for '{}'", query);

        let (article, place) = tokio::join!(self.lookup_article(&query), self.geocode(&query));

        let mut errors = Vec::new();
        let article = article.unwrap_or_else(|e| {
            tracing::warn!("Wikipedia lookup failed: {}", e);
            errors.push(e.to_string());
            None
        });
        let place = place.unwrap_or_else(|e| {
            tracing::warn!("Geocoding failed: {}", e);
            errors.push(e.to_string());
            None
        });

        if article.is_none() && place.is_none() {
            let error = if errors.is_empty() {
                format!("no results for '{}'", query)
            } else {
                errors.join("; ")
            };
            return Ok(CapabilityResult::failure(NAME, error).with_diagnostic("query", query));
        }

        let mut payload = Map::new();
        payload.insert("query".to_string(), json!(query));
        if let Some(article) = article {
            payload.insert("title".to_string(), json!(article.title));
            payload.insert("summary".to_string(), json!(article.summary));
            payload.insert(
                "url".to_string(),
                article.url.map(Value::String).unwrap_or(Value::Null),
            );
            payload.insert("search_results".to_string(), json!(article.search_results));
        }
        if let Some(place) = place {
            payload.insert("latitude".to_string(), json!(place.latitude));
            payload.insert("longitude".to_string(), json!(place.longitude));
            payload.insert("display_name".to_string(), json!(place.display_name));
        }

        Ok(CapabilityResult::success(NAME, payload))
    }
}
