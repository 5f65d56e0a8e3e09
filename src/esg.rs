//! Earth System Grid Federation queries
//!
//! ESGF gateways expose a search service that answers either with a Solr
//! JSON document (`esg-search/search`) or with a ready-to-run wget script
//! (`esg-search/wget`). Queries are plain `key=value` pairs; repeating a key
//! ORs its values. Useful keys include `project` (CMIP5), `experiment`,
//! `model`, `ensemble`, `realm`, `time_frequency`, `variable`, `product`,
//! and the temporal bounds `start`/`end` (`YYYY-MM-DDTHH:mm:ssZ`).
//!
//! A constraint on the start of the data becomes an upper bound on the
//! dataset stop date, and a constraint on the end becomes a lower bound on
//! its start date.

use crate::errors::{Cmip5Error, Result};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use url::Url;

/// Gateway queried when no other node is configured
pub const DEFAULT_ESG_NODE: &str = "http://pcmdi9.llnl.gov/";

/// Environment variable overriding [`DEFAULT_ESG_NODE`] on the command line
pub const ESG_NODE_ENV: &str = "CMIP5_ESG_NODE";

/// Kind of request sent to the search service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Dataset search returning Solr JSON
    Search,
    /// Aggregation search; most gateways return nothing useful for it
    Aggregation,
    /// wget download script for the matching files
    Wget,
}

impl QueryKind {
    pub const fn endpoint(self) -> &'static str {
        match self {
            Self::Search | Self::Aggregation => "esg-search/search",
            Self::Wget => "esg-search/wget",
        }
    }

    fn defaults(self) -> Vec<(&'static str, &'static str)> {
        let mut defaults = vec![("latest", "true"), ("replica", "false")];
        match self {
            Self::Search => {
                defaults.push(("type", "Dataset"));
                defaults.push(("format", "application/solr+json"));
            }
            Self::Aggregation => defaults.push(("type", "Aggregation")),
            Self::Wget => {}
        }
        defaults
    }
}

/// Ordered set of search criteria
#[derive(Debug, Clone, PartialEq)]
pub struct EsgQuery {
    kind: QueryKind,
    criteria: Vec<(String, Vec<String>)>,
}

impl EsgQuery {
    /// Query pre-filled with the defaults of its kind
    pub fn new(kind: QueryKind) -> Self {
        let criteria = kind
            .defaults()
            .into_iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect();
        Self { kind, criteria }
    }

    pub fn search() -> Self {
        Self::new(QueryKind::Search)
    }

    pub fn aggregation() -> Self {
        Self::new(QueryKind::Aggregation)
    }

    pub fn wget() -> Self {
        Self::new(QueryKind::Wget)
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Same criteria, sent to another endpoint
    pub fn with_kind(mut self, kind: QueryKind) -> Self {
        self.kind = kind;
        self
    }

    /// Restrict to the latest version (`true`) or include older ones
    pub fn latest(self, latest: bool) -> Self {
        self.constrain("latest", bool_str(latest))
    }

    /// Restrict to replicas (`true`) or to master records (`false`)
    pub fn replica(self, replica: bool) -> Self {
        self.constrain("replica", bool_str(replica))
    }

    /// Set a single-valued criterion, replacing any previous value for `key`
    pub fn constrain(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.constrain_any(key, [value.into()])
    }

    /// Set an OR criterion, replacing any previous values for `key`
    pub fn constrain_any<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        match self.criteria.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = values,
            None => self.criteria.push((key, values)),
        }
        self
    }

    /// Values currently set for `key`
    pub fn values(&self, key: &str) -> Option<&[String]> {
        self.criteria
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// Flattened `key=value` pairs in insertion order
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.criteria
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// Full request URL against `node`
    pub fn url(&self, node: &str) -> Result<Url> {
        let base = node_url(node)?;
        let mut url = base.join(self.kind.endpoint())?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in self.pairs() {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Parse a node URL, making sure relative joins stay below its path
fn node_url(node: &str) -> Result<Url> {
    if node.ends_with('/') {
        Ok(Url::parse(node)?)
    } else {
        Ok(Url::parse(&format!("{}/", node))?)
    }
}

/// Parse a command-line criterion `key=value[,value...]`
pub fn parse_criterion(s: &str) -> Result<(String, Vec<String>)> {
    let invalid = || Cmip5Error::InvalidCriterion {
        criterion: s.to_string(),
    };
    let (key, values) = s.split_once('=').ok_or_else(invalid)?;
    let key = key.trim();
    let values: Vec<String> = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    if key.is_empty() || values.is_empty() {
        return Err(invalid());
    }
    Ok((key.to_string(), values))
}

/// Remove from a wget script every file lying entirely outside `[start, end)`.
///
/// Bounds are `YYYYMM`. A file with period `fstart-fend` is dropped when
/// `fend <= start` or `fstart >= end`. Lines that are not file entries are
/// kept verbatim.
pub fn prune_wget(script: &str, start: Option<&str>, end: Option<&str>) -> Result<String> {
    let start = parse_yyyymm(start.unwrap_or("000000"))?;
    let end = parse_yyyymm(end.unwrap_or("999999"))?;
    let pattern = Regex::new(r"^'\w+_\w+_.+_\w+_\w+_([0-9]{6})-([0-9]{6})\.nc' ")
        .map_err(|e| Cmip5Error::Generic(format!("wget line pattern: {}", e)))?;

    let mut kept = Vec::new();
    let mut dropped = 0usize;
    for line in script.lines() {
        if let Some(caps) = pattern.captures(line) {
            let fstart = parse_yyyymm(&caps[1])?;
            let fend = parse_yyyymm(&caps[2])?;
            if fend <= start || fstart >= end {
                dropped += 1;
                continue;
            }
            tracing::debug!(fstart, fend, "keeping wget entry");
        }
        kept.push(line);
    }

    tracing::info!(dropped, "pruned wget script");
    Ok(kept.join("\n"))
}

fn parse_yyyymm(s: &str) -> Result<u32> {
    if s.len() != 6 || !s.chars().all(|c| c.is_ascii_digit()) {
        return Err(Cmip5Error::InvalidPeriod {
            period: s.to_string(),
            reason: "expected YYYYMM".to_string(),
        });
    }
    s.parse().map_err(|_| Cmip5Error::InvalidPeriod {
        period: s.to_string(),
        reason: "expected YYYYMM".to_string(),
    })
}

/// Dataset search results
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<JsonValue>,
}

impl SearchResponse {
    /// Dataset identifiers of the returned documents
    pub fn ids(&self) -> Vec<&str> {
        self.docs
            .iter()
            .filter_map(|doc| doc.get("id").and_then(JsonValue::as_str))
            .collect()
    }
}

#[derive(Deserialize)]
struct SolrEnvelope {
    response: SearchResponse,
}

/// HTTP client for one ESGF gateway
#[derive(Debug, Clone)]
pub struct EsgClient {
    http: Client,
    node: String,
}

impl EsgClient {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            node: node.into(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Run a dataset search and decode the Solr JSON answer
    pub async fn search(&self, query: &EsgQuery) -> Result<SearchResponse> {
        let query = match query.kind() {
            QueryKind::Wget => query.clone().with_kind(QueryKind::Search),
            _ => query.clone(),
        }
        .constrain("format", "application/solr+json");
        let body = self.fetch(&query).await?;
        let envelope: SolrEnvelope = serde_json::from_str(&body)?;
        tracing::info!(found = envelope.response.num_found, "ESGF search complete");
        Ok(envelope.response)
    }

    /// Download the wget script for the files matching `query`
    pub async fn wget_script(&self, query: &EsgQuery) -> Result<String> {
        let query = query.clone().with_kind(QueryKind::Wget);
        self.fetch(&query).await
    }

    async fn fetch(&self, query: &EsgQuery) -> Result<String> {
        let url = query.url(&self.node)?;
        tracing::debug!(%url, "querying ESGF node");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Cmip5Error::EsgStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_url_carries_defaults_and_criteria() {
        let url = EsgQuery::search()
            .constrain("project", "CMIP5")
            .constrain("variable", "tas")
            .url(DEFAULT_ESG_NODE)
            .unwrap();
        assert_eq!(url.path(), "/esg-search/search");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("latest".to_string(), "true".to_string()),
                ("replica".to_string(), "false".to_string()),
                ("type".to_string(), "Dataset".to_string()),
                ("format".to_string(), "application/solr+json".to_string()),
                ("project".to_string(), "CMIP5".to_string()),
                ("variable".to_string(), "tas".to_string()),
            ]
        );
    }

    #[test]
    fn user_values_override_defaults() {
        let query = EsgQuery::wget().latest(false).replica(true);
        assert_eq!(query.values("latest"), Some(&["false".to_string()][..]));
        assert_eq!(query.values("replica"), Some(&["true".to_string()][..]));
        assert_eq!(query.values("type"), None);
    }

    #[test]
    fn list_values_repeat_the_key() {
        let url = EsgQuery::wget()
            .constrain_any("experiment", ["rcp45", "rcp85"])
            .url("http://example.org/gateway")
            .unwrap();
        assert_eq!(url.path(), "/gateway/esg-search/wget");
        let experiments: Vec<String> = url
            .query_pairs()
            .filter(|(k, _)| k == "experiment")
            .map(|(_, v)| v.into_owned())
            .collect();
        assert_eq!(experiments, vec!["rcp45", "rcp85"]);
    }

    #[test]
    fn aggregation_uses_search_endpoint() {
        let query = EsgQuery::aggregation();
        assert_eq!(query.kind().endpoint(), "esg-search/search");
        assert_eq!(query.values("type"), Some(&["Aggregation".to_string()][..]));
        assert_eq!(query.values("format"), None);
    }

    #[test]
    fn parses_criteria() {
        assert_eq!(
            parse_criterion("experiment=rcp45,rcp85").unwrap(),
            ("experiment".to_string(), vec!["rcp45".to_string(), "rcp85".to_string()])
        );
        assert!(parse_criterion("experiment").is_err());
        assert!(parse_criterion("=rcp45").is_err());
        assert!(parse_criterion("experiment=").is_err());
    }

    #[test]
    fn prune_wget_drops_files_outside_window() {
        let script = [
            "#!/bin/bash",
            "download_files=\"$(cat <<EOF--dataset.file.url.chksum_type.chksum",
            "'tas_Amon_CCSM4_rcp85_r1i1p1_200601-205012.nc' 'http://host/a.nc' 'MD5' 'x'",
            "'tas_Amon_CCSM4_rcp85_r1i1p1_205101-210012.nc' 'http://host/b.nc' 'MD5' 'y'",
            "'tas_Amon_CCSM4_rcp85_r1i1p1_210101-230012.nc' 'http://host/c.nc' 'MD5' 'z'",
            "EOF--dataset.file.url.chksum_type.chksum",
        ]
        .join("\n");

        let pruned = prune_wget(&script, Some("205101"), Some("210101")).unwrap();
        assert!(!pruned.contains("200601-205012"));
        assert!(pruned.contains("205101-210012"));
        assert!(!pruned.contains("210101-230012"));
        assert!(pruned.starts_with("#!/bin/bash"));
        assert!(pruned.ends_with("EOF--dataset.file.url.chksum_type.chksum"));

        let untouched = prune_wget(&script, None, None).unwrap();
        assert_eq!(untouched, script);

        assert!(prune_wget(&script, Some("2051"), None).is_err());
    }

    #[test]
    fn prune_wget_keeps_lines_with_non_ascii_digits() {
        let line = "'tas_Amon_CCSM4_rcp85_r1i1p1_٢٠٠٦٠١-٢٠٥٠١٢.nc' 'http://host/a.nc' 'MD5' 'x'";
        let pruned = prune_wget(line, Some("205101"), Some("210101")).unwrap();
        assert_eq!(pruned, line);
    }

    #[test]
    fn search_response_ids() {
        let body = r#"{"response": {"numFound": 2, "docs": [{"id": "a"}, {"id": "b"}]}}"#;
        let envelope: SolrEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.response.num_found, 2);
        assert_eq!(envelope.response.ids(), vec!["a", "b"]);
    }
}
