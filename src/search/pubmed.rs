
//! PubMed through NCBI E-utilities: `esearch` for PMIDs, `efetch` for record XML.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::Event;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::models::{BibliographicRecord, NOT_AVAILABLE};
use super::{LiteratureDatabase, SearchError};
use crate::core::config::PicosConfig;
use crate::utils::normalize_whitespace;

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}


pub struct PubMedClient {
    base_url: String,
    api_key: Option<String>,
    search_field: Option<String>,
    client: Client,
}

impl PubMedClient {

    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, SearchError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(
            "PubMed client initialized (url={}, api_key={})",
            base_url,
            api_key.is_some()
        );
        Ok(Self {
            base_url,
            api_key,
            search_field: None,
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()?,
        })
    }

    /// Restricts `esearch` to one field, e.g. `Title/Abstract`.
    #[must_use]
    pub fn with_search_field(mut self, field: Option<String>) -> Self {
        self.search_field = field.filter(|f| !f.trim().is_empty());
        self
    }


    pub fn from_config(config: &PicosConfig) -> Result<Self, SearchError> {
        Ok(
            Self::new(&config.pubmed_base_url, config.pubmed_api_key.clone(), config.timeout)?
                .with_search_field(config.search_field.clone()),
        )
    }

    fn with_key(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        params
    }

    async fn checked_text(response: Response) -> Result<String, SearchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: crate::safe_truncate(&body, 200),
            });
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl LiteratureDatabase for PubMedClient {
    async fn search_ids(
        &self,
        expression: &str,
        max_results: usize,
    ) -> Result<Vec<String>, SearchError> {
        let mut params = vec![
            ("db", "pubmed".to_string()),
            ("term", expression.to_string()),
            ("retmax", max_results.to_string()),
            ("retmode", "json".to_string()),
        ];
        if let Some(field) = &self.search_field {
            params.push(("field", field.clone()));
        }

        let response = self
            .client
            .get(format!("{}/esearch.fcgi", self.base_url))
            .query(&self.with_key(params))
            .send()
            .await?;

        let body = Self::checked_text(response).await?;
        let parsed: ESearchResponse = serde_json::from_str(&body)?;

        if let Some(error) = parsed.esearchresult.error {
            if parsed.esearchresult.idlist.is_empty() {
                return Err(SearchError::Service(error));
            }
            warn!("PubMed esearch reported: {}", error);
        }
        debug!(
            "PubMed esearch count={:?}, returned {} PMIDs",
            parsed.esearchresult.count,
            parsed.esearchresult.idlist.len()
        );

        Ok(parsed.esearchresult.idlist)
    }

    async fn fetch_records(&self, ids: &[String]) -> Result<Vec<BibliographicRecord>, SearchError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let params = vec![
            ("db", "pubmed".to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ];

        let response = self
            .client
            .get(format!("{}/efetch.fcgi", self.base_url))
            .query(&self.with_key(params))
            .send()
            .await?;

        let xml = Self::checked_text(response).await?;
        parse_pubmed_xml(&xml)
    }

    fn database_name(&self) -> &str {
        "pubmed"
    }
}

#[derive(Default)]
struct ArticleFields {
    pmid: Option<String>,
    title: String,
    authors: Vec<String>,
    history_year: Option<String>,
    issue_year: Option<String>,
    journal: Option<String>,
}

impl ArticleFields {
    fn finish(self) -> Option<BibliographicRecord> {
        let title = normalize_whitespace(&self.title);
        if title.is_empty() {
            warn!("Skipping PubMed article {:?} with empty title", self.pmid);
            return None;
        }

        Some(BibliographicRecord {
            pmid: self.pmid.unwrap_or_default(),
            title,
            authors: self.authors,
            year: self
                .history_year
                .or(self.issue_year)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            journal: self.journal.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        })
    }
}

#[derive(Default)]
struct AuthorFields {
    last: Option<String>,
    fore: Option<String>,
    initials: Option<String>,
    collective: Option<String>,
}

impl AuthorFields {
    /// `Fore Last`, else `Last Initials`, else the collective name, else nothing.
    fn display_name(self) -> Option<String> {
        match (self.last, self.fore, self.initials, self.collective) {
            (Some(last), Some(fore), _, _) => Some(format!("{fore} {last}")),
            (Some(last), None, Some(initials), _) => Some(format!("{last} {initials}")),
            (_, _, _, Some(collective)) => Some(collective),
            _ => None,
        }
    }
}

fn parent_is(path: &[Vec<u8>], name: &[u8]) -> bool {
    path.len() >= 2 && path[path.len() - 2] == name
}

/// Parses an `efetch` `PubmedArticleSet` document.
pub fn parse_pubmed_xml(xml: &str) -> Result<Vec<BibliographicRecord>, SearchError> {
    let mut reader = Reader::from_str(xml);
    let mut records = Vec::new();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut article: Option<ArticleFields> = None;
    let mut author: Option<AuthorFields> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => {
                return Err(SearchError::Xml(format!(
                    "{} at byte {}",
                    e,
                    reader.buffer_position()
                )));
            }
            Ok(Event::Start(ref e)) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"PubmedArticle" => article = Some(ArticleFields::default()),
                    b"Author" => author = Some(AuthorFields::default()),
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::End(ref e)) => {
                match e.name().as_ref() {
                    b"Author" => {
                        if let (Some(a), Some(fields)) = (article.as_mut(), author.take()) {
                            if let Some(name) = fields.display_name() {
                                a.authors.push(name);
                            }
                        }
                    }
                    b"PubmedArticle" => {
                        if let Some(record) = article.take().and_then(ArticleFields::finish) {
                            records.push(record);
                        }
                    }
                    _ => {}
                }
                path.pop();
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| SearchError::Xml(err.to_string()))?;
                apply_text(&path, &text, article.as_mut(), author.as_mut());
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e).into_owned();
                apply_text(&path, &text, article.as_mut(), author.as_mut());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
        }
        buf.clear();
    }

    debug!("Parsed {} PubMed records", records.len());
    Ok(records)
}

fn apply_text(
    path: &[Vec<u8>],
    text: &str,
    article: Option<&mut ArticleFields>,
    author: Option<&mut AuthorFields>,
) {
    let Some(article) = article else {
        return;
    };
    let Some(current) = path.last() else {
        return;
    };

    // Inline markup (<i>, <sup>) inside the title arrives as separate text events.
    if path.iter().any(|n| n == b"ArticleTitle") {
        article.title.push_str(text);
        return;
    }

    let value = text.trim();
    if value.is_empty() {
        return;
    }

    match current.as_slice() {
        b"PMID" if parent_is(path, b"MedlineCitation") && article.pmid.is_none() => {
            article.pmid = Some(value.to_string());
        }
        b"Year" if parent_is(path, b"PubMedPubDate") && article.history_year.is_none() => {
            article.history_year = Some(value.to_string());
        }
        b"Year" if parent_is(path, b"PubDate") && article.issue_year.is_none() => {
            article.issue_year = Some(value.to_string());
        }
        b"Title" if parent_is(path, b"Journal") && article.journal.is_none() => {
            article.journal = Some(value.to_string());
        }
        b"LastName" | b"ForeName" | b"Initials" | b"CollectiveName" => {
            if let Some(author) = author {
                let slot = match current.as_slice() {
                    b"LastName" => &mut author.last,
                    b"ForeName" => &mut author.fore,
                    b"Initials" => &mut author.initials,
                    _ => &mut author.collective,
                };
                slot.get_or_insert_with(String::new).push_str(value);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" ?>
<!DOCTYPE PubmedArticleSet PUBLIC "-//NLM//DTD PubMedArticle, 1st January 2024//EN" "https://dtd.nlm.nih.gov/ncbi/pubmed/out/pubmed_240101.dtd">
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation Status="MEDLINE" Owner="NLM">
      <PMID Version="1">31234567</PMID>
      <Article PubModel="Print">
        <Journal>
          <JournalIssue CitedMedium="Internet">
            <PubDate><Year>2019</Year><Month>Jun</Month></PubDate>
          </JournalIssue>
          <Title>Critical care medicine</Title>
        </Journal>
        <ArticleTitle>Early mobilization and <i>delirium</i> in the ICU &amp; beyond.</ArticleTitle>
        <AuthorList CompleteYN="Y">
          <Author ValidYN="Y"><LastName>Schweickert</LastName><ForeName>William D</ForeName><Initials>WD</Initials></Author>
          <Author ValidYN="Y"><CollectiveName>ICU Delirium Study Group</CollectiveName></Author>
          <Author ValidYN="Y"><LastName>Pohlman</LastName><Initials>MC</Initials></Author>
          <Author ValidYN="Y"><AffiliationInfo><Affiliation>Nowhere</Affiliation></AffiliationInfo></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
    <PubmedData>
      <History>
        <PubMedPubDate PubStatus="received"><Year>2018</Year><Month>10</Month></PubMedPubDate>
        <PubMedPubDate PubStatus="pubmed"><Year>2019</Year></PubMedPubDate>
      </History>
      <ReferenceList><Reference><ArticleIdList><ArticleId IdType="pubmed">111</ArticleId></ArticleIdList></Reference></ReferenceList>
    </PubmedData>
  </PubmedArticle>
  <PubmedArticle>
    <MedlineCitation>
      <PMID>30000001</PMID>
      <Article>
        <Journal><Title>Intensive care medicine</Title></Journal>
        <ArticleTitle>Mobility protocols: a survey</ArticleTitle>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_parse_full_record() {
        let records = parse_pubmed_xml(SAMPLE_XML).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.pmid, "31234567");
        assert_eq!(first.title, "Early mobilization and delirium in the ICU & beyond.");
        assert_eq!(
            first.authors,
            vec![
                "William D Schweickert".to_string(),
                "ICU Delirium Study Group".to_string(),
                "Pohlman MC".to_string(),
            ]
        );
        assert_eq!(first.year, "2018");
        assert_eq!(first.journal, "Critical care medicine");
    }

    #[test]
    fn test_missing_year_and_authors() {
        let records = parse_pubmed_xml(SAMPLE_XML).unwrap();
        let second = &records[1];
        assert_eq!(second.year, NOT_AVAILABLE);
        assert!(second.authors.is_empty());
        assert_eq!(second.journal, "Intensive care medicine");
    }

    #[test]
    fn test_issue_year_used_without_history() {
        let xml = r#"<PubmedArticleSet><PubmedArticle><MedlineCitation><PMID>1</PMID><Article>
            <Journal><JournalIssue><PubDate><Year>2021</Year></PubDate></JournalIssue><Title>BMJ</Title></Journal>
            <ArticleTitle>Title</ArticleTitle></Article></MedlineCitation></PubmedArticle></PubmedArticleSet>"#;
        let records = parse_pubmed_xml(xml).unwrap();
        assert_eq!(records[0].year, "2021");
    }

    #[test]
    fn test_malformed_xml_is_error() {
        let xml = "<PubmedArticleSet><PubmedArticle><ArticleTitle>x</Article></PubmedArticleSet>";
        assert!(matches!(parse_pubmed_xml(xml), Err(SearchError::Xml(_))));
    }

    #[tokio::test]
    async fn test_search_ids_and_fetch() {
        let mut server = Server::new_async().await;
        let esearch = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("db".to_string(), "pubmed".to_string()),
                Matcher::UrlEncoded("term".to_string(), "(O: delirium)".to_string()),
                Matcher::UrlEncoded("retmax".to_string(), "5".to_string()),
                Matcher::UrlEncoded("field".to_string(), "Title/Abstract".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "header": {"type": "esearch", "version": "0.3"},
                    "esearchresult": {"count": "2", "retmax": "2", "idlist": ["31234567", "30000001"]}
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let efetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("id".to_string(), "31234567,30000001".to_string()),
                Matcher::UrlEncoded("retmode".to_string(), "xml".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "text/xml")
            .with_body(SAMPLE_XML)
            .expect(1)
            .create_async()
            .await;

        let client = PubMedClient::new(server.url(), None, 5)
            .unwrap()
            .with_search_field(Some("Title/Abstract".to_string()));

        let ids = client.search_ids("(O: delirium)", 5).await.unwrap();
        assert_eq!(ids, vec!["31234567", "30000001"]);

        let records = client.fetch_records(&ids).await.unwrap();
        assert_eq!(records.len(), 2);

        esearch.assert_async().await;
        efetch.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_zero_hits() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"esearchresult": {"count": "0", "retmax": "0", "idlist": []}}).to_string())
            .create_async()
            .await;

        let client = PubMedClient::new(server.url(), None, 5).unwrap();
        let ids = client.search_ids("(P: nonexistent cohort)", 10).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn test_search_reported_error_without_ids() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!({"esearchresult": {"ERROR": "Invalid query syntax", "idlist": []}}).to_string(),
            )
            .create_async()
            .await;

        let client = PubMedClient::new(server.url(), None, 5).unwrap();
        let err = client.search_ids("(P: ((broken", 10).await.unwrap_err();
        assert!(matches!(err, SearchError::Service(msg) if msg == "Invalid query syntax"));
    }

    #[tokio::test]
    async fn test_search_status_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("API rate limit exceeded")
            .create_async()
            .await;

        let client = PubMedClient::new(server.url(), Some("key".to_string()), 5).unwrap();
        let err = client.search_ids("(O: delirium)", 10).await.unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 429, .. }));
    }
}
