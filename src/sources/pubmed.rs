//! PubMed literature source using the NCBI E-utilities API.

use async_trait::async_trait;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use serde::Deserialize;
use serde_json::Value;

use crate::client::{ApiClient, ApiKey};
use crate::models::{join_or_na, ApiRequest, RawRecord, SearchQuery};
use crate::sources::{Source, SourceError};
use crate::utils::{collapse_whitespace, HttpClient, RetryPolicy};

/// PubMed E-utilities API base URL
pub const PUBMED_API_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// PubMed literature source
///
/// Searches with `esearch` (JSON id list) and then fetches the articles in
/// one `efetch` call (PubMed XML).
#[derive(Debug, Clone)]
pub struct PubMedSource {
    client: ApiClient,
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: ESearchResult,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedArticleSet {
    #[serde(rename = "PubmedArticle", default)]
    articles: Vec<PubmedArticle>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedArticle {
    MedlineCitation: Option<MedlineCitation>,
    PubmedData: Option<PubmedData>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct MedlineCitation {
    PMID: Option<TextNode>,
    Article: Option<Article>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Article {
    Journal: Option<Journal>,
    ArticleTitle: Option<TextNode>,
    Abstract: Option<Abstract>,
    AuthorList: Option<AuthorList>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Journal {
    JournalIssue: Option<JournalIssue>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct JournalIssue {
    PubDate: Option<PubDate>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubDate {
    Year: Option<String>,
    Month: Option<String>,
    Day: Option<String>,
    MedlineDate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Abstract {
    #[serde(rename = "AbstractText", default)]
    abstract_texts: Vec<AbstractText>,
    CopyrightInformation: Option<TextNode>,
}

#[derive(Debug, Deserialize)]
struct AbstractText {
    #[serde(rename = "@Label")]
    label: Option<String>,
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct AuthorList {
    #[serde(rename = "Author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Author {
    LastName: Option<String>,
    ForeName: Option<String>,
    CollectiveName: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct PubmedData {
    ArticleIdList: Option<ArticleIdList>,
}

#[derive(Debug, Deserialize)]
struct ArticleIdList {
    #[serde(rename = "ArticleId", default)]
    ids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    #[serde(rename = "@IdType")]
    id_type: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

impl PubMedSource {
    /// Create a source; the API key raises NCBI's rate limit but is optional
    pub fn new(http: HttpClient, base_url: &str, api_key: Option<String>) -> Self {
        let client = ApiClient::new(http, base_url)
            .with_optional_api_key(api_key.map(|key| ApiKey::query("api_key", key)));
        Self::with_client(client)
    }

    /// Create with a preconfigured API client (for testing)
    pub fn with_client(client: ApiClient) -> Self {
        Self { client }
    }

    /// Replace the retry policy used for every request of this source
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.client = self.client.with_retry(retry);
        self
    }

    fn build_search_request(query: &SearchQuery) -> ApiRequest {
        ApiRequest::get("esearch.fcgi")
            .param("db", "pubmed")
            .param("term", &query.query)
            .param("retmax", query.max_results)
            .param("retmode", "json")
            .param("sort", "relevance")
    }

    fn build_fetch_request(ids: &[String]) -> ApiRequest {
        ApiRequest::get("efetch.fcgi")
            .param("db", "pubmed")
            .param("id", ids.join(","))
            .param("retmode", "xml")
    }

    fn parse_search_response(value: Value) -> Result<Vec<String>, SourceError> {
        let response: ESearchResponse = serde_json::from_value(value)?;
        Ok(response.esearchresult.idlist)
    }

    /// Drop inline markup (`<i>`, `<sup>`, `<sub>`...) inside title, abstract
    /// and copyright nodes, keeping their text in place.
    fn flatten_inline_markup(xml: &str) -> Result<String, SourceError> {
        let mut reader = Reader::from_str(xml);
        let mut writer = Writer::new(Vec::with_capacity(xml.len()));
        // Element depth below the enclosing text node; 0 outside one
        let mut depth = 0usize;

        loop {
            let event = reader.read_event().map_err(|e| {
                SourceError::Decode(format!("Failed to read PubMed fetch XML: {}", e))
            })?;

            match &event {
                Event::Eof => break,
                Event::Start(_) if depth > 0 => {
                    depth += 1;
                    continue;
                }
                Event::Empty(_) if depth > 0 => continue,
                Event::End(_) if depth > 1 => {
                    depth -= 1;
                    continue;
                }
                Event::End(_) if depth == 1 => depth = 0,
                Event::Start(start)
                    if matches!(
                        start.name().as_ref(),
                        b"ArticleTitle" | b"AbstractText" | b"CopyrightInformation"
                    ) =>
                {
                    depth = 1
                }
                _ => {}
            }

            writer
                .write_event(event)
                .map_err(|e| SourceError::Decode(format!("Failed to rewrite PubMed fetch XML: {}", e)))?;
        }

        String::from_utf8(writer.into_inner())
            .map_err(|e| SourceError::Decode(format!("PubMed fetch XML is not UTF-8: {}", e)))
    }

    /// Parse efetch XML into one record per article
    fn parse_fetch_response(xml: &str) -> Result<Vec<RawRecord>, SourceError> {
        let xml = Self::flatten_inline_markup(xml)?;
        let result: PubmedArticleSet = from_str(&xml)
            .map_err(|e| SourceError::Decode(format!("Failed to parse PubMed fetch XML: {}", e)))?;

        Ok(result.articles.into_iter().map(Self::article_record).collect())
    }

    fn article_record(article: PubmedArticle) -> RawRecord {
        let citation = article.MedlineCitation;
        let details = citation.as_ref().and_then(|m| m.Article.as_ref());

        let pmid = citation
            .as_ref()
            .and_then(|m| m.PMID.as_ref())
            .map(|p| p.text.trim().to_string())
            .unwrap_or_default();

        let title = details
            .and_then(|a| a.ArticleTitle.as_ref())
            .map(|t| collapse_whitespace(&t.text))
            .unwrap_or_default();

        let authors: Vec<Value> = details
            .and_then(|a| a.AuthorList.as_ref())
            .map(|list| {
                list.authors
                    .iter()
                    .filter_map(|author| match &author.CollectiveName {
                        Some(collective) => Some(collective.clone()),
                        None => {
                            let name = format!(
                                "{} {}",
                                author.ForeName.as_deref().unwrap_or(""),
                                author.LastName.as_deref().unwrap_or("")
                            );
                            let name = name.trim();
                            (!name.is_empty()).then(|| name.to_string())
                        }
                    })
                    .map(Value::String)
                    .collect()
            })
            .unwrap_or_default();

        let summary = details
            .and_then(|a| a.Abstract.as_ref())
            .map(|ab| {
                ab.abstract_texts
                    .iter()
                    .map(|section| match &section.label {
                        Some(label) => format!("{}: {}", label, collapse_whitespace(&section.text)),
                        None => collapse_whitespace(&section.text),
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();

        let copyright = details
            .and_then(|a| a.Abstract.as_ref())
            .and_then(|ab| ab.CopyrightInformation.as_ref())
            .map(|c| collapse_whitespace(&c.text))
            .unwrap_or_default();

        let published = details
            .and_then(|a| a.Journal.as_ref())
            .and_then(|j| j.JournalIssue.as_ref())
            .and_then(|ji| ji.PubDate.as_ref())
            .map(|pd| match (&pd.Year, &pd.MedlineDate) {
                (Some(year), _) => [Some(year), pd.Month.as_ref(), pd.Day.as_ref()]
                    .into_iter()
                    .flatten()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join("-"),
                (None, Some(medline)) => medline.clone(),
                (None, None) => String::new(),
            })
            .unwrap_or_default();

        let doi = article
            .PubmedData
            .as_ref()
            .and_then(|pd| pd.ArticleIdList.as_ref())
            .and_then(|list| {
                list.ids
                    .iter()
                    .find(|id| id.id_type.as_deref() == Some("doi"))
            })
            .map(|id| id.value.trim().to_string())
            .unwrap_or_default();

        RawRecord::new()
            .with("url", format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid))
            .with("uid", pmid)
            .with("title", title)
            .with("authors", authors)
            .with("published", published)
            .with("copyright", copyright)
            .with("summary", summary)
            .with("doi", doi)
    }
}

#[async_trait]
impl Source for PubMedSource {
    fn id(&self) -> &str {
        "pubmed"
    }

    fn name(&self) -> &str {
        "PubMed"
    }

    fn description(&self) -> &str {
        "A wrapper around PubMed. Useful for when you need to answer questions about medicine, \
         health, and biomedical topics from biomedical literature, MEDLINE, life science \
         journals, and online books. Input should be a search query."
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<RawRecord>, SourceError> {
        let response = self.client.send(&Self::build_search_request(query)).await?;
        let ids = Self::parse_search_response(response)?;

        if ids.is_empty() {
            tracing::debug!("PubMed search for '{}' matched nothing", query.query);
            return Ok(Vec::new());
        }

        let xml = self
            .client
            .send_text(&Self::build_fetch_request(&ids))
            .await?;
        let records = Self::parse_fetch_response(&xml)?;

        tracing::debug!("PubMed returned {} articles", records.len());
        Ok(records)
    }

    fn format_record(&self, record: &RawRecord) -> String {
        format!(
            "PMID: {}\nPublished: {}\nTitle: {}\nAuthors: {}\nCopyright Information: {}\nSummary:\n{}",
            record.text_or_na("uid"),
            record.text_or_na("published"),
            record.text_or_na("title"),
            join_or_na(record.strings("authors")),
            record.text_or_na("copyright"),
            record.text_or_na("summary")
        )
    }
}
