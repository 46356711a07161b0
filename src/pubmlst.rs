use std::fs::File;
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;

use crate::error::RefsError;
use crate::fasta::ALLELE_EXTENSION;

/// Everything the scheme downloader needs for one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeRequest {
    scheme_alias: String,
    catalog_url: Url,
    target_dir: Utf8PathBuf,
    force_scheme_name: bool,
}

impl SchemeRequest {
    pub fn new(
        scheme_alias: &str,
        catalog_url: &str,
        target_dir: &Utf8Path,
        force_scheme_name: bool,
    ) -> Result<Self, RefsError> {
        let scheme_alias = scheme_alias.trim();
        if scheme_alias.is_empty() {
            return Err(RefsError::InvalidSchemeRequest(
                "scheme alias is empty".to_string(),
            ));
        }
        let catalog_url = Url::parse(catalog_url).map_err(|err| {
            RefsError::InvalidSchemeRequest(format!("catalog url {catalog_url}: {err}"))
        })?;
        if !matches!(catalog_url.scheme(), "http" | "https") {
            return Err(RefsError::InvalidSchemeRequest(format!(
                "catalog url must be http(s): {catalog_url}"
            )));
        }
        Ok(Self {
            scheme_alias: scheme_alias.to_string(),
            catalog_url,
            target_dir: target_dir.to_path_buf(),
            force_scheme_name,
        })
    }

    pub fn scheme_alias(&self) -> &str {
        &self.scheme_alias
    }

    pub fn catalog_url(&self) -> &Url {
        &self.catalog_url
    }

    pub fn target_dir(&self) -> &Utf8Path {
        &self.target_dir
    }

    pub fn force_scheme_name(&self) -> bool {
        self.force_scheme_name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogScheme {
    pub species: String,
    pub profiles_url: Option<String>,
    pub loci: Vec<CatalogLocus>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogLocus {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemeDownload {
    pub species: String,
    pub files: Vec<Utf8PathBuf>,
}

pub trait SchemeClient: Send + Sync {
    fn download_scheme(&self, request: &SchemeRequest) -> Result<SchemeDownload, RefsError>;
}

#[derive(Clone)]
pub struct PubmlstHttpClient {
    client: Client,
}

impl PubmlstHttpClient {
    pub fn new() -> Result<Self, RefsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("typing-refs/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| RefsError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| RefsError::CatalogHttp(err.to_string()))?;
        Ok(Self { client })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, RefsError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "scheme catalog request failed".to_string());
        Err(RefsError::CatalogStatus { status, message })
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<reqwest::blocking::Response, RefsError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(RefsError::CatalogHttp(err.to_string()));
                }
            }
        }
    }

    fn fetch_catalog(&self, url: &Url) -> Result<Vec<CatalogScheme>, RefsError> {
        let response = self.send_with_retries(|| self.client.get(url.clone()))?;
        let text = Self::handle_status(response)?
            .text()
            .map_err(|err| RefsError::CatalogHttp(err.to_string()))?;
        parse_catalog(&text)
    }

    fn download_to(&self, url: &str, destination: &Utf8Path) -> Result<(), RefsError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = Self::handle_status(response)?;
        let mut file = File::create(destination.as_std_path())
            .map_err(|err| RefsError::Filesystem(format!("create {destination}: {err}")))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| RefsError::CatalogHttp(err.to_string()))?;
        Ok(())
    }
}

impl SchemeClient for PubmlstHttpClient {
    fn download_scheme(&self, request: &SchemeRequest) -> Result<SchemeDownload, RefsError> {
        let schemes = self.fetch_catalog(request.catalog_url())?;
        let scheme = select_scheme(
            &schemes,
            request.scheme_alias(),
            request.force_scheme_name(),
        )?;
        tracing::info!(species = %scheme.species, loci = scheme.loci.len(), "downloading MLST scheme");

        let mut files = Vec::new();
        if let Some(url) = &scheme.profiles_url {
            let path = request
                .target_dir()
                .join(format!("{}.txt", file_stem(&scheme.species)));
            self.download_to(url, &path)?;
            files.push(path);
        }
        for locus in &scheme.loci {
            let path = request
                .target_dir()
                .join(format!("{}.{ALLELE_EXTENSION}", file_stem(&locus.name)));
            self.download_to(&locus.url, &path)?;
            files.push(path);
        }

        Ok(SchemeDownload {
            species: scheme.species.clone(),
            files,
        })
    }
}

/// Reads the `dbases.xml` catalog: one `<species>` per scheme, each with a
/// profiles URL and one URL per locus.
pub fn parse_catalog(xml: &str) -> Result<Vec<CatalogScheme>, RefsError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut schemes = Vec::new();
    let mut current: Option<CatalogScheme> = None;
    let mut locus: Option<CatalogLocus> = None;

    loop {
        match reader.read_event() {
            Err(err) => {
                return Err(RefsError::CatalogParse(format!(
                    "at byte {}: {err}",
                    reader.buffer_position()
                )));
            }
            Ok(Event::Eof) => break,
            Ok(Event::Start(element)) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                match name.as_str() {
                    "species" => current = Some(CatalogScheme::default()),
                    "locus" => locus = Some(CatalogLocus::default()),
                    _ => {}
                }
                stack.push(name);
            }
            Ok(Event::End(_)) => match stack.pop().as_deref() {
                Some("species") => {
                    if let Some(scheme) = current.take() {
                        schemes.push(scheme);
                    }
                }
                Some("locus") => {
                    if let (Some(done), Some(scheme)) = (locus.take(), current.as_mut()) {
                        scheme.loci.push(done);
                    }
                }
                _ => {}
            },
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|err| RefsError::CatalogParse(err.to_string()))?
                    .trim()
                    .to_string();
                if text.is_empty() {
                    continue;
                }
                let mut ancestors = stack.iter().rev().map(String::as_str);
                match (ancestors.next(), ancestors.next()) {
                    (Some("species"), _) => {
                        if let Some(scheme) = current.as_mut() {
                            scheme.species = text;
                        }
                    }
                    (Some("locus"), _) => {
                        if let Some(locus) = locus.as_mut() {
                            locus.name = text;
                        }
                    }
                    (Some("url"), Some("locus")) => {
                        if let Some(locus) = locus.as_mut() {
                            locus.url = text;
                        }
                    }
                    (Some("url"), Some("profiles")) => {
                        if let Some(scheme) = current.as_mut() {
                            scheme.profiles_url = Some(text);
                        }
                    }
                    _ => {}
                }
            }
            Ok(_) => {}
        }
    }

    Ok(schemes)
}

/// Exact species name first. Without `exact_only`, a single species whose
/// name starts with `alias` also matches.
pub fn select_scheme<'a>(
    schemes: &'a [CatalogScheme],
    alias: &str,
    exact_only: bool,
) -> Result<&'a CatalogScheme, RefsError> {
    if let Some(exact) = schemes.iter().find(|scheme| scheme.species == alias) {
        return Ok(exact);
    }
    if exact_only {
        return Err(RefsError::UnknownScheme(alias.to_string()));
    }
    let matches = schemes
        .iter()
        .filter(|scheme| scheme.species.starts_with(alias))
        .collect::<Vec<_>>();
    match matches.as_slice() {
        [] => Err(RefsError::UnknownScheme(alias.to_string())),
        [single] => Ok(single),
        many => Err(RefsError::AmbiguousScheme {
            alias: alias.to_string(),
            candidates: many
                .iter()
                .map(|scheme| scheme.species.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const CATALOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<data>
<species>Escherichia coli#1
<mlst>
<database>
<url>https://pubmlst.org/ecoli</url>
<profiles>
<count>10000</count>
<url>https://example.org/ecoli/profiles_csv</url>
</profiles>
<loci>
<locus>adk
<url>https://example.org/ecoli/adk</url>
</locus>
<locus>fumC
<url>https://example.org/ecoli/fumC</url>
</locus>
</loci>
</database>
</mlst>
</species>
<species>Escherichia coli#2
<mlst><database><profiles><url>https://example.org/ecoli2/profiles</url></profiles><loci></loci></database></mlst>
</species>
<species>Listeria monocytogenes
<mlst><database><profiles><url>https://example.org/lmono/profiles</url></profiles><loci><locus>abcZ<url>https://example.org/lmono/abcZ</url></locus></loci></database></mlst>
</species>
</data>"#;

    #[test]
    fn parses_species_profiles_and_loci() {
        let schemes = parse_catalog(CATALOG).unwrap();
        assert_eq!(schemes.len(), 3);
        assert_eq!(schemes[0].species, "Escherichia coli#1");
        assert_eq!(
            schemes[0].profiles_url.as_deref(),
            Some("https://example.org/ecoli/profiles_csv")
        );
        assert_eq!(
            schemes[0].loci,
            vec![
                CatalogLocus {
                    name: "adk".to_string(),
                    url: "https://example.org/ecoli/adk".to_string(),
                },
                CatalogLocus {
                    name: "fumC".to_string(),
                    url: "https://example.org/ecoli/fumC".to_string(),
                },
            ]
        );
        assert_eq!(schemes[2].loci.len(), 1);
    }

    #[test]
    fn selects_exact_then_unique_prefix() {
        let schemes = parse_catalog(CATALOG).unwrap();
        assert_eq!(
            select_scheme(&schemes, "Escherichia coli#1", true)
                .unwrap()
                .species,
            "Escherichia coli#1"
        );
        assert_eq!(
            select_scheme(&schemes, "Listeria", false).unwrap().species,
            "Listeria monocytogenes"
        );
        assert_matches!(
            select_scheme(&schemes, "Escherichia", false),
            Err(RefsError::AmbiguousScheme { .. })
        );
        assert_matches!(
            select_scheme(&schemes, "Listeria", true),
            Err(RefsError::UnknownScheme(_))
        );
    }

    #[test]
    fn request_rejects_non_http_catalog() {
        let err = SchemeRequest::new("Listeria", "ftp://example.org/db.xml", Utf8Path::new("/x"), false)
            .unwrap_err();
        assert_matches!(err, RefsError::InvalidSchemeRequest(_));
        let err = SchemeRequest::new("  ", "https://example.org/db.xml", Utf8Path::new("/x"), false)
            .unwrap_err();
        assert_matches!(err, RefsError::InvalidSchemeRequest(_));
    }

    #[test]
    fn file_stems_are_filesystem_safe() {
        assert_eq!(file_stem("Escherichia coli#1"), "Escherichia_coli_1");
    }
}
