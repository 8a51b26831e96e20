//! Album chart scraped from an HTML page.

use futures::stream::{self, BoxStream, StreamExt};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{AlbumRow, AlbumSelectors, RawItem, ScrapeSourceConfig};
use crate::sources::{FetchParams, SourceAdapter};
use crate::utils::http::send_text;
use crate::utils::{resolve_url, squash_whitespace};

/// Compiled form of [`AlbumSelectors`].
pub struct CompiledSelectors {
    row: Selector,
    title: Selector,
    artist: Selector,
    release_date: Selector,
    summary: Selector,
    image: Selector,
}

impl CompiledSelectors {
    pub fn compile(selectors: &AlbumSelectors) -> Result<Self> {
        let parse =
            |s: &str| Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")));
        Ok(Self {
            row: parse(&selectors.row)?,
            title: parse(&selectors.title)?,
            artist: parse(&selectors.artist)?,
            release_date: parse(&selectors.release_date)?,
            summary: parse(&selectors.summary)?,
            image: parse(&selectors.image)?,
        })
    }
}

fn first<'a>(row: &ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    row.select(selector).next()
}

fn text_of(el: ElementRef<'_>) -> Option<String> {
    let text = squash_whitespace(&el.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

/// Extract up to `limit` album rows. Links and images are made absolute.
///
/// Rows carrying neither a title nor a link (spacers, headers) are not rows.
pub fn parse_albums(
    html: &str,
    base: &Url,
    selectors: &CompiledSelectors,
    limit: usize,
) -> Vec<AlbumRow> {
    let document = Html::parse_document(html);
    document
        .select(&selectors.row)
        .filter_map(|row| {
            let title_link = first(&row, &selectors.title);
            let album = AlbumRow {
                title: title_link.and_then(text_of),
                url: title_link
                    .and_then(|a| a.value().attr("href"))
                    .map(|href| resolve_url(base, href)),
                artist: first(&row, &selectors.artist).and_then(text_of),
                release_date: first(&row, &selectors.release_date).and_then(text_of),
                summary: first(&row, &selectors.summary).and_then(text_of),
                image: first(&row, &selectors.image)
                    .and_then(|img| img.value().attr("src"))
                    .map(|src| resolve_url(base, src)),
            };
            (album.title.is_some() || album.url.is_some()).then_some(album)
        })
        .take(limit)
        .collect()
}

pub struct AlbumChartSource {
    id: String,
    client: reqwest::Client,
    config: ScrapeSourceConfig,
    base: Url,
    selectors: CompiledSelectors,
}

impl AlbumChartSource {
    /// Fails on an invalid page URL or selector.
    pub fn new(id: impl Into<String>, client: reqwest::Client, config: ScrapeSourceConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| AppError::config(format!("invalid chart url '{}': {e}", config.url)))?;
        let selectors = CompiledSelectors::compile(&config.selectors)?;
        Ok(Self {
            id: id.into(),
            client,
            config,
            base,
            selectors,
        })
    }

    async fn albums(&self) -> Result<Vec<AlbumRow>> {
        log::info!("[{}] Scraping {}", self.id, self.config.url);
        let html = send_text(&self.id, self.client.get(self.base.as_str())).await?;

        // Html is !Send; parse synchronously, after the last await
        let albums = parse_albums(&html, &self.base, &self.selectors, self.config.limit);
        if albums.is_empty() {
            return Err(AppError::source_unavailable(
                &self.id,
                format!("no rows matched '{}'", self.config.selectors.row),
            ));
        }
        log::debug!("[{}] {} album rows", self.id, albums.len());
        Ok(albums)
    }
}

impl SourceAdapter for AlbumChartSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "scrape"
    }

    fn fetch<'a>(&'a self, _params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>> {
        stream::once(self.albums())
            .map(|result| match result {
                Ok(albums) => stream::iter(albums.into_iter().map(|a| Ok(RawItem::Album(a)))).boxed(),
                Err(e) => stream::iter(vec![Err(e)]).boxed(),
            })
            .flatten()
            .boxed()
    }
}
