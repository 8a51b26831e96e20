//! Hot posts of configured subreddits.
//!
//! Uses the public JSON listing by default. With app credentials a
//! client-credentials token is requested once per fetch and the OAuth host is
//! used instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{RawItem, RedditPost, RedditSourceConfig};
use crate::pipeline::{Page, paginate};
use crate::sources::{FetchParams, RedditCredentials, SourceAdapter, isolate_units};
use crate::utils::http::send_json;

/// Largest page the listing endpoint serves.
const MAX_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    after: Option<String>,
    #[serde(default)]
    children: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Debug, Deserialize)]
struct PostData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    permalink: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    created_utc: Option<f64>,
}

fn parse_post(value: Value) -> Result<RedditPost> {
    let child: Child = serde_json::from_value(value)
        .map_err(|e| AppError::malformed(format!("reddit post: {e}")))?;
    let p = child.data;
    Ok(RedditPost {
        title: p.title,
        url: p.url,
        permalink: p.permalink,
        score: p.score,
        subreddit: p.subreddit,
        author: p.author,
        selftext: p.selftext,
        created_utc: p
            .created_utc
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts as i64, 0)),
    })
}

/// Turn one listing response into a page of posts.
///
/// Children are decoded one by one; a child that does not decode becomes an
/// item error and the rest of the page is kept.
pub fn parse_listing(listing: Listing) -> Page<Result<RedditPost>> {
    let posts = listing.data.children.into_iter().map(parse_post).collect();
    Page::new(posts, listing.data.after)
}

enum Auth {
    Public,
    Bearer(String),
}

pub struct RedditSource {
    id: String,
    client: reqwest::Client,
    config: RedditSourceConfig,
    credentials: Option<RedditCredentials>,
}

impl RedditSource {
    pub fn new(
        id: impl Into<String>,
        client: reqwest::Client,
        config: RedditSourceConfig,
        credentials: Option<RedditCredentials>,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            config,
            credentials,
        }
    }

    async fn authorize(&self) -> Result<Auth> {
        let Some(creds) = &self.credentials else {
            return Ok(Auth::Public);
        };
        let request = self
            .client
            .post(&self.config.token_url)
            .basic_auth(&creds.client_id, Some(&creds.client_secret))
            .form(&[("grant_type", "client_credentials")]);
        let token: TokenResponse = send_json(&self.id, request).await?;
        log::debug!("[{}] OAuth token acquired", self.id);
        Ok(Auth::Bearer(token.access_token))
    }

    fn listing_request(
        &self,
        subreddit: &str,
        auth: &Auth,
        after: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let limit = self.config.post_limit.min(MAX_PAGE).to_string();
        let mut query = vec![("limit", limit), ("raw_json", "1".to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        match auth {
            Auth::Public => self
                .client
                .get(format!("{}/r/{}/hot.json", self.config.base_url, subreddit))
                .query(&query),
            Auth::Bearer(token) => self
                .client
                .get(format!("{}/r/{}/hot", self.config.oauth_base_url, subreddit))
                .bearer_auth(token)
                .query(&query),
        }
    }

    fn subreddit_posts<'a>(
        &'a self,
        subreddit: &'a str,
        auth: Arc<Auth>,
        params: &'a FetchParams,
    ) -> BoxStream<'a, Result<RawItem>> {
        paginate(&self.id, params, self.config.post_limit, move |after| {
            if after.is_none() {
                log::info!("[{}] r/{} (limit {})", self.id, subreddit, self.config.post_limit);
            }
            let request = self.listing_request(subreddit, &auth, after.as_deref());
            async move { Ok::<_, AppError>(parse_listing(send_json(&self.id, request).await?)) }
        })
        .and_then(future::ready)
        .map_ok(RawItem::Post)
        .boxed()
    }
}

impl SourceAdapter for RedditSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "reddit"
    }

    /// A subreddit that fails (private, banned, rate limited) is reported and
    /// skipped; a failed token request fails the whole source.
    fn fetch<'a>(&'a self, params: &'a FetchParams) -> BoxStream<'a, Result<RawItem>> {
        stream::once(self.authorize())
            .map(move |auth| match auth {
                Ok(auth) => {
                    let auth = Arc::new(auth);
                    let units = self
                        .config
                        .subreddits
                        .iter()
                        .map(|s| s.trim())
                        .filter(|s| !s.is_empty())
                        .map(move |sub| {
                            (
                                format!("r/{sub}"),
                                self.subreddit_posts(sub, auth.clone(), params),
                            )
                        })
                        .collect();
                    isolate_units(&self.id, units)
                }
                Err(e) => stream::iter([Err(e)]).boxed(),
            })
            .flatten()
            .boxed()
    }
}
