//! # bt-cms-wordpress
//!
//! `ArticleSource` backed by the WordPress REST API (`/wp-json/wp/v2`).
//! Listings are cached for `list_ttl`, single articles and the category
//! list for `detail_ttl`. Without a base URL every call returns nothing
//! and no request is made.

mod cache;

use std::time::Duration;

use async_trait::async_trait;
use bt_core::models::{Article, ArticleCategory, ArticleQuery};
use bt_core::traits::ArticleSource;
use chrono::NaiveDateTime;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use cache::TtlCache;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CmsError {
    #[error("CMS request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CMS responded with {0}")]
    Status(StatusCode),
}

#[derive(Debug, Deserialize)]
struct Rendered {
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WpMedia {
    source_url: String,
    #[serde(default)]
    alt_text: String,
}

#[derive(Debug, Default, Deserialize)]
struct WpEmbedded {
    #[serde(default)]
    author: Vec<WpAuthor>,
    #[serde(default, rename = "wp:featuredmedia")]
    featured_media: Vec<WpMedia>,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: u64,
    date: NaiveDateTime,
    slug: String,
    title: Rendered,
    content: Rendered,
    excerpt: Rendered,
    #[serde(default)]
    categories: Vec<u64>,
    #[serde(default, rename = "_embedded")]
    embedded: WpEmbedded,
}

impl From<WpPost> for Article {
    fn from(post: WpPost) -> Self {
        let author_name = post.embedded.author.into_iter().next().map(|a| a.name);
        let media = post.embedded.featured_media.into_iter().next();
        Article {
            id: post.id,
            slug: post.slug,
            title: post.title.rendered,
            content_html: post.content.rendered,
            excerpt_html: post.excerpt.rendered,
            published_at: post.date,
            author_name,
            featured_image_alt: media
                .as_ref()
                .map(|m| m.alt_text.clone())
                .filter(|alt| !alt.is_empty()),
            featured_image_url: media.map(|m| m.source_url),
            category_ids: post.categories,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WpCategory {
    id: u64,
    name: String,
    slug: String,
    #[serde(default)]
    count: u64,
}

impl From<WpCategory> for ArticleCategory {
    fn from(c: WpCategory) -> Self {
        ArticleCategory {
            id: c.id,
            name: c.name,
            slug: c.slug,
            count: c.count,
        }
    }
}

pub struct WordPressSource {
    client: Client,
    /// API root, e.g. `https://cms.example/wp-json/wp/v2`.
    api_root: Option<String>,
    lists: TtlCache<ArticleQuery, Vec<Article>>,
    details: TtlCache<String, Article>,
    categories: TtlCache<(), Vec<ArticleCategory>>,
}

impl WordPressSource {
    pub fn new(
        base_url: Option<String>,
        list_ttl: Duration,
        detail_ttl: Duration,
    ) -> Result<Self, CmsError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let api_root = base_url
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .map(|url| format!("{url}/wp-json/wp/v2"));
        if api_root.is_none() {
            warn!("CMS base URL is not configured; the article section will be empty");
        }

        Ok(Self {
            client,
            api_root,
            lists: TtlCache::new(list_ttl),
            details: TtlCache::new(detail_ttl),
            categories: TtlCache::new(detail_ttl),
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, CmsError> {
        debug!(%url, "CMS request");
        let response = self.client.get(&url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(CmsError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

fn list_params(query: &ArticleQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", query.page.max(1).to_string()),
        ("per_page", query.per_page.clamp(1, 100).to_string()),
        ("_embed", "true".to_string()),
    ];
    if !query.category_ids.is_empty() {
        let ids: Vec<String> = query.category_ids.iter().map(u64::to_string).collect();
        params.push(("categories", ids.join(",")));
    }
    params
}

#[async_trait]
impl ArticleSource for WordPressSource {
    async fn list_articles(&self, query: &ArticleQuery) -> anyhow::Result<Vec<Article>> {
        let Some(root) = &self.api_root else {
            return Ok(Vec::new());
        };
        if let Some(hit) = self.lists.get(query) {
            return Ok(hit);
        }

        let posts: Vec<WpPost> = self.fetch(format!("{root}/posts"), &list_params(query)).await?;
        let articles: Vec<Article> = posts.into_iter().map(Article::from).collect();
        self.lists.insert(query.clone(), articles.clone());
        Ok(articles)
    }

    async fn get_article(&self, slug: &str) -> anyhow::Result<Option<Article>> {
        let Some(root) = &self.api_root else {
            return Ok(None);
        };
        let key = slug.to_string();
        if let Some(hit) = self.details.get(&key) {
            return Ok(Some(hit));
        }

        let params = [("slug", key.clone()), ("_embed", "true".to_string())];
        let posts: Vec<WpPost> = self.fetch(format!("{root}/posts"), &params).await?;
        let article = posts.into_iter().next().map(Article::from);
        if let Some(article) = &article {
            self.details.insert(key, article.clone());
        }
        Ok(article)
    }

    async fn list_categories(&self) -> anyhow::Result<Vec<ArticleCategory>> {
        let Some(root) = &self.api_root else {
            return Ok(Vec::new());
        };
        if let Some(hit) = self.categories.get(&()) {
            return Ok(hit);
        }

        let params = [("per_page", "100".to_string())];
        let categories: Vec<WpCategory> = self.fetch(format!("{root}/categories"), &params).await?;
        let categories: Vec<ArticleCategory> =
            categories.into_iter().map(ArticleCategory::from).collect();
        self.categories.insert((), categories.clone());
        Ok(categories)
    }
}
