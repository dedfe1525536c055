use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::PublishAdapter;
use crate::config::WordPressConfig;
use crate::content::ShortcodeCodec;
use crate::error::PublishError;
use crate::lifecycle::{Article, PublishedPost};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// WordPress REST API publisher
#[derive(Debug)]
pub struct WordPressPublisher {
    client: Client,
    base_url: String,
    username: String,
    password: SecretString,
    post_status: String,
    codec: ShortcodeCodec,
}

#[derive(Debug, Serialize)]
struct CreatePostRequest<'a> {
    title: &'a str,
    content: String,
    status: &'a str,
    excerpt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    featured_media: Option<u64>,
    meta: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: u64,
    link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedMedia {
    id: u64,
}

/// Result of [`WordPressPublisher::health_check`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishHealth {
    pub rest_api_available: bool,
    pub authentication_valid: bool,
    pub error_details: Vec<String>,
}

impl PublishHealth {
    pub fn is_healthy(&self) -> bool {
        self.rest_api_available && self.authentication_valid
    }
}

impl WordPressPublisher {
    pub fn new(config: &WordPressConfig, codec: ShortcodeCodec) -> Result<Self, PublishError> {
        // タイムアウト設定付きのHTTPクライアントを作成
        let timeout_secs = config.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(concat!("contentflow-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PublishError::Network(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: SecretString::new(config.password.clone().into_boxed_str()),
            post_status: config.post_status.clone(),
            codec,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/wp-json/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    /// Fetch the image and upload it to the media library
    async fn upload_featured_media(
        &self,
        article: &Article,
        image_url: &str,
    ) -> Result<u64, PublishError> {
        let image = check_status(self.client.get(image_url).send().await?).await?;
        let mime_type = image
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = image.bytes().await?;
        let filename = media_filename(image_url, &mime_type);

        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name(filename.clone())
            .mime_str(&mime_type)
            .map_err(|e| PublishError::InvalidResponse(format!("Failed to set MIME type: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("alt_text", article.title.clone())
            .text("title", article.title.clone());

        debug!(%filename, %mime_type, size = bytes.len(), "uploading featured media");
        let response = self
            .authorized(self.client.post(self.endpoint("wp/v2/media")))
            .multipart(form)
            .send()
            .await?;
        let media: UploadedMedia = parse_json(check_status(response).await?).await?;
        Ok(media.id)
    }

    /// Probe the REST index and the authenticated user endpoint
    pub async fn health_check(&self) -> PublishHealth {
        let mut health = PublishHealth::default();
        info!("Starting WordPress health check for: {}", self.base_url);

        match self.client.get(self.endpoint("")).send().await {
            Ok(response) => match check_status(response).await {
                Ok(response) => match response.json::<serde_json::Value>().await {
                    Ok(index) => {
                        let has_v2 = index
                            .get("namespaces")
                            .and_then(|v| v.as_array())
                            .is_some_and(|arr| arr.iter().any(|ns| ns.as_str() == Some("wp/v2")));
                        if has_v2 {
                            health.rest_api_available = true;
                        } else {
                            health
                                .error_details
                                .push("WordPress REST API v2 not available".to_string());
                        }
                    }
                    Err(e) => health
                        .error_details
                        .push(format!("Invalid REST API response: {}", e)),
                },
                Err(e) => health.error_details.push(format!("REST API check failed: {}", e)),
            },
            Err(e) => {
                health
                    .error_details
                    .push(format!("Failed to connect to WordPress: {}", e));
                return health;
            }
        }

        let me = self
            .authorized(self.client.get(self.endpoint("wp/v2/users/me")))
            .send()
            .await;
        match me {
            Ok(response) => match check_status(response).await {
                Ok(_) => health.authentication_valid = true,
                Err(e) => health.error_details.push(format!("Authentication failed: {}", e)),
            },
            Err(e) => health.error_details.push(format!("Authentication check failed: {}", e)),
        }

        if health.is_healthy() {
            info!("WordPress health check completed successfully");
        } else {
            warn!(
                issues = health.error_details.len(),
                "WordPress health check completed with issues"
            );
        }
        health
    }
}

#[async_trait]
impl PublishAdapter for WordPressPublisher {
    async fn create_post(&self, article: &Article) -> Result<PublishedPost, PublishError> {
        if article.title.trim().is_empty() || article.body.trim().is_empty() {
            return Err(PublishError::Unpublishable(format!(
                "article {} has an empty title or body",
                article.id
            )));
        }

        // アイキャッチ画像の失敗は致命的ではない
        let featured_media = match article.featured_image_url.as_deref() {
            Some(image_url) => match self.upload_featured_media(article, image_url).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(
                        article_id = %article.id,
                        error = %e,
                        "featured image upload failed, publishing without image"
                    );
                    None
                }
            },
            None => None,
        };

        let payload = CreatePostRequest {
            title: &article.title,
            content: self.codec.render_html(&article.body),
            status: &self.post_status,
            excerpt: article.meta_description.as_deref().unwrap_or_default(),
            featured_media,
            meta: serde_json::json!({
                "contentflow_article_id": article.id,
                "contentflow_keywords": article.target_keywords.join(", "),
            }),
        };

        let response = self
            .authorized(self.client.post(self.endpoint("wp/v2/posts")))
            .json(&payload)
            .send()
            .await?;
        let created: CreatedPost = parse_json(check_status(response).await?).await?;

        let url = created
            .link
            .unwrap_or_else(|| format!("{}/?p={}", self.base_url, created.id));
        info!(article_id = %article.id, post_id = created.id, %url, "post created");
        Ok(PublishedPost {
            post_id: created.id,
            url,
        })
    }

    fn name(&self) -> &str {
        "wordpress"
    }
}

/// Map non-success statuses, using the WordPress error message when present
async fn check_status(response: Response) -> Result<Response, PublishError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            let trimmed: String = body.chars().take(200).collect();
            if trimmed.trim().is_empty() {
                status.canonical_reason().unwrap_or("error").to_string()
            } else {
                trimmed
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PublishError::Authentication {
            status: status.as_u16(),
            message,
        }),
        _ => Err(PublishError::Rejected {
            status: status.as_u16(),
            message,
        }),
    }
}

async fn parse_json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, PublishError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        PublishError::InvalidResponse(format!(
            "{} (body: {})",
            e,
            text.chars().take(200).collect::<String>()
        ))
    })
}

fn media_filename(image_url: &str, mime_type: &str) -> String {
    let from_path = url::Url::parse(image_url).ok().and_then(|u| {
        u.path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .filter(|s| !s.is_empty())
    });
    from_path.unwrap_or_else(|| {
        let ext = mime_type.strip_prefix("image/").unwrap_or("jpg");
        format!("featured-image.{}", ext)
    })
}
