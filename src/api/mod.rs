use crate::metrics::{reading_time_minutes, word_count};
use crate::models::{DocumentDraft, PostStatus, Visibility};
use crate::storage::{BrowserStorage, DurableStorage, TOKEN_KEY};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiErrorKind {
    Unauthorized,
    Network,
    Http,
    Parse,
}

#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub message: String,
}

impl ApiError {
    fn network(e: reqwest::Error) -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: e.to_string(),
        }
    }

    fn parse(e: impl std::fmt::Display) -> Self {
        Self {
            kind: ApiErrorKind::Parse,
            message: e.to_string(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            kind: ApiErrorKind::Unauthorized,
            message: "Unauthorized".to_string(),
        }
    }

    pub fn http(status: u16, body: String, ctx: &str) -> Self {
        Self {
            kind: ApiErrorKind::Http,
            message: format!("{ctx} ({status}): {body}"),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EnvConfig {
    pub api_url: String,
}

impl EnvConfig {
    pub fn new() -> Self {
        let default_api_url = "http://localhost:6689".to_string();

        // Both `window.ENV.API_URL` and the older `window.ENV.api_url` are honoured.
        if let Some(window) = web_sys::window() {
            if let Some(env) = window.get("ENV") {
                if !env.is_undefined() && env.is_object() {
                    for name in ["API_URL", "api_url"] {
                        if let Ok(api_url) = js_sys::Reflect::get(&env, &name.into()) {
                            if let Some(url_str) = api_url.as_string() {
                                return Self { api_url: url_str };
                            }
                        }
                    }
                }
            }
        }

        Self {
            api_url: default_api_url,
        }
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of `createPost` / `updatePost`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostPayload {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
    pub cover_image_alt: String,
    pub visibility: Visibility,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_at: Option<i64>,
    pub slug: String,
    pub meta_title: String,
    pub meta_description: String,
    pub focus_keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub reading_time: usize,
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

impl PostPayload {
    pub fn from_draft(draft: &DocumentDraft, status: PostStatus, words_per_minute: usize) -> Self {
        let words = word_count(&draft.body);
        Self {
            title: draft.title.trim().to_string(),
            content: draft.body.clone(),
            excerpt: draft.excerpt.trim().to_string(),
            category_id: draft.category_id.clone(),
            tags: draft.tags.iter().cloned().collect(),
            cover_image: non_empty(&draft.cover_image_url),
            cover_image_alt: draft.cover_image_alt.clone(),
            visibility: draft.visibility,
            status,
            publish_at: draft.publish_at,
            slug: draft.slug.clone(),
            meta_title: draft.meta_title.clone(),
            meta_description: draft.meta_description.clone(),
            focus_keyword: draft.focus_keyword.clone(),
            canonical_url: non_empty(&draft.canonical_url),
            word_count: words,
            reading_time: reading_time_minutes(words, words_per_minute),
        }
    }

    /// A post fetched for editing. Its slug is already public, so it is pinned.
    pub fn into_draft(self) -> DocumentDraft {
        DocumentDraft {
            title: self.title,
            body: self.content,
            excerpt: self.excerpt,
            category_id: self.category_id,
            tags: self.tags.into_iter().collect(),
            cover_image_url: self.cover_image.unwrap_or_default(),
            cover_image_alt: self.cover_image_alt,
            visibility: self.visibility,
            status: self.status,
            publish_at: self.publish_at,
            slug: self.slug,
            meta_title: self.meta_title,
            meta_description: self.meta_description,
            focus_keyword: self.focus_keyword,
            canonical_url: self.canonical_url.unwrap_or_default(),
            slug_manually_edited: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CreatePostResponse {
    pub slug: String,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UploadImageResponse {
    pub url: String,
}

/// A file picked for upload, already read into memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// The remote content-storage service the composer writes to.
#[allow(async_fn_in_trait)]
pub trait ContentStore {
    async fn fetch_post(&self, id: &str) -> ApiResult<PostPayload>;
    async fn create_post(&self, payload: &PostPayload) -> ApiResult<CreatePostResponse>;
    async fn update_post(&self, id: &str, payload: &PostPayload) -> ApiResult<()>;
    async fn upload_image(&self, file: ImageUpload) -> ApiResult<UploadImageResponse>;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    pub(crate) base_url: String,
    pub(crate) token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            token: None,
        }
    }

    pub fn load_from_storage() -> Self {
        let base_url = EnvConfig::new().api_url;
        let token = BrowserStorage.get_item(TOKEN_KEY).ok().flatten();
        Self { base_url, token }
    }

    pub fn save_to_storage(&self) {
        if let Some(token) = &self.token {
            if let Err(e) = BrowserStorage.set_item(TOKEN_KEY, token) {
                tracing::warn!(error = %e, "could not persist auth token");
            }
        }
    }

    pub fn clear_storage() {
        let _ = BrowserStorage.remove_item(TOKEN_KEY);
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    pub fn get_token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    fn get_auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }

    /// Remote writes never leave without a token.
    fn require_auth(&self) -> ApiResult<String> {
        if !self.is_authenticated() {
            return Err(ApiError::unauthorized());
        }
        self.get_auth_header().ok_or_else(ApiError::unauthorized)
    }

    fn post_path(id: &str) -> String {
        format!("/api/posts/{}", urlencoding::encode(id))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check(res: reqwest::Response, ctx: &str) -> ApiResult<reqwest::Response> {
        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else if status.as_u16() == 401 {
            Err(ApiError::unauthorized())
        } else {
            let body = res.text().await.unwrap_or_default();
            Err(ApiError::http(status.as_u16(), body, ctx))
        }
    }
}

impl ContentStore for ApiClient {
    async fn fetch_post(&self, id: &str) -> ApiResult<PostPayload> {
        let mut req = reqwest::Client::new().get(self.url(&Self::post_path(id)));
        if let Some(auth) = self.get_auth_header() {
            req = req.header("Authorization", auth);
        }
        let res = req.send().await.map_err(ApiError::network)?;
        let res = Self::check(res, "Fetch post failed").await?;
        res.json().await.map_err(ApiError::parse)
    }

    async fn create_post(&self, payload: &PostPayload) -> ApiResult<CreatePostResponse> {
        let auth = self.require_auth()?;
        tracing::debug!(slug = %payload.slug, "creating post");
        let res = reqwest::Client::new()
            .post(self.url("/api/posts"))
            .header("Authorization", auth)
            .json(payload)
            .send()
            .await
            .map_err(ApiError::network)?;
        let res = Self::check(res, "Create post failed").await?;
        res.json().await.map_err(ApiError::parse)
    }

    async fn update_post(&self, id: &str, payload: &PostPayload) -> ApiResult<()> {
        let auth = self.require_auth()?;
        tracing::debug!(id, "updating post");
        let res = reqwest::Client::new()
            .put(self.url(&Self::post_path(id)))
            .header("Authorization", auth)
            .json(payload)
            .send()
            .await
            .map_err(ApiError::network)?;
        Self::check(res, "Update post failed").await?;
        Ok(())
    }

    async fn upload_image(&self, file: ImageUpload) -> ApiResult<UploadImageResponse> {
        let auth = self.require_auth()?;
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.mime_type)
            .map_err(ApiError::parse)?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let res = reqwest::Client::new()
            .post(self.url("/api/uploads/image"))
            .header("Authorization", auth)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::network)?;
        let res = Self::check(res, "Image upload failed").await?;
        res.json().await.map_err(ApiError::parse)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::slugify;

    #[test]
    fn test_create_post_response_contract_deserialize() {
        let parsed: CreatePostResponse =
            serde_json::from_str(r#"{"slug": "hello-world", "id": "p-1"}"#)
                .expect("create response should parse");
        assert_eq!(parsed.slug, "hello-world");
        assert_eq!(parsed.id.as_deref(), Some("p-1"));

        let parsed: CreatePostResponse =
            serde_json::from_str(r#"{"slug": "only-slug"}"#).expect("id is optional");
        assert!(parsed.id.is_none());
    }

    #[test]
    fn test_post_payload_serialization() {
        let draft = DocumentDraft {
            title: "  Hello World ".to_string(),
            body: "one two three".to_string(),
            slug: slugify("Hello World"),
            tags: ["b", "a"].iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let payload = PostPayload::from_draft(&draft, PostStatus::Published, 200);
        let v = serde_json::to_value(&payload).expect("should serialize");
        assert_eq!(v["title"], "Hello World");
        assert_eq!(v["content"], "one two three");
        assert_eq!(v["status"], "published");
        assert_eq!(v["slug"], "hello-world");
        assert_eq!(v["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(v["wordCount"], 3);
        assert_eq!(v["readingTime"], 1);
        assert!(v.get("coverImage").is_none());
        assert!(v.get("canonicalUrl").is_none());
    }

    #[test]
    fn test_fetched_post_becomes_pinned_draft() {
        let json = r#"{
            "title": "Existing",
            "content": "Body",
            "excerpt": "",
            "tags": ["x"],
            "coverImageAlt": "",
            "visibility": "private",
            "status": "published",
            "slug": "existing-post",
            "metaTitle": "",
            "metaDescription": "",
            "focusKeyword": ""
        }"#;
        let payload: PostPayload = serde_json::from_str(json).expect("post should parse");
        let draft = payload.into_draft();
        assert_eq!(draft.body, "Body");
        assert_eq!(draft.visibility, Visibility::Private);
        assert_eq!(draft.slug, "existing-post");
        assert!(draft.slug_manually_edited);
        assert!(draft.cover_image_url.is_empty());
    }

    #[test]
    fn test_post_path_is_encoded() {
        assert_eq!(ApiClient::post_path("a b/c"), "/api/posts/a%20b%2Fc");
    }

    #[test]
    fn test_api_client_new() {
        let client = ApiClient::new("http://localhost:6689".to_string());
        assert_eq!(client.base_url, "http://localhost:6689");
        assert!(client.token.is_none());
    }

    #[test]
    fn test_api_client_get_auth_header_with_token() {
        let mut client = ApiClient::new("http://localhost:6689".to_string());
        assert!(client.get_auth_header().is_none());
        client.set_token("my-jwt-token".to_string());
        let header = client.get_auth_header().expect("Should have auth header");
        assert_eq!(header, "Bearer my-jwt-token");
    }

    #[test]
    fn test_api_client_is_authenticated() {
        let mut client = ApiClient::new("http://localhost:6689".to_string());
        assert!(!client.is_authenticated());
        client.set_token("  ".to_string());
        assert!(!client.is_authenticated());
        client.set_token("tok".to_string());
        assert!(client.is_authenticated());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ApiClient::new("http://localhost:6689/".to_string());
        assert_eq!(client.url("/api/posts"), "http://localhost:6689/api/posts");
    }

    #[tokio::test]
    async fn test_remote_write_without_token_fails_before_network() {
        let client = ApiClient::new("http://127.0.0.1:9".to_string());
        let payload = PostPayload::from_draft(&DocumentDraft::default(), PostStatus::Draft, 200);
        let err = client.create_post(&payload).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Unauthorized);
    }
}
