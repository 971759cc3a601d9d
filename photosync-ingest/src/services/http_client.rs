//! Photo-server REST client
//!
//! Every call carries the `x-api-key` header and the per-call timeout set at
//! construction. Non-success statuses become `IngestError::Server`, whose
//! kind is transient for 5xx/408/429 and permanent otherwise.

use crate::error::{IngestError, Result};
use crate::models::{
    Album, AlbumInfo, Asset, AssetFilter, AssetPatch, AssetStatistics, JobCommand, ServerAsset,
    ServerJob, ServerUser, Tag, UploadResponse,
};
use crate::services::server_client::{AssetCallback, ServerClient};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("photosync/", env!("CARGO_PKG_VERSION"));
const DEVICE_ID: &str = "photosync";
const SEARCH_PAGE_SIZE: usize = 1000;

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlbumDto {
    id: String,
    album_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    assets: Vec<IdDto>,
}

impl From<AlbumDto> for Album {
    fn from(dto: AlbumDto) -> Self {
        Album {
            id: dto.id,
            title: dto.album_name,
            description: dto.description,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdDto {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    items: Vec<ServerAsset>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    assets: SearchPage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueStatus {
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    is_paused: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    queue_status: QueueStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    page: usize,
    size: usize,
    #[serde(flatten)]
    filter: &'a AssetFilter,
}

/// REST client for the photo server
pub struct HttpServerClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpServerClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `server` - Server URL, with or without the trailing `/api`
    /// * `api_key` - API key sent with every request
    /// * `timeout` - Per-call timeout
    pub fn new(server: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: api_endpoint(server),
            api_key: api_key.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check the server answers
    pub async fn ping(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct Pong {
            res: String,
        }
        let pong: Pong = self.get_json("/server/ping").await?;
        if pong.res != "pong" {
            return Err(IngestError::Server {
                status: 0,
                message: format!("unexpected ping answer {:?}", pong.res),
            });
        }
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.endpoint, path);
        debug!(method = %method, url = %url, "Server request");
        self.http_client
            .request(method, url)
            .header("x-api-key", &self.api_key)
            .header("Accept", "application/json")
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(IngestError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let bytes = Self::check(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path).send().await?;
        Self::decode(response).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(method, path).json(body).send().await?;
        Self::decode(response).await
    }

    async fn send_empty<B>(&self, method: Method, path: &str, body: &B) -> Result<()>
    where
        B: Serialize + ?Sized,
    {
        let response = self.request(method, path).json(body).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

/// Normalise a server URL to its `/api` endpoint
fn api_endpoint(server: &str) -> String {
    let trimmed = server.trim_end_matches('/');
    if trimmed.ends_with("/api") {
        trimmed.to_string()
    } else {
        format!("{}/api", trimmed)
    }
}

fn rfc3339(date: Option<DateTime<Utc>>) -> String {
    date.unwrap_or_else(Utc::now).to_rfc3339()
}

#[async_trait]
impl ServerClient for HttpServerClient {
    async fn get_my_user(&self) -> Result<ServerUser> {
        self.get_json("/users/me").await
    }

    async fn get_asset_statistics(&self) -> Result<AssetStatistics> {
        self.get_json("/assets/statistics").await
    }

    async fn get_all_assets(&self, filter: &AssetFilter, callback: AssetCallback<'_>) -> Result<()> {
        let mut page = 1;
        loop {
            let request = SearchRequest {
                page,
                size: SEARCH_PAGE_SIZE,
                filter,
            };
            let response: SearchResponse =
                self.send_json(Method::POST, "/search/metadata", &request).await?;
            for asset in response.assets.items {
                callback(asset)?;
            }
            match response.assets.next_page.and_then(|p| p.parse().ok()) {
                Some(next) => page = next,
                None => return Ok(()),
            }
        }
    }

    async fn get_asset_info(&self, id: &str) -> Result<ServerAsset> {
        self.get_json(&format!("/assets/{}", id)).await
    }

    async fn upload_asset(&self, asset: &Asset) -> Result<UploadResponse> {
        let path = asset.cache_path()?;
        let mime = infer::get_from_path(&path)
            .ok()
            .flatten()
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| IngestError::FileAccess {
                file: asset.file.to_string(),
                message: e.to_string(),
            })?;

        let part = Part::stream_with_length(reqwest::Body::from(file), asset.file_size.max(0) as u64)
            .file_name(asset.original_file_name.clone())
            .mime_str(&mime)?;
        let form = Form::new()
            .text("deviceAssetId", asset.device_asset_id())
            .text("deviceId", DEVICE_ID)
            .text("fileCreatedAt", rfc3339(asset.date_for_comparison()))
            .text("fileModifiedAt", rfc3339(asset.file_date.or(asset.capture_date)))
            .text("isFavorite", asset.favorite.to_string())
            .text("isArchived", asset.archived.to_string())
            .part("assetData", part);

        let response = self
            .request(Method::POST, "/assets")
            .multipart(form)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn update_asset(&self, id: &str, patch: &AssetPatch) -> Result<()> {
        self.send_empty(Method::PUT, &format!("/assets/{}", id), patch).await
    }

    async fn copy_asset(&self, from_id: &str, to_id: &str) -> Result<()> {
        self.send_empty(
            Method::PUT,
            "/assets/copy",
            &json!({ "sourceId": from_id, "targetId": to_id }),
        )
        .await
    }

    async fn delete_assets(&self, ids: &[String], permanent: bool) -> Result<()> {
        self.send_empty(Method::DELETE, "/assets", &json!({ "ids": ids, "force": permanent }))
            .await
    }

    async fn get_all_albums(&self) -> Result<Vec<Album>> {
        let albums: Vec<AlbumDto> = self.get_json("/albums").await?;
        Ok(albums.into_iter().map(Album::from).collect())
    }

    async fn get_album_info(&self, id: &str) -> Result<AlbumInfo> {
        let mut dto: AlbumDto = self.get_json(&format!("/albums/{}", id)).await?;
        let member_ids = std::mem::take(&mut dto.assets)
            .into_iter()
            .map(|a| a.id)
            .collect();
        Ok(AlbumInfo {
            album: dto.into(),
            member_ids,
        })
    }

    async fn create_album(&self, title: &str, description: &str, asset_ids: &[String]) -> Result<Album> {
        let dto: AlbumDto = self
            .send_json(
                Method::POST,
                "/albums",
                &json!({ "albumName": title, "description": description, "assetIds": asset_ids }),
            )
            .await?;
        Ok(dto.into())
    }

    async fn add_assets_to_album(&self, album_id: &str, asset_ids: &[String]) -> Result<()> {
        let response = self
            .request(Method::PUT, &format!("/albums/{}/assets", album_id))
            .json(&json!({ "ids": asset_ids }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upsert_tags(&self, values: &[String]) -> Result<Vec<Tag>> {
        self.send_json(Method::PUT, "/tags", &json!({ "tags": values })).await
    }

    async fn bulk_tag_assets(&self, tag_ids: &[String], asset_ids: &[String]) -> Result<()> {
        let response = self
            .request(Method::PUT, "/tags/assets")
            .json(&json!({ "tagIds": tag_ids, "assetIds": asset_ids }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn create_stack(&self, asset_ids: &[String]) -> Result<()> {
        let response = self
            .request(Method::POST, "/stacks")
            .json(&json!({ "assetIds": asset_ids }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn get_jobs(&self) -> Result<Vec<ServerJob>> {
        let jobs: HashMap<String, JobStatus> = self.get_json("/jobs").await?;
        let mut jobs: Vec<ServerJob> = jobs
            .into_iter()
            .map(|(name, status)| ServerJob {
                name,
                is_active: status.queue_status.is_active,
                is_paused: status.queue_status.is_paused,
            })
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(jobs)
    }

    async fn send_job_command(&self, name: &str, command: JobCommand) -> Result<()> {
        let response = self
            .request(Method::PUT, &format!("/jobs/{}", name))
            .json(&json!({ "command": command, "force": false }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
