#![forbid(unsafe_code)]

//! Axum backend for the PhewTube catalog.
//!
//! Serves the JSON API (videos, categories, transcription and the question
//! assistant) and the static frontend. Outbound calls to YouTube and the
//! OpenAI APIs are blocking, so they run on the blocking pool via
//! `spawn_blocking`.

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, Path as AxumPath, Query, State,
        multipart::MultipartError,
    },
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use mime_guess::MimeGuess;
use parking_lot::RwLock;
use phewtube::assistant::{Assistant, AssistantError, VideoContext, build_video_context};
use phewtube::catalog::{
    CATALOG_DB_FILE, Catalog, Category, NewVideo, VideoRecord, VideoStatus, slugify,
};
use phewtube::config::{RuntimeOverrides, resolve_runtime_settings};
use phewtube::format::{format_duration, format_views, relative_time};
use phewtube::http::{HttpClient, UreqClient};
use phewtube::logging;
use phewtube::security::ensure_not_root;
use phewtube::transcribe::{AudioClip, Transcriber};
use phewtube::youtube::oembed::{OEMBED_ENDPOINT, OEmbedError, fetch_oembed};
use phewtube::youtube::{AvatarResolver, ResolverConfig, ScrapePolicy, VideoId, extract_video_id};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

const UNKNOWN_CHANNEL: &str = "Unknown Channel";
const UNTITLED_VIDEO: &str = "Untitled Video";
const DEFAULT_UPLOADER: &str = "user";
const UPLOAD_MESSAGE: &str = "File upload will be processed. Video ID saved.";
const ALL_CATEGORIES_KEY: &str = "all";
const AUDIO_FIELD: &str = "audio";
/// Upload cap of the transcription API.
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
struct BackendArgs {
    data_root: PathBuf,
    www_root: PathBuf,
    phewtube_port: u16,
    listen_host: IpAddr,
    youtube_api_key: Option<String>,
    openai_api_key: Option<String>,
    scrape_policy: ScrapePolicy,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut data_root_override: Option<PathBuf> = None;
        let mut www_root_override: Option<PathBuf> = None;
        let mut port_override: Option<u16> = None;
        let mut host_override: Option<IpAddr> = None;
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--data-root=") {
                data_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--www-root=") {
                www_root_override = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                port_override = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                host_override = Some(parse_host_arg(value)?);
                continue;
            }

            match arg.as_str() {
                "--data-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--data-root requires a value"))?;
                    data_root_override = Some(PathBuf::from(value));
                }
                "--www-root" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--www-root requires a value"))?;
                    www_root_override = Some(PathBuf::from(value));
                }
                "--port" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--port requires a value"))?;
                    port_override = Some(parse_port_arg(&value)?);
                }
                "--host" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--host requires a value"))?;
                    host_override = Some(parse_host_arg(&value)?);
                }
                _ => return Err(anyhow!("unknown argument: {arg}")),
            }
        }

        let settings = resolve_runtime_settings(RuntimeOverrides {
            data_root: data_root_override,
            www_root: www_root_override,
            phewtube_port: port_override,
            ..RuntimeOverrides::default()
        })?;
        let listen_host = match host_override {
            Some(host) => host,
            None => parse_host_arg(&settings.phewtube_host)?,
        };

        Ok(Self {
            data_root: settings.data_root,
            www_root: settings.www_root,
            phewtube_port: settings.phewtube_port,
            listen_host,
            youtube_api_key: settings.youtube_api_key,
            openai_api_key: settings.openai_api_key,
            scrape_policy: settings.scrape_policy,
        })
    }
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/PHEWTUBE_HOST")
}

/// Shared state handed to every handler.
///
/// * `catalog` is the libsql connection.
/// * `cache` memoizes listings until the catalog changes.
/// * `http` is the outbound client used for oEmbed and the assistant; the
///   resolver holds its own handle to the same client.
#[derive(Clone)]
struct AppState {
    catalog: Arc<Catalog>,
    cache: Arc<ApiCache>,
    http: Arc<dyn HttpClient>,
    resolver: AvatarResolver,
    openai_api_key: Option<Arc<str>>,
    www_root: Arc<PathBuf>,
}

/// Listing cache keyed by category slug. Cleared on every write made through
/// this process and whenever `PRAGMA data_version` shows an outside commit
/// (e.g. `refresh_avatars`).
struct ApiCache {
    videos: RwLock<HashMap<String, Arc<Vec<VideoRecord>>>>,
    categories: RwLock<Option<Arc<Vec<Category>>>>,
    last_db_version: RwLock<Option<i64>>,
}

impl ApiCache {
    fn new() -> Self {
        Self {
            videos: RwLock::new(HashMap::new()),
            categories: RwLock::new(None),
            last_db_version: RwLock::new(None),
        }
    }

    fn clear(&self) {
        self.videos.write().clear();
        self.categories.write().take();
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
    /// Adds `"valid": false` to the body (URL validation endpoint).
    validation: bool,
    details: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            validation: false,
            details: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Passes an upstream status through, falling back to 502 for codes axum
    /// cannot represent.
    fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message,
        )
    }

    fn invalid(mut self) -> Self {
        self.validation = true;
        self
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.message });
        if self.validation {
            body["valid"] = Value::Bool(false);
        }
        if let Some(details) = self.details {
            body["details"] = Value::String(details);
        }
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn storage_error(err: anyhow::Error) -> ApiError {
    warn!(error = %format!("{err:#}"), "catalog operation failed");
    ApiError::internal("Internal server error")
}

/// Runs blocking outbound work off the async runtime.
async fn run_blocking<T, F>(work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|err| {
        warn!(error = %err, "blocking task failed");
        ApiError::internal("Internal server error")
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init()?;
    let args = BackendArgs::parse()?;
    ensure_not_root("backend")?;

    let catalog_path = args.data_root.join(CATALOG_DB_FILE);
    let catalog = Catalog::open(&catalog_path)
        .await
        .context("initializing catalog")?;
    if args.youtube_api_key.is_none() {
        info!("YOUTUBE_API_KEY not set, channel avatars will be scraped");
    }

    let http: Arc<dyn HttpClient> = Arc::new(UreqClient::new());
    let resolver = AvatarResolver::new(
        http.clone(),
        ResolverConfig::new(args.youtube_api_key.clone()).with_scrape_policy(args.scrape_policy),
    );
    let state = AppState {
        catalog: Arc::new(catalog),
        cache: Arc::new(ApiCache::new()),
        http,
        resolver,
        openai_api_key: args.openai_api_key.as_deref().map(Arc::from),
        www_root: Arc::new(args.www_root.clone()),
    };

    let app = router(state);
    let addr = SocketAddr::new(args.listen_host, args.phewtube_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/videos", get(list_videos).post(create_video))
        .route("/api/videos/validate-youtube", post(validate_youtube))
        .route("/api/videos/{id}", get(get_video))
        .route("/api/videos/{id}/views", post(record_view))
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/ai/ask", post(ask))
        .route(
            "/api/transcribe",
            post(transcribe).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)),
        )
        .fallback(static_fallback)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}

async fn static_fallback(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        return ApiError::not_found("endpoint not found").into_response();
    }

    match serve_www_path(&state.www_root, path).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_dir() => stream_file(root.join("index.html")).await,
        Ok(_) => stream_file(target).await,
        Err(_) if should_fallback_to_index(request_path) => {
            stream_file(root.join("index.html")).await
        }
        Err(_) => Err(ApiError::not_found("file not found")),
    }
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

/// Extensionless paths are client-side routes of the SPA.
fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    trimmed.is_empty() || Path::new(trimmed).extension().is_none()
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = mime.to_string().parse()
    {
        response
            .headers_mut()
            .insert(axum::http::header::CONTENT_TYPE, value);
    }
    Ok(response)
}

#[derive(Debug, Deserialize)]
struct ValidateRequest {
    url: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ValidateResponse {
    valid: bool,
    video_id: String,
    title: Option<String>,
    thumbnail: Option<String>,
    author: Option<String>,
}

/// Checks that a URL names an existing, embeddable YouTube video.
async fn validate_youtube(
    State(state): State<AppState>,
    Json(payload): Json<ValidateRequest>,
) -> ApiResult<Json<ValidateResponse>> {
    let url = payload
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("URL is required"))?;
    let video_id = extract_video_id(&url)
        .ok_or_else(|| ApiError::bad_request("Invalid YouTube URL format"))?;

    let client = state.http.clone();
    let lookup_url = url.clone();
    let meta = run_blocking(move || fetch_oembed(&*client, OEMBED_ENDPOINT, &lookup_url))
        .await?
        .map_err(|err| match err {
            OEmbedError::NotFound => {
                ApiError::not_found("Video not found or embedding is disabled").invalid()
            }
            OEmbedError::Status(status) => {
                ApiError::upstream(status, "Failed to validate video").invalid()
            }
            other => {
                warn!(%url, error = %other, "oEmbed validation failed");
                ApiError::internal("Failed to validate video. Please try again.").invalid()
            }
        })?;

    Ok(Json(ValidateResponse {
        valid: true,
        video_id: video_id.to_string(),
        title: meta.title,
        thumbnail: meta.thumbnail_url,
        author: meta.author_name,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateVideoRequest {
    youtube_url: Option<String>,
    file_name: Option<String>,
    file_size: Option<u64>,
    uploader: Option<String>,
    category: Option<String>,
    duration_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CreatedVideo {
    id: String,
    title: String,
}

#[derive(Debug, Serialize)]
struct CreateVideoResponse {
    success: bool,
    video: CreatedVideo,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

/// Adds a YouTube link or registers a pending upload.
async fn create_video(
    State(state): State<AppState>,
    Json(payload): Json<CreateVideoRequest>,
) -> ApiResult<Json<CreateVideoResponse>> {
    let youtube_url = payload.youtube_url.clone().filter(|url| !url.trim().is_empty());
    let file_name = payload.file_name.clone().filter(|name| !name.trim().is_empty());
    if youtube_url.is_none() && file_name.is_none() {
        return Err(ApiError::bad_request("Either YouTube URL or file is required"));
    }

    let category = payload
        .category
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    if category.is_some_and(|name| slugify(name).is_empty()) {
        return Err(ApiError::bad_request("Invalid category"));
    }

    let response = match youtube_url {
        Some(url) => create_youtube_video(&state, url, category, payload.duration_seconds).await?,
        None => {
            let file_name = file_name.unwrap_or_default();
            let category_id = ensure_category_id(&state, category).await?;
            let channel = state
                .catalog
                .find_or_create_upload_channel(payload.uploader.as_deref().unwrap_or(DEFAULT_UPLOADER))
                .await
                .map_err(storage_error)?;
            let video = NewVideo {
                title: file_name.clone(),
                description: None,
                thumbnail: None,
                youtube_url: None,
                youtube_id: None,
                duration: payload.duration_seconds,
                status: VideoStatus::Processing,
                channel_id: channel.id,
                category_id,
            };
            let id = state.catalog.insert_video(&video).await.map_err(storage_error)?;
            info!(%id, file = %file_name, size = payload.file_size, "registered upload");
            CreateVideoResponse {
                success: true,
                video: CreatedVideo { id, title: file_name },
                message: Some(UPLOAD_MESSAGE),
            }
        }
    };

    state.cache.clear();
    Ok(Json(response))
}

/// Creates the category on first use. The cache is cleared as soon as the row
/// exists, since a later failure in the same request skips the final clear.
async fn ensure_category_id(state: &AppState, name: Option<&str>) -> ApiResult<Option<String>> {
    let Some(name) = name else {
        return Ok(None);
    };
    if slugify(name).is_empty() {
        return Err(ApiError::bad_request("Invalid category"));
    }
    let category = state
        .catalog
        .ensure_category(name)
        .await
        .map_err(storage_error)?;
    state.cache.clear();
    Ok(Some(category.id))
}

async fn create_youtube_video(
    state: &AppState,
    url: String,
    category: Option<&str>,
    duration: Option<i64>,
) -> ApiResult<CreateVideoResponse> {
    let video_id =
        extract_video_id(&url).ok_or_else(|| ApiError::bad_request("Invalid YouTube URL format"))?;

    let client = state.http.clone();
    let lookup_url = url.clone();
    let meta = run_blocking(move || fetch_oembed(&*client, OEMBED_ENDPOINT, &lookup_url))
        .await?
        .map_err(|err| match err {
            OEmbedError::NotFound | OEmbedError::Status(_) => {
                ApiError::not_found("Video not found or embedding is disabled")
            }
            other => {
                warn!(%url, error = %other, "oEmbed lookup failed");
                ApiError::internal("Failed to create video")
            }
        })?;

    let channel_name = meta
        .author_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_CHANNEL.to_string());
    let author_url = meta.author_url.clone().filter(|url| !url.trim().is_empty());

    let avatar = match author_url.clone() {
        Some(channel_url) => {
            let resolver = state.resolver.clone();
            let video = video_id.clone();
            run_blocking(move || resolver.resolve(&channel_url, None, Some(&video))).await?
        }
        None => {
            info!(%url, "oEmbed response has no author_url, skipping avatar");
            None
        }
    };

    let category_id = ensure_category_id(state, category).await?;
    let channel = state
        .catalog
        .find_or_create_youtube_channel(&channel_name, author_url.as_deref(), avatar.as_deref())
        .await
        .map_err(storage_error)?;

    let title = meta
        .title
        .filter(|title| !title.trim().is_empty())
        .unwrap_or_else(|| UNTITLED_VIDEO.to_string());
    let video = NewVideo {
        title: title.clone(),
        description: None,
        thumbnail: meta.thumbnail_url,
        youtube_url: Some(url),
        youtube_id: Some(video_id.to_string()),
        duration,
        status: VideoStatus::Ready,
        channel_id: channel.id,
        category_id,
    };
    let id = state.catalog.insert_video(&video).await.map_err(storage_error)?;
    info!(%id, video = %video_id, channel = %channel_name, has_avatar = avatar.is_some(), "added YouTube video");

    Ok(CreateVideoResponse {
        success: true,
        video: CreatedVideo { id, title },
        message: None,
    })
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    category: Option<String>,
}

/// Grid entry shown on the browse page.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoCard {
    id: String,
    title: String,
    channel: String,
    channel_avatar: Option<String>,
    thumbnail: Option<String>,
    duration: Option<String>,
    views: i64,
    views_label: String,
    uploaded_at: String,
    status: VideoStatus,
}

impl VideoCard {
    fn from_record(record: &VideoRecord, now: chrono::DateTime<Utc>) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            channel: record.channel.name.clone(),
            channel_avatar: record.channel.avatar.clone(),
            thumbnail: record.thumbnail.clone(),
            duration: record.duration.map(format_duration),
            views: record.views,
            views_label: format!("{} views", format_views(record.views)),
            uploaded_at: relative_time(record.created_at, now),
            status: record.status,
        }
    }
}

async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<VideoCard>>> {
    let records = state.get_video_list(query.category.as_deref()).await?;
    let now = Utc::now();
    Ok(Json(
        records
            .iter()
            .map(|record| VideoCard::from_record(record, now))
            .collect(),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetail {
    #[serde(flatten)]
    record: VideoRecord,
    embed_url: Option<String>,
    duration_text: Option<String>,
    uploaded_at: String,
}

async fn get_video(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<VideoDetail>> {
    let record = state
        .catalog
        .get_video(&id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| ApiError::not_found("video not found"))?;
    let embed_url = record
        .youtube_id
        .as_deref()
        .and_then(VideoId::from_url_or_id)
        .map(|id| id.embed_url());
    Ok(Json(VideoDetail {
        embed_url,
        duration_text: record.duration.map(format_duration),
        uploaded_at: relative_time(record.created_at, Utc::now()),
        record,
    }))
}

async fn record_view(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Value>> {
    let views = state
        .catalog
        .record_view(&id)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| ApiError::not_found("video not found"))?;
    state.cache.clear();
    Ok(Json(json!({ "views": views })))
}

async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<Category>>> {
    let categories = state.get_categories().await?;
    Ok(Json((*categories).clone()))
}

#[derive(Debug, Deserialize)]
struct CategoryRequest {
    name: Option<String>,
}

async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CategoryRequest>,
) -> ApiResult<(StatusCode, Json<Category>)> {
    let name = payload
        .name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Category name is required"))?;
    if slugify(&name).is_empty() {
        return Err(ApiError::bad_request("Invalid category"));
    }
    let category = state
        .catalog
        .ensure_category(&name)
        .await
        .map_err(storage_error)?;
    state.cache.clear();
    Ok((StatusCode::CREATED, Json(category)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    question: Option<String>,
    video_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
}

/// Answers a question, optionally about one catalog video.
async fn ask(
    State(state): State<AppState>,
    Json(payload): Json<AskRequest>,
) -> ApiResult<Json<AskResponse>> {
    let question = payload
        .question
        .filter(|question| !question.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Question is required"))?;

    let context = match payload.video_id.as_deref() {
        Some(id) => match state.catalog.get_video(id).await {
            Ok(Some(video)) => Some(build_video_context(&VideoContext {
                title: &video.title,
                channel: &video.channel.name,
                description: video.description.as_deref(),
            })),
            Ok(None) => None,
            Err(err) => {
                warn!(video = id, error = %format!("{err:#}"), "failed to load video context");
                None
            }
        },
        None => None,
    };

    let Some(api_key) = state.openai_api_key.clone() else {
        return Err(ApiError::internal("OpenAI API key not configured"));
    };
    let client = state.http.clone();
    let answer = run_blocking(move || {
        Assistant::new(&*client, Some(&*api_key)).ask(&question, context.as_deref())
    })
    .await?
    .map_err(|err| match err {
        AssistantError::Upstream { status } => ApiError::upstream(status, err.to_string()),
        AssistantError::MissingKey => ApiError::internal(err.to_string()),
        AssistantError::Fetch(inner) => {
            warn!(error = %inner, "chat completion request failed");
            ApiError::internal("Internal server error")
        }
    })?;

    Ok(Json(AskResponse { answer }))
}

#[derive(Debug, Serialize)]
struct TranscribeResponse {
    transcript: String,
}

/// Turns a recorded question (multipart field `audio`) into text.
async fn transcribe(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<TranscribeResponse>> {
    let Some(api_key) = state.openai_api_key.clone() else {
        return Err(ApiError::internal("OpenAI API key is not configured"));
    };
    let clip = read_audio_field(&mut multipart)
        .await?
        .ok_or_else(|| ApiError::bad_request("No audio file provided"))?;

    let client = state.http.clone();
    let transcript = run_blocking(move || {
        Transcriber::new(&*client, Some(&*api_key)).transcribe(&clip)
    })
    .await?
    .map_err(|err| {
        warn!(error = %err, "transcription failed");
        ApiError::internal("Failed to transcribe audio").with_details(err.to_string())
    })?;

    Ok(Json(TranscribeResponse { transcript }))
}

async fn read_audio_field(multipart: &mut Multipart) -> ApiResult<Option<AudioClip>> {
    let malformed = |err: MultipartError| {
        ApiError::bad_request("Invalid multipart body").with_details(err.body_text())
    };
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(malformed)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some(AudioClip {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        }));
    }
    Ok(None)
}

impl AppState {
    async fn ensure_fresh_cache(&self) -> ApiResult<()> {
        let version = self.catalog.data_version().await.map_err(storage_error)?;

        let mut last = self.cache.last_db_version.write();
        if let Some(previous) = *last
            && version != previous
        {
            self.cache.clear();
        }
        *last = Some(version);
        Ok(())
    }

    async fn get_video_list(&self, category: Option<&str>) -> ApiResult<Arc<Vec<VideoRecord>>> {
        self.ensure_fresh_cache().await?;
        let key = category
            .map(|slug| slug.trim().to_ascii_lowercase())
            .filter(|slug| !slug.is_empty())
            .unwrap_or_else(|| ALL_CATEGORIES_KEY.to_string());
        let cached = self.cache.videos.read().get(&key).cloned();
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let slug = (key != ALL_CATEGORIES_KEY).then_some(key.as_str());
        let records = Arc::new(self.catalog.list_videos(slug).await.map_err(storage_error)?);
        self.cache.videos.write().insert(key, records.clone());
        Ok(records)
    }

    async fn get_categories(&self) -> ApiResult<Arc<Vec<Category>>> {
        self.ensure_fresh_cache().await?;
        let cached = self.cache.categories.read().clone();
        if let Some(cached) = cached {
            return Ok(cached);
        }
        let categories = Arc::new(self.catalog.list_categories().await.map_err(storage_error)?);
        self.cache.categories.write().replace(categories.clone());
        Ok(categories)
    }
}
