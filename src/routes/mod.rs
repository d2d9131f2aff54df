//! API Routes module for the 9Anime resolver
//!
//! Thin JSON handlers over the `NineAnime` provider. Nothing is cached;
//! every request goes to the site.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::constants::endpoints;
use crate::error::{AppError, AppResult};
use crate::models::{
    ApiError, ApiResponse, CatalogEntry, EpisodeDescriptor, EpisodeLinks, LanguageAvailability,
    LanguageVariant, LoadedSeries, MirrorKind, Quality, Section, SectionLink, SeriesDetail,
    SeriesKind, SeriesStatus, StreamVariant, SubtitleDescriptor,
};
use crate::provider::NineAnime;

/// Application state shared across handlers
pub struct AppState {
    pub provider: NineAnime,
}

/// GET /api/sections - Home page sections
#[utoipa::path(
    get,
    path = "/api/sections",
    tag = "catalog",
    responses(
        (status = 200, description = "Home sections and their page URLs", body = Vec<SectionLink>)
    )
)]
pub async fn get_sections(data: web::Data<AppState>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::new(data.provider.main_page())))
}

/// Query parameters for paged listings
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct PageQuery {
    /// Page number (default: 1)
    pub page: Option<u32>,
}

/// GET /api/home/{section} - One page of a home section
#[utoipa::path(
    get,
    path = "/api/home/{section}",
    tag = "catalog",
    params(
        ("section" = String, Path, description = "Section slug, e.g. trending or updated-dub"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Entries of the requested page", body = Vec<CatalogEntry>),
        (status = 400, description = "Invalid page number", body = ApiError),
        (status = 404, description = "Unknown section", body = ApiError),
        (status = 502, description = "The site could not be read", body = ApiError)
    )
)]
pub async fn get_home_section(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> AppResult<HttpResponse> {
    let slug = path.into_inner();
    let section = Section::from_slug(&slug)
        .ok_or_else(|| AppError::not_found(format!("Unknown section: {}", slug)))?;

    let page = query.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::validation("Page numbers start at 1"));
    }

    info!("Listing {} page {}", slug, page);
    let url = endpoints::home_widget(&data.provider.config().base_url, section);
    let entries = data.provider.list_page(&url, page).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(entries)))
}

/// Query parameters for search endpoints
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct SearchQuery {
    /// Search keyword
    pub q: Option<String>,
}

impl SearchQuery {
    fn keyword(&self) -> AppResult<&str> {
        match &self.q {
            Some(q) if !q.trim().is_empty() => Ok(q.trim()),
            _ => Err(AppError::validation("Search query is required")),
        }
    }
}

/// GET /api/search - Full search
///
/// Query parameter: q (required) - search keyword
#[utoipa::path(
    get,
    path = "/api/search",
    tag = "catalog",
    params(SearchQuery),
    responses(
        (status = 200, description = "Search results retrieved successfully", body = Vec<CatalogEntry>),
        (status = 400, description = "Bad request - search query is required", body = ApiError),
        (status = 503, description = "Request signing unavailable", body = ApiError)
    )
)]
pub async fn search(
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let keyword = query.keyword()?;
    info!("Searching for: {}", keyword);
    let results = data.provider.search(keyword).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(results)))
}

/// GET /api/quick-search - Search suggestions
#[utoipa::path(
    get,
    path = "/api/quick-search",
    tag = "catalog",
    params(SearchQuery),
    responses(
        (status = 200, description = "Suggestions, possibly empty", body = Vec<CatalogEntry>),
        (status = 400, description = "Bad request - search query is required", body = ApiError),
        (status = 503, description = "Request signing unavailable", body = ApiError)
    )
)]
pub async fn quick_search(
    data: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let keyword = query.keyword()?;
    let results = data.provider.quick_search(keyword).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(results)))
}

/// Query parameters for the detail endpoint
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct DetailQuery {
    /// Detail page URL as returned by listings and search
    pub url: Option<String>,
}

/// GET /api/detail - Series detail and episodes
#[utoipa::path(
    get,
    path = "/api/detail",
    tag = "catalog",
    params(DetailQuery),
    responses(
        (status = 200, description = "Series detail with one descriptor per episode and language", body = LoadedSeries),
        (status = 400, description = "Missing or invalid URL", body = ApiError),
        (status = 502, description = "Detail page markup not recognized", body = ApiError)
    )
)]
pub async fn get_detail(
    data: web::Data<AppState>,
    query: web::Query<DetailQuery>,
) -> AppResult<HttpResponse> {
    let url = match &query.url {
        Some(u) if u.starts_with("http://") || u.starts_with("https://") => u.trim(),
        _ => return Err(AppError::validation("An absolute detail URL is required")),
    };

    info!("Loading detail: {}", url);
    let loaded = data.provider.load_detail(url).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(loaded)))
}

/// POST /api/links - Resolve an episode descriptor into streams
#[utoipa::path(
    post,
    path = "/api/links",
    tag = "streams",
    request_body = EpisodeDescriptor,
    responses(
        (status = 200, description = "Streams and subtitles for the descriptor's language", body = EpisodeLinks),
        (status = 404, description = "No mirror produced a playable stream", body = ApiError),
        (status = 502, description = "Manifest could not be read", body = ApiError),
        (status = 503, description = "Request signing unavailable", body = ApiError)
    )
)]
pub async fn resolve_links(
    data: web::Data<AppState>,
    body: web::Json<EpisodeDescriptor>,
) -> AppResult<HttpResponse> {
    let descriptor = body.into_inner();
    info!(
        "Resolving links for {} ({})",
        descriptor.episode_url, descriptor.language_variant
    );
    let links = data.provider.episode_links(&descriptor).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::new(links)))
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "9Anime Resolver API",
        version = "0.1.0",
        description = "Catalog browsing and stream resolution for 9anime",
        license(
            name = "MIT"
        )
    ),
    paths(
        get_sections,
        get_home_section,
        search,
        quick_search,
        get_detail,
        resolve_links
    ),
    components(
        schemas(
            Section,
            SectionLink,
            CatalogEntry,
            LanguageAvailability,
            LanguageVariant,
            SeriesDetail,
            SeriesStatus,
            SeriesKind,
            LoadedSeries,
            EpisodeDescriptor,
            EpisodeLinks,
            StreamVariant,
            SubtitleDescriptor,
            MirrorKind,
            Quality,
            ApiError,
            PageQuery,
            SearchQuery,
            DetailQuery
        )
    ),
    tags(
        (name = "catalog", description = "Home sections, search and detail pages"),
        (name = "streams", description = "Episode stream resolution")
    )
)]
pub struct ApiDoc;

/// Configure API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/sections", web::get().to(get_sections))
            .route("/home/{section}", web::get().to(get_home_section))
            .route("/search", web::get().to(search))
            .route("/quick-search", web::get().to(quick_search))
            .route("/detail", web::get().to(get_detail))
            .route("/links", web::post().to(resolve_links)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::{StubFetcher, StubSandbox};
    use actix_web::{http::StatusCode, test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn state(fetcher: StubFetcher, sandbox: StubSandbox) -> web::Data<AppState> {
        let sandbox = Arc::new(sandbox);
        web::Data::new(AppState {
            provider: NineAnime::with_parts(
                Config::default(),
                Arc::new(fetcher),
                Arc::new(StubSandbox::session(&sandbox)),
            ),
        })
    }

    #[actix_web::test]
    async fn test_sections() {
        let app = test::init_service(
            App::new()
                .app_data(state(StubFetcher::new(), StubSandbox::new()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/sections").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(6));
        assert_eq!(body["data"][0]["section"], "trending");
    }

    #[actix_web::test]
    async fn test_home_section() {
        let listing = json!({
            "result": r#"<div class="item"><div class="info"><a class="name" href="/watch/bleach.2">Bleach</a></div></div>"#
        })
        .to_string();
        let app = test::init_service(
            App::new()
                .app_data(state(
                    StubFetcher::new().page("https://9anime.id/ajax/home/widget/updated-sub?page=2", &listing),
                    StubSandbox::new(),
                ))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/api/home/updated-sub?page=2")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"][0]["title"], "Bleach");
        assert_eq!(body["data"][0]["detailUrl"], "https://9anime.id/watch/bleach.2");
    }

    #[actix_web::test]
    async fn test_unknown_section_is_not_found() {
        let app = test::init_service(
            App::new()
                .app_data(state(StubFetcher::new(), StubSandbox::new()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/home/popular").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_search_requires_query() {
        let app = test::init_service(
            App::new()
                .app_data(state(StubFetcher::new(), StubSandbox::new()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/search?q=%20").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_search_token_failure_is_service_unavailable() {
        let app = test::init_service(
            App::new()
                .app_data(state(StubFetcher::new(), StubSandbox::new().failing_wake()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/search?q=naruto").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn test_links_without_host_is_not_found() {
        let episode_url = "https://9anime.id/watch/frieren.3q5/ep-5";
        let app = test::init_service(
            App::new()
                .app_data(state(
                    StubFetcher::new().page(episode_url, "<html></html>"),
                    StubSandbox::new(),
                ))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/links")
            .set_json(json!({
                "number": 5,
                "title": null,
                "episodeUrl": episode_url,
                "languageVariant": "dub"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_detail_requires_absolute_url() {
        let app = test::init_service(
            App::new()
                .app_data(state(StubFetcher::new(), StubSandbox::new()))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/detail?url=/watch/x").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
