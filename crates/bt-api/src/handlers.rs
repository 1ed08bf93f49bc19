//! # bt-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the
//! `Community` service. Reads render a page; writes redirect (303) to the
//! page showing the result.

use axum::extract::{Path, Query, State};
use axum::http::header::ACCEPT;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::{Form, Json};
use bt_core::feed::degrade;
use bt_core::models::{ArticleQuery, ReportTarget, ThreadKind, User};
use bt_core::moderation::ReviewAction;
use bt_core::validation::{NewPostForm, NewThreadForm, ProfileForm};
use bt_core::AppError;
use bt_ui::{
    AdminTemplate, ArticleTemplate, ArticlesTemplate, CommunityTemplate, HomeTemplate,
    NewThreadTemplate, NotificationsTemplate, ProfileTemplate, StaticPage, StaticTemplate,
    TeamBoardTemplate, ThreadFormValues, ThreadTemplate,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::{render, ApiError};
use crate::extract::{CurrentUser, MaybeUser};
use crate::state::AppState;

const HOME_ARTICLES: u32 = 3;
const ARTICLES_PER_PAGE: u32 = 12;

type PageResult = Result<Html<String>, ApiError>;

fn see_other(location: &str) -> Response {
    Redirect::to(location).into_response()
}

fn thread_url(thread_id: &str) -> String {
    format!("/community/thread/{thread_id}")
}

fn post_url(thread_id: &str, post_id: &str) -> String {
    format!("/community/thread/{thread_id}#post-{post_id}")
}

fn parse_kind(raw: Option<&str>) -> Result<Option<ThreadKind>, AppError> {
    raw.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::parse)
        .transpose()
}

// ── Pages ──────────────────────────────────────────────────────────────────

pub async fn home(State(state): State<AppState>, MaybeUser(viewer): MaybeUser) -> PageResult {
    let community = &state.community;
    let now = Utc::now();
    let article_query = ArticleQuery {
        per_page: HOME_ARTICLES,
        ..ArticleQuery::default()
    };

    let (matches, threads, articles, teams) = tokio::join!(
        degrade("home.matches", community.today_matches(now)),
        community.home_threads(),
        degrade("home.articles", state.articles.list_articles(&article_query)),
        degrade("home.teams", community.teams()),
    );

    render(&HomeTemplate::new(
        viewer.as_ref(),
        &matches,
        &threads,
        &articles,
        &teams,
        now,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct CommunityParams {
    pub kind: Option<String>,
}

pub async fn community(
    State(state): State<AppState>,
    Query(params): Query<CommunityParams>,
    MaybeUser(viewer): MaybeUser,
) -> PageResult {
    let kind = parse_kind(params.kind.as_deref())?;
    let threads = state.community.community_threads(kind).await;
    let teams = degrade("community.teams", state.community.teams()).await;
    render(&CommunityTemplate::new(
        viewer.as_ref(),
        kind,
        &threads,
        &teams,
        Utc::now(),
    ))
}

pub async fn team_board(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    MaybeUser(viewer): MaybeUser,
) -> PageResult {
    let board = state.community.team_board(&slug).await?;
    render(&TeamBoardTemplate::new(
        viewer.as_ref(),
        &board.team,
        &board.threads,
        Utc::now(),
    ))
}

pub async fn thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    MaybeUser(viewer): MaybeUser,
) -> PageResult {
    let detail = state.community.thread_detail(&thread_id, viewer.as_ref()).await?;
    render(&ThreadTemplate::new(viewer.as_ref(), &detail, Utc::now()))
}

pub async fn post_permalink(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Response, ApiError> {
    let post = state.community.post(&post_id).await?;
    Ok(see_other(&post_url(&post.thread_id, &post.id)))
}

// ── Threads and posts ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct NewThreadParams {
    pub kind: Option<String>,
    pub team_id: Option<String>,
    pub match_id: Option<String>,
}

async fn new_thread_page(
    state: &AppState,
    user: &User,
    form: ThreadFormValues,
    error: Option<String>,
) -> PageResult {
    let teams = degrade("new_thread.teams", state.community.teams()).await;
    let matches = degrade("new_thread.matches", state.community.today_matches(Utc::now())).await;
    render(&NewThreadTemplate::new(Some(user), form, error, &teams, &matches))
}

pub async fn new_thread_form(
    State(state): State<AppState>,
    Query(params): Query<NewThreadParams>,
    CurrentUser(user): CurrentUser,
) -> PageResult {
    let form = ThreadFormValues {
        kind: params.kind.unwrap_or_default(),
        team_id: params.team_id.unwrap_or_default(),
        match_id: params.match_id.unwrap_or_default(),
        ..ThreadFormValues::default()
    };
    new_thread_page(&state, &user, form, None).await
}

pub async fn create_thread(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<NewThreadForm>,
) -> Result<Response, ApiError> {
    let created = state.community.create_thread(&user, &form).await;
    match created {
        Ok(thread) => Ok(see_other(&thread_url(&thread.id))),
        Err(AppError::ValidationError(message)) => {
            let values = ThreadFormValues {
                title: form.title,
                content: form.content,
                tags: form.tags,
                kind: form.kind.map(|k| k.as_str().to_string()).unwrap_or_default(),
                team_id: form.team_id.unwrap_or_default(),
                match_id: form.match_id.unwrap_or_default(),
            };
            let page = new_thread_page(&state, &user, values, Some(message)).await?;
            Ok((StatusCode::BAD_REQUEST, page).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn create_post(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<NewPostForm>,
) -> Result<Response, ApiError> {
    let post = state.community.create_post(&user, &thread_id, &form).await?;
    Ok(see_other(&post_url(&post.thread_id, &post.id)))
}

/// Answers JSON to script clients (`Accept: application/json`), otherwise
/// redirects back to the post.
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    let outcome = state.community.toggle_like(&user, &post_id).await?;
    let wants_json = headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));
    if wants_json {
        return Ok(Json(outcome).into_response());
    }
    Ok(see_other(&format!("/community/posts/{post_id}")))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    let post = state.community.delete_post(&user, &post_id).await?;
    Ok(see_other(&thread_url(&post.thread_id)))
}

// ── Reports ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReportForm {
    pub reason: String,
    #[serde(default)]
    pub details: String,
}

pub async fn report_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ReportForm>,
) -> Result<Response, ApiError> {
    state
        .community
        .report(&user, ReportTarget::Post, &post_id, &form.reason, Some(form.details.as_str()))
        .await?;
    Ok(see_other(&format!("/community/posts/{post_id}")))
}

pub async fn report_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ReportForm>,
) -> Result<Response, ApiError> {
    state
        .community
        .report(&user, ReportTarget::User, &user_id, &form.reason, Some(form.details.as_str()))
        .await?;
    Ok(see_other(&format!("/community/user/{user_id}")))
}

#[derive(Debug, Default, Deserialize)]
pub struct AdminParams {
    pub filter: Option<String>,
}

pub async fn admin(
    State(state): State<AppState>,
    Query(params): Query<AdminParams>,
    CurrentUser(user): CurrentUser,
) -> PageResult {
    let include_closed = params.filter.as_deref() == Some("all");
    let reports = state.community.moderation_queue(&user, include_closed).await?;
    render(&AdminTemplate::new(&user, &reports, include_closed, Utc::now()))
}

#[derive(Debug, Deserialize)]
pub struct ReviewForm {
    pub action: ReviewAction,
}

pub async fn review_report(
    State(state): State<AppState>,
    Path(report_id): Path<String>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ReviewForm>,
) -> Result<Response, ApiError> {
    state
        .community
        .review_report(&user, &report_id, form.action)
        .await?;
    Ok(see_other("/admin"))
}

// ── Profiles ───────────────────────────────────────────────────────────────

pub async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    MaybeUser(viewer): MaybeUser,
) -> PageResult {
    let page = state.community.profile(&user_id, viewer.as_ref()).await?;
    render(&ProfileTemplate::new(viewer.as_ref(), &page, Utc::now()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ProfileForm>,
) -> Result<Response, ApiError> {
    let user = state.community.update_profile(&user, &form).await?;
    Ok(see_other(&format!("/community/user/{}", user.id)))
}

pub async fn add_favorite(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    let team = state.community.team_by_route_key(&team_id).await?;
    state.community.add_favorite_team(&user, &team.id).await?;
    Ok(see_other(&format!("/community/team/{}", team.route_key())))
}

pub async fn remove_favorite(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    state.community.remove_favorite_team(&user, &team_id).await?;
    Ok(see_other(&format!("/community/user/{}", user.id)))
}

// ── Notifications ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub unread: bool,
}

pub async fn notifications(
    State(state): State<AppState>,
    Query(params): Query<NotificationParams>,
    CurrentUser(user): CurrentUser,
) -> PageResult {
    let items = state.community.notifications(&user, params.unread).await?;
    render(&NotificationsTemplate::new(&user, &items, params.unread, Utc::now()))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
    CurrentUser(user): CurrentUser,
) -> Result<Response, ApiError> {
    state
        .community
        .mark_notification_read(&user, &notification_id)
        .await?;
    Ok(see_other("/notifications"))
}

// ── Articles and fixed pages ───────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ArticleParams {
    pub page: Option<u32>,
    pub category: Option<u64>,
}

pub async fn articles(
    State(state): State<AppState>,
    Query(params): Query<ArticleParams>,
    MaybeUser(viewer): MaybeUser,
) -> PageResult {
    let page = params.page.unwrap_or(1).max(1);
    let query = ArticleQuery {
        page,
        per_page: ARTICLES_PER_PAGE,
        category_ids: params.category.into_iter().collect(),
    };
    let articles = degrade("articles.list", state.articles.list_articles(&query)).await;
    let categories = degrade("articles.categories", state.articles.list_categories()).await;
    render(&ArticlesTemplate::new(
        viewer.as_ref(),
        &articles,
        &categories,
        params.category,
        page,
        ARTICLES_PER_PAGE,
    ))
}

pub async fn article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    MaybeUser(viewer): MaybeUser,
) -> PageResult {
    let found = degrade("articles.detail", state.articles.get_article(&slug)).await;
    let article = found.ok_or_else(|| AppError::not_found("Article", slug))?;
    render(&ArticleTemplate::new(viewer.as_ref(), &article))
}

async fn static_page(viewer: Option<User>, page: StaticPage) -> PageResult {
    render(&StaticTemplate::new(viewer.as_ref(), page))
}

pub async fn about(MaybeUser(viewer): MaybeUser) -> PageResult {
    static_page(viewer, StaticPage::About).await
}

pub async fn rules(MaybeUser(viewer): MaybeUser) -> PageResult {
    static_page(viewer, StaticPage::Rules).await
}

pub async fn privacy(MaybeUser(viewer): MaybeUser) -> PageResult {
    static_page(viewer, StaticPage::Privacy).await
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn not_found() -> ApiError {
    ApiError(AppError::not_found("Page", "-"))
}
