use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use pantry_core::error::ShoppingListError;
use pantry_core::export::ExportFormat;
use pantry_core::models::{AggregatedItem, Ingredient, MissingRecipeData, RecipeId, UserId};
use pantry_core::service::PantryService;

const BODY_LIMIT: usize = 64 * 1024; // 64 KB

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const USER_ID_HEADER: &str = "x-user-id";

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

#[derive(Clone)]
struct AppState {
    service: Arc<PantryService>,
    api_key: Option<String>,
    search_limit_max: usize,
}

pub struct ServerOptions {
    pub port: u16,
    pub bind: String,
    pub api_key: Option<String>,
    pub search_limit_max: usize,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct IngredientSearchQuery {
    #[serde(default)]
    name: String,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct ExportQuery {
    format: Option<String>,
}

#[derive(Serialize)]
struct ShoppingListResponse {
    items: Vec<AggregatedItem>,
    missing_recipes: Vec<MissingRecipeData>,
}

#[derive(Serialize)]
struct CartEntryResponse {
    user_id: UserId,
    recipe_id: RecipeId,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<ShoppingListError> for ApiError {
    fn from(err: ShoppingListError) -> Self {
        match err {
            ShoppingListError::Storage(inner) => Self::Internal(inner),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

// --- Authentication ---

/// The acting user, read from [`USER_ID_HEADER`].
struct CurrentUser(UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<UserId>().ok())
            .filter(|id| *id > 0)
            .map(CurrentUser)
            .ok_or_else(|| ApiError::Unauthorized("Missing or invalid user id".to_string()))
    }
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return ApiError::Unauthorized("Invalid or missing API key".to_string()).into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Handlers ---

async fn search_ingredients(
    State(state): State<AppState>,
    Query(params): Query<IngredientSearchQuery>,
) -> Json<Vec<Ingredient>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .min(state.search_limit_max);
    Json(state.service.search_ingredients(&params.name, limit))
}

async fn get_shopping_list(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<ShoppingListResponse>, ApiError> {
    match state.service.build_shopping_list(user_id) {
        Ok(list) => Ok(Json(ShoppingListResponse {
            items: list.items,
            missing_recipes: list.missing_recipes,
        })),
        Err(ShoppingListError::EmptyCart { .. }) => Ok(Json(ShoppingListResponse {
            items: Vec::new(),
            missing_recipes: Vec::new(),
        })),
        Err(err) => Err(err.into()),
    }
}

async fn export_shopping_list(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let format = match params.format.as_deref() {
        Some(f) => f
            .parse::<ExportFormat>()
            .map_err(|e| ApiError::BadRequest(format!("{e}")))?,
        None => ExportFormat::default(),
    };

    let export = state.service.export_shopping_list(user_id, format)?;
    for missing in &export.missing_recipes {
        warn!(
            user_id,
            recipe_id = missing.recipe_id,
            reason = %missing.reason,
            "recipe skipped in shopping list export"
        );
    }

    let disposition = format!("attachment; filename=\"{}\"", export.filename);
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("invalid content disposition: {e}")))?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(export.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.body,
    )
        .into_response())
}

async fn add_to_cart(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(recipe_id): Path<RecipeId>,
) -> Result<(StatusCode, Json<CartEntryResponse>), ApiError> {
    let db = state.service.db();
    if db.get_recipe(recipe_id)?.is_none() {
        return Err(ApiError::NotFound(format!("Recipe {recipe_id} not found")));
    }
    if !db.add_to_cart(user_id, recipe_id)? {
        return Err(ApiError::BadRequest(format!(
            "Recipe {recipe_id} is already in the shopping cart"
        )));
    }
    Ok((
        StatusCode::CREATED,
        Json(CartEntryResponse { user_id, recipe_id }),
    ))
}

async fn remove_from_cart(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(recipe_id): Path<RecipeId>,
) -> Result<StatusCode, ApiError> {
    if state.service.db().remove_from_cart(user_id, recipe_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::BadRequest(format!(
            "Recipe {recipe_id} is not in the shopping cart"
        )))
    }
}

// --- Router ---

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/ingredients", get(search_ingredients))
        .route("/api/shopping-list", get(get_shopping_list))
        .route("/api/shopping-list/export", get(export_shopping_list))
        .route(
            "/api/recipes/{id}/shopping_cart",
            post(add_to_cart).delete(remove_from_cart),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(service: PantryService, options: ServerOptions) -> anyhow::Result<()> {
    let ServerOptions {
        port,
        bind,
        api_key,
        search_limit_max,
    } = options;

    if let Some(ref key) = api_key {
        let tail = key.get(key.len().saturating_sub(4)..).unwrap_or_default();
        info!("API key ...{tail} (see api_key file in data directory)");
    } else {
        warn!("authentication disabled (--no-auth), API is open to anyone");
        if bind != "127.0.0.1" && bind != "localhost" {
            warn!("listening on {bind} with no authentication");
        }
    }

    let state = AppState {
        service: Arc::new(service),
        api_key,
        search_limit_max,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}")).await?;
    info!("listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use pantry_core::models::Amount;

    const KEY: &str = "test-key-abc123";

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    /// Two recipes sharing "Tomato (g)"; user 1 has both in the cart.
    fn seeded_service() -> PantryService {
        let service = PantryService::open_in_memory().unwrap();
        let (tomato, _) = service.add_ingredient("Tomato", "g").unwrap();
        let (milk, _) = service.add_ingredient("Milk", "ml").unwrap();
        service.add_ingredient("Tofu", "g").unwrap();
        {
            let db = service.db();
            let salad = db.create_recipe("Salad").unwrap();
            db.set_recipe_ingredients(salad.id, &[(tomato.id, amount("200"))])
                .unwrap();
            let soup = db.create_recipe("Soup").unwrap();
            db.set_recipe_ingredients(
                soup.id,
                &[(tomato.id, amount("150")), (milk.id, amount("300"))],
            )
            .unwrap();
            db.add_to_cart(1, salad.id).unwrap();
            db.add_to_cart(1, soup.id).unwrap();
        }
        service
    }

    fn test_app(api_key: Option<&str>) -> Router {
        build_router(AppState {
            service: Arc::new(seeded_service()),
            api_key: api_key.map(String::from),
            search_limit_max: 100,
        })
    }

    fn get_as(uri: &str, user: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri)
            .header(USER_ID_HEADER, user)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn auth_missing_key_returns_401() {
        let app = test_app(Some(KEY));

        let response = app.oneshot(get_as("/api/shopping-list", "1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn auth_correct_key_succeeds() {
        let app = test_app(Some(KEY));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/shopping-list")
                    .header("Authorization", format!("Bearer {KEY}"))
                    .header(USER_ID_HEADER, "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_user_id_returns_401() {
        let app = test_app(None);

        let response = app
            .oneshot(
                axum::http::Request::get("/api/shopping-list/export")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let app = test_app(None);
        let response = app
            .oneshot(get_as("/api/shopping-list/export", "abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = test_app(None);

        let response = app
            .oneshot(get_as("/api/ingredients?name=to", "1"))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            headers.get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[tokio::test]
    async fn export_merges_shared_ingredients() {
        let app = test_app(None);

        let response = app
            .oneshot(get_as("/api/shopping-list/export", "1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"shopping_list.txt\""
        );
        assert_eq!(
            body_string(response).await,
            "Milk \u{2014} 300 ml\nTomato \u{2014} 350 g\n"
        );
    }

    #[tokio::test]
    async fn export_empty_cart_returns_placeholder() {
        let app = test_app(None);

        let response = app
            .oneshot(get_as("/api/shopping-list/export", "2"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "Shopping list is empty.\n");
    }

    #[tokio::test]
    async fn export_csv_and_unknown_format() {
        let app = test_app(None);
        let response = app
            .oneshot(get_as("/api/shopping-list/export?format=csv", "1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            "name,measurement_unit,total_amount\nMilk,ml,300\nTomato,g,350\n"
        );

        let app = test_app(None);
        let response = app
            .oneshot(get_as("/api/shopping-list/export?format=pdf", "1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn shopping_list_json() {
        let app = test_app(None);

        let response = app.oneshot(get_as("/api/shopping-list", "1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["items"].as_array().unwrap().len(), 2);
        assert_eq!(json["items"][1]["name"], "Tomato");
        assert_eq!(json["items"][1]["total_amount"], "350");
        assert_eq!(json["missing_recipes"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn shopping_list_empty_cart_is_ok() {
        let app = test_app(None);

        let response = app.oneshot(get_as("/api/shopping-list", "9")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(json["items"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ingredient_search_by_prefix() {
        let app = test_app(None);

        let response = app
            .oneshot(get_as("/api/ingredients?name=TO", "1"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Tofu", "Tomato"]);
    }

    #[tokio::test]
    async fn ingredient_search_blank_and_limited() {
        let app = test_app(None);
        let response = app.oneshot(get_as("/api/ingredients", "1")).await.unwrap();
        assert_eq!(body_string(response).await, "[]");

        let app = test_app(None);
        let response = app
            .oneshot(get_as("/api/ingredients?name=t&limit=1", "1"))
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cart_add_and_remove() {
        let app = test_app(None);
        let send = |method: &str, uri: &str| {
            axum::http::Request::builder()
                .method(method)
                .uri(uri)
                .header(USER_ID_HEADER, "2")
                .body(Body::empty())
                .unwrap()
        };

        let response = app
            .clone()
            .oneshot(send("POST", "/api/recipes/1/shopping_cart"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(send("POST", "/api/recipes/1/shopping_cart"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(send("POST", "/api/recipes/999/shopping_cart"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(send("DELETE", "/api/recipes/1/shopping_cart"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(send("DELETE", "/api/recipes/1/shopping_cart"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let response = ApiError::Internal(anyhow::anyhow!("secret db path /var/x")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_string(response).await;
        assert!(!body.contains("secret"));
        assert!(body.contains("Internal server error"));
    }
}
