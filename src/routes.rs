use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::handler::{self, AppState};

pub fn routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handler::healthcheck))
        .route(
            "/highlights",
            get(handler::list_highlights).post(handler::create_highlight),
        )
        .route("/highlights/import", post(handler::import_highlights))
        .route(
            "/highlights/:id",
            get(handler::get_highlight)
                .put(handler::update_highlight)
                .delete(handler::delete_highlight),
        )
        .route("/render", post(handler::render))
        .route("/capture", post(handler::capture_selection))
        .route("/messages", post(handler::handle_message))
        .layer(cors)
        .with_state(state)
}
