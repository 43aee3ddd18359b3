use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use connect_api::{
    AppState, AppStateInner, DeliveryLocks, messages, reactions, search, threads, users, workspace,
};
use connect_gateway::connection;
use connect_gateway::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connect=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("CONNECT_DB_PATH").unwrap_or_else(|_| "connect.db".into());
    let host = std::env::var("CONNECT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CONNECT_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init store
    let db = connect_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher: dispatcher.clone(),
        threads: threads::ThreadSessions::new(),
        delivery: DeliveryLocks::new(),
    });

    // Routes
    let api_routes = Router::new()
        // Workspace directory
        .route("/teams", get(workspace::list_teams))
        .route("/teams", post(workspace::create_team))
        .route("/teams/{team_id}", get(workspace::get_team))
        .route("/teams/{team_id}/channels", get(workspace::list_channels))
        .route("/teams/{team_id}/channels", post(workspace::create_channel))
        .route("/channels/{channel_id}", get(workspace::get_channel))
        // Messages
        .route("/channels/{channel_id}/messages", get(messages::get_messages))
        .route("/channels/{channel_id}/messages", post(messages::send_message))
        .route(
            "/channels/{channel_id}/messages/{message_id}/pin",
            put(messages::pin_message),
        )
        .route(
            "/channels/{channel_id}/messages/{message_id}/reactions",
            post(reactions::add_reaction),
        )
        // Threads
        .route("/messages/{message_id}/thread", get(threads::get_thread))
        .route("/messages/{message_id}/thread/open", post(threads::open_thread))
        .route("/messages/{message_id}/thread/replies", post(threads::reply_to_thread))
        .route("/thread/close", post(threads::close_thread))
        // Users & presence
        .route("/users", get(users::list_users))
        .route("/users", put(users::upsert_user))
        .route("/users/{user_id}", get(users::get_user))
        .route("/users/{user_id}/presence", get(users::get_user_presence))
        .route("/presence", get(users::get_presence))
        // Search
        .route("/search", get(search::search))
        .with_state(state);

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(dispatcher);

    let app = Router::new()
        .merge(api_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Connect server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(State(dispatcher): State<Dispatcher>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher))
}
