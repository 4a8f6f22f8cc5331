use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use fitrelay_settings::{ServerSettings, WsHosting};
use fitrelay_store::ExerciseStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::api;
use crate::connection;
use crate::hub::ConnectionHub;

/// Ports the listeners actually bound. Equal when the socket is shared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundPorts {
    pub http: u16,
    pub websocket: u16,
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ConnectionHub>,
    pub settings: Arc<ServerSettings>,
    pub metrics: Option<PrometheusHandle>,
    pub ports: BoundPorts,
}

/// HTTP surface: REST API, health, metrics and the static web app.
pub fn build_router(state: AppState) -> Router {
    let static_dir = Path::new(&state.settings.static_dir);
    // Unknown paths get index.html so client-side routes resolve.
    let web_app = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    let mut router = Router::new()
        .route("/api", get(api::info))
        .route("/api/ejercicio", post(api::create_exercise))
        .route("/api/historial", get(api::history))
        .route("/api/estadisticas", get(api::statistics))
        .route("/health", get(api::health))
        .route("/metrics", get(api::metrics));

    if state.settings.ws_hosting == WsHosting::Shared {
        router = router.route("/ws", get(ws_handler));
    }

    router
        .fallback_service(web_app)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Dedicated WebSocket listener: every path upgrades.
pub fn build_ws_router(state: AppState) -> Router {
    Router::new().fallback(ws_handler).with_state(state)
}

/// Bind the listeners and start serving. Only bind failures are fatal.
pub async fn start(
    settings: ServerSettings,
    store: Arc<ExerciseStore>,
    metrics: Option<PrometheusHandle>,
) -> Result<ServerHandle, std::io::Error> {
    let hub = Arc::new(ConnectionHub::new(store));
    let host = settings.host.as_str();

    let http_listener = TcpListener::bind((host, settings.http_port)).await?;
    let http_addr = http_listener.local_addr()?;

    let ws_listener = match settings.ws_hosting {
        WsHosting::Dedicated => {
            Some(TcpListener::bind((host, settings.resolved_ws_port())).await?)
        }
        WsHosting::Shared => None,
    };
    let ws_addr = match &ws_listener {
        Some(listener) => listener.local_addr()?,
        None => http_addr,
    };

    let state = AppState {
        hub: Arc::clone(&hub),
        settings: Arc::new(settings),
        metrics,
        ports: BoundPorts {
            http: http_addr.port(),
            websocket: ws_addr.port(),
        },
    };

    let token = CancellationToken::new();
    let mut tasks = vec![serve(
        "http",
        http_listener,
        build_router(state.clone()),
        token.clone(),
    )];
    if let Some(listener) = ws_listener {
        tasks.push(serve(
            "websocket",
            listener,
            build_ws_router(state),
            token.clone(),
        ));
    }

    tracing::info!(
        http = %http_addr,
        websocket = %ws_addr,
        store = hub.store().source().as_str(),
        "fitrelay server started"
    );

    Ok(ServerHandle {
        http_addr,
        ws_addr,
        hub,
        token,
        tasks,
    })
}

fn serve(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
        {
            tracing::error!(listener = name, error = %e, "listener failed");
        }
    })
}

/// Handle returned by `start()`. Keeps the listener tasks alive.
pub struct ServerHandle {
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    hub: Arc<ConnectionHub>,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Stop accepting, drop every peer, and wait for the listeners to drain.
    pub async fn shutdown(self) {
        self.token.cancel();
        self.hub.close_all().await;
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::info!("fitrelay server stopped");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_ws_connection(socket, state.hub))
}
