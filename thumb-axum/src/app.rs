use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::post;
use axum::Router;
use thumb_pipeline::Pipeline;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::rest;
use crate::{ServerSettings, ThumbAxumState};

#[derive(Clone)]
pub struct AxumApp {
    pub state: ThumbAxumState,
    pub router: Router<()>,
}

impl AxumApp {
    pub fn new(pipeline: Pipeline, settings: ServerSettings) -> Self {
        let state = ThumbAxumState::new(pipeline, settings);
        let router = Router::new()
            .route("/", post(rest::generate_default))
            .route("/{option}", post(rest::generate))
            .layer(DefaultBodyLimit::disable())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                        let request_id = req
                            .headers()
                            .get("x-request-id")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-");
                        tracing::info_span!(
                            "request",
                            method = %req.method(),
                            uri = %req.uri(),
                            request_id = %request_id,
                        )
                    }))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
            .with_state(state.clone());

        Self { state, router }
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "listening");
        axum::serve(listener, self.router).await?;
        Ok(())
    }
}

pub fn axum(pipeline: Pipeline, settings: ServerSettings) -> AxumApp {
    AxumApp::new(pipeline, settings)
}
