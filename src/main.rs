use std::{future::IntoFuture, process, sync::Arc};

use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use weblog::{
    application::{
        analytics::AnalyticsSink,
        error::AppError,
        summary::{CompletionClient, SummaryService},
        tracking::TrackingService,
    },
    config,
    infra::{
        error::InfraError,
        gateway::GatewayClient,
        http::{self, HttpState},
        posthog::PostHogSink,
        telemetry,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let state = build_http_state(&settings)?;
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let grace = settings.server.graceful_shutdown;
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    // The grace period starts once the signal fires; the server future itself
    // waits for in-flight requests.
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace_secs = grace.as_secs(), "graceful shutdown timed out");
        }
    }

    Ok(())
}

fn build_http_state(settings: &config::Settings) -> Result<HttpState, AppError> {
    let sink: Arc<dyn AnalyticsSink> = Arc::new(PostHogSink::new(&settings.analytics)?);
    let tracking = TrackingService::new(sink, settings.analytics.api_key.clone());
    if !tracking.dispatch_enabled() {
        warn!("POSTHOG_API_KEY not configured; pixel fetches will not be reported");
    }

    let completion = GatewayClient::from_settings(&settings.summary)?
        .map(|client| Arc::new(client) as Arc<dyn CompletionClient>);
    if completion.is_none() {
        warn!("AI_GATEWAY_API_KEY not configured; summaries will be unavailable");
    }
    let summary = SummaryService::new(completion);

    Ok(HttpState {
        tracking: Arc::new(tracking),
        summary: Arc::new(summary),
    })
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
