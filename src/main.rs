use std::{process, sync::Arc};

use civic_reports::{
    application::{
        assets::{AssetJanitor, AssetStore},
        error::AppError,
        ingest::IngestionCoordinator,
        media::MediaProcessor,
        notify::{LogNotifier, NotificationDispatcher, Notifier},
        reports::ReportService,
        repos::{HealthRepo, ReportsRepo, ReportsWriteRepo, SequenceRepo},
    },
    config::{self, StorageBackend},
    infra::{
        assets::ObjectAssetStore,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, api::middleware::ModeratorAuth},
        notify::EmailNotifier,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

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
        config::Command::InitSchema(_) => {
            init_repositories(&settings).await?;
            info!("schema ready");
            Ok(())
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_api_state(repositories, &settings)?;
    serve_http(&settings, state).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let repositories = PostgresRepositories::new(pool, settings.store.clone());
    repositories
        .ensure_schema()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(repositories))
}

fn build_api_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApiState, AppError> {
    let reports_repo: Arc<dyn ReportsRepo> = repositories.clone();
    let reports_write_repo: Arc<dyn ReportsWriteRepo> = repositories.clone();
    let sequence_repo: Arc<dyn SequenceRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories;

    let object_store =
        Arc::new(ObjectAssetStore::from_settings(&settings.storage).map_err(AppError::from)?);
    let served_media = matches!(settings.storage.backend, StorageBackend::Local { .. })
        .then(|| object_store.clone());
    let asset_store: Arc<dyn AssetStore> = object_store;
    let janitor = AssetJanitor::new(asset_store.clone());
    let media = MediaProcessor::new(asset_store, janitor, settings.media);

    let notifier: Arc<dyn Notifier> = match settings.notifier.as_ref() {
        Some(smtp) => Arc::new(
            EmailNotifier::from_settings(smtp)
                .map_err(|err| AppError::from(InfraError::notifier(err.to_string())))?,
        ),
        None => {
            info!("smtp is not configured, notifications are logged only");
            Arc::new(LogNotifier)
        }
    };

    if settings.auth.jwt_secret.is_none() {
        warn!("auth.jwt_secret is not set, moderator routes will reject every request");
    }

    let deadline = settings.server.request_deadline;
    let ingest = IngestionCoordinator::new(
        reports_write_repo.clone(),
        sequence_repo,
        media,
        NotificationDispatcher::new(notifier),
    )
    .with_deadline(deadline);
    let reports = ReportService::new(reports_repo, reports_write_repo).with_deadline(deadline);

    Ok(ApiState {
        ingest: Arc::new(ingest),
        reports: Arc::new(reports),
        auth: Arc::new(ModeratorAuth::new(settings.auth.jwt_secret.as_deref())),
        health: health_repo,
        media: served_media,
    })
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_router(state, settings.server.max_request_bytes.get());

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|err| AppError::from(InfraError::from(err)))?;
        }
    }

    info!(
        timeout_secs = settings.server.graceful_shutdown.as_secs(),
        "shutting down"
    );
    let _ = shutdown_tx.send(());
    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(_) => {
            warn!("graceful shutdown timed out, dropping open connections");
            Ok(())
        }
    }
}
