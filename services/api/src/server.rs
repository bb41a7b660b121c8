use crate::cli::ServeArgs;
use crate::infra::{load_directory, AppState, LogMailer};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use grantdesk::auth::TokenAuthority;
use grantdesk::config::AppConfig;
use grantdesk::error::AppError;
use grantdesk::telemetry;
use grantdesk::workflows::grants::{
    GrantApplicationService, GrantsState, InMemoryApplicationStore, NotificationDispatcher,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(users_csv) = args.users_csv.take() {
        config.directory.users_csv = Some(users_csv);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let users = Arc::new(load_directory(config.directory.users_csv.as_deref())?);
    let (dispatcher, worker) = NotificationDispatcher::channel(users.clone(), Arc::new(LogMailer));
    tokio::spawn(async move {
        let report = worker.run().await;
        info!(
            sent = report.sent,
            failed = report.failed,
            "notification worker finished"
        );
    });

    let service = Arc::new(GrantApplicationService::new(
        Arc::new(InMemoryApplicationStore::new()),
        users,
        dispatcher,
    ));
    let state = GrantsState {
        service,
        auth: Arc::new(TokenAuthority::from_config(&config.auth)),
    };

    let app = with_service_routes(state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "grant application service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
