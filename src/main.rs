use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use docflow::config::AppConfig;
use docflow::error::AppError;
use docflow::telemetry;
use docflow::workflows::intake::domain::{DashboardMessages, FormContent};
use docflow::workflows::intake::{
    intake_router, AdminVerdict, Company, CompanyId, CompletedBy, Dashboard, DashboardId,
    DeliveryCallback, DeviceKind, DocFormat, DocumentSpec, DraftDashboard, IntakeError,
    IntakePolicy, IntakeService, IntakeStore, MemoryInfra, MessageDeliveryStatus, PersonName,
    SystemCheckStatus, UserId,
};

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Document Intake Orchestrator",
    about = "Run the applicant document intake and review service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Walk a scripted intake scenario against the in-memory store
    Demo,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Demo => run_demo(),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let infra = MemoryInfra::default();
    let policy = IntakePolicy {
        auto_reject_failed_checks: config.intake.auto_reject_failed_checks,
        max_page_bytes: config.intake.max_page_bytes,
    };
    let service = Arc::new(IntakeService::new(
        infra.store.clone(),
        infra.blobs.clone(),
        infra.queue.clone(),
        infra.delivery.clone(),
        policy,
    ));

    let ops = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state);
    let app = ops.merge(intake_router(service)).layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "document intake orchestrator ready");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// End-to-end scripted run: publish a dashboard, enroll an applicant, submit
/// and review a two-document form, then print the resulting counters.
fn run_demo() -> Result<(), AppError> {
    let now = Utc::now();
    let infra = MemoryInfra::default();
    let service = IntakeService::new(
        infra.store.clone(),
        infra.blobs.clone(),
        infra.queue.clone(),
        infra.delivery.clone(),
        IntakePolicy::default(),
    );

    let company_id = CompanyId("acme".to_string());
    let dashboard_id = DashboardId("warehouse-2026".to_string());

    infra
        .store
        .insert_company(Company {
            id: company_id.clone(),
            created_at: now,
            name: "Acme Logistics".to_string(),
            users: vec![UserId("user-admin".to_string())],
            logo: None,
        })
        .map_err(IntakeError::from)?;

    let mut docs = BTreeMap::new();
    docs.insert(
        "passport".to_string(),
        DocumentSpec {
            format: DocFormat::Jpeg,
            sample: None,
            instructions: Some("Photograph both pages of the identity spread.".to_string()),
            ordinal: 1,
            page_count: 2,
            requires_manual_review: true,
        },
    );
    docs.insert(
        "contract".to_string(),
        DocumentSpec {
            format: DocFormat::Pdf,
            sample: None,
            instructions: None,
            ordinal: 2,
            page_count: 1,
            requires_manual_review: false,
        },
    );
    infra
        .store
        .insert_dashboard(
            &company_id,
            Dashboard::Draft(DraftDashboard {
                id: dashboard_id.clone(),
                created_at: now,
                created_by: UserId("user-admin".to_string()),
                country: "NL".to_string(),
                job: "Warehouse Operative".to_string(),
                title: "Warehouse intake 2026".to_string(),
                deadline: now + Duration::days(30),
                form_content: Some(FormContent {
                    header: "Upload your documents".to_string(),
                    caption: "We need your passport and signed contract.".to_string(),
                }),
                docs,
                applicants: Vec::new(),
                messages: Some(DashboardMessages {
                    opening: "Welcome! Please submit your documents before the deadline."
                        .to_string(),
                }),
            }),
        )
        .map_err(IntakeError::from)?;

    println!("Document intake demo");
    println!("====================");

    let published = service.publish_dashboard(&company_id, &dashboard_id)?;
    println!("published dashboard '{}' ({} slots)", published.title, published.docs.len());

    let applicant = service.add_applicant(
        &company_id,
        &dashboard_id,
        "sam@example.com",
        Some(PersonName {
            first: "Sam".to_string(),
            last: "Driver".to_string(),
        }),
    )?;
    let form_id = applicant.form_id.clone().expect("enrollment creates a form");
    println!("enrolled applicant {} (form {})", applicant.id, form_id);

    let opening = applicant
        .latest_message
        .clone()
        .expect("enrollment sends the opening message");
    service.record_delivery(
        &company_id,
        &dashboard_id,
        &applicant.id,
        DeliveryCallback {
            message_id: opening.id,
            status: MessageDeliveryStatus::Delivered,
            reject_reason: None,
            analytics: None,
        },
    )?;
    println!("opening message delivered");

    service.submit_page(&form_id, "passport", 1, 0, b"jpeg-bytes-1", "image/jpeg", DeviceKind::Mobile)?;
    service.apply_system_check(&form_id, "passport", 1, SystemCheckStatus::Accepted)?;
    service.submit_page(&form_id, "contract", 1, 0, b"pdf-bytes", "application/pdf", DeviceKind::Desktop)?;
    service.apply_system_check(&form_id, "contract", 1, SystemCheckStatus::Accepted)?;
    service.submit_page(&form_id, "passport", 2, 0, b"jpeg-bytes-2", "image/jpeg", DeviceKind::Mobile)?;
    service.apply_system_check(&form_id, "passport", 2, SystemCheckStatus::Accepted)?;
    println!("all pages submitted and pre-checked");

    let check = service.open_admin_check(&form_id)?;
    println!("admin check {} covers {} documents", check.id, check.docs.len());

    let reviewer = CompletedBy {
        id: UserId("user-admin".to_string()),
        name: PersonName {
            first: "Alex".to_string(),
            last: "Reviewer".to_string(),
        },
    };
    for (slot, doc) in check.docs.clone() {
        for page_number in doc.pages.keys() {
            service.resolve_admin_page(
                &check.id,
                &slot,
                *page_number,
                AdminVerdict::Accepted,
                reviewer.clone(),
            )?;
        }
    }
    println!("all pages accepted by review");

    let counters = service.reconcile_dashboard(&company_id, &dashboard_id)?;
    println!();
    println!("dashboard counters");
    println!("  applicants:            {}", counters.applicants);
    println!("  complete applicants:   {}", counters.complete_applicants);
    println!("  incomplete applicants: {}", counters.incomplete_applicants);
    println!("  open actions:          {}", counters.actions);
    println!("  messages sent:         {}", counters.messages_sent);

    Ok(())
}
