use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::time::{interval, Duration};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use reminder_cell::services::sender::ReminderSender;
use shared_config::AppConfig;
use waitlist_cell::services::waitlist::WaitlistService;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting AI receptionist API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let state = Arc::new(config);

    // Singleton background loops. These must be leader-elected if the
    // service ever runs multi-instance, else every instance re-sends.
    spawn_reminder_ticker(Arc::clone(&state));
    spawn_waitlist_expirer(Arc::clone(&state));

    // Build the application router
    let app = router::create_router(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .await
        .unwrap();
}

/// Process due reminders and no-show follow-ups every 60 seconds.
fn spawn_reminder_ticker(state: Arc<AppConfig>) {
    tokio::spawn(async move {
        info!("reminder_ticker: started");
        let mut tick = interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let sender = ReminderSender::new(&state);

            let summary = sender.process_pending_reminders().await;
            if summary.sent > 0 {
                info!("reminder_ticker: sent {} reminders", summary.sent);
            }

            let followups = sender.process_no_show_followups().await;
            if followups.sent > 0 {
                info!("reminder_ticker: sent {} no-show follow-ups", followups.sent);
            }
        }
    });
}

/// Expire stale waitlist offers every five minutes.
fn spawn_waitlist_expirer(state: Arc<AppConfig>) {
    tokio::spawn(async move {
        info!("waitlist_expirer: started");
        let mut tick = interval(Duration::from_secs(300));
        loop {
            tick.tick().await;
            let service = WaitlistService::new(&state);
            match service.expire_old_entries().await {
                Ok(count) if count > 0 => info!("waitlist_expirer: expired {} entries", count),
                Ok(_) => {}
                Err(e) => warn!("waitlist_expirer: sweep failed: {}", e),
            }
        }
    });
}
