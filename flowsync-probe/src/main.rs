//! Headless session participant.
//!
//! Joins a live session, logs connection changes and every snapshot the
//! engine publishes, and can optionally drop a node and circle its cursor
//! so other participants see activity.

use std::future::Future;
use std::time::Duration;

use clap::Parser;
use flowsync_collab::{SessionConfig, SessionEngine, SessionHandle};
use flowsync_core::Point;
use log::info;

#[derive(Parser)]
#[command(name = "flowsync-probe", about = "Join a live flow session and log what happens", version)]
struct Cli {
    /// Session server endpoint
    #[arg(short, long, default_value = flowsync_collab::config::DEFAULT_SERVER_URL)]
    url: String,

    /// Presence coalescing window in milliseconds
    #[arg(long, default_value_t = 5)]
    throttle_ms: u64,

    /// Leave after this many seconds (0 = until Ctrl-C)
    #[arg(short, long, default_value_t = 0)]
    duration_secs: u64,

    /// Drop a node of this type once connected
    #[arg(long)]
    drop: Option<String>,

    /// Circle the cursor around this many pixels from the origin
    #[arg(long)]
    wander: Option<f64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

async fn wander(handle: SessionHandle, radius: f64) {
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let mut angle: f64 = 0.0;
    loop {
        ticker.tick().await;
        angle += 0.1;
        let at = Point::new(radius * (1.0 + angle.cos()), radius * (1.0 + angle.sin()));
        if !handle.pointer_moved(at) {
            return;
        }
    }
}

async fn log_snapshots(handle: SessionHandle) {
    let mut snapshots = handle.subscribe();
    let mut connection = snapshots.borrow().connection;
    let mut counts = (0, 0, 0);

    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();

        if snapshot.connection != connection {
            connection = snapshot.connection;
            info!("Connection: {connection:?}");
        }

        let now = (snapshot.nodes.len(), snapshot.edges.len(), snapshot.collaborators.len());
        if now != counts {
            counts = now;
            info!(
                "r{}: {} node(s), {} edge(s), {} collaborator(s)",
                snapshot.revision, now.0, now.1, now.2
            );
        }
        for peer in &snapshot.collaborators {
            log::trace!("  {} at ({:.1}, {:.1})", peer.conn_id, peer.canvas.x, peer.canvas.y);
        }
    }
}

/// Wait for the connection, then drop a node and start wandering.
async fn join_in(handle: SessionHandle, node_type: Option<String>, radius: Option<f64>) {
    if node_type.is_none() && radius.is_none() {
        return;
    }
    let mut snapshots = handle.subscribe();
    if snapshots.wait_for(|s| s.is_connected()).await.is_err() {
        return;
    }
    if node_type.is_some() {
        handle.element_dropped(Point::new(100.0, 100.0), node_type);
    }
    if let Some(radius) = radius {
        tokio::spawn(wander(handle.clone(), radius));
    }
}

/// Drive `activity` until `limit` elapses or Ctrl-C arrives. `None` waits
/// for Ctrl-C only. Finishing `activity` early does not end the wait.
async fn until_deadline(limit: Option<Duration>, activity: impl Future<Output = ()>) {
    let expiry = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    let activity = async {
        activity.await;
        std::future::pending::<()>().await
    };

    tokio::select! {
        _ = expiry => {}
        _ = tokio::signal::ctrl_c() => {}
        _ = activity => {}
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = SessionConfig::new(&cli.url)
        .with_throttle_window(Duration::from_millis(cli.throttle_ms));
    info!("Joining session at {}", config.server_url);

    let engine = SessionEngine::websocket(config);
    let handle = engine.handle();
    let engine_task = tokio::spawn(engine.run());
    tokio::spawn(log_snapshots(handle.clone()));

    let limit = (cli.duration_secs > 0).then(|| Duration::from_secs(cli.duration_secs));
    until_deadline(limit, join_in(handle.clone(), cli.drop, cli.wander)).await;

    info!("Leaving session");
    handle.stop();
    let _ = engine_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn unreachable_session() -> (SessionHandle, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        drop(listener);

        let engine = SessionEngine::websocket(SessionConfig::new(&url));
        let handle = engine.handle();
        (handle, tokio::spawn(engine.run()))
    }

    #[tokio::test]
    async fn test_deadline_holds_while_never_connected() {
        let (handle, task) = unreachable_session().await;

        let waited = tokio::time::timeout(
            Duration::from_secs(5),
            until_deadline(
                Some(Duration::from_millis(100)),
                join_in(handle.clone(), Some("cargo build".into()), Some(10.0)),
            ),
        )
        .await;
        assert!(waited.is_ok(), "deadline ignored while waiting for a connection");
        assert!(!handle.snapshot().is_connected());

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_join_in_without_actions_returns_at_once() {
        let (handle, task) = unreachable_session().await;
        tokio::time::timeout(Duration::from_secs(1), join_in(handle.clone(), None, None))
            .await
            .unwrap();
        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_join_in_gives_up_when_engine_stops() {
        let (handle, task) = unreachable_session().await;
        let waiting = tokio::spawn(join_in(handle.clone(), Some("cargo build".into()), None));

        handle.stop();
        task.await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), waiting).await.unwrap().unwrap();
    }
}
