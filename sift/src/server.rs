use std::future::Future;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::progress::ProgressBus;
use crate::router;

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let progress = ProgressBus::new(config.progress_buffer);
    let app = router::router(&config, progress);

    tracing::info!("listening on {:?}", listener.local_addr().unwrap());
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .unwrap()
}
