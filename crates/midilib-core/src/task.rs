use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// 周期任务句柄
///
/// `shutdown` 通知任务退出并等待结束；句柄被 drop 时任务同样会退出
pub struct TaskHandle {
    name: String,
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join_handle.await;
        info!(task = %self.name, "Periodic task stopped");
    }
}

/// 启动周期任务，首次执行在一个周期之后
pub fn spawn_periodic<F, Fut>(name: impl Into<String>, period: Duration, mut task: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task_name = name.clone();

    let join_handle = tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!(task = %task_name, "Running periodic task");
                    task().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    info!(task = %name, period_ms = period.as_millis() as u64, "Periodic task started");

    TaskHandle {
        name,
        shutdown_tx,
        join_handle,
    }
}
