pub mod ask;
pub mod chat;
pub mod config;
pub mod history;
pub mod users;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels `cancel` on the next Ctrl-C. Abort the handle once the guarded
/// work is done.
pub(crate) fn cancel_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received");
            cancel.cancel();
        }
    })
}
