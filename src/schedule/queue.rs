use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Creates the unbounded FIFO between task creation and the download worker.
pub fn download_queue() -> (DownloadQueue, QueueReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        DownloadQueue {
            sender,
            pending: pending.clone(),
        },
        QueueReceiver { receiver, pending },
    )
}

/// Producer side, shared by request handlers.
#[derive(Clone)]
pub struct DownloadQueue {
    sender: mpsc::UnboundedSender<String>,
    pending: Arc<AtomicUsize>,
}

impl DownloadQueue {
    /// Fails only when the worker has shut down.
    pub fn push(&self, task_id: String) -> anyhow::Result<()> {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.sender.send(task_id) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow::anyhow!("download queue is closed, dropped task {}", e.0));
        }
        Ok(())
    }

    /// Ids waiting to be picked up; the one being downloaded is not counted.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Consumer side, owned by the single download worker.
pub struct QueueReceiver {
    receiver: mpsc::UnboundedReceiver<String>,
    pending: Arc<AtomicUsize>,
}

impl QueueReceiver {
    /// Waits for the next id; `None` once every producer is gone.
    pub async fn recv(&mut self) -> Option<String> {
        let task_id = self.receiver.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(task_id)
    }
}
