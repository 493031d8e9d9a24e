//! Merged stdout/stderr line stream of a child process

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Buffered lines between the reader tasks and the consumer
const LINE_BUFFER: usize = 1024;

/// Lines from a child's stdout and stderr, interleaved in arrival order
///
/// The stream ends once both pipes are closed.
#[derive(Debug)]
pub struct OutputLines {
    rx: mpsc::Receiver<String>,
}

impl OutputLines {
    /// Take the child's piped stdout and stderr and start forwarding them
    pub fn attach(child: &mut Child) -> Self {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, tx);
        }
        Self { rx }
    }

    /// Next line; `None` once both pipes are closed
    pub async fn next(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Forward the remaining lines to the debug log until both pipes close
    pub fn follow(mut self, container: String) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut lines = 0usize;
            while let Some(line) = self.rx.recv().await {
                lines += 1;
                tracing::debug!(%container, "{line}");
            }
            tracing::debug!(%container, lines, "Container output closed");
        })
    }
}

fn spawn_reader<R>(pipe: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "Container output stream closed with error");
                    break;
                }
            }
        }
    });
}
