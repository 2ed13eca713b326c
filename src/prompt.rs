//! Interactive confirmation on stdin.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use hashsync_fetch::{Confirm, Confirmation, SyncPlan};

use crate::format_size;

/// Asks `(y/n)` on the terminal. Ctrl-C counts as a no.
pub struct StdinPrompt {
    cancel: CancellationToken,
}

impl StdinPrompt {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl Confirm for StdinPrompt {
    async fn confirm(&self, plan: &SyncPlan) -> Confirmation {
        println!("Total size: {}", format_size(plan.download_bytes()));
        if !plan.stale.is_empty() {
            println!(
                "{} local files not in the hashtable will be deleted",
                plan.stale.len()
            );
        }
        print!("Do you want to start download ? (y/n) ");
        let _ = io::stdout().flush();

        // A detached thread, so a pending read never holds up shutdown.
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let mut line = String::new();
            let read = io::stdin().lock().read_line(&mut line).map(|_| line);
            let _ = tx.send(read);
        });

        tokio::select! {
            _ = self.cancel.cancelled() => Confirmation::Decline,
            answer = rx => match answer {
                Ok(Ok(line)) if is_yes(&line) => Confirmation::Proceed,
                _ => Confirmation::Decline,
            },
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
