//! Concurrent owner lookup for discovered identities.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Error;
use crate::models::ExpiringIdentity;
use crate::services::DirectoryService;

pub struct OwnerEnricher {
    workers: usize,
}

impl OwnerEnricher {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Attach owning principals to each identity.
    ///
    /// Lookups run on a fixed-size worker pool draining a shared job queue;
    /// workers hand `(identity, result)` tuples to a single aggregator over
    /// a channel. Results arrive as workers finish, so the returned order is
    /// NOT the input order; callers that need stable order re-sort by
    /// display name. A failed lookup keeps its identity with an empty owners
    /// list and logs the failure.
    pub async fn enrich(
        &self,
        directory: Arc<dyn DirectoryService>,
        identities: Vec<ExpiringIdentity>,
    ) -> Vec<ExpiringIdentity> {
        let total = identities.len();
        if total == 0 {
            return identities;
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(identities)));
        let (tx, mut rx) = mpsc::channel(total);
        let workers = self.workers.min(total);
        debug!("Looking up owners for {} identities on {} workers", total, workers);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let directory = Arc::clone(&directory);
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut queue = queue.lock().unwrap_or_else(|e| e.into_inner());
                        queue.pop_front()
                    };
                    let Some(entry) = job else { break };

                    let result = directory
                        .list_owners(&entry.identity.id)
                        .await
                        .map_err(|source| Error::Enrichment {
                            identity: entry.identity.display_name.clone(),
                            source: Box::new(source),
                        });
                    if tx.send((entry, result)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut enriched = Vec::with_capacity(total);
        while let Some((mut entry, result)) = rx.recv().await {
            match result {
                Ok(owners) => {
                    debug!(
                        "{} has {} owner(s)",
                        entry.identity.display_name,
                        owners.len()
                    );
                    entry.owners = owners;
                }
                Err(err) => warn!("{err}"),
            }
            enriched.push(entry);
        }

        for handle in handles {
            let _ = handle.await;
        }
        enriched
    }
}
