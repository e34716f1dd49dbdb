//! Election driven by a caller-supplied sequence of statuses.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use swallow_core::{Result, SwallowError};
use tokio::sync::mpsc;

use crate::{Election, ElectionStatus};

/// Replays statuses in order.
///
/// Built with [`ScriptedElection::new`] the stream closes after the last
/// status; built with [`ScriptedElection::open`] it stays open until the
/// returned [`ElectionScript`] is dropped.
#[derive(Debug)]
pub struct ScriptedElection {
    statuses: mpsc::Receiver<ElectionStatus>,
    resigned: Arc<AtomicBool>,
}

/// Feeds further statuses into an open [`ScriptedElection`].
#[derive(Debug, Clone)]
pub struct ElectionScript {
    tx: mpsc::Sender<ElectionStatus>,
    resigned: Arc<AtomicBool>,
}

impl ScriptedElection {
    pub fn new(statuses: Vec<ElectionStatus>) -> Self {
        let (election, _script) = Self::open(statuses);
        election
    }

    pub fn open(statuses: Vec<ElectionStatus>) -> (Self, ElectionScript) {
        let (tx, rx) = mpsc::channel(statuses.len() + 16);
        for status in statuses {
            // capacity covers the prefill
            let _ = tx.try_send(status);
        }
        let resigned = Arc::new(AtomicBool::new(false));
        (
            Self {
                statuses: rx,
                resigned: Arc::clone(&resigned),
            },
            ElectionScript { tx, resigned },
        )
    }

    pub fn resigned(&self) -> bool {
        self.resigned.load(Ordering::Acquire)
    }
}

impl ElectionScript {
    pub async fn push(&self, status: ElectionStatus) -> Result<()> {
        self.tx
            .send(status)
            .await
            .map_err(|_| SwallowError::election("scripted election already stopped"))
    }

    /// Whether the election this script feeds has been resigned.
    pub fn resigned(&self) -> bool {
        self.resigned.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Election for ScriptedElection {
    async fn status(&mut self) -> Option<ElectionStatus> {
        self.statuses.recv().await
    }

    async fn resign(&mut self) -> Result<()> {
        self.resigned.store(true, Ordering::Release);
        self.statuses.close();
        Ok(())
    }
}
