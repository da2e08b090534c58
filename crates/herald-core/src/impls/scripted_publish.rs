//! ScriptedPublishApi - a publish API whose responses are queued up front.
//!
//! Used by the tests and the CLI demo. Each `publish` call pops the next
//! scripted response; once the script runs out, calls succeed. Every call is
//! counted so callers can assert how many external posts would have been made.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ExternalId, ItemId, PublishError};
use crate::ports::{Credentials, Lookup, PublishApi, PublishRequest};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Step {
    Succeed,
    Fail(PublishError),
    /// Sleep this long before succeeding (drives publish timeouts).
    Stall(Duration),
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    published: Vec<PublishRequest>,
    lookup: Option<Lookup>,
}

#[derive(Clone, Default)]
pub struct ScriptedPublishApi {
    script: Arc<Mutex<Script>>,
    calls: Arc<AtomicUsize>,
    latency: Duration,
}

impl ScriptedPublishApi {
    /// Always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let api = Self::default();
        api.push_steps(steps);
        api
    }

    /// `n` failures of `error`, then success.
    pub fn failing(n: usize, error: PublishError) -> Self {
        Self::with_steps(std::iter::repeat_n(Step::Fail(error), n))
    }

    /// Delay every call by `latency` (widens race windows in tests).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Answer every `lookup` with `answer`.
    pub fn with_lookup(self, answer: Lookup) -> Self {
        self.script_mut().lookup = Some(answer);
        self
    }

    pub fn push_steps(&self, steps: impl IntoIterator<Item = Step>) {
        self.script_mut().steps.extend(steps);
    }

    /// Number of `publish` calls made, successful or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests that produced an external post.
    pub fn published(&self) -> Vec<PublishRequest> {
        self.script_mut().published.clone()
    }

    fn script_mut(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn external_id_for(item_id: ItemId) -> ExternalId {
        ExternalId::new(format!("post-{}", item_id.to_key().to_lowercase()))
    }
}

#[async_trait]
impl PublishApi for ScriptedPublishApi {
    async fn publish(
        &self,
        _credentials: &Credentials,
        request: &PublishRequest,
    ) -> Result<ExternalId, PublishError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let step = self.script_mut().steps.pop_front().unwrap_or(Step::Succeed);
        match step {
            Step::Fail(error) => return Err(error),
            Step::Stall(pause) => tokio::time::sleep(pause).await,
            Step::Succeed => {}
        }

        self.script_mut().published.push(request.clone());
        Ok(Self::external_id_for(request.item_id))
    }

    async fn lookup(
        &self,
        _credentials: &Credentials,
        item_id: ItemId,
    ) -> Result<Lookup, PublishError> {
        let script = self.script_mut();
        if let Some(answer) = &script.lookup {
            return Ok(answer.clone());
        }
        let posted = script.published.iter().any(|r| r.item_id == item_id);
        Ok(if posted {
            Lookup::Found(Self::external_id_for(item_id))
        } else {
            Lookup::Absent
        })
    }
}
