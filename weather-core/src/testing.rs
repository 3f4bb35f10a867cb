use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{
    error::{ClassifiedError, ErrorKind},
    model::WeatherObservation,
    provider::WeatherProvider,
};

type Reply = Result<WeatherObservation, ClassifiedError>;

/// Provider that replays canned replies and counts how often it was called.
/// Once the script runs out the last reply repeats.
#[derive(Debug)]
pub(crate) struct ScriptedProvider {
    name: &'static str,
    priority: i32,
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new(name: &'static str, priority: i32) -> Self {
        Self {
            name,
            priority,
            replies: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn ok(self, wind_speed: f64, temperature: f64) -> Self {
        self.reply(Ok(WeatherObservation::new(wind_speed, temperature)))
    }

    pub(crate) fn fail(self, kind: ErrorKind) -> Self {
        let err = ClassifiedError::new(kind, self.name);
        self.reply(Err(err))
    }

    pub(crate) fn reply(self, reply: Reply) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub(crate) fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeatherProvider for ScriptedProvider {
    async fn fetch(&self, _city: &str) -> Result<WeatherObservation, ClassifiedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self.replies.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone()
            .unwrap_or_else(|| Err(ClassifiedError::unknown(self.name, "no scripted reply")))
    }

    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
