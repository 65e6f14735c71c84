//! Scripted collaborator for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{LlmErrorKind, ReflectError, Result};
use crate::llm::{CompletionRequest, Step, TextGenerator};

#[derive(Debug, Clone, Copy)]
struct FailurePlan {
    step: Step,
    occurrence: usize,
    kind: LlmErrorKind,
    remaining: usize,
}

#[derive(Debug, Default)]
struct Progress {
    calls: Vec<CompletionRequest>,
    successes: HashMap<Step, usize>,
}

/// Returns `Phrase v{n}` for generate/refine and the scripted critiques in
/// order (repeating the last one). Every request is recorded.
#[derive(Debug)]
pub struct ScriptedGenerator {
    critiques: Vec<String>,
    failures: Mutex<Vec<FailurePlan>>,
    progress: Mutex<Progress>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(critiques: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            critiques: critiques.into_iter().map(Into::into).collect(),
            failures: Mutex::new(Vec::new()),
            progress: Mutex::new(Progress::default()),
        }
    }

    /// Makes the `occurrence`-th successful call of `step` fail `times` times first.
    pub fn failing(self, step: Step, occurrence: usize, kind: LlmErrorKind, times: usize) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(FailurePlan {
                step,
                occurrence,
                kind,
                remaining: times,
            });
        }
        self
    }

    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.progress
            .lock()
            .map(|p| p.calls.clone())
            .unwrap_or_default()
    }

    pub fn steps(&self) -> Vec<Step> {
        self.calls().into_iter().map(|c| c.step).collect()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &CompletionRequest) -> Result<String> {
        let mut progress = self
            .progress
            .lock()
            .map_err(|_| ReflectError::llm_api_error(LlmErrorKind::Other, "poisoned"))?;
        progress.calls.push(request.clone());
        let done = progress.successes.get(&request.step).copied().unwrap_or(0);

        if let Ok(mut failures) = self.failures.lock() {
            if let Some(plan) = failures
                .iter_mut()
                .find(|p| p.step == request.step && p.occurrence == done + 1 && p.remaining > 0)
            {
                plan.remaining -= 1;
                return Err(ReflectError::llm_api_error(
                    plan.kind,
                    format!("scripted {} failure", request.step),
                ));
            }
        }

        progress.successes.insert(request.step, done + 1);
        let text = match request.step {
            Step::Generate => "Phrase v1".to_string(),
            Step::Refine => format!("Phrase v{}", done + 2),
            Step::Critique => self
                .critiques
                .get(done)
                .or_else(|| self.critiques.last())
                .cloned()
                .unwrap_or_default(),
        };
        Ok(text)
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
