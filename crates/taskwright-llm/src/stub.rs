//! An in-memory `LlmDispatcher` for tests and the `taskwright doctor`
//! dry-run path, mirroring the teacher's dev-only stub CLI backend —
//! scripted responses instead of a real subprocess.

use crate::dispatcher::{DispatchRequest, DispatchResult, LlmDispatcher};
use crate::error::LlmError;
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Ok { stdout: String, exit_code: i32 },
    Infra(String),
}

/// Dispatches canned responses in order, one per call, repeating the last
/// entry once exhausted so tests don't need to size scripts exactly.
pub struct StubLlmDispatcher {
    responses: Mutex<Vec<ScriptedResponse>>,
    calls: Mutex<Vec<DispatchRequest>>,
}

impl StubLlmDispatcher {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_pass(verdict_json: impl Into<String>) -> Self {
        Self::new(vec![ScriptedResponse::Ok {
            stdout: verdict_json.into(),
            exit_code: 0,
        }])
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("stub mutex poisoned").len()
    }

    pub fn calls(&self) -> Vec<DispatchRequest> {
        self.calls.lock().expect("stub mutex poisoned").clone()
    }
}

#[async_trait]
impl LlmDispatcher for StubLlmDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchResult, LlmError> {
        self.calls
            .lock()
            .expect("stub mutex poisoned")
            .push(request.clone());

        let response = {
            let mut responses = self.responses.lock().expect("stub mutex poisoned");
            if responses.is_empty() {
                ScriptedResponse::Ok {
                    stdout: "{}".to_string(),
                    exit_code: 0,
                }
            } else if responses.len() == 1 {
                responses[0].clone()
            } else {
                responses.remove(0)
            }
        };

        match response {
            ScriptedResponse::Ok { stdout, exit_code } => {
                Ok(DispatchResult::new(stdout, String::new(), exit_code))
            }
            ScriptedResponse::Infra(reason) => Err(LlmError::KilledBeforeExit {
                llm_id: request.llm_id,
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn req(llm_id: &str) -> DispatchRequest {
        DispatchRequest {
            llm_id: llm_id.to_string(),
            prompt: "prompt".to_string(),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn replays_scripted_responses_in_order() {
        let stub = StubLlmDispatcher::new(vec![
            ScriptedResponse::Ok {
                stdout: "first".to_string(),
                exit_code: 0,
            },
            ScriptedResponse::Ok {
                stdout: "second".to_string(),
                exit_code: 0,
            },
        ]);

        let first = stub.dispatch(req("model-a")).await.unwrap();
        let second = stub.dispatch(req("model-a")).await.unwrap();
        assert_eq!(first.stdout, "first");
        assert_eq!(second.stdout, "second");
        assert_eq!(stub.call_count(), 2);
    }

    #[tokio::test]
    async fn repeats_last_response_once_exhausted() {
        let stub = StubLlmDispatcher::always_pass(r#"{"verdict":"pass"}"#);
        let a = stub.dispatch(req("model-a")).await.unwrap();
        let b = stub.dispatch(req("model-a")).await.unwrap();
        assert_eq!(a.stdout, b.stdout);
    }

    #[tokio::test]
    async fn surfaces_scripted_infra_failure() {
        let stub = StubLlmDispatcher::new(vec![ScriptedResponse::Infra("boom".to_string())]);
        let err = stub.dispatch(req("model-a")).await.unwrap_err();
        assert!(matches!(err, LlmError::KilledBeforeExit { .. }));
    }
}
