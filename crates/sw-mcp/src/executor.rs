//! Dispatches MCP requests onto a [`Steward`]. The stdio loop reads one JSON
//! request per line and answers on stdout; everything else is plain method
//! dispatch, kept separate so it can be tested without a transport.

use crate::protocol::{McpRequest, McpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use sw_core::types::ids::{ChangeId, ReviewId};
use sw_core::{Archive, ReviewOutcome, Steward, StewardError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[derive(Debug, Deserialize)]
struct RequestChangeParams {
    summary: String,
    unified_diff: String,
}

#[derive(Debug, Deserialize)]
struct ReviewResponseParams {
    review_id: String,
    approved: bool,
    #[serde(default)]
    feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChangeParams {
    change_id: String,
}

#[derive(Debug, Deserialize)]
struct ReviewParams {
    review_id: String,
}

pub struct Executor<A: Archive> {
    steward: Arc<Steward<A>>,
}

impl<A: Archive> Executor<A> {
    pub fn new(steward: Arc<Steward<A>>) -> Self {
        Self { steward }
    }

    /// Serves requests from stdin until EOF.
    pub async fn run_stdio(&self) -> std::io::Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        let mut lines = stdin.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<McpRequest>(&line) {
                Ok(request) => self.dispatch(request).await,
                Err(err) => McpResponse::error(
                    "unknown".to_string(),
                    "invalid_params",
                    err.to_string(),
                    None,
                ),
            };
            stdout
                .write_all(format!("{}\n", response.to_json()).as_bytes())
                .await?;
            stdout.flush().await?;
        }
        Ok(())
    }

    pub async fn dispatch(&self, request: McpRequest) -> McpResponse {
        let id = request.id.clone();
        let result = self.call(&request.method, request.params).await;
        match result {
            Ok(value) => McpResponse::ok(id, value),
            Err(err) => {
                log::debug!("{} failed: {err}", request.method);
                McpResponse::error(
                    id,
                    err.code(),
                    err.to_string(),
                    err.hint().map(str::to_string),
                )
            }
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, StewardError> {
        match method {
            "request_change" => {
                let params: RequestChangeParams = parse(params)?;
                let payload = self
                    .steward
                    .request_change(&params.summary, &params.unified_diff)
                    .await?;
                to_value(&payload)
            }
            "handle_review_response" => {
                let params: ReviewResponseParams = parse(params)?;
                let review_id = parse_review_id(&params.review_id)?;
                let outcome = self.steward.handle_review_response(
                    &review_id,
                    params.approved,
                    params.feedback,
                )?;
                outcome_value(&outcome)
            }
            "cancel" => {
                let params: ChangeParams = parse(params)?;
                let change_id = parse_change_id(&params.change_id)?;
                let record = self.steward.cancel(&change_id)?;
                to_value(&record)
            }
            "state" => {
                let params: ChangeParams = parse(params)?;
                let change_id = parse_change_id(&params.change_id)?;
                let state = self.steward.state(&change_id)?;
                Ok(json!({ "change_id": change_id, "state": state }))
            }
            "wait_for_decision" => {
                let params: ReviewParams = parse(params)?;
                let review_id = parse_review_id(&params.review_id)?;
                let record = self.steward.wait_for_decision(&review_id).await?;
                to_value(&record)
            }
            other => Err(StewardError::Internal {
                message: format!("unknown method: {other}"),
            }),
        }
    }
}

fn outcome_value(outcome: &ReviewOutcome) -> Result<Value, StewardError> {
    Ok(match outcome {
        ReviewOutcome::Next(payload) => json!({ "outcome": "Next", "review": payload }),
        ReviewOutcome::Applied(result) => json!({ "outcome": "Applied", "result": result }),
        ReviewOutcome::Archived(record) => json!({ "outcome": "Archived", "record": record }),
    })
}

fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, StewardError> {
    serde_json::from_value(params).map_err(|err| StewardError::Internal {
        message: format!("invalid params: {err}"),
    })
}

fn parse_change_id(raw: &str) -> Result<ChangeId, StewardError> {
    ChangeId::from_str(raw).map_err(|err| StewardError::Internal {
        message: format!("invalid change id: {err}"),
    })
}

fn parse_review_id(raw: &str) -> Result<ReviewId, StewardError> {
    ReviewId::from_str(raw).map_err(|err| StewardError::Internal {
        message: format!("invalid review id: {err}"),
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, StewardError> {
    serde_json::to_value(value).map_err(|err| StewardError::Internal {
        message: err.to_string(),
    })
}
