//! Host command protocol: one JSON request in, one JSON response out, plus progress
//! pushes while all pages are collected.

use crate::harvester::Harvester;
use crate::models::{AcquisitionOptions, ProgressSnapshot};
use crate::surface::ListingSurface;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info};

pub const UNKNOWN_ACTION: &str = "Unknown action";

const ACTIONS: &[&str] = &[
    "ping",
    "getInvoiceData",
    "getInvoiceDetails",
    "getAllPagesData",
    "rescanPage",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    Ping,
    GetInvoiceData,
    #[serde(rename_all = "camelCase")]
    GetInvoiceDetails {
        invoice_id: String,
    },
    GetAllPagesData {
        #[serde(default)]
        options: AcquisitionOptions,
    },
    RescanPage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Echo of the request's `id`, when it had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn data<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                ..Self::default()
            },
            Err(e) => Self::failure(e.to_string()),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }
}

/// Fire-and-forget notification sent while all pages are being collected.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressPush {
    pub action: &'static str,
    pub progress: ProgressSnapshot,
}

impl ProgressPush {
    pub fn new(progress: ProgressSnapshot) -> Self {
        Self {
            action: "progressUpdate",
            progress,
        }
    }
}

pub fn parse_command(request: Value) -> Result<Command, Response> {
    let action = request.get("action").and_then(Value::as_str).unwrap_or_default();
    if !ACTIONS.contains(&action) {
        debug!("Rejecting action {:?}", action);
        return Err(Response::failure(UNKNOWN_ACTION));
    }
    serde_json::from_value(request).map_err(|e| Response::failure(format!("Invalid request: {}", e)))
}

pub struct CommandRouter<S> {
    harvester: Arc<Harvester<S>>,
    pushes: Option<UnboundedSender<ProgressPush>>,
}

impl<S: ListingSurface + 'static> CommandRouter<S> {
    pub fn new(harvester: Arc<Harvester<S>>, pushes: Option<UnboundedSender<ProgressPush>>) -> Self {
        Self { harvester, pushes }
    }

    /// Handle one raw request line.
    pub async fn handle_line(&self, line: &str) -> Response {
        match serde_json::from_str::<Value>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::failure(format!("Invalid request: {}", e)),
        }
    }

    pub async fn handle(&self, request: Value) -> Response {
        let id = request.get("id").cloned();
        let response = match parse_command(request) {
            Ok(command) => self.execute(command).await,
            Err(rejected) => rejected,
        };
        response.with_id(id)
    }

    pub async fn execute(&self, command: Command) -> Response {
        debug!("Executing {:?}", command);
        match command {
            Command::Ping => Response::message("Harvester is ready"),
            Command::GetInvoiceData => {
                if !self.harvester.has_scanned() {
                    self.harvester.rescan().await;
                }
                Response::data(&self.harvester.current_data())
            }
            Command::GetInvoiceDetails { invoice_id } => {
                match self.harvester.invoice_details(&invoice_id).await {
                    Ok(items) => Response::data(&items),
                    Err(e) => Response::failure(e.to_string()),
                }
            }
            Command::GetAllPagesData { options } => self.collect_all(options).await,
            Command::RescanPage => Response::data(&self.harvester.rescan().await),
        }
    }

    async fn collect_all(&self, options: AcquisitionOptions) -> Response {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressSnapshot>();
        let pushes = self.pushes.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                if let Some(pushes) = &pushes {
                    // Nobody listening is fine.
                    let _ = pushes.send(ProgressPush::new(progress));
                }
            }
        });

        let result = self.harvester.collect_all_pages(&options, Some(&tx)).await;
        drop(tx);
        let _ = forwarder.await;
        info!(
            "All-pages request finished: {}/{} invoices",
            result.total_processed, result.expected_total
        );

        let mut response = Response::data(&result);
        response.success = response.success && result.success;
        response.error = response.error.or(result.error);
        response
    }
}
