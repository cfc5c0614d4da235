//! Built-in routes of the default handler.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;

/// Descriptive metadata of the hosted contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContractInfo {
    pub title: String,
    pub version: String,
    pub description: String,
    pub license: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl ContractInfo {
    /// The ERC-721 token contract this harness ships with.
    pub fn erc721() -> Self {
        Self {
            title: "ERC-721 chaincode".to_string(),
            version: "0.0.1".to_string(),
            description: "ERC-721 fabric port".to_string(),
            license: "Apache-2.0".to_string(),
            contact: Some("Matias Salimbene".to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    pub service_id: String,
    pub address: String,
    pub harness_version: &'static str,
    pub contract: ContractInfo,
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn metadata(State(state): State<AppState>) -> Json<Metadata> {
    Json(Metadata {
        service_id: state.server.service_id.clone(),
        address: state.server.network_address.clone(),
        harness_version: env!("CARGO_PKG_VERSION"),
        contract: state.contract.as_ref().clone(),
    })
}
