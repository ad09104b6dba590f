//! Tauri Commands
//!
//! The three bridge operations as Tauri commands. Register them with
//! `tauri::generate_handler![get_backend_url, backend_status, api_request]`
//! and `app.manage(bridge)`; no other backend capability is exposed.

use tauri::State;

use crate::backend::{Payload, RequestOptions};
use crate::bridge::IsolationBridge;
use crate::error::RequestError;

/// Get the backend base URL
#[tauri::command]
pub async fn get_backend_url(bridge: State<'_, IsolationBridge>) -> Result<Option<String>, ()> {
    Ok(bridge.get_backend_url().await)
}

/// Get backend running status
#[tauri::command]
pub async fn backend_status(bridge: State<'_, IsolationBridge>) -> Result<bool, ()> {
    Ok(bridge.backend_status().await)
}

/// Forward an API request to the backend
#[tauri::command]
pub async fn api_request(
    bridge: State<'_, IsolationBridge>,
    endpoint: String,
    options: Option<RequestOptions>,
) -> Result<Payload, RequestError> {
    bridge
        .api_request(&endpoint, options.unwrap_or_default())
        .await
}
