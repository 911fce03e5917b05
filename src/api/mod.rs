//! HTTP API Handlers and Routes
//!
//! The thin HTTP surface over the ingestion pipeline and RAG engine
//! (spec.md §6). Routing, request parsing, and status-code mapping live
//! here; every handler is a few lines that deserializes its input and
//! delegates to `AppContext`'s services.
//!
//! # API Endpoints
//!
//! ## Workspaces (`/v1/workspaces`)
//! - `POST /v1/workspaces` - Create a workspace
//! - `GET /v1/workspaces` - List workspaces
//! - `DELETE /v1/workspaces/{id}` - Delete a workspace and everything in it
//!
//! ## Documents (`/v1/documents`)
//! - `POST /v1/documents/upload?workspace_id=…` - Upload and enqueue ingestion
//! - `GET /v1/documents?workspace_id=…` - List documents in a workspace
//! - `GET /v1/documents/{id}/status` - Ingestion status for one document
//! - `GET /v1/documents/{id}/download` - Stream the original file back
//!
//! ## Chat (`/v1/chat`)
//! - `POST /v1/chat/ask` - Ask a question against a workspace
//! - `GET /v1/chat?workspace_id=…` - List chat sessions
//! - `GET /v1/chat/{session_id}/messages` - List messages in a session
//!
//! ## Ops (`/v1/ops`)
//! - `GET /v1/ops/status` - Adapter reachability summary

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
