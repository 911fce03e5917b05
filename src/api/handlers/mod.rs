//! API request handlers.
//!
//! This module contains all HTTP request handlers organized by functionality.

/// `POST /v1/chat/ask`, `GET /v1/chat`, `GET /v1/chat/{session_id}/messages`.
pub mod chat;
/// `POST /v1/documents/upload`, `GET /v1/documents`, and per-document
/// download/status routes.
pub mod documents;
/// `GET /v1/ops/status`.
pub mod ops;
/// `POST /v1/workspaces`, `GET /v1/workspaces`, `DELETE /v1/workspaces/{id}`.
pub mod workspaces;
