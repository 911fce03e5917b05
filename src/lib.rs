//! # Stratum - Document Ingestion and Retrieval-Augmented Q&A Service
//!
//! Stratum ingests PDF/DOCX documents into per-workspace vector indexes and
//! answers questions over them with an LLM, grounded in the retrieved
//! passages.
//!
//! ## Overview
//!
//! A workspace is the isolation boundary for documents, chat sessions, and
//! retrieval: uploads land in raw storage, an async pipeline extracts text,
//! detects language, chunks, embeds, and indexes it, and the RAG engine
//! answers questions against one workspace's index only.
//!
//! ## Modules
//!
//! - [`config`] - Environment-driven configuration
//! - [`types`] - Core domain types, DTOs, and error handling
//! - [`storage`] - `RawStorage` adapter contract and implementations
//! - [`vectorstore`] - `VectorStore` adapter contract and implementations
//! - [`repository`] - `Repository` adapter contract (metadata persistence)
//! - [`embedder`] - `Embedder` adapter contract and implementations
//! - [`llm`] - `LLMClient` adapter contract and implementations
//! - [`extract`] - MIME detection and text extraction
//! - [`language`] - Language detection
//! - [`chunker`] - Page-aware text chunking
//! - [`pipeline`] - The async ingestion pipeline
//! - [`rag`] - The question-answering engine
//! - [`workspace`] - Workspace lifecycle and cascading delete
//! - [`jobqueue`] - In-process background ingestion queue
//! - [`context`] - Composition root wiring every adapter together
//! - [`api`] - HTTP API handlers and routes
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `local-embeddings` | FastEmbed-based local embedding model (default) |
//! | `qdrant` | Qdrant-backed vector store |

#![warn(missing_docs)]

/// Environment-driven configuration.
pub mod config;
/// The thin HTTP API surface.
pub mod api;
/// Page-aware text chunking.
pub mod chunker;
/// Composition root: builds the single `AppContext` value.
pub mod context;
/// Text extraction from uploaded documents.
pub mod extract;
/// `Embedder` adapter contract and implementations.
pub mod embedder;
/// In-process background ingestion queue.
pub mod jobqueue;
/// Language detection for extracted text.
pub mod language;
/// `LLMClient` adapter contract and implementations.
pub mod llm;
/// The async document ingestion pipeline.
pub mod pipeline;
/// The retrieval-augmented question-answering engine.
pub mod rag;
/// `Repository` adapter contract (metadata persistence).
pub mod repository;
/// `RawStorage` adapter contract and implementations.
pub mod storage;
/// Core domain types, DTOs, and error handling.
pub mod types;
/// `VectorStore` adapter contract and implementations.
pub mod vectorstore;
/// Workspace lifecycle and cascading delete.
pub mod workspace;

pub use context::AppContext;
pub use types::{AppError, Result};
