//! # Archdiagram
//!
//! A PDF-to-architecture-diagram pipeline around three external services:
//! a PDF text extractor, AWS Bedrock for summarization, and an external
//! tool-using diagram agent process.
//!
//! The summary is the guaranteed deliverable; the diagram is a best-effort
//! enhancement. Whatever the agent leaves on disk is reconciled by the
//! artifact resolver, which searches, relocates, and converts candidate
//! files until the canonical output path is populated or every fallback
//! is exhausted.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────┐   ┌───────────┐   ┌───────────┐   ┌─────────┐   ┌──────────┐
//! │ Extract │──▶│ Summarize │──▶│ Normalize │──▶│  Agent   │──▶│ Resolve  │
//! │  (PDF)  │   │ (Bedrock) │   │  (pure)   │   │ (subproc)│   │ (fs scan)│
//! └─────────┘   └───────────┘   └───────────┘   └─────────┘   └────┬─────┘
//!                                                                  │
//!                                                   ┌──────────────┤
//!                                                   ▼              ▼
//!                                              ┌──────────┐  ┌──────────┐
//!                                              │ S3 mirror│  │   HTTP   │
//!                                              └──────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! archd serve                            # start the HTTP API
//! archd extract document.pdf --summarize # one-shot CLI extraction + summary
//! archd generate document.pdf            # full pipeline without HTTP
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF text extraction adapter |
//! | [`sigv4`] | AWS Signature V4 request signing |
//! | [`summarize`] | Bedrock summarization adapter |
//! | [`normalize`] | Markdown-to-prose normalizer |
//! | [`naming`] | Request ids and canonical filenames |
//! | [`agent`] | Diagram agent invocation wrapper |
//! | [`resolve`] | Artifact resolver and fallback search |
//! | [`store`] | S3 diagram mirror |
//! | [`pipeline`] | End-to-end orchestration |
//! | [`progress`] | Pipeline progress reporting |
//! | [`server`] | HTTP API |

pub mod agent;
pub mod config;
pub mod extract;
pub mod naming;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod resolve;
pub mod server;
pub mod sigv4;
pub mod store;
pub mod summarize;
