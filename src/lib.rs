//! # Catalog Harness
//!
//! Data-preparation and loading tooling for a product catalog that lives in
//! a hosted document database with server-side embeddings.
//!
//! A flat product export is normalized and split into one JSON-lines file
//! per product family. The family files are then loaded into a store
//! collection, with each record carrying a Markdown rendering of itself as
//! the text the store embeds.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌────────────────────┐
//! │ products.jsonl│──▶│ normalize │──▶│ products/<family>/  │
//! │ (flat export) │   │  + split  │   │   products.jsonl    │
//! └──────────────┘   └───────────┘   └─────────┬──────────┘
//!                                              │
//!                         ┌────────────────────┤
//!                         ▼                    ▼
//!                  ┌─────────────┐      ┌─────────────┐
//!                  │   loader    │      │ prompts /   │
//!                  │ (+markdown) │      │ images/links│
//!                  └──────┬──────┘      └──────┬──────┘
//!                         ▼                    ▼
//!                  ┌─────────────┐      ┌─────────────┐
//!                  │  Data API   │      │  OpenAI API │
//!                  └─────────────┘      └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! catalog split                 # products.jsonl -> products/<family>/products.jsonl
//! catalog provision             # create the collections if missing
//! catalog load-products         # insert every family file
//! catalog load-documents
//! catalog check-docs products/constructobots
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML settings and environment credentials |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Record alias and report types |
//! | [`jsonl`] | JSON-lines reading and atomic writes |
//! | [`normalize`] | Record normalization |
//! | [`split`] | Family splitting |
//! | [`markdown`] | Markdown projection of a product |
//! | [`store`] | Document store traits and backends |
//! | [`provision`] | Collection creation and inspection |
//! | [`load`] | Catalog loader |
//! | [`retry`] | Retry policy and request pacing |
//! | [`openai`] | Image and chat API client |
//! | [`check`] | Documentation cross-reference check |
//! | [`truncate`] | Collection truncation |
//! | [`prompts`] | Image prompt generation |
//! | [`images`] | Product and hero image generation |
//! | [`links`] | ID-to-link rewriting in documentation |

pub mod check;
pub mod config;
pub mod error;
pub mod images;
pub mod jsonl;
pub mod links;
pub mod load;
pub mod markdown;
pub mod models;
pub mod normalize;
pub mod openai;
pub mod prompts;
pub mod provision;
pub mod retry;
pub mod split;
pub mod store;
pub mod truncate;
