//! # StudyDigest
//!
//! Command-line front end and service adapters for the
//! [`studydigest_core`] pipeline.
//!
//! ```text
//! ┌──────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │   CLI    │──▶│ studydigest-core │──▶│ embedding / chat │
//! │ (digest) │   │ summarize · chat │   │  HTTP services   │
//! └──────────┘   └────────┬─────────┘   └──────────────────┘
//!                         ▼
//!                  ┌─────────────┐
//!                  │   SQLite    │
//!                  │ fragments + │
//!                  │   vectors   │
//!                  └─────────────┘
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool with WAL mode |
//! | [`migrate`] | Idempotent schema creation |
//! | [`embedding`] | OpenAI, Ollama and generic HTTP embedding clients |
//! | [`generation`] | Chat-completions generation client |
//! | [`sqlite_store`] | `FragmentStore` over SQLite |
//! | [`turns`] | Conversation log |
//! | [`ingest`] | Text → fragments → vectors → store |
//! | [`summarize`] | `digest summarize` |
//! | [`ask`] | `digest ask` |
//! | [`inspect`] | `digest inspect` |
//! | [`history`] | `digest history` |

pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod history;
pub mod ingest;
pub mod input;
pub mod inspect;
pub mod logging;
pub mod migrate;
pub mod sqlite_store;
pub mod summarize;
pub mod turns;
