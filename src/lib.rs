//! Diffscribe - commit messages written from your staged changes.
//!
//! This library drives an interactive commit session: it reads the staged
//! diff, refuses to send anything that looks like a secret, asks a cloud or
//! local language model for a conventional commit message, lets the user
//! review and edit it, and commits. It supports:
//!
//! - **Two backends**: the DeepSeek chat API and a local Ollama server
//! - **Persisted preferences** so repeated sessions skip prompts
//! - **A recovery loop** with retry, backend switch and manual entry
//! - **Structural edits** of the title or bullet points
//!
//! # Architecture
//!
//! - [`session`] - The main loop tying every step together
//! - [`diff_guard`] - Staged diff acquisition and secret screening
//! - [`selector`] - Backend and model selection
//! - [`generator`] - Prompt construction, generation and normalization
//! - [`editor`] - Title and bullet point edits
//! - [`committer`] - Commits through a temporary message file
//! - [`backends`] - Wire formats of the two generation backends
//! - [`http_client`] - HTTP client abstraction
//! - [`vcs`] - Git access behind a trait
//! - [`config`] - Persisted preferences
//! - [`credentials`] - Cloud API key lookup and storage
//! - [`terminal`] - Prompts and menus over any reader and writer
//! - [`error`] - Error taxonomy
//!
//! # Example
//!
//! ```ignore
//! use diffscribe::backends::{BackendClient, Endpoints};
//! use diffscribe::config::PreferenceStore;
//! use diffscribe::credentials::CredentialStore;
//! use diffscribe::http_client::ReqwestHttpClient;
//! use diffscribe::session::Session;
//! use diffscribe::terminal::Terminal;
//! use diffscribe::vcs::GitCli;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let git = GitCli::new();
//!     let backends = BackendClient::new(ReqwestHttpClient::new(), Endpoints::from_env());
//!     let mut session = Session::new(
//!         &git,
//!         &backends,
//!         PreferenceStore::open()?,
//!         CredentialStore::from_env()?,
//!         Terminal::stdio(),
//!     );
//!     session.run().await?;
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod committer;
pub mod config;
pub mod credentials;
pub mod diff_guard;
pub mod editor;
pub mod error;
pub mod generator;
pub mod http_client;
pub mod selector;
pub mod session;
pub mod terminal;
pub mod vcs;
