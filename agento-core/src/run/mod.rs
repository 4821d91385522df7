//! Run orchestrator (C6, §4.1). `RunOrchestrator` is the public entry point; `demux`/`capture`/
//! `allowlist`/`handle` are its internal building blocks, grounded on
//! `serve::run::handle_run`'s spawn-task + channel dispatch pattern and `loom::llm::LlmClient`'s
//! streaming trait shape (see `crate::runtime`).

pub mod allowlist;
pub mod capture;
pub mod demux;
pub mod handle;
pub mod orchestrator;

pub use handle::RunHandle;
pub use orchestrator::{EffectiveAgent, RunOrchestrator};
