//! Kubernetes engine for ChaosDuck: pod lifecycle, in-pod exec, steady
//! state and topology reads, all behind the runtime's engine trait.

mod client;
mod engine;

pub use client::create_client;
pub use engine::KubeEngine;
