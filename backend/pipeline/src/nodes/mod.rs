//! Node handlers. Each file adds an `impl Orchestrator` block with the
//! handlers for one stage cluster; dispatch lives in `orchestrator.rs`.

mod cache_check;
mod gate_node;
mod master_agent;
mod memory_reader;
mod memory_writer;
mod post;
mod prompt_analyzer;
mod terminals;
mod trending;
mod web;
