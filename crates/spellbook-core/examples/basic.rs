// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # Basic Spell Runtime Example
//!
//! Installs a worker spell and a periodic spell, drives them with the Tokio
//! runtime for a few seconds and prints what they recorded.  Run with:
//!
//! ```bash
//! RUST_LOG=spellbook_core=debug cargo run --example basic
//! ```

use std::sync::Arc;
use std::time::Duration;

use spellbook_core::{
    api::SpellApi,
    config_loader::load_config_from_env,
    registry::SpellRegistry,
    router::PeerEvent,
    runner::{runner_fn, Invocation, ScriptHost},
    runtime::SpellRuntime,
    storage::InMemoryStorage,
    trigger::TriggerConfigInput,
    types::{Caller, ScriptError},
};

const WORKER: &str = "12D3KooWWorker";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("Spellbook: Basic Example\n");

    // -----------------------------------------------------------------------
    // 1. Construct the registry with a script runner
    // -----------------------------------------------------------------------
    // The runner stands in for a script interpreter: it records each trigger
    // kind under a worker-writable key.
    let runner = runner_fn(|inv: &Invocation, host: &ScriptHost<'_, InMemoryStorage>| {
        host.list_push_string("w_seen", inv.trigger.payload.kind())
            .map_err(|err| ScriptError::new(1, err.to_string()).at("list_push_string", &inv.owner))
    });
    let config = load_config_from_env()?;
    let registry = Arc::new(SpellRegistry::in_memory(config, runner));
    let runtime = SpellRuntime::start(Arc::clone(&registry));
    let worker = SpellApi::new(&registry, Caller::peer(WORKER));

    // -----------------------------------------------------------------------
    // 2. Install the worker spell and report installation status
    // -----------------------------------------------------------------------
    let installer = worker.install("(seq (null) (null))", &TriggerConfigInput::disabled(), &[]);
    worker.add_alias(&registry.config().worker_spell_alias, &installer.spell_id);
    worker.set_worker_spell_status("INSTALLATION_IN_PROGRESS", "deploying");

    // -----------------------------------------------------------------------
    // 3. Install a periodic spell that also watches connectivity
    // -----------------------------------------------------------------------
    let ticker = worker.install(
        "(call %init_peer_id% (\"peer\" \"identify\") [])",
        &TriggerConfigInput::periodic(0, 1).on_connect(),
        &[("w_label", "ticker")],
    );
    println!("Installed spells: {:?}\n", worker.list_spells());

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    runtime.peer_event(&PeerEvent::connected("12D3KooWNeighbour"));
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    worker.set_worker_spell_status("INSTALLATION_SUCCESSFUL", "");
    runtime.shutdown().await;

    // -----------------------------------------------------------------------
    // 4. Inspect what the spells recorded
    // -----------------------------------------------------------------------
    println!("Ticker counter: {}", worker.get_counter(&ticker.spell_id).num);
    println!("Ticker saw:     {:?}", worker.list_get_strings(&ticker.spell_id, "w_seen").value);
    for event in worker.get_all_trigger_events(&ticker.spell_id, 0).events {
        println!("  #{} at {} ms: {:?}", event.seq, event.delivered_at_ms, event.payload);
    }

    println!("\nWorker spell status history:");
    for record in worker.get_worker_spell_statuses_from(0) {
        println!("  {} {} {:?}", record.timestamp, record.state, record.message);
    }

    Ok(())
}
