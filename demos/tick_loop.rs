// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Frame-loop example against a simulated target.
//!
//! Demonstrates:
//! 1. Building an engine over an in-process simulated entity list
//! 2. Listening for added / removed / player-updated notifications
//! 3. Driving ticks while entities spawn, move, vanish and relocate
//! 4. Running a plugin job that reads the cache after collection
//! 5. Resetting on an area change
//! 6. Displaying captured metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example tick_loop
//! ```

use std::sync::Arc;
use std::time::Duration;

use entity_engine::memory::simulated::{SimulatedProcess, SimulatedResolver};
use entity_engine::{
    AreaInstance, Engine, EngineConfig, EntityDetails, EntityType, GameContext, GridPos, Job, LeagueType,
    MemoryReader,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

fn actor(path: &str, entity_type: EntityType, x: f32, y: f32) -> EntityDetails {
    EntityDetails {
        path: path.to_string(),
        entity_type,
        is_alive: true,
        grid_pos: GridPos::new(x, y),
        ..EntityDetails::default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           entity-engine: Tick Loop Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Simulated target and engine
    // ─────────────────────────────────────────────────────────────────────────
    let config = EngineConfig {
        worker_threads: 2,
        barrier_timeout_ms: Some(250),
        ..Default::default()
    };
    let process = Arc::new(SimulatedProcess::new(&config));
    process.spawn_local_player(1, actor("Metadata/Characters/Dex/Dex", EntityType::Player, 0.0, 0.0));

    let mut engine = Engine::new(
        config,
        Arc::clone(&process) as Arc<dyn MemoryReader>,
        Arc::clone(&process) as Arc<dyn GameContext>,
        Arc::new(SimulatedResolver::new()),
    )?;

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Notifications
    // ─────────────────────────────────────────────────────────────────────────
    let events = engine.cache().events();
    events.on_added(|e| println!("   + {} {} at {}", e.id(), e.entity_type(), e.grid_pos()));
    events.on_removed(|e| println!("   - {} {}", e.id(), e.entity_type()));
    events.on_player_updated(|p| println!("   ★ player is now {} ({})", p.id(), p.path()));

    println!("🗺️  Entering area...");
    engine.area_changed(&AreaInstance::new("Azurite Mine", 0x51));

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Ticks
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🎬 Tick 1: initial population");
    process.spawn(100, actor("Metadata/Monsters/Goatman", EntityType::Monster, 20.0, 5.0));
    process.spawn(101, actor("Metadata/Monsters/Goatman", EntityType::Monster, 300.0, 40.0));
    process.spawn(102, EntityDetails {
        league: LeagueType::Delve,
        ..actor("Metadata/Chests/DelveChests/Azurite", EntityType::Chest, 50.0, 0.0)
    });
    process.spawn(103, actor("Metadata/Effects/Spark", EntityType::Effect, 1.0, 1.0));
    let report = engine.tick(Vec::new());
    println!("   {report}");

    println!("\n🎬 Tick 2: the near goatman dies and vanishes, the far one wanders off-list");
    process.despawn(100);
    process.unlist(101);
    process.unlist(102);
    let report = engine.tick(Vec::new());
    println!("   {report}");
    if let Some(stats) = engine.cache().last_pass_stats() {
        println!("   pass: {stats}");
    }

    println!("\n🎬 Tick 3: the far goatman returns at a new address");
    process.relist(101);
    process.relocate(101);
    let lookup = engine.cache().lookup();
    let plugin = Job::new("count_monsters", move || {
        let seen = (100..104).filter(|id| lookup.get(*id).is_some_and(|e| e.is_valid())).count();
        println!("   plugin: {seen} valid records among 100..104");
        Ok(())
    });
    let report = engine.tick(vec![plugin]);
    println!("   {report}");

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Area change
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🗺️  Leaving area...");
    engine.area_changed(&AreaInstance::new("Hideout", 0x52));
    println!("   cache now holds {} records", engine.cache().len());

    println!("\n📋 Job history:");
    for record in engine.scheduler().history() {
        println!(
            "   └─ {} [{}] {} in {:?}",
            record.name,
            record.kind,
            record.status,
            record.elapsed.unwrap_or_default()
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    engine.shutdown(Duration::from_secs(1));
    println!("\n👋 Done.");
    Ok(())
}

/// Dump all captured metrics
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut gauges: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name.to_string(), label_str, v)),
            DebugValue::Gauge(v) => gauges.push((name.to_string(), label_str, v.into_inner())),
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                let max = samples.iter().map(|v| v.into_inner()).fold(f64::NEG_INFINITY, f64::max);
                histograms.push((name.to_string(), label_str, count, sum, max));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    gauges.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !gauges.is_empty() {
        println!("   ├─ Gauges");
        for (name, labels, value) in &gauges {
            println!("   │  └─ {}{} = {:.0}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, labels, count, sum, max) in &histograms {
            println!("      └─ {}{} count={} sum={:.6} max={:.6}", name, labels, count, sum, max);
        }
    }
    if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
}
