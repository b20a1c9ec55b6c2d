//! DoAfter Headless Scenario Harness
//!
//! Drives the scheduler through scripted and randomized scenarios.
//! Runs entirely in-process with no rendering and no networking.
//!
//! Usage:
//!   cargo run -p doafter-simtest
//!   cargo run -p doafter-simtest -- --verbose
//!   cargo run -p doafter-simtest -- --seed 1234
//!   RUST_LOG=debug cargo run -p doafter-simtest

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use doafter_core::prelude::*;
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use hecs::Entity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn check(name: &str, passed: bool, detail: impl Into<String>) -> TestResult {
    TestResult {
        name: name.into(),
        passed,
        detail: detail.into(),
    }
}

fn main() {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
    }

    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose");
    let seed = args
        .iter()
        .position(|a| a == "--seed")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(42);

    println!("=== DoAfter Scenario Harness ===\n");

    let mut results = Vec::new();

    // 1. Timing and the reference scenario
    results.extend(validate_timing(verbose));

    // 2. Interruption conditions and their precedence
    results.extend(validate_interruptions(verbose));

    // 3. Grid pause
    results.extend(validate_pause(verbose));

    // 4. Deleted actors and targets
    results.extend(validate_deletion(verbose));

    // 5. Callers suspended on handles
    results.extend(validate_callers(verbose));

    // 6. Configuration loading
    results.extend(validate_config(verbose));

    // 7. Randomized soak
    results.extend(validate_soak(seed, verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn station() -> (SimulationEngine, Entity, Entity) {
    let mut engine = SimulationEngine::new();
    let grid = engine.spawn_grid("station");
    let actor = engine.spawn_actor(grid, 0.0, 0.0);
    (engine, grid, actor)
}

// ── 1. Timing ───────────────────────────────────────────────────────────

fn validate_timing(verbose: bool) -> Vec<TestResult> {
    println!("--- Timing ---");
    let mut results = Vec::new();

    // delay 3.0, three ticks of 1.0, then 0.1
    let (mut engine, _, actor) = station();
    let mut handle = engine.initiate(DoAfterArgs::new(actor, 3.0).break_on_actor_move(true));
    let mut trace = Vec::new();
    for dt in [1.0, 1.0, 1.0] {
        engine.update(dt);
        trace.push(handle.try_status());
    }
    let running_through_three = trace.iter().all(Option::is_none);
    engine.update(0.1);
    let finished = handle.try_status() == Some(DoAfterStatus::Finished);
    results.push(check(
        "reference_scenario",
        running_through_three && finished,
        format!("after 3x1.0 {:?}, after +0.1 {:?}", trace, handle.try_status()),
    ));
    if verbose {
        println!("  elapsed strictly greater than delay required to finish");
    }

    let (mut engine, _, actor) = station();
    let mut handle = engine.initiate(DoAfterArgs::new(actor, 0.0));
    engine.update(1.0 / 60.0);
    results.push(check(
        "zero_delay_first_tick",
        handle.try_status() == Some(DoAfterStatus::Finished),
        format!("{:?}", handle.try_status()),
    ));

    results
}

// ── 2. Interruptions ────────────────────────────────────────────────────

fn validate_interruptions(_verbose: bool) -> Vec<TestResult> {
    println!("--- Interruptions ---");
    let mut results = Vec::new();

    // Movement
    let (mut engine, _, actor) = station();
    let mut handle = engine.initiate(DoAfterArgs::new(actor, 3.0).break_on_actor_move(true));
    engine.update(1.0);
    engine.move_to(actor, 1.0, 0.0);
    engine.update(1.0);
    results.push(check(
        "move_cancels",
        handle.try_status() == Some(DoAfterStatus::Cancelled),
        format!("{:?}", handle.try_status()),
    ));

    // Damage is sticky
    let (mut engine, _, actor) = station();
    let mut handle = engine.initiate(DoAfterArgs::new(actor, 5.0).break_on_damage(true));
    engine.update(1.0);
    engine.damage(actor);
    engine.update(1.0);
    let reason = engine.drain_events().first().and_then(|e| e.reason);
    results.push(check(
        "damage_sticky",
        handle.try_status() == Some(DoAfterStatus::Cancelled)
            && reason == Some(CancelReason::Damaged),
        format!("{:?} {:?}", handle.try_status(), reason),
    ));

    // Untargeted target-move flag is inert
    let (mut engine, grid, actor) = station();
    let other = engine.spawn_actor(grid, 4.0, 0.0);
    let mut handle = engine.initiate(DoAfterArgs::new(actor, 1.0).break_on_target_move(true));
    engine.move_to(other, 8.0, 8.0);
    engine.update(1.5);
    results.push(check(
        "no_target_normalization",
        handle.try_status() == Some(DoAfterStatus::Finished),
        format!("{:?}", handle.try_status()),
    ));

    // Success wins on the same tick as an interruption
    let (mut engine, _, actor) = station();
    let signal = CancelSignal::new();
    let mut handle = engine.initiate(
        DoAfterArgs::new(actor, 1.0)
            .break_on_anything()
            .with_cancel_signal(signal.clone()),
    );
    engine.update(0.9);
    signal.cancel();
    engine.move_to(actor, 2.0, 2.0);
    engine.damage(actor);
    engine.set_stunned(actor, true);
    engine.update(0.2);
    results.push(check(
        "success_precedence",
        handle.try_status() == Some(DoAfterStatus::Finished),
        format!("{:?}", handle.try_status()),
    ));

    // Picking something up mid-action
    let (mut engine, _, actor) = station();
    let mut handle = engine.initiate(DoAfterArgs::new(actor, 3.0).break_on_hand_change(true));
    engine.update(1.0);
    if let Ok(mut hands) = engine.world.get::<&mut Hands>(actor) {
        hands.pick_up();
    }
    engine.update(1.0);
    let changed = handle.try_status() == Some(DoAfterStatus::Cancelled);

    // Dropping it again frees the hand a second action needs
    if let Ok(mut hands) = engine.world.get::<&mut Hands>(actor) {
        hands.pick_up();
        hands.drop_one();
    }
    let mut needs_hand = engine.initiate(DoAfterArgs::new(actor, 1.0).requires_free_hand(true));
    engine.update(1.5);
    results.push(check(
        "hand_change",
        changed && needs_hand.try_status() == Some(DoAfterStatus::Finished),
        format!("{:?} then {:?}", handle.try_status(), needs_hand.try_status()),
    ));

    // Second identical action is refused
    let (mut engine, grid, actor) = station();
    let target = engine.spawn_actor(grid, 1.0, 0.0);
    let cocoon = || {
        DoAfterArgs::new(actor, 2.0)
            .with_target(target)
            .with_label("cocoon")
            .block_duplicate(true)
    };
    let mut first = engine.initiate(cocoon());
    let mut second = engine.initiate(cocoon());
    engine.update(2.5);
    let reasons: Vec<_> = engine.drain_events().into_iter().map(|e| e.reason).collect();
    results.push(check(
        "duplicate_blocked",
        first.try_status() == Some(DoAfterStatus::Finished)
            && second.try_status() == Some(DoAfterStatus::Cancelled),
        format!("{:?}", reasons),
    ));

    results
}

// ── 3. Pause ────────────────────────────────────────────────────────────

fn validate_pause(_verbose: bool) -> Vec<TestResult> {
    println!("--- Pause ---");
    let mut results = Vec::new();

    let (mut engine, grid, actor) = station();
    let mut handle = engine.initiate(DoAfterArgs::new(actor, 2.0));
    engine.update(1.0);
    engine.pause_grid(grid, true);

    let mut frozen = true;
    for _ in 0..20 {
        let summary = engine.update(1.0);
        frozen &= summary.actors_advanced == 0 && handle.try_status().is_none();
    }
    let progress = engine.doafters.progress(&engine.world, actor);
    frozen &= progress.first().is_some_and(|(_, p)| (*p - 0.5).abs() < 1e-5);

    engine.pause_grid(grid, false);
    engine.update(1.5);
    results.push(check(
        "pause_freeze",
        frozen && handle.try_status() == Some(DoAfterStatus::Finished),
        format!("progress while paused {:?}", progress),
    ));

    results
}

// ── 4. Deletion ─────────────────────────────────────────────────────────

fn validate_deletion(_verbose: bool) -> Vec<TestResult> {
    println!("--- Deletion ---");
    let mut results = Vec::new();

    let (mut engine, grid, actor) = station();
    let target = engine.spawn_actor(grid, 1.0, 0.0);
    let mut handle = engine.initiate(DoAfterArgs::new(actor, 5.0).with_target(target));
    let _ = engine.world.despawn(target);
    engine.update(0.5);
    results.push(check(
        "target_deleted_cancels",
        handle.try_status() == Some(DoAfterStatus::Cancelled),
        format!("{:?}", handle.try_status()),
    ));

    let (mut engine, _, actor) = station();
    let mut handle = engine.initiate(DoAfterArgs::new(actor, 5.0).break_on_damage(true));
    let _ = engine.world.despawn(actor);
    let before_tick = handle.try_status();
    engine.update(0.5);
    let reason = engine.drain_events().first().and_then(|e| e.reason);
    results.push(check(
        "actor_deleted_cancels",
        before_tick.is_none()
            && handle.try_status() == Some(DoAfterStatus::Cancelled)
            && reason == Some(CancelReason::ActorDeleted)
            && engine.damage.total_subscribers() == 0,
        format!(
            "{:?} before tick, {:?} after ({:?}), {} subscriptions left",
            before_tick,
            handle.try_status(),
            reason,
            engine.damage.total_subscribers()
        ),
    ));

    results
}

// ── 5. Callers ──────────────────────────────────────────────────────────

fn validate_callers(_verbose: bool) -> Vec<TestResult> {
    println!("--- Callers ---");
    let mut results = Vec::new();

    let (engine, _, actor) = station();
    let engine = Rc::new(RefCell::new(engine));
    let mut pool = LocalPool::new();
    let outcome = Rc::new(RefCell::new(None));

    let handle = engine.borrow_mut().initiate(DoAfterArgs::new(actor, 1.0));
    let out = outcome.clone();
    let spawned = pool.spawner().spawn_local(async move {
        *out.borrow_mut() = Some(handle.await);
    });

    engine.borrow_mut().update(2.0);
    let before_poll = *outcome.borrow();
    pool.run_until_stalled();
    let after_poll = *outcome.borrow();

    results.push(check(
        "resume_on_tick_boundary",
        spawned.is_ok() && before_poll.is_none() && after_poll == Some(DoAfterStatus::Finished),
        format!("before poll {:?}, after poll {:?}", before_poll, after_poll),
    ));

    results
}

// ── 6. Config ───────────────────────────────────────────────────────────

fn validate_config(_verbose: bool) -> Vec<TestResult> {
    println!("--- Config ---");
    let mut results = Vec::new();

    let parsed = SchedulerConfig::from_json_str(
        r#"{ "movement_threshold": 0.5, "default_distance_threshold": 1.5 }"#,
    );
    results.push(check(
        "config_parse",
        matches!(&parsed, Ok(c) if c.movement_threshold == 0.5 && c.emit_events),
        format!("{:?}", parsed),
    ));

    let rejected = SchedulerConfig::from_json_str(r#"{ "movement_threshold": -1 }"#);
    results.push(check(
        "config_rejects_negative",
        rejected.is_err(),
        format!("{:?}", rejected.err()),
    ));

    results
}

// ── 7. Randomized soak ──────────────────────────────────────────────────

fn validate_soak(seed: u64, verbose: bool) -> Vec<TestResult> {
    println!("--- Soak (seed {}) ---", seed);
    let mut results = Vec::new();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut engine = SimulationEngine::new();
    let grids: Vec<Entity> = (0..3).map(|i| engine.spawn_grid(format!("grid-{}", i))).collect();
    let actors: Vec<Entity> = (0..50)
        .map(|_| {
            let grid = grids[rng.gen_range(0..grids.len())];
            engine.spawn_actor(grid, rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0))
        })
        .collect();

    let mut handles = Vec::new();
    let mut seen = HashSet::new();
    let mut duplicates = 0;
    let mut finished = 0;
    let mut cancelled = 0;

    for tick in 0..600 {
        // New work
        for &actor in &actors {
            if rng.gen_bool(0.02) {
                let target = actors[rng.gen_range(0..actors.len())];
                let mut builder = DoAfterArgs::new(actor, rng.gen_range(0.0..4.0))
                    .break_on_actor_move(rng.gen_bool(0.5))
                    .break_on_damage(rng.gen_bool(0.5))
                    .break_on_stun(rng.gen_bool(0.5))
                    .break_on_hand_change(rng.gen_bool(0.2))
                    .with_label(format!("job-{}", rng.gen_range(0..3)))
                    .block_duplicate(rng.gen_bool(0.2))
                    .cancel_duplicate(rng.gen_bool(0.2));
                if target != actor && rng.gen_bool(0.3) {
                    builder = builder.with_target(target).break_on_target_move(true);
                }
                handles.push(engine.initiate(builder));
            }
        }

        // World noise
        for &actor in &actors {
            if rng.gen_bool(0.01) {
                engine.move_to(actor, rng.gen_range(-10.0..10.0), rng.gen_range(-10.0..10.0));
            }
            if rng.gen_bool(0.005) {
                engine.damage(actor);
            }
            if rng.gen_bool(0.01) {
                if let Ok(mut hands) = engine.world.get::<&mut Hands>(actor) {
                    if !hands.pick_up() {
                        hands.drop_one();
                    }
                }
            }
            if rng.gen_bool(0.005) {
                engine.set_stunned(actor, rng.gen_bool(0.5));
            }
        }
        if tick % 100 == 50 {
            let grid = grids[rng.gen_range(0..grids.len())];
            engine.pause_grid(grid, true);
        }
        if tick % 100 == 80 {
            for &grid in &grids {
                engine.pause_grid(grid, false);
            }
        }

        engine.update(1.0 / 20.0);
        for event in engine.drain_events() {
            if !seen.insert(event.id) {
                duplicates += 1;
            }
            match event.status {
                DoAfterStatus::Finished => finished += 1,
                DoAfterStatus::Cancelled => cancelled += 1,
                DoAfterStatus::Running => {}
            }
        }
    }

    // Unpause and drain the tail; nothing moves or takes damage from here on
    for &grid in &grids {
        engine.pause_grid(grid, false);
    }
    for &actor in &actors {
        engine.set_stunned(actor, false);
    }
    for _ in 0..200 {
        engine.update(1.0 / 20.0);
        for event in engine.drain_events() {
            if !seen.insert(event.id) {
                duplicates += 1;
            }
            match event.status {
                DoAfterStatus::Finished => finished += 1,
                DoAfterStatus::Cancelled => cancelled += 1,
                DoAfterStatus::Running => {}
            }
        }
    }

    let mut unresolved = 0;
    for handle in &mut handles {
        if handle.try_status().is_none() {
            unresolved += 1;
        }
    }

    results.push(check(
        "soak_exactly_once",
        duplicates == 0 && seen.len() == handles.len(),
        format!(
            "{} started, {} outcomes, {} duplicates",
            handles.len(),
            seen.len(),
            duplicates
        ),
    ));
    results.push(check(
        "soak_all_resolved",
        unresolved == 0,
        format!("{} finished, {} cancelled, {} unresolved", finished, cancelled, unresolved),
    ));
    results.push(check(
        "soak_no_leaked_subscriptions",
        engine.damage.total_subscribers() == 0,
        format!("{} subscriptions left", engine.damage.total_subscribers()),
    ));

    if verbose {
        println!(
            "  {} actions over {:.1}s of simulated time",
            handles.len(),
            engine.sim_time()
        );
    }

    results
}
