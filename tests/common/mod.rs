//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

pub use reflow::{
    Bindings, ContextView, Engine, EngineConfig, Entity, Error, FiringPolicy, Outcome, Predicate,
    ResolveError, ResolveResult, RunReport, RunStatus, Snapshot, Value,
};
use tempfile::TempDir;

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Install an env-filtered subscriber once per test binary.
///
/// Set `RUST_LOG=reflow=debug` to see per-entity decisions.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// TestEngine - engine over a temp state directory
// ============================================================================

/// Engine with a file-backed snapshot in a temporary directory.
///
/// `reopen` drops the engine and builds a fresh one over the same directory
/// with the same declarations, simulating the next process invocation.
pub struct TestEngine {
    pub engine: Engine,
    pub dir: TempDir,
    config: EngineConfig,
    declare: fn(&Engine),
}

impl TestEngine {
    /// Create an engine in a fresh temp dir and apply `declare`.
    pub fn new(declare: fn(&Engine)) -> Self {
        Self::with_config(EngineConfig::default(), declare)
    }

    /// Like `new`, with `config` (its `state_dir` is replaced by the temp dir).
    pub fn with_config(config: EngineConfig, declare: fn(&Engine)) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = EngineConfig {
            state_dir: Some(dir.path().to_path_buf()),
            ..config
        };
        let engine = Engine::open(config.clone()).expect("Failed to open engine");
        declare(&engine);
        TestEngine {
            engine,
            dir,
            config,
            declare,
        }
    }

    /// Simulate the next process invocation over the same state dir.
    pub fn reopen(&mut self) {
        let engine = Engine::open(self.config.clone()).expect("Failed to reopen engine");
        (self.declare)(&engine);
        self.engine = engine;
    }

    /// Simulate the next process invocation with different declarations.
    pub fn redeclare(&mut self, declare: fn(&Engine)) {
        self.declare = declare;
        self.reopen();
    }

    /// Run with `bindings`.
    pub fn run(&self, bindings: Bindings) -> RunReport {
        self.engine.run_once(bindings).expect("run_once failed")
    }

    /// Run with no bindings.
    pub fn run_empty(&self) -> RunReport {
        self.run(Bindings::new())
    }

    /// Path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join(&self.config.snapshot_file)
    }

    /// Path of the lock file.
    pub fn lock_path(&self) -> PathBuf {
        self.dir.path().join(".lock")
    }
}

// ============================================================================
// Call counting
// ============================================================================

/// Shared counter for resolver invocations.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// File helpers
// ============================================================================

/// Overwrite bytes at a specific offset.
pub fn corrupt_file_at_offset(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .expect("Failed to open file for corruption");
    file.seek(SeekFrom::Start(offset))
        .expect("Failed to seek in file");
    file.write_all(bytes)
        .expect("Failed to write corruption bytes");
}

/// Truncate a file to a specific size.
pub fn truncate_file(path: &Path, new_size: u64) {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .expect("Failed to open file for truncation");
    file.set_len(new_size).expect("Failed to truncate file");
}

/// Get file size (0 if not found).
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Read a JSON object binding.
pub fn json(value: serde_json::Value) -> Value {
    Value::from(value)
}
