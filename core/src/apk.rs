//! APK and DEX fan-out: one task per eligible class definition.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use declass_dex::Dex;
use declass_zip::Archive;
use log::{debug, error, warn};

use crate::errors::TaskError;
use crate::pool::{clamp_workers, WorkerPool};
use crate::source::SourceTree;
use crate::task::{run_decompile_task, run_smali_task, ApkContext, TaskKind};

/// Counters of one archive run; `done == added` holds after `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub added: usize,
    pub done: usize,
}

/// Decompile every `.dex` entry of an APK into `out_dir`.
pub fn process_apk(
    path: &Path,
    out_dir: &Path,
    kind: TaskKind,
    workers: u32,
) -> Result<RunSummary, TaskError> {
    let archive = Archive::open(fs::read(path)?)?;

    let mut entries: Vec<String> = archive
        .names()
        .filter(|name| name.ends_with(".dex"))
        .map(str::to_owned)
        .collect();
    entries.sort();
    debug!("{} code entries in {}", entries.len(), path.display());

    let ctx = Arc::new(ApkContext::new(out_dir.to_path_buf(), kind));
    let pool = WorkerPool::new(clamp_workers(workers));

    for name in entries {
        let bytes = match archive.read(&name) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("{name}: {err}");
                continue;
            }
        };
        // a format error aborts this entry; its peers continue
        let dex = match Dex::parse(bytes) {
            Ok(dex) => Arc::new(dex),
            Err(err) => {
                error!("{name}: {err}");
                continue;
            }
        };
        if !dex.verify_checksum() {
            warn!("{name}: checksum mismatch, continuing anyway");
        }
        schedule_image(&pool, &dex, &ctx);
    }

    pool.join();
    ctx.finish();
    let (added, done) = ctx.counts();
    Ok(RunSummary { added, done })
}

/// Decompile a standalone DEX file into `out_dir`.
pub fn process_dex(
    path: &Path,
    out_dir: &Path,
    kind: TaskKind,
    workers: u32,
) -> Result<RunSummary, TaskError> {
    // parse up front: an invalid container fails before any output exists
    let dex = Arc::new(Dex::parse(fs::read(path)?)?);
    if !dex.verify_checksum() {
        warn!("{}: checksum mismatch, continuing anyway", path.display());
    }

    let ctx = Arc::new(ApkContext::new(out_dir.to_path_buf(), kind));
    let pool = WorkerPool::new(clamp_workers(workers));
    schedule_image(&pool, &dex, &ctx);
    pool.join();
    ctx.finish();
    let (added, done) = ctx.counts();
    Ok(RunSummary { added, done })
}

/// Queue one task per eligible class of an image. In decompile mode inner
/// and anonymous classes ride along inside their declaring class's task;
/// in smali mode every class definition is scheduled.
pub fn schedule_image(pool: &WorkerPool, dex: &Arc<Dex>, ctx: &Arc<ApkContext>) {
    match ctx.kind {
        TaskKind::Decompile => {
            let tree = Arc::new(SourceTree::build(dex));
            for &node_id in &tree.roots {
                ctx.note_added();
                let dex = Arc::clone(dex);
                let tree = Arc::clone(&tree);
                let ctx = Arc::clone(ctx);
                pool.enqueue(move |arena| {
                    run_decompile_task(arena, &dex, &tree, node_id, &ctx);
                });
            }
        }
        TaskKind::Smali => {
            for class_index in 0..dex.class_defs.len() {
                ctx.note_added();
                let dex = Arc::clone(dex);
                let ctx = Arc::clone(ctx);
                pool.enqueue(move |_arena| {
                    run_smali_task(&dex, class_index, &ctx);
                });
            }
        }
    }
}
