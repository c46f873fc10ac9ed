//! Per-class task bodies and the shared run context.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bumpalo::Bump;
use declass_dex::{smali, Dex};
use log::error;

use crate::errors::TaskError;
use crate::java;
use crate::source::{package_path, simple_name, SourceTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Decompile,
    Smali,
}

/// Shared state of one archive run. Outlives every task; released only
/// after the pool joins.
pub struct ApkContext {
    pub out_dir: PathBuf,
    pub kind: TaskKind,
    added: AtomicUsize,
    done: AtomicUsize,
    progress: Mutex<Progress>,
}

struct Progress {
    last_len: usize,
    enabled: bool,
}

impl ApkContext {
    pub fn new(out_dir: PathBuf, kind: TaskKind) -> ApkContext {
        ApkContext {
            out_dir,
            kind,
            added: AtomicUsize::new(0),
            done: AtomicUsize::new(0),
            progress: Mutex::new(Progress {
                last_len: 0,
                enabled: true,
            }),
        }
    }

    /// Context that never paints the progress line (dump-style runs).
    pub fn quiet(out_dir: PathBuf, kind: TaskKind) -> ApkContext {
        let ctx = ApkContext::new(out_dir, kind);
        ctx.progress.lock().expect("progress lock").enabled = false;
        ctx
    }

    pub fn note_added(&self) {
        self.added.fetch_add(1, Ordering::SeqCst);
    }

    /// Count a completion and repaint the progress line under the lock.
    pub fn note_done(&self) {
        let mut progress = self.progress.lock().expect("progress lock");
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let added = self.added.load(Ordering::SeqCst);
        progress.repaint(done, added);
    }

    /// (added, done)
    pub fn counts(&self) -> (usize, usize) {
        (
            self.added.load(Ordering::SeqCst),
            self.done.load(Ordering::SeqCst),
        )
    }

    /// Terminate the progress line once the pool has joined.
    pub fn finish(&self) {
        let progress = self.progress.lock().expect("progress lock");
        if progress.enabled && progress.last_len > 0 {
            eprintln!();
        }
    }
}

impl Progress {
    /// Repaint in place: rub out the previous text with backspaces, then
    /// write the new counter pair.
    fn repaint(&mut self, done: usize, added: usize) {
        if !self.enabled {
            return;
        }
        let text = format!("{done} ({added})");
        let mut line = "\u{8}".repeat(self.last_len);
        line.push_str(&text);
        if text.len() < self.last_len {
            let pad = self.last_len - text.len();
            line.push_str(&" ".repeat(pad));
            line.push_str(&"\u{8}".repeat(pad));
        }
        eprint!("{line}");
        let _ = std::io::stderr().flush();
        self.last_len = text.len();
    }
}

/// Output path of one class: `<out>/<pkg>/<Name>.<ext>`.
pub fn class_output_path(out_dir: &Path, descriptor: &str, extension: &str) -> PathBuf {
    let mut path = out_dir.to_path_buf();
    let package = package_path(descriptor);
    if !package.is_empty() {
        path.push(package);
    }
    path.push(format!("{}.{extension}", simple_name(descriptor)));
    path
}

fn write_output(path: &Path, text: &str) -> Result<(), TaskError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

/// Decompile one top-level class (with its nested classes) to a `.java`
/// file. Failures are logged; peers continue.
pub fn run_decompile_task(
    arena: &Bump,
    dex: &Arc<Dex>,
    tree: &Arc<SourceTree>,
    node_id: usize,
    ctx: &Arc<ApkContext>,
) {
    let result = (|| -> Result<(), TaskError> {
        let class = &dex.class_defs[tree.nodes[node_id].class_index];
        let descriptor = class.descriptor(dex)?.into_owned();
        let text = java::write_dex_class(dex, tree, node_id, arena)?;
        write_output(&class_output_path(&ctx.out_dir, &descriptor, "java"), &text)
    })();

    if let Err(err) = result {
        error!("decompile task failed: {err}");
    }
    ctx.note_done();
}

/// Print one class definition as `.smali`. Inner classes get their own
/// files in this mode.
pub fn run_smali_task(dex: &Arc<Dex>, class_index: usize, ctx: &Arc<ApkContext>) {
    let result = (|| -> Result<(), TaskError> {
        let class = &dex.class_defs[class_index];
        let descriptor = class.descriptor(dex)?.into_owned();
        let text = smali::write_class(dex, class)?;
        write_output(&class_output_path(&ctx.out_dir, &descriptor, "smali"), &text)
    })();

    if let Err(err) = result {
        error!("smali task failed: {err}");
    }
    ctx.note_done();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths_follow_packages() {
        let out = Path::new("/tmp/out");
        assert_eq!(
            class_output_path(out, "Lcom/a/B;", "java"),
            Path::new("/tmp/out/com/a/B.java")
        );
        assert_eq!(
            class_output_path(out, "La;", "smali"),
            Path::new("/tmp/out/a.smali")
        );
        assert_eq!(
            class_output_path(out, "Lcom/a/B$C;", "smali"),
            Path::new("/tmp/out/com/a/B$C.smali")
        );
    }

    #[test]
    fn counters_track_added_and_done() {
        let ctx = ApkContext::quiet(PathBuf::from("/tmp"), TaskKind::Decompile);
        for _ in 0..5 {
            ctx.note_added();
        }
        for _ in 0..5 {
            ctx.note_done();
        }
        assert_eq!(ctx.counts(), (5, 5));
    }
}
