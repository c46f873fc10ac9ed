use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use declass::apk::{process_apk, process_dex};
use declass::dump::dump_path;
use declass::input::{classify_path, InputKind};
use declass::jar::{process_class_file, process_jar};
use declass::TaskKind;
use log::info;

#[derive(Parser)]
#[command(name = "declass", version, about = "Decompile class/jar/dex/apk artifacts")]
struct Cli {
    /// Input file: a .class, .jar, .apk or .dex artifact
    input: PathBuf,

    /// Print structural information instead of decompiling
    #[arg(short = 'p')]
    print: bool,

    /// Emit smali assembly (dex and apk inputs only)
    #[arg(short = 's')]
    smali: bool,

    /// Output directory (default: a sibling of the input named
    /// <basename>_<ext>)
    #[arg(short = 'o')]
    output: Option<PathBuf>,

    /// Worker thread count, clamped to 1..=16; ignored for a single
    /// class-file input
    #[arg(short = 't', default_value_t = 4)]
    threads: u32,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("declass: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let kind = classify_path(&cli.input)
        .with_context(|| format!("can't open {}", cli.input.display()))?;

    if cli.print {
        return dump_path(&cli.input, kind).context("dump failed");
    }

    if cli.smali && !matches!(kind, InputKind::Dex | InputKind::Apk) {
        anyhow::bail!("-s is only valid for dex and apk inputs");
    }
    let task_kind = if cli.smali {
        TaskKind::Smali
    } else {
        TaskKind::Decompile
    };

    let out_dir = match &cli.output {
        Some(path) => path.clone(),
        None => default_out_dir(&cli.input),
    };

    match kind {
        InputKind::JavaClass => {
            process_class_file(&cli.input, &out_dir)
                .with_context(|| format!("can't decompile {}", cli.input.display()))?;
        }
        InputKind::Dex => {
            let summary = process_dex(&cli.input, &out_dir, task_kind, cli.threads)
                .with_context(|| format!("can't decompile {}", cli.input.display()))?;
            info!("{} classes done ({} scheduled)", summary.done, summary.added);
        }
        InputKind::Apk => {
            let summary = process_apk(&cli.input, &out_dir, task_kind, cli.threads)
                .with_context(|| format!("can't decompile {}", cli.input.display()))?;
            info!("{} classes done ({} scheduled)", summary.done, summary.added);
        }
        InputKind::Jar => {
            let summary = process_jar(&cli.input, &out_dir, cli.threads)
                .with_context(|| format!("can't decompile {}", cli.input.display()))?;
            info!("{} classes done ({} scheduled)", summary.done, summary.added);
        }
    }
    Ok(())
}

/// `app.apk` → `app_apk`, next to the input.
fn default_out_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("out");
    let ext = input
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("out");
    input.with_file_name(format!("{stem}_{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_out_dir_uses_basename_and_extension() {
        assert_eq!(
            default_out_dir(Path::new("/tmp/app.apk")),
            Path::new("/tmp/app_apk")
        );
        assert_eq!(
            default_out_dir(Path::new("classes.dex")),
            Path::new("classes_dex")
        );
    }
}
