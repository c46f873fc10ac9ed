//! `-p` structural dumps for every supported input kind.

use std::fmt::Write;
use std::fs;
use std::path::Path;

use declass_dex::{ClassData, Dex};
use declass_jvm::{dump::dump_class, ClassFile};
use declass_zip::Archive;
use log::error;

use crate::errors::TaskError;
use crate::input::InputKind;

/// Print structural information about `path` to stdout.
pub fn dump_path(path: &Path, kind: InputKind) -> Result<(), TaskError> {
    match kind {
        InputKind::JavaClass => {
            let class = ClassFile::parse(&fs::read(path)?)?;
            print!("{}", dump_class(&class)?);
        }
        InputKind::Dex => {
            let dex = Dex::parse(fs::read(path)?)?;
            print!("{}", dump_dex(&dex)?);
        }
        InputKind::Apk => {
            let archive = Archive::open(fs::read(path)?)?;
            let mut entries: Vec<String> = archive
                .names()
                .filter(|name| name.ends_with(".dex"))
                .map(str::to_owned)
                .collect();
            entries.sort();
            for name in entries {
                println!("=== {name} ===");
                let dumped = archive
                    .read(&name)
                    .map_err(TaskError::from)
                    .and_then(|b| Dex::parse(b).map_err(TaskError::from))
                    .and_then(|dex| dump_dex(&dex));
                match dumped {
                    Ok(text) => print!("{text}"),
                    Err(err) => error!("{name}: {err}"),
                }
            }
        }
        InputKind::Jar => {
            let archive = Archive::open(fs::read(path)?)?;
            let entries: Vec<String> = archive
                .names()
                .filter(|name| name.ends_with(".class"))
                .map(str::to_owned)
                .collect();
            for name in entries {
                println!("=== {name} ===");
                let dumped = archive
                    .read(&name)
                    .map_err(TaskError::from)
                    .and_then(|b| ClassFile::parse(&b).map_err(TaskError::from))
                    .and_then(|class| dump_class(&class).map_err(TaskError::from));
                match dumped {
                    Ok(text) => print!("{text}"),
                    Err(err) => error!("{name}: {err}"),
                }
            }
        }
    }
    Ok(())
}

/// Header block plus one line per class definition.
pub fn dump_dex(dex: &Dex) -> Result<String, TaskError> {
    let mut out = String::new();
    let header = &dex.header;

    writeln!(out, "dex_version={}", header.version).unwrap();
    writeln!(out, "checksum={:#010x}", header.checksum).unwrap();
    writeln!(out, "file_size={}", header.file_size).unwrap();
    writeln!(
        out,
        "strings={} types={} protos={} fields={} methods={} class_defs={}",
        header.string_ids_size,
        header.type_ids_size,
        header.proto_ids_size,
        header.field_ids_size,
        header.method_ids_size,
        header.class_defs_size
    )
    .unwrap();
    out.push('\n');

    for class in &dex.class_defs {
        let data = ClassData::decode(dex, class)?;
        let superclass = class
            .superclass(dex)?
            .map(|s| s.into_owned())
            .unwrap_or_default();
        writeln!(
            out,
            "{} ({}) fields={} methods={}",
            class.descriptor(dex)?,
            superclass,
            data.static_fields.len() + data.instance_fields.len(),
            data.direct_methods.len() + data.virtual_methods.len()
        )
        .unwrap();
    }
    Ok(out)
}
