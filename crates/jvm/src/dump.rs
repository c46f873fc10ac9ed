//! `javap`-style structural dump of a parsed class file.

use std::fmt::Write;

use crate::classfile::{ClassFile, Constant};
use crate::errors::ClassError;

/// Render the header block, member summaries and constant pool of one
/// class.
pub fn dump_class(class: &ClassFile) -> Result<String, ClassError> {
    let mut out = String::new();

    writeln!(out, "major_version={}", class.major_version).unwrap();
    writeln!(out, "minor_version={}", class.minor_version).unwrap();
    writeln!(out, "this_class={}", class.class_name()?).unwrap();
    if let Some(superclass) = class.super_name()? {
        writeln!(out, "super_class={superclass}").unwrap();
    }
    writeln!(out, "access_flags={:#06x}", class.access_flags.bits()).unwrap();
    if let Some(source) = class.source_file() {
        writeln!(out, "source_file={source}").unwrap();
    }
    writeln!(out, "constant_pool_count={}", class.constant_pool.len()).unwrap();

    if !class.interfaces.is_empty() {
        out.push_str("\ninterfaces:\n");
        for index in &class.interfaces {
            writeln!(out, "  {}", class.constant_pool.class_name(*index)?).unwrap();
        }
    }

    if !class.fields.is_empty() {
        out.push_str("\nfields:\n");
        for field in &class.fields {
            writeln!(
                out,
                "  {} {}",
                class.member_descriptor(field)?,
                class.member_name(field)?
            )
            .unwrap();
        }
    }

    if !class.methods.is_empty() {
        out.push_str("\nmethods:\n");
        for method in &class.methods {
            let code = class.code_of(method)?;
            match code {
                Some(code) => writeln!(
                    out,
                    "  {}{} (stack={}, locals={}, {} bytes)",
                    class.member_name(method)?,
                    class.member_descriptor(method)?,
                    code.max_stack,
                    code.max_locals,
                    code.code.len()
                )
                .unwrap(),
                None => writeln!(
                    out,
                    "  {}{}",
                    class.member_name(method)?,
                    class.member_descriptor(method)?
                )
                .unwrap(),
            }
        }
    }

    if !class.constant_pool.is_empty() {
        out.push_str("\nconstant pool:\n");
        out.push_str(&dump_constant_pool(class));
    }

    Ok(out)
}

/// One line per pool entry; long/double filler slots are skipped.
fn dump_constant_pool(class: &ClassFile) -> String {
    let mut out = String::new();
    for index in 1..class.constant_pool.len() as u16 {
        let Ok(entry) = class.constant_pool.get(index) else {
            continue;
        };
        if matches!(entry, Constant::Reserved) {
            continue;
        }
        writeln!(out, "  #{index} = {entry:?}").unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::test_fixtures::ClassBuilder;

    #[test]
    fn header_block_fields() {
        let bytes = ClassBuilder::new("p/A").build();
        let class = ClassFile::parse(&bytes).unwrap();
        let text = dump_class(&class).unwrap();

        assert!(text.contains("major_version=52\n"));
        assert!(text.contains("minor_version=0\n"));
        assert!(text.contains("this_class=p/A\n"));
        assert!(text.contains("super_class=java/lang/Object\n"));
    }

    #[test]
    fn constant_pool_entries_are_listed() {
        let bytes = ClassBuilder::new("p/A").build();
        let class = ClassFile::parse(&bytes).unwrap();
        let text = dump_class(&class).unwrap();

        assert!(text.contains("constant pool:\n"));
        assert!(text.contains("#1 = Utf8(\"p/A\")"));
    }
}
