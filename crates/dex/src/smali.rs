//! Smali printer: a linear walk over the decoded instructions.
//!
//! Output is deterministic for a given input. Labels are synthesized for
//! every branch target and handler start from the byte offset of the
//! labeled instruction.

use std::collections::BTreeSet;
use std::fmt::Write;

use crate::class_data::{ClassData, CodeItem, EncodedField, EncodedMethod};
use crate::dex::{ClassDef, Dex};
use crate::errors::DexError;
use crate::insns::{decode_insns, Insn, Opcode, Operands};

const INDENT: &str = "    ";

/// Render one class definition as a smali compilation unit.
pub fn write_class(dex: &Dex, class: &ClassDef) -> Result<String, DexError> {
    let mut out = String::new();
    let data = ClassData::decode(dex, class)?;

    let modifiers = class.access_flags.smali_modifiers();
    if modifiers.is_empty() {
        writeln!(out, ".class {}", class.descriptor(dex)?).unwrap();
    } else {
        writeln!(out, ".class {} {}", modifiers, class.descriptor(dex)?).unwrap();
    }
    if let Some(superclass) = class.superclass(dex)? {
        writeln!(out, ".super {superclass}").unwrap();
    }
    if let Some(source) = class.source_file(dex)? {
        writeln!(out, ".source \"{}\"", escape(&source)).unwrap();
    }
    for type_idx in class.interfaces(dex)? {
        writeln!(out, ".implements {}", dex.type_descriptor(type_idx.into())?).unwrap();
    }

    if !data.static_fields.is_empty() {
        out.push_str("\n\n# static fields\n");
        for field in &data.static_fields {
            write_field(dex, field, &mut out)?;
        }
    }
    if !data.instance_fields.is_empty() {
        out.push_str("\n\n# instance fields\n");
        for field in &data.instance_fields {
            write_field(dex, field, &mut out)?;
        }
    }

    if !data.direct_methods.is_empty() {
        out.push_str("\n\n# direct methods");
        for method in &data.direct_methods {
            out.push('\n');
            write_method(dex, method, &mut out)?;
        }
    }
    if !data.virtual_methods.is_empty() {
        out.push_str("\n\n# virtual methods");
        for method in &data.virtual_methods {
            out.push('\n');
            write_method(dex, method, &mut out)?;
        }
    }

    Ok(out)
}

fn write_field(dex: &Dex, field: &EncodedField, out: &mut String) -> Result<(), DexError> {
    let item = dex.field(field.field_idx)?;
    let modifiers = field.access_flags.smali_modifiers();
    if modifiers.is_empty() {
        writeln!(out, ".field {}:{}", item.name(dex)?, item.type_descriptor(dex)?).unwrap();
    } else {
        writeln!(
            out,
            ".field {} {}:{}",
            modifiers,
            item.name(dex)?,
            item.type_descriptor(dex)?
        )
        .unwrap();
    }
    Ok(())
}

/// Full `(Params)Ret` signature of a method prototype.
pub fn proto_signature(dex: &Dex, proto_idx: u32) -> Result<String, DexError> {
    let proto = dex.proto(proto_idx)?;
    let mut sig = String::from("(");
    for type_idx in proto.parameters(dex)? {
        sig.push_str(&dex.type_descriptor(type_idx.into())?);
    }
    sig.push(')');
    sig.push_str(&proto.return_type(dex)?);
    Ok(sig)
}

fn write_method(dex: &Dex, method: &EncodedMethod, out: &mut String) -> Result<(), DexError> {
    let item = dex.method(method.method_idx)?;
    let signature = proto_signature(dex, item.proto_idx.into())?;

    let modifiers = method.access_flags.smali_modifiers();
    if modifiers.is_empty() {
        writeln!(out, ".method {}{}", item.name(dex)?, signature).unwrap();
    } else {
        writeln!(out, ".method {} {}{}", modifiers, item.name(dex)?, signature).unwrap();
    }

    if method.code_off != 0 {
        let code = CodeItem::decode(dex, method.code_off)?;
        write_body(dex, &code, out)?;
    }

    out.push_str(".end method\n");
    Ok(())
}

/// Method body between `.method` and `.end method`, starting with the
/// `.registers` directive.
pub fn write_body(dex: &Dex, code: &CodeItem, out: &mut String) -> Result<(), DexError> {
    let insns = decode_insns(&code.insns)?;

    let mut labels: BTreeSet<usize> = BTreeSet::new();
    for insn in &insns {
        match &insn.operands {
            Operands::Branch { target }
            | Operands::RegBranch { target, .. }
            | Operands::PairBranch { target, .. } => {
                labels.insert(*target);
            }
            Operands::Switch { targets, .. } => labels.extend(targets.iter().copied()),
            _ => {}
        }
    }
    for try_item in &code.tries {
        for (_, addr) in &try_item.handlers.catches {
            labels.insert(*addr as usize);
        }
        if let Some(addr) = try_item.handlers.catch_all {
            labels.insert(addr as usize);
        }
    }

    writeln!(out, "{INDENT}.registers {}", code.registers_size).unwrap();

    for insn in &insns {
        if labels.contains(&insn.offset) {
            writeln!(out, "{INDENT}{}", label(insn.offset)).unwrap();
        }
        for (index, try_item) in code.tries.iter().enumerate() {
            if try_item.start_addr as usize == insn.offset {
                writeln!(out, "{INDENT}:try_start_{index}").unwrap();
            }
        }

        writeln!(out, "{INDENT}{}", render(dex, insn)?).unwrap();

        let end = insn.offset + insn.opcode.format().units();
        for (index, try_item) in code.tries.iter().enumerate() {
            if (try_item.start_addr + u32::from(try_item.insn_count)) as usize == end {
                writeln!(out, "{INDENT}:try_end_{index}").unwrap();
                for (type_idx, addr) in &try_item.handlers.catches {
                    writeln!(
                        out,
                        "{INDENT}.catch {} {{:try_start_{index} .. :try_end_{index}}} {}",
                        dex.type_descriptor(*type_idx)?,
                        label(*addr as usize)
                    )
                    .unwrap();
                }
                if let Some(addr) = try_item.handlers.catch_all {
                    writeln!(
                        out,
                        "{INDENT}.catchall {{:try_start_{index} .. :try_end_{index}}} {}",
                        label(addr as usize)
                    )
                    .unwrap();
                }
            }
        }
    }

    // payload tables, in stream order, after the instructions
    let mut payload_users: Vec<&Insn> = insns
        .iter()
        .filter(|insn| {
            matches!(
                insn.operands,
                Operands::Switch { .. } | Operands::FillArray { .. }
            )
        })
        .collect();
    payload_users.sort_by_key(|insn| match &insn.operands {
        Operands::Switch { payload_off, .. } | Operands::FillArray { payload_off, .. } => {
            *payload_off
        }
        _ => 0,
    });
    for insn in payload_users {
        write_payload(insn, out);
    }

    Ok(())
}

fn write_payload(insn: &Insn, out: &mut String) {
    match &insn.operands {
        Operands::Switch {
            keys,
            targets,
            payload_off,
            ..
        } => {
            writeln!(out, "\n{INDENT}{}", label(*payload_off)).unwrap();
            if insn.opcode == Opcode::PackedSwitch {
                writeln!(out, "{INDENT}.packed-switch {}", literal(i64::from(keys[0]))).unwrap();
                for target in targets {
                    writeln!(out, "{INDENT}{INDENT}{}", label(*target)).unwrap();
                }
                writeln!(out, "{INDENT}.end packed-switch").unwrap();
            } else {
                writeln!(out, "{INDENT}.sparse-switch").unwrap();
                for (key, target) in keys.iter().zip(targets) {
                    writeln!(
                        out,
                        "{INDENT}{INDENT}{} -> {}",
                        literal(i64::from(*key)),
                        label(*target)
                    )
                    .unwrap();
                }
                writeln!(out, "{INDENT}.end sparse-switch").unwrap();
            }
        }
        Operands::FillArray {
            element_width,
            data,
            payload_off,
            ..
        } => {
            writeln!(out, "\n{INDENT}{}", label(*payload_off)).unwrap();
            writeln!(out, "{INDENT}.array-data {element_width}").unwrap();
            for element in data.chunks(*element_width as usize) {
                let mut value = 0u64;
                for (i, byte) in element.iter().enumerate() {
                    value |= u64::from(*byte) << (8 * i as u32);
                }
                writeln!(out, "{INDENT}{INDENT}{:#x}", value).unwrap();
            }
            writeln!(out, "{INDENT}.end array-data").unwrap();
        }
        _ => {}
    }
}

/// `:label_%04x` from the byte offset.
fn label(unit_offset: usize) -> String {
    format!(":label_{:04x}", unit_offset * 2)
}

fn literal(value: i64) -> String {
    if value < 0 {
        format!("-{:#x}", value.unsigned_abs())
    } else {
        format!("{value:#x}")
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut buf = [0u16; 2];
                for unit in c.encode_utf16(&mut buf).iter() {
                    write!(out, "\\u{unit:04x}").unwrap();
                }
            }
            c => out.push(c),
        }
    }
    out
}

/// Reference operand text for index-carrying opcodes.
fn index_operand(dex: &Dex, opcode: Opcode, index: u32) -> Result<String, DexError> {
    Ok(match opcode {
        Opcode::ConstString | Opcode::ConstStringJumbo => {
            format!("\"{}\"", escape(&dex.string(index)?))
        }
        Opcode::ConstClass
        | Opcode::CheckCast
        | Opcode::InstanceOf
        | Opcode::NewInstance
        | Opcode::NewArray => dex.type_descriptor(index)?.into_owned(),
        Opcode::ConstMethodType => proto_signature(dex, index)?,
        op if op.is_invoke() => {
            let method = dex.method(index)?;
            format!(
                "{}->{}{}",
                method.class(dex)?,
                method.name(dex)?,
                proto_signature(dex, method.proto_idx.into())?
            )
        }
        op if (Opcode::Iget.value()..=Opcode::SputShort.value()).contains(&op.value()) => {
            let field = dex.field(index)?;
            format!(
                "{}->{}:{}",
                field.class(dex)?,
                field.name(dex)?,
                field.type_descriptor(dex)?
            )
        }
        // const-method-handle and anything else: keep the raw pool index
        _ => format!("@{index}"),
    })
}

fn args_list(args: &[u16]) -> String {
    let regs: Vec<String> = args.iter().map(|r| format!("v{r}")).collect();
    format!("{{{}}}", regs.join(", "))
}

fn render(dex: &Dex, insn: &Insn) -> Result<String, DexError> {
    let mnemonic = insn.opcode.mnemonic();
    Ok(match &insn.operands {
        Operands::None => mnemonic.to_owned(),
        Operands::Reg { a } => format!("{mnemonic} v{a}"),
        Operands::Pair { a, b } => format!("{mnemonic} v{a}, v{b}"),
        Operands::Triple { a, b, c } => format!("{mnemonic} v{a}, v{b}, v{c}"),
        Operands::Lit { a, value } => format!("{mnemonic} v{a}, {}", literal(*value)),
        Operands::PairLit { a, b, value } => {
            format!("{mnemonic} v{a}, v{b}, {}", literal(i64::from(*value)))
        }
        Operands::Branch { target } => format!("{mnemonic} {}", label(*target)),
        Operands::RegBranch { a, target } => format!("{mnemonic} v{a}, {}", label(*target)),
        Operands::PairBranch { a, b, target } => {
            format!("{mnemonic} v{a}, v{b}, {}", label(*target))
        }
        Operands::Index { a, index } => {
            format!("{mnemonic} v{a}, {}", index_operand(dex, insn.opcode, *index)?)
        }
        Operands::PairIndex { a, b, index } => format!(
            "{mnemonic} v{a}, v{b}, {}",
            index_operand(dex, insn.opcode, *index)?
        ),
        Operands::Call { args, index } => format!(
            "{mnemonic} {}, {}",
            args_list(args),
            index_operand(dex, insn.opcode, *index)?
        ),
        Operands::CallRange {
            first,
            count,
            index,
        } => {
            let last = first + count.saturating_sub(1);
            format!(
                "{mnemonic} {{v{first} .. v{last}}}, {}",
                index_operand(dex, insn.opcode, *index)?
            )
        }
        Operands::CallPoly { args, index, proto } => format!(
            "{mnemonic} {}, {}, {}",
            args_list(args),
            index_operand(dex, insn.opcode, *index)?,
            proto_signature(dex, u32::from(*proto))?
        ),
        Operands::CallPolyRange {
            first,
            count,
            index,
            proto,
        } => {
            let last = first + count.saturating_sub(1);
            format!(
                "{mnemonic} {{v{first} .. v{last}}}, {}, {}",
                index_operand(dex, insn.opcode, *index)?,
                proto_signature(dex, u32::from(*proto))?
            )
        }
        Operands::Switch { a, payload_off, .. } | Operands::FillArray { a, payload_off, .. } => {
            format!("{mnemonic} v{a}, {}", label(*payload_off))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::DexBuilder;

    #[test]
    fn empty_void_method_body() {
        let dex = DexBuilder::class_with_method_deltas("La;", &[0]).build_parsed();
        // method has no code; only the signature is printed
        let text = write_class(&dex, &dex.class_defs[0]).unwrap();
        assert!(text.starts_with(".class public La;\n"));
        assert!(text.contains(".method public m()V"));
    }

    #[test]
    fn try_catch_markers() {
        let dex = DexBuilder::class_with_try_catch("La;").build_parsed();
        let text = write_class(&dex, &dex.class_defs[0]).unwrap();

        assert!(text.contains(":try_start_0"));
        assert!(text.contains(":try_end_0"));
        assert!(text.contains(
            ".catch Ljava/lang/Throwable; {:try_start_0 .. :try_end_0} :label_0004"
        ));
        assert!(text.contains("    :label_0004\n    return-void"));
    }

    #[test]
    fn escapes_strings() {
        assert_eq!(escape("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
        assert_eq!(escape("\u{1f600}"), "\\ud83d\\ude00");
    }

    #[test]
    fn labels_use_byte_offsets() {
        assert_eq!(label(2), ":label_0004");
        assert_eq!(label(0x100), ":label_0200");
    }
}
