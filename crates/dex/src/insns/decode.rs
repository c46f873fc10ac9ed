//! Decoder for the 16-bit code-unit stream of a method.
//!
//! The stream is walked linearly; payload tables (packed-switch,
//! sparse-switch, fill-array-data) are recognized by their distinguished
//! first code unit and lifted out of the instruction sequence, then the
//! referencing instructions are resolved against them in a second pass.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::errors::DexError;
use crate::insns::opcode::{InsnFormat, Opcode};

pub const PACKED_SWITCH_PAYLOAD: u16 = 0x0100;
pub const SPARSE_SWITCH_PAYLOAD: u16 = 0x0200;
pub const FILL_ARRAY_DATA_PAYLOAD: u16 = 0x0300;

/// One decoded instruction. `offset` is in code units from the method start.
#[derive(Debug, Clone)]
pub struct Insn {
    pub offset: usize,
    pub opcode: Opcode,
    pub operands: Operands,
}

/// Operand tuples, grouped by shape rather than by wire format; branch and
/// switch targets are absolute code-unit offsets.
#[derive(Debug, Clone)]
pub enum Operands {
    None,
    Reg {
        a: u16,
    },
    Pair {
        a: u16,
        b: u16,
    },
    Triple {
        a: u16,
        b: u16,
        c: u16,
    },
    Lit {
        a: u16,
        value: i64,
    },
    PairLit {
        a: u16,
        b: u16,
        value: i32,
    },
    Branch {
        target: usize,
    },
    RegBranch {
        a: u16,
        target: usize,
    },
    PairBranch {
        a: u16,
        b: u16,
        target: usize,
    },
    Index {
        a: u16,
        index: u32,
    },
    PairIndex {
        a: u16,
        b: u16,
        index: u32,
    },
    Call {
        args: SmallVec<[u16; 5]>,
        index: u32,
    },
    CallRange {
        first: u16,
        count: u16,
        index: u32,
    },
    CallPoly {
        args: SmallVec<[u16; 5]>,
        index: u32,
        proto: u16,
    },
    CallPolyRange {
        first: u16,
        count: u16,
        index: u32,
        proto: u16,
    },
    Switch {
        a: u16,
        keys: Vec<i32>,
        targets: Vec<usize>,
        payload_off: usize,
    },
    FillArray {
        a: u16,
        element_width: u16,
        data: Vec<u8>,
        payload_off: usize,
    },
}

#[derive(Debug)]
enum RawPayload {
    Packed { first_key: i32, targets: Vec<i32> },
    Sparse { keys: Vec<i32>, targets: Vec<i32> },
    Array { element_width: u16, data: Vec<u8> },
}

struct CodeCursor<'a> {
    units: &'a [u16],
    pos: usize,
}

impl<'a> CodeCursor<'a> {
    fn unit(&mut self) -> Result<u16, DexError> {
        let unit = *self
            .units
            .get(self.pos)
            .ok_or(DexError::TruncatedCode { offset: self.pos })?;
        self.pos += 1;
        Ok(unit)
    }

    fn int(&mut self) -> Result<i32, DexError> {
        let lo = self.unit()? as u32;
        let hi = self.unit()? as u32;
        Ok((lo | (hi << 16)) as i32)
    }

    fn long(&mut self) -> Result<i64, DexError> {
        let lo = self.int()? as u32 as u64;
        let hi = self.int()? as u32 as u64;
        Ok((lo | (hi << 32)) as i64)
    }
}

/// Decode a full method body into instructions in offset order.
pub fn decode_insns(units: &[u16]) -> Result<Vec<Insn>, DexError> {
    let mut cursor = CodeCursor { units, pos: 0 };
    let mut insns = Vec::new();
    let mut payloads: HashMap<usize, RawPayload> = HashMap::new();
    // (index into insns, signed delta) waiting for payload resolution
    let mut pending: Vec<(usize, i32)> = Vec::new();

    while cursor.pos < units.len() {
        let offset = cursor.pos;
        let unit = cursor.unit()?;

        match unit {
            PACKED_SWITCH_PAYLOAD => {
                let size = cursor.unit()? as usize;
                let first_key = cursor.int()?;
                let mut targets = Vec::with_capacity(size);
                for _ in 0..size {
                    targets.push(cursor.int()?);
                }
                payloads.insert(offset, RawPayload::Packed { first_key, targets });
            }
            SPARSE_SWITCH_PAYLOAD => {
                let size = cursor.unit()? as usize;
                let mut keys = Vec::with_capacity(size);
                for _ in 0..size {
                    keys.push(cursor.int()?);
                }
                let mut targets = Vec::with_capacity(size);
                for _ in 0..size {
                    targets.push(cursor.int()?);
                }
                payloads.insert(offset, RawPayload::Sparse { keys, targets });
            }
            FILL_ARRAY_DATA_PAYLOAD => {
                let element_width = cursor.unit()?;
                let byte_len = {
                    let lo = cursor.unit()? as u32;
                    let hi = cursor.unit()? as u32;
                    (lo | (hi << 16)) as usize * element_width as usize
                };
                let mut data = Vec::with_capacity(byte_len);
                // data occupies (byte_len + 1) / 2 units
                for _ in 0..byte_len.div_ceil(2) {
                    let pair = cursor.unit()?;
                    data.push((pair & 0xff) as u8);
                    data.push((pair >> 8) as u8);
                }
                data.truncate(byte_len);
                payloads.insert(
                    offset,
                    RawPayload::Array {
                        element_width,
                        data,
                    },
                );
            }
            _ => {
                let op_value = (unit & 0xff) as u8;
                let opcode = Opcode::from_u8(op_value).ok_or(DexError::UnknownOpcode {
                    opcode: unit,
                    offset,
                })?;
                let hi = unit >> 8;
                let insn = decode_one(&mut cursor, offset, opcode, hi, insns.len(), &mut pending)?;
                insns.push(insn);
            }
        }
    }

    // second pass: attach payload tables to the instructions that point at
    // them
    for (index, delta) in pending {
        let insn_offset = insns[index].offset;
        let payload_off = absolute(insn_offset, delta)?;
        let payload = payloads
            .get(&payload_off)
            .ok_or(DexError::BadPayload { offset: payload_off })?;

        let a = match &insns[index].operands {
            Operands::Reg { a } => *a,
            _ => unreachable!("pending payload users always carry one register"),
        };

        insns[index].operands = match (insns[index].opcode, payload) {
            (Opcode::PackedSwitch, RawPayload::Packed { first_key, targets }) => {
                let keys = (0..targets.len() as i32)
                    .map(|i| first_key.wrapping_add(i))
                    .collect();
                Operands::Switch {
                    a,
                    keys,
                    targets: resolve_targets(insn_offset, targets)?,
                    payload_off,
                }
            }
            (Opcode::SparseSwitch, RawPayload::Sparse { keys, targets }) => Operands::Switch {
                a,
                keys: keys.clone(),
                targets: resolve_targets(insn_offset, targets)?,
                payload_off,
            },
            (Opcode::FillArrayData, RawPayload::Array {
                element_width,
                data,
            }) => Operands::FillArray {
                a,
                element_width: *element_width,
                data: data.clone(),
                payload_off,
            },
            _ => return Err(DexError::BadPayload { offset: payload_off }),
        };
    }

    Ok(insns)
}

fn absolute(offset: usize, delta: i32) -> Result<usize, DexError> {
    let target = offset as i64 + i64::from(delta);
    if target < 0 {
        return Err(DexError::BadOperand { offset });
    }
    Ok(target as usize)
}

fn resolve_targets(offset: usize, deltas: &[i32]) -> Result<Vec<usize>, DexError> {
    deltas.iter().map(|&d| absolute(offset, d)).collect()
}

fn decode_one(
    cursor: &mut CodeCursor<'_>,
    offset: usize,
    opcode: Opcode,
    hi: u16,
    insn_index: usize,
    pending: &mut Vec<(usize, i32)>,
) -> Result<Insn, DexError> {
    let lo4 = hi & 0x0f;
    let hi4 = hi >> 4;

    let operands = match opcode.format() {
        InsnFormat::F10x => Operands::None,
        InsnFormat::F12x => Operands::Pair { a: lo4, b: hi4 },
        InsnFormat::F11n => Operands::Lit {
            a: lo4,
            // sign-extend the 4-bit literal
            value: i64::from((hi4 as i8) << 4 >> 4),
        },
        InsnFormat::F11x => Operands::Reg { a: hi },
        InsnFormat::F10t => Operands::Branch {
            target: absolute(offset, i32::from(hi as u8 as i8))?,
        },
        InsnFormat::F20t => {
            let delta = cursor.unit()? as i16;
            Operands::Branch {
                target: absolute(offset, i32::from(delta))?,
            }
        }
        InsnFormat::F20bc | InsnFormat::F21c => Operands::Index {
            a: hi,
            index: u32::from(cursor.unit()?),
        },
        InsnFormat::F22x => Operands::Pair {
            a: hi,
            b: cursor.unit()?,
        },
        InsnFormat::F21t => {
            let delta = cursor.unit()? as i16;
            Operands::RegBranch {
                a: hi,
                target: absolute(offset, i32::from(delta))?,
            }
        }
        InsnFormat::F21s => Operands::Lit {
            a: hi,
            value: i64::from(cursor.unit()? as i16),
        },
        InsnFormat::F21h => {
            let raw = i64::from(cursor.unit()? as i16);
            let shift = if opcode == Opcode::ConstWideHigh16 {
                48
            } else {
                16
            };
            Operands::Lit {
                a: hi,
                value: raw << shift,
            }
        }
        InsnFormat::F23x => {
            let unit = cursor.unit()?;
            Operands::Triple {
                a: hi,
                b: unit & 0xff,
                c: unit >> 8,
            }
        }
        InsnFormat::F22b => {
            let unit = cursor.unit()?;
            Operands::PairLit {
                a: hi,
                b: unit & 0xff,
                value: i32::from((unit >> 8) as u8 as i8),
            }
        }
        InsnFormat::F22t => {
            let delta = cursor.unit()? as i16;
            Operands::PairBranch {
                a: lo4,
                b: hi4,
                target: absolute(offset, i32::from(delta))?,
            }
        }
        InsnFormat::F22s => Operands::PairLit {
            a: lo4,
            b: hi4,
            value: i32::from(cursor.unit()? as i16),
        },
        InsnFormat::F22c => Operands::PairIndex {
            a: lo4,
            b: hi4,
            index: u32::from(cursor.unit()?),
        },
        InsnFormat::F30t => {
            let delta = cursor.int()?;
            Operands::Branch {
                target: absolute(offset, delta)?,
            }
        }
        InsnFormat::F32x => Operands::Pair {
            a: cursor.unit()?,
            b: cursor.unit()?,
        },
        InsnFormat::F31i => Operands::Lit {
            a: hi,
            value: i64::from(cursor.int()?),
        },
        InsnFormat::F31t => {
            let delta = cursor.int()?;
            pending.push((insn_index, delta));
            Operands::Reg { a: hi }
        }
        InsnFormat::F31c => Operands::Index {
            a: hi,
            index: cursor.int()? as u32,
        },
        InsnFormat::F35c => {
            let (args, index) = decode_args35(cursor, offset, hi)?;
            Operands::Call { args, index }
        }
        InsnFormat::F3rc => {
            let index = u32::from(cursor.unit()?);
            let first = cursor.unit()?;
            Operands::CallRange {
                first,
                count: hi,
                index,
            }
        }
        InsnFormat::F45cc => {
            let (args, index) = decode_args35(cursor, offset, hi)?;
            let proto = cursor.unit()?;
            Operands::CallPoly { args, index, proto }
        }
        InsnFormat::F4rcc => {
            let index = u32::from(cursor.unit()?);
            let first = cursor.unit()?;
            let proto = cursor.unit()?;
            Operands::CallPolyRange {
                first,
                count: hi,
                index,
                proto,
            }
        }
        InsnFormat::F51l => Operands::Lit {
            a: hi,
            value: cursor.long()?,
        },
    };

    Ok(Insn {
        offset,
        opcode,
        operands,
    })
}

/// Argument registers of a 35c/45cc form: `A|G|op BBBB F|E|D|C`.
fn decode_args35(
    cursor: &mut CodeCursor<'_>,
    offset: usize,
    hi: u16,
) -> Result<(SmallVec<[u16; 5]>, u32), DexError> {
    let count = (hi >> 4) as usize;
    let g = hi & 0x0f;
    if count > 5 {
        return Err(DexError::BadOperand { offset });
    }

    let index = u32::from(cursor.unit()?);
    let regs = cursor.unit()?;
    let all = [
        regs & 0xf,
        (regs >> 4) & 0xf,
        (regs >> 8) & 0xf,
        (regs >> 12) & 0xf,
        g,
    ];

    Ok((all[..count].iter().copied().collect(), index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_void_alone() {
        let insns = decode_insns(&[0x000e]).unwrap();
        assert_eq!(insns.len(), 1);
        assert_eq!(insns[0].opcode, Opcode::ReturnVoid);
        assert!(matches!(insns[0].operands, Operands::None));
    }

    #[test]
    fn const4_sign_extends() {
        // const/4 v0, -1  ->  B|A|op with B = 0xf
        let insns = decode_insns(&[0xf012, 0x000e]).unwrap();
        match insns[0].operands {
            Operands::Lit { a, value } => {
                assert_eq!(a, 0);
                assert_eq!(value, -1);
            }
            ref other => panic!("unexpected operands {other:?}"),
        }
    }

    #[test]
    fn goto_backwards() {
        // 0: nop, 1: goto -1
        let insns = decode_insns(&[0x0000, 0xff28]).unwrap();
        match insns[1].operands {
            Operands::Branch { target } => assert_eq!(target, 0),
            ref other => panic!("unexpected operands {other:?}"),
        }
    }

    #[test]
    fn invoke_virtual_args() {
        // invoke-virtual {v1, v2}, meth@3  ->  A=2 G=0 op=6e BBBB=3 F|E|D|C=0021
        let insns = decode_insns(&[0x206e, 0x0003, 0x0021, 0x000e]).unwrap();
        match &insns[0].operands {
            Operands::Call { args, index } => {
                assert_eq!(args.as_slice(), &[1, 2]);
                assert_eq!(*index, 3);
            }
            other => panic!("unexpected operands {other:?}"),
        }
    }

    #[test]
    fn unknown_opcode_reports_offset() {
        let err = decode_insns(&[0x0000, 0x00e3]).unwrap_err();
        assert!(matches!(
            err,
            DexError::UnknownOpcode { offset: 1, .. }
        ));
    }

    #[test]
    fn packed_switch_resolves_targets() {
        // 0: packed-switch v0, +4
        // 3: return-void
        // 4: payload: size=2 first_key=10 targets=[+3, +3]
        let units = [
            0x002b, 0x0004, 0x0000, // packed-switch v0, @4
            0x000e, // return-void
            0x0100, 0x0002, // payload magic, size
            0x000a, 0x0000, // first_key = 10
            0x0003, 0x0000, // target +3
            0x0003, 0x0000, // target +3
        ];
        let insns = decode_insns(&units).unwrap();
        assert_eq!(insns.len(), 2);
        match &insns[0].operands {
            Operands::Switch {
                keys,
                targets,
                payload_off,
                ..
            } => {
                assert_eq!(keys, &[10, 11]);
                assert_eq!(targets, &[3, 3]);
                assert_eq!(*payload_off, 4);
            }
            other => panic!("unexpected operands {other:?}"),
        }
    }

    #[test]
    fn fill_array_data_bytes() {
        // 0: fill-array-data v0, +4
        // 3: return-void
        // 4: payload: width=1 size=3 data=[1,2,3] (+ padding)
        let units = [
            0x0026, 0x0004, 0x0000, // fill-array-data v0, @4
            0x000e, // return-void
            0x0300, 0x0001, // payload magic, element_width
            0x0003, 0x0000, // size = 3
            0x0201, 0x0003, // bytes 1 2 3 + pad
        ];
        let insns = decode_insns(&units).unwrap();
        match &insns[0].operands {
            Operands::FillArray {
                element_width,
                data,
                ..
            } => {
                assert_eq!(*element_width, 1);
                assert_eq!(data, &[1, 2, 3]);
            }
            other => panic!("unexpected operands {other:?}"),
        }
    }

    #[test]
    fn switch_without_payload_is_rejected() {
        let err = decode_insns(&[0x002b, 0x0040, 0x0000, 0x000e]).unwrap_err();
        assert!(matches!(err, DexError::BadPayload { .. }));
    }
}
