//! On-demand decoding of `class_data_item`, `code_item` and encoded arrays.
//!
//! Class data is not part of the eager id tables: it is packed with ULEB128
//! counts and delta-encoded member indices, so it is decoded on first access
//! per class definition.

use crate::dex::{AccessFlags, ClassDef, Dex};
use crate::errors::DexError;
use crate::reader::Reader;

/// Field and method lists of one class.
#[derive(Debug, Default)]
pub struct ClassData {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

/// A field entry with its resolved (accumulated) field id.
#[derive(Debug)]
pub struct EncodedField {
    pub field_idx: u32,
    pub access_flags: AccessFlags,
}

/// A method entry with its resolved (accumulated) method id.
#[derive(Debug)]
pub struct EncodedMethod {
    pub method_idx: u32,
    pub access_flags: AccessFlags,

    /// Offset to the code item, or 0 for abstract and native methods.
    pub code_off: u32,
}

impl ClassData {
    /// Decode the class data referenced by `class`, or an empty set when the
    /// class carries none (marker interfaces).
    pub fn decode(dex: &Dex, class: &ClassDef) -> Result<ClassData, DexError> {
        if class.class_data_off == 0 {
            return Ok(ClassData::default());
        }

        let mut reader = Reader::at(dex.bytes(), class.class_data_off as usize)?;

        let static_fields_size = reader.uleb128()?;
        let instance_fields_size = reader.uleb128()?;
        let direct_methods_size = reader.uleb128()?;
        let virtual_methods_size = reader.uleb128()?;

        Ok(ClassData {
            static_fields: Self::fields(&mut reader, static_fields_size)?,
            instance_fields: Self::fields(&mut reader, instance_fields_size)?,
            direct_methods: Self::methods(&mut reader, direct_methods_size)?,
            virtual_methods: Self::methods(&mut reader, virtual_methods_size)?,
        })
    }

    /// Member indices are stored as deltas from the previous entry within
    /// each list, starting from 0.
    fn fields(reader: &mut Reader<'_>, count: u32) -> Result<Vec<EncodedField>, DexError> {
        let mut out = Vec::with_capacity(count as usize);
        let mut field_idx = 0u32;

        for _ in 0..count {
            field_idx = field_idx.wrapping_add(reader.uleb128()?);
            let access_flags = AccessFlags::from_bits_truncate(reader.uleb128()?);
            out.push(EncodedField {
                field_idx,
                access_flags,
            });
        }
        Ok(out)
    }

    fn methods(reader: &mut Reader<'_>, count: u32) -> Result<Vec<EncodedMethod>, DexError> {
        let mut out = Vec::with_capacity(count as usize);
        let mut method_idx = 0u32;

        for _ in 0..count {
            method_idx = method_idx.wrapping_add(reader.uleb128()?);
            let access_flags = AccessFlags::from_bits_truncate(reader.uleb128()?);
            let code_off = reader.uleb128()?;
            out.push(EncodedMethod {
                method_idx,
                access_flags,
                code_off,
            });
        }
        Ok(out)
    }
}

/// A decoded `code_item`.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#code-item>
#[derive(Debug)]
pub struct CodeItem {
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub debug_info_off: u32,

    /// Instruction stream as 16-bit code units.
    pub insns: Vec<u16>,

    pub tries: Vec<TryItem>,
}

/// One guarded range with its handlers, addresses in code units.
#[derive(Debug)]
pub struct TryItem {
    pub start_addr: u32,
    pub insn_count: u16,
    pub handlers: CatchHandlers,
}

/// Handler list of one try range.
#[derive(Debug, Clone)]
pub struct CatchHandlers {
    /// (type id, handler address) pairs in match order.
    pub catches: Vec<(u32, u32)>,

    /// Address of the catch-all handler, when present.
    pub catch_all: Option<u32>,
}

impl CodeItem {
    /// Decode the code item at `offset`.
    pub fn decode(dex: &Dex, offset: u32) -> Result<CodeItem, DexError> {
        let mut reader = Reader::at(dex.bytes(), offset as usize)?;

        let registers_size = reader.u16()?;
        let ins_size = reader.u16()?;
        let outs_size = reader.u16()?;
        let tries_size = reader.u16()?;
        let debug_info_off = reader.u32()?;
        let insns_size = reader.u32()?;

        let mut insns = Vec::with_capacity(insns_size as usize);
        for _ in 0..insns_size {
            insns.push(reader.u16()?);
        }

        // the try table is 4-byte aligned after an odd number of code units
        if tries_size > 0 && insns_size % 2 == 1 {
            reader.u16()?;
        }

        let mut raw_tries = Vec::with_capacity(tries_size as usize);
        for _ in 0..tries_size {
            let start_addr = reader.u32()?;
            let insn_count = reader.u16()?;
            let handler_off = reader.u16()?;
            raw_tries.push((start_addr, insn_count, handler_off));
        }

        let mut tries = Vec::with_capacity(raw_tries.len());
        if tries_size > 0 {
            let handlers_base = reader.offset();
            // leading size of the handler list; individual entries are
            // addressed by byte offset from handlers_base
            let _list_size = reader.uleb128()?;

            for (start_addr, insn_count, handler_off) in raw_tries {
                let mut handler_reader =
                    Reader::at(dex.bytes(), handlers_base + handler_off as usize)?;
                let handlers = Self::decode_handlers(&mut handler_reader)?;
                tries.push(TryItem {
                    start_addr,
                    insn_count,
                    handlers,
                });
            }
        }

        Ok(CodeItem {
            registers_size,
            ins_size,
            outs_size,
            debug_info_off,
            insns,
            tries,
        })
    }

    fn decode_handlers(reader: &mut Reader<'_>) -> Result<CatchHandlers, DexError> {
        let size = reader.sleb128()?;
        let typed = size.unsigned_abs().min(u64::from(u32::MAX)) as u32;

        let mut catches = Vec::with_capacity(typed as usize);
        for _ in 0..typed {
            let type_idx = reader.uleb128()?;
            let addr = reader.uleb128()?;
            catches.push((type_idx, addr));
        }

        // a non-positive size means a trailing catch-all address
        let catch_all = if size <= 0 {
            Some(reader.uleb128()?)
        } else {
            None
        };

        Ok(CatchHandlers { catches, catch_all })
    }
}

/// A constant from an encoded array (static field initializers).
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#encoding>
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(u32),
    Type(u32),
    Field(u32),
    Method(u32),
    Enum(u32),
    Array(Vec<EncodedValue>),
    Null,
    Boolean(bool),
}

impl EncodedValue {
    const VALUE_BYTE: u8 = 0x00;
    const VALUE_SHORT: u8 = 0x02;
    const VALUE_CHAR: u8 = 0x03;
    const VALUE_INT: u8 = 0x04;
    const VALUE_LONG: u8 = 0x06;
    const VALUE_FLOAT: u8 = 0x10;
    const VALUE_DOUBLE: u8 = 0x11;
    const VALUE_STRING: u8 = 0x17;
    const VALUE_TYPE: u8 = 0x18;
    const VALUE_FIELD: u8 = 0x19;
    const VALUE_METHOD: u8 = 0x1a;
    const VALUE_ENUM: u8 = 0x1b;
    const VALUE_ARRAY: u8 = 0x1c;
    const VALUE_NULL: u8 = 0x1e;
    const VALUE_BOOLEAN: u8 = 0x1f;

    /// Decode the encoded array at `offset` (the `static_values_off` of a
    /// class definition). An offset of 0 yields an empty list.
    pub fn decode_array(dex: &Dex, offset: u32) -> Result<Vec<EncodedValue>, DexError> {
        if offset == 0 {
            return Ok(Vec::new());
        }
        let mut reader = Reader::at(dex.bytes(), offset as usize)?;
        Self::array(&mut reader)
    }

    fn array(reader: &mut Reader<'_>) -> Result<Vec<EncodedValue>, DexError> {
        let size = reader.uleb128()?;
        let mut out = Vec::with_capacity(size as usize);
        for _ in 0..size {
            out.push(Self::decode(reader)?);
        }
        Ok(out)
    }

    fn decode(reader: &mut Reader<'_>) -> Result<EncodedValue, DexError> {
        let offset = reader.offset();
        let lead = reader.u8()?;
        let value_type = lead & 0x1f;
        let value_arg = (lead >> 5) as usize;

        let value = match value_type {
            Self::VALUE_BYTE => EncodedValue::Byte(Self::sized_int(reader, value_arg + 1)? as i8),
            Self::VALUE_SHORT => {
                EncodedValue::Short(Self::sized_int(reader, value_arg + 1)? as i16)
            }
            Self::VALUE_CHAR => {
                EncodedValue::Char(Self::sized_uint(reader, value_arg + 1)? as u16)
            }
            Self::VALUE_INT => EncodedValue::Int(Self::sized_int(reader, value_arg + 1)? as i32),
            Self::VALUE_LONG => EncodedValue::Long(Self::sized_int(reader, value_arg + 1)?),
            Self::VALUE_FLOAT => {
                if value_arg > 3 {
                    return Err(DexError::BadEncoding {
                        offset,
                        reason: "oversized float value",
                    });
                }
                // zero-extended to the right up to 32 bits
                let raw = Self::sized_uint(reader, value_arg + 1)? as u32;
                EncodedValue::Float(f32::from_bits(raw << (8 * (3 - value_arg))))
            }
            Self::VALUE_DOUBLE => {
                let raw = Self::sized_uint(reader, value_arg + 1)?;
                EncodedValue::Double(f64::from_bits(raw << (8 * (7 - value_arg))))
            }
            Self::VALUE_STRING => {
                EncodedValue::String(Self::sized_uint(reader, value_arg + 1)? as u32)
            }
            Self::VALUE_TYPE => EncodedValue::Type(Self::sized_uint(reader, value_arg + 1)? as u32),
            Self::VALUE_FIELD => {
                EncodedValue::Field(Self::sized_uint(reader, value_arg + 1)? as u32)
            }
            Self::VALUE_METHOD => {
                EncodedValue::Method(Self::sized_uint(reader, value_arg + 1)? as u32)
            }
            Self::VALUE_ENUM => EncodedValue::Enum(Self::sized_uint(reader, value_arg + 1)? as u32),
            Self::VALUE_ARRAY => EncodedValue::Array(Self::array(reader)?),
            Self::VALUE_NULL => EncodedValue::Null,
            Self::VALUE_BOOLEAN => EncodedValue::Boolean(value_arg != 0),
            _ => {
                return Err(DexError::BadEncoding {
                    offset,
                    reason: "unknown encoded value type",
                })
            }
        };
        Ok(value)
    }

    /// Little-endian integer of `bytes` length, sign-extended.
    fn sized_int(reader: &mut Reader<'_>, bytes: usize) -> Result<i64, DexError> {
        let raw = Self::sized_uint(reader, bytes)?;
        let shift = 64 - 8 * bytes as u32;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Little-endian integer of `bytes` length, zero-extended.
    fn sized_uint(reader: &mut Reader<'_>, bytes: usize) -> Result<u64, DexError> {
        let mut value = 0u64;
        for i in 0..bytes {
            value |= u64::from(reader.u8()?) << (8 * i as u32);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use crate::test_fixtures::DexBuilder;

    #[test]
    fn method_deltas_accumulate() {
        // three direct methods encoded with deltas [2, 1, 3]
        let dex = DexBuilder::class_with_method_deltas("La;", &[2, 1, 3]).build_parsed();
        let data = ClassData::decode(&dex, &dex.class_defs[0]).unwrap();

        let ids: Vec<u32> = data.direct_methods.iter().map(|m| m.method_idx).collect();
        assert_eq!(ids, [2, 3, 6]);
    }

    #[test]
    fn empty_class_data() {
        let dex = DexBuilder::single_class_no_code("La;").build_parsed();
        let data = ClassData::decode(&dex, &dex.class_defs[0]).unwrap();
        assert!(data.static_fields.is_empty());
        assert!(data.direct_methods.is_empty());
        assert!(data.virtual_methods.is_empty());
    }

    #[test]
    fn encoded_values_sign_extend() {
        // VALUE_INT with a single byte 0xff is -1
        let data = [0x04u8, 0xff];
        let mut reader = Reader::new(&data);
        assert_eq!(EncodedValue::decode(&mut reader).unwrap(), EncodedValue::Int(-1));

        // VALUE_BOOLEAN carries its payload in value_arg
        let data = [0x3fu8];
        let mut reader = Reader::new(&data);
        assert_eq!(
            EncodedValue::decode(&mut reader).unwrap(),
            EncodedValue::Boolean(true)
        );
    }

    #[test]
    fn code_item_with_tries_decodes() {
        let dex = DexBuilder::class_with_try_catch("La;").build_parsed();
        let data = ClassData::decode(&dex, &dex.class_defs[0]).unwrap();
        let method = &data.direct_methods[0];
        let code = CodeItem::decode(&dex, method.code_off).unwrap();

        assert_eq!(code.tries.len(), 1);
        let try_item = &code.tries[0];
        assert_eq!(try_item.start_addr, 0);
        assert_eq!(try_item.handlers.catches.len(), 1);
    }
}
