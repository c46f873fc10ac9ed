use std::borrow::Cow;

use bitflags::bitflags;
use log::debug;
use simd_adler32::adler32;
use winnow::binary::{le_u16, le_u32, u8};
use winnow::combinator::repeat;
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::token::take;

use crate::errors::DexError;
use crate::reader::Reader;

/// The endianness tag value of a little-endian file.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#endian-constant>
pub const ENDIAN_CONSTANT: u32 = 0x12345678;

/// The endianness tag value of a byte-swapped file. Recognized and rejected.
pub const REVERSE_ENDIAN_CONSTANT: u32 = 0x78563412;

/// The constant used to indicate that an index value is absent.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#no-index>
pub const NO_INDEX: u32 = u32::MAX;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: u32 = 0x70;

/// A parsed DEX file.
///
/// The id tables are indexed eagerly (arrays of offsets/records); the data
/// they point at (strings, type lists, class data, code) is resolved on
/// demand through the accessors.
#[derive(Debug)]
pub struct Dex {
    /// Raw file bytes; all offsets in the id tables point into this.
    data: Vec<u8>,

    pub header: DexHeader,

    /// Offsets of string data items, indexed by string id.
    pub string_ids: Vec<u32>,

    /// String ids of type descriptors, indexed by type id.
    pub type_ids: Vec<u32>,

    pub proto_ids: Vec<ProtoItem>,
    pub field_ids: Vec<FieldItem>,
    pub method_ids: Vec<MethodItem>,
    pub class_defs: Vec<ClassDef>,
}

impl Dex {
    /// Parse the given DEX file.
    pub fn parse(data: Vec<u8>) -> Result<Dex, DexError> {
        let header = DexHeader::parse(&mut &data[..])?;
        header.check_sections(data.len())?;

        let string_ids: Vec<u32> =
            Self::section(&data, header.string_ids_off, "string_ids", |input| {
                repeat(header.string_ids_size as usize, le_u32).parse_next(input)
            })?;

        let type_ids: Vec<u32> = Self::section(&data, header.type_ids_off, "type_ids", |input| {
            repeat(header.type_ids_size as usize, le_u32).parse_next(input)
        })?;

        let proto_ids: Vec<ProtoItem> =
            Self::section(&data, header.proto_ids_off, "proto_ids", |input| {
                repeat(header.proto_ids_size as usize, ProtoItem::parse).parse_next(input)
            })?;

        let field_ids: Vec<FieldItem> =
            Self::section(&data, header.field_ids_off, "field_ids", |input| {
                repeat(header.field_ids_size as usize, FieldItem::parse).parse_next(input)
            })?;

        let method_ids: Vec<MethodItem> =
            Self::section(&data, header.method_ids_off, "method_ids", |input| {
                repeat(header.method_ids_size as usize, MethodItem::parse).parse_next(input)
            })?;

        let class_defs: Vec<ClassDef> =
            Self::section(&data, header.class_defs_off, "class_defs", |input| {
                repeat(header.class_defs_size as usize, ClassDef::parse).parse_next(input)
            })?;

        debug!(
            "parsed dex v{}: {} strings, {} types, {} classes",
            header.version,
            string_ids.len(),
            type_ids.len(),
            class_defs.len()
        );

        Ok(Dex {
            data,
            header,
            string_ids,
            type_ids,
            proto_ids,
            field_ids,
            method_ids,
            class_defs,
        })
    }

    fn section<T>(
        data: &[u8],
        offset: u32,
        name: &'static str,
        parser: impl FnOnce(&mut &[u8]) -> ModalResult<T>,
    ) -> Result<T, DexError>
    where
        T: Default,
    {
        if offset == 0 {
            return Ok(T::default());
        }
        let mut input = data
            .get(offset as usize..)
            .ok_or(DexError::SectionError(name))?;
        parser(&mut input).map_err(|_| DexError::SectionError(name))
    }

    /// Raw file bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Verify the header Adler-32 checksum over everything past it.
    ///
    /// A mismatch marks a corrupt or patched file; callers treat it as a
    /// warning and continue.
    pub fn verify_checksum(&self) -> bool {
        let tail: &[u8] = &self.data[12..];
        adler32(&tail) == self.header.checksum
    }

    /// Resolve a string id to its MUTF-8 decoded text.
    pub fn string(&self, idx: u32) -> Result<Cow<'_, str>, DexError> {
        let offset = *self
            .string_ids
            .get(idx as usize)
            .ok_or(DexError::BadIndex {
                pool: "string",
                index: idx,
            })?;
        let mut reader = Reader::at(&self.data, offset as usize)?;
        reader.mutf8()
    }

    /// Resolve a type id to its descriptor string.
    #[inline]
    pub fn type_descriptor(&self, idx: u32) -> Result<Cow<'_, str>, DexError> {
        let string_idx = *self.type_ids.get(idx as usize).ok_or(DexError::BadIndex {
            pool: "type",
            index: idx,
        })?;
        self.string(string_idx)
    }

    #[inline]
    pub fn proto(&self, idx: u32) -> Result<&ProtoItem, DexError> {
        self.proto_ids.get(idx as usize).ok_or(DexError::BadIndex {
            pool: "proto",
            index: idx,
        })
    }

    #[inline]
    pub fn field(&self, idx: u32) -> Result<&FieldItem, DexError> {
        self.field_ids.get(idx as usize).ok_or(DexError::BadIndex {
            pool: "field",
            index: idx,
        })
    }

    #[inline]
    pub fn method(&self, idx: u32) -> Result<&MethodItem, DexError> {
        self.method_ids.get(idx as usize).ok_or(DexError::BadIndex {
            pool: "method",
            index: idx,
        })
    }

    /// Type-id list at `offset` (interfaces, proto parameters).
    pub fn type_list(&self, offset: u32) -> Result<Vec<u16>, DexError> {
        if offset == 0 {
            return Ok(Vec::new());
        }
        let mut input = self
            .data
            .get(offset as usize..)
            .ok_or(DexError::Truncated(offset as usize))?;

        let size = le_u32::<&[u8], ContextError>
            .parse_next(&mut input)
            .map_err(|_| DexError::SectionError("type_list"))?;
        repeat(size as usize, le_u16::<&[u8], ContextError>)
            .parse_next(&mut input)
            .map_err(|_| DexError::SectionError("type_list"))
    }
}

/// Abstraction over the fixed-size file header.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#header-item>
#[derive(Default, Debug, Clone)]
pub struct DexHeader {
    /// Format version parsed from the magic digits (e.g. 35 for `035`).
    pub version: u16,

    /// Adler-32 over the file past this field; detects corruption.
    pub checksum: u32,

    /// SHA-1 of the file past this field; identifies the file.
    pub signature: [u8; 20],

    pub file_size: u32,
    pub header_size: u32,

    /// [ENDIAN_CONSTANT]; the byte-swapped form is rejected at parse.
    pub endian_tag: u32,

    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl DexHeader {
    fn parse(input: &mut &[u8]) -> Result<DexHeader, DexError> {
        let (_, version, _) = (
            take::<_, _, ContextError>(4usize).verify(|magic: &[u8]| magic == b"dex\n"),
            take(3usize).try_map(|digits: &[u8]| {
                std::str::from_utf8(digits)
                    .ok()
                    .and_then(|s| s.parse::<u16>().ok())
                    .ok_or(DexError::InvalidHeader)
            }),
            u8.verify(|b| *b == 0x00),
        )
            .parse_next(input)
            .map_err(|_| DexError::InvalidHeader)?;

        let (checksum, signature, file_size, header_size, endian_tag) = (
            le_u32::<_, ContextError>,                         // checksum
            take(20usize).map(|bytes: &[u8]| {
                let mut sig = [0u8; 20];
                sig.copy_from_slice(bytes);
                sig
            }),                                                // signature
            le_u32,                                            // file_size
            le_u32,                                            // header_size
            le_u32,                                            // endian_tag
        )
            .parse_next(input)
            .map_err(|_| DexError::InvalidHeader)?;

        if endian_tag == REVERSE_ENDIAN_CONSTANT {
            return Err(DexError::BigEndian);
        }
        if endian_tag != ENDIAN_CONSTANT || header_size != HEADER_SIZE {
            return Err(DexError::InvalidHeader);
        }

        let (
            link_size,
            link_off,
            map_off,
            string_ids_size,
            string_ids_off,
            type_ids_size,
            type_ids_off,
            proto_ids_size,
            proto_ids_off,
            field_ids_size,
            field_ids_off,
            method_ids_size,
            method_ids_off,
            class_defs_size,
            class_defs_off,
            data_size,
            data_off,
        ) = (
            le_u32::<_, ContextError>,                      // link_size
            le_u32,                                         // link_off
            le_u32,                                         // map_off
            le_u32,                                         // string_ids_size
            le_u32,                                         // string_ids_off
            le_u32.verify(|&size| size <= u16::MAX.into()), // type_ids_size
            le_u32,                                         // type_ids_off
            le_u32.verify(|&size| size <= u16::MAX.into()), // proto_ids_size
            le_u32,                                         // proto_ids_off
            le_u32,                                         // field_ids_size
            le_u32,                                         // field_ids_off
            le_u32,                                         // method_ids_size
            le_u32,                                         // method_ids_off
            le_u32,                                         // class_defs_size
            le_u32,                                         // class_defs_off
            le_u32,                                         // data_size
            le_u32,                                         // data_off
        )
            .parse_next(input)
            .map_err(|_| DexError::InvalidHeader)?;

        Ok(DexHeader {
            version,
            checksum,
            signature,
            file_size,
            header_size,
            endian_tag,
            link_size,
            link_off,
            map_off,
            string_ids_size,
            string_ids_off,
            type_ids_size,
            type_ids_off,
            proto_ids_size,
            proto_ids_off,
            field_ids_size,
            field_ids_off,
            method_ids_size,
            method_ids_off,
            class_defs_size,
            class_defs_off,
            data_size,
            data_off,
        })
    }

    /// Every id section must lie entirely within the file.
    fn check_sections(&self, file_len: usize) -> Result<(), DexError> {
        let sections: [(&'static str, u32, u32, u32); 6] = [
            ("string_ids", self.string_ids_off, self.string_ids_size, 4),
            ("type_ids", self.type_ids_off, self.type_ids_size, 4),
            ("proto_ids", self.proto_ids_off, self.proto_ids_size, 12),
            ("field_ids", self.field_ids_off, self.field_ids_size, 8),
            ("method_ids", self.method_ids_off, self.method_ids_size, 8),
            ("class_defs", self.class_defs_off, self.class_defs_size, 32),
        ];

        let limit = (file_len as u64).min(u64::from(self.file_size));
        for (name, offset, count, entry_size) in sections {
            if count == 0 {
                continue;
            }
            let end = u64::from(offset) + u64::from(count) * u64::from(entry_size);
            if offset < HEADER_SIZE || end > limit {
                return Err(DexError::SectionBounds {
                    name,
                    offset,
                    count,
                });
            }
        }
        Ok(())
    }
}

/// Abstraction over `proto_id_item`.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#proto-id-item>
#[derive(Debug)]
pub struct ProtoItem {
    /// Index into the string pool for the short-form descriptor.
    pub shorty_idx: u32,

    /// Index into the type pool for the return type.
    pub return_type_idx: u32,

    /// Offset to the parameter type list, or 0 when there are none.
    pub parameters_off: u32,
}

impl ProtoItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<ProtoItem> {
        (le_u32, le_u32, le_u32)
            .map(|(shorty_idx, return_type_idx, parameters_off)| ProtoItem {
                shorty_idx,
                return_type_idx,
                parameters_off,
            })
            .parse_next(input)
    }

    /// Parameter type ids, in declaration order.
    #[inline]
    pub fn parameters(&self, dex: &Dex) -> Result<Vec<u16>, DexError> {
        dex.type_list(self.parameters_off)
    }

    pub fn return_type<'a>(&self, dex: &'a Dex) -> Result<Cow<'a, str>, DexError> {
        dex.type_descriptor(self.return_type_idx)
    }
}

/// Abstraction over `field_id_item`.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#field-id-item>
#[derive(Debug)]
pub struct FieldItem {
    /// Index into the type pool for the definer of this field.
    pub class_idx: u16,

    /// Index into the type pool for the type of this field.
    pub type_idx: u16,

    /// Index into the string pool for the name of this field.
    pub name_idx: u32,
}

impl FieldItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<FieldItem> {
        (le_u16, le_u16, le_u32)
            .map(|(class_idx, type_idx, name_idx)| FieldItem {
                class_idx,
                type_idx,
                name_idx,
            })
            .parse_next(input)
    }

    #[inline]
    pub fn class<'a>(&self, dex: &'a Dex) -> Result<Cow<'a, str>, DexError> {
        dex.type_descriptor(self.class_idx.into())
    }

    #[inline]
    pub fn type_descriptor<'a>(&self, dex: &'a Dex) -> Result<Cow<'a, str>, DexError> {
        dex.type_descriptor(self.type_idx.into())
    }

    #[inline]
    pub fn name<'a>(&self, dex: &'a Dex) -> Result<Cow<'a, str>, DexError> {
        dex.string(self.name_idx)
    }
}

/// Abstraction over `method_id_item`.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#method-id-item>
#[derive(Debug)]
pub struct MethodItem {
    /// Index into the type pool for the definer of this method.
    pub class_idx: u16,

    /// Index into the proto pool for the prototype of this method.
    pub proto_idx: u16,

    /// Index into the string pool for the name of this method.
    pub name_idx: u32,
}

impl MethodItem {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<MethodItem> {
        (le_u16, le_u16, le_u32)
            .map(|(class_idx, proto_idx, name_idx)| MethodItem {
                class_idx,
                proto_idx,
                name_idx,
            })
            .parse_next(input)
    }

    #[inline]
    pub fn class<'a>(&self, dex: &'a Dex) -> Result<Cow<'a, str>, DexError> {
        dex.type_descriptor(self.class_idx.into())
    }

    #[inline]
    pub fn proto<'a>(&self, dex: &'a Dex) -> Result<&'a ProtoItem, DexError> {
        dex.proto(self.proto_idx.into())
    }

    #[inline]
    pub fn name<'a>(&self, dex: &'a Dex) -> Result<Cow<'a, str>, DexError> {
        dex.string(self.name_idx)
    }
}

/// Abstraction over `class_def_item`.
///
/// See: <https://source.android.com/docs/core/runtime/dex-format#class-def-item>
#[derive(Debug)]
pub struct ClassDef {
    /// Index into the type pool for this class.
    pub class_idx: u32,

    pub access_flags: AccessFlags,

    /// Index into the type pool for the superclass, or [NO_INDEX] for a
    /// root class.
    pub superclass_idx: u32,

    /// Offset to the interface type list, or 0.
    pub interfaces_off: u32,

    /// Index into the string pool for the source file name, or [NO_INDEX].
    pub source_file_idx: u32,

    /// Offset to the annotations directory, or 0.
    pub annotations_off: u32,

    /// Offset to the class data (fields and methods), or 0.
    pub class_data_off: u32,

    /// Offset to the encoded array of static field initializers, or 0.
    pub static_values_off: u32,
}

impl ClassDef {
    #[inline]
    fn parse(input: &mut &[u8]) -> ModalResult<ClassDef> {
        (
            le_u32,
            le_u32.map(AccessFlags::from_bits_truncate),
            le_u32,
            le_u32,
            le_u32,
            le_u32,
            le_u32,
            le_u32,
        )
            .map(
                |(
                    class_idx,
                    access_flags,
                    superclass_idx,
                    interfaces_off,
                    source_file_idx,
                    annotations_off,
                    class_data_off,
                    static_values_off,
                )| ClassDef {
                    class_idx,
                    access_flags,
                    superclass_idx,
                    interfaces_off,
                    source_file_idx,
                    annotations_off,
                    class_data_off,
                    static_values_off,
                },
            )
            .parse_next(input)
    }

    /// Type descriptor of this class (`Lcom/example/Foo;`).
    #[inline]
    pub fn descriptor<'a>(&self, dex: &'a Dex) -> Result<Cow<'a, str>, DexError> {
        dex.type_descriptor(self.class_idx)
    }

    #[inline]
    pub fn superclass<'a>(&self, dex: &'a Dex) -> Result<Option<Cow<'a, str>>, DexError> {
        if self.superclass_idx == NO_INDEX {
            return Ok(None);
        }
        dex.type_descriptor(self.superclass_idx).map(Some)
    }

    #[inline]
    pub fn source_file<'a>(&self, dex: &'a Dex) -> Result<Option<Cow<'a, str>>, DexError> {
        if self.source_file_idx == NO_INDEX {
            return Ok(None);
        }
        dex.string(self.source_file_idx).map(Some)
    }

    /// Interface type ids implemented by this class.
    #[inline]
    pub fn interfaces(&self, dex: &Dex) -> Result<Vec<u16>, DexError> {
        dex.type_list(self.interfaces_off)
    }
}

bitflags! {
    /// Access flags for classes, fields, and methods.
    ///
    /// See: <https://source.android.com/docs/core/runtime/dex-format#access-flags>
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessFlags: u32 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        /// For methods only; a lock is acquired around the call.
        const SYNCHRONIZED = 0x0020;
        /// For fields only.
        const VOLATILE = 0x0040;
        /// For methods only; compiler-generated bridge.
        const BRIDGE = 0x0040;
        /// For fields only.
        const TRANSIENT = 0x0080;
        /// For methods only.
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        /// `strictfp` floating-point rules.
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const CONSTRUCTOR = 0x10000;
        const DECLARED_SYNCHRONIZED = 0x20000;
    }
}

impl AccessFlags {
    #[inline]
    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    #[inline]
    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    #[inline]
    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    #[inline]
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    #[inline]
    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }

    #[inline]
    pub fn is_native(self) -> bool {
        self.contains(Self::NATIVE)
    }

    #[inline]
    pub fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    #[inline]
    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    #[inline]
    pub fn is_synthetic(self) -> bool {
        self.contains(Self::SYNTHETIC)
    }

    #[inline]
    pub fn is_annotation(self) -> bool {
        self.contains(Self::ANNOTATION)
    }

    #[inline]
    pub fn is_enum(self) -> bool {
        self.contains(Self::ENUM)
    }

    #[inline]
    pub fn is_constructor(self) -> bool {
        self.contains(Self::CONSTRUCTOR)
    }

    #[inline]
    pub fn is_declared_synchronized(self) -> bool {
        self.contains(Self::DECLARED_SYNCHRONIZED)
    }

    /// Java source modifiers in canonical order.
    pub fn java_modifiers(self, is_method: bool) -> String {
        let mut out = String::new();
        let mut push = |m: &str| {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(m);
        };

        if self.is_public() {
            push("public");
        }
        if self.is_protected() {
            push("protected");
        }
        if self.is_private() {
            push("private");
        }
        if self.is_abstract() && !self.is_interface() {
            push("abstract");
        }
        if self.is_static() {
            push("static");
        }
        if self.is_final() {
            push("final");
        }
        if is_method && self.is_declared_synchronized() {
            push("synchronized");
        }
        if !is_method && self.contains(Self::VOLATILE) {
            push("volatile");
        }
        if !is_method && self.contains(Self::TRANSIENT) {
            push("transient");
        }
        if is_method && self.is_native() {
            push("native");
        }
        if is_method && self.contains(Self::STRICT) {
            push("strictfp");
        }
        out
    }

    /// Smali flag words in the order smali prints them.
    pub fn smali_modifiers(self) -> String {
        let table: [(AccessFlags, &str); 16] = [
            (Self::PUBLIC, "public"),
            (Self::PRIVATE, "private"),
            (Self::PROTECTED, "protected"),
            (Self::STATIC, "static"),
            (Self::FINAL, "final"),
            (Self::SYNCHRONIZED, "synchronized"),
            (Self::VOLATILE, "volatile"),
            (Self::TRANSIENT, "transient"),
            (Self::NATIVE, "native"),
            (Self::INTERFACE, "interface"),
            (Self::ABSTRACT, "abstract"),
            (Self::STRICT, "strictfp"),
            (Self::SYNTHETIC, "synthetic"),
            (Self::ENUM, "enum"),
            (Self::CONSTRUCTOR, "constructor"),
            (Self::DECLARED_SYNCHRONIZED, "declared-synchronized"),
        ];

        let mut out = String::new();
        for (flag, word) in table {
            if self.contains(flag) {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(word);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::DexBuilder;

    #[test]
    fn header_round_trip() {
        let dex = DexBuilder::single_class_no_code("La;").build_parsed();
        assert_eq!(dex.header.version, 35);
        assert_eq!(dex.header.endian_tag, ENDIAN_CONSTANT);
        assert_eq!(dex.class_defs.len(), 1);
        assert_eq!(dex.class_defs[0].descriptor(&dex).unwrap(), "La;");
    }

    #[test]
    fn rejects_reverse_endian() {
        let mut bytes = DexBuilder::single_class_no_code("La;").build();
        bytes[40..44].copy_from_slice(&REVERSE_ENDIAN_CONSTANT.to_le_bytes());
        assert!(matches!(Dex::parse(bytes), Err(DexError::BigEndian)));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = DexBuilder::single_class_no_code("La;").build();
        bytes[0] = b'x';
        assert!(matches!(Dex::parse(bytes), Err(DexError::InvalidHeader)));
    }

    #[test]
    fn rejects_section_past_eof() {
        let mut bytes = DexBuilder::single_class_no_code("La;").build();
        // push class_defs_off past the end of file
        let len = bytes.len() as u32;
        bytes[100..104].copy_from_slice(&(len + 64).to_le_bytes());
        assert!(matches!(
            Dex::parse(bytes),
            Err(DexError::SectionBounds { name: "class_defs", .. })
        ));
    }

    #[test]
    fn checksum_matches_builder() {
        let dex = DexBuilder::single_class_no_code("La;").build_parsed();
        assert!(dex.verify_checksum());
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let dex = DexBuilder::single_class_no_code("La;").build_parsed();
        assert!(matches!(
            dex.string(9999),
            Err(DexError::BadIndex { pool: "string", .. })
        ));
        assert!(matches!(
            dex.type_descriptor(9999),
            Err(DexError::BadIndex { pool: "type", .. })
        ));
    }
}
