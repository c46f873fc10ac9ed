//! Binary parsing of `.class` files: constant pool, members, attributes.
//!
//! Class files are big-endian throughout, unlike the DEX container.

use bitflags::bitflags;
use log::debug;
use winnow::binary::{be_u16, be_u32, be_u64, length_take, u8 as any_u8};
use winnow::combinator::repeat;
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::errors::ClassError;

pub const MAGIC: u32 = 0xCAFEBABE;

/// One constant pool entry. Long and double occupy two slots; the second
/// slot is [Constant::Reserved].
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, index: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
    Reserved,
}

/// The constant pool, indexed from 1 as in the format.
#[derive(Debug, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(input: &mut &[u8]) -> Result<ConstantPool, ClassError> {
        let count = be_u16::<_, ContextError>
            .parse_next(input)
            .map_err(|_| ClassError::SectionError("constant pool count"))?;

        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Reserved); // index 0 is unused

        while entries.len() < count as usize {
            let index = entries.len() as u16;
            let tag = any_u8::<_, ContextError>
                .parse_next(input)
                .map_err(|_| ClassError::SectionError("constant pool"))?;

            let entry = Self::parse_entry(input, tag, index)?;
            let wide = matches!(entry, Constant::Long(_) | Constant::Double(_));
            entries.push(entry);
            if wide {
                entries.push(Constant::Reserved);
            }
        }

        Ok(ConstantPool { entries })
    }

    fn parse_entry(input: &mut &[u8], tag: u8, index: u16) -> Result<Constant, ClassError> {
        let bad = |_: winnow::error::ErrMode<ContextError>| ClassError::SectionError("constant pool");

        Ok(match tag {
            1 => {
                let bytes = length_take(be_u16)
                    .parse_next(input)
                    .map_err(bad)?;
                let text =
                    simd_cesu8::mutf8::decode(bytes).map_err(|_| ClassError::BadUtf8(index))?;
                Constant::Utf8(text.into_owned())
            }
            3 => Constant::Integer(be_u32.parse_next(input).map_err(bad)? as i32),
            4 => Constant::Float(f32::from_bits(be_u32.parse_next(input).map_err(bad)?)),
            5 => Constant::Long(be_u64.parse_next(input).map_err(bad)? as i64),
            6 => Constant::Double(f64::from_bits(be_u64.parse_next(input).map_err(bad)?)),
            7 => Constant::Class(be_u16.parse_next(input).map_err(bad)?),
            8 => Constant::String(be_u16.parse_next(input).map_err(bad)?),
            9 => {
                let (class, name_and_type) = (be_u16, be_u16).parse_next(input).map_err(bad)?;
                Constant::FieldRef {
                    class,
                    name_and_type,
                }
            }
            10 => {
                let (class, name_and_type) = (be_u16, be_u16).parse_next(input).map_err(bad)?;
                Constant::MethodRef {
                    class,
                    name_and_type,
                }
            }
            11 => {
                let (class, name_and_type) = (be_u16, be_u16).parse_next(input).map_err(bad)?;
                Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                }
            }
            12 => {
                let (name, descriptor) = (be_u16, be_u16).parse_next(input).map_err(bad)?;
                Constant::NameAndType { name, descriptor }
            }
            15 => {
                let (kind, idx) = (any_u8, be_u16).parse_next(input).map_err(bad)?;
                Constant::MethodHandle { kind, index: idx }
            }
            16 => Constant::MethodType(be_u16.parse_next(input).map_err(bad)?),
            17 => {
                let (bootstrap, name_and_type) = (be_u16, be_u16).parse_next(input).map_err(bad)?;
                Constant::Dynamic {
                    bootstrap,
                    name_and_type,
                }
            }
            18 => {
                let (bootstrap, name_and_type) = (be_u16, be_u16).parse_next(input).map_err(bad)?;
                Constant::InvokeDynamic {
                    bootstrap,
                    name_and_type,
                }
            }
            19 => Constant::Module(be_u16.parse_next(input).map_err(bad)?),
            20 => Constant::Package(be_u16.parse_next(input).map_err(bad)?),
            tag => return Err(ClassError::BadConstant { tag, index }),
        })
    }

    #[inline]
    pub fn get(&self, index: u16) -> Result<&Constant, ClassError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassError::BadPoolIndex(index))
    }

    pub fn utf8(&self, index: u16) -> Result<&str, ClassError> {
        match self.get(index)? {
            Constant::Utf8(text) => Ok(text),
            _ => Err(ClassError::BadPoolIndex(index)),
        }
    }

    /// Internal name (`p/A`) behind a `CONSTANT_Class` entry.
    pub fn class_name(&self, index: u16) -> Result<&str, ClassError> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(ClassError::BadPoolIndex(index)),
        }
    }

    /// (name, descriptor) behind a `CONSTANT_NameAndType` entry.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassError> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(ClassError::BadPoolIndex(index)),
        }
    }

    /// (class, name, descriptor) behind a field/method/interface-method ref.
    pub fn member_ref(&self, index: u16) -> Result<(&str, &str, &str), ClassError> {
        let (class, name_and_type) = match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            }
            | Constant::MethodRef {
                class,
                name_and_type,
            }
            | Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type),
            _ => return Err(ClassError::BadPoolIndex(index)),
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok((self.class_name(class)?, name, descriptor))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

bitflags! {
    /// Class, field and method access flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClassAccess: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        /// `super` semantics on classes, `synchronized` on methods.
        const SUPER_OR_SYNCHRONIZED = 0x0020;
        const VOLATILE_OR_BRIDGE = 0x0040;
        const TRANSIENT_OR_VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

impl ClassAccess {
    #[inline]
    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
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
    pub fn is_native(self) -> bool {
        self.contains(Self::NATIVE)
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

        if self.contains(Self::PUBLIC) {
            push("public");
        }
        if self.contains(Self::PROTECTED) {
            push("protected");
        }
        if self.contains(Self::PRIVATE) {
            push("private");
        }
        if self.is_abstract() && !self.is_interface() {
            push("abstract");
        }
        if self.is_static() {
            push("static");
        }
        if self.contains(Self::FINAL) {
            push("final");
        }
        if is_method && self.contains(Self::SUPER_OR_SYNCHRONIZED) {
            push("synchronized");
        }
        if !is_method && self.contains(Self::VOLATILE_OR_BRIDGE) {
            push("volatile");
        }
        if !is_method && self.contains(Self::TRANSIENT_OR_VARARGS) {
            push("transient");
        }
        if is_method && self.is_native() {
            push("native");
        }
        out
    }
}

/// A field or method entry.
#[derive(Debug)]
pub struct Member {
    pub access_flags: ClassAccess,
    pub name_idx: u16,
    pub descriptor_idx: u16,
    pub attributes: Vec<Attribute>,
}

/// A raw attribute; known attribute payloads are decoded on demand.
#[derive(Debug)]
pub struct Attribute {
    pub name_idx: u16,
    pub data: Vec<u8>,
}

/// One entry of the `Code` attribute exception table, offsets in bytes.
#[derive(Debug, Clone)]
pub struct ExceptionEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// `CONSTANT_Class` of the caught type, or 0 for catch-all.
    pub catch_type: u16,
}

/// Decoded `Code` attribute of one method.
#[derive(Debug)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exceptions: Vec<ExceptionEntry>,
}

/// A parsed class file.
#[derive(Debug)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: ClassAccess,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, ClassError> {
        let input = &mut &bytes[..];

        let magic = be_u32::<_, ContextError>
            .parse_next(input)
            .map_err(|_| ClassError::InvalidMagic)?;
        if magic != MAGIC {
            return Err(ClassError::InvalidMagic);
        }

        let (minor_version, major_version) = (be_u16::<_, ContextError>, be_u16)
            .parse_next(input)
            .map_err(|_| ClassError::SectionError("version"))?;
        // 45 = JDK 1.1; anything below cannot be a real class file
        if major_version < 45 {
            return Err(ClassError::Version(major_version));
        }

        let constant_pool = ConstantPool::parse(input)?;

        let (access_flags, this_class, super_class) =
            (be_u16::<_, ContextError>, be_u16, be_u16)
                .parse_next(input)
                .map_err(|_| ClassError::SectionError("class header"))?;
        let access_flags = ClassAccess::from_bits_truncate(access_flags);

        let interface_count = be_u16::<_, ContextError>
            .parse_next(input)
            .map_err(|_| ClassError::SectionError("interfaces"))?;
        let interfaces: Vec<u16> = repeat(interface_count as usize, be_u16::<_, ContextError>)
            .parse_next(input)
            .map_err(|_| ClassError::SectionError("interfaces"))?;

        let fields = Self::members(input, "fields")?;
        let methods = Self::members(input, "methods")?;
        let attributes = Self::attributes(input, "class attributes")?;

        debug!(
            "parsed class file v{major_version}.{minor_version}: {} pool entries, {} methods",
            constant_pool.len(),
            methods.len()
        );

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    fn members(input: &mut &[u8], what: &'static str) -> Result<Vec<Member>, ClassError> {
        let count = be_u16::<_, ContextError>
            .parse_next(input)
            .map_err(|_| ClassError::SectionError(what))?;

        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (access_flags, name_idx, descriptor_idx) =
                (be_u16::<_, ContextError>, be_u16, be_u16)
                    .parse_next(input)
                    .map_err(|_| ClassError::SectionError(what))?;
            let attributes = Self::attributes(input, what)?;
            out.push(Member {
                access_flags: ClassAccess::from_bits_truncate(access_flags),
                name_idx,
                descriptor_idx,
                attributes,
            });
        }
        Ok(out)
    }

    fn attributes(input: &mut &[u8], what: &'static str) -> Result<Vec<Attribute>, ClassError> {
        let count = be_u16::<_, ContextError>
            .parse_next(input)
            .map_err(|_| ClassError::SectionError(what))?;

        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (name_idx, data) = (be_u16::<_, ContextError>, length_take(be_u32))
                .parse_next(input)
                .map_err(|_| ClassError::SectionError(what))?;
            out.push(Attribute {
                name_idx,
                data: data.to_vec(),
            });
        }
        Ok(out)
    }

    /// Internal name of this class (`p/A`).
    pub fn class_name(&self) -> Result<&str, ClassError> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<&str>, ClassError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn member_name(&self, member: &Member) -> Result<&str, ClassError> {
        self.constant_pool.utf8(member.name_idx)
    }

    pub fn member_descriptor(&self, member: &Member) -> Result<&str, ClassError> {
        self.constant_pool.utf8(member.descriptor_idx)
    }

    /// Decode the `Code` attribute of a method, when it has one.
    pub fn code_of(&self, member: &Member) -> Result<Option<CodeAttribute>, ClassError> {
        for attribute in &member.attributes {
            if self.constant_pool.utf8(attribute.name_idx)? != "Code" {
                continue;
            }
            let input = &mut &attribute.data[..];
            let (max_stack, max_locals, code) = (
                be_u16::<_, ContextError>,
                be_u16,
                length_take(be_u32),
            )
                .parse_next(input)
                .map_err(|_| ClassError::SectionError("code attribute"))?;

            let exception_count = be_u16::<_, ContextError>
                .parse_next(input)
                .map_err(|_| ClassError::SectionError("exception table"))?;
            let mut exceptions = Vec::with_capacity(exception_count as usize);
            for _ in 0..exception_count {
                let (start_pc, end_pc, handler_pc, catch_type) =
                    (be_u16::<_, ContextError>, be_u16, be_u16, be_u16)
                        .parse_next(input)
                        .map_err(|_| ClassError::SectionError("exception table"))?;
                exceptions.push(ExceptionEntry {
                    start_pc,
                    end_pc,
                    handler_pc,
                    catch_type,
                });
            }

            return Ok(Some(CodeAttribute {
                max_stack,
                max_locals,
                code: code.to_vec(),
                exceptions,
            }));
        }
        Ok(None)
    }

    /// Value of the `SourceFile` attribute, when present.
    pub fn source_file(&self) -> Option<&str> {
        for attribute in &self.attributes {
            let Ok(name) = self.constant_pool.utf8(attribute.name_idx) else {
                continue;
            };
            if name == "SourceFile" && attribute.data.len() == 2 {
                let index = u16::from_be_bytes([attribute.data[0], attribute.data[1]]);
                return self.constant_pool.utf8(index).ok();
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    /// Assemble a class file for `public class <name> extends
    /// java/lang/Object` with no fields and the given raw method entries.
    pub(crate) struct ClassBuilder {
        pub(crate) name: String,
        pub(crate) major: u16,
        pub(crate) methods: Vec<(u16, String, String, Option<Vec<u8>>)>,
    }

    impl ClassBuilder {
        pub(crate) fn new(name: &str) -> ClassBuilder {
            ClassBuilder {
                name: name.to_owned(),
                major: 52,
                methods: Vec::new(),
            }
        }

        pub(crate) fn method(mut self, access: u16, name: &str, descriptor: &str, code: Vec<u8>) -> Self {
            self.methods
                .push((access, name.to_owned(), descriptor.to_owned(), Some(code)));
            self
        }

        pub(crate) fn build(self) -> Vec<u8> {
            let mut pool: Vec<Vec<u8>> = Vec::new();
            let mut push_utf8 = |pool: &mut Vec<Vec<u8>>, text: &str| -> u16 {
                let mut entry = vec![1u8];
                entry.extend_from_slice(&(text.len() as u16).to_be_bytes());
                entry.extend_from_slice(text.as_bytes());
                pool.push(entry);
                pool.len() as u16
            };
            let push_class = |pool: &mut Vec<Vec<u8>>, name_idx: u16| -> u16 {
                let mut entry = vec![7u8];
                entry.extend_from_slice(&name_idx.to_be_bytes());
                pool.push(entry);
                pool.len() as u16
            };

            let this_name = push_utf8(&mut pool, &self.name);
            let this_class = push_class(&mut pool, this_name);
            let super_name = push_utf8(&mut pool, "java/lang/Object");
            let super_class = push_class(&mut pool, super_name);
            let code_attr = push_utf8(&mut pool, "Code");

            let mut method_blobs = Vec::new();
            for (access, name, descriptor, code) in &self.methods {
                let name_idx = push_utf8(&mut pool, name);
                let desc_idx = push_utf8(&mut pool, descriptor);
                let mut blob = Vec::new();
                blob.extend_from_slice(&access.to_be_bytes());
                blob.extend_from_slice(&name_idx.to_be_bytes());
                blob.extend_from_slice(&desc_idx.to_be_bytes());
                match code {
                    Some(code) => {
                        blob.extend_from_slice(&1u16.to_be_bytes()); // one attribute
                        blob.extend_from_slice(&code_attr.to_be_bytes());
                        let mut body = Vec::new();
                        body.extend_from_slice(&2u16.to_be_bytes()); // max_stack
                        body.extend_from_slice(&2u16.to_be_bytes()); // max_locals
                        body.extend_from_slice(&(code.len() as u32).to_be_bytes());
                        body.extend_from_slice(code);
                        body.extend_from_slice(&0u16.to_be_bytes()); // exceptions
                        body.extend_from_slice(&0u16.to_be_bytes()); // attributes
                        blob.extend_from_slice(&(body.len() as u32).to_be_bytes());
                        blob.extend_from_slice(&body);
                    }
                    None => blob.extend_from_slice(&0u16.to_be_bytes()),
                }
                method_blobs.push(blob);
            }

            let mut out = Vec::new();
            out.extend_from_slice(&super::MAGIC.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // minor
            out.extend_from_slice(&self.major.to_be_bytes());
            out.extend_from_slice(&((pool.len() + 1) as u16).to_be_bytes());
            for entry in &pool {
                out.extend_from_slice(entry);
            }
            out.extend_from_slice(&0x0021u16.to_be_bytes()); // public super
            out.extend_from_slice(&this_class.to_be_bytes());
            out.extend_from_slice(&super_class.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
            out.extend_from_slice(&0u16.to_be_bytes()); // fields
            out.extend_from_slice(&(method_blobs.len() as u16).to_be_bytes());
            for blob in &method_blobs {
                out.extend_from_slice(blob);
            }
            out.extend_from_slice(&0u16.to_be_bytes()); // class attributes
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::ClassBuilder;
    use super::*;

    #[test]
    fn parses_minimal_class() {
        let bytes = ClassBuilder::new("p/A").build();
        let class = ClassFile::parse(&bytes).unwrap();

        assert_eq!(class.major_version, 52);
        assert_eq!(class.minor_version, 0);
        assert_eq!(class.class_name().unwrap(), "p/A");
        assert_eq!(class.super_name().unwrap(), Some("java/lang/Object"));
        assert!(class.methods.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = ClassBuilder::new("p/A").build();
        bytes[0] = 0;
        assert!(matches!(
            ClassFile::parse(&bytes),
            Err(ClassError::InvalidMagic)
        ));
    }

    #[test]
    fn finds_code_attribute() {
        // void m() { return; }
        let bytes = ClassBuilder::new("p/A")
            .method(0x0001, "m", "()V", vec![0xb1])
            .build();
        let class = ClassFile::parse(&bytes).unwrap();
        let method = &class.methods[0];

        assert_eq!(class.member_name(method).unwrap(), "m");
        assert_eq!(class.member_descriptor(method).unwrap(), "()V");
        let code = class.code_of(method).unwrap().unwrap();
        assert_eq!(code.code, [0xb1]);
        assert!(code.exceptions.is_empty());
    }

    #[test]
    fn long_constants_take_two_slots() {
        // hand-roll a pool with [Long, Utf8] and check indexing
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&52u16.to_be_bytes());
        bytes.extend_from_slice(&4u16.to_be_bytes()); // count = entries + 1
        bytes.push(5); // Long
        bytes.extend_from_slice(&(-2i64).to_be_bytes());
        bytes.push(1); // Utf8 "x"
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.push(b'x');
        bytes.extend_from_slice(&0x0001u16.to_be_bytes()); // access
        bytes.extend_from_slice(&0u16.to_be_bytes()); // this (invalid, unchecked)
        bytes.extend_from_slice(&0u16.to_be_bytes()); // super
        bytes.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        bytes.extend_from_slice(&0u16.to_be_bytes()); // fields
        bytes.extend_from_slice(&0u16.to_be_bytes()); // methods
        bytes.extend_from_slice(&0u16.to_be_bytes()); // attributes

        let class = ClassFile::parse(&bytes).unwrap();
        assert_eq!(class.constant_pool.get(1).unwrap(), &Constant::Long(-2));
        assert_eq!(class.constant_pool.get(2).unwrap(), &Constant::Reserved);
        assert_eq!(class.constant_pool.utf8(3).unwrap(), "x");
    }
}
