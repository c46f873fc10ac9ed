//! Hand-assembled DEX files for unit tests.
//!
//! The builder lays out a minimal but structurally valid file: header, id
//! tables, then a data region holding code items, class data and string
//! data. Only the features the tests exercise are supported.

use simd_adler32::adler32;

use crate::dex::{Dex, NO_INDEX};

#[derive(Default)]
pub(crate) struct DexBuilder {
    strings: Vec<String>,
    /// string idx per type
    types: Vec<u32>,
    /// (shorty_idx, return_type_idx)
    protos: Vec<(u32, u32)>,
    /// (class type_idx, proto_idx, name_idx)
    methods: Vec<(u16, u16, u32)>,
    classes: Vec<ClassSpec>,
}

pub(crate) struct ClassSpec {
    type_idx: u32,
    access_flags: u32,
    superclass_idx: u32,
    source_file_idx: u32,
    /// (method_idx delta as stored, access_flags, code)
    direct_methods: Vec<(u32, u32, Option<CodeSpec>)>,
}

pub(crate) struct CodeSpec {
    pub registers_size: u16,
    pub ins_size: u16,
    pub units: Vec<u16>,
    /// (start_addr, insn_count, catch type_idx, handler_addr)
    pub tries: Vec<(u32, u16, u32, u32)>,
}

impl DexBuilder {
    pub(crate) fn intern_string(&mut self, s: &str) -> u32 {
        if let Some(i) = self.strings.iter().position(|x| x == s) {
            return i as u32;
        }
        self.strings.push(s.to_owned());
        (self.strings.len() - 1) as u32
    }

    pub(crate) fn intern_type(&mut self, descriptor: &str) -> u32 {
        let string_idx = self.intern_string(descriptor);
        if let Some(i) = self.types.iter().position(|&x| x == string_idx) {
            return i as u32;
        }
        self.types.push(string_idx);
        (self.types.len() - 1) as u32
    }

    fn add_proto_void(&mut self) -> u32 {
        let shorty = self.intern_string("V");
        let ret = self.intern_type("V");
        self.protos.push((shorty, ret));
        (self.protos.len() - 1) as u32
    }

    /// One class definition with no class data at all.
    pub(crate) fn single_class_no_code(descriptor: &str) -> DexBuilder {
        let mut builder = DexBuilder::default();
        let type_idx = builder.intern_type(descriptor);
        builder.classes.push(ClassSpec {
            type_idx,
            access_flags: 0x1, // public
            superclass_idx: NO_INDEX,
            source_file_idx: NO_INDEX,
            direct_methods: Vec::new(),
        });
        builder
    }

    /// Abstract methods stored with the given raw index deltas; enough
    /// method ids are interned to cover the accumulated values.
    pub(crate) fn class_with_method_deltas(descriptor: &str, deltas: &[u32]) -> DexBuilder {
        let mut builder = DexBuilder::default();
        let type_idx = builder.intern_type(descriptor);
        let proto_idx = builder.add_proto_void();
        let name_idx = builder.intern_string("m");

        let max_id: u32 = deltas.iter().sum();
        for _ in 0..=max_id {
            builder
                .methods
                .push((type_idx as u16, proto_idx as u16, name_idx));
        }

        builder.classes.push(ClassSpec {
            type_idx,
            access_flags: 0x1,
            superclass_idx: NO_INDEX,
            source_file_idx: NO_INDEX,
            direct_methods: deltas.iter().map(|&d| (d, 0x1, None)).collect(),
        });
        builder
    }

    /// One method whose body is wrapped in a try range with one typed
    /// handler.
    pub(crate) fn class_with_try_catch(descriptor: &str) -> DexBuilder {
        let mut builder = DexBuilder::default();
        let type_idx = builder.intern_type(descriptor);
        let throwable = builder.intern_type("Ljava/lang/Throwable;");
        let proto_idx = builder.add_proto_void();
        let name_idx = builder.intern_string("m");
        builder
            .methods
            .push((type_idx as u16, proto_idx as u16, name_idx));

        let code = CodeSpec {
            registers_size: 1,
            ins_size: 1,
            // nop; return-void; return-void (handler)
            units: vec![0x0000, 0x000e, 0x000e],
            tries: vec![(0, 2, throwable, 2)],
        };

        builder.classes.push(ClassSpec {
            type_idx,
            access_flags: 0x1,
            superclass_idx: NO_INDEX,
            source_file_idx: NO_INDEX,
            direct_methods: vec![(0, 0x1, Some(code))],
        });
        builder
    }

    pub(crate) fn build_parsed(self) -> Dex {
        Dex::parse(self.build()).expect("fixture dex must parse")
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let header_size = 0x70usize;
        let string_ids_off = header_size;
        let type_ids_off = string_ids_off + 4 * self.strings.len();
        let proto_ids_off = type_ids_off + 4 * self.types.len();
        let method_ids_off = proto_ids_off + 12 * self.protos.len();
        let class_defs_off = method_ids_off + 8 * self.methods.len();
        let data_off = class_defs_off + 32 * self.classes.len();

        // data region: code items (4-aligned), class data, string data
        let mut data = Vec::new();
        let abs = |data: &Vec<u8>, base: usize| (base + data.len()) as u32;

        let mut class_blobs = Vec::new();
        for class in &self.classes {
            let mut code_offsets = Vec::new();
            for (_, _, code) in &class.direct_methods {
                match code {
                    Some(code) => {
                        while (data_off + data.len()) % 4 != 0 {
                            data.push(0);
                        }
                        code_offsets.push(abs(&data, data_off));
                        push_code_item(&mut data, code);
                    }
                    None => code_offsets.push(0),
                }
            }
            class_blobs.push(code_offsets);
        }

        let mut class_data_offsets = Vec::new();
        for (class, code_offsets) in self.classes.iter().zip(&class_blobs) {
            if class.direct_methods.is_empty() {
                class_data_offsets.push(0u32);
                continue;
            }
            class_data_offsets.push(abs(&data, data_off));
            push_uleb(&mut data, 0); // static fields
            push_uleb(&mut data, 0); // instance fields
            push_uleb(&mut data, class.direct_methods.len() as u32);
            push_uleb(&mut data, 0); // virtual methods
            for ((delta, access, _), code_off) in class.direct_methods.iter().zip(code_offsets) {
                push_uleb(&mut data, *delta);
                push_uleb(&mut data, *access);
                push_uleb(&mut data, *code_off);
            }
        }

        let mut string_offsets = Vec::new();
        for s in &self.strings {
            string_offsets.push(abs(&data, data_off));
            push_uleb(&mut data, s.chars().map(char::len_utf16).sum::<usize>() as u32);
            data.extend_from_slice(&simd_cesu8::mutf8::encode(s));
            data.push(0);
        }

        let file_size = data_off + data.len();
        let mut out = Vec::with_capacity(file_size);

        // header
        out.extend_from_slice(b"dex\n035\x00");
        out.extend_from_slice(&0u32.to_le_bytes()); // checksum, patched below
        out.extend_from_slice(&[0u8; 20]); // signature
        out.extend_from_slice(&(file_size as u32).to_le_bytes());
        out.extend_from_slice(&0x70u32.to_le_bytes());
        out.extend_from_slice(&0x12345678u32.to_le_bytes()); // endian tag
        out.extend_from_slice(&0u32.to_le_bytes()); // link_size
        out.extend_from_slice(&0u32.to_le_bytes()); // link_off
        out.extend_from_slice(&0u32.to_le_bytes()); // map_off
        for (size, off) in [
            (self.strings.len(), string_ids_off),
            (self.types.len(), type_ids_off),
            (self.protos.len(), proto_ids_off),
            (0, 0), // field_ids
            (self.methods.len(), method_ids_off),
            (self.classes.len(), class_defs_off),
        ] {
            out.extend_from_slice(&(size as u32).to_le_bytes());
            let off = if size == 0 { 0 } else { off as u32 };
            out.extend_from_slice(&off.to_le_bytes());
        }
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data_off as u32).to_le_bytes());
        assert_eq!(out.len(), header_size);

        // id tables
        for offset in &string_offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        for string_idx in &self.types {
            out.extend_from_slice(&string_idx.to_le_bytes());
        }
        for (shorty, ret) in &self.protos {
            out.extend_from_slice(&shorty.to_le_bytes());
            out.extend_from_slice(&ret.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // parameters_off
        }
        for (class_idx, proto_idx, name_idx) in &self.methods {
            out.extend_from_slice(&class_idx.to_le_bytes());
            out.extend_from_slice(&proto_idx.to_le_bytes());
            out.extend_from_slice(&name_idx.to_le_bytes());
        }
        for (class, class_data_off) in self.classes.iter().zip(&class_data_offsets) {
            out.extend_from_slice(&class.type_idx.to_le_bytes());
            out.extend_from_slice(&class.access_flags.to_le_bytes());
            out.extend_from_slice(&class.superclass_idx.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // interfaces_off
            out.extend_from_slice(&class.source_file_idx.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // annotations_off
            out.extend_from_slice(&class_data_off.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes()); // static_values_off
        }
        assert_eq!(out.len(), data_off);

        out.extend_from_slice(&data);

        // patch the checksum now that the bytes are final
        let tail: &[u8] = &out[12..];
        let checksum = adler32(&tail);
        out[8..12].copy_from_slice(&checksum.to_le_bytes());
        out
    }
}

fn push_uleb(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn push_code_item(out: &mut Vec<u8>, code: &CodeSpec) {
    out.extend_from_slice(&code.registers_size.to_le_bytes());
    out.extend_from_slice(&code.ins_size.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // outs_size
    out.extend_from_slice(&(code.tries.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // debug_info_off
    out.extend_from_slice(&(code.units.len() as u32).to_le_bytes());
    for unit in &code.units {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    if !code.tries.is_empty() {
        if code.units.len() % 2 == 1 {
            out.extend_from_slice(&0u16.to_le_bytes());
        }
        // try items first, then the handler list they point into
        let mut handler_offs = Vec::new();
        let mut handlers = Vec::new();
        push_uleb(&mut handlers, code.tries.len() as u32);
        for (_, _, type_idx, handler_addr) in &code.tries {
            handler_offs.push(handlers.len() as u16);
            push_uleb(&mut handlers, 1); // positive size: one typed catch
            push_uleb(&mut handlers, *type_idx);
            push_uleb(&mut handlers, *handler_addr);
        }
        for ((start, count, _, _), handler_off) in code.tries.iter().zip(&handler_offs) {
            out.extend_from_slice(&start.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&handler_off.to_le_bytes());
        }
        out.extend_from_slice(&handlers);
    }
}
