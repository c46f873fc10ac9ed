//! Hand-assembled DEX, class-file and ZIP fixtures for the end-to-end
//! tests. Only the features the tests exercise are supported: `()V`
//! prototypes, static methods, stored ZIP entries.

use std::path::PathBuf;

use simd_adler32::adler32;

pub struct FixtureClass {
    pub descriptor: String,
    pub methods: Vec<FixtureMethod>,
}

pub struct FixtureMethod {
    pub name: String,
    pub registers: u16,
    pub units: Vec<u16>,
}

impl FixtureClass {
    pub fn new(descriptor: &str) -> FixtureClass {
        FixtureClass {
            descriptor: descriptor.to_owned(),
            methods: Vec::new(),
        }
    }

    pub fn method(mut self, name: &str, registers: u16, units: &[u16]) -> FixtureClass {
        self.methods.push(FixtureMethod {
            name: name.to_owned(),
            registers,
            units: units.to_vec(),
        });
        self
    }
}

/// Serialize a minimal but structurally valid DEX file.
pub fn build_dex(classes: &[FixtureClass]) -> Vec<u8> {
    let mut strings: Vec<String> = Vec::new();
    let intern = |strings: &mut Vec<String>, s: &str| -> u32 {
        match strings.iter().position(|x| x == s) {
            Some(i) => i as u32,
            None => {
                strings.push(s.to_owned());
                (strings.len() - 1) as u32
            }
        }
    };

    // types: every class descriptor plus V for the ()V prototype
    let mut types: Vec<u32> = Vec::new();
    let intern_type = |strings: &mut Vec<String>, types: &mut Vec<u32>, s: &str| -> u32 {
        let string_idx = match strings.iter().position(|x| x == s) {
            Some(i) => i as u32,
            None => {
                strings.push(s.to_owned());
                (strings.len() - 1) as u32
            }
        };
        match types.iter().position(|&x| x == string_idx) {
            Some(i) => i as u32,
            None => {
                types.push(string_idx);
                (types.len() - 1) as u32
            }
        }
    };

    let void_shorty = intern(&mut strings, "V");
    let void_type = intern_type(&mut strings, &mut types, "V");
    let protos = vec![(void_shorty, void_type)];

    // method ids in declaration order; class order keeps them ascending
    // within each method list so the deltas stay non-negative
    let mut class_type_ids = Vec::new();
    let mut methods: Vec<(u16, u16, u32)> = Vec::new();
    let mut method_ids_per_class: Vec<Vec<u32>> = Vec::new();
    for class in classes {
        let type_idx = intern_type(&mut strings, &mut types, &class.descriptor);
        class_type_ids.push(type_idx);
        let mut ids = Vec::new();
        for method in &class.methods {
            let name_idx = intern(&mut strings, &method.name);
            ids.push(methods.len() as u32);
            methods.push((type_idx as u16, 0, name_idx));
        }
        method_ids_per_class.push(ids);
    }

    let header_size = 0x70usize;
    let string_ids_off = header_size;
    let type_ids_off = string_ids_off + 4 * strings.len();
    let proto_ids_off = type_ids_off + 4 * types.len();
    let method_ids_off = proto_ids_off + 12 * protos.len();
    let class_defs_off = method_ids_off + 8 * methods.len();
    let data_off = class_defs_off + 32 * classes.len();

    let mut data: Vec<u8> = Vec::new();

    // code items, 4-aligned
    let mut code_offsets: Vec<Vec<u32>> = Vec::new();
    for class in classes {
        let mut offsets = Vec::new();
        for method in &class.methods {
            while (data_off + data.len()) % 4 != 0 {
                data.push(0);
            }
            offsets.push((data_off + data.len()) as u32);
            data.extend_from_slice(&method.registers.to_le_bytes());
            data.extend_from_slice(&0u16.to_le_bytes()); // ins_size (static)
            data.extend_from_slice(&0u16.to_le_bytes()); // outs_size
            data.extend_from_slice(&0u16.to_le_bytes()); // tries_size
            data.extend_from_slice(&0u32.to_le_bytes()); // debug_info_off
            data.extend_from_slice(&(method.units.len() as u32).to_le_bytes());
            for unit in &method.units {
                data.extend_from_slice(&unit.to_le_bytes());
            }
        }
        code_offsets.push(offsets);
    }

    // class data
    let mut class_data_offsets = Vec::new();
    for (class_index, class) in classes.iter().enumerate() {
        if class.methods.is_empty() {
            class_data_offsets.push(0u32);
            continue;
        }
        class_data_offsets.push((data_off + data.len()) as u32);
        push_uleb(&mut data, 0); // static fields
        push_uleb(&mut data, 0); // instance fields
        push_uleb(&mut data, class.methods.len() as u32);
        push_uleb(&mut data, 0); // virtual methods
        let mut previous = 0u32;
        for (method_index, _) in class.methods.iter().enumerate() {
            let id = method_ids_per_class[class_index][method_index];
            push_uleb(&mut data, id - previous);
            previous = id;
            push_uleb(&mut data, 0x9); // public static
            push_uleb(&mut data, code_offsets[class_index][method_index]);
        }
    }

    // string data
    let mut string_offsets = Vec::new();
    for s in &strings {
        string_offsets.push((data_off + data.len()) as u32);
        push_uleb(&mut data, s.chars().map(char::len_utf16).sum::<usize>() as u32);
        data.extend_from_slice(s.as_bytes());
        data.push(0);
    }

    let file_size = data_off + data.len();
    let mut out = Vec::with_capacity(file_size);
    out.extend_from_slice(b"dex\n035\x00");
    out.extend_from_slice(&0u32.to_le_bytes()); // checksum, patched below
    out.extend_from_slice(&[0u8; 20]); // signature
    out.extend_from_slice(&(file_size as u32).to_le_bytes());
    out.extend_from_slice(&0x70u32.to_le_bytes());
    out.extend_from_slice(&0x12345678u32.to_le_bytes());
    out.extend_from_slice(&[0u8; 12]); // link size/off, map_off
    for (size, off) in [
        (strings.len(), string_ids_off),
        (types.len(), type_ids_off),
        (protos.len(), proto_ids_off),
        (0, 0), // field ids
        (methods.len(), method_ids_off),
        (classes.len(), class_defs_off),
    ] {
        out.extend_from_slice(&(size as u32).to_le_bytes());
        let off = if size == 0 { 0u32 } else { off as u32 };
        out.extend_from_slice(&off.to_le_bytes());
    }
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&(data_off as u32).to_le_bytes());
    assert_eq!(out.len(), header_size);

    for offset in &string_offsets {
        out.extend_from_slice(&offset.to_le_bytes());
    }
    for string_idx in &types {
        out.extend_from_slice(&string_idx.to_le_bytes());
    }
    for (shorty, ret) in &protos {
        out.extend_from_slice(&shorty.to_le_bytes());
        out.extend_from_slice(&ret.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
    }
    for (class_idx, proto_idx, name_idx) in &methods {
        out.extend_from_slice(&class_idx.to_le_bytes());
        out.extend_from_slice(&proto_idx.to_le_bytes());
        out.extend_from_slice(&name_idx.to_le_bytes());
    }
    for (index, type_idx) in class_type_ids.iter().enumerate() {
        out.extend_from_slice(&type_idx.to_le_bytes());
        out.extend_from_slice(&0x1u32.to_le_bytes()); // public
        out.extend_from_slice(&u32::MAX.to_le_bytes()); // no superclass
        out.extend_from_slice(&0u32.to_le_bytes()); // interfaces
        out.extend_from_slice(&u32::MAX.to_le_bytes()); // no source file
        out.extend_from_slice(&0u32.to_le_bytes()); // annotations
        out.extend_from_slice(&class_data_offsets[index].to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // static values
    }
    assert_eq!(out.len(), data_off);
    out.extend_from_slice(&data);

    let tail: &[u8] = &out[12..];
    let checksum = adler32(&tail);
    out[8..12].copy_from_slice(&checksum.to_le_bytes());
    out
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

/// A class file for `public class <name>` with `()V` methods.
pub fn build_class_file(name: &str, method_bodies: &[(&str, &[u8])]) -> Vec<u8> {
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

    let this_name = push_utf8(&mut pool, name);
    let this_class = push_class(&mut pool, this_name);
    let super_name = push_utf8(&mut pool, "java/lang/Object");
    let super_class = push_class(&mut pool, super_name);
    let code_attr = push_utf8(&mut pool, "Code");
    let descriptor = push_utf8(&mut pool, "()V");

    let mut blobs = Vec::new();
    for (method_name, code) in method_bodies {
        let name_idx = push_utf8(&mut pool, method_name);
        let mut blob = Vec::new();
        blob.extend_from_slice(&0x0009u16.to_be_bytes()); // public static
        blob.extend_from_slice(&name_idx.to_be_bytes());
        blob.extend_from_slice(&descriptor.to_be_bytes());
        blob.extend_from_slice(&1u16.to_be_bytes());
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
        blobs.push(blob);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // minor
    out.extend_from_slice(&52u16.to_be_bytes()); // major
    out.extend_from_slice(&((pool.len() + 1) as u16).to_be_bytes());
    for entry in &pool {
        out.extend_from_slice(entry);
    }
    out.extend_from_slice(&0x0021u16.to_be_bytes());
    out.extend_from_slice(&this_class.to_be_bytes());
    out.extend_from_slice(&super_class.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
    out.extend_from_slice(&0u16.to_be_bytes()); // fields
    out.extend_from_slice(&(blobs.len() as u16).to_be_bytes());
    for blob in &blobs {
        out.extend_from_slice(blob);
    }
    out.extend_from_slice(&0u16.to_be_bytes()); // attributes
    out
}

/// A stored-only ZIP archive with the given entries.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();
    let mut offsets = Vec::new();

    for (name, data) in entries {
        offsets.push(out.len() as u32);
        out.extend_from_slice(&0x04034b50u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 2 * 5]);
        out.extend_from_slice(&0u32.to_le_bytes()); // crc32
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(data);
    }

    let central_offset = out.len() as u32;
    for ((name, data), offset) in entries.iter().zip(&offsets) {
        central.extend_from_slice(&0x02014b50u32.to_le_bytes());
        central.extend_from_slice(&[0u8; 2 * 6]);
        central.extend_from_slice(&0u32.to_le_bytes()); // crc32
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&[0u8; 2 * 4]);
        central.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }
    out.extend_from_slice(&central);

    out.extend_from_slice(&0x06054b50u32.to_le_bytes());
    out.extend_from_slice(&[0u8; 2 * 2]);
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&central_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

/// A fresh scratch directory under the system temp dir.
pub fn scratch_dir(tag: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("declass-test-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&path);
    std::fs::create_dir_all(&path).expect("can't create scratch dir");
    path
}
