//! The Dalvik opcode table.
//!
//! See: <https://source.android.com/docs/core/runtime/dalvik-bytecode#instructions>

use std::fmt::{Display, Formatter};

/// Operand layout of one instruction.
///
/// See: <https://source.android.com/docs/core/runtime/instruction-formats#formats>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnFormat {
    F10x,
    F12x,
    F11n,
    F11x,
    F10t,
    F20t,
    F20bc,
    F22x,
    F21t,
    F21s,
    F21h,
    F21c,
    F23x,
    F22b,
    F22t,
    F22s,
    F22c,
    F30t,
    F32x,
    F31i,
    F31t,
    F31c,
    F35c,
    F3rc,
    F45cc,
    F4rcc,
    F51l,
}

impl InsnFormat {
    /// Instruction width in 16-bit code units.
    pub fn units(self) -> usize {
        match self {
            Self::F10x | Self::F12x | Self::F11n | Self::F11x | Self::F10t => 1,
            Self::F20t
            | Self::F20bc
            | Self::F22x
            | Self::F21t
            | Self::F21s
            | Self::F21h
            | Self::F21c
            | Self::F23x
            | Self::F22b
            | Self::F22t
            | Self::F22s
            | Self::F22c => 2,
            Self::F30t | Self::F32x | Self::F31i | Self::F31t | Self::F31c | Self::F35c
            | Self::F3rc => 3,
            Self::F45cc | Self::F4rcc => 4,
            Self::F51l => 5,
        }
    }
}

macro_rules! opcodes {
    ($(($value:literal, $name:ident, $mnemonic:literal, $format:ident)),* $(,)?) => {
        /// Every defined Dalvik opcode; gaps in the value space decode to
        /// an `UnknownOpcode` error.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($name),*
        }

        impl Opcode {
            pub fn from_u8(value: u8) -> Option<Opcode> {
                match value {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            pub fn value(self) -> u8 {
                match self {
                    $(Opcode::$name => $value),*
                }
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic),*
                }
            }

            pub fn format(self) -> InsnFormat {
                match self {
                    $(Opcode::$name => InsnFormat::$format),*
                }
            }
        }
    };
}

opcodes! {
    (0x00, Nop, "nop", F10x),
    (0x01, Move, "move", F12x),
    (0x02, MoveFrom16, "move/from16", F22x),
    (0x03, Move16, "move/16", F32x),
    (0x04, MoveWide, "move-wide", F12x),
    (0x05, MoveWideFrom16, "move-wide/from16", F22x),
    (0x06, MoveWide16, "move-wide/16", F32x),
    (0x07, MoveObject, "move-object", F12x),
    (0x08, MoveObjectFrom16, "move-object/from16", F22x),
    (0x09, MoveObject16, "move-object/16", F32x),
    (0x0a, MoveResult, "move-result", F11x),
    (0x0b, MoveResultWide, "move-result-wide", F11x),
    (0x0c, MoveResultObject, "move-result-object", F11x),
    (0x0d, MoveException, "move-exception", F11x),
    (0x0e, ReturnVoid, "return-void", F10x),
    (0x0f, Return, "return", F11x),
    (0x10, ReturnWide, "return-wide", F11x),
    (0x11, ReturnObject, "return-object", F11x),
    (0x12, Const4, "const/4", F11n),
    (0x13, Const16, "const/16", F21s),
    (0x14, Const, "const", F31i),
    (0x15, ConstHigh16, "const/high16", F21h),
    (0x16, ConstWide16, "const-wide/16", F21s),
    (0x17, ConstWide32, "const-wide/32", F31i),
    (0x18, ConstWide, "const-wide", F51l),
    (0x19, ConstWideHigh16, "const-wide/high16", F21h),
    (0x1a, ConstString, "const-string", F21c),
    (0x1b, ConstStringJumbo, "const-string/jumbo", F31c),
    (0x1c, ConstClass, "const-class", F21c),
    (0x1d, MonitorEnter, "monitor-enter", F11x),
    (0x1e, MonitorExit, "monitor-exit", F11x),
    (0x1f, CheckCast, "check-cast", F21c),
    (0x20, InstanceOf, "instance-of", F22c),
    (0x21, ArrayLength, "array-length", F12x),
    (0x22, NewInstance, "new-instance", F21c),
    (0x23, NewArray, "new-array", F22c),
    (0x24, FilledNewArray, "filled-new-array", F35c),
    (0x25, FilledNewArrayRange, "filled-new-array/range", F3rc),
    (0x26, FillArrayData, "fill-array-data", F31t),
    (0x27, Throw, "throw", F11x),
    (0x28, Goto, "goto", F10t),
    (0x29, Goto16, "goto/16", F20t),
    (0x2a, Goto32, "goto/32", F30t),
    (0x2b, PackedSwitch, "packed-switch", F31t),
    (0x2c, SparseSwitch, "sparse-switch", F31t),
    (0x2d, CmplFloat, "cmpl-float", F23x),
    (0x2e, CmpgFloat, "cmpg-float", F23x),
    (0x2f, CmplDouble, "cmpl-double", F23x),
    (0x30, CmpgDouble, "cmpg-double", F23x),
    (0x31, CmpLong, "cmp-long", F23x),
    (0x32, IfEq, "if-eq", F22t),
    (0x33, IfNe, "if-ne", F22t),
    (0x34, IfLt, "if-lt", F22t),
    (0x35, IfGe, "if-ge", F22t),
    (0x36, IfGt, "if-gt", F22t),
    (0x37, IfLe, "if-le", F22t),
    (0x38, IfEqz, "if-eqz", F21t),
    (0x39, IfNez, "if-nez", F21t),
    (0x3a, IfLtz, "if-ltz", F21t),
    (0x3b, IfGez, "if-gez", F21t),
    (0x3c, IfGtz, "if-gtz", F21t),
    (0x3d, IfLez, "if-lez", F21t),
    (0x44, Aget, "aget", F23x),
    (0x45, AgetWide, "aget-wide", F23x),
    (0x46, AgetObject, "aget-object", F23x),
    (0x47, AgetBoolean, "aget-boolean", F23x),
    (0x48, AgetByte, "aget-byte", F23x),
    (0x49, AgetChar, "aget-char", F23x),
    (0x4a, AgetShort, "aget-short", F23x),
    (0x4b, Aput, "aput", F23x),
    (0x4c, AputWide, "aput-wide", F23x),
    (0x4d, AputObject, "aput-object", F23x),
    (0x4e, AputBoolean, "aput-boolean", F23x),
    (0x4f, AputByte, "aput-byte", F23x),
    (0x50, AputChar, "aput-char", F23x),
    (0x51, AputShort, "aput-short", F23x),
    (0x52, Iget, "iget", F22c),
    (0x53, IgetWide, "iget-wide", F22c),
    (0x54, IgetObject, "iget-object", F22c),
    (0x55, IgetBoolean, "iget-boolean", F22c),
    (0x56, IgetByte, "iget-byte", F22c),
    (0x57, IgetChar, "iget-char", F22c),
    (0x58, IgetShort, "iget-short", F22c),
    (0x59, Iput, "iput", F22c),
    (0x5a, IputWide, "iput-wide", F22c),
    (0x5b, IputObject, "iput-object", F22c),
    (0x5c, IputBoolean, "iput-boolean", F22c),
    (0x5d, IputByte, "iput-byte", F22c),
    (0x5e, IputChar, "iput-char", F22c),
    (0x5f, IputShort, "iput-short", F22c),
    (0x60, Sget, "sget", F21c),
    (0x61, SgetWide, "sget-wide", F21c),
    (0x62, SgetObject, "sget-object", F21c),
    (0x63, SgetBoolean, "sget-boolean", F21c),
    (0x64, SgetByte, "sget-byte", F21c),
    (0x65, SgetChar, "sget-char", F21c),
    (0x66, SgetShort, "sget-short", F21c),
    (0x67, Sput, "sput", F21c),
    (0x68, SputWide, "sput-wide", F21c),
    (0x69, SputObject, "sput-object", F21c),
    (0x6a, SputBoolean, "sput-boolean", F21c),
    (0x6b, SputByte, "sput-byte", F21c),
    (0x6c, SputChar, "sput-char", F21c),
    (0x6d, SputShort, "sput-short", F21c),
    (0x6e, InvokeVirtual, "invoke-virtual", F35c),
    (0x6f, InvokeSuper, "invoke-super", F35c),
    (0x70, InvokeDirect, "invoke-direct", F35c),
    (0x71, InvokeStatic, "invoke-static", F35c),
    (0x72, InvokeInterface, "invoke-interface", F35c),
    (0x74, InvokeVirtualRange, "invoke-virtual/range", F3rc),
    (0x75, InvokeSuperRange, "invoke-super/range", F3rc),
    (0x76, InvokeDirectRange, "invoke-direct/range", F3rc),
    (0x77, InvokeStaticRange, "invoke-static/range", F3rc),
    (0x78, InvokeInterfaceRange, "invoke-interface/range", F3rc),
    (0x7b, NegInt, "neg-int", F12x),
    (0x7c, NotInt, "not-int", F12x),
    (0x7d, NegLong, "neg-long", F12x),
    (0x7e, NotLong, "not-long", F12x),
    (0x7f, NegFloat, "neg-float", F12x),
    (0x80, NegDouble, "neg-double", F12x),
    (0x81, IntToLong, "int-to-long", F12x),
    (0x82, IntToFloat, "int-to-float", F12x),
    (0x83, IntToDouble, "int-to-double", F12x),
    (0x84, LongToInt, "long-to-int", F12x),
    (0x85, LongToFloat, "long-to-float", F12x),
    (0x86, LongToDouble, "long-to-double", F12x),
    (0x87, FloatToInt, "float-to-int", F12x),
    (0x88, FloatToLong, "float-to-long", F12x),
    (0x89, FloatToDouble, "float-to-double", F12x),
    (0x8a, DoubleToInt, "double-to-int", F12x),
    (0x8b, DoubleToLong, "double-to-long", F12x),
    (0x8c, DoubleToFloat, "double-to-float", F12x),
    (0x8d, IntToByte, "int-to-byte", F12x),
    (0x8e, IntToChar, "int-to-char", F12x),
    (0x8f, IntToShort, "int-to-short", F12x),
    (0x90, AddInt, "add-int", F23x),
    (0x91, SubInt, "sub-int", F23x),
    (0x92, MulInt, "mul-int", F23x),
    (0x93, DivInt, "div-int", F23x),
    (0x94, RemInt, "rem-int", F23x),
    (0x95, AndInt, "and-int", F23x),
    (0x96, OrInt, "or-int", F23x),
    (0x97, XorInt, "xor-int", F23x),
    (0x98, ShlInt, "shl-int", F23x),
    (0x99, ShrInt, "shr-int", F23x),
    (0x9a, UshrInt, "ushr-int", F23x),
    (0x9b, AddLong, "add-long", F23x),
    (0x9c, SubLong, "sub-long", F23x),
    (0x9d, MulLong, "mul-long", F23x),
    (0x9e, DivLong, "div-long", F23x),
    (0x9f, RemLong, "rem-long", F23x),
    (0xa0, AndLong, "and-long", F23x),
    (0xa1, OrLong, "or-long", F23x),
    (0xa2, XorLong, "xor-long", F23x),
    (0xa3, ShlLong, "shl-long", F23x),
    (0xa4, ShrLong, "shr-long", F23x),
    (0xa5, UshrLong, "ushr-long", F23x),
    (0xa6, AddFloat, "add-float", F23x),
    (0xa7, SubFloat, "sub-float", F23x),
    (0xa8, MulFloat, "mul-float", F23x),
    (0xa9, DivFloat, "div-float", F23x),
    (0xaa, RemFloat, "rem-float", F23x),
    (0xab, AddDouble, "add-double", F23x),
    (0xac, SubDouble, "sub-double", F23x),
    (0xad, MulDouble, "mul-double", F23x),
    (0xae, DivDouble, "div-double", F23x),
    (0xaf, RemDouble, "rem-double", F23x),
    (0xb0, AddInt2addr, "add-int/2addr", F12x),
    (0xb1, SubInt2addr, "sub-int/2addr", F12x),
    (0xb2, MulInt2addr, "mul-int/2addr", F12x),
    (0xb3, DivInt2addr, "div-int/2addr", F12x),
    (0xb4, RemInt2addr, "rem-int/2addr", F12x),
    (0xb5, AndInt2addr, "and-int/2addr", F12x),
    (0xb6, OrInt2addr, "or-int/2addr", F12x),
    (0xb7, XorInt2addr, "xor-int/2addr", F12x),
    (0xb8, ShlInt2addr, "shl-int/2addr", F12x),
    (0xb9, ShrInt2addr, "shr-int/2addr", F12x),
    (0xba, UshrInt2addr, "ushr-int/2addr", F12x),
    (0xbb, AddLong2addr, "add-long/2addr", F12x),
    (0xbc, SubLong2addr, "sub-long/2addr", F12x),
    (0xbd, MulLong2addr, "mul-long/2addr", F12x),
    (0xbe, DivLong2addr, "div-long/2addr", F12x),
    (0xbf, RemLong2addr, "rem-long/2addr", F12x),
    (0xc0, AndLong2addr, "and-long/2addr", F12x),
    (0xc1, OrLong2addr, "or-long/2addr", F12x),
    (0xc2, XorLong2addr, "xor-long/2addr", F12x),
    (0xc3, ShlLong2addr, "shl-long/2addr", F12x),
    (0xc4, ShrLong2addr, "shr-long/2addr", F12x),
    (0xc5, UshrLong2addr, "ushr-long/2addr", F12x),
    (0xc6, AddFloat2addr, "add-float/2addr", F12x),
    (0xc7, SubFloat2addr, "sub-float/2addr", F12x),
    (0xc8, MulFloat2addr, "mul-float/2addr", F12x),
    (0xc9, DivFloat2addr, "div-float/2addr", F12x),
    (0xca, RemFloat2addr, "rem-float/2addr", F12x),
    (0xcb, AddDouble2addr, "add-double/2addr", F12x),
    (0xcc, SubDouble2addr, "sub-double/2addr", F12x),
    (0xcd, MulDouble2addr, "mul-double/2addr", F12x),
    (0xce, DivDouble2addr, "div-double/2addr", F12x),
    (0xcf, RemDouble2addr, "rem-double/2addr", F12x),
    (0xd0, AddIntLit16, "add-int/lit16", F22s),
    (0xd1, RsubInt, "rsub-int", F22s),
    (0xd2, MulIntLit16, "mul-int/lit16", F22s),
    (0xd3, DivIntLit16, "div-int/lit16", F22s),
    (0xd4, RemIntLit16, "rem-int/lit16", F22s),
    (0xd5, AndIntLit16, "and-int/lit16", F22s),
    (0xd6, OrIntLit16, "or-int/lit16", F22s),
    (0xd7, XorIntLit16, "xor-int/lit16", F22s),
    (0xd8, AddIntLit8, "add-int/lit8", F22b),
    (0xd9, RsubIntLit8, "rsub-int/lit8", F22b),
    (0xda, MulIntLit8, "mul-int/lit8", F22b),
    (0xdb, DivIntLit8, "div-int/lit8", F22b),
    (0xdc, RemIntLit8, "rem-int/lit8", F22b),
    (0xdd, AndIntLit8, "and-int/lit8", F22b),
    (0xde, OrIntLit8, "or-int/lit8", F22b),
    (0xdf, XorIntLit8, "xor-int/lit8", F22b),
    (0xe0, ShlIntLit8, "shl-int/lit8", F22b),
    (0xe1, ShrIntLit8, "shr-int/lit8", F22b),
    (0xe2, UshrIntLit8, "ushr-int/lit8", F22b),
    (0xfa, InvokePolymorphic, "invoke-polymorphic", F45cc),
    (0xfb, InvokePolymorphicRange, "invoke-polymorphic/range", F4rcc),
    (0xfc, InvokeCustom, "invoke-custom", F35c),
    (0xfd, InvokeCustomRange, "invoke-custom/range", F3rc),
    (0xfe, ConstMethodHandle, "const-method-handle", F21c),
    (0xff, ConstMethodType, "const-method-type", F21c),
}

impl Opcode {
    /// True for every `invoke-*` form.
    pub fn is_invoke(self) -> bool {
        matches!(
            self,
            Opcode::InvokeVirtual
                | Opcode::InvokeSuper
                | Opcode::InvokeDirect
                | Opcode::InvokeStatic
                | Opcode::InvokeInterface
                | Opcode::InvokeVirtualRange
                | Opcode::InvokeSuperRange
                | Opcode::InvokeDirectRange
                | Opcode::InvokeStaticRange
                | Opcode::InvokeInterfaceRange
                | Opcode::InvokePolymorphic
                | Opcode::InvokePolymorphicRange
                | Opcode::InvokeCustom
                | Opcode::InvokeCustomRange
        )
    }

    /// True when execution cannot continue past this instruction.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::ReturnVoid
                | Opcode::Return
                | Opcode::ReturnWide
                | Opcode::ReturnObject
                | Opcode::Throw
                | Opcode::Goto
                | Opcode::Goto16
                | Opcode::Goto32
        )
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_round_trip() {
        for value in 0u8..=255 {
            if let Some(op) = Opcode::from_u8(value) {
                assert_eq!(op.value(), value);
            }
        }
    }

    #[test]
    fn unused_gaps_are_unknown() {
        for value in [0x3eu8, 0x43, 0x73, 0x79, 0x7a, 0xe3, 0xf9] {
            assert!(Opcode::from_u8(value).is_none(), "{value:#x}");
        }
    }

    #[test]
    fn formats_match_reference_rows() {
        assert_eq!(Opcode::Nop.format(), InsnFormat::F10x);
        assert_eq!(Opcode::Const4.format(), InsnFormat::F11n);
        assert_eq!(Opcode::ConstWide.format().units(), 5);
        assert_eq!(Opcode::InvokeVirtual.format(), InsnFormat::F35c);
        assert_eq!(Opcode::InvokePolymorphic.format().units(), 4);
        assert_eq!(Opcode::PackedSwitch.format(), InsnFormat::F31t);
    }
}
