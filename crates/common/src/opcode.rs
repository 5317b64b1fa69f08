//! Opcode definitions for the quill instruction set.
//!
//! An instruction is one opcode byte followed by zero, one or two operands
//! of fixed width. Opcodes are numbered densely from `0x00` (`DONE`); every
//! byte above the last assigned opcode is rejected by the decoder.

/// Encoded width and signedness of one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// Unsigned byte.
    U1,
    /// Signed byte.
    I1,
    /// Unsigned 32-bit little-endian.
    U4,
    /// Signed 32-bit little-endian.
    I4,
}

impl OperandKind {
    /// Encoded size in bytes.
    pub fn width(self) -> usize {
        match self {
            OperandKind::U1 | OperandKind::I1 => 1,
            OperandKind::U4 | OperandKind::I4 => 4,
        }
    }

    /// Whether `value` can be encoded in this operand.
    pub fn fits(self, value: i64) -> bool {
        match self {
            OperandKind::U1 => (0..=u8::MAX as i64).contains(&value),
            OperandKind::I1 => (i8::MIN as i64..=i8::MAX as i64).contains(&value),
            OperandKind::U4 => (0..=u32::MAX as i64).contains(&value),
            OperandKind::I4 => (i32::MIN as i64..=i32::MAX as i64).contains(&value),
        }
    }
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $byte:literal, $mnemonic:literal, [$($operand:ident),*]; )*) => {
        /// Identifies the operation to perform.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $byte, )*
        }

        /// All opcodes, in byte order.
        pub const ALL_OPCODES: &[Opcode] = &[ $( Opcode::$name, )* ];

        impl Opcode {
            /// Decode an opcode byte.
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $( $byte => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Assembly mnemonic (always upper case).
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Operand layout following the opcode byte.
            pub fn operands(&self) -> &'static [OperandKind] {
                match self {
                    $( Opcode::$name => &[$(OperandKind::$operand),*], )*
                }
            }
        }
    };
}

opcodes! {
    // Control
    /// Pop the frame result and finish the frame.
    Done = 0x00, "DONE", [];

    // Stack
    /// Push a literal (1-byte index).
    Push1 = 0x01, "PUSH1", [U1];
    /// Push a literal (4-byte index).
    Push4 = 0x02, "PUSH4", [U4];
    Pop = 0x03, "POP", [];
    Dup = 0x04, "DUP", [];
    /// Push a copy of the value `n` slots below the top.
    Over = 0x05, "OVER", [U4];
    /// Concatenate the top `n` values as strings.
    Concat1 = 0x06, "CONCAT1", [U1];

    // Invocation
    /// Invoke a command; `argc` values on the stack, name first.
    InvokeStk1 = 0x07, "INVOKE_STK1", [U1];
    InvokeStk4 = 0x08, "INVOKE_STK4", [U4];

    // Loads
    LoadScalar1 = 0x09, "LOAD_SCALAR1", [U1];
    LoadScalar4 = 0x0a, "LOAD_SCALAR4", [U4];
    LoadScalarStk = 0x0b, "LOAD_SCALAR_STK", [];
    LoadArray1 = 0x0c, "LOAD_ARRAY1", [U1];
    LoadArray4 = 0x0d, "LOAD_ARRAY4", [U4];
    LoadArrayStk = 0x0e, "LOAD_ARRAY_STK", [];
    /// Load a variable named on the stack; accepts `name(index)`.
    LoadStk = 0x0f, "LOAD_STK", [];

    // Stores
    StoreScalar1 = 0x10, "STORE_SCALAR1", [U1];
    StoreScalar4 = 0x11, "STORE_SCALAR4", [U4];
    StoreScalarStk = 0x12, "STORE_SCALAR_STK", [];
    StoreArray1 = 0x13, "STORE_ARRAY1", [U1];
    StoreArray4 = 0x14, "STORE_ARRAY4", [U4];
    StoreArrayStk = 0x15, "STORE_ARRAY_STK", [];
    StoreStk = 0x16, "STORE_STK", [];

    // Increments
    IncrScalar1 = 0x17, "INCR_SCALAR1", [U1];
    IncrScalarStk = 0x18, "INCR_SCALAR_STK", [];
    IncrScalar1Imm = 0x19, "INCR_SCALAR1_IMM", [U1, I1];
    IncrScalarStkImm = 0x1a, "INCR_SCALAR_STK_IMM", [I1];
    IncrArray1 = 0x1b, "INCR_ARRAY1", [U1];
    IncrArrayStk = 0x1c, "INCR_ARRAY_STK", [];
    IncrArray1Imm = 0x1d, "INCR_ARRAY1_IMM", [U1, I1];
    IncrArrayStkImm = 0x1e, "INCR_ARRAY_STK_IMM", [I1];

    // Appends
    AppendScalar1 = 0x1f, "APPEND_SCALAR1", [U1];
    AppendScalar4 = 0x20, "APPEND_SCALAR4", [U4];
    AppendArray1 = 0x21, "APPEND_ARRAY1", [U1];
    AppendStk = 0x22, "APPEND_STK", [];
    LappendScalar1 = 0x23, "LAPPEND_SCALAR1", [U1];
    LappendScalar4 = 0x24, "LAPPEND_SCALAR4", [U4];
    LappendArray1 = 0x25, "LAPPEND_ARRAY1", [U1];
    LappendStk = 0x26, "LAPPEND_STK", [];

    // Jumps (offsets relative to the jump instruction)
    Jump1 = 0x27, "JUMP1", [I1];
    Jump4 = 0x28, "JUMP4", [I4];
    JumpTrue1 = 0x29, "JUMP_TRUE1", [I1];
    JumpTrue4 = 0x2a, "JUMP_TRUE4", [I4];
    JumpFalse1 = 0x2b, "JUMP_FALSE1", [I1];
    JumpFalse4 = 0x2c, "JUMP_FALSE4", [I4];

    // Operators
    Lor = 0x2d, "LOR", [];
    Land = 0x2e, "LAND", [];
    Bitor = 0x2f, "BITOR", [];
    Bitxor = 0x30, "BITXOR", [];
    Bitand = 0x31, "BITAND", [];
    Eq = 0x32, "EQ", [];
    Neq = 0x33, "NEQ", [];
    Lt = 0x34, "LT", [];
    Gt = 0x35, "GT", [];
    Le = 0x36, "LE", [];
    Ge = 0x37, "GE", [];
    Lshift = 0x38, "LSHIFT", [];
    Rshift = 0x39, "RSHIFT", [];
    Add = 0x3a, "ADD", [];
    Sub = 0x3b, "SUB", [];
    Mult = 0x3c, "MULT", [];
    Div = 0x3d, "DIV", [];
    Mod = 0x3e, "MOD", [];
    Uplus = 0x3f, "UPLUS", [];
    Uminus = 0x40, "UMINUS", [];
    Bitnot = 0x41, "BITNOT", [];
    Not = 0x42, "NOT", [];

    // Math functions
    /// Call a built-in math function by table index.
    CallBuiltinFunc1 = 0x43, "CALL_BUILTIN_FUNC1", [U1];
    /// Call a math function by name; operand counts the name.
    CallFunc1 = 0x44, "CALL_FUNC1", [U1];
    TryCvtToNumeric = 0x45, "TRY_CVT_TO_NUMERIC", [];

    // Loops
    Break = 0x46, "BREAK", [];
    Continue = 0x47, "CONTINUE", [];
    ForeachStart4 = 0x48, "FOREACH_START4", [U4];
    ForeachStep4 = 0x49, "FOREACH_STEP4", [U4];

    // Catch
    BeginCatch4 = 0x4a, "BEGIN_CATCH4", [U4];
    EndCatch = 0x4b, "END_CATCH", [];
    PushResult = 0x4c, "PUSH_RESULT", [];
    PushReturnCode = 0x4d, "PUSH_RETURN_CODE", [];

    // Strings
    StrEq = 0x4e, "STR_EQ", [];
    StrNeq = 0x4f, "STR_NEQ", [];
    StrCmp = 0x50, "STR_CMP", [];
    StrLen = 0x51, "STR_LEN", [];
    StrIndex = 0x52, "STR_INDEX", [];

    // Lists
    List = 0x53, "LIST", [U4];
    ListLength = 0x54, "LIST_LENGTH", [];
    ListIndex = 0x55, "LIST_INDEX", [];

    /// Pop a value and raise the return completion code with it.
    Return = 0x56, "RETURN", [];
}

impl Opcode {
    /// Encoded length of an instruction with this opcode.
    pub fn encoded_len(&self) -> usize {
        1 + self.operands().iter().map(|k| k.width()).sum::<usize>()
    }

    /// Whether the first operand is a relative jump offset.
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Opcode::Jump1
                | Opcode::Jump4
                | Opcode::JumpTrue1
                | Opcode::JumpTrue4
                | Opcode::JumpFalse1
                | Opcode::JumpFalse4
        )
    }

    /// Whether control never falls through to the next instruction.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Opcode::Done
                | Opcode::Jump1
                | Opcode::Jump4
                | Opcode::Break
                | Opcode::Continue
                | Opcode::Return
        )
    }

    /// Whether the first operand is a local variable slot.
    pub fn takes_local_slot(&self) -> bool {
        use Opcode::*;
        matches!(
            self,
            LoadScalar1
                | LoadScalar4
                | LoadArray1
                | LoadArray4
                | StoreScalar1
                | StoreScalar4
                | StoreArray1
                | StoreArray4
                | IncrScalar1
                | IncrScalar1Imm
                | IncrArray1
                | IncrArray1Imm
                | AppendScalar1
                | AppendScalar4
                | AppendArray1
                | LappendScalar1
                | LappendScalar4
                | LappendArray1
        )
    }

    /// Look up an opcode by mnemonic, case-insensitively.
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        ALL_OPCODES
            .iter()
            .copied()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(name))
    }
}
