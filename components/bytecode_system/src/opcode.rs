//! Bytecode opcodes for the stack VM
//!
//! Every opcode occupies the first byte of a 4-byte instruction record.
//! The byte values are part of the encoding and must not change.

use std::fmt;

/// How the 24-bit operand of an opcode is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// Operand is ignored (encoded as zero)
    None,
    /// Index into the frame's local slots
    Local,
    /// Index into the module's integer constants
    IntConstant,
    /// Index into the module's float constants
    FloatConstant,
    /// Index into the module's function table
    Function,
    /// Array element type tag
    ElementType,
    /// Signed displacement, in instructions, from the jump's own address
    RelativeJump,
}

macro_rules! opcodes {
    ($( $(#[$doc:meta])* $name:ident = $byte:literal, $mnemonic:literal, $kind:ident; )*) => {
        /// Bytecode opcodes
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $( $(#[$doc])* $name = $byte, )*
        }

        impl Opcode {
            /// Every opcode in encoding order
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Decode an opcode byte
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $( $byte => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// Assembly mnemonic
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Interpretation of the operand field
            pub fn operand_kind(self) -> OperandKind {
                match self {
                    $( Opcode::$name => OperandKind::$kind, )*
                }
            }
        }
    };
}

opcodes! {
    // Stack manipulation
    /// No operation
    Nop = 0x00, "NOP", None;
    /// Discard the top of stack
    Pop = 0x01, "POP", None;
    /// Duplicate the top of stack
    Dup = 0x02, "DUP", None;
    /// Pop a value and append it to the program output
    Print = 0x03, "PRINT", None;

    // Constants
    /// Push an integer constant
    PushInt = 0x10, "PUSH_INT", IntConstant;
    /// Push a float constant
    PushFloat = 0x11, "PUSH_FLOAT", FloatConstant;
    /// Push `true`
    PushTrue = 0x12, "PUSH_TRUE", None;
    /// Push `false`
    PushFalse = 0x13, "PUSH_FALSE", None;

    // Locals
    /// Push a copy of a local slot
    LoadLocal = 0x20, "LOAD_LOCAL", Local;
    /// Pop into a local slot
    StoreLocal = 0x21, "STORE_LOCAL", Local;
    /// Increment an integer local in place
    IncLocal = 0x22, "INC_LOCAL", Local;
    /// Decrement an integer local in place
    DecLocal = 0x23, "DEC_LOCAL", Local;

    // Integer arithmetic
    /// Integer addition
    AddInt = 0x30, "ADD_INT", None;
    /// Integer subtraction
    SubInt = 0x31, "SUB_INT", None;
    /// Integer multiplication
    MulInt = 0x32, "MUL_INT", None;
    /// Integer division
    DivInt = 0x33, "DIV_INT", None;
    /// Integer remainder
    ModInt = 0x34, "MOD_INT", None;
    /// Integer negation
    NegInt = 0x35, "NEG_INT", None;

    // Float arithmetic
    /// Float addition
    AddFloat = 0x38, "ADD_FLOAT", None;
    /// Float subtraction
    SubFloat = 0x39, "SUB_FLOAT", None;
    /// Float multiplication
    MulFloat = 0x3a, "MUL_FLOAT", None;
    /// Float division
    DivFloat = 0x3b, "DIV_FLOAT", None;
    /// Float negation
    NegFloat = 0x3c, "NEG_FLOAT", None;

    // Conversions and logic
    /// Convert int to float
    IntToFloat = 0x40, "INT_TO_FLOAT", None;
    /// Truncate float to int
    FloatToInt = 0x41, "FLOAT_TO_INT", None;
    /// Boolean negation
    Not = 0x42, "NOT", None;

    // Comparisons
    /// Integer equality
    EqInt = 0x50, "EQ_INT", None;
    /// Integer inequality
    NeInt = 0x51, "NE_INT", None;
    /// Integer less-than
    LtInt = 0x52, "LT_INT", None;
    /// Integer less-or-equal
    LeInt = 0x53, "LE_INT", None;
    /// Integer greater-than
    GtInt = 0x54, "GT_INT", None;
    /// Integer greater-or-equal
    GeInt = 0x55, "GE_INT", None;
    /// Float equality
    EqFloat = 0x58, "EQ_FLOAT", None;
    /// Float inequality
    NeFloat = 0x59, "NE_FLOAT", None;
    /// Float less-than
    LtFloat = 0x5a, "LT_FLOAT", None;
    /// Float less-or-equal
    LeFloat = 0x5b, "LE_FLOAT", None;
    /// Float greater-than
    GtFloat = 0x5c, "GT_FLOAT", None;
    /// Float greater-or-equal
    GeFloat = 0x5d, "GE_FLOAT", None;

    // Control flow
    /// Unconditional relative jump
    Jump = 0x60, "JUMP", RelativeJump;
    /// Pop a bool and jump if true
    JumpIfTrue = 0x61, "JUMP_IF_TRUE", RelativeJump;
    /// Pop a bool and jump if false
    JumpIfFalse = 0x62, "JUMP_IF_FALSE", RelativeJump;

    // Arrays
    /// Pop a length and push a new array of the operand's element type
    NewArray = 0x70, "NEW_ARRAY", ElementType;
    /// Pop index and array, push the element
    ArrayLoad = 0x71, "ARRAY_LOAD", None;
    /// Pop value, index and array, store the element
    ArrayStore = 0x72, "ARRAY_STORE", None;
    /// Pop an array, push its length
    ArrayLength = 0x73, "ARRAY_LENGTH", None;

    // Calls
    /// Call a function by table index
    Call = 0x80, "CALL", Function;
    /// Return the top of stack to the caller
    Return = 0x81, "RETURN", None;
    /// Return without a value
    ReturnVoid = 0x82, "RETURN_VOID", None;
}

impl Opcode {
    /// The encoded byte
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Whether the operand is a relative jump offset
    pub fn is_jump(self) -> bool {
        self.operand_kind() == OperandKind::RelativeJump
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
