//! Fixed vocabulary of the DC language.

use std::fmt;

/// Words that start a top-level declaration.
pub const DECLARATION_KEYWORDS: [&str; 6] = ["dclass", "struct", "typedef", "keyword", "from", "import"];

/// Operators allowed in inline type modifiers such as `int16/10` or `uint16%360`.
pub const OPERATORS: [char; 5] = ['%', '*', '+', '-', '/'];

/// Primitive wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float64,
    String,
    Blob,
}

impl Primitive {
    pub const ALL: [Primitive; 12] = [
        Primitive::Char,
        Primitive::Int8,
        Primitive::Int16,
        Primitive::Int32,
        Primitive::Int64,
        Primitive::UInt8,
        Primitive::UInt16,
        Primitive::UInt32,
        Primitive::UInt64,
        Primitive::Float64,
        Primitive::String,
        Primitive::Blob,
    ];

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == token)
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Char => "char",
            Primitive::Int8 => "int8",
            Primitive::Int16 => "int16",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::UInt8 => "uint8",
            Primitive::UInt16 => "uint16",
            Primitive::UInt32 => "uint32",
            Primitive::UInt64 => "uint64",
            Primitive::Float64 => "float64",
            Primitive::String => "string",
            Primitive::Blob => "blob",
        }
    }

    /// Encoded size in bytes, or `None` for length-prefixed types.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Primitive::Char | Primitive::Int8 | Primitive::UInt8 => Some(1),
            Primitive::Int16 | Primitive::UInt16 => Some(2),
            Primitive::Int32 | Primitive::UInt32 => Some(4),
            Primitive::Int64 | Primitive::UInt64 | Primitive::Float64 => Some(8),
            Primitive::String | Primitive::Blob => None,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Primitive::Int8
                | Primitive::Int16
                | Primitive::Int32
                | Primitive::Int64
                | Primitive::UInt8
                | Primitive::UInt16
                | Primitive::UInt32
                | Primitive::UInt64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Primitive::Int8 | Primitive::Int16 | Primitive::Int32 | Primitive::Int64
        )
    }

    /// Type code used by the legacy DC hash.
    pub fn legacy_code(self) -> u32 {
        match self {
            Primitive::Int8 => 0,
            Primitive::Int16 => 1,
            Primitive::Int32 => 2,
            Primitive::Int64 => 3,
            Primitive::UInt8 => 4,
            Primitive::UInt16 => 5,
            Primitive::UInt32 => 6,
            Primitive::UInt64 => 7,
            Primitive::Float64 => 8,
            Primitive::String => 9,
            Primitive::Blob => 10,
            Primitive::Char => 19,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Field keywords controlling replication and authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Keyword {
    Required,
    Broadcast,
    OwnRecv,
    Ram,
    Db,
    ClSend,
    ClRecv,
    OwnSend,
    AiRecv,
    /// Declared at the top of the file with `keyword <name>;`.
    Custom(String),
}

impl Keyword {
    pub const BUILTIN: [Keyword; 9] = [
        Keyword::Required,
        Keyword::Broadcast,
        Keyword::OwnRecv,
        Keyword::Ram,
        Keyword::Db,
        Keyword::ClSend,
        Keyword::ClRecv,
        Keyword::OwnSend,
        Keyword::AiRecv,
    ];

    pub fn builtin(token: &str) -> Option<Self> {
        Self::BUILTIN.into_iter().find(|k| k.name() == token)
    }

    pub fn name(&self) -> &str {
        match self {
            Keyword::Required => "required",
            Keyword::Broadcast => "broadcast",
            Keyword::OwnRecv => "ownrecv",
            Keyword::Ram => "ram",
            Keyword::Db => "db",
            Keyword::ClSend => "clsend",
            Keyword::ClRecv => "clrecv",
            Keyword::OwnSend => "ownsend",
            Keyword::AiRecv => "airecv",
            Keyword::Custom(name) => name,
        }
    }

    /// Bit used for this keyword by the legacy DC hash; custom keywords have none.
    pub fn legacy_flag(&self) -> u32 {
        match self {
            Keyword::Required => 0x0001,
            Keyword::Broadcast => 0x0002,
            Keyword::OwnRecv => 0x0004,
            Keyword::Ram => 0x0008,
            Keyword::Db => 0x0010,
            Keyword::ClSend => 0x0020,
            Keyword::ClRecv => 0x0040,
            Keyword::OwnSend => 0x0080,
            Keyword::AiRecv => 0x0100,
            Keyword::Custom(_) => 0,
        }
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `word` belongs to any reserved vocabulary of the language.
pub fn is_reserved(word: &str) -> bool {
    DECLARATION_KEYWORDS.contains(&word)
        || Primitive::from_token(word).is_some()
        || Keyword::builtin(word).is_some()
}

/// Whether `word` can name a class, struct, typedef or field.
pub fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_reserved(word)
}
