//! Schema-driven field values.
//!
//! A [`Value`] is packed according to the [`DataType`] it is declared with,
//! so the same integer goes out as one byte for a `uint8` field and eight for
//! a `int64` one. Variable arrays carry a `u16` byte-length prefix; fixed
//! arrays carry none.

use std::fmt;

use astron_dc::{ArrayLength, AtomicField, DataType, Field, Primitive, Schema};
use astron_net::{Datagram, DatagramError, DatagramIterator, IntWidth};

use crate::error::RepositoryError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i128),
    Float(f64),
    Char(char),
    String(String),
    Blob(Vec<u8>),
    Array(Vec<Value>),
    /// Struct members in declaration order.
    Struct(Vec<Value>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::String(_) => "string",
            Value::Blob(_) => "blob",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Char(c) => write!(f, "'{c}'"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Array(items) | Value::Struct(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! int_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Int(i128::from(v))
            }
        })*
    };
}

int_value!(u8, u16, u32, u64, i8, i16, i32, i64);

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

fn mismatch(expected: &DataType, found: &Value) -> RepositoryError {
    RepositoryError::ValueMismatch {
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

fn int_width(primitive: Primitive) -> Option<IntWidth> {
    match primitive {
        Primitive::Int8 | Primitive::UInt8 => Some(IntWidth::W8),
        Primitive::Int16 | Primitive::UInt16 => Some(IntWidth::W16),
        Primitive::Int32 | Primitive::UInt32 => Some(IntWidth::W32),
        Primitive::Int64 | Primitive::UInt64 => Some(IntWidth::W64),
        _ => None,
    }
}

/// Range of a declared integer type; narrower than what `add_int` accepts.
fn int_bounds(primitive: Primitive, width: IntWidth) -> (i128, i128) {
    let bits = width.bits();
    if primitive.is_signed() {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    }
}

fn struct_members<'s>(schema: &'s Schema, name: &str) -> Result<Vec<&'s AtomicField>, RepositoryError> {
    let def = schema
        .struct_def(name)
        .ok_or_else(|| RepositoryError::StructNotFound(name.to_string()))?;
    Ok(def
        .fields
        .iter()
        .filter_map(|f| match f {
            Field::Atomic(a) => Some(a),
            _ => None,
        })
        .collect())
}

/// Append `value` encoded as `data_type`.
pub fn pack_value(
    dg: &mut Datagram,
    schema: &Schema,
    data_type: &DataType,
    value: &Value,
) -> Result<(), RepositoryError> {
    match (data_type, value) {
        (DataType::Primitive(p), Value::Int(v)) if p.is_integer() => {
            let width = int_width(*p).ok_or_else(|| mismatch(data_type, value))?;
            let (min, max) = int_bounds(*p, width);
            if *v < min || *v > max {
                return Err(DatagramError::IntOutOfRange {
                    value: *v,
                    bits: width.bits(),
                }
                .into());
            }
            dg.add_int(width, *v)?;
        }
        (DataType::Primitive(Primitive::Float64), Value::Float(v)) => dg.add_f64(*v),
        (DataType::Primitive(Primitive::Float64), Value::Int(v)) => dg.add_f64(*v as f64),
        (DataType::Primitive(Primitive::Char), Value::Char(c)) => {
            dg.add_char(c.encode_utf8(&mut [0; 4]))?
        }
        (DataType::Primitive(Primitive::String), Value::String(s)) => dg.add_string(s)?,
        (DataType::Primitive(Primitive::Blob), Value::Blob(b)) => dg.add_blob(b)?,
        (DataType::Primitive(Primitive::Blob), Value::String(s)) => dg.add_blob(s.as_bytes())?,
        (DataType::Struct(name), Value::Struct(items)) => {
            let members = struct_members(schema, name)?;
            if members.len() != items.len() {
                return Err(RepositoryError::ValueMismatch {
                    expected: format!("{} members of {name}", members.len()),
                    found: format!("{} values", items.len()),
                });
            }
            for (member, item) in members.iter().zip(items) {
                pack_value(dg, schema, &member.data_type, item)?;
            }
        }
        (DataType::Array { element, length }, Value::Array(items)) => match length {
            ArrayLength::Fixed(n) => {
                if items.len() != usize::from(*n) {
                    return Err(RepositoryError::ValueMismatch {
                        expected: data_type.to_string(),
                        found: format!("{} elements", items.len()),
                    });
                }
                for item in items {
                    pack_value(dg, schema, element, item)?;
                }
            }
            ArrayLength::Variable => {
                let mut body = Datagram::new();
                for item in items {
                    pack_value(&mut body, schema, element, item)?;
                }
                dg.add_blob(body.as_bytes())?;
            }
        },
        _ => return Err(mismatch(data_type, value)),
    }
    Ok(())
}

/// Read one value of `data_type`.
pub fn unpack_value(
    iter: &mut DatagramIterator<'_>,
    schema: &Schema,
    data_type: &DataType,
) -> Result<Value, RepositoryError> {
    let value = match data_type {
        DataType::Primitive(p) => match p {
            Primitive::Int8 => Value::Int(iter.read_i8()?.into()),
            Primitive::Int16 => Value::Int(iter.read_i16()?.into()),
            Primitive::Int32 => Value::Int(iter.read_i32()?.into()),
            Primitive::Int64 => Value::Int(iter.read_i64()?.into()),
            Primitive::UInt8 => Value::Int(iter.read_u8()?.into()),
            Primitive::UInt16 => Value::Int(iter.read_u16()?.into()),
            Primitive::UInt32 => Value::Int(iter.read_u32()?.into()),
            Primitive::UInt64 => Value::Int(iter.read_u64()?.into()),
            Primitive::Float64 => Value::Float(iter.read_f64()?),
            Primitive::Char => Value::Char(iter.read_char()?),
            Primitive::String => Value::String(iter.read_string()?),
            Primitive::Blob => Value::Blob(iter.read_blob()?),
        },
        DataType::Struct(name) => {
            let members = struct_members(schema, name)?;
            let mut items = Vec::with_capacity(members.len());
            for member in members {
                items.push(unpack_value(iter, schema, &member.data_type)?);
            }
            Value::Struct(items)
        }
        DataType::Array { element, length } => match length {
            ArrayLength::Fixed(n) => {
                let mut items = Vec::with_capacity(usize::from(*n));
                for _ in 0..*n {
                    items.push(unpack_value(iter, schema, element)?);
                }
                Value::Array(items)
            }
            ArrayLength::Variable => {
                let len = usize::from(iter.read_u16()?);
                let mut body = DatagramIterator::new(iter.read_data(len)?);
                let mut items = Vec::new();
                while body.remaining() > 0 {
                    let start = body.tell();
                    items.push(unpack_value(&mut body, schema, element)?);
                    if body.tell() == start {
                        return Err(RepositoryError::ValueMismatch {
                            expected: format!("{element} elements that occupy bytes"),
                            found: format!("{} unread array bytes", body.remaining()),
                        });
                    }
                }
                Value::Array(items)
            }
        },
    };
    Ok(value)
}

/// Advance past one value of `data_type` without decoding it.
pub fn skip_value(
    iter: &mut DatagramIterator<'_>,
    schema: &Schema,
    data_type: &DataType,
) -> Result<(), RepositoryError> {
    match data_type {
        DataType::Primitive(p) => match p.fixed_size() {
            Some(size) => iter.skip(size)?,
            None => {
                let len = usize::from(iter.read_u16()?);
                iter.skip(len)?;
            }
        },
        DataType::Struct(name) => {
            for member in struct_members(schema, name)? {
                skip_value(iter, schema, &member.data_type)?;
            }
        }
        DataType::Array {
            element,
            length: ArrayLength::Fixed(n),
        } => {
            for _ in 0..*n {
                skip_value(iter, schema, element)?;
            }
        }
        DataType::Array {
            length: ArrayLength::Variable,
            ..
        } => {
            let len = usize::from(iter.read_u16()?);
            iter.skip(len)?;
        }
    }
    Ok(())
}

/// Append the arguments of `field`, one value per parameter.
pub fn pack_field(
    dg: &mut Datagram,
    schema: &Schema,
    field: &Field,
    values: &[Value],
) -> Result<(), RepositoryError> {
    let types = field.parameter_types();
    if types.len() != values.len() {
        return Err(RepositoryError::ValueMismatch {
            expected: format!("{} arguments for {}", types.len(), field.name()),
            found: format!("{} values", values.len()),
        });
    }
    for (data_type, value) in types.into_iter().zip(values) {
        pack_value(dg, schema, data_type, value)?;
    }
    Ok(())
}

pub fn unpack_field(
    iter: &mut DatagramIterator<'_>,
    schema: &Schema,
    field: &Field,
) -> Result<Vec<Value>, RepositoryError> {
    field
        .parameter_types()
        .into_iter()
        .map(|t| unpack_value(iter, schema, t))
        .collect()
}

/// Consume the encoded arguments of `field` and return them as a raw span.
pub fn field_bytes<'a>(
    iter: &mut DatagramIterator<'a>,
    schema: &Schema,
    field: &Field,
) -> Result<&'a [u8], RepositoryError> {
    let mut probe = iter.clone();
    for data_type in field.parameter_types() {
        skip_value(&mut probe, schema, data_type)?;
    }
    let len = probe.tell() - iter.tell();
    Ok(iter.read_data(len)?)
}

/// Arguments used when a field is created without explicit values: its
/// declared default if any, else zeroes and empty strings.
pub fn default_values(schema: &Schema, field: &Field) -> Result<Vec<Value>, RepositoryError> {
    if let Field::Atomic(AtomicField {
        default: Some(literal),
        data_type,
        ..
    }) = field
    {
        return Ok(vec![parse_literal(literal, data_type)?]);
    }
    field
        .parameter_types()
        .into_iter()
        .map(|t| zero_value(schema, t))
        .collect()
}

fn zero_value(schema: &Schema, data_type: &DataType) -> Result<Value, RepositoryError> {
    Ok(match data_type {
        DataType::Primitive(Primitive::Float64) => Value::Float(0.0),
        DataType::Primitive(Primitive::Char) => Value::Char('\0'),
        DataType::Primitive(Primitive::String) => Value::String(String::new()),
        DataType::Primitive(Primitive::Blob) => Value::Blob(Vec::new()),
        DataType::Primitive(_) => Value::Int(0),
        DataType::Struct(name) => Value::Struct(
            struct_members(schema, name)?
                .into_iter()
                .map(|m| zero_value(schema, &m.data_type))
                .collect::<Result<_, _>>()?,
        ),
        DataType::Array {
            element,
            length: ArrayLength::Fixed(n),
        } => Value::Array(
            (0..*n)
                .map(|_| zero_value(schema, element))
                .collect::<Result<_, _>>()?,
        ),
        DataType::Array { .. } => Value::Array(Vec::new()),
    })
}

fn parse_literal(literal: &str, data_type: &DataType) -> Result<Value, RepositoryError> {
    let unquoted = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| literal.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
    let bad = || RepositoryError::ValueMismatch {
        expected: data_type.to_string(),
        found: literal.to_string(),
    };
    match data_type {
        DataType::Primitive(p) if p.is_integer() => {
            let parsed = match literal.strip_prefix("0x") {
                Some(hex) => i128::from_str_radix(hex, 16),
                None => literal.parse::<i128>(),
            };
            parsed.map(Value::Int).map_err(|_| bad())
        }
        DataType::Primitive(Primitive::Float64) => {
            literal.parse::<f64>().map(Value::Float).map_err(|_| bad())
        }
        DataType::Primitive(Primitive::Char) => {
            let mut chars = unquoted.unwrap_or(literal).chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(bad()),
            }
        }
        DataType::Primitive(Primitive::String) => {
            Ok(Value::String(unquoted.unwrap_or(literal).to_string()))
        }
        DataType::Primitive(Primitive::Blob) => {
            Ok(Value::Blob(unquoted.unwrap_or(literal).as_bytes().to_vec()))
        }
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astron_dc::parse_str;

    const DC: &str = "\
struct Color {
    uint8 r;
    uint8 g;
    uint8 b;
};

dclass Avatar {
    string name = \"nobody\" required broadcast;
    uint16 hp = 100 required;
    int16 temperature;
    Color tint;
    uint8 scores[];
    uint32 slots[3];
    setPos(int16 x, int16 y, float64 h) broadcast;
};
";

    fn schema() -> Schema {
        parse_str(DC).unwrap()
    }

    fn field<'a>(schema: &'a Schema, name: &str) -> &'a Field {
        schema.class("Avatar").unwrap().field(name).unwrap()
    }

    #[test]
    fn test_integer_width_follows_declaration() {
        let schema = schema();
        let mut dg = Datagram::new();
        pack_field(&mut dg, &schema, field(&schema, "hp"), &[Value::Int(300)]).unwrap();
        assert_eq!(dg.as_bytes(), &300u16.to_le_bytes());
    }

    #[test]
    fn test_unsigned_field_rejects_negative() {
        let schema = schema();
        let mut dg = Datagram::new();
        let err = pack_field(&mut dg, &schema, field(&schema, "hp"), &[Value::Int(-1)]).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Datagram(DatagramError::IntOutOfRange { value: -1, bits: 16 })
        ));
        assert!(dg.is_empty());
    }

    #[test]
    fn test_signed_field_rejects_unsigned_max() {
        let schema = schema();
        let mut dg = Datagram::new();
        let temp = field(&schema, "temperature");
        assert!(pack_field(&mut dg, &schema, temp, &[Value::Int(-32768)]).is_ok());
        assert!(pack_field(&mut dg, &schema, temp, &[Value::Int(40000)]).is_err());
    }

    #[test]
    fn test_struct_value_layout() {
        let schema = schema();
        let mut dg = Datagram::new();
        let tint = Value::Struct(vec![1u8.into(), 2u8.into(), 3u8.into()]);
        pack_field(&mut dg, &schema, field(&schema, "tint"), &[tint.clone()]).unwrap();
        assert_eq!(dg.as_bytes(), &[1, 2, 3]);
        let mut iter = dg.iter();
        assert_eq!(unpack_field(&mut iter, &schema, field(&schema, "tint")).unwrap(), vec![tint]);
    }

    #[test]
    fn test_variable_array_has_byte_length_prefix() {
        let schema = schema();
        let mut dg = Datagram::new();
        let scores = Value::Array(vec![7u8.into(), 8u8.into()]);
        pack_field(&mut dg, &schema, field(&schema, "scores"), &[scores]).unwrap();
        assert_eq!(dg.as_bytes(), &[2, 0, 7, 8]);
    }

    #[test]
    fn test_variable_array_of_empty_structs_is_rejected() {
        let schema = parse_str("struct Empty {\n};\n\ndclass Crate {\n    Empty slots[];\n};\n").unwrap();
        let slots = schema.class("Crate").unwrap().field("slots").unwrap();
        let mut iter = DatagramIterator::new(&[1, 0, 7]);
        assert!(matches!(
            unpack_field(&mut iter, &schema, slots),
            Err(RepositoryError::ValueMismatch { .. })
        ));

        let mut empty = DatagramIterator::new(&[0, 0]);
        assert_eq!(
            unpack_field(&mut empty, &schema, slots).unwrap(),
            vec![Value::Array(Vec::new())]
        );
    }

    #[test]
    fn test_fixed_array_has_no_prefix() {
        let schema = schema();
        let slots = field(&schema, "slots");
        let mut dg = Datagram::new();
        let value = Value::Array(vec![1u32.into(), 2u32.into(), 3u32.into()]);
        pack_field(&mut dg, &schema, slots, &[value.clone()]).unwrap();
        assert_eq!(dg.len(), 12);
        assert_eq!(unpack_field(&mut dg.iter(), &schema, slots).unwrap(), vec![value]);

        let short = Value::Array(vec![1u32.into()]);
        assert!(pack_field(&mut Datagram::new(), &schema, slots, &[short]).is_err());
    }

    #[test]
    fn test_method_arguments() {
        let schema = schema();
        let set_pos = field(&schema, "setPos");
        let args = vec![Value::Int(-5), Value::Int(12), Value::Float(90.5)];
        let mut dg = Datagram::new();
        pack_field(&mut dg, &schema, set_pos, &args).unwrap();
        assert_eq!(dg.len(), 2 + 2 + 8);
        assert_eq!(unpack_field(&mut dg.iter(), &schema, set_pos).unwrap(), args);
    }

    #[test]
    fn test_wrong_argument_count() {
        let schema = schema();
        let err = pack_field(&mut Datagram::new(), &schema, field(&schema, "setPos"), &[Value::Int(1)])
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ValueMismatch { .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let schema = schema();
        let err = pack_field(&mut Datagram::new(), &schema, field(&schema, "name"), &[Value::Int(1)])
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ValueMismatch { .. }));
    }

    #[test]
    fn test_field_bytes_spans_exactly_one_field() {
        let schema = schema();
        let mut dg = Datagram::new();
        pack_field(&mut dg, &schema, field(&schema, "name"), &["bob".into()]).unwrap();
        dg.add_u16(0xBEEF);

        let mut iter = dg.iter();
        let span = field_bytes(&mut iter, &schema, field(&schema, "name")).unwrap();
        assert_eq!(span, &[3, 0, b'b', b'o', b'b']);
        assert_eq!(iter.read_u16().unwrap(), 0xBEEF);
    }

    #[test]
    fn test_field_bytes_truncated() {
        let schema = schema();
        let dg = Datagram::from_bytes(vec![9, 0, b'x']);
        let mut iter = dg.iter();
        assert!(field_bytes(&mut iter, &schema, field(&schema, "name")).is_err());
        assert_eq!(iter.tell(), 0);
    }

    #[test]
    fn test_defaults_from_literals() {
        let schema = schema();
        assert_eq!(
            default_values(&schema, field(&schema, "name")).unwrap(),
            vec![Value::String("nobody".into())]
        );
        assert_eq!(default_values(&schema, field(&schema, "hp")).unwrap(), vec![Value::Int(100)]);
        assert_eq!(
            default_values(&schema, field(&schema, "tint")).unwrap(),
            vec![Value::Struct(vec![Value::Int(0); 3])]
        );
        assert_eq!(
            default_values(&schema, field(&schema, "setPos")).unwrap(),
            vec![Value::Int(0), Value::Int(0), Value::Float(0.0)]
        );
    }
}
