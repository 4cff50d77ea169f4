// DBR transfer types: the typed payload vocabulary of CA data messages.

use num_enum::TryFromPrimitive;

use crate::circuit::RequestError;
use crate::datatypes::MAX_STRING_SIZE;
use crate::send_queue::SendQueue;

/// The seven base DBR value classes. Every structured transfer type
/// (status, timestamped, graphic, control) wraps one of these element types
/// behind a fixed metadata block.
#[derive(TryFromPrimitive)]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbrBasic {
    String = 0,
    Short = 1,
    Float = 2,
    Enum = 3,
    Char = 4,
    Long = 5,
    Double = 6,
}

/// Number of defined DBR transfer types; codes at or above this are invalid.
pub const DBR_TYPE_COUNT: u16 = 39;

/// Wire size of each transfer type with a single element: the metadata block
/// plus one value, laid out exactly as the canonical C payload structs.
/// Rows follow the value-class order string, short, float, enum, char, long,
/// double.
#[rustfmt::skip]
const DBR_FIXED_SIZE: [u32; DBR_TYPE_COUNT as usize] = [
    40,   2,   4,   2,   1,   4,   8,   // plain value
    44,   6,   8,   6,   6,   8,  16,   // with status/severity
    52,  16,  16,  16,  16,  16,  24,   // with timestamp
    44,  26,  44, 424,  20,  40,  72,   // with display metadata
    44,  30,  52, 424,  22,  48,  88,   // with control limits
     2,   2,  48,  40,                  // put_ackt, put_acks, stsack_string, class_name
];

/// Per-element size of each transfer type's value array.
#[rustfmt::skip]
const DBR_ELEMENT_SIZE: [u32; DBR_TYPE_COUNT as usize] = [
    40, 2, 4, 2, 1, 4, 8,
    40, 2, 4, 2, 1, 4, 8,
    40, 2, 4, 2, 1, 4, 8,
    40, 2, 4, 2, 1, 4, 8,
    40, 2, 4, 2, 1, 4, 8,
     2, 2, 40, 40,
];

/// True when `dtype` names a defined transfer type.
pub fn dbr_type_is_valid(dtype: u16) -> bool {
    dtype < DBR_TYPE_COUNT
}

/// Serialized size of a `dtype` payload carrying `count` elements, or `None`
/// for an undefined type. A count of zero sizes like a single element, as on
/// the wire.
pub fn dbr_size_n(dtype: u16, count: u32) -> Option<u64> {
    if !dbr_type_is_valid(dtype) {
        return None;
    }
    let fixed = u64::from(DBR_FIXED_SIZE[dtype as usize]);
    let element = u64::from(DBR_ELEMENT_SIZE[dtype as usize]);
    Some(fixed + u64::from(count.saturating_sub(1)) * element)
}

/// Per-element size of `dtype`, or `None` for an undefined type.
pub fn dbr_element_size(dtype: u16) -> Option<u32> {
    dbr_type_is_valid(dtype).then(|| DBR_ELEMENT_SIZE[dtype as usize])
}

/// A typed write payload.
///
/// Writes always carry one of the base value classes; the element values are
/// serialized big-endian in declaration order. A single `String` element uses
/// the short encoding (the characters plus a NUL, not a full 40-byte cell);
/// string arrays use fixed 40-byte cells.
#[derive(Clone, Debug, PartialEq)]
pub enum DbrValue {
    String(Vec<String>),
    Short(Vec<i16>),
    Float(Vec<f32>),
    Enum(Vec<u16>),
    Char(Vec<u8>),
    Long(Vec<i32>),
    Double(Vec<f64>),
}

impl DbrValue {
    pub fn dbr_type(&self) -> DbrBasic {
        match self {
            DbrValue::String(_) => DbrBasic::String,
            DbrValue::Short(_) => DbrBasic::Short,
            DbrValue::Float(_) => DbrBasic::Float,
            DbrValue::Enum(_) => DbrBasic::Enum,
            DbrValue::Char(_) => DbrBasic::Char,
            DbrValue::Long(_) => DbrBasic::Long,
            DbrValue::Double(_) => DbrBasic::Double,
        }
    }

    pub fn element_count(&self) -> u32 {
        let n = match self {
            DbrValue::String(v) => v.len(),
            DbrValue::Short(v) => v.len(),
            DbrValue::Float(v) => v.len(),
            DbrValue::Enum(v) => v.len(),
            DbrValue::Char(v) => v.len(),
            DbrValue::Long(v) => v.len(),
            DbrValue::Double(v) => v.len(),
        };
        n as u32
    }

    /// Serialized size before message-boundary padding.
    ///
    /// Fails `OutOfBounds` when a string element cannot fit its cell.
    pub fn wire_size(&self) -> Result<u32, RequestError> {
        match self {
            DbrValue::String(v) if v.len() == 1 => {
                let size = v[0].len() + 1;
                if size > MAX_STRING_SIZE {
                    return Err(RequestError::OutOfBounds);
                }
                Ok(size as u32)
            }
            DbrValue::String(v) => {
                for s in v {
                    if s.len() + 1 > MAX_STRING_SIZE {
                        return Err(RequestError::OutOfBounds);
                    }
                }
                Ok((v.len() * MAX_STRING_SIZE) as u32)
            }
            DbrValue::Short(v) => Ok((v.len() * 2) as u32),
            DbrValue::Float(v) => Ok((v.len() * 4) as u32),
            DbrValue::Enum(v) => Ok((v.len() * 2) as u32),
            DbrValue::Char(v) => Ok(v.len() as u32),
            DbrValue::Long(v) => Ok((v.len() * 4) as u32),
            DbrValue::Double(v) => Ok((v.len() * 8) as u32),
        }
    }

    /// Append exactly `wire_size()` payload bytes to the send queue.
    pub(crate) fn push_onto(&self, queue: &mut SendQueue) {
        match self {
            DbrValue::String(v) if v.len() == 1 => {
                queue.push_string(v[0].as_bytes(), v[0].len());
                queue.push_zeros(1);
            }
            DbrValue::String(v) => {
                for s in v {
                    queue.push_string(s.as_bytes(), s.len());
                    queue.push_zeros(MAX_STRING_SIZE - s.len());
                }
            }
            DbrValue::Short(v) => {
                for x in v {
                    queue.push_u16(*x as u16);
                }
            }
            DbrValue::Float(v) => {
                for x in v {
                    queue.push_f32(*x);
                }
            }
            DbrValue::Enum(v) => {
                for x in v {
                    queue.push_u16(*x);
                }
            }
            DbrValue::Char(v) => {
                queue.push_string(v, v.len());
            }
            DbrValue::Long(v) => {
                for x in v {
                    queue.push_u32(*x as u32);
                }
            }
            DbrValue::Double(v) => {
                for x in v {
                    queue.push_f64(*x);
                }
            }
        }
    }
}
