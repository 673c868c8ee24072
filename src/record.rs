use std::io::{Read, Seek};
use std::path::Path;

use derive_getters::Getters;
use indexmap::IndexMap;
use tracing::debug;

use crate::constants::{TypeTag, EIGHT_BYTES};
use crate::reader::{ArrayValue, Complex32, Complex64, F128Raw, NdArray, Reader};
use crate::result::{Error, Result};
use crate::utils::resolve_table_path;

/// The declared shape of a record: one name and one type tag per field, in
/// declaration order. Built by [`read_record_description`] and consumed by
/// [`read_record`]; never retained for nested `record`-typed fields, which
/// are parsed only to advance the cursor past them.
#[derive(Debug, Clone, Getters)]
pub struct RecordDescription {
    names: Vec<String>,
    types: Vec<TypeTag>,
    nrecords: i32,
}

/// A decoded keyword/value record: table keywords, private keywords, and
/// every `record`-typed field nested inside either. Fields keep the order
/// they were declared in, not a sorted order.
#[derive(Debug, Clone, Getters)]
pub struct TableRecord {
    description: RecordDescription,
    records: IndexMap<String, Value>,
}

/// A single decoded record field. Variants line up with the subset of
/// [`TypeTag`] the reference decoder's record reader actually implements;
/// a field whose tag falls outside that subset (`char`, `uchar`, `short`,
/// `ushort`, any of their array forms, or `other`) surfaces as
/// [`Error::Unsupported`] rather than a silently-invented variant.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int(i32),
    UInt(i32),
    Float(f32),
    Double(f64),
    /// The on-disk `complex` tag never round-trips through a working
    /// complex-number reader in the reference decoder: the call site that
    /// would combine a real and imaginary part is unreachable, and the
    /// record value is read as a single double instead. Preserved here
    /// rather than synthesizing a zero imaginary part.
    Complex(f64),
    DComplex(F128Raw),
    String(String),
    /// A `table`-typed field names another table relative to this one;
    /// resolved (but not canonicalized) against the measurement set's own
    /// path.
    Table(String),
    ArrayInt(NdArray<i32>),
    ArrayUInt(NdArray<u32>),
    ArrayFloat(NdArray<f32>),
    ArrayDouble(NdArray<f64>),
    ArrayComplex(NdArray<Complex32>),
    ArrayDComplex(NdArray<Complex64>),
    ArrayStr(NdArray<String>),
    Record(Box<TableRecord>),
}

fn scalar_metadata_types() -> &'static [TypeTag] {
    const SCALAR: [TypeTag; 8] = [
        TypeTag::Bool,
        TypeTag::Int,
        TypeTag::UInt,
        TypeTag::Float,
        TypeTag::Double,
        TypeTag::Complex,
        TypeTag::DComplex,
        TypeTag::String,
    ];
    &SCALAR
}

/// Parses a record's field names and type tags, consuming (but not
/// retaining) each field's type-specific metadata trailer so the cursor
/// lands exactly on the first field's value.
pub(crate) fn read_record_description<R: Read + Seek>(
    reader: &mut Reader<R>,
) -> Result<RecordDescription> {
    reader.check_type()?;

    let nrecords = reader.i32()?;
    let count = reader.bounded_len(nrecords, EIGHT_BYTES)?;

    let mut names = Vec::with_capacity(count);
    let mut types = Vec::with_capacity(count);

    for _ in 0..count {
        let name = reader.string()?;
        let raw_type = reader.i32()?;
        let offset = reader.offset();
        let tag = TypeTag::from_ordinal(raw_type)
            .ok_or_else(|| Error::unsupported(format!("type ordinal {raw_type}"), offset))?;

        if scalar_metadata_types().contains(&tag) {
            reader.string()?;
        } else if tag == TypeTag::Table {
            reader.skip(EIGHT_BYTES)?;
        } else if tag.starts_array() {
            reader.position_i32()?;
            reader.skip(4)?;
        } else if tag == TypeTag::Record {
            read_record_description(reader)?;
            reader.i32()?;
        } else {
            debug!(%tag, "record field has no metadata trailer");
        }

        names.push(name);
        types.push(tag);
    }

    Ok(RecordDescription {
        names,
        types,
        nrecords,
    })
}

/// Parses a record's description and then its field values, in the order
/// the description declares them.
pub(crate) fn read_record<R: Read + Seek>(
    reader: &mut Reader<R>,
    ms_path: &Path,
) -> Result<TableRecord> {
    reader.check_type()?;

    let description = read_record_description(reader)?;
    let _unknown = reader.i32()?;

    let mut records = IndexMap::with_capacity(description.names.len());
    for (name, tag) in description.names.iter().zip(description.types.iter()) {
        let value = read_value(reader, ms_path, *tag)?;
        records.insert(name.clone(), value);
    }

    Ok(TableRecord {
        description,
        records,
    })
}

fn read_value<R: Read + Seek>(
    reader: &mut Reader<R>,
    ms_path: &Path,
    tag: TypeTag,
) -> Result<Value> {
    match tag {
        TypeTag::Bool => Ok(Value::Bool(reader.boolean_literal()?)),
        TypeTag::Int => Ok(Value::Int(reader.i32()?)),
        TypeTag::UInt => Ok(Value::UInt(reader.i32()?)),
        TypeTag::Float => Ok(Value::Float(reader.f32()?)),
        TypeTag::Double => Ok(Value::Double(reader.f64()?)),
        TypeTag::Complex => Ok(Value::Complex(reader.f64()?)),
        TypeTag::DComplex => Ok(Value::DComplex(reader.f128_raw()?)),
        TypeTag::String => Ok(Value::String(reader.string()?)),
        TypeTag::Table => {
            let name = reader.string()?;
            let path = resolve_table_path(ms_path, &name);
            Ok(Value::Table(path.to_string_lossy().into_owned()))
        }
        TypeTag::ArrayInt => match reader.array(TypeTag::ArrayInt)? {
            ArrayValue::Int(nd) => Ok(Value::ArrayInt(nd)),
            _ => unreachable!("array(ArrayInt) always returns ArrayValue::Int"),
        },
        TypeTag::ArrayUInt => match reader.array(TypeTag::ArrayUInt)? {
            ArrayValue::UInt(nd) => Ok(Value::ArrayUInt(nd)),
            _ => unreachable!("array(ArrayUInt) always returns ArrayValue::UInt"),
        },
        TypeTag::ArrayFloat => match reader.array(TypeTag::ArrayFloat)? {
            ArrayValue::Float(nd) => Ok(Value::ArrayFloat(nd)),
            _ => unreachable!("array(ArrayFloat) always returns ArrayValue::Float"),
        },
        TypeTag::ArrayDouble => match reader.array(TypeTag::ArrayDouble)? {
            ArrayValue::Double(nd) => Ok(Value::ArrayDouble(nd)),
            _ => unreachable!("array(ArrayDouble) always returns ArrayValue::Double"),
        },
        TypeTag::ArrayComplex => match reader.array(TypeTag::ArrayComplex)? {
            ArrayValue::Complex(nd) => Ok(Value::ArrayComplex(nd)),
            _ => unreachable!("array(ArrayComplex) always returns ArrayValue::Complex"),
        },
        TypeTag::ArrayDComplex => match reader.array(TypeTag::ArrayDComplex)? {
            ArrayValue::DComplex(nd) => Ok(Value::ArrayDComplex(nd)),
            _ => unreachable!("array(ArrayDComplex) always returns ArrayValue::DComplex"),
        },
        TypeTag::ArrayStr => match reader.array(TypeTag::ArrayStr)? {
            ArrayValue::Str(nd) => Ok(Value::ArrayStr(nd)),
            _ => unreachable!("array(ArrayStr) always returns ArrayValue::Str"),
        },
        TypeTag::Record => Ok(Value::Record(Box::new(read_record(reader, ms_path)?))),
        other => Err(Error::unsupported(
            format!("record field of type {other}"),
            reader.offset(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn little_endian_stream(body: &[u8]) -> Cursor<Vec<u8>> {
        let mut bytes = vec![0xBE, 0xBE, 0xBE, 0xBE, 0x01];
        bytes.extend_from_slice(body);
        Cursor::new(bytes)
    }

    fn framed_header(type_name: &str, version: i32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&(type_name.len() as i32).to_le_bytes());
        out.extend_from_slice(type_name.as_bytes());
        out.extend_from_slice(&version.to_le_bytes());
        out
    }

    #[test]
    fn reads_flat_record_with_bool_int_and_string_fields() {
        let mut body = framed_header("Record", 1); // read_record's check_type
        body.extend_from_slice(&framed_header("RecordDesc", 1)); // description's check_type
        body.extend_from_slice(&2i32.to_le_bytes()); // nrecords

        // field 0: "flag" bool
        body.extend_from_slice(&4i32.to_le_bytes());
        body.extend_from_slice(b"flag");
        body.extend_from_slice(&(TypeTag::Bool as i32).to_le_bytes());
        body.extend_from_slice(&framed_string(""));

        // field 1: "label" string
        body.extend_from_slice(&5i32.to_le_bytes());
        body.extend_from_slice(b"label");
        body.extend_from_slice(&(TypeTag::String as i32).to_le_bytes());
        body.extend_from_slice(&framed_string(""));

        body.extend_from_slice(&0i32.to_le_bytes()); // unknown trailer

        // values: bool byte, then a length-prefixed string
        body.push(0x01);
        body.extend_from_slice(&framed_string("hello"));

        let mut reader = Reader::new(little_endian_stream(&body)).unwrap();
        let record = read_record(&mut reader, Path::new("/ms")).unwrap();

        assert!(matches!(record.records["flag"], Value::Bool(false)));
        match &record.records["label"] {
            Value::String(s) => assert_eq!(s, "hello"),
            other => panic!("unexpected value: {other:?}"),
        }
        assert_eq!(
            record.records.keys().collect::<Vec<_>>(),
            vec!["flag", "label"]
        );
    }

    fn framed_string(s: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(s.len() as i32).to_le_bytes());
        out.extend_from_slice(s.as_bytes());
        out
    }
}
