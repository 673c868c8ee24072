use std::io::{Read, Seek};
use std::path::Path;

use derive_getters::Getters;

use crate::constants::TypeTag;
use crate::reader::Reader;
use crate::record::{read_record, TableRecord};
use crate::result::{Error, Result};

/// One column's static description: name, declared value type, the
/// manager it's bound to, and whatever keyword record rides along with
/// it. `option` is kept in its raw form alongside the three flags decoded
/// from it, since the flags themselves are decoded with the reference
/// decoder's literal (not bitwise-AND) bit test.
#[derive(Debug, Clone, Getters)]
pub struct ColumnDescription {
    name: String,
    type_name: String,
    comment: String,
    manager_group: String,
    manager_type: String,
    value_type: TypeTag,
    option: i32,
    direct: bool,
    undefined: bool,
    fixed_shape: bool,
    shape: Option<Vec<i8>>,
    ndims: i32,
    max_length: i32,
    keywords: TableRecord,
}

const SUPPORTED_DESC_PREFIXES: [&str; 3] = [
    "ScalarColumnDesc",
    "ScalarRecordColumnDesc",
    "ArrayColumnDesc",
];

/// Parses one `ColumnDescription` entry from a table description. `ndims`
/// on the result tells the caller (building the plain-column layout right
/// after) whether this column carries per-row shape data.
pub(crate) fn read_column_description<R: Read + Seek>(
    reader: &mut Reader<R>,
    ms_path: &Path,
) -> Result<ColumnDescription> {
    let _unknown = reader.i32()?;

    let type_name = reader.string()?;
    let version = reader.i32()?;

    if !SUPPORTED_DESC_PREFIXES
        .iter()
        .any(|prefix| type_name.starts_with(prefix))
        || version != 1
    {
        return Err(Error::unsupported_version(
            format!("column description {type_name}"),
            version,
            reader.offset(),
        ));
    }

    let name = reader.string()?;
    let comment = reader.string()?;
    // "Shape" managers store per-row cell shapes; the reference decoder
    // renames them to "Cell" at read time rather than at the call site.
    let manager_type = reader.string()?.replace("Shape", "Cell");
    let manager_group = reader.string()?;

    let value_type_ordinal = reader.i32()?;
    let offset = reader.offset();
    let value_type = TypeTag::from_ordinal(value_type_ordinal)
        .ok_or_else(|| Error::unsupported(format!("type ordinal {value_type_ordinal}"), offset))?;

    let option = reader.i32()?;
    // Literal comparison against the reference decoder: a correct test
    // would mask with `& 1`, but this compares the fully shifted value
    // against `1`, so any option word with extra high bits set past the
    // flag position reads as `false` here even though the flag bit itself
    // is on.
    let direct = (option >> 3) == 1;
    let undefined = (option >> 2) == 1;
    let fixed_shape = (option >> 1) == 1;

    let ndims = reader.i32()?;
    let shape = if ndims != 0 {
        Some(reader.position_i8_truncated()?)
    } else {
        None
    };

    let max_length = reader.i32()?;
    let keywords = read_record(reader, ms_path)?;

    let _unknown_trailer = reader.i32()?;

    if type_name.contains("ArrayColumnDesc") {
        reader.skip(1)?;
    } else if let Some(width) = value_type.fixed_width() {
        reader.skip(width)?;
    } else if value_type == TypeTag::String {
        reader.string()?;
    } else {
        return Err(Error::unsupported(
            format!("default value for column type {type_name} ({value_type})"),
            reader.offset(),
        ));
    }

    Ok(ColumnDescription {
        name,
        type_name,
        comment,
        manager_group,
        manager_type,
        value_type,
        option,
        direct,
        undefined,
        fixed_shape,
        shape,
        ndims,
        max_length,
        keywords,
    })
}
