use std::io::{Read, Seek};

use derive_getters::Getters;
use indexmap::IndexMap;
use tracing::warn;

use crate::column::ColumnDescription;
use crate::constants::{EIGHT_BYTES, MAGIC};
use crate::managers::{is_known_manager, read_manager, DataManager};
use crate::reader::Reader;
use crate::result::{Error, Result};

/// The per-row shape recorded alongside an array column's plain-column
/// entry. Empty unless the array column's shape-present flag
/// ([`Reader::boolean`]) is set; always empty for a scalar column
/// (`ndims == 0`), which never reads the flag at all.
#[derive(Debug, Clone, Getters)]
pub struct ColumnData {
    version: i32,
    sequence_number: i32,
    shape: Vec<i32>,
}

/// One column's entry in the plain-column table: a name and the version
/// stamp / sequence number pairing that ties it back to a data manager.
#[derive(Debug, Clone, Getters)]
pub struct PlainColumn {
    name: String,
    data: ColumnData,
}

fn read_column_data<R: Read + Seek>(reader: &mut Reader<R>, ndims: i32) -> Result<ColumnData> {
    let version = reader.i32()?;
    let sequence_number = reader.i32()?;

    let shape = if ndims != 0 {
        let has_shape = reader.boolean()?;
        if has_shape {
            reader.position_i32()?
        } else {
            Vec::new()
        }
    } else {
        Vec::new()
    };

    Ok(ColumnData {
        version,
        sequence_number,
        shape,
    })
}

fn read_plain_column<R: Read + Seek>(reader: &mut Reader<R>, ndims: i32) -> Result<PlainColumn> {
    let version = reader.i32()?;
    if version < 2 {
        return Err(Error::unsupported_version(
            "plain column",
            version,
            reader.offset(),
        ));
    }

    let name = reader.string()?;
    let data = read_column_data(reader, ndims)?;

    Ok(PlainColumn { name, data })
}

/// The fully decoded column layout for a table: every column's plain-row
/// entry, plus every data manager named in the manager table, keyed by
/// sequence number in the order the table declared them.
#[derive(Debug, Clone, Getters)]
pub struct ColumnSet {
    nrows: i32,
    nrman: i32,
    nmanagers: i32,
    columns: Vec<PlainColumn>,
    data_managers: IndexMap<i32, DataManager>,
}

/// Parses the column set that follows a table's column descriptions: the
/// data-manager table, the plain-column table (one entry per description,
/// laid out before the managers it refers to are actually read), and
/// finally each data manager's own sidecar body.
pub(crate) fn read_column_set<R: Read + Seek>(
    reader: &mut Reader<R>,
    description: &[ColumnDescription],
) -> Result<ColumnSet> {
    let raw_version = reader.i32()?;
    let _version = -raw_version;

    let nrows = reader.i32()?;
    let nrman = reader.i32()?;
    let nmanagers = reader.i32()?;
    let manager_count = reader.bounded_len(nmanagers, 8)?;

    let mut manager_names: IndexMap<i32, String> = IndexMap::with_capacity(manager_count);
    for _ in 0..manager_count {
        let name = reader.string()?;
        let sequence_number = reader.i32()?;
        if !is_known_manager(&name) {
            let offset = reader.offset();
            tracing::error!(name, offset, "unknown data manager");
            return Err(Error::UnknownManager { name, offset });
        }
        manager_names.insert(sequence_number, name);
    }

    let columns = description
        .iter()
        .map(|entry| read_plain_column(reader, *entry.ndims()))
        .collect::<Result<Vec<_>>>()?;

    // The reference decoder reads these eight bytes ("magic + length", per
    // its own comment) but never checks them. This port checks the magic
    // half and logs a mismatch rather than treating it as fatal, since a
    // hard failure here would be a scope change the source never made.
    let trailer = reader.raw_bytes(EIGHT_BYTES)?;
    if trailer[..4] != MAGIC {
        warn!("column set trailer did not start with the expected magic bytes");
    }

    let mut data_managers = IndexMap::with_capacity(manager_names.len());
    for (sequence_number, name) in &manager_names {
        let manager = read_manager(reader, name)?;
        data_managers.insert(*sequence_number, manager);
    }

    Ok(ColumnSet {
        nrows,
        nrman,
        nmanagers,
        columns,
        data_managers,
    })
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

    #[test]
    fn array_column_shape_is_read_only_when_the_presence_flag_is_set() {
        let mut body = Vec::new();
        body.extend_from_slice(&2i32.to_le_bytes()); // version
        body.extend_from_slice(&7i32.to_le_bytes()); // sequence_number
        body.push(0x01); // shape present
        body.extend_from_slice(&0i32.to_le_bytes()); // position header: unknown
        body.extend_from_slice(&5i32.to_le_bytes()); // position header: type name length
        body.extend_from_slice(b"Shape");
        body.extend_from_slice(&1i32.to_le_bytes()); // position header: version
        body.extend_from_slice(&2i32.to_le_bytes()); // position length
        body.extend_from_slice(&4i32.to_le_bytes());
        body.extend_from_slice(&3i32.to_le_bytes());

        let mut reader = Reader::new(little_endian_stream(&body)).unwrap();
        let data = read_column_data(&mut reader, 1).unwrap();
        assert_eq!(data.shape, vec![4, 3]);

        let mut body = Vec::new();
        body.extend_from_slice(&2i32.to_le_bytes()); // version
        body.extend_from_slice(&7i32.to_le_bytes()); // sequence_number
        body.push(0x00); // shape absent
        let mut reader = Reader::new(little_endian_stream(&body)).unwrap();
        let data = read_column_data(&mut reader, 1).unwrap();
        assert!(data.shape.is_empty());
    }
}
