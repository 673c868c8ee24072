use std::io::{Read, Seek};

use derive_getters::Getters;
use tracing::warn;

use crate::reader::Reader;
use crate::result::{Error, Result};

/// A length-prefixed run of `i32`s with its own name/version framing.
/// Every `StandardStMan` sidecar carries exactly two of these (an offset
/// table and an index map).
#[derive(Debug, Clone, Getters)]
pub struct Block {
    nrows: i32,
    name: String,
    version: i32,
    size: i32,
    elements: Vec<i32>,
}

fn read_block<R: Read + Seek>(reader: &mut Reader<R>) -> Result<Block> {
    let nrows = reader.i32()?;
    let name = reader.string()?;
    let version = reader.i32()?;
    let size = reader.i32()?;
    let count = reader.bounded_len(size, 4)?;
    let elements = (0..count).map(|_| reader.i32()).collect::<Result<_>>()?;

    Ok(Block {
        nrows,
        name,
        version,
        size,
        elements,
    })
}

/// A fully decoded `StandardStMan` sidecar: a name and the two `Block`s
/// that follow it.
#[derive(Debug, Clone, Getters)]
pub struct StandardStMan {
    name: String,
    offset: Block,
    index_map: Block,
}

/// A decoded `IncrementalStMan` sidecar. The reference decoder never
/// implements more than the header and name for this manager; there is no
/// further structure to decode, not a gap in this port.
#[derive(Debug, Clone, Getters)]
pub struct IncrementalStMan {
    name: String,
}

/// One parsed data manager entry, keyed by [`crate::column_set::ColumnSet`]
/// under its sequence number. `TiledShapeStMan` and `TiledColumnStMan`
/// genuinely carry no further on-disk structure in the reference decoder
/// (their `read` routines return immediately); `TiledCellStMan` and
/// `StManAipsIO` have no reader at all there and surface as
/// [`Error::Unsupported`] instead of a placeholder value.
#[derive(Debug, Clone)]
pub enum DataManager {
    Standard(StandardStMan),
    Incremental(IncrementalStMan),
    TiledShape,
    TiledColumn,
}

/// Decodes one data-manager sidecar body by name, dispatched through a
/// closed match rather than a runtime registry: the manager set this
/// format supports is fixed, so there is no extensibility to model.
pub(crate) fn read_manager<R: Read + Seek>(reader: &mut Reader<R>, name: &str) -> Result<DataManager> {
    match name {
        "StandardStMan" => {
            reader.header()?;
            let name = reader.string()?;
            let offset = read_block(reader)?;
            let index_map = read_block(reader)?;
            Ok(DataManager::Standard(StandardStMan {
                name,
                offset,
                index_map,
            }))
        }
        "IncrementalStMan" => {
            reader.header()?;
            let name = reader.string()?;
            Ok(DataManager::Incremental(IncrementalStMan { name }))
        }
        "TiledShapeStMan" => Ok(DataManager::TiledShape),
        "TiledColumnStMan" => Ok(DataManager::TiledColumn),
        "TiledCellStMan" | "StManAipsIO" => {
            warn!(manager = name, "data manager has no reader in the reference decoder");
            Err(Error::unsupported(
                format!("data manager {name}"),
                reader.offset(),
            ))
        }
        other => {
            let offset = reader.offset();
            warn!(manager = other, offset, "unknown data manager");
            Err(Error::UnknownManager {
                name: other.to_string(),
                offset,
            })
        }
    }
}

/// Every data manager name this decoder recognizes, whether or not it can
/// actually be read to completion. Used to validate a manager-table entry
/// before committing to read its sidecar body.
pub(crate) fn is_known_manager(name: &str) -> bool {
    matches!(
        name,
        "StandardStMan"
            | "IncrementalStMan"
            | "TiledCellStMan"
            | "TiledShapeStMan"
            | "TiledColumnStMan"
            | "StManAipsIO"
    )
}
