use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use derive_getters::Getters;
use tracing::debug;

use column::ColumnDescription;
use column_set::ColumnSet;
use reader::Reader;
use record::{read_record, TableRecord};
use result::{Error, Result};
use utils::{resolve_table_path, sidecar_path, sidecar_paths};

pub mod column;
pub mod column_set;
pub mod constants;
pub mod managers;
mod reader;
pub mod record;
pub mod result;
mod utils;

pub use reader::{ArrayValue, Complex32, Complex64, F128Raw, NdArray};

/// The table-level keywords and private keywords read straight after a
/// measurement set's own header, plus its declared column count.
#[derive(Debug, Clone, Getters)]
pub struct TableDescription {
    ncolumns: i32,
    keywords: TableRecord,
    private: TableRecord,
}

/// A fully decoded CASA measurement set: the top-level header, its table
/// keywords, every column's static description, and the column/manager
/// layout that ties columns to the sidecar files holding their data.
///
/// `MeasurementSet` only parses the structural metadata described here;
/// it never reads a cell's actual array or scalar data out of a manager's
/// sidecar file (`table.f<n>`), matching this decoder's stated scope.
#[derive(Debug, Getters)]
pub struct MeasurementSet {
    path: PathBuf,
    nrows: i32,
    format: i32,
    name: String,
    table: TableDescription,
    description: Vec<ColumnDescription>,
    column_set: ColumnSet,
}

impl MeasurementSet {
    /// Opens and parses the measurement set rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Self::read(path, file)
    }

    /// Parses a measurement set from an already-open reader, attributing
    /// sidecar and `table`-field paths to `path` without ever opening
    /// `path` itself.
    pub fn read<R: Read + Seek>(path: impl Into<PathBuf>, inner: R) -> Result<Self> {
        let path = path.into();
        let mut reader = Reader::new(inner)?;

        reader.header()?;
        let nrows = reader.i32()?;
        let format = reader.i32()?;
        let name = reader.string()?;

        reader.header()?;
        for _ in 0..3 {
            reader.string()?;
        }

        let keywords = read_record(&mut reader, &path)?;
        let private = read_record(&mut reader, &path)?;

        let ncolumns = reader.i32()?;
        let ncolumns_len = reader.bounded_len(ncolumns, 4)?;
        let description = (0..ncolumns_len)
            .map(|_| column::read_column_description(&mut reader, &path))
            .collect::<Result<Vec<_>>>()?;

        let column_set = column_set::read_column_set(&mut reader, &description)?;

        for (sequence_number, manager) in column_set.data_managers() {
            debug!(
                sequence_number,
                path = %sidecar_path(&path, *sequence_number).display(),
                ?manager,
                "located data manager sidecar"
            );
        }

        Ok(Self {
            path,
            nrows,
            format,
            name,
            table: TableDescription {
                ncolumns,
                keywords,
                private,
            },
            description,
            column_set,
        })
    }

    /// The sidecar file a given data manager's sequence number reads its
    /// column storage from.
    pub fn sidecar_path(&self, sequence_number: i32) -> PathBuf {
        sidecar_path(&self.path, sequence_number)
    }

    /// Every data manager's sidecar path, in manager-table order.
    pub fn sidecar_paths(&self) -> Vec<PathBuf> {
        sidecar_paths(&self.path, self.column_set.data_managers().keys().copied())
    }

    /// Resolves a `table`-typed record field's name against this
    /// measurement set's own path.
    pub fn resolve_table_path(&self, name: &str) -> PathBuf {
        resolve_table_path(&self.path, name)
    }
}
