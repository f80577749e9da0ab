use std::io;
use std::path::Path;

use csv::{Reader, ReaderBuilder};
use tracing::debug;

use super::{Panel, PanelObservation};
use crate::error::{DataError, Result};

impl Panel {
    /// Reads a tidy panel from a CSV file with the header
    /// `region,category,time,price_index,tax_constant_index,weight`.
    ///
    /// Empty numeric cells become missing values.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        Self::collect(rdr)
    }

    /// Same as [`Panel::read`] for any byte source.
    pub fn from_reader<R: io::Read>(source: R) -> Result<Self> {
        let rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(source);
        Self::collect(rdr)
    }

    fn collect<R: io::Read>(mut rdr: Reader<R>) -> Result<Self> {
        let mut records: Vec<PanelObservation> = Vec::new();
        for result in rdr.deserialize() {
            records.push(result?);
        }

        if records.is_empty() {
            return Err(DataError::EmptyInput("panel file contains no data records").into());
        }

        debug!(rows = records.len(), "panel loaded");
        Ok(Panel::new(records)?)
    }
}
