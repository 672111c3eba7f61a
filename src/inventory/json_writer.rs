use crate::inventory::Inventory;
use anyhow::Result;
use serde::{Serialize, Serializer};
use std::io::Write;

/// Inventory keyed by lossily written paths
struct Report<'a>(&'a Inventory);

impl Serialize for Report<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        crate::serde_paths::lossy_keys(self.0, serializer)
    }
}

/// Writes an inventory as one JSON document keyed by installation path
pub struct JsonWriter {
    pretty: bool,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    pub fn write<W: Write>(&self, inventory: &Inventory, writer: &mut W) -> Result<()> {
        let report = Report(inventory);
        if self.pretty {
            serde_json::to_writer_pretty(&mut *writer, &report)?;
        } else {
            serde_json::to_writer(&mut *writer, &report)?;
        }
        writeln!(writer)?;
        Ok(())
    }
}

impl Default for JsonWriter {
    fn default() -> Self {
        Self::new()
    }
}
