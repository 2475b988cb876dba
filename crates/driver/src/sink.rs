//! Destinations for the rows a run produces.
//!
//! The driver hands every finished batch to the sink on the caller's
//! thread, so a sink needs no synchronisation of its own. Batches arrive
//! in completion order, not client order.

use crate::error::{DriverError, Result};
use serde::Serialize;
use std::io::{BufWriter, Write};

pub trait RowSink<R> {
    /// Accept the rows of one finished batch
    fn write_batch(&mut self, rows: Vec<R>) -> Result<()>;

    /// Called once after the last batch
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects every row in memory.
#[derive(Debug)]
pub struct VecSink<R> {
    rows: Vec<R>,
}

impl<R> VecSink<R> {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }
}

impl<R> Default for VecSink<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RowSink<R> for VecSink<R> {
    fn write_batch(&mut self, rows: Vec<R>) -> Result<()> {
        self.rows.extend(rows);
        Ok(())
    }
}

/// Streams one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    pub fn rows_written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| DriverError::Sink(e.error().to_string()))
    }
}

impl<R: Serialize, W: Write> RowSink<R> for JsonLinesSink<W> {
    fn write_batch(&mut self, rows: Vec<R>) -> Result<()> {
        for row in &rows {
            serde_json::to_writer(&mut self.writer, row).map_err(|e| DriverError::Sink(e.to_string()))?;
            self.writer
                .write_all(b"\n")
                .map_err(|e| DriverError::Sink(e.to_string()))?;
            self.written += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| DriverError::Sink(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[derive(Serialize)]
    struct Row {
        id: u32,
    }

    #[test]
    fn test_vec_sink_collects_batches() {
        let mut sink = VecSink::new();
        sink.write_batch(vec![1, 2]).unwrap();
        sink.write_batch(vec![3]).unwrap();
        assert_eq!(sink.into_rows(), vec![1, 2, 3]);
    }

    #[test]
    fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write_batch(vec![Row { id: 1 }, Row { id: 2 }]).unwrap();
        RowSink::<Row>::finish(&mut sink).unwrap();
        assert_eq!(sink.rows_written(), 2);

        let bytes = sink.into_inner().unwrap();
        let lines: Vec<Value> = String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines[1]["id"], 2);
    }
}
