//! Row transports.
//!
//! Operators pull rows from a [`RowSource`] and push rows into a
//! [`RowSink`]. Both calls may block: pulling waits until a row or the end
//! of input arrives, emitting waits while a bounded transport is full.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, SyncSender};

use super::Row;
use crate::codec::CodecError;

/// Blocking pull side of a transport.
pub trait RowSource {
    /// Next row, or `None` once the input is exhausted.
    fn next_row(&mut self) -> Result<Option<Row>, CodecError>;
}

/// Push side of a transport.
pub trait RowSink {
    fn emit(&mut self, row: Row) -> Result<(), CodecError>;

    /// Signal that no more rows follow. Called once by an operator after its
    /// last emit, whether or not it emitted anything.
    fn finish(&mut self) -> Result<(), CodecError> {
        Ok(())
    }
}

impl<S: RowSource + ?Sized> RowSource for &mut S {
    fn next_row(&mut self) -> Result<Option<Row>, CodecError> {
        (**self).next_row()
    }
}

impl<S: RowSink + ?Sized> RowSink for &mut S {
    fn emit(&mut self, row: Row) -> Result<(), CodecError> {
        (**self).emit(row)
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        (**self).finish()
    }
}

impl<S: RowSource + ?Sized> RowSource for Box<S> {
    fn next_row(&mut self) -> Result<Option<Row>, CodecError> {
        (**self).next_row()
    }
}

impl<S: RowSink + ?Sized> RowSink for Box<S> {
    fn emit(&mut self, row: Row) -> Result<(), CodecError> {
        (**self).emit(row)
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        (**self).finish()
    }
}

/// In-memory source over a fixed list of rows.
#[derive(Debug, Default)]
pub struct VecSource {
    rows: VecDeque<Row>,
}

impl VecSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl RowSource for VecSource {
    fn next_row(&mut self) -> Result<Option<Row>, CodecError> {
        Ok(self.rows.pop_front())
    }
}

/// In-memory sink collecting every emitted row.
#[derive(Debug, Default)]
pub struct VecSink {
    rows: Vec<Row>,
    finished: bool,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl RowSink for VecSink {
    fn emit(&mut self, row: Row) -> Result<(), CodecError> {
        self.rows.push(row);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        self.finished = true;
        Ok(())
    }
}

/// Bounded channel between two operators running on separate threads.
///
/// `emit` blocks while `capacity` rows are in flight. The receiver sees the
/// end of input once every sender has finished or been dropped.
pub fn channel(capacity: usize) -> (RowSender, RowReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (RowSender { tx: Some(tx) }, RowReceiver { rx })
}

/// Sending half of [`channel`].
#[derive(Debug, Clone)]
pub struct RowSender {
    tx: Option<SyncSender<Row>>,
}

impl RowSink for RowSender {
    fn emit(&mut self, row: Row) -> Result<(), CodecError> {
        let tx = self.tx.as_ref().ok_or_else(|| {
            CodecError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "row channel already finished",
            ))
        })?;
        tx.send(row).map_err(|_| {
            CodecError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "row channel receiver dropped",
            ))
        })
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        self.tx = None;
        Ok(())
    }
}

/// Receiving half of [`channel`].
#[derive(Debug)]
pub struct RowReceiver {
    rx: Receiver<Row>,
}

impl RowSource for RowReceiver {
    fn next_row(&mut self) -> Result<Option<Row>, CodecError> {
        Ok(self.rx.recv().ok())
    }
}
