//! Read only view over the firmware's connection table.
//!
//! The table is a fixed size array of opaque records in RAM. The view only
//! computes record addresses, fetching and decoding a record is up to the
//! caller.

use crate::error::{IndexOutOfRange, Result as ProfileResult};
use crate::profile::ConnectionTableConfig;
use core::iter::FusedIterator;
use data_types::PhysicalAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionTableView {
    config: ConnectionTableConfig,
}

impl ConnectionTableView {
    /// Fails if the table does not fit the 32 bit bus
    pub fn new(config: ConnectionTableConfig) -> ProfileResult<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    pub(crate) fn from_validated(config: ConnectionTableConfig) -> Self {
        ConnectionTableView { config }
    }

    pub fn config(&self) -> &ConnectionTableConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.config.max_connections
    }

    pub fn is_empty(&self) -> bool {
        self.config.max_connections == 0
    }

    pub fn record_length(&self) -> usize {
        self.config.record_length as usize
    }

    /// Address of the `index`-th record
    pub fn record_address(&self, index: usize) -> Result<PhysicalAddress, IndexOutOfRange> {
        if index >= self.config.max_connections {
            return Err(IndexOutOfRange {
                index,
                max: self.config.max_connections,
            });
        }

        // the profile validated that the whole table fits the bus
        Ok(self.config.base_address + index as u32 * self.config.record_length)
    }

    /// Lazily yields the address of every record. Calling this again starts
    /// over, the returned iterator can also be cloned.
    pub fn enumerate(&self) -> RecordAddresses {
        RecordAddresses {
            view: *self,
            front: 0,
            back: self.config.max_connections,
        }
    }
}

impl IntoIterator for &ConnectionTableView {
    type Item = PhysicalAddress;
    type IntoIter = RecordAddresses;

    fn into_iter(self) -> Self::IntoIter {
        self.enumerate()
    }
}

/// Iterator over record addresses of a connection table
#[derive(Debug, Clone)]
pub struct RecordAddresses {
    view: ConnectionTableView,
    front: usize,
    back: usize,
}

impl Iterator for RecordAddresses {
    type Item = PhysicalAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let address = self.view.record_address(self.front).ok()?;
        self.front += 1;
        Some(address)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for RecordAddresses {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.view.record_address(self.back).ok()
    }
}

impl ExactSizeIterator for RecordAddresses {}

impl FusedIterator for RecordAddresses {}
