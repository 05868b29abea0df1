// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Implementation of the in-memory zone table.

use std::slice;

use crate::record::Record;

mod error;
pub use error::Error;

/// The maximum number of records a [`ZoneTable`] can hold.
pub const MAX_RECORDS: usize = 1000;

/// An ordered, bounded table of [`Record`]s.
///
/// A `ZoneTable` is built once at startup (normally by
/// [`zone_file::load`](crate::zone_file::load)) through repeated calls
/// to [`ZoneTable::push`], and is then frozen by placing it behind an
/// [`Arc`](std::sync::Arc). Since `push` requires a mutable reference,
/// a shared table can no longer change, and any number of threads may
/// call [`ZoneTable::lookup`] on it concurrently without
/// synchronization.
///
/// Domains are not required to be unique. When several records share a
/// domain, [`ZoneTable::lookup`] returns the one inserted first; later
/// duplicates are kept, but can never be returned by a lookup.
#[derive(Clone, Debug, Default)]
pub struct ZoneTable {
    records: Vec<Record>,
}

impl ZoneTable {
    /// Creates a new, empty `ZoneTable`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record to the end of the table. This fails, leaving
    /// the table unchanged, if the table already holds
    /// [`MAX_RECORDS`] records.
    pub fn push(&mut self, record: Record) -> Result<(), Error> {
        if self.is_full() {
            Err(Error::Full)
        } else {
            self.records.push(record);
            Ok(())
        }
    }

    /// Looks up the first record (in insertion order) whose domain is
    /// exactly equal to `domain`. The comparison is octet-for-octet, so
    /// it is case-sensitive.
    ///
    /// This is a linear scan over at most [`MAX_RECORDS`] records.
    pub fn lookup(&self, domain: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.domain() == domain)
    }

    /// Returns the number of records in the table.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns whether the table has reached [`MAX_RECORDS`].
    pub fn is_full(&self) -> bool {
        self.records.len() >= MAX_RECORDS
    }

    /// Returns an iterator over the records, in insertion order.
    pub fn iter(&self) -> slice::Iter<'_, Record> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a ZoneTable {
    type Item = &'a Record;
    type IntoIter = slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn record(domain: &str, rr_type: &str, value: &str) -> Record {
        Record::new(domain, rr_type, value).unwrap()
    }

    #[test]
    fn lookup_finds_exact_matches() {
        let mut table = ZoneTable::new();
        table.push(record("example.com", "A", "93.184.216.34")).unwrap();
        table.push(record("textzone.test", "CNAME", "example.com")).unwrap();
        assert_eq!(
            table.lookup("textzone.test").unwrap().value(),
            "example.com",
        );
        assert_eq!(table.lookup("example.com").unwrap().rr_type(), "A");
        assert!(table.lookup("unknown.test").is_none());
        assert!(table.lookup("example").is_none());
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let mut table = ZoneTable::new();
        table.push(record("example.com", "A", "93.184.216.34")).unwrap();
        assert!(table.lookup("EXAMPLE.COM").is_none());
        assert!(table.lookup("Example.com").is_none());
    }

    #[test]
    fn lookup_returns_first_inserted_duplicate() {
        let mut table = ZoneTable::new();
        table.push(record("dup.test", "A", "192.0.2.1")).unwrap();
        table.push(record("other.test", "A", "192.0.2.2")).unwrap();
        table.push(record("dup.test", "A", "192.0.2.3")).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup("dup.test").unwrap().value(), "192.0.2.1");
    }

    #[test]
    fn every_loaded_domain_resolves_to_its_first_record() {
        let mut table = ZoneTable::new();
        for i in 0..50 {
            let domain = format!("host{}.test", i % 20);
            table.push(record(&domain, "A", &format!("192.0.2.{i}"))).unwrap();
        }
        for r in &table {
            let first = table.iter().find(|s| s.domain() == r.domain()).unwrap();
            assert_eq!(table.lookup(r.domain()), Some(first));
        }
    }

    #[test]
    fn push_rejects_records_past_capacity() {
        let mut table = ZoneTable::new();
        for i in 0..MAX_RECORDS {
            table.push(record(&format!("host{i}.test"), "A", "192.0.2.1")).unwrap();
        }
        assert!(table.is_full());
        assert_eq!(
            table.push(record("extra.test", "A", "192.0.2.2")),
            Err(Error::Full),
        );
        assert_eq!(table.len(), MAX_RECORDS);
        assert!(table.lookup("extra.test").is_none());
        assert_eq!(table.lookup("host0.test").unwrap().value(), "192.0.2.1");
    }
}
