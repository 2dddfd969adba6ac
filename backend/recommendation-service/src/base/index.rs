//! Sparse id ↔ dense index mapping
//!
//! A sparse id is a user id or item id as stored in the data store. The dense
//! index is the row used to address factor matrices and adjacency lists, so
//! it is contiguous and starts at 0.
//!
//! Indices are grown only while a dataset is being built and are read-only
//! afterwards, which is what lets training workers share them freely.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Hash-map backed index for arbitrary string ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapIndex {
    numbers: HashMap<String, usize>,
    names: Vec<String>,
}

impl MapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Assigns the next dense index to `name` unless it is already present.
    pub fn add(&mut self, name: &str) {
        if !self.numbers.contains_key(name) {
            self.numbers.insert(name.to_string(), self.names.len());
            self.names.push(name.to_string());
        }
    }

    pub fn to_number(&self, name: &str) -> Option<usize> {
        self.numbers.get(name).copied()
    }

    pub fn to_name(&self, index: usize) -> Result<&str> {
        self.names
            .get(index)
            .map(String::as_str)
            .ok_or(AppError::IndexOutOfRange {
                index,
                len: self.names.len(),
            })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Index whose names are integer literals: the dense index of `"7"` is 7.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectIndex {
    limit: usize,
}

impl DirectIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// One plus the largest integer added so far.
    pub fn len(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    pub fn add(&mut self, name: &str) -> Result<()> {
        let index = parse_direct(name)?;
        if index >= self.limit {
            self.limit = index + 1;
        }
        Ok(())
    }

    pub fn to_number(&self, name: &str) -> Option<usize> {
        match parse_direct(name) {
            Ok(index) if index < self.limit => Some(index),
            _ => None,
        }
    }

    pub fn to_name(&self, index: usize) -> Result<String> {
        if index >= self.limit {
            return Err(AppError::IndexOutOfRange {
                index,
                len: self.limit,
            });
        }
        Ok(index.to_string())
    }
}

fn parse_direct(name: &str) -> Result<usize> {
    name.parse::<usize>()
        .map_err(|e| AppError::InvalidName(format!("{:?} is not a direct index: {}", name, e)))
}

/// Closed set of index families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Index {
    Map(MapIndex),
    Direct(DirectIndex),
}

impl Default for Index {
    fn default() -> Self {
        Index::Map(MapIndex::new())
    }
}

impl Index {
    pub fn map() -> Self {
        Index::Map(MapIndex::new())
    }

    pub fn direct() -> Self {
        Index::Direct(DirectIndex::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Index::Map(index) => index.len(),
            Index::Direct(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, name: &str) -> Result<()> {
        match self {
            Index::Map(index) => {
                index.add(name);
                Ok(())
            }
            Index::Direct(index) => index.add(name),
        }
    }

    pub fn to_number(&self, name: &str) -> Option<usize> {
        match self {
            Index::Map(index) => index.to_number(name),
            Index::Direct(index) => index.to_number(name),
        }
    }

    pub fn to_name(&self, index: usize) -> Result<String> {
        match self {
            Index::Map(map) => map.to_name(index).map(str::to_string),
            Index::Direct(direct) => direct.to_name(index),
        }
    }

    /// All names ordered by dense index.
    pub fn get_names(&self) -> Vec<String> {
        match self {
            Index::Map(index) => index.names().to_vec(),
            Index::Direct(index) => (0..index.len()).map(|i| i.to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_index() {
        let mut index = Index::map();
        assert_eq!(index.len(), 0);
        for name in ["1", "2", "4", "8"] {
            index.add(name).unwrap();
        }
        assert_eq!(index.len(), 4);
        assert_eq!(index.to_number("1"), Some(0));
        assert_eq!(index.to_number("2"), Some(1));
        assert_eq!(index.to_number("4"), Some(2));
        assert_eq!(index.to_number("8"), Some(3));
        assert_eq!(index.to_number("1000"), None);
        assert_eq!(index.to_name(0).unwrap(), "1");
        assert_eq!(index.to_name(3).unwrap(), "8");
        assert!(matches!(
            index.to_name(4),
            Err(AppError::IndexOutOfRange { index: 4, len: 4 })
        ));
        assert_eq!(index.get_names(), vec!["1", "2", "4", "8"]);
    }

    #[test]
    fn test_map_index_add_is_idempotent() {
        let mut index = MapIndex::new();
        index.add("a");
        index.add("b");
        index.add("a");
        assert_eq!(index.len(), 2);
        assert_eq!(index.to_number("a"), Some(0));
        assert_eq!(index.to_number("b"), Some(1));
    }

    #[test]
    fn test_map_index_round_trip() {
        let mut index = MapIndex::new();
        for i in 0..100 {
            index.add(&format!("user_{}", (i * 37) % 61));
        }
        for i in 0..index.len() {
            let name = index.to_name(i).unwrap().to_string();
            assert_eq!(index.to_number(&name), Some(i));
        }
    }

    #[test]
    fn test_direct_index() {
        let mut index = Index::direct();
        assert_eq!(index.len(), 0);
        for name in ["1", "2", "4", "8"] {
            index.add(name).unwrap();
        }
        assert_eq!(index.len(), 9);
        assert_eq!(index.to_number("1"), Some(1));
        assert_eq!(index.to_number("8"), Some(8));
        assert_eq!(index.to_number("1000"), None);
        assert_eq!(index.to_name(0).unwrap(), "0");
        assert_eq!(index.to_name(3).unwrap(), "3");
        assert!(index.to_name(9).is_err());

        let names = index.get_names();
        assert_eq!(names.len(), 9);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(name, &i.to_string());
        }
    }

    #[test]
    fn test_direct_index_rejects_non_integer() {
        let mut index = DirectIndex::new();
        assert!(matches!(index.add("abc"), Err(AppError::InvalidName(_))));
        assert!(matches!(index.add("-1"), Err(AppError::InvalidName(_))));
        assert_eq!(index.len(), 0);
        assert_eq!(index.to_number("abc"), None);
    }
}
