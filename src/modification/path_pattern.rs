use std::fmt;
use std::str::FromStr;

use crate::errors::{StorageError, StorageResult};

/// Separator between the nodes of a series path.
const PATH_SEPARATOR: char = '.';

/// Wildcard matching exactly one node of a series path.
const SINGLE_LEVEL_WILDCARD: &str = "*";

/// Wildcard matching one or more nodes of a series path.
const MULTI_LEVEL_WILDCARD: &str = "**";

/**
A series path that may contain wildcards, e.g. `root.sg1.*.temperature` or `root.sg1.**`.

A pattern is a sequence of nodes separated by `.`. A `*` node matches exactly one node of a series
path and a `**` node matches one or more nodes. Every other node must match literally.

# Invariants

The pattern is never empty, has no empty nodes and contains no line breaks since it is stored
inside a line-oriented record.
*/
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathPattern(String);

/// Public methods
impl PathPattern {
    /// Create a new [`PathPattern`], validating that it can be stored in a modification record.
    pub fn new<S: Into<String>>(pattern: S) -> StorageResult<Self> {
        let pattern: String = pattern.into();
        if pattern.is_empty() {
            return Err(StorageError::InvalidRecord(
                "A path pattern cannot be empty.".to_string(),
            ));
        }

        if pattern.contains(['\n', '\r']) {
            return Err(StorageError::InvalidRecord(format!(
                "The path pattern {pattern:?} contains a line break."
            )));
        }

        if pattern.split(PATH_SEPARATOR).any(|node| node.is_empty()) {
            return Err(StorageError::InvalidRecord(format!(
                "The path pattern {pattern:?} contains an empty node."
            )));
        }

        Ok(PathPattern(pattern))
    }

    /// Get the pattern as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the pattern contains a wildcard node.
    pub fn has_wildcard(&self) -> bool {
        self.nodes()
            .any(|node| node == SINGLE_LEVEL_WILDCARD || node == MULTI_LEVEL_WILDCARD)
    }

    /// Returns true if the full series path `series_path` is matched by this pattern.
    pub fn matches(&self, series_path: &str) -> bool {
        let pattern_nodes: Vec<&str> = self.nodes().collect();
        let series_nodes: Vec<&str> = series_path.split(PATH_SEPARATOR).collect();

        PathPattern::match_nodes(&pattern_nodes, &series_nodes)
    }
}

/// Private methods
impl PathPattern {
    fn nodes(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_SEPARATOR)
    }

    fn match_nodes(pattern_nodes: &[&str], series_nodes: &[&str]) -> bool {
        match pattern_nodes.split_first() {
            None => series_nodes.is_empty(),
            Some((&MULTI_LEVEL_WILDCARD, remaining_pattern)) => (1..=series_nodes.len())
                .any(|consumed| {
                    PathPattern::match_nodes(remaining_pattern, &series_nodes[consumed..])
                }),
            Some((&SINGLE_LEVEL_WILDCARD, remaining_pattern)) => {
                !series_nodes.is_empty()
                    && PathPattern::match_nodes(remaining_pattern, &series_nodes[1..])
            }
            Some((node, remaining_pattern)) => {
                series_nodes.first() == Some(node)
                    && PathPattern::match_nodes(remaining_pattern, &series_nodes[1..])
            }
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PathPattern {
    type Err = StorageError;

    fn from_str(pattern: &str) -> StorageResult<PathPattern> {
        PathPattern::new(pattern)
    }
}
