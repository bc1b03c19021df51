//! Tree object
//!
//! Trees represent directory snapshots. They contain entries for files
//! (blobs) and subdirectories (other trees), along with their names and
//! modes. Entry names are unique within a tree and ordered by byte value.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<32-byte-sha256>`
//!
//! ## Tree Building
//!
//! [`TreeBuilder`] assembles the hierarchy from flat staging entries and
//! stores trees bottom-up, so every child hash is known before the parent
//! is serialized.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use bytes::Bytes;

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object::{Object, Packable, Unpackable, canonical_bytes};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};

/// A single tree entry: mode + object id, keyed by name in the parent map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn kind(&self) -> ObjectType {
        if self.mode.is_directory() {
            ObjectType::Tree
        } else {
            ObjectType::Blob
        }
    }
}

/// Tree object representing one directory level
///
/// Entries are kept in a `BTreeMap` so serialization is canonical: names
/// sorted by byte value, unique within the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    pub fn entries(&self) -> impl Iterator<Item = (&String, &TreeEntry)> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, name: String, entry: TreeEntry) -> Result<()> {
        if name.is_empty() || name.contains('/') || name.contains('\0') {
            return Err(Error::invalid_argument(format!(
                "invalid tree entry name '{name}'"
            )));
        }
        self.entries.insert(name, entry);
        Ok(())
    }
}

impl Packable for Tree {
    fn serialize(&self) -> Result<Bytes> {
        let mut content_bytes = Vec::new();

        for (name, entry) in &self.entries {
            let header = format!("{} {}", entry.mode, name);
            content_bytes.write_all(header.as_bytes())?;
            content_bytes.push(0);
            entry.oid.write_raw_to(&mut content_bytes)?;
        }

        Ok(canonical_bytes(self.object_type(), &content_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(reader: impl BufRead) -> Result<Self> {
        let mut entries = BTreeMap::new();
        let mut reader = reader;

        // reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more entries
            }
            if mode_bytes.last() != Some(&b' ') {
                return Err(Error::ObjectCorrupt {
                    object: String::new(),
                    reason: "unexpected EOF in tree entry mode".to_string(),
                });
            }
            mode_bytes.pop(); // drop the space

            let mode_str =
                std::str::from_utf8(&mode_bytes).map_err(|_| Error::ObjectCorrupt {
                    object: String::new(),
                    reason: "non-utf8 tree entry mode".to_string(),
                })?;
            let mode = EntryMode::from_octal_str(mode_str)?;

            name_bytes.clear();
            let n = reader.read_until(b'\0', &mut name_bytes)?;
            if n == 0 || name_bytes.last() != Some(&0) {
                return Err(Error::ObjectCorrupt {
                    object: String::new(),
                    reason: "unexpected EOF in tree entry name".to_string(),
                });
            }
            name_bytes.pop(); // drop NUL
            let name = std::str::from_utf8(&name_bytes)
                .map_err(|_| Error::ObjectCorrupt {
                    object: String::new(),
                    reason: "non-utf8 tree entry name".to_string(),
                })?
                .to_owned();

            let oid = ObjectId::read_raw_from(&mut reader)?;

            entries.insert(name, TreeEntry { mode, oid });
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.entries
            .iter()
            .map(|(name, entry)| {
                format!(
                    "{} {} {}\t{}",
                    entry.mode,
                    entry.kind().as_str(),
                    entry.oid.as_ref(),
                    name
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}

/// Intermediate node while assembling a tree hierarchy from flat paths.
#[derive(Debug)]
enum BuildNode {
    File(IndexEntry),
    Dir(BTreeMap<String, BuildNode>),
}

/// Builds a tree hierarchy from staging entries and stores it bottom-up.
#[derive(Debug, Default)]
pub struct TreeBuilder {
    root: BTreeMap<String, BuildNode>,
}

impl TreeBuilder {
    /// Build from an iterator of staging entries.
    pub fn from_entries<'a>(entries: impl Iterator<Item = &'a IndexEntry>) -> Result<Self> {
        let mut builder = Self::default();
        for entry in entries {
            builder.add(entry)?;
        }
        Ok(builder)
    }

    fn add(&mut self, entry: &IndexEntry) -> Result<()> {
        let components: Vec<&str> = entry.path.split('/').collect();
        if components.iter().any(|part| part.is_empty()) {
            return Err(Error::invalid_argument(format!(
                "invalid staged path '{}'",
                entry.path
            )));
        }

        let mut node = &mut self.root;
        for part in &components[..components.len() - 1] {
            let child = node
                .entry((*part).to_string())
                .or_insert_with(|| BuildNode::Dir(BTreeMap::new()));
            node = match child {
                BuildNode::Dir(children) => children,
                BuildNode::File(_) => {
                    return Err(Error::invalid_argument(format!(
                        "path '{}' crosses a staged file",
                        entry.path
                    )));
                }
            };
        }

        let name = components[components.len() - 1].to_string();
        node.insert(name, BuildNode::File(entry.clone()));
        Ok(())
    }

    /// Store every tree level through `store`, children before parents.
    ///
    /// # Arguments
    ///
    /// * `store` - called once per tree object; must persist it and is
    ///   handed the serialized tree so each level is written exactly once
    ///
    /// # Returns
    ///
    /// The root tree's object id
    pub fn write<F>(&self, store: &mut F) -> Result<ObjectId>
    where
        F: FnMut(&Tree) -> Result<ObjectId>,
    {
        Self::write_level(&self.root, store)
    }

    fn write_level<F>(level: &BTreeMap<String, BuildNode>, store: &mut F) -> Result<ObjectId>
    where
        F: FnMut(&Tree) -> Result<ObjectId>,
    {
        let mut tree = Tree::default();

        for (name, node) in level {
            let entry = match node {
                BuildNode::File(index_entry) => TreeEntry {
                    mode: index_entry.mode,
                    oid: index_entry.oid.clone(),
                },
                BuildNode::Dir(children) => TreeEntry {
                    mode: EntryMode::Directory,
                    oid: Self::write_level(children, store)?,
                },
            };
            tree.insert(name.clone(), entry)?;
        }

        store(&tree)
    }
}
