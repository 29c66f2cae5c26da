//! The directory tree described by a package index.
//!
//! The index is a flat list in pre-order: a directory record opens a scope, an updir record (`..`)
//! closes it, file records land in whichever scope is open. [`TreeBuilder`] replays that list into
//! a [`Tree`], an arena of [`Node`]s addressed by [`NodeId`]. Parents are plain ids, so nothing in the
//! tree owns anything but its children.

use std::fmt;

use tracing::trace;

use crate::error::FormatError;
use crate::types::{name_field, validate_file_range, VpEntry};

/// Handle to a node inside the [`Tree`] that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The implicit root directory
    pub const ROOT: NodeId = NodeId(0);

    /// Position of the node in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A directory and the ids of its children, in index order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub(crate) name: Box<str>,
    pub(crate) name_raw: Box<[u8]>,
    pub(crate) record: Option<usize>,
    pub(crate) timestamp: u32,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
}

impl Directory {
    /// Ids of the children in index order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// A file stored in the package
///
/// Only the location of the data is kept, the bytes are read on demand through
/// [`crate::VpArchive::open_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub(crate) name: Box<str>,
    pub(crate) name_raw: Box<[u8]>,
    pub(crate) record: usize,
    pub(crate) offset: u32,
    pub(crate) size: u32,
    pub(crate) timestamp: u32,
    pub(crate) parent: NodeId,
}

impl FileEntry {
    /// Offset of the data from the start of the package
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Size of the data in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The name exactly as stored in the index
    ///
    /// To be used when the name was not valid UTF-8 and [`Node::name`] had to replace bytes.
    pub fn name_raw(&self) -> &[u8] {
        &self.name_raw
    }
}

/// An element of the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A directory record and everything up to its updir
    Directory(Directory),
    /// A file record
    File(FileEntry),
}

impl Node {
    /// Get the name of the node
    ///
    /// # Warnings
    ///
    /// Names come straight from the package. They may contain path separators or be `..`, so
    /// they should not be joined onto a filesystem path unchecked.
    pub fn name(&self) -> &str {
        match self {
            Node::Directory(d) => &d.name,
            Node::File(f) => &f.name,
        }
    }

    /// The name bytes as stored in the index, without the NUL terminator
    pub fn name_raw(&self) -> &[u8] {
        match self {
            Node::Directory(d) => &d.name_raw,
            Node::File(f) => &f.name_raw,
        }
    }

    /// Position of the record that produced this node in the index, `None` for the root
    pub fn record(&self) -> Option<usize> {
        match self {
            Node::Directory(d) => d.record,
            Node::File(f) => Some(f.record),
        }
    }

    /// Modification time in seconds since the unix epoch
    pub fn timestamp(&self) -> u32 {
        match self {
            Node::Directory(d) => d.timestamp,
            Node::File(f) => f.timestamp,
        }
    }

    /// The enclosing directory, `None` for the root
    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Directory(d) => d.parent,
            Node::File(f) => Some(f.parent),
        }
    }

    /// Whether this is a directory
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory(_))
    }

    /// The file behind this node, if it is one
    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Node::File(f) => Some(f),
            Node::Directory(_) => None,
        }
    }

    /// The directory behind this node, if it is one
    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Node::Directory(d) => Some(d),
            Node::File(_) => None,
        }
    }

    /// The index record describing this node, carrying the name bytes unchanged
    pub fn to_entry(&self) -> VpEntry {
        match self {
            Node::Directory(d) => VpEntry {
                name: name_field(&d.name_raw),
                ..VpEntry::directory("", d.timestamp)
            },
            Node::File(f) => VpEntry {
                name: name_field(&f.name_raw),
                ..VpEntry::file("", f.offset, f.size, f.timestamp)
            },
        }
    }
}

/// The directory tree of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self {
            nodes: vec![Node::Directory(Directory {
                name: "".into(),
                name_raw: Box::default(),
                record: None,
                timestamp: 0,
                parent: None,
                children: Vec::new(),
            })],
        }
    }
}

impl Tree {
    /// Get a node by id
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Number of nodes, including the root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds nothing but the root
    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    /// Children of a directory, empty for files and unknown ids
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.get(id) {
            Some(Node::Directory(d)) => &d.children,
            _ => &[],
        }
    }

    /// Walk the tree in pre-order, skipping the root.
    ///
    /// The iterator borrows the tree and can be created again at any time.
    pub fn iter(&self) -> PreOrder<'_> {
        let stack = self
            .children(NodeId::ROOT)
            .iter()
            .rev()
            .map(|&id| (0, id))
            .collect();
        PreOrder { tree: self, stack }
    }

    /// All files in pre-order
    pub fn files(&self) -> impl Iterator<Item = (NodeId, &FileEntry)> {
        self.iter()
            .filter_map(|(_, id, node)| node.as_file().map(|f| (id, f)))
    }

    /// Find the first file, in pre-order, with the given name.
    ///
    /// Directories are never returned. Names may repeat across directories, use
    /// [`Tree::find_path`] to pick a specific one.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.files()
            .find(|(_, f)| &*f.name == name)
            .map(|(id, _)| id)
    }

    /// Find a file by its `/` separated path from the root.
    ///
    /// Sibling directories sharing a name are all searched, in index order.
    pub fn find_path(&self, path: &str) -> Option<NodeId> {
        let components: Vec<_> = path.split('/').filter(|c| !c.is_empty()).collect();
        self.find_below(NodeId::ROOT, &components)
    }

    fn find_below(&self, current: NodeId, components: &[&str]) -> Option<NodeId> {
        let Some((first, rest)) = components.split_first() else {
            return self
                .get(current)
                .filter(|node| !node.is_dir())
                .map(|_| current);
        };

        self.children(current)
            .iter()
            .copied()
            .filter(|&child| self.nodes[child.0].name() == *first)
            .find_map(|child| self.find_below(child, rest))
    }

    /// The `/` separated path of a node, starting below the root
    pub fn path(&self, id: NodeId) -> String {
        let mut elements = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current.filter(|&c| c != NodeId::ROOT).and_then(|c| self.get(c)) {
            elements.push(node.name());
            current = node.parent();
        }
        elements.reverse();
        elements.join("/")
    }

    /// An indented rendering of the whole tree, one line per node.
    pub fn listing(&self) -> Listing<'_> {
        Listing { tree: self }
    }

    fn push(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        if let Some(Node::Directory(d)) = self.nodes.get_mut(parent.0) {
            d.children.push(id);
        }
        id
    }
}

/// Pre-order traversal yielding `(depth, id, node)`, depth 0 being the children of the root
pub struct PreOrder<'a> {
    tree: &'a Tree,
    stack: Vec<(usize, NodeId)>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = (usize, NodeId, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, id) = self.stack.pop()?;
        let node = self.tree.get(id)?;
        self.stack.extend(
            self.tree
                .children(id)
                .iter()
                .rev()
                .map(|&child| (depth + 1, child)),
        );
        Some((depth, id, node))
    }
}

/// Indentation used per level by [`Listing`]
pub const LISTING_INDENT: &str = "   ";

/// Text rendering of a [`Tree`]
///
/// Directories end with `/`, every level is indented by [`LISTING_INDENT`].
#[derive(Clone, Copy)]
pub struct Listing<'a> {
    tree: &'a Tree,
}

impl<'a> Listing<'a> {
    /// The lines of the listing, produced as the tree is walked
    pub fn entries(&self) -> impl Iterator<Item = ListingLine<'a>> + 'a {
        self.tree
            .iter()
            .map(|(depth, _, node)| ListingLine { depth, node })
    }

    /// The rendered lines
    pub fn lines(&self) -> impl Iterator<Item = String> + 'a {
        self.entries().map(|line| line.to_string())
    }
}

/// A single line of a [`Listing`]
#[derive(Clone, Copy)]
pub struct ListingLine<'a> {
    /// Depth below the root, 0 for the children of the root
    pub depth: usize,
    /// The node shown on this line
    pub node: &'a Node,
}

impl ListingLine<'_> {
    /// Leading whitespace for the depth of the node
    pub fn indent(&self) -> String {
        LISTING_INDENT.repeat(self.depth)
    }

    /// The name of the node, directories end with `/`
    pub fn label(&self) -> String {
        if self.node.is_dir() {
            format!("{}/", self.node.name())
        } else {
            self.node.name().to_owned()
        }
    }
}

impl fmt::Display for ListingLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.indent(), self.label())
    }
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// Rebuilds a [`Tree`] from index records
///
/// The cursor starts at the root. Directory records descend into a new directory, updir records
/// go back up, file records are added to the current directory after their data range has been
/// checked against `file_size`.
pub struct TreeBuilder {
    tree: Tree,
    cursor: NodeId,
    file_size: u64,
    consumed: usize,
}

impl TreeBuilder {
    /// Start with an empty root for a package of `file_size` bytes
    pub fn new(file_size: u64) -> Self {
        Self {
            tree: Tree::default(),
            cursor: NodeId::ROOT,
            file_size,
            consumed: 0,
        }
    }

    /// Apply the next record of the index.
    ///
    /// On error the builder should be dropped, the tree is not usable.
    pub fn push(&mut self, entry: &VpEntry) -> Result<(), FormatError> {
        let index = self.consumed;
        self.consumed += 1;

        if entry.is_updir() {
            self.cursor = self
                .tree
                .get(self.cursor)
                .and_then(Node::parent)
                .ok_or(FormatError::UpdirUnderflow { index })?;
            trace!(index, cursor = %self.cursor, "leaving directory");
        } else if entry.is_directory() {
            let name = entry.name();
            trace!(index, %name, "entering directory");
            self.cursor = self.tree.push(
                self.cursor,
                Node::Directory(Directory {
                    name: name.into(),
                    name_raw: entry.name_raw().into(),
                    record: Some(index),
                    timestamp: entry.timestamp as u32,
                    parent: Some(self.cursor),
                    children: Vec::new(),
                }),
            );
        } else {
            validate_file_range(entry, self.file_size)?;
            let name = entry.name();
            trace!(index, %name, offset = entry.offset, size = entry.size, "adding file");
            self.tree.push(
                self.cursor,
                Node::File(FileEntry {
                    name: name.into(),
                    name_raw: entry.name_raw().into(),
                    record: index,
                    offset: entry.offset as u32,
                    size: entry.size as u32,
                    timestamp: entry.timestamp as u32,
                    parent: self.cursor,
                }),
            );
        }

        Ok(())
    }

    /// How many directories are still open below the root
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.cursor;
        while let Some(parent) = self.tree.get(current).and_then(Node::parent) {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Take the finished tree
    pub fn finish(self) -> Tree {
        self.tree
    }
}
