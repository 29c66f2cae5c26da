//! This library handles reading, modifying and creating **VP** package files used by *FreeSpace 2*
//! and other games built on the *Volition* engine.
//!
//! # VP Archive Format Documentation
//!
//! A VP file (`.vp`, "Volition Package") bundles a directory tree of game assets into a single
//! file. Data is stored uncompressed, the directory structure lives in a flat index at the end of
//! the file.
//!
//! ## File Structure
//!
//! A VP file consists of a header, followed by the file data and the index.
//!
//! | Offset (bytes) | Field          | Description                                         |
//! |----------------|----------------|-----------------------------------------------------|
//! | 0x0000         | Signature      | 4 bytes: "VPVP"                                     |
//! | 0x0004         | Version        | 4 bytes: Fixed value 2                              |
//! | 0x0008         | Index Offset   | 4 bytes: Offset of the first index record           |
//! | 0x000C         | Entry Count    | 4 bytes: Number of index records                    |
//!
//! ### Data
//!
//! File contents follow the header back to back, starting at offset `0x10`. Nothing but the index
//! records say where one file ends and the next begins.
//!
//! ### Index
//!
//! The index is a sequence of fixed size records:
//!
//! | Offset (bytes) | Field          | Description                                         |
//! |----------------|----------------|-----------------------------------------------------|
//! | 0x0000         | Offset         | 4 bytes: Offset of the file data                    |
//! | 0x0004         | Size           | 4 bytes: Size of the file data, 0 for directories   |
//! | 0x0008         | Name           | 32 bytes: NUL terminated name                       |
//! | 0x0028         | Timestamp      | 4 bytes: Modification time, seconds since the epoch |
//!
//! The tree is encoded by the order of the records:
//!
//! - a record with size 0 opens a directory, everything after it is inside it,
//! - a record with size 0 named `..` closes the innermost open directory,
//! - any other record is a file in the innermost open directory.
//!
//! A package holding `data/test.txt` therefore has the records `data`, `test.txt` and `..`.
//!
//! ## Additional Information
//!
//! - **File Extension**: `.vp`
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Limits**: offsets and sizes are signed 32 bit, zero length files can not be stored
//!

pub mod error;
pub mod read;
pub mod replace;
pub mod tree;
pub mod types;
pub mod write;

pub use read::{VpArchive, VpFile};
pub use replace::Replaced;
pub use tree::{Node, NodeId, Tree};
pub use write::{build_from_directory, VpWriter, VpWriterOptions};
