use byteorder::{LittleEndian, WriteBytesExt};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_test::traced_test;
use vp_archive::{error::Error, VpArchive};
use walkdir::WalkDir;

enum Record<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8]),
    Up,
}

/// Encode a package by hand, independent of the writer in the crate
fn package(records: &[Record]) -> io::Result<Vec<u8>> {
    let data: Vec<u8> = records
        .iter()
        .filter_map(|r| match r {
            Record::File(_, contents) => Some(*contents),
            _ => None,
        })
        .flatten()
        .copied()
        .collect();

    let mut out = Vec::new();
    out.write_all(b"VPVP")?;
    out.write_i32::<LittleEndian>(2)?;
    out.write_i32::<LittleEndian>(16 + data.len() as i32)?;
    out.write_i32::<LittleEndian>(records.len() as i32)?;
    out.write_all(&data)?;

    let mut offset = 16;
    for record in records {
        let (offset, size, name) = match record {
            Record::Dir(name) => (0, 0, *name),
            Record::Up => (0, 0, ".."),
            Record::File(name, contents) => {
                let at = offset;
                offset += contents.len() as i32;
                (at, contents.len() as i32, *name)
            }
        };
        out.write_i32::<LittleEndian>(offset)?;
        out.write_i32::<LittleEndian>(size)?;
        let mut raw = [0u8; 32];
        raw[..name.len()].copy_from_slice(name.as_bytes());
        out.write_all(&raw)?;
        out.write_i32::<LittleEndian>(1_000_000_000)?;
    }

    Ok(out)
}

fn mod_package() -> io::Result<Vec<u8>> {
    package(&[
        Record::Dir("data"),
        Record::Dir("maps"),
        Record::File("alpha.pof", b"AAAA"),
        Record::File("beta.pof", b"BB"),
        Record::Up,
        Record::File("readme.txt", b"hello"),
        Record::Dir("tables"),
        Record::File("ships.tbl", b"first"),
        Record::Up,
        Record::Dir("mods"),
        Record::File("ships.tbl", b"second"),
        Record::Up,
        Record::Up,
    ])
}

fn write_package(dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join("mod.vp");
    fs::write(&path, mod_package()?)?;
    Ok(path)
}

#[traced_test]
#[test]
fn open_and_list() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let vp = VpArchive::open(write_package(dir.path())?)?;

    assert_eq!(vp.len(), 5);
    assert_eq!(vp.header().entry_count, 13);
    assert_eq!(vp.path(), Some(dir.path().join("mod.vp").as_path()));
    assert_eq!(
        vp.listing().to_string(),
        [
            "data/",
            "   maps/",
            "      alpha.pof",
            "      beta.pof",
            "   readme.txt",
            "   tables/",
            "      ships.tbl",
            "   mods/",
            "      ships.tbl",
            "",
        ]
        .join("\n")
    );
    assert_eq!(
        vp.file_names().collect::<Vec<_>>(),
        vec!["alpha.pof", "beta.pof", "readme.txt", "ships.tbl", "ships.tbl"]
    );

    Ok(())
}

#[test]
fn duplicate_names() -> Result<(), Error> {
    let mut vp = VpArchive::new(io::Cursor::new(mod_package()?))?;

    let mut first = String::new();
    vp.by_name("ships.tbl")?.read_to_string(&mut first)?;
    assert_eq!(first, "first");

    let id = vp.find_path("data/mods/ships.tbl").ok_or(Error::CustomError(
        "missing data/mods/ships.tbl".into(),
    ))?;
    assert_eq!(vp.read_file(id)?, b"second");
    assert_eq!(vp.tree().path(id), "data/mods/ships.tbl");

    assert!(vp.find_path("data/mods").is_none());
    assert!(vp.find("mods").is_none());

    Ok(())
}

#[traced_test]
#[test]
fn extract_everything() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let mut vp = VpArchive::open(write_package(dir.path())?)?;

    let out = dir.path().join("out");
    vp.extract_all(&out)?;

    let mut found = WalkDir::new(&out)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| {
            let relative = e.path().strip_prefix(&out).map(Path::to_path_buf);
            (relative, e.file_type().is_dir())
        })
        .map(|(relative, is_dir)| {
            let relative = relative.map_err(|e| Error::CustomError(e.to_string()))?;
            Ok((relative.to_string_lossy().replace('\\', "/"), is_dir))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    found.sort();
    info!(?found);

    assert_eq!(
        found,
        vec![
            ("data".to_owned(), true),
            ("data/maps".to_owned(), true),
            ("data/maps/alpha.pof".to_owned(), false),
            ("data/maps/beta.pof".to_owned(), false),
            ("data/mods".to_owned(), true),
            ("data/mods/ships.tbl".to_owned(), false),
            ("data/readme.txt".to_owned(), false),
            ("data/tables".to_owned(), true),
            ("data/tables/ships.tbl".to_owned(), false),
        ]
    );
    assert_eq!(fs::read(out.join("data/maps/alpha.pof"))?, b"AAAA");
    assert_eq!(fs::read(out.join("data/mods/ships.tbl"))?, b"second");

    // a second run overwrites what is already there
    fs::write(out.join("data/readme.txt"), b"stale contents")?;
    vp.extract_all(&out)?;
    assert_eq!(fs::read(out.join("data/readme.txt"))?, b"hello");

    Ok(())
}

#[test]
fn extract_single_file() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let mut vp = VpArchive::open(write_package(dir.path())?)?;
    let id = vp
        .find("beta.pof")
        .ok_or(Error::CustomError("missing beta.pof".into()))?;

    // into a directory, keeping the name
    let written = vp.extract_file(id, dir.path())?;
    assert_eq!(written, dir.path().join("beta.pof"));
    assert_eq!(fs::read(&written)?, b"BB");

    // to an explicit file name
    let renamed = dir.path().join("renamed.bin");
    assert_eq!(vp.extract_file(id, &renamed)?, renamed);
    assert_eq!(fs::read(&renamed)?, b"BB");

    Ok(())
}

#[test]
fn unsafe_names_are_not_extracted() -> Result<(), Error> {
    let bytes = package(&[
        Record::Dir("data"),
        Record::File("../escape.txt", b"gotcha"),
        Record::Up,
    ])?;
    let mut vp = VpArchive::new(io::Cursor::new(bytes))?;

    let dir = tempfile::tempdir()?;
    let out = dir.path().join("out");
    assert!(matches!(
        vp.extract_all(&out),
        Err(Error::UnsafeEntryName(name)) if name == "../escape.txt"
    ));
    assert!(!dir.path().join("escape.txt").exists());

    Ok(())
}

#[test]
fn corrupted_packages_are_rejected() -> Result<(), Error> {
    let good = mod_package()?;

    let mut signature = good.clone();
    signature[..4].copy_from_slice(b"PKZP");
    assert!(VpArchive::new(io::Cursor::new(signature)).is_err());

    let truncated = good[..good.len() - 10].to_vec();
    let err = VpArchive::new(io::Cursor::new(truncated)).unwrap_err();
    assert!(err.as_format().is_some());

    let mut range = good.clone();
    // size of alpha.pof, the third record
    let index = 16 + 4 + 2 + 5 + 5 + 6;
    range[index + 2 * 44 + 4..index + 2 * 44 + 8].copy_from_slice(&9999i32.to_le_bytes());
    let err = VpArchive::new(io::Cursor::new(range)).unwrap_err();
    assert!(err.as_format().is_some());

    Ok(())
}
