use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_test::traced_test;
use vp_archive::{
    build_from_directory, error::Error, write::VpWriterOptions, Replaced, VpArchive,
};
use walkdir::WalkDir;

fn build_package(dir: &Path) -> Result<PathBuf, Error> {
    let data = dir.join("source/data");
    fs::create_dir_all(data.join("tables"))?;
    fs::write(data.join("tables/ships.tbl"), b"0123456789")?;
    fs::write(data.join("tables/weapons.tbl"), b"weapons")?;
    fs::write(data.join("readme.txt"), b"hello")?;

    let package = dir.join("mod.vp");
    build_from_directory(&data, &package, VpWriterOptions::default())?;
    Ok(package)
}

fn scratch_dirs() -> Result<usize, Error> {
    Ok(fs::read_dir(std::env::temp_dir())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("vptool-"))
        .count())
}

/// Every path below `root` mapped to its contents, `None` for directories
fn snapshot(root: &Path) -> Result<BTreeMap<String, Option<Vec<u8>>>, Error> {
    let mut found = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| Error::CustomError(e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");
        let contents = if entry.file_type().is_dir() {
            None
        } else {
            Some(fs::read(entry.path())?)
        };
        found.insert(relative, contents);
    }
    Ok(found)
}

/// Path, offset and size of every file in the package
fn layout(vp: &VpArchive<File>) -> Vec<(String, u32, u32)> {
    vp.tree()
        .files()
        .map(|(id, f)| (vp.tree().path(id), f.offset(), f.size()))
        .collect()
}

#[traced_test]
#[test]
fn smaller_replacement_is_written_in_place() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let package = build_package(dir.path())?;
    let before = fs::metadata(&package)?.len();
    let layout_before = layout(&VpArchive::open(&package)?);

    let input = dir.path().join("ships.tbl");
    fs::write(&input, b"abc")?;

    let mut vp = VpArchive::open(&package)?;
    assert_eq!(
        vp.replace_file("ships.tbl", &input)?,
        Replaced::InPlace { wasted: 7 }
    );
    assert_eq!(fs::metadata(&package)?.len(), before);

    let mut reopened = VpArchive::open(&package)?;
    let id = reopened
        .find_path("data/tables/ships.tbl")
        .ok_or(Error::CustomError("ships.tbl vanished".into()))?;
    assert_eq!(reopened.read_file(id)?, b"abc");

    // only the size of the replaced file changed
    let expected: Vec<_> = layout_before
        .into_iter()
        .map(|(path, offset, size)| {
            let size = if path == "data/tables/ships.tbl" { 3 } else { size };
            (path, offset, size)
        })
        .collect();
    assert_eq!(layout(&reopened), expected);

    Ok(())
}

#[traced_test]
#[test]
fn larger_replacement_rebuilds_the_package() -> Result<(), Error> {
    let scratch_before = scratch_dirs()?;

    let dir = tempfile::tempdir()?;
    let package = build_package(dir.path())?;

    let input = dir.path().join("ships.tbl");
    fs::write(&input, b"a much longer table than before")?;

    let mut vp = VpArchive::open(&package)?;
    assert_eq!(vp.replace_file("ships.tbl", &input)?, Replaced::Rebuilt);

    // the archive follows the rebuilt file
    let id = vp
        .find("ships.tbl")
        .ok_or(Error::CustomError("ships.tbl vanished".into()))?;
    assert_eq!(vp.read_file(id)?, b"a much longer table than before");
    assert_eq!(vp.tree().path(id), "data/tables/ships.tbl");

    // everything else comes back as it was
    let mut expected = snapshot(&dir.path().join("source"))?;
    expected.insert(
        "data/tables/ships.tbl".into(),
        Some(b"a much longer table than before".to_vec()),
    );

    let out = dir.path().join("out");
    let mut reopened = VpArchive::open(&package)?;
    assert_eq!(reopened.len(), 3);
    reopened.extract_all(&out)?;
    assert_eq!(snapshot(&out)?, expected);

    assert_eq!(scratch_dirs()?, scratch_before);

    Ok(())
}

#[traced_test]
#[test]
fn replacement_by_path_picks_the_branch() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let data = dir.path().join("source/data");
    fs::create_dir_all(data.join("a"))?;
    fs::create_dir_all(data.join("b"))?;
    fs::write(data.join("a/ships.tbl"), b"first table")?;
    fs::write(data.join("b/ships.tbl"), b"second table")?;

    let package = dir.path().join("mod.vp");
    build_from_directory(&data, &package, VpWriterOptions::default())?;

    let input = dir.path().join("ships.tbl");
    fs::write(&input, b"patched")?;

    let mut vp = VpArchive::open(&package)?;
    assert_eq!(
        vp.replace_file("data/b/ships.tbl", &input)?,
        Replaced::InPlace { wasted: 5 }
    );

    let out = dir.path().join("out");
    VpArchive::open(&package)?.extract_all(&out)?;
    assert_eq!(fs::read(out.join("data/a/ships.tbl"))?, b"first table");
    assert_eq!(fs::read(out.join("data/b/ships.tbl"))?, b"patched");

    Ok(())
}

#[test]
fn missing_record_leaves_data_alone() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let package = build_package(dir.path())?;
    let mut vp = VpArchive::open(&package)?;

    // rename the record on disk behind the archive's back
    let mut bytes = fs::read(&package)?;
    let index = i32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let record = bytes[index..]
        .chunks(44)
        .position(|r| r[8..].starts_with(b"ships.tbl\0"))
        .ok_or(Error::CustomError("no ships.tbl record".into()))?;
    bytes[index + record * 44 + 8] = b'x';
    fs::write(&package, &bytes)?;

    let input = dir.path().join("ships.tbl");
    fs::write(&input, b"abc")?;
    assert!(matches!(
        vp.replace_file("ships.tbl", &input),
        Err(Error::EntryNotFound(name)) if name == "ships.tbl"
    ));
    assert_eq!(fs::read(&package)?, bytes);

    Ok(())
}

#[test]
fn replacement_errors() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let package = build_package(dir.path())?;
    let mut vp = VpArchive::open(&package)?;

    let empty = dir.path().join("empty.tbl");
    fs::write(&empty, b"")?;
    assert!(matches!(
        vp.replace_file("ships.tbl", &empty),
        Err(Error::EmptyFile(_))
    ));

    let input = dir.path().join("ships.tbl");
    fs::write(&input, b"abc")?;
    assert!(matches!(
        vp.replace_file("missing.tbl", &input),
        Err(Error::FileNotFound(_))
    ));
    assert!(matches!(
        vp.replace_file("tables", &input),
        Err(Error::FileNotFound(_))
    ));
    assert!(matches!(
        vp.replace_file("data/tables", &input),
        Err(Error::FileNotFound(_))
    ));

    Ok(())
}

#[test]
fn rebuild_needs_a_path() -> Result<(), Error> {
    let dir = tempfile::tempdir()?;
    let package = build_package(dir.path())?;

    let input = dir.path().join("ships.tbl");
    fs::write(&input, vec![b'x'; 64])?;

    let mut vp = VpArchive::new(File::options().read(true).write(true).open(&package)?)?;
    assert!(matches!(
        vp.replace_file("ships.tbl", &input),
        Err(Error::NoBackingPath)
    ));

    Ok(())
}
