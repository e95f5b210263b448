//! On-disk format for a persisted index
//!
//! Vector file, all integers little-endian:
//!
//! ```text
//! magic   b"DRVX"
//! version u32  (currently 1)
//! dim     u32
//! count   u64
//! data    count * dim f32, row-major
//! ```
//!
//! Metadata file: a JSON array whose `i`-th element describes row `i`.
//!
//! Writers go through a `.tmp` sibling that is renamed into place, so a
//! reader never observes a half-written file.

use docrag_core::{ChunkMetadata, RagError, Result};
use ndarray::{Array2, ArrayView2};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

const MAGIC: &[u8; 4] = b"DRVX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Sibling path used while a file is being written
pub fn tmp_path(path: &Path) -> PathBuf {
    sibling_path(path, ".tmp")
}

/// Sibling path holding the previous vector file while a pair is replaced
pub fn backup_path(path: &Path) -> PathBuf {
    sibling_path(path, ".bak")
}

fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| RagError::io(parent, e))?;
        }
    }
    Ok(())
}

fn put(writer: &mut impl Write, path: &Path, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes).map_err(|e| RagError::io(path, e))
}

fn not_found_or_io(path: &Path, err: std::io::Error) -> RagError {
    match err.kind() {
        ErrorKind::NotFound => RagError::NotFound(path.to_path_buf()),
        _ => RagError::io(path, err),
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| not_found_or_io(path, e))
}

/// Write the vector matrix to `path`
pub fn write_vectors(path: &Path, vectors: ArrayView2<'_, f32>) -> Result<()> {
    let (count, dim) = vectors.dim();
    let dim = u32::try_from(dim)
        .map_err(|_| RagError::ConfigError(format!("dimension {dim} does not fit the format")))?;

    create_parent_dir(path)?;
    let file = File::create(path).map_err(|e| RagError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    put(&mut writer, path, MAGIC)?;
    put(&mut writer, path, &FORMAT_VERSION.to_le_bytes())?;
    put(&mut writer, path, &dim.to_le_bytes())?;
    put(&mut writer, path, &(count as u64).to_le_bytes())?;
    for value in vectors.iter() {
        put(&mut writer, path, &value.to_le_bytes())?;
    }

    let file = writer
        .into_inner()
        .map_err(|e| RagError::io(path, e.into_error()))?;
    file.sync_all().map_err(|e| RagError::io(path, e))
}

/// Read a vector matrix written by [`write_vectors`]
pub fn read_vectors(path: &Path) -> Result<Array2<f32>> {
    let bytes = read_file(path)?;
    decode_vectors(&bytes)
        .map_err(|msg| RagError::CorruptIndex(format!("{}: {msg}", path.display())))
}

/// Read only the dimension recorded in a vector file header
pub fn read_dim(path: &Path) -> Result<usize> {
    let corrupt = |msg: String| RagError::CorruptIndex(format!("{}: {msg}", path.display()));

    let mut file = File::open(path).map_err(|e| not_found_or_io(path, e))?;
    let mut bytes = [0u8; HEADER_LEN];
    file.read_exact(&mut bytes).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => corrupt("file too short for header".to_string()),
        _ => RagError::io(path, e),
    })?;

    let header = parse_header(&bytes).map_err(corrupt)?;
    Ok(header.dim)
}

struct Header {
    dim: usize,
    count: usize,
}

fn parse_header(bytes: &[u8]) -> std::result::Result<Header, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("file too short ({} bytes)", bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err("bad magic".to_string());
    }

    let u32_at = |at: usize| {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    };
    let version = u32_at(4);
    if version != FORMAT_VERSION {
        return Err(format!("unsupported format version {version}"));
    }
    let dim = u32_at(8) as usize;
    if dim == 0 {
        return Err("zero dimension".to_string());
    }

    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = usize::try_from(u64::from_le_bytes(count_bytes))
        .map_err(|_| "row count overflows".to_string())?;

    Ok(Header { dim, count })
}

fn decode_vectors(bytes: &[u8]) -> std::result::Result<Array2<f32>, String> {
    let Header { dim, count } = parse_header(bytes)?;

    let expected_len = count
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| "payload length overflows".to_string())?;
    if bytes.len() != expected_len {
        return Err(format!(
            "expected {expected_len} bytes for {count} x {dim} vectors, found {}",
            bytes.len()
        ));
    }

    let data: Vec<f32> = bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Array2::from_shape_vec((count, dim), data).map_err(|e| e.to_string())
}

/// Write the metadata records to `path` as a JSON array
pub fn write_metadata(path: &Path, metadata: &[ChunkMetadata]) -> Result<()> {
    create_parent_dir(path)?;
    let file = File::create(path).map_err(|e| RagError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, metadata)?;

    let file = writer
        .into_inner()
        .map_err(|e| RagError::io(path, e.into_error()))?;
    file.sync_all().map_err(|e| RagError::io(path, e))
}

/// Read metadata records written by [`write_metadata`]
pub fn read_metadata(path: &Path) -> Result<Vec<ChunkMetadata>> {
    let bytes = read_file(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| RagError::CorruptIndex(format!("{}: {e}", path.display())))
}

/// Write both files through temporary siblings, then rename them into place
///
/// The previous vector file is moved to a `.bak` sibling until the metadata
/// rename succeeds. On any failure the previously saved pair is restored and
/// the temporary files are removed.
pub fn write_pair(
    vector_path: &Path,
    metadata_path: &Path,
    vectors: ArrayView2<'_, f32>,
    metadata: &[ChunkMetadata],
) -> Result<()> {
    let vector_tmp = tmp_path(vector_path);
    let metadata_tmp = tmp_path(metadata_path);

    let written = write_vectors(&vector_tmp, vectors)
        .and_then(|()| write_metadata(&metadata_tmp, metadata));
    if let Err(err) = written {
        let _ = fs::remove_file(&vector_tmp);
        let _ = fs::remove_file(&metadata_tmp);
        return Err(err);
    }

    let backup = backup_path(vector_path);
    let has_backup = match fs::rename(vector_path, &backup) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            let _ = fs::remove_file(&vector_tmp);
            let _ = fs::remove_file(&metadata_tmp);
            return Err(RagError::io(vector_path, e));
        }
    };

    let renamed = fs::rename(&vector_tmp, vector_path)
        .map_err(|e| RagError::io(vector_path, e))
        .and_then(|()| {
            fs::rename(&metadata_tmp, metadata_path).map_err(|e| RagError::io(metadata_path, e))
        });
    if let Err(err) = renamed {
        let _ = fs::remove_file(&vector_tmp);
        let _ = fs::remove_file(&metadata_tmp);
        if has_backup {
            let _ = fs::rename(&backup, vector_path);
        } else {
            let _ = fs::remove_file(vector_path);
        }
        return Err(err);
    }

    if has_backup {
        fs::remove_file(&backup).map_err(|e| RagError::io(&backup, e))?;
    }
    Ok(())
}
