//! PLY export
//!
//! Writes positions as `float x, y, z` and colors as `uchar red, green,
//! blue`. The file can be read back by [`crate::loaders::ply`].

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{BackgroundTask, CloudError, PointStore};

/// Body encoding of an exported PLY file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlyEncoding {
    Ascii,
    #[default]
    BinaryLittleEndian,
}

impl PlyEncoding {
    fn header_name(self) -> &'static str {
        match self {
            PlyEncoding::Ascii => "ascii",
            PlyEncoding::BinaryLittleEndian => "binary_little_endian",
        }
    }
}

/// Write every record of `store` to `writer` as PLY
pub fn write_ply<W: Write>(writer: &mut W, store: &PointStore, encoding: PlyEncoding) -> Result<(), CloudError> {
    writeln!(writer, "ply")?;
    writeln!(writer, "format {} 1.0", encoding.header_name())?;
    writeln!(writer, "element vertex {}", store.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(writer, "property float {}", axis)?;
    }
    for channel in ["red", "green", "blue"] {
        writeln!(writer, "property uchar {}", channel)?;
    }
    writeln!(writer, "end_header")?;

    for record in store.records() {
        let p = record.position;
        let [r, g, b] = record.rgb();
        match encoding {
            PlyEncoding::Ascii => writeln!(writer, "{} {} {} {} {} {}", p.x, p.y, p.z, r, g, b)?,
            PlyEncoding::BinaryLittleEndian => {
                writer.write_all(&p.x.to_le_bytes())?;
                writer.write_all(&p.y.to_le_bytes())?;
                writer.write_all(&p.z.to_le_bytes())?;
                writer.write_all(&[r, g, b])?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write `store` to `path`, creating parent directories
pub fn export_ply(path: &Path, store: &PointStore, encoding: PlyEncoding) -> Result<(), CloudError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_ply(&mut writer, store, encoding)?;
    log::info!("Exported {} points to {}", store.len(), path.display());
    Ok(())
}

/// Export `<export_dir>/<name>.ply` on a background thread
pub fn export_in_background(
    store: Arc<PointStore>,
    export_dir: &Path,
    name: &str,
    encoding: PlyEncoding,
) -> Result<BackgroundTask<PathBuf>, CloudError> {
    let path = export_dir.join(format!("{}.ply", name));
    BackgroundTask::spawn("export", move || {
        export_ply(&path, &store, encoding)?;
        Ok(path)
    })
}
