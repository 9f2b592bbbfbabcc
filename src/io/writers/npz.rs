use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::processing::pipeline::OutputBand;
use crate::error::{Error, Result};
use crate::io::npy::write_npz;

/// Write output bands into a `.npz` archive keyed by short band name.
///
/// The archive is assembled in a temporary file in the target directory
/// and moved into place once complete.
pub fn write_npz_bands(output: &Path, bands: &[OutputBand]) -> Result<()> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)?;
    let arrays: Vec<(String, _)> = bands
        .iter()
        .map(|b| (b.name.clone(), b.data.view()))
        .collect();
    write_npz(tmp.as_file(), &arrays)?;
    tmp.persist(output).map_err(|e| Error::Io(e.error))?;
    debug!("Wrote {} bands to {:?}", bands.len(), output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::npy::read_npz;
    use ndarray::Array2;

    #[test]
    fn bands_are_keyed_by_short_name() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tile.npz");
        let bands = vec![
            OutputBand {
                name: "B4".into(),
                description: "B4 (665 nm)".into(),
                data: Array2::from_elem((4, 5), 1.0),
            },
            OutputBand {
                name: "SRB5".into(),
                description: "SRB5 (705 nm)".into(),
                data: Array2::from_elem((4, 5), 2.0),
            },
        ];
        write_npz_bands(&out, &bands).unwrap();
        let members = read_npz::<f32>(&out).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].0, "B4");
        assert_eq!(members[1].1.shape(), &[4, 5]);
        assert_eq!(members[1].1[[3, 4]], 2.0);
    }
}
