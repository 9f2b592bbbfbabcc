//! Minimal NumPy `.npy` (format 1.0) and `.npz` codec for little-endian,
//! C-ordered float arrays.
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use ndarray::{ArrayD, ArrayView, Dimension, IxDyn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
/// Magic, version, header length and header together are a multiple of this.
const NPY_ALIGN: usize = 64;

pub trait NpyDtype: Copy {
    fn npy_dtype() -> &'static str;
    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
    fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

impl NpyDtype for f32 {
    fn npy_dtype() -> &'static str {
        "<f4"
    }
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl NpyDtype for f64 {
    fn npy_dtype() -> &'static str {
        "<f8"
    }
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
    fn read_le(bytes: &[u8]) -> Self {
        let mut b = [0u8; 8];
        b.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(b)
    }
}

fn header<T: NpyDtype>(shape: &[usize]) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    let shape_str = if dims.len() == 1 {
        format!("({},)", dims[0])
    } else {
        format!("({})", dims.join(", "))
    };
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        T::npy_dtype(),
        shape_str
    );
    // 6 magic + 2 version + 2 length, newline terminates the dict
    let unpadded = NPY_MAGIC.len() + 2 + 2 + dict.len() + 1;
    let pad = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    let text = format!("{}{}\n", dict, " ".repeat(pad));

    let mut out = Vec::with_capacity(unpadded + pad);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(text.len() as u16).to_le_bytes());
    out.extend_from_slice(text.as_bytes());
    out
}

/// Serialise an array in logical (C) order.
pub fn encode_npy<T: NpyDtype, D: Dimension>(array: ArrayView<'_, T, D>) -> Vec<u8> {
    let mut out = header::<T>(array.shape());
    out.reserve(array.len() * T::size());
    for &v in array.iter() {
        v.write_le(&mut out);
    }
    out
}

/// Parse a `.npy` payload written with a matching dtype.
pub fn decode_npy<T: NpyDtype>(bytes: &[u8]) -> Result<ArrayD<T>> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(Error::Processing("not a .npy payload".into()));
    }
    let (header_len, offset) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        v => return Err(Error::Processing(format!("unsupported .npy version {}", v))),
    };
    let text = bytes
        .get(offset..offset + header_len)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or_else(|| Error::Processing("truncated .npy header".into()))?;

    if !text.contains(&format!("'descr': '{}'", T::npy_dtype())) {
        return Err(Error::Processing(format!(
            "unexpected .npy dtype in `{}`, wanted {}",
            text.trim(),
            T::npy_dtype()
        )));
    }
    if text.contains("'fortran_order': True") {
        return Err(Error::Processing("Fortran-ordered .npy is not supported".into()));
    }
    let shape = parse_shape(text)?;

    let data = &bytes[offset + header_len..];
    let count: usize = shape.iter().product();
    if data.len() < count * T::size() {
        return Err(Error::Processing(format!(
            ".npy data holds {} bytes, shape {:?} needs {}",
            data.len(),
            shape,
            count * T::size()
        )));
    }
    let values: Vec<T> = data
        .chunks_exact(T::size())
        .take(count)
        .map(T::read_le)
        .collect();
    ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(Error::external)
}

fn parse_shape(text: &str) -> Result<Vec<usize>> {
    let start = text
        .find("'shape':")
        .and_then(|i| text[i..].find('(').map(|j| i + j + 1))
        .ok_or_else(|| Error::Processing("missing shape in .npy header".into()))?;
    let end = text[start..]
        .find(')')
        .map(|j| start + j)
        .ok_or_else(|| Error::Processing("unterminated shape in .npy header".into()))?;
    text[start..end]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| Error::Processing(format!("bad .npy dimension `{}`", s)))
        })
        .collect()
}

pub fn write_npy<T: NpyDtype, D: Dimension>(path: &Path, array: ArrayView<'_, T, D>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&encode_npy(array))?;
    writer.flush()?;
    Ok(())
}

pub fn read_npy<T: NpyDtype>(path: &Path) -> Result<ArrayD<T>> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
    decode_npy(&bytes)
}

/// Write named arrays into an uncompressed `.npz` archive (one `<name>.npy`
/// member per array, like `numpy.savez`).
pub fn write_npz<W, T, D>(writer: W, arrays: &[(String, ArrayView<'_, T, D>)]) -> Result<()>
where
    W: Write + Seek,
    T: NpyDtype,
    D: Dimension,
{
    let mut zip = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, array) in arrays {
        zip.start_file(format!("{}.npy", name), options)
            .map_err(Error::external)?;
        zip.write_all(&encode_npy(array.view()))?;
    }
    zip.finish().map_err(Error::external)?;
    Ok(())
}

/// Read every member of an `.npz` archive, keyed by name without `.npy`.
pub fn read_npz<T: NpyDtype>(path: &Path) -> Result<Vec<(String, ArrayD<T>)>> {
    let mut archive = ZipArchive::new(File::open(path)?).map_err(Error::external)?;
    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut member = archive.by_index(i).map_err(Error::external)?;
        let name = member.name().trim_end_matches(".npy").to_string();
        let mut bytes = Vec::new();
        member.read_to_end(&mut bytes)?;
        out.push((name, decode_npy(&bytes)?));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn header_is_aligned() {
        let bytes = encode_npy(Array3::<f32>::zeros((4, 8, 8)).view());
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % NPY_ALIGN, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        assert_eq!(bytes.len(), 10 + header_len + 4 * 8 * 8 * 4);
    }

    #[test]
    fn decode_restores_shape_and_values() {
        let a = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as f32 * 0.5);
        let back = decode_npy::<f32>(&encode_npy(a.view())).unwrap();
        assert_eq!(back.shape(), &[2, 3, 4]);
        assert_eq!(back.into_dimensionality::<ndarray::Ix3>().unwrap(), a);
    }

    #[test]
    fn one_dimensional_shape_has_trailing_comma() {
        let a = ndarray::arr1(&[1.0f64, 2.0, 3.0]);
        let bytes = encode_npy(a.view());
        let text = String::from_utf8_lossy(&bytes[10..]);
        assert!(text.contains("'shape': (3,)"));
        assert_eq!(decode_npy::<f64>(&bytes).unwrap().shape(), &[3]);
    }

    #[test]
    fn dtype_mismatch_is_rejected() {
        let bytes = encode_npy(Array2::<f64>::zeros((2, 2)).view());
        assert!(decode_npy::<f32>(&bytes).is_err());
    }

    #[test]
    fn npz_members_keep_their_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.npz");
        let b4 = Array2::from_elem((3, 3), 1.5f32);
        let sr = Array2::from_elem((3, 3), 2.5f32);
        write_npz(
            File::create(&path).unwrap(),
            &[("B4".to_string(), b4.view()), ("SRB5".to_string(), sr.view())],
        )
        .unwrap();
        let members = read_npz::<f32>(&path).unwrap();
        let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["B4", "SRB5"]);
        assert_eq!(members[1].1[[2, 2]], 2.5);
    }
}
