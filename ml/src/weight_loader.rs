use crate::WeightPrecision;
use ndarray::{ArrayD, IxDyn};
use ndarray_npy::{NpzReader, ReadNpzError};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use thiserror::Error;

pub type WeightResult<T> = Result<T, WeightError>;

#[derive(Error, Debug)]
pub enum WeightError {
    #[error("No weights with name {0} found")]
    WeightKeyError(String),
    #[error("Weight file not found. Filesystem reported error\n {0}.")]
    WeightFileNotFoundError(#[from] std::io::Error),
    #[error("Weight file not readable. Filesystem reported error\n {0}.")]
    WeightFileNpzError(#[from] ReadNpzError),
    #[error("Wrong shape for weight {0}: expected {1:?}, found {2:?}.")]
    WeightShapeError(String, Vec<usize>, Vec<usize>),
}

pub trait WeightLoader {
    /// Returns the weight with the given name, which has to have exactly the given shape.
    fn get_weight(&mut self, param_name: &str, shape: &[usize]) -> WeightResult<ArrayD<WeightPrecision>>;
}

pub struct NpzWeightLoader<R>
where
    R: Seek + Read,
{
    reader: NpzReader<R>,
}

impl NpzWeightLoader<std::fs::File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> WeightResult<NpzWeightLoader<std::fs::File>> {
        let handle = std::fs::File::open(path)?;
        Ok(NpzWeightLoader {
            reader: NpzReader::new(handle)?,
        })
    }
}

impl<'a> NpzWeightLoader<Cursor<&'a [u8]>> {
    pub fn from_buffer(bytes_array: &'a [u8]) -> WeightResult<NpzWeightLoader<Cursor<&'a [u8]>>> {
        Ok(NpzWeightLoader {
            reader: NpzReader::new(Cursor::new(bytes_array))?,
        })
    }
}

impl<R> NpzWeightLoader<R>
where
    R: Seek + Read,
{
    /// Names of all arrays in the archive
    pub fn names(&mut self) -> WeightResult<Vec<String>> {
        Ok(self.reader.names()?)
    }
}

impl<R> WeightLoader for NpzWeightLoader<R>
where
    R: Seek + Read,
{
    fn get_weight(&mut self, param_name: &str, shape: &[usize]) -> WeightResult<ArrayD<WeightPrecision>> {
        let known = self
            .names()?
            .iter()
            .any(|n| n == param_name || n.trim_end_matches(".npy") == param_name);
        if !known {
            return Err(WeightError::WeightKeyError(param_name.to_string()));
        }

        let arr: ArrayD<WeightPrecision> = self.reader.by_name(param_name)?;

        if arr.raw_dim() != IxDyn(shape) {
            return Err(WeightError::WeightShapeError(
                param_name.to_string(),
                shape.to_vec(),
                arr.shape().to_vec(),
            ));
        }
        Ok(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array4};
    use ndarray_npy::NpzWriter;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cnn_weights.npz");
        let kernel = Array4::from_shape_fn((2, 1, 3, 3), |(f, _, h, w)| (f * 9 + h * 3 + w) as f32);
        let bias = array![0.5f32, -0.5];

        let mut npz = NpzWriter::new(std::fs::File::create(&path).unwrap());
        npz.add_array("conv2d_0.kernel", &kernel).unwrap();
        npz.add_array("conv2d_0.bias", &bias).unwrap();
        npz.finish().unwrap();

        let mut loader = NpzWeightLoader::from_path(&path).unwrap();

        let mut names = loader.names().unwrap();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("conv2d_0.bias"));
        assert_eq!(loader.get_weight("conv2d_0.kernel", &[2, 1, 3, 3]).unwrap(), kernel.into_dyn());
        assert_eq!(loader.get_weight("conv2d_0.bias", &[2]).unwrap(), bias.into_dyn());

        dir.close().unwrap();
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            NpzWeightLoader::from_path(dir.path().join("nothing.npz")),
            Err(WeightError::WeightFileNotFoundError(_))
        ));
    }

    #[test]
    fn test_wrong_name_or_shape() {
        let mut buffer = Cursor::new(Vec::new());
        let mut npz = NpzWriter::new(&mut buffer);
        npz.add_array("dense_11.bias", &array![1f32, 2., 3.]).unwrap();
        npz.finish().unwrap();
        let bytes = buffer.into_inner();

        let mut loader = NpzWeightLoader::from_buffer(&bytes).unwrap();

        assert!(matches!(
            loader.get_weight("dense_11.bias", &[1, 3]),
            Err(WeightError::WeightShapeError(_, _, _))
        ));
        assert!(matches!(
            loader.get_weight("dense_11.kernel", &[3]),
            Err(WeightError::WeightKeyError(_))
        ));
    }
}
