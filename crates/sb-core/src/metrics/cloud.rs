//! Column-oriented Gaussian-splat point clouds backed by PLY files.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;
use thiserror::Error;

const VERTEX: &str = "vertex";

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("failed to read point cloud {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write point cloud {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("point cloud {path} has no vertex element")]
    NoVertexElement { path: PathBuf },

    #[error("column '{name}' has {actual} values, expected {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// A point cloud as named scalar columns of equal length.
///
/// Only scalar vertex properties are kept; list properties (face indices
/// and the like) carry nothing a splat codec preserves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    len: usize,
    columns: Vec<(String, Vec<f32>)>,
}

impl PointCloud {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            columns: Vec::new(),
        }
    }

    /// Add (or replace) a column.
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<f32>,
    ) -> Result<Self, CloudError> {
        let name = name.into();
        if values.len() != self.len {
            return Err(CloudError::ColumnLength {
                name,
                expected: self.len,
                actual: values.len(),
            });
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, column)) => *column = values,
            None => self.columns.push((name, values)),
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column(&self, name: &str) -> Option<&[f32]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in file order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Positions as `[x, y, z]`, or `None` if any coordinate column is missing.
    pub fn positions(&self) -> Option<Vec<[f32; 3]>> {
        let x = self.column("x")?;
        let y = self.column("y")?;
        let z = self.column("z")?;
        Some(
            x.iter()
                .zip(y)
                .zip(z)
                .map(|((x, y), z)| [*x, *y, *z])
                .collect(),
        )
    }

    /// Load the vertex element of a PLY file (ASCII or binary).
    pub fn load(path: &Path) -> Result<Self, CloudError> {
        let read_err = |source| CloudError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_err)?;
        let mut reader = BufReader::new(file);
        let parser = Parser::<DefaultElement>::new();
        let ply = parser.read_ply(&mut reader).map_err(read_err)?;

        let def = ply
            .header
            .elements
            .get(VERTEX)
            .ok_or_else(|| CloudError::NoVertexElement {
                path: path.to_path_buf(),
            })?;
        let rows = ply.payload.get(VERTEX).map(Vec::as_slice).unwrap_or(&[]);

        let names: Vec<&String> = def
            .properties
            .iter()
            .filter(|(_, p)| matches!(p.data_type, PropertyType::Scalar(_)))
            .map(|(name, _)| name)
            .collect();

        let mut columns: Vec<(String, Vec<f32>)> = names
            .iter()
            .map(|name| ((*name).clone(), Vec::with_capacity(rows.len())))
            .collect();
        for row in rows {
            for (name, values) in columns.iter_mut() {
                values.push(row.get(name.as_str()).and_then(scalar_value).unwrap_or(f32::NAN));
            }
        }

        Ok(Self {
            len: rows.len(),
            columns,
        })
    }

    /// Write as binary little-endian PLY with float32 properties.
    pub fn write_binary(&self, path: &Path) -> Result<(), CloudError> {
        let write_err = |source| CloudError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = Encoding::BinaryLittleEndian;
        let mut element = ElementDef::new(VERTEX.to_string());
        for (name, _) in &self.columns {
            element.properties.add(PropertyDef::new(
                name.clone(),
                PropertyType::Scalar(ScalarType::Float),
            ));
        }
        element.count = self.len;
        ply.header.elements.add(element);

        let mut rows = Vec::with_capacity(self.len);
        for i in 0..self.len {
            let mut row = DefaultElement::new();
            for (name, values) in &self.columns {
                row.insert(name.clone(), Property::Float(values[i]));
            }
            rows.push(row);
        }
        ply.payload.insert(VERTEX.to_string(), rows);

        let file = File::create(path).map_err(write_err)?;
        let mut out = BufWriter::new(file);
        Writer::new()
            .write_ply(&mut out, &mut ply)
            .map_err(write_err)?;
        out.flush().map_err(write_err)
    }
}

fn scalar_value(property: &Property) -> Option<f32> {
    let value = match property {
        Property::Char(v) => *v as f32,
        Property::UChar(v) => *v as f32,
        Property::Short(v) => *v as f32,
        Property::UShort(v) => *v as f32,
        Property::Int(v) => *v as f32,
        Property::UInt(v) => *v as f32,
        Property::Float(v) => *v,
        Property::Double(v) => *v as f32,
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample() -> PointCloud {
        PointCloud::new(3)
            .with_column("x", vec![0.0, 1.0, 2.0])
            .and_then(|c| c.with_column("y", vec![0.5, 0.5, 0.5]))
            .and_then(|c| c.with_column("z", vec![-1.0, 0.0, 1.0]))
            .and_then(|c| c.with_column("opacity", vec![0.1, 0.2, 0.3]))
            .expect("valid columns")
    }

    #[test]
    fn column_length_is_checked() {
        let err = PointCloud::new(2).with_column("x", vec![1.0]).unwrap_err();
        assert!(matches!(err, CloudError::ColumnLength { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn positions_require_xyz() {
        assert!(sample().positions().is_some());
        let no_z = PointCloud::new(1)
            .with_column("x", vec![0.0])
            .and_then(|c| c.with_column("y", vec![0.0]))
            .unwrap();
        assert!(no_z.positions().is_none());
    }

    #[test]
    fn binary_file_reloads() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("cloud.ply");
        let cloud = sample();
        cloud.write_binary(&path).expect("write");
        let loaded = PointCloud::load(&path).expect("load");
        assert_eq!(loaded, cloud);
        assert_eq!(
            loaded.column_names().collect::<Vec<_>>(),
            vec!["x", "y", "z", "opacity"]
        );
    }

    #[test]
    fn ascii_with_mixed_types_loads() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("ascii.ply");
        fs::write(
            &path,
            "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\n\
             property double z\nproperty uchar red\nend_header\n1 2 3 255\n4 5 6 0\n",
        )
        .unwrap();
        let cloud = PointCloud::load(&path).expect("load");
        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.column("z"), Some(&[3.0f32, 6.0][..]));
        assert_eq!(cloud.column("red"), Some(&[255.0f32, 0.0][..]));
    }

    #[test]
    fn garbage_is_a_read_error() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("bad.ply");
        fs::write(&path, b"not a ply file").unwrap();
        assert!(matches!(PointCloud::load(&path), Err(CloudError::Read { .. })));
    }
}
