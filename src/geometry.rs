//! The seam between coordinate arrays and a caller's geometry model.

use crate::shp::{Shape, ShpError};

/// Builds geometries from decoded shapes, and takes them apart for writing.
///
/// The reader calls `build()` once per record; the writer calls
/// `decompose()` once per feature. Either may refuse a shape it can't
/// represent by returning `ShpError::SchemaViolation`.
pub trait GeometryFactory {
    type Geometry;

    fn build(&self, shape: Shape) -> Result<Self::Geometry, ShpError>;

    fn decompose(&self, geometry: &Self::Geometry) -> Result<Shape, ShpError>;
}

/// Hands out `Shape`s as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapeFactory;

impl GeometryFactory for ShapeFactory {
    type Geometry = Shape;

    fn build(&self, shape: Shape) -> Result<Shape, ShpError> {
        Ok(shape)
    }

    fn decompose(&self, geometry: &Shape) -> Result<Shape, ShpError> {
        Ok(geometry.clone())
    }
}
