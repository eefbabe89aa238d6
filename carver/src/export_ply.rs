use std::io;

use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property,
    PropertyDef, PropertyType, ScalarType,
};
use ply_rs::writer::Writer;

use crate::mesh::Mesh;
use crate::{Point3, Vector3};
use base::defs::{Error, ErrorKind::*, IntoResult, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
}

impl PlyFormat {
    fn encoding(&self) -> Encoding {
        match self {
            PlyFormat::Ascii => Encoding::Ascii,
            PlyFormat::BinaryLittleEndian => Encoding::BinaryLittleEndian,
        }
    }
}

pub fn quantize_color(color: &Vector3) -> [u8; 3] {
    let channel = |c: f64| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    [channel(color.x), channel(color.y), channel(color.z)]
}

fn add_scalars(element: &mut ElementDef, names: &[&str], ty: ScalarType) {
    for name in names {
        let ty = PropertyType::Scalar(ty.clone());
        element.properties.add(PropertyDef::new(name.to_string(), ty));
    }
}

fn new_ply(
    format: PlyFormat,
    with_attributes: bool,
    with_faces: bool,
) -> Ply<DefaultElement> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = format.encoding();

    let mut vertex = ElementDef::new("vertex".to_string());
    add_scalars(&mut vertex, &["x", "y", "z"], ScalarType::Float);
    if with_attributes {
        add_scalars(&mut vertex, &["nx", "ny", "nz"], ScalarType::Float);
        let colors = ["red", "green", "blue"];
        add_scalars(&mut vertex, &colors, ScalarType::UChar);
    }
    ply.header.elements.add(vertex);

    if with_faces {
        let mut face = ElementDef::new("face".to_string());
        face.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        ply.header.elements.add(face);
    }

    ply
}

fn insert_floats(element: &mut DefaultElement, names: &[&str], v: &[f64]) {
    for (name, &value) in names.iter().zip(v) {
        element.insert(name.to_string(), Property::Float(value as f32));
    }
}

fn face_element(face: &[usize; 3]) -> Result<DefaultElement> {
    let mut indices = Vec::with_capacity(3);
    for &v in face {
        let index = i32::try_from(v).map_err(|_| {
            Error::new(
                MalformedData,
                format!("vertex index {} does not fit PLY int", v),
            )
        })?;
        indices.push(index);
    }

    let mut element = DefaultElement::new();
    element.insert("vertex_indices".to_string(), Property::ListInt(indices));
    Ok(element)
}

fn write_ply(
    mut writer: &mut dyn io::Write,
    ply: &mut Ply<DefaultElement>,
) -> Result<()> {
    Writer::new()
        .write_ply(&mut writer, ply)
        .into_result(|| "failed to write PLY-file".to_string())?;
    Ok(())
}

/// Writes positions, normals, 8-bit colors and triangles.
pub fn export_ply(
    mesh: &Mesh,
    format: PlyFormat,
    writer: &mut dyn io::Write,
) -> Result<()> {
    let mut ply = new_ply(format, true, true);

    let mut vertices = Vec::with_capacity(mesh.vertices.len());
    for i in 0..mesh.vertices.len() {
        let (p, n) = (&mesh.vertices[i], &mesh.normals[i]);
        let mut vertex = DefaultElement::new();
        insert_floats(&mut vertex, &["x", "y", "z"], &[p.x, p.y, p.z]);
        insert_floats(&mut vertex, &["nx", "ny", "nz"], &[n.x, n.y, n.z]);
        let [r, g, b] = quantize_color(&mesh.colors[i]);
        vertex.insert("red".to_string(), Property::UChar(r));
        vertex.insert("green".to_string(), Property::UChar(g));
        vertex.insert("blue".to_string(), Property::UChar(b));
        vertices.push(vertex);
    }

    let faces = mesh
        .faces
        .iter()
        .map(face_element)
        .collect::<Result<Vec<_>>>()?;

    ply.payload.insert("vertex".to_string(), vertices);
    ply.payload.insert("face".to_string(), faces);
    write_ply(writer, &mut ply)
}

pub fn export_points_ply(
    points: &[Point3],
    format: PlyFormat,
    writer: &mut dyn io::Write,
) -> Result<()> {
    let mut ply = new_ply(format, false, false);
    let vertices = points
        .iter()
        .map(|p| {
            let mut vertex = DefaultElement::new();
            insert_floats(&mut vertex, &["x", "y", "z"], &[p.x, p.y, p.z]);
            vertex
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);
    write_ply(writer, &mut ply)
}
