use std::io;

use crate::mesh::Mesh;
use base::defs::{IntoResult, Result};

/// Writes the mesh as OBJ with per-vertex colors appended to `v` lines.
pub fn export_obj(mesh: &Mesh, writer: &mut dyn io::Write) -> Result<()> {
    let write_err = || "failed to write OBJ-file".to_string();

    for (v, c) in mesh.vertices.iter().zip(mesh.colors.iter()) {
        writeln!(
            writer,
            "v {} {} {} {:.4} {:.4} {:.4}",
            v.x, v.y, v.z, c.x, c.y, c.z
        )
        .into_result(write_err)?;
    }

    for n in mesh.normals.iter() {
        writeln!(writer, "vn {} {} {}", n.x, n.y, n.z)
            .into_result(write_err)?;
    }

    for f in mesh.faces.iter() {
        // Indexing starts at 1.
        let [a, b, c] = f.map(|i| i + 1);
        writeln!(writer, "f {}//{} {}//{} {}//{}", a, a, b, b, c, c)
            .into_result(write_err)?;
    }

    Ok(())
}
