//! Wavefront OBJ/MTL parsing.
//!
//! Parsing never fails outright: malformed statements are skipped and
//! reported in [`ObjModel::errors`] next to whatever shapes could be built.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};
use log::debug;

use crate::mesh::Material;

/// A parsed OBJ file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjModel {
    pub shapes: Vec<ObjShape>,
    pub materials: Vec<ObjMaterial>,
    pub errors: Vec<String>,
}

/// One named group of faces sharing a material.
///
/// `positions` holds xyz triples, `texcoords` uv pairs and `normals` xyz
/// triples, one entry per deduplicated vertex. Missing attributes are zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjShape {
    pub name: String,
    pub positions: Vec<f32>,
    pub texcoords: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
    pub material: Option<usize>,
}

impl ObjShape {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjMaterial {
    pub name: String,
    pub material: Material,
}

/// Reads and parses `path`. Material libraries resolve against
/// `search_path`, or the file's directory when none is given.
pub fn load_obj(path: impl AsRef<Path>, search_path: Option<&Path>) -> Result<ObjModel> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read OBJ file {}", path.display()))?;
    let base = search_path
        .map(Path::to_path_buf)
        .or_else(|| path.parent().map(Path::to_path_buf));
    Ok(parse_obj(&text, base.as_deref()))
}

/// Parses OBJ text.
pub fn parse_obj(text: &str, search_path: Option<&Path>) -> ObjModel {
    let mut parser = Parser {
        search_path: search_path.map(Path::to_path_buf),
        ..Parser::default()
    };
    for (line_no, line) in text.lines().enumerate() {
        if let Err(err) = parser.statement(line) {
            parser.model.errors.push(format!("line {}: {err}", line_no + 1));
        }
    }
    parser.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FaceVertex {
    position: usize,
    texcoord: Option<usize>,
    normal: Option<usize>,
}

#[derive(Default)]
struct ShapeBuilder {
    shape: ObjShape,
    lookup: HashMap<FaceVertex, u32>,
}

impl ShapeBuilder {
    fn named(name: &str, material: Option<usize>) -> Self {
        Self {
            shape: ObjShape {
                name: name.to_string(),
                material,
                ..ObjShape::default()
            },
            lookup: HashMap::new(),
        }
    }

    fn vertex(&mut self, key: FaceVertex, positions: &[Vec3], texcoords: &[Vec2], normals: &[Vec3]) -> u32 {
        let shape = &mut self.shape;
        *self.lookup.entry(key).or_insert_with(|| {
            let index = (shape.positions.len() / 3) as u32;
            shape.positions.extend_from_slice(&positions[key.position].to_array());
            let uv = key.texcoord.map_or(Vec2::ZERO, |i| texcoords[i]);
            shape.texcoords.extend_from_slice(&uv.to_array());
            let normal = key.normal.map_or(Vec3::ZERO, |i| normals[i]);
            shape.normals.extend_from_slice(&normal.to_array());
            index
        })
    }
}

#[derive(Default)]
struct Parser {
    search_path: Option<PathBuf>,
    positions: Vec<Vec3>,
    texcoords: Vec<Vec2>,
    normals: Vec<Vec3>,
    material_ids: HashMap<String, usize>,
    current: Option<ShapeBuilder>,
    model: ObjModel,
}

impl Parser {
    fn statement(&mut self, line: &str) -> Result<()> {
        let line = line.split('#').next().unwrap_or_default().trim();
        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else {
            return Ok(());
        };
        match tag {
            "v" => self.positions.push(parse_vec3(parts).context("invalid vertex")?),
            "vt" => self.texcoords.push(parse_vec2(parts).context("invalid texcoord")?),
            "vn" => self.normals.push(parse_vec3(parts).context("invalid normal")?),
            "f" => self.face(parts).context("invalid face")?,
            "o" | "g" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                let material = self.current.as_ref().and_then(|c| c.shape.material);
                self.flush();
                self.current = Some(ShapeBuilder::named(&name, material));
            }
            "usemtl" => {
                let name = parts.next().ok_or_else(|| anyhow!("usemtl without a name"))?;
                let material = self.material_ids.get(name).copied();
                let current = self.current.get_or_insert_with(ShapeBuilder::default);
                if current.shape.material != material {
                    if current.shape.indices.is_empty() {
                        current.shape.material = material;
                    } else {
                        let shape_name = current.shape.name.clone();
                        self.flush();
                        self.current = Some(ShapeBuilder::named(&shape_name, material));
                    }
                }
                if material.is_none() {
                    return Err(anyhow!("unknown material `{name}`"));
                }
            }
            "mtllib" => {
                for library in parts {
                    self.material_library(library);
                }
            }
            "s" | "l" | "p" => {}
            other => debug!("ignoring OBJ statement `{other}`"),
        }
        Ok(())
    }

    fn face<'a>(&mut self, parts: impl Iterator<Item = &'a str>) -> Result<()> {
        let polygon = parts
            .map(|part| self.face_vertex(part))
            .collect::<Result<Vec<_>>>()?;
        if polygon.len() < 3 {
            return Err(anyhow!("faces must reference at least 3 vertices"));
        }
        let builder = self.current.get_or_insert_with(ShapeBuilder::default);
        let indices: Vec<u32> = polygon
            .iter()
            .map(|key| builder.vertex(*key, &self.positions, &self.texcoords, &self.normals))
            .collect();
        for i in 1..(indices.len() - 1) {
            builder
                .shape
                .indices
                .extend_from_slice(&[indices[0], indices[i], indices[i + 1]]);
        }
        Ok(())
    }

    fn face_vertex(&self, part: &str) -> Result<FaceVertex> {
        let mut segments = part.split('/');
        let position = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("missing vertex index in `{part}`"))?;
        let position = resolve(position, self.positions.len())?;
        let texcoord = match segments.next() {
            Some(s) if !s.is_empty() => Some(resolve(s, self.texcoords.len())?),
            _ => None,
        };
        let normal = match segments.next() {
            Some(s) if !s.is_empty() => Some(resolve(s, self.normals.len())?),
            _ => None,
        };
        Ok(FaceVertex {
            position,
            texcoord,
            normal,
        })
    }

    fn material_library(&mut self, library: &str) {
        let path = match &self.search_path {
            Some(base) => base.join(library),
            None => PathBuf::from(library),
        };
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                self.model
                    .errors
                    .push(format!("material library {}: {err}", path.display()));
                return;
            }
        };
        let (materials, errors) = parse_mtl(&text);
        for err in errors {
            self.model.errors.push(format!("{}: {err}", path.display()));
        }
        for material in materials {
            self.material_ids
                .insert(material.name.clone(), self.model.materials.len());
            self.model.materials.push(material);
        }
    }

    fn flush(&mut self) {
        if let Some(builder) = self.current.take() {
            if !builder.shape.indices.is_empty() {
                self.model.shapes.push(builder.shape);
            }
        }
    }

    fn finish(mut self) -> ObjModel {
        self.flush();
        self.model
    }
}

/// Parses MTL text into materials and per-line diagnostics.
pub fn parse_mtl(text: &str) -> (Vec<ObjMaterial>, Vec<String>) {
    let mut materials: Vec<ObjMaterial> = Vec::new();
    let mut errors = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        let mut parts = line.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        if tag == "newmtl" {
            materials.push(ObjMaterial {
                name: parts.collect::<Vec<_>>().join(" "),
                material: Material::default(),
            });
            continue;
        }
        let Some(current) = materials.last_mut() else {
            errors.push(format!("line {}: `{tag}` before newmtl", line_no + 1));
            continue;
        };
        let material = &mut current.material;
        let result = match tag {
            "Ka" => parse_vec3(parts).map(|c| material.ambient = c),
            "Kd" => parse_vec3(parts).map(|c| material.diffuse = c),
            "Ks" => parse_vec3(parts).map(|c| material.specular = c),
            "Ke" => parse_vec3(parts).map(|c| material.emission = c),
            "Ns" => parse_f32(parts.next()).map(|v| material.shininess = v),
            "Ni" => parse_f32(parts.next()).map(|v| material.ior = v),
            "map_Ka" => texture_path(parts).map(|p| material.ambient_texture = Some(p)),
            "map_Kd" => texture_path(parts).map(|p| material.diffuse_texture = Some(p)),
            "map_Ks" => texture_path(parts).map(|p| material.specular_texture = Some(p)),
            "map_Bump" | "map_bump" | "bump" | "norm" => {
                texture_path(parts).map(|p| material.normal_texture = Some(p))
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            errors.push(format!("line {}: {err}", line_no + 1));
        }
    }
    (materials, errors)
}

fn texture_path<'a>(parts: impl Iterator<Item = &'a str>) -> Result<String> {
    // Options such as `-bm 1.0` precede the file name.
    parts
        .last()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing texture path"))
}

fn parse_f32(part: Option<&str>) -> Result<f32> {
    let part = part.ok_or_else(|| anyhow!("missing component"))?;
    part.parse::<f32>()
        .with_context(|| format!("`{part}` is not a number"))
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let x = parse_f32(parts.next())?;
    let y = parse_f32(parts.next())?;
    let z = parse_f32(parts.next())?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = parse_f32(parts.next())?;
    let v = parts.next().map_or(Ok(0.0), |s| parse_f32(Some(s)))?;
    Ok(Vec2::new(u, v))
}

/// Resolves a one-based (or negative, relative) OBJ index.
fn resolve(index: &str, len: usize) -> Result<usize> {
    let value = index
        .parse::<i64>()
        .with_context(|| format!("`{index}` is not an index"))?;
    let resolved = if value > 0 {
        let zero_based = (value - 1) as usize;
        (zero_based < len).then_some(zero_based)
    } else if value < 0 {
        let back = value.unsigned_abs() as usize;
        (back <= len).then(|| len - back)
    } else {
        None
    };
    resolved.ok_or_else(|| anyhow!("index {value} out of range ({len} defined)"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_simple_triangle() {
        let model = parse_obj("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n", None);
        assert!(model.errors.is_empty());
        assert_eq!(model.shapes.len(), 1);
        let shape = &model.shapes[0];
        assert_eq!(shape.indices, vec![0, 1, 2]);
        assert_eq!(shape.positions, vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn quads_are_fan_triangulated_and_deduplicated() {
        let text = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\nf -4 -2 -1\n";
        let model = parse_obj(text, None);
        let shape = &model.shapes[0];
        assert_eq!(shape.vertex_count(), 4);
        assert_eq!(shape.indices, vec![0, 1, 2, 0, 2, 3, 0, 2, 3]);
    }

    #[test]
    fn groups_and_objects_start_new_shapes() {
        let text = "v 0 0 0\nv 1 0 0\nv 0 1 0\no first\nf 1 2 3\ng second\nf 3 2 1\ng empty\n";
        let model = parse_obj(text, None);
        let names: Vec<_> = model.shapes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn malformed_lines_are_collected() {
        let text = "v 0 0\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\nf 1 2 3\n";
        let model = parse_obj(text, None);
        assert_eq!(model.errors.len(), 2);
        assert!(model.errors[0].starts_with("line 1"));
        assert!(model.errors[1].starts_with("line 5"));
        assert_eq!(model.shapes[0].indices.len(), 3);
    }

    #[test]
    fn material_libraries_resolve_against_the_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut mtl = std::fs::File::create(dir.path().join("scene.mtl")).unwrap();
        writeln!(
            mtl,
            "newmtl red\nKd 1 0 0\nNs 32\nmap_Kd -bm 1 red.png\nnewmtl blue\nKd 0 0 1\nNi x"
        )
        .unwrap();
        let text = "mtllib scene.mtl\nv 0 0 0\nv 1 0 0\nv 0 1 0\nusemtl red\nf 1 2 3\nusemtl blue\nf 3 2 1\nusemtl green\n";
        let model = parse_obj(text, Some(dir.path()));
        assert_eq!(model.materials.len(), 2);
        let red = &model.materials[0].material;
        assert_eq!(red.diffuse, Vec3::X);
        assert_eq!(red.shininess, 32.0);
        assert_eq!(red.diffuse_texture.as_deref(), Some("red.png"));
        assert_eq!(model.shapes.len(), 2);
        assert_eq!(model.shapes[0].material, Some(0));
        assert_eq!(model.shapes[1].material, Some(1));
        // `Ni x` and the unknown `green` material.
        assert_eq!(model.errors.len(), 2);
    }

    #[test]
    fn missing_material_library_is_reported() {
        let model = parse_obj("mtllib nowhere.mtl\n", Some(Path::new("/nonexistent")));
        assert_eq!(model.errors.len(), 1);
        assert!(model.shapes.is_empty());
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(load_obj("/nonexistent/model.obj", None).is_err());
    }
}
