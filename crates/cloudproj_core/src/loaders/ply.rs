//! PLY reader
//!
//! Supports `ascii 1.0` and `binary_little_endian 1.0` files. Only the
//! `vertex` element is read: `x`, `y`, `z` (float or double) plus the
//! optional `red`, `green`, `blue` and `nx`, `ny`, `nz` properties. Elements
//! declared before `vertex` are skipped, list properties included.
//!
//! Color properties stored as float or double are taken as 0..255 values.

use std::fs;
use std::path::Path;

use cloudproj_math::Vec3;

use crate::{CloudError, PointRecord, PointStore};

#[derive(Clone, Copy, Debug, PartialEq)]
enum Format {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(name: &str) -> Result<Self, CloudError> {
        Ok(match name {
            "char" | "int8" => ScalarType::I8,
            "uchar" | "uint8" => ScalarType::U8,
            "short" | "int16" => ScalarType::I16,
            "ushort" | "uint16" => ScalarType::U16,
            "int" | "int32" => ScalarType::I32,
            "uint" | "uint32" => ScalarType::U32,
            "float" | "float32" => ScalarType::F32,
            "double" | "float64" => ScalarType::F64,
            other => return Err(CloudError::Parse(format!("unknown PLY type '{}'", other))),
        })
    }

    fn size(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }

    fn read_le(self, bytes: &[u8]) -> f64 {
        match self {
            ScalarType::I8 => bytes[0] as i8 as f64,
            ScalarType::U8 => bytes[0] as f64,
            ScalarType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            ScalarType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
            ScalarType::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            ScalarType::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            ScalarType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            ScalarType::F64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&bytes[..8]);
                f64::from_le_bytes(b)
            }
        }
    }
}

#[derive(Clone, Debug)]
enum Property {
    Scalar { name: String, ty: ScalarType },
    List { count: ScalarType, item: ScalarType },
}

#[derive(Clone, Debug)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

#[derive(Debug)]
struct Header {
    format: Format,
    elements: Vec<Element>,
    body_offset: usize,
}

/// Indices of the vertex properties we care about
#[derive(Default)]
struct VertexLayout {
    position: [Option<usize>; 3],
    color: [Option<usize>; 3],
    normal: [Option<usize>; 3],
}

impl VertexLayout {
    fn new(element: &Element) -> Result<Self, CloudError> {
        let mut layout = VertexLayout::default();
        for (i, property) in element.properties.iter().enumerate() {
            let Property::Scalar { name, .. } = property else { continue };
            let slot = match name.as_str() {
                "x" => &mut layout.position[0],
                "y" => &mut layout.position[1],
                "z" => &mut layout.position[2],
                "red" => &mut layout.color[0],
                "green" => &mut layout.color[1],
                "blue" => &mut layout.color[2],
                "nx" => &mut layout.normal[0],
                "ny" => &mut layout.normal[1],
                "nz" => &mut layout.normal[2],
                _ => continue,
            };
            *slot = Some(i);
        }
        if layout.position.iter().any(Option::is_none) {
            return Err(CloudError::Parse("PLY vertex element lacks x, y or z".into()));
        }
        Ok(layout)
    }

    fn has_color(&self) -> bool {
        self.color.iter().all(Option::is_some)
    }

    fn has_normals(&self) -> bool {
        self.normal.iter().all(Option::is_some)
    }

    fn record(&self, values: &[f64]) -> PointRecord {
        let pick = |slots: &[Option<usize>; 3]| slots.map(|s| s.map_or(0.0, |i| values[i]));
        let [x, y, z] = pick(&self.position);
        let rgb = if self.has_color() {
            pick(&self.color).map(|c| c.round().clamp(0.0, 255.0) as u8)
        } else {
            [255, 255, 255]
        };
        let mut record = PointRecord::new(Vec3::new(x as f32, y as f32, z as f32), rgb);
        if self.has_normals() {
            let [nx, ny, nz] = pick(&self.normal);
            record.normal = Vec3::new(nx as f32, ny as f32, nz as f32);
        }
        record
    }
}

/// Read a PLY file into a new store
pub fn read_ply(path: &Path) -> Result<PointStore, CloudError> {
    let bytes = fs::read(path)?;
    parse_ply(&bytes)
}

/// Parse PLY bytes into a new store
pub fn parse_ply(bytes: &[u8]) -> Result<PointStore, CloudError> {
    let header = parse_header(bytes)?;
    let body = &bytes[header.body_offset..];

    let vertex_pos = header
        .elements
        .iter()
        .position(|e| e.name == "vertex")
        .ok_or_else(|| CloudError::Parse("PLY file has no vertex element".into()))?;
    let vertex = &header.elements[vertex_pos];
    let layout = VertexLayout::new(vertex)?;

    let mut store = PointStore::with_capacity(vertex.count);
    store.channels.color = layout.has_color();
    store.channels.normals = layout.has_normals();

    match header.format {
        Format::Ascii => {
            let text = std::str::from_utf8(body)
                .map_err(|_| CloudError::Parse("PLY ascii body is not valid UTF-8".into()))?;
            let mut tokens = text.split_ascii_whitespace();
            for element in &header.elements[..vertex_pos] {
                skip_ascii(&mut tokens, element)?;
            }
            let mut values = vec![0.0f64; vertex.properties.len()];
            for _ in 0..vertex.count {
                read_ascii_row(&mut tokens, vertex, &mut values)?;
                store.push(layout.record(&values));
            }
        }
        Format::BinaryLittleEndian => {
            let mut offset = 0usize;
            for element in &header.elements[..vertex_pos] {
                offset = skip_binary(body, offset, element)?;
            }
            let mut values = vec![0.0f64; vertex.properties.len()];
            for _ in 0..vertex.count {
                offset = read_binary_row(body, offset, vertex, &mut values)?;
                store.push(layout.record(&values));
            }
        }
    }

    if store.channels.normals {
        store.metadata.normals_computed = true;
    }
    Ok(store)
}

fn parse_header(bytes: &[u8]) -> Result<Header, CloudError> {
    const END: &[u8] = b"end_header";
    let end = bytes
        .windows(END.len())
        .position(|w| w == END)
        .ok_or_else(|| CloudError::Parse("PLY header has no end_header".into()))?;
    let body_offset = bytes[end..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| end + p + 1)
        .ok_or_else(|| CloudError::Parse("PLY header is not terminated".into()))?;

    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|_| CloudError::Parse("PLY header is not valid UTF-8".into()))?;
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    if lines.next() != Some("ply") {
        return Err(CloudError::Parse("missing 'ply' magic".into()));
    }

    let mut format = None;
    let mut elements: Vec<Element> = Vec::new();
    for line in lines {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["format", "ascii", _] => format = Some(Format::Ascii),
            ["format", "binary_little_endian", _] => format = Some(Format::BinaryLittleEndian),
            ["format", other, ..] => {
                return Err(CloudError::Parse(format!("unsupported PLY format '{}'", other)))
            }
            ["comment", ..] | ["obj_info", ..] => {}
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| CloudError::Parse(format!("bad element count '{}'", count)))?;
                elements.push(Element { name: name.to_string(), count, properties: Vec::new() });
            }
            ["property", "list", count, item, _name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| CloudError::Parse("property before element".into()))?;
                element.properties.push(Property::List {
                    count: ScalarType::parse(count)?,
                    item: ScalarType::parse(item)?,
                });
            }
            ["property", ty, name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| CloudError::Parse("property before element".into()))?;
                element.properties.push(Property::Scalar {
                    name: name.to_string(),
                    ty: ScalarType::parse(ty)?,
                });
            }
            _ => return Err(CloudError::Parse(format!("unexpected PLY header line '{}'", line))),
        }
    }

    let format = format.ok_or_else(|| CloudError::Parse("PLY header has no format line".into()))?;
    Ok(Header { format, elements, body_offset })
}

fn next_number<'a, I: Iterator<Item = &'a str>>(tokens: &mut I) -> Result<f64, CloudError> {
    let token = tokens
        .next()
        .ok_or_else(|| CloudError::Parse("PLY body ended early".into()))?;
    token
        .parse()
        .map_err(|_| CloudError::Parse(format!("bad PLY number '{}'", token)))
}

fn skip_ascii<'a, I: Iterator<Item = &'a str>>(tokens: &mut I, element: &Element) -> Result<(), CloudError> {
    for _ in 0..element.count {
        for property in &element.properties {
            match property {
                Property::Scalar { .. } => {
                    next_number(tokens)?;
                }
                Property::List { .. } => {
                    let n = next_number(tokens)? as usize;
                    for _ in 0..n {
                        next_number(tokens)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn read_ascii_row<'a, I: Iterator<Item = &'a str>>(
    tokens: &mut I,
    element: &Element,
    values: &mut [f64],
) -> Result<(), CloudError> {
    for (value, property) in values.iter_mut().zip(&element.properties) {
        match property {
            Property::Scalar { .. } => *value = next_number(tokens)?,
            Property::List { .. } => {
                let n = next_number(tokens)? as usize;
                for _ in 0..n {
                    next_number(tokens)?;
                }
            }
        }
    }
    Ok(())
}

fn scalar_at(body: &[u8], offset: usize, ty: ScalarType) -> Result<f64, CloudError> {
    body.get(offset..offset + ty.size())
        .map(|b| ty.read_le(b))
        .ok_or_else(|| CloudError::Parse("PLY body ended early".into()))
}

fn skip_binary(body: &[u8], mut offset: usize, element: &Element) -> Result<usize, CloudError> {
    for _ in 0..element.count {
        for property in &element.properties {
            match property {
                Property::Scalar { ty, .. } => offset += ty.size(),
                Property::List { count, item } => {
                    let n = scalar_at(body, offset, *count)? as usize;
                    offset += count.size() + n * item.size();
                }
            }
        }
    }
    Ok(offset)
}

fn read_binary_row(
    body: &[u8],
    mut offset: usize,
    element: &Element,
    values: &mut [f64],
) -> Result<usize, CloudError> {
    for (value, property) in values.iter_mut().zip(&element.properties) {
        match property {
            Property::Scalar { ty, .. } => {
                *value = scalar_at(body, offset, *ty)?;
                offset += ty.size();
            }
            Property::List { count, item } => {
                let n = scalar_at(body, offset, *count)? as usize;
                offset += count.size() + n * item.size();
            }
        }
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASCII: &str = "ply\nformat ascii 1.0\ncomment test\nelement vertex 2\n\
        property float x\nproperty float y\nproperty float z\n\
        property uchar red\nproperty uchar green\nproperty uchar blue\n\
        end_header\n0 0 0 255 0 0\n1.5 -2 3 0 128 255\n";

    #[test]
    fn test_ascii_with_color() {
        let store = parse_ply(ASCII.as_bytes()).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.channels.color);
        assert!(!store.channels.normals);
        assert_eq!(store.records()[1].position, Vec3::new(1.5, -2.0, 3.0));
        assert_eq!(store.records()[1].rgb(), [0, 128, 255]);
        assert_eq!(store.metadata.min_color_channel, 0.0);
        assert_eq!(store.metadata.max_color_channel, 255.0);
    }

    #[test]
    fn test_missing_color_is_white() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1\nproperty double x\n\
            property double y\nproperty double z\nend_header\n1 2 3\n";
        let store = parse_ply(text.as_bytes()).unwrap();
        assert!(!store.channels.color);
        assert_eq!(store.records()[0].rgb(), [255, 255, 255]);
    }

    #[test]
    fn test_binary_little_endian_with_double() {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\n\
            property double x\nproperty double y\nproperty double z\n\
            property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n"
            .to_vec();
        for v in [1.0f64, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[7, 8, 9]);

        let store = parse_ply(&bytes).unwrap();
        assert_eq!(store.records()[0].position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(store.records()[0].rgb(), [7, 8, 9]);
    }

    #[test]
    fn test_skips_elements_before_vertex() {
        let text = "ply\nformat ascii 1.0\nelement camera 1\nproperty float fov\n\
            property list uchar int ids\nelement vertex 1\nproperty float x\n\
            property float y\nproperty float z\nend_header\n60 2 4 5\n9 8 7\n";
        let store = parse_ply(text.as_bytes()).unwrap();
        assert_eq!(store.records()[0].position, Vec3::new(9.0, 8.0, 7.0));
    }

    #[test]
    fn test_normals_are_flagged() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\n\
            property float y\nproperty float z\nproperty float nx\nproperty float ny\n\
            property float nz\nend_header\n0 0 0 0 0 1\n";
        let store = parse_ply(text.as_bytes()).unwrap();
        assert!(store.channels.normals);
        assert!(store.metadata.normals_computed);
        assert_eq!(store.records()[0].normal, Vec3::Z);
    }

    #[test]
    fn test_rejects_big_endian() {
        let text = "ply\nformat binary_big_endian 1.0\nelement vertex 0\nend_header\n";
        assert!(matches!(parse_ply(text.as_bytes()), Err(CloudError::Parse(_))));
    }

    #[test]
    fn test_rejects_truncated_body() {
        let truncated = &ASCII[..ASCII.len() - 6];
        assert!(parse_ply(truncated.as_bytes()).is_err());
    }
}
