//! Reader and writer for C3D motion capture files.
//!
//! Implements the subset of the C3D format used by the dataset's joint
//! annotation files: Intel byte order, the `POINT` parameter group, and
//! floating point or scaled integer point data. Analog channels are ignored.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array3;

use crate::error::{Aspset510Error, Result};
use crate::mocap::Mocap;
use crate::skeleton::{skeleton_registry, Skeleton, ASPSET_17J};

const BLOCK_SIZE: usize = 512;
const MAGIC: u8 = 0x50;
/// Processor type byte for Intel (little-endian) files.
const PROCESSOR_INTEL: u8 = 84;

/// Parameter data types as stored in the parameter section.
const TYPE_CHAR: i8 = -1;
const TYPE_INT16: i8 = 2;
const TYPE_FLOAT: i8 = 4;

/// A raw parameter from the parameter section.
struct Param {
    data_type: i8,
    dimensions: Vec<usize>,
    data: Vec<u8>,
}

impl Param {
    fn element_count(&self) -> usize {
        self.dimensions.iter().product::<usize>().max(1)
    }

    fn as_i16(&self) -> Result<i16> {
        if self.data_type != TYPE_INT16 || self.data.len() < 2 {
            return Err(Aspset510Error::mocap("expected a 16-bit integer parameter"));
        }
        Ok(i16::from_le_bytes([self.data[0], self.data[1]]))
    }

    fn as_f32(&self) -> Result<f32> {
        if self.data_type != TYPE_FLOAT || self.data.len() < 4 {
            return Err(Aspset510Error::mocap("expected a float parameter"));
        }
        Ok(f32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]))
    }

    /// Decode a 2D char parameter as a list of trimmed strings.
    fn as_strings(&self) -> Result<Vec<String>> {
        if self.data_type != TYPE_CHAR || self.dimensions.len() != 2 {
            return Err(Aspset510Error::mocap("expected a 2D char parameter"));
        }
        let width = self.dimensions[0];
        let count = self.dimensions[1];
        let mut strings = Vec::with_capacity(count);
        for i in 0..count {
            let start = i * width;
            let end = (start + width).min(self.data.len());
            let raw = self.data.get(start..end).unwrap_or(&[]);
            strings.push(String::from_utf8_lossy(raw).trim().to_string());
        }
        Ok(strings)
    }
}

/// Load a mocap sequence from a C3D file.
///
/// # Errors
/// - File cannot be read
/// - File is not an Intel-processor C3D file
/// - Required `POINT` parameters are missing or malformed
pub fn load_c3d_mocap(path: &Path) -> Result<Mocap> {
    let bytes = std::fs::read(path)
        .map_err(|e| Aspset510Error::file_io_error("read c3d file", path, &e))?;
    parse_c3d(&bytes)
        .map_err(|e| Aspset510Error::mocap(format!("'{}': {}", path.display(), e)))
}

/// Save a mocap sequence as a floating point Intel C3D file.
pub fn save_c3d_mocap(mocap: &Mocap, path: &Path) -> Result<()> {
    let skeleton = skeleton_registry(mocap.skeleton_name())?;
    let bytes = encode_c3d(mocap, skeleton)?;
    std::fs::write(path, bytes)
        .map_err(|e| Aspset510Error::file_io_error("write c3d file", path, &e))
}

fn parse_c3d(bytes: &[u8]) -> Result<Mocap> {
    if bytes.len() < BLOCK_SIZE {
        return Err(Aspset510Error::mocap("file is shorter than the c3d header"));
    }
    if bytes[1] != MAGIC {
        return Err(Aspset510Error::mocap("missing c3d magic byte"));
    }
    let param_block = bytes[0] as usize;

    let mut header = Cursor::new(&bytes[2..]);
    let header_point_count = header.read_u16::<LittleEndian>()?;
    let _analog_per_frame = header.read_u16::<LittleEndian>()?;
    let first_frame = header.read_u16::<LittleEndian>()?;
    let last_frame = header.read_u16::<LittleEndian>()?;
    let _max_gap = header.read_u16::<LittleEndian>()?;
    let header_scale = header.read_f32::<LittleEndian>()?;
    let header_data_start = header.read_u16::<LittleEndian>()?;
    let _analog_samples = header.read_u16::<LittleEndian>()?;
    let header_rate = header.read_f32::<LittleEndian>()?;

    let params = parse_parameter_section(bytes, param_block)?;
    let point = |name: &str| params.get(&("POINT".to_string(), name.to_string()));

    // Prefer the parameter section over the header where both carry a value.
    let point_count = match point("USED") {
        Some(p) => p.as_i16()? as usize,
        None => header_point_count as usize,
    };
    let frame_count = match point("FRAMES") {
        Some(p) => p.as_i16()? as usize,
        None => usize::from(last_frame).saturating_sub(usize::from(first_frame)) + 1,
    };
    let scale = match point("SCALE") {
        Some(p) => p.as_f32()?,
        None => header_scale,
    };
    let sample_rate = match point("RATE") {
        Some(p) => p.as_f32()?,
        None => header_rate,
    };
    let data_start = match point("DATA_START") {
        Some(p) => p.as_i16()? as usize,
        None => header_data_start as usize,
    };
    let labels = match point("LABELS") {
        Some(p) => p.as_strings()?,
        None => Vec::new(),
    };

    if point_count == 0 {
        return Err(Aspset510Error::mocap("file contains no 3D points"));
    }
    let data_offset = (data_start.saturating_sub(1)) * BLOCK_SIZE;
    if data_offset >= bytes.len() {
        return Err(Aspset510Error::mocap("point data offset is past the end of the file"));
    }

    let mut reader = Cursor::new(&bytes[data_offset..]);
    let mut positions = Array3::<f32>::zeros((frame_count, point_count, 3));
    for frame in 0..frame_count {
        for joint in 0..point_count {
            let (x, y, z) = if scale < 0.0 {
                let x = reader.read_f32::<LittleEndian>()?;
                let y = reader.read_f32::<LittleEndian>()?;
                let z = reader.read_f32::<LittleEndian>()?;
                let _residual = reader.read_f32::<LittleEndian>()?;
                (x, y, z)
            } else {
                let x = f32::from(reader.read_i16::<LittleEndian>()?) * scale;
                let y = f32::from(reader.read_i16::<LittleEndian>()?) * scale;
                let z = f32::from(reader.read_i16::<LittleEndian>()?) * scale;
                let _residual = reader.read_i16::<LittleEndian>()?;
                (x, y, z)
            };
            positions[[frame, joint, 0]] = x;
            positions[[frame, joint, 1]] = y;
            positions[[frame, joint, 2]] = z;
        }
    }

    let skeleton_name = infer_skeleton_name(&labels, point_count)?;
    Mocap::new(positions, skeleton_name, sample_rate)
}

/// Parse the parameter section into a `(group, parameter)` map.
fn parse_parameter_section(bytes: &[u8], param_block: usize) -> Result<HashMap<(String, String), Param>> {
    let start = (param_block.saturating_sub(1)) * BLOCK_SIZE;
    if start + 4 > bytes.len() {
        return Err(Aspset510Error::mocap("parameter section offset is out of bounds"));
    }
    let section = &bytes[start..];
    let processor = section[3];
    if processor != PROCESSOR_INTEL {
        return Err(Aspset510Error::mocap(format!(
            "unsupported processor type {processor} (only Intel files are supported)"
        )));
    }

    let mut group_names: HashMap<u8, String> = HashMap::new();
    let mut raw_params: Vec<(u8, String, Param)> = Vec::new();

    let mut pos = 4usize;
    loop {
        if pos + 2 > section.len() {
            break;
        }
        let name_len = section[pos] as i8;
        if name_len == 0 {
            break;
        }
        let id = section[pos + 1] as i8;
        let name_len = name_len.unsigned_abs() as usize;
        pos += 2;
        if pos + name_len > section.len() {
            return Err(Aspset510Error::mocap("truncated parameter name"));
        }
        let name = String::from_utf8_lossy(&section[pos..pos + name_len])
            .trim()
            .to_uppercase();
        pos += name_len;

        let mut cursor = Cursor::new(&section[pos..]);
        let offset = cursor.read_i16::<LittleEndian>()?;
        let body_start = pos + 2;
        // The offset counts from the start of the offset field; zero marks
        // the final entry.
        let next_pos = if offset == 0 { None } else { Some(pos + offset as usize) };

        if id < 0 {
            // Group definition.
            group_names.insert(id.unsigned_abs(), name);
        } else {
            let mut cursor = Cursor::new(section.get(body_start..).unwrap_or(&[]));
            let data_type = cursor.read_i8()?;
            let ndims = cursor.read_u8()? as usize;
            let mut dimensions = Vec::with_capacity(ndims);
            for _ in 0..ndims {
                dimensions.push(cursor.read_u8()? as usize);
            }
            let element_size = match data_type {
                TYPE_CHAR | 1 => 1,
                TYPE_INT16 => 2,
                TYPE_FLOAT => 4,
                other => {
                    return Err(Aspset510Error::mocap(format!(
                        "unsupported parameter data type {other}"
                    )))
                },
            };
            let data_len = dimensions.iter().product::<usize>().max(1) * element_size;
            let mut data = vec![0u8; data_len];
            cursor.read_exact(&mut data)?;
            raw_params.push((id as u8, name, Param { data_type, dimensions, data }));
        }

        match next_pos {
            Some(next) if next > pos => pos = next,
            _ => break,
        }
    }

    let mut params = HashMap::new();
    for (group_id, name, param) in raw_params {
        let group = group_names
            .get(&group_id)
            .cloned()
            .unwrap_or_else(|| format!("GROUP{group_id}"));
        params.insert((group, name), param);
    }
    Ok(params)
}

/// Infer the skeleton from point labels, falling back to the joint count.
fn infer_skeleton_name(labels: &[String], point_count: usize) -> Result<&'static str> {
    for skeleton in [&ASPSET_17J] {
        if labels_match_skeleton(labels, skeleton) {
            return Ok(skeleton.name());
        }
    }
    if labels.is_empty() && point_count == ASPSET_17J.joint_count() {
        return Ok(ASPSET_17J.name());
    }
    Err(Aspset510Error::mocap(format!(
        "could not infer a skeleton from {point_count} points with labels {labels:?}"
    )))
}

fn labels_match_skeleton(labels: &[String], skeleton: &Skeleton) -> bool {
    labels.len() == skeleton.joint_count()
        && labels
            .iter()
            .zip(skeleton.joint_names())
            .all(|(label, name)| label.eq_ignore_ascii_case(name))
}

fn encode_c3d(mocap: &Mocap, skeleton: &Skeleton) -> Result<Vec<u8>> {
    let frame_count = mocap.frame_count();
    let point_count = mocap.joint_count();
    if frame_count == 0 || frame_count > u16::MAX as usize {
        return Err(Aspset510Error::mocap(format!(
            "frame count {frame_count} cannot be stored in a c3d file"
        )));
    }

    // The parameter section layout is independent of the DATA_START value, so
    // measure it with a placeholder before writing the real thing.
    let measured = encode_parameter_section(skeleton, mocap.sample_rate(), frame_count, point_count, 0)?;
    let param_blocks = measured.len() / BLOCK_SIZE;
    let data_start_block = 2 + param_blocks;
    let params = encode_parameter_section(
        skeleton,
        mocap.sample_rate(),
        frame_count,
        point_count,
        data_start_block as i16,
    )?;
    debug_assert_eq!(params.len(), measured.len());

    let mut out = Vec::new();
    // Header block.
    out.push(2u8); // first parameter block
    out.push(MAGIC);
    out.write_u16::<LittleEndian>(point_count as u16)?;
    out.write_u16::<LittleEndian>(0)?; // analog measurements per frame
    out.write_u16::<LittleEndian>(1)?; // first frame
    out.write_u16::<LittleEndian>(frame_count as u16)?;
    out.write_u16::<LittleEndian>(0)?; // max interpolation gap
    out.write_f32::<LittleEndian>(-1.0)?; // negative scale: float data
    out.write_u16::<LittleEndian>(data_start_block as u16)?;
    out.write_u16::<LittleEndian>(0)?; // analog samples per frame
    out.write_f32::<LittleEndian>(mocap.sample_rate())?;
    pad_to_block(&mut out);

    out.extend_from_slice(&params);

    // Point data.
    let positions = mocap.joint_positions();
    for frame in 0..frame_count {
        for joint in 0..point_count {
            out.write_f32::<LittleEndian>(positions[[frame, joint, 0]])?;
            out.write_f32::<LittleEndian>(positions[[frame, joint, 1]])?;
            out.write_f32::<LittleEndian>(positions[[frame, joint, 2]])?;
            out.write_f32::<LittleEndian>(0.0)?; // residual
        }
    }
    pad_to_block(&mut out);
    Ok(out)
}

fn encode_parameter_section(
    skeleton: &Skeleton,
    sample_rate: f32,
    frame_count: usize,
    point_count: usize,
    data_start_block: i16,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.push(0u8);
    out.push(MAGIC);
    out.push(0u8); // parameter block count, patched below
    out.push(PROCESSOR_INTEL);

    // POINT group definition (id 1).
    write_entry(&mut out, "POINT", -1, &[], true)?;

    write_scalar_i16(&mut out, "USED", point_count as i16)?;
    write_scalar_i16(&mut out, "FRAMES", frame_count as i16)?;
    write_scalar_i16(&mut out, "DATA_START", data_start_block)?;
    write_scalar_f32(&mut out, "SCALE", -1.0)?;
    write_scalar_f32(&mut out, "RATE", sample_rate)?;
    write_labels(&mut out, skeleton.joint_names(), true)?;

    pad_to_block(&mut out);
    let block_count = out.len() / BLOCK_SIZE;
    out[2] = block_count as u8;
    Ok(out)
}

/// Write one group or parameter entry. The body excludes the trailing
/// description, which is always written empty.
fn write_entry(out: &mut Vec<u8>, name: &str, id: i8, body: &[u8], more_follow: bool) -> Result<()> {
    out.write_i8(name.len() as i8)?;
    out.write_i8(id)?;
    out.extend_from_slice(name.as_bytes());
    // Body plus a one-byte empty description.
    let offset = if more_follow { body.len() as i16 + 2 + 1 } else { 0 };
    out.write_i16::<LittleEndian>(offset)?;
    out.extend_from_slice(body);
    out.push(0u8); // description length
    Ok(())
}

fn write_scalar_i16(out: &mut Vec<u8>, name: &str, value: i16) -> Result<()> {
    let mut body = Vec::new();
    body.write_i8(TYPE_INT16)?;
    body.push(0u8); // scalar: zero dimensions
    body.write_i16::<LittleEndian>(value)?;
    write_entry(out, name, 1, &body, true)
}

fn write_scalar_f32(out: &mut Vec<u8>, name: &str, value: f32) -> Result<()> {
    let mut body = Vec::new();
    body.write_i8(TYPE_FLOAT)?;
    body.push(0u8);
    body.write_f32::<LittleEndian>(value)?;
    write_entry(out, name, 1, &body, true)
}

fn write_labels(out: &mut Vec<u8>, labels: &[&str], last: bool) -> Result<()> {
    let width = labels.iter().map(|l| l.len()).max().unwrap_or(0).max(1);
    let mut body = Vec::new();
    body.write_i8(TYPE_CHAR)?;
    body.push(2u8);
    body.push(width as u8);
    body.push(labels.len() as u8);
    for label in labels {
        let mut padded = label.as_bytes().to_vec();
        padded.resize(width, b' ');
        body.extend_from_slice(&padded);
    }
    write_entry(out, "LABELS", 1, &body, !last)
}

fn pad_to_block(out: &mut Vec<u8>) {
    let remainder = out.len() % BLOCK_SIZE;
    if remainder != 0 {
        out.resize(out.len() + BLOCK_SIZE - remainder, 0);
    }
}
