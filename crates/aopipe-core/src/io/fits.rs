use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use ndarray::Array2;

use crate::error::{AoError, Result};
use crate::frame::{Frame, FrameHeader, HeaderValue};

const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;

/// Keywords that describe the data layout and are regenerated on write.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2", "NAXIS3", "EXTEND", "BZERO", "BSCALE",
];

/// Data layout of a primary HDU.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Layout {
    bitpix: i64,
    rows: usize,
    cols: usize,
    planes: usize,
    bscale: f64,
    bzero: f64,
}

impl Layout {
    fn bytes_per_value(&self) -> usize {
        (self.bitpix.unsigned_abs() / 8) as usize
    }

    fn data_bytes(&self) -> usize {
        self.rows * self.cols * self.planes * self.bytes_per_value()
    }
}

/// Read every image plane of a FITS primary HDU.
///
/// A 2-D image yields one frame, a 3-D cube one frame per plane; every
/// frame carries the (non-structural) header keywords.
pub fn read_fits(path: &Path) -> Result<Vec<Frame>> {
    let file = open_existing(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    let (cards, data_offset) = parse_header_cards(&mmap)?;
    let layout = layout_from_cards(&cards)?;
    let header = user_header(cards);

    let end = data_offset + layout.data_bytes();
    if mmap.len() < end {
        return Err(AoError::InvalidFits(format!(
            "{}: data truncated, expected {} bytes, got {}",
            path.display(),
            end,
            mmap.len()
        )));
    }

    let mut cursor = Cursor::new(&mmap[data_offset..end]);
    let plane_len = layout.rows * layout.cols;
    let mut frames = Vec::with_capacity(layout.planes);
    for _ in 0..layout.planes {
        let mut values = Vec::with_capacity(plane_len);
        for _ in 0..plane_len {
            let raw = match layout.bitpix {
                8 => cursor.read_u8()? as f64,
                16 => cursor.read_i16::<BigEndian>()? as f64,
                32 => cursor.read_i32::<BigEndian>()? as f64,
                64 => cursor.read_i64::<BigEndian>()? as f64,
                -32 => cursor.read_f32::<BigEndian>()? as f64,
                -64 => cursor.read_f64::<BigEndian>()?,
                other => return Err(AoError::InvalidFits(format!("unsupported BITPIX {other}"))),
            };
            values.push(raw * layout.bscale + layout.bzero);
        }
        let data = Array2::from_shape_vec((layout.rows, layout.cols), values)
            .map_err(|e| AoError::InvalidFits(e.to_string()))?;
        frames.push(Frame::with_header(data, header.clone()));
    }
    Ok(frames)
}

/// Read only the header keywords of a FITS file.
pub fn read_fits_header(path: &Path) -> Result<FrameHeader> {
    let file = open_existing(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let (cards, _) = parse_header_cards(&mmap)?;
    Ok(user_header(cards))
}

/// Write a 2-D image as a BITPIX -64 primary HDU, overwriting `path`.
pub fn write_fits(path: &Path, data: &Array2<f64>, header: &FrameHeader) -> Result<()> {
    write_planes(path, std::slice::from_ref(data), header)
}

/// Write equally shaped images as one 3-D cube.
pub fn write_fits_cube(path: &Path, planes: &[Array2<f64>], header: &FrameHeader) -> Result<()> {
    if planes.is_empty() {
        return Err(AoError::EmptySequence);
    }
    write_planes(path, planes, header)
}

fn write_planes(path: &Path, planes: &[Array2<f64>], header: &FrameHeader) -> Result<()> {
    let (rows, cols) = planes[0].dim();
    for plane in planes {
        if plane.dim() != (rows, cols) {
            return Err(AoError::DimensionMismatch {
                expected_rows: rows,
                expected_cols: cols,
                rows: plane.nrows(),
                cols: plane.ncols(),
            });
        }
    }

    let mut cards = vec![
        format_card("SIMPLE", &HeaderValue::Bool(true)),
        format_card("BITPIX", &HeaderValue::Int(-64)),
    ];
    let cube = planes.len() > 1;
    cards.push(format_card("NAXIS", &HeaderValue::Int(if cube { 3 } else { 2 })));
    cards.push(format_card("NAXIS1", &HeaderValue::Int(cols as i64)));
    cards.push(format_card("NAXIS2", &HeaderValue::Int(rows as i64)));
    if cube {
        cards.push(format_card("NAXIS3", &HeaderValue::Int(planes.len() as i64)));
    }
    for (key, value) in header.iter() {
        if !STRUCTURAL_KEYWORDS.contains(&key) {
            cards.push(format_card(key, value));
        }
    }
    cards.push(format!("{:<80}", "END"));

    let mut writer = BufWriter::new(File::create(path)?);
    let mut written = 0usize;
    for card in &cards {
        writer.write_all(card.as_bytes())?;
        written += CARD_SIZE;
    }
    pad_block(&mut writer, written, b' ')?;

    let mut data_bytes = 0usize;
    for plane in planes {
        for &v in plane.iter() {
            writer.write_f64::<BigEndian>(v)?;
            data_bytes += 8;
        }
    }
    pad_block(&mut writer, data_bytes, 0)?;
    writer.flush()?;
    Ok(())
}

fn pad_block<W: Write>(writer: &mut W, written: usize, fill: u8) -> Result<()> {
    let padding = (BLOCK_SIZE - written % BLOCK_SIZE) % BLOCK_SIZE;
    writer.write_all(&vec![fill; padding])?;
    Ok(())
}

fn open_existing(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(AoError::FileNotFound(path.to_path_buf()));
    }
    Ok(File::open(path)?)
}

/// Parse header cards up to END. Returns the cards and the data offset.
fn parse_header_cards(bytes: &[u8]) -> Result<(Vec<(String, HeaderValue)>, usize)> {
    if bytes.len() < BLOCK_SIZE || !bytes.starts_with(b"SIMPLE") {
        return Err(AoError::InvalidFits("missing SIMPLE card".into()));
    }

    let mut cards = Vec::new();
    let mut offset = 0;
    loop {
        if offset + CARD_SIZE > bytes.len() {
            return Err(AoError::InvalidFits("header has no END card".into()));
        }
        let card = &bytes[offset..offset + CARD_SIZE];
        offset += CARD_SIZE;

        let keyword = String::from_utf8_lossy(&card[..8]).trim().to_string();
        if keyword == "END" {
            break;
        }
        if keyword.is_empty() || keyword == "COMMENT" || keyword == "HISTORY" {
            continue;
        }
        if &card[8..10] == b"= " {
            cards.push((keyword, parse_value(&String::from_utf8_lossy(&card[10..]))));
        }
    }

    let data_offset = offset.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    Ok((cards, data_offset))
}

fn parse_value(field: &str) -> HeaderValue {
    let s = field.trim_start();
    if let Some(rest) = s.strip_prefix('\'') {
        // Quoted string; '' is an escaped quote.
        let mut out = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                out.push(ch);
            }
        }
        return HeaderValue::Str(out.trim_end().to_string());
    }

    let value = s.split('/').next().unwrap_or("").trim();
    match value {
        "T" => HeaderValue::Bool(true),
        "F" => HeaderValue::Bool(false),
        _ => {
            if let Ok(i) = value.parse::<i64>() {
                HeaderValue::Int(i)
            } else if let Ok(f) = value.replace(['D', 'd'], "E").parse::<f64>() {
                HeaderValue::Float(f)
            } else {
                HeaderValue::Str(value.to_string())
            }
        }
    }
}

fn format_card(key: &str, value: &HeaderValue) -> String {
    let key: String = key.chars().take(8).collect();
    let body = match value {
        HeaderValue::Str(s) => {
            let escaped = s.replace('\'', "''");
            format!("'{escaped:<8}'")
        }
        HeaderValue::Int(i) => format!("{i:>20}"),
        HeaderValue::Float(f) => format!("{:>20}", format!("{f:E}")),
        HeaderValue::Bool(b) => format!("{:>20}", if *b { "T" } else { "F" }),
    };
    let mut card = format!("{key:<8}= {body}");
    card.truncate(CARD_SIZE);
    format!("{card:<80}")
}

fn layout_from_cards(cards: &[(String, HeaderValue)]) -> Result<Layout> {
    let get = |key: &str| cards.iter().find(|(k, _)| k == key).map(|(_, v)| v);
    let int = |key: &str| -> Result<i64> {
        get(key)
            .and_then(HeaderValue::as_i64)
            .ok_or_else(|| AoError::MissingKeyword(key.to_string()))
    };

    let bitpix = int("BITPIX")?;
    let naxis = int("NAXIS")?;
    if !(2..=3).contains(&naxis) {
        return Err(AoError::InvalidFits(format!("unsupported NAXIS {naxis}")));
    }
    let cols = int("NAXIS1")? as usize;
    let rows = int("NAXIS2")? as usize;
    let planes = if naxis == 3 { int("NAXIS3")? as usize } else { 1 };

    Ok(Layout {
        bitpix,
        rows,
        cols,
        planes,
        bscale: get("BSCALE").and_then(HeaderValue::as_f64).unwrap_or(1.0),
        bzero: get("BZERO").and_then(HeaderValue::as_f64).unwrap_or(0.0),
    })
}

fn user_header(cards: Vec<(String, HeaderValue)>) -> FrameHeader {
    let mut header = FrameHeader::new();
    for (key, value) in cards {
        if !STRUCTURAL_KEYWORDS.contains(&key.as_str()) {
            header.set(&key, value);
        }
    }
    header
}
