use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// FITS files are organized in 2880-byte blocks of 80-character cards
const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;

// Safety limit - refuse headers longer than 360 blocks (~1 MB)
const MAX_HEADER_BLOCKS: usize = 360;

/// Pixel-scale keyword candidates in priority order, paired with the
/// matching second-axis keyword used for the consistency check.
/// Different WCS conventions store the per-axis scale under different
/// names; the ordering ranks convention likelihood.
pub const PIXSCALE_KEYWORDS: [(&str, &str); 3] = [
    ("CDELT1", "CDELT2"),
    ("CD1_1", "CD2_2"),
    ("PC1_1", "PC2_2"),
];

/// Header and shape information for one HDU
#[derive(Debug, Clone, serde::Serialize)]
pub struct HduInfo {
    pub index: usize,
    pub name: Option<String>,
    pub bit_depth: Option<i64>,
    pub dimensions: Vec<usize>,
    pub keywords: HashMap<String, String>,
}

impl HduInfo {
    /// True when this HDU carries a data payload (NAXIS > 0 and no zero-length axis)
    pub fn has_data(&self) -> bool {
        !self.dimensions.is_empty() && self.dimensions.iter().all(|&d| d > 0)
    }
}

/// Full inspection report for one FITS file
#[derive(Debug, serde::Serialize)]
pub struct FitsInspection {
    pub filename: String,
    pub hdus: Vec<HduInfo>,
    pub data_hdu: Option<usize>,
    pub pixscale_deg: Option<f64>,
    pub field_of_view_deg: Option<(f64, f64)>,
}

/// Read the ordered HDU list from a FITS file.
///
/// Only headers are parsed; data segments are skipped over. The file handle
/// is scoped to this call and released on every exit path.
pub fn load_hdus(path: &Path) -> Result<Vec<HduInfo>> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open FITS file: {}", path.display()))?;

    let mut hdus = Vec::new();
    while let Some(header_data) = read_header_blocks(&mut file)
        .with_context(|| format!("Failed to read HDU {} of {}", hdus.len(), path.display()))?
    {
        let keywords = parse_fits_header(&header_data);

        if hdus.is_empty() && !keywords.contains_key("SIMPLE") {
            return Err(anyhow::anyhow!(
                "Not a FITS file (missing SIMPLE keyword): {}",
                path.display()
            ));
        }

        let naxis = keyword_usize(&keywords, "NAXIS").unwrap_or(0);
        let dimensions: Vec<usize> = (1..=naxis)
            .map(|i| keyword_usize(&keywords, &format!("NAXIS{}", i)).unwrap_or(0))
            .collect();
        let data_bytes = data_segment_size(&keywords, &dimensions);

        hdus.push(HduInfo {
            index: hdus.len(),
            name: keywords.get("EXTNAME").cloned(),
            bit_depth: keyword_i64(&keywords, "BITPIX"),
            dimensions,
            keywords,
        });

        if data_bytes > 0 {
            file.seek(SeekFrom::Current(data_bytes as i64))?;
        }
    }

    if hdus.is_empty() {
        return Err(anyhow::anyhow!("Empty FITS file: {}", path.display()));
    }

    Ok(hdus)
}

/// Return the index of the first HDU with a data payload.
///
/// Files are assumed to carry exactly one data-bearing HDU; any extra ones
/// are reported through a warning and the first index still wins, so
/// multi-extension spectroscopy layouts are not supported.
pub fn find_data_extension(hdus: &[HduInfo]) -> Result<usize> {
    let mut with_data = hdus.iter().filter(|h| h.has_data()).map(|h| h.index);

    let first = with_data
        .next()
        .ok_or_else(|| anyhow::anyhow!("No data-bearing HDU found in {} HDUs", hdus.len()))?;

    let extra: Vec<usize> = with_data.collect();
    if !extra.is_empty() {
        tracing::warn!(
            "Multiple data-bearing HDUs found (using {}, ignoring {:?})",
            first,
            extra
        );
    }

    Ok(first)
}

/// Extract the pixel scale (degrees per pixel) from a header.
///
/// Tries CDELT1, then CD1_1, then PC1_1 and returns the absolute value of
/// the first keyword present. Rotation terms of a full CD/PC matrix are not
/// considered; axis 1 is taken as representative.
pub fn get_pixscale_from_header(header: &HashMap<String, String>) -> Result<f64> {
    for (keyword, second_axis) in PIXSCALE_KEYWORDS {
        let Some(raw) = header.get(keyword) else {
            continue;
        };
        let value = raw
            .parse::<f64>()
            .with_context(|| format!("{} is not numeric: {:?}", keyword, raw))?;

        if let Some(other) = header.get(second_axis).and_then(|s| s.parse::<f64>().ok()) {
            let scale = value.abs().max(other.abs());
            if (value.abs() - other.abs()).abs() > scale * 1e-6 {
                tracing::warn!(
                    "{} = {} disagrees with {} = {}; using axis 1",
                    keyword,
                    value,
                    second_axis,
                    other
                );
            }
        }

        return Ok(value.abs());
    }

    Err(anyhow::anyhow!(
        "no pixscale found (tried CDELT1, CD1_1, PC1_1)"
    ))
}

/// On-sky extent of an image HDU in degrees (width, height), from the pixel
/// scale and the first two axis lengths.
pub fn field_of_view(hdu: &HduInfo) -> Option<(f64, f64)> {
    if hdu.dimensions.len() < 2 {
        return None;
    }
    let pixscale = get_pixscale_from_header(&hdu.keywords).ok()?;
    Some((
        hdu.dimensions[0] as f64 * pixscale,
        hdu.dimensions[1] as f64 * pixscale,
    ))
}

/// Load a file and resolve the data HDU, pixel scale and field of view in
/// one pass. Missing data HDU or pixel scale leaves the fields as None so
/// directory scans can keep going.
pub fn inspect_fits(path: &Path) -> Result<FitsInspection> {
    let hdus = load_hdus(path)?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let data_hdu = find_data_extension(&hdus).ok();
    let pixscale_deg = data_hdu.and_then(|i| get_pixscale_from_header(&hdus[i].keywords).ok());
    let field_of_view_deg = data_hdu.and_then(|i| field_of_view(&hdus[i]));

    Ok(FitsInspection {
        filename,
        hdus,
        data_hdu,
        pixscale_deg,
        field_of_view_deg,
    })
}

/// Read header blocks for one HDU until the END card.
///
/// Returns None on a clean end of file (no more HDUs). An end of file in the
/// middle of a header is an error.
fn read_header_blocks(file: &mut File) -> Result<Option<Vec<u8>>> {
    let mut header_data = Vec::new();

    loop {
        let mut block = [0u8; BLOCK_SIZE];
        match file.read_exact(&mut block) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                if header_data.is_empty() {
                    return Ok(None);
                }
                return Err(anyhow::anyhow!("Truncated FITS header (no END card)"));
            }
            Err(e) => return Err(e.into()),
        }

        let end_found = block_has_end(&block);
        header_data.extend_from_slice(&block);
        if end_found {
            return Ok(Some(header_data));
        }

        if header_data.len() >= MAX_HEADER_BLOCKS * BLOCK_SIZE {
            return Err(anyhow::anyhow!(
                "FITS header exceeds {} blocks without an END card",
                MAX_HEADER_BLOCKS
            ));
        }
    }
}

fn block_has_end(block: &[u8]) -> bool {
    block
        .chunks(CARD_SIZE)
        .any(|card| card.len() >= 8 && card[..8] == *b"END     ")
}

/// Parse FITS header cards into a keyword map
fn parse_fits_header(data: &[u8]) -> HashMap<String, String> {
    let mut keywords = HashMap::new();

    for chunk in data.chunks(CARD_SIZE) {
        let Ok(card) = std::str::from_utf8(chunk) else {
            continue;
        };
        let card = card.trim_end();

        if card.starts_with("END") && card[3..].trim().is_empty() {
            break;
        }

        // Skip commentary cards
        if card.is_empty()
            || card.starts_with("COMMENT")
            || card.starts_with("HISTORY")
            || card.starts_with("CONTINUE")
        {
            continue;
        }

        // KEYWORD = VALUE / COMMENT
        let Some(eq_pos) = card.find('=') else {
            continue;
        };
        let keyword = card[..eq_pos].trim();
        let value_part = card[eq_pos + 1..].trim_start();

        let value = if let Some(quoted) = value_part.strip_prefix('\'') {
            // Quoted string: take up to the closing quote so slashes inside
            // the value are not mistaken for a comment separator
            quoted
                .split_once('\'')
                .map(|(s, _)| s)
                .unwrap_or(quoted)
                .trim_end()
        } else if let Some(comment_pos) = value_part.find('/') {
            value_part[..comment_pos].trim()
        } else {
            value_part.trim()
        };

        if !keyword.is_empty() {
            keywords.insert(keyword.to_string(), value.to_string());
        }
    }

    keywords
}

/// Size in bytes of the data segment following a header, rounded up to a
/// whole number of blocks. Zero when the HDU carries no data.
fn data_segment_size(keywords: &HashMap<String, String>, dimensions: &[usize]) -> u64 {
    let bitpix = keyword_i64(keywords, "BITPIX").unwrap_or(0).unsigned_abs();
    if bitpix == 0 || dimensions.is_empty() || dimensions.iter().any(|&d| d == 0) {
        return 0;
    }

    let elements: u64 = dimensions.iter().map(|&d| d as u64).product();
    let pcount = keyword_u64(keywords, "PCOUNT").unwrap_or(0);
    let gcount = keyword_u64(keywords, "GCOUNT").unwrap_or(1).max(1);

    let bytes = bitpix / 8 * gcount * (pcount + elements);
    bytes.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

fn keyword_usize(keywords: &HashMap<String, String>, key: &str) -> Option<usize> {
    keywords.get(key).and_then(|s| s.parse().ok())
}

fn keyword_u64(keywords: &HashMap<String, String>, key: &str) -> Option<u64> {
    keywords.get(key).and_then(|s| s.parse().ok())
}

fn keyword_i64(keywords: &HashMap<String, String>, key: &str) -> Option<i64> {
    keywords.get(key).and_then(|s| s.parse().ok())
}

/// Format an inspection report for display
pub fn format_inspection(inspection: &FitsInspection, verbose: bool) -> String {
    let mut output = String::new();

    output.push_str(&format!("FITS File: {}\n", inspection.filename));
    output.push_str(&format!("HDUs: {}\n", inspection.hdus.len()));

    for hdu in &inspection.hdus {
        output.push_str(&format!("  HDU {}", hdu.index));
        if let Some(ref name) = hdu.name {
            output.push_str(&format!(" ({})", name));
        }
        if hdu.has_data() {
            let dims: Vec<String> = hdu.dimensions.iter().map(|d| d.to_string()).collect();
            output.push_str(&format!(": {}", dims.join(" x ")));
            if let Some(bitpix) = hdu.bit_depth {
                output.push_str(&format!(", BITPIX {}", bitpix));
            }
            if inspection.data_hdu == Some(hdu.index) {
                output.push_str("  <- data");
            }
        } else {
            output.push_str(": no data");
        }
        output.push('\n');
    }

    if inspection.data_hdu.is_none() {
        output.push_str("\nNo data-bearing HDU found.\n");
    }

    if let Some(pixscale) = inspection.pixscale_deg {
        output.push_str(&format!(
            "\nPixel Scale: {:.6} deg/px ({:.3} arcsec/px)\n",
            pixscale,
            pixscale * 3600.0
        ));
    }
    if let Some((width, height)) = inspection.field_of_view_deg {
        output.push_str(&format!(
            "Field of View: {:.3} x {:.3} deg\n",
            width, height
        ));
    }

    // Key metadata from the data HDU's header
    if let Some(header) = inspection.data_hdu.map(|i| &inspection.hdus[i].keywords) {
        output.push_str("\nKey Metadata:\n");

        if let Some(date_obs) = header.get("DATE-OBS") {
            output.push_str(&format!("  Date: {}\n", date_obs));
        }
        if let Some(object) = header
            .get("OBJECT")
            .or_else(|| header.get("OBJNAME"))
            .or_else(|| header.get("TARGET"))
        {
            output.push_str(&format!("  Object: {}\n", object));
        }
        if let Some(exptime) = header.get("EXPTIME").or_else(|| header.get("EXPOSURE")) {
            output.push_str(&format!("  Exposure: {}s\n", exptime));
        }
        if let Some(filter) = header.get("FILTER").or_else(|| header.get("FILTERNAME")) {
            output.push_str(&format!("  Filter: {}\n", filter));
        }
        if let Some(telescope) = header.get("TELESCOP") {
            output.push_str(&format!("  Telescope: {}\n", telescope));
        }
        if let Some(instrument) = header.get("INSTRUME") {
            output.push_str(&format!("  Instrument: {}\n", instrument));
        }
    }

    // If verbose, show all headers
    if verbose {
        for hdu in &inspection.hdus {
            output.push_str(&format!("\nHDU {} ", hdu.index));
            if let Some(ref name) = hdu.name {
                output.push_str(&format!("({})", name));
            }
            output.push_str(" - All Keywords:\n");

            let mut sorted_keys: Vec<_> = hdu.keywords.iter().collect();
            sorted_keys.sort_by_key(|&(k, _)| k);

            for (key, value) in sorted_keys {
                output.push_str(&format!("  {:<16} = {}\n", key, value));
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn header(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn hdu(index: usize, dimensions: &[usize]) -> HduInfo {
        HduInfo {
            index,
            name: None,
            bit_depth: Some(16),
            dimensions: dimensions.to_vec(),
            keywords: HashMap::new(),
        }
    }

    fn card(s: &str) -> [u8; 80] {
        let mut card = [b' '; 80];
        card[..s.len()].copy_from_slice(s.as_bytes());
        card
    }

    fn header_block(cards: &[&str]) -> Vec<u8> {
        let mut block = Vec::new();
        for s in cards {
            block.extend_from_slice(&card(s));
        }
        block.extend_from_slice(&card("END"));
        block.resize(BLOCK_SIZE, b' ');
        block
    }

    #[test]
    fn finder_returns_single_data_hdu_at_any_position() {
        for k in [0, 1, 3] {
            let hdus: Vec<HduInfo> = (0..4)
                .map(|i| hdu(i, if i == k { &[100, 100] } else { &[] }))
                .collect();
            assert_eq!(find_data_extension(&hdus).unwrap(), k);
        }
    }

    #[test]
    fn finder_errors_when_no_hdu_has_data() {
        let hdus = vec![hdu(0, &[]), hdu(1, &[])];
        let err = find_data_extension(&hdus).unwrap_err();
        assert!(err.to_string().contains("No data-bearing HDU"));
    }

    #[test]
    fn finder_returns_first_of_multiple_data_hdus() {
        let hdus = vec![hdu(0, &[]), hdu(1, &[10, 10]), hdu(2, &[20, 20])];
        assert_eq!(find_data_extension(&hdus).unwrap(), 1);
    }

    #[test]
    fn zero_length_axis_counts_as_no_data() {
        assert!(!hdu(0, &[]).has_data());
        assert!(!hdu(0, &[512, 0]).has_data());
        assert!(hdu(0, &[512, 512]).has_data());
    }

    #[test]
    fn pixscale_prefers_cdelt1_and_takes_absolute_value() {
        let h = header(&[("CDELT1", "-0.5")]);
        assert_eq!(get_pixscale_from_header(&h).unwrap(), 0.5);
    }

    #[test]
    fn pixscale_falls_back_to_cd1_1() {
        let h = header(&[("CD1_1", "0.001")]);
        assert_eq!(get_pixscale_from_header(&h).unwrap(), 0.001);
    }

    #[test]
    fn pixscale_falls_back_to_pc1_1() {
        let h = header(&[("PC1_1", "-2.0")]);
        assert_eq!(get_pixscale_from_header(&h).unwrap(), 2.0);
    }

    #[test]
    fn pixscale_priority_is_first_match_wins() {
        let h = header(&[("CDELT1", "-0.5"), ("CD1_1", "0.001")]);
        assert_eq!(get_pixscale_from_header(&h).unwrap(), 0.5);
    }

    #[test]
    fn pixscale_errors_when_no_keyword_present() {
        let h = header(&[("NAXIS", "2")]);
        let err = get_pixscale_from_header(&h).unwrap_err();
        assert!(err.to_string().contains("no pixscale found"));
    }

    #[test]
    fn pixscale_errors_on_non_numeric_value() {
        let h = header(&[("CDELT1", "bogus")]);
        let err = get_pixscale_from_header(&h).unwrap_err();
        assert!(err.to_string().contains("CDELT1"));
    }

    #[test]
    fn field_of_view_scales_both_axes() {
        let mut image = hdu(0, &[100, 50]);
        image.keywords = header(&[("CDELT1", "-0.5")]);
        assert_eq!(field_of_view(&image), Some((50.0, 25.0)));

        let bare = hdu(0, &[100, 50]);
        assert_eq!(field_of_view(&bare), None);
    }

    #[test]
    fn parses_header_cards() {
        let block = header_block(&[
            "SIMPLE  =                    T / conforms to FITS standard",
            "BITPIX  =                   16",
            "NAXIS   =                    2",
            "NAXIS1  =                  512",
            "NAXIS2  =                  256",
            "CDELT1  =              -2.8E-4",
            "OBJECT  = 'M 51 / NGC 5194'    / slash inside string",
            "COMMENT this card is skipped",
        ]);
        let keywords = parse_fits_header(&block);

        assert_eq!(keywords.get("SIMPLE").unwrap(), "T");
        assert_eq!(keywords.get("NAXIS1").unwrap(), "512");
        assert_eq!(
            keywords.get("CDELT1").unwrap().parse::<f64>().unwrap(),
            -2.8e-4
        );
        assert_eq!(keywords.get("OBJECT").unwrap(), "M 51 / NGC 5194");
        assert!(!keywords.contains_key("COMMENT"));
        assert!(!keywords.contains_key("END"));
    }

    #[test]
    fn data_segment_rounds_up_to_whole_blocks() {
        let keywords = header(&[("BITPIX", "16")]);
        assert_eq!(data_segment_size(&keywords, &[4, 3]), BLOCK_SIZE as u64);
        assert_eq!(
            data_segment_size(&keywords, &[1440, 2]),
            BLOCK_SIZE as u64 * 2
        );
        assert_eq!(data_segment_size(&keywords, &[]), 0);
        assert_eq!(data_segment_size(&keywords, &[512, 0]), 0);
    }

    /// Two-HDU file: header-only primary plus an image extension
    fn write_sample_fits() -> tempfile::NamedTempFile {
        let mut bytes = header_block(&[
            "SIMPLE  =                    T",
            "BITPIX  =                    8",
            "NAXIS   =                    0",
        ]);
        bytes.extend(header_block(&[
            "XTENSION= 'IMAGE   '",
            "BITPIX  =                   16",
            "NAXIS   =                    2",
            "NAXIS1  =                    4",
            "NAXIS2  =                    3",
            "PCOUNT  =                    0",
            "GCOUNT  =                    1",
            "EXTNAME = 'SCI     '",
            "CDELT1  =                 -0.5",
            "CDELT2  =                  0.5",
        ]));
        let mut data = vec![0u8; BLOCK_SIZE];
        data[..4].copy_from_slice(&[1, 2, 3, 4]);
        bytes.extend(data);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_all_hdus_from_file() {
        let file = write_sample_fits();
        let hdus = load_hdus(file.path()).unwrap();

        assert_eq!(hdus.len(), 2);
        assert!(!hdus[0].has_data());
        assert!(hdus[1].has_data());
        assert_eq!(hdus[1].name.as_deref(), Some("SCI"));
        assert_eq!(hdus[1].dimensions, vec![4, 3]);
        assert_eq!(hdus[1].bit_depth, Some(16));
    }

    #[test]
    fn inspection_resolves_data_hdu_and_pixscale() {
        let file = write_sample_fits();
        let inspection = inspect_fits(file.path()).unwrap();

        assert_eq!(inspection.data_hdu, Some(1));
        assert_eq!(inspection.pixscale_deg, Some(0.5));
        assert_eq!(inspection.field_of_view_deg, Some((2.0, 1.5)));

        let formatted = format_inspection(&inspection, false);
        assert!(formatted.contains("HDU 1 (SCI)"));
        assert!(formatted.contains("<- data"));
    }

    #[test]
    fn open_fails_for_missing_file() {
        assert!(load_hdus(Path::new("/no/such/file.fits")).is_err());
    }

    #[test]
    fn open_fails_for_non_fits_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'x'; BLOCK_SIZE]).unwrap();
        assert!(load_hdus(file.path()).is_err());
    }
}
