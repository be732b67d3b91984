use crate::fits::{format_inspection, inspect_fits, FitsInspection};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

pub fn inspect(path: &str, verbose: bool, format: &str) -> Result<()> {
    let path = Path::new(path);

    if path.is_file() {
        inspect_single(path, verbose, format)?;
    } else if path.is_dir() {
        inspect_directory(path, verbose, format)?;
    } else {
        return Err(anyhow::anyhow!(
            "Path does not exist or is not accessible: {}",
            path.display()
        ));
    }

    Ok(())
}

fn inspect_single(path: &Path, verbose: bool, format: &str) -> Result<()> {
    let inspection = inspect_fits(path)?;

    match format.to_lowercase().as_str() {
        "json" => {
            let json_output = if verbose {
                serde_json::to_string_pretty(&inspection)?
            } else {
                // For non-verbose JSON, create a simpler structure
                let simplified = create_simplified_inspection(&inspection);
                serde_json::to_string_pretty(&simplified)?
            };
            println!("{}", json_output);
        }
        "csv" => {
            println!("{}", CSV_HEADER);
            output_csv_row(&inspection);
        }
        _ => {
            println!("Reading FITS file: {}\n", path.display());
            let formatted = format_inspection(&inspection, verbose);
            println!("{}", formatted);
        }
    }

    Ok(())
}

fn inspect_directory(dir: &Path, verbose: bool, format: &str) -> Result<()> {
    let mut fits_files = Vec::new();
    find_fits_files(dir, &mut fits_files)?;
    fits_files.sort();

    if fits_files.is_empty() {
        match format.to_lowercase().as_str() {
            "json" => println!("[]"),
            "csv" => println!("{}", CSV_HEADER),
            _ => println!("No FITS files found in directory."),
        }
        return Ok(());
    }

    let mut inspections = Vec::new();
    let mut error_count = 0;

    // Keep going past unreadable files; they only count towards the summary
    for file_path in &fits_files {
        match inspect_fits(file_path) {
            Ok(inspection) => inspections.push(inspection),
            Err(e) => {
                tracing::warn!("Skipping {}: {:#}", file_path.display(), e);
                error_count += 1;
            }
        }
    }

    match format.to_lowercase().as_str() {
        "json" => {
            let json_output = if verbose {
                serde_json::to_string_pretty(&inspections)?
            } else {
                let simplified: Vec<_> = inspections
                    .iter()
                    .map(create_simplified_inspection)
                    .collect();
                serde_json::to_string_pretty(&simplified)?
            };
            println!("{}", json_output);
        }
        "csv" => {
            println!("{}", CSV_HEADER);
            for inspection in &inspections {
                output_csv_row(inspection);
            }
        }
        _ => {
            println!("Scanning directory: {}\n", dir.display());
            println!("Found {} FITS files\n", fits_files.len());

            for (index, inspection) in inspections.iter().enumerate() {
                println!("File {}/{}:", index + 1, fits_files.len());
                let formatted = format_inspection(inspection, verbose);
                println!("{}", formatted);

                if index < inspections.len() - 1 {
                    println!("{:-<60}", "");
                }
            }

            println!("\nSummary:");
            println!("  Successfully read: {}", inspections.len());
            if error_count > 0 {
                println!("  Errors: {}", error_count);
            }
        }
    }

    Ok(())
}

fn find_fits_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            find_fits_files(&path, files)?;
        } else if is_fits_file(&path) {
            files.push(path);
        }
    }

    Ok(())
}

fn is_fits_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            ext_lower == "fits" || ext_lower == "fit" || ext_lower == "fts"
        })
        .unwrap_or(false)
}

#[derive(serde::Serialize)]
struct SimplifiedInspection {
    filename: String,
    hdu_count: usize,
    data_hdu: Option<usize>,
    width: Option<usize>,
    height: Option<usize>,
    bit_depth: Option<i64>,
    pixscale_deg: Option<f64>,
    pixscale_arcsec: Option<f64>,
    fov_width_deg: Option<f64>,
    fov_height_deg: Option<f64>,
}

fn create_simplified_inspection(inspection: &FitsInspection) -> SimplifiedInspection {
    let data = inspection.data_hdu.map(|i| &inspection.hdus[i]);

    SimplifiedInspection {
        filename: inspection.filename.clone(),
        hdu_count: inspection.hdus.len(),
        data_hdu: inspection.data_hdu,
        width: data.and_then(|h| h.dimensions.first().copied()),
        height: data.and_then(|h| h.dimensions.get(1).copied()),
        bit_depth: data.and_then(|h| h.bit_depth),
        pixscale_deg: inspection.pixscale_deg,
        pixscale_arcsec: inspection.pixscale_deg.map(|p| p * 3600.0),
        fov_width_deg: inspection.field_of_view_deg.map(|(w, _)| w),
        fov_height_deg: inspection.field_of_view_deg.map(|(_, h)| h),
    }
}

const CSV_HEADER: &str =
    "filename,hdu_count,data_hdu,width,height,bit_depth,pixscale_deg,pixscale_arcsec";

fn output_csv_row(inspection: &FitsInspection) {
    let simplified = create_simplified_inspection(inspection);
    println!(
        "{},{},{},{},{},{},{},{}",
        escape_csv(&simplified.filename),
        simplified.hdu_count,
        simplified
            .data_hdu
            .map(|v| v.to_string())
            .unwrap_or_default(),
        simplified.width.map(|v| v.to_string()).unwrap_or_default(),
        simplified.height.map(|v| v.to_string()).unwrap_or_default(),
        simplified
            .bit_depth
            .map(|v| v.to_string())
            .unwrap_or_default(),
        simplified
            .pixscale_deg
            .map(|v| v.to_string())
            .unwrap_or_default(),
        simplified
            .pixscale_arcsec
            .map(|v| v.to_string())
            .unwrap_or_default()
    );
}

fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_fits_extensions() {
        assert!(is_fits_file(Path::new("a/b/image.fits")));
        assert!(is_fits_file(Path::new("image.FIT")));
        assert!(is_fits_file(Path::new("image.fts")));
        assert!(!is_fits_file(Path::new("image.png")));
        assert!(!is_fits_file(Path::new("no_extension")));
    }

    #[test]
    fn escapes_csv_fields() {
        assert_eq!(escape_csv("plain"), "plain");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
