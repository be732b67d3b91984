use crate::fits::{find_data_extension, get_pixscale_from_header, load_hdus};
use anyhow::{Context, Result};
use std::path::Path;

pub fn pixscale(path: &str, hdu: Option<usize>, arcsec: bool) -> Result<()> {
    let path = Path::new(path);
    let hdus = load_hdus(path)?;

    let index = match hdu {
        Some(index) => {
            if index >= hdus.len() {
                return Err(anyhow::anyhow!(
                    "HDU index {} out of range (file has {} HDUs)",
                    index,
                    hdus.len()
                ));
            }
            index
        }
        None => find_data_extension(&hdus)
            .with_context(|| format!("Cannot pick an HDU in {}", path.display()))?,
    };

    let pixscale = get_pixscale_from_header(&hdus[index].keywords)
        .with_context(|| format!("HDU {} of {}", index, path.display()))?;

    if arcsec {
        println!("{:.4}", pixscale * 3600.0);
    } else {
        println!("{:.8}", pixscale);
    }

    Ok(())
}
